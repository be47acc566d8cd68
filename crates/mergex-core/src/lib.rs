//! Merge-X engine.
//!
//! [`MergeEngine`] ties the capabilities together: it loads the wallet's
//! token balances into a [`SelectionState`], resolves destinations and
//! estimates gas with last-request-wins semantics, and hands confirmed
//! batches to the [`TransferOrchestrator`]. Engines are assembled by
//! [`MergeEngineBuilder`] from configuration and factory functions.

use alloy::network::EthereumWallet;
use async_stream::stream;
use futures::{pin_mut, Stream, StreamExt};
use mergex_account::{AccountError, AccountInterface, AccountService};
use mergex_config::Config;
use mergex_delivery::{DeliveryError, DeliveryInterface, DeliveryService};
use mergex_resolver::{
	AddressResolver, NameServiceInterface, Resolution, ResolutionCapabilities, ResolverError,
};
use mergex_tokens::{TokenService, TokenSourceError, TokenSourceInterface};
use mergex_types::{
	Address, BatchError, BatchRun, DestinationEvent, EstimateEvent, EventBus, GasEstimate,
	MergeEvent, NetworkId, ProgressEvent, ResolvedDestination, TransferIntent,
};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

pub mod gas;
pub mod latest;
pub mod orchestrator;
pub mod selection;

#[cfg(test)]
mod test_support;

pub use gas::GasEstimator;
pub use latest::LatestSlot;
pub use orchestrator::{OrchestratorError, TransferOrchestrator};
pub use selection::{PortfolioStats, SelectionError, SelectionState, TokenFilter};

#[derive(Debug, Error)]
pub enum EngineError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Account error: {0}")]
	Account(#[from] AccountError),
	#[error("Delivery error: {0}")]
	Delivery(#[from] DeliveryError),
	#[error("Token source error: {0}")]
	Tokens(#[from] TokenSourceError),
	#[error("Resolver error: {0}")]
	Resolver(#[from] ResolverError),
	#[error("Batch error: {0}")]
	Batch(#[from] BatchError),
	#[error(transparent)]
	Orchestrator(#[from] OrchestratorError),
}

pub struct MergeEngine {
	config: Config,
	account: Arc<AccountService>,
	delivery: Arc<DeliveryService>,
	resolver: AddressResolver,
	name_service_ready: bool,
	tokens: TokenService,
	estimator: GasEstimator,
	orchestrator: TransferOrchestrator,
	selection: RwLock<SelectionState>,
	destination: LatestSlot<Resolution>,
	estimate: LatestSlot<GasEstimate>,
	event_bus: EventBus,
}

impl MergeEngine {
	pub fn network_id(&self) -> NetworkId {
		self.config.network.active
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	pub fn event_bus(&self) -> &EventBus {
		&self.event_bus
	}

	pub fn selection(&self) -> &RwLock<SelectionState> {
		&self.selection
	}

	pub fn estimator(&self) -> &GasEstimator {
		&self.estimator
	}

	/// Name lookups are only offered on the designated network.
	pub fn capabilities(&self) -> ResolutionCapabilities {
		if self.name_service_ready && self.config.name_service_available(self.network_id()) {
			ResolutionCapabilities::with_name_service()
		} else {
			ResolutionCapabilities::none()
		}
	}

	pub async fn owner(&self) -> Result<Address, EngineError> {
		Ok(self.account.get_address().await?)
	}

	/// Fetches the wallet's balances and replaces the token list.
	///
	/// Any selection and estimate from the previous list are dropped.
	pub async fn load_tokens(&self) -> Result<usize, EngineError> {
		let owner = self.owner().await?;
		let tokens = self.tokens.fetch_tokens(self.network_id(), owner).await?;
		let count = tokens.len();

		self.selection.write().await.replace_tokens(tokens);
		self.estimate.clear().await;
		Ok(count)
	}

	pub fn appears_valid(&self, input: &str) -> bool {
		self.resolver.appears_valid(input, self.capabilities())
	}

	/// Resolves `input` as the batch destination.
	///
	/// Returns `None` when a newer call started before this one finished;
	/// the newer result is the one kept.
	pub async fn resolve_destination(&self, input: &str) -> Option<Resolution> {
		let generation = self.destination.begin();
		let resolution = self.resolver.resolve(input, self.capabilities()).await;

		if !self.destination.publish(generation, resolution.clone()).await {
			debug!(generation, input, "Dropping stale resolution");
			return None;
		}

		let event = match &resolution {
			Resolution::Resolved(destination) => DestinationEvent::Resolved {
				input: input.to_string(),
				destination: destination.clone(),
			},
			Resolution::Unresolved(reason) => DestinationEvent::Rejected {
				input: input.to_string(),
				reason: reason.to_string(),
			},
		};
		self.event_bus.publish(MergeEvent::Destination(event)).ok();
		Some(resolution)
	}

	pub async fn current_destination(&self) -> Option<ResolvedDestination> {
		self.destination
			.get()
			.await
			.and_then(Resolution::into_destination)
	}

	/// Estimates gas for sending `intents` to `destination` on the active network.
	///
	/// Returns `None` when there is nothing to estimate or a newer estimate
	/// was requested in the meantime.
	pub async fn estimate_gas(
		&self,
		destination: Option<&ResolvedDestination>,
		intents: &[TransferIntent],
	) -> Option<GasEstimate> {
		let generation = self.estimate.begin();
		let network_id = self.network_id();

		let estimate = match self.delivery.for_network(network_id) {
			Ok(delivery) => {
				self.estimator
					.estimate(destination, intents, delivery.as_ref())
					.await
			}
			Err(e) => Some(GasEstimate::failed(e.to_string())),
		};

		let Some(estimate) = estimate else {
			if self.estimate.is_current(generation) {
				self.estimate.clear().await;
			}
			return None;
		};

		if !self.estimate.publish(generation, estimate.clone()).await {
			debug!(generation, "Dropping stale gas estimate");
			self.event_bus
				.publish(MergeEvent::Estimate(EstimateEvent::Discarded { generation }))
				.ok();
			return None;
		}

		self.event_bus
			.publish(MergeEvent::Estimate(EstimateEvent::Updated {
				network_id,
				estimate: estimate.clone(),
			}))
			.ok();
		Some(estimate)
	}

	pub async fn current_estimate(&self) -> Option<GasEstimate> {
		self.estimate.get().await
	}

	/// Whether `estimate` costs more than the configured share of `total_value_usd`.
	pub fn is_expensive(&self, estimate: &GasEstimate, total_value_usd: f64) -> bool {
		estimate.is_expensive(total_value_usd, self.config.gas.expensive_ratio)
	}

	/// Captures the current selection as a batch in `Preview`.
	pub async fn prepare_batch(
		&self,
		destination: ResolvedDestination,
	) -> Result<BatchRun, EngineError> {
		let intents = self.selection.read().await.snapshot();
		if intents.is_empty() {
			return Err(BatchError::EmptyBatch.into());
		}

		let run = BatchRun::new(self.network_id(), destination, intents)?;
		info!(
			run_id = %run.id(),
			intents = run.intents().len(),
			value_usd = run.total_quote_usd(),
			"Prepared batch"
		);
		Ok(run)
	}

	/// Sends `run`, keeping the selection in step with its progress.
	///
	/// Once the batch completes with at least one confirmed transfer the
	/// selection is cleared.
	pub fn execute<'a>(
		&'a self,
		run: &'a mut BatchRun,
	) -> Result<impl Stream<Item = ProgressEvent> + Send + 'a, EngineError> {
		let progress = self.orchestrator.start(run)?;

		Ok(stream! {
			pin_mut!(progress);
			while let Some(event) = progress.next().await {
				self.observe(&event).await;
				yield event;
			}
		})
	}

	async fn observe(&self, event: &ProgressEvent) {
		let mut selection = self.selection.write().await;
		selection.observe(event);

		if let ProgressEvent::Completed(summary) = event {
			if selection.clear_after(summary) {
				drop(selection);
				self.estimate.clear().await;
				info!(%summary, "Cleared selection after batch");
			}
		}
	}
}

type AccountFactory =
	Box<dyn Fn(&toml::Value) -> Result<Box<dyn AccountInterface>, AccountError> + Send>;
type DeliveryFactory = Box<
	dyn Fn(&toml::Value, EthereumWallet) -> Result<Box<dyn DeliveryInterface>, DeliveryError>
		+ Send,
>;
type NameServiceFactory =
	Box<dyn Fn(&toml::Value) -> Result<Box<dyn NameServiceInterface>, ResolverError> + Send>;
type TokenSourceFactory =
	Box<dyn Fn(&toml::Value) -> Result<Box<dyn TokenSourceInterface>, TokenSourceError> + Send>;

pub struct MergeEngineBuilder {
	config: Config,
	account_factories: HashMap<String, AccountFactory>,
	delivery_factory: Option<DeliveryFactory>,
	name_service_factory: Option<NameServiceFactory>,
	token_source_factories: HashMap<String, TokenSourceFactory>,
	event_capacity: usize,
}

impl MergeEngineBuilder {
	pub fn new(config: Config) -> Self {
		Self {
			config,
			account_factories: HashMap::new(),
			delivery_factory: None,
			name_service_factory: None,
			token_source_factories: HashMap::new(),
			event_capacity: 1000,
		}
	}

	pub fn with_account_factory<F>(mut self, name: &str, factory: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<Box<dyn AccountInterface>, AccountError> + Send + 'static,
	{
		self.account_factories
			.insert(name.to_string(), Box::new(factory));
		self
	}

	pub fn with_delivery_factory<F>(mut self, factory: F) -> Self
	where
		F: Fn(&toml::Value, EthereumWallet) -> Result<Box<dyn DeliveryInterface>, DeliveryError>
			+ Send
			+ 'static,
	{
		self.delivery_factory = Some(Box::new(factory));
		self
	}

	pub fn with_name_service_factory<F>(mut self, factory: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<Box<dyn NameServiceInterface>, ResolverError>
			+ Send
			+ 'static,
	{
		self.name_service_factory = Some(Box::new(factory));
		self
	}

	pub fn with_token_source_factory<F>(mut self, name: &str, factory: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<Box<dyn TokenSourceInterface>, TokenSourceError>
			+ Send
			+ 'static,
	{
		self.token_source_factories
			.insert(name.to_string(), Box::new(factory));
		self
	}

	pub fn with_event_capacity(mut self, capacity: usize) -> Self {
		self.event_capacity = capacity;
		self
	}

	pub fn build(self) -> Result<MergeEngine, EngineError> {
		let config = self.config;

		// Account
		let account_factory = self
			.account_factories
			.get(&config.wallet.implementation)
			.ok_or_else(|| {
				EngineError::Config(format!(
					"No account factory for '{}'",
					config.wallet.implementation
				))
			})?;
		let account = Arc::new(AccountService::new(account_factory(
			&config.wallet.as_table(),
		)?));
		let wallet = account.wallet();

		// One delivery per configured network, all signing with the same wallet
		let delivery_factory = self
			.delivery_factory
			.ok_or_else(|| EngineError::Config("Delivery factory not provided".into()))?;
		let mut implementations: HashMap<NetworkId, Arc<dyn DeliveryInterface>> = HashMap::new();
		for (network_id, network) in &config.networks {
			let mut table = toml::map::Map::new();
			table.insert(
				"rpc_url".to_string(),
				toml::Value::String(network.rpc_url.clone()),
			);
			table.insert(
				"network_id".to_string(),
				toml::Value::Integer(*network_id as i64),
			);
			table.insert(
				"confirmations".to_string(),
				toml::Value::Integer(config.delivery.confirmations as i64),
			);
			table.insert(
				"confirmation_timeout_secs".to_string(),
				toml::Value::Integer(config.delivery.confirmation_timeout_secs as i64),
			);
			table.insert(
				"poll_interval_ms".to_string(),
				toml::Value::Integer(config.delivery.poll_interval_ms as i64),
			);

			let implementation = delivery_factory(&toml::Value::Table(table), wallet.clone())?;
			implementations.insert(*network_id, Arc::from(implementation));
		}
		if !implementations.contains_key(&config.network.active) {
			return Err(EngineError::Config(format!(
				"Active network {} is not configured",
				config.network.active
			)));
		}
		let delivery = Arc::new(DeliveryService::new(implementations));

		// Name service, only when enabled and its network is known
		let name_service = match (
			&self.name_service_factory,
			config.name_service.enabled,
			config.networks.get(&config.name_service.network_id),
		) {
			(Some(factory), true, Some(network)) => {
				let mut table = toml::map::Map::new();
				table.insert(
					"rpc_url".to_string(),
					toml::Value::String(network.rpc_url.clone()),
				);
				table.insert(
					"network_id".to_string(),
					toml::Value::Integer(config.name_service.network_id as i64),
				);
				if let Some(registry) = &config.name_service.registry {
					table.insert(
						"registry".to_string(),
						toml::Value::String(registry.clone()),
					);
				}
				let service: Arc<dyn NameServiceInterface> =
					Arc::from(factory(&toml::Value::Table(table))?);
				Some(service)
			}
			_ => None,
		};
		let name_service_ready = name_service.is_some();

		// Token source
		let token_factory = self
			.token_source_factories
			.get(&config.tokens.implementation)
			.ok_or_else(|| {
				EngineError::Config(format!(
					"No token source factory for '{}'",
					config.tokens.implementation
				))
			})?;
		let tokens = TokenService::new(token_factory(&config.tokens.config)?);

		let event_bus = EventBus::new(self.event_capacity);
		let estimator = GasEstimator::new(config.gas.fallback_units, config.price_table());
		let orchestrator =
			TransferOrchestrator::new(delivery.clone()).with_event_bus(event_bus.clone());

		info!(
			network = config.network.active,
			networks = ?delivery.networks(),
			name_service = name_service_ready,
			"Merge engine ready"
		);

		Ok(MergeEngine {
			config,
			account,
			delivery,
			resolver: AddressResolver::new(name_service),
			name_service_ready,
			tokens,
			estimator,
			orchestrator,
			selection: RwLock::new(SelectionState::new()),
			destination: LatestSlot::new(),
			estimate: LatestSlot::new(),
			event_bus,
		})
	}
}
