//! Hand-written capability mocks shared by the unit tests.

use async_trait::async_trait;
use mergex_delivery::{DeliveryError, DeliveryInterface, DeliveryService, TransactionReceipt};
use mergex_types::{
	Address, ConfigSchema, NetworkId, Schema, TransactionHash, TransferIntent, U256,
	ValidationError,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub struct NoSchema;

impl ConfigSchema for NoSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![]).validate(config)
	}
}

/// Delivery double whose failures are chosen per token.
#[derive(Default)]
pub struct MockDelivery {
	pub network_id: NetworkId,
	/// `None` makes `get_gas_price` fail.
	pub gas_price: Option<u128>,
	/// Tokens missing from the map fail estimation.
	pub gas_units: HashMap<Address, u64>,
	/// Delay before answering a gas estimate for the token.
	pub estimate_delay: HashMap<Address, Duration>,
	pub fail_simulation: HashSet<Address>,
	pub fail_submission: HashSet<Address>,
	pub fail_confirmation: HashSet<Address>,
	pub revert: HashSet<Address>,
	pub log: Mutex<Vec<String>>,
	pub submissions: AtomicUsize,
}

impl MockDelivery {
	pub fn on(network_id: NetworkId) -> Self {
		Self {
			network_id,
			gas_price: Some(1_000_000_000),
			..Default::default()
		}
	}

	pub fn submissions(&self) -> usize {
		self.submissions.load(Ordering::SeqCst)
	}

	pub fn calls(&self) -> Vec<String> {
		self.log.lock().unwrap().clone()
	}

	fn note(&self, call: &str, token: Address) {
		self.log.lock().unwrap().push(format!("{}:{}", call, token));
	}

	pub fn into_service(self) -> (Arc<MockDelivery>, Arc<DeliveryService>) {
		let mock = Arc::new(self);
		let mut implementations: HashMap<NetworkId, Arc<dyn DeliveryInterface>> = HashMap::new();
		implementations.insert(mock.network_id, mock.clone());
		(mock, Arc::new(DeliveryService::new(implementations)))
	}
}

/// Hash derived from the token address so tests can predict it.
pub fn hash_for(token: Address) -> TransactionHash {
	let mut bytes = vec![0u8; 12];
	bytes.extend_from_slice(token.as_slice());
	TransactionHash(bytes)
}

pub fn intent(byte: u8, quote_usd: f64) -> TransferIntent {
	TransferIntent {
		token: Address::repeat_byte(byte),
		amount: U256::from(1_000u64),
		symbol: format!("TK{}", byte),
		quote_usd,
	}
}

#[async_trait]
impl DeliveryInterface for MockDelivery {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(NoSchema)
	}

	fn network_id(&self) -> NetworkId {
		self.network_id
	}

	async fn get_gas_price(&self) -> Result<u128, DeliveryError> {
		self.gas_price
			.ok_or_else(|| DeliveryError::Network("gas price unavailable".to_string()))
	}

	async fn estimate_transfer_gas(
		&self,
		intent: &TransferIntent,
		_to: Address,
	) -> Result<u64, DeliveryError> {
		self.note("estimate", intent.token);
		if let Some(delay) = self.estimate_delay.get(&intent.token) {
			tokio::time::sleep(*delay).await;
		}
		self.gas_units
			.get(&intent.token)
			.copied()
			.ok_or_else(|| DeliveryError::Network("execution reverted".to_string()))
	}

	async fn simulate_transfer(
		&self,
		intent: &TransferIntent,
		_to: Address,
	) -> Result<(), DeliveryError> {
		self.note("simulate", intent.token);
		if self.fail_simulation.contains(&intent.token) {
			return Err(DeliveryError::Simulation("insufficient balance".to_string()));
		}
		Ok(())
	}

	async fn submit_transfer(
		&self,
		intent: &TransferIntent,
		_to: Address,
	) -> Result<TransactionHash, DeliveryError> {
		self.note("submit", intent.token);
		self.submissions.fetch_add(1, Ordering::SeqCst);
		if self.fail_submission.contains(&intent.token) {
			return Err(DeliveryError::Submission("user rejected".to_string()));
		}
		Ok(hash_for(intent.token))
	}

	async fn wait_for_confirmation(
		&self,
		hash: &TransactionHash,
	) -> Result<TransactionReceipt, DeliveryError> {
		let token = Address::from_slice(&hash.0[12..]);
		self.note("confirm", token);
		if self.fail_confirmation.contains(&token) {
			return Err(DeliveryError::Confirmation("timeout".to_string()));
		}
		Ok(TransactionReceipt {
			hash: hash.clone(),
			block_number: 100,
			success: !self.revert.contains(&token),
		})
	}
}
