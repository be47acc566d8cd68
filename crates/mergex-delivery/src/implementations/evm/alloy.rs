//! ERC-20 transfer delivery over an alloy HTTP provider.

use crate::{DeliveryError, DeliveryInterface, TransactionReceipt};
use alloy::network::{EthereumWallet, TransactionBuilder, TxSigner};
use alloy::primitives::{Bytes, B256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::sol;
use alloy::sol_types::SolCall;
use alloy::transports::http::reqwest::Url;
use async_trait::async_trait;
use mergex_types::{
	truncate_hash, Address, ConfigSchema, Field, FieldType, NetworkId, Schema, TransactionHash,
	TransferIntent, ValidationError,
};
use std::time::Duration;
use tracing::{debug, info};

sol! {
	interface IERC20 {
		function transfer(address to, uint256 amount) external returns (bool);
	}
}

/// Receipt polling settings.
#[derive(Debug, Clone, Copy)]
pub struct ConfirmationPolicy {
	pub confirmations: u64,
	pub timeout: Duration,
	pub poll_interval: Duration,
}

impl Default for ConfirmationPolicy {
	fn default() -> Self {
		Self {
			confirmations: 1,
			timeout: Duration::from_secs(300),
			poll_interval: Duration::from_millis(1000),
		}
	}
}

pub struct AlloyDelivery {
	provider: DynProvider,
	network_id: NetworkId,
	sender: Address,
	policy: ConfirmationPolicy,
}

impl AlloyDelivery {
	pub fn new(
		rpc_url: &str,
		network_id: NetworkId,
		wallet: EthereumWallet,
		policy: ConfirmationPolicy,
	) -> Result<Self, DeliveryError> {
		let url: Url = rpc_url
			.parse()
			.map_err(|e| DeliveryError::InvalidConfig(format!("Invalid RPC URL: {}", e)))?;

		let sender = wallet.default_signer().address();
		let provider = ProviderBuilder::new()
			.wallet(wallet)
			.connect_http(url)
			.erased();

		Ok(Self {
			provider,
			network_id,
			sender,
			policy,
		})
	}

	fn transfer_request(&self, intent: &TransferIntent, to: Address) -> TransactionRequest {
		let call = IERC20::transferCall {
			to,
			amount: intent.amount,
		};
		TransactionRequest::default()
			.with_from(self.sender)
			.with_to(intent.token)
			.with_chain_id(self.network_id)
			.with_input(Bytes::from(call.abi_encode()))
	}
}

/// `true` unless the token explicitly returned `false`.
///
/// Tokens that return nothing from `transfer` are treated as successful.
fn transfer_returned_true(output: &[u8]) -> bool {
	output.is_empty() || output.iter().any(|b| *b != 0)
}

fn to_b256(hash: &TransactionHash) -> Result<B256, DeliveryError> {
	B256::try_from(hash.0.as_slice())
		.map_err(|_| DeliveryError::Confirmation(format!("Malformed transaction hash {}", hash)))
}

pub struct AlloyDeliverySchema;

impl ConfigSchema for AlloyDeliverySchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![
				Field::new("rpc_url", FieldType::String).with_validator(|value| {
					let url = value.as_str().unwrap_or_default();
					if url.starts_with("http://") || url.starts_with("https://") {
						Ok(())
					} else {
						Err("RPC URL must start with http:// or https://".to_string())
					}
				}),
				Field::new(
					"network_id",
					FieldType::Integer {
						min: Some(1),
						max: None,
					},
				),
			],
			vec![
				Field::new(
					"confirmations",
					FieldType::Integer {
						min: Some(0),
						max: Some(64),
					},
				),
				Field::new(
					"confirmation_timeout_secs",
					FieldType::Integer {
						min: Some(1),
						max: None,
					},
				),
				Field::new(
					"poll_interval_ms",
					FieldType::Integer {
						min: Some(10),
						max: None,
					},
				),
			],
		);

		schema.validate(config)
	}
}

#[async_trait]
impl DeliveryInterface for AlloyDelivery {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(AlloyDeliverySchema)
	}

	fn network_id(&self) -> NetworkId {
		self.network_id
	}

	async fn get_gas_price(&self) -> Result<u128, DeliveryError> {
		self.provider
			.get_gas_price()
			.await
			.map_err(|e| DeliveryError::Network(format!("Failed to get gas price: {}", e)))
	}

	async fn estimate_transfer_gas(
		&self,
		intent: &TransferIntent,
		to: Address,
	) -> Result<u64, DeliveryError> {
		let request = self.transfer_request(intent, to);
		self.provider
			.estimate_gas(request)
			.await
			.map_err(|e| DeliveryError::Network(format!("Failed to estimate gas: {}", e)))
	}

	async fn simulate_transfer(
		&self,
		intent: &TransferIntent,
		to: Address,
	) -> Result<(), DeliveryError> {
		let request = self.transfer_request(intent, to);
		let output = self
			.provider
			.call(request)
			.await
			.map_err(|e| DeliveryError::Simulation(e.to_string()))?;

		if !transfer_returned_true(&output) {
			return Err(DeliveryError::Simulation(format!(
				"{} transfer returned false",
				intent.symbol
			)));
		}
		debug!(token = %intent.token, "Transfer simulation succeeded");
		Ok(())
	}

	async fn submit_transfer(
		&self,
		intent: &TransferIntent,
		to: Address,
	) -> Result<TransactionHash, DeliveryError> {
		let request = self.transfer_request(intent, to);
		let pending = self
			.provider
			.send_transaction(request)
			.await
			.map_err(|e| DeliveryError::Submission(e.to_string()))?;

		let hash = TransactionHash::from(*pending.tx_hash());
		info!(tx_hash = %truncate_hash(&hash.to_string()), token = %intent.symbol, "Submitted transfer");
		Ok(hash)
	}

	async fn wait_for_confirmation(
		&self,
		hash: &TransactionHash,
	) -> Result<TransactionReceipt, DeliveryError> {
		let tx_hash = to_b256(hash)?;
		let policy = self.policy;
		let started = tokio::time::Instant::now();

		info!(
			tx_hash = %truncate_hash(&hash.to_string()),
			"Waiting for {} confirmations (timeout: {}s)",
			policy.confirmations,
			policy.timeout.as_secs()
		);

		loop {
			if started.elapsed() > policy.timeout {
				return Err(DeliveryError::Confirmation(format!(
					"Timeout waiting for {} confirmations after {} seconds",
					policy.confirmations,
					policy.timeout.as_secs()
				)));
			}

			let receipt = match self.provider.get_transaction_receipt(tx_hash).await {
				Ok(Some(receipt)) => receipt,
				Ok(None) => {
					tokio::time::sleep(policy.poll_interval).await;
					continue;
				}
				Err(e) => {
					return Err(DeliveryError::Confirmation(format!(
						"Failed to get receipt: {}",
						e
					)));
				}
			};

			let tx_block = receipt.block_number.unwrap_or(0);
			if policy.confirmations > 1 {
				let current_block = self.provider.get_block_number().await.map_err(|e| {
					DeliveryError::Confirmation(format!("Failed to get block number: {}", e))
				})?;
				let confirmations = current_block.saturating_sub(tx_block) + 1;
				if confirmations < policy.confirmations {
					debug!(
						"Waiting for {} more confirmations...",
						policy.confirmations - confirmations
					);
					tokio::time::sleep(policy.poll_interval).await;
					continue;
				}
			}

			return Ok(TransactionReceipt {
				hash: TransactionHash::from(receipt.transaction_hash),
				block_number: tx_block,
				success: receipt.status(),
			});
		}
	}
}

/// Builds an [`AlloyDelivery`] from its configuration table and the wallet
/// that signs for it.
///
/// Required: `rpc_url`, `network_id`. Optional: `confirmations`,
/// `confirmation_timeout_secs`, `poll_interval_ms`.
pub fn create_http_delivery(
	config: &toml::Value,
	wallet: EthereumWallet,
) -> Result<Box<dyn DeliveryInterface>, DeliveryError> {
	AlloyDeliverySchema
		.validate(config)
		.map_err(|e| DeliveryError::InvalidConfig(e.to_string()))?;

	let rpc_url = config
		.get("rpc_url")
		.and_then(|v| v.as_str())
		.ok_or_else(|| DeliveryError::InvalidConfig("rpc_url is required".to_string()))?;
	let network_id = config
		.get("network_id")
		.and_then(|v| v.as_integer())
		.ok_or_else(|| DeliveryError::InvalidConfig("network_id is required".to_string()))?
		as NetworkId;

	let defaults = ConfirmationPolicy::default();
	let read_u64 = |key: &str| {
		config
			.get(key)
			.and_then(|v| v.as_integer())
			.map(|v| v as u64)
	};
	let policy = ConfirmationPolicy {
		confirmations: read_u64("confirmations").unwrap_or(defaults.confirmations),
		timeout: read_u64("confirmation_timeout_secs")
			.map(Duration::from_secs)
			.unwrap_or(defaults.timeout),
		poll_interval: read_u64("poll_interval_ms")
			.map(Duration::from_millis)
			.unwrap_or(defaults.poll_interval),
	};

	Ok(Box::new(AlloyDelivery::new(
		rpc_url, network_id, wallet, policy,
	)?))
}
