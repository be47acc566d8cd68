//! Transaction delivery for ERC-20 transfers.
//!
//! A [`DeliveryInterface`] is the signing capability the orchestrator drives:
//! it simulates a transfer, submits it, and waits for the receipt. It is also
//! the source of gas prices and per-transfer gas estimates. The
//! [`DeliveryService`] routes calls to the implementation configured for a
//! given network.

use async_trait::async_trait;
use mergex_types::{Address, ConfigSchema, NetworkId, TransactionHash, TransferIntent};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

pub mod implementations {
	pub mod evm {
		pub mod alloy;
	}
}

#[derive(Debug, Error)]
pub enum DeliveryError {
	#[error("Network error: {0}")]
	Network(String),
	#[error("Simulation failed: {0}")]
	Simulation(String),
	#[error("Submission failed: {0}")]
	Submission(String),
	#[error("Confirmation failed: {0}")]
	Confirmation(String),
	#[error("Invalid configuration: {0}")]
	InvalidConfig(String),
	#[error("No delivery implementation for network {0}")]
	NoImplementationAvailable(NetworkId),
}

/// Receipt of a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionReceipt {
	pub hash: TransactionHash,
	pub block_number: u64,
	pub success: bool,
}

#[async_trait]
pub trait DeliveryInterface: Send + Sync {
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Network this implementation signs for.
	fn network_id(&self) -> NetworkId;

	/// Current gas price in wei.
	async fn get_gas_price(&self) -> Result<u128, DeliveryError>;

	/// Gas units needed to transfer `intent` to `to`.
	async fn estimate_transfer_gas(
		&self,
		intent: &TransferIntent,
		to: Address,
	) -> Result<u64, DeliveryError>;

	/// Dry-runs the transfer against the latest state.
	async fn simulate_transfer(
		&self,
		intent: &TransferIntent,
		to: Address,
	) -> Result<(), DeliveryError>;

	/// Signs and broadcasts the transfer.
	async fn submit_transfer(
		&self,
		intent: &TransferIntent,
		to: Address,
	) -> Result<TransactionHash, DeliveryError>;

	async fn wait_for_confirmation(
		&self,
		hash: &TransactionHash,
	) -> Result<TransactionReceipt, DeliveryError>;
}

/// Delivery implementations keyed by network.
pub struct DeliveryService {
	implementations: HashMap<NetworkId, Arc<dyn DeliveryInterface>>,
}

impl DeliveryService {
	pub fn new(implementations: HashMap<NetworkId, Arc<dyn DeliveryInterface>>) -> Self {
		Self { implementations }
	}

	pub fn supports_network(&self, network_id: NetworkId) -> bool {
		self.implementations.contains_key(&network_id)
	}

	pub fn networks(&self) -> Vec<NetworkId> {
		let mut ids: Vec<_> = self.implementations.keys().copied().collect();
		ids.sort_unstable();
		ids
	}

	pub fn for_network(
		&self,
		network_id: NetworkId,
	) -> Result<Arc<dyn DeliveryInterface>, DeliveryError> {
		self.implementations
			.get(&network_id)
			.cloned()
			.ok_or(DeliveryError::NoImplementationAvailable(network_id))
	}

	pub async fn get_gas_price(&self, network_id: NetworkId) -> Result<u128, DeliveryError> {
		self.for_network(network_id)?.get_gas_price().await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use mergex_types::{Schema, U256, ValidationError};

	struct NoSchema;

	impl ConfigSchema for NoSchema {
		fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
			Schema::new(vec![], vec![]).validate(config)
		}
	}

	struct FixedPrice(NetworkId, u128);

	#[async_trait]
	impl DeliveryInterface for FixedPrice {
		fn config_schema(&self) -> Box<dyn ConfigSchema> {
			Box::new(NoSchema)
		}

		fn network_id(&self) -> NetworkId {
			self.0
		}

		async fn get_gas_price(&self) -> Result<u128, DeliveryError> {
			Ok(self.1)
		}

		async fn estimate_transfer_gas(
			&self,
			_intent: &TransferIntent,
			_to: Address,
		) -> Result<u64, DeliveryError> {
			Ok(50_000)
		}

		async fn simulate_transfer(
			&self,
			_intent: &TransferIntent,
			_to: Address,
		) -> Result<(), DeliveryError> {
			Ok(())
		}

		async fn submit_transfer(
			&self,
			_intent: &TransferIntent,
			_to: Address,
		) -> Result<TransactionHash, DeliveryError> {
			Ok(TransactionHash(vec![0u8; 32]))
		}

		async fn wait_for_confirmation(
			&self,
			hash: &TransactionHash,
		) -> Result<TransactionReceipt, DeliveryError> {
			Ok(TransactionReceipt {
				hash: hash.clone(),
				block_number: 1,
				success: true,
			})
		}
	}

	fn service() -> DeliveryService {
		let mut implementations: HashMap<NetworkId, Arc<dyn DeliveryInterface>> = HashMap::new();
		implementations.insert(1, Arc::new(FixedPrice(1, 30)));
		implementations.insert(8453, Arc::new(FixedPrice(8453, 2)));
		DeliveryService::new(implementations)
	}

	#[tokio::test]
	async fn test_routes_by_network() {
		let service = service();
		assert_eq!(service.get_gas_price(8453).await.unwrap(), 2);
		assert_eq!(service.get_gas_price(1).await.unwrap(), 30);
		assert_eq!(service.networks(), vec![1, 8453]);

		let intent = TransferIntent {
			token: Address::repeat_byte(1),
			amount: U256::from(1u64),
			symbol: "T".to_string(),
			quote_usd: 1.0,
		};
		let delivery = service.for_network(1).unwrap();
		assert_eq!(
			delivery
				.estimate_transfer_gas(&intent, Address::ZERO)
				.await
				.unwrap(),
			50_000
		);
	}

	#[tokio::test]
	async fn test_unknown_network() {
		let service = service();
		assert!(!service.supports_network(137));
		assert!(matches!(
			service.get_gas_price(137).await,
			Err(DeliveryError::NoImplementationAvailable(137))
		));
	}
}
