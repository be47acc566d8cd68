//! Signing-key management.
//!
//! An [`AccountInterface`] owns the key that authorizes token transfers. The
//! delivery layer asks it for an alloy wallet when building providers, so
//! the key never leaves this crate in any other form.

use alloy::network::EthereumWallet;
use async_trait::async_trait;
use mergex_types::{Address, ConfigSchema};
use thiserror::Error;

pub mod implementations {
	pub mod local;
}

#[derive(Debug, Error)]
pub enum AccountError {
	#[error("Invalid key: {0}")]
	InvalidKey(String),
	#[error("Invalid configuration: {0}")]
	InvalidConfig(String),
	#[error("Unknown account implementation: {0}")]
	UnknownImplementation(String),
}

#[async_trait]
pub trait AccountInterface: Send + Sync {
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Address transfers are sent from.
	async fn address(&self) -> Result<Address, AccountError>;

	/// Wallet used to sign outgoing transactions.
	fn wallet(&self) -> EthereumWallet;
}

pub struct AccountService {
	provider: Box<dyn AccountInterface>,
}

impl AccountService {
	pub fn new(provider: Box<dyn AccountInterface>) -> Self {
		Self { provider }
	}

	pub async fn get_address(&self) -> Result<Address, AccountError> {
		self.provider.address().await
	}

	pub fn wallet(&self) -> EthereumWallet {
		self.provider.wallet()
	}
}

/// Builds the account implementation named `implementation`.
pub fn create_account(
	implementation: &str,
	config: &toml::Value,
) -> Result<Box<dyn AccountInterface>, AccountError> {
	match implementation {
		"local" => implementations::local::create_account(config),
		other => Err(AccountError::UnknownImplementation(other.to_string())),
	}
}
