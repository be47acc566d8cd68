//! Token balance source.
//!
//! Balances and fiat quotes for the connected wallet come from a
//! third-party indexing API behind [`TokenSourceInterface`].

use async_trait::async_trait;
use mergex_types::{Address, ConfigSchema, NetworkId, TokenBalance};
use thiserror::Error;
use tracing::{debug, info};

pub mod implementations {
	pub mod http_indexer;
}

#[derive(Debug, Error)]
pub enum TokenSourceError {
	#[error("Chain {0} not supported")]
	UnsupportedNetwork(NetworkId),
	#[error("HTTP error: {0}")]
	Http(String),
	#[error("Failed to decode response: {0}")]
	Decode(String),
	#[error("Invalid configuration: {0}")]
	InvalidConfig(String),
	#[error("Unknown token source implementation: {0}")]
	UnknownImplementation(String),
}

#[async_trait]
pub trait TokenSourceInterface: Send + Sync {
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// ERC-20 balances held by `owner` on `network_id`.
	async fn fetch_tokens(
		&self,
		network_id: NetworkId,
		owner: Address,
	) -> Result<Vec<TokenBalance>, TokenSourceError>;
}

pub struct TokenService {
	source: Box<dyn TokenSourceInterface>,
}

impl TokenService {
	pub fn new(source: Box<dyn TokenSourceInterface>) -> Self {
		Self { source }
	}

	pub async fn fetch_tokens(
		&self,
		network_id: NetworkId,
		owner: Address,
	) -> Result<Vec<TokenBalance>, TokenSourceError> {
		debug!(network = network_id, %owner, "Fetching token balances");
		let tokens = self.source.fetch_tokens(network_id, owner).await?;
		info!(network = network_id, count = tokens.len(), "Loaded token balances");
		Ok(tokens)
	}
}

/// Builds the token source named `implementation`.
pub fn create_token_source(
	implementation: &str,
	config: &toml::Value,
) -> Result<Box<dyn TokenSourceInterface>, TokenSourceError> {
	match implementation {
		"http_indexer" => implementations::http_indexer::create_http_indexer(config),
		other => Err(TokenSourceError::UnknownImplementation(other.to_string())),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_unknown_implementation() {
		let config = toml::Value::Table(toml::map::Map::new());
		assert!(matches!(
			create_token_source("graphql", &config),
			Err(TokenSourceError::UnknownImplementation(_))
		));
	}

	#[test]
	fn test_unsupported_message() {
		assert_eq!(
			TokenSourceError::UnsupportedNetwork(250).to_string(),
			"Chain 250 not supported"
		);
	}
}
