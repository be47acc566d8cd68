//! Balances from an HTTP indexing API.
//!
//! `GET {base_url}/{chain_id}/address/{owner}/balances` returning
//! `{ "data": { "erc20s": [ ... ] } }`.

use crate::{TokenSourceError, TokenSourceInterface};
use async_trait::async_trait;
use mergex_types::{
	Address, ConfigSchema, Field, FieldType, NetworkId, Schema, TokenBalance, ValidationError,
};
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Deserialize)]
struct BalancesResponse {
	data: BalancesData,
}

#[derive(Debug, Deserialize)]
struct BalancesData {
	#[serde(default)]
	erc20s: Vec<TokenBalance>,
}

pub struct HttpIndexer {
	client: reqwest::Client,
	base_url: String,
	api_key: Option<String>,
}

impl HttpIndexer {
	pub fn new(
		base_url: &str,
		api_key: Option<String>,
		timeout: Duration,
	) -> Result<Self, TokenSourceError> {
		let client = reqwest::Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| TokenSourceError::InvalidConfig(e.to_string()))?;

		Ok(Self {
			client,
			base_url: base_url.trim_end_matches('/').to_string(),
			api_key,
		})
	}

	fn balances_url(&self, network_id: NetworkId, owner: Address) -> String {
		format!(
			"{}/{}/address/{}/balances",
			self.base_url, network_id, owner
		)
	}
}

pub struct HttpIndexerSchema;

impl ConfigSchema for HttpIndexerSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![
				Field::new("base_url", FieldType::String).with_validator(|value| {
					let url = value.as_str().unwrap_or_default();
					if url.starts_with("http://") || url.starts_with("https://") {
						Ok(())
					} else {
						Err("base_url must start with http:// or https://".to_string())
					}
				}),
			],
			vec![
				Field::new("api_key", FieldType::String),
				Field::new(
					"timeout_secs",
					FieldType::Integer {
						min: Some(1),
						max: Some(300),
					},
				),
			],
		);

		schema.validate(config)
	}
}

#[async_trait]
impl TokenSourceInterface for HttpIndexer {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(HttpIndexerSchema)
	}

	async fn fetch_tokens(
		&self,
		network_id: NetworkId,
		owner: Address,
	) -> Result<Vec<TokenBalance>, TokenSourceError> {
		let mut request = self.client.get(self.balances_url(network_id, owner));
		if let Some(key) = &self.api_key {
			request = request.bearer_auth(key);
		}

		let response = request
			.send()
			.await
			.map_err(|e| TokenSourceError::Http(e.to_string()))?;

		let status = response.status();
		if status.is_client_error() {
			warn!(network = network_id, %status, "Indexer rejected network");
			return Err(TokenSourceError::UnsupportedNetwork(network_id));
		}
		if !status.is_success() {
			return Err(TokenSourceError::Http(format!("Indexer returned {}", status)));
		}

		let body: BalancesResponse = response
			.json()
			.await
			.map_err(|e| TokenSourceError::Decode(e.to_string()))?;

		Ok(body.data.erc20s)
	}
}

/// Required: `base_url`. Optional: `api_key`, `timeout_secs` (default 30).
pub fn create_http_indexer(
	config: &toml::Value,
) -> Result<Box<dyn TokenSourceInterface>, TokenSourceError> {
	HttpIndexerSchema
		.validate(config)
		.map_err(|e| TokenSourceError::InvalidConfig(e.to_string()))?;

	let base_url = config
		.get("base_url")
		.and_then(|v| v.as_str())
		.ok_or_else(|| TokenSourceError::InvalidConfig("base_url is required".to_string()))?;
	let api_key = config
		.get("api_key")
		.and_then(|v| v.as_str())
		.filter(|key| !key.is_empty())
		.map(str::to_string);
	let timeout = config
		.get("timeout_secs")
		.and_then(|v| v.as_integer())
		.map(|secs| Duration::from_secs(secs as u64))
		.unwrap_or(Duration::from_secs(30));

	Ok(Box::new(HttpIndexer::new(base_url, api_key, timeout)?))
}
