//! Configuration types for Merge-X.

use crate::serde_helpers::{deserialize_network_map, serialize_network_map};
use mergex_types::{FiatPriceTable, NetworkId, ETHEREUM_MAINNET};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Complete Merge-X configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Signing key
	pub wallet: WalletConfig,
	/// Active network selection
	pub network: NetworkSelection,
	/// Per-network settings, keyed by chain id
	#[serde(
		deserialize_with = "deserialize_network_map",
		serialize_with = "serialize_network_map"
	)]
	pub networks: HashMap<NetworkId, NetworkConfig>,
	#[serde(default)]
	pub name_service: NameServiceConfig,
	/// Token balance source
	pub tokens: TokensConfig,
	#[serde(default)]
	pub delivery: DeliveryConfig,
	#[serde(default)]
	pub gas: GasConfig,
}

impl Config {
	pub fn active_network(&self) -> Option<&NetworkConfig> {
		self.networks.get(&self.network.active)
	}

	/// Native-currency price table with configured overrides applied.
	pub fn price_table(&self) -> FiatPriceTable {
		let defaults = FiatPriceTable::default();
		self.networks
			.iter()
			.filter_map(|(id, network)| network.native_usd_price.map(|usd| (*id, usd)))
			.fold(defaults, |table, (id, usd)| table.with_price(id, usd))
	}

	/// Whether name lookups can be attempted on `network_id`.
	pub fn name_service_available(&self, network_id: NetworkId) -> bool {
		self.name_service.enabled && self.name_service.network_id == network_id
	}
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WalletConfig {
	/// Account implementation name
	#[serde(default = "default_wallet_implementation")]
	pub implementation: String,
	/// Hex-encoded private key, `0x` prefixed
	pub private_key: String,
}

impl WalletConfig {
	/// Table handed to the account factory.
	pub fn as_table(&self) -> toml::Value {
		let mut table = toml::map::Map::new();
		table.insert(
			"private_key".to_string(),
			toml::Value::String(self.private_key.clone()),
		);
		toml::Value::Table(table)
	}
}

fn default_wallet_implementation() -> String {
	"local".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NetworkSelection {
	/// Chain id of the network transfers are sent on
	pub active: NetworkId,
}

/// Network-specific configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NetworkConfig {
	/// Network name for display and logging
	pub name: String,
	/// RPC endpoint URL
	pub rpc_url: String,
	#[serde(default = "default_native_symbol")]
	pub native_symbol: String,
	/// USD per whole native unit; falls back to the built-in table
	#[serde(default)]
	pub native_usd_price: Option<f64>,
	/// Block explorer base URL, used to print transaction links
	#[serde(default)]
	pub explorer_url: Option<String>,
}

impl NetworkConfig {
	pub fn tx_url(&self, tx_hash: &str) -> Option<String> {
		self.explorer_url
			.as_ref()
			.map(|base| format!("{}/tx/{}", base.trim_end_matches('/'), tx_hash))
	}
}

fn default_native_symbol() -> String {
	"ETH".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NameServiceConfig {
	#[serde(default = "default_true")]
	pub enabled: bool,
	/// The only network lookups are attempted on
	#[serde(default = "default_name_service_network")]
	pub network_id: NetworkId,
	/// Registry contract address; the ENS registry when absent
	#[serde(default)]
	pub registry: Option<String>,
}

impl Default for NameServiceConfig {
	fn default() -> Self {
		Self {
			enabled: true,
			network_id: ETHEREUM_MAINNET,
			registry: None,
		}
	}
}

fn default_true() -> bool {
	true
}

fn default_name_service_network() -> NetworkId {
	ETHEREUM_MAINNET
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TokensConfig {
	#[serde(default = "default_tokens_implementation")]
	pub implementation: String,
	/// Implementation-specific table, validated by its schema
	#[serde(default = "empty_table")]
	pub config: toml::Value,
}

fn default_tokens_implementation() -> String {
	"http_indexer".to_string()
}

fn empty_table() -> toml::Value {
	toml::Value::Table(toml::map::Map::new())
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeliveryConfig {
	/// Blocks to wait after inclusion
	#[serde(default = "default_confirmations")]
	pub confirmations: u64,
	/// Upper bound on waiting for a receipt
	#[serde(default = "default_confirmation_timeout")]
	pub confirmation_timeout_secs: u64,
	#[serde(default = "default_poll_interval")]
	pub poll_interval_ms: u64,
}

impl Default for DeliveryConfig {
	fn default() -> Self {
		Self {
			confirmations: default_confirmations(),
			confirmation_timeout_secs: default_confirmation_timeout(),
			poll_interval_ms: default_poll_interval(),
		}
	}
}

fn default_confirmations() -> u64 {
	1
}

fn default_confirmation_timeout() -> u64 {
	300
}

fn default_poll_interval() -> u64 {
	1000
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GasConfig {
	/// Gas units assumed for a transfer whose estimate failed
	#[serde(default = "default_fallback_units")]
	pub fallback_units: u64,
	/// Gas is flagged as expensive above this share of the moved value
	#[serde(default = "default_expensive_ratio")]
	pub expensive_ratio: f64,
}

impl Default for GasConfig {
	fn default() -> Self {
		Self {
			fallback_units: default_fallback_units(),
			expensive_ratio: default_expensive_ratio(),
		}
	}
}

fn default_fallback_units() -> u64 {
	65_000
}

fn default_expensive_ratio() -> f64 {
	0.1
}
