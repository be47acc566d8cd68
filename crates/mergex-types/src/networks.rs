//! Network identifiers and the static native-currency price table.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// EVM chain id.
pub type NetworkId = u64;

/// Network on which name-service lookups are available.
pub const ETHEREUM_MAINNET: NetworkId = 1;

/// Display name for well-known chains.
pub fn network_name(network_id: NetworkId) -> String {
	match network_id {
		1 => "Ethereum".to_string(),
		10 => "Optimism".to_string(),
		56 => "BSC".to_string(),
		100 => "Gnosis".to_string(),
		137 => "Polygon".to_string(),
		250 => "Fantom".to_string(),
		8453 => "Base".to_string(),
		42161 => "Arbitrum".to_string(),
		43114 => "Avalanche".to_string(),
		other => format!("Chain {}", other),
	}
}

/// Approximate native-currency prices in USD, per network.
///
/// This is a fixed table, refreshed only through configuration. It is a
/// rough approximation and not a price oracle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FiatPriceTable {
	prices: HashMap<NetworkId, f64>,
	default_price: f64,
}

impl FiatPriceTable {
	pub fn new(prices: HashMap<NetworkId, f64>, default_price: f64) -> Self {
		Self {
			prices,
			default_price,
		}
	}

	pub fn with_price(mut self, network_id: NetworkId, usd: f64) -> Self {
		self.prices.insert(network_id, usd);
		self
	}

	/// USD per whole native unit on `network_id`.
	pub fn native_usd(&self, network_id: NetworkId) -> f64 {
		self.prices
			.get(&network_id)
			.copied()
			.unwrap_or(self.default_price)
	}
}

impl Default for FiatPriceTable {
	fn default() -> Self {
		let prices = HashMap::from([(1, 2000.0), (137, 0.7), (8453, 0.0003)]);
		Self::new(prices, 0.5)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_default_price_table() {
		let table = FiatPriceTable::default();
		assert_eq!(table.native_usd(1), 2000.0);
		assert_eq!(table.native_usd(137), 0.7);
		assert_eq!(table.native_usd(8453), 0.0003);
		assert_eq!(table.native_usd(42161), 0.5);
	}

	#[test]
	fn test_price_override() {
		let table = FiatPriceTable::default().with_price(42161, 3000.0);
		assert_eq!(table.native_usd(42161), 3000.0);
	}

	#[test]
	fn test_network_name() {
		assert_eq!(network_name(8453), "Base");
		assert_eq!(network_name(31337), "Chain 31337");
	}
}
