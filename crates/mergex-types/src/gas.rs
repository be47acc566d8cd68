//! Gas estimate types.

use serde::{Deserialize, Serialize};

/// Lifecycle of a gas estimate as seen by the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EstimateState {
	Loading,
	Ready,
	Failed(String),
}

/// Aggregate gas-cost estimate for a list of transfer intents.
///
/// A new estimate always replaces the previous one as a whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GasEstimate {
	/// Gas units per intent, in intent order.
	pub per_intent_gas: Vec<u64>,
	pub total_gas: u64,
	/// Gas price used for the estimate, in wei per gas unit.
	pub gas_price: u128,
	/// Total cost in whole native units, as a decimal string.
	pub total_cost_native: String,
	pub total_cost_usd: f64,
	pub state: EstimateState,
}

impl GasEstimate {
	pub fn loading() -> Self {
		Self::zeroed(EstimateState::Loading)
	}

	/// A failed estimate never carries a cost; callers render the failure instead.
	pub fn failed(reason: impl Into<String>) -> Self {
		Self::zeroed(EstimateState::Failed(reason.into()))
	}

	fn zeroed(state: EstimateState) -> Self {
		Self {
			per_intent_gas: Vec::new(),
			total_gas: 0,
			gas_price: 0,
			total_cost_native: "0".to_string(),
			total_cost_usd: 0.0,
			state,
		}
	}

	pub fn is_ready(&self) -> bool {
		self.state == EstimateState::Ready
	}

	/// Share of `total_value_usd` eaten by gas, in percent.
	pub fn cost_share_percent(&self, total_value_usd: f64) -> Option<f64> {
		if !self.is_ready() || total_value_usd <= 0.0 {
			return None;
		}
		Some(self.total_cost_usd / total_value_usd * 100.0)
	}

	/// Whether gas costs more than `ratio` of the value being moved.
	///
	/// Only a ready estimate can be expensive.
	pub fn is_expensive(&self, total_value_usd: f64, ratio: f64) -> bool {
		self.is_ready() && self.total_cost_usd > total_value_usd * ratio
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn ready(cost_usd: f64) -> GasEstimate {
		GasEstimate {
			per_intent_gas: vec![65_000],
			total_gas: 65_000,
			gas_price: 1,
			total_cost_native: "0.000000000000065".to_string(),
			total_cost_usd: cost_usd,
			state: EstimateState::Ready,
		}
	}

	#[test]
	fn test_expensive_flag() {
		assert!(ready(11.0).is_expensive(100.0, 0.1));
		assert!(!ready(10.0).is_expensive(100.0, 0.1));
		assert!(!GasEstimate::failed("rpc down").is_expensive(0.0, 0.1));
		assert!(!GasEstimate::loading().is_expensive(0.0, 0.1));
	}

	#[test]
	fn test_cost_share() {
		assert_eq!(ready(5.0).cost_share_percent(50.0), Some(10.0));
		assert_eq!(ready(5.0).cost_share_percent(0.0), None);
		assert_eq!(GasEstimate::failed("x").cost_share_percent(50.0), None);
	}
}
