//! Aggregate gas-cost estimation for a batch preview.

use alloy::primitives::utils::format_ether;
use futures::future::join_all;
use mergex_delivery::DeliveryInterface;
use mergex_types::{
	EstimateState, FiatPriceTable, GasEstimate, ResolvedDestination, TransferIntent, U256,
};
use tracing::{debug, warn};

/// Gas units assumed for an ERC-20 transfer whose estimate failed.
pub const DEFAULT_FALLBACK_GAS: u64 = 65_000;

pub struct GasEstimator {
	fallback_units: u64,
	prices: FiatPriceTable,
}

impl GasEstimator {
	pub fn new(fallback_units: u64, prices: FiatPriceTable) -> Self {
		Self {
			fallback_units,
			prices,
		}
	}

	pub fn fallback_units(&self) -> u64 {
		self.fallback_units
	}

	/// Estimates the cost of sending every intent to `destination`.
	///
	/// Returns `None` when there is nothing to estimate. A failed gas-price
	/// lookup yields a `Failed` estimate; failed per-transfer estimates fall
	/// back to the configured units and never fail the whole estimate.
	pub async fn estimate(
		&self,
		destination: Option<&ResolvedDestination>,
		intents: &[TransferIntent],
		delivery: &dyn DeliveryInterface,
	) -> Option<GasEstimate> {
		let destination = destination?;
		if intents.is_empty() {
			return None;
		}

		let gas_price = match delivery.get_gas_price().await {
			Ok(price) => price,
			Err(e) => {
				warn!(error = %e, "Gas price lookup failed");
				return Some(GasEstimate::failed(e.to_string()));
			}
		};

		let to = destination.address;
		let per_intent_gas: Vec<u64> =
			join_all(intents.iter().map(|intent| delivery.estimate_transfer_gas(intent, to)))
				.await
				.into_iter()
				.zip(intents)
				.map(|(result, intent)| match result {
					Ok(units) => units,
					Err(e) => {
						debug!(token = %intent.symbol, error = %e, "Using fallback gas units");
						self.fallback_units
					}
				})
				.collect();

		let total_gas = per_intent_gas
			.iter()
			.fold(0u64, |acc, units| acc.saturating_add(*units));
		let total_wei = U256::from(total_gas) * U256::from(gas_price);
		let total_cost_native = format_ether(total_wei);
		let native = total_cost_native.parse::<f64>().unwrap_or_default();
		let total_cost_usd = native * self.prices.native_usd(delivery.network_id());

		debug!(total_gas, gas_price, %total_cost_native, total_cost_usd, "Gas estimate ready");

		Some(GasEstimate {
			per_intent_gas,
			total_gas,
			gas_price,
			total_cost_native,
			total_cost_usd,
			state: EstimateState::Ready,
		})
	}
}

impl Default for GasEstimator {
	fn default() -> Self {
		Self::new(DEFAULT_FALLBACK_GAS, FiatPriceTable::default())
	}
}
