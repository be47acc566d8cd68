//! Token balance types returned by the indexing API.

use crate::{Address, U256};
use alloy::primitives::utils::format_units;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

/// An ERC-20 balance held by the connected wallet, with its fiat quote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenBalance {
	#[serde(rename = "contract_address")]
	pub address: Address,
	#[serde(
		rename = "contract_ticker_symbol",
		default,
		deserialize_with = "null_as_default"
	)]
	pub symbol: String,
	#[serde(
		rename = "contract_decimals",
		default,
		deserialize_with = "null_as_default"
	)]
	pub decimals: u8,
	/// Raw balance in the token's smallest unit, as a decimal string.
	#[serde(default, deserialize_with = "null_as_default")]
	pub balance: String,
	/// Fiat value of the whole balance, in USD. Unpriced tokens carry zero.
	#[serde(default, deserialize_with = "null_as_default")]
	pub quote: f64,
	/// USD price of one whole token.
	#[serde(default)]
	pub quote_rate: Option<f64>,
	#[serde(rename = "type", default)]
	pub token_type: Option<String>,
	#[serde(default)]
	pub logo_url: Option<String>,
}

/// Reads an explicit `null` as the field's default value.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
	D: Deserializer<'de>,
	T: Default + Deserialize<'de>,
{
	Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

impl TokenBalance {
	/// Raw balance as an integer; unparseable balances count as zero.
	pub fn balance_raw(&self) -> U256 {
		self.balance.trim().parse::<U256>().unwrap_or(U256::ZERO)
	}

	pub fn has_balance(&self) -> bool {
		!self.balance_raw().is_zero()
	}

	pub fn is_stablecoin(&self) -> bool {
		self.token_type.as_deref() == Some("stablecoin")
	}

	/// Case-insensitive match on symbol or contract address.
	pub fn matches_search(&self, query: &str) -> bool {
		let query = query.to_lowercase();
		self.symbol.to_lowercase().contains(&query)
			|| self.address.to_string().to_lowercase().contains(&query)
	}

	/// Human readable balance.
	///
	/// Derived from the quote when a rate is known, rounded to 10 decimals
	/// for dust, 2 decimals above 1000 and 5 decimals otherwise.
	pub fn display_balance(&self) -> String {
		let from_quote = self
			.quote_rate
			.filter(|rate| *rate > 0.0)
			.and_then(|rate| Decimal::from_f64(self.quote / rate));

		match from_quote {
			Some(amount) => {
				let dp = if amount < Decimal::new(1, 3) {
					10
				} else if amount > Decimal::from(1000) {
					2
				} else {
					5
				};
				amount.round_dp(dp).normalize().to_string()
			}
			None => format_units(self.balance_raw(), self.decimals)
				.unwrap_or_else(|_| self.balance.clone()),
		}
	}
}
