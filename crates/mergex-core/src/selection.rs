//! The wallet's token list and the user's current selection.

use mergex_types::{Address, BatchSummary, ProgressEvent, TokenBalance, TransferIntent, TransferOutcome};
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectionError {
	#[error("Token {0} is not in the wallet's token list")]
	UnknownToken(Address),
}

/// Narrows the token list shown to the user.
#[derive(Debug, Clone, Default)]
pub struct TokenFilter {
	/// Case-insensitive symbol or address fragment.
	pub search: Option<String>,
	pub hide_zero_balance: bool,
	pub stables_only: bool,
}

impl TokenFilter {
	pub fn matches(&self, token: &TokenBalance) -> bool {
		if self.hide_zero_balance && !token.has_balance() {
			return false;
		}
		if self.stables_only && !token.is_stablecoin() {
			return false;
		}
		match self.search.as_deref().map(str::trim) {
			Some(query) if !query.is_empty() => token.matches_search(query),
			_ => true,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PortfolioStats {
	pub total_value_usd: f64,
	pub token_count: usize,
}

/// Owned container for the token list and the ordered selection.
///
/// Intents handed to the orchestrator are always a [`snapshot`](Self::snapshot),
/// never a live view of this state.
#[derive(Debug, Default)]
pub struct SelectionState {
	tokens: Vec<TokenBalance>,
	selected: Vec<Address>,
	pending: HashSet<Address>,
}

impl SelectionState {
	pub fn new() -> Self {
		Self::default()
	}

	/// Installs the token list of a (re)connected wallet and clears the selection.
	pub fn replace_tokens(&mut self, tokens: Vec<TokenBalance>) {
		self.tokens = tokens;
		self.selected.clear();
		self.pending.clear();
	}

	pub fn tokens(&self) -> &[TokenBalance] {
		&self.tokens
	}

	pub fn token(&self, address: &Address) -> Option<&TokenBalance> {
		self.tokens.iter().find(|t| &t.address == address)
	}

	pub fn is_selected(&self, address: &Address) -> bool {
		self.selected.contains(address)
	}

	pub fn is_pending(&self, address: &Address) -> bool {
		self.pending.contains(address)
	}

	/// Flips the selection of `address` and returns whether it is now selected.
	///
	/// Tokens with a transaction in flight keep their current state.
	pub fn toggle(&mut self, address: Address) -> Result<bool, SelectionError> {
		if self.token(&address).is_none() {
			return Err(SelectionError::UnknownToken(address));
		}
		if self.pending.contains(&address) {
			return Ok(self.is_selected(&address));
		}

		if let Some(position) = self.selected.iter().position(|a| a == &address) {
			self.selected.remove(position);
			Ok(false)
		} else {
			self.selected.push(address);
			Ok(true)
		}
	}

	pub fn filtered(&self, filter: &TokenFilter) -> Vec<&TokenBalance> {
		self.tokens.iter().filter(|t| filter.matches(t)).collect()
	}

	/// Adds every token matching `filter` to the selection.
	///
	/// Returns how many tokens were newly selected.
	pub fn select_all(&mut self, filter: &TokenFilter) -> usize {
		let additions: Vec<Address> = self
			.tokens
			.iter()
			.filter(|t| filter.matches(t) && !self.selected.contains(&t.address))
			.map(|t| t.address)
			.collect();
		let count = additions.len();
		self.selected.extend(additions);
		count
	}

	pub fn unselect_all(&mut self) {
		self.selected.clear();
	}

	pub fn selected_tokens(&self) -> Vec<&TokenBalance> {
		self.selected
			.iter()
			.filter_map(|address| self.token(address))
			.collect()
	}

	/// Intents for every selected token, in selection order, each moving
	/// the full balance.
	pub fn snapshot(&self) -> Vec<TransferIntent> {
		self.selected_tokens()
			.into_iter()
			.map(|token| TransferIntent {
				token: token.address,
				amount: token.balance_raw(),
				symbol: token.symbol.clone(),
				quote_usd: token.quote,
			})
			.collect()
	}

	pub fn portfolio(&self) -> PortfolioStats {
		PortfolioStats {
			total_value_usd: self.tokens.iter().map(|t| t.quote).sum(),
			token_count: self.tokens.len(),
		}
	}

	pub fn selected_value(&self) -> f64 {
		self.selected_tokens().iter().map(|t| t.quote).sum()
	}

	/// Tracks which tokens have a transaction in flight.
	pub fn observe(&mut self, event: &ProgressEvent) {
		match event {
			ProgressEvent::Transfer { token, outcome, .. } => match outcome {
				TransferOutcome::Pending { .. } => {
					self.pending.insert(*token);
				}
				_ => {
					self.pending.remove(token);
				}
			},
			ProgressEvent::Completed(_) => self.pending.clear(),
		}
	}

	/// Clears the selection if the batch moved at least one token.
	pub fn clear_after(&mut self, summary: &BatchSummary) -> bool {
		if !summary.should_clear_selection() {
			return false;
		}
		self.selected.clear();
		true
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use mergex_types::U256;

	fn token(byte: u8, symbol: &str, balance: &str, quote: f64) -> TokenBalance {
		TokenBalance {
			address: Address::repeat_byte(byte),
			symbol: symbol.to_string(),
			decimals: 18,
			balance: balance.to_string(),
			quote,
			quote_rate: None,
			token_type: None,
			logo_url: None,
		}
	}

	fn state() -> SelectionState {
		let mut usdc = token(1, "USDC", "5000000", 5.0);
		usdc.decimals = 6;
		usdc.token_type = Some("stablecoin".to_string());

		let mut state = SelectionState::new();
		state.replace_tokens(vec![
			usdc,
			token(2, "WETH", "1000000000000000000", 2000.0),
			token(3, "DUST", "0", 0.0),
		]);
		state
	}

	#[test]
	fn test_toggle_and_snapshot_order() {
		let mut state = state();
		let weth = Address::repeat_byte(2);
		let usdc = Address::repeat_byte(1);

		assert_eq!(state.toggle(weth), Ok(true));
		assert_eq!(state.toggle(usdc), Ok(true));

		let intents = state.snapshot();
		assert_eq!(intents.len(), 2);
		assert_eq!(intents[0].symbol, "WETH");
		assert_eq!(intents[0].amount, U256::from(1_000_000_000_000_000_000u64));
		assert_eq!(intents[1].symbol, "USDC");
		assert_eq!(state.selected_value(), 2005.0);

		assert_eq!(state.toggle(weth), Ok(false));
		assert_eq!(state.snapshot().len(), 1);
	}

	#[test]
	fn test_snapshot_is_detached() {
		let mut state = state();
		state.toggle(Address::repeat_byte(1)).unwrap();
		let intents = state.snapshot();

		state.unselect_all();
		assert_eq!(intents.len(), 1);
		assert!(state.snapshot().is_empty());
	}

	#[test]
	fn test_unknown_token_rejected() {
		let mut state = state();
		let stranger = Address::repeat_byte(9);
		assert_eq!(
			state.toggle(stranger),
			Err(SelectionError::UnknownToken(stranger))
		);
	}

	#[test]
	fn test_toggle_ignored_while_pending() {
		let mut state = state();
		let usdc = Address::repeat_byte(1);
		state.toggle(usdc).unwrap();

		state.observe(&ProgressEvent::Transfer {
			index: 0,
			token: usdc,
			symbol: "USDC".to_string(),
			outcome: TransferOutcome::Pending { tx_hash: None },
		});
		assert!(state.is_pending(&usdc));
		assert_eq!(state.toggle(usdc), Ok(true));
		assert!(state.is_selected(&usdc));

		state.observe(&ProgressEvent::Completed(BatchSummary {
			total: 1,
			confirmed: 0,
			failed: 1,
		}));
		assert_eq!(state.toggle(usdc), Ok(false));
	}

	#[test]
	fn test_filters_and_select_all() {
		let mut state = state();
		let visible = TokenFilter {
			hide_zero_balance: true,
			..Default::default()
		};
		assert_eq!(state.filtered(&visible).len(), 2);

		let stables = TokenFilter {
			stables_only: true,
			..Default::default()
		};
		assert_eq!(state.filtered(&stables).len(), 1);

		let search = TokenFilter {
			search: Some("weTH".to_string()),
			..Default::default()
		};
		assert_eq!(state.filtered(&search)[0].symbol, "WETH");

		state.toggle(Address::repeat_byte(2)).unwrap();
		assert_eq!(state.select_all(&visible), 1);
		assert_eq!(state.selected_tokens().len(), 2);
		assert_eq!(state.snapshot()[0].symbol, "WETH");

		state.unselect_all();
		assert_eq!(state.select_all(&TokenFilter::default()), 3);
	}

	#[test]
	fn test_portfolio() {
		let stats = state().portfolio();
		assert_eq!(stats.token_count, 3);
		assert_eq!(stats.total_value_usd, 2005.0);
	}

	#[test]
	fn test_clear_after_requires_a_confirmation() {
		let mut state = state();
		state.toggle(Address::repeat_byte(1)).unwrap();

		let none_moved = BatchSummary {
			total: 1,
			confirmed: 0,
			failed: 1,
		};
		assert!(!state.clear_after(&none_moved));
		assert_eq!(state.snapshot().len(), 1);

		let some_moved = BatchSummary {
			total: 1,
			confirmed: 1,
			failed: 0,
		};
		assert!(state.clear_after(&some_moved));
		assert!(state.snapshot().is_empty());
	}

	#[test]
	fn test_replace_tokens_clears_selection() {
		let mut state = state();
		state.toggle(Address::repeat_byte(1)).unwrap();
		state.replace_tokens(vec![token(4, "DAI", "1", 1.0)]);
		assert!(state.selected_tokens().is_empty());
		assert_eq!(state.tokens().len(), 1);
	}
}
