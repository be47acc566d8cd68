//! Transfer and batch-run types.
//!
//! A [`BatchRun`] is the unit of work handed to the transfer orchestrator. It
//! owns an immutable, ordered list of [`TransferIntent`]s captured when the
//! user confirmed the transfer, the [`ResolvedDestination`] they are sent to,
//! and the per-token outcomes recorded while the batch is being sent.

use crate::{with_0x_prefix, Address, NetworkId, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// An unexecuted request to transfer a token amount to the batch destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferIntent {
	/// ERC-20 contract address of the token.
	pub token: Address,
	/// Amount in the token's smallest unit.
	pub amount: U256,
	/// Ticker symbol shown to the user.
	pub symbol: String,
	/// Quoted fiat value of `amount`, in USD.
	pub quote_usd: f64,
}

/// A destination that passed resolution.
///
/// The address is always a valid 20-byte account; `display_name` is only set
/// when a name-service lookup produced one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedDestination {
	pub address: Address,
	pub display_name: Option<String>,
}

impl ResolvedDestination {
	pub fn new(address: Address) -> Self {
		Self {
			address,
			display_name: None,
		}
	}

	pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
		self.display_name = Some(name.into());
		self
	}
}

impl fmt::Display for ResolvedDestination {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match &self.display_name {
			Some(name) => write!(f, "{} ({})", name, self.address),
			None => write!(f, "{}", self.address),
		}
	}
}

/// Blockchain transaction hash representation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionHash(pub Vec<u8>);

impl fmt::Display for TransactionHash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", with_0x_prefix(&hex::encode(&self.0)))
	}
}

impl From<alloy::primitives::B256> for TransactionHash {
	fn from(hash: alloy::primitives::B256) -> Self {
		TransactionHash(hash.0.to_vec())
	}
}

/// Why a single transfer did not go through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum TransferFailure {
	/// The pre-flight simulation rejected the transfer.
	#[error("simulation rejected: {0}")]
	Simulation(String),
	/// The signed transaction could not be submitted.
	#[error("submission failed: {0}")]
	Submission(String),
	/// Waiting for the transaction to be confirmed failed or timed out.
	#[error("confirmation failed: {0}")]
	Confirmation(String),
	/// The transaction was mined but reverted.
	#[error("transaction reverted")]
	Reverted,
}

/// Outcome recorded for an attempted intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferOutcome {
	/// In flight. `tx_hash` is set once the transaction has been submitted.
	Pending { tx_hash: Option<TransactionHash> },
	Confirmed(TransactionHash),
	Failed(TransferFailure),
}

impl TransferOutcome {
	/// Confirmed and failed outcomes are final and never revisited.
	pub fn is_terminal(&self) -> bool {
		!matches!(self, TransferOutcome::Pending { .. })
	}

	pub fn tx_hash(&self) -> Option<&TransactionHash> {
		match self {
			TransferOutcome::Pending { tx_hash } => tx_hash.as_ref(),
			TransferOutcome::Confirmed(hash) => Some(hash),
			TransferOutcome::Failed(_) => None,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchStatus {
	Preview,
	Sending,
	Completed,
}

impl fmt::Display for BatchStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Preview => write!(f, "Preview"),
			Self::Sending => write!(f, "Sending"),
			Self::Completed => write!(f, "Completed"),
		}
	}
}

/// Errors raised when a batch run is driven out of its state machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
	#[error("Batch has no transfer intents")]
	EmptyBatch,
	#[error("Token {0} appears more than once in the batch")]
	DuplicateIntent(Address),
	#[error("Batch has already completed")]
	AlreadyCompleted,
	#[error("Batch is already sending")]
	AlreadySending,
	#[error("Invalid batch transition from {from} to {to}")]
	InvalidTransition { from: BatchStatus, to: BatchStatus },
	#[error("No intent is in flight")]
	NothingInFlight,
	#[error("Outcome for token {0} is already final")]
	OutcomeFinal(Address),
}

/// Aggregate result of a finished batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
	pub total: usize,
	pub confirmed: usize,
	pub failed: usize,
}

impl BatchSummary {
	/// The selection is cleared only after at least one token actually moved.
	pub fn should_clear_selection(&self) -> bool {
		self.confirmed > 0
	}
}

impl fmt::Display for BatchSummary {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} of {} succeeded", self.confirmed, self.total)?;
		if self.failed > 0 {
			write!(f, ", {} failed", self.failed)?;
		}
		Ok(())
	}
}

/// One batch transfer from preview to completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRun {
	id: Uuid,
	network_id: NetworkId,
	intents: Vec<TransferIntent>,
	destination: ResolvedDestination,
	status: BatchStatus,
	current_index: usize,
	outcomes: HashMap<Address, TransferOutcome>,
	created_at: DateTime<Utc>,
}

impl BatchRun {
	/// Creates a run in the `Preview` state.
	///
	/// Outcomes are keyed by token address, so a token may appear at most once.
	pub fn new(
		network_id: NetworkId,
		destination: ResolvedDestination,
		intents: Vec<TransferIntent>,
	) -> Result<Self, BatchError> {
		let mut seen = HashSet::new();
		for intent in &intents {
			if !seen.insert(intent.token) {
				return Err(BatchError::DuplicateIntent(intent.token));
			}
		}

		Ok(Self {
			id: Uuid::new_v4(),
			network_id,
			intents,
			destination,
			status: BatchStatus::Preview,
			current_index: 0,
			outcomes: HashMap::new(),
			created_at: Utc::now(),
		})
	}

	pub fn id(&self) -> Uuid {
		self.id
	}

	pub fn network_id(&self) -> NetworkId {
		self.network_id
	}

	pub fn intents(&self) -> &[TransferIntent] {
		&self.intents
	}

	pub fn destination(&self) -> &ResolvedDestination {
		&self.destination
	}

	pub fn status(&self) -> BatchStatus {
		self.status
	}

	pub fn current_index(&self) -> usize {
		self.current_index
	}

	pub fn outcomes(&self) -> &HashMap<Address, TransferOutcome> {
		&self.outcomes
	}

	pub fn outcome(&self, token: &Address) -> Option<&TransferOutcome> {
		self.outcomes.get(token)
	}

	pub fn created_at(&self) -> DateTime<Utc> {
		self.created_at
	}

	/// Sum of the quoted values of all intents, in USD.
	pub fn total_quote_usd(&self) -> f64 {
		self.intents.iter().map(|i| i.quote_usd).sum()
	}

	/// The intent at `current_index`, if the batch has not run past the end.
	pub fn current_intent(&self) -> Option<&TransferIntent> {
		self.intents.get(self.current_index)
	}

	/// Moves the run from `Preview` to `Sending`.
	pub fn begin_sending(&mut self) -> Result<(), BatchError> {
		match self.status {
			BatchStatus::Completed => return Err(BatchError::AlreadyCompleted),
			BatchStatus::Sending => return Err(BatchError::AlreadySending),
			BatchStatus::Preview => {}
		}
		if self.intents.is_empty() {
			return Err(BatchError::EmptyBatch);
		}
		self.transition(BatchStatus::Sending)
	}

	/// Records the outcome of the intent currently in flight.
	///
	/// Pending outcomes may be refined (e.g. once a hash is known); terminal
	/// outcomes are never overwritten.
	pub fn record(&mut self, outcome: TransferOutcome) -> Result<(), BatchError> {
		if self.status != BatchStatus::Sending {
			return Err(BatchError::NothingInFlight);
		}
		let token = self
			.current_intent()
			.map(|intent| intent.token)
			.ok_or(BatchError::NothingInFlight)?;

		if let Some(existing) = self.outcomes.get(&token) {
			if existing.is_terminal() {
				return Err(BatchError::OutcomeFinal(token));
			}
		}
		self.outcomes.insert(token, outcome);
		Ok(())
	}

	/// Advances past the current intent once its outcome is final.
	pub fn advance(&mut self) -> Result<(), BatchError> {
		let token = self
			.current_intent()
			.map(|intent| intent.token)
			.ok_or(BatchError::NothingInFlight)?;

		match self.outcomes.get(&token) {
			Some(outcome) if outcome.is_terminal() => {
				self.current_index += 1;
				Ok(())
			}
			_ => Err(BatchError::NothingInFlight),
		}
	}

	/// Moves the run to `Completed` once every intent has been attempted.
	pub fn complete(&mut self) -> Result<BatchSummary, BatchError> {
		if self.current_index < self.intents.len() {
			return Err(BatchError::InvalidTransition {
				from: self.status,
				to: BatchStatus::Completed,
			});
		}
		self.transition(BatchStatus::Completed)?;
		Ok(self.summary())
	}

	pub fn summary(&self) -> BatchSummary {
		let confirmed = self
			.outcomes
			.values()
			.filter(|o| matches!(o, TransferOutcome::Confirmed(_)))
			.count();
		let failed = self
			.outcomes
			.values()
			.filter(|o| matches!(o, TransferOutcome::Failed(_)))
			.count();

		BatchSummary {
			total: self.intents.len(),
			confirmed,
			failed,
		}
	}

	fn transition(&mut self, to: BatchStatus) -> Result<(), BatchError> {
		use BatchStatus::*;

		let valid = matches!((self.status, to), (Preview, Sending) | (Sending, Completed));
		if !valid {
			return Err(BatchError::InvalidTransition {
				from: self.status,
				to,
			});
		}
		self.status = to;
		Ok(())
	}
}

/// Progress reported by the orchestrator while a batch is sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProgressEvent {
	/// The outcome of the intent at `index` changed.
	Transfer {
		index: usize,
		token: Address,
		symbol: String,
		outcome: TransferOutcome,
	},
	/// Every intent has been attempted.
	Completed(BatchSummary),
}

impl ProgressEvent {
	pub fn index(&self) -> Option<usize> {
		match self {
			ProgressEvent::Transfer { index, .. } => Some(*index),
			ProgressEvent::Completed(_) => None,
		}
	}
}
