//! Sequential batch transfer orchestration.
//!
//! The orchestrator drives a [`BatchRun`] from `Preview` through `Sending`
//! to `Completed`, one intent at a time. Each intent gets exactly one
//! attempt: simulate, submit, wait for the receipt. A failure is recorded
//! against that token and the batch moves on. Progress is exposed as a
//! stream that holds the run mutably borrowed until it finishes.

use async_stream::stream;
use futures::{pin_mut, Stream, StreamExt};
use mergex_delivery::DeliveryService;
use mergex_types::{
	truncate_hash, BatchError, BatchEvent, BatchRun, BatchStatus, BatchSummary, EventBus,
	MergeEvent, NetworkId, ProgressEvent, TransferFailure, TransferIntent, TransferOutcome,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OrchestratorError {
	#[error("Batch has already completed")]
	AlreadyCompleted,
	#[error("Batch is already sending")]
	AlreadyRunning,
	#[error("Batch has no transfer intents")]
	EmptyBatch,
	#[error("No signer available for network {0}")]
	SignerUnavailable(NetworkId),
	#[error("Batch error: {0}")]
	Batch(#[from] BatchError),
	#[error("Batch ended without a summary")]
	Incomplete,
}

pub struct TransferOrchestrator {
	delivery: Arc<DeliveryService>,
	event_bus: Option<EventBus>,
}

impl TransferOrchestrator {
	pub fn new(delivery: Arc<DeliveryService>) -> Self {
		Self {
			delivery,
			event_bus: None,
		}
	}

	pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
		self.event_bus = Some(event_bus);
		self
	}

	/// Checks every precondition, moves `run` to `Sending` and returns the
	/// progress stream.
	///
	/// On error the run is left untouched. The stream must be polled to
	/// completion for the run to reach `Completed`.
	pub fn start<'a>(
		&'a self,
		run: &'a mut BatchRun,
	) -> Result<impl Stream<Item = ProgressEvent> + Send + 'a, OrchestratorError> {
		match run.status() {
			BatchStatus::Completed => return Err(OrchestratorError::AlreadyCompleted),
			BatchStatus::Sending => return Err(OrchestratorError::AlreadyRunning),
			BatchStatus::Preview => {}
		}
		if run.intents().is_empty() {
			return Err(OrchestratorError::EmptyBatch);
		}
		let delivery = self
			.delivery
			.for_network(run.network_id())
			.map_err(|_| OrchestratorError::SignerUnavailable(run.network_id()))?;

		run.begin_sending()?;
		info!(
			run_id = %run.id(),
			network = run.network_id(),
			intents = run.intents().len(),
			destination = %run.destination(),
			"Batch sending started"
		);
		self.publish(BatchEvent::Started {
			run_id: run.id(),
			network_id: run.network_id(),
			intents: run.intents().len(),
		});

		let to = run.destination().address;

		Ok(stream! {
			while let Some(intent) = run.current_intent().cloned() {
				let index = run.current_index();
				yield self.record(run, index, &intent, TransferOutcome::Pending { tx_hash: None });

				let outcome = match delivery.simulate_transfer(&intent, to).await {
					Err(e) => TransferOutcome::Failed(TransferFailure::Simulation(e.to_string())),
					Ok(()) => match delivery.submit_transfer(&intent, to).await {
						Err(e) => TransferOutcome::Failed(TransferFailure::Submission(e.to_string())),
						Ok(hash) => {
							yield self.record(
								run,
								index,
								&intent,
								TransferOutcome::Pending { tx_hash: Some(hash.clone()) },
							);
							match delivery.wait_for_confirmation(&hash).await {
								Ok(receipt) if receipt.success => TransferOutcome::Confirmed(hash),
								Ok(_) => TransferOutcome::Failed(TransferFailure::Reverted),
								Err(e) => TransferOutcome::Failed(TransferFailure::Confirmation(e.to_string())),
							}
						}
					},
				};

				match &outcome {
					TransferOutcome::Confirmed(hash) => info!(
						token = %intent.symbol,
						tx_hash = %truncate_hash(&hash.to_string()),
						"Transfer confirmed"
					),
					TransferOutcome::Failed(reason) => warn!(
						token = %intent.symbol,
						reason = %reason,
						"Transfer failed"
					),
					TransferOutcome::Pending { .. } => {}
				}
				yield self.record(run, index, &intent, outcome);

				if let Err(e) = run.advance() {
					error!(run_id = %run.id(), error = %e, "Could not advance batch");
					break;
				}
			}

			match run.complete() {
				Ok(summary) => {
					info!(run_id = %run.id(), %summary, "Batch completed");
					self.publish(BatchEvent::Completed { run_id: run.id(), summary });
					yield ProgressEvent::Completed(summary);
				}
				Err(e) => error!(run_id = %run.id(), error = %e, "Could not complete batch"),
			}
		})
	}

	/// Drives the run to completion, discarding intermediate progress.
	pub async fn run_to_completion(
		&self,
		run: &mut BatchRun,
	) -> Result<BatchSummary, OrchestratorError> {
		let progress = self.start(run)?;
		pin_mut!(progress);

		let mut summary = None;
		while let Some(event) = progress.next().await {
			if let ProgressEvent::Completed(done) = event {
				summary = Some(done);
			}
		}
		summary.ok_or(OrchestratorError::Incomplete)
	}

	fn record(
		&self,
		run: &mut BatchRun,
		index: usize,
		intent: &TransferIntent,
		outcome: TransferOutcome,
	) -> ProgressEvent {
		if let Err(e) = run.record(outcome.clone()) {
			error!(run_id = %run.id(), token = %intent.token, error = %e, "Could not record outcome");
		}

		let event = ProgressEvent::Transfer {
			index,
			token: intent.token,
			symbol: intent.symbol.clone(),
			outcome,
		};
		self.publish(BatchEvent::Progress {
			run_id: run.id(),
			event: event.clone(),
		});
		event
	}

	fn publish(&self, event: BatchEvent) {
		if let Some(bus) = &self.event_bus {
			bus.publish(MergeEvent::Batch(event)).ok();
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::{hash_for, intent, MockDelivery};
	use mergex_types::{Address, ResolvedDestination};

	fn run_on(network_id: NetworkId, bytes: &[u8]) -> BatchRun {
		let intents = bytes.iter().map(|b| intent(*b, 10.0)).collect();
		BatchRun::new(
			network_id,
			ResolvedDestination::new(Address::repeat_byte(0xdd)),
			intents,
		)
		.unwrap()
	}

	async fn collect(orchestrator: &TransferOrchestrator, run: &mut BatchRun) -> Vec<ProgressEvent> {
		let progress = orchestrator.start(run).unwrap();
		progress.collect().await
	}

	#[tokio::test]
	async fn test_mixed_outcomes() {
		let mut delivery = MockDelivery::on(1);
		delivery.fail_simulation.insert(Address::repeat_byte(1));
		let (_, service) = delivery.into_service();
		let orchestrator = TransferOrchestrator::new(service);

		let mut run = run_on(1, &[1, 2]);
		let events = collect(&orchestrator, &mut run).await;

		let a = Address::repeat_byte(1);
		let b = Address::repeat_byte(2);
		assert!(matches!(
			run.outcome(&a),
			Some(TransferOutcome::Failed(TransferFailure::Simulation(_)))
		));
		assert_eq!(run.outcome(&b), Some(&TransferOutcome::Confirmed(hash_for(b))));
		assert_eq!(
			events.last(),
			Some(&ProgressEvent::Completed(BatchSummary {
				total: 2,
				confirmed: 1,
				failed: 1
			}))
		);
		assert_eq!(run.status(), BatchStatus::Completed);
	}

	#[tokio::test]
	async fn test_forced_failures_and_contiguous_indices() {
		let bytes = [1u8, 2, 3, 4, 5, 6];
		let mut delivery = MockDelivery::on(1);
		delivery.fail_simulation.insert(Address::repeat_byte(2));
		delivery.fail_submission.insert(Address::repeat_byte(4));
		delivery.fail_confirmation.insert(Address::repeat_byte(5));
		delivery.revert.insert(Address::repeat_byte(6));
		let (_, service) = delivery.into_service();
		let orchestrator = TransferOrchestrator::new(service);

		let mut run = run_on(1, &bytes);
		let events = collect(&orchestrator, &mut run).await;

		assert_eq!(run.outcomes().len(), bytes.len());
		assert_eq!(run.current_index(), bytes.len());
		let summary = run.summary();
		assert_eq!(summary.failed, 4);
		assert_eq!(summary.confirmed, 2);
		assert!(matches!(
			run.outcome(&Address::repeat_byte(6)),
			Some(TransferOutcome::Failed(TransferFailure::Reverted))
		));
		assert!(matches!(
			run.outcome(&Address::repeat_byte(5)),
			Some(TransferOutcome::Failed(TransferFailure::Confirmation(_)))
		));

		let mut indices: Vec<usize> = events.iter().filter_map(|e| e.index()).collect();
		assert!(indices.windows(2).all(|w| w[0] <= w[1]));
		indices.dedup();
		assert_eq!(indices, (0..bytes.len()).collect::<Vec<_>>());
	}

	#[tokio::test]
	async fn test_event_sequence_for_one_transfer() {
		let (_, service) = MockDelivery::on(1).into_service();
		let orchestrator = TransferOrchestrator::new(service);
		let token = Address::repeat_byte(7);

		let mut run = run_on(1, &[7]);
		let events = collect(&orchestrator, &mut run).await;

		let outcomes: Vec<TransferOutcome> = events
			.iter()
			.filter_map(|e| match e {
				ProgressEvent::Transfer { outcome, .. } => Some(outcome.clone()),
				ProgressEvent::Completed(_) => None,
			})
			.collect();
		assert_eq!(
			outcomes,
			vec![
				TransferOutcome::Pending { tx_hash: None },
				TransferOutcome::Pending {
					tx_hash: Some(hash_for(token))
				},
				TransferOutcome::Confirmed(hash_for(token)),
			]
		);
	}

	#[tokio::test]
	async fn test_strictly_sequential() {
		let (mock, service) = MockDelivery::on(1).into_service();
		let orchestrator = TransferOrchestrator::new(service);

		let mut run = run_on(1, &[1, 2]);
		orchestrator.run_to_completion(&mut run).await.unwrap();

		let a = Address::repeat_byte(1);
		let b = Address::repeat_byte(2);
		assert_eq!(
			mock.calls(),
			vec![
				format!("simulate:{}", a),
				format!("submit:{}", a),
				format!("confirm:{}", a),
				format!("simulate:{}", b),
				format!("submit:{}", b),
				format!("confirm:{}", b),
			]
		);
	}

	#[tokio::test]
	async fn test_second_start_on_completed_run() {
		let (mock, service) = MockDelivery::on(1).into_service();
		let orchestrator = TransferOrchestrator::new(service);

		let mut run = run_on(1, &[1, 2]);
		orchestrator.run_to_completion(&mut run).await.unwrap();
		assert_eq!(mock.submissions(), 2);

		assert_eq!(
			orchestrator.start(&mut run).err(),
			Some(OrchestratorError::AlreadyCompleted)
		);
		assert_eq!(mock.submissions(), 2);
	}

	#[tokio::test]
	async fn test_preconditions_leave_run_in_preview() {
		let (mock, service) = MockDelivery::on(1).into_service();
		let orchestrator = TransferOrchestrator::new(service);

		let mut empty = run_on(1, &[]);
		assert_eq!(
			orchestrator.start(&mut empty).err(),
			Some(OrchestratorError::EmptyBatch)
		);
		assert_eq!(empty.status(), BatchStatus::Preview);

		let mut elsewhere = run_on(137, &[1]);
		assert_eq!(
			orchestrator.start(&mut elsewhere).err(),
			Some(OrchestratorError::SignerUnavailable(137))
		);
		assert_eq!(elsewhere.status(), BatchStatus::Preview);
		assert!(mock.calls().is_empty());
	}

	#[tokio::test]
	async fn test_already_running() {
		let (_, service) = MockDelivery::on(1).into_service();
		let orchestrator = TransferOrchestrator::new(service);

		let mut run = run_on(1, &[1]);
		run.begin_sending().unwrap();
		assert_eq!(
			orchestrator.start(&mut run).err(),
			Some(OrchestratorError::AlreadyRunning)
		);
	}

	#[tokio::test]
	async fn test_events_published_on_bus() {
		let bus = EventBus::new(64);
		let mut rx = bus.subscribe();
		let (_, service) = MockDelivery::on(1).into_service();
		let orchestrator = TransferOrchestrator::new(service).with_event_bus(bus);

		let mut run = run_on(1, &[1]);
		let summary = orchestrator.run_to_completion(&mut run).await.unwrap();
		assert_eq!(summary.confirmed, 1);

		let mut seen = Vec::new();
		while let Ok(event) = rx.try_recv() {
			seen.push(event);
		}
		assert!(matches!(
			seen.first(),
			Some(MergeEvent::Batch(BatchEvent::Started { intents: 1, .. }))
		));
		assert!(matches!(
			seen.last(),
			Some(MergeEvent::Batch(BatchEvent::Completed { .. }))
		));
	}
}
