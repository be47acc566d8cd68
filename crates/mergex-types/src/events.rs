use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::{BatchSummary, GasEstimate, NetworkId, ProgressEvent, ResolvedDestination};

/// Events published by the merge engine for observers (CLI, logs).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MergeEvent {
	Destination(DestinationEvent),
	Estimate(EstimateEvent),
	Batch(BatchEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DestinationEvent {
	Resolved {
		input: String,
		destination: ResolvedDestination,
	},
	Rejected {
		input: String,
		reason: String,
	},
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EstimateEvent {
	/// A fresh estimate replaced the previous one.
	Updated {
		network_id: NetworkId,
		estimate: GasEstimate,
	},
	/// An estimate finished after a newer request was issued and was dropped.
	Discarded { generation: u64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BatchEvent {
	Started {
		run_id: Uuid,
		network_id: NetworkId,
		intents: usize,
	},
	Progress {
		run_id: Uuid,
		event: ProgressEvent,
	},
	Completed {
		run_id: Uuid,
		summary: BatchSummary,
	},
}

pub struct EventBus {
	sender: broadcast::Sender<MergeEvent>,
}

impl EventBus {
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	pub fn subscribe(&self) -> broadcast::Receiver<MergeEvent> {
		self.sender.subscribe()
	}

	pub fn publish(
		&self,
		event: MergeEvent,
	) -> Result<(), broadcast::error::SendError<MergeEvent>> {
		self.sender.send(event)?;
		Ok(())
	}
}

impl Clone for EventBus {
	fn clone(&self) -> Self {
		Self {
			sender: self.sender.clone(),
		}
	}
}
