//! Last-request-wins bookkeeping for re-entrant lookups.
//!
//! Address resolution and gas estimation can be re-triggered while an
//! earlier call is still in flight. Each call takes a generation from the
//! slot before starting; only the result of the newest generation is kept.

use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

pub struct LatestSlot<T> {
	generation: AtomicU64,
	value: RwLock<Option<T>>,
}

impl<T: Clone> LatestSlot<T> {
	pub fn new() -> Self {
		Self {
			generation: AtomicU64::new(0),
			value: RwLock::new(None),
		}
	}

	/// Starts a new request, invalidating every earlier one.
	pub fn begin(&self) -> u64 {
		self.generation.fetch_add(1, Ordering::SeqCst) + 1
	}

	pub fn is_current(&self, generation: u64) -> bool {
		self.generation.load(Ordering::SeqCst) == generation
	}

	/// Stores `value` if `generation` is still the newest request.
	///
	/// Returns `false` and drops the value otherwise.
	pub async fn publish(&self, generation: u64, value: T) -> bool {
		let mut slot = self.value.write().await;
		if !self.is_current(generation) {
			return false;
		}
		*slot = Some(value);
		true
	}

	/// Invalidates in-flight requests and forgets the stored value.
	pub async fn clear(&self) {
		self.begin();
		*self.value.write().await = None;
	}

	pub async fn get(&self) -> Option<T> {
		self.value.read().await.clone()
	}
}

impl<T: Clone> Default for LatestSlot<T> {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_stale_result_is_dropped() {
		let slot = LatestSlot::new();
		let first = slot.begin();
		let second = slot.begin();

		assert!(slot.publish(second, "second").await);
		assert!(!slot.publish(first, "first").await);
		assert_eq!(slot.get().await, Some("second"));
	}

	#[tokio::test]
	async fn test_clear_invalidates_in_flight() {
		let slot = LatestSlot::new();
		let generation = slot.begin();
		slot.clear().await;

		assert!(!slot.is_current(generation));
		assert!(!slot.publish(generation, 1).await);
		assert_eq!(slot.get().await, None);
	}
}
