//! Sync event bus
//!
//! Observers (the CLI, a UI shell, tests) learn about queue progress, permanent
//! failures, cloud-first rollbacks and replication passes by subscribing here.
//! The engine itself never waits on a subscriber.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tokio::sync::broadcast;
use tracing::debug;

const DEFAULT_CAPACITY: usize = 1_024;

#[derive(Debug, Clone)]
pub struct SyncEventBus {
	sender: broadcast::Sender<SyncEvent>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SyncDirection {
	Upload,
	Download,
}

/// Why a replication pass was refused without touching the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SkipReason {
	InProgress,
	Cooldown,
	Backoff,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
	QueueItemAdded {
		item_id: String,
		operation: String,
		queue_len: usize,
	},

	QueueItemSucceeded {
		item_id: String,
		operation: String,
	},

	QueueItemRetrying {
		item_id: String,
		attempt: u32,
		delay_ms: u64,
		error: String,
	},

	/// The item was dropped after exhausting its retries (or hitting a
	/// non-retryable error). Local state is left as is.
	QueueItemFailed {
		item_id: String,
		operation: String,
		retries: u32,
		error: String,
	},

	/// Oldest items were discarded to fit the persisted queue in storage.
	QueueTruncated {
		dropped: usize,
		kept: usize,
	},

	CloudFirstRolledBack {
		entity: String,
		record_id: String,
		error: String,
	},

	ReplicationStarted {
		direction: SyncDirection,
	},

	ReplicationFinished {
		direction: SyncDirection,
		success: bool,
		count: usize,
		failed: usize,
	},

	ReplicationSkipped {
		direction: SyncDirection,
		reason: SkipReason,
	},
}

impl SyncEvent {
	pub fn event_type(&self) -> &'static str {
		match self {
			Self::QueueItemAdded { .. } => "QueueItemAdded",
			Self::QueueItemSucceeded { .. } => "QueueItemSucceeded",
			Self::QueueItemRetrying { .. } => "QueueItemRetrying",
			Self::QueueItemFailed { .. } => "QueueItemFailed",
			Self::QueueTruncated { .. } => "QueueTruncated",
			Self::CloudFirstRolledBack { .. } => "CloudFirstRolledBack",
			Self::ReplicationStarted { .. } => "ReplicationStarted",
			Self::ReplicationFinished { .. } => "ReplicationFinished",
			Self::ReplicationSkipped { .. } => "ReplicationSkipped",
		}
	}

	/// Events an operator must see: data was dropped or diverged.
	pub fn is_critical(&self) -> bool {
		matches!(
			self,
			Self::QueueItemFailed { .. }
				| Self::QueueTruncated { .. }
				| Self::CloudFirstRolledBack { .. }
		)
	}
}

impl SyncEventBus {
	pub fn new() -> Self {
		Self::with_capacity(DEFAULT_CAPACITY)
	}

	pub fn with_capacity(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	/// Emit an event to all subscribers
	///
	/// Returns the number of subscribers that received it.
	pub fn emit(&self, event: SyncEvent) -> usize {
		let event_type = event.event_type();
		let critical = event.is_critical();

		match self.sender.send(event) {
			Ok(count) => {
				debug!(event_type, subscribers = count, critical, "Sync event emitted");
				count
			}
			Err(_) => {
				debug!(event_type, "Sync event emitted but no subscribers");
				0
			}
		}
	}

	pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
		self.sender.subscribe()
	}

	pub fn subscriber_count(&self) -> usize {
		self.sender.receiver_count()
	}
}

impl Default for SyncEventBus {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn emit_without_subscribers_is_harmless() {
		let bus = SyncEventBus::new();

		assert_eq!(bus.subscriber_count(), 0);
		assert_eq!(
			bus.emit(SyncEvent::QueueTruncated {
				dropped: 1,
				kept: 2
			}),
			0
		);
	}

	#[tokio::test]
	async fn every_subscriber_receives_events() {
		let bus = SyncEventBus::new();
		let mut first = bus.subscribe();
		let mut second = bus.subscribe();

		let event = SyncEvent::ReplicationSkipped {
			direction: SyncDirection::Download,
			reason: SkipReason::Cooldown,
		};

		assert_eq!(bus.emit(event.clone()), 2);
		assert_eq!(first.recv().await.unwrap(), event);
		assert_eq!(second.recv().await.unwrap(), event);
	}

	#[test]
	fn failures_are_critical() {
		let failed = SyncEvent::QueueItemFailed {
			item_id: "1".into(),
			operation: "insert assets/a".into(),
			retries: 5,
			error: "boom".into(),
		};
		let started = SyncEvent::ReplicationStarted {
			direction: SyncDirection::Upload,
		};

		assert!(failed.is_critical());
		assert!(!started.is_critical());
		assert_eq!(
			serde_json::to_value(&failed).unwrap()["type"],
			serde_json::json!("queue_item_failed")
		);
	}
}
