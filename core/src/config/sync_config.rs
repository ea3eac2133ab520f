use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::service::sync_queue::RetryPolicy;

/// Payloads above this size are stored as `scan-data` objects instead of inline.
pub const DEFAULT_INLINE_PAYLOAD_THRESHOLD: usize = 100 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
	pub queue: QueueConfig,
	pub replication: ReplicationConfig,

	/// Budget for the synchronous remote write of cloud-first entities
	pub cloud_first_timeout_ms: u64,
}

impl Default for SyncConfig {
	fn default() -> Self {
		Self {
			queue: QueueConfig::default(),
			replication: ReplicationConfig::default(),
			cloud_first_timeout_ms: 15_000,
		}
	}
}

impl SyncConfig {
	pub fn cloud_first_timeout(&self) -> Duration {
		Duration::from_millis(self.cloud_first_timeout_ms)
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
	/// Retries after the first failed attempt before an item is dropped
	pub max_retries: u32,
	pub base_delay_ms: u64,
	pub max_delay_ms: u64,

	/// Period of the background drain timer
	pub drain_interval_ms: u64,

	/// Items kept when the persisted queue hits the storage quota
	pub max_persisted_items: usize,

	pub operation_timeout_ms: u64,

	/// Permanent failures kept for operator inspection
	pub max_divergence_records: usize,
}

impl Default for QueueConfig {
	fn default() -> Self {
		Self {
			max_retries: 5,
			base_delay_ms: 1_000,
			max_delay_ms: 30_000,
			drain_interval_ms: 5_000,
			max_persisted_items: 100,
			operation_timeout_ms: 30_000,
			max_divergence_records: 200,
		}
	}
}

impl QueueConfig {
	pub fn retry_policy(&self) -> RetryPolicy {
		RetryPolicy {
			max_retries: self.max_retries,
			base_delay: Duration::from_millis(self.base_delay_ms),
			max_delay: Duration::from_millis(self.max_delay_ms),
		}
	}

	pub fn drain_interval(&self) -> Duration {
		Duration::from_millis(self.drain_interval_ms)
	}

	pub fn operation_timeout(&self) -> Duration {
		Duration::from_millis(self.operation_timeout_ms)
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationConfig {
	/// Scans fetched per request during a download pass
	pub page_size: usize,

	/// Minimum time between two download passes
	pub cooldown_ms: u64,

	/// Consecutive failed passes before the service backs off
	pub failure_threshold: u32,
	pub failure_backoff_ms: u64,

	pub query_timeout_ms: u64,
	pub blob_timeout_ms: u64,

	pub inline_payload_threshold: usize,

	/// Run a download pass on this period while signed in
	pub auto_download_interval_ms: Option<u64>,
}

impl Default for ReplicationConfig {
	fn default() -> Self {
		Self {
			page_size: 10,
			cooldown_ms: 30_000,
			failure_threshold: 3,
			failure_backoff_ms: 5 * 60 * 1_000,
			query_timeout_ms: 10_000,
			blob_timeout_ms: 60_000,
			inline_payload_threshold: DEFAULT_INLINE_PAYLOAD_THRESHOLD,
			auto_download_interval_ms: None,
		}
	}
}

impl ReplicationConfig {
	pub fn cooldown(&self) -> Duration {
		Duration::from_millis(self.cooldown_ms)
	}

	pub fn failure_backoff(&self) -> Duration {
		Duration::from_millis(self.failure_backoff_ms)
	}

	pub fn query_timeout(&self) -> Duration {
		Duration::from_millis(self.query_timeout_ms)
	}

	pub fn blob_timeout(&self) -> Duration {
		Duration::from_millis(self.blob_timeout_ms)
	}

	pub fn auto_download_interval(&self) -> Option<Duration> {
		self.auto_download_interval_ms.map(Duration::from_millis)
	}
}
