use std::collections::HashSet;

use chrono::{DateTime, Utc};
use hs_cloud_api::Table;
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::{domain::generate_id, infra::remote::SyncOperation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ItemStatus {
	Pending,
	Processing,
	Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncQueueItem {
	pub id: String,
	pub operation: SyncOperation,
	pub enqueued_at: DateTime<Utc>,
	#[serde(default)]
	pub retries: u32,
	pub status: ItemStatus,
	#[serde(default)]
	pub last_error: Option<String>,
}

impl SyncQueueItem {
	pub fn new(operation: SyncOperation) -> Self {
		Self {
			id: generate_id(),
			operation,
			enqueued_at: Utc::now(),
			retries: 0,
			status: ItemStatus::Pending,
			last_error: None,
		}
	}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
	pub pending: usize,
	pub processing: usize,
	pub diverged: usize,
}

impl QueueStats {
	pub fn queued(&self) -> usize {
		self.pending + self.processing
	}
}

/// Records deleted locally whose `delete` has not reached the backend yet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingDeletes(HashSet<(Table, String)>);

impl PendingDeletes {
	pub fn contains(&self, table: Table, id: &str) -> bool {
		self.0.contains(&(table, id.to_string()))
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

impl<'a> FromIterator<&'a SyncQueueItem> for PendingDeletes {
	fn from_iter<I: IntoIterator<Item = &'a SyncQueueItem>>(items: I) -> Self {
		Self(
			items
				.into_iter()
				.filter_map(|item| match &item.operation {
					SyncOperation::Delete { table, id } => Some((*table, id.clone())),
					_ => None,
				})
				.collect(),
		)
	}
}
