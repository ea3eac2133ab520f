//! Persisted record of operations that never reached the backend.
//!
//! A permanently failed write-through operation leaves the local tree ahead of
//! the remote mirror. The record is kept so an operator can inspect and replay
//! or discard it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::warn;

use super::{ItemStatus, SyncQueueItem};
use crate::infra::storage::{DocumentStorage, DocumentStorageExt, StorageError, StorageKey};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DivergenceRecord {
	pub item: SyncQueueItem,
	pub failed_at: DateTime<Utc>,
}

pub struct DivergenceLog {
	storage: Arc<dyn DocumentStorage>,
	max_records: usize,
	records: Mutex<Vec<DivergenceRecord>>,
}

impl DivergenceLog {
	pub fn new(storage: Arc<dyn DocumentStorage>, max_records: usize) -> Self {
		Self {
			storage,
			max_records,
			records: Mutex::new(vec![]),
		}
	}

	pub async fn load(&self) -> Result<(), StorageError> {
		let records: Vec<DivergenceRecord> = match self.storage.load_json(StorageKey::SyncDivergenceLog).await {
			Ok(records) => records.unwrap_or_default(),
			Err(StorageError::Serialization(e)) => {
				warn!(error = %e, "Divergence log corrupted, starting empty");
				self.storage.remove(StorageKey::SyncDivergenceLog).await?;
				vec![]
			}
			Err(e) => return Err(e),
		};

		*self.records.lock().await = records;

		Ok(())
	}

	/// Appends a failed item, evicting the oldest records past the cap.
	pub async fn record(&self, mut item: SyncQueueItem) {
		item.status = ItemStatus::Failed;

		let mut records = self.records.lock().await;
		records.push(DivergenceRecord {
			item,
			failed_at: Utc::now(),
		});

		if records.len() > self.max_records {
			let excess = records.len() - self.max_records;
			records.drain(..excess);
		}

		if let Err(e) = self
			.storage
			.save_json(StorageKey::SyncDivergenceLog, &*records)
			.await
		{
			warn!(error = %e, "Failed to persist divergence log");
		}
	}

	pub async fn records(&self) -> Vec<DivergenceRecord> {
		self.records.lock().await.clone()
	}

	pub async fn len(&self) -> usize {
		self.records.lock().await.len()
	}

	pub async fn is_empty(&self) -> bool {
		self.records.lock().await.is_empty()
	}

	pub async fn clear(&self) -> Result<usize, StorageError> {
		let mut records = self.records.lock().await;
		let cleared = records.len();

		self.storage.remove(StorageKey::SyncDivergenceLog).await?;
		records.clear();

		Ok(cleared)
	}
}

#[cfg(test)]
mod tests {
	use hs_cloud_api::Table;

	use super::*;
	use crate::infra::{remote::SyncOperation, storage::MemoryStorage};

	#[tokio::test]
	async fn keeps_only_the_newest_records() {
		let storage = Arc::new(MemoryStorage::new());
		let log = DivergenceLog::new(storage.clone(), 2);

		for id in ["a", "b", "c"] {
			log.record(SyncQueueItem::new(SyncOperation::delete(Table::Assets, id)))
				.await;
		}

		let records = log.records().await;
		assert_eq!(records.len(), 2);
		assert_eq!(records[0].item.operation.summary(), "delete assets/b");
		assert_eq!(records[1].item.status, ItemStatus::Failed);

		let reloaded = DivergenceLog::new(storage.clone(), 2);
		reloaded.load().await.unwrap();
		assert_eq!(reloaded.len().await, 2);

		assert_eq!(reloaded.clear().await.unwrap(), 2);
		assert!(storage.raw(StorageKey::SyncDivergenceLog).is_none());
	}
}
