//! Document persistence
//!
//! The engine persists a handful of JSON documents (the inspection tree, the
//! sync queue, the divergence log) under fixed keys. [`DocumentStorage`] is the
//! seam; [`SqliteStorage`] backs it with the embedded database and
//! [`MemoryStorage`] keeps everything in process.

mod memory;
mod sqlite;

use async_trait::async_trait;
use sea_orm::DbErr;
use serde::{de::DeserializeOwned, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, EnumString, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum StorageKey {
	InspectionData,
	SyncQueue,
	SyncDivergenceLog,
}

#[derive(thiserror::Error, Debug)]
pub enum StorageError {
	#[error("storage quota exceeded writing '{key}': {size} bytes, quota {quota} bytes")]
	QuotaExceeded {
		key: StorageKey,
		size: usize,
		quota: u64,
	},
	#[error("database error: {0}")]
	Database(#[from] DbErr),
	#[error("corrupted document: {0}")]
	Serialization(#[from] serde_json::Error),
	#[error("storage unavailable: {0}")]
	Unavailable(String),
}

impl StorageError {
	pub fn is_quota_exceeded(&self) -> bool {
		matches!(self, Self::QuotaExceeded { .. })
	}
}

#[async_trait]
pub trait DocumentStorage: Send + Sync {
	async fn load(&self, key: StorageKey) -> Result<Option<String>, StorageError>;

	async fn save(&self, key: StorageKey, value: &str) -> Result<(), StorageError>;

	async fn remove(&self, key: StorageKey) -> Result<(), StorageError>;
}

/// Typed access on top of [`DocumentStorage`].
#[async_trait]
pub trait DocumentStorageExt: DocumentStorage {
	async fn load_json<T: DeserializeOwned + Send>(
		&self,
		key: StorageKey,
	) -> Result<Option<T>, StorageError> {
		match self.load(key).await? {
			Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
			None => Ok(None),
		}
	}

	async fn save_json<T: Serialize + Sync>(
		&self,
		key: StorageKey,
		value: &T,
	) -> Result<(), StorageError> {
		let raw = serde_json::to_string(value)?;
		self.save(key, &raw).await
	}
}

impl<S: DocumentStorage + ?Sized> DocumentStorageExt for S {}

pub(crate) fn check_quota(
	key: StorageKey,
	value: &str,
	quota: Option<u64>,
) -> Result<(), StorageError> {
	match quota {
		Some(quota) if value.len() as u64 > quota => Err(StorageError::QuotaExceeded {
			key,
			size: value.len(),
			quota,
		}),
		_ => Ok(()),
	}
}
