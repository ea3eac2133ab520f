use std::{
	collections::HashMap,
	sync::{
		atomic::{AtomicBool, AtomicUsize, Ordering},
		Mutex,
	},
};

use async_trait::async_trait;

use super::{check_quota, DocumentStorage, StorageError, StorageKey};

/// In-process [`DocumentStorage`]. Supports a mutable quota and write-failure
/// injection, which makes it the storage of choice for tests.
#[derive(Default)]
pub struct MemoryStorage {
	documents: Mutex<HashMap<StorageKey, String>>,
	quota: Mutex<Option<u64>>,
	fail_writes: AtomicBool,
	writes: AtomicUsize,
}

impl MemoryStorage {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_quota(quota: u64) -> Self {
		let storage = Self::default();
		storage.set_quota(Some(quota));
		storage
	}

	pub fn set_quota(&self, quota: Option<u64>) {
		*self.quota.lock().unwrap_or_else(|e| e.into_inner()) = quota;
	}

	/// Makes every following `save` fail until reset.
	pub fn fail_writes(&self, fail: bool) {
		self.fail_writes.store(fail, Ordering::SeqCst);
	}

	/// Stores `value` as-is, bypassing quota and failure injection.
	pub fn insert_raw(&self, key: StorageKey, value: impl Into<String>) {
		self.documents
			.lock()
			.unwrap_or_else(|e| e.into_inner())
			.insert(key, value.into());
	}

	pub fn raw(&self, key: StorageKey) -> Option<String> {
		self.documents
			.lock()
			.unwrap_or_else(|e| e.into_inner())
			.get(&key)
			.cloned()
	}

	/// Number of successful writes so far.
	pub fn write_count(&self) -> usize {
		self.writes.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl DocumentStorage for MemoryStorage {
	async fn load(&self, key: StorageKey) -> Result<Option<String>, StorageError> {
		Ok(self.raw(key))
	}

	async fn save(&self, key: StorageKey, value: &str) -> Result<(), StorageError> {
		if self.fail_writes.load(Ordering::SeqCst) {
			return Err(StorageError::Unavailable("writes disabled".to_string()));
		}

		let quota = *self.quota.lock().unwrap_or_else(|e| e.into_inner());
		check_quota(key, value, quota)?;

		self.insert_raw(key, value);
		self.writes.fetch_add(1, Ordering::SeqCst);

		Ok(())
	}

	async fn remove(&self, key: StorageKey) -> Result<(), StorageError> {
		self.documents
			.lock()
			.unwrap_or_else(|e| e.into_inner())
			.remove(&key);

		Ok(())
	}
}
