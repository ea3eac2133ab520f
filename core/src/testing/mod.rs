//! In-process doubles of the remote backend and a harness wiring a full
//! [`Core`] over them.
//!
//! ```rust,no_run
//! use hs_core::testing::TestHarness;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let harness = TestHarness::new().await?;
//! harness.core.replication.download_all(Default::default()).await?;
//! assert!(harness.backend.select_count() > 0);
//! # Ok(())
//! # }
//! ```

use std::{
	collections::{HashMap, HashSet, VecDeque},
	sync::{
		atomic::{AtomicUsize, Ordering},
		Arc, Mutex,
	},
};

use anyhow::Result;
use async_trait::async_trait;
use hs_cloud_api::{BlobStore, Bucket, Error, Query, RemoteBackend, Table};
use serde_json::Value;

use crate::{
	access::{Session, SessionIdentity},
	config::SyncConfig,
	domain::Organization,
	infra::storage::MemoryStorage,
	Core,
};

/// A request observed by [`MemoryBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
	Select {
		table: Table,
		range: Option<(usize, usize)>,
	},
	Insert {
		table: Table,
		id: String,
	},
	Update {
		table: Table,
		id: String,
	},
	Delete {
		table: Table,
		id: String,
	},
}

impl BackendCall {
	pub fn table(&self) -> Table {
		match self {
			Self::Select { table, .. }
			| Self::Insert { table, .. }
			| Self::Update { table, .. }
			| Self::Delete { table, .. } => *table,
		}
	}

	pub fn is_write(&self) -> bool {
		!matches!(self, Self::Select { .. })
	}
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn column_text(row: &Value, column: &str) -> Option<String> {
	match row.get(column)? {
		Value::Null => None,
		Value::String(s) => Some(s.clone()),
		other => Some(other.to_string()),
	}
}

/// Table rows held in memory, with failure and stall injection.
#[derive(Default)]
pub struct MemoryBackend {
	tables: Mutex<HashMap<Table, Vec<Value>>>,
	calls: Mutex<Vec<BackendCall>>,
	next_failures: Mutex<VecDeque<Error>>,
	failing_tables: Mutex<HashMap<Table, Error>>,
	failing_ids: Mutex<HashSet<String>>,
	stall_selects_after: Mutex<Option<usize>>,
	selects: AtomicUsize,
}

impl MemoryBackend {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn seed(&self, table: Table, rows: impl IntoIterator<Item = Value>) {
		lock(&self.tables).entry(table).or_default().extend(rows);
	}

	pub fn rows(&self, table: Table) -> Vec<Value> {
		lock(&self.tables).get(&table).cloned().unwrap_or_default()
	}

	pub fn row(&self, table: Table, id: &str) -> Option<Value> {
		self.rows(table)
			.into_iter()
			.find(|row| column_text(row, "id").as_deref() == Some(id))
	}

	pub fn calls(&self) -> Vec<BackendCall> {
		lock(&self.calls).clone()
	}

	pub fn writes(&self) -> Vec<BackendCall> {
		self.calls().into_iter().filter(BackendCall::is_write).collect()
	}

	pub fn clear_calls(&self) {
		lock(&self.calls).clear();
	}

	pub fn select_count(&self) -> usize {
		self.selects.load(Ordering::SeqCst)
	}

	/// The next request, whatever it is, fails with `error`.
	pub fn fail_next(&self, error: Error) {
		lock(&self.next_failures).push_back(error);
	}

	/// Every request on `table` fails with `error` until cleared.
	pub fn fail_table(&self, table: Table, error: Error) {
		lock(&self.failing_tables).insert(table, error);
	}

	/// Writes to the row `id`, in any table, fail with a permission error.
	pub fn reject_id(&self, id: impl Into<String>) {
		lock(&self.failing_ids).insert(id.into());
	}

	pub fn clear_failures(&self) {
		lock(&self.next_failures).clear();
		lock(&self.failing_tables).clear();
		lock(&self.failing_ids).clear();
		*lock(&self.stall_selects_after) = None;
	}

	/// Selects after the first `n` never complete.
	pub fn stall_selects_after(&self, n: usize) {
		*lock(&self.stall_selects_after) = Some(n);
	}

	fn record(&self, call: BackendCall) -> Result<(), Error> {
		let table = call.table();
		let write_id = match &call {
			BackendCall::Insert { id, .. }
			| BackendCall::Update { id, .. }
			| BackendCall::Delete { id, .. } => Some(id.clone()),
			BackendCall::Select { .. } => None,
		};

		lock(&self.calls).push(call);

		if let Some(error) = lock(&self.next_failures).pop_front() {
			return Err(error);
		}
		if let Some(error) = lock(&self.failing_tables).get(&table) {
			return Err(error.clone());
		}
		if let Some(id) = write_id {
			if lock(&self.failing_ids).contains(&id) {
				return Err(Error::PermissionDenied(format!("write to '{id}' rejected")));
			}
		}

		Ok(())
	}
}

#[async_trait]
impl RemoteBackend for MemoryBackend {
	async fn select(&self, query: &Query) -> Result<Vec<Value>, Error> {
		let seen = self.selects.fetch_add(1, Ordering::SeqCst);
		self.record(BackendCall::Select {
			table: query.table,
			range: query.range,
		})?;

		let stalled = lock(&self.stall_selects_after).is_some_and(|after| seen >= after);
		if stalled {
			std::future::pending::<()>().await;
		}

		let mut rows = self
			.rows(query.table)
			.into_iter()
			.filter(|row| {
				query
					.filters
					.iter()
					.all(|filter| column_text(row, &filter.column).as_deref() == Some(&filter.value))
			})
			.collect::<Vec<_>>();

		if let Some(order) = &query.order {
			rows.sort_by_key(|row| column_text(row, &order.column));
			if !order.ascending {
				rows.reverse();
			}
		}

		if let Some((from, to)) = query.range {
			rows = rows
				.into_iter()
				.skip(from)
				.take(to + 1 - from)
				.collect();
		}

		Ok(rows)
	}

	async fn insert(&self, table: Table, row: Value) -> Result<(), Error> {
		let id = column_text(&row, "id").ok_or_else(|| Error::Backend {
			status: 400,
			message: "row without id".to_string(),
		})?;
		self.record(BackendCall::Insert {
			table,
			id: id.clone(),
		})?;

		let mut tables = lock(&self.tables);
		let rows = tables.entry(table).or_default();

		if rows
			.iter()
			.any(|existing| column_text(existing, "id").as_deref() == Some(&id))
		{
			return Err(Error::Conflict(format!("{table}/{id}")));
		}

		rows.push(row);

		Ok(())
	}

	async fn update(&self, table: Table, id: &str, patch: Value) -> Result<(), Error> {
		self.record(BackendCall::Update {
			table,
			id: id.to_string(),
		})?;

		let mut tables = lock(&self.tables);
		let row = tables
			.get_mut(&table)
			.and_then(|rows| {
				rows.iter_mut()
					.find(|row| column_text(row, "id").as_deref() == Some(id))
			})
			.ok_or_else(|| Error::NotFound(format!("{table}/{id}")))?;

		if let (Value::Object(row), Value::Object(patch)) = (row, patch) {
			row.extend(patch);
		}

		Ok(())
	}

	async fn delete(&self, table: Table, id: &str) -> Result<(), Error> {
		self.record(BackendCall::Delete {
			table,
			id: id.to_string(),
		})?;

		let mut tables = lock(&self.tables);
		let rows = tables.entry(table).or_default();
		let before = rows.len();
		rows.retain(|row| column_text(row, "id").as_deref() != Some(id));

		if rows.len() == before {
			return Err(Error::NotFound(format!("{table}/{id}")));
		}

		Ok(())
	}
}

/// Objects held in memory under `memory://{bucket}/{path}` URLs.
#[derive(Default)]
pub struct MemoryBlobStore {
	objects: Mutex<HashMap<String, Vec<u8>>>,
	failure: Mutex<Option<Error>>,
}

impl MemoryBlobStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn url(bucket: Bucket, path: &str) -> String {
		format!("memory://{bucket}/{path}")
	}

	pub fn put(&self, url: impl Into<String>, bytes: Vec<u8>) {
		lock(&self.objects).insert(url.into(), bytes);
	}

	pub fn object(&self, url: &str) -> Option<Vec<u8>> {
		lock(&self.objects).get(url).cloned()
	}

	pub fn len(&self) -> usize {
		lock(&self.objects).len()
	}

	pub fn is_empty(&self) -> bool {
		lock(&self.objects).is_empty()
	}

	/// Uploads fail with `error` until cleared with `None`.
	pub fn fail_uploads(&self, error: Option<Error>) {
		*lock(&self.failure) = error;
	}
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
	async fn upload(
		&self,
		bucket: Bucket,
		path: &str,
		bytes: Vec<u8>,
		_content_type: &str,
	) -> Result<String, Error> {
		if let Some(error) = lock(&self.failure).clone() {
			return Err(error);
		}

		let url = Self::url(bucket, path);
		self.put(url.clone(), bytes);

		Ok(url)
	}

	async fn download(&self, url: &str) -> Result<Vec<u8>, Error> {
		self.object(url)
			.ok_or_else(|| Error::NotFound(url.to_string()))
	}

	async fn delete(&self, url: &str) -> Result<(), Error> {
		lock(&self.objects)
			.remove(url)
			.map(|_| ())
			.ok_or_else(|| Error::NotFound(url.to_string()))
	}
}

/// A [`Core`] over [`MemoryStorage`], [`MemoryBackend`] and
/// [`MemoryBlobStore`], signed in as `user-1` of organization `org-1`.
pub struct TestHarness {
	pub core: Core,
	pub storage: Arc<MemoryStorage>,
	pub backend: Arc<MemoryBackend>,
	pub blobs: Arc<MemoryBlobStore>,
	pub identity: Arc<SessionIdentity>,
}

impl TestHarness {
	pub async fn new() -> Result<Self> {
		Self::with_config(Self::fast_config()).await
	}

	pub async fn with_config(config: SyncConfig) -> Result<Self> {
		let identity = Arc::new(SessionIdentity::signed_in(Self::session(
			"user-1", "org-1", "Acme Marine",
		)));

		Self::build(
			config,
			Arc::new(MemoryStorage::new()),
			Arc::new(MemoryBackend::new()),
			Arc::new(MemoryBlobStore::new()),
			identity,
		)
		.await
	}

	async fn build(
		config: SyncConfig,
		storage: Arc<MemoryStorage>,
		backend: Arc<MemoryBackend>,
		blobs: Arc<MemoryBlobStore>,
		identity: Arc<SessionIdentity>,
	) -> Result<Self> {
		let core = Core::with_storage(
			config,
			storage.clone(),
			identity.clone(),
			backend.clone(),
			blobs.clone(),
		)
		.await?;

		Ok(Self {
			core,
			storage,
			backend,
			blobs,
			identity,
		})
	}

	/// A fresh [`Core`] over the same storage and remote, as after a restart.
	pub async fn restart(self) -> Result<Self> {
		let Self {
			core,
			storage,
			backend,
			blobs,
			identity,
		} = self;

		core.shutdown().await?;

		Self::build(core.config.clone(), storage, backend, blobs, identity).await
	}

	pub fn session(user_id: &str, organization_id: &str, organization_name: &str) -> Session {
		Session {
			user_id: user_id.to_string(),
			organization: Organization::new(organization_id, organization_name),
			is_admin: false,
			is_org_admin: false,
		}
	}

	/// Millisecond delays and short timeouts so retries and timeouts play out
	/// quickly. Retry delays are meant for paused test time.
	pub fn fast_config() -> SyncConfig {
		let mut config = SyncConfig::default();

		config.queue.base_delay_ms = 10;
		config.queue.max_delay_ms = 80;
		config.queue.drain_interval_ms = 50;
		config.queue.operation_timeout_ms = 500;

		config.replication.query_timeout_ms = 200;
		config.replication.blob_timeout_ms = 500;

		config.cloud_first_timeout_ms = 500;

		config
	}
}
