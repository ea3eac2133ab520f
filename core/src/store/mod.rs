//! Local Store
//!
//! Sole owner of the in-memory, organization-partitioned document tree. Every
//! mutation goes through [`LocalStore::dispatch`]: it is staged on a copy of the
//! tree, pushed remotely first if its entity kind is cloud-first, persisted,
//! and only then swapped in. Readers therefore never observe a half-applied
//! change, and cloud-first kinds never hold state the backend rejected.
//! Write-through kinds hand their remote writes to the [`SyncQueue`] after the
//! local commit.

mod coverage;
mod input;
mod mutations;
mod policy;
mod records;
mod tree;

use std::{
	sync::{Arc, RwLock, RwLockReadGuard},
	time::Duration,
};

use tokio::sync::Mutex;
use tracing::{info, warn};

pub use coverage::StrakeCoverage;
pub use input::{
	AssetPatch, NewAsset, NewLogEntry, NewReport, NewScan, NewStrake, NewVessel, NewVesselImage,
	LogEntryPatch, ScanPatch, StrakePatch, VesselPatch,
};
pub use policy::{ConsistencyPolicy, EntityKind};

pub(crate) use tree::visible_assets;

use crate::{
	access::{AccessContext, AccessError, IdentityProvider},
	config::SyncConfig,
	domain::{Asset, Document, OrgData, Scan, Vessel},
	infra::{
		event::{SyncEvent, SyncEventBus},
		remote::{RemoteGateway, RowError, SyncOperation},
		storage::{DocumentStorage, DocumentStorageExt, StorageError, StorageKey},
	},
	service::sync_queue::{PendingDeletes, SyncQueue},
};

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
	#[error(transparent)]
	Access(#[from] AccessError),
	#[error("failed to persist local data: {0}")]
	Storage(#[from] StorageError),
	#[error("{kind} '{id}' not found")]
	NotFound { kind: EntityKind, id: String },
	#[error("{kind} '{id}' does not belong to vessel '{vessel_id}'")]
	InvalidReference {
		kind: EntityKind,
		id: String,
		vessel_id: String,
	},
	#[error("remote write of {kind} '{id}' failed, local change discarded: {source}")]
	CloudFirst {
		kind: EntityKind,
		id: String,
		#[source]
		source: hs_cloud_api::Error,
	},
	#[error(transparent)]
	Row(#[from] RowError),
	#[error("invalid input: {0}")]
	Invalid(String),
}

impl StoreError {
	pub(crate) fn not_found(kind: EntityKind, id: &str) -> Self {
		Self::NotFound {
			kind,
			id: id.to_string(),
		}
	}
}

#[derive(Debug, Clone)]
pub struct StoreOptions {
	pub cloud_first_timeout: Duration,
	pub inline_payload_threshold: usize,
}

impl From<&SyncConfig> for StoreOptions {
	fn from(config: &SyncConfig) -> Self {
		Self {
			cloud_first_timeout: config.cloud_first_timeout(),
			inline_payload_threshold: config.replication.inline_payload_threshold,
		}
	}
}

/// Result of a staged mutation.
pub(crate) struct Applied<T> {
	pub value: T,
	/// `false` for no-ops (e.g. re-creating an existing id): nothing is
	/// persisted or sent.
	pub changed: bool,
	pub writes: Vec<SyncOperation>,
}

impl<T> Applied<T> {
	pub fn changed(value: T, writes: Vec<SyncOperation>) -> Self {
		Self {
			value,
			changed: true,
			writes,
		}
	}

	pub fn unchanged(value: T) -> Self {
		Self {
			value,
			changed: false,
			writes: vec![],
		}
	}
}

pub struct LocalStore {
	tree: RwLock<Document>,
	writer: Mutex<()>,
	storage: Arc<dyn DocumentStorage>,
	queue: Arc<SyncQueue>,
	gateway: RemoteGateway,
	identity: Arc<dyn IdentityProvider>,
	events: SyncEventBus,
	options: StoreOptions,
}

impl LocalStore {
	pub fn new(
		storage: Arc<dyn DocumentStorage>,
		queue: Arc<SyncQueue>,
		gateway: RemoteGateway,
		identity: Arc<dyn IdentityProvider>,
		events: SyncEventBus,
		options: StoreOptions,
	) -> Self {
		Self {
			tree: RwLock::new(Document::new()),
			writer: Mutex::new(()),
			storage,
			queue,
			gateway,
			identity,
			events,
			options,
		}
	}

	/// Loads the persisted document. A corrupted document is replaced by an
	/// empty one.
	pub async fn init(&self) -> Result<(), StoreError> {
		let document: Document = match self.storage.load_json(StorageKey::InspectionData).await {
			Ok(document) => document.unwrap_or_default(),
			Err(StorageError::Serialization(e)) => {
				warn!(error = %e, "Local inspection data corrupted, starting empty");
				Document::new()
			}
			Err(e) => return Err(e.into()),
		};

		info!(
			organizations = document.len(),
			assets = document.values().map(|data| data.assets.len()).sum::<usize>(),
			"Loaded local inspection data"
		);

		*self.tree.write().unwrap_or_else(|e| e.into_inner()) = document;

		Ok(())
	}

	pub(crate) fn access(&self) -> Result<AccessContext, AccessError> {
		AccessContext::resolve(self.identity.as_ref())
	}

	fn read(&self) -> RwLockReadGuard<'_, Document> {
		self.tree.read().unwrap_or_else(|e| e.into_inner())
	}

	pub(crate) fn options(&self) -> &StoreOptions {
		&self.options
	}

	pub(crate) fn gateway(&self) -> &RemoteGateway {
		&self.gateway
	}

	/// A copy of the whole document.
	pub(crate) fn snapshot(&self) -> Document {
		self.read().clone()
	}

	/// The organization's subtree; unknown organizations yield an empty one.
	pub fn get_org_data(&self, organization_id: &str) -> Result<OrgData, StoreError> {
		self.access()?.authorize_read(organization_id)?;

		Ok(self.read().get(organization_id).cloned().unwrap_or_default())
	}

	/// Every asset the caller may see: the caller's organization, or all
	/// organizations for SYSTEM members.
	pub fn assets(&self) -> Result<Vec<Asset>, StoreError> {
		let access = self.access()?;

		let assets = tree::visible_assets(&self.read(), &access.scope)
			.cloned()
			.collect();

		Ok(assets)
	}

	pub fn asset(&self, asset_id: &str) -> Result<Option<Asset>, StoreError> {
		let access = self.access()?;

		let asset = tree::visible_assets(&self.read(), &access.scope)
			.find(|asset| asset.id == asset_id)
			.cloned();

		Ok(asset)
	}

	pub fn vessel(&self, asset_id: &str, vessel_id: &str) -> Result<Option<Vessel>, StoreError> {
		Ok(self
			.asset(asset_id)?
			.and_then(|mut asset| {
				let index = asset.vessels.iter().position(|vessel| vessel.id == vessel_id)?;
				Some(asset.vessels.swap_remove(index))
			}))
	}

	/// Scans assigned to a strake.
	pub fn strake_scans(
		&self,
		asset_id: &str,
		vessel_id: &str,
		strake_id: &str,
	) -> Result<Vec<Scan>, StoreError> {
		let access = self.access()?;
		let document = self.read();
		let (_, vessel) = tree::find_vessel(&document, &access, asset_id, vessel_id)?;

		if vessel.strake(strake_id).is_none() {
			return Err(StoreError::not_found(EntityKind::Strake, strake_id));
		}

		let scans = vessel.strake_members(strake_id).cloned().collect();

		Ok(scans)
	}

	pub fn strake_coverage(&self, strake_id: &str) -> Result<StrakeCoverage, StoreError> {
		let access = self.access()?;
		let document = self.read();

		let coverage = tree::visible_assets(&document, &access.scope)
			.flat_map(|asset| asset.vessels.iter())
			.find_map(|vessel| {
				vessel.strake(strake_id).map(|strake| {
					StrakeCoverage::calculate(strake, vessel.strake_members(strake_id))
				})
			});

		coverage.ok_or_else(|| StoreError::not_found(EntityKind::Strake, strake_id))
	}

	/// The single mutation path.
	///
	/// `mutate` edits a staged copy of the document and describes the remote
	/// writes the change implies. Writers are serialized.
	///
	/// Cloud-first writes reach the backend while the writer lock is held, so
	/// the staged copy cannot go stale before it is committed. Other mutations
	/// and download merges wait behind them for up to `cloud_first_timeout`
	/// per remote operation. Reads only take the tree lock and are never
	/// blocked by a pending remote write.
	pub(crate) async fn dispatch<T>(
		&self,
		kind: EntityKind,
		record_id: &str,
		mutate: impl FnOnce(&AccessContext, &mut Document) -> Result<Applied<T>, StoreError>,
	) -> Result<T, StoreError> {
		let access = self.access()?;
		let _writer = self.writer.lock().await;

		let mut staged = self.snapshot();
		let Applied {
			value,
			changed,
			writes,
		} = mutate(&access, &mut staged)?;

		if !changed {
			return Ok(value);
		}

		let policy = kind.policy();

		if policy == ConsistencyPolicy::CloudFirst {
			for operation in &writes {
				if let Err(e) = self
					.gateway
					.apply(operation, self.options.cloud_first_timeout)
					.await
				{
					return Err(self.rolled_back(kind, record_id, e));
				}
			}
		}

		self.commit(staged).await?;

		if policy == ConsistencyPolicy::WriteThrough {
			for operation in writes {
				self.queue.add(operation).await;
			}
		}

		Ok(value)
	}

	pub(crate) fn rolled_back(
		&self,
		kind: EntityKind,
		record_id: &str,
		error: hs_cloud_api::Error,
	) -> StoreError {
		warn!(%kind, %record_id, error = %error, "Cloud-first write rejected, local change discarded");

		self.events.emit(SyncEvent::CloudFirstRolledBack {
			entity: kind.to_string(),
			record_id: record_id.to_string(),
			error: error.to_string(),
		});

		StoreError::CloudFirst {
			kind,
			id: record_id.to_string(),
			source: error,
		}
	}

	/// Applies a change coming from the backend. Nothing is queued.
	///
	/// `merge` also receives the records whose local deletion is still
	/// queued, so it can leave them out. The writer lock is taken before the
	/// queue is read, the same order `dispatch` uses.
	pub(crate) async fn apply_remote<T>(
		&self,
		merge: impl FnOnce(&mut Document, &PendingDeletes) -> T,
	) -> Result<T, StoreError> {
		let _writer = self.writer.lock().await;
		let pending = self.queue.pending_deletes().await;

		let mut staged = self.snapshot();
		let value = merge(&mut staged, &pending);
		self.commit(staged).await?;

		Ok(value)
	}

	async fn commit(&self, staged: Document) -> Result<(), StoreError> {
		self.storage
			.save_json(StorageKey::InspectionData, &staged)
			.await?;

		*self.tree.write().unwrap_or_else(|e| e.into_inner()) = staged;

		Ok(())
	}
}
