//! Offline-first sync engine for asset inspection data.
//!
//! Inspections are recorded into a local, organization-partitioned document
//! tree ([`store::LocalStore`]) that is usable without connectivity. Changes
//! reach the remote backend either through the durable
//! [`service::sync_queue::SyncQueue`] or, for records that must never diverge,
//! synchronously. The [`service::replication::ReplicationService`] moves whole
//! subtrees in both directions.

pub mod access;
pub mod config;
pub mod domain;
pub mod infra;
pub mod service;
pub mod store;
pub mod testing;

use std::{path::Path, sync::Arc};

use anyhow::Result;
use hs_cloud_api::{BlobStore, RemoteBackend};
use tracing::info;

use crate::{
	access::IdentityProvider,
	config::{AppConfig, SyncConfig},
	infra::{
		event::SyncEventBus,
		remote::RemoteGateway,
		storage::{DocumentStorage, SqliteStorage},
	},
	service::{replication::ReplicationService, sync_queue::SyncQueue, Service},
	store::{LocalStore, StoreOptions},
};

/// The wired-up engine: one store, one queue and one replication service
/// sharing a storage backend, a remote gateway and an event bus.
pub struct Core {
	pub config: SyncConfig,
	pub identity: Arc<dyn IdentityProvider>,
	pub events: SyncEventBus,
	pub store: Arc<LocalStore>,
	pub queue: Arc<SyncQueue>,
	pub replication: Arc<ReplicationService>,
}

impl Core {
	/// Opens the embedded database of `config` and loads the local state.
	pub async fn new(
		config: &AppConfig,
		identity: Arc<dyn IdentityProvider>,
		backend: Arc<dyn RemoteBackend>,
		blobs: Arc<dyn BlobStore>,
	) -> Result<Self> {
		let storage = SqliteStorage::open(
			&config.database_path(),
			config.storage.quota().map(|quota| quota as u64),
		)
		.await?;

		Self::with_storage(config.sync.clone(), Arc::new(storage), identity, backend, blobs).await
	}

	pub async fn with_storage(
		config: SyncConfig,
		storage: Arc<dyn DocumentStorage>,
		identity: Arc<dyn IdentityProvider>,
		backend: Arc<dyn RemoteBackend>,
		blobs: Arc<dyn BlobStore>,
	) -> Result<Self> {
		let events = SyncEventBus::new();
		let gateway = RemoteGateway::new(backend, blobs);

		let queue = Arc::new(SyncQueue::new(
			storage.clone(),
			gateway.clone(),
			identity.clone(),
			events.clone(),
			config.queue.clone(),
		));
		queue.init().await?;

		let store = Arc::new(LocalStore::new(
			storage,
			queue.clone(),
			gateway,
			identity.clone(),
			events.clone(),
			StoreOptions::from(&config),
		));
		store.init().await?;

		let replication = Arc::new(ReplicationService::new(
			store.clone(),
			events.clone(),
			config.replication.clone(),
		));

		Ok(Self {
			config,
			identity,
			events,
			store,
			queue,
			replication,
		})
	}

	/// Starts the queue worker and, if configured, periodic downloads.
	pub async fn start(&self) -> Result<()> {
		self.queue.start().await?;
		self.replication.start().await?;

		info!("Sync engine started");

		Ok(())
	}

	pub async fn shutdown(&self) -> Result<()> {
		self.replication.stop().await?;
		self.queue.stop().await?;

		info!("Sync engine stopped");

		Ok(())
	}
}

/// Initializes stderr and daily rolling file logging in `logs_dir`.
///
/// `RUST_LOG` overrides `level`. Only the first call has any effect.
pub fn init_tracing(logs_dir: &Path, level: &str) -> Result<()> {
	use std::sync::Once;

	use tracing_appender::rolling::{RollingFileAppender, Rotation};
	use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

	static INIT: Once = Once::new();
	let mut result = Ok(());

	INIT.call_once(|| {
		if let Err(e) = std::fs::create_dir_all(logs_dir) {
			result = Err(anyhow::anyhow!("Failed to create logs directory: {e}"));
			return;
		}

		let file_appender = RollingFileAppender::new(Rotation::DAILY, logs_dir, "hullsync.log");

		if let Err(e) = tracing_subscriber::registry()
			.with(
				EnvFilter::try_from_default_env()
					.unwrap_or_else(|_| EnvFilter::new(format!("hs_core={level},hs_cli={level}"))),
			)
			.with(fmt::layer().with_target(true).with_writer(std::io::stderr))
			.with(
				fmt::layer()
					.with_target(true)
					.with_ansi(false)
					.with_writer(file_appender),
			)
			.try_init()
		{
			result = Err(anyhow::anyhow!("Failed to initialize tracing: {e}"));
		}
	});

	result
}
