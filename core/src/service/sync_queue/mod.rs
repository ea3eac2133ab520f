//! Durable FIFO of remote mutations
//!
//! Write-through mutations are committed locally first and handed here as
//! [`SyncOperation`]s. The queue persists them and delivers them to the
//! backend strictly in order with a single item in flight, so a child insert
//! can never overtake its parent. Failed items are retried with exponential
//! backoff; once retries run out (or the error is permanent) the item is
//! dropped, recorded in the [`DivergenceLog`] and reported on the event bus.
//! The local tree is never rolled back.

mod backoff;
mod divergence;
mod item;

use std::{
	collections::VecDeque,
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc,
	},
};

use anyhow::Result;
use tokio::{
	sync::{broadcast, Mutex, Notify},
	time::MissedTickBehavior,
};
use tracing::{debug, error, info, warn};

pub use backoff::RetryPolicy;
pub use divergence::{DivergenceLog, DivergenceRecord};
pub use item::{ItemStatus, PendingDeletes, QueueStats, SyncQueueItem};

use crate::{
	access::IdentityProvider,
	config::QueueConfig,
	infra::{
		event::{SyncEvent, SyncEventBus},
		remote::{RemoteGateway, SyncOperation},
		storage::{DocumentStorage, DocumentStorageExt, StorageError, StorageKey},
	},
};

const QUOTA_DROP_REASON: &str = "dropped to fit storage quota";

/// How a drain pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
	/// The queue was emptied.
	Drained,
	/// Another pass is already running.
	Busy,
	/// Stopped early: no session or shutdown requested.
	Interrupted,
}

pub struct SyncQueue {
	inner: Arc<QueueInner>,
	is_running: Arc<AtomicBool>,
}

struct QueueInner {
	items: Mutex<VecDeque<SyncQueueItem>>,
	storage: Arc<dyn DocumentStorage>,
	gateway: RemoteGateway,
	identity: Arc<dyn IdentityProvider>,
	events: SyncEventBus,
	divergence: DivergenceLog,
	config: QueueConfig,
	processing: AtomicBool,
	wake: Notify,
	shutdown_tx: broadcast::Sender<()>,
}

/// Clears the processing flag when a drain pass ends, however it ends.
struct ProcessingGuard<'a>(&'a AtomicBool);

impl Drop for ProcessingGuard<'_> {
	fn drop(&mut self) {
		self.0.store(false, Ordering::SeqCst);
	}
}

impl SyncQueue {
	pub fn new(
		storage: Arc<dyn DocumentStorage>,
		gateway: RemoteGateway,
		identity: Arc<dyn IdentityProvider>,
		events: SyncEventBus,
		config: QueueConfig,
	) -> Self {
		let (shutdown_tx, _) = broadcast::channel(1);
		let divergence = DivergenceLog::new(storage.clone(), config.max_divergence_records);

		Self {
			inner: Arc::new(QueueInner {
				items: Mutex::new(VecDeque::new()),
				storage,
				gateway,
				identity,
				events,
				divergence,
				config,
				processing: AtomicBool::new(false),
				wake: Notify::new(),
				shutdown_tx,
			}),
			is_running: Arc::new(AtomicBool::new(false)),
		}
	}

	/// Loads the persisted queue and divergence log.
	///
	/// A corrupted queue document is discarded. Items left in `processing` by
	/// an interrupted run go back to `pending`.
	pub async fn init(&self) -> Result<(), StorageError> {
		let inner = &self.inner;

		let mut items: VecDeque<SyncQueueItem> =
			match inner.storage.load_json(StorageKey::SyncQueue).await {
				Ok(items) => items.unwrap_or_default(),
				Err(StorageError::Serialization(e)) => {
					warn!(error = %e, "Sync queue corrupted, clearing it");
					inner.storage.remove(StorageKey::SyncQueue).await?;
					VecDeque::new()
				}
				Err(e) => return Err(e),
			};

		for item in items.iter_mut() {
			if item.status == ItemStatus::Processing {
				item.status = ItemStatus::Pending;
			}
		}

		info!(items = items.len(), "Loaded sync queue");
		*inner.items.lock().await = items;

		inner.divergence.load().await
	}

	/// Appends an operation and wakes the worker. Returns the queue item id.
	///
	/// Never fails: a persistence error is logged and the item stays queued in
	/// memory.
	pub async fn add(&self, operation: SyncOperation) -> String {
		let item = SyncQueueItem::new(operation);
		let item_id = item.id.clone();
		let summary = item.operation.summary();

		let queue_len = {
			let mut items = self.inner.items.lock().await;
			items.push_back(item);
			self.inner.persist(&mut items).await;
			items.len()
		};

		debug!(%item_id, operation = %summary, queue_len, "Queued remote operation");

		self.inner.events.emit(SyncEvent::QueueItemAdded {
			item_id: item_id.clone(),
			operation: summary,
			queue_len,
		});
		self.inner.wake.notify_one();

		item_id
	}

	/// Runs one drain pass in the caller's task.
	pub async fn drain(&self) -> DrainOutcome {
		self.inner.drain().await
	}

	pub async fn pending_items(&self) -> Vec<SyncQueueItem> {
		self.inner.items.lock().await.iter().cloned().collect()
	}

	/// Records with a queued `delete` still waiting for the backend.
	pub async fn pending_deletes(&self) -> PendingDeletes {
		self.inner.items.lock().await.iter().collect()
	}

	pub async fn len(&self) -> usize {
		self.inner.items.lock().await.len()
	}

	pub async fn is_empty(&self) -> bool {
		self.inner.items.lock().await.is_empty()
	}

	pub async fn stats(&self) -> QueueStats {
		let (pending, processing) = {
			let items = self.inner.items.lock().await;
			let processing = items
				.iter()
				.filter(|item| item.status == ItemStatus::Processing)
				.count();
			(items.len() - processing, processing)
		};

		QueueStats {
			pending,
			processing,
			diverged: self.inner.divergence.len().await,
		}
	}

	pub fn divergence(&self) -> &DivergenceLog {
		&self.inner.divergence
	}

	async fn run_drain_loop(inner: Arc<QueueInner>, mut shutdown_rx: broadcast::Receiver<()>) {
		let mut interval = tokio::time::interval(inner.config.drain_interval());
		interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

		info!(interval = ?inner.config.drain_interval(), "Sync queue worker started");

		loop {
			tokio::select! {
				_ = shutdown_rx.recv() => break,
				_ = interval.tick() => {}
				_ = inner.wake.notified() => {}
			}

			inner.drain().await;
		}

		info!("Sync queue worker stopped");
	}
}

impl QueueInner {
	async fn drain(&self) -> DrainOutcome {
		loop {
			if self.processing.swap(true, Ordering::SeqCst) {
				return DrainOutcome::Busy;
			}

			let outcome = {
				let _guard = ProcessingGuard(&self.processing);
				self.drain_items().await
			};

			// An add may have raced the end of the pass and found it busy.
			if outcome != DrainOutcome::Drained || self.items.lock().await.is_empty() {
				return outcome;
			}
		}
	}

	async fn drain_items(&self) -> DrainOutcome {
		let policy = self.config.retry_policy();
		let timeout = self.config.operation_timeout();
		let mut shutdown_rx = self.shutdown_tx.subscribe();

		loop {
			if !self.identity.is_authenticated() {
				debug!("No session, deferring sync queue drain");
				return DrainOutcome::Interrupted;
			}

			let Some(mut item) = self.begin_head().await else {
				return DrainOutcome::Drained;
			};

			match self.gateway.apply(&item.operation, timeout).await {
				Ok(()) => {
					self.remove(&item.id).await;

					debug!(item_id = %item.id, operation = %item.operation.summary(), "Queue item applied");

					self.events.emit(SyncEvent::QueueItemSucceeded {
						item_id: item.id,
						operation: item.operation.summary(),
					});
				}
				Err(e) => {
					item.retries += 1;
					item.last_error = Some(e.to_string());

					if policy.gives_up(item.retries, &e) {
						self.remove(&item.id).await;

						error!(
							item_id = %item.id,
							operation = %item.operation.summary(),
							retries = item.retries,
							error = %e,
							"Dropping queue item, local and remote state now diverge"
						);

						self.events.emit(SyncEvent::QueueItemFailed {
							item_id: item.id.clone(),
							operation: item.operation.summary(),
							retries: item.retries,
							error: e.to_string(),
						});
						self.divergence.record(item).await;

						continue;
					}

					let delay = policy.delay_for(item.retries);
					self.release_head(&item).await;

					warn!(
						item_id = %item.id,
						attempt = item.retries,
						delay = ?delay,
						error = %e,
						"Queue item failed, retrying"
					);

					self.events.emit(SyncEvent::QueueItemRetrying {
						item_id: item.id.clone(),
						attempt: item.retries,
						delay_ms: delay.as_millis() as u64,
						error: e.to_string(),
					});

					tokio::select! {
						_ = tokio::time::sleep(delay) => {}
						_ = shutdown_rx.recv() => return DrainOutcome::Interrupted,
					}
				}
			}
		}
	}

	/// Marks the head item as in flight and returns a copy of it.
	async fn begin_head(&self) -> Option<SyncQueueItem> {
		let mut items = self.items.lock().await;

		let head = items.front_mut()?;
		head.status = ItemStatus::Processing;
		let head = head.clone();

		self.persist(&mut items).await;

		Some(head)
	}

	/// Puts a failed head item back to `pending` with its retry bookkeeping.
	async fn release_head(&self, failed: &SyncQueueItem) {
		let mut items = self.items.lock().await;

		if let Some(item) = items.iter_mut().find(|item| item.id == failed.id) {
			item.status = ItemStatus::Pending;
			item.retries = failed.retries;
			item.last_error = failed.last_error.clone();
		}

		self.persist(&mut items).await;
	}

	async fn remove(&self, item_id: &str) {
		let mut items = self.items.lock().await;
		items.retain(|item| item.id != item_id);
		self.persist(&mut items).await;
	}

	/// Writes the queue through. Under quota pressure the oldest items are
	/// dropped until the remainder fits.
	async fn persist(&self, items: &mut VecDeque<SyncQueueItem>) {
		let err = match self.storage.save_json(StorageKey::SyncQueue, &*items).await {
			Ok(()) => return,
			Err(e) => e,
		};

		if !err.is_quota_exceeded() {
			warn!(error = %err, "Failed to persist sync queue");
			return;
		}

		let mut keep = self.config.max_persisted_items.min(items.len());
		let mut dropped = Vec::new();

		loop {
			let excess = items.len() - keep;
			dropped.extend(items.drain(..excess));

			match self.storage.save_json(StorageKey::SyncQueue, &*items).await {
				Ok(()) => break,
				Err(e) if e.is_quota_exceeded() && keep > 0 => keep /= 2,
				Err(e) => {
					warn!(error = %e, "Failed to persist truncated sync queue");
					break;
				}
			}
		}

		if dropped.is_empty() {
			return;
		}

		warn!(
			dropped = dropped.len(),
			kept = items.len(),
			"Storage quota exceeded, truncated sync queue"
		);

		self.events.emit(SyncEvent::QueueTruncated {
			dropped: dropped.len(),
			kept: items.len(),
		});

		// Truncated items never reach the backend: same fate as a permanent failure.
		for mut item in dropped {
			item.last_error = Some(QUOTA_DROP_REASON.to_string());

			error!(
				item_id = %item.id,
				operation = %item.operation.summary(),
				"Dropping queue item to fit storage quota, local and remote state now diverge"
			);

			self.events.emit(SyncEvent::QueueItemFailed {
				item_id: item.id.clone(),
				operation: item.operation.summary(),
				retries: item.retries,
				error: QUOTA_DROP_REASON.to_string(),
			});
			self.divergence.record(item).await;
		}
	}
}

#[async_trait::async_trait]
impl crate::service::Service for SyncQueue {
	fn name(&self) -> &'static str {
		"sync_queue"
	}

	fn is_running(&self) -> bool {
		self.is_running.load(Ordering::SeqCst)
	}

	async fn start(&self) -> Result<()> {
		if self.is_running.swap(true, Ordering::SeqCst) {
			warn!("Sync queue already running");
			return Ok(());
		}

		let inner = self.inner.clone();
		let shutdown_rx = inner.shutdown_tx.subscribe();

		tokio::spawn(Self::run_drain_loop(inner, shutdown_rx));

		Ok(())
	}

	async fn stop(&self) -> Result<()> {
		if !self.is_running.swap(false, Ordering::SeqCst) {
			return Ok(());
		}

		info!("Stopping sync queue worker");
		let _ = self.inner.shutdown_tx.send(());

		Ok(())
	}
}
