//! Replication Service
//!
//! Moves whole subtrees between the Local Store and the remote mirror. An
//! upload pass walks the caller's visible assets and inserts whatever the
//! backend does not have yet; a download pass fetches the remote tree and
//! merges it last-write-wins. Entity-level failures are counted and skipped,
//! only a failure to reach the backend at all fails a pass.
//!
//! Passes are serialized by a [`SessionGuard`]. A pass refused because another
//! one is running, because of the download cooldown or because of failure
//! backoff reports success with a zero count.

mod download;
mod merge;
mod session;
mod upload;

use std::sync::{
	atomic::{AtomicBool, Ordering},
	Arc,
};

use anyhow::Result;
use hs_cloud_api::RemoteBackendExt;
use serde::Serialize;
use tokio::{sync::broadcast, time::MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::{
	access::{AccessContext, AccessError},
	config::ReplicationConfig,
	infra::{
		event::{SkipReason, SyncDirection, SyncEvent, SyncEventBus},
		remote::{timed, RowError},
	},
	store::{EntityKind, LocalStore, StoreError},
};

pub(crate) use session::SessionGuard;

#[derive(thiserror::Error, Debug)]
pub enum ReplicationError {
	#[error(transparent)]
	Access(#[from] AccessError),
	#[error("remote request failed: {0}")]
	Remote(#[from] hs_cloud_api::Error),
	#[error(transparent)]
	Row(#[from] RowError),
	#[error(transparent)]
	Store(#[from] StoreError),
	#[error("invalid scan payload: {0}")]
	Payload(String),
}

/// Entities transferred in one pass, per kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EntityTally {
	pub assets: usize,
	pub vessels: usize,
	pub strakes: usize,
	pub images: usize,
	pub scans: usize,
	pub log_entries: usize,
	pub reports: usize,
}

impl EntityTally {
	pub fn record(&mut self, kind: EntityKind, n: usize) {
		match kind {
			EntityKind::Asset => self.assets += n,
			EntityKind::Vessel | EntityKind::VesselModel => self.vessels += n,
			EntityKind::Strake => self.strakes += n,
			EntityKind::VesselImage => self.images += n,
			EntityKind::Scan | EntityKind::ScanStrakeAssignment => self.scans += n,
			EntityKind::ScanningLogEntry => self.log_entries += n,
			EntityKind::VesselReport => self.reports += n,
			EntityKind::Drawing => {}
		}
	}

	pub fn total(&self) -> usize {
		self.assets
			+ self.vessels
			+ self.strakes
			+ self.images
			+ self.scans
			+ self.log_entries
			+ self.reports
	}
}

/// Outcome of one replication pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncReport {
	pub success: bool,
	/// Entities transferred.
	pub count: usize,
	pub cooldown: bool,
	pub backoff: bool,
	pub in_progress: bool,
	pub tally: EntityTally,
	/// Entities left alone because the other side already had them.
	pub skipped: usize,
	/// Entities that could not be transferred.
	pub failed: usize,
	pub errors: Vec<String>,
}

impl SyncReport {
	fn refused(reason: SkipReason) -> Self {
		Self {
			success: true,
			cooldown: reason == SkipReason::Cooldown,
			backoff: reason == SkipReason::Backoff,
			in_progress: reason == SkipReason::InProgress,
			..Default::default()
		}
	}

	pub fn is_skipped(&self) -> bool {
		self.cooldown || self.backoff || self.in_progress
	}

	pub(crate) fn transferred(&mut self, kind: EntityKind, n: usize) {
		self.tally.record(kind, n);
	}

	pub(crate) fn fail(&mut self, kind: EntityKind, id: &str, error: impl std::fmt::Display) {
		warn!(%kind, %id, %error, "Skipping entity");

		self.failed += 1;
		self.errors.push(format!("{kind} {id}: {error}"));
	}

	fn finish(mut self) -> Self {
		self.count = self.tally.total();
		self.success = self.failed == 0;
		self
	}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadOptions {
	/// Fetch assets only, without their vessels.
	pub metadata_only: bool,
	/// Ignore the download cooldown. Failure backoff still applies.
	pub force: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FullSyncReport {
	pub upload: SyncReport,
	pub download: SyncReport,
}

pub struct ReplicationService {
	inner: Arc<ReplicationInner>,
	is_running: Arc<AtomicBool>,
	shutdown_tx: broadcast::Sender<()>,
}

struct ReplicationInner {
	store: Arc<LocalStore>,
	events: SyncEventBus,
	config: ReplicationConfig,
	guard: SessionGuard,
}

impl ReplicationService {
	pub fn new(store: Arc<LocalStore>, events: SyncEventBus, config: ReplicationConfig) -> Self {
		let (shutdown_tx, _) = broadcast::channel(1);

		Self {
			inner: Arc::new(ReplicationInner {
				guard: SessionGuard::new(&config),
				store,
				events,
				config,
			}),
			is_running: Arc::new(AtomicBool::new(false)),
			shutdown_tx,
		}
	}

	pub fn is_syncing(&self) -> bool {
		self.inner.guard.is_in_progress()
	}

	pub async fn download_all(&self, options: DownloadOptions) -> Result<SyncReport, ReplicationError> {
		self.inner.download_all(options).await
	}

	pub async fn upload_all(&self) -> Result<SyncReport, ReplicationError> {
		self.inner.upload_all().await
	}

	/// Upload, then a forced download so the local tree reflects the merged
	/// remote state.
	pub async fn sync_all(&self) -> Result<FullSyncReport, ReplicationError> {
		let upload = self.inner.upload_all().await?;
		let download = self
			.inner
			.download_all(DownloadOptions {
				metadata_only: false,
				force: true,
			})
			.await?;

		Ok(FullSyncReport { upload, download })
	}

	/// Fetches an externalized scan payload into the local tree. Returns
	/// `false` if the scan already holds its payload inline.
	pub async fn hydrate_scan_data(&self, scan_id: &str) -> Result<bool, ReplicationError> {
		self.inner.hydrate_scan_data(scan_id).await
	}

	async fn run_download_loop(
		inner: Arc<ReplicationInner>,
		period: std::time::Duration,
		mut shutdown_rx: broadcast::Receiver<()>,
	) {
		let mut interval = tokio::time::interval(period);
		interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

		info!(?period, "Periodic download started");

		loop {
			tokio::select! {
				_ = shutdown_rx.recv() => break,
				_ = interval.tick() => {}
			}

			if inner.store.access().is_err() {
				debug!("No session, skipping periodic download");
				continue;
			}

			if let Err(e) = inner.download_all(DownloadOptions::default()).await {
				warn!(error = %e, "Periodic download failed");
			}
		}

		info!("Periodic download stopped");
	}
}

impl ReplicationInner {
	fn refuse(&self, direction: SyncDirection, reason: SkipReason) -> SyncReport {
		debug!(?direction, ?reason, "Replication pass skipped");

		self.events
			.emit(SyncEvent::ReplicationSkipped { direction, reason });

		SyncReport::refused(reason)
	}

	fn report_finished(&self, direction: SyncDirection, report: &SyncReport) {
		info!(
			?direction,
			success = report.success,
			count = report.count,
			skipped = report.skipped,
			failed = report.failed,
			"Replication pass finished"
		);

		self.events.emit(SyncEvent::ReplicationFinished {
			direction,
			success: report.success,
			count: report.count,
			failed: report.failed,
		});
	}

	/// Runs `pass` under a session permit.
	async fn run_pass<F, Fut>(
		&self,
		direction: SyncDirection,
		force: bool,
		pass: F,
	) -> Result<SyncReport, ReplicationError>
	where
		F: FnOnce(AccessContext) -> Fut,
		Fut: std::future::Future<Output = Result<SyncReport, ReplicationError>>,
	{
		let access = self.store.access()?;

		let permit = match self.guard.try_begin(direction, force) {
			Ok(permit) => permit,
			Err(reason) => return Ok(self.refuse(direction, reason)),
		};

		info!(?direction, scope = ?access.scope, "Replication pass started");
		self.events.emit(SyncEvent::ReplicationStarted { direction });

		match pass(access).await {
			Ok(report) => {
				let report = report.finish();
				permit.finish(report.success);
				self.report_finished(direction, &report);

				Ok(report)
			}
			Err(e) => {
				permit.finish(false);
				warn!(?direction, error = %e, "Replication pass failed");

				self.events.emit(SyncEvent::ReplicationFinished {
					direction,
					success: false,
					count: 0,
					failed: 0,
				});

				Err(e)
			}
		}
	}

	async fn download_all(&self, options: DownloadOptions) -> Result<SyncReport, ReplicationError> {
		self.run_pass(SyncDirection::Download, options.force, |access| {
			self.download(access, options)
		})
		.await
	}

	async fn upload_all(&self) -> Result<SyncReport, ReplicationError> {
		self.run_pass(SyncDirection::Upload, false, |access| self.upload(access))
			.await
	}

	async fn hydrate_scan_data(&self, scan_id: &str) -> Result<bool, ReplicationError> {
		let access = self.store.access()?;

		let url = {
			let document = self.store.snapshot();
			let scan = crate::store::visible_assets(&document, &access.scope)
				.flat_map(|asset| asset.vessels.iter())
				.find_map(|vessel| vessel.scan(scan_id))
				.ok_or_else(|| StoreError::not_found(EntityKind::Scan, scan_id))?;

			if scan.data.is_some() {
				return Ok(false);
			}

			scan.data_url.clone().ok_or_else(|| {
				ReplicationError::Payload(format!("scan '{scan_id}' has neither data nor data_url"))
			})?
		};

		let bytes = timed(
			self.config.blob_timeout(),
			self.store.gateway().blobs().download(&url),
		)
		.await?;
		let data: serde_json::Value =
			serde_json::from_slice(&bytes).map_err(|e| ReplicationError::Payload(e.to_string()))?;

		let hydrated = self
			.store
			.apply_remote(|document, _| {
				let scan = document
					.values_mut()
					.flat_map(|data| data.assets.iter_mut())
					.flat_map(|asset| asset.vessels.iter_mut())
					.find_map(|vessel| vessel.scan_mut(scan_id));

				match scan {
					Some(scan) => {
						scan.data = Some(data);
						true
					}
					None => false,
				}
			})
			.await?;

		debug!(%scan_id, hydrated, "Hydrated scan payload");

		Ok(hydrated)
	}

	/// Whether the backend has a row with `id`, bounded by the query timeout.
	async fn exists(&self, table: hs_cloud_api::Table, id: &str) -> Result<bool, hs_cloud_api::Error> {
		timed(
			self.config.query_timeout(),
			self.store.gateway().backend().exists(table, id),
		)
		.await
	}
}

#[async_trait::async_trait]
impl crate::service::Service for ReplicationService {
	fn name(&self) -> &'static str {
		"replication"
	}

	fn is_running(&self) -> bool {
		self.is_running.load(Ordering::SeqCst)
	}

	async fn start(&self) -> Result<()> {
		if self.is_running.swap(true, Ordering::SeqCst) {
			warn!("Replication service already running");
			return Ok(());
		}

		if let Some(period) = self.inner.config.auto_download_interval() {
			let inner = self.inner.clone();
			let shutdown_rx = self.shutdown_tx.subscribe();

			tokio::spawn(Self::run_download_loop(inner, period, shutdown_rx));
		}

		Ok(())
	}

	async fn stop(&self) -> Result<()> {
		if !self.is_running.swap(false, Ordering::SeqCst) {
			return Ok(());
		}

		info!("Stopping replication service");
		let _ = self.shutdown_tx.send(());

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn refused_passes_report_success_with_nothing_transferred() {
		let report = SyncReport::refused(SkipReason::Cooldown);

		assert!(report.success);
		assert!(report.cooldown);
		assert!(report.is_skipped());
		assert_eq!(report.count, 0);
	}

	#[test]
	fn failures_mark_the_pass_unsuccessful() {
		let mut report = SyncReport::default();
		report.transferred(EntityKind::Asset, 2);
		report.transferred(EntityKind::Scan, 3);
		report.fail(EntityKind::Vessel, "v1", "request timed out");

		let report = report.finish();

		assert!(!report.success);
		assert_eq!(report.count, 5);
		assert_eq!(report.tally.scans, 3);
		assert_eq!(report.errors, vec!["vessel v1: request timed out".to_string()]);
	}
}
