//! Upload pass: local tree to remote rows.
//!
//! Parents go before children so foreign keys always resolve. A parent that
//! cannot be confirmed remotely takes its children out of the pass.

use hs_cloud_api::{Error, Table};
use tracing::debug;

use super::{ReplicationError, ReplicationInner, SyncReport};
use crate::{
	access::AccessContext,
	infra::remote::{rows, timed, RowError, RowPlan, VesselPath},
	store::{visible_assets, EntityKind},
};

impl ReplicationInner {
	pub(super) async fn upload(&self, access: AccessContext) -> Result<SyncReport, ReplicationError> {
		let document = self.store.snapshot();
		let threshold = self.store.options().inline_payload_threshold;
		let mut report = SyncReport::default();

		for asset in visible_assets(&document, &access.scope) {
			if !self
				.push(EntityKind::Asset, &asset.id, rows::asset_plan(asset), &mut report)
				.await
			{
				continue;
			}

			for vessel in &asset.vessels {
				let path = VesselPath {
					organization_id: &asset.organization_id,
					asset_id: &asset.id,
					vessel_id: &vessel.id,
				};

				if !self
					.push(
						EntityKind::Vessel,
						&vessel.id,
						rows::vessel_plan(path, vessel),
						&mut report,
					)
					.await
				{
					continue;
				}

				for strake in &vessel.strakes {
					self.push(
						EntityKind::Strake,
						&strake.id,
						rows::strake_plan(&vessel.id, strake),
						&mut report,
					)
					.await;
				}

				for image in &vessel.images {
					self.push(
						EntityKind::VesselImage,
						&image.id,
						rows::image_plan(path, image),
						&mut report,
					)
					.await;
				}

				for scan in &vessel.scans {
					self.push(
						EntityKind::Scan,
						&scan.id,
						rows::scan_plan(path, scan, threshold),
						&mut report,
					)
					.await;
				}

				for entry in &vessel.scanning_log {
					self.push(
						EntityKind::ScanningLogEntry,
						&entry.id,
						rows::log_entry_plan(&vessel.id, entry),
						&mut report,
					)
					.await;
				}

				for vessel_report in &vessel.reports {
					self.push(
						EntityKind::VesselReport,
						&vessel_report.id,
						rows::report_plan(&vessel.id, vessel_report),
						&mut report,
					)
					.await;
				}
			}
		}

		Ok(report)
	}

	/// Inserts the row unless the backend already has it, uploading its blobs
	/// first. Returns whether the row exists remotely afterwards.
	async fn push(
		&self,
		kind: EntityKind,
		id: &str,
		plan: Result<RowPlan, RowError>,
		report: &mut SyncReport,
	) -> bool {
		let mut plan = match plan {
			Ok(plan) => plan,
			Err(e) => {
				report.fail(kind, id, e);
				return false;
			}
		};

		match self.exists(plan.table, id).await {
			Ok(true) => {
				report.skipped += 1;
				return true;
			}
			Ok(false) => {}
			Err(e) => {
				report.fail(kind, id, e);
				return false;
			}
		}

		for upload in std::mem::take(&mut plan.uploads) {
			let url = self
				.store
				.gateway()
				.upload(
					upload.bucket,
					&upload.path,
					upload.bytes,
					&upload.content_type,
					self.config.blob_timeout(),
				)
				.await;

			match url {
				Ok(url) => plan.set_url(upload.column, url),
				Err(e) => {
					report.fail(kind, id, e);
					return false;
				}
			}
		}

		match self.insert(plan.table, plan.row).await {
			Ok(()) => {
				debug!(%kind, %id, "Uploaded entity");
				report.transferred(kind, 1);
				true
			}
			Err(Error::Conflict(_)) => {
				report.skipped += 1;
				true
			}
			Err(e) => {
				report.fail(kind, id, e);
				false
			}
		}
	}

	async fn insert(&self, table: Table, row: serde_json::Value) -> Result<(), Error> {
		timed(
			self.config.query_timeout(),
			self.store.gateway().backend().insert(table, row),
		)
		.await
	}
}
