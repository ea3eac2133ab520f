//! Download pass: remote rows to local tree.

use std::fmt::Display;

use hs_cloud_api::{
	AssetRow, Query, RemoteBackendExt, ScanRow, ScanningLogEntryRow, StrakeRow, Table,
	VesselImageRow, VesselReportRow, VesselRow,
};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::{merge, DownloadOptions, ReplicationError, ReplicationInner, SyncReport};
use crate::{
	access::{AccessContext, TenantScope},
	domain::{Asset, Scan, ScanningLogEntry, Strake, Vessel, VesselImage, VesselReport},
	infra::remote::timed,
	store::EntityKind,
};

/// Converts fetched rows, skipping the ones that do not map to an entity.
fn convert<R, T>(kind: EntityKind, vessel_id: &str, rows: Vec<R>, report: &mut SyncReport) -> Vec<T>
where
	T: TryFrom<R>,
	T::Error: Display,
{
	let mut entities = Vec::with_capacity(rows.len());

	for row in rows {
		match T::try_from(row) {
			Ok(entity) => entities.push(entity),
			Err(e) => report.fail(kind, vessel_id, e),
		}
	}

	report.transferred(kind, entities.len());

	entities
}

impl ReplicationInner {
	pub(super) async fn download(
		&self,
		access: AccessContext,
		options: DownloadOptions,
	) -> Result<SyncReport, ReplicationError> {
		let mut report = SyncReport::default();

		let mut assets = self.fetch_assets(&access.scope).await?;
		report.transferred(EntityKind::Asset, assets.len());

		if !options.metadata_only {
			for asset in assets.iter_mut() {
				self.fill_asset(asset, &mut report).await;
			}
		}

		self.store
			.apply_remote(|document, pending| merge::merge_assets(document, assets, pending))
			.await?;

		Ok(report)
	}

	async fn fetch<T: DeserializeOwned + Send + 'static>(
		&self,
		query: &Query,
	) -> Result<Vec<T>, hs_cloud_api::Error> {
		timed(
			self.config.query_timeout(),
			self.store.gateway().backend().fetch(query),
		)
		.await
	}

	/// The caller's assets. SYSTEM members get every organization's.
	async fn fetch_assets(&self, scope: &TenantScope) -> Result<Vec<Asset>, ReplicationError> {
		let mut query = Query::table(Table::Assets).order_by("created_at", true);
		if let TenantScope::Organization(organization_id) = scope {
			query = query.eq("organization_id", organization_id.clone());
		}

		let rows: Vec<AssetRow> = self.fetch(&query).await?;

		let assets = rows
			.into_iter()
			.filter(|row| scope.includes(&row.organization_id))
			.map(Asset::from)
			.collect::<Vec<_>>();

		debug!(assets = assets.len(), "Fetched remote assets");

		Ok(assets)
	}

	async fn fill_asset(&self, asset: &mut Asset, report: &mut SyncReport) {
		let query = Query::table(Table::Vessels)
			.eq("asset_id", asset.id.clone())
			.order_by("created_at", true);

		let rows: Vec<VesselRow> = match self.fetch(&query).await {
			Ok(rows) => rows,
			Err(e) => {
				report.fail(EntityKind::Asset, &asset.id, e);
				return;
			}
		};

		for row in rows {
			let mut vessel = Vessel::from(row);
			self.fill_vessel(&mut vessel, report).await;

			report.transferred(EntityKind::Vessel, 1);
			asset.vessels.push(vessel);
		}
	}

	async fn fill_vessel(&self, vessel: &mut Vessel, report: &mut SyncReport) {
		let vessel_id = vessel.id.clone();

		vessel.strakes = self
			.fetch_children::<StrakeRow, Strake>(EntityKind::Strake, Table::Strakes, &vessel_id, report)
			.await;
		vessel.images = self
			.fetch_children::<VesselImageRow, VesselImage>(
				EntityKind::VesselImage,
				Table::VesselImages,
				&vessel_id,
				report,
			)
			.await;
		vessel.scanning_log = self
			.fetch_children::<ScanningLogEntryRow, ScanningLogEntry>(
				EntityKind::ScanningLogEntry,
				Table::ScanningLogEntries,
				&vessel_id,
				report,
			)
			.await;
		vessel.reports = self
			.fetch_children::<VesselReportRow, VesselReport>(
				EntityKind::VesselReport,
				Table::VesselReports,
				&vessel_id,
				report,
			)
			.await;
		vessel.scans = self.fetch_scans(&vessel_id, report).await;
	}

	async fn fetch_children<R, T>(
		&self,
		kind: EntityKind,
		table: Table,
		vessel_id: &str,
		report: &mut SyncReport,
	) -> Vec<T>
	where
		R: DeserializeOwned + Send + 'static,
		T: TryFrom<R> + Send,
		T::Error: Display,
	{
		let query = Query::table(table)
			.eq("vessel_id", vessel_id)
			.order_by("created_at", true);

		match self.fetch::<R>(&query).await {
			Ok(rows) => convert(kind, vessel_id, rows, report),
			Err(e) => {
				report.fail(kind, vessel_id, e);
				vec![]
			}
		}
	}

	/// Scans are fetched page by page. A failed page ends pagination but the
	/// pages already fetched are kept.
	async fn fetch_scans(&self, vessel_id: &str, report: &mut SyncReport) -> Vec<Scan> {
		let page_size = self.config.page_size.max(1);
		let mut rows: Vec<ScanRow> = vec![];

		loop {
			let offset = rows.len();
			let query = Query::table(Table::Scans)
				.eq("vessel_id", vessel_id)
				.order_by("created_at", true)
				.range(offset, offset + page_size - 1);

			match self.fetch::<ScanRow>(&query).await {
				Ok(page) => {
					let fetched = page.len();
					rows.extend(page);

					debug!(%vessel_id, offset, fetched, "Fetched scan page");

					if fetched < page_size {
						break;
					}
				}
				Err(e) => {
					warn!(
						%vessel_id,
						kept = rows.len(),
						error = %e,
						"Scan pagination interrupted, keeping fetched pages"
					);
					report.fail(EntityKind::Scan, vessel_id, e);
					break;
				}
			}
		}

		convert(EntityKind::Scan, vessel_id, rows, report)
	}
}
