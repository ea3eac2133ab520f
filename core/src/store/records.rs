//! Cloud-first mutations: strakes, strake assignment, vessel images, scanning
//! log entries and reports. Each of these is written remotely before it
//! becomes visible locally.

use chrono::Utc;
use hs_cloud_api::{Bucket, Table};
use serde_json::json;
use tracing::{debug, warn};

use super::{
	mutations::require_name, tree, Applied, EntityKind, LocalStore, LogEntryPatch, NewLogEntry,
	NewReport, NewStrake, NewVesselImage, StoreError, StrakePatch,
};
use crate::{
	domain::{generate_id, BlobRef, ScanningLogEntry, Scan, Strake, VesselImage, VesselReport},
	infra::remote::{rows, SyncOperation, VesselPath},
};

fn check_area(total_area: f64, required_coverage: f64) -> Result<(), StoreError> {
	if !total_area.is_finite() || total_area < 0.0 {
		return Err(StoreError::Invalid(format!("total area {total_area} must be >= 0")));
	}

	if !required_coverage.is_finite() || !(0.0..=100.0).contains(&required_coverage) {
		return Err(StoreError::Invalid(format!(
			"required coverage {required_coverage} must be within 0..=100"
		)));
	}

	Ok(())
}

impl LocalStore {
	pub async fn create_strake(
		&self,
		asset_id: &str,
		vessel_id: &str,
		input: NewStrake,
	) -> Result<Strake, StoreError> {
		require_name(&input.name)?;
		check_area(input.total_area, input.required_coverage)?;

		let id = input.id.unwrap_or_else(generate_id);
		let record_id = id.clone();

		self.dispatch(EntityKind::Strake, &record_id, move |access, document| {
			let (_, vessel) = tree::find_vessel_mut(document, access, asset_id, vessel_id)?;

			if let Some(existing) = vessel.strake(&id) {
				return Ok(Applied::unchanged(existing.clone()));
			}

			let strake = Strake {
				id,
				name: input.name,
				total_area: input.total_area,
				required_coverage: input.required_coverage,
				created_at: Utc::now(),
				updated_at: None,
			};

			let writes = rows::strake_plan(vessel_id, &strake)?.into_operations();
			vessel.strakes.push(strake.clone());

			Ok(Applied::changed(strake, writes))
		})
		.await
	}

	pub async fn update_strake(
		&self,
		asset_id: &str,
		vessel_id: &str,
		strake_id: &str,
		patch: StrakePatch,
	) -> Result<Strake, StoreError> {
		if let Some(name) = &patch.name {
			require_name(name)?;
		}

		self.dispatch(EntityKind::Strake, strake_id, move |access, document| {
			let (_, vessel) = tree::find_vessel_mut(document, access, asset_id, vessel_id)?;
			let strake = vessel
				.strake_mut(strake_id)
				.ok_or_else(|| StoreError::not_found(EntityKind::Strake, strake_id))?;

			if let Some(name) = patch.name {
				strake.name = name;
			}
			if let Some(total_area) = patch.total_area {
				strake.total_area = total_area;
			}
			if let Some(required_coverage) = patch.required_coverage {
				strake.required_coverage = required_coverage;
			}
			check_area(strake.total_area, strake.required_coverage)?;
			strake.updated_at = Some(Utc::now());

			let writes = rows::strake_plan(vessel_id, strake)?.into_update_operations();

			Ok(Applied::changed(strake.clone(), writes))
		})
		.await
	}

	/// Removes a strake and clears the assignment of every scan pointing at it.
	pub async fn delete_strake(
		&self,
		asset_id: &str,
		vessel_id: &str,
		strake_id: &str,
	) -> Result<(), StoreError> {
		self.dispatch(EntityKind::Strake, strake_id, |access, document| {
			let (_, vessel) = tree::find_vessel_mut(document, access, asset_id, vessel_id)?;

			if vessel.strake(strake_id).is_none() {
				return Err(StoreError::not_found(EntityKind::Strake, strake_id));
			}

			let mut writes = vec![];
			for scan in vessel
				.scans
				.iter_mut()
				.filter(|scan| scan.strake_id.as_deref() == Some(strake_id))
			{
				scan.strake_id = None;
				writes.push(SyncOperation::update(
					Table::Scans,
					scan.id.clone(),
					json!({ "strake_id": null }),
				));
			}

			vessel.strakes.retain(|strake| strake.id != strake_id);
			writes.push(SyncOperation::delete(Table::Strakes, strake_id));

			Ok(Applied::changed((), writes))
		})
		.await
	}

	/// Assigns a scan to a strake of the same vessel, or clears the assignment.
	pub async fn assign_scan_to_strake(
		&self,
		asset_id: &str,
		vessel_id: &str,
		scan_id: &str,
		strake_id: Option<&str>,
	) -> Result<Scan, StoreError> {
		self.dispatch(
			EntityKind::ScanStrakeAssignment,
			scan_id,
			|access, document| {
				let (_, vessel) = tree::find_vessel_mut(document, access, asset_id, vessel_id)?;

				if let Some(strake_id) = strake_id {
					if vessel.strake(strake_id).is_none() {
						return Err(StoreError::InvalidReference {
							kind: EntityKind::Strake,
							id: strake_id.to_string(),
							vessel_id: vessel_id.to_string(),
						});
					}
				}

				let scan = vessel
					.scan_mut(scan_id)
					.ok_or_else(|| StoreError::not_found(EntityKind::Scan, scan_id))?;

				if scan.strake_id.as_deref() == strake_id {
					return Ok(Applied::unchanged(scan.clone()));
				}

				scan.strake_id = strake_id.map(str::to_string);
				scan.updated_at = Some(Utc::now());

				let write = SyncOperation::update(
					Table::Scans,
					scan_id,
					json!({ "strake_id": scan.strake_id }),
				);

				Ok(Applied::changed(scan.clone(), vec![write]))
			},
		)
		.await
	}

	/// Adds an image. Inline bytes are uploaded to `vessel-images` first and the
	/// local record only ever holds the remote reference. If the row insert is
	/// then rejected the uploaded object is removed again.
	pub async fn add_vessel_image(
		&self,
		asset_id: &str,
		vessel_id: &str,
		input: NewVesselImage,
	) -> Result<VesselImage, StoreError> {
		require_name(&input.name)?;

		let id = input.id.unwrap_or_else(generate_id);
		let access = self.access()?;

		let (organization_id, existing) = {
			let document = self.read();
			let (asset, vessel) = tree::find_vessel(&document, &access, asset_id, vessel_id)?;
			access.authorize_write(&asset.organization_id)?;

			let existing = vessel.images.iter().find(|image| image.id == id).cloned();

			(asset.organization_id.clone(), existing)
		};

		if let Some(existing) = existing {
			return Ok(existing);
		}

		let mut image = VesselImage {
			id: id.clone(),
			name: input.name,
			timestamp: Utc::now(),
			image: input.image,
			filename: input.filename,
		};

		let mut uploaded = None;

		if let BlobRef::Inline {
			content_type,
			bytes,
		} = &image.image
		{
			let path = VesselPath {
				organization_id: &organization_id,
				asset_id,
				vessel_id,
			}
			.object(&rows::image_object_name(&image));

			let url = self
				.gateway()
				.upload(
					Bucket::VesselImages,
					&path,
					bytes.clone(),
					content_type,
					self.options().cloud_first_timeout,
				)
				.await
				.map_err(|e| self.rolled_back(EntityKind::VesselImage, &id, e))?;

			uploaded = Some(url.clone());
			image.image = BlobRef::remote(url);
		}

		let added = self.dispatch(EntityKind::VesselImage, &id, move |access, document| {
			let (organization_id, vessel) =
				tree::find_vessel_mut(document, access, asset_id, vessel_id)?;

			if let Some(existing) = vessel.images.iter().find(|existing| existing.id == image.id) {
				return Ok(Applied::unchanged(existing.clone()));
			}

			let path = VesselPath {
				organization_id: &organization_id,
				asset_id,
				vessel_id,
			};
			let writes = rows::image_plan(path, &image)?.into_operations();
			vessel.images.push(image.clone());

			Ok(Applied::changed(image, writes))
		})
		.await;

		if let (Err(_), Some(url)) = (&added, &uploaded) {
			self.discard_blob(url).await;
		}

		added
	}

	/// Best-effort removal of an object whose row never made it.
	async fn discard_blob(&self, url: &str) {
		match self
			.gateway()
			.delete_blob(url, self.options().cloud_first_timeout)
			.await
		{
			Ok(()) => debug!(%url, "Removed uploaded object after rollback"),
			Err(e) => warn!(%url, error = %e, "Uploaded object left orphaned after rollback"),
		}
	}

	pub async fn delete_vessel_image(
		&self,
		asset_id: &str,
		vessel_id: &str,
		image_id: &str,
	) -> Result<(), StoreError> {
		self.dispatch(EntityKind::VesselImage, image_id, |access, document| {
			let (_, vessel) = tree::find_vessel_mut(document, access, asset_id, vessel_id)?;

			let before = vessel.images.len();
			vessel.images.retain(|image| image.id != image_id);
			if vessel.images.len() == before {
				return Err(StoreError::not_found(EntityKind::VesselImage, image_id));
			}

			Ok(Applied::changed(
				(),
				vec![SyncOperation::delete(Table::VesselImages, image_id)],
			))
		})
		.await
	}

	pub async fn add_scanning_log_entry(
		&self,
		asset_id: &str,
		vessel_id: &str,
		input: NewLogEntry,
	) -> Result<ScanningLogEntry, StoreError> {
		let id = input.id.unwrap_or_else(generate_id);
		let record_id = id.clone();

		self.dispatch(EntityKind::ScanningLogEntry, &record_id, move |access, document| {
			let (_, vessel) = tree::find_vessel_mut(document, access, asset_id, vessel_id)?;

			if let Some(existing) = vessel.scanning_log.iter().find(|entry| entry.id == id) {
				return Ok(Applied::unchanged(existing.clone()));
			}

			let entry = ScanningLogEntry {
				id,
				timestamp: Utc::now(),
				operator: input.operator,
				method: input.method,
				notes: input.notes,
			};

			let writes = rows::log_entry_plan(vessel_id, &entry)?.into_operations();
			vessel.scanning_log.push(entry.clone());

			Ok(Applied::changed(entry, writes))
		})
		.await
	}

	pub async fn update_scanning_log_entry(
		&self,
		asset_id: &str,
		vessel_id: &str,
		entry_id: &str,
		patch: LogEntryPatch,
	) -> Result<ScanningLogEntry, StoreError> {
		self.dispatch(EntityKind::ScanningLogEntry, entry_id, move |access, document| {
			let (_, vessel) = tree::find_vessel_mut(document, access, asset_id, vessel_id)?;
			let entry = vessel
				.scanning_log
				.iter_mut()
				.find(|entry| entry.id == entry_id)
				.ok_or_else(|| StoreError::not_found(EntityKind::ScanningLogEntry, entry_id))?;

			if patch.operator.is_some() {
				entry.operator = patch.operator;
			}
			if patch.method.is_some() {
				entry.method = patch.method;
			}
			if patch.notes.is_some() {
				entry.notes = patch.notes;
			}

			let writes = rows::log_entry_plan(vessel_id, entry)?.into_update_operations();

			Ok(Applied::changed(entry.clone(), writes))
		})
		.await
	}

	pub async fn delete_scanning_log_entry(
		&self,
		asset_id: &str,
		vessel_id: &str,
		entry_id: &str,
	) -> Result<(), StoreError> {
		self.dispatch(EntityKind::ScanningLogEntry, entry_id, |access, document| {
			let (_, vessel) = tree::find_vessel_mut(document, access, asset_id, vessel_id)?;

			let before = vessel.scanning_log.len();
			vessel.scanning_log.retain(|entry| entry.id != entry_id);
			if vessel.scanning_log.len() == before {
				return Err(StoreError::not_found(EntityKind::ScanningLogEntry, entry_id));
			}

			Ok(Applied::changed(
				(),
				vec![SyncOperation::delete(Table::ScanningLogEntries, entry_id)],
			))
		})
		.await
	}

	pub async fn add_vessel_report(
		&self,
		asset_id: &str,
		vessel_id: &str,
		input: NewReport,
	) -> Result<VesselReport, StoreError> {
		require_name(&input.title)?;

		let id = input.id.unwrap_or_else(generate_id);
		let record_id = id.clone();

		self.dispatch(EntityKind::VesselReport, &record_id, move |access, document| {
			let (_, vessel) = tree::find_vessel_mut(document, access, asset_id, vessel_id)?;

			if let Some(existing) = vessel.reports.iter().find(|report| report.id == id) {
				return Ok(Applied::unchanged(existing.clone()));
			}

			let report = VesselReport {
				id,
				timestamp: Utc::now(),
				title: input.title,
				data: input.data,
			};

			let writes = rows::report_plan(vessel_id, &report)?.into_operations();
			vessel.reports.push(report.clone());

			Ok(Applied::changed(report, writes))
		})
		.await
	}

	pub async fn delete_vessel_report(
		&self,
		asset_id: &str,
		vessel_id: &str,
		report_id: &str,
	) -> Result<(), StoreError> {
		self.dispatch(EntityKind::VesselReport, report_id, |access, document| {
			let (_, vessel) = tree::find_vessel_mut(document, access, asset_id, vessel_id)?;

			let before = vessel.reports.len();
			vessel.reports.retain(|report| report.id != report_id);
			if vessel.reports.len() == before {
				return Err(StoreError::not_found(EntityKind::VesselReport, report_id));
			}

			Ok(Applied::changed(
				(),
				vec![SyncOperation::delete(Table::VesselReports, report_id)],
			))
		})
		.await
	}
}
