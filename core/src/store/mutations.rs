//! Write-through mutations: assets, vessels and scans.

use chrono::Utc;
use hs_cloud_api::Table;
use serde_json::json;

use super::{
	tree, Applied, AssetPatch, EntityKind, LocalStore, NewAsset, NewScan, NewVessel, ScanPatch,
	StoreError, VesselPatch,
};
use crate::{
	domain::{generate_id, Asset, BlobRef, Drawing, Model3d, Scan, Vessel},
	infra::remote::{rows, SyncOperation, VesselPath},
};

pub(super) fn require_name(name: &str) -> Result<(), StoreError> {
	if name.trim().is_empty() {
		return Err(StoreError::Invalid("name must not be empty".to_string()));
	}

	Ok(())
}

impl LocalStore {
	pub async fn create_asset(&self, input: NewAsset) -> Result<Asset, StoreError> {
		require_name(&input.name)?;

		let id = input.id.unwrap_or_else(generate_id);
		let record_id = id.clone();

		self.dispatch(EntityKind::Asset, &record_id, move |access, document| {
			let organization_id = access.write_target(input.organization_id.as_deref())?;

			if let Some(existing) = document
				.values()
				.flat_map(|data| data.assets.iter())
				.find(|asset| asset.id == id)
			{
				access.authorize_read(&existing.organization_id)?;
				return Ok(Applied::unchanged(existing.clone()));
			}

			let asset = Asset {
				id,
				name: input.name,
				organization_id: organization_id.clone(),
				created_by: Some(access.user_id.clone()),
				created_at: Utc::now(),
				updated_at: None,
				vessels: vec![],
			};

			let writes = rows::asset_plan(&asset)?.into_operations();
			document
				.entry(organization_id)
				.or_default()
				.assets
				.push(asset.clone());

			Ok(Applied::changed(asset, writes))
		})
		.await
	}

	pub async fn update_asset(&self, asset_id: &str, patch: AssetPatch) -> Result<Asset, StoreError> {
		if let Some(name) = &patch.name {
			require_name(name)?;
		}

		self.dispatch(EntityKind::Asset, asset_id, |access, document| {
			let asset = tree::find_asset_mut(document, access, asset_id)?;

			if let Some(name) = patch.name {
				asset.name = name;
			}
			asset.updated_at = Some(Utc::now());

			let write = SyncOperation::update(
				Table::Assets,
				asset_id,
				json!({ "name": asset.name, "updated_at": asset.updated_at }),
			);

			Ok(Applied::changed(asset.clone(), vec![write]))
		})
		.await
	}

	pub async fn delete_asset(&self, asset_id: &str) -> Result<(), StoreError> {
		self.dispatch(EntityKind::Asset, asset_id, |access, document| {
			tree::find_asset_mut(document, access, asset_id)?;

			for data in document.values_mut() {
				data.assets.retain(|asset| asset.id != asset_id);
			}

			Ok(Applied::changed(
				(),
				vec![SyncOperation::delete(Table::Assets, asset_id)],
			))
		})
		.await
	}

	pub async fn create_vessel(&self, asset_id: &str, input: NewVessel) -> Result<Vessel, StoreError> {
		require_name(&input.name)?;

		let id = input.id.unwrap_or_else(generate_id);
		let record_id = id.clone();

		self.dispatch(EntityKind::Vessel, &record_id, move |access, document| {
			let asset = tree::find_asset_mut(document, access, asset_id)?;

			if let Some(existing) = asset.vessel(&id) {
				return Ok(Applied::unchanged(existing.clone()));
			}

			let vessel = Vessel::new(id, input.name, Utc::now());
			let path = VesselPath {
				organization_id: &asset.organization_id,
				asset_id,
				vessel_id: &vessel.id,
			};

			let writes = rows::vessel_plan(path, &vessel)?.into_operations();
			asset.vessels.push(vessel.clone());

			Ok(Applied::changed(vessel, writes))
		})
		.await
	}

	pub async fn update_vessel(
		&self,
		asset_id: &str,
		vessel_id: &str,
		patch: VesselPatch,
	) -> Result<Vessel, StoreError> {
		if let Some(name) = &patch.name {
			require_name(name)?;
		}

		self.dispatch(EntityKind::Vessel, vessel_id, |access, document| {
			let (_, vessel) = tree::find_vessel_mut(document, access, asset_id, vessel_id)?;

			if let Some(name) = patch.name {
				vessel.name = name;
			}
			vessel.updated_at = Some(Utc::now());

			let write =
				SyncOperation::update(Table::Vessels, vessel_id, json!({ "name": vessel.name }));

			Ok(Applied::changed(vessel.clone(), vec![write]))
		})
		.await
	}

	pub async fn delete_vessel(&self, asset_id: &str, vessel_id: &str) -> Result<(), StoreError> {
		self.dispatch(EntityKind::Vessel, vessel_id, |access, document| {
			let asset = tree::find_asset_mut(document, access, asset_id)?;

			let before = asset.vessels.len();
			asset.vessels.retain(|vessel| vessel.id != vessel_id);
			if asset.vessels.len() == before {
				return Err(StoreError::not_found(EntityKind::Vessel, vessel_id));
			}

			Ok(Applied::changed(
				(),
				vec![SyncOperation::delete(Table::Vessels, vessel_id)],
			))
		})
		.await
	}

	/// Attaches a 3D model. Inline model bytes are queued for upload to the
	/// `3d-models` bucket and linked to the vessel row afterwards.
	pub async fn set_vessel_model(
		&self,
		asset_id: &str,
		vessel_id: &str,
		filename: impl Into<String>,
		blob: BlobRef,
	) -> Result<Vessel, StoreError> {
		let filename = filename.into();
		require_name(&filename)?;

		self.dispatch(EntityKind::VesselModel, vessel_id, move |access, document| {
			let (organization_id, vessel) =
				tree::find_vessel_mut(document, access, asset_id, vessel_id)?;

			vessel.model3d = Some(Model3d { filename, blob });
			vessel.updated_at = Some(Utc::now());

			let path = VesselPath {
				organization_id: &organization_id,
				asset_id,
				vessel_id,
			};
			let writes = rows::vessel_plan(path, vessel)?.into_update_operations();

			Ok(Applied::changed(vessel.clone(), writes))
		})
		.await
	}

	/// Drawings are not mirrored remotely.
	pub async fn set_location_drawing(
		&self,
		asset_id: &str,
		vessel_id: &str,
		drawing: Option<Drawing>,
	) -> Result<(), StoreError> {
		self.dispatch(EntityKind::Drawing, vessel_id, move |access, document| {
			let (_, vessel) = tree::find_vessel_mut(document, access, asset_id, vessel_id)?;
			vessel.location_drawing = drawing;

			Ok(Applied::changed((), vec![]))
		})
		.await
	}

	pub async fn set_ga_drawing(
		&self,
		asset_id: &str,
		vessel_id: &str,
		drawing: Option<Drawing>,
	) -> Result<(), StoreError> {
		self.dispatch(EntityKind::Drawing, vessel_id, move |access, document| {
			let (_, vessel) = tree::find_vessel_mut(document, access, asset_id, vessel_id)?;
			vessel.ga_drawing = drawing;

			Ok(Applied::changed((), vec![]))
		})
		.await
	}

	pub async fn create_scan(
		&self,
		asset_id: &str,
		vessel_id: &str,
		input: NewScan,
	) -> Result<Scan, StoreError> {
		require_name(&input.name)?;

		let id = input.id.unwrap_or_else(generate_id);
		let record_id = id.clone();
		let threshold = self.options().inline_payload_threshold;

		self.dispatch(EntityKind::Scan, &record_id, move |access, document| {
			let (organization_id, vessel) =
				tree::find_vessel_mut(document, access, asset_id, vessel_id)?;

			if let Some(existing) = vessel.scan(&id) {
				return Ok(Applied::unchanged(existing.clone()));
			}

			if let Some(strake_id) = &input.strake_id {
				if vessel.strake(strake_id).is_none() {
					return Err(StoreError::InvalidReference {
						kind: EntityKind::Strake,
						id: strake_id.clone(),
						vessel_id: vessel_id.to_string(),
					});
				}
			}

			let scan = Scan {
				id,
				name: input.name,
				tool_type: input.tool_type,
				timestamp: Utc::now(),
				updated_at: None,
				data: input.data,
				data_url: None,
				thumbnail: input.thumbnail,
				heatmap_only: input.heatmap_only,
				strake_id: input.strake_id,
			};

			let path = VesselPath {
				organization_id: &organization_id,
				asset_id,
				vessel_id,
			};
			let writes = rows::scan_plan(path, &scan, threshold)?.into_operations();
			vessel.scans.push(scan.clone());

			Ok(Applied::changed(scan, writes))
		})
		.await
	}

	pub async fn update_scan(
		&self,
		asset_id: &str,
		vessel_id: &str,
		scan_id: &str,
		patch: ScanPatch,
	) -> Result<Scan, StoreError> {
		if let Some(name) = &patch.name {
			require_name(name)?;
		}

		let threshold = self.options().inline_payload_threshold;

		self.dispatch(EntityKind::Scan, scan_id, move |access, document| {
			let (organization_id, vessel) =
				tree::find_vessel_mut(document, access, asset_id, vessel_id)?;
			let scan = vessel
				.scan_mut(scan_id)
				.ok_or_else(|| StoreError::not_found(EntityKind::Scan, scan_id))?;

			if let Some(name) = patch.name {
				scan.name = name;
			}
			if let Some(data) = patch.data {
				scan.data = Some(data);
				scan.data_url = None;
			}
			if let Some(thumbnail) = patch.thumbnail {
				scan.thumbnail = Some(thumbnail);
			}
			if let Some(heatmap) = patch.heatmap_only {
				scan.heatmap_only = Some(heatmap);
			}
			scan.updated_at = Some(Utc::now());

			let path = VesselPath {
				organization_id: &organization_id,
				asset_id,
				vessel_id,
			};
			let writes = rows::scan_plan(path, scan, threshold)?.into_update_operations();

			Ok(Applied::changed(scan.clone(), writes))
		})
		.await
	}

	pub async fn delete_scan(
		&self,
		asset_id: &str,
		vessel_id: &str,
		scan_id: &str,
	) -> Result<(), StoreError> {
		self.dispatch(EntityKind::Scan, scan_id, |access, document| {
			let (_, vessel) = tree::find_vessel_mut(document, access, asset_id, vessel_id)?;

			let before = vessel.scans.len();
			vessel.scans.retain(|scan| scan.id != scan_id);
			if vessel.scans.len() == before {
				return Err(StoreError::not_found(EntityKind::Scan, scan_id));
			}

			Ok(Applied::changed(
				(),
				vec![SyncOperation::delete(Table::Scans, scan_id)],
			))
		})
		.await
	}
}
