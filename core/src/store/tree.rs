//! Lookups into the organization-partitioned document.

use super::{EntityKind, StoreError};
use crate::{
	access::{AccessContext, TenantScope},
	domain::{Asset, Document, Vessel},
};

/// Assets visible under `scope`, in bucket order.
pub(crate) fn visible_assets<'a>(
	document: &'a Document,
	scope: &'a TenantScope,
) -> impl Iterator<Item = &'a Asset> + 'a {
	document
		.iter()
		.filter(move |(organization_id, _)| scope.includes(organization_id))
		.flat_map(|(_, data)| data.assets.iter())
		.filter(move |asset| scope.includes(&asset.organization_id))
}

pub(crate) fn find_asset<'a>(
	document: &'a Document,
	access: &AccessContext,
	asset_id: &str,
) -> Result<&'a Asset, StoreError> {
	let asset = document
		.values()
		.flat_map(|data| data.assets.iter())
		.find(|asset| asset.id == asset_id)
		.ok_or_else(|| StoreError::not_found(EntityKind::Asset, asset_id))?;

	access.authorize_read(&asset.organization_id)?;

	Ok(asset)
}

pub(crate) fn find_asset_mut<'a>(
	document: &'a mut Document,
	access: &AccessContext,
	asset_id: &str,
) -> Result<&'a mut Asset, StoreError> {
	let asset = document
		.values_mut()
		.flat_map(|data| data.assets.iter_mut())
		.find(|asset| asset.id == asset_id)
		.ok_or_else(|| StoreError::not_found(EntityKind::Asset, asset_id))?;

	access.authorize_write(&asset.organization_id)?;

	Ok(asset)
}

pub(crate) fn find_vessel<'a>(
	document: &'a Document,
	access: &AccessContext,
	asset_id: &str,
	vessel_id: &str,
) -> Result<(&'a Asset, &'a Vessel), StoreError> {
	let asset = find_asset(document, access, asset_id)?;
	let vessel = asset
		.vessel(vessel_id)
		.ok_or_else(|| StoreError::not_found(EntityKind::Vessel, vessel_id))?;

	Ok((asset, vessel))
}

/// Returns the owning organization id along with the vessel.
pub(crate) fn find_vessel_mut<'a>(
	document: &'a mut Document,
	access: &AccessContext,
	asset_id: &str,
	vessel_id: &str,
) -> Result<(String, &'a mut Vessel), StoreError> {
	let asset = find_asset_mut(document, access, asset_id)?;
	let organization_id = asset.organization_id.clone();
	let vessel = asset
		.vessel_mut(vessel_id)
		.ok_or_else(|| StoreError::not_found(EntityKind::Vessel, vessel_id))?;

	Ok((organization_id, vessel))
}
