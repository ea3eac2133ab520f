//! Inspection data model
//!
//! Organizations own assets, assets own vessels, and vessels own everything an
//! inspection produces (scans, strakes, images, log entries, reports). The whole
//! tree for one organization is a single [`OrgData`] document.

pub mod asset;
pub mod blob;
pub mod ids;
pub mod organization;
pub mod scan;
pub mod strake;
pub mod vessel;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use asset::Asset;
pub use blob::BlobRef;
pub use ids::generate_id;
pub use organization::{Organization, SYSTEM_ORGANIZATION};
pub use scan::{Scan, ToolType};
pub use strake::Strake;
pub use vessel::{Drawing, Model3d, ScanningLogEntry, Vessel, VesselImage, VesselReport};

/// One organization's subtree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrgData {
	#[serde(default)]
	pub assets: Vec<Asset>,
}

impl OrgData {
	pub fn asset(&self, id: &str) -> Option<&Asset> {
		self.assets.iter().find(|asset| asset.id == id)
	}

	pub fn asset_mut(&mut self, id: &str) -> Option<&mut Asset> {
		self.assets.iter_mut().find(|asset| asset.id == id)
	}
}

/// The persisted local document: `{ [organizationId]: { assets: [...] } }`.
pub type Document = BTreeMap<String, OrgData>;
