//! Mutation inputs.
//!
//! Creates take an optional client-side id. Supplying an id that already
//! exists makes the create a no-op that returns the existing record.

use serde::{Deserialize, Serialize};

use crate::domain::{BlobRef, ToolType};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewAsset {
	pub id: Option<String>,
	pub name: String,
	/// Target organization; only SYSTEM members may name another one.
	pub organization_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssetPatch {
	pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewVessel {
	pub id: Option<String>,
	pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VesselPatch {
	pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewScan {
	pub id: Option<String>,
	pub name: String,
	pub tool_type: ToolType,
	pub data: Option<serde_json::Value>,
	pub thumbnail: Option<BlobRef>,
	pub heatmap_only: Option<BlobRef>,
	pub strake_id: Option<String>,
}

impl NewScan {
	pub fn new(name: impl Into<String>, tool_type: ToolType) -> Self {
		Self {
			id: None,
			name: name.into(),
			tool_type,
			data: None,
			thumbnail: None,
			heatmap_only: None,
			strake_id: None,
		}
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanPatch {
	pub name: Option<String>,
	pub data: Option<serde_json::Value>,
	pub thumbnail: Option<BlobRef>,
	pub heatmap_only: Option<BlobRef>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewStrake {
	pub id: Option<String>,
	pub name: String,
	/// m²
	pub total_area: f64,
	/// percent
	pub required_coverage: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrakePatch {
	pub name: Option<String>,
	pub total_area: Option<f64>,
	pub required_coverage: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewVesselImage {
	pub id: Option<String>,
	pub name: String,
	pub filename: Option<String>,
	pub image: BlobRef,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewLogEntry {
	pub id: Option<String>,
	pub operator: Option<String>,
	pub method: Option<String>,
	pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogEntryPatch {
	pub operator: Option<String>,
	pub method: Option<String>,
	pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewReport {
	pub id: Option<String>,
	pub title: String,
	pub data: serde_json::Value,
}
