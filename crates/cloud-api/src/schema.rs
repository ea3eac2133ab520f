//! Tables, buckets and row shapes of the remote mirror.
//!
//! Column names are part of the backend contract and must not be renamed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

#[derive(
	Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Table {
	Organizations,
	Assets,
	Vessels,
	Strakes,
	VesselImages,
	Scans,
	ScanningLogEntries,
	VesselReports,
}

#[derive(
	Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr, EnumString, EnumIter,
)]
pub enum Bucket {
	#[serde(rename = "3d-models")]
	#[strum(serialize = "3d-models")]
	Models3d,
	#[serde(rename = "vessel-images")]
	#[strum(serialize = "vessel-images")]
	VesselImages,
	#[serde(rename = "scan-images")]
	#[strum(serialize = "scan-images")]
	ScanImages,
	#[serde(rename = "scan-data")]
	#[strum(serialize = "scan-data")]
	ScanData,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct OrganizationRow {
	pub id: String,
	pub name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AssetRow {
	pub id: String,
	pub name: String,
	pub organization_id: String,
	#[serde(default)]
	pub created_by: Option<String>,
	pub created_at: DateTime<Utc>,
	#[serde(default)]
	pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct VesselRow {
	pub id: String,
	pub asset_id: String,
	pub name: String,
	#[serde(default)]
	pub model_3d_url: Option<String>,
	#[serde(default)]
	pub model_3d_filename: Option<String>,
	pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StrakeRow {
	pub id: String,
	pub vessel_id: String,
	pub name: String,
	pub total_area: f64,
	pub required_coverage: f64,
	pub created_at: DateTime<Utc>,
	#[serde(default)]
	pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct VesselImageRow {
	pub id: String,
	pub vessel_id: String,
	pub name: String,
	#[serde(default)]
	pub image_url: Option<String>,
	#[serde(default)]
	pub image_filename: Option<String>,
	pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ScanRow {
	pub id: String,
	pub vessel_id: String,
	pub name: String,
	pub tool_type: String,
	#[serde(default)]
	pub strake_id: Option<String>,
	#[serde(default)]
	pub data: Option<serde_json::Value>,
	#[serde(default)]
	pub data_url: Option<String>,
	#[serde(default)]
	pub thumbnail_url: Option<String>,
	#[serde(default)]
	pub heatmap_url: Option<String>,
	pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ScanningLogEntryRow {
	pub id: String,
	pub vessel_id: String,
	#[serde(default)]
	pub operator: Option<String>,
	#[serde(default)]
	pub method: Option<String>,
	#[serde(default)]
	pub notes: Option<String>,
	pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct VesselReportRow {
	pub id: String,
	pub vessel_id: String,
	pub title: String,
	#[serde(default)]
	pub data: Option<serde_json::Value>,
	pub created_at: DateTime<Utc>,
}
