use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use super::BlobRef;

const MM2_PER_M2: f64 = 1_000_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr, EnumString)]
pub enum ToolType {
	#[serde(rename = "pec")]
	#[strum(serialize = "pec")]
	Pec,
	#[serde(rename = "cscan")]
	#[strum(serialize = "cscan")]
	CScan,
	#[serde(rename = "3dview")]
	#[strum(serialize = "3dview")]
	View3d,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scan {
	pub id: String,
	pub name: String,
	pub tool_type: ToolType,
	pub timestamp: DateTime<Utc>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub updated_at: Option<DateTime<Utc>>,
	/// Inline payload. `None` when the payload only lives at `data_url`.
	#[serde(default)]
	pub data: Option<serde_json::Value>,
	#[serde(default)]
	pub data_url: Option<String>,
	#[serde(default)]
	pub thumbnail: Option<BlobRef>,
	#[serde(default)]
	pub heatmap_only: Option<BlobRef>,
	/// Weak reference to a strake of the same vessel.
	#[serde(default)]
	pub strake_id: Option<String>,
}

impl Scan {
	/// Valid scanned area reported by the tool, in mm² (`stats.validArea`).
	pub fn valid_area_mm2(&self) -> f64 {
		self.data
			.as_ref()
			.and_then(|data| data.pointer("/stats/validArea"))
			.and_then(serde_json::Value::as_f64)
			.filter(|area| area.is_finite() && *area > 0.0)
			.unwrap_or(0.0)
	}

	pub fn valid_area_m2(&self) -> f64 {
		self.valid_area_mm2() / MM2_PER_M2
	}

	pub fn last_modified(&self) -> DateTime<Utc> {
		self.updated_at.unwrap_or(self.timestamp)
	}
}
