use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named region of a vessel with an inspection-coverage target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Strake {
	pub id: String,
	pub name: String,
	/// m²
	pub total_area: f64,
	/// Percent of `total_area` that must be scanned
	pub required_coverage: f64,
	pub created_at: DateTime<Utc>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub updated_at: Option<DateTime<Utc>>,
}

impl Strake {
	/// Area that has to be covered, in m².
	pub fn target_area(&self) -> f64 {
		self.total_area * self.required_coverage / 100.0
	}

	pub fn last_modified(&self) -> DateTime<Utc> {
		self.updated_at.unwrap_or(self.created_at)
	}
}
