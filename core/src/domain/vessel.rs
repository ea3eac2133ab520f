use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{BlobRef, Scan, Strake};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vessel {
	pub id: String,
	pub name: String,
	pub created_at: DateTime<Utc>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub updated_at: Option<DateTime<Utc>>,
	#[serde(default)]
	pub scans: Vec<Scan>,
	#[serde(default)]
	pub strakes: Vec<Strake>,
	#[serde(default)]
	pub model3d: Option<Model3d>,
	#[serde(default)]
	pub images: Vec<VesselImage>,
	#[serde(default)]
	pub location_drawing: Option<Drawing>,
	#[serde(default)]
	pub ga_drawing: Option<Drawing>,
	#[serde(default)]
	pub scanning_log: Vec<ScanningLogEntry>,
	#[serde(default)]
	pub reports: Vec<VesselReport>,
}

impl Vessel {
	pub fn new(id: String, name: String, created_at: DateTime<Utc>) -> Self {
		Self {
			id,
			name,
			created_at,
			updated_at: None,
			scans: vec![],
			strakes: vec![],
			model3d: None,
			images: vec![],
			location_drawing: None,
			ga_drawing: None,
			scanning_log: vec![],
			reports: vec![],
		}
	}

	pub fn scan(&self, id: &str) -> Option<&Scan> {
		self.scans.iter().find(|scan| scan.id == id)
	}

	pub fn scan_mut(&mut self, id: &str) -> Option<&mut Scan> {
		self.scans.iter_mut().find(|scan| scan.id == id)
	}

	pub fn strake(&self, id: &str) -> Option<&Strake> {
		self.strakes.iter().find(|strake| strake.id == id)
	}

	pub fn strake_mut(&mut self, id: &str) -> Option<&mut Strake> {
		self.strakes.iter_mut().find(|strake| strake.id == id)
	}

	/// Scans assigned to a strake. Membership is derived from `Scan::strake_id`.
	pub fn strake_members<'a>(&'a self, strake_id: &'a str) -> impl Iterator<Item = &'a Scan> {
		self.scans
			.iter()
			.filter(move |scan| scan.strake_id.as_deref() == Some(strake_id))
	}

	pub fn last_modified(&self) -> DateTime<Utc> {
		self.updated_at.unwrap_or(self.created_at)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Model3d {
	pub filename: String,
	pub blob: BlobRef,
}

/// A drawing image plus its free-form annotation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Drawing {
	pub image: BlobRef,
	#[serde(default)]
	pub annotations: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VesselImage {
	pub id: String,
	pub name: String,
	pub timestamp: DateTime<Utc>,
	pub image: BlobRef,
	#[serde(default)]
	pub filename: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanningLogEntry {
	pub id: String,
	pub timestamp: DateTime<Utc>,
	#[serde(default)]
	pub operator: Option<String>,
	#[serde(default)]
	pub method: Option<String>,
	#[serde(default)]
	pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VesselReport {
	pub id: String,
	pub timestamp: DateTime<Utc>,
	pub title: String,
	#[serde(default)]
	pub data: serde_json::Value,
}
