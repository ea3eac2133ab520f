use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Vessel;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
	pub id: String,
	pub name: String,
	pub organization_id: String,
	#[serde(default)]
	pub created_by: Option<String>,
	pub created_at: DateTime<Utc>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub updated_at: Option<DateTime<Utc>>,
	#[serde(default)]
	pub vessels: Vec<Vessel>,
}

impl Asset {
	pub fn vessel(&self, id: &str) -> Option<&Vessel> {
		self.vessels.iter().find(|vessel| vessel.id == id)
	}

	pub fn vessel_mut(&mut self, id: &str) -> Option<&mut Vessel> {
		self.vessels.iter_mut().find(|vessel| vessel.id == id)
	}

	pub fn last_modified(&self) -> DateTime<Utc> {
		self.updated_at.unwrap_or(self.created_at)
	}
}
