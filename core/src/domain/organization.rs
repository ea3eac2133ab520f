use serde::{Deserialize, Serialize};

/// Name of the superuser tenant whose members see every organization.
pub const SYSTEM_ORGANIZATION: &str = "SYSTEM";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
	pub id: String,
	pub name: String,
}

impl Organization {
	pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
		Self {
			id: id.into(),
			name: name.into(),
		}
	}

	pub fn is_system(&self) -> bool {
		self.name == SYSTEM_ORGANIZATION
	}
}

impl From<hs_cloud_api::OrganizationRow> for Organization {
	fn from(row: hs_cloud_api::OrganizationRow) -> Self {
		Self::new(row.id, row.name)
	}
}
