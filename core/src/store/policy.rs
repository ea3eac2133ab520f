use hs_cloud_api::Table;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};

/// How a mutation reaches the remote mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ConsistencyPolicy {
	/// Commit locally, then queue the remote write.
	WriteThrough,
	/// Write remotely first; nothing changes locally if that fails.
	CloudFirst,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum EntityKind {
	Asset,
	Vessel,
	VesselModel,
	Drawing,
	Scan,
	Strake,
	VesselImage,
	ScanningLogEntry,
	VesselReport,
	ScanStrakeAssignment,
}

impl EntityKind {
	pub fn policy(self) -> ConsistencyPolicy {
		match self {
			Self::Asset | Self::Vessel | Self::VesselModel | Self::Drawing | Self::Scan => {
				ConsistencyPolicy::WriteThrough
			}
			Self::Strake
			| Self::VesselImage
			| Self::ScanningLogEntry
			| Self::VesselReport
			| Self::ScanStrakeAssignment => ConsistencyPolicy::CloudFirst,
		}
	}

	/// Remote table backing this kind. Drawings are kept locally only.
	pub fn table(self) -> Option<Table> {
		match self {
			Self::Asset => Some(Table::Assets),
			Self::Vessel | Self::VesselModel => Some(Table::Vessels),
			Self::Drawing => None,
			Self::Scan | Self::ScanStrakeAssignment => Some(Table::Scans),
			Self::Strake => Some(Table::Strakes),
			Self::VesselImage => Some(Table::VesselImages),
			Self::ScanningLogEntry => Some(Table::ScanningLogEntries),
			Self::VesselReport => Some(Table::VesselReports),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn policies_split_by_entity_kind() {
		for kind in [EntityKind::Asset, EntityKind::Vessel, EntityKind::Scan] {
			assert_eq!(kind.policy(), ConsistencyPolicy::WriteThrough);
		}

		for kind in [
			EntityKind::Strake,
			EntityKind::VesselImage,
			EntityKind::ScanningLogEntry,
			EntityKind::VesselReport,
			EntityKind::ScanStrakeAssignment,
		] {
			assert_eq!(kind.policy(), ConsistencyPolicy::CloudFirst);
		}

		assert_eq!(EntityKind::ScanStrakeAssignment.table(), Some(Table::Scans));
		assert_eq!(EntityKind::Drawing.table(), None);
	}
}
