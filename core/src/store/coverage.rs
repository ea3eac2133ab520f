use serde::{Deserialize, Serialize};

use crate::domain::{Scan, Strake};

/// Scanned area of a strake against its coverage target.
///
/// The scanned area is a plain sum over member scans, so overlapping scans
/// are counted twice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrakeCoverage {
	pub strake_id: String,
	pub scan_count: usize,
	/// m²
	pub scanned_area: f64,
	/// m²
	pub target_area: f64,
	/// Uncapped, may exceed 100
	pub raw_percentage: f64,
	/// Capped at 100
	pub percentage: f64,
	pub is_complete: bool,
}

impl StrakeCoverage {
	pub fn calculate<'a>(strake: &Strake, scans: impl IntoIterator<Item = &'a Scan>) -> Self {
		let (scan_count, scanned_area) = scans
			.into_iter()
			.fold((0, 0.0), |(count, area), scan| (count + 1, area + scan.valid_area_m2()));

		let target_area = strake.target_area();
		let raw_percentage = if target_area > 0.0 {
			scanned_area / target_area * 100.0
		} else {
			0.0
		};

		Self {
			strake_id: strake.id.clone(),
			scan_count,
			scanned_area,
			target_area,
			raw_percentage,
			percentage: raw_percentage.min(100.0),
			is_complete: raw_percentage >= 100.0,
		}
	}
}
