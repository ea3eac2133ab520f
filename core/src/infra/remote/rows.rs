//! Mapping between the nested local tree and flat remote rows
//!
//! Upload flattens an entity into its table row plus the blobs that must be
//! stored alongside it; download turns rows back into domain entities.

use hs_cloud_api::{
	AssetRow, Bucket, ScanRow, ScanningLogEntryRow, StrakeRow, Table, VesselImageRow,
	VesselReportRow, VesselRow,
};
use serde::Serialize;
use serde_json::Value;

use super::{RowLink, SyncOperation};
use crate::domain::{
	Asset, BlobRef, Model3d, Scan, ScanningLogEntry, Strake, ToolType, Vessel, VesselImage,
	VesselReport,
};

const JSON_CONTENT_TYPE: &str = "application/json";

#[derive(thiserror::Error, Debug)]
pub enum RowError {
	#[error("unknown tool type '{0}'")]
	UnknownToolType(String),
	#[error("{table} row '{id}' has no {column}")]
	MissingColumn {
		table: Table,
		id: String,
		column: &'static str,
	},
	#[error("failed to encode row: {0}")]
	Encode(#[from] serde_json::Error),
}

/// Object key prefix of everything stored for one vessel:
/// `{organizationId}/{assetId}/{vesselId}/`.
#[derive(Debug, Clone, Copy)]
pub struct VesselPath<'a> {
	pub organization_id: &'a str,
	pub asset_id: &'a str,
	pub vessel_id: &'a str,
}

impl VesselPath<'_> {
	pub fn object(&self, name: &str) -> String {
		format!(
			"{}/{}/{}/{name}",
			self.organization_id, self.asset_id, self.vessel_id
		)
	}
}

/// A blob that still has to be stored before its row column can point at it.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingUpload {
	pub bucket: Bucket,
	pub path: String,
	pub content_type: String,
	pub bytes: Vec<u8>,
	pub column: &'static str,
}

impl PendingUpload {
	fn from_blob(blob: &BlobRef, bucket: Bucket, path: String, column: &'static str) -> Option<Self> {
		match blob {
			BlobRef::Inline {
				content_type,
				bytes,
			} => Some(Self {
				bucket,
				path,
				content_type: content_type.clone(),
				bytes: bytes.clone(),
				column,
			}),
			BlobRef::Remote { .. } => None,
		}
	}

	pub fn into_operation(self, table: Table, id: &str) -> SyncOperation {
		SyncOperation::UploadFile {
			bucket: self.bucket,
			path: self.path,
			content_type: self.content_type,
			bytes: self.bytes,
			link: Some(RowLink {
				table,
				id: id.to_string(),
				column: self.column.to_string(),
			}),
		}
	}
}

/// A row ready for insertion plus the uploads its URL columns depend on.
#[derive(Debug, Clone, PartialEq)]
pub struct RowPlan {
	pub table: Table,
	pub id: String,
	pub row: Value,
	pub uploads: Vec<PendingUpload>,
}

impl RowPlan {
	fn new(table: Table, id: &str, row: &impl Serialize) -> Result<Self, RowError> {
		Ok(Self {
			table,
			id: id.to_string(),
			row: serde_json::to_value(row)?,
			uploads: vec![],
		})
	}

	fn with_upload(mut self, upload: Option<PendingUpload>) -> Self {
		self.uploads.extend(upload);
		self
	}

	/// Queue form: the insert first, then one linked upload per blob, so that
	/// every URL patch lands on an existing row.
	pub fn into_operations(self) -> Vec<SyncOperation> {
		let Self {
			table,
			id,
			row,
			uploads,
		} = self;

		std::iter::once(SyncOperation::insert(table, id.clone(), row))
			.chain(uploads.into_iter().map(|upload| upload.into_operation(table, &id)))
			.collect()
	}

	/// Update form for an existing row: the full column set, then the uploads.
	pub fn into_update_operations(self) -> Vec<SyncOperation> {
		let Self {
			table,
			id,
			mut row,
			uploads,
		} = self;

		if let Value::Object(columns) = &mut row {
			columns.remove("id");
			columns.remove("created_at");
		}

		std::iter::once(SyncOperation::update(table, id.clone(), row))
			.chain(uploads.into_iter().map(|upload| upload.into_operation(table, &id)))
			.collect()
	}

	/// Points `column` at an uploaded object.
	pub fn set_url(&mut self, column: &str, url: String) {
		if let Value::Object(row) = &mut self.row {
			row.insert(column.to_string(), Value::String(url));
		}
	}
}

pub fn asset_plan(asset: &Asset) -> Result<RowPlan, RowError> {
	let row = AssetRow {
		id: asset.id.clone(),
		name: asset.name.clone(),
		organization_id: asset.organization_id.clone(),
		created_by: asset.created_by.clone(),
		created_at: asset.created_at,
		updated_at: asset.updated_at,
	};

	RowPlan::new(Table::Assets, &asset.id, &row)
}

pub fn vessel_plan(path: VesselPath<'_>, vessel: &Vessel) -> Result<RowPlan, RowError> {
	let row = VesselRow {
		id: vessel.id.clone(),
		asset_id: path.asset_id.to_string(),
		name: vessel.name.clone(),
		model_3d_url: vessel
			.model3d
			.as_ref()
			.and_then(|model| model.blob.url())
			.map(str::to_string),
		model_3d_filename: vessel.model3d.as_ref().map(|model| model.filename.clone()),
		created_at: vessel.created_at,
	};

	let upload = vessel.model3d.as_ref().and_then(|model| {
		PendingUpload::from_blob(
			&model.blob,
			Bucket::Models3d,
			path.object(&model.filename),
			"model_3d_url",
		)
	});

	Ok(RowPlan::new(Table::Vessels, &vessel.id, &row)?.with_upload(upload))
}

pub fn strake_plan(vessel_id: &str, strake: &Strake) -> Result<RowPlan, RowError> {
	RowPlan::new(Table::Strakes, &strake.id, &strake_row(vessel_id, strake))
}

pub fn strake_row(vessel_id: &str, strake: &Strake) -> StrakeRow {
	StrakeRow {
		id: strake.id.clone(),
		vessel_id: vessel_id.to_string(),
		name: strake.name.clone(),
		total_area: strake.total_area,
		required_coverage: strake.required_coverage,
		created_at: strake.created_at,
		updated_at: strake.updated_at,
	}
}

pub fn image_object_name(image: &VesselImage) -> String {
	format!(
		"{}_{}",
		image.id,
		image.filename.as_deref().unwrap_or(&image.name)
	)
}

pub fn image_plan(path: VesselPath<'_>, image: &VesselImage) -> Result<RowPlan, RowError> {
	let row = VesselImageRow {
		id: image.id.clone(),
		vessel_id: path.vessel_id.to_string(),
		name: image.name.clone(),
		image_url: image.image.url().map(str::to_string),
		image_filename: image.filename.clone(),
		created_at: image.timestamp,
	};

	let upload = PendingUpload::from_blob(
		&image.image,
		Bucket::VesselImages,
		path.object(&image_object_name(image)),
		"image_url",
	);

	Ok(RowPlan::new(Table::VesselImages, &image.id, &row)?.with_upload(upload))
}

/// Scan payloads whose JSON encoding exceeds `inline_threshold` bytes are
/// moved to the `scan-data` bucket and referenced through `data_url`.
pub fn scan_plan(
	path: VesselPath<'_>,
	scan: &Scan,
	inline_threshold: usize,
) -> Result<RowPlan, RowError> {
	let mut uploads = vec![];

	let data = match &scan.data {
		Some(data) => {
			let encoded = serde_json::to_vec(data)?;

			if encoded.len() > inline_threshold {
				uploads.push(PendingUpload {
					bucket: Bucket::ScanData,
					path: path.object(&format!("{}.json", scan.id)),
					content_type: JSON_CONTENT_TYPE.to_string(),
					bytes: encoded,
					column: "data_url",
				});
				None
			} else {
				Some(data.clone())
			}
		}
		None => None,
	};

	let row = ScanRow {
		id: scan.id.clone(),
		vessel_id: path.vessel_id.to_string(),
		name: scan.name.clone(),
		tool_type: scan.tool_type.to_string(),
		strake_id: scan.strake_id.clone(),
		data,
		data_url: scan.data_url.clone(),
		thumbnail_url: scan.thumbnail.as_ref().and_then(BlobRef::url).map(str::to_string),
		heatmap_url: scan.heatmap_only.as_ref().and_then(BlobRef::url).map(str::to_string),
		created_at: scan.timestamp,
	};

	let thumbnail = scan.thumbnail.as_ref().and_then(|blob| {
		PendingUpload::from_blob(
			blob,
			Bucket::ScanImages,
			path.object(&format!("{}_thumbnail", scan.id)),
			"thumbnail_url",
		)
	});
	let heatmap = scan.heatmap_only.as_ref().and_then(|blob| {
		PendingUpload::from_blob(
			blob,
			Bucket::ScanImages,
			path.object(&format!("{}_heatmap", scan.id)),
			"heatmap_url",
		)
	});

	uploads.extend(thumbnail);
	uploads.extend(heatmap);

	Ok(RowPlan {
		uploads,
		..RowPlan::new(Table::Scans, &scan.id, &row)?
	})
}

pub fn log_entry_plan(vessel_id: &str, entry: &ScanningLogEntry) -> Result<RowPlan, RowError> {
	let row = ScanningLogEntryRow {
		id: entry.id.clone(),
		vessel_id: vessel_id.to_string(),
		operator: entry.operator.clone(),
		method: entry.method.clone(),
		notes: entry.notes.clone(),
		created_at: entry.timestamp,
	};

	RowPlan::new(Table::ScanningLogEntries, &entry.id, &row)
}

pub fn report_plan(vessel_id: &str, report: &VesselReport) -> Result<RowPlan, RowError> {
	let row = VesselReportRow {
		id: report.id.clone(),
		vessel_id: vessel_id.to_string(),
		title: report.title.clone(),
		data: Some(report.data.clone()),
		created_at: report.timestamp,
	};

	RowPlan::new(Table::VesselReports, &report.id, &row)
}

impl From<AssetRow> for Asset {
	fn from(row: AssetRow) -> Self {
		Self {
			id: row.id,
			name: row.name,
			organization_id: row.organization_id,
			created_by: row.created_by,
			created_at: row.created_at,
			updated_at: row.updated_at,
			vessels: vec![],
		}
	}
}

impl From<VesselRow> for Vessel {
	fn from(row: VesselRow) -> Self {
		let mut vessel = Vessel::new(row.id, row.name, row.created_at);

		if let Some(url) = row.model_3d_url {
			vessel.model3d = Some(Model3d {
				filename: row.model_3d_filename.unwrap_or_default(),
				blob: BlobRef::remote(url),
			});
		}

		vessel
	}
}

impl From<StrakeRow> for Strake {
	fn from(row: StrakeRow) -> Self {
		Self {
			id: row.id,
			name: row.name,
			total_area: row.total_area,
			required_coverage: row.required_coverage,
			created_at: row.created_at,
			updated_at: row.updated_at,
		}
	}
}

impl TryFrom<VesselImageRow> for VesselImage {
	type Error = RowError;

	fn try_from(row: VesselImageRow) -> Result<Self, Self::Error> {
		let Some(url) = row.image_url else {
			return Err(RowError::MissingColumn {
				table: Table::VesselImages,
				id: row.id,
				column: "image_url",
			});
		};

		Ok(Self {
			id: row.id,
			name: row.name,
			timestamp: row.created_at,
			image: BlobRef::remote(url),
			filename: row.image_filename,
		})
	}
}

impl TryFrom<ScanRow> for Scan {
	type Error = RowError;

	fn try_from(row: ScanRow) -> Result<Self, Self::Error> {
		let tool_type = row
			.tool_type
			.parse::<ToolType>()
			.map_err(|_| RowError::UnknownToolType(row.tool_type.clone()))?;

		Ok(Self {
			id: row.id,
			name: row.name,
			tool_type,
			timestamp: row.created_at,
			updated_at: None,
			data: row.data,
			data_url: row.data_url,
			thumbnail: row.thumbnail_url.map(BlobRef::remote),
			heatmap_only: row.heatmap_url.map(BlobRef::remote),
			strake_id: row.strake_id,
		})
	}
}

impl From<ScanningLogEntryRow> for ScanningLogEntry {
	fn from(row: ScanningLogEntryRow) -> Self {
		Self {
			id: row.id,
			timestamp: row.created_at,
			operator: row.operator,
			method: row.method,
			notes: row.notes,
		}
	}
}

impl From<VesselReportRow> for VesselReport {
	fn from(row: VesselReportRow) -> Self {
		Self {
			id: row.id,
			timestamp: row.created_at,
			title: row.title,
			data: row.data.unwrap_or(Value::Null),
		}
	}
}
