use hs_cloud_api::{Bucket, Table};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};

use crate::domain::blob::base64_bytes;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum OperationKind {
	Insert,
	Update,
	Delete,
	UploadFile,
}

/// Row column to patch with the URL returned by an upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowLink {
	pub table: Table,
	pub id: String,
	pub column: String,
}

/// A single remote mutation, as stored in the sync queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncOperation {
	Insert {
		table: Table,
		id: String,
		payload: serde_json::Value,
	},
	Update {
		table: Table,
		id: String,
		payload: serde_json::Value,
	},
	Delete {
		table: Table,
		id: String,
	},
	UploadFile {
		bucket: Bucket,
		path: String,
		content_type: String,
		#[serde(with = "base64_bytes")]
		bytes: Vec<u8>,
		#[serde(default)]
		link: Option<RowLink>,
	},
}

impl SyncOperation {
	pub fn insert(table: Table, id: impl Into<String>, payload: serde_json::Value) -> Self {
		Self::Insert {
			table,
			id: id.into(),
			payload,
		}
	}

	pub fn update(table: Table, id: impl Into<String>, payload: serde_json::Value) -> Self {
		Self::Update {
			table,
			id: id.into(),
			payload,
		}
	}

	pub fn delete(table: Table, id: impl Into<String>) -> Self {
		Self::Delete {
			table,
			id: id.into(),
		}
	}

	pub fn kind(&self) -> OperationKind {
		match self {
			Self::Insert { .. } => OperationKind::Insert,
			Self::Update { .. } => OperationKind::Update,
			Self::Delete { .. } => OperationKind::Delete,
			Self::UploadFile { .. } => OperationKind::UploadFile,
		}
	}

	pub fn table(&self) -> Option<Table> {
		match self {
			Self::Insert { table, .. } | Self::Update { table, .. } | Self::Delete { table, .. } => {
				Some(*table)
			}
			Self::UploadFile { link, .. } => link.as_ref().map(|link| link.table),
		}
	}

	/// Short human readable form, e.g. `insert scans/1700000000000-abc`.
	pub fn summary(&self) -> String {
		match self {
			Self::Insert { table, id, .. }
			| Self::Update { table, id, .. }
			| Self::Delete { table, id } => format!("{} {table}/{id}", self.kind()),
			Self::UploadFile { bucket, path, .. } => format!("{} {bucket}/{path}", self.kind()),
		}
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn operations_are_tagged_by_type() {
		let op = SyncOperation::delete(Table::Scans, "s1");

		assert_eq!(
			serde_json::to_value(&op).unwrap(),
			json!({ "type": "delete", "table": "scans", "id": "s1" })
		);
		assert_eq!(op.summary(), "delete scans/s1");
	}

	#[test]
	fn uploads_keep_their_bytes_and_link() {
		let op = SyncOperation::UploadFile {
			bucket: Bucket::ScanImages,
			path: "org/a/v/s_thumbnail".into(),
			content_type: "image/png".into(),
			bytes: vec![1, 2, 3],
			link: Some(RowLink {
				table: Table::Scans,
				id: "s".into(),
				column: "thumbnail_url".into(),
			}),
		};

		let value = serde_json::to_value(&op).unwrap();
		assert_eq!(value["type"], json!("upload_file"));
		assert_eq!(value["bucket"], json!("scan-images"));
		assert_eq!(serde_json::from_value::<SyncOperation>(value).unwrap(), op);
		assert_eq!(op.table(), Some(Table::Scans));
	}
}
