use serde::{Deserialize, Serialize};

/// Opaque binary payload (image, 3D model, heatmap...), either still held
/// locally or already stored in a remote bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum BlobRef {
	Inline {
		#[serde(rename = "contentType")]
		content_type: String,
		#[serde(with = "base64_bytes")]
		bytes: Vec<u8>,
	},
	Remote {
		url: String,
	},
}

impl BlobRef {
	pub fn inline(bytes: Vec<u8>, content_type: impl Into<String>) -> Self {
		Self::Inline {
			content_type: content_type.into(),
			bytes,
		}
	}

	pub fn remote(url: impl Into<String>) -> Self {
		Self::Remote { url: url.into() }
	}

	pub fn url(&self) -> Option<&str> {
		match self {
			Self::Remote { url } => Some(url),
			Self::Inline { .. } => None,
		}
	}
}

pub(crate) mod base64_bytes {
	use base64::{engine::general_purpose::STANDARD, Engine};
	use serde::{Deserialize, Deserializer, Serializer};

	pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(&STANDARD.encode(bytes))
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
		let encoded = String::deserialize(deserializer)?;
		STANDARD.decode(encoded).map_err(serde::de::Error::custom)
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn inline_blobs_serialize_as_base64() {
		let blob = BlobRef::inline(vec![0xde, 0xad, 0xbe, 0xef], "image/png");

		assert_eq!(
			serde_json::to_value(&blob).unwrap(),
			json!({ "kind": "inline", "contentType": "image/png", "bytes": "3q2+7w==" })
		);
	}

	#[test]
	fn remote_blobs_expose_their_url() {
		let blob: BlobRef =
			serde_json::from_value(json!({ "kind": "remote", "url": "https://cdn/x.png" })).unwrap();

		assert_eq!(blob.url(), Some("https://cdn/x.png"));
	}
}
