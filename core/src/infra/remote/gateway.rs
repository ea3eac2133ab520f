use std::{future::Future, sync::Arc, time::Duration};

use hs_cloud_api::{BlobStore, Bucket, Error, RemoteBackend, RemoteBackendExt};
use serde_json::{Map, Value};
use tracing::debug;

use super::SyncOperation;

/// Bounds `future` by `timeout`, mapping expiry to [`Error::Timeout`].
pub async fn timed<T>(
	timeout: Duration,
	future: impl Future<Output = Result<T, Error>>,
) -> Result<T, Error> {
	tokio::time::timeout(timeout, future)
		.await
		.map_err(|_| Error::Timeout(timeout))?
}

/// Executes [`SyncOperation`]s against the remote backend and blob store.
///
/// Application is idempotent by record id: inserting a row that already exists
/// and deleting one that is already gone both succeed.
#[derive(Clone)]
pub struct RemoteGateway {
	backend: Arc<dyn RemoteBackend>,
	blobs: Arc<dyn BlobStore>,
}

impl RemoteGateway {
	pub fn new(backend: Arc<dyn RemoteBackend>, blobs: Arc<dyn BlobStore>) -> Self {
		Self { backend, blobs }
	}

	pub fn backend(&self) -> &dyn RemoteBackend {
		self.backend.as_ref()
	}

	pub fn blobs(&self) -> &dyn BlobStore {
		self.blobs.as_ref()
	}

	pub async fn apply(&self, operation: &SyncOperation, timeout: Duration) -> Result<(), Error> {
		timed(timeout, self.apply_inner(operation)).await
	}

	async fn apply_inner(&self, operation: &SyncOperation) -> Result<(), Error> {
		match operation {
			SyncOperation::Insert { table, id, payload } => {
				if self.backend.exists(*table, id).await? {
					debug!(%table, %id, "Row already present remotely, skipping insert");
					return Ok(());
				}

				match self.backend.insert(*table, payload.clone()).await {
					Err(Error::Conflict(_)) => {
						debug!(%table, %id, "Insert raced an existing row");
						Ok(())
					}
					result => result,
				}
			}
			SyncOperation::Update { table, id, payload } => {
				self.backend.update(*table, id, payload.clone()).await
			}
			SyncOperation::Delete { table, id } => match self.backend.delete(*table, id).await {
				Err(Error::NotFound(_)) => Ok(()),
				result => result,
			},
			SyncOperation::UploadFile {
				bucket,
				path,
				content_type,
				bytes,
				link,
			} => {
				let url = self
					.blobs
					.upload(*bucket, path, bytes.clone(), content_type)
					.await?;

				if let Some(link) = link {
					let mut patch = Map::new();
					patch.insert(link.column.clone(), Value::String(url));

					self.backend
						.update(link.table, &link.id, Value::Object(patch))
						.await?;
				}

				Ok(())
			}
		}
	}

	/// Uploads a blob and returns its URL.
	pub async fn upload(
		&self,
		bucket: Bucket,
		path: &str,
		bytes: Vec<u8>,
		content_type: &str,
		timeout: Duration,
	) -> Result<String, Error> {
		timed(timeout, self.blobs.upload(bucket, path, bytes, content_type)).await
	}

	pub async fn delete_blob(&self, url: &str, timeout: Duration) -> Result<(), Error> {
		timed(timeout, self.blobs.delete(url)).await
	}
}
