//! Remote backend contract for the inspection data mirror.
//!
//! The backend is a relational store (one table per entity kind, see [`schema`])
//! plus an object store for binary payloads. Callers talk to it through the
//! [`RemoteBackend`] and [`BlobStore`] traits; [`rest`] provides the HTTP
//! implementation used in production.

pub mod auth;
pub mod query;
pub mod rest;
pub mod schema;

use std::{future::Future, sync::Arc};

use async_trait::async_trait;
use serde::de::DeserializeOwned;

pub use auth::AuthToken;
pub use query::{Filter, Order, Query};
pub use schema::{
	AssetRow, Bucket, OrganizationRow, ScanRow, ScanningLogEntryRow, StrakeRow, Table,
	VesselImageRow, VesselReportRow, VesselRow,
};

pub struct RequestConfig {
	pub client: reqwest::Client,
	pub api_url: String,
	pub api_key: String,
	pub auth_token: Option<AuthToken>,
}

pub trait RequestConfigProvider {
	fn get_request_config(self: &Arc<Self>) -> impl Future<Output = RequestConfig> + Send;
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Error {
	#[error("request timed out after {0:?}")]
	Timeout(std::time::Duration),
	#[error("network error: {0}")]
	Network(String),
	#[error("authentication required")]
	Unauthenticated,
	#[error("permission denied: {0}")]
	PermissionDenied(String),
	#[error("record not found: {0}")]
	NotFound(String),
	#[error("conflicting record: {0}")]
	Conflict(String),
	#[error("storage quota exceeded: {0}")]
	QuotaExceeded(String),
	#[error("backend error <status={status}>: {message}")]
	Backend { status: u16, message: String },
	#[error("malformed response: {0}")]
	Decode(String),
}

impl Error {
	/// Whether retrying the same request later can succeed.
	pub fn is_transient(&self) -> bool {
		match self {
			Self::Timeout(_) | Self::Network(_) | Self::Unauthenticated => true,
			Self::Backend { status, .. } => *status >= 500 || *status == 429,
			Self::PermissionDenied(_)
			| Self::NotFound(_)
			| Self::Conflict(_)
			| Self::QuotaExceeded(_)
			| Self::Decode(_) => false,
		}
	}

	pub fn is_timeout(&self) -> bool {
		matches!(self, Self::Timeout(_))
	}

	pub(crate) fn from_status(status: u16, message: String) -> Self {
		match status {
			401 => Self::Unauthenticated,
			403 => Self::PermissionDenied(message),
			404 => Self::NotFound(message),
			408 | 504 => Self::Network(format!("gateway timeout: {message}")),
			409 => Self::Conflict(message),
			413 => Self::QuotaExceeded(message),
			status => Self::Backend { status, message },
		}
	}
}

impl From<reqwest::Error> for Error {
	fn from(e: reqwest::Error) -> Self {
		if let Some(status) = e.status() {
			Self::from_status(status.as_u16(), e.to_string())
		} else if e.is_decode() {
			Self::Decode(e.to_string())
		} else {
			Self::Network(e.to_string())
		}
	}
}

impl From<serde_json::Error> for Error {
	fn from(e: serde_json::Error) -> Self {
		Self::Decode(e.to_string())
	}
}

/// Row-level access to the relational mirror.
///
/// Rows travel as JSON objects whose keys are the column names of [`schema`];
/// use [`RemoteBackendExt`] for typed access.
#[async_trait]
pub trait RemoteBackend: Send + Sync {
	async fn select(&self, query: &Query) -> Result<Vec<serde_json::Value>, Error>;

	async fn insert(&self, table: Table, row: serde_json::Value) -> Result<(), Error>;

	async fn update(&self, table: Table, id: &str, patch: serde_json::Value) -> Result<(), Error>;

	async fn delete(&self, table: Table, id: &str) -> Result<(), Error>;
}

/// Binary object storage, keyed by bucket and `/`-separated object path.
#[async_trait]
pub trait BlobStore: Send + Sync {
	/// Stores `bytes` and returns the URL the object can later be downloaded from.
	async fn upload(
		&self,
		bucket: Bucket,
		path: &str,
		bytes: Vec<u8>,
		content_type: &str,
	) -> Result<String, Error>;

	async fn download(&self, url: &str) -> Result<Vec<u8>, Error>;

	/// Removes an object by the URL [`BlobStore::upload`] returned for it.
	async fn delete(&self, url: &str) -> Result<(), Error>;
}

#[async_trait]
pub trait RemoteBackendExt: RemoteBackend {
	async fn fetch<T: DeserializeOwned + Send>(&self, query: &Query) -> Result<Vec<T>, Error> {
		self.select(query)
			.await?
			.into_iter()
			.map(|row| serde_json::from_value(row).map_err(Error::from))
			.collect()
	}

	async fn exists(&self, table: Table, id: &str) -> Result<bool, Error> {
		let rows = self
			.select(&Query::table(table).columns("id").eq("id", id).limit(1))
			.await?;

		Ok(!rows.is_empty())
	}
}

impl<B: RemoteBackend + ?Sized> RemoteBackendExt for B {}
