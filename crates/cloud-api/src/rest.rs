//! HTTP implementation of the backend contract (PostgREST tables + object storage).

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response};
use tracing::debug;

use crate::{BlobStore, Bucket, Error, Query, RemoteBackend, RequestConfig, RequestConfigProvider, Table};

trait WithAuth {
	fn with_auth(self, config: &RequestConfig) -> Self;
}

impl WithAuth for RequestBuilder {
	fn with_auth(self, config: &RequestConfig) -> Self {
		let req = self.header("apikey", &config.api_key);

		match &config.auth_token {
			Some(token) => req.header("authorization", token.to_header()),
			None => req,
		}
	}
}

async fn check(response: Response) -> Result<Response, Error> {
	let status = response.status();
	if status.is_success() {
		return Ok(response);
	}

	let message = response
		.text()
		.await
		.unwrap_or_else(|_| status.to_string());

	Err(Error::from_status(status.as_u16(), message))
}

fn require_auth(config: &RequestConfig) -> Result<(), Error> {
	if config.auth_token.is_none() {
		return Err(Error::Unauthenticated);
	}
	Ok(())
}

pub struct RestBackend<P> {
	provider: Arc<P>,
}

impl<P> RestBackend<P> {
	pub fn new(provider: Arc<P>) -> Self {
		Self { provider }
	}
}

fn table_url(config: &RequestConfig, table: Table) -> String {
	format!("{}/rest/v1/{}", config.api_url, table)
}

#[async_trait]
impl<P: RequestConfigProvider + Send + Sync + 'static> RemoteBackend for RestBackend<P> {
	async fn select(&self, query: &Query) -> Result<Vec<serde_json::Value>, Error> {
		let config = self.provider.get_request_config().await;
		require_auth(&config)?;

		debug!(table = %query.table, range = ?query.range, "Selecting rows;");

		let response = config
			.client
			.get(table_url(&config, query.table))
			.query(&query.to_params())
			.with_auth(&config)
			.send()
			.await?;

		Ok(check(response).await?.json().await?)
	}

	async fn insert(&self, table: Table, row: serde_json::Value) -> Result<(), Error> {
		let config = self.provider.get_request_config().await;
		require_auth(&config)?;

		let response = config
			.client
			.post(table_url(&config, table))
			.header("prefer", "return=minimal")
			.json(&row)
			.with_auth(&config)
			.send()
			.await?;

		check(response).await.map(|_| ())
	}

	async fn update(&self, table: Table, id: &str, patch: serde_json::Value) -> Result<(), Error> {
		let config = self.provider.get_request_config().await;
		require_auth(&config)?;

		let response = config
			.client
			.patch(table_url(&config, table))
			.query(&[("id", format!("eq.{id}"))])
			.header("prefer", "return=minimal")
			.json(&patch)
			.with_auth(&config)
			.send()
			.await?;

		check(response).await.map(|_| ())
	}

	async fn delete(&self, table: Table, id: &str) -> Result<(), Error> {
		let config = self.provider.get_request_config().await;
		require_auth(&config)?;

		let response = config
			.client
			.delete(table_url(&config, table))
			.query(&[("id", format!("eq.{id}"))])
			.with_auth(&config)
			.send()
			.await?;

		check(response).await.map(|_| ())
	}
}

pub struct RestBlobStore<P> {
	provider: Arc<P>,
}

impl<P> RestBlobStore<P> {
	pub fn new(provider: Arc<P>) -> Self {
		Self { provider }
	}
}

#[async_trait]
impl<P: RequestConfigProvider + Send + Sync + 'static> BlobStore for RestBlobStore<P> {
	async fn upload(
		&self,
		bucket: Bucket,
		path: &str,
		bytes: Vec<u8>,
		content_type: &str,
	) -> Result<String, Error> {
		let config = self.provider.get_request_config().await;
		require_auth(&config)?;

		debug!(%bucket, %path, size = bytes.len(), "Uploading object;");

		let response = config
			.client
			.post(format!(
				"{}/storage/v1/object/{bucket}/{path}",
				config.api_url
			))
			.header("content-type", content_type)
			.header("x-upsert", "true")
			.body(bytes)
			.with_auth(&config)
			.send()
			.await?;

		check(response).await?;

		Ok(format!(
			"{}/storage/v1/object/public/{bucket}/{path}",
			config.api_url
		))
	}

	async fn download(&self, url: &str) -> Result<Vec<u8>, Error> {
		let config = self.provider.get_request_config().await;

		let response = config.client.get(url).with_auth(&config).send().await?;

		Ok(check(response).await?.bytes().await?.to_vec())
	}

	async fn delete(&self, url: &str) -> Result<(), Error> {
		let config = self.provider.get_request_config().await;
		require_auth(&config)?;

		// Public URLs are served from `object/public/`, writes go to `object/`.
		let object_url = url.replacen("/storage/v1/object/public/", "/storage/v1/object/", 1);

		debug!(%object_url, "Deleting object;");

		let response = config
			.client
			.delete(object_url)
			.with_auth(&config)
			.send()
			.await?;

		check(response).await.map(|_| ())
	}
}
