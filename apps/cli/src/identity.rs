//! Session and backend credentials taken from the environment.

use std::sync::Arc;

use anyhow::{Context as _, Result};
use hs_cloud_api::{AuthToken, RequestConfig, RequestConfigProvider};
use hs_core::{access::Session, config::RemoteConfig, domain::Organization};

pub const USER_ID_VAR: &str = "HULLSYNC_USER_ID";
pub const ORG_ID_VAR: &str = "HULLSYNC_ORG_ID";
pub const ORG_NAME_VAR: &str = "HULLSYNC_ORG_NAME";
pub const ACCESS_TOKEN_VAR: &str = "HULLSYNC_ACCESS_TOKEN";

fn var(name: &str) -> Option<String> {
	std::env::var(name).ok().filter(|value| !value.trim().is_empty())
}

/// The session described by `HULLSYNC_USER_ID` and `HULLSYNC_ORG_ID`. The
/// organization name defaults to its id.
pub fn session_from_env() -> Option<Session> {
	let user_id = var(USER_ID_VAR)?;
	let organization_id = var(ORG_ID_VAR)?;
	let organization_name = var(ORG_NAME_VAR).unwrap_or_else(|| organization_id.clone());

	Some(Session {
		user_id,
		organization: Organization::new(organization_id, organization_name),
		is_admin: false,
		is_org_admin: false,
	})
}

pub struct EnvCredentials {
	client: reqwest::Client,
	api_url: String,
	api_key: String,
	access_token: Option<String>,
}

impl EnvCredentials {
	pub fn new(remote: &RemoteConfig) -> Result<Self> {
		let client = reqwest::Client::builder()
			.build()
			.context("Failed to build HTTP client")?;

		Ok(Self {
			client,
			api_url: remote.api_url.trim_end_matches('/').to_string(),
			api_key: remote.api_key.clone(),
			access_token: var(ACCESS_TOKEN_VAR),
		})
	}
}

impl RequestConfigProvider for EnvCredentials {
	async fn get_request_config(self: &Arc<Self>) -> RequestConfig {
		RequestConfig {
			client: self.client.clone(),
			api_url: self.api_url.clone(),
			api_key: self.api_key.clone(),
			auth_token: self.access_token.clone().map(AuthToken::bearer),
		}
	}
}
