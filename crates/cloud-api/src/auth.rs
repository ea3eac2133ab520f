use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AuthToken {
	pub token_type: String,
	pub access_token: String,
}

impl AuthToken {
	pub fn bearer(access_token: impl Into<String>) -> Self {
		Self {
			token_type: "Bearer".to_string(),
			access_token: access_token.into(),
		}
	}

	pub fn to_header(&self) -> String {
		format!("{} {}", self.token_type, self.access_token)
	}
}
