//! Tenant resolution
//!
//! Every read and write is scoped to one organization's subtree. Members of
//! the SYSTEM organization are the exception and may act on every
//! organization. The session itself is owned by an external identity provider;
//! this module only asks it who the caller is.

use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::domain::Organization;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
	#[error("no authenticated session")]
	Unauthenticated,
	#[error("session has no organization")]
	NoTenant,
	#[error("organization '{tenant}' may not access organization '{target}'")]
	TenantMismatch { tenant: String, target: String },
}

/// The session/identity collaborator.
pub trait IdentityProvider: Send + Sync {
	fn current_user_id(&self) -> Option<String>;

	fn current_organization(&self) -> Option<Organization>;

	fn is_admin(&self) -> bool;

	fn is_org_admin(&self) -> bool;

	fn is_authenticated(&self) -> bool {
		self.current_user_id().is_some()
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
	pub user_id: String,
	pub organization: Organization,
	#[serde(default)]
	pub is_admin: bool,
	#[serde(default)]
	pub is_org_admin: bool,
}

/// In-process [`IdentityProvider`] whose session is set explicitly.
#[derive(Debug, Default)]
pub struct SessionIdentity {
	session: RwLock<Option<Session>>,
}

impl SessionIdentity {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn signed_in(session: Session) -> Self {
		Self {
			session: RwLock::new(Some(session)),
		}
	}

	pub fn sign_in(&self, session: Session) {
		*self.session.write().unwrap_or_else(|e| e.into_inner()) = Some(session);
	}

	pub fn sign_out(&self) {
		*self.session.write().unwrap_or_else(|e| e.into_inner()) = None;
	}

	pub fn session(&self) -> Option<Session> {
		self.session
			.read()
			.unwrap_or_else(|e| e.into_inner())
			.clone()
	}
}

impl IdentityProvider for SessionIdentity {
	fn current_user_id(&self) -> Option<String> {
		self.session().map(|session| session.user_id)
	}

	fn current_organization(&self) -> Option<Organization> {
		self.session().map(|session| session.organization)
	}

	fn is_admin(&self) -> bool {
		self.session().is_some_and(|session| session.is_admin)
	}

	fn is_org_admin(&self) -> bool {
		self.session().is_some_and(|session| session.is_org_admin)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", content = "organization_id", rename_all = "snake_case")]
pub enum TenantScope {
	Organization(String),
	All,
}

impl TenantScope {
	pub fn includes(&self, organization_id: &str) -> bool {
		match self {
			Self::Organization(id) => id == organization_id,
			Self::All => true,
		}
	}
}

pub fn resolve_scope(identity: &dyn IdentityProvider) -> Result<TenantScope, AccessError> {
	AccessContext::resolve(identity).map(|context| context.scope)
}

/// Who is calling and which subtree they may touch, captured once per operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessContext {
	pub user_id: String,
	pub organization: Organization,
	pub scope: TenantScope,
}

impl AccessContext {
	pub fn resolve(identity: &dyn IdentityProvider) -> Result<Self, AccessError> {
		let user_id = identity
			.current_user_id()
			.ok_or(AccessError::Unauthenticated)?;
		let organization = identity
			.current_organization()
			.ok_or(AccessError::NoTenant)?;

		let scope = if organization.is_system() {
			TenantScope::All
		} else {
			TenantScope::Organization(organization.id.clone())
		};

		Ok(Self {
			user_id,
			organization,
			scope,
		})
	}

	pub fn is_system(&self) -> bool {
		self.scope == TenantScope::All
	}

	pub fn authorize_read(&self, target_org: &str) -> Result<(), AccessError> {
		self.authorize(target_org)
	}

	pub fn authorize_write(&self, target_org: &str) -> Result<(), AccessError> {
		self.authorize(target_org)
	}

	fn authorize(&self, target_org: &str) -> Result<(), AccessError> {
		if self.scope.includes(target_org) {
			Ok(())
		} else {
			Err(AccessError::TenantMismatch {
				tenant: self.organization.id.clone(),
				target: target_org.to_string(),
			})
		}
	}

	/// Organization a new top-level record is written into. Only SYSTEM
	/// callers may name another organization.
	pub fn write_target(&self, explicit: Option<&str>) -> Result<String, AccessError> {
		match explicit {
			Some(target) => {
				self.authorize_write(target)?;
				Ok(target.to_string())
			}
			None => Ok(self.organization.id.clone()),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::domain::SYSTEM_ORGANIZATION;

	fn session(org_id: &str, org_name: &str) -> Session {
		Session {
			user_id: "user-1".into(),
			organization: Organization::new(org_id, org_name),
			is_admin: false,
			is_org_admin: false,
		}
	}

	#[test]
	fn missing_session_or_tenant_is_rejected() {
		let identity = SessionIdentity::new();
		assert_eq!(
			AccessContext::resolve(&identity).unwrap_err(),
			AccessError::Unauthenticated
		);
		assert!(!identity.is_authenticated());

		struct Orphan;
		impl IdentityProvider for Orphan {
			fn current_user_id(&self) -> Option<String> {
				Some("u".into())
			}
			fn current_organization(&self) -> Option<Organization> {
				None
			}
			fn is_admin(&self) -> bool {
				false
			}
			fn is_org_admin(&self) -> bool {
				false
			}
		}

		assert_eq!(resolve_scope(&Orphan).unwrap_err(), AccessError::NoTenant);
	}

	#[test]
	fn regular_tenants_are_confined_to_their_organization() {
		let identity = SessionIdentity::signed_in(session("org-a", "Acme"));
		let context = AccessContext::resolve(&identity).unwrap();

		assert_eq!(context.scope, TenantScope::Organization("org-a".into()));
		assert!(context.authorize_read("org-a").is_ok());
		assert_eq!(
			context.authorize_write("org-b").unwrap_err(),
			AccessError::TenantMismatch {
				tenant: "org-a".into(),
				target: "org-b".into()
			}
		);
		assert_eq!(context.write_target(None).unwrap(), "org-a");
		assert!(context.write_target(Some("org-b")).is_err());
	}

	#[test]
	fn system_tenant_sees_everything() {
		let identity = SessionIdentity::signed_in(session("org-sys", SYSTEM_ORGANIZATION));
		let context = AccessContext::resolve(&identity).unwrap();

		assert!(context.is_system());
		assert!(context.authorize_write("org-b").is_ok());
		assert_eq!(context.write_target(Some("org-b")).unwrap(), "org-b");

		identity.sign_out();
		assert!(resolve_scope(&identity).is_err());
	}
}
