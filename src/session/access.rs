//! Role and tenant-scope authorization over a [`Session`](crate::session::Session).
//!
//! Checks fail closed: an unauthenticated session satisfies nothing, and a platform admin
//! bypasses only the per-tenant membership checks, never role requirements.

// self
use crate::{
	_prelude::*,
	auth::{RoleName, TenantId},
	error::ConfigError,
	session::Session,
};

/// Reason an authorization check denied access.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum TenantAccessError {
	/// None of the required roles is granted.
	#[error("One of the roles [{}] is required.", join_roles(.required))]
	WrongRole {
		/// Roles that would have satisfied the check.
		required: Vec<RoleName>,
	},
	/// The action is tenant-scoped but no tenant is selected.
	#[error("No tenant is selected.")]
	NoTenantSelected,
	/// The tenant is not among the user's accessible tenants.
	#[error("Tenant `{tenant}` is not accessible.")]
	WrongTenant {
		/// Tenant that was denied.
		tenant: TenantId,
	},
}

/// Deployment-wide authorization settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessPolicy {
	/// Role that may act on every tenant.
	pub platform_admin_role: RoleName,
}
impl AccessPolicy {
	/// Platform-admin role used when none is configured.
	pub const DEFAULT_PLATFORM_ADMIN_ROLE: &'static str = "platform-admin";

	/// Policy using [`AccessPolicy::DEFAULT_PLATFORM_ADMIN_ROLE`].
	pub fn standard() -> Result<Self> {
		Self::new(Self::DEFAULT_PLATFORM_ADMIN_ROLE)
	}

	/// Creates a policy with a custom platform-admin role.
	pub fn new(platform_admin_role: impl AsRef<str>) -> Result<Self> {
		let platform_admin_role = RoleName::new(platform_admin_role).map_err(ConfigError::from)?;

		Ok(Self { platform_admin_role })
	}

	/// Returns `true` when `session` holds the platform-admin role.
	pub fn is_platform_admin(&self, session: &Session) -> bool {
		session.roles.contains(&self.platform_admin_role)
	}

	/// Returns `true` when `session` may act on `tenant`.
	pub fn can_access_tenant(&self, session: &Session, tenant: &TenantId) -> bool {
		session.is_authenticated()
			&& (self.is_platform_admin(session)
				|| session.tenants.iter().any(|access| &access.tenant_id == tenant))
	}

	/// Evaluates `requirement` against an authenticated `session`.
	pub fn evaluate(
		&self,
		session: &Session,
		requirement: &AccessRequirement,
	) -> Result<(), TenantAccessError> {
		if !requirement.any_role.is_empty()
			&& !requirement.any_role.iter().any(|role| session.roles.contains(role))
		{
			return Err(TenantAccessError::WrongRole { required: requirement.any_role.clone() });
		}

		let tenant = match &requirement.tenant {
			TenantRequirement::Any => return Ok(()),
			TenantRequirement::Selected =>
				session.selected_tenant.as_ref().ok_or(TenantAccessError::NoTenantSelected)?,
			TenantRequirement::Specific(tenant) => tenant,
		};

		if self.can_access_tenant(session, tenant) {
			Ok(())
		} else {
			Err(TenantAccessError::WrongTenant { tenant: tenant.clone() })
		}
	}
}

/// Tenant scope demanded by an [`AccessRequirement`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum TenantRequirement {
	/// Not tenant-scoped.
	#[default]
	Any,
	/// The selected tenant must exist and be accessible.
	Selected,
	/// This tenant must be accessible.
	Specific(TenantId),
}

/// What an action needs from the session.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AccessRequirement {
	/// At least one of these roles (empty means no role check).
	pub any_role: Vec<RoleName>,
	/// Tenant scope.
	pub tenant: TenantRequirement,
}
impl AccessRequirement {
	/// Only requires an authenticated session.
	pub fn authenticated() -> Self {
		Self::default()
	}

	/// Adds `role` to the accepted roles.
	pub fn role(mut self, role: RoleName) -> Self {
		self.any_role.push(role);

		self
	}

	/// Accepts any of `roles`.
	pub fn any_role(mut self, roles: impl IntoIterator<Item = RoleName>) -> Self {
		self.any_role.extend(roles);

		self
	}

	/// Requires an accessible selected tenant.
	pub fn selected_tenant(mut self) -> Self {
		self.tenant = TenantRequirement::Selected;

		self
	}

	/// Requires access to `tenant`.
	pub fn tenant(mut self, tenant: TenantId) -> Self {
		self.tenant = TenantRequirement::Specific(tenant);

		self
	}
}

fn join_roles(roles: &[RoleName]) -> String {
	roles.iter().map(|role| role.as_ref()).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{auth::TenantAccess, session::SessionStatus};

	fn role(name: &str) -> RoleName {
		RoleName::new(name).expect("Role fixture should be valid.")
	}

	fn policy() -> AccessPolicy {
		AccessPolicy::standard().expect("Default policy should build.")
	}

	fn tenant(id: &str) -> TenantId {
		TenantId::new(id).expect("Tenant fixture should be valid.")
	}

	fn session(roles: &[&str], tenants: &[&str], selected: Option<&str>) -> Session {
		Session {
			status: SessionStatus::Authenticated,
			roles: roles.iter().map(|name| role(name)).collect(),
			tenants: tenants.iter().map(|id| TenantAccess::new(tenant(id), *id)).collect(),
			selected_tenant: selected.map(tenant),
			..Session::default()
		}
	}

	#[test]
	fn role_requirements_accept_any_listed_role() {
		let policy = policy();
		let session = session(&["catalog-editor"], &["t1"], Some("t1"));
		let editor = AccessRequirement::authenticated()
			.any_role([role("store-admin"), role("catalog-editor")]);
		let admin_only = AccessRequirement::authenticated().role(role("store-admin"));

		assert!(policy.evaluate(&session, &editor).is_ok());
		assert_eq!(
			policy.evaluate(&session, &admin_only),
			Err(TenantAccessError::WrongRole { required: vec![role("store-admin")] })
		);
	}

	#[test]
	fn tenant_requirements_distinguish_missing_and_foreign_tenants() {
		let policy = policy();
		let unselected = session(&["store-admin"], &["t1", "t2"], None);
		let scoped = session(&["store-admin"], &["t1", "t2"], Some("t2"));

		assert_eq!(
			policy.evaluate(&unselected, &AccessRequirement::authenticated().selected_tenant()),
			Err(TenantAccessError::NoTenantSelected)
		);
		assert!(
			policy.evaluate(&scoped, &AccessRequirement::authenticated().selected_tenant()).is_ok()
		);
		assert_eq!(
			policy.evaluate(&scoped, &AccessRequirement::authenticated().tenant(tenant("t9"))),
			Err(TenantAccessError::WrongTenant { tenant: tenant("t9") })
		);
	}

	#[test]
	fn platform_admin_bypasses_tenant_membership_only() {
		let policy = policy();
		let admin = session(&["platform-admin"], &[], None);

		assert!(policy.can_access_tenant(&admin, &tenant("any-store")));
		assert!(
			policy
				.evaluate(&admin, &AccessRequirement::authenticated().tenant(tenant("any-store")))
				.is_ok()
		);
		assert!(matches!(
			policy.evaluate(&admin, &AccessRequirement::authenticated().role(role("auditor"))),
			Err(TenantAccessError::WrongRole { .. })
		));
	}

	#[test]
	fn unauthenticated_sessions_access_nothing() {
		let policy = policy();
		let mut anonymous = session(&["platform-admin"], &["t1"], Some("t1"));

		anonymous.status = SessionStatus::Idle;

		assert!(!policy.can_access_tenant(&anonymous, &tenant("t1")));
	}

	#[test]
	fn wrong_role_message_lists_the_roles() {
		let err = TenantAccessError::WrongRole { required: vec![role("a"), role("b")] };

		assert_eq!(err.to_string(), "One of the roles [a, b] is required.");
	}
}
