//! Sources of the signed-in user's identity, roles, and tenant list.

// self
use crate::{
	_prelude::*,
	auth::{ClaimSet, RoleName, TenantAccess, UserId},
	store::TokenStore,
};
#[cfg(feature = "reqwest")] use crate::gateway::HttpGateway;

/// Boxed future returned by [`ProfileSource::load`].
pub type ProfileFuture<'a> = Pin<Box<dyn Future<Output = Result<Profile>> + 'a + Send>>;

/// Identity and access data applied to the session after login or refresh.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Profile {
	/// Stable user identifier.
	pub user_id: Option<UserId>,
	/// Email address.
	pub email: Option<String>,
	/// Login name.
	pub username: Option<String>,
	/// Granted roles.
	pub roles: BTreeSet<RoleName>,
	/// Tenants the user may act on.
	pub tenants: Vec<TenantAccess>,
}
impl From<ClaimSet> for Profile {
	fn from(claims: ClaimSet) -> Self {
		Self {
			user_id: claims.user_id,
			email: claims.email,
			username: claims.username,
			roles: claims.roles,
			tenants: claims.tenants,
		}
	}
}

/// Loads the [`Profile`] of the user owning the tokens held in a [`TokenStore`].
pub trait ProfileSource
where
	Self: Send + Sync,
{
	/// Resolves the current user's profile.
	fn load<'a>(&'a self, tokens: &'a TokenStore) -> ProfileFuture<'a>;
}

/// Projects the profile straight out of the held access token's claims.
#[derive(Clone, Debug)]
pub struct ClaimsProfileSource {
	client_id: String,
}
impl ClaimsProfileSource {
	/// Reads client roles from `resource_access.<client_id>`.
	pub fn new(client_id: impl Into<String>) -> Self {
		Self { client_id: client_id.into() }
	}
}
impl ProfileSource for ClaimsProfileSource {
	fn load<'a>(&'a self, tokens: &'a TokenStore) -> ProfileFuture<'a> {
		Box::pin(async move {
			let token = tokens.current_access_token().ok_or(Error::TokenUnavailable)?;
			let claims = ClaimSet::decode(token.expose(), &self.client_id)
				.map_err(|e| Error::ProfileLoad { reason: e.to_string() })?;

			Ok(claims.into())
		})
	}
}

/// Fetches the profile from a backend "current user" endpoint through the [`HttpGateway`].
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug)]
pub struct EndpointProfileSource {
	gateway: HttpGateway,
	path: String,
}
#[cfg(feature = "reqwest")]
impl EndpointProfileSource {
	/// Conventional path of the current-user endpoint.
	pub const DEFAULT_PATH: &'static str = "me";

	/// Reads the profile from `path`, resolved against the gateway's base URL.
	pub fn new(gateway: HttpGateway, path: impl Into<String>) -> Self {
		Self { gateway, path: path.into() }
	}

	/// Endpoint path.
	pub fn path(&self) -> &str {
		&self.path
	}
}
#[cfg(feature = "reqwest")]
impl ProfileSource for EndpointProfileSource {
	fn load<'a>(&'a self, _tokens: &'a TokenStore) -> ProfileFuture<'a> {
		Box::pin(async move {
			let document = self
				.gateway
				.get_json::<ProfileDocument>(&self.path, None)
				.await
				.map_err(|e| match e {
					Error::ProfileLoad { .. } => e,
					e => Error::ProfileLoad { reason: e.to_string() },
				})?;

			Ok(document.into())
		})
	}
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileDocument {
	#[serde(default, alias = "sub", alias = "id", alias = "user_id")]
	user_id: Option<String>,
	#[serde(default)]
	email: Option<String>,
	#[serde(default, alias = "preferred_username", alias = "preferredUsername")]
	username: Option<String>,
	#[serde(default)]
	roles: Vec<String>,
	#[serde(default, alias = "stores", alias = "tenantAccess", alias = "tenant_access")]
	tenants: Vec<TenantAccess>,
}
impl From<ProfileDocument> for Profile {
	fn from(document: ProfileDocument) -> Self {
		Self {
			user_id: document.user_id.and_then(|id| UserId::new(id).ok()),
			email: document.email,
			username: document.username,
			roles: document.roles.iter().filter_map(|role| RoleName::new(role).ok()).collect(),
			tenants: document.tenants,
		}
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
	// self
	use super::*;
	use crate::auth::{ScopeSet, TenantId, TokenPair};

	fn jwt(payload: serde_json::Value) -> String {
		format!("e30.{}.sig", URL_SAFE_NO_PAD.encode(payload.to_string()))
	}

	fn store_with(access: String) -> TokenStore {
		let store = TokenStore::default();

		store
			.store(
				TokenPair::builder(ScopeSet::default())
					.access_token(access)
					.expires_in(Duration::minutes(5))
					.build()
					.expect("Token pair fixture should build."),
			)
			.expect("Token pair should be stored.");

		store
	}

	#[tokio::test]
	async fn claims_source_projects_roles_and_tenants() {
		let tokens = store_with(jwt(serde_json::json!({
			"sub": "user-1",
			"email": "ada@example.com",
			"preferred_username": "ada",
			"realm_access": { "roles": ["store-admin"] },
			"resource_access": { "console": { "roles": ["catalog-editor"] } },
			"tenant_access": [{ "tenantId": "t1", "tenantName": "Main", "isDefault": true }],
		})));
		let profile = ClaimsProfileSource::new("console")
			.load(&tokens)
			.await
			.expect("Claims profile should load.");

		assert_eq!(profile.user_id.as_deref(), Some("user-1"));
		assert_eq!(profile.username.as_deref(), Some("ada"));
		assert!(profile.roles.contains("store-admin"));
		assert!(profile.roles.contains("catalog-editor"));
		assert_eq!(
			profile.tenants,
			vec![
				TenantAccess::new(
					TenantId::new("t1").expect("Tenant fixture should be valid."),
					"Main"
				)
				.as_default()
			]
		);
	}

	#[tokio::test]
	async fn claims_source_requires_a_token_and_a_jwt() {
		let source = ClaimsProfileSource::new("console");

		assert!(matches!(
			source.load(&TokenStore::default()).await,
			Err(Error::TokenUnavailable)
		));
		assert!(matches!(
			source.load(&store_with("opaque".into())).await,
			Err(Error::ProfileLoad { .. })
		));
	}

	#[test]
	fn profile_documents_accept_store_aliases() {
		let document: ProfileDocument = serde_json::from_value(serde_json::json!({
			"id": "user-9",
			"preferredUsername": "grace",
			"roles": ["store-admin", ""],
			"stores": [{ "storeId": "s1", "storeName": "Outlet" }],
		}))
		.expect("Profile document should deserialize.");
		let profile = Profile::from(document);

		assert_eq!(profile.user_id.as_deref(), Some("user-9"));
		assert_eq!(profile.username.as_deref(), Some("grace"));
		assert_eq!(profile.roles.len(), 1);
		assert_eq!(profile.tenants[0].tenant_id.as_ref(), "s1");
		assert_eq!(profile.tenants[0].tenant_name, "Outlet");
	}
}
