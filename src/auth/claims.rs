//! Read-only projection of JWT claims into user, role, and tenant-access data.
//!
//! Tokens are decoded without signature verification: they arrive straight from the
//! provider's token endpoint over TLS and the projection only drives client-side
//! navigation. The backend API remains the authority that verifies every bearer token.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
// self
use crate::{
	_prelude::*,
	auth::{RoleName, TenantId, UserId},
};

/// Errors raised while decoding a JWT payload.
#[derive(Debug, ThisError)]
pub enum ClaimsError {
	/// Token does not have the `header.payload.signature` shape.
	#[error("Token is not a compact JWT.")]
	Malformed,
	/// Payload segment is not valid base64url.
	#[error("Token payload is not valid base64url.")]
	Encoding(#[from] base64::DecodeError),
	/// Payload JSON does not match the expected claim shapes.
	#[error("Token payload has unexpected claims.")]
	Json(#[from] serde_path_to_error::Error<serde_json::Error>),
}

/// Tenant (store) the user may access, as advertised by the token or profile endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantAccess {
	/// Tenant identifier.
	#[serde(alias = "storeId", alias = "store_id", alias = "tenant_id")]
	pub tenant_id: TenantId,
	/// Display name of the tenant.
	#[serde(default, alias = "storeName", alias = "store_name", alias = "tenant_name")]
	pub tenant_name: String,
	/// Marks the tenant the user lands on when several are available.
	#[serde(default, alias = "is_default")]
	pub is_default: bool,
}
impl TenantAccess {
	/// Creates an entry for the provided tenant.
	pub fn new(tenant_id: TenantId, tenant_name: impl Into<String>) -> Self {
		Self { tenant_id, tenant_name: tenant_name.into(), is_default: false }
	}

	/// Flags the entry as the user's default tenant.
	pub fn as_default(mut self) -> Self {
		self.is_default = true;

		self
	}
}

/// Derived claim set recomputed every time a new token is hydrated.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClaimSet {
	/// Subject (`sub`) of the token.
	pub user_id: Option<UserId>,
	/// `email` claim.
	pub email: Option<String>,
	/// `preferred_username` claim.
	pub username: Option<String>,
	/// Expiry (`exp`) advertised inside the token.
	pub expires_at: Option<OffsetDateTime>,
	/// Realm roles plus roles granted to the console's client.
	pub roles: BTreeSet<RoleName>,
	/// Tenants the user may access.
	pub tenants: Vec<TenantAccess>,
}
impl ClaimSet {
	/// Decodes the payload of a compact JWT.
	///
	/// Roles are collected from `realm_access.roles`, `resource_access.<client_id>.roles`, and
	/// a flat `roles` claim; tenants from `tenant_access` (or its `stores` alias). Role values
	/// that are not valid identifiers are skipped.
	pub fn decode(token: &str, client_id: &str) -> Result<Self, ClaimsError> {
		decode_payload::<RawClaims>(token).map(|raw| raw.project(client_id))
	}
}

/// Reads the `nonce` claim of an ID token.
pub(crate) fn id_token_nonce(token: &str) -> Result<Option<String>, ClaimsError> {
	#[derive(Deserialize)]
	struct NonceClaim {
		#[serde(default)]
		nonce: Option<String>,
	}

	decode_payload::<NonceClaim>(token).map(|claim| claim.nonce)
}

fn decode_payload<T>(token: &str) -> Result<T, ClaimsError>
where
	T: for<'de> Deserialize<'de>,
{
	let mut segments = token.split('.');
	let (Some(_header), Some(payload), Some(_signature), None) =
		(segments.next(), segments.next(), segments.next(), segments.next())
	else {
		return Err(ClaimsError::Malformed);
	};
	let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('='))?;

	Ok(serde_path_to_error::deserialize(&mut serde_json::Deserializer::from_slice(&bytes))?)
}

#[derive(Debug, Default, Deserialize)]
struct RoleClaim {
	#[serde(default)]
	roles: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawClaims {
	#[serde(default)]
	sub: Option<String>,
	#[serde(default)]
	email: Option<String>,
	#[serde(default)]
	preferred_username: Option<String>,
	#[serde(default)]
	exp: Option<i64>,
	#[serde(default)]
	realm_access: Option<RoleClaim>,
	#[serde(default)]
	resource_access: HashMap<String, RoleClaim>,
	#[serde(default)]
	roles: Vec<String>,
	#[serde(default, alias = "stores")]
	tenant_access: Vec<TenantAccess>,
}
impl RawClaims {
	fn project(self, client_id: &str) -> ClaimSet {
		let RawClaims {
			sub,
			email,
			preferred_username,
			exp,
			realm_access,
			mut resource_access,
			roles,
			tenant_access,
		} = self;
		let realm_roles = realm_access.map(|claim| claim.roles).unwrap_or_default();
		let client_roles =
			resource_access.remove(client_id).map(|claim| claim.roles).unwrap_or_default();
		let roles = realm_roles
			.into_iter()
			.chain(client_roles)
			.chain(roles)
			.filter_map(|role| match RoleName::new(&role) {
				Ok(role) => Some(role),
				Err(_e) => {
					log_debug!(error = %_e, "Skipping role claim that is not a valid identifier.");

					None
				},
			})
			.collect();

		ClaimSet {
			user_id: sub.and_then(|sub| UserId::new(sub).ok()),
			email,
			username: preferred_username,
			expires_at: exp.and_then(|exp| OffsetDateTime::from_unix_timestamp(exp).ok()),
			roles,
			tenants: tenant_access,
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn jwt(payload: serde_json::Value) -> String {
		let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
		let body = URL_SAFE_NO_PAD.encode(payload.to_string());

		format!("{header}.{body}.signature")
	}

	#[test]
	fn decode_merges_realm_client_and_flat_roles() {
		let token = jwt(serde_json::json!({
			"sub": "user-1",
			"email": "ops@example.com",
			"preferred_username": "ops",
			"exp": 1_767_225_600,
			"realm_access": { "roles": ["store-admin", "offline_access"] },
			"resource_access": {
				"console": { "roles": ["catalog-editor"] },
				"other": { "roles": ["ignored"] }
			},
			"roles": ["auditor", "not valid"],
			"tenant_access": [{ "tenantId": "t1", "tenantName": "Main", "isDefault": true }]
		}));
		let claims = ClaimSet::decode(&token, "console").expect("Token payload should decode.");
		let roles: Vec<&str> = claims.roles.iter().map(|role| role.as_ref()).collect();

		assert_eq!(claims.user_id.as_deref(), Some("user-1"));
		assert_eq!(claims.email.as_deref(), Some("ops@example.com"));
		assert_eq!(claims.username.as_deref(), Some("ops"));
		assert!(claims.expires_at.is_some());
		assert_eq!(roles, vec!["auditor", "catalog-editor", "offline_access", "store-admin"]);
		assert_eq!(claims.tenants.len(), 1);
		assert!(claims.tenants[0].is_default);
	}

	#[test]
	fn stores_alias_and_snake_case_fields_are_accepted() {
		let token = jwt(serde_json::json!({
			"sub": "user-2",
			"stores": [{ "store_id": "s-9", "store_name": "Outlet" }]
		}));
		let claims = ClaimSet::decode(&token, "console").expect("Token payload should decode.");

		assert_eq!(claims.tenants[0].tenant_id.as_ref(), "s-9");
		assert_eq!(claims.tenants[0].tenant_name, "Outlet");
		assert!(!claims.tenants[0].is_default);
		assert!(claims.roles.is_empty());
	}

	#[test]
	fn nonce_is_read_from_id_tokens() {
		let with_nonce = jwt(serde_json::json!({ "sub": "user-1", "nonce": "n-1" }));
		let without = jwt(serde_json::json!({ "sub": "user-1" }));

		let nonce = id_token_nonce(&with_nonce).expect("ID token should decode.");

		assert_eq!(nonce.as_deref(), Some("n-1"));
		assert_eq!(id_token_nonce(&without).expect("ID token should decode."), None);
		assert!(matches!(id_token_nonce("opaque"), Err(ClaimsError::Malformed)));
	}

	#[test]
	fn malformed_tokens_are_rejected() {
		assert!(matches!(ClaimSet::decode("opaque-token", "console"), Err(ClaimsError::Malformed)));
		assert!(matches!(ClaimSet::decode("a.%%%.c", "console"), Err(ClaimsError::Encoding(_))));

		let token = jwt(serde_json::json!({ "tenant_access": [{ "tenantId": "" }] }));

		assert!(matches!(ClaimSet::decode(&token, "console"), Err(ClaimsError::Json(_))));
	}
}
