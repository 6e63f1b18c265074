#![cfg(feature = "reqwest")]

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use httpmock::prelude::*;
// self
use oidc_session::{
	_preludet::*,
	auth::{ProviderId, RoleName, TenantId, UserId},
	config::SessionConfig,
	context::AppContext,
	flows::{Navigator, RecordingNavigator},
	gateway::ApiRequest,
	provider::{GrantType, ProviderDescriptor},
	session::{
		AccessPolicy, AccessRequirement, ClaimsProfileSource, ReqwestSessionState, SessionState,
		SessionStatus, TenantAccessError,
	},
	store::{MemoryPreferenceStore, PreferenceStore, TokenStore},
};

const CLIENT_ID: &str = "console-session";
const TOKEN_PATH: &str = "/realms/shop/protocol/openid-connect/token";
const LOGOUT_PATH: &str = "/realms/shop/protocol/openid-connect/logout";

fn jwt(claims: serde_json::Value) -> String {
	format!("eyJhbGciOiJSUzI1NiJ9.{}.signature", URL_SAFE_NO_PAD.encode(claims.to_string()))
}

fn tenant(id: &str) -> TenantId {
	TenantId::new(id).expect("Tenant fixture should be valid.")
}

fn build_descriptor(server: &MockServer) -> ProviderDescriptor {
	let provider_id =
		ProviderId::new("mock-session").expect("Provider identifier should be valid.");

	ProviderDescriptor::builder(provider_id)
		.authorization_endpoint(
			Url::parse(&server.url("/realms/shop/protocol/openid-connect/auth"))
				.expect("Mock authorize endpoint should parse successfully."),
		)
		.token_endpoint(
			Url::parse(&server.url(TOKEN_PATH))
				.expect("Mock token endpoint should parse successfully."),
		)
		.end_session_endpoint(
			Url::parse(&server.url(LOGOUT_PATH))
				.expect("Mock end-session endpoint should parse successfully."),
		)
		.support_grants([GrantType::AuthorizationCode, GrantType::RefreshToken])
		.build()
		.expect("Provider descriptor should build successfully.")
}

struct Harness {
	session: ReqwestSessionState,
	tokens: Arc<TokenStore>,
	preferences: Arc<MemoryPreferenceStore>,
}

fn harness(server: &MockServer) -> Harness {
	let (client, tokens, _navigator) =
		build_reqwest_test_client(build_descriptor(server), CLIENT_ID);
	let preferences = Arc::new(MemoryPreferenceStore::default());
	let session = SessionState::new(
		client,
		Arc::new(ClaimsProfileSource::new(CLIENT_ID)),
		preferences.clone(),
		AccessPolicy::standard().expect("Default policy should build."),
	);

	Harness { session, tokens, preferences }
}

/// Runs login plus callback against a token endpoint issuing `access_token`.
async fn sign_in(server: &MockServer, session: &ReqwestSessionState, access_token: String) {
	server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH).body_includes("grant_type=authorization_code");
			then.status(200).header("content-type", "application/json").json_body(
				serde_json::json!({
					"access_token": access_token,
					"refresh_token": "refresh-1",
					"token_type": "bearer",
					"expires_in": 300,
				}),
			);
		})
		.await;

	let redirect_uri =
		Url::parse("https://admin.example.com/callback").expect("Redirect URI should parse.");
	let authorize_url = session.login(&redirect_uri).await.expect("Login should start.");

	assert_eq!(session.status(), SessionStatus::Loading);

	let state = authorize_url
		.query_pairs()
		.find(|(key, _)| key == "state")
		.map(|(_, value)| value.into_owned())
		.expect("Authorize URL should carry a state.");
	let mut callback = redirect_uri.clone();

	callback.query_pairs_mut().append_pair("code", "auth-code").append_pair("state", &state);

	session.complete_login_from_url(&callback).await.expect("Login should complete.");
}

fn store_admin_claims(tenants: serde_json::Value) -> String {
	jwt(serde_json::json!({
		"sub": "user-1",
		"email": "ada@example.com",
		"preferred_username": "ada",
		"realm_access": { "roles": ["store-admin"] },
		"resource_access": { CLIENT_ID: { "roles": ["catalog-editor"] } },
		"tenant_access": tenants,
	}))
}

#[tokio::test]
async fn login_derives_roles_and_selects_the_only_tenant() {
	let server = MockServer::start_async().await;
	let Harness { session, .. } = harness(&server);
	let access =
		store_admin_claims(serde_json::json!([{ "tenantId": "t1", "tenantName": "Main" }]));

	sign_in(&server, &session, access).await;

	let snapshot = session.snapshot();

	assert_eq!(snapshot.status, SessionStatus::Authenticated);
	assert_eq!(snapshot.user_id.as_deref(), Some("user-1"));
	assert_eq!(snapshot.username.as_deref(), Some("ada"));
	assert_eq!(snapshot.selected_tenant, Some(tenant("t1")));
	assert!(session.has_role("store-admin"));
	assert!(session.has_any_role(["auditor", "catalog-editor"]));
	assert!(!session.has_role("platform-admin"));
	assert!(session.can_access_tenant(&tenant("t1")));
	assert!(!session.can_access_tenant(&tenant("t2")));

	let store_admin = RoleName::new("store-admin").expect("Role fixture should be valid.");
	let auditor = RoleName::new("auditor").expect("Role fixture should be valid.");

	assert!(
		session
			.authorize(&AccessRequirement::authenticated().role(store_admin).selected_tenant())
			.is_ok()
	);
	assert!(matches!(
		session.authorize(&AccessRequirement::authenticated().role(auditor)),
		Err(Error::TenantAccess(TenantAccessError::WrongRole { .. }))
	));
	assert!(matches!(
		session.authorize(&AccessRequirement::authenticated().tenant(tenant("t2"))),
		Err(Error::TenantAccess(TenantAccessError::WrongTenant { .. }))
	));
}

#[tokio::test]
async fn saved_preference_beats_the_default_tenant() {
	let server = MockServer::start_async().await;
	let Harness { session, preferences, .. } = harness(&server);
	let user = UserId::new("user-1").expect("User fixture should be valid.");

	preferences
		.save_selected_tenant(&user, Some(&tenant("t3")))
		.await
		.expect("Preference should be saved.");

	let access = store_admin_claims(serde_json::json!([
		{ "tenantId": "t1", "tenantName": "Main", "isDefault": true },
		{ "tenantId": "t3", "tenantName": "Outlet" },
	]));

	sign_in(&server, &session, access).await;

	assert_eq!(session.selected_tenant(), Some(tenant("t3")));
}

#[tokio::test]
async fn default_flag_picks_among_several_tenants() {
	let server = MockServer::start_async().await;
	let Harness { session, .. } = harness(&server);
	let access = store_admin_claims(serde_json::json!([
		{ "tenantId": "t1", "tenantName": "Main" },
		{ "tenantId": "t2", "tenantName": "Outlet", "isDefault": true },
	]));

	sign_in(&server, &session, access).await;

	assert_eq!(session.selected_tenant(), Some(tenant("t2")));
}

#[tokio::test]
async fn users_without_tenants_have_no_selection() {
	let server = MockServer::start_async().await;
	let Harness { session, .. } = harness(&server);

	sign_in(&server, &session, store_admin_claims(serde_json::json!([]))).await;

	assert_eq!(session.status(), SessionStatus::Authenticated);
	assert_eq!(session.selected_tenant(), None);
	assert!(matches!(
		session.authorize(&AccessRequirement::authenticated().selected_tenant()),
		Err(Error::TenantAccess(TenantAccessError::NoTenantSelected))
	));
}

#[tokio::test]
async fn tenant_switching_is_checked_and_persisted() {
	let server = MockServer::start_async().await;
	let Harness { session, preferences, .. } = harness(&server);
	let access = store_admin_claims(serde_json::json!([
		{ "tenantId": "t1", "tenantName": "Main" },
		{ "tenantId": "t2", "tenantName": "Outlet" },
	]));

	sign_in(&server, &session, access).await;

	assert_eq!(session.selected_tenant(), None);

	let err = session
		.set_selected_tenant(Some(tenant("t9")))
		.await
		.expect_err("Foreign tenants must be rejected.");

	assert!(matches!(err, Error::TenantAccess(TenantAccessError::WrongTenant { .. })));
	assert_eq!(session.selected_tenant(), None);

	session.set_selected_tenant(Some(tenant("t2"))).await.expect("Tenant should be selected.");

	let user = UserId::new("user-1").expect("User fixture should be valid.");

	assert_eq!(session.selected_tenant(), Some(tenant("t2")));
	assert_eq!(
		preferences.selected_tenant(&user).await.expect("Preference should load."),
		Some(tenant("t2"))
	);
}

#[tokio::test]
async fn platform_admin_may_select_any_tenant() {
	let server = MockServer::start_async().await;
	let Harness { session, .. } = harness(&server);
	let access = jwt(serde_json::json!({
		"sub": "root",
		"realm_access": { "roles": ["platform-admin"] },
	}));

	sign_in(&server, &session, access).await;

	assert!(session.has_role("platform-admin"));
	assert!(!session.has_role("store-admin"));
	assert!(session.can_access_tenant(&tenant("any-store")));

	session
		.set_selected_tenant(Some(tenant("any-store")))
		.await
		.expect("Platform admins may act on every tenant.");

	assert!(session.authorize(&AccessRequirement::authenticated().selected_tenant()).is_ok());
}

#[tokio::test]
async fn logout_always_ends_idle() {
	let server = MockServer::start_async().await;
	let Harness { session, tokens, .. } = harness(&server);

	sign_in(&server, &session, store_admin_claims(serde_json::json!([]))).await;

	let end_session = server
		.mock_async(|when, then| {
			when.method(POST).path(LOGOUT_PATH);
			then.status(502).body("bad gateway");
		})
		.await;
	let outcome = session.logout(None).await;

	end_session.assert_calls_async(1).await;

	assert!(outcome.is_err());
	assert!(tokens.snapshot().is_none());
	assert_eq!(session.snapshot(), Default::default());
	assert!(!session.has_role("store-admin"));
}

#[tokio::test]
async fn rejected_refresh_resets_the_session() {
	let server = MockServer::start_async().await;
	let Harness { session, tokens, .. } = harness(&server);

	sign_in(&server, &session, store_admin_claims(serde_json::json!([]))).await;

	server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH).body_includes("grant_type=refresh_token");
			then.status(400)
				.header("content-type", "application/json")
				.body("{\"error\":\"invalid_grant\"}");
		})
		.await;

	let err = session.refresh().await.expect_err("Refresh should be rejected.");

	assert!(err.requires_login());
	assert!(tokens.snapshot().is_none());
	assert_eq!(session.status(), SessionStatus::Idle);
}

#[tokio::test]
async fn unreadable_profiles_put_the_session_in_error() {
	let server = MockServer::start_async().await;
	let Harness { session, tokens, .. } = harness(&server);

	server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"opaque\",\"refresh_token\":\"r\",\"token_type\":\"bearer\",\"expires_in\":300}",
			);
		})
		.await;

	let redirect_uri =
		Url::parse("https://admin.example.com/callback").expect("Redirect URI should parse.");
	let authorize_url = session.login(&redirect_uri).await.expect("Login should start.");
	let state = authorize_url
		.query_pairs()
		.find(|(key, _)| key == "state")
		.map(|(_, value)| value.into_owned())
		.expect("Authorize URL should carry a state.");
	let err = session
		.complete_login("auth-code", &state)
		.await
		.expect_err("Opaque tokens carry no profile.");
	let snapshot = session.snapshot();

	assert!(matches!(err, Error::ProfileLoad { .. }));
	assert_eq!(snapshot.status, SessionStatus::Error);
	assert!(snapshot.error_message.is_some());
	assert!(tokens.snapshot().is_none());
}

#[tokio::test]
async fn init_without_a_session_is_idle() {
	let server = MockServer::start_async().await;
	let Harness { session, .. } = harness(&server);

	assert_eq!(session.init().await.expect("Init should succeed."), SessionStatus::Idle);
}

#[tokio::test]
async fn app_context_loads_the_profile_endpoint_and_scopes_requests() {
	let server = MockServer::start_async().await;
	let provider_url = server.base_url();
	let api_base_url = server.url("/api");
	let config = SessionConfig::from_lookup(|key| match key {
		"OIDC_PROVIDER_URL" => Some(provider_url.clone()),
		"OIDC_REALM" => Some("shop".into()),
		"OIDC_CLIENT_ID" => Some(CLIENT_ID.into()),
		"OIDC_REDIRECT_URI" => Some("https://admin.example.com/callback".into()),
		"API_BASE_URL" => Some(api_base_url.clone()),
		"API_PROFILE_PATH" => Some("me".into()),
		_ => None,
	})
	.expect("Config should load.");
	let navigator = Arc::new(RecordingNavigator::default());
	let context = AppContext::builder(config)
		.http_client(test_reqwest_http_client())
		.navigator(navigator.clone() as Arc<dyn Navigator>)
		.build()
		.expect("Context should build.");

	server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"opaque-1\",\"refresh_token\":\"r\",\"token_type\":\"bearer\",\"expires_in\":300}",
			);
		})
		.await;

	let profile = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/me").header("authorization", "Bearer opaque-1");
			then.status(200).header("content-type", "application/json").json_body(
				serde_json::json!({
					"id": "user-7",
					"email": "grace@example.com",
					"roles": ["store-admin"],
					"stores": [{ "storeId": "s1", "storeName": "Flagship" }],
				}),
			);
		})
		.await;
	let orders = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/orders").header("x-store-id", "s1");
			then.status(200).header("content-type", "application/json").body("[]");
		})
		.await;
	let authorize_url = context.login().await.expect("Login should start.");

	assert_eq!(navigator.last(), Some(authorize_url.clone()));

	let state = authorize_url
		.query_pairs()
		.find(|(key, _)| key == "state")
		.map(|(_, value)| value.into_owned())
		.expect("Authorize URL should carry a state.");

	context.session().complete_login("auth-code", &state).await.expect("Login should complete.");
	profile.assert_async().await;

	assert_eq!(context.session().selected_tenant(), Some(tenant("s1")));
	assert!(context.session().has_role("store-admin"));

	let response = context.send(ApiRequest::get("orders")).await.expect("Orders should load.");

	orders.assert_async().await;

	assert_eq!(response.status(), 200);
}
