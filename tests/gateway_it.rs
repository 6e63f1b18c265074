#![cfg(feature = "reqwest")]

// crates.io
use futures::future;
use httpmock::prelude::*;
// self
use oidc_session::{
	_preludet::*,
	auth::{ProviderId, ScopeSet, TenantId, TokenPair},
	error::{ConfigError, TransientError},
	gateway::{ApiRequest, HttpGateway, RetryPolicy},
	provider::{GrantType, ProviderDescriptor},
	reqwest::Method,
	store::TokenStore,
};

const TOKEN_PATH: &str = "/realms/shop/protocol/openid-connect/token";

#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
struct Order {
	id: String,
	total_cents: u64,
}

fn seeded_tokens(access: &str) -> Arc<TokenStore> {
	let tokens = Arc::new(TokenStore::default());

	seed(&tokens, access);

	tokens
}

fn seed(tokens: &TokenStore, access: &str) {
	let pair = TokenPair::builder(ScopeSet::default())
		.access_token(access)
		.refresh_token("refresh-0")
		.expires_in(Duration::minutes(5))
		.build()
		.expect("Token pair fixture should build successfully.");

	tokens.store(pair).expect("Failed to seed the token store.");
}

fn api_base(server: &MockServer) -> Url {
	Url::parse(&server.url("/api/v1")).expect("API base URL should parse.")
}

fn build_descriptor(server: &MockServer) -> ProviderDescriptor {
	let provider_id =
		ProviderId::new("mock-gateway").expect("Provider identifier should be valid.");

	ProviderDescriptor::builder(provider_id)
		.authorization_endpoint(
			Url::parse(&server.url("/realms/shop/protocol/openid-connect/auth"))
				.expect("Mock authorize endpoint should parse successfully."),
		)
		.token_endpoint(
			Url::parse(&server.url(TOKEN_PATH))
				.expect("Mock token endpoint should parse successfully."),
		)
		.support_grants([GrantType::AuthorizationCode, GrantType::RefreshToken])
		.build()
		.expect("Provider descriptor should build successfully.")
}

#[tokio::test]
async fn requests_carry_bearer_tenant_and_request_id() {
	let server = MockServer::start_async().await;
	let gateway = build_reqwest_test_gateway(api_base(&server), seeded_tokens("access-1"));
	let tenant = TenantId::new("store-7").expect("Tenant fixture should be valid.");
	let mock = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/api/v1/orders/42")
				.header("authorization", "Bearer access-1")
				.header("x-store-id", "store-7")
				.header("accept", "application/json")
				.header_exists("x-request-id");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"id\":\"42\",\"total_cents\":1999}");
		})
		.await;
	let order: Order =
		gateway.get_json("orders/42", Some(&tenant)).await.expect("Order should be fetched.");

	mock.assert_async().await;

	assert_eq!(order, Order { id: "42".into(), total_cents: 1999 });
}

#[tokio::test]
async fn json_bodies_and_custom_tenant_headers_are_sent() {
	let server = MockServer::start_async().await;
	let gateway = build_reqwest_test_gateway(api_base(&server), seeded_tokens("access-1"))
		.with_tenant_header("X-Tenant")
		.expect("Header name should be valid.");
	let tenant = TenantId::new("store-7").expect("Tenant fixture should be valid.");
	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/api/v1/orders")
				.header("x-tenant", "store-7")
				.json_body(serde_json::json!({ "id": "43", "total_cents": 500 }));
			then.status(201)
				.header("content-type", "application/json")
				.body("{\"id\":\"43\",\"total_cents\":500}");
		})
		.await;
	let created: Order = gateway
		.send_json(
			Method::POST,
			"orders",
			&Order { id: "43".into(), total_cents: 500 },
			Some(&tenant),
		)
		.await
		.expect("Order should be created.");

	mock.assert_async().await;

	assert_eq!(created.id, "43");
}

#[tokio::test]
async fn unauthorized_responses_refresh_once_and_replay() {
	let server = MockServer::start_async().await;
	let (_client, tokens, _navigator) = build_reqwest_test_client(build_descriptor(&server), "gw");

	seed(&tokens, "access-stale");

	let gateway = build_reqwest_test_gateway(api_base(&server), tokens.clone());
	let token_mock = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH).body_includes("grant_type=refresh_token");
			then.status(200)
				.header("content-type", "application/json")
				.delay(std::time::Duration::from_millis(150))
				.body(
					"{\"access_token\":\"access-fresh\",\"token_type\":\"bearer\",\"expires_in\":300}",
				);
		})
		.await;
	let rejected = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/api/v1/products")
				.header("authorization", "Bearer access-stale");
			then.status(401).body("{\"message\":\"Token expired\"}");
		})
		.await;
	let accepted = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/api/v1/products")
				.header("authorization", "Bearer access-fresh");
			then.status(200).header("content-type", "application/json").body("[]");
		})
		.await;
	let results = future::join_all((0..4).map(|_| gateway.send(ApiRequest::get("products")))).await;

	for result in results {
		assert_eq!(result.expect("Replayed request should succeed.").status(), 200);
	}

	token_mock.assert_calls_async(1).await;
	rejected.assert_calls_async(4).await;
	accepted.assert_calls_async(4).await;
}

#[tokio::test]
async fn failed_refresh_surfaces_the_original_unauthorized() {
	let server = MockServer::start_async().await;
	let (_client, tokens, _navigator) = build_reqwest_test_client(build_descriptor(&server), "gw");

	seed(&tokens, "access-stale");

	let gateway = build_reqwest_test_gateway(api_base(&server), tokens.clone());

	server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(400)
				.header("content-type", "application/json")
				.body("{\"error\":\"invalid_grant\"}");
		})
		.await;

	let api = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/v1/products");
			then.status(401).body("{\"message\":\"Token expired\"}");
		})
		.await;
	let err = gateway.send(ApiRequest::get("products")).await.expect_err("401 should surface.");

	api.assert_calls_async(1).await;

	assert!(matches!(err, Error::Api { status: 401, .. }));
	assert!(err.requires_login());
	assert!(tokens.snapshot().is_none());
}

#[tokio::test]
async fn server_errors_are_retried_with_backoff() {
	let server = MockServer::start_async().await;
	let gateway = build_reqwest_test_gateway(api_base(&server), seeded_tokens("access-1"));
	let mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/v1/reports");
			then.status(503).body("maintenance");
		})
		.await;
	let err = gateway.send(ApiRequest::get("reports")).await.expect_err("503 should exhaust.");

	mock.assert_calls_async(4).await;

	assert!(matches!(
		err,
		Error::Transient(TransientError::Upstream { status: 503, attempts: 4, .. })
	));
}

#[tokio::test]
async fn client_errors_are_not_retried() {
	let server = MockServer::start_async().await;
	let gateway = build_reqwest_test_gateway(api_base(&server), seeded_tokens("access-1"))
		.with_retry_policy(RetryPolicy::new(5, Duration::milliseconds(10)));
	let mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/v1/orders/missing");
			then.status(404)
				.header("content-type", "application/json")
				.body("{\"message\":\"Order not found\"}");
		})
		.await;
	let err =
		gateway.send(ApiRequest::get("orders/missing")).await.expect_err("404 should fail.");

	mock.assert_calls_async(1).await;

	assert!(matches!(err, Error::Api { status: 404, .. }));
}

#[tokio::test]
async fn anonymous_requests_skip_the_token_store() {
	let server = MockServer::start_async().await;
	let gateway = HttpGateway::new(
		test_reqwest_http_client(),
		api_base(&server),
		Arc::new(TokenStore::default()),
	);
	let mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/v1/health");
			then.status(204);
		})
		.await;
	let response = gateway
		.send(ApiRequest::get("health").skip_auth())
		.await
		.expect("Anonymous request should not need a token.");

	mock.assert_async().await;

	assert_eq!(response.status(), 204);
	assert!(response.is_empty());
}

#[tokio::test]
async fn foreign_urls_are_rejected_before_sending() {
	let server = MockServer::start_async().await;
	let gateway = build_reqwest_test_gateway(api_base(&server), seeded_tokens("access-1"));
	let err = gateway
		.send(ApiRequest::get("https://evil.example.net/steal"))
		.await
		.expect_err("Foreign origins must be rejected.");

	assert!(matches!(err, Error::Config(ConfigError::ForeignApiUrl { .. })));
}
