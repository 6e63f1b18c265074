// std
use std::collections::BTreeMap;
// self
use oidc_session::{
	auth::ProviderId,
	provider::{
		DefaultProviderStrategy, GrantType, ProviderDescriptor, ProviderDescriptorBuilder,
		ProviderDescriptorError, ProviderErrorContext, ProviderErrorKind, ProviderQuirks,
		ProviderStrategy,
	},
	url::Url,
};

fn url(value: &str) -> Url {
	Url::parse(value).expect("Failed to parse mock provider URL.")
}

fn builder(id: &str) -> ProviderDescriptorBuilder {
	let provider_id =
		ProviderId::new(id).expect("Failed to build provider identifier for mock descriptor.");

	ProviderDescriptor::builder(provider_id)
}

#[test]
fn keycloak_realm_derives_openid_connect_endpoints() {
	let id = ProviderId::new("keycloak").expect("Provider identifier should be valid.");
	let descriptor =
		ProviderDescriptorBuilder::keycloak_realm(id, &url("https://id.example.com/auth/"), "shop")
			.and_then(ProviderDescriptorBuilder::build)
			.expect("Keycloak descriptor should build.");

	assert_eq!(
		descriptor.endpoints.token.as_str(),
		"https://id.example.com/auth/realms/shop/protocol/openid-connect/token"
	);
	assert_eq!(
		descriptor.endpoints.end_session.as_ref().map(Url::as_str),
		Some("https://id.example.com/auth/realms/shop/protocol/openid-connect/logout")
	);
	assert_eq!(descriptor.provider_origin(), "https://id.example.com");
	assert!(descriptor.supports(GrantType::AuthorizationCode));
	assert!(descriptor.supports(GrantType::RefreshToken));

	let provider_url = url("https://id.example.com");

	for realm in ["", "shop/admin", "shop?x=1"] {
		let id = ProviderId::new("keycloak").expect("Provider identifier should be valid.");
		let err = ProviderDescriptorBuilder::keycloak_realm(id, &provider_url, realm)
			.expect_err("Realms must map onto one path segment.");

		assert!(matches!(err, ProviderDescriptorError::InvalidRealm { .. }));
	}
}

#[test]
fn descriptor_rejects_insecure_endpoints_and_missing_grants() {
	let err = builder("mock-insecure")
		.authorization_endpoint(url("https://id.example.com/auth"))
		.token_endpoint(url("https://id.example.com/token"))
		.build()
		.expect_err("Descriptor builder should reject missing grants.");

	assert!(matches!(err, ProviderDescriptorError::NoSupportedGrants));

	let err = builder("mock")
		.authorization_endpoint(url("http://id.example.com/auth"))
		.token_endpoint(url("https://id.example.com/token"))
		.support_grant(GrantType::AuthorizationCode)
		.build()
		.expect_err("Descriptor builder should reject insecure authorization endpoints.");

	assert!(matches!(
		err,
		ProviderDescriptorError::InsecureEndpoint { endpoint: "authorization", .. }
	));

	let err = builder("mock")
		.authorization_endpoint(url("https://id.example.com/auth"))
		.token_endpoint(url("https://id.example.com/token"))
		.end_session_endpoint(url("http://id.example.com/logout"))
		.support_grant(GrantType::AuthorizationCode)
		.build()
		.expect_err("Descriptor builder should reject insecure end-session endpoints.");

	assert!(matches!(
		err,
		ProviderDescriptorError::InsecureEndpoint { endpoint: "end_session", .. }
	));
}

#[test]
fn loopback_endpoints_may_use_plain_http() {
	let descriptor = builder("local-keycloak")
		.authorization_endpoint(url("http://localhost:8080/realms/shop/auth"))
		.token_endpoint(url("http://127.0.0.1:8080/realms/shop/token"))
		.end_session_endpoint(url("http://[::1]:8080/realms/shop/logout"))
		.support_grants([GrantType::AuthorizationCode, GrantType::RefreshToken])
		.build()
		.expect("Loopback endpoints should be accepted.");

	assert!(descriptor.supports(GrantType::AuthorizationCode));
	assert!(descriptor.supports(GrantType::RefreshToken));
	assert_eq!(descriptor.provider_origin(), "http://localhost:8080");
	assert!(descriptor.quirks.pkce_required);
	assert!(descriptor.quirks.supports_prompt_none);
	assert_eq!(descriptor.quirks.scope_delimiter, ' ');
}

#[test]
fn pkce_requirement_requires_auth_code_grant() {
	let quirks = ProviderQuirks { pkce_required: true, ..ProviderQuirks::default() };
	let err = builder("pkce")
		.authorization_endpoint(url("https://id.example.com/auth"))
		.token_endpoint(url("https://id.example.com/token"))
		.support_grant(GrantType::RefreshToken)
		.quirks(quirks)
		.build()
		.expect_err("PKCE requirement should enforce support for authorization code grants.");

	assert!(matches!(err, ProviderDescriptorError::PkceRequiredWithoutAuthorizationCode));
}

#[test]
fn control_characters_are_rejected_as_scope_delimiters() {
	let quirks = ProviderQuirks { scope_delimiter: '\n', ..ProviderQuirks::default() };
	let err = builder("delimiter")
		.authorization_endpoint(url("https://id.example.com/auth"))
		.token_endpoint(url("https://id.example.com/token"))
		.support_grant(GrantType::AuthorizationCode)
		.quirks(quirks)
		.build()
		.expect_err("Control characters should be rejected.");

	assert_eq!(err, ProviderDescriptorError::InvalidScopeDelimiter { delimiter: '\n' });
}

#[test]
fn default_strategy_prefers_oauth_error_fields() {
	let strategy = DefaultProviderStrategy;
	let ctx = ProviderErrorContext::new(GrantType::AuthorizationCode)
		.with_http_status(400)
		.with_oauth_error("invalid_grant");

	assert_eq!(strategy.classify_token_error(&ctx), ProviderErrorKind::InvalidGrant);

	let ctx = ProviderErrorContext::new(GrantType::RefreshToken)
		.with_http_status(401)
		.with_oauth_error("unauthorized_client");

	assert_eq!(strategy.classify_token_error(&ctx), ProviderErrorKind::InvalidClient);
}

#[test]
fn default_strategy_falls_back_to_body_and_status() {
	let strategy = DefaultProviderStrategy;
	let body_ctx = ProviderErrorContext::new(GrantType::RefreshToken)
		.with_body_preview("error=insufficient_scope");

	assert_eq!(strategy.classify_token_error(&body_ctx), ProviderErrorKind::InsufficientScope);

	let network_ctx = ProviderErrorContext::network_failure(GrantType::RefreshToken);

	assert_eq!(strategy.classify_token_error(&network_ctx), ProviderErrorKind::Transient);

	let ctx = ProviderErrorContext::new(GrantType::AuthorizationCode)
		.with_http_status(500)
		.with_error_description("invalid_grant: code already used");

	assert_eq!(strategy.classify_token_error(&ctx), ProviderErrorKind::InvalidGrant);
}

#[test]
fn custom_strategy_can_add_authorize_parameters() {
	struct IdpHintStrategy;
	impl ProviderStrategy for IdpHintStrategy {
		fn classify_token_error(&self, _ctx: &ProviderErrorContext) -> ProviderErrorKind {
			ProviderErrorKind::InvalidGrant
		}

		fn augment_authorization_request(&self, params: &mut BTreeMap<String, String>) {
			params.insert("kc_idp_hint".into(), "corp-sso".into());
		}
	}

	let mut params = BTreeMap::new();

	IdpHintStrategy.augment_authorization_request(&mut params);

	assert_eq!(params.get("kc_idp_hint").map(String::as_str), Some("corp-sso"));

	let mut untouched = BTreeMap::new();

	DefaultProviderStrategy.augment_authorization_request(&mut untouched);

	assert!(untouched.is_empty());
}
