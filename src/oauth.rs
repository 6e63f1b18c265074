//! Internal OAuth client facade over the `oauth2` crate.
//!
//! The facade turns code exchanges and refresh grants into [`TokenPair`] values (keeping the
//! OIDC `id_token` that plain OAuth responses drop) and posts end-session notifications. Every
//! provider or transport failure is mapped into the crate's [`Error`] taxonomy through a
//! [`ProviderStrategy`] and a [`TransportErrorMapper`].

pub use oauth2;

// std
use std::borrow::Cow;
// crates.io
use oauth2::{
	AsyncHttpClient, AuthType, AuthUrl, AuthorizationCode, Client, ClientId, ClientSecret,
	EndpointNotSet, EndpointSet, ExtraTokenFields, HttpClientError, HttpRequest, PkceCodeVerifier,
	RedirectUrl, RefreshToken, RequestTokenError, Scope, StandardRevocableToken,
	StandardTokenResponse, TokenResponse, TokenUrl,
	basic::{
		BasicErrorResponse, BasicRequestTokenError, BasicRevocationErrorResponse,
		BasicTokenIntrospectionResponse, BasicTokenType,
	},
	http::{Method, header},
};
// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, TokenPair, TokenSecret},
	error::{ConfigError, TransientError, TransportError},
	http::{ResponseMetadata, ResponseMetadataSlot, TokenHttpClient},
	provider::{
		ClientAuthMethod, GrantType, ProviderDescriptor, ProviderErrorContext, ProviderErrorKind,
		ProviderStrategy,
	},
};

type UnconfiguredOidcClient = Client<
	BasicErrorResponse,
	FacadeTokenResponse,
	BasicTokenIntrospectionResponse,
	StandardRevocableToken,
	BasicRevocationErrorResponse,
>;
type ConfiguredOidcClient = Client<
	BasicErrorResponse,
	FacadeTokenResponse,
	BasicTokenIntrospectionResponse,
	StandardRevocableToken,
	BasicRevocationErrorResponse,
	EndpointSet,
	EndpointNotSet,
	EndpointNotSet,
	EndpointNotSet,
	EndpointSet,
>;
type FacadeTokenResponse = StandardTokenResponse<IdTokenFields, BasicTokenType>;
type FacadeFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;

/// OIDC additions to the token endpoint response.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub(crate) struct IdTokenFields {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	id_token: Option<String>,
}
impl ExtraTokenFields for IdTokenFields {}

/// Parameters of an end-session notification.
pub(crate) struct EndSession<'a> {
	pub(crate) endpoint: &'a Url,
	pub(crate) refresh_token: Option<&'a TokenSecret>,
	pub(crate) id_token: Option<&'a TokenSecret>,
}

/// Maps HTTP transport failures into session [`Error`] values.
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an [`HttpClientError`] emitted by the transport into a session error.
	fn map_transport_error(
		&self,
		strategy: &dyn ProviderStrategy,
		grant: GrantType,
		metadata: Option<&ResponseMetadata>,
		error: HttpClientError<E>,
	) -> Error;
}

/// Default mapper for reqwest-backed transports.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
#[cfg(feature = "reqwest")]
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(
		&self,
		_strategy: &dyn ProviderStrategy,
		_grant: GrantType,
		meta: Option<&ResponseMetadata>,
		err: HttpClientError<ReqwestError>,
	) -> Error {
		match err {
			HttpClientError::Reqwest(inner) => map_reqwest_error(meta, *inner),
			HttpClientError::Http(inner) => ConfigError::from(inner).into(),
			HttpClientError::Io(inner) => TransportError::Io(inner).into(),
			HttpClientError::Other(message) => map_generic_transport_error(meta, message),
			_ => map_unknown_transport_error(meta),
		}
	}
}

pub(crate) trait OAuth2Facade {
	fn exchange_authorization_code<'a, 'strategy, 'code, 'pkce, 'scope, 'redirect>(
		&'a self,
		strategy: &'strategy dyn ProviderStrategy,
		code: &'code str,
		pkce_verifier: &'pkce str,
		requested_scope: &'scope ScopeSet,
		redirect_uri: &'redirect Url,
	) -> FacadeFuture<'a, TokenPair>
	where
		'strategy: 'a,
		'code: 'a,
		'pkce: 'a,
		'scope: 'a,
		'redirect: 'a;

	fn refresh_token<'a, 'strategy, 'refresh, 'scope>(
		&'a self,
		strategy: &'strategy dyn ProviderStrategy,
		refresh_token: &'refresh TokenSecret,
		requested_scope: &'scope ScopeSet,
	) -> FacadeFuture<'a, TokenPair>
	where
		'strategy: 'a,
		'refresh: 'a,
		'scope: 'a;

	fn end_session<'a>(
		&'a self,
		strategy: &'a dyn ProviderStrategy,
		request: EndSession<'a>,
	) -> FacadeFuture<'a, ()>;
}

pub(crate) struct BasicFacade<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	oauth_client: ConfiguredOidcClient,
	http_client: Arc<C>,
	error_mapper: Arc<M>,
}
impl<C, M> BasicFacade<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	pub(crate) fn from_descriptor(
		descriptor: &ProviderDescriptor,
		client_id: &str,
		client_secret: Option<&str>,
		http_client: Arc<C>,
		error_mapper: Arc<M>,
	) -> Result<Self> {
		let auth_url = AuthUrl::new(descriptor.endpoints.authorization.to_string())
			.map_err(|source| ConfigError::InvalidDescriptor { source })?;
		let token_url = TokenUrl::new(descriptor.endpoints.token.to_string())
			.map_err(|source| ConfigError::InvalidDescriptor { source })?;
		let secret =
			if matches!(descriptor.preferred_client_auth_method, ClientAuthMethod::NoneWithPkce) {
				None
			} else {
				client_secret.map(|value| ClientSecret::new(value.to_owned()))
			};
		let mut oauth_client = UnconfiguredOidcClient::new(ClientId::new(client_id.to_owned()))
			.set_auth_uri(auth_url)
			.set_token_uri(token_url);

		if let Some(secret) = secret {
			oauth_client = oauth_client.set_client_secret(secret);
		}
		if matches!(descriptor.preferred_client_auth_method, ClientAuthMethod::ClientSecretPost) {
			oauth_client = oauth_client.set_auth_type(AuthType::RequestBody);
		}

		Ok(Self { oauth_client, http_client, error_mapper })
	}
}
impl<C, M> OAuth2Facade for BasicFacade<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn exchange_authorization_code<'a, 'strategy, 'code, 'pkce, 'scope, 'redirect>(
		&'a self,
		strategy: &'strategy dyn ProviderStrategy,
		code: &'code str,
		pkce_verifier: &'pkce str,
		requested_scope: &'scope ScopeSet,
		redirect_uri: &'redirect Url,
	) -> FacadeFuture<'a, TokenPair>
	where
		'strategy: 'a,
		'code: 'a,
		'pkce: 'a,
		'scope: 'a,
		'redirect: 'a,
	{
		let meta = ResponseMetadataSlot::default();

		Box::pin(async move {
			let instrumented = self.http_client.with_metadata(meta.clone());
			let redirect_url = RedirectUrl::new(redirect_uri.to_string())
				.map_err(|source| ConfigError::InvalidRedirect { source })?;
			let request = self
				.oauth_client
				.exchange_code(AuthorizationCode::new(code.to_owned()))
				.set_pkce_verifier(PkceCodeVerifier::new(pkce_verifier.to_owned()))
				.set_redirect_uri(Cow::Owned(redirect_url));
			let response = request.request_async(&instrumented).await.map_err(|err| {
				map_request_error(
					strategy,
					GrantType::AuthorizationCode,
					meta.take(),
					err,
					self.error_mapper.as_ref(),
				)
			})?;

			map_token_response(requested_scope, response)
		})
	}

	fn refresh_token<'a, 'strategy, 'refresh, 'scope>(
		&'a self,
		strategy: &'strategy dyn ProviderStrategy,
		refresh_token: &'refresh TokenSecret,
		requested_scope: &'scope ScopeSet,
	) -> FacadeFuture<'a, TokenPair>
	where
		'strategy: 'a,
		'refresh: 'a,
		'scope: 'a,
	{
		let meta = ResponseMetadataSlot::default();

		Box::pin(async move {
			let instrumented = self.http_client.with_metadata(meta.clone());
			let refresh_secret = RefreshToken::new(refresh_token.expose().to_owned());
			let mut request = self.oauth_client.exchange_refresh_token(&refresh_secret);

			for scope in requested_scope.iter() {
				request = request.add_scope(Scope::new(scope.to_owned()));
			}

			let response = request.request_async(&instrumented).await.map_err(|err| {
				map_request_error(
					strategy,
					GrantType::RefreshToken,
					meta.take(),
					err,
					self.error_mapper.as_ref(),
				)
			})?;

			map_token_response(requested_scope, response)
		})
	}

	fn end_session<'a>(
		&'a self,
		strategy: &'a dyn ProviderStrategy,
		request: EndSession<'a>,
	) -> FacadeFuture<'a, ()> {
		let meta = ResponseMetadataSlot::default();

		Box::pin(async move {
			let instrumented = self.http_client.with_metadata(meta.clone());
			let body = {
				let mut form = url::form_urlencoded::Serializer::new(String::new());

				form.append_pair("client_id", self.oauth_client.client_id().as_str());

				if let Some(refresh_token) = request.refresh_token {
					form.append_pair("refresh_token", refresh_token.expose());
				}
				if let Some(id_token) = request.id_token {
					form.append_pair("id_token_hint", id_token.expose());
				}

				form.finish()
			};
			let request: HttpRequest = oauth2::http::Request::builder()
				.method(Method::POST)
				.uri(request.endpoint.as_str())
				.header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
				.header(header::ACCEPT, "application/json")
				.body(body.into_bytes())
				.map_err(ConfigError::from)?;
			let response = instrumented.call(request).await.map_err(|err| {
				self.error_mapper.map_transport_error(
					strategy,
					GrantType::RefreshToken,
					meta.take().as_ref(),
					err,
				)
			})?;
			let status = response.status();

			if status.is_success() || status.is_redirection() {
				return Ok(());
			}

			let meta = meta.take();

			Err(TransientError::TokenEndpoint {
				message: format!("End-session endpoint answered with status {}", status.as_u16()),
				status: Some(status.as_u16()),
				retry_after: meta_retry_after(meta.as_ref()),
			}
			.into())
		})
	}
}

fn map_token_response(
	requested_scope: &ScopeSet,
	response: FacadeTokenResponse,
) -> Result<TokenPair> {
	let expires_in = response.expires_in().ok_or(ConfigError::MissingExpiresIn)?.as_secs();
	let expires_in = i64::try_from(expires_in).map_err(|_| ConfigError::ExpiresInOutOfRange)?;

	if expires_in <= 0 {
		return Err(ConfigError::NonPositiveExpiresIn.into());
	}

	// Providers may narrow the granted scope; an absent field means the request was honoured.
	let scope = match response.scopes() {
		Some(scopes) =>
			ScopeSet::new(scopes.iter().map(|scope| scope.as_ref())).map_err(ConfigError::from)?,
		None => requested_scope.clone(),
	};
	let mut builder = TokenPair::builder(scope)
		.access_token(response.access_token().secret().to_owned())
		.issued_at(OffsetDateTime::now_utc())
		.expires_in(Duration::seconds(expires_in));

	if let Some(refresh) = response.refresh_token() {
		builder = builder.refresh_token(refresh.secret().to_owned());
	}
	if let Some(id_token) = response.extra_fields().id_token.as_deref() {
		builder = builder.id_token(id_token);
	}

	builder.build().map_err(|e| ConfigError::from(e).into())
}

fn map_request_error<E, M>(
	strategy: &dyn ProviderStrategy,
	grant: GrantType,
	meta: Option<ResponseMetadata>,
	err: BasicRequestTokenError<HttpClientError<E>>,
	mapper: &M,
) -> Error
where
	E: 'static + Send + Sync + StdError,
	M: ?Sized + TransportErrorMapper<E>,
{
	let meta_ref = meta.as_ref();

	match err {
		RequestTokenError::ServerResponse(response) =>
			map_server_response_error(strategy, grant, response, meta_ref),
		RequestTokenError::Request(error) =>
			mapper.map_transport_error(strategy, grant, meta_ref, error),
		RequestTokenError::Parse(error, _body) =>
			TransientError::TokenResponseParse { source: error, status: meta_status(meta_ref) }
				.into(),
		RequestTokenError::Other(message) => TransientError::TokenEndpoint {
			message,
			status: meta_status(meta_ref),
			retry_after: meta_retry_after(meta_ref),
		}
		.into(),
	}
}

fn map_server_response_error(
	strategy: &dyn ProviderStrategy,
	grant: GrantType,
	response: BasicErrorResponse,
	meta: Option<&ResponseMetadata>,
) -> Error {
	let mut ctx =
		ProviderErrorContext::new(grant).with_oauth_error(response.error().as_ref().to_string());

	if let Some(description) = response.error_description() {
		ctx = ctx.with_error_description(description.clone());
	}
	if let Some(status) = meta_status(meta) {
		ctx = ctx.with_http_status(status);
	}

	let message = match response.error_description() {
		Some(description) => format!("{} ({description})", response.error().as_ref()),
		None => response.error().as_ref().to_string(),
	};

	match strategy.classify_token_error(&ctx) {
		ProviderErrorKind::InvalidGrant => Error::InvalidGrant { reason: message },
		ProviderErrorKind::InvalidClient => Error::InvalidClient { reason: message },
		ProviderErrorKind::InsufficientScope => Error::InsufficientScope { reason: message },
		ProviderErrorKind::Transient => TransientError::TokenEndpoint {
			message,
			status: meta_status(meta),
			retry_after: meta_retry_after(meta),
		}
		.into(),
	}
}

#[cfg(feature = "reqwest")]
fn map_reqwest_error(meta: Option<&ResponseMetadata>, err: ReqwestError) -> Error {
	if err.is_builder() {
		return ConfigError::from(err).into();
	}
	if err.is_timeout() {
		return TransientError::TokenEndpoint {
			message: "Request timed out while calling the provider".into(),
			status: meta_status(meta).or_else(|| err.status().map(|code| code.as_u16())),
			retry_after: meta_retry_after(meta),
		}
		.into();
	}

	TransportError::from(err).into()
}

#[cfg(feature = "reqwest")]
fn map_generic_transport_error(meta: Option<&ResponseMetadata>, message: impl Display) -> Error {
	TransientError::TokenEndpoint {
		message: format!("HTTP client error occurred while calling the provider: {message}"),
		status: meta_status(meta),
		retry_after: meta_retry_after(meta),
	}
	.into()
}

#[cfg(feature = "reqwest")]
fn map_unknown_transport_error(meta: Option<&ResponseMetadata>) -> Error {
	TransientError::TokenEndpoint {
		message: "HTTP client error occurred while calling the provider".into(),
		status: meta_status(meta),
		retry_after: meta_retry_after(meta),
	}
	.into()
}

fn meta_status(meta: Option<&ResponseMetadata>) -> Option<u16> {
	meta.and_then(|value| value.status)
}

fn meta_retry_after(meta: Option<&ResponseMetadata>) -> Option<Duration> {
	meta.and_then(|value| value.retry_after)
}
