//! Authenticated HTTP gateway to the backend admin API.
//!
//! Every request carries `Authorization: Bearer <token>` (unless marked anonymous), the tenant
//! header when a tenant is supplied, and an `X-Request-ID` shared by all retries and the
//! post-refresh replay of the same logical request. Network failures and 5xx responses are
//! retried per [`RetryPolicy`]; a `401` triggers at most one shared refresh and one replay.

mod queue;
mod request;
mod retry;

pub use request::*;
pub use retry::*;

// crates.io
use reqwest::{
	Method,
	header::{ACCEPT, AUTHORIZATION, HeaderName},
};
use serde::de::DeserializeOwned;
use uuid::Uuid;
// self
use crate::{
	_prelude::*,
	auth::{TenantId, TokenSecret},
	error::{ConfigError, TransientError, TransportError},
	http::{ReqwestHttpClient, parse_retry_after},
	obs,
	store::TokenStore,
};
use queue::RefreshQueue;

/// Header carrying the per-request correlation id.
pub const REQUEST_ID_HEADER: &str = "X-Request-ID";

/// Tenant-aware JSON gateway. Cloning is cheap; clones share the refresh queue.
#[derive(Clone)]
pub struct HttpGateway {
	client: ReqwestHttpClient,
	base_url: Url,
	tokens: Arc<TokenStore>,
	tenant_header: HeaderName,
	retry: RetryPolicy,
	refresh_queue: Arc<RefreshQueue>,
}
impl HttpGateway {
	/// Tenant header used when none is configured.
	pub const DEFAULT_TENANT_HEADER: &'static str = "X-Store-ID";

	/// Creates a gateway for `base_url`, reading bearer tokens from `tokens`.
	pub fn new(client: ReqwestHttpClient, mut base_url: Url, tokens: Arc<TokenStore>) -> Self {
		if !base_url.path().ends_with('/') {
			let path = format!("{}/", base_url.path());

			base_url.set_path(&path);
		}

		Self {
			client,
			base_url,
			tokens,
			tenant_header: HeaderName::from_static("x-store-id"),
			retry: RetryPolicy::default(),
			refresh_queue: Arc::new(RefreshQueue::default()),
		}
	}

	/// Overrides the retry policy.
	pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
		self.retry = policy;

		self
	}

	/// Overrides the tenant header name.
	pub fn with_tenant_header(mut self, name: &str) -> Result<Self> {
		self.tenant_header = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
			ConfigError::InvalidValue { key: "tenant_header", reason: e.to_string() }
		})?;

		Ok(self)
	}

	/// Base URL every request path is resolved against (always ends with `/`).
	pub fn base_url(&self) -> &Url {
		&self.base_url
	}

	/// Token store the gateway authenticates with.
	pub fn tokens(&self) -> &Arc<TokenStore> {
		&self.tokens
	}

	/// Retry policy in use.
	pub fn retry_policy(&self) -> RetryPolicy {
		self.retry
	}

	/// Sends `request`, returning any 2xx/3xx response.
	///
	/// 4xx responses become [`Error::Api`]; a 401 that survives the refresh replay is reported
	/// with status 401. Exhausted 5xx retries become [`TransientError::Upstream`].
	pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
		let request_id = Uuid::new_v4();

		obs::observe_request("send", request_id, async {
			let url = request.resolve(&self.base_url)?;
			let mut token = if request.skip_auth {
				None
			} else {
				Some(self.tokens.get_valid_access_token().await?)
			};
			let mut replayed = false;

			loop {
				let response = self.dispatch(&request, &url, token.as_ref(), request_id).await?;

				log_debug!(
					method = %request.method,
					path = %request.path,
					status = response.status(),
					%request_id,
					"API request completed."
				);

				if response.status() == 401 && !request.skip_auth && !replayed {
					match self.refresh_queue.acquire(&self.tokens, token.as_ref()).await {
						Some(next) => {
							token = Some(next);
							replayed = true;

							continue;
						},
						None => return Err(response.into_api_error()),
					}
				}
				if response.status() < 400 {
					return Ok(response);
				}

				return Err(response.into_api_error());
			}
		})
		.await
	}

	/// `GET`s `path` and decodes the JSON body.
	pub async fn get_json<T>(&self, path: &str, tenant: Option<&TenantId>) -> Result<T>
	where
		T: DeserializeOwned,
	{
		self.send(ApiRequest::get(path).with_tenant(tenant.cloned())).await?.json()
	}

	/// Sends `body` as JSON with `method` and decodes the JSON response.
	pub async fn send_json<B, T>(
		&self,
		method: Method,
		path: &str,
		body: &B,
		tenant: Option<&TenantId>,
	) -> Result<T>
	where
		B: ?Sized + Serialize,
		T: DeserializeOwned,
	{
		let request = ApiRequest::new(method, path).json(body)?.with_tenant(tenant.cloned());

		self.send(request).await?.json()
	}

	async fn dispatch(
		&self,
		request: &ApiRequest,
		url: &Url,
		token: Option<&TokenSecret>,
		request_id: Uuid,
	) -> Result<ApiResponse> {
		let mut retry = 0;

		loop {
			let attempt = retry + 1;
			let (retry_after, failure) = match self.execute(request, url, token, request_id).await
			{
				Ok(response) if response.is_server_error() => {
					let status = response.status();
					let retry_after = response.retry_after();

					(
						retry_after,
						Error::from(TransientError::Upstream {
							status,
							attempts: attempt,
							retry_after,
						}),
					)
				},
				Ok(response) => return Ok(response),
				Err(e) if !is_retryable(&e) => return Err(map_api_transport_error(e)),
				Err(e) => (None, map_api_transport_error(e)),
			};

			match self.retry.decide(retry, retry_after) {
				RetryDecision::RetryAfter(delay) => {
					log_warn!(
						attempt,
						delay_ms = delay.whole_milliseconds() as u64,
						error = %failure,
						%request_id,
						"API request failed; retrying."
					);

					tokio::time::sleep(
						std::time::Duration::try_from(delay).unwrap_or(std::time::Duration::ZERO),
					)
					.await;
				},
				RetryDecision::Stop => return Err(failure),
			}

			retry += 1;
		}
	}

	async fn execute(
		&self,
		request: &ApiRequest,
		url: &Url,
		token: Option<&TokenSecret>,
		request_id: Uuid,
	) -> Result<ApiResponse, ReqwestError> {
		let mut builder = self
			.client
			.request(request.method.clone(), url.clone())
			.header(REQUEST_ID_HEADER, request_id.to_string())
			.header(ACCEPT, "application/json");

		if let Some(token) = token {
			builder = builder.header(AUTHORIZATION, token.bearer_header());
		}
		if let Some(tenant) = &request.tenant {
			builder = builder.header(self.tenant_header.clone(), tenant.to_string());
		}
		if let Some(body) = &request.body {
			builder = builder.json(body);
		}

		let response = builder.send().await?;
		let status = response.status().as_u16();
		let retry_after = parse_retry_after(response.headers());
		let body = response.bytes().await?.to_vec();

		Ok(ApiResponse::new(status, request_id, retry_after, body))
	}
}
impl Debug for HttpGateway {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("HttpGateway")
			.field("base_url", &self.base_url)
			.field("tenant_header", &self.tenant_header)
			.field("retry", &self.retry)
			.finish()
	}
}

fn is_retryable(err: &ReqwestError) -> bool {
	!(err.is_builder() || err.is_redirect() || err.is_status())
}

fn map_api_transport_error(err: ReqwestError) -> Error {
	if err.is_builder() {
		ConfigError::from(err).into()
	} else {
		TransportError::network_to("the API", err).into()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn gateway(base: &str) -> HttpGateway {
		HttpGateway::new(
			ReqwestHttpClient::default(),
			Url::parse(base).expect("Base URL fixture should parse."),
			Arc::new(TokenStore::default()),
		)
	}

	#[test]
	fn base_url_is_normalized_to_a_directory() {
		assert_eq!(
			gateway("https://api.example.com/v1").base_url().as_str(),
			"https://api.example.com/v1/"
		);
		assert_eq!(
			gateway("https://api.example.com/").base_url().as_str(),
			"https://api.example.com/"
		);
	}

	#[test]
	fn tenant_header_names_are_validated() {
		assert!(gateway("https://api.example.com/").with_tenant_header("X-Tenant-ID").is_ok());
		assert!(matches!(
			gateway("https://api.example.com/").with_tenant_header("bad header"),
			Err(Error::Config(ConfigError::InvalidValue { key: "tenant_header", .. }))
		));
	}

	#[tokio::test]
	async fn authenticated_requests_without_a_session_fail_before_sending() {
		let err = gateway("https://api.example.com/")
			.send(ApiRequest::get("orders"))
			.await
			.expect_err("Requests without a token must fail.");

		assert!(matches!(err, Error::TokenUnavailable));
	}
}
