//! Request and response envelopes exchanged with the backend API.

// crates.io
use reqwest::Method;
use serde::de::DeserializeOwned;
use uuid::Uuid;
// self
use crate::{
	_prelude::*,
	auth::TenantId,
	error::{ConfigError, TransientError},
	provider::truncate_preview,
};

/// Logical API request; retries and the post-refresh replay reuse it unchanged.
#[derive(Clone, Debug)]
pub struct ApiRequest {
	/// HTTP method.
	pub method: Method,
	/// Path relative to the gateway's base URL.
	pub path: String,
	/// Query parameters appended in order.
	pub query: Vec<(String, String)>,
	/// JSON body.
	pub body: Option<serde_json::Value>,
	/// Tenant scope sent in the tenant header.
	pub tenant: Option<TenantId>,
	/// Sends the request without a bearer token and without refresh-on-401.
	pub skip_auth: bool,
}
impl ApiRequest {
	/// Creates a request for `method` and `path`.
	pub fn new(method: Method, path: impl Into<String>) -> Self {
		Self {
			method,
			path: path.into(),
			query: Vec::new(),
			body: None,
			tenant: None,
			skip_auth: false,
		}
	}

	/// `GET` request.
	pub fn get(path: impl Into<String>) -> Self {
		Self::new(Method::GET, path)
	}

	/// `POST` request.
	pub fn post(path: impl Into<String>) -> Self {
		Self::new(Method::POST, path)
	}

	/// `PUT` request.
	pub fn put(path: impl Into<String>) -> Self {
		Self::new(Method::PUT, path)
	}

	/// `PATCH` request.
	pub fn patch(path: impl Into<String>) -> Self {
		Self::new(Method::PATCH, path)
	}

	/// `DELETE` request.
	pub fn delete(path: impl Into<String>) -> Self {
		Self::new(Method::DELETE, path)
	}

	/// Appends a query parameter.
	pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.query.push((key.into(), value.into()));

		self
	}

	/// Serializes `body` as the JSON payload.
	pub fn json<B>(mut self, body: &B) -> Result<Self>
	where
		B: ?Sized + Serialize,
	{
		let value = serde_json::to_value(body)
			.map_err(|e| ConfigError::InvalidValue { key: "body", reason: e.to_string() })?;

		self.body = Some(value);

		Ok(self)
	}

	/// Scopes the request to `tenant`.
	pub fn tenant(mut self, tenant: TenantId) -> Self {
		self.tenant = Some(tenant);

		self
	}

	/// Sets or clears the tenant scope.
	pub fn with_tenant(mut self, tenant: Option<TenantId>) -> Self {
		self.tenant = tenant;

		self
	}

	/// Marks the request as anonymous.
	pub fn skip_auth(mut self) -> Self {
		self.skip_auth = true;

		self
	}

	/// Resolves the absolute URL against `base`; the result must stay on the base origin.
	pub(crate) fn resolve(&self, base: &Url) -> Result<Url> {
		let relative = self.path.trim_start_matches('/');
		let mut url = base.join(relative).map_err(|source| ConfigError::InvalidApiPath {
			path: self.path.clone(),
			source,
		})?;

		if url.origin() != base.origin() {
			return Err(ConfigError::ForeignApiUrl { path: self.path.clone() }.into());
		}
		if !self.query.is_empty() {
			url.query_pairs_mut().extend_pairs(self.query.iter());
		}

		Ok(url)
	}
}

/// Buffered API response.
#[derive(Clone)]
pub struct ApiResponse {
	status: u16,
	request_id: Uuid,
	retry_after: Option<Duration>,
	body: Vec<u8>,
}
impl ApiResponse {
	pub(crate) fn new(
		status: u16,
		request_id: Uuid,
		retry_after: Option<Duration>,
		body: Vec<u8>,
	) -> Self {
		Self { status, request_id, retry_after, body }
	}

	/// HTTP status code.
	pub fn status(&self) -> u16 {
		self.status
	}

	/// `X-Request-ID` sent with the request.
	pub fn request_id(&self) -> Uuid {
		self.request_id
	}

	/// `Retry-After` hint, if the server sent one.
	pub fn retry_after(&self) -> Option<Duration> {
		self.retry_after
	}

	/// Raw body bytes.
	pub fn body(&self) -> &[u8] {
		&self.body
	}

	/// Returns `true` for an empty body (for example `204 No Content`).
	pub fn is_empty(&self) -> bool {
		self.body.is_empty()
	}

	/// Body decoded as UTF-8, replacing invalid sequences.
	pub fn text(&self) -> String {
		String::from_utf8_lossy(&self.body).into_owned()
	}

	/// Decodes the body as JSON, reporting the failing path on mismatch.
	pub fn json<T>(&self) -> Result<T>
	where
		T: DeserializeOwned,
	{
		serde_path_to_error::deserialize(&mut serde_json::Deserializer::from_slice(&self.body))
			.map_err(|source| TransientError::ResponseParse { source, status: self.status }.into())
	}

	pub(crate) fn is_server_error(&self) -> bool {
		(500..600).contains(&self.status)
	}

	pub(crate) fn into_api_error(self) -> Error {
		let preview = truncate_preview(self.text());
		let message = if preview.trim().is_empty() {
			reqwest::StatusCode::from_u16(self.status)
				.ok()
				.and_then(|status| status.canonical_reason())
				.unwrap_or("Unknown status")
				.to_owned()
		} else {
			preview
		};

		Error::Api { status: self.status, message }
	}
}
impl Debug for ApiResponse {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ApiResponse")
			.field("status", &self.status)
			.field("request_id", &self.request_id)
			.field("body_len", &self.body.len())
			.finish()
	}
}
