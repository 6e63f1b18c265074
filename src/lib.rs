//! OIDC session core for multi-tenant admin consoles: Authorization Code + PKCE login,
//! single-flight token refresh, a tenant-scoped HTTP gateway, and role-aware session state.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

#[macro_use]
mod macros;

pub mod auth;
pub mod config;
#[cfg(feature = "reqwest")] pub mod context;
pub mod error;
pub mod flows;
#[cfg(feature = "reqwest")] pub mod gateway;
pub mod http;
pub mod oauth;
pub mod obs;
pub mod provider;
pub mod session;
pub mod store;
#[cfg(all(any(test, feature = "test"), feature = "reqwest"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		flows::{Navigator, OidcClient, RecordingNavigator},
		gateway::{HttpGateway, RetryPolicy},
		http::ReqwestHttpClient,
		oauth::ReqwestTransportErrorMapper,
		provider::ProviderDescriptor,
		store::TokenStore,
	};

	/// OIDC client type alias used by reqwest-backed integration tests.
	pub type ReqwestTestClient = OidcClient<ReqwestHttpClient, ReqwestTransportErrorMapper>;

	/// Builds a reqwest HTTP client that accepts the self-signed certificates produced by
	/// `httpmock` during tests.
	pub fn test_reqwest_http_client() -> ReqwestHttpClient {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestHttpClient::with_client(client)
	}

	/// Constructs an [`OidcClient`] backed by a fresh token store, a recording navigator, and the
	/// reqwest transport used across integration tests.
	pub fn build_reqwest_test_client(
		descriptor: ProviderDescriptor,
		client_id: &str,
	) -> (ReqwestTestClient, Arc<TokenStore>, Arc<RecordingNavigator>) {
		let tokens = Arc::new(TokenStore::default());
		let navigator = Arc::new(RecordingNavigator::default());
		let client = OidcClient::builder(descriptor, client_id, tokens.clone())
			.http_client(test_reqwest_http_client(), ReqwestTransportErrorMapper)
			.navigator(navigator.clone() as Arc<dyn Navigator>)
			.build()
			.expect("Failed to build the test OIDC client.");

		(client, tokens, navigator)
	}

	/// Constructs an [`HttpGateway`] over the provided token store with a fast retry policy.
	pub fn build_reqwest_test_gateway(base_url: Url, tokens: Arc<TokenStore>) -> HttpGateway {
		HttpGateway::new(test_reqwest_http_client(), base_url, tokens)
			.with_retry_policy(RetryPolicy::new(3, Duration::milliseconds(10)))
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, BTreeSet, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		hash::{Hash, Hasher},
		pin::Pin,
		str::FromStr,
		sync::{Arc, Weak},
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(all(test, feature = "reqwest"))] use {color_eyre as _, httpmock as _};
