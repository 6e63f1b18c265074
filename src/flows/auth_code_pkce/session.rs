// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{Rng, distr::Alphanumeric};
use sha2::{Digest, Sha256};
// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, TokenSecret, claims},
	flows::common,
	provider::{ProviderDescriptor, ProviderStrategy},
};

const STATE_LEN: usize = 32;
const NONCE_LEN: usize = 32;
const PKCE_VERIFIER_LEN: usize = 64;

/// Supported PKCE challenge methods surfaced via [`PendingAuthorization`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PkceCodeChallengeMethod {
	/// SHA-256 based PKCE (RFC 7636 S256).
	S256,
}
impl PkceCodeChallengeMethod {
	/// Returns the RFC 7636 identifier for the challenge method.
	pub fn as_str(self) -> &'static str {
		match self {
			PkceCodeChallengeMethod::S256 => "S256",
		}
	}
}

/// One login attempt: PKCE pair, `state`, `nonce`, and the authorize URL built from them.
///
/// The verifier never leaves the crate; callers only see the derived challenge.
#[derive(Clone)]
pub struct PendingAuthorization {
	/// Opaque state value that must round-trip via the redirect handler.
	pub state: String,
	/// OIDC nonce bound to the ID token of this attempt.
	pub nonce: String,
	/// Requested scope set.
	pub scope: ScopeSet,
	/// Redirect URI supplied when constructing the authorize URL.
	pub redirect_uri: Url,
	/// Fully-formed authorize URL the user agent is sent to.
	pub authorize_url: Url,
	/// Creation instant, used to expire abandoned attempts.
	pub created_at: OffsetDateTime,
	pkce: PkcePair,
}
impl PendingAuthorization {
	/// PKCE code challenge derived from the secret verifier.
	pub fn code_challenge(&self) -> &str {
		&self.pkce.challenge
	}

	/// PKCE challenge method (currently always `S256`).
	pub fn code_challenge_method(&self) -> PkceCodeChallengeMethod {
		self.pkce.method
	}

	/// Returns `true` once the attempt is older than `ttl` at `now`.
	pub fn is_expired_at(&self, now: OffsetDateTime, ttl: Duration) -> bool {
		now - self.created_at >= ttl
	}

	/// Validates the returned `state` parameter after the authorization redirect.
	pub fn validate_state(&self, returned_state: &str) -> Result<()> {
		if returned_state == self.state {
			Ok(())
		} else {
			Err(Error::LoginRequired { reason: "authorization state mismatch".into() })
		}
	}

	/// Checks that `id_token` echoes the `nonce` sent with this attempt.
	pub fn validate_nonce(&self, id_token: &TokenSecret) -> Result<()> {
		match claims::id_token_nonce(id_token.expose()) {
			Ok(Some(nonce)) if nonce == self.nonce => Ok(()),
			Ok(_) => Err(Error::LoginRequired { reason: "ID token nonce mismatch".into() }),
			Err(e) => Err(Error::LoginRequired {
				reason: format!("ID token is unreadable: {}", e.to_string().trim_end_matches('.')),
			}),
		}
	}

	pub(crate) fn code_verifier(&self) -> &str {
		&self.pkce.verifier
	}
}
impl Debug for PendingAuthorization {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("PendingAuthorization")
			.field("state", &self.state)
			.field("scope", &self.scope)
			.field("redirect_uri", &self.redirect_uri)
			.field("authorize_url", &self.authorize_url)
			.field("created_at", &self.created_at)
			.field("code_challenge", &self.pkce.challenge)
			.field("code_challenge_method", &self.pkce.method)
			.finish()
	}
}

#[derive(Clone)]
struct PkcePair {
	verifier: String,
	challenge: String,
	method: PkceCodeChallengeMethod,
}
impl PkcePair {
	fn generate() -> Self {
		let verifier = random_string(PKCE_VERIFIER_LEN);
		let challenge = compute_pkce_challenge(&verifier);

		Self { verifier, challenge, method: PkceCodeChallengeMethod::S256 }
	}
}

/// Inputs shared by interactive logins and silent checks.
pub(crate) struct AuthorizeParams<'a> {
	pub(crate) descriptor: &'a ProviderDescriptor,
	pub(crate) strategy: &'a dyn ProviderStrategy,
	pub(crate) client_id: &'a str,
	pub(crate) scope: &'a ScopeSet,
	pub(crate) redirect_uri: Url,
	pub(crate) prompt: Option<&'static str>,
}

pub(crate) fn build_pending(params: AuthorizeParams<'_>) -> PendingAuthorization {
	let state = random_string(STATE_LEN);
	let nonce = random_string(NONCE_LEN);
	let pkce = PkcePair::generate();
	let authorize_url = build_authorize_url(&params, &state, &nonce, &pkce);

	PendingAuthorization {
		state,
		nonce,
		scope: params.scope.clone(),
		redirect_uri: params.redirect_uri,
		authorize_url,
		created_at: OffsetDateTime::now_utc(),
		pkce,
	}
}

fn build_authorize_url(
	params: &AuthorizeParams<'_>,
	state: &str,
	nonce: &str,
	pkce: &PkcePair,
) -> Url {
	let mut query = BTreeMap::new();

	query.insert("response_type".to_owned(), "code".to_owned());
	query.insert("client_id".to_owned(), params.client_id.to_owned());
	query.insert("redirect_uri".to_owned(), params.redirect_uri.to_string());

	if let Some(scope) =
		common::format_scope(params.scope, params.descriptor.quirks.scope_delimiter)
	{
		query.insert("scope".to_owned(), scope);
	}

	query.insert("state".to_owned(), state.to_owned());
	query.insert("nonce".to_owned(), nonce.to_owned());
	query.insert("code_challenge".to_owned(), pkce.challenge.clone());
	query.insert("code_challenge_method".to_owned(), pkce.method.as_str().to_owned());

	if let Some(prompt) = params.prompt {
		query.insert("prompt".to_owned(), prompt.to_owned());
	}

	let mut extra = BTreeMap::new();

	params.strategy.augment_authorization_request(&mut extra);

	for (key, value) in extra {
		query.entry(key).or_insert(value);
	}

	let mut url = params.descriptor.endpoints.authorization.clone();

	url.query_pairs_mut().extend_pairs(query.iter());

	url
}

fn random_string(len: usize) -> String {
	rand::rng().sample_iter(Alphanumeric).take(len).map(char::from).collect()
}

fn compute_pkce_challenge(verifier: &str) -> String {
	let mut hasher = Sha256::new();

	hasher.update(verifier.as_bytes());

	URL_SAFE_NO_PAD.encode(hasher.finalize())
}
