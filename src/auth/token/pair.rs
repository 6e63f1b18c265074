//! Access/refresh/ID tokens held by the session, their lifecycle helpers, and builder.

// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, token::secret::TokenSecret},
};

/// Current lifecycle status for a token pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenStatus {
	/// Pair is not yet valid because the issued-at instant is in the future.
	Pending,
	/// Pair is currently valid.
	Active,
	/// Pair exceeded its expiry instant.
	Expired,
}

/// Token type advertised by the token endpoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TokenType {
	/// RFC 6750 bearer token.
	#[default]
	Bearer,
}
impl TokenType {
	/// Returns the header scheme for the token type.
	pub fn as_str(self) -> &'static str {
		match self {
			TokenType::Bearer => "Bearer",
		}
	}
}

/// Errors produced by [`TokenPairBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum TokenPairBuilderError {
	/// Issued when no access token value was provided.
	#[error("Access token is required.")]
	MissingAccessToken,
	/// Issued when no expiry (absolute or relative) was configured.
	#[error("Expiry must be supplied via expires_at or expires_in.")]
	MissingExpiry,
}

/// Access and refresh token issued for the signed-in user.
///
/// Pairs live only in memory; the type deliberately does not implement `Serialize`.
#[derive(Clone)]
pub struct TokenPair {
	/// Access token secret; callers must avoid logging it.
	pub access_token: TokenSecret,
	/// Refresh token secret, if the provider issued one.
	pub refresh_token: Option<TokenSecret>,
	/// OIDC ID token, if the provider issued one.
	pub id_token: Option<TokenSecret>,
	/// Token type (always bearer).
	pub token_type: TokenType,
	/// Scopes granted with the pair.
	pub scope: ScopeSet,
	/// Issued-at instant recorded when the response arrived.
	pub issued_at: OffsetDateTime,
	/// Expiry instant derived from issued_at plus expires_in or an absolute expiry.
	pub expires_at: OffsetDateTime,
}
impl TokenPair {
	/// Returns a builder for constructing token pairs.
	pub fn builder(scope: ScopeSet) -> TokenPairBuilder {
		TokenPairBuilder::new(scope)
	}

	/// Computes the lifecycle status at a given instant.
	pub fn status_at(&self, instant: OffsetDateTime) -> TokenStatus {
		if instant < self.issued_at {
			return TokenStatus::Pending;
		}
		if instant >= self.expires_at {
			return TokenStatus::Expired;
		}

		TokenStatus::Active
	}

	/// Returns `true` if the pair has expired at the provided instant.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		matches!(self.status_at(instant), TokenStatus::Expired)
	}

	/// Returns `true` if the access token stays usable for at least `margin` after `instant`.
	pub fn is_fresh_at(&self, instant: OffsetDateTime, margin: Duration) -> bool {
		instant < self.expires_at - margin
	}

	/// Remaining lifetime relative to `instant` (zero once expired).
	pub fn remaining_at(&self, instant: OffsetDateTime) -> Duration {
		let remaining = self.expires_at - instant;

		if remaining.is_negative() { Duration::ZERO } else { remaining }
	}
}
impl Debug for TokenPair {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenPair")
			.field("access_token", &"<redacted>")
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("id_token", &self.id_token.as_ref().map(|_| "<redacted>"))
			.field("token_type", &self.token_type)
			.field("scope", &self.scope)
			.field("issued_at", &self.issued_at)
			.field("expires_at", &self.expires_at)
			.finish()
	}
}

/// Builder for [`TokenPair`].
#[derive(Clone, Debug)]
pub struct TokenPairBuilder {
	scope: ScopeSet,
	access_token: Option<TokenSecret>,
	refresh_token: Option<TokenSecret>,
	id_token: Option<TokenSecret>,
	issued_at: Option<OffsetDateTime>,
	expires_at: Option<OffsetDateTime>,
	expires_in: Option<Duration>,
}
impl TokenPairBuilder {
	fn new(scope: ScopeSet) -> Self {
		Self {
			scope,
			access_token: None,
			refresh_token: None,
			id_token: None,
			issued_at: None,
			expires_at: None,
			expires_in: None,
		}
	}

	/// Sets the issued-at instant.
	pub fn issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = Some(instant);

		self
	}

	/// Sets an absolute expiry instant.
	pub fn expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.expires_at = Some(instant);

		self
	}

	/// Sets a relative expiry duration from the issued instant.
	pub fn expires_in(mut self, duration: Duration) -> Self {
		self.expires_in = Some(duration);

		self
	}

	/// Provides the access token value.
	pub fn access_token(mut self, token: impl Into<String>) -> Self {
		self.access_token = Some(TokenSecret::new(token));

		self
	}

	/// Provides the refresh token value.
	pub fn refresh_token(mut self, token: impl Into<String>) -> Self {
		self.refresh_token = Some(TokenSecret::new(token));

		self
	}

	/// Reuses an existing refresh secret without copying it through a `String`.
	pub fn refresh_secret(mut self, secret: TokenSecret) -> Self {
		self.refresh_token = Some(secret);

		self
	}

	/// Provides the OIDC ID token value.
	pub fn id_token(mut self, token: impl Into<String>) -> Self {
		self.id_token = Some(TokenSecret::new(token));

		self
	}

	/// Consumes the builder and produces a [`TokenPair`].
	pub fn build(self) -> Result<TokenPair, TokenPairBuilderError> {
		let access_token = self.access_token.ok_or(TokenPairBuilderError::MissingAccessToken)?;
		let issued_at = self.issued_at.unwrap_or_else(OffsetDateTime::now_utc);
		let expires_at = match (self.expires_at, self.expires_in) {
			(Some(instant), _) => instant,
			(None, Some(delta)) => issued_at + delta,
			(None, None) => return Err(TokenPairBuilderError::MissingExpiry),
		};

		Ok(TokenPair {
			access_token,
			refresh_token: self.refresh_token,
			id_token: self.id_token,
			token_type: TokenType::Bearer,
			scope: self.scope,
			issued_at,
			expires_at,
		})
	}
}
