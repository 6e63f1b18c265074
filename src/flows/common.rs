//! Shared helpers for flow implementations.

// self
use crate::{_prelude::*, auth::ScopeSet, error::ConfigError, provider::GrantType};

/// Joins normalized scopes with the provider's delimiter when building requests.
pub(crate) fn format_scope(scope: &ScopeSet, delimiter: char) -> Option<String> {
	if scope.is_empty() {
		return None;
	}
	if delimiter == ' ' {
		return Some(scope.normalized());
	}

	let mut buf = String::new();

	for (idx, value) in scope.iter().enumerate() {
		if idx > 0 {
			buf.push(delimiter);
		}

		buf.push_str(value);
	}

	Some(buf)
}

/// Fails with [`ConfigError::UnsupportedGrant`] unless the descriptor enables `grant`.
pub(crate) fn ensure_grant_supported(
	descriptor: &crate::provider::ProviderDescriptor,
	grant: GrantType,
) -> Result<()> {
	if descriptor.supports(grant) {
		Ok(())
	} else {
		Err(ConfigError::UnsupportedGrant {
			descriptor: descriptor.id.to_string(),
			grant: grant.as_str(),
		}
		.into())
	}
}
