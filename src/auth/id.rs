//! Strongly typed identifiers for tenants, users, roles, and providers.

// std
use std::{borrow::Borrow, ops::Deref};
// self
use crate::_prelude::*;

macro_rules! identifier {
	($name:ident, $doc:literal, $kind:literal) => {
		#[doc = $doc]
		#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
		#[serde(try_from = "String", into = "String")]
		pub struct $name(String);
		impl $name {
			/// Creates a new identifier after validation.
			pub fn new(value: impl AsRef<str>) -> Result<Self, IdentifierError> {
				let view = value.as_ref();

				validate_view($kind, view)?;

				Ok(Self(view.to_owned()))
			}
		}
		impl Deref for $name {
			type Target = str;

			fn deref(&self) -> &Self::Target {
				&self.0
			}
		}
		impl AsRef<str> for $name {
			fn as_ref(&self) -> &str {
				&self.0
			}
		}
		impl From<$name> for String {
			fn from(value: $name) -> Self {
				value.0
			}
		}
		impl TryFrom<String> for $name {
			type Error = IdentifierError;

			fn try_from(value: String) -> Result<Self, Self::Error> {
				validate_view($kind, &value)?;

				Ok(Self(value))
			}
		}
		impl Borrow<str> for $name {
			fn borrow(&self) -> &str {
				&self.0
			}
		}
		impl Debug for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				write!(f, concat!($kind, "({})"), self.0)
			}
		}
		impl Display for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				f.write_str(&self.0)
			}
		}
		impl FromStr for $name {
			type Err = IdentifierError;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				Self::new(s)
			}
		}
	};
}

const IDENTIFIER_MAX_LEN: usize = 128;

/// Error returned when identifier validation fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum IdentifierError {
	/// The identifier was empty.
	#[error("{kind} identifier cannot be empty.")]
	Empty {
		/// Kind of identifier (tenant, user, role, provider).
		kind: &'static str,
	},
	/// The identifier contains whitespace characters.
	#[error("{kind} identifier contains whitespace.")]
	ContainsWhitespace {
		/// Kind of identifier (tenant, user, role, provider).
		kind: &'static str,
	},
	/// The identifier contains a control character and cannot travel in an HTTP header.
	#[error("{kind} identifier contains a control character.")]
	ContainsControl {
		/// Kind of identifier (tenant, user, role, provider).
		kind: &'static str,
	},
	/// The identifier exceeded the allowed character count.
	#[error("{kind} identifier exceeds {max} characters.")]
	TooLong {
		/// Kind of identifier (tenant, user, role, provider).
		kind: &'static str,
		/// Maximum permitted character count.
		max: usize,
	},
}

identifier! { TenantId, "Identifier of a tenant (store) scope.", "Tenant" }
identifier! { UserId, "Subject identifier of the signed-in user.", "User" }
identifier! { RoleName, "Role granted to the signed-in user.", "Role" }
identifier! { ProviderId, "Identifier for an OIDC provider descriptor.", "Provider" }

fn validate_view(kind: &'static str, view: &str) -> Result<(), IdentifierError> {
	if view.is_empty() {
		return Err(IdentifierError::Empty { kind });
	}
	if view.chars().any(char::is_whitespace) {
		return Err(IdentifierError::ContainsWhitespace { kind });
	}
	if view.chars().any(char::is_control) {
		return Err(IdentifierError::ContainsControl { kind });
	}
	if view.len() > IDENTIFIER_MAX_LEN {
		return Err(IdentifierError::TooLong { kind, max: IDENTIFIER_MAX_LEN });
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn identifiers_reject_padding_and_empty_values() {
		assert!(TenantId::new(" store-1").is_err(), "Leading whitespace must be rejected.");
		assert!(TenantId::new("store-1 ").is_err(), "Trailing whitespace must be rejected.");

		let tenant = TenantId::new("store-1").expect("Tenant fixture should be considered valid.");

		assert_eq!(tenant.as_ref(), "store-1");
		assert!(UserId::new("").is_err());
		assert!(RoleName::new("store admin").is_err());
		assert!(matches!(
			TenantId::new("store\u{0}1"),
			Err(IdentifierError::ContainsControl { kind: "Tenant" })
		));
	}

	#[test]
	fn serde_round_trip_enforces_validation() {
		let role: RoleName =
			serde_json::from_str("\"platform-admin\"").expect("Role should deserialize.");

		assert_eq!(role.as_ref(), "platform-admin");
		assert!(serde_json::from_str::<RoleName>("\"with space\"").is_err());
		assert!(serde_json::from_str::<TenantId>("\"\"").is_err());
	}

	#[test]
	fn length_limit_is_inclusive() {
		let exact = "a".repeat(IDENTIFIER_MAX_LEN);

		TenantId::new(&exact).expect("Exact length should succeed.");

		let too_long = "a".repeat(IDENTIFIER_MAX_LEN + 1);

		assert!(matches!(TenantId::new(&too_long), Err(IdentifierError::TooLong { .. })));
	}

	#[test]
	fn borrow_supports_set_lookup() {
		let roles: BTreeSet<RoleName> =
			BTreeSet::from_iter([RoleName::new("store-admin").expect("Role should be valid.")]);

		assert!(roles.contains("store-admin"));
		assert!(!roles.contains("platform-admin"));
	}
}
