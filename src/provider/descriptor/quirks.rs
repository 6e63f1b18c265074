// self
use crate::_prelude::*;

/// Provider-specific quirks that influence how flows behave.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderQuirks {
	/// Indicates whether authorization requests must carry a PKCE challenge.
	pub pkce_required: bool,
	/// Indicates whether the provider honours `prompt=none` for silent SSO checks.
	pub supports_prompt_none: bool,
	/// Character used to join scopes when constructing `scope` parameters.
	pub scope_delimiter: char,
}
impl Default for ProviderQuirks {
	fn default() -> Self {
		Self { pkce_required: true, supports_prompt_none: true, scope_delimiter: ' ' }
	}
}
