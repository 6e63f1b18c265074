//! Auth-domain identifiers, scope sets, token models, and claim projections.

pub mod claims;
pub mod id;
pub mod scope;
pub mod token;

pub use claims::*;
pub use id::*;
pub use scope::*;
pub use token::{pair::*, secret::*};
