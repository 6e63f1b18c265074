//! Provider-facing descriptors (data) and strategies (behavior).
//!
//! `descriptor` exposes validated metadata (`ProviderDescriptor`) covering the authorization,
//! token, and end-session endpoints, supported grants, client authentication preferences, and
//! provider quirks. `strategy` defines [`ProviderStrategy`], an HTTP-client-agnostic hook used
//! by flows to map token endpoint failures into the crate error taxonomy.

pub mod descriptor;
pub mod strategy;

pub use descriptor::*;
pub use strategy::*;
