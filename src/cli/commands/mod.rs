//! CLI command implementations.

pub mod emergency;
pub mod session;
pub mod universes;
pub mod validate;
