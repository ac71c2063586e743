//! Common test utilities for nanopub-fetch integration tests

#[allow(dead_code)]
pub mod mirrors;

#[allow(unused_imports)]
pub use fixtures::*;
#[allow(unused_imports)]
pub use mirrors::*;
