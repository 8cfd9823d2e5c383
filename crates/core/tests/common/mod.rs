//! Common test utilities and helpers for installer integration tests.
//!
//! This module provides shared functionality across the integration tests:
//! - Test fixtures (requests, mock-backed services, installers)
//! - Custom assertions over events and backend calls

pub mod assertions;
pub mod fixtures;

#[allow(unused_imports)]
pub use assertions::*;
pub use fixtures::*;
