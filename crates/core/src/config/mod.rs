//! Configuration loading and management.
//!
//! This module loads the `.dashboard-assistant/` directory structure and the
//! embedded provider catalog.

pub mod error;
pub mod loader;
pub mod models;
pub mod providers;
