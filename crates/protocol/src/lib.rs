//! # da-protocol
//!
//! Core protocol definitions and data models for the dashboard assistant
//! installer.
//!
//! This crate defines all shared data structures used for:
//! - Configuration file parsing (TOML config, YAML provider catalog)
//! - Installation progress and result reporting
//! - Progress events published to the dashboard
//!
//! ## Modules
//!
//! - [`config_models`]: Global configuration from config.toml
//! - [`installation_models`]: Installation request, progress ledger and result
//! - [`ipc`]: Events published while an installation runs
//! - [`monitor_models`]: Model and agent summaries for monitoring
//! - [`provider_models`]: Provider catalog entries
//!
//! ## Design Principles
//!
//! - Minimal dependencies: only serde, ts-rs, chrono and uuid
//! - TypeScript generation: all types derive `TS` for dashboard compatibility
//! - Independent compilation: no dependencies on other installer crates

pub mod config_models;
pub mod installation_models;
pub mod ipc;
pub mod monitor_models;
pub mod provider_models;

// Re-export all public types for convenience
pub use config_models::*;
pub use installation_models::*;
pub use ipc::*;
pub use monitor_models::*;
pub use provider_models::*;
