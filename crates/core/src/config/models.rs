//! Configuration models that aggregate all settings.
//!
//! This module provides the unified `AppConfig` structure that combines the
//! global settings with the provider catalog.

use crate::config::providers::ProviderCatalog;
use da_protocol::config_models::GlobalConfig;

/// Unified application configuration loaded from `.dashboard-assistant/`.
///
/// This structure aggregates all configuration sources:
/// - `config.toml`: cluster connection and installer settings
/// - `providers/*.yaml`: provider definitions layered over the built-ins
///
/// # Example
///
/// ```rust,no_run
/// use da_core::config::loader::load_config;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new(".")).await?;
/// println!("Cluster at {} with {} providers",
///          config.global.cluster.url,
///          config.providers.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Global settings from `config.toml`.
    pub global: GlobalConfig,

    /// Built-in providers plus project overrides.
    pub providers: ProviderCatalog,
}
