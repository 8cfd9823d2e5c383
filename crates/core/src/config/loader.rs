//! Configuration file loader for the `.dashboard-assistant/` directory.
//!
//! This module loads and parses the configuration files of a project:
//! - `config.toml`: cluster connection and installer settings
//! - `providers/*.yaml`: provider definitions overriding the built-ins

use crate::config::error::ConfigError;
use crate::config::error::ConfigResult;
use crate::config::models::AppConfig;
use crate::config::providers::ProviderCatalog;
use da_protocol::config_models::GlobalConfig;
use da_protocol::provider_models::ProviderConfig;
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

/// Name of the per-project configuration directory.
pub const CONFIG_DIR: &str = ".dashboard-assistant";

/// Loads all configuration from the `.dashboard-assistant/` directory.
///
/// The built-in provider catalog is always loaded first; providers found in
/// `.dashboard-assistant/providers/` are layered on top of it.
///
/// # Arguments
///
/// * `root` - Root directory containing the `.dashboard-assistant/` folder
///
/// # Returns
///
/// An `AppConfig` containing all loaded configuration. If directories or files
/// are missing, defaults are used rather than returning an error.
///
/// # Errors
///
/// Returns `ConfigError` if:
/// - Files exist but cannot be read
/// - Files have invalid TOML or YAML syntax
/// - A provider definition has an empty name
///
/// # Example
///
/// ```rust,no_run
/// use da_core::config::loader::load_config;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new(".")).await?;
/// println!("Loaded {} providers", config.providers.len());
/// # Ok(())
/// # }
/// ```
pub async fn load_config(root: &Path) -> ConfigResult<AppConfig> {
    let mut providers = ProviderCatalog::builtin()?;
    let da_dir = root.join(CONFIG_DIR);

    if !da_dir.exists() {
        return Ok(AppConfig {
            global: GlobalConfig::default(),
            providers,
        });
    }

    let global = load_global_config(&da_dir)?;

    for provider in load_providers(&da_dir)? {
        debug!(provider = %provider.name, "Loaded provider override");
        providers.insert(provider);
    }

    Ok(AppConfig { global, providers })
}

/// Loads global configuration from `config.toml`.
fn load_global_config(da_dir: &Path) -> ConfigResult<GlobalConfig> {
    let config_path = da_dir.join("config.toml");

    if !config_path.exists() {
        return Ok(GlobalConfig::default());
    }

    let content =
        std::fs::read_to_string(&config_path).map_err(|source| ConfigError::FileRead {
            path: config_path.clone(),
            source,
        })?;

    let config: GlobalConfig =
        toml::from_str(&content).map_err(|source| ConfigError::TomlParse {
            path: config_path,
            source,
        })?;

    Ok(config)
}

/// Loads provider definitions from `providers/*.yaml`.
fn load_providers(da_dir: &Path) -> ConfigResult<Vec<ProviderConfig>> {
    let providers_dir = da_dir.join("providers");

    if !providers_dir.exists() {
        return Ok(Vec::new());
    }

    let mut providers = Vec::new();

    for entry in WalkDir::new(&providers_dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|source| ConfigError::DirectoryWalk {
            path: providers_dir.clone(),
            source,
        })?;

        let path = entry.path();

        let ext = path.extension().and_then(|s| s.to_str());
        if ext != Some("yaml") && ext != Some("yml") {
            continue;
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;

        let provider: ProviderConfig =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::YamlParse {
                path: path.to_path_buf(),
                source,
            })?;

        if provider.name.trim().is_empty() {
            return Err(ConfigError::InvalidConfig {
                path: path.to_path_buf(),
                reason: "provider name must not be empty".to_string(),
            });
        }

        providers.push(provider);
    }

    Ok(providers)
}
