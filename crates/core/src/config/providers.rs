//! Provider catalog.
//!
//! Built-in provider definitions are embedded from the workspace `providers/`
//! directory with `rust-embed`. Projects can add or replace providers with
//! YAML files under `.dashboard-assistant/providers/`; an entry replaces the
//! built-in one with the same `name`.

use crate::config::error::{ConfigError, ConfigResult, ProviderError};
use da_protocol::provider_models::ProviderConfig;
use rust_embed::RustEmbed;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Provider definitions shipped with the installer.
///
/// Resolved relative to the crate root:
/// - `CARGO_MANIFEST_DIR` = `crates/core`
/// - `../../providers` = workspace `providers/`
#[derive(RustEmbed)]
#[folder = "$CARGO_MANIFEST_DIR/../../providers"]
struct BuiltinProviders;

/// Endpoint pattern trusted when a provider declares none.
pub const DEFAULT_ENDPOINT_REGEX: &str = ".*";

#[derive(Debug, Clone, Default)]
pub struct ProviderCatalog {
    providers: BTreeMap<String, ProviderConfig>,
}

impl ProviderCatalog {
    /// Parse every embedded `*.yaml` provider definition.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::YamlParse` when an embedded file is malformed.
    pub fn builtin() -> ConfigResult<Self> {
        let mut catalog = Self::default();

        for path in BuiltinProviders::iter() {
            if !path.ends_with(".yaml") && !path.ends_with(".yml") {
                continue;
            }
            let Some(file) = BuiltinProviders::get(&path) else {
                continue;
            };

            let provider: ProviderConfig = serde_yaml::from_slice(file.data.as_ref())
                .map_err(|source| ConfigError::YamlParse {
                    path: PathBuf::from(format!("<builtin>/{path}")),
                    source,
                })?;
            catalog.insert(provider);
        }

        Ok(catalog)
    }

    /// Add a provider, replacing any entry with the same name.
    pub fn insert(&mut self, provider: ProviderConfig) {
        self.providers.insert(provider.name.clone(), provider);
    }

    pub fn get(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.get(name)
    }

    /// Look up a provider by name.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::Unknown` when no provider has that name.
    pub fn require(&self, name: &str) -> Result<&ProviderConfig, ProviderError> {
        self.get(name)
            .ok_or_else(|| ProviderError::Unknown(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProviderConfig> {
        self.providers.values()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_providers_are_embedded() {
        let catalog = ProviderCatalog::builtin().unwrap();
        let names: Vec<&str> = catalog.names().collect();
        assert_eq!(names, vec!["Anthropic", "DeepSeek", "OpenAI"]);
    }

    #[test]
    fn test_builtin_openai_definition() {
        let catalog = ProviderCatalog::builtin().unwrap();
        let openai = catalog.require("OpenAI").unwrap();

        assert_eq!(openai.url_path, "/v1/chat/completions");
        assert_eq!(
            openai.response_filter.as_deref(),
            Some("$.choices[0].message.content")
        );
        assert!(openai.models.iter().any(|m| m == "gpt-4o"));
        assert!(openai.headers.contains_key("Authorization"));
    }

    #[test]
    fn test_every_builtin_has_response_filter() {
        let catalog = ProviderCatalog::builtin().unwrap();
        for provider in catalog.iter() {
            assert!(
                provider.response_filter.is_some(),
                "{} has no response_filter",
                provider.name
            );
        }
    }

    #[test]
    fn test_unknown_provider_error() {
        let catalog = ProviderCatalog::builtin().unwrap();
        let error = catalog.require("Foo").unwrap_err();
        assert_eq!(
            error.to_string(),
            "Unknown provider: Foo. Please review configuration."
        );
    }

    #[test]
    fn test_insert_replaces_by_name() {
        let mut catalog = ProviderCatalog::builtin().unwrap();
        let mut custom = catalog.require("OpenAI").unwrap().clone();
        custom.url_path = "/custom/path".to_string();
        catalog.insert(custom);

        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.require("OpenAI").unwrap().url_path, "/custom/path");
    }
}
