//! Global configuration models for `.dashboard-assistant/config.toml`.
//!
//! This module defines the structure of the configuration file that tells the
//! installer which cluster to talk to and how to pace the installation.

use serde::Deserialize;
use serde::Serialize;
use std::fmt;
use ts_rs::TS;

/// Represents global settings from `.dashboard-assistant/config.toml`.
///
/// # Example
///
/// ```toml
/// # .dashboard-assistant/config.toml
/// [cluster]
/// url = "https://localhost:9200"
/// username = "admin"
/// password = "admin"
/// accept_invalid_certs = true
///
/// [installer]
/// agent_propagation_delay_ms = 1000
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq, TS)]
pub struct GlobalConfig {
    /// Connection settings for the search cluster.
    #[serde(default)]
    pub cluster: ClusterConfig,

    /// Installer behaviour.
    #[serde(default)]
    pub installer: InstallerConfig,
}

/// How to reach the search cluster.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, TS)]
pub struct ClusterConfig {
    /// Base URL of the cluster REST API.
    #[serde(default = "default_cluster_url")]
    pub url: String,

    /// Basic auth user name.
    #[serde(default)]
    pub username: Option<String>,

    /// Basic auth password.
    #[serde(default)]
    pub password: Option<String>,

    /// Skip TLS certificate verification (self-signed demo clusters).
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

fn default_cluster_url() -> String {
    "http://localhost:9200".to_string()
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            url: default_cluster_url(),
            username: None,
            password: None,
            accept_invalid_certs: false,
        }
    }
}

impl fmt::Debug for ClusterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .finish()
    }
}

/// Installer pacing.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
pub struct InstallerConfig {
    /// Time to wait after registering the active agent, so that the change is
    /// visible to the rest of the cluster before the run reports success.
    #[serde(default = "default_agent_propagation_delay_ms")]
    pub agent_propagation_delay_ms: u64,
}

fn default_agent_propagation_delay_ms() -> u64 {
    1000
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            agent_propagation_delay_ms: default_agent_propagation_delay_ms(),
        }
    }
}
