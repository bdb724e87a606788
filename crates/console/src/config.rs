//! Console configuration
//!
//! Layered with the `config` crate: built-in defaults, then an optional
//! TOML file (`FLEET_CONFIG`, or `fleet-console.toml` in the working
//! directory), then `FLEET_*` environment variables.

use anyhow::{Context, Result};
use fleet_core::command::{DispatchConfig, DEFAULT_PROTECTED_NAMESPACES};
use fleet_core::convergence::PollPolicy;
use fleet_core::models::EntityKind;
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_CONFIG_FILE: &str = "fleet-console";

#[derive(Debug, Clone, Deserialize)]
pub struct ConsoleConfig {
    /// Port of the console API (also serves health and metrics)
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Base URL of the fleet backend
    #[serde(default = "default_backend_url")]
    pub backend_url: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,

    /// Streams reloaded by the refresh loop
    #[serde(default = "default_refresh_streams")]
    pub refresh_streams: Vec<EntityKind>,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_poll_max_attempts")]
    pub poll_max_attempts: u32,

    /// Attempt budget for image rollouts on daemonsets and statefulsets
    #[serde(default = "default_long_rollout_max_attempts")]
    pub long_rollout_max_attempts: u32,

    #[serde(default = "default_protected_namespaces")]
    pub protected_namespaces: Vec<String>,

    /// Identities (`kind/namespace/name`) exempt from namespace protection
    #[serde(default)]
    pub allow_list: Vec<String>,

    /// How long finished sessions stay on the convergence board
    #[serde(default = "default_session_retention")]
    pub session_retention_secs: u64,
}

fn default_api_port() -> u16 {
    8080
}

fn default_backend_url() -> String {
    "http://localhost:5000".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_refresh_interval() -> u64 {
    15
}

fn default_refresh_streams() -> Vec<EntityKind> {
    vec![
        EntityKind::Node,
        EntityKind::Deployment,
        EntityKind::StatefulSet,
        EntityKind::DaemonSet,
        EntityKind::CronJob,
        EntityKind::Pod,
    ]
}

fn default_poll_interval() -> u64 {
    5
}

fn default_poll_max_attempts() -> u32 {
    60
}

fn default_long_rollout_max_attempts() -> u32 {
    90
}

fn default_session_retention() -> u64 {
    900
}

fn default_protected_namespaces() -> Vec<String> {
    DEFAULT_PROTECTED_NAMESPACES
        .iter()
        .map(|ns| ns.to_string())
        .collect()
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
            backend_url: default_backend_url(),
            request_timeout_secs: default_request_timeout(),
            refresh_interval_secs: default_refresh_interval(),
            refresh_streams: default_refresh_streams(),
            poll_interval_secs: default_poll_interval(),
            poll_max_attempts: default_poll_max_attempts(),
            long_rollout_max_attempts: default_long_rollout_max_attempts(),
            protected_namespaces: default_protected_namespaces(),
            allow_list: Vec::new(),
            session_retention_secs: default_session_retention(),
        }
    }
}

impl ConsoleConfig {
    /// Load configuration from the config file and environment
    pub fn load() -> Result<Self> {
        let file = std::env::var("FLEET_CONFIG").ok();
        Self::load_from(file.as_deref())
    }

    pub fn load_from(file: Option<&str>) -> Result<Self> {
        let file_source = match file {
            Some(path) => config::File::with_name(path).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let config = config::Config::builder()
            .add_source(file_source)
            .add_source(
                config::Environment::with_prefix("FLEET")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("refresh_streams")
                    .with_list_parse_key("protected_namespaces")
                    .with_list_parse_key("allow_list"),
            )
            .build()
            .context("Failed to read console configuration")?;

        config
            .try_deserialize()
            .context("Invalid console configuration")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn session_retention(&self) -> Duration {
        Duration::from_secs(self.session_retention_secs)
    }

    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            protected_namespaces: self.protected_namespaces.iter().cloned().collect(),
            allow_list: self.allow_list.iter().cloned().collect(),
            poll_policy: PollPolicy::default()
                .with_interval(Duration::from_secs(self.poll_interval_secs))
                .with_max_attempts(self.poll_max_attempts),
            long_rollout_attempts: self.long_rollout_max_attempts,
        }
    }
}
