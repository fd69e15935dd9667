//! Configuration management using Figment
//!
//! Configuration is loaded from multiple sources with the following precedence (highest to lowest):
//! 1. Environment variables (prefix: `FORWARDPLANE_`)
//! 2. Current working directory: ./config.toml
//! 3. XDG config directory: ~/.config/forwardplane/{service_name}/config.toml
//! 4. System directory: /etc/forwardplane/{service_name}/config.toml
//! 5. Default values

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Service configuration
    pub service: ServiceConfig,

    /// Forward-domain policy configuration
    #[serde(default)]
    pub forward: ForwardConfig,

    /// Database configuration (optional)
    #[serde(default)]
    pub database: Option<DatabaseConfig>,

    /// Redis configuration (optional)
    #[serde(default)]
    pub redis: Option<RedisConfig>,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service name
    pub name: String,

    /// Port to listen on (for the admin API that wraps this domain core)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Environment (dev, staging, production)
    #[serde(default = "default_environment")]
    pub environment: String,
}

/// Policy knobs for the forward domain model
///
/// These are the process-wide defaults the domain constructors and validator
/// consult when the caller does not supply an explicit value (e.g. the default
/// tunnel type for a new chain rule).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardConfig {
    /// Prefix used when generating agent API tokens (before the `_`)
    #[serde(default = "default_agent_token_prefix")]
    pub agent_token_prefix: String,

    /// Maximum number of intermediate agents allowed in a chain / direct-chain rule
    #[serde(default = "default_max_chain_agents")]
    pub max_chain_agents: usize,

    /// Maximum number of exit agents allowed on an entry rule
    #[serde(default = "default_max_exit_agents")]
    pub max_exit_agents: usize,

    /// Default weight assigned to an exit agent when the caller doesn't specify one
    #[serde(default = "default_agent_weight")]
    pub default_agent_weight: u8,

    /// Default tunnel type for new chain / entry rules
    #[serde(default = "default_tunnel_type")]
    pub default_tunnel_type: String,
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            agent_token_prefix: default_agent_token_prefix(),
            max_chain_agents: default_max_chain_agents(),
            max_exit_agents: default_max_exit_agents(),
            default_agent_weight: default_agent_weight(),
            default_tunnel_type: default_tunnel_type(),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_secs: u64,

    /// Whether database is optional (service can start without it)
    #[serde(default = "default_false")]
    pub optional: bool,
}

/// Redis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL (redis://host:port or cluster URLs)
    pub url: String,

    /// Maximum number of connections in the pool
    #[serde(default = "default_redis_max_connections")]
    pub max_connections: usize,

    /// Whether Redis is optional (service can start without it)
    #[serde(default = "default_false")]
    pub optional: bool,
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_agent_token_prefix() -> String {
    "fpa".to_string()
}

fn default_max_chain_agents() -> usize {
    10
}

fn default_max_exit_agents() -> usize {
    10
}

fn default_agent_weight() -> u8 {
    50
}

fn default_tunnel_type() -> String {
    "ws".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_connection_timeout() -> u64 {
    30
}

fn default_redis_max_connections() -> usize {
    10
}

fn default_false() -> bool {
    false
}

impl Config {
    /// Load configuration from all sources
    ///
    /// Searches for config files in this order (first found is used):
    /// 1. Current working directory: ./config.toml
    /// 2. XDG config directory: ~/.config/forwardplane/{service_name}/config.toml
    /// 3. System directory: /etc/forwardplane/{service_name}/config.toml
    ///
    /// Environment variables (`FORWARDPLANE_` prefix) override all file-based configs.
    pub fn load() -> Result<Self> {
        let service_name = std::env::current_exe()
            .ok()
            .and_then(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .unwrap_or_else(|| "forwardplane".to_string());

        Self::load_for_service(&service_name)
    }

    /// Load configuration for a specific service name
    pub fn load_for_service(service_name: &str) -> Result<Self> {
        let config_paths = Self::find_config_paths(service_name);

        tracing::debug!("Searching for config files in order:");
        for path in &config_paths {
            tracing::debug!("  - {}", path.display());
        }

        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        for path in config_paths.iter().rev() {
            if path.exists() {
                tracing::info!("Loading configuration from: {}", path.display());
                figment = figment.merge(Toml::file(path));
            }
        }

        figment = figment.merge(Env::prefixed("FORWARDPLANE_").split("_"));

        let config = figment.extract()?;
        Ok(config)
    }

    /// Load configuration from a specific file, bypassing XDG directories
    pub fn load_from(path: &str) -> Result<Self> {
        let config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("FORWARDPLANE_").split("_"))
            .extract()?;

        Ok(config)
    }

    /// Find all possible config file paths for a service, highest priority first
    fn find_config_paths(service_name: &str) -> Vec<PathBuf> {
        let mut paths = Vec::new();

        paths.push(PathBuf::from("config.toml"));

        let xdg_dirs = xdg::BaseDirectories::with_prefix("forwardplane");
        let config_file_path = Path::new(service_name).join("config.toml");
        if let Ok(path) = xdg_dirs.place_config_file(&config_file_path) {
            paths.push(path);
        }

        paths.push(
            PathBuf::from("/etc/forwardplane")
                .join(service_name)
                .join("config.toml"),
        );

        paths
    }

    /// Get database URL
    pub fn database_url(&self) -> Option<&str> {
        self.database.as_ref().map(|db| db.url.as_str())
    }

    /// Get Redis URL
    pub fn redis_url(&self) -> Option<&str> {
        self.redis.as_ref().map(|r| r.url.as_str())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: ServiceConfig {
                name: "forwardplane".to_string(),
                port: default_port(),
                log_level: default_log_level(),
                environment: default_environment(),
            },
            forward: ForwardConfig::default(),
            database: None,
            redis: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.service.port, 8080);
        assert_eq!(config.service.log_level, "info");
        assert_eq!(config.forward.max_chain_agents, 10);
        assert_eq!(config.forward.default_agent_weight, 50);
    }

    #[test]
    fn test_forward_config_defaults_are_stable() {
        let forward = ForwardConfig::default();
        assert_eq!(forward.agent_token_prefix, "fpa");
        assert_eq!(forward.default_tunnel_type, "ws");
        assert_eq!(forward.max_exit_agents, 10);
    }
}
