use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

/// Top-level configuration.
///
/// Loaded once at startup and immutable afterwards; the listener hands
/// the pieces to the router, forwarder, and file responder constructors.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub static_files: StaticFilesConfig,
    pub routes: Vec<RouteConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StaticFilesConfig {
    /// Directory that static files are served from.
    pub root: PathBuf,
}

/// One proxied path prefix and the upstream base URL it forwards to.
#[derive(Debug, Clone, Deserialize)]
pub struct RouteConfig {
    pub prefix: String,
    pub upstream: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
        }
    }
}

impl Default for StaticFilesConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("site"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            static_files: StaticFilesConfig::default(),
            routes: vec![RouteConfig {
                prefix: "/example/api/".to_string(),
                upstream: "https://api.example.com/v1/".to_string(),
            }],
        }
    }
}

impl Config {
    /// Load configuration from the file named by `SWITCHBOARD_CONFIG`
    /// (default `switchboard.yaml`).
    ///
    /// A missing file yields the built-in defaults; a file that exists but
    /// does not parse is a startup error.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("SWITCHBOARD_CONFIG")
            .unwrap_or_else(|_| "switchboard.yaml".to_string());
        Self::from_file(Path::new(&path))
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_yaml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }
}
