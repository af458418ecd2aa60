use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Origin the embedding host application runs under; always allowed to talk
/// to the served UI.
pub const DEFAULT_CORS_ORIGINS: &[&str] = &["app://obsidian.md"];

/// Origin of the UI dev server, allowed only when `dev_mode` is set.
pub const DEV_CORS_ORIGIN: &str = "http://localhost:5173";

pub const DEFAULT_PORT: u16 = 14096;
pub const DEFAULT_HOSTNAME: &str = "127.0.0.1";
pub const DEFAULT_STARTUP_TIMEOUT_MS: u64 = 30_000;

/// Where the embedded view opens by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ViewPlacement {
    #[default]
    RightSidebar,
    MainPane,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

/// Persisted plugin settings. Owned by the host application's settings store;
/// consumed here as plain config.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Settings {
    pub port: u16,
    pub hostname: String,
    pub auto_start: bool,
    pub opencode_path: String,
    pub project_directory: Option<PathBuf>,
    pub startup_timeout_ms: u64,
    pub dev_mode: bool,
    pub default_placement: ViewPlacement,
    pub basic_auth: Option<BasicAuth>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            hostname: DEFAULT_HOSTNAME.to_string(),
            auto_start: false,
            opencode_path: "opencode".to_string(),
            project_directory: None,
            startup_timeout_ms: DEFAULT_STARTUP_TIMEOUT_MS,
            dev_mode: false,
            default_placement: ViewPlacement::default(),
            basic_auth: None,
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings from {}", path.display()))?;
        let settings = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse settings from {}", path.display()))?;
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let raw = serde_json::to_string_pretty(self)?;
        fs::write(path, raw)
            .with_context(|| format!("failed to write settings to {}", path.display()))?;
        Ok(())
    }

    /// Freeze these settings into a server start configuration.
    pub fn server_config(&self) -> ServerConfig {
        let mut cors_origins: Vec<String> =
            DEFAULT_CORS_ORIGINS.iter().map(|s| s.to_string()).collect();
        if self.dev_mode {
            cors_origins.push(DEV_CORS_ORIGIN.to_string());
        }
        ServerConfig {
            port: self.port,
            hostname: self.hostname.clone(),
            opencode_path: crate::util::expand_tilde(&self.opencode_path),
            project_directory: self
                .project_directory
                .as_ref()
                .map(|p| PathBuf::from(crate::util::expand_tilde(&p.to_string_lossy()))),
            startup_timeout_ms: self.startup_timeout_ms,
            cors_origins,
            basic_auth: self.basic_auth.clone(),
        }
    }
}

/// Immutable per start attempt; replaceable between attempts via
/// `ServerSupervisor::update_config`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ServerConfig {
    pub port: u16,
    pub hostname: String,
    pub opencode_path: String,
    pub project_directory: Option<PathBuf>,
    pub startup_timeout_ms: u64,
    pub cors_origins: Vec<String>,
    pub basic_auth: Option<BasicAuth>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Settings::default().server_config()
    }
}
