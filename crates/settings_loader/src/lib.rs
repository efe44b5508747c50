//! # Settings Loader
//!
//! Centralized settings loading for the budget assistant backend and its command line
//! tools. Settings come from an optional JSON file (every section and field has a
//! default) and are then overridden by environment variables.
//!
//! ## Sections
//!
//! - `server`: bind address, CORS origins and the timeout for admin store calls
//! - `store`: SQLite path and busy timeout
//! - `model`: Anthropic API key, base URL, model name and HTTP timeout
//! - `chat`: orchestrator loop bounds and timeouts
//!
//! ## Environment overrides
//!
//! `HOST`, `PORT`, `CORS_ORIGINS` (comma separated), `DATABASE_PATH`,
//! `DATABASE_BUSY_TIMEOUT_MS`, `STORE_TIMEOUT_SECS`, `ANTHROPIC_API_KEY`,
//! `ANTHROPIC_BASE_URL`, `ANTHROPIC_MODEL`, `MODEL_TIMEOUT_SECS`, `MODEL_MAX_OUTPUT_TOKENS`.
//!
//! ## Usage Examples
//!
//! ```rust,no_run
//! use std::path::PathBuf;
//!
//! # fn main() -> anyhow::Result<()> {
//! // Load a settings file as-is
//! let settings = settings_loader::load_settings("config/settings.json")?;
//!
//! // File (if any) plus environment overrides
//! let path = Some(PathBuf::from("settings.json"));
//! let settings = settings_loader::AppSettings::load(path.as_ref())?;
//! println!("listening on {}", settings.server.bind_address());
//! # Ok(())
//! # }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use ai::OrchestratorConfig;
use ai_client::ModelClientConfig;
use anyhow::{Context, Result};
use database::StoreConfig;
use serde::{Deserialize, Serialize};

/// Env var naming a settings file when no path is given explicitly.
pub const SETTINGS_PATH_ENV: &str = "SETTINGS_PATH";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Allowed CORS origins. Empty means any origin.
    #[serde(default)]
    pub cors_origins: Vec<String>,
    #[serde(default = "default_store_timeout_secs")]
    pub store_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
            store_timeout_secs: default_store_timeout_secs(),
        }
    }
}

impl ServerSettings {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_store_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub model: ModelClientConfig,
    #[serde(default)]
    pub chat: OrchestratorConfig,
}

impl AppSettings {
    /// Reads the settings file at `path` (or `$SETTINGS_PATH`), if any, then applies
    /// environment overrides. A missing file is not an error; a malformed one is.
    pub fn load(path: Option<&PathBuf>) -> Result<Self> {
        let from_env = std::env::var(SETTINGS_PATH_ENV).ok().map(PathBuf::from);
        let path = path.or(from_env.as_ref());

        let mut settings = match path {
            Some(path) if settings_file_exists(path) => load_settings(path)?,
            Some(path) => {
                return Err(anyhow::anyhow!("Settings file not found: {}", path.display()));
            }
            None => Self::default(),
        };
        settings.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    /// Applies overrides read through `lookup`. Unparseable numbers are errors.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let lookup = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(host) = lookup("HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = port.parse().with_context(|| format!("PORT is not a valid port: {port}"))?;
        }
        if let Some(origins) = lookup("CORS_ORIGINS") {
            self.server.cors_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(String::from)
                .collect();
        }

        if let Some(path) = lookup("DATABASE_PATH") {
            self.store.path = PathBuf::from(path);
        }
        if let Some(ms) = lookup("DATABASE_BUSY_TIMEOUT_MS") {
            self.store.busy_timeout_ms = parse_number("DATABASE_BUSY_TIMEOUT_MS", &ms)?;
        }
        if let Some(secs) = lookup("STORE_TIMEOUT_SECS") {
            let secs = parse_number("STORE_TIMEOUT_SECS", &secs)?;
            self.server.store_timeout_secs = secs;
            self.chat.tool_timeout_secs = secs;
        }

        if let Some(secs) = lookup("MODEL_TIMEOUT_SECS") {
            self.chat.model_timeout_secs = parse_number("MODEL_TIMEOUT_SECS", &secs)?;
        }
        if let Some(tokens) = lookup("MODEL_MAX_OUTPUT_TOKENS") {
            self.chat.max_output_tokens = tokens
                .parse()
                .with_context(|| format!("MODEL_MAX_OUTPUT_TOKENS is not a number: {tokens}"))?;
        }
        self.model.apply_overrides(lookup);

        Ok(())
    }
}

fn parse_number(key: &str, raw: &str) -> Result<u64> {
    raw.parse()
        .with_context(|| format!("{key} is not a number: {raw}"))
}

/// Loads settings from a JSON file
pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<AppSettings> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Reading settings file: {}", path.display()))?;
    let settings: AppSettings = serde_json::from_str(&raw)
        .with_context(|| format!("Parsing settings JSON in {}", path.display()))?;
    Ok(settings)
}

/// Loads settings from an optional path, returning None if no path is provided
pub fn load_optional_settings(path: Option<&PathBuf>) -> Result<Option<AppSettings>> {
    match path {
        Some(settings_path) => Ok(Some(load_settings(settings_path)?)),
        None => Ok(None),
    }
}

/// Checks if a settings file exists at the given path
pub fn settings_file_exists<P: AsRef<Path>>(path: P) -> bool {
    path.as_ref().is_file()
}
