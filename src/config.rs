//! Configuration file support
//!
//! Loads config from ~/.riptide/config.toml with environment variable
//! fallback (RIPTIDE_* / provider key vars). `.env` files are honored
//! via dotenvy before any lookup.

use serde::Deserialize;
use std::path::PathBuf;

/// Server configuration
#[derive(Debug, Default, Clone, Deserialize)]
pub struct Config {
    /// Conversation database URL (SQLite)
    pub database_url: Option<String>,

    /// Business database URL for the query tool (read-intended)
    pub tool_database_url: Option<String>,

    /// OpenAI API key
    pub openai_api_key: Option<String>,

    /// Anthropic API key
    pub anthropic_api_key: Option<String>,

    /// Google API key
    pub google_api_key: Option<String>,

    /// HTTP port
    pub port: Option<u16>,

    /// Replay buffer size per stream; 0 or absent disables resumable streams
    pub resume_buffer_events: Option<usize>,
}

impl Config {
    /// Load config from ~/.riptide/config.toml
    pub fn load() -> Self {
        let path = config_path();

        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("Warning: Failed to parse {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                eprintln!("Warning: Failed to read {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Get a value with fallback to environment variable
    pub fn get_or_env(&self, field: Option<&String>, env_var: &str) -> Option<String> {
        field.cloned().or_else(|| std::env::var(env_var).ok())
    }

    pub fn database_url(&self) -> String {
        self.get_or_env(self.database_url.as_ref(), "RIPTIDE_DATABASE_URL")
            .unwrap_or_else(|| "sqlite://riptide.db?mode=rwc".into())
    }

    pub fn tool_database_url(&self) -> Option<String> {
        self.get_or_env(self.tool_database_url.as_ref(), "TOOL_DATABASE_URL")
    }

    pub fn openai_api_key(&self) -> Option<String> {
        self.get_or_env(self.openai_api_key.as_ref(), "OPENAI_API_KEY")
    }

    pub fn anthropic_api_key(&self) -> Option<String> {
        self.get_or_env(self.anthropic_api_key.as_ref(), "ANTHROPIC_API_KEY")
    }

    pub fn google_api_key(&self) -> Option<String> {
        self.get_or_env(self.google_api_key.as_ref(), "GOOGLE_API_KEY")
    }

    pub fn port(&self) -> u16 {
        self.port
            .or_else(|| {
                std::env::var("RIPTIDE_PORT")
                    .ok()
                    .and_then(|p| p.parse().ok())
            })
            .unwrap_or(3000)
    }

    /// Resumable stream replay capacity. None disables the registry.
    pub fn resume_buffer_events(&self) -> Option<usize> {
        let n = self.resume_buffer_events.or_else(|| {
            std::env::var("RIPTIDE_RESUME_BUFFER")
                .ok()
                .and_then(|v| v.parse().ok())
        })?;
        if n == 0 { None } else { Some(n) }
    }
}

/// Get the config file path
pub fn config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_default()
        .join(".riptide")
        .join("config.toml")
}
