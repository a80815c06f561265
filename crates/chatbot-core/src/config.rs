use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{Result, anyhow};

/// Backend used when neither the config file nor the environment names one.
pub const DEFAULT_API_URL: &str = "http://localhost:8000/api";

/// Environment variable that overrides the configured API URL.
pub const API_URL_ENV: &str = "CHATBOT_API_URL";

const APP_DIR: &str = "chatbot-client";

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub api_url: Option<String>,
    pub last_username: Option<String>,
    pub remember_session: Option<bool>,
}

impl Config {
    pub fn new() -> Self {
        Self {
            api_url: Some(DEFAULT_API_URL.to_string()),
            last_username: None,
            remember_session: Some(true),
        }
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(config_path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(config_path, config_content)?;
        Ok(())
    }

    pub fn save_last_username(username: &str) -> Result<()> {
        let mut config = Self::load().unwrap_or_else(|_| Self::new());
        config.last_username = Some(username.to_string());
        config.save()
    }

    /// API base URL: environment first, then the config file, then the default.
    pub fn api_url(&self) -> String {
        std::env::var(API_URL_ENV)
            .ok()
            .filter(|url| !url.trim().is_empty())
            .or_else(|| self.api_url.clone())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
    }

    pub fn remember_session(&self) -> bool {
        self.remember_session.unwrap_or(true)
    }

    /// Where the session cookies are kept between runs.
    pub fn session_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("session.txt"))
    }

    /// Directory for rolling log files written by the terminal UI.
    pub fn log_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .ok_or_else(|| anyhow!("Could not determine data directory"))?;

        Ok(data_dir.join(APP_DIR).join("logs"))
    }

    fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join(APP_DIR))
    }

    fn get_config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }
}
