//! Client configuration
//!
//! Connection and audio output settings, persisted as `config.json` under
//! the platform config directory. Loading is tolerant: a missing or
//! unreadable file simply yields defaults.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use murmur_common::protocol::{ChatMode, DEFAULT_SERVER_ADDRESS, DEFAULT_SERVER_PORT};

// =============================================================================
// Constants
// =============================================================================

/// Directory name under the platform config dir
const APP_DIR_NAME: &str = "murmur";

/// Config file name
const CONFIG_FILE_NAME: &str = "config.json";

// =============================================================================
// Client Config
// =============================================================================

/// Client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Service address (hostname or IP)
    #[serde(default = "default_server_address")]
    pub server_address: String,

    /// Service port
    #[serde(default = "default_server_port")]
    pub server_port: u16,

    /// Response mode for new sessions
    #[serde(default)]
    pub mode: ChatMode,

    /// Output device name (empty string = system default)
    #[serde(default)]
    pub output_device: String,
}

fn default_server_address() -> String {
    DEFAULT_SERVER_ADDRESS.to_string()
}

fn default_server_port() -> u16 {
    DEFAULT_SERVER_PORT
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_address: default_server_address(),
            server_port: default_server_port(),
            mode: ChatMode::default(),
            output_device: String::new(),
        }
    }
}

impl ClientConfig {
    /// WebSocket URL for the given mode's endpoint
    pub fn url(&self, mode: ChatMode) -> String {
        format!(
            "ws://{}:{}{}",
            self.server_address,
            self.server_port,
            mode.path()
        )
    }

    /// Platform-specific config file path
    ///
    /// Returns None if the config directory cannot be determined.
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Load settings from disk, or defaults if unavailable
    pub fn load() -> Self {
        Self::config_path()
            .map(|path| Self::load_from(&path))
            .unwrap_or_default()
    }

    /// Save settings to disk
    ///
    /// Creates the config directory if it doesn't exist.
    pub fn save(&self) -> Result<(), String> {
        let path = Self::config_path().ok_or_else(|| "No config directory".to_string())?;
        self.save_to(&path)
    }

    fn load_from(path: &Path) -> Self {
        if path.exists()
            && let Ok(contents) = fs::read_to_string(path)
            && let Ok(config) = serde_json::from_str::<ClientConfig>(&contents)
        {
            return config;
        }

        Self::default()
    }

    fn save_to(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config directory: {}", e))?;
        }

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;

        fs::write(path, json).map_err(|e| format!("Failed to write config: {}", e))
    }
}

// =============================================================================
// Tests
// =============================================================================
