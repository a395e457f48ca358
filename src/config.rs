//! Configuration for monterm.
//!
//! Settings live in `~/.monterm/config.toml`:
//!
//! ```toml
//! # Refresh delay in tenths of a second
//! delay = 15
//!
//! # Color scheme id (0 = default, 1 = monochrome)
//! color_scheme = 0
//!
//! # Report mouse clicks
//! mouse = true
//! ```
//!
//! Missing keys take their defaults; an unreadable or malformed file is
//! ignored as a whole.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::crt::color::ColorScheme;

/// Main configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Refresh delay in tenths of a second
    pub delay: u32,
    /// Color scheme id
    pub color_scheme: ColorScheme,
    /// Register for mouse clicks
    pub mouse: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            delay: 15,
            color_scheme: ColorScheme::DEFAULT,
            mouse: true,
        }
    }
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Self {
        match Self::get_config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Self::default(),
        }
    }

    /// Load configuration from `path`, falling back to defaults
    pub fn load_from(path: &Path) -> Self {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                warn!("Failed to read {}: {}", path.display(), e);
                return Self::default();
            }
        };
        match toml::from_str(&content) {
            Ok(config) => config,
            Err(e) => {
                warn!("Ignoring malformed {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<(), String> {
        match Self::get_config_path() {
            Some(path) => self.save_to(&path),
            None => Err("Could not determine config path".to_string()),
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<(), String> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;
        fs::write(path, content).map_err(|e| format!("Failed to write config: {}", e))?;
        Ok(())
    }

    /// Directory holding the config file and the log
    pub fn config_dir() -> Option<PathBuf> {
        let dir = home_dir()?.join(".monterm");
        if !dir.exists() {
            let _ = fs::create_dir_all(&dir);
        }
        Some(dir)
    }

    /// Get config file path
    fn get_config_path() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("config.toml"))
    }
}

// Get home directory
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}
