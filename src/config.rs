//! Configuration management module.
//!
//! Handles loading and saving application configuration from a JSON file
//! kept next to the executable.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const MIN_ZOOM_FACTOR: f32 = 0.5;
pub const MAX_ZOOM_FACTOR: f32 = 2.5;

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_window_width")]
    pub window_width: f32,
    #[serde(default = "default_window_height")]
    pub window_height: f32,
    #[serde(default = "default_zoom_factor")]
    pub zoom_factor: f32,
    #[serde(default)]
    pub last_open_dir: Option<PathBuf>,
}

fn default_window_width() -> f32 {
    1024.0
}

fn default_window_height() -> f32 {
    768.0
}

fn default_zoom_factor() -> f32 {
    1.0
}

impl Default for Config {
    fn default() -> Self {
        Self {
            window_width: default_window_width(),
            window_height: default_window_height(),
            zoom_factor: default_zoom_factor(),
            last_open_dir: None,
        }
    }
}

/// The directory holding the executable, where the config file and the
/// font list live.
pub fn data_directory() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|path| path.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Configuration manager for loading/saving config.
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new() -> Self {
        Self {
            config_path: data_directory().join("rmlpad_config.json"),
        }
    }

    pub fn with_path(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    /// Load configuration from file, falling back to defaults when the file
    /// is missing or unreadable.
    pub fn load(&self) -> Config {
        let mut config = self.try_load().unwrap_or_default();
        config.zoom_factor = config.zoom_factor.clamp(MIN_ZOOM_FACTOR, MAX_ZOOM_FACTOR);
        config
    }

    fn try_load(&self) -> Option<Config> {
        if !self.config_path.exists() {
            return None;
        }
        let content = fs::read_to_string(&self.config_path).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Save configuration to file.
    pub fn save(&self, config: &Config) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(config)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        fs::write(&self.config_path, json)
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.window_width, 1024.0);
        assert_eq!(config.window_height, 768.0);
        assert_eq!(config.zoom_factor, 1.0);
        assert!(config.last_open_dir.is_none());
    }

    #[test]
    fn test_config_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::with_path(dir.path().join("config.json"));
        let config = Config {
            window_width: 640.0,
            window_height: 480.0,
            zoom_factor: 1.2,
            last_open_dir: Some(PathBuf::from("/tmp")),
        };
        manager.save(&config).unwrap();
        let loaded = manager.load();
        assert_eq!(loaded.window_width, 640.0);
        assert_eq!(loaded.zoom_factor, 1.2);
        assert_eq!(loaded.last_open_dir.as_deref(), Some(Path::new("/tmp")));
    }

    #[test]
    fn test_corrupt_config_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "not json").unwrap();
        let loaded = ConfigManager::with_path(path).load();
        assert_eq!(loaded.window_width, 1024.0);
    }

    #[test]
    fn test_out_of_range_zoom_clamped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"zoom_factor": 9.0}"#).unwrap();
        let loaded = ConfigManager::with_path(path).load();
        assert_eq!(loaded.zoom_factor, MAX_ZOOM_FACTOR);
    }
}
