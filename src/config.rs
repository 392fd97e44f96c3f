//! Configuration system using TOML files.
//!
//! Config is stored in the OS-standard config directory:
//! - Windows: %APPDATA%\tunedex\config.toml
//! - macOS: ~/Library/Application Support/tunedex/config.toml
//! - Linux: ~/.config/tunedex/config.toml
//!
//! Every field has a default, so a partial (or missing) file is fine.
//! CLI flags and environment variables override what is loaded here.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Library and catalog settings
    pub library: LibraryConfig,

    /// External encoder used for transcoding
    pub encoder: EncoderConfig,
}

/// Library management settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// Root of the music directory tree
    pub root: PathBuf,

    /// SQLite catalog file
    pub database: PathBuf,

    /// Descend into symlinked directories while scanning.
    /// Cyclic symlink trees are reported by the walker and skipped.
    pub follow_links: bool,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("music"),
            database: PathBuf::from(crate::db::DEFAULT_DB_NAME),
            follow_links: true,
        }
    }
}

/// Encoder process settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Encoder executable (looked up in PATH)
    pub program: String,

    /// Arguments; an argument equal to [`INPUT_PLACEHOLDER`] is replaced
    /// by the source file path. Output must be Ogg/Vorbis on stdout.
    pub args: Vec<String>,

    /// Maximum bytes handed to the consumer per chunk
    pub chunk_size: usize,

    /// Give up on an encoder that produces nothing for this long
    pub idle_timeout_secs: Option<u64>,
}

/// Placeholder replaced by the input path in [`EncoderConfig::args`]
pub const INPUT_PLACEHOLDER: &str = "{input}";

impl EncoderConfig {
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_secs.map(Duration::from_secs)
    }
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            program: "ffmpeg".to_string(),
            args: [
                "-v",
                "quiet",
                "-i",
                INPUT_PLACEHOLDER,
                "-f",
                "ogg",
                "-acodec",
                "libvorbis",
                "-aq",
                "5",
                "-",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            chunk_size: 8192,
            idle_timeout_secs: None,
        }
    }
}

// ============================================================================
// Config File Operations
// ============================================================================

/// Get the config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("tunedex"))
}

/// Get the full path to the config file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Load configuration from disk
///
/// Returns default config if file doesn't exist or can't be parsed.
/// Logs warnings but doesn't fail - we always return a usable config.
pub fn load() -> Config {
    let Some(path) = config_path() else {
        tracing::warn!(target: "config", "Could not determine config directory, using defaults");
        return Config::default();
    };

    if !path.exists() {
        tracing::info!(target: "config", "No config file found at {:?}, using defaults", path);
        return Config::default();
    }

    match load_from(&path) {
        Ok(config) => {
            tracing::info!(target: "config", "Loaded config from {:?}", path);
            config
        }
        Err(e) => {
            tracing::error!(target: "config", "{}", e);
            tracing::warn!(target: "config", "Using default configuration");
            Config::default()
        }
    }
}

/// Load configuration from an explicit path, failing on any problem.
pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
    let contents =
        std::fs::read_to_string(path).map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
    toml::from_str(&contents).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))
}

/// Save configuration to disk
///
/// Creates the config directory if it doesn't exist.
pub fn save(config: &Config) -> Result<(), ConfigError> {
    let dir = config_dir().ok_or(ConfigError::NoConfigDir)?;
    save_to(config, &dir.join("config.toml"))
}

/// Save configuration to an explicit path (write to temp, then rename).
pub fn save_to(config: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| ConfigError::CreateDir(dir.to_path_buf(), e))?;
    }

    let contents = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;

    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, &contents).map_err(|e| ConfigError::Write(temp_path.clone(), e))?;
    std::fs::rename(&temp_path, path)
        .map_err(|e| ConfigError::Rename(temp_path, path.to_path_buf(), e))?;

    tracing::info!(target: "config", "Saved config to {:?}", path);
    Ok(())
}

// ============================================================================
// Error Types
// ============================================================================

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to read config file {0}: {1}")]
    Read(PathBuf, std::io::Error),

    #[error("Failed to parse config file {0}: {1}")]
    Parse(PathBuf, toml::de::Error),

    #[error("Failed to create config directory {0}: {1}")]
    CreateDir(PathBuf, std::io::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),

    #[error("Failed to write config to {0}: {1}")]
    Write(PathBuf, std::io::Error),

    #[error("Failed to rename temp file {0} to {1}: {2}")]
    Rename(PathBuf, PathBuf, std::io::Error),
}

// ============================================================================
// Tests
// ============================================================================
