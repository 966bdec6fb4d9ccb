//! Configuration management

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Expand a leading `~/` against the home directory
pub fn expand_tilde(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}

/// Filesystem locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Unix socket the hook script writes to
    #[serde(default = "default_socket_path")]
    pub socket: PathBuf,
    /// Directory holding the key icons
    #[serde(default = "default_assets_dir")]
    pub assets: PathBuf,
    /// Log file used with `--log-file`
    #[serde(default = "default_log_path")]
    pub log: PathBuf,
}

fn default_socket_path() -> PathBuf {
    PathBuf::from("~/.claude/streamdeck.sock")
}
fn default_assets_dir() -> PathBuf {
    PathBuf::from("~/.claude/streamdeck/icons")
}
fn default_log_path() -> PathBuf {
    PathBuf::from("~/.claude/streamdeck.log")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            socket: default_socket_path(),
            assets: default_assets_dir(),
            log: default_log_path(),
        }
    }
}

/// Stream Deck device configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// USB Vendor ID
    #[serde(default = "default_vendor_id")]
    pub vendor_id: u16,
    /// Only decks with this many keys are used
    #[serde(default = "default_key_count")]
    pub key_count: usize,
    /// Brightness in percent (0-100)
    #[serde(default = "default_brightness")]
    pub brightness: u8,
}

fn default_vendor_id() -> u16 {
    crate::hid::protocol::ELGATO_VENDOR_ID
}
fn default_key_count() -> usize {
    super::layout::KEY_COUNT
}
fn default_brightness() -> u8 {
    80
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            vendor_id: default_vendor_id(),
            key_count: default_key_count(),
            brightness: default_brightness(),
        }
    }
}

/// Button label configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Label size in pixels
    #[serde(default = "default_font_size")]
    pub font_size: f32,
    /// TrueType fonts tried in order; the built-in bitmap font is the fallback
    #[serde(default = "default_fonts")]
    pub fonts: Vec<PathBuf>,
}

fn default_font_size() -> f32 {
    14.0
}

fn default_fonts() -> Vec<PathBuf> {
    vec![
        PathBuf::from("/System/Library/Fonts/Helvetica.ttc"),
        PathBuf::from("/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf"),
        PathBuf::from("/usr/share/fonts/TTF/DejaVuSans.ttf"),
    ]
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            font_size: default_font_size(),
            fonts: default_fonts(),
        }
    }
}

/// Timeouts and intervals
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Per-connection read timeout on the hook socket, in milliseconds
    #[serde(default = "default_socket_timeout")]
    pub socket_timeout_ms: u64,
    /// Delay between device connection attempts, in milliseconds
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,
    /// How long a pressed key stays white, in milliseconds
    #[serde(default = "default_flash_duration")]
    pub flash_duration_ms: u64,
    /// Device connectivity poll interval, in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

fn default_socket_timeout() -> u64 {
    5000
}
fn default_reconnect_delay() -> u64 {
    2000
}
fn default_flash_duration() -> u64 {
    100
}
fn default_poll_interval() -> u64 {
    1000
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            socket_timeout_ms: default_socket_timeout(),
            reconnect_delay_ms: default_reconnect_delay(),
            flash_duration_ms: default_flash_duration(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

impl TimingConfig {
    pub fn socket_timeout(&self) -> Duration {
        Duration::from_millis(self.socket_timeout_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn flash_duration(&self) -> Duration {
        Duration::from_millis(self.flash_duration_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub timing: TimingConfig,
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from a file, falling back to defaults when it is missing
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let content = std::fs::read_to_string(config_path)
                .with_context(|| format!("Failed to read config file: {:?}", config_path))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", config_path))?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Save configuration to a specific file
    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

        Ok(())
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "claude-streamdeck", "ClaudeStreamDeck")
            .context("Failed to determine config directory")?;
        Ok(proj_dirs.config_dir().join("config.toml"))
    }

    /// Get the default configuration embedded in the binary
    pub fn default_config_str() -> &'static str {
        include_str!("../../config/default.toml")
    }

    pub fn socket_path(&self) -> PathBuf {
        expand_tilde(&self.paths.socket)
    }

    pub fn assets_dir(&self) -> PathBuf {
        expand_tilde(&self.paths.assets)
    }

    pub fn log_path(&self) -> PathBuf {
        expand_tilde(&self.paths.log)
    }

    pub fn font_paths(&self) -> Vec<PathBuf> {
        self.display.fonts.iter().map(|p| expand_tilde(p)).collect()
    }

    /// Create the parent directories of the socket and the log file
    pub fn ensure_directories(&self) -> Result<()> {
        for path in [self.socket_path(), self.log_path()] {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory: {:?}", parent))?;
            }
        }
        Ok(())
    }
}
