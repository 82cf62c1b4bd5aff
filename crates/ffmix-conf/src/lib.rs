//! Minimal configuration loading for ffmix.
//!
//! Configuration covers the things that cannot change while the daemon runs:
//! the state directory, the GUI listen port, the hardware tool commands and
//! the polling cadence. Everything the user actually mixes with lives in the
//! parameter store and snapshots, not here.
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/ffmix/config.toml` (system)
//! 2. `~/.config/ffmix/config.toml` (user)
//! 3. `./ffmix.toml` (local override)
//! 4. Environment variables (`FFMIX_*`)
//!
//! # Example Config
//!
//! ```toml
//! [paths]
//! state_dir = "~/.config/ffmix"
//!
//! [gui]
//! listen_port = 7000
//!
//! [hardware]
//! amixer = "amixer"
//! ctl_service = "snd-fireface-ctl-service"
//! poll_interval_ms = 1000
//! meter_interval_ms = 50
//!
//! [state]
//! autoload = true
//! ```

pub mod loader;

pub use loader::{discover_config_files, expand_path};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Filesystem paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Where snapshots and settings live.
    pub state_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self { state_dir: expand_path("~/.config/ffmix") }
    }
}

/// GUI link settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuiConfig {
    /// UDP port the daemon listens on for OSC messages from the GUI.
    pub listen_port: u16,
}

impl Default for GuiConfig {
    fn default() -> Self {
        Self { listen_port: 7000 }
    }
}

/// Hardware access settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareConfig {
    /// The amixer binary used for both the write pipe and one-shot queries.
    pub amixer: String,
    /// The firewire ctl service binary spawned when the card appears.
    pub ctl_service: String,
    /// Root of the ALSA proc tree, overridable for tests.
    pub proc_root: PathBuf,
    /// Cadence for slow-changing polled controls (clock, sync locks).
    pub poll_interval_ms: u64,
    /// Cadence for meter polling while a client is connected.
    pub meter_interval_ms: u64,
    /// Cadence for the device presence probe.
    pub presence_interval_ms: u64,
    /// Upper bound on a one-shot query subprocess.
    pub query_timeout_ms: u64,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            amixer: "amixer".to_string(),
            ctl_service: "snd-fireface-ctl-service".to_string(),
            proc_root: PathBuf::from("/proc/asound"),
            poll_interval_ms: 1000,
            meter_interval_ms: 50,
            presence_interval_ms: 1500,
            query_timeout_ms: 2000,
        }
    }
}

/// Snapshot behavior.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StateConfig {
    /// Reload the last loaded snapshot at startup.
    pub autoload: bool,
}

/// Complete ffmix configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FfmixConfig {
    pub paths: PathsConfig,
    pub gui: GuiConfig,
    pub hardware: HardwareConfig,
    pub state: StateConfig,
}

impl FfmixConfig {
    /// Load configuration from all standard sources.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, optionally forcing a specific file as the local
    /// override.
    pub fn load_from(config_path: Option<&std::path::Path>) -> Result<Self, ConfigError> {
        let mut config = FfmixConfig::default();
        for path in loader::discover_config_files_with_override(config_path) {
            config = loader::load_from_file(&path, config)?;
        }
        loader::apply_env_overrides(&mut config);
        Ok(config)
    }
}
