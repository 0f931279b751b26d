//! Configuration structures.
//!
//! Configuration is loaded from defaults and the `AUTONOMOUS_TRUST_ROOT`
//! environment variable. Durations use humantime strings (`"500ms"`).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root directory environment variable.
pub const ROOT_ENV_VAR: &str = "AUTONOMOUS_TRUST_ROOT";

/// Config directory, relative to the root.
pub const CFG_PATH: &str = "etc/at";

/// Data directory, relative to the root.
pub const DATA_PATH: &str = "var/at";

/// Global node configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Filesystem layout.
    #[serde(default)]
    pub paths: PathsConfig,

    /// Supervisor loop settings.
    #[serde(default)]
    pub supervisor: SupervisorConfig,

    /// Per-subsystem runtime loop settings.
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Queue broker settings.
    #[serde(default)]
    pub messaging: MessagingConfig,

    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Defaults with the root taken from `AUTONOMOUS_TRUST_ROOT` when set.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(root) = std::env::var(ROOT_ENV_VAR) {
            if !root.is_empty() {
                config.paths.root = PathBuf::from(root);
            }
        }
        config
    }

    /// Defaults rooted at an explicit directory.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        let mut config = Self::default();
        config.paths.root = root.into();
        config
    }
}

/// Filesystem layout beneath the root directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    pub root: PathBuf,
}

impl PathsConfig {
    /// `<root>/etc/at`
    pub fn config_dir(&self) -> PathBuf {
        self.root.join(CFG_PATH)
    }

    /// `<root>/var/at`
    pub fn data_dir(&self) -> PathBuf {
        self.root.join(DATA_PATH)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/"),
        }
    }
}

/// Supervisor loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Monitoring cadence.
    #[serde(with = "humantime_serde")]
    pub cadence: Duration,

    /// How long to wait for subsystems after broadcasting quit before
    /// aborting the stragglers.
    #[serde(with = "humantime_serde")]
    pub shutdown_grace: Duration,

    /// Categories whose config documents are expected at bootstrap.
    pub required: Vec<String>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            cadence: Duration::from_millis(500),
            shutdown_grace: Duration::from_secs(5),
            required: vec![
                "identity".to_string(),
                "network".to_string(),
                "subsystems".to_string(),
            ],
        }
    }
}

/// Runtime loop settings shared by every subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Tick cadence.
    #[serde(with = "humantime_serde")]
    pub cadence: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            cadence: Duration::from_millis(500),
        }
    }
}

/// Queue broker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagingConfig {
    /// Per-queue message limit. `None` means unbounded.
    pub queue_capacity: Option<usize>,

    /// Suffix appended to a category to name its signal queue.
    pub signal_suffix: String,

    /// Identifier mixed into every queue key. Random per run when unset.
    #[serde(default)]
    pub queue_id: Option<u32>,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            queue_capacity: Some(1024),
            signal_suffix: ".signal".to_string(),
            queue_id: None,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Tracing log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable JSON log formatting.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}
