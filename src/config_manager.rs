use std::{
    fs::File,
    io::{BufReader, BufWriter, ErrorKind},
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{log_throttle::DEFAULT_LOG_WINDOW, profile::ProfileChangeSet};

const DEFAULT_UPDATE_INTERVAL_MS: u64 = 1000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

// Power target requested for a device at start-up
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TdpConfig {
    // One of "low", "medium" or "high"
    Simple(String),
    // Normalized power target, 1.0 is the device default
    Percentage(f64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub bus_id: i32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tdp: Option<TdpConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<ProfileChangeSet>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    // Reject every power mode change on every device
    pub disable_device_power_mode_settings: bool,

    // Sensor polling interval
    pub update_interval_ms: u64,
    // Window used to rate limit repeated driver failure logs
    pub log_window_secs: u64,

    pub devices: Vec<DeviceConfig>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            disable_device_power_mode_settings: false,
            update_interval_ms: DEFAULT_UPDATE_INTERVAL_MS,
            log_window_secs: DEFAULT_LOG_WINDOW.as_secs(),
            devices: Vec::new(),
        }
    }
}

impl DaemonConfig {
    pub fn update_interval(&self) -> Duration {
        // A zero interval would spin the polling loop
        Duration::from_millis(self.update_interval_ms.max(1))
    }

    pub fn log_window(&self) -> Duration {
        Duration::from_secs(self.log_window_secs)
    }

    pub fn device(&self, bus_id: i32) -> Option<&DeviceConfig> {
        self.devices.iter().find(|device| device.bus_id == bus_id)
    }
}

// Load and store the daemon Json configuration
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new(config_path: &Path) -> Self {
        Self {
            config_path: config_path.to_path_buf(),
        }
    }

    // Parse the configuration file. A missing file results in the
    // default configuration, which is written in its place
    pub fn load(&self) -> Result<DaemonConfig, ConfigError> {
        let file = match File::open(&self.config_path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                warn!(
                    "Config file \"{}\" not found, using default configuration",
                    self.config_path.display()
                );

                let config = DaemonConfig::default();
                if let Err(err) = self.save(&config) {
                    warn!("Failed to write the default configuration: {err}");
                }
                return Ok(config);
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: self.config_path.clone(),
                    source,
                });
            }
        };

        let config: DaemonConfig = serde_json::from_reader(BufReader::new(file))
            .map_err(|source| ConfigError::Parse {
                path: self.config_path.clone(),
                source,
            })?;

        info!("Loaded config file \"{}\"", self.config_path.display());
        debug!("Current config: {:?}", config);

        Ok(config)
    }

    pub fn save(&self, config: &DaemonConfig) -> Result<(), ConfigError> {
        let io_error = |source| ConfigError::Io {
            path: self.config_path.clone(),
            source,
        };

        if let Some(parent) = self.config_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(io_error)?;
            }
        }

        let file = File::create(&self.config_path).map_err(io_error)?;

        serde_json::to_writer_pretty(BufWriter::new(file), config).map_err(
            |source| ConfigError::Parse {
                path: self.config_path.clone(),
                source,
            },
        )
    }
}
