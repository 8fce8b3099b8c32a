//! Driver configuration.
//!
//! Defaults match the reference wiring: sensor on GPIO17, LED on GPIO18,
//! 700 ms LED hold, device name `motion_sensor`. A TOML file can override
//! any of them.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::hal::PinId;

pub const DEFAULT_DEVICE_NAME: &str = "motion_sensor";
pub const DEFAULT_SENSOR_PIN: u8 = 17;
pub const DEFAULT_LED_PIN: u8 = 18;
pub const DEFAULT_LED_ON_TIME_MS: u64 = 700;
pub const DEFAULT_RUN_DIR: &str = "/run/motion-driver";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DriverConfig {
    /// Device name; names the chardev registration, class, and node.
    pub device_name: String,
    /// GPIO line the sensor's digital output is wired to.
    pub sensor_pin: u8,
    /// GPIO line driving the feedback LED.
    pub led_pin: u8,
    /// How long the LED stays lit after a detection.
    pub led_on_time_ms: u64,
    /// Base directory for the device class.
    pub run_dir: PathBuf,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            device_name: DEFAULT_DEVICE_NAME.to_string(),
            sensor_pin: DEFAULT_SENSOR_PIN,
            led_pin: DEFAULT_LED_PIN,
            led_on_time_ms: DEFAULT_LED_ON_TIME_MS,
            run_dir: PathBuf::from(DEFAULT_RUN_DIR),
        }
    }
}

impl DriverConfig {
    pub fn from_toml(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn sensor(&self) -> PinId {
        PinId(self.sensor_pin)
    }

    pub fn led(&self) -> PinId {
        PinId(self.led_pin)
    }

    pub fn led_on_time(&self) -> Duration {
        Duration::from_millis(self.led_on_time_ms)
    }
}
