//! Device configuration and its JSON blob form.
//!
//! Blob layout (order-independent):
//!
//! ```json
//! {
//!   "Name": "IMU",
//!   "autoCalibrate": true,
//!   "calibrateNow": false,
//!   "angleReset": false,
//!   "accelRange": { "current": "2g", "options": ["2g", "4g", "8g", "16g"] },
//!   "gyroRange": { "current": "250 deg/s", "options": ["250 deg/s", "..."] }
//! }
//! ```
//!
//! `options` is written for discovery and ignored on input. Absent fields
//! keep their current value, so a blob may carry only the settings it changes.

use imu_traits::ConfigStore;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::range::{resolve_accel, resolve_gyro, AccelRange, GyroRange, Sensitivity};
use crate::Error;

pub const SETTINGS_NAMESPACE: &str = "/settings/sen/";
pub const DEFAULT_CONFIG_FILE: &str = "MPU6050IMU.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Run gyro calibration during `begin`
    pub auto_calibrate: bool,
    /// Reset the angle estimate after every measurement
    pub angle_reset: bool,
    pub accel_range: AccelRange,
    pub gyro_range: GyroRange,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            auto_calibrate: true,
            angle_reset: false,
            accel_range: AccelRange::G2,
            gyro_range: GyroRange::Dps250,
        }
    }
}

impl DeviceConfig {
    pub fn sensitivity(&self) -> Sensitivity {
        Sensitivity {
            accel: self.accel_range,
            gyro: self.gyro_range,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RangeDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    current: Option<String>,
    #[serde(default, skip_deserializing)]
    options: Vec<String>,
}

impl RangeDocument {
    fn new(current: &str, options: Vec<&str>) -> Self {
        RangeDocument {
            current: Some(current.to_string()),
            options: options.into_iter().map(str::to_string).collect(),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ConfigDocument {
    #[serde(rename = "Name", default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(rename = "autoCalibrate", default)]
    auto_calibrate: Option<bool>,
    #[serde(rename = "calibrateNow", default)]
    calibrate_now: Option<bool>,
    #[serde(rename = "angleReset", default)]
    angle_reset: Option<bool>,
    /// Misspelt key written by older firmware; `angleReset` wins if both are set
    #[serde(rename = "angelReset", default, skip_serializing)]
    legacy_angle_reset: Option<bool>,
    #[serde(rename = "accelRange", default)]
    accel_range: Option<RangeDocument>,
    #[serde(rename = "gyroRange", default)]
    gyro_range: Option<RangeDocument>,
}

/// Result of parsing a blob on top of an existing configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigUpdate {
    pub config: DeviceConfig,
    /// New device name, if the blob carried one
    pub name: Option<String>,
    /// One-shot request to calibrate the gyro now; never persisted
    pub calibrate_now: bool,
}

impl ConfigUpdate {
    /// Parses `blob`, taking every absent field from `base`. Nothing is
    /// returned unless the whole blob is valid.
    pub fn parse(blob: &str, base: &DeviceConfig) -> Result<Self, Error> {
        let doc: ConfigDocument =
            serde_json::from_str(blob).map_err(|e| Error::MalformedConfig(e.to_string()))?;

        let accel_range = match doc.accel_range.and_then(|r| r.current) {
            Some(label) => resolve_accel(&label)?,
            None => base.accel_range,
        };
        let gyro_range = match doc.gyro_range.and_then(|r| r.current) {
            Some(label) => resolve_gyro(&label)?,
            None => base.gyro_range,
        };

        Ok(ConfigUpdate {
            config: DeviceConfig {
                auto_calibrate: doc.auto_calibrate.unwrap_or(base.auto_calibrate),
                angle_reset: doc
                    .angle_reset
                    .or(doc.legacy_angle_reset)
                    .unwrap_or(base.angle_reset),
                accel_range,
                gyro_range,
            },
            name: doc.name,
            calibrate_now: doc.calibrate_now.unwrap_or(false),
        })
    }
}

/// Serializes `config` with the device `name` and the advisory option lists.
pub fn serialize(name: &str, config: &DeviceConfig) -> Result<String, Error> {
    let doc = ConfigDocument {
        name: Some(name.to_string()),
        auto_calibrate: Some(config.auto_calibrate),
        calibrate_now: Some(false),
        angle_reset: Some(config.angle_reset),
        legacy_angle_reset: None,
        accel_range: Some(RangeDocument::new(
            config.accel_range.label(),
            AccelRange::labels(),
        )),
        gyro_range: Some(RangeDocument::new(
            config.gyro_range.label(),
            GyroRange::labels(),
        )),
    };
    serde_json::to_string(&doc).map_err(|e| Error::MalformedConfig(e.to_string()))
}

/// Parses a complete configuration; absent fields take their defaults.
pub fn deserialize(blob: &str) -> Result<DeviceConfig, Error> {
    ConfigUpdate::parse(blob, &DeviceConfig::default()).map(|update| update.config)
}

/// Loads and saves the configuration blob of one device.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    path: String,
}

impl ConfigManager {
    /// Stores under the settings namespace with the given file name.
    pub fn new(file_name: &str) -> Self {
        ConfigManager {
            path: format!("{}{}", SETTINGS_NAMESPACE, file_name),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the stored blob, or `None` when nothing has been saved yet.
    pub fn load<S: ConfigStore>(&self, store: &S) -> Result<Option<String>, Error> {
        if !store.exists(&self.path) {
            debug!("No stored configuration at {}", self.path);
            return Ok(None);
        }
        store
            .read_blob(&self.path)
            .map(Some)
            .map_err(Error::PersistError)
    }

    pub fn save<S: ConfigStore>(&self, store: &mut S, blob: &str) -> Result<(), Error> {
        store.write_blob(&self.path, blob).map_err(|e| {
            warn!("Failed to save configuration to {}: {}", self.path, e);
            Error::PersistError(e)
        })
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIG_FILE)
    }
}
