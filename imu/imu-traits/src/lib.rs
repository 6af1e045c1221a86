pub mod storage;

pub use storage::{ConfigStore, FileStore, MemoryStore, StoreError};

use std::fmt;
use thiserror::Error;

// --- Measurement metadata ---

/// One named, unit-tagged scalar produced by a sensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub name: &'static str,
    pub unit: &'static str,
    pub value: f32,
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={} {}", self.name, self.value, self.unit)
    }
}

/// Static description a sensor publishes for host discovery.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SensorDescription {
    /// Instance name, e.g. "Chassis IMU"
    pub name: String,
    /// Device category label
    pub kind: &'static str,
    /// Ordered (name, unit) pairs matching the order of `Sensor::readings`
    pub parameters: Vec<(&'static str, &'static str)>,
}

impl SensorDescription {
    pub fn parameter_quantity(&self) -> usize {
        self.parameters.len()
    }
}

// --- Standard Error Type ---
#[derive(Debug, Error)]
pub enum ImuError {
    /// Error bringing up the bus or talking to the device (I2C, Serial, CAN)
    #[error("Device error: {0}")]
    DeviceError(String),
    /// Error reading data from the device
    #[error("Read error: {0}")]
    ReadError(String),
    /// Error writing configuration to the device
    #[error("Write error: {0}")]
    WriteError(String),
    /// Rejected configuration (malformed blob or unknown option)
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    /// Configuration could not be persisted
    #[error("Storage error: {0}")]
    StorageError(String),
    /// Operation called in the wrong lifecycle state
    #[error("Invalid state: {0}")]
    InvalidState(String),
    /// Catch-all for other errors
    #[error("Other IMU error: {0}")]
    Other(String),
}

/// Capability a host sensor framework polls.
///
/// Single-threaded: every call blocks for the underlying bus transactions and
/// no method is reentrant.
pub trait Sensor {
    /// Brings up the bus and device, loads or creates the stored configuration.
    fn begin(&mut self) -> Result<(), ImuError>;

    /// Current configuration as a serialized blob.
    fn get_config(&self) -> Result<String, ImuError>;

    /// Applies a configuration blob, optionally persisting it.
    fn set_config(&mut self, config: &str, persist: bool) -> Result<(), ImuError>;

    /// Captures one measurement cycle into the sensor's readings.
    fn take_measurement(&mut self) -> Result<(), ImuError>;

    fn description(&self) -> &SensorDescription;

    /// Latest values, in the same order as `description().parameters`.
    fn readings(&self) -> Vec<Reading>;
}
