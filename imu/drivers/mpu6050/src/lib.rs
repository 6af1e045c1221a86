//! MPU6050 driver: calibrated accelerometer/gyroscope readings and
//! complementary-filter angle estimates, with a persisted JSON configuration.
//!
//! ```no_run
//! # #[cfg(target_os = "linux")]
//! # fn main() -> Result<(), linux_mpu6050::Error> {
//! use linux_mpu6050::{Mpu6050Imu, Mpu6050Options};
//!
//! let mut imu = Mpu6050Imu::linux("/dev/i2c-1", 0x68, "/var/lib/imu", Mpu6050Options::new("IMU"));
//! imu.begin()?;
//! imu.take_measurement()?;
//! for reading in imu.readings() {
//!     println!("{}", reading);
//! }
//! # Ok(())
//! # }
//! # #[cfg(not(target_os = "linux"))]
//! # fn main() {}
//! ```

pub mod bus;
pub mod calibration;
pub mod config;
pub mod driver;
pub mod orientation;
pub mod range;
pub mod registers;

pub use bus::{BusError, RegisterBus};
#[cfg(target_os = "linux")]
pub use bus::LinuxI2cBus;
pub use calibration::{GyroCalibrator, GyroOffsets};
pub use config::{ConfigManager, ConfigUpdate, DeviceConfig};
pub use driver::{DriverState, Mpu6050Imu, Mpu6050Options};
pub use imu_traits::{ImuError, Reading, Sensor, SensorDescription};
pub use orientation::{CalibratedReading, MeasurementSample, OrientationEstimator};
pub use range::{AccelRange, GyroRange, Sensitivity};

use imu_traits::StoreError;
use thiserror::Error;

pub const DEFAULT_I2C_ADDR: u16 = registers::Constants::DefaultI2cAddr as u16;

#[derive(Debug, Error)]
pub enum Error {
    #[error("bus initialization failed: {0}")]
    BusInit(#[source] BusError),
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("unknown range label {0:?}")]
    UnknownRangeLabel(String),
    #[error("malformed configuration: {0}")]
    MalformedConfig(String),
    #[error("failed to persist configuration: {0}")]
    PersistError(#[source] StoreError),
    #[error("gyro calibration failed: {0}")]
    CalibrationFailed(#[source] BusError),
    #[error("calibration needs at least one sample")]
    NoSamples,
    #[error("bus error: {0}")]
    Bus(#[source] BusError),
    #[error("measurement read failed, reading is stale: {0}")]
    StaleReading(#[source] BusError),
    #[error("driver not ready (state {0:?})")]
    NotReady(DriverState),
    #[error("begin() not allowed in state {0:?}")]
    InvalidState(DriverState),
}

// Map local Error to ImuError
impl From<Error> for ImuError {
    fn from(err: Error) -> Self {
        match err {
            Error::BusInit(_) | Error::DeviceNotFound(_) => ImuError::DeviceError(err.to_string()),
            Error::UnknownRangeLabel(_) | Error::MalformedConfig(_) | Error::NoSamples => {
                ImuError::ConfigurationError(err.to_string())
            }
            Error::PersistError(_) => ImuError::StorageError(err.to_string()),
            Error::CalibrationFailed(_) | Error::StaleReading(_) => {
                ImuError::ReadError(err.to_string())
            }
            Error::Bus(_) => ImuError::WriteError(err.to_string()),
            Error::NotReady(_) | Error::InvalidState(_) => ImuError::InvalidState(err.to_string()),
        }
    }
}
