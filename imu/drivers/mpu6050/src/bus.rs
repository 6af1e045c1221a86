//! Register-level access to the two-wire bus.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("I2C error: {0}")]
    I2c(String),
    #[error("bus is not open")]
    NotOpen,
    #[error("short read from register 0x{register:02X}: expected {expected} bytes, got {got}")]
    ShortRead {
        register: u8,
        expected: usize,
        got: usize,
    },
}

/// A device on a register-addressed bus.
pub trait RegisterBus {
    /// Brings up the bus. Called once, before any register access.
    fn open(&mut self) -> Result<(), BusError>;

    /// Reads `buf.len()` consecutive registers starting at `register`.
    fn read_registers(&mut self, register: u8, buf: &mut [u8]) -> Result<(), BusError>;

    fn write_register(&mut self, register: u8, value: u8) -> Result<(), BusError>;
}

#[cfg(target_os = "linux")]
pub use linux::LinuxI2cBus;

#[cfg(target_os = "linux")]
mod linux {
    use super::{BusError, RegisterBus};
    use i2cdev::core::I2CDevice;
    use i2cdev::linux::{LinuxI2CDevice, LinuxI2CError};
    use log::debug;

    impl From<LinuxI2CError> for BusError {
        fn from(err: LinuxI2CError) -> Self {
            BusError::I2c(err.to_string())
        }
    }

    /// `/dev/i2c-N` character device, opened lazily by `open`.
    pub struct LinuxI2cBus {
        path: String,
        address: u16,
        device: Option<LinuxI2CDevice>,
    }

    impl LinuxI2cBus {
        pub fn new(path: &str, address: u16) -> Self {
            LinuxI2cBus {
                path: path.to_string(),
                address,
                device: None,
            }
        }

        fn device(&mut self) -> Result<&mut LinuxI2CDevice, BusError> {
            self.device.as_mut().ok_or(BusError::NotOpen)
        }
    }

    impl RegisterBus for LinuxI2cBus {
        fn open(&mut self) -> Result<(), BusError> {
            debug!("Opening {} at address 0x{:02X}", self.path, self.address);
            self.device = Some(LinuxI2CDevice::new(&self.path, self.address)?);
            Ok(())
        }

        fn read_registers(&mut self, register: u8, buf: &mut [u8]) -> Result<(), BusError> {
            let data = self
                .device()?
                .smbus_read_i2c_block_data(register, buf.len() as u8)?;
            if data.len() != buf.len() {
                return Err(BusError::ShortRead {
                    register,
                    expected: buf.len(),
                    got: data.len(),
                });
            }
            buf.copy_from_slice(&data);
            Ok(())
        }

        fn write_register(&mut self, register: u8, value: u8) -> Result<(), BusError> {
            self.device()?.smbus_write_byte_data(register, value)?;
            Ok(())
        }
    }
}
