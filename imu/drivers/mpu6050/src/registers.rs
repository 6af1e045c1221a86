use num_derive::{FromPrimitive, ToPrimitive};

#[derive(Debug, Clone, Copy, FromPrimitive, ToPrimitive)]
pub enum ConfigRegisters {
    SmplrtDiv = 0x19,
    Config = 0x1A,
    GyroConfig = 0x1B,
    AccelConfig = 0x1C,
}

/// Start of the 14-byte burst: accel XYZ, temperature, gyro XYZ (big-endian).
#[derive(Debug, Clone, Copy, FromPrimitive, ToPrimitive)]
pub enum DataRegisters {
    AccelXoutH = 0x3B,
    TempOutH = 0x41,
    GyroXoutH = 0x43,
}

#[derive(Debug, Clone, Copy, FromPrimitive, ToPrimitive)]
pub enum PowerRegisters {
    PwrMgmt1 = 0x6B,
    WhoAmI = 0x75,
}

/// Known WHO_AM_I answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum DeviceId {
    Mpu6050 = 0x68,
    Mpu6500 = 0x70,
    Mpu6050Variant = 0x72,
}

#[derive(Debug, Clone, Copy, FromPrimitive, ToPrimitive)]
pub enum Constants {
    DefaultI2cAddr = 0x68,
    /// PWR_MGMT_1: clear sleep, clock from the X gyro PLL
    WakeClockPllX = 0x01,
}

/// SMPLRT_DIV: sample at the full gyro output rate
pub const SAMPLE_RATE_DIVIDER: u8 = 0x00;
/// CONFIG: digital low-pass filter off
pub const DLPF_DISABLED: u8 = 0x00;

/// Bytes in one full measurement burst.
pub const MEASUREMENT_LEN: usize = 14;
/// Bytes in one gyroscope triplet.
pub const GYRO_LEN: usize = 6;

/// Temperature conversion from the register map: °C = raw / 340 + 36.53
pub const TEMP_SENSITIVITY: f32 = 340.0;
pub const TEMP_OFFSET: f32 = 36.53;
