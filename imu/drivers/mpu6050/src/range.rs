//! Full-scale ranges and their human-readable labels.

use std::str::FromStr;
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumIter, EnumString, IntoStaticStr)]
pub enum AccelRange {
    #[default]
    #[strum(serialize = "2g")]
    G2,
    #[strum(serialize = "4g")]
    G4,
    #[strum(serialize = "8g")]
    G8,
    #[strum(serialize = "16g")]
    G16,
}

impl AccelRange {
    /// Value for ACCEL_CONFIG (AFS_SEL in bits 4:3).
    pub fn register_value(self) -> u8 {
        (self as u8) << 3
    }

    pub fn lsb_per_g(self) -> f32 {
        match self {
            AccelRange::G2 => 16384.0,
            AccelRange::G4 => 8192.0,
            AccelRange::G8 => 4096.0,
            AccelRange::G16 => 2048.0,
        }
    }

    pub fn label(self) -> &'static str {
        self.into()
    }

    pub fn labels() -> Vec<&'static str> {
        Self::iter().map(Self::label).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumIter, EnumString, IntoStaticStr)]
pub enum GyroRange {
    #[default]
    #[strum(serialize = "250 deg/s")]
    Dps250,
    #[strum(serialize = "500 deg/s")]
    Dps500,
    #[strum(serialize = "1000 deg/s")]
    Dps1000,
    #[strum(serialize = "2000 deg/s")]
    Dps2000,
}

impl GyroRange {
    /// Value for GYRO_CONFIG (FS_SEL in bits 4:3).
    pub fn register_value(self) -> u8 {
        (self as u8) << 3
    }

    pub fn lsb_per_dps(self) -> f32 {
        match self {
            GyroRange::Dps250 => 131.0,
            GyroRange::Dps500 => 65.5,
            GyroRange::Dps1000 => 32.8,
            GyroRange::Dps2000 => 16.4,
        }
    }

    pub fn label(self) -> &'static str {
        self.into()
    }

    pub fn labels() -> Vec<&'static str> {
        Self::iter().map(Self::label).collect()
    }
}

pub fn resolve_accel(label: &str) -> Result<AccelRange, Error> {
    AccelRange::from_str(label).map_err(|_| Error::UnknownRangeLabel(label.to_string()))
}

pub fn resolve_gyro(label: &str) -> Result<GyroRange, Error> {
    GyroRange::from_str(label).map_err(|_| Error::UnknownRangeLabel(label.to_string()))
}

/// Currently programmed ranges, used to scale raw samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Sensitivity {
    pub accel: AccelRange,
    pub gyro: GyroRange,
}
