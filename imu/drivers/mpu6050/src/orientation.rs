//! Unit conversion and complementary-filter angle estimation.

use byteorder::{BigEndian, ByteOrder};
use imu_traits::Reading;

use crate::calibration::GyroOffsets;
use crate::range::Sensitivity;
use crate::registers::{MEASUREMENT_LEN, TEMP_OFFSET, TEMP_SENSITIVITY};

/// Weight of the gyro-integrated angle in the fused estimate.
pub const DEFAULT_GYRO_COEFFICIENT: f32 = 0.98;

/// Raw register values from one burst read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MeasurementSample {
    pub accel: [i16; 3],
    pub temperature: i16,
    pub gyro: [i16; 3],
}

impl MeasurementSample {
    /// Decodes the 14-byte block starting at ACCEL_XOUT_H.
    pub fn from_bytes(buf: &[u8; MEASUREMENT_LEN]) -> Self {
        let word = |i: usize| BigEndian::read_i16(&buf[2 * i..2 * i + 2]);
        MeasurementSample {
            accel: [word(0), word(1), word(2)],
            temperature: word(3),
            gyro: [word(4), word(5), word(6)],
        }
    }
}

/// Name and unit of every reading, in output order.
pub const READING_FIELDS: [(&str, &str); 15] = [
    ("accX", "g"),
    ("accY", "g"),
    ("accZ", "g"),
    ("temp", "C"),
    ("gyroX", "deg/s"),
    ("gyroY", "deg/s"),
    ("gyroZ", "deg/s"),
    ("angleAccX", "deg"),
    ("angleAccY", "deg"),
    ("angleGyroX", "deg"),
    ("angleGyroY", "deg"),
    ("angleGyroZ", "deg"),
    ("angleX", "deg"),
    ("angleY", "deg"),
    ("angleZ", "deg"),
];

/// One calibrated measurement cycle in physical units.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CalibratedReading {
    pub acc_x: f32,
    pub acc_y: f32,
    pub acc_z: f32,
    pub temp: f32,
    pub gyro_x: f32,
    pub gyro_y: f32,
    pub gyro_z: f32,
    pub angle_acc_x: f32,
    pub angle_acc_y: f32,
    pub angle_gyro_x: f32,
    pub angle_gyro_y: f32,
    pub angle_gyro_z: f32,
    pub angle_x: f32,
    pub angle_y: f32,
    pub angle_z: f32,
}

impl CalibratedReading {
    fn values(&self) -> [f32; 15] {
        [
            self.acc_x,
            self.acc_y,
            self.acc_z,
            self.temp,
            self.gyro_x,
            self.gyro_y,
            self.gyro_z,
            self.angle_acc_x,
            self.angle_acc_y,
            self.angle_gyro_x,
            self.angle_gyro_y,
            self.angle_gyro_z,
            self.angle_x,
            self.angle_y,
            self.angle_z,
        ]
    }

    pub fn readings(&self) -> [Reading; 15] {
        let values = self.values();
        std::array::from_fn(|i| Reading {
            name: READING_FIELDS[i].0,
            unit: READING_FIELDS[i].1,
            value: values[i],
        })
    }
}

/// Maps an angle into (-180, 180].
fn wrap(angle: f32) -> f32 {
    let wrapped = (angle + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped == -180.0 {
        180.0
    } else {
        wrapped
    }
}

/// Running angle state.
///
/// `angle_z` has no accelerometer reference and drifts with the residual gyro
/// bias.
#[derive(Debug, Clone)]
pub struct OrientationEstimator {
    gyro_coefficient: f32,
    angle_gyro: [f32; 3],
    angle_x: f32,
    angle_y: f32,
    angle_z: f32,
    seeded: bool,
}

impl Default for OrientationEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl OrientationEstimator {
    pub fn new() -> Self {
        OrientationEstimator {
            gyro_coefficient: DEFAULT_GYRO_COEFFICIENT,
            angle_gyro: [0.0; 3],
            angle_x: 0.0,
            angle_y: 0.0,
            angle_z: 0.0,
            seeded: false,
        }
    }

    pub fn with_gyro_coefficient(mut self, coefficient: f32) -> Self {
        self.gyro_coefficient = coefficient.clamp(0.0, 1.0);
        self
    }

    pub fn gyro_coefficient(&self) -> f32 {
        self.gyro_coefficient
    }

    /// Zeroes all accumulated angles. The next update re-seeds the fused
    /// roll/pitch from the accelerometer and ignores its `dt`.
    pub fn reset_angles(&mut self) {
        self.angle_gyro = [0.0; 3];
        self.angle_x = 0.0;
        self.angle_y = 0.0;
        self.angle_z = 0.0;
        self.seeded = false;
    }

    /// Zeroes all accumulated angles but stays seeded, so the next update
    /// integrates its full `dt` from zero. Used for per-sample relative angles.
    pub fn zero_angles(&mut self) {
        self.angle_gyro = [0.0; 3];
        self.angle_x = 0.0;
        self.angle_y = 0.0;
        self.angle_z = 0.0;
    }

    /// Converts `sample` to physical units and advances the angle state by `dt`
    /// seconds. A non-positive or non-finite `dt` leaves the accumulators as
    /// they are.
    pub fn update(
        &mut self,
        sample: &MeasurementSample,
        sensitivity: Sensitivity,
        offsets: &GyroOffsets,
        dt: f32,
    ) -> CalibratedReading {
        let accel_scale = sensitivity.accel.lsb_per_g();
        let gyro_scale = sensitivity.gyro.lsb_per_dps();
        let bias = offsets.as_array();

        let acc = sample.accel.map(|raw| raw as f32 / accel_scale);
        let gyro: [f32; 3] =
            std::array::from_fn(|axis| (sample.gyro[axis] as f32 - bias[axis]) / gyro_scale);
        let temp = sample.temperature as f32 / TEMP_SENSITIVITY + TEMP_OFFSET;

        let [ax, ay, az] = acc;
        let angle_acc_x = ay.atan2((ax * ax + az * az).sqrt()).to_degrees();
        let angle_acc_y = (-ax).atan2((ay * ay + az * az).sqrt()).to_degrees();

        if !self.seeded {
            self.angle_x = angle_acc_x;
            self.angle_y = angle_acc_y;
            self.seeded = true;
        } else if dt > 0.0 && dt.is_finite() {
            for (angle, rate) in self.angle_gyro.iter_mut().zip(gyro) {
                *angle += rate * dt;
            }
            let k = self.gyro_coefficient;
            self.angle_x = wrap(
                k * (angle_acc_x + wrap(self.angle_x + gyro[0] * dt - angle_acc_x))
                    + (1.0 - k) * angle_acc_x,
            );
            self.angle_y = wrap(
                k * (angle_acc_y + wrap(self.angle_y + gyro[1] * dt - angle_acc_y))
                    + (1.0 - k) * angle_acc_y,
            );
            self.angle_z = self.angle_gyro[2];
        }

        CalibratedReading {
            acc_x: ax,
            acc_y: ay,
            acc_z: az,
            temp,
            gyro_x: gyro[0],
            gyro_y: gyro[1],
            gyro_z: gyro[2],
            angle_acc_x,
            angle_acc_y,
            angle_gyro_x: self.angle_gyro[0],
            angle_gyro_y: self.angle_gyro[1],
            angle_gyro_z: self.angle_gyro[2],
            angle_x: self.angle_x,
            angle_y: self.angle_y,
            angle_z: self.angle_z,
        }
    }
}
