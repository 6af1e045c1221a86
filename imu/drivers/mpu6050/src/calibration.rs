use byteorder::{BigEndian, ByteOrder};
use log::{debug, info, warn};
use std::thread;
use std::time::Duration;

use crate::bus::RegisterBus;
use crate::registers::{DataRegisters, GYRO_LEN};
use crate::Error;

pub const DEFAULT_CALIBRATION_SAMPLES: usize = 250;

/// Gyroscope bias in raw register units.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GyroOffsets {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl GyroOffsets {
    pub fn as_array(&self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }
}

/// Estimates the gyroscope bias by averaging samples taken at rest.
#[derive(Debug, Clone)]
pub struct GyroCalibrator {
    samples: usize,
    delay: Duration,
}

impl Default for GyroCalibrator {
    fn default() -> Self {
        Self::new(DEFAULT_CALIBRATION_SAMPLES)
    }
}

impl GyroCalibrator {
    pub fn new(samples: usize) -> Self {
        GyroCalibrator {
            samples,
            delay: Duration::ZERO,
        }
    }

    /// Pause between consecutive reads.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn samples(&self) -> usize {
        self.samples
    }

    /// Samples the gyroscope `samples` times and returns the per-axis mean.
    ///
    /// The device must be stationary. Any bus error abandons the run; no
    /// partial result is returned.
    pub fn calibrate<B: RegisterBus>(&self, bus: &mut B) -> Result<GyroOffsets, Error> {
        if self.samples == 0 {
            return Err(Error::NoSamples);
        }
        info!("Calibrating gyro, don't move the sensor!");

        let mut sums = [0i64; 3];
        let mut buf = [0u8; GYRO_LEN];
        for i in 0..self.samples {
            if let Err(e) = bus.read_registers(DataRegisters::GyroXoutH as u8, &mut buf) {
                warn!("Gyro calibration aborted after {} of {} samples", i, self.samples);
                return Err(Error::CalibrationFailed(e));
            }
            for (axis, sum) in sums.iter_mut().enumerate() {
                *sum += BigEndian::read_i16(&buf[2 * axis..2 * axis + 2]) as i64;
            }
            if !self.delay.is_zero() {
                thread::sleep(self.delay);
            }
        }
        debug!("Gyro sums over {} samples: {:?}", self.samples, sums);

        let mean = |sum: i64| (sum as f64 / self.samples as f64) as f32;
        let offsets = GyroOffsets {
            x: mean(sums[0]),
            y: mean(sums[1]),
            z: mean(sums[2]),
        };
        info!("Calibration finished");
        info!("Offset X: {}", offsets.x);
        info!("Offset Y: {}", offsets.y);
        info!("Offset Z: {}", offsets.z);
        Ok(offsets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::mock::MockBus;

    fn gyro_burst(x: i16, y: i16, z: i16) -> Vec<u8> {
        [x, y, z].iter().flat_map(|v| v.to_be_bytes()).collect()
    }

    fn open_bus() -> MockBus {
        let mut bus = MockBus::new();
        bus.open().unwrap();
        bus
    }

    #[test]
    fn constant_samples_give_exact_offsets() {
        let mut bus = open_bus();
        bus.set_sample([0, 0, 16384], 0, [-37, 12, 250]);

        let offsets = GyroCalibrator::default().calibrate(&mut bus).unwrap();
        assert_eq!(offsets, GyroOffsets { x: -37.0, y: 12.0, z: 250.0 });
        assert_eq!(bus.reads, DEFAULT_CALIBRATION_SAMPLES);
    }

    #[test]
    fn offsets_are_the_mean_of_each_axis() {
        let mut bus = open_bus();
        for (x, y, z) in [(8, -2, 100), (10, -4, 101), (12, -6, 102), (10, -4, 101)] {
            bus.bursts.push_back(gyro_burst(x, y, z));
        }

        let offsets = GyroCalibrator::new(4).calibrate(&mut bus).unwrap();
        assert_eq!(offsets, GyroOffsets { x: 10.0, y: -4.0, z: 101.0 });
    }

    #[test]
    fn extreme_values_do_not_overflow() {
        let mut bus = open_bus();
        bus.set_sample([0; 3], 0, [i16::MAX, i16::MIN, -1]);

        let offsets = GyroCalibrator::new(1000).calibrate(&mut bus).unwrap();
        assert_eq!(offsets.x, i16::MAX as f32);
        assert_eq!(offsets.y, i16::MIN as f32);
        assert_eq!(offsets.z, -1.0);
    }

    #[test]
    fn bus_failure_mid_run_aborts() {
        let mut bus = open_bus();
        bus.set_sample([0; 3], 0, [5, 5, 5]);
        bus.fail_reads_after = Some(100);

        let result = GyroCalibrator::default().calibrate(&mut bus);
        assert!(matches!(result, Err(Error::CalibrationFailed(_))));
        assert_eq!(bus.reads, 100);
    }

    #[test]
    fn zero_samples_is_rejected() {
        let mut bus = open_bus();
        assert!(matches!(
            GyroCalibrator::new(0).calibrate(&mut bus),
            Err(Error::NoSamples)
        ));
        assert_eq!(bus.reads, 0);
    }
}
