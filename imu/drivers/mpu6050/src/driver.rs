use imu_traits::{ConfigStore, ImuError, Reading, Sensor, SensorDescription};
use log::{debug, error, info, warn};
use num_traits::FromPrimitive;
use std::time::Instant;

use crate::bus::RegisterBus;
use crate::calibration::{GyroCalibrator, GyroOffsets, DEFAULT_CALIBRATION_SAMPLES};
use crate::config::{self, ConfigManager, ConfigUpdate, DeviceConfig, DEFAULT_CONFIG_FILE};
use crate::orientation::{
    CalibratedReading, MeasurementSample, OrientationEstimator, DEFAULT_GYRO_COEFFICIENT,
    READING_FIELDS,
};
use crate::registers::{
    ConfigRegisters, Constants, DataRegisters, DeviceId, PowerRegisters, DLPF_DISABLED,
    MEASUREMENT_LEN, SAMPLE_RATE_DIVIDER,
};
use crate::Error;

pub const DEVICE_KIND: &str = "Motion Sensor";

/// Lifecycle of a driver instance. `Failed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Uninitialized,
    BusReady,
    DeviceReady,
    Operational,
    Failed,
}

impl DriverState {
    fn device_ready(self) -> bool {
        matches!(self, DriverState::DeviceReady | DriverState::Operational)
    }
}

/// Construction-time settings.
#[derive(Debug, Clone)]
pub struct Mpu6050Options {
    pub name: String,
    /// File name under the settings namespace
    pub config_file: String,
    pub calibration_samples: usize,
    pub gyro_coefficient: f32,
}

impl Default for Mpu6050Options {
    fn default() -> Self {
        Mpu6050Options {
            name: "MPU6050".to_string(),
            config_file: DEFAULT_CONFIG_FILE.to_string(),
            calibration_samples: DEFAULT_CALIBRATION_SAMPLES,
            gyro_coefficient: DEFAULT_GYRO_COEFFICIENT,
        }
    }
}

impl Mpu6050Options {
    pub fn new(name: &str) -> Self {
        Mpu6050Options {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn config_file(mut self, file_name: &str) -> Self {
        self.config_file = file_name.to_string();
        self
    }

    pub fn calibration_samples(mut self, samples: usize) -> Self {
        self.calibration_samples = samples;
        self
    }

    pub fn gyro_coefficient(mut self, coefficient: f32) -> Self {
        self.gyro_coefficient = coefficient;
        self
    }
}

fn describe(name: &str) -> SensorDescription {
    SensorDescription {
        name: name.to_string(),
        kind: DEVICE_KIND,
        parameters: READING_FIELDS.to_vec(),
    }
}

/// MPU6050 accelerometer/gyroscope with gyro calibration and angle estimation.
///
/// Owns its bus and configuration store exclusively. Not reentrant; meant to
/// be polled from a single control loop.
pub struct Mpu6050Imu<B: RegisterBus, S: ConfigStore> {
    bus: B,
    store: S,
    state: DriverState,
    config: DeviceConfig,
    manager: ConfigManager,
    calibrator: GyroCalibrator,
    estimator: OrientationEstimator,
    offsets: GyroOffsets,
    reading: CalibratedReading,
    description: SensorDescription,
    last_update: Option<Instant>,
}

#[cfg(target_os = "linux")]
impl Mpu6050Imu<crate::bus::LinuxI2cBus, imu_traits::FileStore> {
    /// Driver on `/dev/i2c-N`, keeping its settings below `settings_root`.
    pub fn linux(
        i2c_path: &str,
        address: u16,
        settings_root: &str,
        options: Mpu6050Options,
    ) -> Self {
        Self::new(
            crate::bus::LinuxI2cBus::new(i2c_path, address),
            imu_traits::FileStore::new(settings_root),
            options,
        )
    }
}

impl<B: RegisterBus, S: ConfigStore> Mpu6050Imu<B, S> {
    pub fn new(bus: B, store: S, options: Mpu6050Options) -> Self {
        Mpu6050Imu {
            bus,
            store,
            state: DriverState::Uninitialized,
            config: DeviceConfig::default(),
            manager: ConfigManager::new(&options.config_file),
            calibrator: GyroCalibrator::new(options.calibration_samples),
            estimator: OrientationEstimator::new().with_gyro_coefficient(options.gyro_coefficient),
            offsets: GyroOffsets::default(),
            reading: CalibratedReading::default(),
            description: describe(&options.name),
            last_update: None,
        }
    }

    /// Brings the driver to `Operational`.
    ///
    /// Callable once. After any failure the driver is `Failed` and must be
    /// rebuilt; a second call returns `InvalidState`.
    pub fn begin(&mut self) -> Result<(), Error> {
        if self.state != DriverState::Uninitialized {
            return Err(Error::InvalidState(self.state));
        }
        match self.bring_up() {
            Ok(()) => {
                self.state = DriverState::Operational;
                info!("{} operational", self.description.name);
                Ok(())
            }
            Err(e) => {
                error!("Failed to start {}: {}", self.description.name, e);
                self.state = DriverState::Failed;
                Err(e)
            }
        }
    }

    fn bring_up(&mut self) -> Result<(), Error> {
        self.bus.open().map_err(Error::BusInit)?;
        self.state = DriverState::BusReady;

        self.handshake()?;
        self.state = DriverState::DeviceReady;

        let calibrated = self.load_or_create_config()?;
        if self.config.auto_calibrate && !calibrated {
            self.calibrate_gyro()?;
        }
        self.reset_angles();
        Ok(())
    }

    fn handshake(&mut self) -> Result<(), Error> {
        let mut id = [0u8; 1];
        self.bus
            .read_registers(PowerRegisters::WhoAmI as u8, &mut id)
            .map_err(|e| Error::DeviceNotFound(format!("WHO_AM_I read failed: {}", e)))?;
        let device = DeviceId::from_u8(id[0]).ok_or_else(|| {
            Error::DeviceNotFound(format!("unexpected WHO_AM_I 0x{:02X}", id[0]))
        })?;
        debug!("Found {:?} (WHO_AM_I 0x{:02X})", device, id[0]);

        let setup = [
            (PowerRegisters::PwrMgmt1 as u8, Constants::WakeClockPllX as u8),
            (ConfigRegisters::SmplrtDiv as u8, SAMPLE_RATE_DIVIDER),
            (ConfigRegisters::Config as u8, DLPF_DISABLED),
        ];
        for (register, value) in setup {
            self.bus
                .write_register(register, value)
                .map_err(|e| Error::DeviceNotFound(format!("device setup failed: {}", e)))?;
        }
        Ok(())
    }

    /// Returns whether the stored blob already ran a calibration.
    fn load_or_create_config(&mut self) -> Result<bool, Error> {
        let stored = match self.manager.load(&self.store) {
            Ok(stored) => stored,
            Err(e) => {
                warn!("Could not read stored configuration: {}", e);
                self.program_ranges(self.config)?;
                return Ok(false);
            }
        };

        match stored {
            None => {
                info!("No configuration at {}, creating one", self.manager.path());
                self.program_ranges(self.config)?;
                if let Err(e) = self.persist() {
                    warn!("Continuing without a stored configuration: {}", e);
                }
                Ok(false)
            }
            Some(blob) => match self.apply_config(&blob, false) {
                Err(e @ (Error::MalformedConfig(_) | Error::UnknownRangeLabel(_))) => {
                    warn!("Stored configuration rejected, keeping current settings: {}", e);
                    self.program_ranges(self.config)?;
                    Ok(false)
                }
                other => other,
            },
        }
    }

    /// Writes both range registers. If the gyro write fails the accelerometer
    /// register is restored, so readings are always scaled with the range the
    /// device is running at.
    fn program_ranges(&mut self, config: DeviceConfig) -> Result<(), Error> {
        let accel = ConfigRegisters::AccelConfig as u8;
        self.bus
            .write_register(accel, config.accel_range.register_value())
            .map_err(Error::Bus)?;
        if let Err(e) = self.bus.write_register(
            ConfigRegisters::GyroConfig as u8,
            config.gyro_range.register_value(),
        ) {
            match self
                .bus
                .write_register(accel, self.config.accel_range.register_value())
            {
                Ok(()) => warn!("GYRO_CONFIG write failed, accelerometer range restored"),
                Err(rollback) => {
                    error!("Could not restore accelerometer range: {}", rollback);
                    self.config.accel_range = config.accel_range;
                }
            }
            return Err(Error::Bus(e));
        }
        debug!(
            "Ranges set to {} / {}",
            config.accel_range, config.gyro_range
        );
        Ok(())
    }

    fn persist(&mut self) -> Result<(), Error> {
        let blob = self.get_config()?;
        self.manager.save(&mut self.store, &blob)
    }

    /// Current configuration blob. `calibrateNow` always reads false.
    pub fn get_config(&self) -> Result<String, Error> {
        config::serialize(&self.description.name, &self.config)
    }

    /// Applies a configuration blob on top of the current one.
    ///
    /// A rejected blob changes nothing. Once the device (if started) accepts
    /// the new ranges the in-memory configuration is updated, even if
    /// persisting afterwards fails with `PersistError`.
    pub fn set_config(&mut self, blob: &str, persist: bool) -> Result<(), Error> {
        self.apply_config(blob, persist).map(|_| ())
    }

    /// `set_config`, reporting whether `calibrateNow` ran a calibration.
    fn apply_config(&mut self, blob: &str, persist: bool) -> Result<bool, Error> {
        let ConfigUpdate {
            config,
            name,
            calibrate_now,
        } = ConfigUpdate::parse(blob, &self.config)?;

        if self.state.device_ready() {
            self.program_ranges(config)?;
        }
        self.config = config;
        if let Some(name) = name {
            self.description.name = name;
        }

        let calibration = if !calibrate_now {
            Ok(false)
        } else if self.state.device_ready() {
            self.calibrate_gyro().map(|()| true)
        } else {
            warn!("Ignoring calibrateNow, device not started");
            Ok(false)
        };

        let persisted = if persist { self.persist() } else { Ok(()) };
        // save() logs its own failure; a failed calibration is reported first
        let calibrated = calibration?;
        persisted?;
        Ok(calibrated)
    }

    /// Measures the gyro bias at rest and uses it for all later readings.
    pub fn calibrate_gyro(&mut self) -> Result<(), Error> {
        if !self.state.device_ready() {
            return Err(Error::NotReady(self.state));
        }
        self.offsets = self.calibrator.calibrate(&mut self.bus)?;
        Ok(())
    }

    /// Zeroes the angle estimate. The next measurement re-seeds roll and
    /// pitch from the accelerometer.
    pub fn reset_angles(&mut self) {
        self.estimator.reset_angles();
        self.last_update = None;
    }

    /// Reads one sample and updates the angle estimate.
    ///
    /// With `angle_reset` the angles are zeroed after every cycle, so each
    /// reading holds the rotation since the previous one.
    ///
    /// On a bus error the previous reading is kept and `StaleReading` is
    /// returned.
    pub fn take_measurement(&mut self) -> Result<(), Error> {
        if self.state != DriverState::Operational {
            return Err(Error::NotReady(self.state));
        }
        let mut buf = [0u8; MEASUREMENT_LEN];
        if let Err(e) = self
            .bus
            .read_registers(DataRegisters::AccelXoutH as u8, &mut buf)
        {
            warn!("Measurement read failed, keeping previous values: {}", e);
            return Err(Error::StaleReading(e));
        }
        let sample = MeasurementSample::from_bytes(&buf);

        let now = Instant::now();
        let dt = self
            .last_update
            .map_or(0.0, |last| now.duration_since(last).as_secs_f32());
        self.last_update = Some(now);

        self.reading =
            self.estimator
                .update(&sample, self.config.sensitivity(), &self.offsets, dt);

        if self.config.angle_reset {
            self.estimator.zero_angles();
        }
        Ok(())
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn offsets(&self) -> GyroOffsets {
        self.offsets
    }

    pub fn reading(&self) -> &CalibratedReading {
        &self.reading
    }

    pub fn readings(&self) -> [Reading; 15] {
        self.reading.readings()
    }

    pub fn description(&self) -> &SensorDescription {
        &self.description
    }
}

impl<B: RegisterBus, S: ConfigStore> Sensor for Mpu6050Imu<B, S> {
    fn begin(&mut self) -> Result<(), ImuError> {
        Ok(Self::begin(self)?)
    }

    fn get_config(&self) -> Result<String, ImuError> {
        Ok(Self::get_config(self)?)
    }

    fn set_config(&mut self, config: &str, persist: bool) -> Result<(), ImuError> {
        Ok(Self::set_config(self, config, persist)?)
    }

    fn take_measurement(&mut self) -> Result<(), ImuError> {
        Ok(Self::take_measurement(self)?)
    }

    fn description(&self) -> &SensorDescription {
        &self.description
    }

    fn readings(&self) -> Vec<Reading> {
        self.reading.readings().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::mock::MockBus;
    use crate::range::{AccelRange, GyroRange};
    use approx::assert_relative_eq;
    use imu_traits::MemoryStore;
    use serde_json::Value;
    use std::thread;
    use std::time::{Duration, Instant};

    const PATH: &str = "/settings/sen/MPU6050IMU.json";

    type TestImu = Mpu6050Imu<MockBus, MemoryStore>;

    fn level_bus() -> MockBus {
        let mut bus = MockBus::new();
        bus.set_sample([0, 0, 16384], 0, [0, 0, 0]);
        bus
    }

    fn imu(bus: MockBus, store: MemoryStore) -> TestImu {
        Mpu6050Imu::new(bus, store, Mpu6050Options::new("IMU"))
    }

    fn stored(imu: &TestImu) -> Value {
        serde_json::from_str(imu.store.get(PATH).expect("no stored config")).unwrap()
    }

    #[test]
    fn fresh_begin_persists_defaults() {
        let mut imu = imu(level_bus(), MemoryStore::new());
        imu.begin().unwrap();

        assert_eq!(imu.state(), DriverState::Operational);
        assert_eq!(imu.store.writes(), 1);
        let doc = stored(&imu);
        assert_eq!(doc["accelRange"]["current"], "2g");
        assert_eq!(doc["gyroRange"]["current"], "250 deg/s");
        assert_eq!(doc["autoCalibrate"], true);
        assert_eq!(doc["Name"], "IMU");

        assert_eq!(imu.bus.last_write(PowerRegisters::PwrMgmt1 as u8), Some(0x01));
        assert_eq!(imu.bus.last_write(ConfigRegisters::AccelConfig as u8), Some(0x00));
        assert_eq!(imu.bus.last_write(ConfigRegisters::GyroConfig as u8), Some(0x00));
        // WHO_AM_I plus the auto calibration run
        assert_eq!(imu.bus.reads, 1 + DEFAULT_CALIBRATION_SAMPLES);
    }

    #[test]
    fn begin_applies_stored_config() {
        let blob = r#"{"Name":"Arm","autoCalibrate":false,"angleReset":true,
            "accelRange":{"current":"8g"},"gyroRange":{"current":"1000 deg/s"}}"#;
        let mut imu = imu(level_bus(), MemoryStore::new().with_blob(PATH, blob));
        imu.begin().unwrap();

        assert_eq!(
            *imu.config(),
            DeviceConfig {
                auto_calibrate: false,
                angle_reset: true,
                accel_range: AccelRange::G8,
                gyro_range: GyroRange::Dps1000,
            }
        );
        assert_eq!(imu.description().name, "Arm");
        assert_eq!(imu.bus.last_write(ConfigRegisters::AccelConfig as u8), Some(0x10));
        assert_eq!(imu.bus.last_write(ConfigRegisters::GyroConfig as u8), Some(0x10));
        assert_eq!(imu.bus.reads, 1);
        assert_eq!(imu.store.writes(), 0);
    }

    #[test]
    fn begin_keeps_defaults_when_stored_config_is_corrupt() {
        let store = MemoryStore::new().with_blob(PATH, "{not json");
        let mut imu = imu(level_bus(), store);
        imu.begin().unwrap();

        assert_eq!(imu.state(), DriverState::Operational);
        assert_eq!(*imu.config(), DeviceConfig::default());
        assert_eq!(imu.store.get(PATH), Some("{not json"));
    }

    #[test]
    fn begin_tolerates_unwritable_store() {
        let mut store = MemoryStore::new();
        store.set_read_only(true);
        let mut imu = imu(level_bus(), store);
        imu.begin().unwrap();
        assert_eq!(imu.state(), DriverState::Operational);
    }

    #[test]
    fn bus_failure_is_terminal() {
        let mut bus = level_bus();
        bus.fail_open = true;
        let mut imu = imu(bus, MemoryStore::new());

        assert!(matches!(imu.begin(), Err(Error::BusInit(_))));
        assert_eq!(imu.state(), DriverState::Failed);
        assert!(matches!(
            imu.begin(),
            Err(Error::InvalidState(DriverState::Failed))
        ));
        assert!(matches!(imu.take_measurement(), Err(Error::NotReady(_))));
    }

    #[test]
    fn unexpected_device_id_is_not_found() {
        let mut bus = level_bus();
        bus.registers[PowerRegisters::WhoAmI as usize] = 0x00;
        let mut imu = imu(bus, MemoryStore::new());

        assert!(matches!(imu.begin(), Err(Error::DeviceNotFound(_))));
        assert_eq!(imu.state(), DriverState::Failed);
        assert_eq!(imu.store.writes(), 0);
    }

    #[test]
    fn silent_device_is_not_found() {
        let mut bus = level_bus();
        bus.fail_reads_after = Some(0);
        let mut imu = imu(bus, MemoryStore::new());
        assert!(matches!(imu.begin(), Err(Error::DeviceNotFound(_))));
    }

    #[test]
    fn accepts_known_device_variants() {
        for id in [0x68u8, 0x70, 0x72] {
            let mut bus = level_bus();
            bus.registers[PowerRegisters::WhoAmI as usize] = id;
            let mut imu = imu(bus, MemoryStore::new());
            imu.begin().unwrap();
        }
    }

    #[test]
    fn calibration_failure_during_begin_is_fatal() {
        let mut bus = level_bus();
        bus.fail_reads_after = Some(10);
        let mut imu = imu(bus, MemoryStore::new());

        assert!(matches!(imu.begin(), Err(Error::CalibrationFailed(_))));
        assert_eq!(imu.state(), DriverState::Failed);
        assert_eq!(imu.offsets(), GyroOffsets::default());
    }

    #[test]
    fn unknown_range_keeps_previous_config() {
        let mut imu = imu(level_bus(), MemoryStore::new());
        imu.begin().unwrap();
        let writes = imu.store.writes();
        let before = imu.get_config().unwrap();

        let result = imu.set_config(r#"{"accelRange":{"current":"99g"}}"#, true);
        assert!(matches!(result, Err(Error::UnknownRangeLabel(_))));

        assert_eq!(imu.get_config().unwrap(), before);
        let doc: Value = serde_json::from_str(&imu.get_config().unwrap()).unwrap();
        assert_eq!(doc["accelRange"]["current"], "2g");
        assert_eq!(imu.store.writes(), writes);
    }

    #[test]
    fn malformed_blob_keeps_previous_config() {
        let mut imu = imu(level_bus(), MemoryStore::new());
        imu.begin().unwrap();
        let writes_before = imu.bus.writes.len();

        let result = imu.set_config(r#"{"gyroRange":{"current":"500 deg/s"},"angleReset":1}"#, false);
        assert!(matches!(result, Err(Error::MalformedConfig(_))));
        assert_eq!(*imu.config(), DeviceConfig::default());
        assert_eq!(imu.bus.writes.len(), writes_before);
    }

    #[test]
    fn repeated_set_config_without_persist_is_idempotent() {
        let mut imu = imu(level_bus(), MemoryStore::new());
        imu.begin().unwrap();
        let writes = imu.store.writes();
        let blob = r#"{"accelRange":{"current":"4g"},"angleReset":true}"#;

        imu.set_config(blob, false).unwrap();
        let first = *imu.config();
        imu.set_config(blob, false).unwrap();

        assert_eq!(*imu.config(), first);
        assert_eq!(first.accel_range, AccelRange::G4);
        assert!(first.angle_reset);
        assert_eq!(imu.store.writes(), writes);
    }

    #[test]
    fn persisted_set_config_is_written() {
        let mut imu = imu(level_bus(), MemoryStore::new());
        imu.begin().unwrap();

        imu.set_config(r#"{"gyroRange":{"current":"2000 deg/s"}}"#, true)
            .unwrap();
        assert_eq!(stored(&imu)["gyroRange"]["current"], "2000 deg/s");
        assert_eq!(imu.bus.last_write(ConfigRegisters::GyroConfig as u8), Some(0x18));
    }

    #[test]
    fn persist_failure_still_updates_memory() {
        let mut imu = imu(level_bus(), MemoryStore::new());
        imu.begin().unwrap();
        imu.store.set_read_only(true);

        let result = imu.set_config(r#"{"accelRange":{"current":"16g"}}"#, true);
        assert!(matches!(result, Err(Error::PersistError(_))));
        assert_eq!(imu.config().accel_range, AccelRange::G16);
        assert_eq!(stored(&imu)["accelRange"]["current"], "2g");
    }

    #[test]
    fn calibrate_now_runs_once_and_is_not_persisted() {
        let mut bus = level_bus();
        bus.set_sample([0, 0, 16384], 0, [40, -20, 7]);
        let mut imu = imu(bus, MemoryStore::new().with_blob(PATH, r#"{"autoCalibrate":false}"#));
        imu.begin().unwrap();
        assert_eq!(imu.offsets(), GyroOffsets::default());

        imu.set_config(r#"{"calibrateNow":true}"#, true).unwrap();
        assert_eq!(imu.offsets(), GyroOffsets { x: 40.0, y: -20.0, z: 7.0 });
        assert_eq!(stored(&imu)["calibrateNow"], false);
        assert_eq!(stored(&imu)["autoCalibrate"], false);
    }

    #[test]
    fn set_config_before_begin_is_applied_at_begin() {
        let mut imu = imu(level_bus(), MemoryStore::new());
        imu.set_config(r#"{"accelRange":{"current":"8g"},"calibrateNow":true}"#, false)
            .unwrap();
        assert!(imu.bus.writes.is_empty());
        assert_eq!(imu.offsets(), GyroOffsets::default());

        imu.begin().unwrap();
        assert_eq!(imu.bus.last_write(ConfigRegisters::AccelConfig as u8), Some(0x10));
        assert_eq!(stored(&imu)["accelRange"]["current"], "8g");
    }

    #[test]
    fn calibrate_before_begin_is_rejected() {
        let mut imu = imu(level_bus(), MemoryStore::new());
        assert!(matches!(
            imu.calibrate_gyro(),
            Err(Error::NotReady(DriverState::Uninitialized))
        ));
    }

    #[test]
    fn measurement_before_begin_is_rejected() {
        let mut imu = imu(level_bus(), MemoryStore::new());
        assert!(matches!(
            imu.take_measurement(),
            Err(Error::NotReady(DriverState::Uninitialized))
        ));
    }

    #[test]
    fn measurement_is_bias_corrected() {
        let mut bus = MockBus::new();
        bus.set_sample([0, 0, 16384], 680, [50, -20, 10]);
        let mut imu = imu(bus, MemoryStore::new());
        imu.begin().unwrap();
        imu.take_measurement().unwrap();

        let reading = imu.reading();
        assert_relative_eq!(reading.acc_z, 1.0);
        assert_relative_eq!(reading.temp, 38.53, epsilon = 1e-4);
        assert_relative_eq!(reading.gyro_x, 0.0);
        assert_relative_eq!(reading.gyro_y, 0.0);
        assert_relative_eq!(reading.gyro_z, 0.0);
        assert_relative_eq!(reading.angle_x, 0.0);
        assert_relative_eq!(reading.angle_y, 0.0);

        let readings = imu.readings();
        assert_eq!(readings.len(), 15);
        assert_eq!(readings[2].name, "accZ");
        assert_relative_eq!(readings[2].value, 1.0);
    }

    #[test]
    fn failed_read_keeps_previous_reading() {
        let mut imu = imu(level_bus(), MemoryStore::new());
        imu.begin().unwrap();
        imu.take_measurement().unwrap();
        let before = *imu.reading();

        imu.bus.set_sample([16384, 0, 0], 0, [0, 0, 0]);
        imu.bus.fail_reads_after = Some(imu.bus.reads);
        assert!(matches!(imu.take_measurement(), Err(Error::StaleReading(_))));
        assert_eq!(*imu.reading(), before);
    }

    #[test]
    fn continuous_mode_accumulates_angles() {
        let store = MemoryStore::new().with_blob(PATH, r#"{"autoCalibrate":false}"#);
        let mut bus = level_bus();
        bus.set_sample([0, 0, 16384], 0, [1310, 0, 1310]);
        let mut imu = imu(bus, store);
        imu.begin().unwrap();

        imu.take_measurement().unwrap();
        assert_eq!(imu.reading().angle_gyro_x, 0.0);
        thread::sleep(Duration::from_millis(5));
        imu.take_measurement().unwrap();
        assert!(imu.reading().angle_gyro_x > 0.0);
        assert!(imu.reading().angle_z > 0.0);
    }

    #[test]
    fn angle_reset_mode_reports_rotation_since_previous_sample() {
        let store = MemoryStore::new()
            .with_blob(PATH, r#"{"autoCalibrate":false,"angleReset":true}"#);
        let mut bus = level_bus();
        // 10 deg/s about every axis
        bus.set_sample([0, 0, 16384], 0, [1310, 1310, 1310]);
        let mut imu = imu(bus, store);
        imu.begin().unwrap();

        let mut before = Instant::now();
        imu.take_measurement().unwrap();
        assert_eq!(imu.reading().angle_gyro_x, 0.0);

        for _ in 0..3 {
            thread::sleep(Duration::from_millis(20));
            let next = Instant::now();
            imu.take_measurement().unwrap();
            let upper = before.elapsed().as_secs_f32();

            let reading = imu.reading();
            assert_relative_eq!(reading.gyro_x, 10.0);
            // Integrated over one interval only, never accumulated
            for angle in [reading.angle_gyro_x, reading.angle_gyro_y, reading.angle_gyro_z] {
                assert!(angle >= 10.0 * 0.020 - 1e-4, "angle {}", angle);
                assert!(angle <= 10.0 * upper + 1e-4, "angle {}", angle);
            }
            assert_eq!(reading.angle_z, reading.angle_gyro_z);
            assert!(reading.angle_x > 0.0);
            before = next;
        }
    }

    #[test]
    fn failed_gyro_range_write_restores_accel_range() {
        let mut imu = imu(level_bus(), MemoryStore::new());
        imu.begin().unwrap();
        imu.bus.fail_writes_to.push(ConfigRegisters::GyroConfig as u8);

        let result = imu.set_config(
            r#"{"accelRange":{"current":"16g"},"gyroRange":{"current":"2000 deg/s"}}"#,
            false,
        );
        assert!(matches!(result, Err(Error::Bus(_))));
        assert_eq!(*imu.config(), DeviceConfig::default());
        assert_eq!(imu.bus.registers[ConfigRegisters::AccelConfig as usize], 0x00);

        imu.take_measurement().unwrap();
        assert_relative_eq!(imu.reading().acc_z, 1.0);
    }

    #[test]
    fn unrestorable_accel_range_is_committed() {
        let mut imu = imu(level_bus(), MemoryStore::new());
        imu.begin().unwrap();
        // ACCEL_CONFIG goes through, then the bus drops out
        imu.bus.fail_writes_after = Some(imu.bus.writes.len() + 1);

        let result = imu.set_config(
            r#"{"accelRange":{"current":"16g"},"gyroRange":{"current":"2000 deg/s"}}"#,
            false,
        );
        assert!(matches!(result, Err(Error::Bus(_))));
        assert_eq!(imu.config().accel_range, AccelRange::G16);
        assert_eq!(imu.config().gyro_range, GyroRange::Dps250);
        assert_eq!(imu.bus.registers[ConfigRegisters::AccelConfig as usize], 0x18);

        // Raw 16384 at 16g is 8 g
        imu.take_measurement().unwrap();
        assert_relative_eq!(imu.reading().acc_z, 8.0);
    }

    #[test]
    fn calibration_failure_is_reported_over_persist_failure() {
        let mut imu = imu(level_bus(), MemoryStore::new());
        imu.begin().unwrap();
        imu.store.set_read_only(true);
        imu.bus.fail_reads_after = Some(imu.bus.reads);

        let result = imu.set_config(r#"{"calibrateNow":true,"angleReset":true}"#, true);
        assert!(matches!(result, Err(Error::CalibrationFailed(_))));
        assert!(imu.config().angle_reset);
    }

    #[test]
    fn stored_calibrate_now_calibrates_once_at_begin() {
        let store = MemoryStore::new().with_blob(PATH, r#"{"calibrateNow":true}"#);
        let mut imu = imu(level_bus(), store);
        imu.begin().unwrap();

        assert!(imu.config().auto_calibrate);
        assert_eq!(imu.bus.reads, 1 + DEFAULT_CALIBRATION_SAMPLES);
    }

    #[test]
    fn description_lists_every_reading() {
        let mut imu = imu(level_bus(), MemoryStore::new());
        imu.begin().unwrap();
        let description = imu.description();
        assert_eq!(description.kind, "Motion Sensor");
        assert_eq!(description.parameter_quantity(), 15);
        for (reading, (name, unit)) in imu.readings().iter().zip(&description.parameters) {
            assert_eq!(reading.name, *name);
            assert_eq!(reading.unit, *unit);
        }
    }

    #[test]
    fn usable_through_sensor_trait() {
        let mut sensor: Box<dyn Sensor> = Box::new(imu(level_bus(), MemoryStore::new()));
        sensor.begin().unwrap();
        sensor.take_measurement().unwrap();
        assert_eq!(sensor.readings().len(), 15);
        assert!(sensor.get_config().unwrap().contains("\"Name\":\"IMU\""));

        let err = sensor
            .set_config(r#"{"accelRange":{"current":"99g"}}"#, false)
            .unwrap_err();
        assert!(matches!(err, ImuError::ConfigurationError(_)));
        assert!(matches!(sensor.begin(), Err(ImuError::InvalidState(_))));
    }
}
