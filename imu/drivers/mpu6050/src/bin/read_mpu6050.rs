use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Read calibrated MPU6050 samples and angle estimates")]
struct Args {
    /// I2C character device
    #[arg(long, default_value = "/dev/i2c-1")]
    bus: String,

    /// 7-bit device address, decimal or 0x-prefixed hex
    #[arg(long, default_value = "0x68", value_parser = parse_address)]
    address: u16,

    /// Directory holding the settings namespace
    #[arg(long, default_value = ".")]
    settings: String,

    #[arg(long, default_value = "MPU6050")]
    name: String,

    /// Configuration blob applied (and persisted) after startup
    #[arg(long)]
    config: Option<String>,

    /// Gyro samples averaged during calibration
    #[arg(long, default_value_t = 250)]
    samples: usize,

    #[arg(long, default_value_t = 10.0)]
    rate_hz: f32,
}

fn parse_address(value: &str) -> Result<u16, String> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed.map_err(|e| format!("invalid address {:?}: {}", value, e))
}

#[cfg(target_os = "linux")]
fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    use linux_mpu6050::{Mpu6050Imu, Mpu6050Options};
    use std::thread;
    use std::time::Duration;
    use tracing::{info, warn};

    let options = Mpu6050Options::new(&args.name).calibration_samples(args.samples);
    let mut imu = Mpu6050Imu::linux(&args.bus, args.address, &args.settings, options);
    imu.begin()?;
    info!("Configuration: {}", imu.get_config()?);

    if let Some(blob) = &args.config {
        imu.set_config(blob, true)?;
        info!("Applied configuration: {}", imu.get_config()?);
    }

    let period = Duration::from_secs_f32(1.0 / args.rate_hz.max(0.1));
    loop {
        match imu.take_measurement() {
            Ok(()) => {
                let r = imu.reading();
                println!(
                    "acc:   x: {: >10.3} y: {: >10.3} z: {: >10.3}\n\
                     gyro:  x: {: >10.3} y: {: >10.3} z: {: >10.3}\n\
                     angle: x: {: >10.3} y: {: >10.3} z: {: >10.3}\n\
                     temp:  {: >10.3}\n",
                    r.acc_x,
                    r.acc_y,
                    r.acc_z,
                    r.gyro_x,
                    r.gyro_y,
                    r.gyro_z,
                    r.angle_x,
                    r.angle_y,
                    r.angle_z,
                    r.temp,
                );
            }
            Err(e) => warn!("Error reading IMU data: {}", e),
        }
        thread::sleep(period);
    }
}

#[cfg(not(target_os = "linux"))]
fn run(_args: Args) -> Result<(), Box<dyn std::error::Error>> {
    Err(format!("Unsupported OS: {}", std::env::consts::OS).into())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    if let Err(e) = run(args) {
        error!("{}", e);
        std::process::exit(1);
    }
}
