use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use color_eyre::eyre::{Result, WrapErr};
use linux_embedded_hal::{Delay, I2cdev};
use tracing::{debug, error, info, warn};

use air_sensors::drivers::{ccs811, htu21d, k30, sgp30};
use air_sensors::{Ccs811, Compensated, Driver, FileExchange, Htu21d, InitError, Sgp30, K30};

#[derive(Parser, Debug)]
#[command(name = "air sensors")]
#[command(version = "1.0")]
#[command(about = "polls one i2c environmental sensor and publishes its readings")]
struct Cli {
    #[command(subcommand)]
    sensor: Sensor,

    /// i2c bus the sensor is attached to
    #[arg(long, default_value = "/dev/i2c-1", global = true)]
    bus: PathBuf,

    /// readings are published as `<state-dir>/<name>/<metric>`
    #[arg(long, default_value = "/tmp", global = true)]
    state_dir: PathBuf,
}

#[derive(clap::Args, Debug)]
struct Common {
    /// name to publish under, defaults to the sensor type
    #[arg(long)]
    name: Option<String>,

    /// 7-bit address, decimal or 0x prefixed hex
    #[arg(long, value_parser = parse_address)]
    address: Option<u8>,

    /// seconds between polls
    #[arg(long)]
    interval: Option<u64>,
}

#[derive(clap::Args, Debug)]
struct Compensation {
    /// name of the climate sensor to take compensation values from
    #[arg(long, default_value = "HTU21D")]
    climate_source: String,

    /// seconds between compensation samples
    #[arg(long, default_value_t = 60)]
    comp_interval: u64,

    /// write the baseline persisted by an earlier run back to the sensor
    #[arg(long)]
    restore_baseline: bool,
}

#[derive(clap::Subcommand, Debug)]
enum Sensor {
    /// AMS CCS811 tVOC sensor
    Ccs811 {
        #[command(flatten)]
        common: Common,
        #[command(flatten)]
        compensation: Compensation,
    },
    /// HTU21D temperature and humidity sensor
    Htu21d {
        #[command(flatten)]
        common: Common,
    },
    /// K30 co2 sensor
    K30 {
        #[command(flatten)]
        common: Common,
    },
    /// Sensirion SGP30 tVOC sensor
    Sgp30 {
        #[command(flatten)]
        common: Common,
        #[command(flatten)]
        compensation: Compensation,
        /// also sample the raw H2 and ethanol signals
        #[arg(long)]
        raw: bool,
    },
}

fn parse_address(arg: &str) -> Result<u8, String> {
    let parsed = match arg.strip_prefix("0x") {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => arg.parse(),
    };
    match parsed {
        Ok(address) if address < 0x80 => Ok(address),
        Ok(address) => Err(format!("{address:#04x} is not a 7-bit address")),
        Err(e) => Err(e.to_string()),
    }
}

fn main() -> Result<ExitCode> {
    color_eyre::install()?;
    logger::setup();
    let cli = Cli::parse();
    info!("started air-sensors, args: {cli:?}");

    let i2c = I2cdev::new(&cli.bus)
        .wrap_err_with(|| format!("Could not open i2c bus: {}", cli.bus.display()))?;
    let exchange = FileExchange::new(&cli.state_dir);

    match cli.sensor {
        Sensor::Ccs811 {
            common,
            compensation,
        } => {
            let mut sensor = Ccs811::new(i2c, Delay, exchange.clone())
                .with_name(common.name(ccs811::DEFAULT_NAME))
                .with_address(common.address.unwrap_or(ccs811::ADDRESS))
                .with_climate_source(&compensation.climate_source);
            prepare(&exchange, &sensor)?;
            if let Err(e) = sensor.init() {
                return Ok(exit(e));
            }
            if compensation.restore_baseline {
                match sensor.persisted_baseline() {
                    Some(baseline) => log_restore(sensor.restore_baseline(baseline)),
                    None => warn!("no persisted baseline to restore"),
                }
            }
            let cadence = Cadence::new(common.interval.unwrap_or(1))
                .with_comp(compensation.comp_interval);
            run(cadence, |work| match work {
                Work::Task => {
                    let tvoc = sensor.task();
                    debug!("tvoc: {tvoc}");
                }
                Work::Comp => sensor.comp_task(),
            })
        }
        Sensor::Htu21d { common } => {
            let mut sensor = Htu21d::new(i2c, Delay, exchange.clone())
                .with_name(common.name(htu21d::DEFAULT_NAME))
                .with_address(common.address.unwrap_or(htu21d::ADDRESS));
            prepare(&exchange, &sensor)?;
            if let Err(e) = sensor.init() {
                return Ok(exit(e));
            }
            run(Cadence::new(common.interval.unwrap_or(20)), |_| {
                let report = sensor.task();
                debug!("{report:?}");
            })
        }
        Sensor::K30 { common } => {
            let mut sensor = K30::new(i2c, Delay, exchange.clone())
                .with_name(common.name(k30::DEFAULT_NAME))
                .with_address(common.address.unwrap_or(k30::ADDRESS));
            prepare(&exchange, &sensor)?;
            if let Err(e) = sensor.init() {
                return Ok(exit(e));
            }
            run(Cadence::new(common.interval.unwrap_or(20)), |_| {
                let co2 = sensor.task();
                debug!("co2: {co2}");
            })
        }
        Sensor::Sgp30 {
            common,
            compensation,
            raw,
        } => {
            let mut sensor = Sgp30::new(i2c, Delay, exchange.clone())
                .with_name(common.name(sgp30::DEFAULT_NAME))
                .with_address(common.address.unwrap_or(sgp30::ADDRESS))
                .with_climate_source(&compensation.climate_source);
            prepare(&exchange, &sensor)?;
            if let Err(e) = sensor.init() {
                return Ok(exit(e));
            }
            if compensation.restore_baseline {
                match sensor.persisted_baselines() {
                    Some((eco2, tvoc)) => log_restore(sensor.restore_baseline(eco2, tvoc)),
                    None => warn!("no persisted baselines to restore"),
                }
            }
            let cadence = Cadence::new(common.interval.unwrap_or(1))
                .with_comp(compensation.comp_interval);
            run(cadence, |work| match work {
                Work::Task => {
                    let tvoc = sensor.task();
                    debug!("tvoc: {tvoc}");
                    if raw {
                        let reading = sensor.raw_task();
                        debug!("{reading:?}");
                    }
                }
                Work::Comp => sensor.comp_task(),
            })
        }
    }
}

impl Common {
    fn name<'a>(&'a self, default: &'a str) -> &'a str {
        self.name.as_deref().unwrap_or(default)
    }
}

fn prepare(exchange: &FileExchange, sensor: &impl Driver) -> Result<()> {
    exchange
        .create_device_dir(sensor.name())
        .wrap_err("Could not set up the state directory")
}

fn exit(err: InitError) -> ExitCode {
    error!("giving up: {err}");
    ExitCode::from(err.exit_code())
}

fn log_restore(res: Result<(), air_sensors::Error>) {
    if let Err(e) = res {
        warn!("could not restore baseline: {e}");
    }
}

enum Work {
    Task,
    Comp,
}

struct Cadence {
    interval: Duration,
    comp_interval: Option<Duration>,
}

impl Cadence {
    fn new(interval_secs: u64) -> Self {
        Self {
            interval: Duration::from_secs(interval_secs.max(1)),
            comp_interval: None,
        }
    }

    fn with_comp(mut self, interval_secs: u64) -> Self {
        self.comp_interval = Some(Duration::from_secs(interval_secs.max(1)));
        self
    }
}

/// Runs the driver forever. Deadlines advance by a fixed step so a slow
/// cycle does not shift the ones after it.
fn run(cadence: Cadence, mut step: impl FnMut(Work)) -> ! {
    let start = Instant::now();
    let mut next_task = start;
    let mut next_comp = cadence.comp_interval.map(|i| start + i);

    loop {
        let now = Instant::now();
        if now >= next_task {
            step(Work::Task);
            next_task += cadence.interval;
        }
        if let (Some(deadline), Some(interval)) = (next_comp.as_mut(), cadence.comp_interval) {
            if now >= *deadline {
                step(Work::Comp);
                *deadline += interval;
            }
        }

        let next = next_comp.map_or(next_task, |comp| comp.min(next_task));
        thread::sleep(next.saturating_duration_since(Instant::now()));
    }
}
