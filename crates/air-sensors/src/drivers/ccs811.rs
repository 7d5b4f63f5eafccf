//! AMS CCS811 metal oxide gas sensor, reports tVOC and eCO2.
//!
//! Measures once a second. Environmental compensation is taken from the
//! temperature and relative humidity a climate driver publishes.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::{ErrorKind, I2c};
use tracing::{debug, info, warn};

use crate::average::MovingAverage;
use crate::baseline::BaselineTracker;
use crate::bus::Device;
use crate::compensation::{Climate, CompensationAccumulator, Sample};
use crate::drivers::{Compensated, Driver, Lifecycle, Publisher};
use crate::errors::{Error, InitError};
use crate::exchange::{Metric, StateExchange, Value};
use crate::{SensorState, SENTINEL};

pub const ADDRESS: u8 = 0x5A;
pub const DEFAULT_NAME: &str = "CCS811";
pub const CLIMATE_SOURCE: &str = "HTU21D";

mod reg {
    pub const STATUS: u8 = 0x00;
    pub const MEAS_MODE: u8 = 0x01;
    pub const ALG_RESULT: u8 = 0x02;
    pub const ENV_DATA: u8 = 0x05;
    pub const BASELINE: u8 = 0x11;
    pub const HW_ID: u8 = 0x20;
    pub const HW_VERSION: u8 = 0x21;
    pub const FW_APP_VERSION: u8 = 0x24;
    pub const ERROR_ID: u8 = 0xE0;
    pub const APP_START: u8 = 0xF4;
}

mod status {
    pub const DATA_READY: u8 = 0x08;
    pub const APP_VALID: u8 = 0x10;
}

/// Constant power, a new measurement every second, no interrupts
const MEAS_MODE_1S: u8 = 0x10;
const HW_ID: u8 = 0x81;
/// The sensor can not report more than 1187 ppb
const TVOC_CEILING: u16 = 1200;
const WINDOW: usize = 3;
/// In compensation cycles
const COMP_PERIOD: usize = 5;

/// Environment data register layout: humidity then temperature, both as
/// integer and fraction byte at 1/2 %RH and 1/2 °C resolution. Temperature
/// has a 25 °C offset.
///
/// Per the vendor's application note the fraction bytes are always written
/// as zero.
pub fn encode_environment(climate: Climate) -> [u8; 4] {
    // unsure if the sensor accepts 0 %RH
    let humidity = if climate.humidity < 0.1 {
        0.01
    } else {
        climate.humidity
    };
    let temperature = climate.temperature.max(-25.0);

    let rh = (humidity * 2.0).floor() as i32 as u8;
    let th = ((temperature + 25.0) * 2.0).floor() as i32 as u8;
    [rh, 0x00, th, 0x00]
}

/// Results are eCO2 (2 bytes) followed by tVOC (2 bytes), both big endian.
pub fn decode_tvoc(results: [u8; 4]) -> u16 {
    u16::from_be_bytes([results[2], results[3]])
}

pub fn decode_app_version(bytes: [u8; 2]) -> (u8, u8, u8) {
    (bytes[0] >> 4, bytes[0] & 0x0f, bytes[1])
}

pub struct Ccs811<I2C, D, X> {
    device: Device<I2C>,
    delay: D,
    out: Publisher<X>,
    climate_source: String,
    lifecycle: Lifecycle,
    voc: MovingAverage<WINDOW>,
    baseline: BaselineTracker,
    compensation: CompensationAccumulator<Climate, COMP_PERIOD>,
}

impl<I2C, D, X> Ccs811<I2C, D, X>
where
    I2C: I2c,
    D: DelayNs,
    X: StateExchange,
{
    pub fn new(i2c: I2C, delay: D, exchange: X) -> Self {
        Self {
            device: Device::new(i2c, ADDRESS),
            delay,
            out: Publisher::new(exchange, DEFAULT_NAME),
            climate_source: CLIMATE_SOURCE.to_owned(),
            lifecycle: Lifecycle::new(),
            voc: MovingAverage::new(0.0),
            baseline: BaselineTracker::new(),
            compensation: CompensationAccumulator::new(Climate::DEFAULT),
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.out.rename(name);
        self
    }

    pub fn with_address(mut self, address: u8) -> Self {
        let i2c = self.device.release();
        self.device = Device::new(i2c, address);
        self
    }

    /// The driver whose temperature and humidity we compensate with
    pub fn with_climate_source(mut self, name: &str) -> Self {
        self.climate_source = name.to_owned();
        self
    }

    pub fn average_voc(&self) -> f32 {
        self.voc.average()
    }

    fn init_steps(&mut self) -> Result<(), InitError> {
        if let Some(persisted) = self.out.own_u16(Metric::Baseline) {
            debug!("last persisted baseline: {persisted:#06x}");
            self.baseline = BaselineTracker::starting_from(persisted);
        }

        let status = self.device.read_register(reg::STATUS)?;
        debug!("status reg: {status:#04x}");
        if status & status::APP_VALID == 0 {
            return Err(InitError::AppInvalid { status });
        }
        self.device.write(&[reg::APP_START])?;
        info!("starting application");
        self.delay.delay_ms(1000);

        self.device.write_register(reg::MEAS_MODE, &[MEAS_MODE_1S])?;
        let error = self.device.read_register(reg::ERROR_ID)?;
        if error != 0 {
            return Err(InitError::ErrorAfterMeasureMode { error });
        }

        let hw_id = self.device.read_register(reg::HW_ID)?;
        if hw_id != HW_ID {
            return Err(InitError::HardwareId {
                expected: HW_ID,
                got: hw_id,
            });
        }
        let hw_version = self.device.read_register(reg::HW_VERSION)?;
        let (major, minor, trivial) =
            decode_app_version(self.device.read_registers(reg::FW_APP_VERSION)?);
        info!("hw version: {hw_version:#04x}, app version: {major}.{minor}.{trivial}");

        let error = self.device.read_register(reg::ERROR_ID)?;
        if error != 0 {
            return Err(InitError::ErrorAfterInfo { error });
        }

        self.write_compensation(Climate::DEFAULT)?;
        Ok(())
    }

    /// Writes the environment data register
    pub fn compensation_write(&mut self, climate: Climate) -> Result<(), Error> {
        self.lifecycle.ensure_ready()?;
        self.write_compensation(climate)?;
        Ok(())
    }

    fn write_compensation(&mut self, climate: Climate) -> Result<(), ErrorKind> {
        let bytes = encode_environment(climate);
        info!(
            "set compensation T: {:.1} RH: {:.1}, regs: {bytes:02x?}",
            climate.temperature, climate.humidity
        );
        self.device.write_register(reg::ENV_DATA, &bytes)
    }

    /// Restores a baseline saved by an earlier run, shortening the time
    /// the sensor needs to settle.
    pub fn restore_baseline(&mut self, baseline: u16) -> Result<(), Error> {
        self.lifecycle.ensure_ready()?;
        self.device
            .write_register(reg::BASELINE, &baseline.to_be_bytes())?;
        self.baseline = BaselineTracker::starting_from(baseline);
        info!("restored baseline: {baseline:#06x}");
        Ok(())
    }

    pub fn persisted_baseline(&self) -> Option<u16> {
        self.out.own_u16(Metric::Baseline)
    }

    /// Returns the latest (not averaged) tVOC in ppb.
    pub fn try_task(&mut self) -> Result<u16, Error> {
        self.lifecycle.ensure_ready()?;

        let status = self.device.read_register(reg::STATUS)?;
        if status & status::DATA_READY == 0 {
            return Err(Error::NotReady);
        }

        let results = self.device.read_registers(reg::ALG_RESULT)?;
        let tvoc = decode_tvoc(results);
        if tvoc >= TVOC_CEILING {
            return Err(Error::OutOfRange {
                metric: Metric::Voc,
                value: tvoc.into(),
            });
        }

        self.voc.push(tvoc.into());
        let average = self.voc.average().round() as i64;
        debug!("tvoc: {tvoc}, average: {average}");
        self.out.publish(Metric::Voc, Value::Integer(average));

        self.track_baseline();
        self.check_error_register();
        Ok(tvoc)
    }

    fn track_baseline(&mut self) {
        let device = &mut self.device;
        let res = self
            .baseline
            .poll(|| device.read_registers(reg::BASELINE).map(u16::from_be_bytes))
            .map_err(Error::from);
        if let Some(Some(baseline)) = self.out.report("baseline poll", res) {
            info!("new baseline: {baseline:#06x}");
            self.out.publish(Metric::Baseline, Value::Hex16(baseline));
        }
    }

    fn check_error_register(&mut self) {
        let res = self.device.read_register(reg::ERROR_ID).map_err(Error::from);
        match self.out.report("error register read", res) {
            Some(0) | None => (),
            Some(error) => {
                warn!("error register: {error:#04x}");
                self.out.publish(Metric::ErrorCode, Value::Hex8(error));
            }
        }
    }

    /// Returns the mean written to the sensor if this cycle completed a
    /// compensation period.
    pub fn try_comp_task(&mut self) -> Result<Option<Climate>, Error> {
        self.lifecycle.ensure_ready()?;

        let climate = Climate {
            temperature: self.out.fetch(&self.climate_source, Metric::Temperature)?,
            humidity: self.out.fetch(&self.climate_source, Metric::Humidity)?,
        };
        if !climate.is_plausible() {
            let (metric, value) = if climate.temperature >= 40.0 {
                (Metric::Temperature, climate.temperature)
            } else {
                (Metric::Humidity, climate.humidity)
            };
            return Err(Error::OutOfRange { metric, value });
        }

        debug!(
            "comp sample T: {:.1} RH: {:.1}",
            climate.temperature, climate.humidity
        );
        let Some(mean) = self.compensation.record(climate) else {
            return Ok(None);
        };
        self.compensation_write(mean)?;
        Ok(Some(mean))
    }
}

impl<I2C, D, X> Driver for Ccs811<I2C, D, X>
where
    I2C: I2c,
    D: DelayNs,
    X: StateExchange,
{
    type Output = u32;

    fn init(&mut self) -> Result<(), InitError> {
        self.lifecycle.begin()?;
        let res = self.init_steps();
        self.lifecycle.finish(&self.out.name, res)
    }

    fn task(&mut self) -> u32 {
        let res = self.try_task();
        self.out
            .report("task", res)
            .map(u32::from)
            .unwrap_or(SENTINEL)
    }

    fn state(&self) -> SensorState {
        self.lifecycle.state()
    }

    fn name(&self) -> &str {
        &self.out.name
    }
}

impl<I2C, D, X> Compensated for Ccs811<I2C, D, X>
where
    I2C: I2c,
    D: DelayNs,
    X: StateExchange,
{
    fn comp_task(&mut self) {
        let res = self.try_comp_task();
        self.out.report("comp_task", res);
    }
}
