//! Measurement Specialties HTU21D temperature and humidity sensor.
//!
//! Polled every 20 seconds, keeps a one minute moving average of both and
//! derives dew point and absolute humidity from those. The gas sensors
//! read what this driver publishes for their compensation.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use tracing::{debug, info, trace};

use crate::average::MovingAverage;
use crate::bus::Device;
use crate::compensation::Climate;
use crate::drivers::{Driver, Lifecycle, Publisher};
use crate::errors::{Error, InitError};
use crate::exchange::{Metric, StateExchange, Value};
use crate::frame::Seed;
use crate::{SensorState, SENTINEL};

pub const ADDRESS: u8 = 0x40;
pub const DEFAULT_NAME: &str = "HTU21D";

mod cmd {
    pub const TEMPERATURE_HOLD: u8 = 0xE3;
    pub const HUMIDITY_HOLD: u8 = 0xE5;
    pub const READ_USER_REG: u8 = 0xE7;
    pub const SOFT_RESET: u8 = 0xFE;
}

/// The two lowest bits of a measurement are status bits
const STATUS_BITS: u8 = 0b0000_0011;
const WINDOW: usize = 3;
const SEED: Seed = Seed::Zero;

/// Strips the status bits from a measurement word
pub fn raw_measurement(payload: [u8; 2]) -> u16 {
    u16::from_be_bytes([payload[0], payload[1] & !STATUS_BITS])
}

/// Datasheet: temperature conversion, °C
pub fn temperature(raw: u16) -> f32 {
    (175.72 * f32::from(raw)) / 65536.0 - 46.86
}

/// Datasheet: relative humidity conversion, clipped to the physical range
pub fn relative_humidity(raw: u16) -> f32 {
    let rh = (125.0 * f32::from(raw)) / 65536.0 - 6.0;
    rh.clamp(0.0, 100.0)
}

/// Corrects the humidity for the temperature dependency of the sensor
/// (-0.15 %RH/°C away from 25 °C)
pub fn compensate_humidity(rh: f32, temperature: f32) -> f32 {
    rh + (25.0 - temperature) * -0.15
}

/// Datasheet: partial pressure and dew point, °C
pub fn dew_point(temperature: f32, rh: f32) -> f32 {
    const A: f32 = 8.1332;
    const B: f32 = 1762.39;
    const C: f32 = 235.66;

    // log of zero
    let rh = rh.max(0.1);
    let partial_pressure = 10f32.powf(A - B / (temperature + C));
    -(B / ((rh * partial_pressure / 100.0).log10() - A) + C)
}

/// g/m³
pub fn absolute_humidity(temperature: f32, rh: f32) -> f32 {
    let saturation = (17.67 * temperature / (temperature + 243.5)).exp();
    13.2473 * saturation * rh / (273.15 + temperature)
}

/// Result of one polling cycle, every field is [`SENTINEL`] if it
/// could not be determined this cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClimateReport {
    pub temperature: f32,
    pub humidity: f32,
    pub dew_point: f32,
    pub absolute_humidity: f32,
}

impl ClimateReport {
    pub const NOTHING: Self = Self {
        temperature: SENTINEL as f32,
        humidity: SENTINEL as f32,
        dew_point: SENTINEL as f32,
        absolute_humidity: SENTINEL as f32,
    };
}

pub struct Htu21d<I2C, D, X> {
    device: Device<I2C>,
    delay: D,
    out: Publisher<X>,
    lifecycle: Lifecycle,
    temperature: MovingAverage<WINDOW>,
    humidity: MovingAverage<WINDOW>,
}

impl<I2C, D, X> Htu21d<I2C, D, X>
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
            lifecycle: Lifecycle::new(),
            temperature: MovingAverage::new(Climate::DEFAULT.temperature),
            humidity: MovingAverage::new(Climate::DEFAULT.humidity),
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

    /// Smoothed temperature and humidity
    pub fn average(&self) -> Climate {
        Climate {
            temperature: self.temperature.average(),
            humidity: self.humidity.average(),
        }
    }

    fn init_steps(&mut self) -> Result<(), InitError> {
        self.device
            .write(&[cmd::SOFT_RESET])
            .map_err(InitError::SoftReset)?;
        self.delay.delay_ms(15);

        let user_reg = self.device.read_register(cmd::READ_USER_REG)?;
        info!("user register: {user_reg:#04x}");
        Ok(())
    }

    fn measure(&mut self, command: u8) -> Result<u16, Error> {
        let frame: [u8; 3] = self.device.read_registers(command)?;
        trace!("command {command:#04x} returned {frame:02x?}");
        let payload = SEED.validate(&frame)?;
        Ok(raw_measurement([payload[0], payload[1]]))
    }

    pub fn measure_temperature(&mut self) -> Result<f32, Error> {
        self.lifecycle.ensure_ready()?;
        self.measure(cmd::TEMPERATURE_HOLD).map(temperature)
    }

    /// Returns the temperature compensated humidity
    pub fn measure_humidity(&mut self, temperature: f32) -> Result<f32, Error> {
        self.lifecycle.ensure_ready()?;
        let rh = self.measure(cmd::HUMIDITY_HOLD).map(relative_humidity)?;
        Ok(compensate_humidity(rh, temperature))
    }
}

impl<I2C, D, X> Driver for Htu21d<I2C, D, X>
where
    I2C: I2c,
    D: DelayNs,
    X: StateExchange,
{
    type Output = ClimateReport;

    fn init(&mut self) -> Result<(), InitError> {
        self.lifecycle.begin()?;
        let res = self.init_steps();
        self.lifecycle.finish(&self.out.name, res)
    }

    fn task(&mut self) -> ClimateReport {
        let mut report = ClimateReport::NOTHING;

        let res = self.measure_temperature();
        let temperature = self.out.report("temperature", res);
        if let Some(t) = temperature {
            self.temperature.push(t);
            report.temperature = t;
            let average = self.temperature.average();
            self.out.publish(Metric::Temperature, Value::Decimal(average));
        }

        let reference = temperature.unwrap_or_else(|| self.temperature.average());
        let res = self.measure_humidity(reference);
        let humidity = self.out.report("humidity", res);
        if let Some(rh) = humidity {
            self.humidity.push(rh);
            report.humidity = rh;
            let average = self.humidity.average();
            self.out.publish(Metric::Humidity, Value::Decimal(average));
        }

        if temperature.is_some() && humidity.is_some() {
            let Climate {
                temperature,
                humidity,
            } = self.average();
            report.dew_point = dew_point(temperature, humidity);
            report.absolute_humidity = absolute_humidity(temperature, humidity);
            self.out
                .publish(Metric::DewPoint, Value::Decimal(report.dew_point));
            self.out.publish(
                Metric::AbsoluteHumidity,
                Value::Decimal(report.absolute_humidity),
            );
            debug!(
                "T: {temperature:.1} RH: {humidity:.1} Tdew: {:.1} AH: {:.1}",
                report.dew_point, report.absolute_humidity
            );
        }

        report
    }

    fn state(&self) -> SensorState {
        self.lifecycle.state()
    }

    fn name(&self) -> &str {
        &self.out.name
    }
}
