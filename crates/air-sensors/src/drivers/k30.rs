//! CO2 Meter K30 NDIR co2 sensor. Polled every 20 seconds, 3 samples make
//! up a one minute average.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use tracing::debug;

use crate::average::MovingAverage;
use crate::bus::Device;
use crate::drivers::{Driver, Lifecycle, Publisher};
use crate::errors::{Error, InitError};
use crate::exchange::{Metric, StateExchange, Value};
use crate::{SensorState, SENTINEL};

pub const ADDRESS: u8 = 0x68;
pub const DEFAULT_NAME: &str = "K30";

const READ_RAM: u8 = 0x22;
const FILLER: u8 = 0x00;
const CO2_ADDRESS: u8 = 0x08;

const WINDOW: usize = 3;
/// ppm, the sensor reports a signed 16 bit value
const PLAUSIBLE: std::ops::Range<u16> = 100..32767;
const OUTDOOR_CO2: f32 = 400.0;

pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |sum, b| sum.wrapping_add(*b))
}

/// Read two bytes from RAM address 0x08, the co2 value
pub fn read_co2_command() -> [u8; 4] {
    let head = [READ_RAM, FILLER, CO2_ADDRESS];
    [head[0], head[1], head[2], checksum(&head)]
}

/// Validates the trailing checksum, returns co2 in ppm
pub fn decode_response(response: [u8; 4]) -> Result<u16, Error> {
    let expected = checksum(&response[..3]);
    if expected != response[3] {
        return Err(Error::Checksum {
            expected,
            got: response[3],
        });
    }
    Ok(u16::from_be_bytes([response[1], response[2]]))
}

pub struct K30<I2C, D, X> {
    device: Device<I2C>,
    delay: D,
    out: Publisher<X>,
    lifecycle: Lifecycle,
    co2: MovingAverage<WINDOW>,
}

impl<I2C, D, X> K30<I2C, D, X>
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
            co2: MovingAverage::new(OUTDOOR_CO2),
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

    pub fn average_co2(&self) -> f32 {
        self.co2.average()
    }

    /// Returns the latest co2 reading in ppm
    pub fn try_task(&mut self) -> Result<u16, Error> {
        self.lifecycle.ensure_ready()?;

        self.device.write(&read_co2_command())?;
        self.delay.delay_ms(20);
        let response = self.device.read()?;
        debug!("response: {response:02x?}");

        let co2 = decode_response(response)?;
        if !PLAUSIBLE.contains(&co2) {
            return Err(Error::OutOfRange {
                metric: Metric::Co2,
                value: co2.into(),
            });
        }

        self.co2.push(co2.into());
        let average = self.co2.average().round() as i64;
        debug!("co2: {co2}, average: {average}");
        self.out.publish(Metric::Co2, Value::Integer(average));
        Ok(co2)
    }
}

impl<I2C, D, X> Driver for K30<I2C, D, X>
where
    I2C: I2c,
    D: DelayNs,
    X: StateExchange,
{
    type Output = u32;

    /// The K30 needs no setup
    fn init(&mut self) -> Result<(), InitError> {
        self.lifecycle.begin()?;
        self.lifecycle.finish(&self.out.name, Ok(()))
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
