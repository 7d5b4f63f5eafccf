//! Sensirion SGP30 metal oxide gas sensor, we only use its tVOC output.
//!
//! Every command is two bytes, the answer is read after a fixed wait as a
//! series of big endian words each followed by a crc. Humidity compensation
//! uses the absolute humidity a climate driver publishes.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::{ErrorKind, I2c};
use tracing::{debug, info};

use crate::average::MovingAverage;
use crate::baseline::BaselineTracker;
use crate::bus::Device;
use crate::compensation::{AbsoluteHumidity, CompensationAccumulator, Sample};
use crate::drivers::{Compensated, Driver, Lifecycle, Publisher};
use crate::errors::{Error, InitError};
use crate::exchange::{Metric, StateExchange, Value};
use crate::frame::Seed;
use crate::{SensorState, SENTINEL};

pub const ADDRESS: u8 = 0x58;
pub const DEFAULT_NAME: &str = "SGP30";
pub const CLIMATE_SOURCE: &str = "HTU21D";

const MSB: u8 = 0x20;
mod cmd {
    pub const IAQ_INIT: u8 = 0x03;
    pub const MEASURE_IAQ: u8 = 0x08;
    pub const GET_BASELINE: u8 = 0x15;
    pub const SET_BASELINE: u8 = 0x1E;
    pub const SET_HUMIDITY: u8 = 0x61;
    pub const FEATURE_SET: u8 = 0x2F;
    pub const MEASURE_RAW: u8 = 0x50;
}
const SERIAL_ID: [u8; 2] = [0x36, 0x82];

const SEED: Seed = Seed::Ff;
/// one minute at one sample a second
const WINDOW: usize = 60;
/// in accepted samples
const PUBLISH_EVERY: usize = 20;
/// Upper end of the tVOC output range, ppb
const TVOC_CEILING: u16 = 60_000;
/// In compensation cycles
const COMP_PERIOD: usize = 5;
/// Very low (winter) humidity values seem to throw off the baseline
const MIN_HUMIDITY: f32 = 1.0;

/// The humidity the sensor is actually given, never below 1 g/m³
pub fn applied_humidity(ah: AbsoluteHumidity) -> AbsoluteHumidity {
    AbsoluteHumidity(ah.0.max(MIN_HUMIDITY))
}

/// Set absolute humidity command: 8.8 fixed point g/m³ plus crc
pub fn encode_humidity(ah: AbsoluteHumidity) -> [u8; 5] {
    let ah = applied_humidity(ah).0;
    let integer = ah.floor() as u32 as u8;
    let fraction = (ah.fract() * 256.0).floor() as u32 as u8;
    let crc = SEED.checksum(&[integer, fraction]);
    [MSB, cmd::SET_HUMIDITY, integer, fraction, crc]
}

/// Set baseline command. Note the sensor expects tVOC first, the reverse
/// of the order it reports them in.
pub fn encode_baseline(eco2: u16, tvoc: u16) -> [u8; 8] {
    let [t0, t1, t_crc] = SEED.encode_word(tvoc);
    let [c0, c1, c_crc] = SEED.encode_word(eco2);
    [MSB, cmd::SET_BASELINE, t0, t1, t_crc, c0, c1, c_crc]
}

/// Three words, most significant first, making up a 48 bit serial
pub fn decode_serial(frame: [u8; 9]) -> Result<u64, Error> {
    let mut serial = 0u64;
    for word in frame.chunks_exact(3) {
        let word = SEED.word([word[0], word[1], word[2]])?;
        serial = (serial << 16) | u64::from(word);
    }
    Ok(serial)
}

fn words(frame: [u8; 6]) -> ([u8; 3], [u8; 3]) {
    (
        [frame[0], frame[1], frame[2]],
        [frame[3], frame[4], frame[5]],
    )
}

/// Raw signals, [`SENTINEL`] when the frame was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawReading {
    pub h2: u32,
    pub ethanol: u32,
}

impl RawReading {
    pub const NOTHING: Self = Self {
        h2: SENTINEL,
        ethanol: SENTINEL,
    };
}

pub struct Sgp30<I2C, D, X> {
    device: Device<I2C>,
    delay: D,
    out: Publisher<X>,
    climate_source: String,
    lifecycle: Lifecycle,
    voc: MovingAverage<WINDOW>,
    voc_phase: usize,
    h2: MovingAverage<WINDOW>,
    ethanol: MovingAverage<WINDOW>,
    raw_phase: usize,
    eco2_baseline: BaselineTracker,
    tvoc_baseline: BaselineTracker,
    compensation: CompensationAccumulator<AbsoluteHumidity, COMP_PERIOD>,
}

impl<I2C, D, X> Sgp30<I2C, D, X>
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
            voc_phase: 0,
            h2: MovingAverage::new(0.0),
            ethanol: MovingAverage::new(0.0),
            raw_phase: 0,
            eco2_baseline: BaselineTracker::new(),
            tvoc_baseline: BaselineTracker::new(),
            compensation: CompensationAccumulator::new(AbsoluteHumidity::DEFAULT),
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

    /// The driver whose absolute humidity we compensate with
    pub fn with_climate_source(mut self, name: &str) -> Self {
        self.climate_source = name.to_owned();
        self
    }

    pub fn average_voc(&self) -> f32 {
        self.voc.average()
    }

    fn command<const N: usize>(
        &mut self,
        command: [u8; 2],
        wait_ms: u32,
    ) -> Result<[u8; N], ErrorKind> {
        self.device.write(&command)?;
        self.delay.delay_ms(wait_ms);
        self.device.read()
    }

    fn read_serial(&mut self) -> Result<u64, Error> {
        let frame = self.command(SERIAL_ID, 10)?;
        decode_serial(frame)
    }

    /// Returns feature set type and product version
    fn read_version(&mut self) -> Result<(u8, u8), Error> {
        let frame = self.command([MSB, cmd::FEATURE_SET], 10)?;
        let [feature_set, version] = SEED.word(frame)?.to_be_bytes();
        Ok((feature_set, version))
    }

    fn init_steps(&mut self) -> Result<(), InitError> {
        if let Some(eco2) = self.out.own_u16(Metric::BaselineEco2) {
            self.eco2_baseline = BaselineTracker::starting_from(eco2);
        }
        if let Some(tvoc) = self.out.own_u16(Metric::BaselineTvoc) {
            self.tvoc_baseline = BaselineTracker::starting_from(tvoc);
        }

        let serial = self.read_serial().map_err(InitError::SerialId)?;
        info!("serial id: {serial:#014x}");
        self.out
            .publish(Metric::SerialId, Value::Integer(serial as i64));

        let (feature_set, version) = self.read_version().map_err(InitError::Version)?;
        info!("feature set type: {feature_set:#04x}, version: {version:#04x}");
        let version_info = u16::from_be_bytes([feature_set, version]);
        self.out.publish(Metric::Version, Value::Integer(version_info.into()));

        self.device
            .write(&[MSB, cmd::IAQ_INIT])
            .map_err(InitError::AirQualityInit)?;
        self.delay.delay_ms(10);

        self.write_humidity(AbsoluteHumidity::DEFAULT)?;
        Ok(())
    }

    /// Writes the absolute humidity used for the sensor's internal
    /// compensation, returns the value that was applied.
    pub fn compensation_write(
        &mut self,
        ah: AbsoluteHumidity,
    ) -> Result<AbsoluteHumidity, Error> {
        self.lifecycle.ensure_ready()?;
        Ok(self.write_humidity(ah)?)
    }

    fn write_humidity(&mut self, ah: AbsoluteHumidity) -> Result<AbsoluteHumidity, ErrorKind> {
        let applied = applied_humidity(ah);
        let frame = encode_humidity(ah);
        info!("set AH: {:.1}, regs: {:02x?}", applied.0, &frame[2..4]);
        self.device.write(&frame)?;
        self.delay.delay_ms(10);
        self.out
            .publish(Metric::AbsoluteHumidity, Value::Decimal(applied.0));
        Ok(applied)
    }

    /// Restores baselines saved by an earlier run, shortening the time the
    /// sensor needs to settle.
    pub fn restore_baseline(&mut self, eco2: u16, tvoc: u16) -> Result<(), Error> {
        self.lifecycle.ensure_ready()?;
        let frame = encode_baseline(eco2, tvoc);
        debug!("set baseline: {frame:02x?}");
        self.device.write(&frame)?;
        self.delay.delay_ms(10);

        self.eco2_baseline = BaselineTracker::starting_from(eco2);
        self.tvoc_baseline = BaselineTracker::starting_from(tvoc);
        info!("restored baselines, eCO2: {eco2:#06x} tVOC: {tvoc:#06x}");
        Ok(())
    }

    /// eCO2 and tVOC baseline persisted in an earlier run
    pub fn persisted_baselines(&self) -> Option<(u16, u16)> {
        let eco2 = self.out.own_u16(Metric::BaselineEco2)?;
        let tvoc = self.out.own_u16(Metric::BaselineTvoc)?;
        Some((eco2, tvoc))
    }

    /// Returns the latest (not averaged) tVOC in ppb.
    pub fn try_task(&mut self) -> Result<u16, Error> {
        self.lifecycle.ensure_ready()?;

        let frame = self.command([MSB, cmd::MEASURE_IAQ], 20)?;
        // eCO2 is derived from the same signal, ignored
        let (_, tvoc) = words(frame);
        let tvoc = SEED.word(tvoc)?;
        if tvoc >= TVOC_CEILING {
            return Err(Error::OutOfRange {
                metric: Metric::Voc,
                value: tvoc.into(),
            });
        }

        self.voc.push(tvoc.into());
        if self.voc_phase == 0 {
            let average = self.voc.average().round() as i64;
            debug!("tvoc: {tvoc}, average: {average}");
            self.out.publish(Metric::Voc, Value::Integer(average));
            self.track_baselines();
        }
        self.voc_phase = (self.voc_phase + 1) % PUBLISH_EVERY;
        Ok(tvoc)
    }

    /// Both baselines come in one frame, each word is checked and tracked
    /// on its own.
    fn track_baselines(&mut self) {
        let res = self.command([MSB, cmd::GET_BASELINE], 20).map_err(Error::from);
        let Some(frame) = self.out.report("baseline poll", res) else {
            return;
        };

        let (eco2, tvoc) = words(frame);
        let res = SEED.word(eco2);
        if let Some(baseline) = self.out.report("eCO2 baseline", res) {
            if let Some(changed) = self.eco2_baseline.observe(baseline) {
                info!("new eCO2 baseline: {changed:#06x}");
                self.out
                    .publish(Metric::BaselineEco2, Value::Integer(changed.into()));
            }
        }

        let res = SEED.word(tvoc);
        if let Some(baseline) = self.out.report("tVOC baseline", res) {
            if let Some(changed) = self.tvoc_baseline.observe(baseline) {
                info!("new tVOC baseline: {changed:#06x}");
                self.out
                    .publish(Metric::BaselineTvoc, Value::Integer(changed.into()));
            }
        }
    }

    /// Only frames where both words are intact are used.
    pub fn try_raw_task(&mut self) -> Result<RawReading, Error> {
        self.lifecycle.ensure_ready()?;

        let frame = self.command([MSB, cmd::MEASURE_RAW], 30)?;
        let (h2, ethanol) = words(frame);
        let h2 = SEED.word(h2)?;
        let ethanol = SEED.word(ethanol)?;

        self.h2.push(h2.into());
        self.ethanol.push(ethanol.into());
        if self.raw_phase == 0 {
            let avg_h2 = self.h2.average().round() as i64;
            let avg_ethanol = self.ethanol.average().round() as i64;
            debug!("h2 avg: {avg_h2}, ethanol avg: {avg_ethanol}");
            self.out.publish(Metric::Hydrogen, Value::Integer(avg_h2));
            self.out.publish(Metric::Ethanol, Value::Integer(avg_ethanol));
        }
        self.raw_phase = (self.raw_phase + 1) % PUBLISH_EVERY;

        Ok(RawReading {
            h2: h2.into(),
            ethanol: ethanol.into(),
        })
    }

    pub fn raw_task(&mut self) -> RawReading {
        let res = self.try_raw_task();
        self.out
            .report("raw_task", res)
            .unwrap_or(RawReading::NOTHING)
    }

    /// Returns the mean written to the sensor if this cycle completed a
    /// compensation period.
    pub fn try_comp_task(&mut self) -> Result<Option<AbsoluteHumidity>, Error> {
        self.lifecycle.ensure_ready()?;

        let ah = AbsoluteHumidity(
            self.out
                .fetch(&self.climate_source, Metric::AbsoluteHumidity)?,
        );
        if !ah.is_plausible() {
            return Err(Error::OutOfRange {
                metric: Metric::AbsoluteHumidity,
                value: ah.0,
            });
        }

        debug!("comp sample AH: {:.1}", ah.0);
        let Some(mean) = self.compensation.record(ah) else {
            return Ok(None);
        };
        self.compensation_write(mean).map(Some)
    }
}

impl<I2C, D, X> Driver for Sgp30<I2C, D, X>
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

impl<I2C, D, X> Compensated for Sgp30<I2C, D, X>
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
