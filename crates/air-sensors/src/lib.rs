//! Polls environmental sensors on the i2c bus, smooths their readings and
//! publishes them. The gas sensors use the climate sensor's published
//! temperature and humidity to compensate their own measurements.

pub mod average;
pub mod baseline;
pub mod bus;
pub mod compensation;
pub mod drivers;
pub mod errors;
pub mod exchange;
pub mod failures;
pub mod frame;

pub use drivers::{ccs811::Ccs811, htu21d::Htu21d, k30::K30, sgp30::Sgp30};
pub use drivers::{Compensated, Driver};
pub use errors::{Error, InitError};
pub use exchange::{FileExchange, MemoryExchange, Metric, StateExchange};

/// Returned by a driver's task when there was no new trustworthy reading.
/// Far outside the physical range of every sensor, never a measurement.
pub const SENTINEL: u32 = 99_999;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorState {
    Uninitialized,
    Initializing,
    Ready,
    /// Init failed, stays this way for the rest of the process lifetime
    Faulted,
}
