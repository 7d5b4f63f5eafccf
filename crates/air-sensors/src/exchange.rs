//! Drivers never talk to each other directly. Each publishes its smoothed
//! values under its own name and reads whatever other drivers published.
//! Every `(device, metric)` pair has exactly one writer, writes replace the
//! whole value.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::trace;

use crate::errors::ExchangeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(strum::Display, strum::EnumString, strum::IntoStaticStr)]
pub enum Metric {
    #[strum(serialize = "voc")]
    Voc,
    #[strum(serialize = "co2")]
    Co2,
    #[strum(serialize = "tc")]
    Temperature,
    #[strum(serialize = "rh")]
    Humidity,
    #[strum(serialize = "td")]
    DewPoint,
    #[strum(serialize = "ah")]
    AbsoluteHumidity,
    #[strum(serialize = "base")]
    Baseline,
    #[strum(serialize = "base_c")]
    BaselineEco2,
    #[strum(serialize = "base_v")]
    BaselineTvoc,
    #[strum(serialize = "error")]
    ErrorCode,
    #[strum(serialize = "h2")]
    Hydrogen,
    #[strum(serialize = "et")]
    Ethanol,
    #[strum(serialize = "sid")]
    SerialId,
    #[strum(serialize = "ver")]
    Version,
}

/// How a value is written out
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Integer(i64),
    /// one digit after the dot
    Decimal(f32),
    Hex8(u8),
    Hex16(u16),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(v) => write!(f, "{v}"),
            Value::Decimal(v) => write!(f, "{v:.1}"),
            Value::Hex8(v) => write!(f, "{v:#04x}"),
            Value::Hex16(v) => write!(f, "{v:#06x}"),
        }
    }
}

pub trait StateExchange {
    fn publish(&mut self, device: &str, metric: Metric, value: Value) -> Result<(), ExchangeError>;

    /// `None` if nothing was published yet or it could not be read
    fn read(&self, device: &str, metric: Metric) -> Option<String>;

    /// Missing or unparsable values are reported as `None`, they are
    /// never an error.
    fn read_f32(&self, device: &str, metric: Metric) -> Option<f32> {
        self.read(device, metric)?.trim().parse().ok()
    }

    /// Accepts both decimal and `0x` prefixed hex.
    fn read_u16(&self, device: &str, metric: Metric) -> Option<u16> {
        let text = self.read(device, metric)?;
        let text = text.trim();
        match text.strip_prefix("0x") {
            Some(hex) => u16::from_str_radix(hex, 16).ok(),
            None => text.parse().ok(),
        }
    }
}

/// Publishes every value as a small text file: `<root>/<device>/<metric>`.
#[derive(Debug, Clone)]
pub struct FileExchange {
    root: PathBuf,
}

impl FileExchange {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, device: &str, metric: Metric) -> PathBuf {
        let metric: &'static str = metric.into();
        self.root.join(device).join(metric)
    }

    pub fn create_device_dir(&self, device: &str) -> Result<(), ExchangeError> {
        let path = self.root.join(device);
        fs::create_dir_all(&path).map_err(|source| ExchangeError::CreateDir { path, source })
    }
}

impl StateExchange for FileExchange {
    fn publish(&mut self, device: &str, metric: Metric, value: Value) -> Result<(), ExchangeError> {
        self.create_device_dir(device)?;
        let path = self.path(device, metric);
        // readers only ever see a complete value
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, value.to_string())
            .and_then(|()| fs::rename(&tmp, &path))
            .map_err(|source| ExchangeError::Write {
                path: path.clone(),
                source,
            })?;
        trace!("published {value} to {}", path.display());
        Ok(())
    }

    fn read(&self, device: &str, metric: Metric) -> Option<String> {
        fs::read_to_string(self.path(device, metric)).ok()
    }
}

/// Keeps everything in memory. Clones share the same values so one clone
/// can be handed to every driver in a process.
#[derive(Debug, Clone, Default)]
pub struct MemoryExchange {
    values: Arc<Mutex<HashMap<(String, Metric), String>>>,
}

impl MemoryExchange {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value as if another driver published it
    pub fn set(&self, device: &str, metric: Metric, text: impl Into<String>) {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((device.to_owned(), metric), text.into());
    }

    pub fn remove(&self, device: &str, metric: Metric) {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&(device.to_owned(), metric));
    }
}

impl StateExchange for MemoryExchange {
    fn publish(&mut self, device: &str, metric: Metric, value: Value) -> Result<(), ExchangeError> {
        self.set(device, metric, value.to_string());
        Ok(())
    }

    fn read(&self, device: &str, metric: Metric) -> Option<String> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(device.to_owned(), metric))
            .cloned()
    }
}
