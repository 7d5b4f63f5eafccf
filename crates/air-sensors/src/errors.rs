use embedded_hal::i2c::ErrorKind;

use crate::exchange::Metric;

/// A failure during a single polling cycle. None of these are fatal, the
/// cycle is skipped and the driver tries again next time it is called.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("I2c transaction failed: {0:?}")]
    Transport(ErrorKind),
    #[error("Crc mismatch, frame ended in {got:#04x} while we expected {expected:#04x}")]
    Crc { expected: u8, got: u8 },
    #[error("Checksum mismatch, frame ended in {got:#04x} while we expected {expected:#04x}")]
    Checksum { expected: u8, got: u8 },
    #[error("Implausible value for {metric}: {value}")]
    OutOfRange { metric: Metric, value: f32 },
    #[error("Sensor has no new data yet")]
    NotReady,
    #[error("No usable {metric} published by {device}")]
    SourceUnavailable { device: String, metric: Metric },
    #[error("Driver was not initialized (state: {0:?})")]
    NotInitialized(crate::SensorState),
}

/// The kind of failure, used to keep counts and to decide how loudly to
/// report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum FailureClass {
    Transport,
    Validation,
    Range,
    NotReady,
    Exchange,
    Lifecycle,
}

impl Error {
    pub fn class(&self) -> FailureClass {
        match self {
            Error::Transport(_) => FailureClass::Transport,
            Error::Crc { .. } | Error::Checksum { .. } => FailureClass::Validation,
            Error::OutOfRange { .. } => FailureClass::Range,
            Error::NotReady => FailureClass::NotReady,
            Error::SourceUnavailable { .. } => FailureClass::Exchange,
            Error::NotInitialized(_) => FailureClass::Lifecycle,
        }
    }
}

/// Fatal failure while bringing a sensor up. Every variant has its own exit
/// code so whatever supervises the service can tell which boot step failed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InitError {
    #[error("Bus failure during init: {0:?}")]
    Bus(ErrorKind),
    #[error("Ccs811 reports no valid application image, status: {status:#04x}")]
    AppInvalid { status: u8 },
    #[error("Ccs811 error register set after enabling measurements: {error:#04x}")]
    ErrorAfterMeasureMode { error: u8 },
    #[error("Ccs811 error register set after reading device info: {error:#04x}")]
    ErrorAfterInfo { error: u8 },
    #[error("Unexpected hardware id {got:#04x}, expected {expected:#04x}")]
    HardwareId { expected: u8, got: u8 },
    #[error("Htu21d soft reset failed: {0:?}")]
    SoftReset(ErrorKind),
    #[error("Could not read sgp30 serial id: {0}")]
    SerialId(Error),
    #[error("Could not read sgp30 feature set and version: {0}")]
    Version(Error),
    #[error("Could not start sgp30 air quality measurements: {0:?}")]
    AirQualityInit(ErrorKind),
    #[error("Driver faulted earlier and will not init again: {0}")]
    Faulted(Box<InitError>),
}

impl InitError {
    pub fn exit_code(&self) -> u8 {
        match self {
            InitError::Bus(_) => 1,
            InitError::AppInvalid { .. } => 10,
            InitError::ErrorAfterMeasureMode { .. } => 11,
            InitError::ErrorAfterInfo { .. } => 12,
            InitError::HardwareId { .. } => 13,
            InitError::SoftReset(_) => 20,
            InitError::SerialId(_) => 30,
            InitError::Version(_) => 31,
            InitError::AirQualityInit(_) => 32,
            InitError::Faulted(inner) => inner.exit_code(),
        }
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error::Transport(kind)
    }
}

impl From<ErrorKind> for InitError {
    fn from(kind: ErrorKind) -> Self {
        InitError::Bus(kind)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error("Could not write {path}: {source}")]
    Write {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
    #[error("Could not create state directory {path}: {source}")]
    CreateDir {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
}
