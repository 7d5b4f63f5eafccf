pub mod ccs811;
pub mod htu21d;
pub mod k30;
pub mod sgp30;

use tracing::{error, info};

use crate::errors::{Error, InitError};
use crate::exchange::{Metric, StateExchange, Value};
use crate::failures::FailureLog;
use crate::SensorState;

pub trait Driver {
    /// What a polling cycle hands back, sentinel values when nothing new
    /// could be read.
    type Output;

    /// Brings the sensor up. On failure the driver is faulted for good and
    /// every later call returns the same error.
    fn init(&mut self) -> Result<(), InitError>;
    /// One polling cycle, never fails. Problems are logged and reported
    /// through sentinel values.
    fn task(&mut self) -> Self::Output;
    fn state(&self) -> SensorState;
    fn name(&self) -> &str;
}

/// Gas sensors that take climate readings published by another driver
pub trait Compensated: Driver {
    /// One compensation cycle, problems are logged and the cycle skipped.
    fn comp_task(&mut self);
}

#[derive(Debug)]
pub(crate) struct Lifecycle {
    state: SensorState,
    fault: Option<InitError>,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self {
            state: SensorState::Uninitialized,
            fault: None,
        }
    }

    pub(crate) fn state(&self) -> SensorState {
        self.state
    }

    pub(crate) fn begin(&mut self) -> Result<(), InitError> {
        if let Some(fault) = &self.fault {
            return Err(InitError::Faulted(Box::new(fault.clone())));
        }
        self.state = SensorState::Initializing;
        Ok(())
    }

    pub(crate) fn finish(
        &mut self,
        name: &str,
        res: Result<(), InitError>,
    ) -> Result<(), InitError> {
        match res {
            Ok(()) => {
                info!("{name} ready");
                self.state = SensorState::Ready;
                Ok(())
            }
            Err(err) => {
                error!("{name} init failed (exit code {}): {err}", err.exit_code());
                self.state = SensorState::Faulted;
                self.fault = Some(err.clone());
                Err(err)
            }
        }
    }

    pub(crate) fn ensure_ready(&self) -> Result<(), Error> {
        match self.state {
            SensorState::Ready => Ok(()),
            other => Err(Error::NotInitialized(other)),
        }
    }
}

/// The name a driver publishes under, where it publishes to and how it
/// reports failures.
pub(crate) struct Publisher<X> {
    pub(crate) exchange: X,
    pub(crate) name: String,
    pub(crate) failures: FailureLog,
}

impl<X: StateExchange> Publisher<X> {
    pub(crate) fn new(exchange: X, name: &str) -> Self {
        Self {
            exchange,
            name: name.to_owned(),
            failures: FailureLog::new(name),
        }
    }

    pub(crate) fn rename(&mut self, name: &str) {
        self.name = name.to_owned();
        self.failures = FailureLog::new(name);
    }

    /// Best effort, a failed publish is logged and otherwise ignored
    pub(crate) fn publish(&mut self, metric: Metric, value: Value) {
        if let Err(e) = self.exchange.publish(&self.name, metric, value) {
            self.failures.exchange(&e);
        }
    }

    /// Reads a value some other driver published
    pub(crate) fn fetch(&self, device: &str, metric: Metric) -> Result<f32, Error> {
        self.exchange
            .read_f32(device, metric)
            .ok_or_else(|| Error::SourceUnavailable {
                device: device.to_owned(),
                metric,
            })
    }

    /// A value this driver published in an earlier run
    pub(crate) fn own_u16(&self, metric: Metric) -> Option<u16> {
        self.exchange.read_u16(&self.name, metric)
    }

    pub(crate) fn report<T>(&mut self, operation: &str, res: Result<T, Error>) -> Option<T> {
        res.inspect_err(|e| self.failures.cycle(operation, e)).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::i2c::ErrorKind;

    #[test]
    fn lifecycle_fault_is_sticky() {
        let mut lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.state(), SensorState::Uninitialized);
        assert!(lifecycle.ensure_ready().is_err());

        lifecycle.begin().unwrap();
        assert_eq!(lifecycle.state(), SensorState::Initializing);
        let err = lifecycle
            .finish("CCS811", Err(InitError::AppInvalid { status: 0 }))
            .unwrap_err();
        assert_eq!(err.exit_code(), 10);
        assert_eq!(lifecycle.state(), SensorState::Faulted);

        let again = lifecycle.begin().unwrap_err();
        assert_eq!(again.exit_code(), 10);
        assert!(matches!(again, InitError::Faulted(_)));
        assert_eq!(
            lifecycle.ensure_ready(),
            Err(Error::NotInitialized(SensorState::Faulted))
        );
    }

    #[test]
    fn lifecycle_ready() {
        let mut lifecycle = Lifecycle::new();
        lifecycle.begin().unwrap();
        lifecycle.finish("K30", Ok(())).unwrap();
        assert_eq!(lifecycle.state(), SensorState::Ready);
        assert_eq!(lifecycle.ensure_ready(), Ok(()));
    }

    #[test]
    fn report_keeps_ok_drops_err() {
        let mut publisher = Publisher::new(crate::MemoryExchange::new(), "K30");
        assert_eq!(publisher.report("task", Ok::<_, Error>(5)), Some(5));
        assert_eq!(
            publisher.report::<u8>("task", Err(Error::Transport(ErrorKind::Other))),
            None
        );
        assert_eq!(publisher.failures.total(), 1);
    }
}
