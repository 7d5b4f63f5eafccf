use std::collections::HashMap;
use std::num::NonZeroU32;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tracing::{debug, warn};

use crate::errors::{Error, ExchangeError, FailureClass};

/// Keeps track of per cycle failures. A sensor polled every second that
/// drops off the bus would otherwise flood the log, so warnings are rate
/// limited and the number withheld is reported with the next one that does
/// get through.
pub struct FailureLog {
    device: String,
    limiter: DefaultDirectRateLimiter,
    withheld: usize,
    counts: HashMap<FailureClass, u64>,
}

impl FailureLog {
    pub fn new(device: impl Into<String>) -> Self {
        let quota = Quota::per_minute(NonZeroU32::new(6).expect("not zero"))
            .allow_burst(NonZeroU32::new(5).expect("not zero"));
        Self {
            device: device.into(),
            limiter: RateLimiter::direct(quota),
            withheld: 0,
            counts: HashMap::new(),
        }
    }

    pub fn cycle(&mut self, operation: &str, error: &Error) {
        let class = error.class();
        *self.counts.entry(class).or_default() += 1;

        if class == FailureClass::NotReady {
            debug!("{} {operation}: {error}", self.device);
            return;
        }
        let msg = format!("{} {operation} failed: {error}", self.device);
        self.warn(&msg);
    }

    pub fn exchange(&mut self, error: &ExchangeError) {
        *self.counts.entry(FailureClass::Exchange).or_default() += 1;
        let msg = format!("{} could not publish: {error}", self.device);
        self.warn(&msg);
    }

    fn warn(&mut self, msg: &str) {
        if self.limiter.check().is_err() {
            self.withheld += 1;
            return;
        }

        if self.withheld > 0 {
            warn!("{msg} (withheld {} similar warnings)", self.withheld);
            self.withheld = 0;
        } else {
            warn!("{msg}");
        }
    }

    pub fn count(&self, class: FailureClass) -> u64 {
        self.counts.get(&class).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }
}
