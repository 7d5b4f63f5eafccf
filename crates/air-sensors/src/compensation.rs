use heapless::HistoryBuffer;

/// A climate value read from the state exchange once per compensation
/// cycle.
pub trait Sample: Copy {
    fn mean(samples: &[Self]) -> Self;
    /// Implausible samples are dropped before they reach the accumulator
    fn is_plausible(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Climate {
    /// °C
    pub temperature: f32,
    /// %RH
    pub humidity: f32,
}

impl Climate {
    /// Default assumed before any measurement, also written at boot.
    pub const DEFAULT: Self = Self {
        temperature: 23.0,
        humidity: 50.0,
    };
}

impl Sample for Climate {
    fn mean(samples: &[Self]) -> Self {
        let n = samples.len() as f32;
        let (t, rh) = samples
            .iter()
            .fold((0.0, 0.0), |(t, rh), s| (t + s.temperature, rh + s.humidity));
        Self {
            temperature: t / n,
            humidity: rh / n,
        }
    }

    fn is_plausible(&self) -> bool {
        self.temperature < 40.0 && (0.0..100.0).contains(&self.humidity)
    }
}

/// g/m³
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AbsoluteHumidity(pub f32);

impl AbsoluteHumidity {
    /// Equal to 23 °C at 50 %RH
    pub const DEFAULT: Self = Self(10.28);
}

impl Sample for AbsoluteHumidity {
    fn mean(samples: &[Self]) -> Self {
        let sum: f32 = samples.iter().map(|s| s.0).sum();
        Self(sum / samples.len() as f32)
    }

    fn is_plausible(&self) -> bool {
        (0.1..100.0).contains(&self.0)
    }
}

/// Collects one sample per compensation cycle and every `P` recorded
/// samples hands back their mean, which the owning driver then writes to
/// its compensation registers.
///
/// Cycles where no fresh sample could be obtained are simply not
/// recorded; they do not advance the countdown.
#[derive(Debug)]
pub struct CompensationAccumulator<S: Sample, const P: usize> {
    samples: HistoryBuffer<S, P>,
    countdown: usize,
}

impl<S: Sample, const P: usize> CompensationAccumulator<S, P> {
    pub fn new(default: S) -> Self {
        Self {
            samples: HistoryBuffer::new_with(default),
            countdown: P,
        }
    }

    #[must_use = "the mean needs to be written to the sensor"]
    pub fn record(&mut self, sample: S) -> Option<S> {
        self.samples.write(sample);
        self.countdown -= 1;
        if self.countdown > 0 {
            return None;
        }

        self.countdown = P;
        Some(S::mean(self.samples.as_slice()))
    }

    /// Samples still needed before the next compensation write
    pub fn remaining(&self) -> usize {
        self.countdown
    }
}
