use heapless::HistoryBuffer;

/// Unweighted mean over a fixed window of the last `N` samples.
///
/// The window is always full. It starts out filled with a physically sane
/// default, the first sample pushed then replaces every slot so the mean is
/// not dragged towards the default for the next `N - 1` samples.
#[derive(Debug)]
pub struct MovingAverage<const N: usize> {
    window: HistoryBuffer<f32, N>,
    primed: bool,
}

impl<const N: usize> MovingAverage<N> {
    pub fn new(default: f32) -> Self {
        Self {
            window: HistoryBuffer::new_with(default),
            primed: false,
        }
    }

    pub fn push(&mut self, value: f32) {
        if self.primed {
            self.window.write(value);
        } else {
            self.window.clear_with(value);
            self.primed = true;
        }
    }

    pub fn average(&self) -> f32 {
        let sum: f64 = self.window.as_slice().iter().copied().map(f64::from).sum();
        (sum / N as f64) as f32
    }

    /// Whether any real sample made it in yet
    pub fn is_primed(&self) -> bool {
        self.primed
    }

    pub fn latest(&self) -> Option<f32> {
        self.primed.then(|| self.window.recent().copied()).flatten()
    }
}
