/// Change detection for a gas sensor's self calibrating baseline.
///
/// After power up the sensor keeps adjusting its baseline while it zeroes
/// itself, later it only drifts slowly. We only want to write it out when
/// it actually changed.
#[derive(Debug, Default, Clone)]
pub struct BaselineTracker {
    last_observed: Option<u16>,
    last_persisted: Option<u16>,
}

impl BaselineTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a value persisted by an earlier run so a restart does not
    /// write the same baseline again.
    pub fn starting_from(persisted: u16) -> Self {
        Self {
            last_observed: Some(persisted),
            last_persisted: Some(persisted),
        }
    }

    /// Returns the baseline if it should be persisted, that is if it differs
    /// from the last persisted one. Exact comparison, no hysteresis.
    pub fn observe(&mut self, baseline: u16) -> Option<u16> {
        self.last_observed = Some(baseline);
        if self.last_persisted == Some(baseline) {
            return None;
        }

        self.last_persisted = Some(baseline);
        Some(baseline)
    }

    /// Reads the baseline using `read` and passes it through [`observe`].
    /// A failed read leaves the tracker untouched.
    ///
    /// [`observe`]: Self::observe
    pub fn poll<E>(
        &mut self,
        read: impl FnOnce() -> Result<u16, E>,
    ) -> Result<Option<u16>, E> {
        let baseline = read()?;
        Ok(self.observe(baseline))
    }

    pub fn last_observed(&self) -> Option<u16> {
        self.last_observed
    }

    pub fn last_persisted(&self) -> Option<u16> {
        self.last_persisted
    }
}
