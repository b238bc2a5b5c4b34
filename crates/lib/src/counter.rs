use unix_time::Instant;

use crate::OtpConfig;

/// Source of the moving factor fed to the HOTP computation.
///
/// Only the value returned at issuance matters for verification, since
/// that value is stored and replayed; implementations just need to be
/// reproducible when the same instant is supplied again.
pub trait MovingFactor {
    fn current(&self) -> u64;
}

impl<F> MovingFactor for F
where
    F: Fn() -> u64,
{
    fn current(&self) -> u64 {
        self()
    }
}

/// Number of whole `step`-second windows elapsed since `t0`.
///
/// Instants before `t0` count as window 0.
pub struct TimeStep {
    t0: Instant,
    step: u64,
    now: Box<dyn Fn() -> Instant + Send + Sync>,
}

impl TimeStep {
    pub fn new(t0: Instant, step: u64) -> Self {
        TimeStep::new_with_now(t0, step, Box::new(Instant::now))
    }

    /// Get a provider with a custom function to provide the "now" value.
    ///
    /// See [`Self::new`].
    pub fn new_with_now(t0: Instant, step: u64, now: Box<dyn Fn() -> Instant + Send + Sync>) -> Self {
        TimeStep {
            t0,
            step: step.max(1),
            now,
        }
    }

    /// Windows of `counter_step_seconds` counted from the Unix epoch.
    pub fn from_config(config: &OtpConfig) -> Self {
        TimeStep::new(Instant::at(0, 0), config.counter_step_seconds)
    }
}

impl MovingFactor for TimeStep {
    fn current(&self) -> u64 {
        let now = (self.now)();
        let elapsed = now.saturating_duration_since(self.t0);
        elapsed.as_secs() / self.step
    }
}

/// Always yields the same value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedCounter(pub u64);

impl MovingFactor for FixedCounter {
    fn current(&self) -> u64 {
        self.0
    }
}
