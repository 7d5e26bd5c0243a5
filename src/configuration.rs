use std::time::Duration;

use quanta::Clock;

use crate::session::Session;

/// A configuration builder for [`Session`].
#[derive(Clone, Default)]
pub struct SessionConfig {
    pub(crate) name: Option<String>,
    pub(crate) interval: Duration,
    pub(crate) duration: Duration,
    pub(crate) clock: Option<Clock>,
}

impl SessionConfig {
    /// Creates a new `SessionConfig` with default values: manual-only
    /// sampling, infinite lifetime, auto-generated name.
    pub fn new() -> SessionConfig {
        Default::default()
    }

    /// Sets the minimum spacing between sampling passes.
    ///
    /// Defaults to zero, which means the session is never touched by the
    /// polling driver and samples only on explicit
    /// [`sample`](Session::sample) calls.
    ///
    /// The interval is a lower bound, not a schedule: if the owner polls
    /// late the next pass fires immediately, and missed windows are
    /// dropped.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sets the total active lifetime after [`start`](Session::start).
    ///
    /// Defaults to zero, which means the session stays active until
    /// stopped. A bounded session expires lazily: the transition to
    /// inactive happens on the next [`is_active`](Session::is_active)
    /// query or polling pass at or past the deadline.
    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Sets the display label. Auto-generated when absent; truncated to
    /// the stat-name limit.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Supplies the clock the session stamps time with.
    ///
    /// Defaults to the calibrated system clock. Mostly useful for tests,
    /// which pass the mock half of [`quanta::Clock::mock`] to drive time
    /// by hand.
    pub fn clock(mut self, clock: Clock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Create a `Session` based on this configuration.
    pub fn build(self) -> Session {
        Session::from_config(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_manual_and_unbounded() {
        let config = SessionConfig::new();
        assert!(config.interval.is_zero());
        assert!(config.duration.is_zero());
        assert!(config.name.is_none());
        assert!(config.clock.is_none());
    }

    #[test]
    fn test_builder_chains() {
        let config = SessionConfig::new()
            .interval(Duration::from_millis(500))
            .duration(Duration::from_secs(10))
            .name("nic_watch");
        assert_eq!(config.interval, Duration::from_millis(500));
        assert_eq!(config.duration, Duration::from_secs(10));
        assert_eq!(config.name.as_deref(), Some("nic_watch"));
    }

    #[test]
    fn test_long_session_names_are_clamped() {
        let session = SessionConfig::new().name("n".repeat(400)).build();
        assert_eq!(session.name().len(), crate::data::MAX_STAT_NAME_LEN);
    }
}
