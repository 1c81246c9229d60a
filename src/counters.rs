//! Per-session diagnostic counters and timing.
//!
//! Each session owns one [`RelayCounters`] value, passed explicitly into
//! the relay loop or forwarding step — there is no ambient global state,
//! so sessions stay independent and testable in isolation. The timer
//! starts on the first relayed unit and a throughput line is emitted each
//! time the count reaches a multiple of the configured interval.

use tokio::time::Instant;
use tracing::info;

/// Message/chunk counter with a first-unit timer.
#[derive(Debug)]
pub struct RelayCounters {
    report_every: u64,
    count: u64,
    started: Option<Instant>,
}

impl RelayCounters {
    /// Create counters reporting every `report_every` units (0 disables
    /// reporting; counting still happens).
    #[must_use]
    pub fn new(report_every: u64) -> Self {
        Self {
            report_every,
            count: 0,
            started: None,
        }
    }

    /// Record one relayed unit.
    ///
    /// The first call starts the timer; every `report_every`-th call
    /// emits a diagnostic timing line.
    pub fn on_message(&mut self) {
        if self.count == 0 {
            self.started = Some(Instant::now());
        }
        self.count += 1;
        if self.report_every > 0 && self.count % self.report_every == 0 {
            self.report();
        }
    }

    /// Units recorded so far.
    #[must_use]
    pub fn count(&self) -> u64 { self.count }

    fn report(&self) {
        let Some(started) = self.started else { return };
        let elapsed = started.elapsed();
        let secs = elapsed.as_secs_f64();
        let rate = if secs > 0.0 {
            #[allow(clippy::cast_precision_loss)]
            let count = self.count as f64;
            count / secs
        } else {
            0.0
        };
        info!(
            count = self.count,
            elapsed_ms = elapsed.as_millis() as u64,
            rate_per_s = rate.round(),
            "relay throughput"
        );
    }
}

#[cfg(test)]
mod tests {
    use tracing_test::traced_test;

    use super::RelayCounters;

    #[tokio::test]
    async fn counts_units() {
        let mut counters = RelayCounters::new(0);
        for _ in 0..5 {
            counters.on_message();
        }
        assert_eq!(counters.count(), 5);
    }

    #[traced_test]
    #[tokio::test]
    async fn reports_at_each_interval_multiple() {
        let mut counters = RelayCounters::new(2);
        counters.on_message();
        assert!(!logs_contain("relay throughput"));
        counters.on_message();
        assert!(logs_contain("relay throughput"));
    }

    #[traced_test]
    #[tokio::test]
    async fn zero_interval_never_reports() {
        let mut counters = RelayCounters::new(0);
        for _ in 0..10 {
            counters.on_message();
        }
        assert!(!logs_contain("relay throughput"));
    }
}
