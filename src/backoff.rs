//! Reconnect pacing for the realtime channel.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Delay schedule for reconnect attempts: doubling from `floor` up to
/// `ceiling`, plus a random fraction so clients that lost the same
/// backend do not reconnect in lockstep. Attempts are unbounded; a
/// dropped channel keeps trying until every subscriber is gone.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    pub floor: Duration,
    pub ceiling: Duration,
    /// Fraction of the computed delay added as jitter; 0 disables it.
    pub jitter: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            floor: Duration::from_millis(500),
            ceiling: Duration::from_secs(30),
            jitter: 0.25,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before the `attempt`-th reconnect, 1-based.
    pub fn delay(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(20);
        let base = self.floor.saturating_mul(1u32 << shift).min(self.ceiling);
        base + self.jitter_on(base)
    }

    fn jitter_on(&self, base: Duration) -> Duration {
        let span = (base.as_millis() as f64 * self.jitter) as u64;
        if span == 0 {
            return Duration::ZERO;
        }

        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);

        Duration::from_millis(nanos % (span + 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_double_from_floor_to_ceiling() {
        let policy = ReconnectPolicy {
            floor: Duration::from_secs(1),
            ceiling: Duration::from_secs(8),
            jitter: 0.0,
        };

        assert_eq!(policy.delay(1), Duration::from_secs(1));
        assert_eq!(policy.delay(2), Duration::from_secs(2));
        assert_eq!(policy.delay(4), Duration::from_secs(8));
        assert_eq!(policy.delay(30), Duration::from_secs(8));
    }

    #[test]
    fn jitter_stays_within_the_configured_fraction() {
        let policy = ReconnectPolicy {
            floor: Duration::from_secs(4),
            ceiling: Duration::from_secs(4),
            jitter: 0.5,
        };

        for attempt in 1..10 {
            let delay = policy.delay(attempt);
            assert!(delay >= Duration::from_secs(4));
            assert!(delay <= Duration::from_secs(6));
        }
    }
}
