//! Wall-clock sources for lease expiry checks.

use chrono::{DateTime, Utc};
use tokio::time::Instant;

/// Source of the wall-clock time written into and compared against lease records.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The host's real-time clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Wall time anchored once and advanced by tokio's clock.
///
/// Under a paused tokio runtime this clock moves only when tokio time moves,
/// which keeps lease expiry consistent with the scheduler's timers. Clones
/// share the anchor; [`TokioClock::with_skew`] shifts one participant's view.
#[derive(Debug, Clone)]
pub struct TokioClock {
    wall_origin: DateTime<Utc>,
    origin: Instant,
    skew: chrono::Duration,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            wall_origin: Utc::now(),
            origin: Instant::now(),
            skew: chrono::Duration::zero(),
        }
    }

    /// Returns a clock that reads `skew` ahead (or behind, if negative) of this one.
    pub fn with_skew(&self, skew: chrono::Duration) -> Self {
        Self {
            skew: self.skew + skew,
            ..self.clone()
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.origin.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        self.wall_origin + elapsed + self.skew
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn tokio_clock_follows_paused_time() {
        let clock = TokioClock::new();
        let start = clock.now();

        tokio::time::advance(Duration::from_secs(30)).await;

        assert_eq!(clock.now() - start, chrono::Duration::seconds(30));
    }

    #[tokio::test(start_paused = true)]
    async fn skewed_clock_shares_anchor() {
        let clock = TokioClock::new();
        let ahead = clock.with_skew(chrono::Duration::seconds(3));

        assert_eq!(ahead.now() - clock.now(), chrono::Duration::seconds(3));
    }
}
