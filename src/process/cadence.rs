//! Fixed-interval loop pacing.

use std::time::Duration;
use tokio::time::Instant;

/// Paces a loop to one iteration per `period`.
///
/// Each [`tick`](Cadence::tick) sleeps only for what is left of the period
/// since the previous wake, so slow iterations are not penalized twice and
/// the loop frequency stays bounded regardless of per-iteration cost.
#[derive(Debug, Clone)]
pub struct Cadence {
    period: Duration,
    last_wake: Instant,
}

impl Cadence {
    /// Start pacing from now.
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            last_wake: Instant::now(),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn last_wake(&self) -> Instant {
        self.last_wake
    }

    /// Sleep out the remainder of the period. Returns how long it slept.
    pub async fn tick(&mut self) -> Duration {
        let elapsed = self.last_wake.elapsed();
        let deficit = self.period.saturating_sub(elapsed);
        if !deficit.is_zero() {
            tokio::time::sleep(deficit).await;
        }
        self.last_wake = Instant::now();
        deficit
    }
}
