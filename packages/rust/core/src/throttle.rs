//! Minimum spacing between consecutive classifier calls.

use std::time::Duration;

use tokio::time::Instant;

/// Enforces a fixed minimum interval between calls. The first call is never
/// delayed. Uses tokio's clock so tests can run with paused time.
#[derive(Debug)]
pub struct CallThrottle {
    interval: Duration,
    last_call: Option<Instant>,
}

impl CallThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_call: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait until a call is allowed, then record it as started.
    pub async fn acquire(&mut self) {
        if let Some(last) = self.last_call {
            tokio::time::sleep_until(last + self.interval).await;
        }
        self.last_call = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn first_call_is_immediate() {
        let mut throttle = CallThrottle::new(Duration::from_secs(5));
        let start = Instant::now();
        throttle.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn consecutive_calls_are_spaced() {
        let mut throttle = CallThrottle::new(Duration::from_secs(5));
        let start = Instant::now();
        throttle.acquire().await;
        throttle.acquire().await;
        throttle.acquire().await;
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn elapsed_work_counts_toward_interval() {
        let mut throttle = CallThrottle::new(Duration::from_secs(5));
        throttle.acquire().await;
        tokio::time::sleep(Duration::from_secs(3)).await;
        let before = Instant::now();
        throttle.acquire().await;
        assert_eq!(before.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_never_waits() {
        let mut throttle = CallThrottle::new(Duration::ZERO);
        let start = Instant::now();
        for _ in 0..10 {
            throttle.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
