//! Pool-wide cooling pause

use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tracing::info;

#[derive(Debug, Default)]
struct GateState {
    resume_at: Option<Instant>,
    periods: u64,
}

/// Shared resume-at instant consulted by every worker before admission
#[derive(Debug)]
pub struct CoolingGate {
    cooling: Duration,
    state: Mutex<GateState>,
}

impl CoolingGate {
    /// `cooling` is the minimum length of any pause
    pub fn new(cooling: Duration) -> Self {
        Self {
            cooling,
            state: Mutex::new(GateState::default()),
        }
    }

    fn active_until(&self, now: Instant) -> Option<Instant> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.resume_at.filter(|at| *at > now)
    }

    /// Return once no pause is in effect
    pub async fn wait(&self) {
        while let Some(resume_at) = self.active_until(Instant::now()) {
            sleep_until(resume_at).await;
        }
    }

    /// Pause the whole pool for at least `max(wait, cooling)`.
    ///
    /// A running pause is only ever extended. Returns `true` when this call
    /// started a new cooling period.
    pub fn pause(&self, wait: Duration) -> bool {
        let now = Instant::now();
        let target = now + wait.max(self.cooling);
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        match state.resume_at {
            Some(current) if current > now => {
                if target > current {
                    state.resume_at = Some(target);
                }
                false
            }
            _ => {
                state.resume_at = Some(target);
                state.periods += 1;
                info!(
                    period = state.periods,
                    pause_ms = (target - now).as_millis() as u64,
                    "Rate limit reached, cooling down"
                );
                true
            }
        }
    }

    /// Number of cooling periods started so far
    pub fn periods(&self) -> u64 {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .periods
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn assert_elapsed(start: Instant, expected: Duration) {
        let elapsed = start.elapsed();
        assert!(
            elapsed >= expected && elapsed < expected + Duration::from_millis(5),
            "elapsed {:?}, expected {:?}",
            elapsed,
            expected
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_without_pause_returns_immediately() {
        let gate = CoolingGate::new(Duration::from_millis(500));
        let start = Instant::now();
        gate.wait().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(gate.periods(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_uses_longer_of_wait_and_cooling() {
        let gate = CoolingGate::new(Duration::from_secs(2));
        let start = Instant::now();
        assert!(gate.pause(Duration::from_millis(100)));
        gate.wait().await;
        assert_elapsed(start, Duration::from_secs(2));

        let start = Instant::now();
        assert!(gate.pause(Duration::from_secs(5)));
        gate.wait().await;
        assert_elapsed(start, Duration::from_secs(5));
        assert_eq!(gate.periods(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_pauses_count_once_and_never_shorten() {
        let gate = Arc::new(CoolingGate::new(Duration::ZERO));
        assert!(gate.pause(Duration::from_secs(10)));
        assert!(!gate.pause(Duration::from_secs(3)));
        assert!(!gate.pause(Duration::from_secs(12)));
        assert_eq!(gate.periods(), 1);

        let start = Instant::now();
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let gate = gate.clone();
                tokio::spawn(async move { gate.wait().await })
            })
            .collect();
        for waiter in waiters {
            waiter.await.unwrap();
        }
        assert_elapsed(start, Duration::from_secs(12));
    }
}
