//! Rate Limiter - fixed one-minute admission window shared by all workers

use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Length of one rate window
pub const WINDOW: Duration = Duration::from_secs(60);

/// Result of an admission attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub allowed: bool,
    /// Time left in the current window when not allowed; zero otherwise
    pub wait: Duration,
}

impl Admission {
    fn allowed() -> Self {
        Self {
            allowed: true,
            wait: Duration::ZERO,
        }
    }

    fn gated(wait: Duration) -> Self {
        Self {
            allowed: false,
            wait,
        }
    }
}

#[derive(Debug)]
struct RateWindowState {
    count_in_window: u32,
    window_start: Instant,
}

/// Coarse global throttle: up to `limit` admissions per window, bursts
/// allowed at the start of each window
#[derive(Debug)]
pub struct RateLimiter {
    limit: u32,
    state: Mutex<RateWindowState>,
}

impl RateLimiter {
    /// A limit of zero is treated as one
    pub fn new(limit: u32) -> Self {
        Self {
            limit: limit.max(1),
            state: Mutex::new(RateWindowState {
                count_in_window: 0,
                window_start: Instant::now(),
            }),
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RateWindowState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn roll(state: &mut RateWindowState, now: Instant) {
        if now.duration_since(state.window_start) >= WINDOW {
            state.count_in_window = 0;
            state.window_start = now;
        }
    }

    /// Check and count one admission as a single step
    pub fn try_consume(&self) -> Admission {
        let now = Instant::now();
        let mut state = self.lock();
        Self::roll(&mut state, now);

        if state.count_in_window < self.limit {
            state.count_in_window += 1;
            Admission::allowed()
        } else {
            let wait = (state.window_start + WINDOW).saturating_duration_since(now);
            debug!(
                count = state.count_in_window,
                limit = self.limit,
                wait_ms = wait.as_millis() as u64,
                "Rate window exhausted"
            );
            Admission::gated(wait)
        }
    }

    /// Admissions left in the current window
    pub fn remaining(&self) -> u32 {
        let now = Instant::now();
        let mut state = self.lock();
        Self::roll(&mut state, now);
        self.limit.saturating_sub(state.count_in_window)
    }
}
