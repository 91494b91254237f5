//! Rolling fixed-window limiter for provider calls.
//!
//! `allow()` never blocks or queues; callers decide what to do on denial.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug)]
struct Window {
    request_count: u32,
    window_start: Instant,
}

#[derive(Debug)]
pub struct RateLimiter {
    max_requests: u32,
    window_size: Duration,
    state: Mutex<Window>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window_size: Duration) -> Self {
        Self {
            max_requests,
            window_size,
            state: Mutex::new(Window {
                request_count: 0,
                window_start: Instant::now(),
            }),
        }
    }

    /// Count one request if the current window has room.
    pub fn allow(&self) -> bool {
        let mut w = self.state.lock();
        self.roll(&mut w);

        if w.request_count < self.max_requests {
            w.request_count += 1;
            true
        } else {
            debug!(
                count = w.request_count,
                max = self.max_requests,
                "rate limit window exhausted"
            );
            false
        }
    }

    /// Requests left in the current window.
    pub fn remaining(&self) -> u32 {
        let mut w = self.state.lock();
        self.roll(&mut w);
        self.max_requests.saturating_sub(w.request_count)
    }

    /// Time until the current window rolls over.
    pub fn resets_in(&self) -> Duration {
        let w = self.state.lock();
        self.window_size.saturating_sub(w.window_start.elapsed())
    }

    pub fn reset(&self) {
        let mut w = self.state.lock();
        w.request_count = 0;
        w.window_start = Instant::now();
    }

    fn roll(&self, w: &mut Window) {
        let now = Instant::now();
        if now.duration_since(w.window_start) > self.window_size {
            w.request_count = 0;
            w.window_start = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_allows_up_to_max_then_denies() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        assert!(limiter.allow());
        assert!(limiter.allow());
        assert!(limiter.allow());
        assert!(!limiter.allow());
        assert_eq!(limiter.remaining(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_rolls_over() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.allow());
        assert!(!limiter.allow());

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(!limiter.allow(), "window is only reset strictly after its size");

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(limiter.allow());
        assert_eq!(limiter.remaining(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resets_in_and_reset() {
        let limiter = RateLimiter::new(2, Duration::from_secs(10));
        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(limiter.resets_in(), Duration::from_secs(6));

        assert!(limiter.allow());
        limiter.reset();
        assert_eq!(limiter.remaining(), 2);
    }
}
