//! Sliding-window request limiter

use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

/// Caps issued requests per rolling window, blocking callers until a slot frees
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    issued: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Create a limiter allowing `max_requests` per `window` (0 = unlimited)
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            issued: Mutex::new(VecDeque::with_capacity(max_requests)),
        }
    }

    /// Create a limiter for a requests-per-minute ceiling
    pub fn per_minute(requests: u32) -> Self {
        Self::new(requests as usize, Duration::from_secs(60))
    }

    /// Wait until a request slot is free and claim it
    pub async fn acquire(&self) {
        if self.max_requests == 0 {
            return;
        }

        loop {
            let wait = {
                let mut issued = self.issued.lock().await;
                let now = Instant::now();

                while let Some(oldest) = issued.front() {
                    if now.duration_since(*oldest) >= self.window {
                        issued.pop_front();
                    } else {
                        break;
                    }
                }

                if issued.len() < self.max_requests {
                    issued.push_back(now);
                    return;
                }

                match issued.front() {
                    Some(oldest) => self.window.saturating_sub(now.duration_since(*oldest)),
                    None => Duration::ZERO,
                }
            };

            tracing::debug!(
                wait_ms = wait.as_millis() as u64,
                "Request ceiling reached, waiting for a slot"
            );
            sleep(wait).await;
        }
    }

    /// Requests issued within the current window
    pub async fn in_window(&self) -> usize {
        let issued = self.issued.lock().await;
        let now = Instant::now();
        issued
            .iter()
            .filter(|ts| now.duration_since(**ts) < self.window)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_acquire_under_ceiling_is_immediate() {
        let limiter = RateLimiter::new(5, Duration::from_secs(60));
        let start = Instant::now();
        for _ in 0..5 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_millis(50));
        assert_eq!(limiter.in_window().await, 5);
    }

    #[tokio::test]
    async fn test_acquire_blocks_until_slot_frees() {
        let limiter = RateLimiter::new(2, Duration::from_millis(100));
        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(95));
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_window() {
        let limiter = Arc::new(RateLimiter::new(3, Duration::from_millis(150)));
        let start = Instant::now();

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move { limiter.acquire().await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        // Six requests through a 3-per-window limiter need a second window
        assert!(start.elapsed() >= Duration::from_millis(140));
    }

    #[tokio::test]
    async fn test_zero_means_unlimited() {
        let limiter = RateLimiter::per_minute(0);
        for _ in 0..100 {
            limiter.acquire().await;
        }
        assert_eq!(limiter.in_window().await, 0);
    }
}
