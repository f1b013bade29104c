//! Sliding-window limits on judge requests and tokens per minute

use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const WINDOW: Duration = Duration::from_secs(60);

/// Requests-per-minute and tokens-per-minute limiter
pub struct RateLimiter {
    requests_per_minute: u32,
    tokens_per_minute: u32,
    last_requests: Mutex<VecDeque<Instant>>,
    token_usage: Mutex<VecDeque<(Instant, u32)>>,
}

/// Drop entries older than the window
fn prune<T>(entries: &mut VecDeque<T>, now: Instant, at: impl Fn(&T) -> Instant) {
    while let Some(front) = entries.front() {
        if now.duration_since(at(front)) > WINDOW {
            entries.pop_front();
        } else {
            break;
        }
    }
}

impl RateLimiter {
    pub fn new(requests_per_minute: u32, tokens_per_minute: u32) -> Self {
        Self {
            requests_per_minute: requests_per_minute.max(1),
            tokens_per_minute,
            last_requests: Mutex::new(VecDeque::new()),
            token_usage: Mutex::new(VecDeque::new()),
        }
    }

    /// Wait until a request fits in the window, then record it
    pub async fn acquire(&self) -> RateLimitGuard {
        loop {
            let wait = {
                let mut last = self.last_requests.lock().await;
                let now = Instant::now();
                prune(&mut last, now, |t| *t);

                if last.len() < self.requests_per_minute as usize {
                    last.push_back(now);
                    None
                } else {
                    last.front()
                        .map(|&oldest| WINDOW.saturating_sub(now.duration_since(oldest)))
                }
            };

            match wait {
                None => return RateLimitGuard { _private: () },
                Some(wait) => {
                    tracing::debug!("Judge request limit reached, waiting {:?}", wait);
                    tokio::time::sleep(wait + Duration::from_millis(10)).await;
                }
            }
        }
    }

    /// Record token usage for rate limiting
    pub async fn record_tokens(&self, tokens: u32) {
        let mut usage = self.token_usage.lock().await;
        let now = Instant::now();
        prune(&mut usage, now, |(t, _)| *t);
        usage.push_back((now, tokens));
    }

    /// Tokens used in the last minute
    pub async fn current_token_usage(&self) -> u32 {
        let mut usage = self.token_usage.lock().await;
        prune(&mut usage, Instant::now(), |(t, _)| *t);
        usage.iter().map(|(_, t)| t).sum()
    }

    pub async fn has_token_capacity(&self, needed: u32) -> bool {
        let current = self.current_token_usage().await;
        current.saturating_add(needed) <= self.tokens_per_minute
    }

    /// Wait for token capacity; a request larger than the whole budget goes through once the window is empty
    pub async fn wait_for_token_capacity(&self, needed: u32) {
        let needed = needed.min(self.tokens_per_minute);
        while !self.has_token_capacity(needed).await {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

/// Guard returned when rate limit permission is acquired
pub struct RateLimitGuard {
    _private: (),
}
