use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;
use std::{
    net::SocketAddr,
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::warn;

#[derive(Debug, Clone, Copy)]
struct RateLimitEntry {
    count: u64,
    window_start: Instant,
}

/// Fixed-window request limiter keyed by client address.
#[derive(Debug)]
pub struct RateLimiter {
    requests_per_window: u64,
    window: Duration,
    entries: DashMap<String, RateLimitEntry>,
}

impl RateLimiter {
    pub fn new(requests_per_window: u64, window: Duration) -> Self {
        Self {
            requests_per_window,
            window,
            entries: DashMap::new(),
        }
    }

    pub fn per_second(requests: u64) -> Self {
        Self::new(requests, Duration::from_secs(1))
    }

    pub fn check_rate_limit(&self, key: &str) -> bool {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> bool {
        let mut entry = self.entries.entry(key.to_string()).or_insert(RateLimitEntry {
            count: 0,
            window_start: now,
        });

        if now.duration_since(entry.window_start) >= self.window {
            entry.count = 0;
            entry.window_start = now;
        }
        if entry.count >= self.requests_per_window {
            return false;
        }
        entry.count += 1;
        true
    }

    /// Drops windows that have already closed.
    pub fn purge(&self) {
        let now = Instant::now();
        self.entries
            .retain(|_, entry| now.duration_since(entry.window_start) < self.window);
    }
}

pub async fn rate_limiter_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    if !limiter.check_rate_limit(&ip) {
        warn!(action = "rate_limited", ip = %ip);
        return Err(StatusCode::TOO_MANY_REQUESTS);
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_caps_then_resets() {
        let limiter = RateLimiter::new(2, Duration::from_millis(50));
        let start = Instant::now();
        assert!(limiter.check_at("1.2.3.4", start));
        assert!(limiter.check_at("1.2.3.4", start));
        assert!(!limiter.check_at("1.2.3.4", start));
        assert!(limiter.check_at("5.6.7.8", start));
        assert!(limiter.check_at("1.2.3.4", start + Duration::from_millis(60)));
    }
}
