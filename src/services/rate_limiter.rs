// src/services/rate_limiter.rs
//! Fixed-window rate limiting keyed by client IP.

use crate::services::store::{CounterStore, WindowCount};
use actix_web::http::header::{HeaderMap, HeaderName, HeaderValue};
use chrono::{DateTime, Utc};
use log::warn;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub ok: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
    pub retry_after_secs: u64,
}

impl RateLimitDecision {
    fn from_window(limit: u32, window: WindowCount, now: DateTime<Utc>) -> Self {
        let remaining = u64::from(limit).saturating_sub(window.count) as u32;
        let until_reset = (window.reset_at - now).num_milliseconds().max(0) as u64;
        Self {
            ok: window.count <= u64::from(limit),
            limit,
            remaining,
            reset_at: window.reset_at,
            retry_after_secs: until_reset.div_ceil(1000).max(1),
        }
    }

    /// `X-RateLimit-*` headers, shared by every response that went through the limiter.
    pub fn write_headers(&self, headers: &mut HeaderMap) {
        headers.insert(
            HeaderName::from_static("x-ratelimit-limit"),
            HeaderValue::from(self.limit),
        );
        headers.insert(
            HeaderName::from_static("x-ratelimit-remaining"),
            HeaderValue::from(self.remaining),
        );
        headers.insert(
            HeaderName::from_static("x-ratelimit-reset"),
            HeaderValue::from(self.reset_at.timestamp()),
        );
    }
}

pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    limit: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>, limit: u32, window: Duration) -> Self {
        Self { store, limit, window }
    }

    pub fn key_for(client_ip: &str) -> String {
        format!("poster:{}", client_ip)
    }

    /// Count one request against `client_ip`.
    pub async fn check(&self, client_ip: &str) -> RateLimitDecision {
        self.check_at(client_ip, Utc::now()).await
    }

    pub async fn check_at(&self, client_ip: &str, now: DateTime<Utc>) -> RateLimitDecision {
        let key = Self::key_for(client_ip);
        match self.store.increment(&key, self.window, now).await {
            Ok(window) => RateLimitDecision::from_window(self.limit, window, now),
            Err(e) => {
                warn!("Rate limit store unavailable for {}, allowing request: {}", key, e);
                self.fresh(now)
            }
        }
    }

    /// Report the current window for `client_ip` without counting a request.
    pub async fn peek(&self, client_ip: &str) -> RateLimitDecision {
        let now = Utc::now();
        let key = Self::key_for(client_ip);
        match self.store.peek(&key, now).await {
            Ok(Some(window)) => RateLimitDecision::from_window(self.limit, window, now),
            Ok(None) => self.fresh(now),
            Err(e) => {
                warn!("Rate limit peek failed for {}: {}", key, e);
                self.fresh(now)
            }
        }
    }

    fn fresh(&self, now: DateTime<Utc>) -> RateLimitDecision {
        let reset_at = now
            + chrono::Duration::from_std(self.window).unwrap_or_else(|_| chrono::Duration::zero());
        RateLimitDecision::from_window(self.limit, WindowCount { count: 0, reset_at }, now)
    }
}
