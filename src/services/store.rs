// src/services/store.rs
use crate::errors::PosterError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// State of one fixed rate-limit window after (or without) an increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCount {
    pub count: u64,
    pub reset_at: DateTime<Utc>,
}

/// String values with a time to live. Expired entries read as absent.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, PosterError>;
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), PosterError>;
}

/// Fixed-window counters. `increment` must be atomic per key.
#[async_trait]
pub trait CounterStore: Send + Sync {
    async fn increment(
        &self,
        key: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<WindowCount, PosterError>;

    /// Current window without counting a request. `None` when no window is open.
    async fn peek(&self, key: &str, now: DateTime<Utc>) -> Result<Option<WindowCount>, PosterError>;
}

struct CacheSlot {
    value: String,
    expires_at: Instant,
}

struct Window {
    count: u64,
    started: DateTime<Utc>,
    length: chrono::Duration,
}

impl Window {
    fn reset_at(&self) -> DateTime<Utc> {
        self.started + self.length
    }
}

/// Every this many writes a map drops its expired entries.
pub const SWEEP_INTERVAL: u64 = 256;

/// In-process store for single-instance deployments and tests.
pub struct MemoryStore {
    cache: Mutex<HashMap<String, CacheSlot>>,
    windows: Mutex<HashMap<String, Window>>,
    cache_writes: AtomicU64,
    window_writes: AtomicU64,
    sweep_every: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_sweep_interval(SWEEP_INTERVAL)
    }

    pub fn with_sweep_interval(sweep_every: u64) -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
            windows: Mutex::new(HashMap::new()),
            cache_writes: AtomicU64::new(0),
            window_writes: AtomicU64::new(0),
            sweep_every: sweep_every.max(1),
        }
    }

    fn sweep_due(&self, writes: &AtomicU64) -> bool {
        (writes.fetch_add(1, Ordering::Relaxed) + 1) % self.sweep_every == 0
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn chrono_duration(window: Duration) -> Result<chrono::Duration, PosterError> {
    chrono::Duration::from_std(window)
        .map_err(|e| PosterError::Internal(format!("window out of range: {}", e)))
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, PosterError> {
        let mut cache = lock(&self.cache);
        let now = Instant::now();
        let fresh = cache
            .get(key)
            .filter(|slot| slot.expires_at > now)
            .map(|slot| slot.value.clone());
        if fresh.is_none() {
            cache.remove(key);
        }
        Ok(fresh)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), PosterError> {
        let now = Instant::now();
        let mut cache = lock(&self.cache);
        if self.sweep_due(&self.cache_writes) {
            let before = cache.len();
            cache.retain(|_, slot| slot.expires_at > now);
            debug!("Swept {} expired cache entries", before - cache.len());
        }
        cache.insert(key.to_string(), CacheSlot { value, expires_at: now + ttl });
        Ok(())
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn increment(
        &self,
        key: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<WindowCount, PosterError> {
        let length = chrono_duration(window)?;
        let mut windows = lock(&self.windows);
        if self.sweep_due(&self.window_writes) {
            let before = windows.len();
            windows.retain(|_, w| now < w.reset_at());
            debug!("Swept {} closed rate-limit windows", before - windows.len());
        }
        let entry = windows
            .entry(key.to_string())
            .or_insert(Window { count: 0, started: now, length });

        if now >= entry.reset_at() {
            *entry = Window { count: 0, started: now, length };
        }
        entry.count += 1;

        Ok(WindowCount { count: entry.count, reset_at: entry.reset_at() })
    }

    async fn peek(&self, key: &str, now: DateTime<Utc>) -> Result<Option<WindowCount>, PosterError> {
        let windows = lock(&self.windows);
        Ok(windows
            .get(key)
            .filter(|w| now < w.reset_at())
            .map(|w| WindowCount { count: w.count, reset_at: w.reset_at() }))
    }
}
