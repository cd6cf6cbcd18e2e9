// src/services/redis_service.rs
use crate::errors::PosterError;
use crate::services::store::{CacheStore, CounterStore, WindowCount};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};
use std::time::Duration;

// INCR, open the window on the first hit, and report the remaining TTL in one round trip.
const FIXED_WINDOW_SCRIPT: &str = r#"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
  redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
local ttl = redis.call('PTTL', KEYS[1])
if ttl < 0 then
  redis.call('PEXPIRE', KEYS[1], ARGV[1])
  ttl = tonumber(ARGV[1])
end
return {count, ttl}
"#;

pub struct RedisService {
    conn: ConnectionManager,
    window_script: Script,
}

impl RedisService {
    pub async fn new(redis_url: &str) -> Result<Self, PosterError> {
        let client = Client::open(redis_url).map_err(|e| PosterError::Store(e.to_string()))?;
        let mut conn = ConnectionManager::new(client)
            .await
            .map_err(|e| PosterError::Store(e.to_string()))?;

        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map_err(|e| PosterError::Store(e.to_string()))?;

        Ok(Self {
            conn,
            window_script: Script::new(FIXED_WINDOW_SCRIPT),
        })
    }
}

fn millis(d: Duration) -> usize {
    d.as_millis().max(1) as usize
}

#[async_trait]
impl CacheStore for RedisService {
    async fn get(&self, key: &str) -> Result<Option<String>, PosterError> {
        let mut conn = self.conn.clone();
        conn.get(key)
            .await
            .map_err(|e| PosterError::Store(format!("cache read failed: {}", e)))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), PosterError> {
        let mut conn = self.conn.clone();
        conn.pset_ex::<_, _, ()>(key, value, millis(ttl))
            .await
            .map_err(|e| PosterError::Store(format!("cache write failed: {}", e)))
    }
}

#[async_trait]
impl CounterStore for RedisService {
    async fn increment(
        &self,
        key: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<WindowCount, PosterError> {
        let mut conn = self.conn.clone();
        let (count, ttl_ms): (u64, i64) = self
            .window_script
            .key(key)
            .arg(millis(window))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| PosterError::Store(format!("rate limit update failed: {}", e)))?;

        Ok(WindowCount {
            count,
            reset_at: now + chrono::Duration::milliseconds(ttl_ms.max(0)),
        })
    }

    async fn peek(&self, key: &str, now: DateTime<Utc>) -> Result<Option<WindowCount>, PosterError> {
        let mut conn = self.conn.clone();
        let (count, ttl_ms): (Option<u64>, i64) = redis::pipe()
            .get(key)
            .cmd("PTTL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| PosterError::Store(format!("rate limit read failed: {}", e)))?;

        Ok(count.filter(|_| ttl_ms > 0).map(|count| WindowCount {
            count,
            reset_at: now + chrono::Duration::milliseconds(ttl_ms),
        }))
    }
}
