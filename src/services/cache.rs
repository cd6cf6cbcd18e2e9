// src/services/cache.rs
use crate::errors::PosterError;
use crate::models::{GenerationMode, GenerationResult, PosterRequest, ReferenceImage};
use crate::services::store::CacheStore;
use log::warn;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Stable idempotency key for a canonical request.
///
/// Fields go through a sorted map so the hash never depends on declaration or
/// arrival order. Edit keys also fold in the digests of the raw reference
/// uploads, in upload order, since their position on the strip matters.
pub fn idempotency_key(
    mode: GenerationMode,
    request: &PosterRequest,
    references: &[ReferenceImage],
) -> String {
    let mut fields: BTreeMap<&str, &str> = BTreeMap::new();
    fields.insert("title", &request.title);
    fields.insert("posterNotes", &request.poster_notes);
    fields.insert("companyName", request.company_name.as_deref().unwrap_or(""));
    fields.insert("brandColorHex", request.brand_color_hex.as_deref().unwrap_or(""));
    fields.insert(
        "posterVibe",
        request.poster_vibe.map(|v| v.as_str()).unwrap_or(""),
    );

    let mut hasher = Sha256::new();
    for (name, value) in &fields {
        hasher.update(name.as_bytes());
        hasher.update([0u8]);
        hasher.update(value.as_bytes());
        hasher.update([0u8]);
    }
    if mode != GenerationMode::Generate {
        for reference in references {
            hasher.update(Sha256::digest(&reference.data));
        }
    }

    format!("poster:{}:{:x}", mode.cache_prefix(), hasher.finalize())
}

/// Typed view over a [`CacheStore`] holding generation results.
pub struct ResultCache {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl ResultCache {
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Store trouble degrades to a miss rather than failing the request.
    pub async fn get(&self, key: &str) -> Option<GenerationResult> {
        let raw = match self.store.get(key).await {
            Ok(raw) => raw?,
            Err(e) => {
                warn!("Cache lookup for {} failed, treating as miss: {}", key, e);
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(result) => Some(result),
            Err(e) => {
                warn!("Discarding unreadable cache entry {}: {}", key, e);
                None
            }
        }
    }

    pub async fn set(&self, key: &str, result: &GenerationResult) -> Result<(), PosterError> {
        let value =
            serde_json::to_string(result).map_err(|e| PosterError::Serialization(e.to_string()))?;
        self.store.set(key, value, self.ttl).await
    }
}
