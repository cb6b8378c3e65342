use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::service::caching::{CacheError, RedisCache};
use crate::service::phone::{PhoneLookup, DOWNLOAD_FAILED};

const PHONE_TTL_SECS: i64 = 60 * 60 * 24 * 30; // 30 days

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedPhone {
    pub value: String,
    pub stored_at: DateTime<Utc>,
}

fn phone_key(cache: &RedisCache, document_url: &str) -> String {
    let digest = hex::encode(Sha256::digest(document_url.as_bytes()));
    cache.key(&format!("phone:{digest}"))
}

/// Transient outcomes are retried on the next run instead of being remembered.
pub fn is_cacheable(value: &str) -> bool {
    value != DOWNLOAD_FAILED && !value.starts_with("Error:")
}

pub async fn load(cache: &RedisCache, document_url: &str) -> Result<Option<CachedPhone>, CacheError> {
    let mut conn = cache.connection();
    let stored: Option<String> = conn.get(phone_key(cache, document_url)).await?;
    match stored {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

pub async fn store(cache: &RedisCache, document_url: &str, value: &str) -> Result<(), CacheError> {
    let mut conn = cache.connection();
    let key = phone_key(cache, document_url);
    let entry = serde_json::to_string(&CachedPhone {
        value: value.to_string(),
        stored_at: Utc::now(),
    })?;

    redis::pipe()
        .set(&key, entry)
        .expire(&key, PHONE_TTL_SECS)
        .query_async::<()>(&mut conn)
        .await?;
    Ok(())
}

/// Wraps a lookup with a Redis read-through cache keyed by document URL.
///
/// Cache outages are logged and the wrapped lookup is used directly.
pub struct CachedPhoneLookup<L> {
    inner: L,
    cache: RedisCache,
}

impl<L: PhoneLookup> CachedPhoneLookup<L> {
    pub fn new(inner: L, cache: RedisCache) -> Self {
        Self { inner, cache }
    }
}

#[async_trait]
impl<L: PhoneLookup> PhoneLookup for CachedPhoneLookup<L> {
    async fn lookup(&self, document_url: &str) -> String {
        match load(&self.cache, document_url).await {
            Ok(Some(hit)) => {
                debug!("phone cache hit for {} (stored {})", document_url, hit.stored_at);
                return hit.value;
            }
            Ok(None) => {}
            Err(e) => warn!("phone cache read failed: {}", e),
        }

        let value = self.inner.lookup(document_url).await;
        if is_cacheable(&value) {
            if let Err(e) = store(&self.cache, document_url, &value).await {
                warn!("phone cache write failed: {}", e);
            }
        }
        value
    }
}
