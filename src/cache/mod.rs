//! TTL key/value cache shared by every stage of a scan.
//!
//! Values are point-in-time snapshots, so concurrent writers simply race and
//! the last write wins. Keys are versioned strings built by the helpers in
//! [`keys`].

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::utils::error::Result;

#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Option<Value>;

    async fn set(&self, key: &str, value: Value, ttl: Duration);

    async fn delete(&self, key: &str);
}

/// Typed helpers over any [`Cache`].
pub async fn get_json<T: DeserializeOwned>(cache: &dyn Cache, key: &str) -> Option<T> {
    let value = cache.get(key).await?;
    match serde_json::from_value(value) {
        | Ok(v) => Some(v),
        | Err(e) => {
            // Shape changed under the same key; treat as a miss.
            log::debug!("cache entry {key} failed to decode: {e}");
            None
        }
    }
}

pub async fn set_json<T: Serialize>(
    cache: &dyn Cache,
    key: &str,
    value: &T,
    ttl: Duration,
) -> Result<()> {
    cache.set(key, serde_json::to_value(value)?, ttl).await;
    Ok(())
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Instant,
}

/// In-process cache backed by a `HashMap` behind an async `RwLock`.
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    inner: Arc<RwLock<HashMap<String, Entry>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.inner.read().await.values().filter(|e| e.expires_at > now).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop expired entries.
    pub async fn purge_expired(&self) {
        let now = Instant::now();
        self.inner.write().await.retain(|_, e| e.expires_at > now);
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Option<Value> {
        let guard = self.inner.read().await;
        let entry = guard.get(key)?;
        if entry.expires_at <= Instant::now() {
            return None;
        }
        Some(entry.value.clone())
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        let entry = Entry { value, expires_at: Instant::now() + ttl };
        self.inner.write().await.insert(key.to_string(), entry);
    }

    async fn delete(&self, key: &str) {
        self.inner.write().await.remove(key);
    }
}

pub mod keys {
    use crate::utils::types::{DayMode, SwingStrategy};

    pub fn dynamic_universe(mode: DayMode) -> String {
        format!("day_trading:dynamic_universe:{}:v2", mode.as_str().to_ascii_lowercase())
    }

    pub fn day_picks(mode: DayMode, dynamic: bool) -> String {
        format!("day_trading_picks:{}:v4:dynamic_{}", mode.as_str().to_ascii_lowercase(), dynamic)
    }

    pub fn swing_picks(strategy: SwingStrategy, dynamic: bool) -> String {
        format!("swing_trading:{}:v1:dynamic_{}", strategy.as_str().to_ascii_lowercase(), dynamic)
    }

    pub fn microstructure(symbol: &str) -> String {
        format!("microstructure:{}:v1", symbol.to_ascii_uppercase())
    }
}
