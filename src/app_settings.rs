//! Process-wide cache of the `app_settings` table.
//!
//! Reads are served from an in-memory snapshot that is reloaded when it is
//! older than the configured TTL (at most
//! [`MAX_SETTINGS_CACHE_TTL_SECS`](crate::settings::MAX_SETTINGS_CACHE_TTL_SECS)).
//! Writes through [`AppSettingsCache::set`] persist and then invalidate, so a
//! writer sees its own change immediately; writers that bypass the cache are
//! visible after at most one TTL.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use sea_orm::DatabaseConnection;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::errors::DeskError;
use crate::settings::MAX_SETTINGS_CACHE_TTL_SECS;
use crate::storage;

struct Snapshot {
    values: Arc<HashMap<String, Value>>,
    loaded_at: Instant,
}

#[derive(Clone)]
pub struct AppSettingsCache {
    db: DatabaseConnection,
    ttl: Duration,
    snapshot: Arc<RwLock<Option<Snapshot>>>,
}

impl AppSettingsCache {
    pub fn new(db: DatabaseConnection, ttl_secs: u64) -> Self {
        Self {
            db,
            ttl: Duration::from_secs(ttl_secs.min(MAX_SETTINGS_CACHE_TTL_SECS)),
            snapshot: Arc::new(RwLock::new(None)),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Value stored under `key`, or `default` when the key is unset.
    pub async fn get(&self, key: &str, default: Value) -> Result<Value, DeskError> {
        let values = self.all().await?;
        Ok(values.get(key).cloned().unwrap_or(default))
    }

    /// Every setting, from a snapshot no older than the TTL.
    pub async fn all(&self) -> Result<Arc<HashMap<String, Value>>, DeskError> {
        {
            let guard = self.snapshot.read().await;
            if let Some(snapshot) = guard.as_ref() {
                if snapshot.loaded_at.elapsed() < self.ttl {
                    return Ok(snapshot.values.clone());
                }
            }
        }

        let mut guard = self.snapshot.write().await;
        // Another task may have reloaded while we waited for the lock.
        if let Some(snapshot) = guard.as_ref() {
            if snapshot.loaded_at.elapsed() < self.ttl {
                return Ok(snapshot.values.clone());
            }
        }

        let values = Arc::new(storage::get_app_settings(&self.db).await?);
        tracing::debug!(count = values.len(), "Reloaded application settings");
        *guard = Some(Snapshot {
            values: values.clone(),
            loaded_at: Instant::now(),
        });
        Ok(values)
    }

    /// Persist `value` under `key` and drop the snapshot.
    pub async fn set(&self, key: &str, value: &Value) -> Result<(), DeskError> {
        storage::set_app_setting(&self.db, key, value).await?;
        self.invalidate().await;
        Ok(())
    }

    pub async fn invalidate(&self) {
        *self.snapshot.write().await = None;
    }
}
