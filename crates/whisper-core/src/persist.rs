use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{error, warn};
use whisper_db::KvStore;

use crate::error::{ChatError, Result};

/// Read a JSON array stored under `key`. A missing key is an empty
/// collection.
pub(crate) fn load_collection<T: DeserializeOwned>(kv: &dyn KvStore, key: &'static str) -> Result<Vec<T>> {
    let raw = kv.get(key).map_err(|e| ChatError::PersistenceReadCorrupt {
        key,
        reason: e.to_string(),
    })?;
    match raw {
        None => Ok(Vec::new()),
        Some(raw) => serde_json::from_str(&raw).map_err(|e| ChatError::PersistenceReadCorrupt {
            key,
            reason: e.to_string(),
        }),
    }
}

/// Startup load: anything unreadable is logged and replaced by an empty
/// collection.
pub(crate) fn load_or_empty<T: DeserializeOwned>(kv: &dyn KvStore, key: &'static str) -> Vec<T> {
    match load_collection(kv, key) {
        Ok(items) => items,
        Err(e) => {
            warn!("{}; starting with an empty collection", e);
            Vec::new()
        }
    }
}

/// Overwrite `key` with the whole collection. One retry before giving up.
pub(crate) fn save_collection<T: Serialize>(kv: &dyn KvStore, key: &'static str, items: &[T]) -> Result<()> {
    let json = serde_json::to_string(items).map_err(|e| ChatError::PersistenceWriteFailed {
        key,
        reason: e.to_string(),
    })?;

    if let Err(first) = kv.put(key, &json) {
        warn!("write of `{}` failed, retrying: {}", key, first);
        kv.put(key, &json).map_err(|e| {
            error!("write of `{}` failed twice: {}", key, e);
            ChatError::PersistenceWriteFailed {
                key,
                reason: e.to_string(),
            }
        })?;
    }
    Ok(())
}
