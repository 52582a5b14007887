use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;

use crate::KvStore;

/// In-process [`KvStore`]. Nothing survives the process; used for tests and
/// for running without a database file.
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self.values.lock().map_err(|e| anyhow::anyhow!("store lock poisoned: {}", e))?;
        Ok(values.get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.values.lock().map_err(|e| anyhow::anyhow!("store lock poisoned: {}", e))?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
