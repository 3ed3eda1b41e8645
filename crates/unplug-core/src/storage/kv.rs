//! Key-value persistence collaborator.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::PersistenceError;

/// JSON get/set, the only persistence surface the core relies on.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<Value>, PersistenceError>;
    fn set(&mut self, key: &str, value: Value) -> Result<(), PersistenceError>;
}

/// Volatile store for tests and headless runs.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    values: HashMap<String, Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, PersistenceError> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: Value) -> Result<(), PersistenceError> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }
}
