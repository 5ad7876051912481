use std::collections::BTreeMap;

use serde_json::Value;

use crate::core::StoreResult;

/// Persistent key-value option store.
///
/// Mirrors the host options API: `get` returns `None` for a missing key,
/// `add` never overwrites, `set` always does.
pub trait OptionStore: Send {
    fn get(&self, key: &str) -> StoreResult<Option<Value>>;

    fn set(&mut self, key: &str, value: Value) -> StoreResult<()>;

    /// Removes a key. Returns whether it existed.
    fn delete(&mut self, key: &str) -> StoreResult<bool>;

    fn keys(&self) -> StoreResult<Vec<String>>;

    /// Stores `value` only when `key` is absent. Returns whether it was written.
    fn add(&mut self, key: &str, value: Value) -> StoreResult<bool> {
        if self.get(key)?.is_some() {
            return Ok(false);
        }
        self.set(key, value)?;
        Ok(true)
    }

    fn contains(&self, key: &str) -> StoreResult<bool> {
        Ok(self.get(key)?.is_some())
    }
}

/// Volatile option store, used for tests and dry runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryOptionStore {
    values: BTreeMap<String, Value>,
}

impl MemoryOptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values<I, K>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self {
            values: values.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.values.clone()
    }
}

impl OptionStore for MemoryOptionStore {
    fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: Value) -> StoreResult<()> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&mut self, key: &str) -> StoreResult<bool> {
        Ok(self.values.remove(key).is_some())
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        Ok(self.values.keys().cloned().collect())
    }
}
