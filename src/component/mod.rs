pub mod loader;

pub use loader::{
    BuiltinComponent, Component, ComponentGlobals, ComponentLoader, ComponentParams, Stage,
    builtin_components,
};

use std::collections::BTreeSet;

use serde_json::{Map, Value};

use crate::core::{StoreError, StoreResult};
use crate::options::keys;
use crate::storage::OptionStore;

/// Components that are active whether or not the site enabled them.
pub const REQUIRED_COMPONENTS: &[&str] = &["core", "members"];

/// The set of optional components a site has switched on.
///
/// Persisted under `bp-active-components` as `{"activity": 1, ...}`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComponentSet {
    active: BTreeSet<String>,
}

impl ComponentSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            active: ids.into_iter().map(Into::into).collect(),
        }
    }

    pub fn insert(&mut self, id: &str) -> bool {
        self.active.insert(id.to_string())
    }

    pub fn remove(&mut self, id: &str) -> bool {
        self.active.remove(id)
    }

    pub fn is_required(id: &str) -> bool {
        REQUIRED_COMPONENTS.contains(&id)
    }

    pub fn is_active(&self, id: &str) -> bool {
        Self::is_required(id) || self.active.contains(id)
    }

    /// Explicitly enabled ids, without the implicit required ones.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.active.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn to_option(&self) -> Value {
        let map: Map<String, Value> = self
            .active
            .iter()
            .map(|id| (id.clone(), Value::from(1)))
            .collect();
        Value::Object(map)
    }

    /// Parses the stored option. Accepts the object form and a plain id list.
    pub fn from_option(value: &Value) -> Result<Self, String> {
        match value {
            Value::Null | Value::Bool(false) => Ok(Self::new()),
            Value::Object(map) => Ok(Self {
                active: map
                    .iter()
                    .filter(|(_, flag)| is_truthy(flag))
                    .map(|(id, _)| id.clone())
                    .collect(),
            }),
            Value::Array(items) => items
                .iter()
                .map(|item| {
                    item.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| format!("component id {} is not a string", item))
                })
                .collect::<Result<BTreeSet<_>, _>>()
                .map(|active| Self { active }),
            other => Err(format!("expected an object of component ids, got {}", other)),
        }
    }

    /// Reads the stored active set. `None` when the option was never written.
    pub fn load(store: &dyn OptionStore) -> StoreResult<Option<Self>> {
        let Some(value) = store.get(keys::ACTIVE_COMPONENTS)? else {
            return Ok(None);
        };
        Self::from_option(&value)
            .map(Some)
            .map_err(|reason| StoreError::Corrupt {
                key: keys::ACTIVE_COMPONENTS.to_string(),
                reason,
            })
    }

    pub fn save(&self, store: &mut dyn OptionStore) -> StoreResult<()> {
        store.set(keys::ACTIVE_COMPONENTS, self.to_option())
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !matches!(s.as_str(), "" | "0"),
        Value::Null => false,
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}
