//! Media library
//!
//! Entries are property dicts keyed by media id. Ids are assigned from 1
//! upwards and never reused. The `id` property is implicit: every lookup of
//! `id` answers with the entry's id whether or not the dict stores it.

use std::collections::BTreeMap;

use crate::value::{Dict, Value};

pub const PROPERTY_ID: &str = "id";
pub const PROPERTY_URL: &str = "url";

/// In-memory media library
#[derive(Debug, Clone, Default)]
pub struct Library {
    entries: BTreeMap<i64, Dict>,
    next_id: i64,
}

impl Library {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Add an entry and return its id
    pub fn add<I, K, V>(&mut self, properties: I) -> i64
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let id = self.next_id.max(1);
        self.next_id = id + 1;
        let dict = properties
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.entries.insert(id, dict);
        tracing::trace!(id = id, "Media entry added");
        id
    }

    /// Set one property of an existing entry
    pub fn set(&mut self, id: i64, key: impl Into<String>, value: impl Into<Value>) -> bool {
        match self.entries.get_mut(&id) {
            Some(dict) => {
                dict.insert(key.into(), value.into());
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: i64) -> bool {
        self.entries.remove(&id).is_some()
    }

    pub fn contains(&self, id: i64) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All ids, ascending
    pub fn ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.entries.keys().copied()
    }

    /// Property of an entry; `id` is always present
    pub fn property(&self, id: i64, key: &str) -> Option<Value> {
        let dict = self.entries.get(&id)?;
        if key == PROPERTY_ID {
            return Some(Value::Int64(id));
        }
        dict.get(key).cloned()
    }

    /// First entry whose `key` property equals `value`
    pub fn find_by(&self, key: &str, value: &Value) -> Option<i64> {
        self.entries
            .iter()
            .find(|(_, dict)| dict.get(key) == Some(value))
            .map(|(id, _)| *id)
    }
}
