//! Saved-collection store
//!
//! Collections are saved under a (namespace, name) key. Every mutation
//! returns the `CollectionChange` that describes it, which the service
//! broadcasts as the collection-changed signal.

use std::collections::BTreeMap;
use std::fmt;

use crate::collection::{Collection, Namespace};
use crate::error::{Error, Result};
use crate::value::Value;

/// What happened to a saved collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Add,
    Update,
    Remove,
    Rename,
}

impl ChangeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeKind::Add => "add",
            ChangeKind::Update => "update",
            ChangeKind::Remove => "remove",
            ChangeKind::Rename => "rename",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Collection-changed notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionChange {
    pub kind: ChangeKind,
    pub name: String,
    pub namespace: Namespace,
    /// Set for renames
    pub new_name: Option<String>,
}

impl CollectionChange {
    /// Broadcast payload: `{type, name, namespace[, newname]}`
    pub fn to_value(&self) -> Value {
        let mut value = Value::dict([
            ("type", self.kind.as_str()),
            ("name", self.name.as_str()),
            ("namespace", self.namespace.as_str()),
        ]);
        if let Some(new_name) = &self.new_name {
            if let Some(with_new) = value.with_entry("newname", new_name.as_str()) {
                value = with_new;
            }
        }
        value
    }

    /// Parse a broadcast payload back
    pub fn from_value(value: &Value) -> Option<Self> {
        let kind = match value.get_str("type")? {
            "add" => ChangeKind::Add,
            "update" => ChangeKind::Update,
            "remove" => ChangeKind::Remove,
            "rename" => ChangeKind::Rename,
            _ => return None,
        };
        Some(Self {
            kind,
            name: value.get_str("name")?.to_string(),
            namespace: value.get_str("namespace")?.parse().ok()?,
            new_name: value.get_str("newname").map(str::to_string),
        })
    }
}

/// Saved collections, one sorted table per namespace
#[derive(Debug, Default)]
pub struct CollectionStore {
    collections: BTreeMap<String, Collection>,
    playlists: BTreeMap<String, Collection>,
}

impl CollectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self, namespace: Namespace) -> Option<&BTreeMap<String, Collection>> {
        match namespace {
            Namespace::Collections => Some(&self.collections),
            Namespace::Playlists => Some(&self.playlists),
            Namespace::All => None,
        }
    }

    fn table_mut(&mut self, namespace: Namespace) -> Result<&mut BTreeMap<String, Collection>> {
        namespace.ensure_writable()?;
        Ok(match namespace {
            Namespace::Playlists => &mut self.playlists,
            _ => &mut self.collections,
        })
    }

    /// Save `collection`, replacing any collection of the same name
    pub fn save(
        &mut self,
        name: &str,
        namespace: Namespace,
        collection: Collection,
    ) -> Result<CollectionChange> {
        if name.is_empty() {
            return Err(Error::invalid("collection name must not be empty"));
        }
        let table = self.table_mut(namespace)?;
        let kind = match table.insert(name.to_string(), collection) {
            Some(_) => ChangeKind::Update,
            None => ChangeKind::Add,
        };

        tracing::debug!(name = name, namespace = %namespace, change = %kind, "Collection saved");

        Ok(CollectionChange {
            kind,
            name: name.to_string(),
            namespace,
            new_name: None,
        })
    }

    /// Look up a saved collection; `All` searches Collections first
    pub fn get(&self, name: &str, namespace: Namespace) -> Result<Collection> {
        namespace
            .expand()
            .iter()
            .filter_map(|ns| self.table(*ns)?.get(name))
            .next()
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("{} in {}", name, namespace)))
    }

    /// Names in `namespace`, sorted; `All` lists Collections then Playlists
    pub fn list(&self, namespace: Namespace) -> Vec<String> {
        namespace
            .expand()
            .iter()
            .filter_map(|ns| self.table(*ns))
            .flat_map(|table| table.keys().cloned())
            .collect()
    }

    /// Every (namespace, name, collection) visible from `namespace`
    pub fn entries(&self, namespace: Namespace) -> Vec<(Namespace, String, Collection)> {
        namespace
            .expand()
            .iter()
            .filter_map(|ns| self.table(*ns).map(|table| (*ns, table)))
            .flat_map(|(ns, table)| {
                table
                    .iter()
                    .map(move |(name, coll)| (ns, name.clone(), Collection::clone(coll)))
            })
            .collect()
    }

    pub fn remove(&mut self, name: &str, namespace: Namespace) -> Result<CollectionChange> {
        let table = self.table_mut(namespace)?;
        if table.remove(name).is_none() {
            return Err(Error::NotFound(format!("{} in {}", name, namespace)));
        }

        tracing::debug!(name = name, namespace = %namespace, "Collection removed");

        Ok(CollectionChange {
            kind: ChangeKind::Remove,
            name: name.to_string(),
            namespace,
            new_name: None,
        })
    }

    pub fn rename(
        &mut self,
        from: &str,
        to: &str,
        namespace: Namespace,
    ) -> Result<CollectionChange> {
        if to.is_empty() {
            return Err(Error::invalid("collection name must not be empty"));
        }
        let table = self.table_mut(namespace)?;
        if table.contains_key(to) {
            return Err(Error::Remote(format!(
                "a collection named {} already exists in {}",
                to, namespace
            )));
        }
        let collection = table
            .remove(from)
            .ok_or_else(|| Error::NotFound(format!("{} in {}", from, namespace)))?;
        table.insert(to.to_string(), collection);

        tracing::debug!(from = from, to = to, namespace = %namespace, "Collection renamed");

        Ok(CollectionChange {
            kind: ChangeKind::Rename,
            name: from.to_string(),
            namespace,
            new_name: Some(to.to_string()),
        })
    }

    pub fn len(&self) -> usize {
        self.collections.len() + self.playlists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
