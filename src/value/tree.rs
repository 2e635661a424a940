//! Value tree
//!
//! `Value` is the only data that crosses the process boundary. Every
//! compound variant is reference counted, so cloning a value is a refcount
//! bump and sub-trees can be shared between several parents. Values are
//! never mutated in place once shared: the `with_*` helpers return a new
//! value and leave the receiver untouched.

use std::sync::Arc;

use bytes::Bytes;
use indexmap::IndexMap;

use crate::collection::CollectionNode;

/// Ordered dictionary with unique string keys (insertion order preserved)
pub type Dict = IndexMap<String, Value>;

/// Tagged value
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Absence of a value
    #[default]
    None,

    /// Signed 64-bit integer
    Int64(i64),

    /// IEEE 754 double
    Float64(f64),

    /// UTF-8 string
    String(Arc<str>),

    /// Opaque binary blob
    Binary(Bytes),

    /// Ordered list
    List(Arc<Vec<Value>>),

    /// Ordered dictionary
    Dict(Arc<Dict>),

    /// Collection operator tree (DAG, children shared)
    Collection(Arc<CollectionNode>),

    /// Error message carried as a value
    Error(Arc<str>),
}

impl Value {
    /// Build a list from anything convertible into values
    pub fn list<I, V>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Value::List(Arc::new(items.into_iter().map(Into::into).collect()))
    }

    /// Build a dict from key/value pairs; later duplicates replace earlier ones
    pub fn dict<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Value::Dict(Arc::new(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        ))
    }

    /// Build an error value
    pub fn error(msg: impl AsRef<str>) -> Self {
        Value::Error(Arc::from(msg.as_ref()))
    }

    /// Short name of the variant, used in diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Int64(_) => "int64",
            Value::Float64(_) => "float64",
            Value::String(_) => "string",
            Value::Binary(_) => "binary",
            Value::List(_) => "list",
            Value::Dict(_) => "dict",
            Value::Collection(_) => "collection",
            Value::Error(_) => "error",
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int64(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view; integers are widened
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float64(f) => Some(*f),
            Value::Int64(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_binary(&self) -> Option<&Bytes> {
        match self {
            Value::Binary(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&Dict> {
        match self {
            Value::Dict(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_collection(&self) -> Option<&Arc<CollectionNode>> {
        match self {
            Value::Collection(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_error(&self) -> Option<&str> {
        match self {
            Value::Error(msg) => Some(msg),
            _ => None,
        }
    }

    /// Look up a key in a dict value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_dict()?.get(key)
    }

    /// Look up a string entry in a dict value
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key)?.as_str()
    }

    /// Look up an integer entry in a dict value
    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.get(key)?.as_int()
    }

    /// Collect a list of strings; `None` if this is not a list of strings
    pub fn string_list(&self) -> Option<Vec<String>> {
        self.as_list()?
            .iter()
            .map(|v| v.as_str().map(str::to_string))
            .collect()
    }

    /// Return a new list with `item` appended. The receiver is not modified.
    pub fn with_item(&self, item: impl Into<Value>) -> Option<Value> {
        let mut items = match self {
            Value::List(items) => Arc::clone(items),
            _ => return None,
        };
        Arc::make_mut(&mut items).push(item.into());
        Some(Value::List(items))
    }

    /// Return a new dict with `key` set. The receiver is not modified.
    pub fn with_entry(&self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let mut dict = match self {
            Value::Dict(d) => Arc::clone(d),
            _ => return None,
        };
        Arc::make_mut(&mut dict).insert(key.into(), value.into());
        Some(Value::Dict(dict))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int64(v as i64)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int64(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(Arc::from(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(Arc::from(v))
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::String(Arc::from(v.as_str()))
    }
}

impl From<Bytes> for Value {
    fn from(v: Bytes) -> Self {
        Value::Binary(v)
    }
}

impl<V: Into<Value>> From<Vec<V>> for Value {
    fn from(v: Vec<V>) -> Self {
        Value::list(v)
    }
}

impl From<Dict> for Value {
    fn from(v: Dict) -> Self {
        Value::Dict(Arc::new(v))
    }
}

impl From<Arc<CollectionNode>> for Value {
    fn from(v: Arc<CollectionNode>) -> Self {
        Value::Collection(v)
    }
}

impl From<CollectionNode> for Value {
    fn from(v: CollectionNode) -> Self {
        Value::Collection(Arc::new(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors() {
        let s = Value::from("test");
        assert_eq!(s.as_str(), Some("test"));
        assert_eq!(s.as_int(), None);

        let n = Value::Int64(42);
        assert_eq!(n.as_int(), Some(42));
        assert_eq!(n.as_float(), Some(42.0));
        assert_eq!(n.as_str(), None);

        let d = Value::dict([("key", "value")]);
        assert_eq!(d.get_str("key"), Some("value"));
        assert!(d.get("missing").is_none());
        assert!(Value::None.get("key").is_none());
    }

    #[test]
    fn test_dict_preserves_insertion_order_and_unique_keys() {
        let d = Value::dict([("b", 1), ("a", 2), ("b", 3)]);
        let keys: Vec<&str> = d.as_dict().unwrap().keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["b", "a"]);
        assert_eq!(d.get_int("b"), Some(3));
    }

    #[test]
    fn test_with_item_does_not_mutate_shared_list() {
        let base = Value::list(["a", "b"]);
        let shared = base.clone();

        let extended = base.with_item("c").unwrap();

        assert_eq!(base.as_list().unwrap().len(), 2);
        assert_eq!(shared, base);
        assert_eq!(extended.string_list().unwrap(), vec!["a", "b", "c"]);
        assert!(Value::Int64(1).with_item("x").is_none());
    }

    #[test]
    fn test_with_entry_does_not_mutate_shared_dict() {
        let base = Value::dict([("type", "metadata")]);
        let updated = base.with_entry("aggregate", "first").unwrap();

        assert!(base.get("aggregate").is_none());
        assert_eq!(updated.get_str("aggregate"), Some("first"));
        assert_eq!(updated.get_str("type"), Some("metadata"));
    }

    #[test]
    fn test_clone_shares_storage() {
        let list = Value::list([1, 2, 3]);
        let clone = list.clone();
        match (&list, &clone) {
            (Value::List(a), Value::List(b)) => assert!(Arc::ptr_eq(a, b)),
            _ => panic!("Expected lists"),
        }
    }

    #[test]
    fn test_string_list() {
        assert_eq!(
            Value::list(["x", "y"]).string_list(),
            Some(vec!["x".to_string(), "y".to_string()])
        );
        assert_eq!(Value::list(vec![Value::from("x"), Value::Int64(1)]).string_list(), None);
        assert_eq!(Value::None.string_list(), None);
    }

    #[test]
    fn test_default_and_type_name() {
        assert_eq!(Value::default(), Value::None);
        assert!(Value::default().is_none());
        assert_eq!(Value::error("boom").type_name(), "error");
        assert_eq!(Value::error("boom").as_error(), Some("boom"));
        assert_eq!(Value::from(Bytes::from_static(b"ab")).type_name(), "binary");
    }
}
