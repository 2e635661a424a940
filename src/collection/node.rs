//! Collection operator nodes
//!
//! A collection is a DAG of operator nodes. Operands are held through `Arc`,
//! so wrapping a collection in a new operator shares the wrapped sub-tree
//! instead of copying it. Nodes are immutable once shared, which also means
//! a cycle can never be built.

use std::sync::Arc;

use crate::value::{Dict, Value};

use super::namespace::Namespace;

/// Shared handle to a collection node
pub type Collection = Arc<CollectionNode>;

/// Attribute naming a saved collection (reference nodes)
pub const ATTR_REFERENCE: &str = "reference";
/// Attribute naming the namespace of a saved collection (reference nodes)
pub const ATTR_NAMESPACE: &str = "namespace";
/// Attribute holding the operator subtype (filter and order nodes)
pub const ATTR_TYPE: &str = "type";
/// Attribute holding the property a filter or order node looks at
pub const ATTR_FIELD: &str = "field";
/// Attribute holding the value a filter node compares against
pub const ATTR_VALUE: &str = "value";

/// Operator kind of a collection node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionKind {
    /// Saved collection, resolved lazily by (name, namespace)
    Reference,
    /// Every media entry in the library
    Universe,
    /// Entries matched by any operand
    Union,
    /// Entries matched by all operands
    Intersection,
    /// Entries not matched by the single operand
    Complement,
    /// Entries of the operand whose property satisfies a predicate
    Filter,
    /// Operand sorted by one key; stable, so nesting composes keys
    Order,
    /// Window over the operand's ordered stream
    Limit,
    /// Explicit ordered list of media ids
    Idlist,
}

impl CollectionKind {
    /// Wire representation
    pub fn as_u8(self) -> u8 {
        match self {
            CollectionKind::Reference => 0,
            CollectionKind::Universe => 1,
            CollectionKind::Union => 2,
            CollectionKind::Intersection => 3,
            CollectionKind::Complement => 4,
            CollectionKind::Filter => 5,
            CollectionKind::Order => 6,
            CollectionKind::Limit => 7,
            CollectionKind::Idlist => 8,
        }
    }

    /// Parse the wire representation
    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0 => CollectionKind::Reference,
            1 => CollectionKind::Universe,
            2 => CollectionKind::Union,
            3 => CollectionKind::Intersection,
            4 => CollectionKind::Complement,
            5 => CollectionKind::Filter,
            6 => CollectionKind::Order,
            7 => CollectionKind::Limit,
            8 => CollectionKind::Idlist,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CollectionKind::Reference => "reference",
            CollectionKind::Universe => "universe",
            CollectionKind::Union => "union",
            CollectionKind::Intersection => "intersection",
            CollectionKind::Complement => "complement",
            CollectionKind::Filter => "filter",
            CollectionKind::Order => "order",
            CollectionKind::Limit => "limit",
            CollectionKind::Idlist => "idlist",
        }
    }
}

impl std::fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Predicate applied by a filter node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    Equals,
    NotEqual,
    /// Glob match with `*` and `?`
    Match,
    /// Property is present
    Has,
    Smaller,
    Greater,
}

impl FilterKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FilterKind::Equals => "equals",
            FilterKind::NotEqual => "notequal",
            FilterKind::Match => "match",
            FilterKind::Has => "has",
            FilterKind::Smaller => "smaller",
            FilterKind::Greater => "greater",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "equals" => FilterKind::Equals,
            "notequal" => FilterKind::NotEqual,
            "match" => FilterKind::Match,
            "has" => FilterKind::Has,
            "smaller" => FilterKind::Smaller,
            "greater" => FilterKind::Greater,
            _ => return None,
        })
    }
}

/// A single operator node
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionNode {
    kind: CollectionKind,
    attributes: Dict,
    operands: Vec<Collection>,
    idlist: Vec<i64>,
}

impl CollectionNode {
    /// Create an empty node of the given kind
    pub fn new(kind: CollectionKind) -> Self {
        Self {
            kind,
            attributes: Dict::new(),
            operands: Vec::new(),
            idlist: Vec::new(),
        }
    }

    /// Set an attribute
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Add an operand. The operand is shared, not copied.
    pub fn with_operand(mut self, operand: &Collection) -> Self {
        self.operands.push(Arc::clone(operand));
        self
    }

    /// Replace the id list
    pub fn with_idlist(mut self, ids: impl IntoIterator<Item = i64>) -> Self {
        self.idlist = ids.into_iter().collect();
        self
    }

    /// Freeze the node into a shareable handle
    pub fn into_shared(self) -> Collection {
        Arc::new(self)
    }

    pub fn kind(&self) -> CollectionKind {
        self.kind
    }

    pub fn attributes(&self) -> &Dict {
        &self.attributes
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    pub fn attribute_str(&self, key: &str) -> Option<&str> {
        self.attribute(key)?.as_str()
    }

    pub fn operands(&self) -> &[Collection] {
        &self.operands
    }

    /// The single operand of a unary node
    pub fn operand(&self) -> Option<&Collection> {
        self.operands.first()
    }

    pub fn idlist(&self) -> &[i64] {
        &self.idlist
    }

    /// Every media entry in the library
    pub fn universe() -> Collection {
        CollectionNode::new(CollectionKind::Universe).into_shared()
    }

    /// Lazily resolved reference to a saved collection
    pub fn reference(name: impl Into<String>, namespace: Namespace) -> Collection {
        CollectionNode::new(CollectionKind::Reference)
            .with_attribute(ATTR_REFERENCE, name.into())
            .with_attribute(ATTR_NAMESPACE, namespace.as_str())
            .into_shared()
    }

    /// Explicit ordered list of media ids
    pub fn id_list(ids: impl IntoIterator<Item = i64>) -> Collection {
        CollectionNode::new(CollectionKind::Idlist)
            .with_idlist(ids)
            .into_shared()
    }

    pub fn union(operands: &[Collection]) -> Collection {
        Self::with_operands(CollectionKind::Union, operands)
    }

    pub fn intersection(operands: &[Collection]) -> Collection {
        Self::with_operands(CollectionKind::Intersection, operands)
    }

    pub fn complement(operand: &Collection) -> Collection {
        CollectionNode::new(CollectionKind::Complement)
            .with_operand(operand)
            .into_shared()
    }

    /// Filter `operand` (the universe when `None`) by a property predicate
    pub fn filter(
        kind: FilterKind,
        field: impl Into<String>,
        value: impl Into<Value>,
        operand: Option<&Collection>,
    ) -> Collection {
        let mut node = CollectionNode::new(CollectionKind::Filter)
            .with_attribute(ATTR_TYPE, kind.as_str())
            .with_attribute(ATTR_FIELD, field.into());
        let value = value.into();
        if !value.is_none() {
            node = node.with_attribute(ATTR_VALUE, value);
        }
        if let Some(op) = operand {
            node = node.with_operand(op);
        }
        node.into_shared()
    }

    fn with_operands(kind: CollectionKind, operands: &[Collection]) -> Collection {
        operands
            .iter()
            .fold(CollectionNode::new(kind), |node, op| node.with_operand(op))
            .into_shared()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_wire_roundtrip_is_closed() {
        for v in 0..=8u8 {
            let kind = CollectionKind::from_u8(v).unwrap();
            assert_eq!(kind.as_u8(), v);
        }
        assert!(CollectionKind::from_u8(9).is_none());
    }

    #[test]
    fn test_operands_are_shared() {
        let base = CollectionNode::universe();
        let left = CollectionNode::complement(&base);
        let right = CollectionNode::filter(FilterKind::Has, "artist", Value::None, Some(&base));
        let both = CollectionNode::union(&[left.clone(), right.clone()]);

        assert_eq!(both.operands().len(), 2);
        assert!(Arc::ptr_eq(left.operand().unwrap(), &base));
        assert!(Arc::ptr_eq(right.operand().unwrap(), &base));
        // base itself plus one per referencing node
        assert_eq!(Arc::strong_count(&base), 3);
    }

    #[test]
    fn test_reference_attributes() {
        let r = CollectionNode::reference("Favourites", Namespace::Playlists);
        assert_eq!(r.kind(), CollectionKind::Reference);
        assert_eq!(r.attribute_str(ATTR_REFERENCE), Some("Favourites"));
        assert_eq!(r.attribute_str(ATTR_NAMESPACE), Some("Playlists"));
    }

    #[test]
    fn test_filter_without_value_omits_attribute() {
        let f = CollectionNode::filter(FilterKind::Has, "genre", Value::None, None);
        assert!(f.attribute(ATTR_VALUE).is_none());
        assert!(f.operands().is_empty());

        let f = CollectionNode::filter(FilterKind::Equals, "artist", "Low", None);
        assert_eq!(f.attribute_str(ATTR_VALUE), Some("Low"));
        let kind = f.attribute_str(ATTR_TYPE).and_then(FilterKind::parse);
        assert_eq!(kind, Some(FilterKind::Equals));
    }

    #[test]
    fn test_idlist() {
        let c = CollectionNode::id_list([3, 1, 2]);
        assert_eq!(c.idlist(), &[3, 1, 2]);
        assert_eq!(c.kind().to_string(), "idlist");
    }
}
