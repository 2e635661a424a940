//! Collection evaluation
//!
//! Turns a collection DAG into the ordered list of matching media ids.
//! Each node kind produces its ids in a well-defined order:
//!
//! | Kind         | Output order                                   |
//! |--------------|------------------------------------------------|
//! | universe     | ascending id                                   |
//! | idlist       | as listed, unknown ids dropped                 |
//! | reference    | that of the saved collection                   |
//! | union        | ascending id, deduplicated                     |
//! | intersection | that of the first operand                      |
//! | complement   | ascending id                                   |
//! | filter       | that of the operand                            |
//! | order        | stable sort of the operand                     |
//! | limit        | window of the operand                          |
//!
//! Because order nodes sort stably, stacking them yields a composite sort:
//! the outermost node decides and inner ones only break its ties.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::collection::node::{ATTR_FIELD, ATTR_NAMESPACE, ATTR_REFERENCE, ATTR_TYPE, ATTR_VALUE};
use crate::collection::ops::{
    ATTR_DIRECTION, ATTR_LENGTH, ATTR_START, DIRECTION_DESC, ORDER_BY_ID, ORDER_BY_RANDOM,
    ORDER_BY_VALUE,
};
use crate::collection::{Collection, CollectionKind, FilterKind, Namespace};
use crate::error::{Error, Result};
use crate::value::Value;

use super::library::Library;
use super::store::CollectionStore;

/// Saved reference that always resolves to the whole library
pub const ALL_MEDIA: &str = "All Media";

/// Evaluation context over one library and one store
pub struct Evaluator<'a> {
    pub(super) library: &'a Library,
    store: &'a CollectionStore,
    pub(super) rng: &'a mut StdRng,
    /// References being resolved, to catch cycles
    resolving: Vec<(Namespace, String)>,
}

impl<'a> Evaluator<'a> {
    pub fn new(library: &'a Library, store: &'a CollectionStore, rng: &'a mut StdRng) -> Self {
        Self {
            library,
            store,
            rng,
            resolving: Vec::new(),
        }
    }

    /// Matching ids of `collection`, in collection order
    pub fn evaluate(&mut self, collection: &Collection) -> Result<Vec<i64>> {
        match collection.kind() {
            CollectionKind::Universe => Ok(self.library.ids().collect()),
            CollectionKind::Idlist => Ok(collection
                .idlist()
                .iter()
                .copied()
                .filter(|id| self.library.contains(*id))
                .collect()),
            CollectionKind::Reference => self.resolve_reference(collection),
            CollectionKind::Union => {
                let mut ids = BTreeSet::new();
                for operand in collection.operands() {
                    ids.extend(self.evaluate(operand)?);
                }
                Ok(ids.into_iter().collect())
            }
            CollectionKind::Intersection => {
                let mut operands = collection.operands().iter();
                let mut ids = match operands.next() {
                    Some(first) => self.evaluate(first)?,
                    None => return Ok(Vec::new()),
                };
                for operand in operands {
                    let other: HashSet<i64> = self.evaluate(operand)?.into_iter().collect();
                    ids.retain(|id| other.contains(id));
                }
                Ok(ids)
            }
            CollectionKind::Complement => {
                let excluded: HashSet<i64> = self.operand_ids(collection)?.into_iter().collect();
                Ok(self
                    .library
                    .ids()
                    .filter(|id| !excluded.contains(id))
                    .collect())
            }
            CollectionKind::Filter => self.filter(collection),
            CollectionKind::Order => self.order(collection),
            CollectionKind::Limit => {
                let ids = self.operand_ids(collection)?;
                let start = int_attribute(collection, ATTR_START)?;
                let length = int_attribute(collection, ATTR_LENGTH)?;
                Ok(window(ids, start, length))
            }
        }
    }

    fn operand_ids(&mut self, collection: &Collection) -> Result<Vec<i64>> {
        match collection.operand() {
            Some(operand) => self.evaluate(operand),
            None => Err(Error::Remote(format!(
                "{} node without operand",
                collection.kind()
            ))),
        }
    }

    fn resolve_reference(&mut self, collection: &Collection) -> Result<Vec<i64>> {
        let name = collection
            .attribute_str(ATTR_REFERENCE)
            .ok_or_else(|| Error::Remote("reference node without a name".into()))?;
        if name == ALL_MEDIA {
            return Ok(self.library.ids().collect());
        }
        let namespace: Namespace = collection
            .attribute_str(ATTR_NAMESPACE)
            .unwrap_or(Namespace::Collections.as_str())
            .parse()
            .map_err(|_| Error::Remote("reference node with unknown namespace".into()))?;

        let key = (namespace, name.to_string());
        if self.resolving.contains(&key) {
            return Err(Error::Remote(format!("reference cycle through {}", name)));
        }
        let target = self.store.get(name, namespace)?;

        self.resolving.push(key);
        let result = self.evaluate(&target);
        self.resolving.pop();
        result
    }

    fn filter(&mut self, collection: &Collection) -> Result<Vec<i64>> {
        let kind = collection
            .attribute_str(ATTR_TYPE)
            .and_then(FilterKind::parse)
            .ok_or_else(|| Error::Remote("filter node with unknown type".into()))?;
        let field = collection
            .attribute_str(ATTR_FIELD)
            .ok_or_else(|| Error::Remote("filter node without a field".into()))?;
        let expected = collection.attribute(ATTR_VALUE);
        if expected.is_none() && kind != FilterKind::Has {
            return Err(Error::Remote(format!("{} filter without a value", kind.as_str())));
        }

        let ids = match collection.operand() {
            Some(operand) => self.evaluate(operand)?,
            None => self.library.ids().collect(),
        };

        let library = self.library;
        Ok(ids
            .into_iter()
            .filter(|id| {
                let actual = library.property(*id, field);
                match (kind, actual, expected) {
                    (FilterKind::Has, actual, _) => actual.is_some(),
                    (FilterKind::NotEqual, None, _) => true,
                    (_, None, _) | (_, _, None) => false,
                    (FilterKind::Equals, Some(a), Some(e)) => loose_eq(&a, e),
                    (FilterKind::NotEqual, Some(a), Some(e)) => !loose_eq(&a, e),
                    (FilterKind::Match, Some(a), Some(e)) => {
                        glob_match(&display_key(e), &display_key(&a))
                    }
                    (FilterKind::Smaller, Some(a), Some(e)) => {
                        matches!((numeric(&a), numeric(e)), (Some(x), Some(y)) if x < y)
                    }
                    (FilterKind::Greater, Some(a), Some(e)) => {
                        matches!((numeric(&a), numeric(e)), (Some(x), Some(y)) if x > y)
                    }
                }
            })
            .collect())
    }

    fn order(&mut self, collection: &Collection) -> Result<Vec<i64>> {
        let mut ids = self.operand_ids(collection)?;
        let descending = collection.attribute_str(ATTR_DIRECTION) == Some(DIRECTION_DESC);

        match collection.attribute_str(ATTR_TYPE).unwrap_or(ORDER_BY_VALUE) {
            ORDER_BY_RANDOM => ids.shuffle(&mut *self.rng),
            ORDER_BY_ID => {
                ids.sort_by(|a, b| directed(a.cmp(b), descending));
            }
            ORDER_BY_VALUE => {
                let field = collection
                    .attribute_str(ATTR_FIELD)
                    .ok_or_else(|| Error::Remote("order node without a field".into()))?;
                let mut keyed: Vec<(i64, Option<Value>)> = ids
                    .into_iter()
                    .map(|id| (id, self.library.property(id, field)))
                    .collect();
                keyed.sort_by(|(_, a), (_, b)| match (a, b) {
                    (Some(a), Some(b)) => directed(compare_values(a, b), descending),
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                });
                ids = keyed.into_iter().map(|(id, _)| id).collect();
            }
            other => {
                return Err(Error::Remote(format!("unknown order type {}", other)));
            }
        }
        Ok(ids)
    }
}

fn directed(ordering: Ordering, descending: bool) -> Ordering {
    if descending {
        ordering.reverse()
    } else {
        ordering
    }
}

fn int_attribute(collection: &Collection, key: &str) -> Result<u64> {
    match collection.attribute(key) {
        None => Ok(0),
        Some(value) => value
            .as_int()
            .and_then(|v| u64::try_from(v).ok())
            .ok_or_else(|| Error::Remote(format!("{} must be a non-negative integer", key))),
    }
}

/// Skip `start` ids and keep `length` of the rest (0 keeps everything)
pub(super) fn window<T>(items: Vec<T>, start: u64, length: u64) -> Vec<T> {
    let skipped = items.into_iter().skip(start as usize);
    if length == 0 {
        skipped.collect()
    } else {
        skipped.take(length as usize).collect()
    }
}

/// Numeric view of a property; numeric strings count
pub(super) fn numeric(value: &Value) -> Option<f64> {
    value
        .as_float()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

/// Total order over property values: numbers before strings, then the rest
pub(super) fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::String(x), Value::String(y)) => x
            .to_lowercase()
            .cmp(&y.to_lowercase())
            .then_with(|| x.cmp(y)),
        _ => match (a.as_float(), b.as_float()) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => match (a.as_str(), b.as_str()) {
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                _ => Ordering::Equal,
            },
        },
    }
}

fn loose_eq(actual: &Value, expected: &Value) -> bool {
    match (numeric(actual), numeric(expected)) {
        (Some(x), Some(y)) => x == y,
        _ => display_key(actual) == display_key(expected),
    }
}

/// String form used for matching and as cluster-dict keys
pub(super) fn display_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.to_string(),
        Value::Int64(i) => i.to_string(),
        Value::Float64(f) => f.to_string(),
        Value::Error(msg) => msg.to_string(),
        other => other.type_name().to_string(),
    }
}

/// Case-insensitive glob with `*` (any run) and `?` (any one character)
pub(super) fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.to_lowercase().chars().collect();
    let text: Vec<char> = text.to_lowercase().chars().collect();

    let (mut p, mut t) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;
    while t < text.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some(&c) if c == '?' || c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match backtrack {
                Some((star, matched)) => {
                    p = star + 1;
                    t = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|c| *c == '*')
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::*;
    use crate::collection::{add_limit_operator, add_order_operators, CollectionNode};

    fn library() -> Library {
        let mut lib = Library::new();
        lib.add([
            ("artist", Value::from("Air")),
            ("album", Value::from("Moon Safari")),
            ("tracknr", Value::Int64(2)),
        ]);
        lib.add([
            ("artist", Value::from("Air")),
            ("album", Value::from("Moon Safari")),
            ("tracknr", Value::Int64(1)),
        ]);
        lib.add([
            ("artist", Value::from("Air")),
            ("album", Value::from("Talkie Walkie")),
            ("tracknr", Value::Int64(1)),
        ]);
        lib.add([
            ("artist", Value::from("Bonobo")),
            ("album", Value::from("Black Sands")),
            ("year", Value::Int64(2010)),
        ]);
        lib.add([("title", Value::from("Untagged"))]);
        lib
    }

    fn eval(lib: &Library, store: &CollectionStore, coll: &Collection) -> Result<Vec<i64>> {
        let mut rng = StdRng::seed_from_u64(1);
        Evaluator::new(lib, store, &mut rng).evaluate(coll)
    }

    #[test]
    fn test_universe_and_idlist() {
        let lib = library();
        let store = CollectionStore::new();
        assert_eq!(eval(&lib, &store, &CollectionNode::universe()).unwrap(), vec![1, 2, 3, 4, 5]);
        assert_eq!(
            eval(&lib, &store, &CollectionNode::id_list([4, 99, 2, 4])).unwrap(),
            vec![4, 2, 4]
        );
    }

    #[test]
    fn test_set_operators() {
        let lib = library();
        let store = CollectionStore::new();
        let a = CollectionNode::id_list([3, 1]);
        let b = CollectionNode::id_list([1, 4, 3]);

        let union = CollectionNode::union(&[a.clone(), b.clone()]);
        assert_eq!(eval(&lib, &store, &union).unwrap(), vec![1, 3, 4]);
        assert_eq!(
            eval(&lib, &store, &CollectionNode::intersection(&[a.clone(), b])).unwrap(),
            vec![3, 1]
        );
        assert_eq!(eval(&lib, &store, &CollectionNode::complement(&a)).unwrap(), vec![2, 4, 5]);
        let empty = CollectionNode::intersection(&[]);
        assert!(eval(&lib, &store, &empty).unwrap().is_empty());
    }

    #[test]
    fn test_filters() {
        let lib = library();
        let store = CollectionStore::new();
        let run = |kind, field: &str, value: Value| {
            eval(&lib, &store, &CollectionNode::filter(kind, field, value, None)).unwrap()
        };

        assert_eq!(run(FilterKind::Equals, "artist", "Air".into()), vec![1, 2, 3]);
        assert_eq!(run(FilterKind::NotEqual, "artist", "Air".into()), vec![4, 5]);
        assert_eq!(run(FilterKind::Match, "album", "moon*".into()), vec![1, 2]);
        assert_eq!(run(FilterKind::Match, "album", "?alkie*".into()), vec![3]);
        assert_eq!(run(FilterKind::Has, "year", Value::None), vec![4]);
        assert_eq!(run(FilterKind::Smaller, "tracknr", 2.into()), vec![2, 3]);
        assert_eq!(run(FilterKind::Greater, "year", "2000".into()), vec![4]);
    }

    #[test]
    fn test_filter_without_value_is_remote_error() {
        let lib = library();
        let store = CollectionStore::new();
        let coll = CollectionNode::filter(FilterKind::Equals, "artist", Value::None, None);
        assert!(matches!(eval(&lib, &store, &coll), Err(Error::Remote(_))));
    }

    #[test]
    fn test_composite_order_breaks_ties_with_secondary_key() {
        let lib = library();
        let store = CollectionStore::new();
        let base = CollectionNode::filter(FilterKind::Equals, "artist", "Air", None);

        let by_album_then_track = add_order_operators(&base, &["album", "tracknr"]);
        assert_eq!(eval(&lib, &store, &by_album_then_track).unwrap(), vec![2, 1, 3]);

        let by_track_then_album_desc = add_order_operators(&base, &["tracknr", "-album"]);
        assert_eq!(eval(&lib, &store, &by_track_then_album_desc).unwrap(), vec![3, 2, 1]);
    }

    #[test]
    fn test_missing_values_sort_last() {
        let lib = library();
        let store = CollectionStore::new();
        let coll = add_order_operators(&CollectionNode::universe(), &["-year"]);
        assert_eq!(eval(&lib, &store, &coll).unwrap()[0], 4);

        let coll = add_order_operators(&CollectionNode::universe(), &["artist"]);
        assert_eq!(eval(&lib, &store, &coll).unwrap(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_limit_after_order() {
        let lib = library();
        let store = CollectionStore::new();
        let ordered = add_order_operators(&CollectionNode::universe(), &["-id"]);

        assert_eq!(eval(&lib, &store, &add_limit_operator(&ordered, 1, 2)).unwrap(), vec![4, 3]);
        assert_eq!(eval(&lib, &store, &add_limit_operator(&ordered, 3, 10)).unwrap(), vec![2, 1]);
        assert_eq!(eval(&lib, &store, &add_limit_operator(&ordered, 2, 0)).unwrap(), vec![3, 2, 1]);
        assert!(eval(&lib, &store, &add_limit_operator(&ordered, 9, 1)).unwrap().is_empty());
    }

    #[test]
    fn test_random_order_is_a_permutation() {
        let lib = library();
        let store = CollectionStore::new();
        let coll = add_order_operators(&CollectionNode::universe(), &["random"]);
        let mut ids = eval(&lib, &store, &coll).unwrap();
        ids.sort();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_references() {
        let lib = library();
        let mut store = CollectionStore::new();
        store.save("Bonobo", Namespace::Collections, CollectionNode::id_list([4])).unwrap();

        let reference = CollectionNode::reference("Bonobo", Namespace::Collections);
        assert_eq!(eval(&lib, &store, &reference).unwrap(), vec![4]);

        let all_media = CollectionNode::reference(ALL_MEDIA, Namespace::Collections);
        assert_eq!(eval(&lib, &store, &all_media).unwrap().len(), 5);

        let missing = CollectionNode::reference("Nope", Namespace::Playlists);
        assert!(matches!(eval(&lib, &store, &missing), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_reference_cycle_is_reported() {
        let lib = library();
        let mut store = CollectionStore::new();
        let loop_ref = CollectionNode::reference("Loop", Namespace::Collections);
        store
            .save("Loop", Namespace::Collections, CollectionNode::union(&[loop_ref.clone()]))
            .unwrap();
        assert!(matches!(eval(&lib, &store, &loop_ref), Err(Error::Remote(_))));
    }

    #[test]
    fn test_glob_match() {
        assert!(glob_match("*", ""));
        assert!(glob_match("a*c", "abbbc"));
        assert!(glob_match("A?C", "abc"));
        assert!(!glob_match("a?c", "ac"));
        assert!(glob_match("*safari", "Moon Safari"));
        assert!(!glob_match("moon", "Moon Safari"));
    }
}
