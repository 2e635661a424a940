//! Query recipes
//!
//! A query is a collection plus a fetch spec. The recipes here compose the
//! collection builders in the one order that makes sense for paging:
//!
//! ```text
//! base ──> order(p1, p2, ...) ──> limit(start, len) ──> fetch(spec)
//! ```
//!
//! Limiting before ordering would page through an unsorted stream.

pub mod fetch;

pub use fetch::{ids_fetch_spec, Aggregate, FetchSpec, FetchType};

use crate::collection::{add_limit_operator, add_order_operators, Collection};

/// Order then limit `collection`
pub fn ordered_window<S: AsRef<str>>(
    collection: &Collection,
    order: &[S],
    start: u32,
    length: u32,
) -> Collection {
    let ordered = add_order_operators(collection, order);
    add_limit_operator(&ordered, start, length)
}

/// Collection and spec for "ordered list of matching ids"
pub fn ids_query<S: AsRef<str>>(
    collection: &Collection,
    order: &[S],
    start: u32,
    length: u32,
) -> (Collection, FetchSpec) {
    (ordered_window(collection, order, start, length), ids_fetch_spec())
}
