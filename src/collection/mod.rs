//! Collection algebra
//!
//! Collections describe subsets of the media library declaratively. They
//! are built client side by composing operator nodes and are only ever
//! evaluated by the remote index.
//!
//! ```text
//!   limit(start=20, length=10)
//!        │
//!   order(artist, ASC)          <- primary key, outermost
//!        │
//!   order(album, DESC)          <- tie-breaker
//!        │
//!   intersection ─────┬───────────────┐
//!        │            │               │
//!   reference     filter(has genre)   │
//!   ("Favourites",    │               │
//!    Playlists)       └──── universe ─┘   (shared child)
//! ```
//!
//! Operator nodes hold their operands through `Arc`, so the universe node
//! above is a single allocation referenced twice.

pub mod namespace;
pub mod node;
pub mod ops;

pub use namespace::Namespace;
pub use node::{Collection, CollectionKind, CollectionNode, FilterKind};
pub use ops::{add_limit_operator, add_order_operator, add_order_operators};
