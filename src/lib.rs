//! Object dispatch engine and collection query algebra for a media server
//!
//! The crate is built from the leaves up:
//!
//! - [`value`]: the refcounted value tree that crosses the process
//!   boundary, and its binary codec
//! - [`object`]: refcounted objects with a command table and a multicast
//!   signal table, plus `emit`/`call`
//! - [`collection`]: collection operator DAGs and the order/limit builders
//! - [`query`]: fetch-spec builder and the `query_ids` recipe
//! - [`protocol`]: object, command, signal and reply ids, and messages
//! - [`client`]: connection, pending replies and the collection commands
//! - [`index`]: in-process evaluator answering the collection commands
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use medialib_rs::client::{coll_query_ids, Connection, LoopbackChannel};
//! use medialib_rs::collection::{CollectionNode, FilterKind};
//! use medialib_rs::index::CollectionService;
//!
//! # async fn run() -> medialib_rs::Result<()> {
//! let service = Arc::new(CollectionService::new());
//! service.add_media([("artist", "Air"), ("title", "Sexy Boy")]);
//!
//! let channel = LoopbackChannel::spawn(Arc::clone(&service));
//! let conn = Connection::new(channel);
//!
//! let air = CollectionNode::filter(FilterKind::Equals, "artist", "Air", None);
//! let ids = coll_query_ids(&conn, &air, &["title"], 0, 0)?.wait().await?;
//! println!("{:?}", ids);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod collection;
pub mod error;
pub mod index;
pub mod object;
pub mod protocol;
pub mod query;
pub mod value;

pub use client::{Connection, PendingReply};
pub use collection::{Collection, CollectionNode, Namespace};
pub use error::{Error, Result};
pub use object::Object;
pub use value::{Dict, Value};

#[cfg(test)]
pub(crate) fn init_test_tracing() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
