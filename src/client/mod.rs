//! Client side of the collection protocol
//!
//! A `Connection` sits on top of any `Channel`. The functions in
//! [`collections`] turn collection operations into commands on it and
//! return a `PendingReply` per command. `LoopbackChannel` connects to an
//! in-process `CollectionService`.

pub mod channel;
pub mod collections;
pub mod config;
pub mod connection;
pub mod loopback;
pub mod pending;

pub use channel::{Channel, DisconnectFn, ReceiveFn};
pub use collections::{
    broadcast_collection_changed, coll_find, coll_get, coll_idlist_from_playlist_file, coll_list,
    coll_query, coll_query_ids, coll_query_infos, coll_remove, coll_rename, coll_save, coll_sync,
};
pub use config::ConnectionConfig;
pub use connection::{BroadcastHandle, Connection};
pub use loopback::LoopbackChannel;
pub use pending::{PendingReply, ReplyStatus};
