//! Wire-level identifiers and message shapes shared by client and server

pub mod ids;
pub mod message;

pub use ids::{
    CollectionCommand, ObjectId, SignalId, COMMAND_COLL_SYNC, COMMAND_FIRST,
    COMMAND_SIGNAL_BROADCAST, REPLY_ERROR, REPLY_NOT_FOUND, REPLY_OK,
};
pub use message::{Incoming, Message};
