//! Transport seam
//!
//! A channel carries `Message`s to the peer and hands back `Incoming`
//! replies and broadcasts, in order, on its own reader. Framing and I/O are
//! the channel's business.

use std::sync::Arc;

use crate::error::Result;
use crate::protocol::{Incoming, Message};

/// Receive callback
pub type ReceiveFn = Arc<dyn Fn(Incoming) + Send + Sync>;

/// Disconnect callback
pub type DisconnectFn = Arc<dyn Fn() + Send + Sync>;

/// Reliable, ordered connection to one peer
pub trait Channel: Send + Sync {
    /// Queue `message` for the peer; never blocks
    fn send(&self, message: Message) -> Result<()>;

    fn is_connected(&self) -> bool;

    /// Register a callback for every reply and broadcast
    fn on_receive(&self, callback: ReceiveFn);

    /// Register a callback for the end of the connection
    fn on_disconnect(&self, callback: DisconnectFn);
}
