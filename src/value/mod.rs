//! Value tree and its wire codec
//!
//! `Value` is a recursive, reference-counted tagged union. It carries
//! command arguments, replies, broadcast payloads and collection operator
//! trees across the channel.

pub mod codec;
pub mod tree;

pub use codec::{Decoder, Encoder};
pub use tree::{Dict, Value};
