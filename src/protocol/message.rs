//! Channel messages
//!
//! `Message` travels client to server, `Incoming` server to client. Both
//! serialize to a fixed header followed by codec-encoded values; how the
//! resulting bytes are framed on the transport is up to the channel.
//!
//! ```text
//! Message:  request_id u32 | object_id u32 | command_id u32 | List(args)
//! Incoming: flags u8 | request_id u32 | object_id u32 | id u32 | payload
//!           flags bit 0 = request_id present (reply), clear = broadcast
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{CodecError, Error, Result};
use crate::value::{codec, Value};

use super::ids::{ObjectId, REPLY_ERROR, REPLY_NOT_FOUND, REPLY_OK};

const FLAG_REPLY: u8 = 0x01;

/// Command sent to the server
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub request_id: u32,
    pub object_id: ObjectId,
    pub command_id: u32,
    pub args: Vec<Value>,
}

impl Message {
    pub fn new(request_id: u32, object_id: ObjectId, command_id: u32, args: Vec<Value>) -> Self {
        Self {
            request_id,
            object_id,
            command_id,
            args,
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut encoder = codec::Encoder::new();
        encoder.encode(&Value::list(self.args.iter().cloned()));
        let body = encoder.finish();

        let mut buf = BytesMut::with_capacity(12 + body.len());
        buf.put_u32(self.request_id);
        buf.put_u32(self.object_id.as_u32());
        buf.put_u32(self.command_id);
        buf.put_slice(&body);
        buf.freeze()
    }

    /// Request and raw object id of an encoded message, read from the header
    /// alone so a message whose body fails to decode can still be answered
    pub fn peek_header(buf: &[u8]) -> Option<(u32, u32)> {
        let mut header = buf.get(..8)?;
        Some((header.get_u32(), header.get_u32()))
    }

    pub fn decode(mut buf: Bytes) -> std::result::Result<Self, CodecError> {
        if buf.remaining() < 12 {
            return Err(CodecError::UnexpectedEof);
        }
        let request_id = buf.get_u32();
        let raw_object = buf.get_u32();
        let object_id =
            ObjectId::from_u32(raw_object).ok_or(CodecError::UnknownObject(raw_object))?;
        let command_id = buf.get_u32();

        let mut decoder = codec::Decoder::new();
        let args = match decoder.decode(&mut buf)? {
            Value::List(items) => items.as_ref().clone(),
            _ => return Err(CodecError::MalformedMessage),
        };

        Ok(Self {
            request_id,
            object_id,
            command_id,
            args,
        })
    }
}

/// Reply or broadcast delivered to the client
#[derive(Debug, Clone, PartialEq)]
pub struct Incoming {
    /// Set for replies, `None` for broadcasts
    pub request_id: Option<u32>,
    pub object_id: u32,
    /// Reply id for replies, signal id for broadcasts
    pub id: u32,
    pub payload: Value,
}

impl Incoming {
    /// Build the reply to `request_id` from a command outcome
    pub fn reply(request_id: u32, object_id: u32, outcome: Result<Value>) -> Self {
        let (id, payload) = match outcome {
            Ok(value) => (REPLY_OK, value),
            Err(Error::NotFound(what)) => (REPLY_NOT_FOUND, Value::error(what)),
            Err(Error::Remote(msg)) => (REPLY_ERROR, Value::error(msg)),
            Err(other) => (REPLY_ERROR, Value::error(other.to_string())),
        };
        Self {
            request_id: Some(request_id),
            object_id,
            id,
            payload,
        }
    }

    /// Build a broadcast of `signal_id`
    pub fn broadcast(object_id: u32, signal_id: u32, payload: Value) -> Self {
        Self {
            request_id: None,
            object_id,
            id: signal_id,
            payload,
        }
    }

    /// Interpret a reply's outcome
    pub fn into_result(self) -> Result<Value> {
        let message = |payload: &Value| {
            payload
                .as_error()
                .or_else(|| payload.as_str())
                .unwrap_or("unknown error")
                .to_string()
        };
        match self.id {
            REPLY_OK => Ok(self.payload),
            REPLY_NOT_FOUND => Err(Error::NotFound(message(&self.payload))),
            _ => Err(Error::Remote(message(&self.payload))),
        }
    }

    pub fn encode(&self) -> Bytes {
        let body = codec::encode(&self.payload);

        let mut buf = BytesMut::with_capacity(13 + body.len());
        buf.put_u8(if self.request_id.is_some() { FLAG_REPLY } else { 0 });
        buf.put_u32(self.request_id.unwrap_or(0));
        buf.put_u32(self.object_id);
        buf.put_u32(self.id);
        buf.put_slice(&body);
        buf.freeze()
    }

    pub fn decode(mut buf: Bytes) -> std::result::Result<Self, CodecError> {
        if buf.remaining() < 13 {
            return Err(CodecError::UnexpectedEof);
        }
        let flags = buf.get_u8();
        let request_id = buf.get_u32();
        let object_id = buf.get_u32();
        let id = buf.get_u32();
        let payload = codec::Decoder::new().decode(&mut buf)?;

        Ok(Self {
            request_id: (flags & FLAG_REPLY != 0).then_some(request_id),
            object_id,
            id,
            payload,
        })
    }
}
