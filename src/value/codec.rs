//! Binary value codec
//!
//! Serializes `Value` trees for the channel. Every value starts with a
//! one-byte type marker; integers are big-endian and lengths are u32.
//!
//! Type Markers:
//! ```text
//! 0x00 - None
//! 0x01 - Int64 (8 bytes)
//! 0x02 - Float64 (IEEE 754 double)
//! 0x03 - String (u32 length + UTF-8)
//! 0x04 - Binary (u32 length + bytes)
//! 0x05 - List (u32 count + values)
//! 0x06 - Dict (u32 count + (u32 key length, key, value) pairs)
//! 0x07 - Collection (kind, attributes, idlist, operands)
//! 0x08 - Error (u32 length + UTF-8)
//! 0x09 - Collection reference (u32 index)
//! ```
//!
//! Collection nodes are numbered post-order as they are written. A node
//! that was already written in the same message is emitted as a reference
//! to its number, so a DAG is decoded back into a DAG with the same sharing
//! instead of being expanded into a tree.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::tree::{Dict, Value};
use crate::collection::{Collection, CollectionKind, CollectionNode};
use crate::error::CodecError;

const MARKER_NONE: u8 = 0x00;
const MARKER_INT64: u8 = 0x01;
const MARKER_FLOAT64: u8 = 0x02;
const MARKER_STRING: u8 = 0x03;
const MARKER_BINARY: u8 = 0x04;
const MARKER_LIST: u8 = 0x05;
const MARKER_DICT: u8 = 0x06;
const MARKER_COLLECTION: u8 = 0x07;
const MARKER_ERROR: u8 = 0x08;
const MARKER_REFERENCE: u8 = 0x09;

/// Maximum nesting depth for lists, dicts and collections
const MAX_NESTING_DEPTH: usize = 128;

/// Value decoder
pub struct Decoder {
    /// Collection nodes decoded so far in this message, in post-order
    references: Vec<Collection>,
    /// Current nesting depth
    depth: usize,
}

impl Decoder {
    pub fn new() -> Self {
        Self {
            references: Vec::new(),
            depth: 0,
        }
    }

    /// Reset decoder state (call between messages)
    pub fn reset(&mut self) {
        self.references.clear();
        self.depth = 0;
    }

    /// Decode a single value from the buffer
    pub fn decode(&mut self, buf: &mut Bytes) -> Result<Value, CodecError> {
        if buf.is_empty() {
            return Err(CodecError::UnexpectedEof);
        }

        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            self.depth -= 1;
            return Err(CodecError::NestingTooDeep);
        }

        let marker = buf.get_u8();
        let result = self.decode_value(marker, buf);
        self.depth -= 1;
        result
    }

    /// Decode all values until the buffer is exhausted
    pub fn decode_all(&mut self, buf: &mut Bytes) -> Result<Vec<Value>, CodecError> {
        let mut values = Vec::new();
        while buf.has_remaining() {
            values.push(self.decode(buf)?);
        }
        Ok(values)
    }

    fn decode_value(&mut self, marker: u8, buf: &mut Bytes) -> Result<Value, CodecError> {
        match marker {
            MARKER_NONE => Ok(Value::None),
            MARKER_INT64 => {
                ensure(buf, 8)?;
                Ok(Value::Int64(buf.get_i64()))
            }
            MARKER_FLOAT64 => {
                ensure(buf, 8)?;
                Ok(Value::Float64(buf.get_f64()))
            }
            MARKER_STRING => Ok(Value::String(Arc::from(read_str(buf)?.as_str()))),
            MARKER_ERROR => Ok(Value::Error(Arc::from(read_str(buf)?.as_str()))),
            MARKER_BINARY => {
                let len = read_len(buf)?;
                ensure(buf, len)?;
                Ok(Value::Binary(buf.split_to(len)))
            }
            MARKER_LIST => self.decode_list(buf),
            MARKER_DICT => self.decode_dict(buf),
            MARKER_COLLECTION => Ok(Value::Collection(self.decode_collection(buf)?)),
            MARKER_REFERENCE => Ok(Value::Collection(self.decode_reference(buf)?)),
            other => Err(CodecError::UnknownMarker(other)),
        }
    }

    fn decode_list(&mut self, buf: &mut Bytes) -> Result<Value, CodecError> {
        let count = read_len(buf)?;
        let mut items = Vec::with_capacity(count.min(1024)); // Cap initial allocation
        for _ in 0..count {
            items.push(self.decode(buf)?);
        }
        Ok(Value::List(Arc::new(items)))
    }

    fn decode_dict(&mut self, buf: &mut Bytes) -> Result<Value, CodecError> {
        Ok(Value::Dict(Arc::new(self.read_dict(buf)?)))
    }

    fn read_dict(&mut self, buf: &mut Bytes) -> Result<Dict, CodecError> {
        let count = read_len(buf)?;
        let mut dict = Dict::with_capacity(count.min(1024));
        for _ in 0..count {
            let key = read_str(buf)?;
            let value = self.decode(buf)?;
            dict.insert(key, value);
        }
        Ok(dict)
    }

    fn decode_collection(&mut self, buf: &mut Bytes) -> Result<Collection, CodecError> {
        ensure(buf, 1)?;
        let kind_byte = buf.get_u8();
        let kind = CollectionKind::from_u8(kind_byte)
            .ok_or(CodecError::UnknownCollectionKind(kind_byte))?;

        let mut node = CollectionNode::new(kind);
        for (key, value) in self.read_dict(buf)? {
            node = node.with_attribute(key, value);
        }

        let id_count = read_len(buf)?;
        ensure(buf, id_count.saturating_mul(8))?;
        node = node.with_idlist((0..id_count).map(|_| buf.get_i64()));

        let operand_count = read_len(buf)?;
        for _ in 0..operand_count {
            let operand = match self.decode(buf)? {
                Value::Collection(c) => c,
                _ => return Err(CodecError::ExpectedCollection),
            };
            node = node.with_operand(&operand);
        }

        let node = node.into_shared();
        self.references.push(Arc::clone(&node));
        Ok(node)
    }

    fn decode_reference(&mut self, buf: &mut Bytes) -> Result<Collection, CodecError> {
        ensure(buf, 4)?;
        let index = buf.get_u32();
        self.references
            .get(index as usize)
            .cloned()
            .ok_or(CodecError::InvalidReference(index))
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

fn ensure(buf: &Bytes, len: usize) -> Result<(), CodecError> {
    if buf.remaining() < len {
        Err(CodecError::UnexpectedEof)
    } else {
        Ok(())
    }
}

fn read_len(buf: &mut Bytes) -> Result<usize, CodecError> {
    ensure(buf, 4)?;
    Ok(buf.get_u32() as usize)
}

/// Read UTF-8 string with 32-bit length prefix
fn read_str(buf: &mut Bytes) -> Result<String, CodecError> {
    let len = read_len(buf)?;
    ensure(buf, len)?;
    let bytes = buf.copy_to_bytes(len);
    String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidUtf8)
}

/// Value encoder
pub struct Encoder {
    buf: BytesMut,
    /// Collection nodes written in the current message, keyed by address
    written: HashMap<usize, u32>,
}

impl Encoder {
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            written: HashMap::new(),
        }
    }

    /// Get the encoded bytes and reset the encoder for the next message
    pub fn finish(&mut self) -> Bytes {
        self.written.clear();
        self.buf.split().freeze()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Encode a single value
    pub fn encode(&mut self, value: &Value) {
        match value {
            Value::None => self.buf.put_u8(MARKER_NONE),
            Value::Int64(i) => {
                self.buf.put_u8(MARKER_INT64);
                self.buf.put_i64(*i);
            }
            Value::Float64(f) => {
                self.buf.put_u8(MARKER_FLOAT64);
                self.buf.put_f64(*f);
            }
            Value::String(s) => {
                self.buf.put_u8(MARKER_STRING);
                self.write_str(s);
            }
            Value::Error(msg) => {
                self.buf.put_u8(MARKER_ERROR);
                self.write_str(msg);
            }
            Value::Binary(b) => {
                self.buf.put_u8(MARKER_BINARY);
                self.buf.put_u32(b.len() as u32);
                self.buf.put_slice(b);
            }
            Value::List(items) => {
                self.buf.put_u8(MARKER_LIST);
                self.buf.put_u32(items.len() as u32);
                for item in items.iter() {
                    self.encode(item);
                }
            }
            Value::Dict(dict) => {
                self.buf.put_u8(MARKER_DICT);
                self.write_dict(dict);
            }
            Value::Collection(node) => self.encode_collection(node),
        }
    }

    /// Encode multiple values
    pub fn encode_all(&mut self, values: &[Value]) {
        for value in values {
            self.encode(value);
        }
    }

    fn encode_collection(&mut self, node: &Collection) {
        let key = Arc::as_ptr(node) as usize;
        if let Some(&index) = self.written.get(&key) {
            self.buf.put_u8(MARKER_REFERENCE);
            self.buf.put_u32(index);
            return;
        }

        self.buf.put_u8(MARKER_COLLECTION);
        self.buf.put_u8(node.kind().as_u8());
        self.write_dict(node.attributes());

        self.buf.put_u32(node.idlist().len() as u32);
        for id in node.idlist() {
            self.buf.put_i64(*id);
        }

        self.buf.put_u32(node.operands().len() as u32);
        for operand in node.operands() {
            self.encode_collection(operand);
        }

        // Numbered after the operands, matching the decoder's post-order
        let index = self.written.len() as u32;
        self.written.insert(key, index);
    }

    fn write_dict(&mut self, dict: &Dict) {
        self.buf.put_u32(dict.len() as u32);
        for (key, value) in dict {
            self.write_str(key);
            self.encode(value);
        }
    }

    /// Write UTF-8 string with 32-bit length prefix (no type marker)
    fn write_str(&mut self, s: &str) {
        self.buf.put_u32(s.len() as u32);
        self.buf.put_slice(s.as_bytes());
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience function to encode a single value
pub fn encode(value: &Value) -> Bytes {
    let mut encoder = Encoder::new();
    encoder.encode(value);
    encoder.finish()
}

/// Convenience function to encode multiple values as one message
pub fn encode_all(values: &[Value]) -> Bytes {
    let mut encoder = Encoder::new();
    encoder.encode_all(values);
    encoder.finish()
}

/// Convenience function to decode a single value
pub fn decode(data: &[u8]) -> Result<Value, CodecError> {
    let mut decoder = Decoder::new();
    let mut buf = Bytes::copy_from_slice(data);
    decoder.decode(&mut buf)
}

/// Convenience function to decode all values of one message
pub fn decode_all(data: &[u8]) -> Result<Vec<Value>, CodecError> {
    let mut decoder = Decoder::new();
    let mut buf = Bytes::copy_from_slice(data);
    decoder.decode_all(&mut buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::{add_limit_operator, add_order_operators, FilterKind, Namespace};

    #[test]
    fn test_nested_value_roundtrip() {
        let value = Value::dict([
            ("type", Value::from("cluster-list")),
            ("count", Value::Int64(-7)),
            ("ratio", Value::Float64(0.25)),
            ("blob", Value::Binary(Bytes::from_static(&[0, 1, 2, 0xff]))),
            ("get", Value::list(["id", "title"])),
            ("missing", Value::None),
            ("failure", Value::error("no such collection")),
        ]);

        let decoded = decode(&encode(&value)).unwrap();
        assert_eq!(decoded, value);

        let keys: Vec<&String> = decoded.as_dict().unwrap().keys().collect();
        assert_eq!(
            keys,
            vec!["type", "count", "ratio", "blob", "get", "missing", "failure"]
        );
    }

    #[test]
    fn test_multiple_values() {
        let values = vec![Value::from("Favourites"), Value::from("Playlists"), Value::None];
        assert_eq!(decode_all(&encode_all(&values)).unwrap(), values);
    }

    #[test]
    fn test_collection_dag_keeps_structure_and_sharing() {
        let shared = CollectionNode::filter(FilterKind::Equals, "artist", "Low", None);
        let saved = CollectionNode::reference("Favourites", Namespace::Playlists);
        let left = CollectionNode::intersection(&[saved, shared.clone()]);
        let right = CollectionNode::complement(&shared);
        let root = CollectionNode::union(&[left, right]);
        let root = add_limit_operator(&add_order_operators(&root, &["album", "-tracknr"]), 2, 3);

        let encoded = encode(&Value::Collection(root.clone()));
        let decoded = decode(&encoded).unwrap();
        let decoded = decoded.as_collection().unwrap();

        assert_eq!(**decoded, *root);

        // limit -> order -> order -> union
        let union = decoded.operand().unwrap().operand().unwrap().operand().unwrap();
        assert_eq!(union.kind(), CollectionKind::Union);
        let from_left = &union.operands()[0].operands()[1];
        let from_right = union.operands()[1].operand().unwrap();
        assert!(Arc::ptr_eq(from_left, from_right));
    }

    #[test]
    fn test_shared_node_is_written_once() {
        let idlist = CollectionNode::id_list(0..64);
        let twice = CollectionNode::union(&[idlist.clone(), idlist.clone()]);
        let once = CollectionNode::union(&[idlist]);

        let twice_len = encode(&Value::Collection(twice)).len();
        let once_len = encode(&Value::Collection(once)).len();
        // second occurrence is a 5-byte reference
        assert_eq!(twice_len, once_len + 5);
    }

    #[test]
    fn test_references_do_not_leak_between_messages() {
        let node = CollectionNode::universe();
        let mut encoder = Encoder::new();

        encoder.encode(&Value::Collection(node.clone()));
        let first = encoder.finish();
        encoder.encode(&Value::Collection(node));
        let second = encoder.finish();

        assert_eq!(first, second);
        assert_eq!(first[0], MARKER_COLLECTION);
    }

    #[test]
    fn test_truncated_input() {
        let encoded = encode(&Value::from("hello world"));
        assert_eq!(
            decode(&encoded[..encoded.len() - 1]),
            Err(CodecError::UnexpectedEof)
        );
        assert_eq!(decode(&[]), Err(CodecError::UnexpectedEof));
        assert_eq!(decode(&[MARKER_INT64, 0, 0]), Err(CodecError::UnexpectedEof));
    }

    #[test]
    fn test_unknown_marker() {
        assert_eq!(decode(&[0x42]), Err(CodecError::UnknownMarker(0x42)));
    }

    #[test]
    fn test_dangling_reference() {
        assert_eq!(
            decode(&[MARKER_REFERENCE, 0, 0, 0, 3]),
            Err(CodecError::InvalidReference(3))
        );
    }

    #[test]
    fn test_unknown_collection_kind() {
        assert_eq!(
            decode(&[MARKER_COLLECTION, 0x63]),
            Err(CodecError::UnknownCollectionKind(0x63))
        );
    }

    #[test]
    fn test_operand_must_be_collection() {
        let mut bytes = vec![MARKER_COLLECTION, CollectionKind::Complement.as_u8()];
        bytes.extend_from_slice(&0u32.to_be_bytes()); // attributes
        bytes.extend_from_slice(&0u32.to_be_bytes()); // idlist
        bytes.extend_from_slice(&1u32.to_be_bytes()); // operands
        bytes.push(MARKER_NONE);
        assert_eq!(decode(&bytes), Err(CodecError::ExpectedCollection));
    }

    #[test]
    fn test_invalid_utf8() {
        let bytes = [MARKER_STRING, 0, 0, 0, 2, 0xc3, 0x28];
        assert_eq!(decode(&bytes), Err(CodecError::InvalidUtf8));
    }

    #[test]
    fn test_nesting_limit() {
        let mut value = Value::None;
        for _ in 0..(MAX_NESTING_DEPTH + 1) {
            value = Value::list(vec![value]);
        }
        assert_eq!(decode(&encode(&value)), Err(CodecError::NestingTooDeep));
    }
}
