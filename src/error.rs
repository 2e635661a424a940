//! Error types
//!
//! `Error` is the taxonomy surfaced by the public API. Local validation
//! failures are returned synchronously and never reach the channel; remote
//! failures only ever show up through a failed `PendingReply`.

use std::fmt;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Missing or empty required argument, caught before anything is sent
    InvalidArgument(String),
    /// No channel available at call time
    NotConnected,
    /// No matching subscription, or a remote lookup miss
    NotFound(String),
    /// Evaluator failure; the message is opaque and passed through verbatim
    Remote(String),
    /// The pending reply was cancelled by the caller
    Cancelled,
    /// The channel's send queue is full
    QueueFull,
    /// Wire codec failure
    Codec(CodecError),
}

impl Error {
    /// Shorthand for `Error::InvalidArgument`
    pub fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            Error::NotConnected => write!(f, "Not connected"),
            Error::NotFound(what) => write!(f, "Not found: {}", what),
            Error::Remote(msg) => write!(f, "Remote error: {}", msg),
            Error::Cancelled => write!(f, "Cancelled"),
            Error::QueueFull => write!(f, "Send queue full"),
            Error::Codec(e) => write!(f, "Codec error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Codec(e) => Some(e),
            _ => None,
        }
    }
}

impl From<CodecError> for Error {
    fn from(e: CodecError) -> Self {
        Error::Codec(e)
    }
}

/// Wire codec errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Input ended in the middle of a value
    UnexpectedEof,
    /// Unknown type marker
    UnknownMarker(u8),
    /// String payload is not valid UTF-8
    InvalidUtf8,
    /// Collection reference points past the reference table
    InvalidReference(u32),
    /// Unknown collection kind byte
    UnknownCollectionKind(u8),
    /// An operand slot held something other than a collection
    ExpectedCollection,
    /// Nesting exceeds the decoder limit
    NestingTooDeep,
    /// Message addressed to an object id outside the known set
    UnknownObject(u32),
    /// Message body does not have the expected shape
    MalformedMessage,
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::UnexpectedEof => write!(f, "Unexpected end of input"),
            CodecError::UnknownMarker(m) => write!(f, "Unknown type marker: 0x{:02x}", m),
            CodecError::InvalidUtf8 => write!(f, "Invalid UTF-8 in string"),
            CodecError::InvalidReference(idx) => write!(f, "Invalid collection reference: {}", idx),
            CodecError::UnknownCollectionKind(k) => write!(f, "Unknown collection kind: {}", k),
            CodecError::ExpectedCollection => write!(f, "Expected a collection operand"),
            CodecError::NestingTooDeep => write!(f, "Nesting too deep"),
            CodecError::UnknownObject(id) => write!(f, "Unknown object id: {}", id),
            CodecError::MalformedMessage => write!(f, "Malformed message"),
        }
    }
}

impl std::error::Error for CodecError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(
            Error::invalid("empty fetch list").to_string(),
            "Invalid argument: empty fetch list"
        );
        assert_eq!(Error::NotConnected.to_string(), "Not connected");
        assert_eq!(
            Error::from(CodecError::UnknownMarker(0xfe)).to_string(),
            "Codec error: Unknown type marker: 0xfe"
        );
    }

    #[test]
    fn test_codec_source() {
        use std::error::Error as _;

        let err = Error::from(CodecError::UnexpectedEof);
        assert!(err.source().is_some());
        assert!(Error::Cancelled.source().is_none());
    }
}
