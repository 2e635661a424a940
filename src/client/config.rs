//! Connection configuration

/// Client connection options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Name reported in logs
    pub client_name: String,

    /// Messages that may wait for the reader before `send` fails
    pub queue_capacity: usize,

    /// Encode and decode every message and payload on the loopback channel
    pub wire_roundtrip: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            client_name: "medialib-client".to_string(),
            queue_capacity: 256,
            wire_roundtrip: true,
        }
    }
}

impl ConnectionConfig {
    /// Create a config with a custom client name
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            client_name: name.into(),
            ..Default::default()
        }
    }

    /// Set the send queue capacity (at least 1)
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Pass values through the loopback channel without encoding them
    pub fn skip_wire_roundtrip(mut self) -> Self {
        self.wire_roundtrip = false;
        self
    }
}
