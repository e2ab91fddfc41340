//! Outgoing wire frames

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::sync::Arc;

/// An immutable, fully framed outgoing message.
///
/// Built fresh by a codec for every command and never mutated afterwards.
/// Cloning shares the underlying buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OutgoingFrame {
    bytes: Arc<[u8]>,
}

impl OutgoingFrame {
    /// Wrap finished frame bytes
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes: bytes.into() }
    }

    /// Raw frame bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Frame length in bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the frame holds no bytes
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Base64 rendering, as carried in Scratch Link `write` requests.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }
}

impl AsRef<[u8]> for OutgoingFrame {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl From<Vec<u8>> for OutgoingFrame {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}
