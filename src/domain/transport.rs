// src/domain/transport.rs

//! Transport domain abstractions.
//!
//! This module defines the session-level interface the client multiplexer is
//! built on. It intentionally avoids any reference to concrete protocols or
//! client libraries.
//!
//! A transport owns exactly one bidirectional, message-oriented connection.
//! It delivers opaque [`Frame`]s in arrival order and reports termination.
//! Request identifiers, correlation, timeouts and draining of in-flight calls
//! are handled one layer up, in the client.
//!
//! Concrete implementations of this interface live under `src/transport/`.
use crate::Result;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;

/// One discrete message unit exchanged over the connection.
///
/// Frames are immutable and cheap to clone. The transport never interprets
/// their content.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame(Bytes);

impl Frame {
    // ---

    /// Borrow the frame content.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consume the frame, returning its content.
    pub fn into_bytes(self) -> Bytes {
        self.0
    }

    /// Length of the frame content in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the frame has no content.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // ---
        match std::str::from_utf8(&self.0) {
            Ok(text) => write!(f, "Frame({text:?})"),
            Err(_) => write!(f, "Frame({} bytes)", self.0.len()),
        }
    }
}

impl From<Bytes> for Frame {
    fn from(bytes: Bytes) -> Self {
        Frame(bytes)
    }
}

impl From<Vec<u8>> for Frame {
    fn from(bytes: Vec<u8>) -> Self {
        Frame(Bytes::from(bytes))
    }
}

impl From<String> for Frame {
    fn from(text: String) -> Self {
        Frame(Bytes::from(text))
    }
}

impl From<&'static str> for Frame {
    fn from(text: &'static str) -> Self {
        Frame(Bytes::from_static(text.as_bytes()))
    }
}

/// Item yielded by the inbound stream.
///
/// `Ok` carries the next frame. An `Err` is terminal: the connection ended
/// abnormally and no further items follow. A graceful close simply ends the
/// stream.
pub type Inbound = Result<Frame>;

/// Receiving half of a transport session.
///
/// Obtained once per transport via [`Transport::receive`]. The stream ends
/// (`recv()` returns `None`) once the connection has terminated.
pub struct InboundStream {
    // ---
    /// Frames in wire arrival order.
    pub inbox: mpsc::Receiver<Inbound>,
}

impl InboundStream {
    /// Wait for the next inbound item.
    pub async fn recv(&mut self) -> Option<Inbound> {
        self.inbox.recv().await
    }
}

/// Transport abstraction.
///
/// Implementations must ensure that:
/// - Frames handed to `send()` by concurrent callers are written whole and
///   never interleaved.
/// - The inbound stream yields frames in arrival order.
/// - Termination is surfaced by ending the inbound stream, optionally after
///   one terminal error item.
/// - `close()` is idempotent and safe to call from any task.
///
/// The in-memory transport serves as the reference implementation of these
/// semantics.
///
/// # Available Implementations
///
/// - `create_memory_transport` - in-process pair (always available)
/// - `open_websocket_transport` - WebSocket session (`transport_websocket` feature)
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    // ---

    /// Identifier used in log output.
    fn transport_id(&self) -> &str;

    /// Write one frame to the connection.
    ///
    /// # Errors
    ///
    /// Returns `KvError::Send` if the frame cannot be written or the
    /// connection is no longer writable.
    async fn send(&self, frame: Frame) -> Result<()>;

    /// Take the inbound frame stream.
    ///
    /// # Errors
    ///
    /// Returns `KvError::Transport` if the stream was already taken.
    async fn receive(&self) -> Result<InboundStream>;

    /// Close the connection and release associated resources.
    async fn close(&self) -> Result<()>;
}

/// Shared transport pointer.
///
/// `.clone()` only increments a reference count; all clones share the same
/// underlying connection.
pub type TransportPtr = Arc<dyn Transport>;
