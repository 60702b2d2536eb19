//! Transport implementations.
//!
//! This module provides concrete implementations of the domain-level
//! `Transport` trait. Network transports are hidden behind feature flags and
//! exposed only through constructor functions.
//!
//! Domain code must not depend on transport-specific types.

mod memory;

#[cfg(feature = "transport_websocket")]
mod websocket;

pub use memory::{create_memory_transport, MemoryPeer, MEMORY_CHANNEL_CAPACITY};

#[cfg(feature = "transport_websocket")]
pub use websocket::{open_websocket_transport, WebSocketTransport};
