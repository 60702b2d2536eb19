//! Multiplexed request/response client for a key-value store's WebSocket API
//!
//! This library runs many concurrent key-value operations over one persistent
//! connection. It handles message ID allocation, request/response matching,
//! per-call timeouts and cancellation, and resolves every in-flight call when
//! the connection drops.
//!
//! # Example
//!
//! ```no_run
//! use kv_mux::{ClientConfig, KvClient};
//! use serde_json::json;
//!
//! # async fn example() -> kv_mux::Result<()> {
//! let config = ClientConfig::from_env()?;
//! let client = KvClient::connect(&config).await?;
//!
//! client.insert("user:1", json!({"name": "a"})).await?;
//! let user = client.get("user:1").await?;
//! assert_eq!(user, Some(json!({"name": "a"})));
//!
//! client.close().await?;
//! # Ok(())
//! # }
//! ```

// Import all sub modules once...
mod macros;

mod client;
mod domain;
mod protocol;
mod transport;

mod client_builder;
mod client_config;

mod error;
mod sync;

pub(crate) use macros::{log_debug, log_error, log_info, log_trace, log_warn};

// Re-export main types
pub use client::KvClient;
pub use client_builder::KvClientBuilder;

pub use client_config::{ClientConfig, DEFAULT_REQUEST_TIMEOUT, ENV_API_KEY, ENV_BASE_URL};

pub use error::{KvError, Result};

pub use protocol::{
    // ---
    decode_value,
    encode_value,
    merge_values,
    MessageId,
    MessageIdGenerator,
    Operation,
    Request,
    Response,
};

pub use transport::{create_memory_transport, MemoryPeer, MEMORY_CHANNEL_CAPACITY};

#[cfg(feature = "transport_websocket")]
pub use transport::{open_websocket_transport, WebSocketTransport};

// --- public re-exports
pub use domain::{
    //
    Frame,
    Inbound,
    InboundStream,
    Transport,
    TransportPtr,
};

/// Connect to the service described by `config` over WebSocket.
///
/// Shorthand for [`KvClient::connect`].
#[cfg(feature = "transport_websocket")]
pub async fn connect(config: &ClientConfig) -> Result<KvClient> {
    // ---
    KvClient::connect(config).await
}
