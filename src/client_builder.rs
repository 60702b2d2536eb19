//! Client builder.
//!
//! Provides a fluent builder API for configuring [`KvClient`] instances over
//! an explicit transport.

use crate::{KvClient, Result, TransportPtr, DEFAULT_REQUEST_TIMEOUT};
use std::time::Duration;

/// Builder for creating client instances.
///
/// Accepts a transport and allows configuration of the default request
/// timeout and the identifier used in logs.
///
/// # Example
///
/// ```no_run
/// use kv_mux::{create_memory_transport, KvClientBuilder};
/// use std::time::Duration;
///
/// # async fn example() -> kv_mux::Result<()> {
/// let (transport, _peer) = create_memory_transport("demo").await?;
///
/// let client = KvClientBuilder::new(transport)
///     .client_id("demo-client")
///     .request_timeout(Duration::from_secs(5))
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct KvClientBuilder {
    // ---
    transport: TransportPtr,
    client_id: Option<String>,

    // Request timeout (optional, default: 30s)
    request_timeout: Option<Duration>,
}

impl KvClientBuilder {
    /// Create a new client builder.
    ///
    /// The client's ID defaults to `transport.transport_id()`.
    pub fn new(transport: TransportPtr) -> Self {
        // ---
        Self {
            transport,
            client_id: None,
            request_timeout: None,
        }
    }

    /// Override the identifier used in log output.
    pub fn client_id(mut self, id: impl Into<String>) -> Self {
        self.client_id = Some(id.into());
        self
    }

    /// Set the default per-call timeout.
    ///
    /// Default: 30s.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Build the client (consumes self) and start its dispatch loop.
    ///
    /// # Errors
    ///
    /// Returns `KvError::Transport` if the transport's inbound stream was
    /// already taken.
    pub async fn build(self) -> Result<KvClient> {
        // ---
        let client_id = self
            .client_id
            .unwrap_or_else(|| self.transport.transport_id().to_string());

        let request_timeout = self.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT);

        KvClient::with_transport(self.transport, client_id, request_timeout).await
    }
}
