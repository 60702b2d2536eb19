//! WebSocket transport implementation using `tokio-tungstenite`.
//!
//! ## Concurrency model
//!
//! - The socket is split into a write half and a read half.
//! - The write half sits behind an async mutex, so concurrent `send()` calls
//!   are serialized and whole messages are never interleaved.
//! - A single background **reader task** owns the read half. It forwards text
//!   and binary messages, in arrival order, into the channel handed out by
//!   `receive()`.
//!
//! ## Termination
//!
//! - A close message from the server ends the inbound stream gracefully.
//! - A read error is forwarded as one terminal error item, then the stream
//!   ends.
//! - `close()` sends a close message, stops the reader task and ends the
//!   stream. It is idempotent.
//! - Termination from either side releases every `send()` still waiting for
//!   the write half with `KvError::ConnectionClosed`; a stalled socket can
//!   not pin callers.
//!
//! Ping, pong and raw frames are skipped; tungstenite answers pings itself.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use url::Url;

use crate::sync::lock_ignore_poison;
use crate::{
    // ---
    log_debug,
    log_error,
    log_info,
    log_trace,
    log_warn,
    Frame,
    Inbound,
    InboundStream,
    KvError,
    Result,
    Transport,
    TransportPtr,
};

/// Query parameter carrying the credential.
pub(crate) const CREDENTIAL_PARAM: &str = "apiKey";

/// Queue depth between the reader task and the dispatch loop.
const INBOX_CAPACITY: usize = 256;

/// How long `close()` waits to hand the close message to the socket.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// WebSocket-based implementation of the `Transport` trait.
///
/// Generic over the byte stream so tests can run it over an in-process
/// duplex pipe; [`open_websocket_transport`] uses a TCP (optionally TLS)
/// connection.
pub struct WebSocketTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    // ---
    transport_id: String,
    sink: AsyncMutex<SplitSink<WebSocketStream<S>, Message>>,
    inbound_rx: Mutex<Option<mpsc::Receiver<Inbound>>>,
    reader: Mutex<Option<JoinHandle<()>>>,

    /// Flips to `true` on termination from either side.
    closed: Arc<watch::Sender<bool>>,
}

impl<S> WebSocketTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    // ---

    /// Wrap an already-established WebSocket and start the reader task.
    pub fn from_stream(ws: WebSocketStream<S>, transport_id: impl Into<String>) -> Self {
        // ---
        let transport_id = transport_id.into();
        let (sink, stream) = ws.split();
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOX_CAPACITY);
        let closed = Arc::new(watch::channel(false).0);

        let reader = tokio::spawn(read_loop(
            transport_id.clone(),
            stream,
            inbound_tx,
            closed.clone(),
        ));

        Self {
            transport_id,
            sink: AsyncMutex::new(sink),
            inbound_rx: Mutex::new(Some(inbound_rx)),
            reader: Mutex::new(Some(reader)),
            closed,
        }
    }

    /// Whether the connection has terminated or been closed.
    pub fn is_closed(&self) -> bool {
        // ---
        *self.closed.borrow()
    }
}

/// Reader task: forward inbound messages until the connection terminates.
async fn read_loop<S>(
    _transport_id: String,
    mut stream: SplitStream<WebSocketStream<S>>,
    inbound_tx: mpsc::Sender<Inbound>,
    closed: Arc<watch::Sender<bool>>,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    // ---
    log_debug!("{_transport_id}: reader task started");

    while let Some(next) = stream.next().await {
        let frame = match next {
            Ok(Message::Text(text)) => Frame::from(text),
            Ok(Message::Binary(data)) => Frame::from(data),
            Ok(Message::Close(_reason)) => {
                log_info!("{_transport_id}: server closed connection: {_reason:?}");
                break;
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => continue,
            Err(err) => {
                log_warn!("{_transport_id}: websocket read failed: {err}");
                let _ = inbound_tx
                    .send(Err(KvError::Transport(format!("websocket recv: {err}"))))
                    .await;
                break;
            }
        };

        log_trace!("{_transport_id}: inbound {frame:?}");

        if inbound_tx.send(Ok(frame)).await.is_err() {
            log_debug!("{_transport_id}: inbound stream dropped, stopping reader");
            break;
        }
    }

    closed.send_replace(true);
    log_debug!("{_transport_id}: reader task stopped");
}

#[async_trait]
impl<S> Transport for WebSocketTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    // ---
    fn transport_id(&self) -> &str {
        &self.transport_id
    }

    /// Send one frame as a text message (binary if it is not valid UTF-8).
    ///
    /// Fails with `KvError::ConnectionClosed` once the connection has
    /// terminated, including while waiting for the write half.
    async fn send(&self, frame: Frame) -> Result<()> {
        // ---
        let mut closed = self.closed.subscribe();
        if *closed.borrow_and_update() {
            return Err(KvError::ConnectionClosed);
        }

        let bytes = frame.into_bytes();
        let msg = match std::str::from_utf8(&bytes) {
            Ok(text) => Message::text(text),
            Err(_) => Message::binary(bytes.to_vec()),
        };

        let write = async {
            let mut sink = self.sink.lock().await;
            sink.send(msg).await
        };

        tokio::select! {
            res = write => res.map_err(|e| KvError::Send(format!("websocket send: {e}"))),
            _ = closed.wait_for(|done| *done) => Err(KvError::ConnectionClosed),
        }
    }

    async fn receive(&self) -> Result<InboundStream> {
        // ---
        let inbox = lock_ignore_poison(&self.inbound_rx)
            .take()
            .ok_or_else(|| KvError::Transport("inbound stream already taken".into()))?;

        Ok(InboundStream { inbox })
    }

    async fn close(&self) -> Result<()> {
        // ---
        if self.closed.send_replace(true) {
            // Reader may have seen the close first; still stop it below.
            log_trace!("{}: close on terminated websocket", self.transport_id);
        }

        // Waiting senders have been released above, so the write half frees
        // up unless the socket itself is stalled.
        let goodbye = async {
            let mut sink = self.sink.lock().await;
            let _ = sink.send(Message::Close(None)).await;
        };
        if tokio::time::timeout(CLOSE_GRACE, goodbye).await.is_err() {
            log_warn!("{}: close message not sent, socket stalled", self.transport_id);
        }

        let reader = lock_ignore_poison(&self.reader).take();
        if let Some(reader) = reader {
            reader.abort();
            log_debug!("{}: websocket closed", self.transport_id);
        }

        Ok(())
    }
}

/// Attach the credential to an already-normalized `ws://` / `wss://` URL.
pub(crate) fn with_credential(endpoint: &str, credential: Option<&str>) -> Result<Url> {
    // ---
    let mut url =
        Url::parse(endpoint).map_err(|e| KvError::InvalidEndpoint(format!("{endpoint}: {e}")))?;

    match url.scheme() {
        "ws" | "wss" => {}
        other => {
            return Err(KvError::InvalidEndpoint(format!(
                "unsupported scheme {other:?}, expected ws or wss"
            )))
        }
    }

    if let Some(credential) = credential {
        let already_set = url.query_pairs().any(|(k, _)| k == CREDENTIAL_PARAM);
        if !already_set {
            url.query_pairs_mut()
                .append_pair(CREDENTIAL_PARAM, credential);
        }
    }

    Ok(url)
}

/// URL without its query, safe to log.
pub(crate) fn redacted(url: &Url) -> String {
    // ---
    let mut shown = url.clone();
    shown.set_query(None);
    shown.to_string()
}

/// Open a WebSocket session.
///
/// `endpoint` must already use the `ws` or `wss` scheme (see
/// [`ClientConfig::websocket_url`](crate::ClientConfig::websocket_url)). When
/// `credential` is given it is attached as the `apiKey` query parameter
/// unless the endpoint already carries one.
///
/// # Errors
///
/// - `KvError::InvalidEndpoint` if the endpoint is not a `ws`/`wss` URL
/// - `KvError::Connect` if the TCP, TLS or WebSocket handshake fails
pub async fn open_websocket_transport(
    endpoint: &str,
    credential: Option<&str>,
) -> Result<TransportPtr> {
    // ---
    let url = with_credential(endpoint, credential)?;
    let transport_id = redacted(&url);

    log_debug!("{transport_id}: connecting");

    let (ws, _response) = tokio_tungstenite::connect_async(url.as_str())
        .await
        .map_err(|e| {
            log_error!("{transport_id}: connection failed: {e}");
            KvError::Connect(format!("{transport_id}: {e}"))
        })?;

    log_info!("{transport_id}: websocket connection established");

    Ok(Arc::new(WebSocketTransport::from_stream(ws, transport_id)))
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_with_credential_appends_api_key() {
        // ---
        let url = with_credential("wss://api.example.com/ws", Some("k3y")).unwrap();
        assert_eq!(url.as_str(), "wss://api.example.com/ws?apiKey=k3y");
    }

    #[test]
    fn test_with_credential_keeps_existing_key() {
        // ---
        let url = with_credential("ws://localhost:8080/ws?apiKey=old", Some("new")).unwrap();
        assert_eq!(url.as_str(), "ws://localhost:8080/ws?apiKey=old");
    }

    #[test]
    fn test_with_credential_rejects_http() {
        // ---
        assert!(matches!(
            with_credential("https://api.example.com/ws", None),
            Err(KvError::InvalidEndpoint(_))
        ));
        assert!(matches!(
            with_credential("not a url", None),
            Err(KvError::InvalidEndpoint(_))
        ));
    }

    #[test]
    fn test_redacted_hides_query() {
        // ---
        let url = with_credential("wss://api.example.com/ws", Some("secret")).unwrap();
        assert_eq!(redacted(&url), "wss://api.example.com/ws");
    }

    async fn pair() -> (
        WebSocketTransport<tokio::io::DuplexStream>,
        WebSocketStream<tokio::io::DuplexStream>,
    ) {
        pair_with_buffer(65536).await
    }

    async fn pair_with_buffer(
        buffer: usize,
    ) -> (
        WebSocketTransport<tokio::io::DuplexStream>,
        WebSocketStream<tokio::io::DuplexStream>,
    ) {
        // ---
        let (client_stream, server_stream) = tokio::io::duplex(buffer);

        let (client, server) = tokio::join!(
            async {
                tokio_tungstenite::client_async("ws://localhost/ws", client_stream)
                    .await
                    .expect("client handshake failed")
                    .0
            },
            async {
                tokio_tungstenite::accept_async(server_stream)
                    .await
                    .expect("server handshake failed")
            }
        );

        (WebSocketTransport::from_stream(client, "duplex"), server)
    }

    #[tokio::test]
    async fn test_send_and_receive_text() {
        // ---
        let (transport, mut server) = pair().await;
        let mut inbound = transport.receive().await.unwrap();

        transport.send(Frame::from("{\"op\":1}")).await.unwrap();
        let got = server.next().await.unwrap().unwrap();
        assert_eq!(got, Message::text("{\"op\":1}"));

        server.send(Message::text("{\"messageId\":1}")).await.unwrap();
        let frame = inbound.recv().await.unwrap().unwrap();
        assert_eq!(frame.as_bytes(), b"{\"messageId\":1}");
    }

    #[tokio::test]
    async fn test_server_close_ends_stream() {
        // ---
        let (transport, mut server) = pair().await;
        let mut inbound = transport.receive().await.unwrap();

        server.send(Message::Close(None)).await.unwrap();

        assert!(inbound.recv().await.is_none());
        assert!(transport.is_closed());
        assert!(matches!(
            transport.send(Frame::from("x")).await,
            Err(KvError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        // ---
        let (transport, _server) = pair().await;
        let mut inbound = transport.receive().await.unwrap();

        transport.close().await.unwrap();
        transport.close().await.unwrap();

        assert!(transport.is_closed());
        assert!(inbound.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_close_releases_sender_on_stalled_socket() {
        // ---
        // The server end is never read, so writes stall once the pipe fills.
        let (transport, _server) = pair_with_buffer(4096).await;
        let transport = Arc::new(transport);

        let writer = {
            let transport = transport.clone();
            tokio::spawn(async move {
                let big = "x".repeat(16 * 1024);
                loop {
                    if let Err(err) = transport.send(Frame::from(big.clone())).await {
                        return err;
                    }
                }
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!writer.is_finished());

        tokio::time::timeout(Duration::from_secs(3), transport.close())
            .await
            .expect("close hung on a stalled socket")
            .unwrap();

        let err = tokio::time::timeout(Duration::from_secs(1), writer)
            .await
            .expect("stalled sender was not released")
            .unwrap();
        assert!(matches!(err, KvError::ConnectionClosed));
    }
}
