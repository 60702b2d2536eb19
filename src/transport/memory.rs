//! In-process transport: a connected client/peer pair.
//!
//! The client half implements `Transport`; the [`MemoryPeer`] half stands in
//! for the remote service. Tests and the memory demo use it to answer requests
//! in any order and to cut the connection on demand.
//!
//! ## Baseline behavior
//!
//! The WebSocket transport is held to the same rules as this one:
//!
//! - Frames sent by one side arrive whole, once, and in send order.
//! - Concurrent `send()` calls never interleave.
//! - Termination ends the inbound stream after every frame queued before it,
//!   with an optional terminal error item for abnormal termination.
//! - `close()` is idempotent.
//!
//! ## Non-Goals
//!
//! No network latency, partial writes or TLS.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use crate::sync::lock_ignore_poison;
use crate::{
    // ---
    log_debug,
    Frame,
    Inbound,
    InboundStream,
    KvError,
    Result,
    Transport,
    TransportPtr,
};

/// Queue depth of each direction of the in-memory link. A client `send()`
/// waits once this many frames are unread by the peer.
pub const MEMORY_CHANNEL_CAPACITY: usize = 256;

/// State shared by both ends of an in-memory connection.
struct Link {
    // ---
    /// Feeds the client's inbound stream. Taking it out ends the stream.
    inbound_tx: Mutex<Option<mpsc::Sender<Inbound>>>,

    /// Flips to `true` once either side has terminated the connection.
    /// Senders waiting on a full queue watch it.
    closed: watch::Sender<bool>,

    /// Fault injection: fail every `send()` while set.
    reject_sends: AtomicBool,
}

impl Link {
    // ---

    fn inbound_sender(&self) -> Option<mpsc::Sender<Inbound>> {
        lock_ignore_poison(&self.inbound_tx).clone()
    }

    /// Terminate the inbound stream. Returns `false` if already terminated.
    fn terminate(&self) -> bool {
        // ---
        self.closed.send_replace(true);
        lock_ignore_poison(&self.inbound_tx).take().is_some()
    }

    fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

/// Client side of an in-memory connection.
struct MemoryTransport {
    // ---
    transport_id: String,
    link: Arc<Link>,
    outbound_tx: Mutex<Option<mpsc::Sender<Frame>>>,
    inbound_rx: Mutex<Option<mpsc::Receiver<Inbound>>>,
}

#[async_trait]
impl Transport for MemoryTransport {
    // ---
    fn transport_id(&self) -> &str {
        &self.transport_id
    }

    /// Queue a frame for the peer.
    ///
    /// The channel's internal lock serializes concurrent senders, so frames
    /// are never interleaved. A send waiting on a full queue fails with
    /// `KvError::ConnectionClosed` as soon as the connection terminates.
    async fn send(&self, frame: Frame) -> Result<()> {
        // ---
        if self.link.reject_sends.load(Ordering::Acquire) {
            return Err(KvError::Send("send rejected by memory peer".into()));
        }

        let mut closed = self.link.closed.subscribe();
        if *closed.borrow_and_update() {
            return Err(KvError::ConnectionClosed);
        }

        let tx = lock_ignore_poison(&self.outbound_tx)
            .clone()
            .ok_or(KvError::ConnectionClosed)?;

        tokio::select! {
            res = tx.send(frame) => {
                res.map_err(|_| KvError::Send("memory peer dropped".into()))
            }
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

    /// Close the connection.
    ///
    /// Stops outbound delivery to the peer and ends the inbound stream.
    async fn close(&self) -> Result<()> {
        // ---
        let had_outbound = lock_ignore_poison(&self.outbound_tx).take().is_some();
        let had_inbound = self.link.terminate();

        if had_outbound || had_inbound {
            log_debug!("{}: memory transport closed", self.transport_id);
        }
        Ok(())
    }
}

/// Remote end of an in-memory connection.
///
/// Sees every frame the client sends and decides what comes back. Tests use
/// it to play the key-value service, to reorder or drop replies, and to
/// simulate connection loss.
pub struct MemoryPeer {
    // ---
    link: Arc<Link>,
    outbound_rx: tokio::sync::Mutex<mpsc::Receiver<Frame>>,
}

impl MemoryPeer {
    // ---

    /// Wait for the next frame sent by the client.
    ///
    /// Returns `None` once the client transport is closed and every queued
    /// frame has been read.
    pub async fn recv(&self) -> Option<Frame> {
        // ---
        self.outbound_rx.lock().await.recv().await
    }

    /// Deliver a frame to the client's inbound stream.
    ///
    /// # Errors
    ///
    /// Returns `KvError::ConnectionClosed` if the connection has terminated
    /// or the client dropped its inbound stream.
    pub async fn push(&self, frame: impl Into<Frame>) -> Result<()> {
        // ---
        let tx = self.link.inbound_sender().ok_or(KvError::ConnectionClosed)?;
        tx.send(Ok(frame.into()))
            .await
            .map_err(|_| KvError::ConnectionClosed)
    }

    /// End the connection gracefully. Frames already pushed are still
    /// delivered.
    pub fn disconnect(&self) {
        // ---
        if self.link.terminate() {
            log_debug!("memory peer disconnected");
        }
    }

    /// End the connection abnormally with a terminal error item.
    pub async fn fail(&self, reason: impl Into<String>) {
        // ---
        if let Some(tx) = self.link.inbound_sender() {
            let _ = tx.send(Err(KvError::Transport(reason.into()))).await;
        }
        self.link.terminate();
    }

    /// Make every subsequent client `send()` fail (or succeed again).
    pub fn set_reject_sends(&self, reject: bool) {
        // ---
        self.link.reject_sends.store(reject, Ordering::Release);
    }

    /// Whether either side has terminated the connection.
    pub fn is_closed(&self) -> bool {
        // ---
        self.link.is_closed()
    }
}

/// Create a connected in-memory transport and its peer.
///
/// # Errors
///
/// Currently infallible; always returns `Ok`.
pub async fn create_memory_transport(
    transport_id: impl Into<String>,
) -> Result<(TransportPtr, MemoryPeer)> {
    // ---
    let transport_id = transport_id.into();
    log_debug!("{transport_id}: create memory transport");

    let (outbound_tx, outbound_rx) = mpsc::channel(MEMORY_CHANNEL_CAPACITY);
    let (inbound_tx, inbound_rx) = mpsc::channel(MEMORY_CHANNEL_CAPACITY);
    let (closed, _) = watch::channel(false);

    let link = Arc::new(Link {
        inbound_tx: Mutex::new(Some(inbound_tx)),
        closed,
        reject_sends: AtomicBool::new(false),
    });

    let transport = MemoryTransport {
        transport_id,
        link: link.clone(),
        outbound_tx: Mutex::new(Some(outbound_tx)),
        inbound_rx: Mutex::new(Some(inbound_rx)),
    };

    let peer = MemoryPeer {
        link,
        outbound_rx: tokio::sync::Mutex::new(outbound_rx),
    };

    Ok((Arc::new(transport), peer))
}
