// src/client/mod.rs
//! Multiplexing key-value client.
//!
//! This module contains the core [`KvClient`] type which sends requests over
//! a single transport session and matches the responses coming back.
//!
//! # Architecture
//!
//! Each call allocates a fresh message ID from an atomic counter and registers
//! a oneshot channel in the pending table *before* the request frame is
//! written, so a fast reply can never miss its entry.
//!
//! A single background dispatch loop reads inbound frames, parses them and
//! hands each response to the matching pending entry. Malformed frames and
//! responses for unknown IDs are dropped. When the transport terminates the
//! loop resolves every remaining entry with [`KvError::ConnectionClosed`]
//! and exits.
//!
//! # Concurrency
//!
//! Any number of tasks may call concurrently; the client is cheap to clone.
//! A caller only ever waits on its own oneshot receiver. The pending table
//! lock guards plain map operations and is never held across an `.await`.
//!
//! No call is retried here. Retry policy belongs to the caller.

mod pending;

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time;

use crate::protocol::{
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
use crate::{
    // ---
    log_debug,
    log_info,
    log_trace,
    log_warn,
    Frame,
    InboundStream,
    KvError,
    Result,
    TransportPtr,
};

use pending::{Completion, PendingTable};

/// Stand-in deadline for timeouts too large to add to `Instant::now()`.
const FAR_FUTURE: Duration = Duration::from_secs(60 * 60 * 24 * 365);

/// Running key-value client.
///
/// Cheap to clone (internally `Arc`-backed). All clones share one session.
#[derive(Clone)]
pub struct KvClient {
    inner: Arc<Inner>,
}

struct Inner {
    // ---
    transport: TransportPtr,
    client_id: String,
    pending: Arc<PendingTable>,
    ids: MessageIdGenerator,
    request_timeout: Duration,

    /// Dispatch loop handle, aborted when the last clone is dropped.
    dispatch_task: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        // ---
        let task = match self.dispatch_task.get_mut() {
            Ok(task) => task.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(task) = task {
            task.abort();
        }
    }
}

/// Removes a pending entry if the call ends without a delivered completion,
/// including when the call future is dropped.
struct PendingGuard<'a> {
    // ---
    pending: &'a PendingTable,
    id: MessageId,
    armed: bool,
}

impl<'a> PendingGuard<'a> {
    // ---
    fn new(pending: &'a PendingTable, id: MessageId) -> Self {
        Self {
            pending,
            id,
            armed: true,
        }
    }

    /// Remove the entry now. Returns `true` if this removal won.
    fn release(&mut self) -> bool {
        // ---
        self.armed = false;
        self.pending.remove(self.id)
    }

    /// The dispatch loop already removed the entry.
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        // ---
        if self.armed && self.pending.remove(self.id) {
            log_debug!("call abandoned before completion (messageId: {})", self.id);
        }
    }
}

/// How the send phase of a call ended.
enum Sent {
    Written(Result<()>),
    Resolved(std::result::Result<Completion, oneshot::error::RecvError>),
    TimedOut,
    Cancelled,
}

/// How the wait phase of a call ended.
enum Wait {
    Delivered(std::result::Result<Completion, oneshot::error::RecvError>),
    TimedOut,
    Cancelled,
}

impl KvClient {
    // ---
    /// Create a client over an explicitly provided transport.
    ///
    /// Takes the transport's inbound stream and starts the dispatch loop.
    /// [`KvClientBuilder`](crate::KvClientBuilder) is the usual way in.
    ///
    /// # Errors
    ///
    /// Returns `KvError::Transport` if the inbound stream was already taken
    /// by someone else.
    pub async fn with_transport(
        transport: TransportPtr,
        client_id: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self> {
        // ---
        let client_id = client_id.into();
        let inbound = transport.receive().await?;
        let pending = Arc::new(PendingTable::new());

        let dispatch_task = tokio::spawn(dispatch_loop(
            client_id.clone(),
            inbound,
            pending.clone(),
        ));

        log_debug!("{client_id}: client started");

        Ok(Self {
            inner: Arc::new(Inner {
                transport,
                client_id,
                pending,
                ids: MessageIdGenerator::new(),
                request_timeout,
                dispatch_task: Mutex::new(Some(dispatch_task)),
            }),
        })
    }

    /// Open a WebSocket session described by `config` and start a client on it.
    ///
    /// # Errors
    ///
    /// Returns:
    /// - `KvError::MissingConfig` / `KvError::InvalidEndpoint` for a bad base URL
    /// - `KvError::Connect` if the connection cannot be established
    #[cfg(feature = "transport_websocket")]
    pub async fn connect(config: &crate::ClientConfig) -> Result<Self> {
        // ---
        let endpoint = config.websocket_url()?;
        let transport =
            crate::open_websocket_transport(&endpoint, config.api_key.as_deref()).await?;

        let mut builder =
            crate::KvClientBuilder::new(transport).request_timeout(config.request_timeout);
        if let Some(id) = &config.client_id {
            builder = builder.client_id(id.clone());
        }
        builder.build().await
    }

    /// Send one request and wait for its response.
    ///
    /// - `op`: operation code
    /// - `key`: target key, must not be empty
    /// - `payload`: optional value, sent verbatim
    /// - `timeout`: how long to wait for the response after sending
    ///
    /// Dropping the returned future cancels the call and removes its entry.
    ///
    /// # Errors
    ///
    /// Returns:
    /// - `KvError::InvalidRequest` - empty key
    /// - `KvError::Serialization` - the request could not be encoded
    /// - `KvError::ConnectionClosed` - the session is closed or closed while waiting
    /// - `KvError::Send` - the frame could not be written
    /// - `KvError::Remote` - the service reported an error for this request
    /// - `KvError::Timeout` - no response within `timeout`
    pub async fn call(
        &self,
        op: Operation,
        key: &str,
        payload: Option<Value>,
        timeout: Duration,
    ) -> Result<Option<Value>> {
        // ---
        self.call_with_cancel(op, key, payload, timeout, std::future::pending::<()>())
            .await
    }

    /// [`call`](Self::call) using the configured request timeout.
    pub async fn call_default(
        &self,
        op: Operation,
        key: &str,
        payload: Option<Value>,
    ) -> Result<Option<Value>> {
        // ---
        self.call(op, key, payload, self.inner.request_timeout)
            .await
    }

    /// [`call`](Self::call) with an external cancellation signal.
    ///
    /// If `cancel` completes before the response arrives (and before the
    /// timeout), the entry is removed and the call fails with
    /// `KvError::Cancelled`. If the response won the race it is returned.
    ///
    /// The deadline, `cancel` and session closure cover the whole call,
    /// including time spent waiting for the transport to accept the frame.
    pub async fn call_with_cancel<C>(
        &self,
        op: Operation,
        key: &str,
        payload: Option<Value>,
        timeout: Duration,
        cancel: C,
    ) -> Result<Option<Value>>
    where
        C: Future<Output = ()>,
    {
        // ---
        if key.is_empty() {
            return Err(KvError::InvalidRequest("key must not be empty".into()));
        }

        let now = time::Instant::now();
        let deadline = now.checked_add(timeout).unwrap_or(now + FAR_FUTURE);

        let id = self.inner.ids.next_id();
        let frame = Request::new(op, key, payload, id)?.to_frame()?;

        let mut rx = self.inner.pending.register(id)?;
        let mut guard = PendingGuard::new(&self.inner.pending, id);

        log_trace!("{}: send {op:?} {key} (messageId: {id})", self.inner.client_id);

        let expired = time::sleep_until(deadline);
        tokio::pin!(expired);
        tokio::pin!(cancel);

        // A full or stalled write path must not outlive the call. Session
        // closure resolves `rx`, which releases the send as well.
        let sent = {
            let send = self.inner.transport.send(frame);
            tokio::pin!(send);

            tokio::select! {
                biased;

                res = &mut send => Sent::Written(res),
                delivered = &mut rx => Sent::Resolved(delivered),
                () = &mut expired => Sent::TimedOut,
                () = &mut cancel => Sent::Cancelled,
            }
        };

        match sent {
            Sent::Written(Ok(())) => {}
            Sent::Written(Err(err)) => {
                if !guard.release() {
                    // Drained or answered while the send was failing.
                    return rx.try_recv().unwrap_or(Err(KvError::ConnectionClosed));
                }
                return Err(self.send_failure(err));
            }
            Sent::Resolved(delivered) => {
                guard.disarm();
                return delivered.unwrap_or(Err(KvError::ConnectionClosed));
            }
            Sent::TimedOut => return Self::abandon(&mut guard, &mut rx, KvError::Timeout),
            Sent::Cancelled => return Self::abandon(&mut guard, &mut rx, KvError::Cancelled),
        }

        let waited = tokio::select! {
            biased;

            delivered = &mut rx => Wait::Delivered(delivered),
            () = &mut expired => Wait::TimedOut,
            () = &mut cancel => Wait::Cancelled,
        };

        match waited {
            Wait::Delivered(delivered) => {
                guard.disarm();
                // The sender only disappears without a value if the client
                // itself is being torn down.
                delivered.unwrap_or(Err(KvError::ConnectionClosed))
            }
            Wait::TimedOut => Self::abandon(&mut guard, &mut rx, KvError::Timeout),
            Wait::Cancelled => Self::abandon(&mut guard, &mut rx, KvError::Cancelled),
        }
    }

    /// Map a transport send error to the caller-facing error.
    ///
    /// A send that fails because the connection is going away reports
    /// `ConnectionClosed`, even before the dispatch loop has drained.
    fn send_failure(&self, err: KvError) -> KvError {
        // ---
        match err {
            KvError::ConnectionClosed => err,
            _ if self.inner.pending.is_closed() => KvError::ConnectionClosed,
            KvError::Send(_) => err,
            other => KvError::Send(other.to_string()),
        }
    }

    /// Give up on a call. If the dispatch loop removed the entry first, its
    /// completion is already in `rx` and takes precedence.
    fn abandon(
        guard: &mut PendingGuard<'_>,
        rx: &mut oneshot::Receiver<Completion>,
        reason: KvError,
    ) -> Completion {
        // ---
        if guard.release() {
            log_debug!("call gave up: {reason} (messageId: {})", guard.id);
            return Err(reason);
        }

        rx.try_recv().unwrap_or(Err(KvError::ConnectionClosed))
    }

    /// Fetch a value.
    ///
    /// Stored strings that contain JSON are returned decoded.
    pub async fn get(&self, key: &str) -> Result<Option<Value>> {
        // ---
        let value = self.call_default(Operation::Get, key, None).await?;
        Ok(value.map(decode_value))
    }

    /// Fetch a value and deserialize it into `T`.
    pub async fn get_json<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        // ---
        match self.get(key).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Insert or replace a value.
    ///
    /// Strings are stored verbatim; other values are stored as their JSON
    /// text.
    pub async fn insert(&self, key: &str, value: impl Into<Value>) -> Result<()> {
        // ---
        let value = encode_value(value.into());
        self.call_default(Operation::Insert, key, Some(value))
            .await?;
        Ok(())
    }

    /// Serialize `value` and insert it.
    pub async fn insert_json<T>(&self, key: &str, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        // ---
        let value = serde_json::to_value(value)?;
        self.insert(key, value).await
    }

    /// Update a value.
    ///
    /// With `partial` the current value is fetched first and, when both are
    /// JSON objects, `value`'s members are merged over it. The result is
    /// written with an insert, never with [`Operation::Update`].
    ///
    /// The read and the write are two separate calls; concurrent writers to
    /// the same key can interleave between them.
    pub async fn update(&self, key: &str, value: impl Into<Value>, partial: bool) -> Result<()> {
        // ---
        let value = value.into();

        let value = if partial {
            let current = self.get(key).await?.unwrap_or(Value::Null);
            merge_values(current, value)
        } else {
            value
        };

        self.insert(key, value).await
    }

    /// Delete a key.
    pub async fn delete(&self, key: &str) -> Result<()> {
        // ---
        self.call_default(Operation::Delete, key, None).await?;
        Ok(())
    }

    /// Close the session.
    ///
    /// Every in-flight call resolves with `KvError::ConnectionClosed`, later
    /// calls are rejected with the same error and the transport is closed.
    /// Idempotent.
    pub async fn close(&self) -> Result<()> {
        // ---
        let drained = self.inner.pending.close_all();
        if drained > 0 {
            log_info!(
                "{}: closing with {drained} calls in flight",
                self.inner.client_id
            );
        }

        self.inner.transport.close().await
    }

    /// Whether the session is closed.
    pub fn is_closed(&self) -> bool {
        // ---
        self.inner.pending.is_closed()
    }

    /// Number of calls currently waiting for a response.
    pub fn pending_count(&self) -> usize {
        // ---
        self.inner.pending.len()
    }

    /// Identifier used in log output.
    pub fn client_id(&self) -> &str {
        &self.inner.client_id
    }

    /// Default per-call timeout.
    pub fn request_timeout(&self) -> Duration {
        self.inner.request_timeout
    }
}

/// The single dispatch loop of a session.
///
/// Runs until the inbound stream ends or yields its terminal error, then
/// resolves whatever is still pending with `KvError::ConnectionClosed`.
async fn dispatch_loop(_client_id: String, mut inbound: InboundStream, pending: Arc<PendingTable>) {
    // ---
    log_debug!("{_client_id}: dispatch loop started");

    loop {
        match inbound.recv().await {
            Some(Ok(frame)) => dispatch_frame(&_client_id, &pending, frame),
            Some(Err(_err)) => {
                log_warn!("{_client_id}: connection terminated: {_err}");
                break;
            }
            None => {
                log_debug!("{_client_id}: transport closed");
                break;
            }
        }
    }

    let drained = pending.close_all();
    if drained > 0 {
        log_info!("{_client_id}: connection lost with {drained} calls in flight");
    }

    log_debug!("{_client_id}: dispatch loop stopped");
}

fn dispatch_frame(_client_id: &str, pending: &PendingTable, frame: Frame) {
    // ---
    let response = match Response::from_frame(&frame) {
        Ok(response) => response,
        Err(_err) => {
            log_warn!("{_client_id}: dropping malformed frame {frame:?}: {_err}");
            return;
        }
    };

    let id = response.message_id;

    if !pending.complete(id, response.into_result()) {
        log_debug!("{_client_id}: no pending call for messageId {id}, dropping response");
    }
}
