use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value;
use tokio::sync::oneshot;

use crate::protocol::MessageId;
use crate::sync::lock_ignore_poison;
use crate::{KvError, Result};

/// Terminal value delivered to a waiting call.
pub(super) type Completion = Result<Option<Value>>;

struct State {
    // ---
    entries: HashMap<MessageId, oneshot::Sender<Completion>>,
    closed: bool,
}

/// Tracks calls waiting for a response.
///
/// Maps message IDs to oneshot channels. Each entry leaves the table exactly
/// once: through [`complete`](Self::complete) when its response arrives,
/// through [`remove`](Self::remove) on timeout, cancellation or send failure,
/// or through [`close_all`](Self::close_all) when the connection terminates.
/// Whichever path removes the entry first decides the call's outcome.
///
/// Completions are sent while the lock is held. Once an entry is observed as
/// gone, its value is already in the channel.
pub(super) struct PendingTable {
    // ---
    state: Mutex<State>,
}

impl PendingTable {
    // ---

    /// Create a new, open, empty table.
    pub fn new() -> Self {
        // ---
        Self {
            state: Mutex::new(State {
                entries: HashMap::new(),
                closed: false,
            }),
        }
    }

    /// Register a pending call.
    ///
    /// Returns the receiver the caller waits on.
    ///
    /// # Errors
    ///
    /// Returns `KvError::ConnectionClosed` once the table has been closed,
    /// and `KvError::InvalidRequest` if `id` is already registered.
    pub fn register(&self, id: MessageId) -> Result<oneshot::Receiver<Completion>> {
        // ---
        let mut state = lock_ignore_poison(&self.state);

        if state.closed {
            return Err(KvError::ConnectionClosed);
        }
        if state.entries.contains_key(&id) {
            return Err(KvError::InvalidRequest(format!(
                "message id {id} is already pending"
            )));
        }

        let (tx, rx) = oneshot::channel();
        state.entries.insert(id, tx);
        Ok(rx)
    }

    /// Resolve a pending call.
    ///
    /// Returns `true` if `id` was pending. Unknown, stale and duplicate IDs
    /// return `false` and leave the table untouched.
    pub fn complete(&self, id: MessageId, completion: Completion) -> bool {
        // ---
        let mut state = lock_ignore_poison(&self.state);

        match state.entries.remove(&id) {
            Some(tx) => {
                // Receiver gone means the caller's future was dropped mid-flight.
                let _ = tx.send(completion);
                true
            }
            None => false,
        }
    }

    /// Remove a pending call without resolving it.
    ///
    /// Returns `true` if this call removed the entry.
    pub fn remove(&self, id: MessageId) -> bool {
        // ---
        lock_ignore_poison(&self.state).entries.remove(&id).is_some()
    }

    /// Close the table and resolve every pending call with
    /// `KvError::ConnectionClosed`.
    ///
    /// Idempotent. Returns the number of calls resolved by this invocation.
    pub fn close_all(&self) -> usize {
        // ---
        let mut state = lock_ignore_poison(&self.state);
        state.closed = true;

        let drained = state.entries.len();
        for (_, tx) in state.entries.drain() {
            let _ = tx.send(Err(KvError::ConnectionClosed));
        }
        drained
    }

    /// Number of calls currently waiting.
    pub fn len(&self) -> usize {
        // ---
        lock_ignore_poison(&self.state).entries.len()
    }

    /// Whether [`close_all`](Self::close_all) has run.
    pub fn is_closed(&self) -> bool {
        // ---
        lock_ignore_poison(&self.state).closed
    }
}
