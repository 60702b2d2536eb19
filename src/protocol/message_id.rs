use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifier used to match a response frame to the request that caused it.
///
/// Carried in-band as the `messageId` member of every frame. Identifiers are
/// assigned by the client, start at 1 and are never reused within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(u64);

impl MessageId {
    // ---

    /// Wrap a raw identifier value.
    pub const fn new(raw: u64) -> Self {
        // ---
        Self(raw)
    }

    /// Get the raw identifier value.
    pub const fn get(self) -> u64 {
        // ---
        self.0
    }
}

impl fmt::Display for MessageId {
    // ---

    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // ---
        write!(f, "{}", self.0)
    }
}

impl From<u64> for MessageId {
    // ---

    fn from(raw: u64) -> Self {
        // ---
        Self(raw)
    }
}

/// Race-free allocator of [`MessageId`]s for one session.
///
/// Concurrent callers may observe allocation order that differs from wire
/// order, but two allocations never yield the same value.
#[derive(Debug)]
pub struct MessageIdGenerator {
    // ---
    next: AtomicU64,
}

impl MessageIdGenerator {
    // ---

    /// Create a generator whose first identifier is 1.
    pub fn new() -> Self {
        // ---
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Allocate the next identifier.
    pub fn next_id(&self) -> MessageId {
        // ---
        MessageId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for MessageIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_starts_at_one_and_increments() {
        // ---
        let ids = MessageIdGenerator::new();
        assert_eq!(ids.next_id(), MessageId::new(1));
        assert_eq!(ids.next_id(), MessageId::new(2));
        assert_eq!(ids.next_id().get(), 3);
    }

    #[test]
    fn test_concurrent_allocation_is_unique() {
        // ---
        const THREADS: usize = 16;
        const PER_THREAD: usize = 2_000;

        let ids = Arc::new(MessageIdGenerator::new());

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let ids = ids.clone();
                std::thread::spawn(move || {
                    (0..PER_THREAD).map(|_| ids.next_id()).collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id), "duplicate id {id}");
            }
        }
        assert_eq!(seen.len(), THREADS * PER_THREAD);
    }

    #[test]
    fn test_serializes_as_plain_number() {
        // ---
        let json = serde_json::to_string(&MessageId::new(42)).unwrap();
        assert_eq!(json, "42");
    }
}
