use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifier correlating a request with its response.
///
/// Ids are positive, assigned by the originating peer, and unique only
/// within that peer's lifetime — the remote end runs its own counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(u64);

impl RequestId {
    pub fn new(value: u64) -> Self {
        RequestId(value)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for RequestId {
    fn from(value: u64) -> Self {
        RequestId::new(value)
    }
}

/// Per-peer monotonic id source. Starts at 1; ids are never reused.
pub struct RequestIdAllocator {
    next: AtomicU64,
}

impl RequestIdAllocator {
    pub fn new() -> Self {
        RequestIdAllocator {
            next: AtomicU64::new(1),
        }
    }

    pub fn allocate(&self) -> RequestId {
        RequestId::new(self.next.fetch_add(1, Ordering::Relaxed))
    }

    pub fn peek_next(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }
}

impl Default for RequestIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_allocator_monotonic() {
        let allocator = RequestIdAllocator::new();

        assert_eq!(allocator.allocate().as_u64(), 1);
        assert_eq!(allocator.allocate().as_u64(), 2);
        assert_eq!(allocator.allocate().as_u64(), 3);
        assert_eq!(allocator.peek_next(), 4);
    }

    #[test]
    fn test_ids_never_repeat_across_threads() {
        let allocator = Arc::new(RequestIdAllocator::new());
        let mut handles = vec![];

        for _ in 0..8 {
            let alloc = Arc::clone(&allocator);
            handles.push(thread::spawn(move || {
                (0..200).map(|_| alloc.allocate().as_u64()).collect::<Vec<_>>()
            }));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id), "duplicate id {}", id);
            }
        }
        assert_eq!(seen.len(), 8 * 200);
    }

    #[test]
    fn test_id_serializes_as_bare_integer() {
        let id = RequestId::new(42);
        assert_eq!(serde_json::to_string(&id).unwrap(), "42");

        let back: RequestId = serde_json::from_str("42").unwrap();
        assert_eq!(back, id);
    }
}
