use std::sync::atomic::{AtomicU64, Ordering};

use netbridge::prelude::OperationId;

/// Hands out operation ids in dispatch order. HTTP and WebSocket operations draw from the same
/// sequence.
#[derive(Debug, Default)]
pub struct IdAllocator {
    next_id: AtomicU64,
}

impl IdAllocator {
    pub fn new() -> IdAllocator {
        IdAllocator::default()
    }

    pub fn next(&self) -> OperationId {
        OperationId::new(self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}
