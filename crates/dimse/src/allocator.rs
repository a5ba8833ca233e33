//! Message ID allocation

use std::sync::atomic::{AtomicU16, Ordering};

/// Hands out message IDs for commands sent on one association
///
/// IDs increase by one and wrap around after 65535. Zero is never returned.
#[derive(Debug)]
pub struct MessageIdAllocator {
    next: AtomicU16,
}

impl MessageIdAllocator {
    /// `first` of zero starts at 1
    pub fn new(first: u16) -> Self {
        Self {
            next: AtomicU16::new(first.max(1)),
        }
    }

    /// Get the next message ID
    pub fn next_id(&self) -> u16 {
        loop {
            let id = self.next.fetch_add(1, Ordering::Relaxed);
            if id != 0 {
                return id;
            }
        }
    }
}

impl Default for MessageIdAllocator {
    fn default() -> Self {
        Self::new(1)
    }
}
