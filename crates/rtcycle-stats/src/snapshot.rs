//! Single-slot snapshot hand-off.
//!
//! The RT thread publishes a copy of its statistics; a reporting thread takes
//! it. While a published snapshot is unread, further publishes are refused, so
//! a reader never sees a snapshot overwritten halfway through being consumed
//! and the producer keeps accumulating until the slot frees up.

use crossbeam::queue::ArrayQueue;

/// Capacity-one SPSC cell.
///
/// # RT Safety
///
/// `publish` and `take` are a single lock-free queue operation each. The
/// storage is allocated once in [`SnapshotCell::new`].
#[derive(Debug)]
pub struct SnapshotCell<T> {
    slot: ArrayQueue<T>,
}

impl<T> Default for SnapshotCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SnapshotCell<T> {
    /// Empty cell.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slot: ArrayQueue::new(1),
        }
    }

    /// Offer a snapshot to the reader.
    ///
    /// # Errors
    ///
    /// Hands `value` back when the previous snapshot has not been taken yet.
    #[inline]
    pub fn publish(&self, value: T) -> Result<(), T> {
        self.slot.push(value)
    }

    /// Take the pending snapshot, if any.
    #[inline]
    pub fn take(&self) -> Option<T> {
        self.slot.pop()
    }

    /// True while a published snapshot is waiting for the reader.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.slot.is_full()
    }
}
