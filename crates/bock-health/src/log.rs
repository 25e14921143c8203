//! Fixed-capacity probe history.

use serde::{Serialize, Serializer};

use crate::probe::ProbeResult;

/// Ring buffer of the most recent probe results, oldest evicted first.
///
/// Storage is allocated once at construction; pushing past capacity
/// overwrites the oldest slot in place.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthLog<T = ProbeResult> {
    slots: Vec<Option<T>>,
    /// Index the next push writes to.
    head: usize,
    len: usize,
}

impl<T> HealthLog<T> {
    /// Create an empty log holding at most `capacity` entries (minimum 1).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            slots,
            head: 0,
            len: 0,
        }
    }

    /// Maximum number of entries retained.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of entries currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether no entry has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append an entry, returning the evicted one when full.
    pub fn push(&mut self, entry: T) -> Option<T> {
        let evicted = self.slots[self.head].replace(entry);
        self.head = (self.head + 1) % self.capacity();
        self.len = (self.len + 1).min(self.capacity());
        evicted
    }

    /// The most recent entry.
    #[must_use]
    pub fn last(&self) -> Option<&T> {
        if self.is_empty() {
            return None;
        }
        let idx = (self.head + self.capacity() - 1) % self.capacity();
        self.slots[idx].as_ref()
    }

    /// Entries from oldest to newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + '_ {
        let cap = self.capacity();
        let start = (self.head + cap - self.len) % cap;
        (0..self.len).filter_map(move |i| self.slots[(start + i) % cap].as_ref())
    }
}

impl<T> Default for HealthLog<T> {
    fn default() -> Self {
        Self::with_capacity(5)
    }
}

impl<T: Serialize> Serialize for HealthLog<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}
