//! Pending signal queue
//!
//! FIFO of signal ids waiting to be emitted on one context, holding each
//! id at most once. Pushing an id that is already queued moves it to the
//! tail, so a burst of the same broadcast collapses into one emission
//! ordered after everything requested before it.
//!
//! The queue does no locking of its own; it lives under its
//! `ContextSource`'s mutex.

use std::collections::VecDeque;

use mainctx_core::SignalId;

#[derive(Debug, Default, Clone)]
pub struct PendingQueue {
    ids: VecDeque<SignalId>,
}

impl PendingQueue {
    pub const fn new() -> Self {
        Self { ids: VecDeque::new() }
    }

    /// Queue `id` at the tail, dropping any earlier occurrence.
    ///
    /// Returns `true` if the queue was empty before the push.
    pub fn push(&mut self, id: SignalId) -> bool {
        let was_empty = self.ids.is_empty();
        if let Some(pos) = self.ids.iter().position(|queued| *queued == id) {
            self.ids.remove(pos);
        }
        self.ids.push_back(id);
        was_empty
    }

    #[inline]
    pub fn pop_front(&mut self) -> Option<SignalId> {
        self.ids.pop_front()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = SignalId> + '_ {
        self.ids.iter().copied()
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(raw: u32) -> SignalId {
        SignalId::new(raw).unwrap()
    }

    #[test]
    fn test_fifo_order() {
        let mut queue = PendingQueue::new();
        assert!(queue.push(sig(1)));
        assert!(!queue.push(sig(2)));
        assert!(!queue.push(sig(3)));
        assert_eq!(queue.pop_front(), Some(sig(1)));
        assert_eq!(queue.pop_front(), Some(sig(2)));
        assert_eq!(queue.pop_front(), Some(sig(3)));
        assert_eq!(queue.pop_front(), None);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_repush_moves_to_back() {
        let mut queue = PendingQueue::new();
        queue.push(sig(5));
        queue.push(sig(7));
        queue.push(sig(9));
        queue.push(sig(5));

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.iter().collect::<Vec<_>>(), vec![sig(7), sig(9), sig(5)]);
    }

    #[test]
    fn test_repush_alone_is_idempotent() {
        let mut queue = PendingQueue::new();
        assert!(queue.push(sig(4)));
        assert!(!queue.push(sig(4)));
        assert!(!queue.push(sig(4)));
        assert_eq!(queue.len(), 1);

        queue.clear();
        assert!(queue.push(sig(4)));
    }
}
