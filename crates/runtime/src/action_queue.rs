use std::collections::VecDeque;

/// Sequence number assigned to an action at dispatch time.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Seq(pub u64);

/// FIFO of dispatched UI actions.
///
/// Ordering contract:
/// - Actions are applied in dispatch order; sequence numbers are strictly increasing.
/// - Actions are never merged: dispatching the same action twice queues it twice.
#[derive(Debug)]
pub struct ActionQueue<A> {
    next_seq: u64,
    items: VecDeque<(Seq, A)>,
}

impl<A> Default for ActionQueue<A> {
    fn default() -> Self {
        Self {
            next_seq: 0,
            items: VecDeque::new(),
        }
    }
}

impl<A> ActionQueue<A> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn push(&mut self, action: A) -> Seq {
        let seq = Seq(self.next_seq);
        self.next_seq = self.next_seq.wrapping_add(1);
        self.items.push_back((seq, action));
        seq
    }

    pub fn pop(&mut self) -> Option<(Seq, A)> {
        self.items.pop_front()
    }

    /// Removes every queued action, oldest first.
    pub fn drain(&mut self) -> impl Iterator<Item = (Seq, A)> + '_ {
        self.items.drain(..)
    }
}
