use crate::instructions::instructions::{RegisterType, Tag};

/// A result published on the common data bus.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) struct CDBBroadcast {
    pub(crate) tag: Tag,
    pub(crate) sink: Option<RegisterType>,
    pub(crate) seq: u64,
}

/// Collects the completions of a cycle so they can be published together at
/// the start of the next cycle. Every completion is published; the bus is as
/// wide as the total number of execution units.
pub(crate) struct ResultBus {
    pub(crate) capacity: usize,
    pending: Vec<CDBBroadcast>,
}

impl ResultBus {
    pub(crate) fn new(capacity: usize) -> Self {
        Self { capacity, pending: Vec::with_capacity(capacity) }
    }

    pub(crate) fn pending_mut(&mut self) -> &mut Vec<CDBBroadcast> {
        &mut self.pending
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// The completions waiting to be published, in completion order.
    pub(crate) fn pending(&self) -> &[CDBBroadcast] {
        &self.pending
    }

    /// Takes the collected completions, oldest instruction first.
    pub(crate) fn drain_sorted(&mut self) -> Vec<CDBBroadcast> {
        debug_assert!(self.pending.len() <= self.capacity,
                      "ResultBus: {} completions exceed the bus width {}", self.pending.len(), self.capacity);

        let mut broadcasts = std::mem::replace(&mut self.pending, Vec::with_capacity(self.capacity));
        broadcasts.sort_by_key(|broadcast| broadcast.seq);
        broadcasts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_sorted_by_seq() {
        let mut bus = ResultBus::new(4);
        bus.pending_mut().push(CDBBroadcast { tag: 3, sink: Some(1), seq: 9 });
        bus.pending_mut().push(CDBBroadcast { tag: 0, sink: None, seq: 6 });
        bus.pending_mut().push(CDBBroadcast { tag: 1, sink: Some(2), seq: 7 });

        let seqs: Vec<u64> = bus.drain_sorted().iter().map(|b| b.seq).collect();
        assert_eq!(seqs, vec![6, 7, 9]);
        assert!(bus.is_empty());
    }

    #[test]
    fn test_drain_empty() {
        let mut bus = ResultBus::new(2);
        assert!(bus.drain_sorted().is_empty());
    }
}
