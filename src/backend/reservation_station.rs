use std::collections::VecDeque;
use std::fmt;
use std::fmt::Display;

use crate::backend::register_alias_table::Operand;
use crate::instructions::instructions::{FuClass, MAX_SOURCE_COUNT, RegisterType, Tag};

#[derive(Clone, Copy, PartialEq, Debug)]
pub(crate) enum RSState {
    IDLE,
    BUSY,
}

// A single reservation station
#[derive(Clone, Copy, Debug)]
pub(crate) struct RS {
    pub(crate) state: RSState,
    pub(crate) rob_slot_index: Option<Tag>,
    pub(crate) seq: u64,
    pub(crate) sink: Option<RegisterType>,
    pub(crate) source: [Operand; MAX_SOURCE_COUNT],
}

impl RS {
    fn new() -> Self {
        Self {
            state: RSState::IDLE,
            rob_slot_index: None,
            seq: 0,
            sink: None,
            source: [Operand::Ready; MAX_SOURCE_COUNT],
        }
    }

    fn reset(&mut self) {
        self.state = RSState::IDLE;
        self.rob_slot_index = None;
        self.seq = 0;
        self.sink = None;
        self.source = [Operand::Ready; MAX_SOURCE_COUNT];
    }

    pub(crate) fn is_ready(&self) -> bool {
        self.source.iter().all(Operand::is_ready)
    }
}

impl Display for RS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RS seq={}", self.seq)?;
        if let Some(tag) = self.rob_slot_index {
            write!(f, " tag={}", tag)?;
        }

        for source in &self.source {
            match source {
                Operand::Ready => write!(f, " ready")?,
                Operand::WaitingOn(tag) => write!(f, " wait({})", tag)?,
            }
        }

        Ok(())
    }
}

/// The reservation stations of one functional unit class. The stations live in
/// a fixed array; `queue` holds the indices of the busy ones in dispatch order,
/// which is program order within the class.
pub(crate) struct RSTable {
    pub(crate) class: FuClass,
    pub(crate) capacity: u16,
    free_stack: Vec<u16>,
    queue: VecDeque<u16>,
    array: Vec<RS>,
}

impl RSTable {
    pub(crate) fn new(class: FuClass, capacity: u16) -> Self {
        let mut free_stack = Vec::with_capacity(capacity as usize);
        let mut array = Vec::with_capacity(capacity as usize);
        for i in 0..capacity {
            array.push(RS::new());
            free_stack.push(capacity - 1 - i);
        }

        RSTable {
            class,
            capacity,
            free_stack,
            queue: VecDeque::with_capacity(capacity as usize),
            array,
        }
    }

    #[cfg(test)]
    pub(crate) fn get(&self, rs_index: u16) -> &RS {
        &self.array[rs_index as usize]
    }

    pub(crate) fn size(&self) -> u16 {
        self.queue.len() as u16
    }

    pub(crate) fn has_free(&self) -> bool {
        !self.free_stack.is_empty()
    }

    /// Places an instruction at the tail of the queue.
    pub(crate) fn allocate(&mut self,
                           rob_slot_index: Tag,
                           seq: u64,
                           sink: Option<RegisterType>,
                           source: [Operand; MAX_SOURCE_COUNT]) -> u16 {
        let rs_index = match self.free_stack.pop() {
            Some(rs_index) => rs_index,
            None => panic!("No free RS for class {}", self.class),
        };

        let rs = &mut self.array[rs_index as usize];
        debug_assert!(rs.state == RSState::IDLE);
        rs.state = RSState::BUSY;
        rs.rob_slot_index = Some(rob_slot_index);
        rs.seq = seq;
        rs.sink = sink;
        rs.source = source;

        self.queue.push_back(rs_index);
        rs_index
    }

    /// Marks every source waiting on `tag` as ready. Returns the number of
    /// sources woken up.
    pub(crate) fn wakeup(&mut self, tag: Tag) -> usize {
        let mut woken = 0;
        for &rs_index in &self.queue {
            let rs = &mut self.array[rs_index as usize];
            debug_assert!(rs.state == RSState::BUSY);
            for source in rs.source.iter_mut() {
                if *source == Operand::WaitingOn(tag) {
                    *source = Operand::Ready;
                    woken += 1;
                }
            }
        }
        woken
    }

    /// Removes the oldest station whose sources are all ready and returns its
    /// content. Stations that aren't ready keep their position in the queue.
    pub(crate) fn deque_ready(&mut self) -> Option<RS> {
        let position = self.queue
            .iter()
            .position(|&rs_index| self.array[rs_index as usize].is_ready())?;
        let rs_index = self.queue.remove(position)?;

        let rs = &mut self.array[rs_index as usize];
        let ready = *rs;
        rs.reset();
        self.free_stack.push(rs_index);
        Some(ready)
    }

    #[cfg(test)]
    pub(crate) fn iter(&self) -> impl Iterator<Item=&RS> + '_ {
        self.queue.iter().map(move |&rs_index| self.get(rs_index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const READY: [Operand; 2] = [Operand::Ready, Operand::Ready];

    #[test]
    fn test_allocate_until_full() {
        let mut rs_table = RSTable::new(FuClass::K0, 2);
        assert!(rs_table.has_free());
        rs_table.allocate(0, 0, Some(1), READY);
        rs_table.allocate(1, 1, Some(2), READY);
        assert!(!rs_table.has_free());
        assert_eq!(rs_table.size(), 2);
    }

    #[test]
    #[should_panic]
    fn test_allocate_when_full() {
        let mut rs_table = RSTable::new(FuClass::K0, 1);
        rs_table.allocate(0, 0, None, READY);
        rs_table.allocate(1, 1, None, READY);
    }

    #[test]
    fn test_deque_ready_in_program_order() {
        let mut rs_table = RSTable::new(FuClass::K1, 4);
        rs_table.allocate(0, 10, None, READY);
        rs_table.allocate(1, 11, None, READY);

        assert_eq!(rs_table.deque_ready().unwrap().seq, 10);
        assert_eq!(rs_table.deque_ready().unwrap().seq, 11);
        assert!(rs_table.deque_ready().is_none());
        assert_eq!(rs_table.size(), 0);
        assert!(rs_table.has_free());
    }

    #[test]
    fn test_waiting_station_is_skipped_not_dropped() {
        let mut rs_table = RSTable::new(FuClass::K1, 4);
        rs_table.allocate(0, 10, None, [Operand::WaitingOn(5), Operand::Ready]);
        rs_table.allocate(1, 11, None, READY);

        assert_eq!(rs_table.deque_ready().unwrap().seq, 11);
        assert!(rs_table.deque_ready().is_none());

        assert_eq!(rs_table.wakeup(5), 1);
        let rs = rs_table.deque_ready().unwrap();
        assert_eq!(rs.seq, 10);
        assert_eq!(rs.rob_slot_index, Some(0));
    }

    #[test]
    fn test_wakeup_both_sources() {
        let mut rs_table = RSTable::new(FuClass::K2, 2);
        rs_table.allocate(0, 0, None, [Operand::WaitingOn(3), Operand::WaitingOn(3)]);
        rs_table.allocate(1, 1, None, [Operand::WaitingOn(4), Operand::WaitingOn(3)]);

        assert_eq!(rs_table.wakeup(3), 3);
        assert_eq!(rs_table.deque_ready().unwrap().seq, 0);
        assert!(rs_table.deque_ready().is_none());

        assert_eq!(rs_table.wakeup(7), 0);
        assert_eq!(rs_table.wakeup(4), 1);
        assert_eq!(rs_table.deque_ready().unwrap().seq, 1);
    }

    #[test]
    fn test_freed_station_is_reused() {
        let mut rs_table = RSTable::new(FuClass::K0, 1);
        rs_table.allocate(0, 0, None, READY);
        rs_table.deque_ready();
        assert!(rs_table.has_free());
        rs_table.allocate(1, 1, None, READY);
        assert_eq!(rs_table.iter().next().unwrap().seq, 1);
    }
}
