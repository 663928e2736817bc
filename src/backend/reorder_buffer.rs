use crate::frontend::frontend::FetchedInstr;
use crate::instructions::instructions::{Instr, Tag};

#[derive(Clone, Copy, PartialEq, Debug)]
pub(crate) enum ROBSlotState {
    IDLE,
    // waiting in a reservation station
    DISPATCHED,
    // occupying a functional unit
    ISSUED,
    // the result has been broadcast; the slot can retire
    EXECUTED,
}

/// The cycles at which an instruction passed through each stage.
#[derive(Clone, Copy, PartialEq, Debug, Default)]
pub(crate) struct InstrTimeline {
    pub(crate) seq: u64,
    pub(crate) fetch: u64,
    pub(crate) dispatch: u64,
    pub(crate) issue: u64,
    pub(crate) execute: u64,
    pub(crate) writeback: u64,
    pub(crate) retire: u64,
}

pub(crate) struct ROBSlot {
    pub(crate) instr: Option<Instr>,
    pub(crate) state: ROBSlotState,
    pub(crate) timeline: InstrTimeline,
}

impl ROBSlot {
    fn reset(&mut self) {
        self.instr = None;
        self.state = ROBSlotState::IDLE;
        self.timeline = InstrTimeline::default();
    }
}

/// An instruction leaving the reorder buffer.
#[derive(Clone, Copy, Debug)]
pub(crate) struct RetiredInstr {
    pub(crate) tag: Tag,
    pub(crate) instr: Instr,
    pub(crate) timeline: InstrTimeline,
}

/// The reorder buffer: a circular buffer holding every dispatched instruction
/// that hasn't retired yet, in program order. The index of a slot is the tag of
/// the instruction in it.
pub(crate) struct ROB {
    pub(crate) capacity: u16,
    // everything before this point is retired.
    head: u64,
    tail: u64,
    slots: Vec<ROBSlot>,
}

impl ROB {
    pub(crate) fn new(capacity: u16) -> Self {
        let mut slots = Vec::with_capacity(capacity as usize);
        for _ in 0..capacity {
            slots.push(ROBSlot {
                instr: None,
                state: ROBSlotState::IDLE,
                timeline: InstrTimeline::default(),
            });
        }

        Self {
            capacity,
            head: 0,
            tail: 0,
            slots,
        }
    }

    fn to_index(&self, seq: u64) -> Tag {
        (seq % self.capacity as u64) as Tag
    }

    pub(crate) fn get(&self, tag: Tag) -> &ROBSlot {
        &self.slots[tag as usize]
    }

    pub(crate) fn get_mut(&mut self, tag: Tag) -> &mut ROBSlot {
        &mut self.slots[tag as usize]
    }

    pub(crate) fn size(&self) -> u16 {
        (self.tail - self.head) as u16
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.tail == self.head
    }

    pub(crate) fn has_space(&self) -> bool {
        self.capacity > self.size()
    }

    /// Claims the tail slot for `fetched`; its index becomes the tag of the
    /// instruction. The caller has to check [`ROB::has_space`] first.
    pub(crate) fn allocate(&mut self, fetched: &FetchedInstr, cycle: u64) -> Tag {
        assert!(self.has_space(), "ROB: Can't allocate if no space.");

        let tag = self.to_index(self.tail);
        self.tail += 1;

        let slot = self.get_mut(tag);
        debug_assert!(slot.state == ROBSlotState::IDLE);
        slot.instr = Some(fetched.instr);
        slot.state = ROBSlotState::DISPATCHED;
        slot.timeline = InstrTimeline {
            seq: fetched.seq,
            fetch: fetched.fetch_cycle,
            dispatch: cycle,
            ..InstrTimeline::default()
        };
        tag
    }

    pub(crate) fn mark_issued(&mut self, tag: Tag, cycle: u64) {
        let slot = self.get_mut(tag);
        debug_assert!(slot.state == ROBSlotState::DISPATCHED, "ROB: slot {} is in state {:?}", tag, slot.state);
        slot.state = ROBSlotState::ISSUED;
        slot.timeline.issue = cycle;
    }

    pub(crate) fn mark_done(&mut self, tag: Tag, cycle: u64) {
        let slot = self.get_mut(tag);
        debug_assert!(slot.state == ROBSlotState::ISSUED, "ROB: slot {} is in state {:?}", tag, slot.state);
        slot.state = ROBSlotState::EXECUTED;
        slot.timeline.writeback = cycle;
    }

    pub(crate) fn head_has_executed(&self) -> bool {
        if self.is_empty() {
            return false;
        }

        self.get(self.to_index(self.head)).state == ROBSlotState::EXECUTED
    }

    /// Removes the head if it has executed. Retirement is strictly in program
    /// order: a later executed slot never leaves before the head.
    pub(crate) fn retire_head(&mut self, cycle: u64) -> Option<RetiredInstr> {
        if !self.head_has_executed() {
            return None;
        }

        let tag = self.to_index(self.head);
        let slot = &mut self.slots[tag as usize];
        let instr = slot.instr.take()?;
        let mut timeline = slot.timeline;
        timeline.retire = cycle;
        slot.reset();
        self.head += 1;

        Some(RetiredInstr { tag, instr, timeline })
    }
}
