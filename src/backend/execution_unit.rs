use crate::backend::result_bus::CDBBroadcast;
use crate::instructions::instructions::{FuClass, RegisterType, Tag};

/// A single execution unit.
pub(crate) struct EU {
    pub(crate) rob_slot_index: Option<Tag>,
    pub(crate) seq: u64,
    pub(crate) sink: Option<RegisterType>,
    pub(crate) cycles_remaining: u8,
    pub(crate) state: EUState,
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub(crate) enum EUState {
    IDLE,
    EXECUTING,
}

impl EU {
    fn reset(&mut self) {
        self.rob_slot_index = None;
        self.seq = 0;
        self.sink = None;
        self.cycles_remaining = 0;
        self.state = EUState::IDLE;
    }

    /// Counts down one cycle. Returns true when the instruction has finished.
    fn cycle(&mut self) -> bool {
        debug_assert!(self.state == EUState::EXECUTING);
        debug_assert!(self.cycles_remaining > 0);

        self.cycles_remaining -= 1;
        self.cycles_remaining == 0
    }
}

/// The execution units of one functional unit class. Every unit of a class has
/// the same fixed latency.
pub(crate) struct EUTable {
    pub(crate) class: FuClass,
    pub(crate) capacity: u8,
    pub(crate) latency: u8,
    idle_stack: Vec<u8>,
    array: Vec<EU>,
}

impl EUTable {
    pub(crate) fn new(class: FuClass, capacity: u8, latency: u8) -> EUTable {
        let mut idle_stack = Vec::with_capacity(capacity as usize);
        let mut array = Vec::with_capacity(capacity as usize);
        for i in 0..capacity {
            array.push(EU {
                rob_slot_index: None,
                seq: 0,
                sink: None,
                cycles_remaining: 0,
                state: EUState::IDLE,
            });
            idle_stack.push(capacity - 1 - i);
        }

        EUTable {
            class,
            capacity,
            latency,
            idle_stack,
            array,
        }
    }

    pub(crate) fn has_idle(&self) -> bool {
        !self.idle_stack.is_empty()
    }

    pub(crate) fn busy_count(&self) -> u8 {
        self.capacity - self.idle_stack.len() as u8
    }

    #[cfg(test)]
    pub(crate) fn get(&self, eu_index: u8) -> &EU {
        &self.array[eu_index as usize]
    }

    /// Starts executing an instruction on an idle unit.
    pub(crate) fn allocate(&mut self, rob_slot_index: Tag, seq: u64, sink: Option<RegisterType>) -> u8 {
        let eu_index = match self.idle_stack.pop() {
            Some(eu_index) => eu_index,
            None => panic!("No idle EU for class {}", self.class),
        };

        let latency = self.latency;
        let eu = &mut self.array[eu_index as usize];
        debug_assert!(eu.state == EUState::IDLE);
        debug_assert!(eu.rob_slot_index.is_none());
        debug_assert!(eu.cycles_remaining == 0);

        eu.state = EUState::EXECUTING;
        eu.rob_slot_index = Some(rob_slot_index);
        eu.seq = seq;
        eu.sink = sink;
        eu.cycles_remaining = latency;
        eu_index
    }

    fn deallocate(&mut self, eu_index: u8) {
        let eu = &mut self.array[eu_index as usize];
        debug_assert!(eu.state == EUState::EXECUTING);
        debug_assert!(!self.idle_stack.contains(&eu_index));

        eu.reset();
        self.idle_stack.push(eu_index);
    }

    /// Advances every executing unit by one cycle. Finished instructions are
    /// appended to `completed` and their units become idle.
    pub(crate) fn do_cycle(&mut self, completed: &mut Vec<CDBBroadcast>) {
        for eu_index in 0..self.capacity {
            let eu = &mut self.array[eu_index as usize];
            if eu.state == EUState::IDLE {
                continue;
            }

            if !eu.cycle() {
                // the execution unit isn't finished with its work
                continue;
            }

            if let Some(tag) = eu.rob_slot_index {
                completed.push(CDBBroadcast { tag, sink: eu.sink, seq: eu.seq });
            }
            self.deallocate(eu_index);
        }
    }

    pub(crate) fn iter_busy(&self) -> impl Iterator<Item=&EU> + '_ {
        self.array.iter().filter(|eu| eu.state == EUState::EXECUTING)
    }
}
