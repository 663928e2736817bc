use log::info;

use crate::cpu::{CPUConfig, PerfCounters};
use crate::instructions::instructions::Instr;

/// Supplies decoded instructions in program order. `None` means the end of the
/// trace; no instruction follows it.
pub(crate) trait InstrSource {
    fn try_fetch_next(&mut self) -> Option<Instr>;
}

impl<I: Iterator<Item=Instr>> InstrSource for I {
    fn try_fetch_next(&mut self) -> Option<Instr> {
        self.next()
    }
}

/// An instruction pulled from the source, numbered in program order.
#[derive(Clone, Copy, Debug)]
pub(crate) struct FetchedInstr {
    pub(crate) seq: u64,
    pub(crate) instr: Instr,
    pub(crate) fetch_cycle: u64,
}

pub(crate) struct Frontend {
    source: Option<Box<dyn InstrSource>>,
    // the instruction that has been fetched but not yet accepted by dispatch.
    pending: Option<FetchedInstr>,
    exhausted: bool,
    seq_next: u64,
    trace: bool,
}

impl Frontend {
    pub(crate) fn new(cpu_config: &CPUConfig) -> Frontend {
        Frontend {
            source: None,
            pending: None,
            exhausted: false,
            seq_next: 0,
            trace: cpu_config.trace.fetch,
        }
    }

    pub(crate) fn init(&mut self, source: Box<dyn InstrSource>) {
        self.source = Some(source);
        self.pending = None;
        self.exhausted = false;
        self.seq_next = 0;
    }

    /// Returns the next instruction in program order without consuming it. The
    /// instruction stays pending until [`Frontend::bump`] is called, so a
    /// stalled dispatch sees the same instruction again next cycle.
    pub(crate) fn peek(&mut self, cycle: u64, perf_counters: &mut PerfCounters) -> Option<&FetchedInstr> {
        if self.pending.is_none() && !self.exhausted {
            let next = match &mut self.source {
                Some(source) => source.try_fetch_next(),
                None => None,
            };

            match next {
                Some(instr) => {
                    let fetched = FetchedInstr { seq: self.seq_next, instr, fetch_cycle: cycle };
                    if self.trace {
                        info!("[{}] Fetched seq={} [{}]", cycle, fetched.seq, instr);
                    }
                    self.seq_next += 1;
                    perf_counters.fetch_cnt += 1;
                    self.pending = Some(fetched);
                }
                None => {
                    if self.trace {
                        info!("[{}] End of trace after {} instructions", cycle, self.seq_next);
                    }
                    self.exhausted = true;
                }
            }
        }

        self.pending.as_ref()
    }

    /// Consumes the pending instruction.
    pub(crate) fn bump(&mut self) -> FetchedInstr {
        self.pending.take().expect("Frontend: can't bump when there is no pending instruction")
    }

    /// True once the source signaled the end of the trace and every fetched
    /// instruction has been handed to dispatch.
    pub(crate) fn is_exhausted(&self) -> bool {
        self.exhausted && self.pending.is_none()
    }
}
