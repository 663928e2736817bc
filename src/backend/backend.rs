use log::info;

use crate::backend::execution_unit::EUTable;
#[cfg(test)]
use crate::backend::register_alias_table::Operand;
use crate::backend::register_alias_table::RAT;
use crate::backend::reorder_buffer::{InstrTimeline, ROB};
use crate::backend::reservation_station::RSTable;
use crate::backend::result_bus::ResultBus;
use crate::cpu::{CPUConfig, PerfCounters, Trace};
use crate::frontend::frontend::Frontend;
use crate::instructions::instructions::{FU_CLASS_CNT, FuClass, Instr, RegisterType};

/// A retired instruction together with the cycles of its passage through the
/// pipeline.
#[derive(Clone, Copy, Debug)]
pub(crate) struct RetireRecord {
    pub(crate) instr: Instr,
    pub(crate) timeline: InstrTimeline,
}

pub(crate) struct Backend {
    rat: RAT,
    rob: ROB,
    rs_tables: Vec<RSTable>,
    eu_tables: Vec<EUTable>,
    result_bus: ResultBus,
    trace: Trace,
    dispatch_n_wide: u8,
    retired: Vec<RetireRecord>,
}

impl Backend {
    pub(crate) fn new(cpu_config: &CPUConfig) -> Backend {
        let rs_tables = FuClass::ALL
            .iter()
            .map(|&class| RSTable::new(class, cpu_config.rs_capacity(class)))
            .collect();

        let eu_tables = FuClass::ALL
            .iter()
            .map(|&class| EUTable::new(class, cpu_config.fu_count[class.index()], cpu_config.fu_latency[class.index()]))
            .collect();

        let eu_count: usize = cpu_config.fu_count.iter().map(|&count| count as usize).sum();

        Backend {
            rat: RAT::new(),
            rob: ROB::new(cpu_config.rob_capacity),
            rs_tables,
            eu_tables,
            result_bus: ResultBus::new(eu_count),
            trace: cpu_config.trace.clone(),
            dispatch_n_wide: cpu_config.frontend_n_wide,
            retired: Vec::new(),
        }
    }

    /// Runs one cycle. The order of the stages makes sure that results and
    /// retirements of the previous cycle are visible before anything new is
    /// issued, and that issue runs before dispatch reads the RAT.
    pub(crate) fn do_cycle(&mut self, frontend: &mut Frontend, perf_counters: &mut PerfCounters, cycle: u64) {
        self.cycle_writeback(cycle);
        self.cycle_retire(perf_counters, cycle);
        self.cycle_execute(perf_counters, cycle);
        self.cycle_schedule(perf_counters, cycle);
        self.cycle_dispatch(frontend, perf_counters, cycle);
    }

    /// Nothing is in flight; neither in the ROB nor on the result bus.
    pub(crate) fn is_idle(&self) -> bool {
        self.rob.is_empty() && self.result_bus.is_empty()
    }

    // Publishes the results collected on the bus in the previous cycle.
    fn cycle_writeback(&mut self, cycle: u64) {
        for broadcast in self.result_bus.drain_sorted() {
            self.rob.mark_done(broadcast.tag, cycle);

            let mut woken = 0;
            for rs_table in &mut self.rs_tables {
                woken += rs_table.wakeup(broadcast.tag);
            }

            // issued instructions already have all their sources.
            debug_assert!(self.eu_tables.iter()
                .flat_map(|eu_table| eu_table.iter_busy())
                .all(|eu| eu.rob_slot_index != Some(broadcast.tag)));

            let released = match broadcast.sink {
                Some(arch_reg) => self.rat.release_if(arch_reg, broadcast.tag),
                None => false,
            };

            if self.trace.writeback {
                info!("[{}] Writeback seq={} tag={} woke {} sources, released {}",
                      cycle, broadcast.seq, broadcast.tag, woken,
                      if released { format_register(broadcast.sink) } else { "nothing".to_string() });
            }
        }
    }

    // Retires the executed instructions at the head of the ROB in program order.
    fn cycle_retire(&mut self, perf_counters: &mut PerfCounters, cycle: u64) {
        while let Some(retired) = self.rob.retire_head(cycle) {
            if self.trace.retire {
                info!("[{}] Retired seq={} tag={} [{}]", cycle, retired.timeline.seq, retired.tag, retired.instr);
            }

            perf_counters.retired_cnt += 1;
            self.retired.push(RetireRecord { instr: retired.instr, timeline: retired.timeline });
        }
    }

    // Counts down the execution units; finished instructions go onto the bus
    // and are published next cycle.
    fn cycle_execute(&mut self, perf_counters: &mut PerfCounters, cycle: u64) {
        debug_assert!(self.result_bus.is_empty());

        let completed = self.result_bus.pending_mut();
        for eu_table in &mut self.eu_tables {
            eu_table.do_cycle(completed);
        }

        for broadcast in completed.iter() {
            self.rob.get_mut(broadcast.tag).timeline.execute = cycle;
            perf_counters.execute_cnt += 1;

            if self.trace.execute {
                info!("[{}] Executed seq={} tag={}", cycle, broadcast.seq, broadcast.tag);
            }
        }
    }

    // Per class, moves the oldest ready reservation stations onto idle execution units.
    fn cycle_schedule(&mut self, perf_counters: &mut PerfCounters, cycle: u64) {
        for class_index in 0..FU_CLASS_CNT {
            let rs_table = &mut self.rs_tables[class_index];
            let eu_table = &mut self.eu_tables[class_index];

            while eu_table.has_idle() {
                let rs = match rs_table.deque_ready() {
                    Some(rs) => rs,
                    None => break,
                };

                let tag = match rs.rob_slot_index {
                    Some(tag) => tag,
                    None => unreachable!("busy RS without a ROB slot: {}", rs),
                };

                eu_table.allocate(tag, rs.seq, rs.sink);
                self.rob.mark_issued(tag, cycle);
                perf_counters.issue_cnt += 1;

                if self.trace.issue {
                    info!("[{}] Issued seq={} tag={} on {} (latency {})",
                          cycle, rs.seq, tag, eu_table.class, eu_table.latency);
                }
            }
        }
    }

    // Renames and places the next instructions in program order into the ROB and the
    // reservation stations. Dispatch stops at the first instruction that doesn't fit, so
    // nothing younger can overtake it.
    fn cycle_dispatch(&mut self, frontend: &mut Frontend, perf_counters: &mut PerfCounters, cycle: u64) {
        for _ in 0..self.dispatch_n_wide {
            let class = match frontend.peek(cycle, perf_counters) {
                Some(fetched) => fetched.instr.class,
                None => break,
            };

            if !self.rob.has_space() {
                perf_counters.rob_full_stall_cnt += 1;
                break;
            }

            if !self.rs_tables[class.index()].has_free() {
                perf_counters.rs_full_stall_cnt += 1;
                break;
            }

            let fetched = frontend.bump();
            let instr = fetched.instr;
            let tag = self.rob.allocate(&fetched, cycle);

            // the sources are renamed before the sink is bound, so an instruction
            // reading its own destination waits on the previous producer.
            let source = [self.rat.lookup(instr.source[0]), self.rat.lookup(instr.source[1])];
            if let Some(arch_reg) = instr.sink {
                self.rat.bind(arch_reg, tag);
            }

            self.rs_tables[class.index()].allocate(tag, fetched.seq, instr.sink, source);
            perf_counters.dispatch_cnt += 1;

            if self.trace.dispatch {
                info!("[{}] Dispatched seq={} tag={} [{}] sources {:?}", cycle, fetched.seq, tag, instr, source);
            }
        }

        perf_counters.max_rob_occupancy = perf_counters.max_rob_occupancy.max(self.rob.size());
    }

    pub(crate) fn retired(&self) -> &[RetireRecord] {
        &self.retired
    }

    pub(crate) fn rob(&self) -> &ROB {
        &self.rob
    }

    pub(crate) fn rs_table(&self, class: FuClass) -> &RSTable {
        &self.rs_tables[class.index()]
    }

    pub(crate) fn eu_table(&self, class: FuClass) -> &EUTable {
        &self.eu_tables[class.index()]
    }

    pub(crate) fn result_bus(&self) -> &ResultBus {
        &self.result_bus
    }

    #[cfg(test)]
    pub(crate) fn lookup(&self, arch_reg: RegisterType) -> Operand {
        self.rat.lookup(Some(arch_reg))
    }
}

fn format_register(reg: Option<RegisterType>) -> String {
    match reg {
        Some(reg) => format!("r{}", reg),
        None => "-".to_string(),
    }
}
