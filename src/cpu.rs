use std::fs::File;
use std::io;
use std::path::Path;

use log::info;
use serde::Deserialize;
use thiserror::Error;

use crate::backend::backend::{Backend, RetireRecord};
use crate::frontend::frontend::Frontend;
use crate::instructions::instructions::{FU_CLASS_CNT, FuClass, Program};

pub(crate) struct PerfCounters {
    pub fetch_cnt: u64,
    pub dispatch_cnt: u64,
    pub issue_cnt: u64,
    pub execute_cnt: u64,
    pub retired_cnt: u64,
    pub cycle_cnt: u64,
    pub rob_full_stall_cnt: u64,
    pub rs_full_stall_cnt: u64,
    pub max_rob_occupancy: u16,
}

impl PerfCounters {
    pub fn new() -> Self {
        Self {
            fetch_cnt: 0,
            dispatch_cnt: 0,
            issue_cnt: 0,
            execute_cnt: 0,
            retired_cnt: 0,
            cycle_cnt: 0,
            rob_full_stall_cnt: 0,
            rs_full_stall_cnt: 0,
            max_rob_occupancy: 0,
        }
    }

    fn per_cycle(&self, cnt: u64) -> f64 {
        if self.cycle_cnt == 0 {
            0.0
        } else {
            cnt as f64 / self.cycle_cnt as f64
        }
    }
}

/// The statistics reported once the processor has drained.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Stats {
    pub(crate) retired_instruction: u64,
    pub(crate) cycle_count: u64,
    // retired instructions per cycle (IPC)
    pub(crate) avg_inst_retired: f64,
    // instructions issued to an execution unit per cycle
    pub(crate) avg_inst_fired: f64,
    pub(crate) rob_full_stall_cnt: u64,
    pub(crate) rs_full_stall_cnt: u64,
    pub(crate) max_rob_occupancy: u16,
}

impl Stats {
    fn new(perf_counters: &PerfCounters) -> Stats {
        Stats {
            retired_instruction: perf_counters.retired_cnt,
            cycle_count: perf_counters.cycle_cnt,
            avg_inst_retired: perf_counters.per_cycle(perf_counters.retired_cnt),
            avg_inst_fired: perf_counters.per_cycle(perf_counters.issue_cnt),
            rob_full_stall_cnt: perf_counters.rob_full_stall_cnt,
            rs_full_stall_cnt: perf_counters.rs_full_stall_cnt,
            max_rob_occupancy: perf_counters.max_rob_occupancy,
        }
    }
}

#[derive(Clone, Deserialize, Debug, Default)]
#[serde(default)]
pub(crate) struct Trace {
    pub fetch: bool,
    pub dispatch: bool,
    pub issue: bool,
    pub execute: bool,
    pub writeback: bool,
    pub retire: bool,
    pub cycle: bool,
}

#[derive(Clone, Deserialize, Debug)]
#[serde(default)]
pub(crate) struct CPUConfig {
    // the capacity of the reorder buffer (R). It is also the number of distinct tags.
    pub(crate) rob_capacity: u16,
    // the number of functional units per class (K0, K1, K2).
    pub(crate) fu_count: [u8; FU_CLASS_CNT],
    // the number of cycles a functional unit of each class needs per instruction.
    pub(crate) fu_latency: [u8; FU_CLASS_CNT],
    // the number of instructions the frontend can fetch and dispatch per clock cycle (F).
    pub(crate) frontend_n_wide: u8,
    // the number of reservation stations of a class is rs_multiplier * fu_count (M).
    pub(crate) rs_multiplier: u16,
    // if processing of a single instruction should be traced (logged)
    pub(crate) trace: Trace,
}

impl Default for CPUConfig {
    fn default() -> Self {
        CPUConfig {
            rob_capacity: 8,
            fu_count: [1, 2, 3],
            fu_latency: [1, 2, 3],
            frontend_n_wide: 4,
            rs_multiplier: 2,
            trace: Trace::default(),
        }
    }
}

#[derive(Debug, Error)]
pub(crate) enum ConfigError {
    #[error("failed to open '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse '{path}': {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("{0} must be larger than 0")]
    Zero(&'static str),
    #[error("class {0} needs at least one functional unit")]
    NoFunctionalUnits(FuClass),
    #[error("the latency of class {0} must be larger than 0")]
    ZeroLatency(FuClass),
    #[error("the reservation station capacity of class {0} doesn't fit in 16 bits")]
    RsCapacityOverflow(FuClass),
}

impl CPUConfig {
    /// The number of reservation stations of a class.
    pub(crate) fn rs_capacity(&self, class: FuClass) -> u16 {
        self.rs_multiplier.saturating_mul(self.fu_count[class.index()] as u16)
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.rob_capacity == 0 {
            return Err(ConfigError::Zero("rob_capacity"));
        }

        if self.frontend_n_wide == 0 {
            return Err(ConfigError::Zero("frontend_n_wide"));
        }

        if self.rs_multiplier == 0 {
            return Err(ConfigError::Zero("rs_multiplier"));
        }

        for class in FuClass::ALL {
            if self.fu_count[class.index()] == 0 {
                return Err(ConfigError::NoFunctionalUnits(class));
            }

            if self.fu_latency[class.index()] == 0 {
                return Err(ConfigError::ZeroLatency(class));
            }

            if self.rs_multiplier.checked_mul(self.fu_count[class.index()] as u16).is_none() {
                return Err(ConfigError::RsCapacityOverflow(class));
            }
        }

        Ok(())
    }
}

pub(crate) fn load_cpu_config(file_path: &Path) -> Result<CPUConfig, ConfigError> {
    let path = file_path.display().to_string();
    let file = File::open(file_path).map_err(|source| ConfigError::Io { path: path.clone(), source })?;
    serde_yaml::from_reader(file).map_err(|source| ConfigError::Yaml { path, source })
}

/// The pipeline driver. Owns all simulation state and advances it one cycle
/// at a time until the trace is exhausted and every instruction has retired.
pub(crate) struct CPU {
    pub(crate) backend: Backend,
    pub(crate) frontend: Frontend,
    trace: Trace,
    pub(crate) perf_counters: PerfCounters,
}

impl CPU {
    pub(crate) fn new(cpu_config: &CPUConfig) -> CPU {
        debug_assert!(cpu_config.validate().is_ok(), "CPU: invalid config {:?}", cpu_config);

        CPU {
            backend: Backend::new(cpu_config),
            frontend: Frontend::new(cpu_config),
            trace: cpu_config.trace.clone(),
            perf_counters: PerfCounters::new(),
        }
    }

    pub(crate) fn init(&mut self, program: Program) {
        self.frontend.init(Box::new(program.code.into_iter()));
    }

    pub(crate) fn is_done(&self) -> bool {
        self.frontend.is_exhausted() && self.backend.is_idle()
    }

    pub(crate) fn do_cycle(&mut self) {
        self.perf_counters.cycle_cnt += 1;
        let cycle = self.perf_counters.cycle_cnt;

        self.backend.do_cycle(&mut self.frontend, &mut self.perf_counters, cycle);

        if self.trace.cycle {
            let perf_counters = &self.perf_counters;
            info!("[Cycles:{}][Fetched={}][Dispatched={}][Issued={}][Executed={}][Retired={}][ROB={}][CDB={}][IPC={:.2}]{}",
                  perf_counters.cycle_cnt,
                  perf_counters.fetch_cnt,
                  perf_counters.dispatch_cnt,
                  perf_counters.issue_cnt,
                  perf_counters.execute_cnt,
                  perf_counters.retired_cnt,
                  self.backend.rob().size(),
                  self.backend.result_bus().pending().len(),
                  perf_counters.per_cycle(perf_counters.retired_cnt),
                  self.format_occupancy());
        }
    }

    // per class: busy reservation stations and busy execution units.
    fn format_occupancy(&self) -> String {
        FuClass::ALL
            .iter()
            .map(|&class| {
                let rs_table = self.backend.rs_table(class);
                let eu_table = self.backend.eu_table(class);
                format!("[{} RS={}/{} EU={}/{}]",
                        class, rs_table.size(), rs_table.capacity, eu_table.busy_count(), eu_table.capacity)
            })
            .collect()
    }

    pub(crate) fn run(&mut self) -> Stats {
        while !self.is_done() {
            self.do_cycle();
        }

        info!("Program complete after {} cycles", self.perf_counters.cycle_cnt);
        self.stats()
    }

    pub(crate) fn stats(&self) -> Stats {
        Stats::new(&self.perf_counters)
    }

    pub(crate) fn retired(&self) -> &[RetireRecord] {
        self.backend.retired()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = CPUConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.rs_capacity(FuClass::K0), 2);
        assert_eq!(config.rs_capacity(FuClass::K1), 4);
        assert_eq!(config.rs_capacity(FuClass::K2), 6);
    }

    #[test]
    fn test_validate() {
        let config = CPUConfig { rob_capacity: 0, ..CPUConfig::default() };
        assert!(matches!(config.validate(), Err(ConfigError::Zero("rob_capacity"))));

        let config = CPUConfig { frontend_n_wide: 0, ..CPUConfig::default() };
        assert!(matches!(config.validate(), Err(ConfigError::Zero("frontend_n_wide"))));

        let config = CPUConfig { rs_multiplier: 0, ..CPUConfig::default() };
        assert!(matches!(config.validate(), Err(ConfigError::Zero("rs_multiplier"))));

        let config = CPUConfig { fu_count: [1, 0, 1], ..CPUConfig::default() };
        assert!(matches!(config.validate(), Err(ConfigError::NoFunctionalUnits(FuClass::K1))));

        let config = CPUConfig { fu_latency: [1, 1, 0], ..CPUConfig::default() };
        assert!(matches!(config.validate(), Err(ConfigError::ZeroLatency(FuClass::K2))));

        let config = CPUConfig { rs_multiplier: 1000, fu_count: [1, 255, 1], ..CPUConfig::default() };
        assert!(matches!(config.validate(), Err(ConfigError::RsCapacityOverflow(FuClass::K1))));
    }

    #[test]
    fn test_load_cpu_config() {
        let path = std::env::temp_dir().join(format!("procsim-cpu-{}.yaml", std::process::id()));
        let mut file = File::create(&path).unwrap();
        writeln!(file, "rob_capacity: 16").unwrap();
        writeln!(file, "fu_count: [2, 2, 1]").unwrap();
        writeln!(file, "trace:").unwrap();
        writeln!(file, "  retire: true").unwrap();
        drop(file);

        let config = load_cpu_config(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.rob_capacity, 16);
        assert_eq!(config.fu_count, [2, 2, 1]);
        // missing fields keep their defaults
        assert_eq!(config.fu_latency, [1, 2, 3]);
        assert_eq!(config.frontend_n_wide, 4);
        assert!(config.trace.retire);
        assert!(!config.trace.issue);
    }

    #[test]
    fn test_load_cpu_config_missing() {
        let result = load_cpu_config(Path::new("/nonexistent/cpu.yaml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_stats_without_cycles() {
        let stats = Stats::new(&PerfCounters::new());
        assert_eq!(stats.avg_inst_retired, 0.0);
        assert_eq!(stats.avg_inst_fired, 0.0);
    }
}
