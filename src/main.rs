use std::path::{Path, PathBuf};
use std::process::exit;

use env_logger::Env;
use log::{error, info};
use structopt::StructOpt;

use crate::cpu::{CPU, CPUConfig, ConfigError, load_cpu_config, Stats};
use crate::loader::loader::load;

mod cpu;
mod loader;
mod frontend;
mod backend;
mod instructions;


const DEFAULT_CONFIG: &str = "cpu.yaml";

#[derive(StructOpt, Debug)]
#[structopt(name = "procsim", about = "Cycle-accurate simulator of a Tomasulo out-of-order pipeline")]
struct Opt {
    /// Path of the trace file to simulate; reads stdin when absent
    #[structopt(short = "i", long, parse(from_os_str))]
    trace: Option<PathBuf>,

    /// Sets a custom config file; cpu.yaml is used when it exists
    #[structopt(short, long, parse(from_os_str))]
    config: Option<PathBuf>,

    /// ROB size (R)
    #[structopt(short = "r", long)]
    rob_capacity: Option<u16>,

    /// Number of k0 functional units
    #[structopt(short = "j", long)]
    k0: Option<u8>,

    /// Number of k1 functional units
    #[structopt(short = "k", long)]
    k1: Option<u8>,

    /// Number of k2 functional units
    #[structopt(short = "l", long)]
    k2: Option<u8>,

    /// Number of instructions to fetch per cycle (F)
    #[structopt(short = "f", long)]
    fetch: Option<u8>,

    /// Reservation station multiplier (M)
    #[structopt(short = "m", long)]
    multiplier: Option<u16>,

    /// Prints the cycle of every stage for each retired instruction
    #[structopt(long)]
    timeline: bool,
}

fn resolve_cpu_config(opt: &Opt) -> Result<CPUConfig, ConfigError> {
    let mut cpu_config = match &opt.config {
        Some(path) => load_cpu_config(path)?,
        None if Path::new(DEFAULT_CONFIG).exists() => load_cpu_config(Path::new(DEFAULT_CONFIG))?,
        None => CPUConfig::default(),
    };

    if let Some(r) = opt.rob_capacity {
        cpu_config.rob_capacity = r;
    }
    for (class_index, count) in [opt.k0, opt.k1, opt.k2].into_iter().enumerate() {
        if let Some(count) = count {
            cpu_config.fu_count[class_index] = count;
        }
    }
    if let Some(f) = opt.fetch {
        cpu_config.frontend_n_wide = f;
    }
    if let Some(m) = opt.multiplier {
        cpu_config.rs_multiplier = m;
    }

    cpu_config.validate()?;
    Ok(cpu_config)
}

fn print_settings(cpu_config: &CPUConfig) {
    println!("Processor Settings");
    println!("R: {}", cpu_config.rob_capacity);
    println!("k0: {}", cpu_config.fu_count[0]);
    println!("k1: {}", cpu_config.fu_count[1]);
    println!("k2: {}", cpu_config.fu_count[2]);
    println!("F: {}", cpu_config.frontend_n_wide);
    println!("M: {}", cpu_config.rs_multiplier);
    println!("latency: {:?}", cpu_config.fu_latency);
    println!();
}

fn print_timeline(cpu: &CPU) {
    println!("INST\tADDR\tCLASS\tFETCH\tDISP\tISSUE\tEXEC\tWB\tRETIRE");
    for record in cpu.retired() {
        let timeline = &record.timeline;
        println!("{}\t{:#x}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
                 timeline.seq + 1,
                 record.instr.addr,
                 record.instr.class,
                 timeline.fetch,
                 timeline.dispatch,
                 timeline.issue,
                 timeline.execute,
                 timeline.writeback,
                 timeline.retire);
    }
    println!();
}

fn print_statistics(stats: &Stats) {
    println!("Processor stats:");
    println!("Avg inst retired per cycle: {:.6}", stats.avg_inst_retired);
    println!("Avg inst fired per cycle: {:.6}", stats.avg_inst_fired);
    println!("Total instructions: {}", stats.retired_instruction);
    println!("Total run time (cycles): {}", stats.cycle_count);
    println!("Dispatch stalls (ROB full): {}", stats.rob_full_stall_cnt);
    println!("Dispatch stalls (RS full): {}", stats.rs_full_stall_cnt);
    println!("Max ROB occupancy: {}", stats.max_rob_occupancy);
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let opt = Opt::from_args();

    let cpu_config = match resolve_cpu_config(&opt) {
        Ok(config) => config,
        Err(err) => {
            error!("Invalid configuration: {}", err);
            exit(1);
        }
    };

    let program = match load(opt.trace.as_deref()) {
        Ok(program) => program,
        Err(err) => {
            error!("Loading the trace failed: {}", err);
            exit(1);
        }
    };
    info!("Loaded {} instructions", program.len());

    print_settings(&cpu_config);

    let mut cpu = CPU::new(&cpu_config);
    cpu.init(program);
    let stats = cpu.run();

    if opt.timeline {
        print_timeline(&cpu);
    }
    print_statistics(&stats);
}
