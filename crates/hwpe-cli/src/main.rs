//! `hwpe`: command-line test bench for the HWPE MAC accelerator.
//!
//! ```text
//! USAGE:
//!   hwpe run [--backend software|mmio]   Run the MAC bench; exit code = error count
//!   hwpe status                          Read STATUS and RUNNING_JOB
//!   hwpe clear                           Write SOFT_CLEAR
//!   hwpe pack --shift N [--simplemul]    Print a packed SHIFT_SIMPLEMUL word
//!   hwpe regs                            Print the register map
//! ```

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use hwpe_driver::backends::software::{L2_BASE, L2_SIZE, RESULT_ADDR};
use hwpe_driver::mmio::DEV_MEM;
use hwpe_driver::{
    BackendSelection, BenchConfig, Hwpe, HwpeBackend, MmioConfig, MmioHwpe, Platform, PollConfig,
    SoftwareHwpe, Stimuli, TestBench,
};
use hwpe_regs::{regs, shift_simplemul_value};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hwpe", about = "HWPE accelerator test bench", version)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Run the MAC test bench and verify the golden words.
    Run(RunArgs),
    /// Print STATUS and RUNNING_JOB.
    Status(Target),
    /// Soft-clear the accelerator.
    Clear(Target),
    /// Print the SHIFT_SIMPLEMUL word for a shift and mode.
    Pack {
        /// Product shift.
        #[arg(long, default_value_t = 0)]
        shift: u16,
        /// Element-wise multiply mode.
        #[arg(long)]
        simplemul: bool,
    },
    /// Print the register map.
    Regs,
}

/// Which accelerator to talk to.
#[derive(Args)]
struct Target {
    /// Backend: software (virtual HWPE) or mmio.
    #[arg(long, default_value = "software")]
    backend: BackendSelection,
    /// Physical-memory device for the mmio backend.
    #[arg(long, default_value = DEV_MEM)]
    mem: PathBuf,
    /// Physical base of the register window.
    #[arg(long, value_parser = parse_u64, default_value = "0x1a10c000")]
    hwpe_base: u64,
}

#[derive(Args)]
struct RunArgs {
    #[command(flatten)]
    target: Target,
    /// Where buffer placement starts.
    #[arg(long, value_parser = parse_u32, default_value_t = L2_BASE)]
    data_base: u32,
    /// Bytes of data memory to map from --data-base (mmio only).
    #[arg(long, value_parser = parse_usize, default_value_t = L2_SIZE)]
    data_size: usize,
    /// Side-channel word receiving the error count.
    #[arg(long, value_parser = parse_u32)]
    result_addr: Option<u32>,
    /// Directory holding a.bin, b.bin, c.bin and optionally d.bin.
    #[arg(long)]
    stimuli: Option<PathBuf>,
    /// Seed for synthesized stimuli when --stimuli is absent.
    #[arg(long, value_parser = parse_u64, default_value = "0x5eed")]
    seed: u64,
    /// Give up spinning for a job slot after this many milliseconds.
    #[arg(long)]
    acquire_timeout_ms: Option<u64>,
    /// Give up waiting for completion after this many milliseconds.
    #[arg(long)]
    completion_timeout_ms: Option<u64>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Cmd::Run(args) => {
            let errors = cmd_run(&args)?;
            if errors != 0 {
                std::process::exit(errors);
            }
        }
        Cmd::Status(target) => cmd_status(&target)?,
        Cmd::Clear(target) => cmd_clear(&target)?,
        Cmd::Pack { shift, simplemul } => cmd_pack(shift, simplemul),
        Cmd::Regs => cmd_regs(),
    }

    Ok(())
}

fn cmd_run(args: &RunArgs) -> Result<i32> {
    let mut config = BenchConfig {
        data_base: args.data_base,
        ..BenchConfig::default()
    };
    if let Some(ms) = args.acquire_timeout_ms {
        config.acquire_poll = PollConfig::with_timeout(Duration::from_millis(ms));
    }
    config.completion_timeout = args.completion_timeout_ms.map(Duration::from_millis);

    info!(
        "Bench: backend={:?} data_base={:#x} seed={:#x}",
        args.target.backend, args.data_base, args.seed
    );
    let stimuli = match &args.stimuli {
        Some(dir) => Stimuli::from_dir(dir)
            .with_context(|| format!("loading stimuli from {}", dir.display()))?,
        None => Stimuli::synthesize(args.seed, &config.shape, &config.golden)?,
    };

    match args.target.backend {
        BackendSelection::Software => {
            config.result_addr = Some(args.result_addr.unwrap_or(RESULT_ADDR));
            let mut hwpe = Hwpe::new(SoftwareHwpe::new());
            run_bench(&TestBench::new(config), &mut hwpe, &stimuli)
        }
        BackendSelection::Mmio => {
            config.result_addr = args.result_addr;
            let mut windows = vec![(u64::from(args.data_base), args.data_size)];
            if let Some(addr) = args.result_addr {
                windows.push((u64::from(addr), 4));
            }
            let mmio = MmioConfig {
                dev: args.target.mem.clone(),
                hwpe_base: args.target.hwpe_base,
                windows,
                ..MmioConfig::default()
            };
            let mut hwpe = Hwpe::new(MmioHwpe::open(&mmio)?);
            run_bench(&TestBench::new(config), &mut hwpe, &stimuli)
        }
    }
}

fn run_bench<P: Platform>(bench: &TestBench, hwpe: &mut Hwpe<P>, stimuli: &Stimuli) -> Result<i32> {
    println!("Backend : {}", hwpe.backend().backend_type());
    let report = bench.run(hwpe, stimuli)?;
    if report.verification.passed() {
        info!("Job {} passed in {:?}", report.job_id, report.elapsed);
    } else {
        warn!("Job {}: {} mismatches", report.job_id, report.error_count());
    }

    println!("Job     : {}", report.job_id);
    println!("Elapsed : {:?}", report.elapsed);
    for (i, word) in report.output.iter().enumerate() {
        println!("D[{i}]    : {word:#010x}");
    }
    for m in &report.verification.mismatches {
        println!("  {m}");
    }
    println!(
        "Result  : {} / {} mismatches",
        report.error_count(),
        report.verification.checked
    );
    Ok(report.exit_code())
}

fn open_target(target: &Target) -> Result<Box<dyn HwpeBackend>> {
    let backend: Box<dyn HwpeBackend> = match target.backend {
        BackendSelection::Software => Box::new(SoftwareHwpe::new()),
        BackendSelection::Mmio => {
            let config = MmioConfig {
                dev: target.mem.clone(),
                hwpe_base: target.hwpe_base,
                ..MmioConfig::default()
            };
            Box::new(MmioHwpe::open(&config)?)
        }
    };
    info!("Opened {} backend", backend.backend_type());
    Ok(backend)
}

fn cmd_status(target: &Target) -> Result<()> {
    let mut hw = open_target(target)?;
    println!("Backend     : {}", hw.backend_type());
    println!("STATUS      : {:#010x}", hw.read32(regs::STATUS));
    println!("RUNNING_JOB : {:#010x}", hw.read32(regs::RUNNING_JOB));
    Ok(())
}

fn cmd_clear(target: &Target) -> Result<()> {
    let mut hw = open_target(target)?;
    hw.write32(regs::SOFT_CLEAR, 0);
    println!("Soft clear written ({})", hw.backend_type());
    Ok(())
}

fn cmd_pack(shift: u16, simplemul: bool) {
    println!("{:#010x}", shift_simplemul_value(shift, simplemul));
}

fn cmd_regs() {
    for (offset, name) in regs::ALL {
        let access = if regs::is_read_only(offset) { "RO" } else { "RW" };
        println!("{offset:#04x}  {access}  {name}");
    }
}

fn parse_u64(s: &str) -> Result<u64, std::num::ParseIntError> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16),
        None => s.replace('_', "").parse(),
    }
}

fn parse_u32(s: &str) -> Result<u32, String> {
    let v = parse_u64(s).map_err(|e| e.to_string())?;
    u32::try_from(v).map_err(|_| format!("{s} does not fit in 32 bits"))
}

fn parse_usize(s: &str) -> Result<usize, String> {
    let v = parse_u64(s).map_err(|e| e.to_string())?;
    usize::try_from(v).map_err(|e| e.to_string())
}
