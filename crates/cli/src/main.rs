use anyhow::Context;
use classb_config::{render_linker_script, PlacementManifest};
use classb_pctest::fault::{fault_coverage, CoverageReport};
use classb_pctest::{
    FixedProbe, FlashWindow, PcVerifier, PlacementSource, PlacementTable, ProbeReading, Verdict,
};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

const EXIT_FAIL: i32 = 1;
const EXIT_CONFIG_ERROR: i32 = 2;

#[derive(Parser, Debug)]
#[command(author, version, about = "Class-B Program Counter Test tooling", long_about = None)]
struct Args {
    /// Enable debug-level logging
    #[arg(short, long, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the PC test natively on this host
    Run {
        /// Number of consecutive runs; all must pass
        #[arg(long, default_value = "1", value_parser = clap::value_parser!(u32).range(1..))]
        iterations: u32,

        /// Print a JSON report on stdout
        #[arg(long)]
        json: bool,
    },
    /// Validate a placement manifest and print its table
    Check {
        #[arg(short, long)]
        manifest: PathBuf,

        #[arg(long)]
        json: bool,
    },
    /// Emit the linker script fragment for a placement manifest
    LinkerScript {
        #[arg(short, long)]
        manifest: PathBuf,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Check that a linked firmware placed the probes where the manifest says
    VerifyElf {
        #[arg(short, long)]
        manifest: PathBuf,

        #[arg(short, long)]
        firmware: PathBuf,

        #[arg(long)]
        json: bool,
    },
    /// Inject every single PC stuck-at fault and report how many are caught
    Coverage {
        #[arg(short, long)]
        manifest: PathBuf,

        #[arg(long)]
        json: bool,
    },
}

#[derive(Serialize)]
struct RunReport {
    verdict: Verdict,
    raw: i32,
    iterations: u32,
    failures: u32,
    source: PlacementSource,
    readings: [ProbeReading; 3],
}

#[derive(Serialize)]
struct ProbeEntry {
    probe: u8,
    symbol: &'static str,
    section: &'static str,
    address: usize,
}

#[derive(Serialize)]
struct CheckReport {
    chip: String,
    window: FlashWindow,
    mask: usize,
    probes: Vec<ProbeEntry>,
}

#[derive(Serialize)]
struct VerifyReport {
    chip: String,
    firmware: PathBuf,
    verdict: Verdict,
    readings: [ProbeReading; 3],
}

#[derive(Serialize)]
struct CoverageOutput {
    chip: String,
    mask: usize,
    #[serde(flatten)]
    report: CoverageReport,
    ratio: f64,
}

fn main() {
    let args = Args::parse();

    let level = if args.trace {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match dispatch(args.command) {
        Ok(Verdict::Pass) => {}
        Ok(Verdict::Fail) => std::process::exit(EXIT_FAIL),
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(EXIT_CONFIG_ERROR);
        }
    }
}

fn dispatch(command: Command) -> anyhow::Result<Verdict> {
    match command {
        Command::Run { iterations, json } => run(iterations, json),
        Command::Check { manifest, json } => check(&manifest, json),
        Command::LinkerScript { manifest, output } => linker_script(&manifest, output.as_deref()),
        Command::VerifyElf {
            manifest,
            firmware,
            json,
        } => verify_elf(&manifest, &firmware, json),
        Command::Coverage { manifest, json } => coverage(&manifest, json),
    }
}

fn load_manifest(path: &Path) -> anyhow::Result<PlacementManifest> {
    info!("Loading placement manifest: {:?}", path);
    PlacementManifest::from_file(path)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run(iterations: u32, json: bool) -> anyhow::Result<Verdict> {
    let (table, source) = PlacementTable::default_for_build();
    info!("Running PC test {} time(s) with {:?} placement", iterations, source);

    let verifier = PcVerifier::native(table);
    let mut failures = 0;
    for _ in 0..iterations {
        if !verifier.run_pc_test().is_pass() {
            failures += 1;
        }
    }
    let verdict = Verdict::from(failures == 0);
    let readings = verifier.inspect();

    if json {
        print_json(&RunReport {
            verdict,
            raw: verdict.as_raw(),
            iterations,
            failures,
            source,
            readings,
        })?;
    } else {
        print_readings(&readings);
        println!("PC test: {} ({})", verdict, verdict.as_raw());
    }

    if failures > 0 {
        warn!("{} of {} runs failed", failures, iterations);
    }
    Ok(verdict)
}

fn check(manifest_path: &Path, json: bool) -> anyhow::Result<Verdict> {
    let manifest = load_manifest(manifest_path)?;
    let window = manifest.window()?;
    let table = manifest.placement()?;

    let probes = table
        .iter()
        .map(|(id, address)| ProbeEntry {
            probe: id.number(),
            symbol: id.symbol(),
            section: id.section(),
            address,
        })
        .collect::<Vec<_>>();

    if json {
        print_json(&CheckReport {
            chip: manifest.chip.name.clone(),
            window,
            mask: window.mask(),
            probes,
        })?;
    } else {
        println!(
            "{}: flash {:#010X} + {:#x}, exercised bits {:#x}",
            manifest.chip.name,
            window.base(),
            window.size(),
            window.mask()
        );
        for entry in &probes {
            println!("  {} -> {:#010X}", entry.section, entry.address);
        }
        println!("Placement OK");
    }
    Ok(Verdict::Pass)
}

fn linker_script(manifest_path: &Path, output: Option<&Path>) -> anyhow::Result<Verdict> {
    let manifest = load_manifest(manifest_path)?;
    let script = render_linker_script(&manifest.chip.name, &manifest.placement()?);

    match output {
        Some(path) => {
            std::fs::write(path, &script)
                .with_context(|| format!("Failed to write linker script to {:?}", path))?;
            info!("Wrote linker script fragment to {:?}", path);
        }
        None => print!("{}", script),
    }
    Ok(Verdict::Pass)
}

fn verify_elf(manifest_path: &Path, firmware: &Path, json: bool) -> anyhow::Result<Verdict> {
    let manifest = load_manifest(manifest_path)?;
    let expected = manifest.placement()?;

    info!("Reading probe symbols from {:?}", firmware);
    let linked = classb_loader::probe_addresses(firmware)?;

    // Same check the target runs, with each probe fixed at its link address.
    let verifier = PcVerifier::new(linked.addresses().map(FixedProbe), expected);
    let verdict = verifier.run_pc_test();
    let readings = verifier.inspect();

    if json {
        print_json(&VerifyReport {
            chip: manifest.chip.name.clone(),
            firmware: firmware.to_path_buf(),
            verdict,
            readings,
        })?;
    } else {
        print_readings(&readings);
        println!("Placement of {:?}: {}", firmware, verdict);
    }
    Ok(verdict)
}

fn coverage(manifest_path: &Path, json: bool) -> anyhow::Result<Verdict> {
    let manifest = load_manifest(manifest_path)?;
    let window = manifest.window()?;
    let table = manifest.placement()?;

    let report = fault_coverage(&table, window.mask());
    let verdict = Verdict::from(report.is_complete());

    if json {
        print_json(&CoverageOutput {
            chip: manifest.chip.name.clone(),
            mask: window.mask(),
            report,
            ratio: report.ratio(),
        })?;
    } else {
        println!(
            "{}: detected {} of {} injected faults ({:.1}%)",
            manifest.chip.name,
            report.detected,
            report.injected,
            report.ratio() * 100.0
        );
        if let Some(fault) = report.first_escape {
            println!("First undetected fault: {:?}", fault);
        }
    }
    Ok(verdict)
}

fn print_readings(readings: &[ProbeReading; 3]) {
    for reading in readings {
        let mark = if reading.matches() { "ok" } else { "MISMATCH" };
        println!(
            "  {} ({}): expected {:#x}, observed {:#x} [{}]",
            reading.id,
            reading.id.symbol(),
            reading.expected,
            reading.observed,
            mark
        );
    }
}
