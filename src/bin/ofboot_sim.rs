// CLASSIFICATION: COMMUNITY
// Filename: ofboot_sim.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-19

//! `ofboot-sim` runs bring-up against an emulated machine described in TOML.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::error;

use ofboot::bootloader::alloc::RegionTable;
use ofboot::bootloader::cmdline::{build_cmdline, cmdline_size, AcceptAll, VerifyKind};
use ofboot::bootloader::env::EnvMap;
use ofboot::firmware::emulated::{EmulatedFirmware, MachineDescription, RecordingDevices};
use ofboot::{LoaderFlags, Machine};

/// CLI for the bring-up simulator.
#[derive(Parser, Debug)]
#[command(name = "ofboot-sim", about = "Simulate Open Firmware bring-up", version = "0.1")]
struct Cli {
    /// Machine description (platform, image, firmware).
    #[arg(long, value_name = "FILE")]
    machine: PathBuf,
    /// Arguments to serialize into a kernel command line.
    #[arg(long, num_args = 1..)]
    args: Vec<String>,
    /// Command-line buffer size; defaults to what the arguments need.
    #[arg(long, value_name = "BYTES")]
    cmdline_cap: Option<usize>,
    /// Loader device name reported for network boot paths.
    #[arg(long, value_name = "NAME")]
    net_device: Option<String>,
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let desc = MachineDescription::load(&cli.machine)?;
    let config = desc.platform_config()?;
    let firmware = EmulatedFirmware::new(desc.firmware.clone());
    let mut machine = Machine::new(firmware, RecordingDevices::default(), config, desc.image)?;
    if let Some(name) = cli.net_device {
        machine = machine.with_net_config(move |_canonical: &str, _bootpath: &str| {
            (name.clone(), None::<String>)
        });
    }

    let mut heap = RegionTable::new();
    let mut env = EnvMap::new();
    let report = machine.init(&mut heap, &mut env)?;

    println!(
        "heap: {:#x} of {:#x} bytes",
        report.heap.claimed_bytes(),
        report.heap.desired_size
    );
    for claim in &report.heap.claims {
        println!(
            "  block {:>3}: {:#010x} + {:#x}",
            claim.block_index, claim.base, claim.length
        );
    }
    println!("modbase: {:#x}", report.modbase);
    println!(
        "platform: {:?} heap, timer {:?}, quirks {:?}",
        machine.config().heap_strategy,
        machine.config().timer,
        machine.config().quirks
    );
    println!("secure boot: level {}", report.secure_boot.0);
    for (key, value) in env.iter() {
        println!("env: {key}={value}");
    }
    match machine.boot_location() {
        Some(location) => println!(
            "boot: device={} path={}",
            location.device.as_deref().unwrap_or("-"),
            location.path.as_deref().unwrap_or("-")
        ),
        None => println!("boot: unknown"),
    }

    if !cli.args.is_empty() {
        let cap = cli.cmdline_cap.unwrap_or_else(|| cmdline_size(&cli.args[..]));
        let mut buf = vec![0u8; cap];
        let len = build_cmdline(&cli.args[..], &mut buf, VerifyKind::KernelCmdline, &AcceptAll)?;
        println!("cmdline: {}", String::from_utf8_lossy(&buf[..len]));
    }

    machine.fini(LoaderFlags::NORETURN);
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("ofboot-sim: {err}");
            ExitCode::FAILURE
        }
    }
}
