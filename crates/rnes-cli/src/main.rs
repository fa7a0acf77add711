//! rnes CLI - headless command line front-end
//!
//! Runs a ROM for a number of frames, optionally tracing instructions in
//! nestest log format, and dumps CPU/PPU state afterwards.

use clap::Parser;
use rnes_core::System;
use std::fs;
use std::path::PathBuf;
use std::process;

/// Nanoseconds per 60Hz frame
const FRAME_NS: i64 = 1_000_000_000 / 60;

#[derive(Parser, Debug)]
#[command(name = "rnes-cli")]
#[command(about = "A headless NES emulator CLI", long_about = None)]
struct Args {
    /// Path to the iNES ROM file
    #[arg(short, long)]
    rom: PathBuf,

    /// Number of frames to run
    #[arg(short, long, default_value = "60")]
    frames: u64,

    /// Trace N instructions in nestest log format instead of running frames
    #[arg(short, long)]
    trace: Option<u64>,

    /// Override the start PC (hex), e.g. C000 for nestest automation mode
    #[arg(long, value_parser = parse_hex16)]
    start_pc: Option<u16>,

    /// Dump CPU state after execution
    #[arg(short = 'c', long)]
    dump_cpu: bool,

    /// Dump PPU state after execution
    #[arg(short = 'p', long)]
    dump_ppu: bool,
}

fn parse_hex16(s: &str) -> Result<u16, String> {
    u16::from_str_radix(s.trim_start_matches("0x"), 16).map_err(|e| e.to_string())
}

fn main() {
    let args = Args::parse();

    let rom_data = match fs::read(&args.rom) {
        Ok(data) => data,
        Err(e) => {
            eprintln!("Failed to read ROM file: {}", e);
            process::exit(1);
        }
    };

    let mut system = System::new();
    if let Err(e) = system.load_rom(&rom_data) {
        eprintln!("Failed to load ROM: {}", e);
        process::exit(1);
    }

    let header = system.bus().cartridge().header();
    println!(
        "Loaded cartridge: PRG {}KB, CHR {}KB, mapper {}, {:?} mirroring",
        header.prg_banks as usize * 16,
        header.chr_banks as usize * 8,
        header.mapper_id,
        header.mirroring,
    );

    if let Some(pc) = args.start_pc {
        system.cpu_mut().registers_mut().pc = pc;
    }

    if let Some(steps) = args.trace {
        trace(&mut system, steps);
    } else {
        run_frames(&mut system, args.frames);
    }

    if args.dump_cpu {
        dump_cpu_state(&system);
    }
    if args.dump_ppu {
        dump_ppu_state(&system);
    }
}

fn trace(system: &mut System, steps: u64) {
    for _ in 0..steps {
        println!("{}", system.trace());
        if let Err(e) = system.step() {
            eprintln!("CPU stopped: {}", e);
            break;
        }
    }
}

fn run_frames(system: &mut System, frames: u64) {
    println!("Running {} frames...", frames);
    for _ in 0..frames {
        if let Err(e) = system.tick(FRAME_NS) {
            eprintln!("CPU stopped: {}", e);
            process::exit(1);
        }
    }
    println!("Completed {} frames.", system.ppu().frame_count());
}

fn dump_cpu_state(system: &System) {
    let snapshot = system.debug_cpu();
    println!("\nCPU State:");
    println!("  A:    ${:02X}", snapshot.a);
    println!("  X:    ${:02X}", snapshot.x);
    println!("  Y:    ${:02X}", snapshot.y);
    println!("  PC:   ${:04X}", snapshot.pc);
    println!("  SP:   ${:02X}", snapshot.sp);
    println!("  P:    ${:02X} ({})", snapshot.p, system.cpu().status());
    println!("  Cycles: {}", snapshot.total_cycles);
}

fn dump_ppu_state(system: &System) {
    let ppu = system.ppu();
    println!("\nPPU State:");
    println!("  Scanline: {}", ppu.scanline());
    println!("  Dot: {}", ppu.dot());
    println!("  Frame: {}", ppu.frame_count());
    println!("  VBLANK: {}", ppu.status().vblank());
    println!("  Sprite 0 hit: {}", ppu.status().sprite_zero_hit());
}
