//! Oxidized-Dolphin - GameCube/Wii CPU FPU and DSP core runner
//!
//! Loads a raw image into either core, runs it with the engine selected in
//! the configuration and prints the resulting state.
//!
//! ```text
//! oxidized-dolphin dsp <ucode.bin> [max-instructions]
//! oxidized-dolphin ppc <image.bin> [max-instructions]
//! ```

use std::path::PathBuf;

use anyhow::{bail, Context};
use od_core::config::{Config, Decoder};
use od_core::Emulator;
use od_dsp::{DspInterpreter, DspJit, DspThread};
use od_jit64::Jit64;
use od_memory::{DspRam, MemoryManager};
use od_ppc::{PpcInterpreter, PpcThread};

const DEFAULT_MAX_INSTRUCTIONS: u64 = 1_000_000;
/// PPC images load and start at the base of MEM1 past the exception vectors
const PPC_ENTRY: u32 = 0x0000_3100;

enum Core {
    Dsp,
    Ppc,
}

struct Args {
    core: Core,
    image: PathBuf,
    max_instructions: u64,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut args = std::env::args().skip(1);
    let core = match args.next().as_deref() {
        Some("dsp") => Core::Dsp,
        Some("ppc") => Core::Ppc,
        Some(other) => bail!("unknown core '{other}', expected 'dsp' or 'ppc'"),
        None => bail!("usage: oxidized-dolphin <dsp|ppc> <image> [max-instructions]"),
    };
    let image = args.next().map(PathBuf::from).context("missing image path")?;
    let max_instructions = match args.next() {
        Some(n) => n.parse().with_context(|| format!("invalid instruction count '{n}'"))?,
        None => DEFAULT_MAX_INSTRUCTIONS,
    };
    Ok(Args {
        core,
        image,
        max_instructions,
    })
}

fn run_dsp(config: &Config, image: &[u8], max: u64) -> anyhow::Result<()> {
    let mut ram = DspRam::new();
    ram.load_ucode(image)?;
    let mut thread = DspThread::new(Box::new(ram));

    let executed = match config.dsp.decoder {
        Decoder::Interpreter => DspInterpreter::new().run(&mut thread, max)?,
        Decoder::Recompiler => {
            let mut jit = DspJit::new(config.dsp.clone());
            let executed = jit.run(&mut thread, max)?;
            tracing::info!("DSP recompiler: {:?}", jit.stats());
            executed
        }
    };

    println!("DSP {:?} after {} instructions, pc=0x{:04x}", thread.state, executed, thread.pc());
    println!("{:#?}", thread.regs);
    Ok(())
}

fn run_ppc(config: &Config, image: &[u8], max: u64) -> anyhow::Result<()> {
    let memory = MemoryManager::new()?;
    memory.load_image(PPC_ENTRY, image)?;
    let mut thread = PpcThread::new(0, memory.clone());
    thread.set_pc(PPC_ENTRY);

    let executed = match config.cpu.ppc_decoder {
        Decoder::Interpreter => PpcInterpreter::new(memory).run(&mut thread, max)?,
        Decoder::Recompiler => {
            let mut jit = Jit64::new(memory, config.cpu.clone());
            let executed = jit.run(&mut thread, max)?;
            tracing::info!("Gekko recompiler: {:?}", jit.stats());
            executed
        }
    };

    println!("Gekko {:?} after {} instructions, pc=0x{:08x}", thread.state, executed, thread.pc());
    println!("FPSCR: {:?}", thread.fpscr());
    for i in 0..32 {
        println!("f{:<2} ps0=0x{:016x} ps1=0x{:016x}", i, thread.ps0(i), thread.ps1(i));
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = parse_args()?;

    let config = Config::load().unwrap_or_default();
    od_core::logging::init(&config);

    tracing::info!("Starting Oxidized-Dolphin");

    let mut emulator = Emulator::new(config)?;
    let image = std::fs::read(&args.image)
        .with_context(|| format!("failed to read {}", args.image.display()))?;

    emulator.start()?;
    let config = emulator.config().clone();
    let result = match args.core {
        Core::Dsp => run_dsp(&config, &image, args.max_instructions),
        Core::Ppc => run_ppc(&config, &image, args.max_instructions),
    };
    emulator.stop();
    result
}
