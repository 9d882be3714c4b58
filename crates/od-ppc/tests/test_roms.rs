//! Test ROM execution framework for Gekko floating-point validation
//!
//! A test ROM carries a code image plus initial and expected register
//! values for GPRs and FPRs, and optionally the FPSCR the run must end with.

use od_core::error::PpcError;
use od_memory::MemoryManager;
use od_ppc::{PpcInterpreter, PpcThread};

/// Test ROM format
///
/// ```text
/// Offset | Size | Description
/// -------|------|------------
/// 0x0000 | 4    | Magic number: "GKFT" (0x474B4654)
/// 0x0004 | 4    | Version: 1
/// 0x0008 | 4    | Entry point address
/// 0x000C | 4    | Code size
/// 0x0010 | 4    | Initial register count
/// 0x0014 | 4    | Expected register count
/// 0x0018 | ...  | Initial register values (kind:u8, reg:u8, value:u64) * count
/// ...    | ...  | Code bytes
/// ...    | ...  | Expected register values (kind:u8, reg:u8, value:u64) * count
/// ```
///
/// `kind` is 0 for a GPR, 1 for ps0 of an FPR, 2 for ps1 and 3 for FPSCR.
const TEST_ROM_MAGIC: u32 = 0x474B_4654;
const TEST_ROM_VERSION: u32 = 1;
const ENTRY: u32 = 0x8000_3100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reg {
    Gpr(u8),
    Ps0(u8),
    Ps1(u8),
    Fpscr,
}

impl Reg {
    fn encode(self) -> [u8; 2] {
        match self {
            Reg::Gpr(n) => [0, n],
            Reg::Ps0(n) => [1, n],
            Reg::Ps1(n) => [2, n],
            Reg::Fpscr => [3, 0],
        }
    }

    fn decode(kind: u8, n: u8) -> Result<Self, String> {
        match kind {
            0 => Ok(Reg::Gpr(n)),
            1 => Ok(Reg::Ps0(n)),
            2 => Ok(Reg::Ps1(n)),
            3 => Ok(Reg::Fpscr),
            _ => Err(format!("Unknown register kind {}", kind)),
        }
    }

    fn read(self, thread: &PpcThread) -> u64 {
        match self {
            Reg::Gpr(n) => thread.gpr(n as usize) as u64,
            Reg::Ps0(n) => thread.ps0(n as usize),
            Reg::Ps1(n) => thread.ps1(n as usize),
            Reg::Fpscr => thread.fpscr().bits() as u64,
        }
    }

    fn write(self, thread: &mut PpcThread, value: u64) {
        match self {
            Reg::Gpr(n) => thread.set_gpr(n as usize, value as u32),
            Reg::Ps0(n) => {
                let ps1 = thread.ps1(n as usize);
                thread.set_ps(n as usize, value, ps1);
            }
            Reg::Ps1(n) => {
                let ps0 = thread.ps0(n as usize);
                thread.set_ps(n as usize, ps0, value);
            }
            Reg::Fpscr => thread.regs.fpscr.0 = value as u32,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TestRom {
    pub entry_point: u32,
    pub code: Vec<u8>,
    pub initial_regs: Vec<(Reg, u64)>,
    pub expected_regs: Vec<(Reg, u64)>,
}

fn read_u32(data: &[u8], offset: usize) -> Result<u32, String> {
    data.get(offset..offset + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| "Unexpected end of ROM (header)".to_string())
}

fn read_regs(data: &[u8], offset: &mut usize, count: usize, what: &str) -> Result<Vec<(Reg, u64)>, String> {
    let mut regs = Vec::with_capacity(count);
    for _ in 0..count {
        let entry = data
            .get(*offset..*offset + 10)
            .ok_or_else(|| format!("Unexpected end of ROM ({})", what))?;
        let reg = Reg::decode(entry[0], entry[1])?;
        let mut value = [0u8; 8];
        value.copy_from_slice(&entry[2..10]);
        regs.push((reg, u64::from_be_bytes(value)));
        *offset += 10;
    }
    Ok(regs)
}

impl TestRom {
    pub fn new(code: &[u32], initial_regs: Vec<(Reg, u64)>, expected_regs: Vec<(Reg, u64)>) -> Self {
        Self {
            entry_point: ENTRY,
            code: code.iter().flat_map(|w| w.to_be_bytes()).collect(),
            initial_regs,
            expected_regs,
        }
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, String> {
        let magic = read_u32(data, 0)?;
        if magic != TEST_ROM_MAGIC {
            return Err(format!("Invalid magic: 0x{:08X}", magic));
        }
        let version = read_u32(data, 4)?;
        if version != TEST_ROM_VERSION {
            return Err(format!("Unsupported version: {}", version));
        }

        let entry_point = read_u32(data, 8)?;
        let code_size = read_u32(data, 12)? as usize;
        let initial_count = read_u32(data, 16)? as usize;
        let expected_count = read_u32(data, 20)? as usize;

        let mut offset = 0x18;
        let initial_regs = read_regs(data, &mut offset, initial_count, "initial regs")?;
        let code = data
            .get(offset..offset + code_size)
            .ok_or_else(|| "Unexpected end of ROM (code)".to_string())?
            .to_vec();
        offset += code_size;
        let expected_regs = read_regs(data, &mut offset, expected_count, "expected regs")?;

        Ok(TestRom {
            entry_point,
            code,
            initial_regs,
            expected_regs,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut rom = Vec::new();
        rom.extend_from_slice(&TEST_ROM_MAGIC.to_be_bytes());
        rom.extend_from_slice(&TEST_ROM_VERSION.to_be_bytes());
        rom.extend_from_slice(&self.entry_point.to_be_bytes());
        rom.extend_from_slice(&(self.code.len() as u32).to_be_bytes());
        rom.extend_from_slice(&(self.initial_regs.len() as u32).to_be_bytes());
        rom.extend_from_slice(&(self.expected_regs.len() as u32).to_be_bytes());
        for (reg, value) in &self.initial_regs {
            rom.extend_from_slice(&reg.encode());
            rom.extend_from_slice(&value.to_be_bytes());
        }
        rom.extend_from_slice(&self.code);
        for (reg, value) in &self.expected_regs {
            rom.extend_from_slice(&reg.encode());
            rom.extend_from_slice(&value.to_be_bytes());
        }
        rom
    }

    /// Execute the ROM until the pc leaves the code image, then compare
    pub fn execute_and_verify(&self) -> Result<(), String> {
        let memory = MemoryManager::new().map_err(|e| format!("Failed to create memory: {}", e))?;
        let interpreter = PpcInterpreter::new(memory.clone());
        let mut thread = PpcThread::new(0, memory.clone());

        for (reg, value) in &self.initial_regs {
            reg.write(&mut thread, *value);
        }
        memory
            .load_image(self.entry_point, &self.code)
            .map_err(|e| format!("Failed to write code: {}", e))?;
        thread.set_pc(self.entry_point);

        let code_end = self.entry_point + self.code.len() as u32;
        for i in 0..10_000 {
            let pc = thread.pc();
            if pc < self.entry_point || pc >= code_end {
                break;
            }
            interpreter
                .step(&mut thread)
                .map_err(|e: PpcError| format!("Execution failed at PC=0x{:08X} (step {}): {}", pc, i, e))?;
        }

        for (reg, expected) in &self.expected_regs {
            let actual = reg.read(&thread);
            if actual != *expected {
                return Err(format!(
                    "{:?} mismatch: expected 0x{:016X}, got 0x{:016X}",
                    reg, expected, actual
                ));
            }
        }
        Ok(())
    }
}

const ONE: u64 = 0x3FF0_0000_0000_0000;
const TWO: u64 = 0x4000_0000_0000_0000;
const THREE: u64 = 0x4008_0000_0000_0000;

#[test]
fn test_rom_format() {
    let rom = TestRom::new(
        &[0xFC61_102A],
        vec![(Reg::Ps0(1), ONE), (Reg::Ps0(2), TWO)],
        vec![(Reg::Ps0(3), THREE)],
    );
    let parsed = TestRom::from_bytes(&rom.to_bytes()).unwrap();
    assert_eq!(parsed.entry_point, ENTRY);
    assert_eq!(parsed.code.len(), 4);
    assert_eq!(parsed.initial_regs, rom.initial_regs);
    assert_eq!(parsed.expected_regs, vec![(Reg::Ps0(3), THREE)]);
}

#[test]
fn test_truncated_rom_is_rejected() {
    let rom = TestRom::new(&[0xFC61_102A], vec![], vec![(Reg::Ps0(3), THREE)]);
    let bytes = rom.to_bytes();
    assert!(TestRom::from_bytes(&bytes[..bytes.len() - 3]).is_err());
}

#[test]
fn test_fadd_rom() {
    TestRom::new(
        &[0xFC61_102A], // fadd f3, f1, f2
        vec![(Reg::Ps0(1), ONE), (Reg::Ps0(2), TWO)],
        vec![(Reg::Ps0(3), THREE), (Reg::Fpscr, 0x0000_4000)],
    )
    .execute_and_verify()
    .unwrap();
}

#[test]
fn test_fmadd_rom() {
    TestRom::new(
        &[0xFC81_18BA], // fmadd f4, f1, f2, f3
        vec![(Reg::Ps0(1), TWO), (Reg::Ps0(2), THREE), (Reg::Ps0(3), ONE)],
        vec![(Reg::Ps0(4), 0x401C_0000_0000_0000)],
    )
    .execute_and_verify()
    .unwrap();
}

#[test]
fn test_fcmpu_into_cr1_rom() {
    TestRom::new(
        &[
            0xFC81_1000, // fcmpu cr1, f1, f2
            0x7C60_0026, // mfcr r3
        ],
        vec![(Reg::Ps0(1), ONE), (Reg::Ps0(2), TWO)],
        vec![(Reg::Gpr(3), 0x0800_0000), (Reg::Fpscr, 0x0000_8000)],
    )
    .execute_and_verify()
    .unwrap();
}

#[test]
fn test_frsp_inexact_rom() {
    TestRom::new(
        &[0xFCA0_0818], // frsp f5, f1
        vec![(Reg::Ps0(1), 0x3FB9_9999_9999_999A)],
        vec![
            (Reg::Ps0(5), 0x3FB9_9999_A000_0000),
            (Reg::Ps1(5), 0x3FB9_9999_A000_0000),
            (Reg::Fpscr, 0x8206_4000),
        ],
    )
    .execute_and_verify()
    .unwrap();
}

#[test]
fn test_fctiwz_rom() {
    TestRom::new(
        &[0xFCC0_081E], // fctiwz f6, f1
        vec![(Reg::Ps0(1), 0xC004_0000_0000_0000)], // -2.5
        vec![(Reg::Ps0(6), 0xFFF8_0000_FFFF_FFFE)],
    )
    .execute_and_verify()
    .unwrap();
}

#[test]
fn test_single_store_load_rom() {
    TestRom::new(
        &[
            0x3CA0_8000, // lis r5, 0x8000
            0x60A5_1000, // ori r5, r5, 0x1000
            0xD025_0000, // stfs f1, 0(r5)
            0x8065_0000, // lwz r3, 0(r5)
            0xC045_0000, // lfs f2, 0(r5)
        ],
        vec![(Reg::Ps0(1), THREE)],
        vec![
            (Reg::Gpr(3), 0x4040_0000),
            (Reg::Ps0(2), THREE),
            (Reg::Ps1(2), THREE),
        ],
    )
    .execute_and_verify()
    .unwrap();
}

#[test]
fn test_ps_add_rom() {
    TestRom::new(
        &[0x1061_102A], // ps_add f3, f1, f2
        vec![
            (Reg::Ps0(1), ONE),
            (Reg::Ps1(1), TWO),
            (Reg::Ps0(2), TWO),
            (Reg::Ps1(2), ONE),
        ],
        vec![(Reg::Ps0(3), THREE), (Reg::Ps1(3), THREE)],
    )
    .execute_and_verify()
    .unwrap();
}

#[test]
fn test_branch_skips_fp_op() {
    TestRom::new(
        &[
            0x4800_0008, // b +8
            0xFC61_102A, // fadd f3, f1, f2 (skipped)
            0xFC61_1028, // fsub f3, f1, f2
        ],
        vec![(Reg::Ps0(1), THREE), (Reg::Ps0(2), TWO)],
        vec![(Reg::Ps0(3), ONE)],
    )
    .execute_and_verify()
    .unwrap();
}
