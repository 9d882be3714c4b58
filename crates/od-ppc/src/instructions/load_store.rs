//! Integer and floating-point load/store instructions
//!
//! Single-precision loads go through the Gekko conversion and fill both
//! paired-single slots; single stores use the matching store conversion.

use od_core::error::{MemoryError, PpcError};

use crate::fp_temp::{convert_to_double, convert_to_single};
use crate::thread::PpcThread;

fn data_error(ea: u32) -> impl FnOnce(MemoryError) -> PpcError {
    move |source| PpcError::DataAccess { addr: ea, source }
}

/// Effective address for D-form: (rA|0) + d
#[inline]
pub fn ea_d(thread: &PpcThread, ra: u8, d: i16) -> u32 {
    thread.gpr_or_zero(ra as usize).wrapping_add(d as i32 as u32)
}

/// Effective address for X-form: (rA|0) + rB
#[inline]
pub fn ea_x(thread: &PpcThread, ra: u8, rb: u8) -> u32 {
    thread.gpr_or_zero(ra as usize).wrapping_add(thread.gpr(rb as usize))
}

/// Integer load of `size` bytes, zero-extended
pub fn load_int(thread: &mut PpcThread, rt: u8, ea: u32, size: usize) -> Result<(), PpcError> {
    let memory = thread.memory().clone();
    let value = match size {
        1 => memory.read_u8(ea).map(u32::from),
        2 => memory.read_be16(ea).map(u32::from),
        _ => memory.read_be32(ea),
    }
    .map_err(data_error(ea))?;
    thread.set_gpr(rt as usize, value);
    Ok(())
}

/// Integer store of the low `size` bytes of rS
pub fn store_int(thread: &mut PpcThread, rs: u8, ea: u32, size: usize) -> Result<(), PpcError> {
    let value = thread.gpr(rs as usize);
    let memory = thread.memory();
    match size {
        1 => memory.write_u8(ea, value as u8),
        2 => memory.write_be16(ea, value as u16),
        _ => memory.write_be32(ea, value),
    }
    .map_err(data_error(ea))
}

/// lfs family: single load, converted and written to both slots
pub fn lfs(thread: &mut PpcThread, frd: u8, ea: u32) -> Result<(), PpcError> {
    let word = thread.memory().read_be32(ea).map_err(data_error(ea))?;
    thread.fill_ps(frd as usize, convert_to_double(word));
    Ok(())
}

/// lfd family: only ps0 changes
pub fn lfd(thread: &mut PpcThread, frd: u8, ea: u32) -> Result<(), PpcError> {
    let bits = thread.memory().read_be64(ea).map_err(data_error(ea))?;
    thread.set_fpr(frd as usize, bits);
    Ok(())
}

pub fn stfs(thread: &mut PpcThread, frs: u8, ea: u32) -> Result<(), PpcError> {
    let word = convert_to_single(thread.fpr(frs as usize));
    thread.memory().write_be32(ea, word).map_err(data_error(ea))
}

pub fn stfd(thread: &mut PpcThread, frs: u8, ea: u32) -> Result<(), PpcError> {
    let bits = thread.fpr(frs as usize);
    thread.memory().write_be64(ea, bits).map_err(data_error(ea))
}

/// Run a D-form load/store (primary opcodes 32-55); the update forms write
/// the effective address back to rA after a successful access.
pub fn execute_d(thread: &mut PpcThread, op: u8, rt: u8, ra: u8, d: i16) -> Result<bool, PpcError> {
    let ea = ea_d(thread, ra, d);
    let update = matches!(op, 33 | 35 | 37 | 39 | 41 | 45 | 49 | 51 | 53 | 55);

    match op {
        32 | 33 => load_int(thread, rt, ea, 4)?,
        34 | 35 => load_int(thread, rt, ea, 1)?,
        40 | 41 => load_int(thread, rt, ea, 2)?,
        36 | 37 => store_int(thread, rt, ea, 4)?,
        38 | 39 => store_int(thread, rt, ea, 1)?,
        44 | 45 => store_int(thread, rt, ea, 2)?,
        48 | 49 => lfs(thread, rt, ea)?,
        50 | 51 => lfd(thread, rt, ea)?,
        52 | 53 => stfs(thread, rt, ea)?,
        54 | 55 => stfd(thread, rt, ea)?,
        _ => return Ok(false),
    }

    if update {
        thread.set_gpr(ra as usize, ea);
    }
    Ok(true)
}

/// Run an indexed (X-form, opcode 31) load/store
pub fn execute_x(thread: &mut PpcThread, xo: u16, rt: u8, ra: u8, rb: u8) -> Result<bool, PpcError> {
    let ea = ea_x(thread, ra, rb);
    match xo {
        23 => load_int(thread, rt, ea, 4)?,
        87 => load_int(thread, rt, ea, 1)?,
        151 => store_int(thread, rt, ea, 4)?,
        215 => store_int(thread, rt, ea, 1)?,
        535 => lfs(thread, rt, ea)?,
        599 => lfd(thread, rt, ea)?,
        663 => stfs(thread, rt, ea)?,
        727 => stfd(thread, rt, ea)?,
        _ => return Ok(false),
    }
    Ok(true)
}
