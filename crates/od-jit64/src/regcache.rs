//! Floating-point register cache
//!
//! Guest FPRs live in SSE registers while a block runs, lane 0 holding ps0
//! and lane 1 ps1. Alongside the bindings the cache tracks what the block
//! has proven about each value: whether it is exactly representable as a
//! single and whether both lanes hold the same value.

use od_emitter::{Emitter, Xmm};

use crate::fp::Fallback;
use crate::guest::PpcGuestOp;

/// Host registers available for allocation. XMM0 and XMM1 are scratch.
pub const ALLOCATION_ORDER: [Xmm; 14] = [
    Xmm(2),
    Xmm(3),
    Xmm(4),
    Xmm(5),
    Xmm(6),
    Xmm(7),
    Xmm(8),
    Xmm(9),
    Xmm(10),
    Xmm(11),
    Xmm(12),
    Xmm(13),
    Xmm(14),
    Xmm(15),
];

pub const SCRATCH: Xmm = Xmm::SCRATCH;
pub const SCRATCH2: Xmm = Xmm(1);

#[derive(Debug, Clone, Copy, Default)]
struct Binding {
    host: Option<Xmm>,
    dirty: bool,
    locked: bool,
    last_use: u64,
}

#[derive(Debug, Clone, Copy, Default)]
struct ValueInfo {
    single: bool,
    duplicated: bool,
}

pub struct FpuRegCache {
    regs: [Binding; 32],
    info: [ValueInfo; 32],
    clock: u64,
}

impl FpuRegCache {
    pub fn new() -> Self {
        Self {
            regs: [Binding::default(); 32],
            info: [ValueInfo::default(); 32],
            clock: 0,
        }
    }

    /// Forget bindings and value facts at the start of a block
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn host(&self, reg: u8) -> Option<Xmm> {
        self.regs[reg as usize].host
    }

    pub fn is_dirty(&self, reg: u8) -> bool {
        self.regs[reg as usize].dirty
    }

    fn in_use(&self, xmm: Xmm) -> bool {
        self.regs.iter().any(|b| b.host == Some(xmm))
    }

    /// Bind `reg` to a host register, loading its current value, and lock it
    /// until [`unlock_all`](Self::unlock_all). Fails when every host
    /// register is locked.
    pub fn bind(&mut self, emitter: &mut Emitter<PpcGuestOp>, reg: u8) -> Result<Xmm, Fallback> {
        self.clock += 1;
        let index = reg as usize;
        if let Some(host) = self.regs[index].host {
            self.regs[index].locked = true;
            self.regs[index].last_use = self.clock;
            return Ok(host);
        }

        let host = match ALLOCATION_ORDER.iter().copied().find(|x| !self.in_use(*x)) {
            Some(free) => free,
            None => self.evict(emitter)?,
        };
        emitter.guest(PpcGuestOp::LoadFpr { xmm: host, reg });
        self.regs[index] = Binding {
            host: Some(host),
            dirty: false,
            locked: true,
            last_use: self.clock,
        };
        Ok(host)
    }

    fn evict(&mut self, emitter: &mut Emitter<PpcGuestOp>) -> Result<Xmm, Fallback> {
        let (victim, host) = (0..32u8)
            .filter_map(|r| {
                let b = &self.regs[r as usize];
                b.host.filter(|_| !b.locked).map(|host| (r, host, b.last_use))
            })
            .min_by_key(|&(_, _, last_use)| last_use)
            .map(|(r, host, _)| (r, host))
            .ok_or(Fallback("no evictable register"))?;

        self.store(emitter, victim);
        self.regs[victim as usize] = Binding::default();
        Ok(host)
    }

    fn store(&mut self, emitter: &mut Emitter<PpcGuestOp>, reg: u8) {
        let binding = &mut self.regs[reg as usize];
        if let (Some(xmm), true) = (binding.host, binding.dirty) {
            emitter.guest(PpcGuestOp::StoreFpr { reg, xmm });
            binding.dirty = false;
        }
    }

    pub fn mark_dirty(&mut self, reg: u8) {
        self.regs[reg as usize].dirty = true;
    }

    pub fn unlock_all(&mut self) {
        for binding in &mut self.regs {
            binding.locked = false;
        }
    }

    /// Write every dirty register back and drop all bindings. Value facts
    /// survive: they describe guest state, not host state.
    pub fn flush(&mut self, emitter: &mut Emitter<PpcGuestOp>) {
        for reg in 0..32u8 {
            self.store(emitter, reg);
            self.regs[reg as usize] = Binding::default();
        }
    }

    pub fn is_single(&self, reg: u8) -> bool {
        self.info[reg as usize].single
    }

    pub fn is_duplicated(&self, reg: u8) -> bool {
        self.info[reg as usize].duplicated
    }

    pub fn set_info(&mut self, reg: u8, single: bool, duplicated: bool) {
        self.info[reg as usize] = ValueInfo { single, duplicated };
    }
}

impl Default for FpuRegCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use od_emitter::Op;

    fn loads(e: Emitter<PpcGuestOp>) -> (usize, usize) {
        let code = e.finish().unwrap();
        let count = |f: &dyn Fn(&PpcGuestOp) -> bool| {
            code.ops()
                .iter()
                .filter(|op| matches!(op, Op::Guest(g) if f(g)))
                .count()
        };
        (
            count(&|g| matches!(g, PpcGuestOp::LoadFpr { .. })),
            count(&|g| matches!(g, PpcGuestOp::StoreFpr { .. })),
        )
    }

    #[test]
    fn test_bind_reuses_host_register() {
        let mut cache = FpuRegCache::new();
        let mut e = Emitter::new();
        let a = cache.bind(&mut e, 1).unwrap();
        let b = cache.bind(&mut e, 1).unwrap();
        assert_eq!(a, b);
        assert_eq!(loads(e), (1, 0));
    }

    #[test]
    fn test_flush_stores_only_dirty() {
        let mut cache = FpuRegCache::new();
        let mut e = Emitter::new();
        cache.bind(&mut e, 1).unwrap();
        cache.bind(&mut e, 2).unwrap();
        cache.mark_dirty(2);
        cache.flush(&mut e);
        assert_eq!(cache.host(1), None);
        assert_eq!(loads(e), (2, 1));
    }

    #[test]
    fn test_eviction_writes_back_lru() {
        let mut cache = FpuRegCache::new();
        let mut e = Emitter::new();
        for reg in 0..14 {
            cache.bind(&mut e, reg).unwrap();
            cache.mark_dirty(reg);
            cache.unlock_all();
        }
        let host = cache.bind(&mut e, 20).unwrap();
        assert_eq!(cache.host(0), None);
        assert_eq!(host, ALLOCATION_ORDER[0]);
        assert_eq!(loads(e), (15, 1));
    }

    #[test]
    fn test_bind_fails_when_all_hosts_locked() {
        let mut cache = FpuRegCache::new();
        let mut e = Emitter::new();
        for reg in 0..14 {
            cache.bind(&mut e, reg).unwrap();
        }
        assert_eq!(cache.bind(&mut e, 20), Err(Fallback("no evictable register")));
        for reg in 0..14 {
            assert_eq!(cache.host(reg), Some(ALLOCATION_ORDER[reg as usize]));
        }

        cache.unlock_all();
        assert_eq!(cache.bind(&mut e, 20), Ok(ALLOCATION_ORDER[0]));
    }

    #[test]
    fn test_value_info_survives_flush() {
        let mut cache = FpuRegCache::new();
        let mut e = Emitter::new();
        cache.set_info(3, true, true);
        cache.bind(&mut e, 3).unwrap();
        cache.flush(&mut e);
        assert!(cache.is_single(3) && cache.is_duplicated(3));
        cache.reset();
        assert!(!cache.is_single(3));
    }
}
