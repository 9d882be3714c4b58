//! DSP block recompiler
//!
//! Control flow is compiled natively: condition codes become status
//! register tests, hardware loops push their stacks from compiled code and
//! block exits with a known destination can enter the destination block
//! directly while the cycle budget allows. Every other instruction is
//! embedded as an interpreter call, so a block makes the same architectural
//! changes as interpreting it.
//!
//! Blocks live in an arena indexed by [`BlockId`]. A link site compiled
//! before its destination is queued under the destination address and
//! patched in place once that block exists; invalidating a block turns the
//! sites entering it back into queued ones.

use std::collections::HashMap;

use od_core::config::DspConfig;
use od_core::error::JitError;
use od_core::{jit_debug, jit_trace};
use od_emitter::{Code, Cond, Emitter, FixupBranch, Machine, Op, Reg};
use od_memory::constants::DSP_IRAM_SIZE;

use crate::condition::Condition;
use crate::guest::{BlockId, DspGuestContext, DspGuestOp, LinkTarget, LINK_BIT};
use crate::interpreter::DspInterpreter;
use crate::registers::{SrFlags, StackReg};
use crate::tables::{instruction_size, DspOpcode};
use crate::thread::DspThread;

/// A compiled block
pub struct DspBlock {
    pub start: u16,
    /// Instructions covered
    pub size: u16,
    /// Address after the last word covered
    pub end: u32,
    code: Code<DspGuestOp>,
}

impl DspBlock {
    pub fn code(&self) -> &Code<DspGuestOp> {
        &self.code
    }

    pub fn overlaps(&self, addr: u16, len: u16) -> bool {
        let addr = addr as u32;
        addr < self.end && (self.start as u32) < addr + len as u32
    }

    /// Number of embedded interpreter calls
    pub fn interpreter_calls(&self) -> usize {
        self.code
            .ops()
            .iter()
            .filter(|op| matches!(op, Op::Guest(DspGuestOp::Interpret { .. })))
            .count()
    }

    /// Link sites, with the block each one enters once linked
    pub fn link_sites(&self) -> Vec<(u16, Option<BlockId>)> {
        self.code
            .ops()
            .iter()
            .filter_map(|op| match op {
                Op::Guest(DspGuestOp::BlockLink { dest, target, .. }) => Some((*dest, target.map(|t| t.id))),
                _ => None,
            })
            .collect()
    }
}

/// Recompiler statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DspJitStats {
    pub blocks_compiled: u64,
    /// Instructions embedded as interpreter calls
    pub fallbacks: u64,
    pub links_patched: u64,
    pub links_followed: u64,
}

/// Compiled blocks and the link sites waiting on them
#[derive(Default)]
pub struct BlockCache {
    blocks: Vec<Option<DspBlock>>,
    map: HashMap<u16, BlockId>,
    /// Blocks holding an unlinked site, keyed by the site's destination
    unresolved: HashMap<u16, Vec<BlockId>>,
}

impl BlockCache {
    pub fn get(&self, id: BlockId) -> Option<&DspBlock> {
        self.blocks.get(id).and_then(Option::as_ref)
    }

    pub fn lookup(&self, addr: u16) -> Option<BlockId> {
        self.map.get(&addr).copied()
    }

    /// Where a link site for `dest` can jump right now
    pub fn link_target(&self, dest: u16) -> Option<LinkTarget> {
        let id = self.lookup(dest)?;
        let block = self.get(id)?;
        Some(LinkTarget { id, size: block.size })
    }
}

/// Emit the `$sr` test for `cond` and a jump taken when the condition does
/// not hold. Returns `None` for [`Condition::Always`], which needs no test.
pub fn emit_condition_skip(e: &mut Emitter<DspGuestOp>, cond: Condition) -> Option<FixupBranch> {
    if cond == Condition::Always {
        return None;
    }
    let code = cond.code();
    e.guest(DspGuestOp::LoadSr { dst: Reg::RAX });

    match code {
        // OVERFLOW ^ SIGN
        0x0 | 0x1 => {
            e.mov(Reg::RDX, Reg::RAX);
            e.shr(Reg::RDX, 2);
            e.xor(Reg::RAX, Reg::RDX);
            e.test_imm(Reg::RAX, SrFlags::OVERFLOW.bits() as i32);
        }
        // (OVERFLOW ^ SIGN) | ARITH_ZERO
        0x2 | 0x3 => {
            e.mov(Reg::RDX, Reg::RAX);
            e.shr(Reg::RDX, 2);
            e.xor(Reg::RDX, Reg::RAX);
            e.shr(Reg::RAX, 1);
            e.or(Reg::RAX, Reg::RDX);
            e.test_imm(Reg::RAX, SrFlags::OVERFLOW.bits() as i32);
        }
        0x4 | 0x5 => e.test_imm(Reg::RAX, SrFlags::ARITH_ZERO.bits() as i32),
        0x6 | 0x7 => e.test_imm(Reg::RAX, SrFlags::CARRY.bits() as i32),
        0x8 | 0x9 => e.test_imm(Reg::RAX, SrFlags::OVER_S32.bits() as i32),
        // !(OVER_S32 | TOP2BITS) | ARITH_ZERO, lined up on the TOP2BITS bit
        0xa | 0xb => {
            e.mov(Reg::RDX, Reg::RAX);
            e.shl(Reg::RDX, 1);
            e.or(Reg::RAX, Reg::RDX);
            e.shl(Reg::RDX, 2);
            e.not(Reg::RAX);
            e.or(Reg::RAX, Reg::RDX);
            e.test_imm(Reg::RAX, SrFlags::TOP2BITS.bits() as i32);
        }
        0xc | 0xd => e.test_imm(Reg::RAX, SrFlags::LOGIC_ZERO.bits() as i32),
        _ => e.test_imm(Reg::RAX, SrFlags::OVERFLOW.bits() as i32),
    }

    // odd codes and `o` hold when the tested bit is set
    let skip_if = if code == 0xe || code & 1 == 1 { Cond::E } else { Cond::NE };
    Some(e.j_cc(skip_if))
}

enum LoopCount {
    Imm(u16),
    Reg(u8),
}

enum Compiled {
    Continue { next: u16 },
    End,
}

/// Code generation state for one block
pub struct BlockBuilder<'a> {
    pub(crate) emit: Emitter<DspGuestOp>,
    thread: &'a DspThread,
    cache: &'a BlockCache,
    /// Instructions compiled so far
    count: u16,
    end: u32,
    /// Destinations of link sites emitted without a target
    unlinked: Vec<u16>,
    interpreted: u64,
}

impl<'a> BlockBuilder<'a> {
    pub fn new(thread: &'a DspThread, cache: &'a BlockCache) -> Self {
        Self {
            emit: Emitter::new(),
            thread,
            cache,
            count: 0,
            end: 0,
            unlinked: Vec::new(),
            interpreted: 0,
        }
    }

    /// Emit `body` so that it only runs when `cond` holds
    pub fn rejit_conditional(&mut self, cond: Condition, body: impl FnOnce(&mut Self)) {
        let skip = emit_condition_skip(&mut self.emit, cond);
        body(self);
        if let Some(skip) = skip {
            self.emit.set_jump_target(skip);
        }
    }

    fn write_block_link(&mut self, dest: u16) {
        let target = self.cache.link_target(dest);
        if target.is_none() && !self.unlinked.contains(&dest) {
            self.unlinked.push(dest);
        }
        self.emit.guest(DspGuestOp::BlockLink {
            dest,
            cost: self.count,
            target,
        });
    }

    /// Leave the block for a known destination
    fn write_branch_exit(&mut self, dest: u16) {
        // arriving just after a loop end has to close the loop first
        let loop_end = self.thread.is_loop_end(dest.wrapping_sub(1));
        if !loop_end {
            self.write_block_link(dest);
        }
        self.emit.guest(DspGuestOp::SetPc { pc: dest });
        if loop_end {
            self.emit.guest(DspGuestOp::HandleLoop);
        }
        self.emit.exit(self.count as u64);
    }

    /// Leave the block after a guest op has set pc
    fn write_dynamic_exit(&mut self) {
        self.emit.guest(DspGuestOp::HandleLoop);
        self.emit.exit(self.count as u64);
    }

    fn interpret(&mut self, pc: u16) {
        self.emit.guest(DspGuestOp::Interpret { pc });
        self.interpreted += 1;
    }

    fn compile_loop(&mut self, count: LoopCount, body: u16, end: u16) {
        let skip = end.wrapping_add(instruction_size(self.thread.read_imem(end)));
        match count {
            LoopCount::Imm(0) => {
                self.write_branch_exit(skip);
                return;
            }
            LoopCount::Imm(n) => self.emit.mov_imm(Reg::RAX, n as u64),
            LoopCount::Reg(reg) => {
                self.emit.guest(DspGuestOp::ReadReg { dst: Reg::RAX, reg });
                self.emit.test_imm(Reg::RAX, 0xffff);
                let zero = self.emit.j_cc(Cond::E);
                self.emit.switch_to_far_code();
                self.emit.set_jump_target(zero);
                self.write_branch_exit(skip);
                self.emit.switch_to_near_code();
            }
        }
        self.emit.guest(DspGuestOp::PushLoop {
            body,
            end,
            count: Reg::RAX,
        });
        self.write_branch_exit(body);
    }

    fn compile_instruction(&mut self, addr: u16) -> Compiled {
        let opc = self.thread.read_imem(addr);
        let size = instruction_size(opc);
        let next = addr.wrapping_add(size);
        let imm = self.thread.read_imem(addr.wrapping_add(1));
        self.count += 1;
        self.end = addr as u32 + size as u32;

        let ends_block = |cond: Condition| cond == Condition::Always;
        let op = DspOpcode::decode(opc);
        match op {
            Some(DspOpcode::Jcc { cond }) => {
                self.rejit_conditional(cond, |b| b.write_branch_exit(imm));
                if ends_block(cond) {
                    return Compiled::End;
                }
            }
            Some(DspOpcode::Call { cond }) => {
                self.rejit_conditional(cond, |b| {
                    b.emit.guest(DspGuestOp::PushStack {
                        stack: StackReg::Call,
                        value: next,
                    });
                    b.write_branch_exit(imm);
                });
                if ends_block(cond) {
                    return Compiled::End;
                }
            }
            Some(DspOpcode::Ret { cond }) | Some(DspOpcode::Rti { cond }) => {
                let interrupt = matches!(op, Some(DspOpcode::Rti { .. }));
                self.rejit_conditional(cond, |b| {
                    b.emit.guest(DspGuestOp::Return { interrupt });
                    b.write_dynamic_exit();
                });
                if ends_block(cond) {
                    return Compiled::End;
                }
            }
            Some(DspOpcode::Jmpr { cond, reg }) => {
                self.rejit_conditional(cond, |b| {
                    b.emit.guest(DspGuestOp::JumpReg { reg, link: None });
                    b.write_dynamic_exit();
                });
                if ends_block(cond) {
                    return Compiled::End;
                }
            }
            Some(DspOpcode::Callr { cond, reg }) => {
                self.rejit_conditional(cond, |b| {
                    b.emit.guest(DspGuestOp::JumpReg { reg, link: Some(next) });
                    b.write_dynamic_exit();
                });
                if ends_block(cond) {
                    return Compiled::End;
                }
            }
            Some(DspOpcode::If { cond }) => {
                if ends_block(cond) {
                    self.write_branch_exit(next);
                } else {
                    let skip = next.wrapping_add(instruction_size(self.thread.read_imem(next)));
                    self.rejit_conditional(cond, |b| b.write_branch_exit(next));
                    self.write_branch_exit(skip);
                }
                return Compiled::End;
            }
            Some(DspOpcode::Loop { reg }) => {
                self.compile_loop(LoopCount::Reg(reg), next, next);
                return Compiled::End;
            }
            Some(DspOpcode::Loopi { count }) => {
                self.compile_loop(LoopCount::Imm(count), next, next);
                return Compiled::End;
            }
            Some(DspOpcode::Bloop { reg }) => {
                self.compile_loop(LoopCount::Reg(reg), next, imm);
                return Compiled::End;
            }
            Some(DspOpcode::Bloopi { count }) => {
                self.compile_loop(LoopCount::Imm(count), next, imm);
                return Compiled::End;
            }
            Some(DspOpcode::Halt) => {
                self.interpret(addr);
                self.write_dynamic_exit();
                return Compiled::End;
            }
            Some(_) => self.interpret(addr),
            None => {
                jit_debug!("unknown opcode 0x{:04x} at 0x{:04x} left to the interpreter", opc, addr);
                self.interpret(addr);
            }
        }
        Compiled::Continue { next }
    }

    pub fn finish(self) -> Result<Code<DspGuestOp>, JitError> {
        self.emit.finish()
    }
}

/// DSP recompiler with its block cache
pub struct DspJit {
    config: DspConfig,
    interpreter: DspInterpreter,
    cache: BlockCache,
    machine: Machine,
    cycles_left: u64,
    stats: DspJitStats,
}

impl DspJit {
    pub fn new(config: DspConfig) -> Self {
        Self {
            config,
            interpreter: DspInterpreter::new(),
            cache: BlockCache::default(),
            machine: Machine::new(),
            cycles_left: 0,
            stats: DspJitStats::default(),
        }
    }

    pub fn config(&self) -> &DspConfig {
        &self.config
    }

    pub fn stats(&self) -> DspJitStats {
        self.stats
    }

    pub fn block(&self, addr: u16) -> Option<&DspBlock> {
        self.cache.lookup(addr).and_then(|id| self.cache.get(id))
    }

    pub fn block_id(&self, addr: u16) -> Option<BlockId> {
        self.cache.lookup(addr)
    }

    pub fn block_count(&self) -> usize {
        self.cache.map.len()
    }

    /// Link sites still waiting for their destination block
    pub fn pending_links(&self) -> usize {
        self.cache.unresolved.values().map(Vec::len).sum()
    }

    /// Compile the block starting at `start`, replacing any cached one
    pub fn compile(&mut self, start: u16, thread: &DspThread) -> Result<BlockId, JitError> {
        if let Some(old) = self.cache.lookup(start) {
            self.remove_block(old);
        }

        let max = self.config.max_block_size.max(1);
        let mut builder = BlockBuilder::new(thread, &self.cache);
        let mut addr = start;
        loop {
            match builder.compile_instruction(addr) {
                Compiled::End => break,
                Compiled::Continue { next } => {
                    if thread.is_loop_end(next.wrapping_sub(1)) {
                        builder.emit.guest(DspGuestOp::SetPc { pc: next });
                        builder.write_dynamic_exit();
                        break;
                    }
                    if builder.count >= max {
                        builder.write_branch_exit(next);
                        break;
                    }
                    addr = next;
                }
            }
        }

        let size = builder.count;
        let end = builder.end;
        let unlinked = std::mem::take(&mut builder.unlinked);
        self.stats.fallbacks += builder.interpreted;
        let code = builder.finish()?;

        let id = self.cache.blocks.len();
        for dest in unlinked {
            self.cache.unresolved.entry(dest).or_default().push(id);
        }
        jit_debug!("compiled DSP block 0x{:04x}: {} instructions, {} host ops", start, size, code.len());
        self.cache.blocks.push(Some(DspBlock { start, size, end, code }));
        self.cache.map.insert(start, id);
        self.stats.blocks_compiled += 1;

        self.resolve_links(start, id);
        Ok(id)
    }

    /// Patch every queued site waiting on the block just compiled at `start`
    fn resolve_links(&mut self, start: u16, id: BlockId) {
        let Some(waiting) = self.cache.unresolved.remove(&start) else {
            return;
        };
        let Some(size) = self.cache.get(id).map(|block| block.size) else {
            return;
        };
        let target = LinkTarget { id, size };

        for site in waiting {
            let Some(Some(block)) = self.cache.blocks.get_mut(site) else {
                continue;
            };
            for op in block.code.guest_ops_mut() {
                if let DspGuestOp::BlockLink { dest, target: slot, .. } = op {
                    if *dest == start && slot.is_none() {
                        *slot = Some(target);
                        self.stats.links_patched += 1;
                        jit_trace!("linked block 0x{:04x} -> 0x{:04x}", block.start, start);
                    }
                }
            }
        }
    }

    /// Drop a block, turning the sites that enter it back into queued ones
    fn remove_block(&mut self, id: BlockId) {
        let Some(removed) = self.cache.blocks.get_mut(id).and_then(Option::take) else {
            return;
        };
        if self.cache.map.get(&removed.start) == Some(&id) {
            self.cache.map.remove(&removed.start);
        }
        for sites in self.cache.unresolved.values_mut() {
            sites.retain(|&site| site != id);
        }
        self.cache.unresolved.retain(|_, sites| !sites.is_empty());

        for (site, slot) in self.cache.blocks.iter_mut().enumerate() {
            let Some(block) = slot else {
                continue;
            };
            let mut unlinked = false;
            for op in block.code.guest_ops_mut() {
                if let DspGuestOp::BlockLink { target, .. } = op {
                    if target.is_some_and(|t| t.id == id) {
                        *target = None;
                        unlinked = true;
                    }
                }
            }
            if unlinked {
                self.cache.unresolved.entry(removed.start).or_default().push(site);
            }
        }
    }

    /// Drop every block overlapping `[addr, addr + len)`
    pub fn invalidate(&mut self, addr: u16, len: u16) {
        let doomed: Vec<BlockId> = self
            .cache
            .blocks
            .iter()
            .enumerate()
            .filter_map(|(id, slot)| slot.as_ref().filter(|b| b.overlaps(addr, len)).map(|_| id))
            .collect();
        for &id in &doomed {
            self.remove_block(id);
        }
        if !doomed.is_empty() {
            jit_debug!("invalidated {} DSP blocks at 0x{:04x}+{}", doomed.len(), addr, len);
        }
    }

    pub fn clear_cache(&mut self) {
        self.cache = BlockCache::default();
    }

    /// Write one IMEM word, dropping the code compiled from it. A write
    /// that can move a loop end (a loop instruction, a block loop's end
    /// operand or a change of instruction size) rescans IMEM and drops
    /// everything.
    pub fn write_imem(&mut self, thread: &mut DspThread, addr: u16, value: u16) {
        let is_loop = |opc: u16| {
            matches!(
                DspOpcode::decode(opc),
                Some(DspOpcode::Loop { .. } | DspOpcode::Loopi { .. } | DspOpcode::Bloop { .. } | DspOpcode::Bloopi { .. })
            )
        };
        let old = thread.read_imem(addr);
        let loop_operand = is_loop(thread.read_imem(addr.wrapping_sub(1)));
        thread.write_imem(addr, value);
        if is_loop(old) || is_loop(value) || loop_operand || instruction_size(old) != instruction_size(value) {
            thread.analyze();
            self.clear_cache();
        } else {
            self.invalidate(addr, 1);
        }
    }

    /// Zero IRAM and drop every block compiled from it
    pub fn clear_iram(&mut self, thread: &mut DspThread) {
        let memory = thread.memory_mut();
        for addr in 0..DSP_IRAM_SIZE as u16 {
            memory.write_imem(addr, 0);
        }
        thread.analyze();
        self.invalidate(0, DSP_IRAM_SIZE as u16);
    }

    fn lookup_or_compile(&mut self, thread: &DspThread) -> Result<BlockId, JitError> {
        match self.cache.lookup(thread.pc()) {
            Some(id) => Ok(id),
            None => self.compile(thread.pc(), thread),
        }
    }

    /// Run blocks until `cycles` are used up or the core halts. Returns
    /// the cycles consumed, which can exceed the budget by the last block.
    pub fn run(&mut self, thread: &mut DspThread, cycles: u64) -> Result<u64, JitError> {
        thread.start();
        self.cycles_left = cycles;
        let mut linked: Option<BlockId> = None;
        let mut overrun = 0;

        while thread.is_running() && self.cycles_left > 0 {
            let id = match linked.take() {
                Some(id) => id,
                None => self.lookup_or_compile(thread)?,
            };
            let block = self
                .cache
                .blocks
                .get(id)
                .and_then(Option::as_ref)
                .ok_or_else(|| JitError::MissingBlock { addr: thread.pc() as u32 })?;

            let mut ctx = DspGuestContext {
                thread: &mut *thread,
                interpreter: &self.interpreter,
                cycles_left: &mut self.cycles_left,
            };
            let exit = self.machine.run(&block.code, &mut ctx)?;

            if exit & LINK_BIT != 0 {
                self.stats.links_followed += 1;
                linked = Some((exit & !LINK_BIT) as BlockId);
            } else if exit > self.cycles_left {
                overrun = exit - self.cycles_left;
                self.cycles_left = 0;
            } else {
                self.cycles_left -= exit;
            }
        }
        Ok(cycles - self.cycles_left + overrun)
    }
}
