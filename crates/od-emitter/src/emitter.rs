//! Code emitter with near/far regions and fixup branches

use od_core::error::JitError;

use crate::ops::{Cond, Op, Reg, Xmm};

/// Code region being written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    /// Hot path, laid out first
    Near,
    /// Cold path (NaN handling, slow exits), laid out after the near code
    Far,
}

/// Branch destination. Bound to a position once, used any number of times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(usize);

impl Label {
    pub fn id(self) -> usize {
        self.0
    }
}

/// A forward branch waiting for [`Emitter::set_jump_target`]
#[derive(Debug)]
#[must_use = "a fixup branch must be bound with set_jump_target"]
pub struct FixupBranch {
    label: Label,
}

/// Emitted code before layout
pub struct Emitter<G> {
    near: Vec<Op<G>>,
    far: Vec<Op<G>>,
    region: Region,
    labels: Vec<Option<(Region, usize)>>,
}

impl<G> Emitter<G> {
    pub fn new() -> Self {
        Self {
            near: Vec::new(),
            far: Vec::new(),
            region: Region::Near,
            labels: Vec::new(),
        }
    }

    pub fn region(&self) -> Region {
        self.region
    }

    pub fn switch_to_far_code(&mut self) {
        self.region = Region::Far;
    }

    pub fn switch_to_near_code(&mut self) {
        self.region = Region::Near;
    }

    fn current(&mut self) -> &mut Vec<Op<G>> {
        match self.region {
            Region::Near => &mut self.near,
            Region::Far => &mut self.far,
        }
    }

    /// Number of instructions emitted so far, both regions
    pub fn len(&self) -> usize {
        self.near.len() + self.far.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn emit(&mut self, op: Op<G>) {
        self.current().push(op);
    }

    pub fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Bind `label` to the next instruction of the current region
    pub fn bind(&mut self, label: Label) {
        let pos = self.current().len();
        self.labels[label.0] = Some((self.region, pos));
    }

    /// Label bound at the current position
    pub fn here(&mut self) -> Label {
        let label = self.new_label();
        self.bind(label);
        label
    }

    pub fn j_cc(&mut self, cond: Cond) -> FixupBranch {
        let label = self.new_label();
        self.emit(Op::Jcc { cond, target: label });
        FixupBranch { label }
    }

    pub fn j(&mut self) -> FixupBranch {
        let label = self.new_label();
        self.emit(Op::Jmp { target: label });
        FixupBranch { label }
    }

    pub fn jcc_to(&mut self, cond: Cond, target: Label) {
        self.emit(Op::Jcc { cond, target });
    }

    pub fn jmp_to(&mut self, target: Label) {
        self.emit(Op::Jmp { target });
    }

    /// Point a pending branch at the current position
    pub fn set_jump_target(&mut self, branch: FixupBranch) {
        self.bind(branch.label);
    }

    /// Lay out near code followed by far code and resolve every label
    pub fn finish(self) -> Result<Code<G>, JitError> {
        let near_len = self.near.len();
        let mut targets = Vec::with_capacity(self.labels.len());
        for (id, slot) in self.labels.iter().enumerate() {
            let pos = match slot {
                Some((Region::Near, pos)) => *pos,
                Some((Region::Far, pos)) => near_len + pos,
                None => {
                    let used = self
                        .near
                        .iter()
                        .chain(self.far.iter())
                        .any(|op| op.branch_target() == Some(Label(id)));
                    if used {
                        return Err(JitError::UnboundLabel { label: id });
                    }
                    usize::MAX
                }
            };
            targets.push(pos);
        }

        let mut ops = self.near;
        ops.extend(self.far);
        Ok(Code {
            ops,
            targets,
            near_len,
        })
    }

    // Integer helpers

    pub fn mov_imm(&mut self, dst: Reg, imm: u64) {
        self.emit(Op::MovImm { dst, imm });
    }

    pub fn mov(&mut self, dst: Reg, src: Reg) {
        self.emit(Op::Mov { dst, src });
    }

    pub fn add(&mut self, dst: Reg, src: Reg) {
        self.emit(Op::Add { dst, src });
    }

    pub fn add_imm(&mut self, dst: Reg, imm: i32) {
        self.emit(Op::AddImm { dst, imm });
    }

    pub fn sub(&mut self, dst: Reg, src: Reg) {
        self.emit(Op::Sub { dst, src });
    }

    pub fn and_imm(&mut self, dst: Reg, imm: i32) {
        self.emit(Op::AndImm { dst, imm });
    }

    pub fn or(&mut self, dst: Reg, src: Reg) {
        self.emit(Op::Or { dst, src });
    }

    pub fn xor(&mut self, dst: Reg, src: Reg) {
        self.emit(Op::Xor { dst, src });
    }

    pub fn not(&mut self, dst: Reg) {
        self.emit(Op::Not { dst });
    }

    pub fn shl(&mut self, dst: Reg, amount: u8) {
        self.emit(Op::Shl { dst, amount });
    }

    pub fn shr(&mut self, dst: Reg, amount: u8) {
        self.emit(Op::Shr { dst, amount });
    }

    pub fn cmp_imm(&mut self, a: Reg, imm: i32) {
        self.emit(Op::CmpImm { a, imm });
    }

    pub fn test_imm(&mut self, a: Reg, imm: i32) {
        self.emit(Op::TestImm { a, imm });
    }

    /// Load a 64-bit constant into the low lane of an SSE register
    pub fn load_const_sd(&mut self, dst: Xmm, bits: u64, scratch: Reg) {
        self.mov_imm(scratch, bits);
        self.emit(Op::MovqToXmm { dst, src: scratch });
    }

    /// Load a 64-bit constant into both lanes of an SSE register
    pub fn load_const_pd(&mut self, dst: Xmm, bits: u64, scratch: Reg) {
        self.load_const_sd(dst, bits, scratch);
        self.emit(Op::Movddup { dst, src: dst });
    }

    pub fn guest(&mut self, op: G) {
        self.emit(Op::Guest(op));
    }

    pub fn exit(&mut self, value: u64) {
        self.emit(Op::Exit { value });
    }
}

impl<G> Default for Emitter<G> {
    fn default() -> Self {
        Self::new()
    }
}

/// Laid-out code with resolved branch targets
#[derive(Debug, Clone)]
pub struct Code<G> {
    ops: Vec<Op<G>>,
    targets: Vec<usize>,
    near_len: usize,
}

impl<G> Code<G> {
    pub fn ops(&self) -> &[Op<G>] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Size of the near region; far code starts here
    pub fn near_len(&self) -> usize {
        self.near_len
    }

    /// Instruction index a label resolved to
    pub fn target(&self, label: Label) -> usize {
        self.targets.get(label.0).copied().unwrap_or(usize::MAX)
    }

    /// Mutable access to guest payloads, for patching link sites in place
    pub fn guest_ops_mut(&mut self) -> impl Iterator<Item = &mut G> {
        self.ops.iter_mut().filter_map(|op| match op {
            Op::Guest(g) => Some(g),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_far_code_is_laid_out_after_near() {
        let mut e: Emitter<()> = Emitter::new();
        e.mov_imm(Reg::RAX, 1);
        let to_far = e.j_cc(Cond::P);
        e.exit(0);

        e.switch_to_far_code();
        e.set_jump_target(to_far);
        e.exit(1);
        e.switch_to_near_code();

        let code = e.finish().unwrap();
        assert_eq!(code.len(), 4);
        assert_eq!(code.near_len(), 3);
        match code.ops()[1] {
            Op::Jcc { target, .. } => assert_eq!(code.target(target), 3),
            ref other => panic!("unexpected op {:?}", other),
        }
    }

    #[test]
    fn test_unbound_label_rejected() {
        let mut e: Emitter<()> = Emitter::new();
        let label = e.new_label();
        e.jmp_to(label);
        assert_eq!(e.finish().unwrap_err(), JitError::UnboundLabel { label: 0 });
    }

    #[test]
    fn test_unused_label_is_ignored() {
        let mut e: Emitter<()> = Emitter::new();
        let _ = e.new_label();
        e.exit(0);
        assert!(e.finish().is_ok());
    }
}
