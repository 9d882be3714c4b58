//! DSP opcode decoding
//!
//! Main opcodes decode to [`DspOpcode`]. Opcodes from 0x3000 up carry an
//! extended opcode in their low byte (low seven bits for the 0x3xxx group)
//! that decodes to [`ExtOpcode`].

use crate::condition::Condition;

/// Post-modification of an addressing register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostModify {
    None,
    Decrement,
    Increment,
    /// Add the matching `$ix`
    AddIndex,
}

impl PostModify {
    fn from_bits(bits: u16) -> PostModify {
        match bits & 3 {
            0 => PostModify::None,
            1 => PostModify::Decrement,
            2 => PostModify::Increment,
            _ => PostModify::AddIndex,
        }
    }
}

/// Second operand of `add`/`sub` and their variants, positioned for the
/// 40-bit accumulator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccOperand {
    /// `$(0x18+S)` sign-extended into the middle word
    Reg(u8),
    /// `$axS` as a 32-bit value
    Ax(u8),
    /// `$axS.l` unsigned
    AxLow(u8),
    /// `$ac(1-D)`
    OtherAcc,
    Prod,
    /// Signed byte in the middle word
    Short(i8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicOp {
    And,
    Or,
    Xor,
}

impl LogicOp {
    pub fn apply(self, a: u16, b: u16) -> u16 {
        match self {
            LogicOp::And => a & b,
            LogicOp::Or => a | b,
            LogicOp::Xor => a ^ b,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftKind {
    /// Shifts in zeros over the 40-bit value
    Logical,
    Arithmetic,
}

/// Multiplier inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MulSource {
    /// `$axS.l * $axS.h`
    Ax { ax: u8 },
    /// `$ax0.S * $ax1.T`, where 0 picks `.l` and 1 picks `.h`
    Cross { s: u8, t: u8 },
    /// `$acS.m * $axT.h`
    AccAx { acc: u8, ax: u8 },
    /// `$ax0.h * $ax0.h`
    Axh0,
}

/// What happens to the old product when a multiply replaces it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductMove {
    Discard,
    /// `$acR += prod`
    Add { acc: u8 },
    /// `$acR = prod`
    Move { acc: u8 },
    /// `$acR = prod`, rounded to the middle word
    MoveRounded { acc: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DspOpcode {
    Nop,
    /// `$arD--`
    Dar { ar: u8 },
    /// `$arD++`
    Iar { ar: u8 },
    /// `$arD -= $ixD`
    Subarn { ar: u8 },
    /// `$arD += $ixS`
    Addarn { ar: u8, ix: u8 },
    Halt,
    Ret { cond: Condition },
    Rti { cond: Condition },
    Call { cond: Condition },
    If { cond: Condition },
    Jcc { cond: Condition },
    Jmpr { cond: Condition, reg: u8 },
    Callr { cond: Condition, reg: u8 },
    /// Clear SR bit `bit + 6`
    Sbclr { bit: u8 },
    /// Set SR bit `bit + 6`
    Sbset { bit: u8 },
    Lri { reg: u8 },
    Lr { reg: u8 },
    Sr { reg: u8 },
    /// Store the next word at `addr`, which is 0xff00-0xffff
    Si { addr: u16 },
    Lris { reg: u8, imm: u16 },
    /// Load from the data page in `$cr`
    Lrs { reg: u8, addr: u8 },
    /// Store to the data page in `$cr`
    Srs { reg: u8, addr: u8 },
    Mrr { dst: u8, src: u8 },
    Lrr { dst: u8, ar: u8, post: PostModify },
    Srr { ar: u8, src: u8, post: PostModify },
    /// `$acD.m = IMEM[$arS]`
    Ilrr { acc: u8, ar: u8, post: PostModify },
    Loop { reg: u8 },
    Bloop { reg: u8 },
    Loopi { count: u16 },
    Bloopi { count: u16 },

    // Immediate forms, the long ones take the next word
    Addi { acc: u8 },
    Cmpi { acc: u8 },
    Cmpis { acc: u8, imm: i8 },
    LogicImm { op: LogicOp, acc: u8 },
    /// Set LZ when `$acD.m & imm` is zero
    Andf { acc: u8 },
    /// Set LZ when `$acD.m & imm` is `imm`
    Andcf { acc: u8 },
    /// Positive `amount` shifts left
    Shift { acc: u8, kind: ShiftKind, amount: i8 },
    /// Shift `$ac0` right by the signed count in `$ac1.m`
    ShiftN { kind: ShiftKind },

    // Extendable
    Nx,
    Clr { acc: u8 },
    /// Round `$acR` to its middle word
    Clrl { acc: u8 },
    Clrp,
    Cmp,
    /// `$acS - $axR.h`
    Cmpar { acc: u8, ax: u8 },
    /// Products are doubled
    M2,
    M0,
    Clr15,
    Set15,
    Set16,
    Set40,
    Tst { acc: u8 },
    Tstaxh { ax: u8 },
    Tstprod,
    Inc { acc: u8 },
    Dec { acc: u8 },
    Incm { acc: u8 },
    Decm { acc: u8 },
    Add { acc: u8, src: AccOperand },
    Sub { acc: u8, src: AccOperand },
    Neg { acc: u8 },
    Abs { acc: u8 },
    /// `$acD.m op $axS.h`
    LogicAx { op: LogicOp, acc: u8, ax: u8 },
    /// `$acD.m op $ac(1-D).m`
    LogicAcc { op: LogicOp, acc: u8 },
    Not { acc: u8 },
    /// Shift `$acD` left by the signed count in `$axS.h`
    ShiftByAx { acc: u8, ax: u8, kind: ShiftKind },
    /// Shift `$acD` left by the signed count in `$ac(1-D).m`
    ShiftByAcc { acc: u8, kind: ShiftKind },
    /// `$acD = $(0x18+S)` in the middle word
    Movr { acc: u8, src: u8 },
    Movax { acc: u8, ax: u8 },
    /// `$acD = $ac(1-D)`
    Mov { acc: u8 },
    Movp { acc: u8 },
    Movnp { acc: u8 },
    /// `$acD = prod`, rounded to the middle word
    Movpz { acc: u8 },
    /// `$acD = rounded prod + $axS` with `$axS.l` dropped
    Addpaxz { acc: u8, ax: u8 },
    Mul { src: MulSource, prev: ProductMove },
    /// `prod += a * b`
    Madd { src: MulSource },
    /// `prod -= a * b`
    Msub { src: MulSource },
}

fn bit(opc: u16, n: u16) -> u8 {
    ((opc >> n) & 1) as u8
}

/// Right shift counts are stored as `0x40 - count`
fn right_shift_count(opc: u16) -> i8 {
    match (opc & 0x3f) as i8 {
        0 => 0,
        imm => imm - 0x40,
    }
}

fn product_move(opc: u16) -> ProductMove {
    let acc = bit(opc, 8);
    match opc & 0x0600 {
        0x0200 => ProductMove::MoveRounded { acc },
        0x0400 => ProductMove::Add { acc },
        0x0600 => ProductMove::Move { acc },
        _ => ProductMove::Discard,
    }
}

impl DspOpcode {
    pub fn decode(opc: u16) -> Option<DspOpcode> {
        let low5 = (opc & 0x1f) as u8;
        let cond = Condition::from_opcode(opc);
        // Accumulator in bit 8, the common destination
        let d = bit(opc, 8);

        let op = match opc >> 12 {
            0x0 => match opc {
                0x0000..=0x0003 => DspOpcode::Nop,
                0x0004..=0x0007 => DspOpcode::Dar { ar: (opc & 3) as u8 },
                0x0008..=0x000b => DspOpcode::Iar { ar: (opc & 3) as u8 },
                0x000c..=0x000f => DspOpcode::Subarn { ar: (opc & 3) as u8 },
                0x0010..=0x001f => DspOpcode::Addarn {
                    ar: (opc & 3) as u8,
                    ix: ((opc >> 2) & 3) as u8,
                },
                0x0021 => DspOpcode::Halt,
                0x0040..=0x005f => DspOpcode::Loop { reg: low5 },
                0x0060..=0x007f => DspOpcode::Bloop { reg: low5 },
                0x0080..=0x009f => DspOpcode::Lri { reg: low5 },
                0x00c0..=0x00df => DspOpcode::Lr { reg: low5 },
                0x00e0..=0x00ff => DspOpcode::Sr { reg: low5 },
                0x0270..=0x027f => DspOpcode::If { cond },
                0x0290..=0x029f => DspOpcode::Jcc { cond },
                0x02b0..=0x02bf => DspOpcode::Call { cond },
                0x02ca => DspOpcode::ShiftN { kind: ShiftKind::Logical },
                0x02cb => DspOpcode::ShiftN { kind: ShiftKind::Arithmetic },
                0x02d0..=0x02df => DspOpcode::Ret { cond },
                0x02f0..=0x02ff => DspOpcode::Rti { cond },
                0x0400..=0x05ff => DspOpcode::Add {
                    acc: d,
                    src: AccOperand::Short(opc as u8 as i8),
                },
                0x0600..=0x07ff => DspOpcode::Cmpis { acc: d, imm: opc as u8 as i8 },
                0x0800..=0x0fff => DspOpcode::Lris {
                    reg: 0x18 + ((opc >> 8) & 7) as u8,
                    imm: opc as u8 as i8 as i16 as u16,
                },
                _ if opc & 0xfefc == 0x0210 => DspOpcode::Ilrr {
                    acc: d,
                    ar: (opc & 3) as u8,
                    post: PostModify::from_bits(opc >> 2),
                },
                _ => match opc & 0xfeff {
                    0x0200 => DspOpcode::Addi { acc: d },
                    0x0220 => DspOpcode::LogicImm { op: LogicOp::Xor, acc: d },
                    0x0240 => DspOpcode::LogicImm { op: LogicOp::And, acc: d },
                    0x0260 => DspOpcode::LogicImm { op: LogicOp::Or, acc: d },
                    0x0280 => DspOpcode::Cmpi { acc: d },
                    0x02a0 => DspOpcode::Andf { acc: d },
                    0x02c0 => DspOpcode::Andcf { acc: d },
                    _ => return None,
                },
            },
            0x1 => match opc & 0xff00 {
                0x1000 => DspOpcode::Loopi { count: opc & 0xff },
                0x1100 => DspOpcode::Bloopi { count: opc & 0xff },
                0x1200 => DspOpcode::Sbclr { bit: (opc & 7) as u8 },
                0x1300 => DspOpcode::Sbset { bit: (opc & 7) as u8 },
                0x1400 | 0x1500 => {
                    let imm = (opc & 0x3f) as i8;
                    let (kind, amount) = match opc & 0xc0 {
                        0x00 => (ShiftKind::Logical, imm),
                        0x40 => (ShiftKind::Logical, right_shift_count(opc)),
                        0x80 => (ShiftKind::Arithmetic, imm),
                        _ => (ShiftKind::Arithmetic, right_shift_count(opc)),
                    };
                    DspOpcode::Shift { acc: d, kind, amount }
                }
                0x1600 => DspOpcode::Si {
                    addr: opc as u8 as i8 as i16 as u16,
                },
                0x1700 => {
                    let reg = ((opc >> 5) & 7) as u8;
                    if opc & 0x0010 == 0 {
                        DspOpcode::Jmpr { cond, reg }
                    } else {
                        DspOpcode::Callr { cond, reg }
                    }
                }
                0x1800 | 0x1900 => DspOpcode::Lrr {
                    dst: low5,
                    ar: ((opc >> 5) & 3) as u8,
                    post: PostModify::from_bits(opc >> 7),
                },
                0x1a00 | 0x1b00 => DspOpcode::Srr {
                    ar: ((opc >> 5) & 3) as u8,
                    src: low5,
                    post: PostModify::from_bits(opc >> 7),
                },
                0x1c00..=0x1f00 => DspOpcode::Mrr {
                    dst: ((opc >> 5) & 0x1f) as u8,
                    src: low5,
                },
                _ => return None,
            },
            0x2 => {
                let addr = opc as u8;
                match opc & 0x0c00 {
                    0x0000 | 0x0400 => DspOpcode::Lrs {
                        reg: 0x18 + ((opc >> 8) & 7) as u8,
                        addr,
                    },
                    0x0c00 => DspOpcode::Srs {
                        reg: 0x1c + ((opc >> 8) & 3) as u8,
                        addr,
                    },
                    _ if opc & 0xfe00 == 0x2800 => DspOpcode::Srs { reg: 0x10 + d, addr },
                    _ => return None,
                }
            }
            0x3 => {
                let s = bit(opc, 9);
                match opc & 0xfc80 {
                    0x3000 => DspOpcode::LogicAx { op: LogicOp::Xor, acc: d, ax: s },
                    0x3400 => DspOpcode::LogicAx { op: LogicOp::And, acc: d, ax: s },
                    0x3800 => DspOpcode::LogicAx { op: LogicOp::Or, acc: d, ax: s },
                    0x3480 => DspOpcode::ShiftByAx { acc: d, ax: s, kind: ShiftKind::Logical },
                    0x3880 => DspOpcode::ShiftByAx { acc: d, ax: s, kind: ShiftKind::Arithmetic },
                    0x3080 if s == 0 => DspOpcode::LogicAcc { op: LogicOp::Xor, acc: d },
                    0x3080 => DspOpcode::Not { acc: d },
                    0x3c00 if s == 0 => DspOpcode::LogicAcc { op: LogicOp::And, acc: d },
                    0x3c00 => DspOpcode::LogicAcc { op: LogicOp::Or, acc: d },
                    0x3c80 if s == 0 => DspOpcode::ShiftByAcc { acc: d, kind: ShiftKind::Logical },
                    0x3c80 => DspOpcode::ShiftByAcc { acc: d, kind: ShiftKind::Arithmetic },
                    _ => return None,
                }
            }
            0x4 | 0x5 => {
                let src = match opc & 0x0e00 {
                    0x0000..=0x0600 => AccOperand::Reg(0x18 + ((opc >> 9) & 3) as u8),
                    0x0800 | 0x0a00 => AccOperand::Ax(bit(opc, 9)),
                    0x0c00 => AccOperand::OtherAcc,
                    _ => AccOperand::Prod,
                };
                if opc >> 12 == 0x4 {
                    DspOpcode::Add { acc: d, src }
                } else {
                    DspOpcode::Sub { acc: d, src }
                }
            }
            0x6 => match opc & 0x0e00 {
                0x0000..=0x0600 => DspOpcode::Movr {
                    acc: d,
                    src: 0x18 + ((opc >> 9) & 3) as u8,
                },
                0x0800 | 0x0a00 => DspOpcode::Movax { acc: d, ax: bit(opc, 9) },
                0x0c00 => DspOpcode::Mov { acc: d },
                _ => DspOpcode::Movp { acc: d },
            },
            0x7 => match opc & 0xfe00 {
                0x7000 | 0x7200 => DspOpcode::Add {
                    acc: d,
                    src: AccOperand::AxLow(bit(opc, 9)),
                },
                0x7400 => DspOpcode::Incm { acc: d },
                0x7600 => DspOpcode::Inc { acc: d },
                0x7800 => DspOpcode::Decm { acc: d },
                0x7a00 => DspOpcode::Dec { acc: d },
                0x7c00 => DspOpcode::Neg { acc: d },
                _ => DspOpcode::Movnp { acc: d },
            },
            0x8 => match opc & 0xff00 {
                0x8000 | 0x8800 => DspOpcode::Nx,
                0x8100 | 0x8900 => DspOpcode::Clr { acc: bit(opc, 11) },
                0x8200 => DspOpcode::Cmp,
                0x8300 => DspOpcode::Mul {
                    src: MulSource::Axh0,
                    prev: ProductMove::Discard,
                },
                0x8400 => DspOpcode::Clrp,
                0x8500 => DspOpcode::Tstprod,
                0x8600 | 0x8700 => DspOpcode::Tstaxh { ax: d },
                0x8a00 => DspOpcode::M2,
                0x8b00 => DspOpcode::M0,
                0x8c00 => DspOpcode::Clr15,
                0x8d00 => DspOpcode::Set15,
                0x8e00 => DspOpcode::Set16,
                0x8f00 => DspOpcode::Set40,
                _ => return None,
            },
            0x9 => match opc & 0xf700 {
                0x9100 => DspOpcode::Shift {
                    acc: bit(opc, 11),
                    kind: ShiftKind::Arithmetic,
                    amount: -16,
                },
                _ => DspOpcode::Mul {
                    src: MulSource::Ax { ax: bit(opc, 11) },
                    prev: product_move(opc),
                },
            },
            0xa | 0xb => match opc & 0xe700 {
                0xa100 if opc >> 12 == 0xa => DspOpcode::Abs { acc: bit(opc, 11) },
                0xa100 => DspOpcode::Tst { acc: bit(opc, 11) },
                _ => DspOpcode::Mul {
                    src: MulSource::Cross {
                        s: bit(opc, 12),
                        t: bit(opc, 11),
                    },
                    prev: product_move(opc),
                },
            },
            0xc | 0xd => match opc & 0xe700 {
                0xc100 => DspOpcode::Cmpar {
                    acc: bit(opc, 11),
                    ax: bit(opc, 12),
                },
                _ => DspOpcode::Mul {
                    src: MulSource::AccAx {
                        acc: bit(opc, 12),
                        ax: bit(opc, 11),
                    },
                    prev: product_move(opc),
                },
            },
            0xe => {
                let (s, t) = (bit(opc, 9), bit(opc, 8));
                match opc & 0xfc00 {
                    0xe000 => DspOpcode::Madd { src: MulSource::Cross { s, t } },
                    0xe400 => DspOpcode::Msub { src: MulSource::Cross { s, t } },
                    0xe800 => DspOpcode::Madd { src: MulSource::AccAx { acc: s, ax: t } },
                    _ => DspOpcode::Msub { src: MulSource::AccAx { acc: s, ax: t } },
                }
            }
            _ => match opc & 0xfe00 {
                0xf000 => DspOpcode::Shift { acc: d, kind: ShiftKind::Logical, amount: 16 },
                0xf200 => DspOpcode::Madd { src: MulSource::Ax { ax: d } },
                0xf400 => DspOpcode::Shift { acc: d, kind: ShiftKind::Logical, amount: -16 },
                0xf600 => DspOpcode::Msub { src: MulSource::Ax { ax: d } },
                0xf800 | 0xfa00 => DspOpcode::Addpaxz { acc: d, ax: bit(opc, 9) },
                0xfc00 => DspOpcode::Clrl { acc: d },
                _ => DspOpcode::Movpz { acc: d },
            },
        };
        Some(op)
    }

    /// Changes the pc other than by falling through
    pub fn is_branch(self) -> bool {
        matches!(
            self,
            DspOpcode::Halt
                | DspOpcode::Ret { .. }
                | DspOpcode::Rti { .. }
                | DspOpcode::Call { .. }
                | DspOpcode::If { .. }
                | DspOpcode::Jcc { .. }
                | DspOpcode::Jmpr { .. }
                | DspOpcode::Callr { .. }
                | DspOpcode::Loop { .. }
                | DspOpcode::Bloop { .. }
                | DspOpcode::Loopi { .. }
                | DspOpcode::Bloopi { .. }
        )
    }
}

/// Every main opcode from 0x3000 up carries an extended opcode
pub fn has_ext_opcode(opc: u16) -> bool {
    opc >= 0x3000
}

/// Size in words of the instruction starting with `opc`, for every opcode
/// the DSP knows, not only the ones decoded here
pub fn instruction_size(opc: u16) -> u16 {
    match opc >> 12 {
        0x0 => {
            if matches!(opc & 0xffe0, 0x0060 | 0x0080 | 0x00c0 | 0x00e0) {
                return 2;
            }
            // addi/xori/andi/ori/cmpi/andf/andcf take an immediate
            if matches!(opc & 0xfeff, 0x0200 | 0x0220 | 0x0240 | 0x0260 | 0x0280 | 0x02a0 | 0x02c0) {
                return 2;
            }
            if matches!(opc & 0xfff0, 0x0290 | 0x02b0) {
                return 2;
            }
            1
        }
        0x1 if matches!(opc & 0xff00, 0x1100 | 0x1600) => 2,
        _ => 1,
    }
}

/// Extended opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtOpcode {
    Nop,
    /// `$arR--`
    Dr { ar: u8 },
    /// `$arR++`
    Ir { ar: u8 },
    /// `$arR += $ixR`
    Nr { ar: u8 },
    /// `$(0x18+D) = $(0x1c+S)`
    Mv { dst: u8, src: u8 },
    /// `MEM[$arD++] = $(0x1c+S)`
    S { ar: u8, src: u8, index: bool },
    /// `$(0x18+D) = MEM[$arS++]`
    L { dst: u8, ar: u8, index: bool },
    /// Store `$acS.m` at one of ar0/ar3 and load `$(0x18+D)` from the other.
    /// `store_ar0` selects the `sl` forms. `n` steps ar0 by ix0, `m` steps
    /// ar3 by ix3.
    Ls { dst: u8, acc: u8, store_ar0: bool, n: bool, m: bool },
    /// `$ax0.D = MEM[$arS]`, `$ax1.R = MEM[$ar3]`
    Ld { dst: u8, rreg: u8, ar: u8, n: bool, m: bool },
    /// `$axR.h = MEM[$arS]`, `$axR.l = MEM[$ar3]`
    Ldax { sreg: u8, rreg: u8, n: bool, m: bool },
}

impl ExtOpcode {
    /// Extended opcode of an extendable main opcode
    pub fn from_instruction(opc: u16) -> ExtOpcode {
        let ext = if opc >> 12 == 3 { opc & 0x7f } else { opc & 0xff };
        Self::decode(ext as u8)
    }

    pub fn decode(ext: u8) -> ExtOpcode {
        let n = ext & 0x04 != 0;
        let m = ext & 0x08 != 0;

        if ext & 0xc0 == 0xc0 {
            return if ext & 3 == 3 {
                ExtOpcode::Ldax {
                    sreg: (ext >> 5) & 1,
                    rreg: (ext >> 4) & 1,
                    n,
                    m,
                }
            } else {
                ExtOpcode::Ld {
                    dst: (ext >> 5) & 1,
                    rreg: (ext >> 4) & 1,
                    ar: ext & 3,
                    n,
                    m,
                }
            };
        }
        if ext & 0xc0 == 0x80 {
            return ExtOpcode::Ls {
                dst: (ext >> 4) & 3,
                acc: ext & 1,
                store_ar0: ext & 0x02 != 0,
                n,
                m,
            };
        }
        if ext & 0xc0 == 0x40 {
            return ExtOpcode::L {
                dst: (ext >> 3) & 7,
                ar: ext & 3,
                index: n,
            };
        }
        if ext & 0xe0 == 0x20 {
            return ExtOpcode::S {
                ar: ext & 3,
                src: (ext >> 3) & 3,
                index: n,
            };
        }
        if ext & 0xf0 == 0x10 {
            return ExtOpcode::Mv {
                dst: (ext >> 2) & 3,
                src: ext & 3,
            };
        }
        let ar = ext & 3;
        match ext & 0x0c {
            0x04 => ExtOpcode::Dr { ar },
            0x08 => ExtOpcode::Ir { ar },
            0x0c => ExtOpcode::Nr { ar },
            _ => ExtOpcode::Nop,
        }
    }
}
