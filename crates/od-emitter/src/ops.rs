//! Host instruction set

use crate::emitter::Label;

/// General purpose register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Reg {
    RAX = 0,
    RCX,
    RDX,
    RBX,
    RSP,
    RBP,
    RSI,
    RDI,
    R8,
    R9,
    R10,
    R11,
    R12,
    R13,
    R14,
    R15,
}

impl Reg {
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// SSE register, two 64-bit lanes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Xmm(pub u8);

impl Xmm {
    pub const XMM0: Xmm = Xmm(0);
    pub const XMM1: Xmm = Xmm(1);
    pub const XMM2: Xmm = Xmm(2);
    pub const XMM3: Xmm = Xmm(3);
    pub const XMM4: Xmm = Xmm(4);
    pub const XMM5: Xmm = Xmm(5);

    /// Scratch register reserved for the code generators
    pub const SCRATCH: Xmm = Xmm(0);
    /// Number of architectural SSE registers
    pub const COUNT: usize = 16;

    #[inline]
    pub fn index(self) -> usize {
        (self.0 & 15) as usize
    }
}

/// Branch condition, evaluated against the flags register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cond {
    /// ZF
    E,
    /// !ZF
    NE,
    /// !CF && !ZF
    A,
    /// !CF
    AE,
    /// CF
    B,
    /// CF || ZF
    BE,
    /// PF
    P,
    /// !PF
    NP,
    /// !ZF && SF == OF
    G,
    /// SF == OF
    GE,
    /// SF != OF
    L,
    /// ZF || SF != OF
    LE,
    /// SF
    S,
    /// !SF
    NS,
}

impl Cond {
    /// Condition with the opposite outcome
    pub fn invert(self) -> Cond {
        match self {
            Cond::E => Cond::NE,
            Cond::NE => Cond::E,
            Cond::A => Cond::BE,
            Cond::AE => Cond::B,
            Cond::B => Cond::AE,
            Cond::BE => Cond::A,
            Cond::P => Cond::NP,
            Cond::NP => Cond::P,
            Cond::G => Cond::LE,
            Cond::GE => Cond::L,
            Cond::L => Cond::GE,
            Cond::LE => Cond::G,
            Cond::S => Cond::NS,
            Cond::NS => Cond::S,
        }
    }
}

/// One host instruction. `G` is the owning core's helper-call payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Op<G> {
    // Integer
    MovImm { dst: Reg, imm: u64 },
    Mov { dst: Reg, src: Reg },
    Add { dst: Reg, src: Reg },
    AddImm { dst: Reg, imm: i32 },
    Sub { dst: Reg, src: Reg },
    SubImm { dst: Reg, imm: i32 },
    And { dst: Reg, src: Reg },
    AndImm { dst: Reg, imm: i32 },
    Or { dst: Reg, src: Reg },
    OrImm { dst: Reg, imm: i32 },
    Xor { dst: Reg, src: Reg },
    XorImm { dst: Reg, imm: i32 },
    Not { dst: Reg },
    Shl { dst: Reg, amount: u8 },
    Shr { dst: Reg, amount: u8 },
    Sar { dst: Reg, amount: u8 },
    Cmp { a: Reg, b: Reg },
    CmpImm { a: Reg, imm: i32 },
    Test { a: Reg, b: Reg },
    TestImm { a: Reg, imm: i32 },

    // SSE moves and bitwise
    MovqToXmm { dst: Xmm, src: Reg },
    MovqFromXmm { dst: Reg, src: Xmm },
    Movapd { dst: Xmm, src: Xmm },
    Movsd { dst: Xmm, src: Xmm },
    Movddup { dst: Xmm, src: Xmm },
    /// `dst = [dst.hi, src.hi]`
    Unpckhpd { dst: Xmm, src: Xmm },
    Andpd { dst: Xmm, src: Xmm },
    Andnpd { dst: Xmm, src: Xmm },
    Orpd { dst: Xmm, src: Xmm },
    Xorpd { dst: Xmm, src: Xmm },

    // SSE arithmetic
    Addsd { dst: Xmm, src: Xmm },
    Subsd { dst: Xmm, src: Xmm },
    Mulsd { dst: Xmm, src: Xmm },
    Divsd { dst: Xmm, src: Xmm },
    Addpd { dst: Xmm, src: Xmm },
    Subpd { dst: Xmm, src: Xmm },
    Mulpd { dst: Xmm, src: Xmm },
    /// `dst = a * b + dst` with one rounding
    Vfmadd231sd { dst: Xmm, a: Xmm, b: Xmm },
    /// `dst = a * b - dst` with one rounding
    Vfmsub231sd { dst: Xmm, a: Xmm, b: Xmm },
    Vfmadd231pd { dst: Xmm, a: Xmm, b: Xmm },
    Vfmsub231pd { dst: Xmm, a: Xmm, b: Xmm },
    Minsd { dst: Xmm, src: Xmm },
    Cvtsd2ss { dst: Xmm, src: Xmm },
    Cvtss2sd { dst: Xmm, src: Xmm },
    Cvtpd2ps { dst: Xmm, src: Xmm },
    Cvtps2pd { dst: Xmm, src: Xmm },
    /// Round with nearest-even to a 32-bit integer
    Cvtsd2si { dst: Reg, src: Xmm },
    /// Truncate to a 32-bit integer
    Cvttsd2si { dst: Reg, src: Xmm },
    Ucomisd { a: Xmm, b: Xmm },

    // Control flow
    Jcc { cond: Cond, target: Label },
    Jmp { target: Label },
    /// Leave the code buffer with an immediate result
    Exit { value: u64 },
    /// Leave the code buffer with a register's value
    ExitReg { src: Reg },

    /// Call back into the owning core
    Guest(G),
}

impl<G> Op<G> {
    /// Branch target, if this instruction transfers control inside the buffer
    pub fn branch_target(&self) -> Option<Label> {
        match self {
            Op::Jcc { target, .. } | Op::Jmp { target } => Some(*target),
            _ => None,
        }
    }
}
