//! Host machine executing emitted code
//!
//! Integer instructions operate on the full 64-bit register and set the
//! flags the way their x86-64 counterparts do. SSE instructions follow the
//! host semantics a recompiler relies on: `minsd` returns the second
//! operand on NaN or equal inputs, `cvtsd2si` yields the integer indefinite
//! value 0x80000000 when the result does not fit, and `ucomisd` reports
//! an unordered compare as ZF=PF=CF=1. Floating-point arithmetic rounds to
//! nearest.

use od_core::error::JitError;

use crate::emitter::Code;
use crate::ops::{Cond, Op, Reg, Xmm};

/// Status flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flags {
    pub zf: bool,
    pub pf: bool,
    pub cf: bool,
    pub sf: bool,
    pub of: bool,
}

impl Flags {
    pub fn test(&self, cond: Cond) -> bool {
        match cond {
            Cond::E => self.zf,
            Cond::NE => !self.zf,
            Cond::A => !self.cf && !self.zf,
            Cond::AE => !self.cf,
            Cond::B => self.cf,
            Cond::BE => self.cf || self.zf,
            Cond::P => self.pf,
            Cond::NP => !self.pf,
            Cond::G => !self.zf && self.sf == self.of,
            Cond::GE => self.sf == self.of,
            Cond::L => self.sf != self.of,
            Cond::LE => self.zf || self.sf != self.of,
            Cond::S => self.sf,
            Cond::NS => !self.sf,
        }
    }

    fn logic(result: u64) -> Self {
        Self {
            zf: result == 0,
            pf: (result as u8).count_ones() % 2 == 0,
            cf: false,
            sf: (result as i64) < 0,
            of: false,
        }
    }
}

/// What a guest call wants the machine to do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit(u64),
}

/// Executes [`Op::Guest`] payloads on behalf of the machine
pub trait GuestHandler<G> {
    type Error: From<JitError>;

    fn guest_op(&mut self, op: &G, machine: &mut Machine) -> Result<Flow, Self::Error>;
}

/// Host register state
#[derive(Debug, Clone, Default)]
pub struct Machine {
    pub gpr: [u64; 16],
    pub xmm: [[u64; 2]; Xmm::COUNT],
    pub flags: Flags,
    /// Instructions retired since creation
    pub retired: u64,
}

#[inline]
fn f(bits: u64) -> f64 {
    f64::from_bits(bits)
}

#[inline]
fn single(bits: u64) -> f32 {
    f32::from_bits(bits as u32)
}

fn to_i32_indefinite(value: f64) -> u64 {
    if value.is_nan() || value >= 2147483648.0 || value < -2147483648.0 {
        0x8000_0000
    } else {
        (value as i32) as u32 as u64
    }
}

impl Machine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reg(&self, reg: Reg) -> u64 {
        self.gpr[reg.index()]
    }

    pub fn set_reg(&mut self, reg: Reg, value: u64) {
        self.gpr[reg.index()] = value;
    }

    pub fn lane0(&self, xmm: Xmm) -> u64 {
        self.xmm[xmm.index()][0]
    }

    pub fn set_lane0(&mut self, xmm: Xmm, bits: u64) {
        self.xmm[xmm.index()][0] = bits;
    }

    pub fn lanes(&self, xmm: Xmm) -> [u64; 2] {
        self.xmm[xmm.index()]
    }

    pub fn set_lanes(&mut self, xmm: Xmm, lanes: [u64; 2]) {
        self.xmm[xmm.index()] = lanes;
    }

    fn scalar(&mut self, dst: Xmm, src: Xmm, op: impl Fn(f64, f64) -> f64) {
        let r = op(f(self.lane0(dst)), f(self.lane0(src)));
        self.set_lane0(dst, r.to_bits());
    }

    fn packed(&mut self, dst: Xmm, src: Xmm, op: impl Fn(f64, f64) -> f64) {
        let a = self.lanes(dst);
        let b = self.lanes(src);
        self.set_lanes(
            dst,
            [op(f(a[0]), f(b[0])).to_bits(), op(f(a[1]), f(b[1])).to_bits()],
        );
    }

    fn bitwise(&mut self, dst: Xmm, src: Xmm, op: impl Fn(u64, u64) -> u64) {
        let a = self.lanes(dst);
        let b = self.lanes(src);
        self.set_lanes(dst, [op(a[0], b[0]), op(a[1], b[1])]);
    }

    fn arith_flags(&mut self, a: u64, b: u64, result: u64, sub: bool) {
        let (sa, sb, sr) = ((a as i64) < 0, (b as i64) < 0, (result as i64) < 0);
        self.flags = Flags {
            zf: result == 0,
            pf: (result as u8).count_ones() % 2 == 0,
            cf: if sub { a < b } else { result < a },
            sf: sr,
            of: if sub { sa != sb && sr != sa } else { sa == sb && sr != sa },
        };
    }

    /// Run `code` from its first instruction until an exit
    pub fn run<G, H>(&mut self, code: &Code<G>, handler: &mut H) -> Result<u64, H::Error>
    where
        H: GuestHandler<G>,
    {
        let ops = code.ops();
        let mut pc = 0usize;
        loop {
            let op = ops
                .get(pc)
                .ok_or(JitError::RanOffEnd { index: pc })?;
            pc += 1;
            self.retired += 1;

            match op {
                Op::MovImm { dst, imm } => self.set_reg(*dst, *imm),
                Op::Mov { dst, src } => self.set_reg(*dst, self.reg(*src)),
                Op::Add { dst, src } => {
                    let (a, b) = (self.reg(*dst), self.reg(*src));
                    let r = a.wrapping_add(b);
                    self.arith_flags(a, b, r, false);
                    self.set_reg(*dst, r);
                }
                Op::AddImm { dst, imm } => {
                    let (a, b) = (self.reg(*dst), *imm as i64 as u64);
                    let r = a.wrapping_add(b);
                    self.arith_flags(a, b, r, false);
                    self.set_reg(*dst, r);
                }
                Op::Sub { dst, src } => {
                    let (a, b) = (self.reg(*dst), self.reg(*src));
                    let r = a.wrapping_sub(b);
                    self.arith_flags(a, b, r, true);
                    self.set_reg(*dst, r);
                }
                Op::SubImm { dst, imm } => {
                    let (a, b) = (self.reg(*dst), *imm as i64 as u64);
                    let r = a.wrapping_sub(b);
                    self.arith_flags(a, b, r, true);
                    self.set_reg(*dst, r);
                }
                Op::And { dst, src } => {
                    let r = self.reg(*dst) & self.reg(*src);
                    self.flags = Flags::logic(r);
                    self.set_reg(*dst, r);
                }
                Op::AndImm { dst, imm } => {
                    let r = self.reg(*dst) & (*imm as i64 as u64);
                    self.flags = Flags::logic(r);
                    self.set_reg(*dst, r);
                }
                Op::Or { dst, src } => {
                    let r = self.reg(*dst) | self.reg(*src);
                    self.flags = Flags::logic(r);
                    self.set_reg(*dst, r);
                }
                Op::OrImm { dst, imm } => {
                    let r = self.reg(*dst) | (*imm as i64 as u64);
                    self.flags = Flags::logic(r);
                    self.set_reg(*dst, r);
                }
                Op::Xor { dst, src } => {
                    let r = self.reg(*dst) ^ self.reg(*src);
                    self.flags = Flags::logic(r);
                    self.set_reg(*dst, r);
                }
                Op::XorImm { dst, imm } => {
                    let r = self.reg(*dst) ^ (*imm as i64 as u64);
                    self.flags = Flags::logic(r);
                    self.set_reg(*dst, r);
                }
                Op::Not { dst } => self.set_reg(*dst, !self.reg(*dst)),
                Op::Shl { dst, amount } => {
                    let r = self.reg(*dst) << (amount & 63);
                    self.flags = Flags::logic(r);
                    self.set_reg(*dst, r);
                }
                Op::Shr { dst, amount } => {
                    let r = self.reg(*dst) >> (amount & 63);
                    self.flags = Flags::logic(r);
                    self.set_reg(*dst, r);
                }
                Op::Sar { dst, amount } => {
                    let r = ((self.reg(*dst) as i64) >> (amount & 63)) as u64;
                    self.flags = Flags::logic(r);
                    self.set_reg(*dst, r);
                }
                Op::Cmp { a, b } => {
                    let (x, y) = (self.reg(*a), self.reg(*b));
                    self.arith_flags(x, y, x.wrapping_sub(y), true);
                }
                Op::CmpImm { a, imm } => {
                    let (x, y) = (self.reg(*a), *imm as i64 as u64);
                    self.arith_flags(x, y, x.wrapping_sub(y), true);
                }
                Op::Test { a, b } => self.flags = Flags::logic(self.reg(*a) & self.reg(*b)),
                Op::TestImm { a, imm } => {
                    self.flags = Flags::logic(self.reg(*a) & (*imm as i64 as u64))
                }

                Op::MovqToXmm { dst, src } => self.set_lanes(*dst, [self.reg(*src), 0]),
                Op::MovqFromXmm { dst, src } => self.set_reg(*dst, self.lane0(*src)),
                Op::Movapd { dst, src } => self.set_lanes(*dst, self.lanes(*src)),
                Op::Movsd { dst, src } => self.set_lane0(*dst, self.lane0(*src)),
                Op::Movddup { dst, src } => {
                    let lo = self.lane0(*src);
                    self.set_lanes(*dst, [lo, lo]);
                }
                Op::Unpckhpd { dst, src } => {
                    let (hi_dst, hi_src) = (self.lanes(*dst)[1], self.lanes(*src)[1]);
                    self.set_lanes(*dst, [hi_dst, hi_src]);
                }
                Op::Andpd { dst, src } => self.bitwise(*dst, *src, |a, b| a & b),
                Op::Andnpd { dst, src } => self.bitwise(*dst, *src, |a, b| !a & b),
                Op::Orpd { dst, src } => self.bitwise(*dst, *src, |a, b| a | b),
                Op::Xorpd { dst, src } => self.bitwise(*dst, *src, |a, b| a ^ b),

                Op::Addsd { dst, src } => self.scalar(*dst, *src, |a, b| a + b),
                Op::Subsd { dst, src } => self.scalar(*dst, *src, |a, b| a - b),
                Op::Mulsd { dst, src } => self.scalar(*dst, *src, |a, b| a * b),
                Op::Divsd { dst, src } => self.scalar(*dst, *src, |a, b| a / b),
                Op::Addpd { dst, src } => self.packed(*dst, *src, |a, b| a + b),
                Op::Subpd { dst, src } => self.packed(*dst, *src, |a, b| a - b),
                Op::Mulpd { dst, src } => self.packed(*dst, *src, |a, b| a * b),
                Op::Vfmadd231sd { dst, a, b } => {
                    let r = f(self.lane0(*a)).mul_add(f(self.lane0(*b)), f(self.lane0(*dst)));
                    self.set_lane0(*dst, r.to_bits());
                }
                Op::Vfmsub231sd { dst, a, b } => {
                    let r = f(self.lane0(*a)).mul_add(f(self.lane0(*b)), -f(self.lane0(*dst)));
                    self.set_lane0(*dst, r.to_bits());
                }
                Op::Vfmadd231pd { dst, a, b } => {
                    let (x, y, z) = (self.lanes(*a), self.lanes(*b), self.lanes(*dst));
                    let lane = |i: usize| f(x[i]).mul_add(f(y[i]), f(z[i])).to_bits();
                    self.set_lanes(*dst, [lane(0), lane(1)]);
                }
                Op::Vfmsub231pd { dst, a, b } => {
                    let (x, y, z) = (self.lanes(*a), self.lanes(*b), self.lanes(*dst));
                    let lane = |i: usize| f(x[i]).mul_add(f(y[i]), -f(z[i])).to_bits();
                    self.set_lanes(*dst, [lane(0), lane(1)]);
                }
                Op::Minsd { dst, src } => {
                    let (a, b) = (f(self.lane0(*dst)), f(self.lane0(*src)));
                    if !(a < b) {
                        self.set_lane0(*dst, self.lane0(*src));
                    }
                }
                Op::Cvtsd2ss { dst, src } => {
                    let s = f(self.lane0(*src)) as f32;
                    let lo = self.lane0(*dst) & !0xFFFF_FFFF;
                    self.set_lane0(*dst, lo | s.to_bits() as u64);
                }
                Op::Cvtss2sd { dst, src } => {
                    let d = single(self.lane0(*src)) as f64;
                    self.set_lane0(*dst, d.to_bits());
                }
                Op::Cvtpd2ps { dst, src } => {
                    let l = self.lanes(*src);
                    let lo = (f(l[0]) as f32).to_bits() as u64;
                    let hi = (f(l[1]) as f32).to_bits() as u64;
                    self.set_lanes(*dst, [lo | (hi << 32), 0]);
                }
                Op::Cvtps2pd { dst, src } => {
                    let packed = self.lane0(*src);
                    let lo = single(packed) as f64;
                    let hi = single(packed >> 32) as f64;
                    self.set_lanes(*dst, [lo.to_bits(), hi.to_bits()]);
                }
                Op::Cvtsd2si { dst, src } => {
                    let v = f(self.lane0(*src)).round_ties_even();
                    self.set_reg(*dst, to_i32_indefinite(v));
                }
                Op::Cvttsd2si { dst, src } => {
                    let v = f(self.lane0(*src)).trunc();
                    self.set_reg(*dst, to_i32_indefinite(v));
                }
                Op::Ucomisd { a, b } => {
                    let (x, y) = (f(self.lane0(*a)), f(self.lane0(*b)));
                    self.flags = if x.is_nan() || y.is_nan() {
                        Flags { zf: true, pf: true, cf: true, ..Flags::default() }
                    } else if x > y {
                        Flags::default()
                    } else if x < y {
                        Flags { cf: true, ..Flags::default() }
                    } else {
                        Flags { zf: true, ..Flags::default() }
                    };
                }

                Op::Jcc { cond, target } => {
                    if self.flags.test(*cond) {
                        pc = code.target(*target);
                    }
                }
                Op::Jmp { target } => pc = code.target(*target),
                Op::Exit { value } => return Ok(*value),
                Op::ExitReg { src } => return Ok(self.reg(*src)),
                Op::Guest(g) => match handler.guest_op(g, self)? {
                    Flow::Continue => {}
                    Flow::Exit(value) => return Ok(value),
                },
            }
        }
    }
}
