//! Gekko instruction decoder

/// Decoded instruction
#[derive(Debug, Clone, Copy)]
pub struct DecodedInstruction {
    /// Raw opcode
    pub opcode: u32,
    /// Primary opcode (bits 0-5)
    pub op: u8,
    /// Extended opcode (position depends on the form)
    pub xo: u16,
    pub form: InstructionForm,
}

/// Instruction forms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionForm {
    /// Branch
    I,
    /// Conditional branch
    B,
    /// System call
    SC,
    /// Load/store and immediate arithmetic
    D,
    /// Indexed, compare, FP move/compare/convert, FPSCR access
    X,
    /// Branch to LR/CTR, CR logical
    XL,
    /// Integer arithmetic
    XO,
    /// Floating-point arithmetic
    A,
    /// Rotate and mask
    M,
    /// Paired-single arithmetic (opcode 4, 5-bit extended opcode)
    PsA,
    /// Paired-single move/compare/merge (opcode 4, 10-bit extended opcode)
    PsX,
    Unknown,
}

/// Gekko instruction decoder
pub struct PpcDecoder;

impl PpcDecoder {
    /// Decode a 32-bit instruction
    pub fn decode(opcode: u32) -> DecodedInstruction {
        let op = ((opcode >> 26) & 0x3F) as u8;
        let xo5 = ((opcode >> 1) & 0x1F) as u16;
        let xo10 = ((opcode >> 1) & 0x3FF) as u16;

        let (form, xo) = match op {
            18 => (InstructionForm::I, 0),
            16 => (InstructionForm::B, 0),
            17 => (InstructionForm::SC, 0),

            7 | // mulli
            8 | // subfic
            10 | 11 | // cmpli, cmpi
            12..=15 | // addic, addic., addi, addis
            24..=29 | // ori, oris, xori, xoris, andi., andis.
            32..=47 | // integer load/store
            48..=55 => (InstructionForm::D, 0), // lfs, lfsu, lfd, lfdu, stfs, stfsu, stfd, stfdu

            19 => (InstructionForm::XL, xo10),

            31 => {
                // XO-form arithmetic uses a 9-bit extended opcode plus OE
                let xo9 = ((opcode >> 1) & 0x1FF) as u16;
                match xo9 {
                    8 | 10 | 40 | 104 | 138 | 235 | 266 | 459 | 491 => (InstructionForm::XO, xo9),
                    _ => (InstructionForm::X, xo10),
                }
            }

            20 | 21 | 23 => (InstructionForm::M, 0),

            59 => (InstructionForm::A, xo5),
            63 => {
                if xo5 >= 18 {
                    (InstructionForm::A, xo5)
                } else {
                    (InstructionForm::X, xo10)
                }
            }

            4 => {
                if (10..=15).contains(&xo5) || xo5 >= 18 {
                    (InstructionForm::PsA, xo5)
                } else {
                    (InstructionForm::PsX, xo10)
                }
            }

            _ => (InstructionForm::Unknown, 0),
        };

        DecodedInstruction {
            opcode,
            op,
            xo,
            form,
        }
    }

    /// D-form fields
    #[inline]
    pub fn d_form(opcode: u32) -> (u8, u8, i16) {
        let rt = ((opcode >> 21) & 0x1F) as u8;
        let ra = ((opcode >> 16) & 0x1F) as u8;
        let d = (opcode & 0xFFFF) as i16;
        (rt, ra, d)
    }

    /// X-form fields
    #[inline]
    pub fn x_form(opcode: u32) -> (u8, u8, u8, u16, bool) {
        let rt = ((opcode >> 21) & 0x1F) as u8;
        let ra = ((opcode >> 16) & 0x1F) as u8;
        let rb = ((opcode >> 11) & 0x1F) as u8;
        let xo = ((opcode >> 1) & 0x3FF) as u16;
        let rc = (opcode & 1) != 0;
        (rt, ra, rb, xo, rc)
    }

    /// XO-form fields
    #[inline]
    pub fn xo_form(opcode: u32) -> (u8, u8, u8, bool, u16, bool) {
        let rt = ((opcode >> 21) & 0x1F) as u8;
        let ra = ((opcode >> 16) & 0x1F) as u8;
        let rb = ((opcode >> 11) & 0x1F) as u8;
        let oe = ((opcode >> 10) & 1) != 0;
        let xo = ((opcode >> 1) & 0x1FF) as u16;
        let rc = (opcode & 1) != 0;
        (rt, ra, rb, oe, xo, rc)
    }

    /// A-form fields: (frD, frA, frB, frC, Rc)
    #[inline]
    pub fn a_form(opcode: u32) -> (u8, u8, u8, u8, bool) {
        let frd = ((opcode >> 21) & 0x1F) as u8;
        let fra = ((opcode >> 16) & 0x1F) as u8;
        let frb = ((opcode >> 11) & 0x1F) as u8;
        let frc = ((opcode >> 6) & 0x1F) as u8;
        let rc = (opcode & 1) != 0;
        (frd, fra, frb, frc, rc)
    }

    /// I-form fields
    #[inline]
    pub fn i_form(opcode: u32) -> (i32, bool, bool) {
        let li = ((opcode >> 2) & 0xFFFFFF) as i32;
        // Sign extend from 24 bits
        let li = if li & 0x800000 != 0 {
            li | !0xFFFFFF
        } else {
            li
        } << 2;
        let aa = ((opcode >> 1) & 1) != 0;
        let lk = (opcode & 1) != 0;
        (li, aa, lk)
    }

    /// B-form fields
    #[inline]
    pub fn b_form(opcode: u32) -> (u8, u8, i16, bool, bool) {
        let bo = ((opcode >> 21) & 0x1F) as u8;
        let bi = ((opcode >> 16) & 0x1F) as u8;
        let bd = ((opcode >> 2) & 0x3FFF) as i16;
        // Sign extend from 14 bits
        let bd = if bd & 0x2000 != 0 {
            bd | !0x3FFF
        } else {
            bd
        } << 2;
        let aa = ((opcode >> 1) & 1) != 0;
        let lk = (opcode & 1) != 0;
        (bo, bi, bd, aa, lk)
    }

    /// M-form fields
    #[inline]
    pub fn m_form(opcode: u32) -> (u8, u8, u8, u8, u8, bool) {
        let rs = ((opcode >> 21) & 0x1F) as u8;
        let ra = ((opcode >> 16) & 0x1F) as u8;
        let rb = ((opcode >> 11) & 0x1F) as u8;
        let mb = ((opcode >> 6) & 0x1F) as u8;
        let me = ((opcode >> 1) & 0x1F) as u8;
        let rc = (opcode & 1) != 0;
        (rs, ra, rb, mb, me, rc)
    }
}
