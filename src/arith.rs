//! Integer arithmetic and logic lowering: the register/immediate dispatch
//! for add/sub/and/or/xor/mul, the widening pair ops (`mulu2`/`add2`/
//! `sub2`), shifts, and 64-bit-by-32-bit division (`div2`/`divu2`), which is
//! the one operation in this module that can call out to a runtime
//! trampoline rather than staying inline.

use crate::buffer::CodeBuffer;
use crate::emit;
use crate::encode::*;
use crate::error::CodegenError;
use crate::reg::Reg;
use crate::reloc::{patch_reloc, RelocKind};

/// An operand that may be a register or (for the third operand of most
/// binary ops) a constant the caller has already confirmed is legal here.
#[derive(Debug, Clone, Copy)]
pub enum Operand {
    Reg(Reg),
    Const(i32),
}

pub fn add(buf: &mut CodeBuffer, d: Reg, a: Reg, b: Operand) -> Result<(), CodegenError> {
    match b {
        Operand::Const(v) => emit::addi(buf, d, a, v),
        Operand::Reg(b) => {
            buf.put32(tab(ADD, d, a, b))?;
            Ok(())
        }
    }
}

pub fn sub(buf: &mut CodeBuffer, d: Reg, a: Reg, b: Operand) -> Result<(), CodegenError> {
    match b {
        Operand::Const(v) => emit::addi(buf, d, a, -v),
        Operand::Reg(b) => {
            buf.put32(tab(SUBF, d, b, a))?;
            Ok(())
        }
    }
}

pub fn and(buf: &mut CodeBuffer, d: Reg, a: Reg, b: Operand) -> Result<(), CodegenError> {
    match b {
        Operand::Const(0) => emit::movi(buf, d, 0),
        Operand::Const(v) if v == (v & 0xffff) => {
            buf.put32(d_form_s(ANDI, a, d, v as u16))?;
            Ok(())
        }
        Operand::Const(v) if v == (v & 0xffff0000u32 as i32) => {
            buf.put32(d_form_s(ANDIS, a, d, (v >> 16) as u16))?;
            Ok(())
        }
        Operand::Const(-1) => {
            if d != a {
                emit::mov(buf, d, a)?;
            }
            Ok(())
        }
        Operand::Const(v) => {
            emit::movi(buf, crate::reg::SCRATCH, v)?;
            buf.put32(sab(AND, a, d, crate::reg::SCRATCH))?;
            Ok(())
        }
        Operand::Reg(b) => {
            buf.put32(sab(AND, a, d, b))?;
            Ok(())
        }
    }
}

pub fn or(buf: &mut CodeBuffer, d: Reg, a: Reg, b: Operand) -> Result<(), CodegenError> {
    match b {
        Operand::Const(0) => {
            if d != a {
                emit::mov(buf, d, a)?;
            }
            Ok(())
        }
        Operand::Const(v) => {
            let low = v as u16;
            let high = (v >> 16) as u16;
            if low != 0 {
                buf.put32(d_form_s(ORI, a, d, low))?;
                if high != 0 {
                    buf.put32(d_form_s(ORIS, d, d, high))?;
                }
            } else {
                buf.put32(d_form_s(ORIS, a, d, high))?;
            }
            Ok(())
        }
        Operand::Reg(b) => {
            buf.put32(sab(OR, a, d, b))?;
            Ok(())
        }
    }
}

pub fn xor(buf: &mut CodeBuffer, d: Reg, a: Reg, b: Operand) -> Result<(), CodegenError> {
    match b {
        Operand::Const(0) => {
            if d != a {
                emit::mov(buf, d, a)?;
            }
            Ok(())
        }
        Operand::Const(v) if v == (v & 0xffff) => {
            buf.put32(d_form_s(XORI, a, d, v as u16))?;
            Ok(())
        }
        Operand::Const(v) if v == (v & 0xffff0000u32 as i32) => {
            buf.put32(d_form_s(XORIS, a, d, (v >> 16) as u16))?;
            Ok(())
        }
        Operand::Const(v) => {
            emit::movi(buf, crate::reg::SCRATCH, v)?;
            buf.put32(sab(XOR, a, d, crate::reg::SCRATCH))?;
            Ok(())
        }
        Operand::Reg(b) => {
            buf.put32(sab(XOR, a, d, b))?;
            Ok(())
        }
    }
}

pub fn mul(buf: &mut CodeBuffer, d: Reg, a: Reg, b: Operand) -> Result<(), CodegenError> {
    match b {
        Operand::Const(v) if v == v as i16 as i32 => {
            buf.put32(d_form(MULLI, d, a, v as u16))?;
            Ok(())
        }
        Operand::Const(v) => {
            emit::movi(buf, crate::reg::SCRATCH, v)?;
            buf.put32(tab(MULLW, d, a, crate::reg::SCRATCH))?;
            Ok(())
        }
        Operand::Reg(b) => {
            buf.put32(tab(MULLW, d, a, b))?;
            Ok(())
        }
    }
}

/// `d_lo:d_hi = a * b` (unsigned widening multiply). Stages through `r0`
/// when the low-half destination aliases either source, since `mullw`'s
/// result would otherwise be read back as a stale source operand by the
/// following `mulhwu`.
pub fn mulu2(buf: &mut CodeBuffer, d_lo: Reg, d_hi: Reg, a: Reg, b: Reg) -> Result<(), CodegenError> {
    if d_lo == a || d_lo == b {
        buf.put32(tab(MULLW, crate::reg::R0, a, b))?;
        buf.put32(tab(MULHWU, d_hi, a, b))?;
        emit::mov(buf, d_lo, crate::reg::R0)?;
    } else {
        buf.put32(tab(MULLW, d_lo, a, b))?;
        buf.put32(tab(MULHWU, d_hi, a, b))?;
    }
    Ok(())
}

pub fn neg(buf: &mut CodeBuffer, d: Reg, a: Reg) -> Result<(), CodegenError> {
    buf.put32(tab(NEG, d, a, crate::reg::R0))?;
    Ok(())
}

/// `d_lo:d_hi = (a_lo:a_hi) + (b_lo:b_hi)`, a 64-bit add built from
/// carry-propagating `addc`/`adde`. Aliasing the low destination with any
/// source again needs the `r0` staging trick, same rationale as
/// [`mulu2`].
pub fn add2(
    buf: &mut CodeBuffer,
    d_lo: Reg,
    d_hi: Reg,
    a_lo: Reg,
    a_hi: Reg,
    b_lo: Reg,
    b_hi: Reg,
) -> Result<(), CodegenError> {
    if d_lo == a_hi || d_lo == b_hi {
        buf.put32(tab(ADDC, crate::reg::R0, a_lo, b_lo))?;
        buf.put32(tab(ADDE, d_hi, a_hi, b_hi))?;
        emit::mov(buf, d_lo, crate::reg::R0)?;
    } else {
        buf.put32(tab(ADDC, d_lo, a_lo, b_lo))?;
        buf.put32(tab(ADDE, d_hi, a_hi, b_hi))?;
    }
    Ok(())
}

/// `(d_lo:d_hi) = (a_lo:a_hi) - (b_lo:b_hi)`.
pub fn sub2(
    buf: &mut CodeBuffer,
    d_lo: Reg,
    d_hi: Reg,
    a_lo: Reg,
    a_hi: Reg,
    b_lo: Reg,
    b_hi: Reg,
) -> Result<(), CodegenError> {
    if d_lo == a_hi || d_lo == b_hi {
        buf.put32(tab(SUBFC, crate::reg::R0, b_lo, a_lo))?;
        buf.put32(tab(SUBFE, d_hi, b_hi, a_hi))?;
        emit::mov(buf, d_lo, crate::reg::R0)?;
    } else {
        buf.put32(tab(SUBFC, d_lo, b_lo, a_lo))?;
        buf.put32(tab(SUBFE, d_hi, b_hi, a_hi))?;
    }
    Ok(())
}

pub fn shl(buf: &mut CodeBuffer, d: Reg, a: Reg, b: Operand) -> Result<(), CodegenError> {
    match b {
        Operand::Const(0) => {
            if d != a {
                emit::mov(buf, d, a)?;
            }
            Ok(())
        }
        Operand::Const(v) => {
            buf.put32(rlwinm(d, a, v as u32, 0, 31 - v as u32))?;
            Ok(())
        }
        Operand::Reg(b) => {
            buf.put32(sab(SLW, a, d, b))?;
            Ok(())
        }
    }
}

pub fn shr(buf: &mut CodeBuffer, d: Reg, a: Reg, b: Operand) -> Result<(), CodegenError> {
    match b {
        Operand::Const(0) => {
            if d != a {
                emit::mov(buf, d, a)?;
            }
            Ok(())
        }
        Operand::Const(v) => {
            let v = v as u32;
            buf.put32(rlwinm(d, a, 32 - v, v, 31))?;
            Ok(())
        }
        Operand::Reg(b) => {
            buf.put32(sab(SRW, a, d, b))?;
            Ok(())
        }
    }
}

pub fn sar(buf: &mut CodeBuffer, d: Reg, a: Reg, b: Operand) -> Result<(), CodegenError> {
    match b {
        Operand::Const(v) => {
            buf.put32(srawi(d, a, v as u32))?;
            Ok(())
        }
        Operand::Reg(b) => {
            buf.put32(sab(SRAW, a, d, b))?;
            Ok(())
        }
    }
}

/// `d = a / b`, `r = a % b` (signed when `unsigned == false`). Tries the
/// inline `divw`/`divwu` fast path when the dividend's high half is known
/// zero/sign-extended appropriately by the caller's `cmpli` probe on `r3`;
/// falls back to a call into a hand-written trampoline that does the
/// 64-by-32 division the PPC32 ISA has no instruction for, preserving
/// `r7..r31` across the call exactly as the reference implementation's
/// `MAKE_TRAMPOLINE` assembly stub does.
///
/// Operand convention mirrors the fixed pin-register quintuple from the
/// op-definitions table: dividend high half in `r3`, low half in `r4`,
/// divisor in `r5`; the fast path's `divw`/`divwu` leaves the quotient in
/// `r6` and the `subf` leaves the remainder in `r3`, exactly as the
/// reference implementation's three-instruction sequence does, with no
/// further register shuffle.
pub fn div2(
    buf: &mut CodeBuffer,
    unsigned: bool,
    div_trampoline: crate::buffer::CodeOffset,
    udiv_trampoline: crate::buffer::CodeOffset,
) -> Result<(), CodegenError> {
    let r3 = crate::reg::R3;
    let r4 = crate::reg::R4;
    let r5 = crate::reg::R5;
    let r6 = crate::reg::R6;

    buf.put32(compare_imm(CMPLI, 7, r3, 0))?;
    let fast_site = buf.put32(bc_word(CR_EQ, BO_COND_TRUE))?;

    let target = if unsigned { udiv_trampoline } else { div_trampoline };
    emit::b(buf, LK, target)?;
    let slow_exit = buf.put32(B)?;

    patch_reloc(buf, fast_site, RelocKind::Rel14, buf.offset(), 0)?;
    let divop = if unsigned { DIVWU } else { DIVW };
    buf.put32(tab(divop, r6, r4, r5))?;
    buf.put32(tab(MULLW, crate::reg::R0, r6, r5))?;
    buf.put32(tab(SUBF, r3, crate::reg::R0, r4))?;

    patch_reloc(buf, slow_exit, RelocKind::Rel24, buf.offset(), 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reg::*;

    #[test]
    fn add_const_uses_addi() {
        let mut mem = [0u8; 4];
        let mut buf = CodeBuffer::new(&mut mem);
        add(&mut buf, R3, R4, Operand::Const(100)).unwrap();
        assert_eq!(buf.word_at(0), 0x3864_0064);
    }

    #[test]
    fn and_all_ones_is_mov() {
        let mut mem = [0u8; 4];
        let mut buf = CodeBuffer::new(&mut mem);
        and(&mut buf, R5, R6, Operand::Const(-1)).unwrap();
        assert_eq!(buf.offset(), 4);
    }

    #[test]
    fn and_zero_is_movi_zero() {
        let mut mem = [0u8; 4];
        let mut buf = CodeBuffer::new(&mut mem);
        and(&mut buf, R5, R6, Operand::Const(0)).unwrap();
        assert_eq!(buf.word_at(0), 0x38a0_0000);
    }

    #[test]
    fn mulu2_stages_through_r0_when_dest_aliases_source() {
        let mut mem = [0u8; 16];
        let mut buf = CodeBuffer::new(&mut mem);
        mulu2(&mut buf, R5, R6, R5, R7).unwrap();
        assert_eq!(buf.offset(), 12);
    }

    #[test]
    fn div2_emits_fast_and_slow_paths() {
        let mut mem = [0u8; 64];
        let mut buf = CodeBuffer::new(&mut mem);
        div2(&mut buf, false, 0x1000, 0x1010).unwrap();
        assert_eq!(buf.offset() % 4, 0);
        assert!(buf.offset() >= 24);
    }

    /// Fast path is exactly `divw r6,r4,r5; mullw r0,r6,r5; subf r3,r0,r4` —
    /// no extra register shuffle after the quotient lands in r6 and the
    /// remainder in r3.
    #[test]
    fn div2_fast_path_is_exactly_three_instructions_with_no_trailing_mov() {
        let mut mem = [0u8; 64];
        let mut buf = CodeBuffer::new(&mut mem);
        div2(&mut buf, false, 0x1000, 0x1010).unwrap();
        let fast_path_start = buf.offset() - 12;
        assert_eq!(buf.word_at(fast_path_start), tab(DIVW, R6, R4, R5));
        assert_eq!(
            buf.word_at(fast_path_start + 4),
            tab(MULLW, crate::reg::R0, R6, R5)
        );
        assert_eq!(
            buf.word_at(fast_path_start + 8),
            tab(SUBF, R3, crate::reg::R0, R4)
        );
    }

    #[test]
    fn shl_const_zero_is_noop_mov_when_same_reg() {
        let mut mem = [0u8; 4];
        let mut buf = CodeBuffer::new(&mut mem);
        shl(&mut buf, R5, R5, Operand::Const(0)).unwrap();
        assert_eq!(buf.offset(), 0);
    }
}
