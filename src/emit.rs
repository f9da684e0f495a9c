//! Typed emission helpers shared by every lowering in this backend: moves,
//! immediate materialization, base+displacement load/store with indexed
//! fallback, absolute branches (short form or CTR trampoline), and the
//! extended two-instruction `addi`.
//!
//! These are also the primitives exposed to the register allocator for
//! spill/reload and constant rematerialization (`emit_ld`/`emit_st`,
//! `emit_mov`, `emit_movi`, `emit_addi` in the external interface).

use crate::buffer::{CodeBuffer, CodeOffset};
use crate::encode::*;
use crate::error::CodegenError;
use crate::reg::{Reg, SCRATCH};

/// `mov rd, rs` — encoded as `or rd, rs, rs`, the standard PPC idiom since
/// there is no dedicated register-move instruction.
pub fn mov(buf: &mut CodeBuffer, rd: Reg, rs: Reg) -> Result<(), CodegenError> {
    if rd == rs {
        return Ok(());
    }
    buf.put32(sab(OR, rs, rd, rs))?;
    Ok(())
}

/// Materialize a 32-bit immediate into `rd`.
///
/// A value that fits a signed 16-bit immediate is a single `addi rd, 0, v`
/// (PPC's "literal zero" convention: `RA=0` in this form means the
/// immediate is not added to any register). Otherwise the high half goes in
/// via `addis` and the low half, if nonzero, is folded in with `ori`.
pub fn movi(buf: &mut CodeBuffer, rd: Reg, v: i32) -> Result<(), CodegenError> {
    if v == v as i16 as i32 {
        buf.put32(d_form(ADDI, rd, crate::reg::R0, v as u16))?;
    } else {
        buf.put32(d_form(ADDIS, rd, crate::reg::R0, (v >> 16) as u16))?;
        let low = v as u16;
        if low != 0 {
            buf.put32(d_form_s(ORI, rd, rd, low))?;
        }
    }
    Ok(())
}

/// Load/store with base+displacement, falling back to the indexed form when
/// the displacement does not fit a signed 16-bit field. `op_imm` and
/// `op_idx` are the D-form and X-form opcode words for the access width
/// (e.g. `LWZ`/`LWZX`).
pub fn ld_st(
    buf: &mut CodeBuffer,
    reg: Reg,
    base: Reg,
    off: i32,
    op_imm: u32,
    op_idx: u32,
) -> Result<(), CodegenError> {
    if off == off as i16 as i32 {
        buf.put32(d_form(op_imm, reg, base, off as u16))?;
    } else {
        movi(buf, SCRATCH, off)?;
        buf.put32(tab(op_idx, reg, base, SCRATCH))?;
    }
    Ok(())
}

/// Host load used by the allocator for spill reloads: `ld rd, [base+off]`.
pub fn emit_ld(buf: &mut CodeBuffer, rd: Reg, base: Reg, off: i32) -> Result<(), CodegenError> {
    ld_st(buf, rd, base, off, LWZ, LWZX)
}

/// Host store used by the allocator for spills: `st rs, [base+off]`.
pub fn emit_st(buf: &mut CodeBuffer, rs: Reg, base: Reg, off: i32) -> Result<(), CodegenError> {
    ld_st(buf, rs, base, off, STW, STWX)
}

/// Branch to an already-resolved absolute code offset. `mask` carries
/// `LK` for calls and is otherwise 0. Short form if the PC-relative
/// displacement fits 24 bits signed; otherwise materializes the target into
/// `r0`, moves it to CTR, and branches indirectly (`bcctr`), which has
/// unconditional range across the whole address space.
pub fn b(buf: &mut CodeBuffer, mask: u32, target: CodeOffset) -> Result<(), CodegenError> {
    let site = buf.offset();
    let disp = target as i64 - site as i64;
    let shift = 64 - 24;
    if (disp << shift) >> shift == disp {
        buf.put32(B | (disp as u32 & 0x03ff_fffc) | mask)?;
    } else {
        movi(buf, SCRATCH, target as i32)?;
        buf.put32(mtctr(SCRATCH))?;
        buf.put32(BCCTR | BO_ALWAYS | mask)?;
    }
    Ok(())
}

/// `addi rt, ra, si`, using the two-instruction extended form
/// (`addis`+`addi`) when `si` does not fit a signed 16-bit immediate.
///
/// No-ops entirely when `si == 0` and `rt == ra` (the common "no adjustment
/// needed" case for frame-pointer arithmetic). The high half of the
/// two-instruction form adds the carry bit implied by the low half's sign
/// so the two parts recombine to exactly `si`.
pub fn addi(buf: &mut CodeBuffer, rt_reg: Reg, ra_reg: Reg, si: i32) -> Result<(), CodegenError> {
    if si == 0 && rt_reg == ra_reg {
        return Ok(());
    }
    if si == si as i16 as i32 {
        buf.put32(d_form(ADDI, rt_reg, ra_reg, si as u16))?;
    } else {
        let h = (((si >> 16) & 0xffff) as u32 + (((si as u16) >> 15) as u32)) as u16;
        buf.put32(d_form(ADDIS, rt_reg, ra_reg, h))?;
        buf.put32(d_form(ADDI, rt_reg, rt_reg, si as u16))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reg::*;

    fn buf(mem: &mut [u8]) -> CodeBuffer<'_> {
        CodeBuffer::new(mem)
    }

    #[test]
    fn movi_small_is_single_addi() {
        let mut mem = [0u8; 8];
        let mut b = buf(&mut mem);
        movi(&mut b, R5, 0x1234).unwrap();
        assert_eq!(b.offset(), 4);
        assert_eq!(b.word_at(0), 0x38a0_1234);
    }

    #[test]
    fn movi_large_is_addis_then_ori() {
        let mut mem = [0u8; 8];
        let mut b = buf(&mut mem);
        movi(&mut b, R5, 0x1234_5678u32 as i32).unwrap();
        assert_eq!(b.offset(), 8);
        assert_eq!(b.word_at(0), 0x3ca0_1234);
        assert_eq!(b.word_at(4), 0x60a5_5678);
    }

    #[test]
    fn movi_boundary_16_bit() {
        let mut mem = [0u8; 8];
        let mut b = buf(&mut mem);
        movi(&mut b, R5, -32768).unwrap();
        assert_eq!(b.offset(), 4, "exactly -32768 must fit a single addi");

        let mut mem2 = [0u8; 8];
        let mut b2 = buf(&mut mem2);
        movi(&mut b2, R5, 32768).unwrap();
        assert_eq!(b2.offset(), 8, "32768 must not fit addi's signed field");
    }

    #[test]
    fn movi_roundtrips_for_sampled_values() {
        for v in [0i32, 1, -1, 100, -100, i16::MIN as i32, i16::MAX as i32, i32::MIN, i32::MAX, 0x7fff_0001] {
            let mut mem = [0u8; 8];
            let mut b = buf(&mut mem);
            movi(&mut b, R5, v).unwrap();
            let reconstructed = reconstruct_movi(&b);
            assert_eq!(reconstructed, v, "movi({v:#x}) round-trip failed");
        }
    }

    /// Test-only decode of the instruction sequence `movi` emits, used to
    /// check the round-trip property from the testable-properties list.
    fn reconstruct_movi(b: &CodeBuffer) -> i32 {
        let w0 = b.word_at(0);
        if b.offset() == 4 {
            (w0 as i16) as i32
        } else {
            let w1 = b.word_at(4);
            let hi = (w0 & 0xffff) as i32;
            let lo = (w1 & 0xffff) as i32;
            (hi << 16) | lo
        }
    }

    #[test]
    fn mov_emits_or_and_is_noop_for_same_reg() {
        let mut mem = [0u8; 4];
        let mut b = buf(&mut mem);
        mov(&mut b, R4, R7).unwrap();
        // `or r4, r7, r7`: opcd(31) | RS(7)<<21 | RA(4)<<16 | RB(7)<<11 | (444<<1).
        assert_eq!(b.word_at(0), 0x7ce4_3b78);

        let mut mem2 = [0u8; 4];
        let mut b2 = buf(&mut mem2);
        mov(&mut b2, R4, R4).unwrap();
        assert_eq!(b2.offset(), 0);
    }

    #[test]
    fn addi_register_form_matches_add() {
        let mut mem = [0u8; 4];
        let mut b = buf(&mut mem);
        // add r3, r4, 100 (immediate) from the scenario table.
        addi(&mut b, R3, R4, 100).unwrap();
        assert_eq!(b.word_at(0), 0x3864_0064);
    }

    #[test]
    fn addi_noop_when_zero_and_same_reg() {
        let mut mem = [0u8; 4];
        let mut b = buf(&mut mem);
        addi(&mut b, R3, R3, 0).unwrap();
        assert_eq!(b.offset(), 0);
    }

    #[test]
    fn ld_st_falls_back_to_indexed_form_for_large_offset() {
        let mut mem = [0u8; 16];
        let mut b = buf(&mut mem);
        ld_st(&mut b, R5, R6, 0x1_0000, LWZ, LWZX).unwrap();
        assert_eq!(b.offset(), 8, "must materialize offset then use indexed form");
    }

    #[test]
    fn ld_st_uses_immediate_form_when_it_fits() {
        let mut mem = [0u8; 16];
        let mut b = buf(&mut mem);
        ld_st(&mut b, R5, R6, 12, LWZ, LWZX).unwrap();
        assert_eq!(b.offset(), 4);
    }

    #[test]
    fn b_short_form_within_range() {
        let mut mem = [0u8; 256];
        let mut buf = CodeBuffer::new(&mut mem);
        b(&mut buf, 0, 100).unwrap();
        assert_eq!(buf.offset(), 4, "in-range target needs only the short form");
    }

    #[test]
    fn b_trampoline_form_out_of_range() {
        let mut mem = [0u8; 256];
        let mut buf = CodeBuffer::new(&mut mem);
        b(&mut buf, 0, 0x0400_0000).unwrap();
        assert_eq!(buf.offset(), 12, "out-of-range target needs movi+mtctr+bcctr");
    }
}
