//! Conditional branches: `brcond` (32-bit compare-and-branch) and
//! `brcond2` (64-bit double-word compare, lowered to a short chain of
//! 32-bit compares against a local label).
//!
//! Every comparison here goes through condition-register field 7 and a
//! fixed table mapping each of the ten comparison kinds to a `bc`
//! instruction's `(BI, BO)` pair. Which compare opcode (`cmpi`/`cmpli`/
//! `cmp`/`cmpl`) gets used ahead of it depends on the comparison kind and
//! whether the second operand is a constant that fits the compare's
//! immediate field.

use smallvec::SmallVec;

use crate::buffer::CodeBuffer;
use crate::encode::*;
use crate::error::CodegenError;
use crate::reg::Reg;
use crate::reloc::{patch_reloc, PendingReloc, RelocKind};

/// The ten comparison kinds a `brcond`/`brcond2` can test, matching the
/// reference implementation's `TCG_COND_*` enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cond {
    Eq,
    Ne,
    Lt,
    Ge,
    Le,
    Gt,
    Ltu,
    Geu,
    Leu,
    Gtu,
}

impl Cond {
    /// The fixed `(BI field/bit, BO sense)` pair this comparison kind
    /// branches on, always against CR field 7.
    fn bc_word(self) -> u32 {
        use Cond::*;
        match self {
            Eq => bc_word_for(CR_EQ, BO_COND_TRUE),
            Ne => bc_word_for(CR_EQ, BO_COND_FALSE),
            Lt => bc_word_for(CR_LT, BO_COND_TRUE),
            Ge => bc_word_for(CR_LT, BO_COND_FALSE),
            Le => bc_word_for(CR_GT, BO_COND_FALSE),
            Gt => bc_word_for(CR_GT, BO_COND_TRUE),
            Ltu => bc_word_for(CR_LT, BO_COND_TRUE),
            Geu => bc_word_for(CR_LT, BO_COND_FALSE),
            Leu => bc_word_for(CR_GT, BO_COND_FALSE),
            Gtu => bc_word_for(CR_GT, BO_COND_TRUE),
        }
    }

    fn is_unsigned(self) -> bool {
        matches!(self, Cond::Ltu | Cond::Geu | Cond::Leu | Cond::Gtu)
    }

    fn is_equality(self) -> bool {
        matches!(self, Cond::Eq | Cond::Ne)
    }

    fn negate(self) -> Cond {
        use Cond::*;
        match self {
            Eq => Ne,
            Ne => Eq,
            Lt => Ge,
            Ge => Lt,
            Le => Gt,
            Gt => Le,
            Ltu => Geu,
            Geu => Ltu,
            Leu => Gtu,
            Gtu => Leu,
        }
    }
}

fn bc_word_for(cr_bit: u32, bo_sense: u32) -> u32 {
    BC | bi(7, cr_bit) | bo_sense
}

/// Either a register or a constant the caller has already proven fits
/// somewhere in the compare's immediate field (the exact width depends on
/// `cond` and is re-checked here, same as the reference implementation).
#[derive(Debug, Clone, Copy)]
pub enum CmpArg {
    Reg(Reg),
    Const(i32),
}

/// Emit the compare instruction for one `brcond`, choosing among
/// `cmpi`/`cmpli`/`cmp`/`cmpl` by comparison kind and whether the second
/// operand is a constant that fits that opcode's 16-bit immediate field.
fn emit_compare(buf: &mut CodeBuffer, cond: Cond, a: Reg, b: CmpArg) -> Result<(), CodegenError> {
    const FIELD: u32 = 7;
    match b {
        CmpArg::Const(v) => {
            if cond.is_equality() {
                if v == v as i16 as i32 {
                    buf.put32(compare_imm(CMPI, FIELD, a, v as u16))?;
                    return Ok(());
                } else if v == v as u16 as i32 {
                    buf.put32(compare_imm(CMPLI, FIELD, a, v as u16))?;
                    return Ok(());
                }
            } else if !cond.is_unsigned() {
                if v == v as i16 as i32 {
                    buf.put32(compare_imm(CMPI, FIELD, a, v as u16))?;
                    return Ok(());
                }
            } else if v == v as u16 as i32 {
                buf.put32(compare_imm(CMPLI, FIELD, a, v as u16))?;
                return Ok(());
            }
            // Doesn't fit either immediate form: materialize into the
            // scratch register and fall back to the register compare.
            crate::emit::movi(buf, crate::reg::SCRATCH, v)?;
            let op = if cond.is_equality() || cond.is_unsigned() { CMPL } else { CMP };
            buf.put32(compare(op, FIELD, a, crate::reg::SCRATCH))?;
            Ok(())
        }
        CmpArg::Reg(r) => {
            let op = if cond.is_equality() || cond.is_unsigned() { CMPL } else { CMP };
            buf.put32(compare(op, FIELD, a, r))?;
            Ok(())
        }
    }
}

/// Lower a 32-bit conditional branch to a not-yet-resolved label, returning
/// the pending `REL14` relocation the caller patches once the label's
/// target offset is known.
pub fn brcond(
    buf: &mut CodeBuffer,
    cond: Cond,
    a: Reg,
    b: CmpArg,
) -> Result<PendingReloc, CodegenError> {
    emit_compare(buf, cond, a, b)?;
    let site = buf.put32(cond.bc_word())?;
    Ok(PendingReloc { site, kind: RelocKind::Rel14 })
}

/// Lower a 64-bit (double-word) conditional branch, expressed as a chain of
/// 32-bit compares against the low and high halves. Structurally taken from
/// the reference implementation's note that this logic is shared with the
/// i386 backend "to avoid having to handle cross basic block temporaries":
/// it emits up to three `brcond`s, at most two of which target the
/// caller's real branch target (returned as pending relocations — the
/// overall op can require two patches to the *same* label, since either the
/// high-half or the low-half compare alone can decide it), plus a single
/// local `next` label used only to skip the low-half compare when the
/// high-half already proved the branch is not taken. `next` is resolved
/// entirely within this call.
pub fn brcond2(
    buf: &mut CodeBuffer,
    cond: Cond,
    a_lo: Reg,
    a_hi: Reg,
    b_lo: CmpArg,
    b_hi: CmpArg,
) -> Result<Vec<PendingReloc>, CodegenError> {
    // At most two of the up-to-three branches emitted below ever escape to
    // the caller's label; `SmallVec` avoids a heap allocation for that
    // common case and only spills if a future comparison kind needs more.
    let mut pending: SmallVec<[PendingReloc; 2]> = SmallVec::new();
    match cond {
        Cond::Eq => {
            let skip = brcond(buf, Cond::Ne, a_hi, b_hi)?;
            let taken = brcond(buf, Cond::Eq, a_lo, b_lo)?;
            let next = buf.offset();
            patch_reloc(buf, skip.site, skip.kind, next, 0)?;
            pending.push(taken);
        }
        Cond::Ne => {
            pending.push(brcond(buf, Cond::Ne, a_hi, b_hi)?);
            pending.push(brcond(buf, Cond::Ne, a_lo, b_lo)?);
        }
        _ => {
            let hi_cond = if cond.is_unsigned() {
                strict_unsigned(cond)
            } else {
                strict_signed(cond)
            };
            pending.push(brcond(buf, hi_cond, a_hi, b_hi)?);
            let skip = brcond(buf, Cond::Ne, a_hi, b_hi)?;
            pending.push(brcond(buf, cond, a_lo, b_lo)?);
            let next = buf.offset();
            patch_reloc(buf, skip.site, skip.kind, next, 0)?;
        }
    }
    Ok(pending.into_vec())
}

fn strict_signed(cond: Cond) -> Cond {
    match cond {
        Cond::Le => Cond::Lt,
        Cond::Ge => Cond::Gt,
        c => c,
    }
}

fn strict_unsigned(cond: Cond) -> Cond {
    match cond {
        Cond::Leu => Cond::Ltu,
        Cond::Geu => Cond::Gtu,
        c => c,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reg::*;

    #[test]
    fn brcond_eq_with_small_const_uses_cmpi() {
        let mut mem = [0u8; 16];
        let mut buf = CodeBuffer::new(&mut mem);
        brcond(&mut buf, Cond::Eq, R5, CmpArg::Const(10)).unwrap();
        assert_eq!(buf.offset(), 8);
        assert_eq!(buf.word_at(0) & 0xfc00_0000, CMPI);
    }

    #[test]
    fn brcond_unsigned_with_const_uses_cmpli() {
        let mut mem = [0u8; 16];
        let mut buf = CodeBuffer::new(&mut mem);
        brcond(&mut buf, Cond::Ltu, R5, CmpArg::Const(10)).unwrap();
        assert_eq!(buf.word_at(0) & 0xfc00_0000, CMPLI);
    }

    #[test]
    fn brcond_signed_with_register_uses_cmp() {
        let mut mem = [0u8; 16];
        let mut buf = CodeBuffer::new(&mut mem);
        brcond(&mut buf, Cond::Lt, R5, CmpArg::Reg(R6)).unwrap();
        assert_eq!(buf.word_at(0), CMP | bf(7) | (5u32 << 16) | (6u32 << 11));
    }

    #[test]
    fn brcond2_eq_emits_two_compares_and_resolves_next_label() {
        let mut mem = [0u8; 64];
        let mut buf = CodeBuffer::new(&mut mem);
        let pending =
            brcond2(&mut buf, Cond::Eq, R3, R4, CmpArg::Reg(R5), CmpArg::Reg(R6)).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].kind, RelocKind::Rel14);
        assert!(buf.offset() >= 16);
    }

    #[test]
    fn brcond2_ne_returns_two_pending_relocations_to_the_same_target() {
        let mut mem = [0u8; 64];
        let mut buf = CodeBuffer::new(&mut mem);
        let pending =
            brcond2(&mut buf, Cond::Ne, R3, R4, CmpArg::Reg(R5), CmpArg::Reg(R6)).unwrap();
        assert_eq!(pending.len(), 2);
    }

    #[test]
    fn brcond2_lt_emits_three_branches() {
        let mut mem = [0u8; 64];
        let mut buf = CodeBuffer::new(&mut mem);
        let before = buf.offset();
        brcond2(&mut buf, Cond::Lt, R3, R4, CmpArg::Reg(R5), CmpArg::Reg(R6)).unwrap();
        // Three compare+branch pairs: 6 instructions, 24 bytes.
        assert_eq!(buf.offset() - before, 24);
    }
}
