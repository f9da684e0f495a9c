//! Top-level backend: the operation enum an IR driver lowers into, and the
//! single dispatch entry point (`Backend::emit_op`) that turns one IR
//! operation into PPC32 machine code.
//!
//! Register allocation, label management for cross-block branches, and
//! relocation bookkeeping beyond a single call all belong to the driver
//! embedding this backend — `emit_op` only ever appends to the buffer and
//! hands back whatever pending relocations the caller still needs to
//! resolve once it knows where its own labels land.

use crate::arith::Operand;
use crate::buffer::{CodeBuffer, CodeOffset};
use crate::control::{Cond, CmpArg};
use crate::error::CodegenError;
use crate::memaccess::{AccessSize, GuestLayout, LoadArgs, StoreArgs};
use crate::reg::Reg;
use crate::reloc::PendingReloc;
use crate::{abi, arith, control, emit, memaccess};

/// One IR operation this backend can lower, carrying its operands.
/// Variants mirror the reference implementation's `INDEX_op_*` opcodes,
/// minus the ones this crate's Non-goals exclude (floating point,
/// indirect-branch tables beyond `call`/`jmp`).
pub enum IrOp {
    Mov { d: Reg, s: Reg },
    Movi { d: Reg, v: i32 },
    Ld8u { d: Reg, base: Reg, off: i32 },
    Ld8s { d: Reg, base: Reg, off: i32 },
    Ld16u { d: Reg, base: Reg, off: i32 },
    Ld16s { d: Reg, base: Reg, off: i32 },
    Ld32 { d: Reg, base: Reg, off: i32 },
    St8 { s: Reg, base: Reg, off: i32 },
    St16 { s: Reg, base: Reg, off: i32 },
    St32 { s: Reg, base: Reg, off: i32 },
    Add { d: Reg, a: Reg, b: Operand },
    Sub { d: Reg, a: Reg, b: Operand },
    And { d: Reg, a: Reg, b: Operand },
    Or { d: Reg, a: Reg, b: Operand },
    Xor { d: Reg, a: Reg, b: Operand },
    Mul { d: Reg, a: Reg, b: Operand },
    MulU2 { d_lo: Reg, d_hi: Reg, a: Reg, b: Reg },
    Div2 { unsigned: bool, div_trampoline: CodeOffset, udiv_trampoline: CodeOffset },
    Shl { d: Reg, a: Reg, b: Operand },
    Shr { d: Reg, a: Reg, b: Operand },
    Sar { d: Reg, a: Reg, b: Operand },
    Add2 { d_lo: Reg, d_hi: Reg, a_lo: Reg, a_hi: Reg, b_lo: Reg, b_hi: Reg },
    Sub2 { d_lo: Reg, d_hi: Reg, a_lo: Reg, a_hi: Reg, b_lo: Reg, b_hi: Reg },
    Neg { d: Reg, a: Reg },
    BrCond { cond: Cond, a: Reg, b: CmpArg },
    BrCond2 { cond: Cond, a_lo: Reg, a_hi: Reg, b_lo: CmpArg, b_hi: CmpArg },
    Br { target: CodeOffset },
    Call { target: CodeOffset },
    CallIndirect { target: Reg },
    JmpIndirect { target: Reg },
    ExitTb { code: i32, tb_ret_addr: CodeOffset },
    GotoTb,
    QemuLd { args: LoadArgs, size: AccessSize },
    QemuSt { args: StoreArgs, size: AccessSize },
}

impl IrOp {
    /// Short name used for trace logging; matches the operation's field
    /// name in spirit with the reference implementation's `INDEX_op_*`
    /// labels without hard-coding a parallel enum just for display.
    fn name(&self) -> &'static str {
        use IrOp::*;
        match self {
            Mov { .. } => "mov",
            Movi { .. } => "movi",
            Ld8u { .. } => "ld8u",
            Ld8s { .. } => "ld8s",
            Ld16u { .. } => "ld16u",
            Ld16s { .. } => "ld16s",
            Ld32 { .. } => "ld32",
            St8 { .. } => "st8",
            St16 { .. } => "st16",
            St32 { .. } => "st32",
            Add { .. } => "add",
            Sub { .. } => "sub",
            And { .. } => "and",
            Or { .. } => "or",
            Xor { .. } => "xor",
            Mul { .. } => "mul",
            MulU2 { .. } => "mulu2",
            Div2 { .. } => "div2",
            Shl { .. } => "shl",
            Shr { .. } => "shr",
            Sar { .. } => "sar",
            Add2 { .. } => "add2",
            Sub2 { .. } => "sub2",
            Neg { .. } => "neg",
            BrCond { .. } => "brcond",
            BrCond2 { .. } => "brcond2",
            Br { .. } => "br",
            Call { .. } => "call",
            CallIndirect { .. } => "call_indirect",
            JmpIndirect { .. } => "jmp_indirect",
            ExitTb { .. } => "exit_tb",
            GotoTb => "goto_tb",
            QemuLd { .. } => "qemu_ld",
            QemuSt { .. } => "qemu_st",
        }
    }
}

/// What `emit_op` hands back for operations that can produce a relocation
/// the caller must resolve once its own label bookkeeping knows the
/// target — `br`/`call` against an as-yet-unplaced label, or `brcond`/
/// `brcond2` against a label within the same translation block.
pub enum EmitResult {
    None,
    One(PendingReloc),
    Many(Vec<PendingReloc>),
    GotoTbSlot(CodeOffset),
}

/// Ties the encoding, relocation, ABI, and memory-access modules together
/// behind one call per IR operation. Holds no state of its own beyond the
/// guest memory layout, since the code buffer, register assignments, and
/// label table all live with the caller.
pub struct Backend {
    pub guest: GuestLayout,
}

impl Backend {
    pub fn new(guest: GuestLayout) -> Backend {
        Backend { guest }
    }

    pub fn emit_prologue(&self, buf: &mut CodeBuffer, entry_reg: Reg) -> Result<CodeOffset, CodegenError> {
        abi::emit_prologue(buf, entry_reg)
    }

    pub fn emit_op(&self, buf: &mut CodeBuffer, op: IrOp) -> Result<EmitResult, CodegenError> {
        log::trace!("emit_op at offset {}: {}", buf.offset(), op.name());
        use IrOp::*;
        match op {
            Mov { d, s } => {
                emit::mov(buf, d, s)?;
                Ok(EmitResult::None)
            }
            Movi { d, v } => {
                emit::movi(buf, d, v)?;
                Ok(EmitResult::None)
            }
            Ld8u { d, base, off } => {
                emit::ld_st(buf, d, base, off, crate::encode::LBZ, crate::encode::LBZX)?;
                Ok(EmitResult::None)
            }
            Ld8s { d, base, off } => {
                emit::ld_st(buf, d, base, off, crate::encode::LBZ, crate::encode::LBZX)?;
                buf.put32(crate::encode::sab(crate::encode::EXTSB, d, d, crate::reg::R0))?;
                Ok(EmitResult::None)
            }
            Ld16u { d, base, off } => {
                emit::ld_st(buf, d, base, off, crate::encode::LHZ, crate::encode::LHZX)?;
                Ok(EmitResult::None)
            }
            Ld16s { d, base, off } => {
                emit::ld_st(buf, d, base, off, crate::encode::LHA, crate::encode::LHAX)?;
                Ok(EmitResult::None)
            }
            Ld32 { d, base, off } => {
                emit::emit_ld(buf, d, base, off)?;
                Ok(EmitResult::None)
            }
            St8 { s, base, off } => {
                emit::ld_st(buf, s, base, off, crate::encode::STB, crate::encode::STBX)?;
                Ok(EmitResult::None)
            }
            St16 { s, base, off } => {
                emit::ld_st(buf, s, base, off, crate::encode::STH, crate::encode::STHX)?;
                Ok(EmitResult::None)
            }
            St32 { s, base, off } => {
                emit::emit_st(buf, s, base, off)?;
                Ok(EmitResult::None)
            }
            Add { d, a, b } => {
                arith::add(buf, d, a, b)?;
                Ok(EmitResult::None)
            }
            Sub { d, a, b } => {
                arith::sub(buf, d, a, b)?;
                Ok(EmitResult::None)
            }
            And { d, a, b } => {
                arith::and(buf, d, a, b)?;
                Ok(EmitResult::None)
            }
            Or { d, a, b } => {
                arith::or(buf, d, a, b)?;
                Ok(EmitResult::None)
            }
            Xor { d, a, b } => {
                arith::xor(buf, d, a, b)?;
                Ok(EmitResult::None)
            }
            Mul { d, a, b } => {
                arith::mul(buf, d, a, b)?;
                Ok(EmitResult::None)
            }
            MulU2 { d_lo, d_hi, a, b } => {
                arith::mulu2(buf, d_lo, d_hi, a, b)?;
                Ok(EmitResult::None)
            }
            Div2 { unsigned, div_trampoline, udiv_trampoline } => {
                arith::div2(buf, unsigned, div_trampoline, udiv_trampoline)?;
                Ok(EmitResult::None)
            }
            Shl { d, a, b } => {
                arith::shl(buf, d, a, b)?;
                Ok(EmitResult::None)
            }
            Shr { d, a, b } => {
                arith::shr(buf, d, a, b)?;
                Ok(EmitResult::None)
            }
            Sar { d, a, b } => {
                arith::sar(buf, d, a, b)?;
                Ok(EmitResult::None)
            }
            Add2 { d_lo, d_hi, a_lo, a_hi, b_lo, b_hi } => {
                arith::add2(buf, d_lo, d_hi, a_lo, a_hi, b_lo, b_hi)?;
                Ok(EmitResult::None)
            }
            Sub2 { d_lo, d_hi, a_lo, a_hi, b_lo, b_hi } => {
                arith::sub2(buf, d_lo, d_hi, a_lo, a_hi, b_lo, b_hi)?;
                Ok(EmitResult::None)
            }
            Neg { d, a } => {
                arith::neg(buf, d, a)?;
                Ok(EmitResult::None)
            }
            BrCond { cond, a, b } => {
                let pending = control::brcond(buf, cond, a, b)?;
                Ok(EmitResult::One(pending))
            }
            BrCond2 { cond, a_lo, a_hi, b_lo, b_hi } => {
                let pending = control::brcond2(buf, cond, a_lo, a_hi, b_lo, b_hi)?;
                Ok(EmitResult::Many(pending))
            }
            Br { target } => {
                emit::b(buf, 0, target)?;
                Ok(EmitResult::None)
            }
            Call { target } => {
                emit::b(buf, crate::encode::LK, target)?;
                Ok(EmitResult::None)
            }
            CallIndirect { target } => {
                abi::call_indirect(buf, target)?;
                Ok(EmitResult::None)
            }
            JmpIndirect { target } => {
                abi::jmp_indirect(buf, target)?;
                Ok(EmitResult::None)
            }
            ExitTb { code, tb_ret_addr } => {
                abi::exit_tb(buf, code, tb_ret_addr)?;
                Ok(EmitResult::None)
            }
            GotoTb => {
                let slot = abi::goto_tb(buf)?;
                Ok(EmitResult::GotoTbSlot(slot))
            }
            QemuLd { args, size } => {
                memaccess::qemu_ld(buf, &args, size, &self.guest)?;
                Ok(EmitResult::None)
            }
            QemuSt { args, size } => {
                memaccess::qemu_st(buf, &args, size, &self.guest)?;
                Ok(EmitResult::None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reg::*;

    fn test_guest() -> GuestLayout {
        GuestLayout {
            page_bits: 12,
            tlb_entry_bits: 4,
            tlb_bits: 8,
            addr_read_offset: 0x100,
            addr_write_offset: 0x108,
            addend_minus_addr_read: 8,
            addend_minus_addr_write: 0,
            guest_addr_is_64: false,
            guest_little_endian: true,
            ld_helpers: [0, 0, 0, 0],
            st_helpers: [0, 0, 0, 0],
        }
    }

    #[test]
    fn emit_op_movi_then_add_produces_expected_words() {
        let backend = Backend::new(test_guest());
        let mut mem = [0u8; 16];
        let mut buf = CodeBuffer::new(&mut mem);
        backend.emit_op(&mut buf, IrOp::Movi { d: R5, v: 0x1234 }).unwrap();
        backend.emit_op(&mut buf, IrOp::Add { d: R3, a: R4, b: Operand::Const(100) }).unwrap();
        assert_eq!(buf.word_at(0), 0x38a0_1234);
        assert_eq!(buf.word_at(4), 0x3864_0064);
    }

    #[test]
    fn emit_op_brcond_returns_one_pending_reloc() {
        let backend = Backend::new(test_guest());
        let mut mem = [0u8; 16];
        let mut buf = CodeBuffer::new(&mut mem);
        let result = backend
            .emit_op(&mut buf, IrOp::BrCond { cond: Cond::Eq, a: R5, b: CmpArg::Reg(R6) })
            .unwrap();
        assert!(matches!(result, EmitResult::One(_)));
    }

    #[test]
    fn emit_op_goto_tb_reserves_a_patch_slot() {
        let backend = Backend::new(test_guest());
        let mut mem = [0u8; 16];
        let mut buf = CodeBuffer::new(&mut mem);
        let result = backend.emit_op(&mut buf, IrOp::GotoTb).unwrap();
        assert!(matches!(result, EmitResult::GotoTbSlot(0)));
        assert_eq!(buf.offset(), 16);
    }

    #[test]
    fn prologue_then_exit_tb_round_trips_through_landing_pad() {
        let backend = Backend::new(test_guest());
        let mut mem = [0u8; 256];
        let mut buf = CodeBuffer::new(&mut mem);
        let tb_ret_addr = backend.emit_prologue(&mut buf, R3).unwrap();
        backend
            .emit_op(&mut buf, IrOp::ExitTb { code: 0, tb_ret_addr })
            .unwrap();
        assert_eq!(buf.offset() % 4, 0);
    }
}
