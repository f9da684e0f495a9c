//! Calling-convention glue: prologue/epilogue emission, `exit_tb`/`goto_tb`,
//! and the fixed register sets and op constraint table the IR driver
//! consults when allocating registers for each operation.
//!
//! The prologue here plays the same role a bog-standard function prologue
//! would in any compiled-to-native backend, except it's also the single
//! entry point every translated block re-enters through: it saves the
//! callee-saved registers once, jumps indirectly through `r3` to whichever
//! block the embedder first requests, and every subsequent `exit_tb` comes
//! back to the landing pad recorded here (`tb_ret_addr`) to tear the frame
//! back down.

use crate::buffer::{CodeBuffer, CodeOffset};
use crate::encode::*;
use crate::error::CodegenError;
use crate::reg::{Reg, CALLEE_SAVED_REGS};

/// Bytes reserved in every frame for the callee's outgoing call arguments
/// beyond what fits in registers; this backend never spills call arguments
/// to the stack (all 8 integer argument registers are always enough for
/// the helpers it calls), so this stays zero, matching a guest target built
/// with no additional static call-argument slots.
const STATIC_CALL_ARGS_SIZE: i32 = 0;

fn frame_size() -> i32 {
    let raw = 4 /* back chain */
        + 4 /* saved LR */
        + STATIC_CALL_ARGS_SIZE
        + (CALLEE_SAVED_REGS.len() as i32) * 4;
    (raw + 15) & !15
}

/// Emits the function prologue: save LR, push a frame, spill every
/// callee-saved register, then enter the first translation block by
/// branching indirectly through `entry_reg` (conventionally `r3`, the first
/// integer argument register, matching how the reference implementation's
/// embedder calls into generated code).
///
/// Returns the offset of the epilogue landing pad (`tb_ret_addr`) that
/// every `exit_tb` branches to.
pub fn emit_prologue(buf: &mut CodeBuffer, entry_reg: Reg) -> Result<CodeOffset, CodegenError> {
    let frame = frame_size();
    let sp = crate::reg::SP;

    buf.put32(mflr(crate::reg::R0))?;
    buf.put32(d_form_s(STWU, sp, sp, (-frame as i16) as u16))?;
    for (i, &r) in CALLEE_SAVED_REGS.iter().enumerate() {
        let off = (i as i32) * 4 + 8 + STATIC_CALL_ARGS_SIZE;
        buf.put32(d_form_s(STW, r, sp, off as u16))?;
    }
    buf.put32(d_form_s(STW, crate::reg::R0, sp, (frame - 4) as u16))?;

    buf.put32(mtctr(entry_reg))?;
    buf.put32(BCCTR | BO_ALWAYS)?;

    let tb_ret_addr = buf.offset();
    for (i, &r) in CALLEE_SAVED_REGS.iter().enumerate() {
        let off = (i as i32) * 4 + 8 + STATIC_CALL_ARGS_SIZE;
        buf.put32(d_form(LWZ, r, sp, off as u16))?;
    }
    buf.put32(d_form(LWZ, crate::reg::R0, sp, (frame - 4) as u16))?;
    buf.put32(mtlr(crate::reg::R0))?;
    buf.put32(d_form(ADDI, sp, sp, frame as u16))?;
    buf.put32(BCLR | BO_ALWAYS)?;

    Ok(tb_ret_addr)
}

/// `exit_tb code`: load the exit code into the return-value register and
/// branch to the epilogue landing pad.
pub fn exit_tb(
    buf: &mut CodeBuffer,
    code: i32,
    tb_ret_addr: CodeOffset,
) -> Result<(), CodegenError> {
    crate::emit::movi(buf, crate::reg::R3, code)?;
    crate::emit::b(buf, 0, tb_ret_addr)
}

/// `goto_tb slot`: reserve 16 bytes of room the outer runtime patches with
/// a direct jump once the destination block's address is known (or leaves
/// as a fallthrough to the interpreter loop if it never links). Matches
/// the reference implementation's direct-jump-patching convention, which
/// reserves a fixed-size slot rather than emitting a branch immediately
/// since the target isn't known at translation time.
pub fn goto_tb(buf: &mut CodeBuffer) -> Result<CodeOffset, CodegenError> {
    buf.reserve_patch_slot(16)
}

/// `call reg` (indirect call through a register already holding the target
/// address): moves it to LR and branches-and-links through it.
pub fn call_indirect(buf: &mut CodeBuffer, target: Reg) -> Result<(), CodegenError> {
    buf.put32(mtlr(target))?;
    buf.put32(BCLR | BO_ALWAYS | LK)?;
    Ok(())
}

/// `jmp reg` (indirect, non-linking tail jump through a register).
pub fn jmp_indirect(buf: &mut CodeBuffer, target: Reg) -> Result<(), CodegenError> {
    buf.put32(mtctr(target))?;
    buf.put32(BCCTR | BO_ALWAYS)?;
    Ok(())
}

/// One entry in the op-definitions table: the fixed constraint-letter
/// string for each operand slot of a given operation, in IR-operand order.
/// The IR driver's register allocator consults this the same way it would
/// consult any other target's table; see [`crate::constraints`] for how
/// the letters resolve to register sets.
pub struct OpDef {
    pub name: &'static str,
    pub constraints: &'static [&'static str],
}

/// The complete op-definitions table, grounded one-for-one on the
/// reference implementation's `ppc_op_defs[]`. Division's operand slots
/// are quotient, remainder, dividend-lo, dividend-hi, divisor — the
/// reference table pins the first three and the divisor absolutely
/// (`D`/`A`/`B`/`C`, i.e. `r6`/`r3`/`r4`/`r5`) and the dividend-hi slot via
/// the `"1"` match-constraint, a positional back-reference to slot 1
/// (the remainder, `A`/`r3`) rather than a register of its own — the
/// dividend pair and the remainder end up sharing a register, which is
/// exactly why the fast path's `subf` both consumes and overwrites it.
pub const OP_DEFS: &[OpDef] = &[
    OpDef { name: "exit_tb", constraints: &[] },
    OpDef { name: "goto_tb", constraints: &[] },
    OpDef { name: "call", constraints: &["ri"] },
    OpDef { name: "jmp", constraints: &["ri"] },
    OpDef { name: "br", constraints: &[] },
    OpDef { name: "mov_i32", constraints: &["r", "r"] },
    OpDef { name: "movi_i32", constraints: &["r"] },
    OpDef { name: "ld8u_i32", constraints: &["r", "r"] },
    OpDef { name: "ld8s_i32", constraints: &["r", "r"] },
    OpDef { name: "ld16u_i32", constraints: &["r", "r"] },
    OpDef { name: "ld16s_i32", constraints: &["r", "r"] },
    OpDef { name: "ld_i32", constraints: &["r", "r"] },
    OpDef { name: "st8_i32", constraints: &["r", "r"] },
    OpDef { name: "st16_i32", constraints: &["r", "r"] },
    OpDef { name: "st_i32", constraints: &["r", "r"] },
    OpDef { name: "add_i32", constraints: &["r", "r", "ri"] },
    OpDef { name: "sub_i32", constraints: &["r", "r", "ri"] },
    OpDef { name: "and_i32", constraints: &["r", "r", "ri"] },
    OpDef { name: "or_i32", constraints: &["r", "r", "ri"] },
    OpDef { name: "xor_i32", constraints: &["r", "r", "ri"] },
    OpDef { name: "mul_i32", constraints: &["r", "r", "ri"] },
    OpDef { name: "mulu2_i32", constraints: &["r", "r", "r", "r"] },
    OpDef { name: "div2_i32", constraints: &["D", "A", "B", "1", "C"] },
    OpDef { name: "divu2_i32", constraints: &["D", "A", "B", "1", "C"] },
    OpDef { name: "shl_i32", constraints: &["r", "r", "ri"] },
    OpDef { name: "shr_i32", constraints: &["r", "r", "ri"] },
    OpDef { name: "sar_i32", constraints: &["r", "r", "ri"] },
    OpDef { name: "add2_i32", constraints: &["r", "r", "r", "r", "r", "r"] },
    OpDef { name: "sub2_i32", constraints: &["r", "r", "r", "r", "r", "r"] },
    OpDef { name: "brcond_i32", constraints: &["r", "ri"] },
    OpDef { name: "brcond2_i32", constraints: &["r", "r", "ri", "ri"] },
    OpDef { name: "neg_i32", constraints: &["r", "r"] },
    OpDef { name: "qemu_ld8u", constraints: &["L", "L"] },
    OpDef { name: "qemu_ld8s", constraints: &["L", "L"] },
    OpDef { name: "qemu_ld16u", constraints: &["L", "L"] },
    OpDef { name: "qemu_ld16s", constraints: &["L", "L"] },
    OpDef { name: "qemu_ld32u", constraints: &["L", "L"] },
    OpDef { name: "qemu_ld64", constraints: &["L", "L", "L"] },
    OpDef { name: "qemu_st8", constraints: &["K", "K"] },
    OpDef { name: "qemu_st16", constraints: &["K", "K"] },
    OpDef { name: "qemu_st32", constraints: &["K", "K"] },
    OpDef { name: "qemu_st64", constraints: &["M", "M", "M"] },
];

pub fn op_def(name: &str) -> Option<&'static OpDef> {
    OP_DEFS.iter().find(|d| d.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reg::R3;

    #[test]
    fn frame_size_is_16_byte_aligned() {
        assert_eq!(frame_size() % 16, 0);
    }

    #[test]
    fn prologue_spills_every_callee_saved_register_and_returns_landing_pad() {
        let mut mem = [0u8; 256];
        let mut buf = CodeBuffer::new(&mut mem);
        let tb_ret_addr = emit_prologue(&mut buf, R3).unwrap();
        assert!(tb_ret_addr > 0);
        assert!(tb_ret_addr < buf.offset());
    }

    #[test]
    fn goto_tb_reserves_16_bytes() {
        let mut mem = [0u8; 16];
        let mut buf = CodeBuffer::new(&mut mem);
        let site = goto_tb(&mut buf).unwrap();
        assert_eq!(site, 0);
        assert_eq!(buf.offset(), 16);
    }

    #[test]
    fn op_defs_cover_every_named_operation() {
        assert!(op_def("div2_i32").is_some());
        assert!(op_def("qemu_st64").is_some());
        assert!(op_def("not_a_real_op").is_none());
    }
}
