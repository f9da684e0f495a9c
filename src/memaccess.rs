//! Guest memory access lowering: `qemu_ld`/`qemu_st`.
//!
//! This is the one part of the backend that talks to the guest CPU's
//! software TLB rather than just shuffling host registers. The layout of
//! that TLB (page size, entry stride, the CPU-state offsets of its fields)
//! is guest-specific, so it is threaded through as [`GuestLayout`] rather
//! than hard-coded — the guest-CPU crate that embeds this backend builds one
//! from its own `CPUTLBEntry`/`CPUState` definitions.
//!
//! The fast path reduces a guest virtual address to a TLB index, loads the
//! matching way's cached tag, and compares it against the access's own tag
//! (page number plus, for narrower accesses, the low alignment bits folded
//! in via the same mask). A hit branches past the slow path directly to the
//! load/store through `addend`-relocated host memory; a miss falls through
//! into a call to one of the guest CPU's `cpu_ld*`/`cpu_st*` helpers, which
//! know how to service an access that isn't resident (or isn't aligned, or
//! faults).
//!
//! Every emitted slow-path call returns through the fixed `r3`/`r3:r4`
//! convention like any other helper call (see [`crate::abi`]); routing the
//! result into the operation's actual data register(s) is what most of the
//! register-shuffle logic below is doing.

use crate::buffer::{CodeBuffer, CodeOffset};
use crate::encode::*;
use crate::error::CodegenError;
use crate::reg::Reg;
use crate::reloc::{patch_reloc, RelocKind};

/// Access width/signedness, independent of endianness — `bswap` is decided
/// separately from [`GuestLayout::guest_little_endian`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessSize {
    U8,
    S8,
    U16,
    S16,
    U32,
    U64,
}

impl AccessSize {
    /// `s_bits`: the reference implementation's `opc & 3` field, the log2 of
    /// the access width in bytes, used both to pick the TLB tag mask and to
    /// index the fixed `qemu_ld_helpers`/`qemu_st_helpers` table.
    fn s_bits(self) -> u32 {
        match self {
            AccessSize::U8 | AccessSize::S8 => 0,
            AccessSize::U16 | AccessSize::S16 => 1,
            AccessSize::U32 => 2,
            AccessSize::U64 => 3,
        }
    }

    fn is_signed(self) -> bool {
        matches!(self, AccessSize::S8 | AccessSize::S16)
    }
}

/// Guest-specific constants this lowering needs. Populated once by the
/// embedding guest-CPU crate from its own TLB and `CPUState` layout; nothing
/// in this module hard-codes a particular guest.
#[derive(Debug, Clone, Copy)]
pub struct GuestLayout {
    /// log2 of the guest page size.
    pub page_bits: u32,
    /// log2 of `sizeof(CPUTLBEntry)`.
    pub tlb_entry_bits: u32,
    /// log2 of the number of ways per TLB.
    pub tlb_bits: u32,
    /// Byte offset of `tlb_table[mem_index][0].addr_read` from the CPU
    /// state's base register (`r_env`).
    pub addr_read_offset: i32,
    /// Byte offset of `tlb_table[mem_index][0].addr_write` from `r_env`.
    pub addr_write_offset: i32,
    /// Byte offset of a `CPUTLBEntry.addend` relative to its `addr_read`,
    /// folded together with any platform `ADDEND_OFFSET` fixup the
    /// reference implementation applies for guest/host bitness mismatches.
    pub addend_minus_addr_read: i32,
    pub addend_minus_addr_write: i32,
    /// Whether guest addresses are 64 bits wide (adds the high-word compare
    /// and `crand`).
    pub guest_addr_is_64: bool,
    /// Whether the guest is little-endian on this (big-endian) host, so
    /// loads/stores must byte-swap through the `*BRX` instructions.
    pub guest_little_endian: bool,
    /// Code offsets of the four `cpu_ld{8,16,32,64}` runtime helpers,
    /// indexed by access-size class (`s_bits`). Populated by the embedding
    /// driver once the helper trampolines are placed.
    pub ld_helpers: [CodeOffset; 4],
    /// Code offsets of the four `cpu_st{8,16,32,64}` runtime helpers,
    /// indexed by access-size class.
    pub st_helpers: [CodeOffset; 4],
}

/// Register carrying the CPU state base pointer (`env`), fixed by the ABI
/// the same way `r_env` is fixed for every guest target using this backend.
pub const R_ENV: Reg = crate::reg::R31;

const HELPER_CALL_MASK: u32 = LK;

/// Registers holding an operation's data operand(s), address, and the
/// `mem_index` immediate selecting which of the guest's (possibly several)
/// TLBs to consult.
pub struct LoadArgs {
    pub data: Reg,
    pub data_hi: Option<Reg>,
    pub addr: Reg,
    pub addr_hi: Option<Reg>,
    pub mem_index: u32,
}

pub struct StoreArgs {
    pub data: Reg,
    pub data_hi: Option<Reg>,
    pub addr: Reg,
    pub addr_hi: Option<Reg>,
    pub mem_index: u32,
}

/// Emit the TLB-index/tag computation and comparison shared by loads and
/// stores, leaving a `bc` placeholder (returned as the function's result)
/// that the caller patches once it knows the fast path's start offset.
/// `tag_mb` differs between loads and stores only in whether it folds the
/// access's alignment mask in via `opc` or `s_bits` — both call sites pass
/// the same expression, kept as a parameter to avoid re-deriving it twice.
fn emit_tlb_compare(
    buf: &mut CodeBuffer,
    addr: Reg,
    addr_hi: Option<Reg>,
    tlb_slot_offset: i32,
    tag_mb: u32,
    layout: &GuestLayout,
) -> Result<CodeOffset, CodegenError> {
    let r0 = crate::reg::R3;
    let r1 = crate::reg::R4;
    let r2 = crate::reg::R0;

    // r0 = ((addr >> page_bits) & ((1<<tlb_bits)-1)) << tlb_entry_bits:
    // the TLB-way index, computed in one rotate-and-mask.
    buf.put32(rlwinm(
        r0,
        addr,
        32 - (layout.page_bits - layout.tlb_entry_bits),
        32 - (layout.tlb_bits + layout.tlb_entry_bits),
        31 - layout.tlb_entry_bits,
    ))?;
    buf.put32(tab(ADD, r0, r0, R_ENV))?;
    buf.put32(d_form(LWZU, r1, r0, tlb_slot_offset as u16))?;

    // r2 = addr masked down to the page-plus-alignment tag.
    buf.put32(rlwinm(r2, addr, 0, tag_mb & 31, 31 - layout.page_bits))?;
    buf.put32(compare(CMP, 7, r2, r1))?;

    if layout.guest_addr_is_64 {
        let hi = addr_hi.expect("64-bit guest address needs a high-word register");
        buf.put32(d_form(LWZ, r1, r0, 4))?;
        buf.put32(compare(CMP, 6, hi, r1))?;
        buf.put32(crand_eq(7, 6, 7))?;
    }

    buf.put32(bc_word(CR_EQ, BO_COND_TRUE))
}

/// Lower a `qemu_ld`. Returns the pending relocation for the slow path's
/// trailing unconditional branch back past the fast path, matching the
/// reference implementation's two-label structure (`label1` for the
/// fast-path entry, `label2` for the slow path's exit jump) except that
/// here the fast-path branch is patched inline (its target is always the
/// very next thing emitted) and only the slow-path exit needs to outlive
/// this call.
pub fn qemu_ld(
    buf: &mut CodeBuffer,
    args: &LoadArgs,
    size: AccessSize,
    layout: &GuestLayout,
) -> Result<(), CodegenError> {
    let s_bits = size.s_bits();
    let tag_mb = (32 - s_bits) & 31;
    let fast_branch_site =
        emit_tlb_compare(buf, args.addr, args.addr_hi, layout.addr_read_offset, tag_mb, layout)?;

    // Slow path: marshal (addr[, addr_hi], mem_index) into r3.. and call
    // the guest's load helper. A 64-bit guest address is split high-first:
    // the high word goes in r3, the low word in r4, matching the call
    // convention `route_call_result_pair` assumes on the way back out.
    let helper_mem_index_reg = if layout.guest_addr_is_64 {
        crate::emit::mov(buf, crate::reg::R3, args.addr_hi.unwrap())?;
        crate::emit::mov(buf, crate::reg::R4, args.addr)?;
        crate::reg::R5
    } else {
        crate::emit::mov(buf, crate::reg::R3, args.addr)?;
        crate::reg::R4
    };
    crate::emit::movi(buf, helper_mem_index_reg, args.mem_index as i32)?;
    crate::emit::b(buf, HELPER_CALL_MASK, layout.ld_helpers[size.s_bits() as usize])?;

    match size {
        AccessSize::S8 => {
            buf.put32(sab(EXTSB, crate::reg::R3, args.data, crate::reg::R0))?;
        }
        AccessSize::S16 => {
            buf.put32(sab(EXTSH, crate::reg::R3, args.data, crate::reg::R0))?;
        }
        AccessSize::U8 | AccessSize::U16 | AccessSize::U32 => {
            crate::emit::mov(buf, args.data, crate::reg::R3)?;
        }
        AccessSize::U64 => {
            let hi = args.data_hi.expect("u64 load needs a high-word data register");
            route_call_result_pair(buf, args.data, hi)?;
        }
    }
    let slow_exit_site = buf.put32(B)?;

    // Fast path entry.
    patch_reloc(buf, fast_branch_site, RelocKind::Rel14, buf.offset(), 0)?;
    let r0 = crate::reg::R3;
    buf.put32(d_form(
        LWZ,
        r0,
        r0,
        (layout.addend_minus_addr_read) as u16,
    ))?;
    buf.put32(tab(ADD, r0, r0, args.addr))?;

    let bswap = layout.guest_little_endian;
    match size {
        AccessSize::U8 | AccessSize::S8 => {
            buf.put32(d_form(LBZ, args.data, r0, 0))?;
            if size.is_signed() {
                buf.put32(sab(EXTSB, args.data, args.data, crate::reg::R0))?;
            }
        }
        AccessSize::U16 | AccessSize::S16 => {
            if bswap {
                buf.put32(tab(LHBRX, args.data, crate::reg::R0, r0))?;
                if size.is_signed() {
                    buf.put32(sab(EXTSH, args.data, args.data, crate::reg::R0))?;
                }
            } else if size.is_signed() {
                buf.put32(d_form(LHA, args.data, r0, 0))?;
            } else {
                buf.put32(d_form(LHZ, args.data, r0, 0))?;
            }
        }
        AccessSize::U32 => {
            if bswap {
                buf.put32(tab(LWBRX, args.data, crate::reg::R0, r0))?;
            } else {
                buf.put32(d_form(LWZ, args.data, r0, 0))?;
            }
        }
        AccessSize::U64 => {
            let hi = args.data_hi.unwrap();
            emit_u64_load(buf, args.data, hi, r0, bswap)?;
        }
    }

    patch_reloc(buf, slow_exit_site, RelocKind::Rel24, buf.offset(), 0)
}

/// Lower a `qemu_st`.
pub fn qemu_st(
    buf: &mut CodeBuffer,
    args: &StoreArgs,
    size: AccessSize,
    layout: &GuestLayout,
) -> Result<(), CodegenError> {
    let tag_mb = (32 - size.s_bits()) & 31;
    let fast_branch_site = emit_tlb_compare(
        buf,
        args.addr,
        args.addr_hi,
        layout.addr_write_offset,
        tag_mb,
        layout,
    )?;

    // Same high-word-first marshaling as `qemu_ld`'s slow path: high word
    // into r3, low word into r4, before the data/mem-index registers that
    // follow.
    let mut ir = if layout.guest_addr_is_64 {
        crate::emit::mov(buf, crate::reg::R3, args.addr_hi.unwrap())?;
        crate::emit::mov(buf, crate::reg::R4, args.addr)?;
        crate::reg::R5
    } else {
        crate::emit::mov(buf, crate::reg::R3, args.addr)?;
        crate::reg::R4
    };

    match size {
        AccessSize::U8 | AccessSize::S8 => {
            buf.put32(rlwinm(ir, args.data, 0, 24, 31))?;
        }
        AccessSize::U16 | AccessSize::S16 => {
            buf.put32(rlwinm(ir, args.data, 0, 16, 31))?;
        }
        AccessSize::U32 => {
            crate::emit::mov(buf, ir, args.data)?;
        }
        AccessSize::U64 => {
            // The reference implementation always stages the 64-bit pair
            // in r5:r6 regardless of where `ir` landed, leaving r4 unused.
            let hi = args.data_hi.expect("u64 store needs a high-word data register");
            crate::emit::mov(buf, crate::reg::R5, hi)?;
            crate::emit::mov(buf, crate::reg::R6, args.data)?;
            ir = crate::reg::R6;
        }
    }
    let mem_index_reg = Reg::new(ir.enc() as u8 + 1);
    crate::emit::movi(buf, mem_index_reg, args.mem_index as i32)?;
    crate::emit::b(buf, HELPER_CALL_MASK, layout.st_helpers[size.s_bits() as usize])?;
    let slow_exit_site = buf.put32(B)?;

    patch_reloc(buf, fast_branch_site, RelocKind::Rel14, buf.offset(), 0)?;
    let r0 = crate::reg::R3;
    buf.put32(d_form(
        LWZ,
        r0,
        r0,
        (layout.addend_minus_addr_write) as u16,
    ))?;
    buf.put32(tab(ADD, r0, r0, args.addr))?;

    let bswap = layout.guest_little_endian;
    match size {
        AccessSize::U8 | AccessSize::S8 => {
            buf.put32(d_form_s(STB, args.data, r0, 0))?;
        }
        AccessSize::U16 | AccessSize::S16 => {
            if bswap {
                buf.put32(sab(STHBRX, args.data, crate::reg::R0, r0))?;
            } else {
                buf.put32(d_form_s(STH, args.data, r0, 0))?;
            }
        }
        AccessSize::U32 => {
            if bswap {
                buf.put32(sab(STWBRX, args.data, crate::reg::R0, r0))?;
            } else {
                buf.put32(d_form_s(STW, args.data, r0, 0))?;
            }
        }
        AccessSize::U64 => {
            let hi = args.data_hi.unwrap();
            emit_u64_store(buf, args.data, hi, r0, bswap)?;
        }
    }

    patch_reloc(buf, slow_exit_site, RelocKind::Rel24, buf.offset(), 0)
}

/// Route a 64-bit helper call's `r3:r4` result pair into `(lo, hi)`,
/// swapping through `r0` when the destination registers alias the source
/// pair in a way a direct sequence of moves would clobber.
fn route_call_result_pair(buf: &mut CodeBuffer, lo: Reg, hi: Reg) -> Result<(), CodegenError> {
    let r3 = crate::reg::R3;
    let r4 = crate::reg::R4;
    if lo == r3 {
        if hi == r4 {
            crate::emit::mov(buf, crate::reg::R0, r4)?;
            crate::emit::mov(buf, r4, r3)?;
            crate::emit::mov(buf, r3, crate::reg::R0)?;
        } else {
            crate::emit::mov(buf, hi, r3)?;
            crate::emit::mov(buf, r3, r4)?;
        }
    } else {
        if lo != r4 {
            crate::emit::mov(buf, lo, r4)?;
        }
        if hi != r3 {
            crate::emit::mov(buf, hi, r3)?;
        }
    }
    Ok(())
}

fn emit_u64_load(
    buf: &mut CodeBuffer,
    lo: Reg,
    hi: Reg,
    r0: Reg,
    bswap: bool,
) -> Result<(), CodegenError> {
    if bswap {
        if r0 == lo {
            buf.put32(tab(LWBRX, crate::reg::R0, crate::reg::R0, r0))?;
            buf.put32(d_form(ADDI, r0, r0, 4))?;
            buf.put32(tab(LWBRX, hi, crate::reg::R0, r0))?;
            crate::emit::mov(buf, lo, crate::reg::R0)?;
        } else {
            buf.put32(tab(LWBRX, lo, crate::reg::R0, r0))?;
            buf.put32(d_form(ADDI, r0, r0, 4))?;
            buf.put32(tab(LWBRX, hi, crate::reg::R0, r0))?;
        }
    } else if r0 == hi {
        buf.put32(d_form(LWZ, crate::reg::R0, r0, 0))?;
        buf.put32(d_form(LWZ, lo, r0, 4))?;
        crate::emit::mov(buf, hi, crate::reg::R0)?;
    } else {
        buf.put32(d_form(LWZ, hi, r0, 0))?;
        buf.put32(d_form(LWZ, lo, r0, 4))?;
    }
    Ok(())
}

fn emit_u64_store(
    buf: &mut CodeBuffer,
    lo: Reg,
    hi: Reg,
    r0: Reg,
    bswap: bool,
) -> Result<(), CodegenError> {
    if bswap {
        let r1 = crate::reg::R4;
        buf.put32(d_form(ADDI, r1, r0, 4))?;
        buf.put32(sab(STWBRX, lo, crate::reg::R0, r0))?;
        buf.put32(sab(STWBRX, hi, crate::reg::R0, r1))?;
    } else {
        buf.put32(d_form_s(STW, hi, r0, 0))?;
        buf.put32(d_form_s(STW, lo, r0, 4))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reg::*;

    fn test_layout() -> GuestLayout {
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
    fn qemu_ld32u_emits_both_paths_and_balances_offsets() {
        let mut mem = [0u8; 256];
        let mut buf = CodeBuffer::new(&mut mem);
        let layout = test_layout();
        let args = LoadArgs { data: R5, data_hi: None, addr: R6, addr_hi: None, mem_index: 0 };
        qemu_ld(&mut buf, &args, AccessSize::U32, &layout).unwrap();
        assert!(buf.offset() > 0);
        assert_eq!(buf.offset() % 4, 0);
    }

    #[test]
    fn qemu_st32_emits_both_paths_and_balances_offsets() {
        let mut mem = [0u8; 256];
        let mut buf = CodeBuffer::new(&mut mem);
        let layout = test_layout();
        let args = StoreArgs { data: R5, data_hi: None, addr: R6, addr_hi: None, mem_index: 0 };
        qemu_st(&mut buf, &args, AccessSize::U32, &layout).unwrap();
        assert!(buf.offset() > 0);
        assert_eq!(buf.offset() % 4, 0);
    }

    #[test]
    fn qemu_ld64_with_aliasing_registers_does_not_panic() {
        let mut mem = [0u8; 256];
        let mut buf = CodeBuffer::new(&mut mem);
        let layout = test_layout();
        let args = LoadArgs { data: R3, data_hi: Some(R4), addr: R6, addr_hi: None, mem_index: 2 };
        qemu_ld(&mut buf, &args, AccessSize::U64, &layout).unwrap();
        assert_eq!(buf.offset() % 4, 0);
    }

    #[test]
    fn s_bits_matches_helper_table_index() {
        assert_eq!(AccessSize::U8.s_bits(), 0);
        assert_eq!(AccessSize::S8.s_bits(), 0);
        assert_eq!(AccessSize::U16.s_bits(), 1);
        assert_eq!(AccessSize::U32.s_bits(), 2);
        assert_eq!(AccessSize::U64.s_bits(), 3);
    }

    fn test_layout_64bit_guest() -> GuestLayout {
        GuestLayout { guest_addr_is_64: true, ..test_layout() }
    }

    /// With a 64-bit guest address the slow-path helper call must marshal
    /// the address high word into r3 and the low word into r4, in that
    /// order — the two instructions right after the fast-path tag compare
    /// (which for a 64-bit guest ends in 9 instructions: see
    /// `emit_tlb_compare`'s rlwinm/add/lwzu/rlwinm/cmp + the three extra
    /// high-word instructions + the trailing `bc`).
    #[test]
    fn qemu_ld64_guest_addr_stages_high_word_in_r3_then_low_word_in_r4() {
        let mut mem = [0u8; 256];
        let mut buf = CodeBuffer::new(&mut mem);
        let layout = test_layout_64bit_guest();
        let args = LoadArgs {
            data: R7,
            data_hi: None,
            addr: R6,
            addr_hi: Some(R5),
            mem_index: 0,
        };
        qemu_ld(&mut buf, &args, AccessSize::U32, &layout).unwrap();
        let marshal_start = 9 * 4;
        assert_eq!(
            buf.word_at(marshal_start),
            sab(OR, R5, crate::reg::R3, R5),
            "addr_hi must land in r3 first"
        );
        assert_eq!(
            buf.word_at(marshal_start + 4),
            sab(OR, R6, crate::reg::R4, R6),
            "addr (low word) must land in r4 second"
        );
    }

    #[test]
    fn qemu_st64_guest_addr_stages_high_word_in_r3_then_low_word_in_r4() {
        let mut mem = [0u8; 256];
        let mut buf = CodeBuffer::new(&mut mem);
        let layout = test_layout_64bit_guest();
        let args = StoreArgs {
            data: R7,
            data_hi: None,
            addr: R6,
            addr_hi: Some(R5),
            mem_index: 0,
        };
        qemu_st(&mut buf, &args, AccessSize::U32, &layout).unwrap();
        let marshal_start = 9 * 4;
        assert_eq!(
            buf.word_at(marshal_start),
            sab(OR, R5, crate::reg::R3, R5),
            "addr_hi must land in r3 first"
        );
        assert_eq!(
            buf.word_at(marshal_start + 4),
            sab(OR, R6, crate::reg::R4, R6),
            "addr (low word) must land in r4 second"
        );
    }
}
