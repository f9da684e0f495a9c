//! PPC32 instruction word encoding primitives.
//!
//! Every helper here builds up a 32-bit instruction word from an opcode and
//! a handful of bit-field values. None of them have side effects or know
//! about the code buffer; they just compute `u32`s, the way `put_r`/`put_i`
//! do for RISC-V R/I-type words.

use crate::reg::Reg;

/// Primary 6-bit opcode field, bits 0..5.
const fn opcd(op: u32) -> u32 {
    op << 26
}

/// Extended opcode under primary opcode 31 (the general X-form space).
const fn xo31(opc: u32) -> u32 {
    opcd(31) | (opc << 1)
}

/// Extended opcode under primary opcode 19 (branch/condition-register ops).
const fn xo19(opc: u32) -> u32 {
    opcd(19) | (opc << 1)
}

const fn rt(r: Reg) -> u32 {
    r.enc() << 21
}
const fn rs(r: Reg) -> u32 {
    r.enc() << 21
}
const fn ra(r: Reg) -> u32 {
    r.enc() << 16
}
const fn rb(r: Reg) -> u32 {
    r.enc() << 11
}
const fn sh(s: u32) -> u32 {
    (s & 0x1f) << 11
}
const fn mb(b: u32) -> u32 {
    (b & 0x1f) << 6
}
const fn me(e: u32) -> u32 {
    (e & 0x1f) << 1
}
const fn bo(o: u32) -> u32 {
    o << 21
}
const fn spr(a: u32, b: u32) -> u32 {
    (((a) << 5) | b) << 11
}

/// `BF(n)`: select condition-register field `n` as the target of a compare.
pub const fn bf(n: u32) -> u32 {
    n << 23
}
/// `BI(n, c)`: branch-condition bit, field `n` bit `c`.
pub const fn bi(n: u32, c: u32) -> u32 {
    (c + n * 4) << 16
}
const fn bt(n: u32, c: u32) -> u32 {
    (c + n * 4) << 21
}
const fn ba(n: u32, c: u32) -> u32 {
    (c + n * 4) << 16
}
const fn bb(n: u32, c: u32) -> u32 {
    (c + n * 4) << 11
}

/// Condition-register bit positions within a 4-bit CR field.
pub const CR_LT: u32 = 0;
pub const CR_GT: u32 = 1;
pub const CR_EQ: u32 = 2;

pub const BO_COND_TRUE: u32 = bo(12);
pub const BO_COND_FALSE: u32 = bo(4);
pub const BO_ALWAYS: u32 = bo(20);

/// Link-bit: set on `b`/`bcctr` to turn a branch into a call.
pub const LK: u32 = 1;

pub const LR_SPR: u32 = spr(8, 0);
pub const CTR_SPR: u32 = spr(9, 0);

pub const B: u32 = opcd(18);
pub const BC: u32 = opcd(16);
pub const LBZ: u32 = opcd(34);
pub const LHZ: u32 = opcd(40);
pub const LHA: u32 = opcd(42);
pub const LWZ: u32 = opcd(32);
pub const STB: u32 = opcd(38);
pub const STH: u32 = opcd(44);
pub const STW: u32 = opcd(36);
pub const LWZU: u32 = opcd(33);
pub const STWU: u32 = opcd(37);

pub const ADDI: u32 = opcd(14);
pub const ADDIS: u32 = opcd(15);
pub const ORI: u32 = opcd(24);
pub const ORIS: u32 = opcd(25);
pub const XORI: u32 = opcd(26);
pub const XORIS: u32 = opcd(27);
pub const ANDI: u32 = opcd(28);
pub const ANDIS: u32 = opcd(29);
pub const MULLI: u32 = opcd(7);
pub const CMPLI: u32 = opcd(10);
pub const CMPI: u32 = opcd(11);
pub const RLWINM: u32 = opcd(21);

pub const BCLR: u32 = xo19(16);
pub const BCCTR: u32 = xo19(528);
pub const CRAND: u32 = xo19(257);

pub const EXTSB: u32 = xo31(954);
pub const EXTSH: u32 = xo31(922);
pub const ADD: u32 = xo31(266);
pub const ADDE: u32 = xo31(138);
pub const ADDC: u32 = xo31(10);
pub const AND: u32 = xo31(28);
pub const SUBF: u32 = xo31(40);
pub const SUBFC: u32 = xo31(8);
pub const SUBFE: u32 = xo31(136);
pub const OR: u32 = xo31(444);
pub const XOR: u32 = xo31(316);
pub const MULLW: u32 = xo31(235);
pub const MULHWU: u32 = xo31(11);
pub const DIVW: u32 = xo31(491);
pub const DIVWU: u32 = xo31(459);
pub const CMP: u32 = xo31(0);
pub const CMPL: u32 = xo31(32);
pub const LHBRX: u32 = xo31(790);
pub const LWBRX: u32 = xo31(534);
pub const STHBRX: u32 = xo31(918);
pub const STWBRX: u32 = xo31(662);
pub const MFSPR: u32 = xo31(339);
pub const MTSPR: u32 = xo31(467);
pub const SRAWI: u32 = xo31(824);
pub const NEG: u32 = xo31(104);

pub const LBZX: u32 = xo31(87);
pub const LHZX: u32 = xo31(276);
pub const LHAX: u32 = xo31(343);
pub const LWZX: u32 = xo31(23);
pub const STBX: u32 = xo31(215);
pub const STHX: u32 = xo31(407);
pub const STWX: u32 = xo31(151);

pub const SLW: u32 = xo31(24);
pub const SRW: u32 = xo31(536);
pub const SRAW: u32 = xo31(792);

/// `mfspr rt, LR`.
pub fn mflr(rt_reg: Reg) -> u32 {
    MFSPR | rt(rt_reg) | LR_SPR
}
/// `mtspr LR, rs`.
pub fn mtlr(rs_reg: Reg) -> u32 {
    MTSPR | rs(rs_reg) | LR_SPR
}
/// `mtspr CTR, rs`.
pub fn mtctr(rs_reg: Reg) -> u32 {
    MTSPR | rs(rs_reg) | CTR_SPR
}

/// `op | RT(t) | RA(a) | RB(b)` — the common three-register word shape.
pub fn tab(op: u32, t: Reg, a: Reg, b: Reg) -> u32 {
    op | rt(t) | ra(a) | rb(b)
}
/// `op | RS(s) | RA(a) | RB(b)` — same shape, but the leading field is a
/// source (`RS`) rather than a destination (`RT`); numerically identical,
/// kept distinct for readability at call sites.
pub fn sab(op: u32, s: Reg, a: Reg, b: Reg) -> u32 {
    op | rs(s) | ra(a) | rb(b)
}

/// `D-form`: `op | RT(t) | RA(a) | (imm & 0xffff)`.
pub fn d_form(op: u32, t: Reg, a: Reg, imm16: u16) -> u32 {
    op | rt(t) | ra(a) | imm16 as u32
}
/// `D-form` with the leading field read as a source register.
pub fn d_form_s(op: u32, s: Reg, a: Reg, imm16: u16) -> u32 {
    op | rs(s) | ra(a) | imm16 as u32
}

pub fn rlwinm(t: Reg, s: Reg, shift: u32, mb_: u32, me_: u32) -> u32 {
    RLWINM | ra(t) | rs(s) | sh(shift) | mb(mb_) | me(me_)
}

/// `srawi rt, rs, shift` — arithmetic right shift by a constant.
pub fn srawi(t: Reg, s: Reg, shift: u32) -> u32 {
    SRAWI | ra(t) | rs(s) | sh(shift)
}

pub fn compare(op: u32, field: u32, a: Reg, b: Reg) -> u32 {
    op | bf(field) | ra(a) | rb(b)
}
pub fn compare_imm(op: u32, field: u32, a: Reg, imm16: u16) -> u32 {
    op | bf(field) | ra(a) | imm16 as u32
}

/// Builds the fixed branch-condition word for one of the ten `brcond`
/// comparison outcomes against condition-register field 7, bit `cr_bit`,
/// with polarity `bo_sense` (`BO_COND_TRUE`/`BO_COND_FALSE`).
pub fn bc_word(cr_bit: u32, bo_sense: u32) -> u32 {
    BC | bi(7, cr_bit) | bo_sense
}

/// `crand crD, crA, crB` combining the EQ bits of CR7 and CR6 (used by the
/// 64-bit guest-address TLB tag comparison).
pub fn crand_eq(dst_field: u32, a_field: u32, b_field: u32) -> u32 {
    CRAND | bt(dst_field, CR_EQ) | ba(a_field, CR_EQ) | bb(b_field, CR_EQ)
}
