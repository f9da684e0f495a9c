//! PPC32 general-purpose register identifiers and the fixed register sets
//! the ABI and constraint machinery reason about.
//!
//! There is a single register class: all 32 GPRs. Floating point and vector
//! registers are out of scope (see the crate-level Non-goals).

use core::fmt;

/// A PPC32 general-purpose register, `r0`..`r31`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Reg(u8);

impl Reg {
    /// Construct a register from its encoding `0..32`.
    ///
    /// # Panics
    /// Panics if `n >= 32`; the IR driver is expected to only ever produce
    /// register ids in range, so this is a programmer-error assertion, not a
    /// recoverable condition.
    pub const fn new(n: u8) -> Reg {
        assert!(n < 32);
        Reg(n)
    }

    /// The 5-bit hardware encoding used in RT/RA/RB/RS fields.
    pub const fn enc(self) -> u32 {
        self.0 as u32
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

macro_rules! regs {
    ($($name:ident = $n:expr),* $(,)?) => {
        $(pub const $name: Reg = Reg::new($n);)*
    };
}

regs! {
    R0 = 0, R1 = 1, R2 = 2, R3 = 3, R4 = 4, R5 = 5, R6 = 6, R7 = 7,
    R8 = 8, R9 = 9, R10 = 10, R11 = 11, R12 = 12, R13 = 13, R14 = 14,
    R15 = 15, R16 = 16, R17 = 17, R18 = 18, R19 = 19, R20 = 20, R21 = 21,
    R22 = 22, R23 = 23, R24 = 24, R25 = 25, R26 = 26, R27 = 27, R28 = 28,
    R29 = 29, R30 = 30, R31 = 31,
}

/// Scratch register used by every fast-path/slow-path sequence that needs to
/// materialize a temporary (address tags, TLB offsets, high halves of
/// immediates). The allocator never hands this register to an IR value.
pub const SCRATCH: Reg = R0;

/// Stack pointer, reserved by the ABI.
pub const SP: Reg = R1;

/// Reserved for the TOC in other ABIs; unused here but kept reserved so a
/// future PIC-aware extension has it available without renumbering.
pub const RESERVED_TOC: Reg = R2;

/// Registers the allocator may never hand out: scratch, stack pointer, and
/// the reserved TOC slot.
pub const RESERVED_REGS: [Reg; 3] = [R0, R1, R2];

/// Registers a callee must assume are clobbered across any `bl`.
pub const CALL_CLOBBERED_REGS: [Reg; 11] =
    [R0, R3, R4, R5, R6, R7, R8, R9, R10, R11, R12];

/// Registers a callee must preserve across a call.
///
/// `r24..=r27` are deliberately excluded: the reference implementation never
/// spills them in the prologue, so the allocator must not assume they
/// survive a call either.
pub const CALLEE_SAVED_REGS: [Reg; 15] = [
    R13, R14, R15, R16, R17, R18, R19, R20, R21, R22, R23, R28, R29, R30, R31,
];

/// Integer call-argument registers, in order.
pub const CALL_IARG_REGS: [Reg; 8] = [R3, R4, R5, R6, R7, R8, R9, R10];

/// Integer call-return registers: low half then high half of a 64-bit pair.
pub const CALL_OARG_REGS: [Reg; 2] = [R3, R4];

/// Number of call-argument registers available (the allocator queries this
/// rather than hard-coding 8).
pub fn iarg_count(_flags: u32) -> usize {
    CALL_IARG_REGS.len()
}

pub fn is_reserved(r: Reg) -> bool {
    RESERVED_REGS.contains(&r)
}
