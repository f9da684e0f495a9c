//! Operand constraints: the little per-operand language the op-definitions
//! table in [`crate::abi`] uses to tell an external register allocator which
//! registers a given operand may land in.
//!
//! This backend does not allocate registers itself — the IR driver does,
//! consulting these constraints the same way it would for any other
//! architecture. What lives here is only the PPC-specific vocabulary:
//! parsing one constraint letter into a register set, and deciding whether a
//! constant operand satisfies a `TCG_CT_CONST`-style immediate constraint.

use crate::reg::Reg;

/// A parsed operand constraint: either a fixed/general register class or an
/// immediate that the caller has already proven fits (constant-folding
/// happens upstream; this layer only records that the slot accepts one).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constraint {
    /// Exactly one fixed register: `A`/`B`/`C`/`D` map to `r3`..`r6`, the
    /// pinned quintuple used by the 64-bit division trampolines.
    Fixed(Reg),
    /// Any of the 32 general-purpose registers.
    AnyGpr,
    /// Any GPR except `r3`/`r4`, the fixed qemu_ld/qemu_st helper-call
    /// return registers — used for qemu_ld's data operand so it is never
    /// clobbered while the slow path's call result is still live in them.
    LoadData,
    /// Any GPR except `r3`..`r5`, and `r6` too when the target's guest
    /// addresses are 64 bits (the mem-index argument then lands in `r6`
    /// instead of `r5`) — used for qemu_st's data operand for the same
    /// reason `LoadData` excludes the call-return pair.
    StoreData,
    /// Any GPR except `r3`..`r7`, used for qemu_st64's data-pair operand,
    /// which needs two consecutive free registers clear of every helper
    /// argument slot.
    StoreData64,
    /// A constant that the caller has already confirmed fits the
    /// instruction's immediate field.
    Const,
}

/// Parse a single constraint letter into a [`Constraint`], returning `None`
/// for an unrecognized letter (the op-definitions table is hand-written and
/// closed over this alphabet, so an unrecognized letter is always a bug in
/// that table).
pub fn parse(letter: char) -> Option<Constraint> {
    match letter {
        'A' => Some(Constraint::Fixed(Reg::new(3))),
        'B' => Some(Constraint::Fixed(Reg::new(4))),
        'C' => Some(Constraint::Fixed(Reg::new(5))),
        'D' => Some(Constraint::Fixed(Reg::new(6))),
        'r' => Some(Constraint::AnyGpr),
        'L' => Some(Constraint::LoadData),
        'K' => Some(Constraint::StoreData),
        'M' => Some(Constraint::StoreData64),
        'i' => Some(Constraint::Const),
        _ => None,
    }
}

/// Whether `r` is an acceptable register for an operand carrying
/// `constraint`. Always `false` for [`Constraint::Const`]; constants never
/// occupy a register slot.
///
/// `guest_addr_is_64` only affects [`Constraint::StoreData`]: qemu_st's
/// data operand must also avoid `r6` on a target whose guest addresses are
/// 64 bits, since the mem-index argument is pushed out to `r6` in that
/// layout (see [`crate::memaccess`]'s helper-call marshaling). Every other
/// constraint ignores the flag.
pub fn allows(constraint: Constraint, r: Reg, guest_addr_is_64: bool) -> bool {
    match constraint {
        Constraint::Fixed(fixed) => r == fixed,
        Constraint::AnyGpr => true,
        Constraint::LoadData => r.enc() != 3 && r.enc() != 4,
        Constraint::StoreData => {
            r.enc() != 3 && r.enc() != 4 && r.enc() != 5 && !(guest_addr_is_64 && r.enc() == 6)
        }
        Constraint::StoreData64 => !(3..=6).contains(&r.enc()),
        Constraint::Const => false,
    }
}

/// Whether an immediate operand satisfies a `ri`-style constraint (register
/// *or* immediate). Matches the reference implementation's
/// `tcg_target_const_match`, which unconditionally accepts any constant
/// presented to a slot marked `TCG_CT_CONST` — range-checking the value
/// against the instruction's actual immediate width happens later, inside
/// the emission helpers that pick between the immediate and register-materialized
/// forms of an op (see [`crate::emit::movi`], [`crate::arith`]).
pub fn const_match(_value: i64) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_letters_map_to_r3_through_r6() {
        assert_eq!(parse('A'), Some(Constraint::Fixed(Reg::new(3))));
        assert_eq!(parse('B'), Some(Constraint::Fixed(Reg::new(4))));
        assert_eq!(parse('C'), Some(Constraint::Fixed(Reg::new(5))));
        assert_eq!(parse('D'), Some(Constraint::Fixed(Reg::new(6))));
    }

    #[test]
    fn unknown_letter_is_rejected() {
        assert_eq!(parse('z'), None);
    }

    #[test]
    fn load_data_excludes_only_the_call_return_pair() {
        assert!(!allows(Constraint::LoadData, Reg::new(3), false));
        assert!(!allows(Constraint::LoadData, Reg::new(4), false));
        assert!(allows(Constraint::LoadData, Reg::new(5), false));
        assert!(allows(Constraint::LoadData, Reg::new(10), false));
    }

    #[test]
    fn store_data_excludes_r3_through_r5_regardless_of_guest_layout() {
        for enc in 3..=5u8 {
            assert!(!allows(Constraint::StoreData, Reg::new(enc), false));
            assert!(!allows(Constraint::StoreData, Reg::new(enc), true));
        }
        assert!(allows(Constraint::StoreData, Reg::new(6), false));
    }

    #[test]
    fn store_data_also_excludes_r6_when_guest_addr_is_64() {
        assert!(!allows(Constraint::StoreData, Reg::new(6), true));
        assert!(allows(Constraint::StoreData, Reg::new(7), true));
    }

    #[test]
    fn store_data64_excludes_every_helper_argument_slot() {
        for enc in 3..=6u8 {
            assert!(!allows(Constraint::StoreData64, Reg::new(enc), false));
        }
        assert!(allows(Constraint::StoreData64, Reg::new(7), false));
    }

    #[test]
    fn const_match_accepts_any_value() {
        assert!(const_match(0));
        assert!(const_match(i64::MAX));
        assert!(const_match(i64::MIN));
    }
}
