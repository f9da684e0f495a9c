//! Fatal-error type for the backend.
//!
//! Per the design, the only recoverable condition at the API boundary is a
//! genuinely fatal one: the translator has no way to emit partial code for a
//! translation block, so any error here means the whole block must be
//! discarded by the caller. There is no I/O and nothing is retried.

use core::fmt;

/// An unrecoverable condition encountered while lowering a translation
/// block. Every variant here corresponds to a `tcg_abort()` call site in the
/// reference implementation this backend is derived from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodegenError {
    /// A branch displacement did not fit the relocation kind's field width.
    BranchOutOfRange {
        kind: &'static str,
        disp: i64,
    },
    /// `emit_op` was asked to lower an opcode this backend does not support.
    UnsupportedOp(&'static str),
    /// `parse_constraint` saw a character outside the backend's constraint
    /// alphabet (`A`,`B`,`C`,`D`,`r`,`L`,`K`,`M`,`i`).
    UnknownConstraint(char),
    /// The caller-provided code buffer has no room for the next instruction.
    BufferFull,
}

impl fmt::Display for CodegenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodegenError::BranchOutOfRange { kind, disp } => {
                write!(f, "{kind} displacement {disp:#x} out of range")
            }
            CodegenError::UnsupportedOp(op) => write!(f, "unsupported IR opcode: {op}"),
            CodegenError::UnknownConstraint(c) => {
                write!(f, "unknown operand constraint character '{c}'")
            }
            CodegenError::BufferFull => write!(f, "code buffer exhausted"),
        }
    }
}

impl std::error::Error for CodegenError {}
