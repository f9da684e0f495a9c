//! A PowerPC 32-bit host backend for a tiny, single-pass dynamic code
//! generator.
//!
//! This crate turns a small, already register-allocated intermediate
//! representation into PPC32 machine code, one operation at a time,
//! directly into a caller-owned buffer. It does not allocate registers,
//! manage cross-block labels, or know anything about the guest ISA being
//! emulated beyond the [`memaccess::GuestLayout`] the embedding guest-CPU
//! crate provides — all of that is the IR driver's job, the same
//! separation of concerns the reference `tcg-target.c` family of backends
//! is built around.
//!
//! Start at [`isa::Backend`]: construct one with a [`memaccess::GuestLayout`],
//! emit a prologue, then feed it [`isa::IrOp`] values one at a time.

pub mod abi;
pub mod arith;
pub mod buffer;
pub mod constraints;
pub mod control;
pub mod emit;
pub mod encode;
pub mod error;
pub mod isa;
pub mod memaccess;
pub mod reg;
pub mod reloc;

pub use buffer::{CodeBuffer, CodeOffset};
pub use error::CodegenError;
pub use isa::{Backend, EmitResult, IrOp};
pub use reg::Reg;
