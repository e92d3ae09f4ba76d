//! Prism core: the IR contract between the compiler and its backends.
//!
//! This crate holds everything both sides of the toolchain must agree on:
//!
//! - `ir`: the stack-machine instruction set, module/function records and
//!   print-flag packing
//! - `serialize`: the versioned `.psir` binary encoding
//!
//! The compiler produces `IrModule`s; the VM and the native backend
//! consume them. Nothing here depends on either side.

pub mod ir;
pub mod serialize;

pub use ir::{
    decode_print_flags, decode_print_payload, encode_print, IrFunction, IrInstruction, IrModule,
    IrOpcode, LOCAL_SLOT_BYTES, PRINT_FLAG_NEWLINE, PRINT_FLAG_STDERR,
};
pub use serialize::{deserialize_module, serialize_module, IR_MAGIC, IR_VERSION};
