//! File-handle lowering.
//!
//! `File<Read|Write|Append>("path")` opens a handle whose slot is
//! registered with the enclosing file scope; every exit path from that
//! scope closes still-open handles in LIFO order. Write chains
//! short-circuit: after the first non-zero error code, remaining writes
//! are skipped and the error is the chain's value.

use crate::ast::{Expr, ExprKind};
use crate::lowerer::{IrLowerer, LocalMap};
use crate::types::{BindingKind, ValueKind};
use prism_core::IrOpcode;

impl<'p> IrLowerer<'p> {
    pub(crate) fn emit_file_open(&mut self, expr: &Expr, locals: &LocalMap) -> Result<(), String> {
        if expr.template_args.len() != 1 {
            return Err("File requires exactly one template argument".to_string());
        }
        if expr.args.len() != 1 {
            return Err("File requires exactly one path argument".to_string());
        }
        let Some((string_index, _)) = self.resolve_string_target(&expr.args[0], locals) else {
            return Err(format!(
                "{} only supports File() with string literals or literal-backed bindings",
                self.backend.tag()
            ));
        };
        let op = match expr.template_args[0].as_str() {
            "Read" => IrOpcode::FileOpenRead,
            "Write" => IrOpcode::FileOpenWrite,
            "Append" => IrOpcode::FileOpenAppend,
            _ => return Err("File requires Read, Write, or Append mode".to_string()),
        };
        self.emit(op, u64::from(string_index));
        Ok(())
    }

    pub(crate) fn is_file_method_call(&self, expr: &Expr, locals: &LocalMap) -> bool {
        expr.is_method_call
            && expr
                .args
                .first()
                .filter(|receiver| receiver.kind == ExprKind::Name)
                .and_then(|receiver| locals.get(&receiver.name))
                .is_some_and(|local| local.info.kind == BindingKind::FileHandle)
    }

    pub(crate) fn emit_file_method(
        &mut self,
        expr: &Expr,
        locals: &LocalMap,
    ) -> Result<(), String> {
        let receiver = &expr.args[0];
        let handle = locals
            .get(&receiver.name)
            .map(|local| local.slot)
            .ok_or_else(|| format!("unknown identifier: {}", receiver.name))?;

        match expr.name.as_str() {
            "write" | "write_line" => self.emit_write_chain(expr, locals, handle),
            "write_byte" => {
                if expr.args.len() != 2 {
                    return Err("write_byte requires exactly one argument".to_string());
                }
                self.emit(IrOpcode::LoadLocal, u64::from(handle));
                self.emit_expr(&expr.args[1], locals)?;
                self.emit(IrOpcode::FileWriteByte, 0);
                Ok(())
            }
            "write_bytes" => self.emit_write_bytes(expr, locals, handle),
            "read_byte" => {
                self.emit(IrOpcode::LoadLocal, u64::from(handle));
                self.emit(IrOpcode::FileReadByte, 0);
                Ok(())
            }
            "flush" => {
                self.emit(IrOpcode::LoadLocal, u64::from(handle));
                self.emit(IrOpcode::FileFlush, 0);
                Ok(())
            }
            "close" => {
                self.emit(IrOpcode::LoadLocal, u64::from(handle));
                self.emit(IrOpcode::FileClose, 0);
                let error = self.alloc_temp_local();
                self.emit(IrOpcode::StoreLocal, u64::from(error));
                // Invalidate the slot so scope cleanup skips this handle.
                self.emit(IrOpcode::PushI64, (-1i64) as u64);
                self.emit(IrOpcode::StoreLocal, u64::from(handle));
                self.emit(IrOpcode::LoadLocal, u64::from(error));
                Ok(())
            }
            other => Err(format!("unknown file method: {}", other)),
        }
    }

    /// `.write(a, b, …)` / `.write_line(…)`: each step runs only while
    /// the accumulated error is still zero; the chain's value is the
    /// final error code.
    fn emit_write_chain(
        &mut self,
        expr: &Expr,
        locals: &LocalMap,
        handle: u32,
    ) -> Result<(), String> {
        let error = self.alloc_temp_local();
        self.emit(IrOpcode::PushI32, 0);
        self.emit(IrOpcode::StoreLocal, u64::from(error));

        for arg in &expr.args[1..] {
            self.emit(IrOpcode::LoadLocal, u64::from(error));
            self.emit(IrOpcode::PushI64, 0);
            self.emit(IrOpcode::CmpEqI64, 0);
            let jump_skip = self.emit_jump(IrOpcode::JumpIfZero);
            self.emit_write_step(arg, locals, handle, error)?;
            self.patch_jump(jump_skip);
        }

        if expr.name == "write_line" {
            self.emit(IrOpcode::LoadLocal, u64::from(error));
            self.emit(IrOpcode::PushI64, 0);
            self.emit(IrOpcode::CmpEqI64, 0);
            let jump_skip = self.emit_jump(IrOpcode::JumpIfZero);
            self.emit(IrOpcode::LoadLocal, u64::from(handle));
            self.emit(IrOpcode::FileWriteNewline, 0);
            self.emit(IrOpcode::StoreLocal, u64::from(error));
            self.patch_jump(jump_skip);
        }

        self.emit(IrOpcode::LoadLocal, u64::from(error));
        Ok(())
    }

    fn emit_write_step(
        &mut self,
        arg: &Expr,
        locals: &LocalMap,
        handle: u32,
        error: u32,
    ) -> Result<(), String> {
        if let Some((string_index, _)) = self.resolve_string_target(arg, locals) {
            self.emit(IrOpcode::LoadLocal, u64::from(handle));
            self.emit(IrOpcode::FileWriteString, u64::from(string_index));
            self.emit(IrOpcode::StoreLocal, u64::from(error));
            return Ok(());
        }
        let kind = self.infer_expr_kind(arg, locals);
        let op = match kind {
            ValueKind::Int32 | ValueKind::Bool => IrOpcode::FileWriteI32,
            ValueKind::Int64 => IrOpcode::FileWriteI64,
            ValueKind::UInt64 => IrOpcode::FileWriteU64,
            _ => {
                return Err("file write requires integer/bool or string arguments".to_string());
            }
        };
        self.emit(IrOpcode::LoadLocal, u64::from(handle));
        self.emit_expr(arg, locals)?;
        self.emit(op, 0);
        self.emit(IrOpcode::StoreLocal, u64::from(error));
        Ok(())
    }

    /// `.write_bytes(arr)`: walk the array's `[count, b0, b1, …]` header
    /// and write each element as a byte, stopping at the first error.
    fn emit_write_bytes(
        &mut self,
        expr: &Expr,
        locals: &LocalMap,
        handle: u32,
    ) -> Result<(), String> {
        if expr.args.len() != 2 {
            return Err("write_bytes requires exactly one argument".to_string());
        }
        let ptr = self.alloc_temp_local();
        self.emit_collection_base(&expr.args[1], locals)?;
        self.emit(IrOpcode::StoreLocal, u64::from(ptr));

        let count = self.alloc_temp_local();
        self.emit(IrOpcode::LoadLocal, u64::from(ptr));
        self.emit(IrOpcode::LoadIndirect, 0);
        self.emit(IrOpcode::StoreLocal, u64::from(count));

        let index = self.alloc_temp_local();
        self.emit(IrOpcode::PushI32, 0);
        self.emit(IrOpcode::StoreLocal, u64::from(index));

        let error = self.alloc_temp_local();
        self.emit(IrOpcode::PushI32, 0);
        self.emit(IrOpcode::StoreLocal, u64::from(error));

        let loop_start = self.here();
        self.emit(IrOpcode::LoadLocal, u64::from(error));
        self.emit(IrOpcode::PushI64, 0);
        self.emit(IrOpcode::CmpEqI64, 0);
        let jump_error = self.emit_jump(IrOpcode::JumpIfZero);
        self.emit(IrOpcode::LoadLocal, u64::from(index));
        self.emit(IrOpcode::LoadLocal, u64::from(count));
        self.emit(IrOpcode::CmpLtI32, 0);
        let jump_loop_end = self.emit_jump(IrOpcode::JumpIfZero);

        self.emit(IrOpcode::LoadLocal, u64::from(handle));
        self.emit(IrOpcode::LoadLocal, u64::from(ptr));
        self.emit(IrOpcode::LoadLocal, u64::from(index));
        self.emit(IrOpcode::PushI32, 1);
        self.emit(IrOpcode::AddI32, 0);
        self.emit(IrOpcode::PushI32, 16);
        self.emit(IrOpcode::MulI32, 0);
        self.emit(IrOpcode::AddI64, 0);
        self.emit(IrOpcode::LoadIndirect, 0);
        self.emit(IrOpcode::FileWriteByte, 0);
        self.emit(IrOpcode::StoreLocal, u64::from(error));

        self.emit(IrOpcode::LoadLocal, u64::from(index));
        self.emit(IrOpcode::PushI32, 1);
        self.emit(IrOpcode::AddI32, 0);
        self.emit(IrOpcode::StoreLocal, u64::from(index));
        self.emit(IrOpcode::Jump, loop_start as u64);

        self.patch_jump(jump_error);
        self.patch_jump(jump_loop_end);
        self.emit(IrOpcode::LoadLocal, u64::from(error));
        Ok(())
    }
}
