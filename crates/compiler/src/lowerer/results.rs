//! Result/try lowering.
//!
//! A Result is a packed i64: the low 32 bits carry the error code, the
//! high 32 bits the success payload (zero when the Result has none).
//! `try(expr)` unpacks the value, yields the payload on success, and on a
//! non-zero error invokes the scope's `on_error` handler inline before
//! returning the error through the current function's own Result shape.

use crate::ast::{Expr, ExprKind};
use crate::lowerer::{IrLowerer, LocalInfo, LocalMap};
use crate::types::{BindingInfo, BindingKind, ValueKind};
use crate::validator::{ResultInfo, Validator};
use prism_core::IrOpcode;

/// 2^32: the shift between the error and payload halves, expressed as a
/// multiply/divide pair so both backends reuse existing opcodes.
const HALF_SHIFT: u64 = 4_294_967_296;

impl<'p> IrLowerer<'p> {
    pub(crate) fn emit_result_constructor(
        &mut self,
        expr: &Expr,
        locals: &LocalMap,
    ) -> Result<(), String> {
        match expr.name.as_str() {
            "ok" => {
                if expr.args.len() == 1 {
                    self.emit(IrOpcode::PushI32, 0);
                    return Ok(());
                }
                if expr.args.len() != 2 {
                    return Err("Result.ok accepts at most one argument".to_string());
                }
                let kind = self.infer_expr_kind(&expr.args[1], locals);
                if kind != ValueKind::Int32 && kind != ValueKind::Bool {
                    return Err(format!(
                        "{} only supports Result.ok with 32-bit values",
                        self.backend.tag()
                    ));
                }
                // payload << 32, error half zero.
                self.emit_expr(&expr.args[1], locals)?;
                self.emit(IrOpcode::ConvertI32ToI64, 0);
                self.emit(IrOpcode::PushI64, HALF_SHIFT);
                self.emit(IrOpcode::MulI64, 0);
                Ok(())
            }
            "error" => {
                if expr.args.len() != 2 {
                    return Err("Result.error requires an error code".to_string());
                }
                self.emit_expr(&expr.args[1], locals)?;
                self.emit(IrOpcode::ConvertI32ToI64, 0);
                Ok(())
            }
            other => Err(format!("unknown Result constructor: {}", other)),
        }
    }

    pub(crate) fn emit_try(&mut self, expr: &Expr, locals: &LocalMap) -> Result<(), String> {
        if expr.args.len() != 1 {
            return Err("try requires exactly one argument".to_string());
        }
        if self.current_on_error.is_none() {
            return Err("missing on_error for ? usage".to_string());
        }
        if !self.current_return_result.is_result {
            return Err("try requires Result return type".to_string());
        }
        let info = self.result_info_of_expr(&expr.args[0], locals);
        if !info.is_result {
            return Err("try requires Result argument".to_string());
        }

        self.emit_expr(&expr.args[0], locals)?;
        let result = self.alloc_temp_local();
        self.emit(IrOpcode::StoreLocal, u64::from(result));

        if info.has_value {
            // payload = result / 2^32; error = result - payload * 2^32.
            let payload = self.alloc_temp_local();
            let error = self.alloc_temp_local();
            self.emit(IrOpcode::LoadLocal, u64::from(result));
            self.emit(IrOpcode::PushI64, HALF_SHIFT);
            self.emit(IrOpcode::DivU64, 0);
            self.emit(IrOpcode::StoreLocal, u64::from(payload));
            self.emit(IrOpcode::LoadLocal, u64::from(result));
            self.emit(IrOpcode::LoadLocal, u64::from(payload));
            self.emit(IrOpcode::PushI64, HALF_SHIFT);
            self.emit(IrOpcode::MulI64, 0);
            self.emit(IrOpcode::SubI64, 0);
            self.emit(IrOpcode::StoreLocal, u64::from(error));

            self.emit(IrOpcode::LoadLocal, u64::from(error));
            self.emit(IrOpcode::PushI64, 0);
            self.emit(IrOpcode::CmpEqI64, 0);
            let jump_error = self.emit_jump(IrOpcode::JumpIfZero);
            self.emit(IrOpcode::LoadLocal, u64::from(payload));
            self.emit(IrOpcode::ConvertI64ToI32, 0);
            let jump_end = self.emit_jump(IrOpcode::Jump);

            self.patch_jump(jump_error);
            self.emit_on_error_return(error, locals)?;
            self.patch_jump(jump_end);
            return Ok(());
        }

        let error = self.alloc_temp_local();
        self.emit(IrOpcode::LoadLocal, u64::from(result));
        self.emit(IrOpcode::StoreLocal, u64::from(error));
        self.emit(IrOpcode::LoadLocal, u64::from(error));
        self.emit(IrOpcode::PushI64, 0);
        self.emit(IrOpcode::CmpEqI64, 0);
        let jump_error = self.emit_jump(IrOpcode::JumpIfZero);
        self.emit(IrOpcode::PushI32, 0);
        let jump_end = self.emit_jump(IrOpcode::Jump);
        self.patch_jump(jump_error);
        self.emit_on_error_return(error, locals)?;
        self.patch_jump(jump_end);
        Ok(())
    }

    /// Invoke the active on_error handler inline with the unpacked error
    /// code, then return the error through the current Result shape,
    /// closing still-open file scopes on the way out.
    fn emit_on_error_return(&mut self, error_local: u32, locals: &LocalMap) -> Result<(), String> {
        let handler = self
            .current_on_error
            .clone()
            .ok_or_else(|| "missing on_error for ? usage".to_string())?;
        let callee = self
            .definitions
            .get(handler.handler_path.as_str())
            .copied()
            .ok_or_else(|| format!("unknown on_error handler: {}", handler.handler_path))?;

        let error_name = format!("__on_error_err_{}", self.on_error_temp_counter);
        self.on_error_temp_counter += 1;
        let mut handler_locals = locals.clone();
        handler_locals.insert(
            error_name.clone(),
            LocalInfo::new(
                error_local,
                BindingInfo {
                    type_name: "i32".to_string(),
                    kind: BindingKind::Value,
                    value_kind: ValueKind::Int32,
                    ..BindingInfo::default()
                },
            ),
        );

        let mut call = Expr {
            kind: ExprKind::Call,
            name: callee.full_path.clone(),
            ..Expr::default()
        };
        call.args.push(Expr::name_ref(error_name));
        call.args.extend(handler.bound_args.iter().cloned());
        // The handler path is already absolute; strip to prefix + name.
        if let Some(slash) = callee.full_path.rfind('/') {
            call.name = callee.full_path[slash + 1..].to_string();
            let prefix = &callee.full_path[..slash];
            call.namespace_prefix = Some(if prefix.is_empty() {
                "/".to_string()
            } else {
                prefix.to_string()
            });
        }

        self.emit_inline_definition_call(&call, callee, &handler_locals, true)?;
        // The handler's value is not consumed by try.
        self.emit(IrOpcode::Pop, 0);

        let returns_payload = self.current_return_result.has_value;
        if let Some(context_index) = self.inline_contexts.len().checked_sub(1) {
            let return_local = self.inline_contexts[context_index].return_local;
            let scope_base = self.inline_contexts[context_index].scope_base;
            self.emit(IrOpcode::LoadLocal, u64::from(error_local));
            self.emit(IrOpcode::StoreLocal, u64::from(return_local));
            self.emit_file_scope_cleanup_from(scope_base);
            let jump = self.emit_jump(IrOpcode::Jump);
            self.inline_contexts[context_index].return_jumps.push(jump);
            return Ok(());
        }
        self.emit_file_scope_cleanup_all();
        self.emit(IrOpcode::LoadLocal, u64::from(error_local));
        if returns_payload {
            self.emit(IrOpcode::ReturnI64, 0);
        } else {
            self.emit(IrOpcode::ReturnI32, 0);
        }
        Ok(())
    }

    /// Result shape of an expression: calls inherit their callee's
    /// declared shape; constructors carry their own.
    pub(crate) fn result_info_of_expr(&self, expr: &Expr, locals: &LocalMap) -> ResultInfo {
        if self.is_result_constructor(expr) {
            return ResultInfo {
                is_result: true,
                has_value: expr.name == "ok" && expr.args.len() == 2,
            };
        }
        if expr.kind == ExprKind::Call {
            let callee = if expr.is_method_call {
                self.resolve_method_call_definition(expr, locals)
            } else {
                self.resolve_definition_call(expr)
            };
            if let Some(definition) = callee {
                return Validator::result_info(definition);
            }
        }
        ResultInfo::default()
    }
}
