//! Statement lowering: bindings, returns, control sugar, print calls.

use crate::ast::{Expr, ExprKind};
use crate::builtins::{collection_name, pathspace_effect, pointer_builtin_name, print_builtin};
use crate::lowerer::{IrLowerer, LocalInfo, LocalMap, OnErrorHandler};
use crate::types::{BindingInfo, BindingKind, ValueKind};
use crate::validator::parse_binding_info;
use prism_core::{encode_print, IrOpcode, PRINT_FLAG_NEWLINE, PRINT_FLAG_STDERR};

impl<'p> IrLowerer<'p> {
    /// Emit one statement, leaving the value stack balanced.
    pub(crate) fn emit_statement(
        &mut self,
        stmt: &Expr,
        locals: &mut LocalMap,
    ) -> Result<(), String> {
        if stmt.is_binding {
            return self.emit_binding(stmt, locals);
        }
        if stmt.kind != ExprKind::Call {
            // A bare name or literal in statement position evaluates and
            // discards.
            self.emit_expr(stmt, locals)?;
            self.emit(IrOpcode::Pop, 0);
            return Ok(());
        }

        if stmt.is_simple_call("return") {
            return self.emit_return(stmt, locals);
        }
        if stmt.is_simple_call("if") && stmt.args.len() == 3 {
            return self.emit_if_statement(stmt, locals);
        }
        if stmt.is_simple_call("repeat") {
            return self.emit_repeat(stmt, locals);
        }
        if stmt.is_simple_call("block") && stmt.args.is_empty() {
            self.push_file_scope();
            let mut body_locals = locals.clone();
            for body_stmt in &stmt.body_arguments {
                self.emit_statement(body_stmt, &mut body_locals)?;
            }
            let scope = self.file_scopes.last().cloned().unwrap_or_default();
            self.emit_file_scope_cleanup(&scope);
            self.pop_file_scope();
            return Ok(());
        }
        if stmt.is_simple_call("on_error") {
            let Some(handler) = stmt.args.first() else {
                return Err("on_error requires a handler".to_string());
            };
            let path = self
                .resolve_definition_call(handler)
                .map(|d| d.full_path.clone())
                .ok_or_else(|| format!("unknown on_error handler: {}", handler.name))?;
            self.current_on_error = Some(OnErrorHandler {
                handler_path: path,
                bound_args: stmt.args[1..].to_vec(),
            });
            return Ok(());
        }
        if let Some(print) = print_builtin(&stmt.name) {
            let mut flags = 0;
            if print.newline {
                flags |= PRINT_FLAG_NEWLINE;
            }
            if print.stderr {
                flags |= PRINT_FLAG_STDERR;
            }
            return self.emit_print(stmt, locals, flags);
        }
        if pathspace_effect(&stmt.name).is_some()
            && !stmt.is_method_call
            && stmt.namespace_prefix.is_none()
        {
            // Pathspace builtins are validated for effects and lowered as
            // no-ops; arguments still evaluate for their side effects.
            for arg in &stmt.args {
                self.emit_expr(arg, locals)?;
                self.emit(IrOpcode::Pop, 0);
            }
            return Ok(());
        }

        // Expression statement: evaluate and discard the value unless the
        // expression is inherently void-shaped.
        if self.expr_is_void(stmt, locals) {
            self.emit_void_call(stmt, locals)
        } else {
            self.emit_expr(stmt, locals)?;
            self.emit(IrOpcode::Pop, 0);
            Ok(())
        }
    }

    fn emit_binding(&mut self, stmt: &Expr, locals: &mut LocalMap) -> Result<(), String> {
        let (mut info, _) = parse_binding_info(&stmt.transforms, &self.struct_paths)?;
        let Some(initializer) = stmt.args.first() else {
            return Err("binding requires exactly one argument".to_string());
        };

        if info.type_name.is_empty() {
            self.infer_lowered_binding_type(initializer, locals, &mut info);
        }

        // Argv-backed string bindings store the argv index, not a string
        // table reference.
        if self.is_entry_args_access(initializer, locals) {
            info.kind = BindingKind::String;
            info.value_kind = ValueKind::String;
            info.is_entry_arg_string = true;
            self.emit_expr(&initializer.args[1], locals)?;
            let slot = self.alloc_temp_local();
            self.emit(IrOpcode::StoreLocal, u64::from(slot));
            locals.insert(stmt.name.clone(), LocalInfo::new(slot, info));
            return Ok(());
        }
        if initializer.kind == ExprKind::Name {
            if let Some(source) = locals.get(&initializer.name) {
                if source.info.is_entry_arg_string {
                    // Copying an argv-backed binding aliases the same
                    // argv slot.
                    let source_slot = source.slot;
                    let mut copied = source.info.clone();
                    copied.is_mutable = info.is_mutable;
                    let slot = self.alloc_temp_local();
                    self.emit(IrOpcode::LoadLocal, u64::from(source_slot));
                    self.emit(IrOpcode::StoreLocal, u64::from(slot));
                    locals.insert(stmt.name.clone(), LocalInfo::new(slot, copied));
                    return Ok(());
                }
            }
        }

        // String literals (and string bindings backed by literals) store
        // their string-table index.
        if info.kind == BindingKind::String || initializer.kind == ExprKind::StringLiteral {
            if let Some((index, length)) = self.resolve_string_target(initializer, locals) {
                info.kind = BindingKind::String;
                info.value_kind = ValueKind::String;
                let slot = self.alloc_temp_local();
                self.emit(IrOpcode::PushI32, u64::from(index));
                self.emit(IrOpcode::StoreLocal, u64::from(slot));
                locals.insert(
                    stmt.name.clone(),
                    LocalInfo {
                        slot,
                        info,
                        string_literal: Some((index, length)),
                    },
                );
                return Ok(());
            }
            return Err(self.unsupported("string bindings without literal backing"));
        }

        self.emit_expr(initializer, locals)?;
        let slot = self.alloc_temp_local();
        self.emit(IrOpcode::StoreLocal, u64::from(slot));
        if info.kind == BindingKind::FileHandle {
            self.register_file_handle(slot);
        }
        locals.insert(stmt.name.clone(), LocalInfo::new(slot, info));
        Ok(())
    }

    /// Lowerer-side binding type inference (the validator has already
    /// accepted the program; this only recovers shapes for addressing).
    fn infer_lowered_binding_type(
        &self,
        initializer: &Expr,
        locals: &LocalMap,
        info: &mut BindingInfo,
    ) {
        if let Some(collection) = collection_name(initializer) {
            match collection {
                "array" | "vector" => {
                    info.kind = if collection == "array" {
                        BindingKind::Array
                    } else {
                        BindingKind::Vector
                    };
                    info.type_name = collection.to_string();
                    info.template_arg = initializer.template_args.first().cloned();
                    info.value_kind = initializer
                        .template_args
                        .first()
                        .map(|t| ValueKind::from_type_name(t))
                        .unwrap_or(ValueKind::Unknown);
                }
                _ => {
                    info.kind = BindingKind::Map;
                    info.type_name = "map".to_string();
                    if initializer.template_args.len() == 2 {
                        info.map_key_kind =
                            ValueKind::from_type_name(&initializer.template_args[0]);
                        info.map_value_kind =
                            ValueKind::from_type_name(&initializer.template_args[1]);
                        info.value_kind = info.map_value_kind;
                    }
                }
            }
            return;
        }
        if initializer.is_simple_call("File") {
            info.kind = BindingKind::FileHandle;
            info.type_name = "File".to_string();
            info.value_kind = ValueKind::Int64;
            return;
        }
        if pointer_builtin_name(initializer) == Some("location") {
            info.kind = BindingKind::Reference;
            info.type_name = "Reference".to_string();
            if let Some(target) = initializer.args.first() {
                if let Some(local) = locals.get(&target.name) {
                    info.value_kind = local.info.value_kind;
                    info.reference_to_array = matches!(
                        local.info.kind,
                        BindingKind::Array | BindingKind::Vector
                    );
                }
            }
            return;
        }
        if pointer_builtin_name(initializer) == Some("address_of") {
            info.kind = BindingKind::Pointer;
            info.type_name = "Pointer".to_string();
            if let Some(target) = initializer.args.first() {
                if let Some(local) = locals.get(&target.name) {
                    info.value_kind = local.info.value_kind;
                }
            }
            return;
        }
        if initializer.kind == ExprKind::StringLiteral {
            info.kind = BindingKind::String;
            info.type_name = "string".to_string();
            info.value_kind = ValueKind::String;
            return;
        }
        if initializer.kind == ExprKind::Name {
            if let Some(local) = locals.get(&initializer.name) {
                let mutable = info.is_mutable;
                *info = local.info.clone();
                info.is_mutable = mutable;
                return;
            }
        }
        info.kind = BindingKind::Value;
        info.value_kind = self.infer_expr_kind(initializer, locals);
        info.type_name = match info.value_kind {
            ValueKind::Int32 => "i32",
            ValueKind::Int64 => "i64",
            ValueKind::UInt64 => "u64",
            ValueKind::Float32 => "f32",
            ValueKind::Float64 => "f64",
            ValueKind::Bool => "bool",
            ValueKind::String => "string",
            ValueKind::Unknown => "",
        }
        .to_string();
    }

    fn emit_return(&mut self, stmt: &Expr, locals: &mut LocalMap) -> Result<(), String> {
        if let Some(value) = stmt.args.first() {
            self.emit_expr(value, locals)?;
        }

        if let Some(context_index) = self.inline_contexts.len().checked_sub(1) {
            // Inside an inline: stash the value, close the inline's own
            // file scopes, jump to the join point.
            let return_local = self.inline_contexts[context_index].return_local;
            let scope_base = self.inline_contexts[context_index].scope_base;
            if stmt.args.is_empty() {
                self.emit(IrOpcode::PushI32, 0);
            }
            self.emit(IrOpcode::StoreLocal, u64::from(return_local));
            self.emit_file_scope_cleanup_from(scope_base);
            let jump = self.emit_jump(IrOpcode::Jump);
            self.inline_contexts[context_index].return_jumps.push(jump);
            return Ok(());
        }

        // Top-level return leaves the function: close every scope first.
        let value_kind = stmt
            .args
            .first()
            .map(|value| self.infer_expr_kind(value, locals))
            .unwrap_or(ValueKind::Unknown);
        if !self.file_scopes.iter().all(|s| s.is_empty()) {
            // The return value is already on the stack; spill it around
            // the cleanup so handle closes do not disturb it.
            let spill = self.alloc_temp_local();
            if !stmt.args.is_empty() {
                self.emit(IrOpcode::StoreLocal, u64::from(spill));
                self.emit_file_scope_cleanup_all();
                self.emit(IrOpcode::LoadLocal, u64::from(spill));
            } else {
                self.emit_file_scope_cleanup_all();
            }
        }
        match stmt.args.first() {
            None => {
                self.emit(IrOpcode::PushI32, 0);
                self.emit(IrOpcode::ReturnI32, 0);
            }
            Some(_) => {
                let op = match value_kind {
                    ValueKind::Int64 | ValueKind::UInt64 => IrOpcode::ReturnI64,
                    _ => IrOpcode::ReturnI32,
                };
                if self.current_return_result.is_result && self.current_return_result.has_value {
                    self.emit(IrOpcode::ReturnI64, 0);
                } else {
                    self.emit(op, 0);
                }
            }
        }
        Ok(())
    }

    fn emit_if_statement(&mut self, stmt: &Expr, locals: &mut LocalMap) -> Result<(), String> {
        self.emit_expr(&stmt.args[0], locals)?;
        let jump_else = self.emit_jump(IrOpcode::JumpIfZero);

        let mut then_locals = locals.clone();
        self.push_file_scope();
        for body_stmt in &stmt.args[1].body_arguments {
            self.emit_statement(body_stmt, &mut then_locals)?;
        }
        let scope = self.file_scopes.last().cloned().unwrap_or_default();
        self.emit_file_scope_cleanup(&scope);
        self.pop_file_scope();
        let jump_end = self.emit_jump(IrOpcode::Jump);

        self.patch_jump(jump_else);
        let mut else_locals = locals.clone();
        self.push_file_scope();
        for body_stmt in &stmt.args[2].body_arguments {
            self.emit_statement(body_stmt, &mut else_locals)?;
        }
        let scope = self.file_scopes.last().cloned().unwrap_or_default();
        self.emit_file_scope_cleanup(&scope);
        self.pop_file_scope();
        self.patch_jump(jump_end);
        Ok(())
    }

    fn emit_repeat(&mut self, stmt: &Expr, locals: &mut LocalMap) -> Result<(), String> {
        if stmt.args.len() != 1 {
            return Err("repeat requires exactly one count argument".to_string());
        }
        // Evaluate the count once; bools iterate zero or one time.
        let count_kind = self.infer_expr_kind(&stmt.args[0], locals);
        let count_local = self.alloc_temp_local();
        self.emit_expr(&stmt.args[0], locals)?;
        self.emit(IrOpcode::StoreLocal, u64::from(count_local));

        let index_local = self.alloc_temp_local();
        self.emit(IrOpcode::PushI32, 0);
        self.emit(IrOpcode::StoreLocal, u64::from(index_local));

        let cmp = match count_kind {
            ValueKind::Int64 => IrOpcode::CmpLtI64,
            ValueKind::UInt64 => IrOpcode::CmpLtU64,
            _ => IrOpcode::CmpLtI32,
        };
        let loop_start = self.here();
        self.emit(IrOpcode::LoadLocal, u64::from(index_local));
        self.emit(IrOpcode::LoadLocal, u64::from(count_local));
        self.emit(cmp, 0);
        let jump_end = self.emit_jump(IrOpcode::JumpIfZero);

        let mut body_locals = locals.clone();
        self.push_file_scope();
        for body_stmt in &stmt.body_arguments {
            self.emit_statement(body_stmt, &mut body_locals)?;
        }
        let scope = self.file_scopes.last().cloned().unwrap_or_default();
        self.emit_file_scope_cleanup(&scope);
        self.pop_file_scope();

        self.emit(IrOpcode::LoadLocal, u64::from(index_local));
        self.emit(IrOpcode::PushI32, 1);
        self.emit(IrOpcode::AddI32, 0);
        self.emit(IrOpcode::StoreLocal, u64::from(index_local));
        self.emit(IrOpcode::Jump, loop_start as u64);
        self.patch_jump(jump_end);
        Ok(())
    }

    /// Print statements. Each argument prints in sequence; the newline
    /// flag applies to the final one only.
    pub(crate) fn emit_print(
        &mut self,
        stmt: &Expr,
        locals: &mut LocalMap,
        flags: u64,
    ) -> Result<(), String> {
        let last = stmt.args.len().saturating_sub(1);
        for (index, arg) in stmt.args.iter().enumerate() {
            let arg_flags = if index == last {
                flags
            } else {
                flags & !PRINT_FLAG_NEWLINE
            };
            self.emit_print_value(arg, locals, arg_flags)?;
        }
        Ok(())
    }

    fn emit_print_value(
        &mut self,
        arg: &Expr,
        locals: &mut LocalMap,
        flags: u64,
    ) -> Result<(), String> {
        // Entry argument accesses print straight from argv.
        if self.is_entry_args_access(arg, locals) {
            let unsafe_access = arg.name == "at_unsafe";
            self.emit_expr(&arg.args[1], locals)?;
            let op = if unsafe_access {
                IrOpcode::PrintArgvUnsafe
            } else {
                IrOpcode::PrintArgv
            };
            self.emit(op, encode_print(0, flags));
            return Ok(());
        }
        if arg.kind == ExprKind::Name {
            if let Some(local) = locals.get(&arg.name) {
                if local.info.is_entry_arg_string {
                    let slot = local.slot;
                    self.emit(IrOpcode::LoadLocal, u64::from(slot));
                    self.emit(IrOpcode::PrintArgv, encode_print(0, flags));
                    return Ok(());
                }
            }
        }
        if let Some((index, _)) = self.resolve_string_target(arg, locals) {
            self.emit(IrOpcode::PrintString, encode_print(index, flags));
            return Ok(());
        }
        let kind = self.infer_expr_kind(arg, locals);
        let op = match kind {
            ValueKind::Int32 => IrOpcode::PrintI32,
            ValueKind::Int64 => IrOpcode::PrintI64,
            ValueKind::UInt64 => IrOpcode::PrintU64,
            ValueKind::Float32 => IrOpcode::PrintF32,
            ValueKind::Float64 => IrOpcode::PrintF64,
            ValueKind::Bool => IrOpcode::PrintBool,
            _ => return Err(self.unsupported("printing this value kind")),
        };
        self.emit_expr(arg, locals)?;
        self.emit(op, encode_print(0, flags));
        Ok(())
    }
}
