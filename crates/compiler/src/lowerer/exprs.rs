//! Expression lowering: every expression leaves exactly one value.

use crate::ast::{Expr, ExprKind};
use crate::builtins::{
    array_access_name, collection_name, is_math_builtin, is_math_constant, math_constant_value,
    pointer_builtin_name, print_builtin, vector_helper_name,
};
use crate::lowerer::{IrLowerer, LocalMap};
use crate::types::{BindingKind, ValueKind};
use prism_core::IrOpcode;

impl<'p> IrLowerer<'p> {
    pub(crate) fn emit_expr(&mut self, expr: &Expr, locals: &LocalMap) -> Result<(), String> {
        if expr.is_lambda {
            return Err(self.unsupported("lambdas"));
        }
        match expr.kind {
            ExprKind::Literal => {
                if expr.int_width == 64 || expr.is_unsigned {
                    self.emit(IrOpcode::PushI64, expr.int_value as u64);
                } else {
                    self.emit(IrOpcode::PushI32, expr.int_value as i32 as u32 as u64);
                }
                Ok(())
            }
            ExprKind::FloatLiteral => {
                let kind = if expr.float_is_single {
                    ValueKind::Float32
                } else {
                    ValueKind::Float64
                };
                self.push_float_const(expr.float_value, kind);
                Ok(())
            }
            ExprKind::BoolLiteral => {
                self.emit(IrOpcode::PushI32, u64::from(expr.bool_value));
                Ok(())
            }
            ExprKind::StringLiteral => Err(self.unsupported("string literals in value position")),
            ExprKind::Name => self.emit_name(expr, locals),
            ExprKind::Call => self.emit_call(expr, locals),
        }
    }

    fn emit_name(&mut self, expr: &Expr, locals: &LocalMap) -> Result<(), String> {
        if expr.namespace_prefix.is_none() {
            if let Some(local) = locals.get(&expr.name) {
                if local.info.is_entry_args {
                    return Err(self.unsupported("entry arguments outside count() and indexing"));
                }
                self.emit(IrOpcode::LoadLocal, u64::from(local.slot));
                // References read through to their target.
                if local.info.kind == BindingKind::Reference {
                    self.emit(IrOpcode::LoadIndirect, 0);
                }
                return Ok(());
            }
        }
        if is_math_constant(&expr.name) && self.math_reachable(expr, &expr.name) {
            let value = math_constant_value(&expr.name).unwrap_or_default();
            self.emit(IrOpcode::PushF64, value.to_bits());
            return Ok(());
        }
        Err(format!(
            "{} does not know identifier: {}",
            self.backend.tag(),
            expr.name
        ))
    }

    fn emit_call(&mut self, expr: &Expr, locals: &LocalMap) -> Result<(), String> {
        // Value envelopes: a bare brace group (or `block(){...}`) whose
        // final non-binding expression is the value.
        if expr.has_blocks() && (expr.name.is_empty() || expr.is_simple_call("block")) {
            return self.emit_envelope_value(expr, locals);
        }

        if expr.is_simple_call("if") && expr.args.len() == 3 {
            return self.emit_if_value(expr, locals);
        }
        if expr.is_simple_call("assign") {
            return self.emit_assign(expr, locals);
        }
        if expr.is_simple_call("try") {
            return self.emit_try(expr, locals);
        }
        if self.is_result_constructor(expr) {
            return self.emit_result_constructor(expr, locals);
        }
        if expr.is_simple_call("File") {
            return self.emit_file_open(expr, locals);
        }
        if self.is_file_method_call(expr, locals) {
            return self.emit_file_method(expr, locals);
        }
        if expr.is_simple_call("convert") {
            return self.emit_convert(expr, locals);
        }
        if let Some(helper) = pointer_builtin_name(expr) {
            return self.emit_pointer_builtin(expr, locals, helper);
        }
        if let Some(op) = operator_name(expr) {
            return self.emit_operator(expr, locals, op);
        }
        if let Some(print) = print_builtin(&expr.name) {
            return Err(format!(
                "{} is only supported as a statement in the {}",
                print.name,
                self.backend.tag()
            ));
        }

        // Collection queries and literals.
        if self.is_array_count_call(expr, locals) {
            return self.emit_array_count(expr, locals);
        }
        if self.is_vector_capacity_call(expr, locals) {
            return self.emit_vector_capacity(expr, locals);
        }
        if self.is_string_count_call(expr, locals) {
            return self.emit_string_count(expr, locals);
        }
        if let Some(access) = array_access_name(expr) {
            return self.emit_access(expr, locals, access);
        }
        if collection_name(expr).is_some() {
            return self.emit_collection_literal(expr, locals);
        }
        if let Some(helper) = vector_helper_name(expr) {
            if self.vector_helper_target(expr, locals) {
                return self.emit_vector_helper(expr, locals, helper);
            }
        }

        // Math builtins (gated names only; user definitions shadow them
        // under other prefixes).
        if is_math_builtin(&expr.name)
            && !expr.is_method_call
            && self.math_reachable(expr, &expr.name)
        {
            return self.emit_math_builtin(expr, locals);
        }

        // count()/capacity() that were not collection queries: two-phase
        // retry as a method call.
        if (expr.is_simple_call("count") || expr.is_simple_call("capacity"))
            && expr.args.len() == 1
        {
            let mut method = expr.clone();
            method.is_method_call = true;
            if let Some(callee) = self.resolve_method_call_definition(&method, locals) {
                if method.has_blocks() {
                    return Err(self.unsupported("block arguments on calls"));
                }
                return self.emit_inline_definition_call(&method, callee, locals, true);
            }
            return Err("count requires array, vector, map, or string target".to_string());
        }

        // User definitions: method resolution first for dot-calls, free
        // resolution otherwise.
        if expr.is_method_call {
            if let Some(callee) = self.resolve_method_call_definition(expr, locals) {
                if expr.has_blocks() {
                    return Err(self.unsupported("block arguments on calls"));
                }
                return self.emit_inline_definition_call(expr, callee, locals, true);
            }
        } else if let Some(callee) = self.resolve_definition_call(expr) {
            if expr.has_blocks() {
                return Err(self.unsupported("block arguments on calls"));
            }
            return self.emit_inline_definition_call(expr, callee, locals, true);
        }

        Err(format!(
            "{} does not know identifier: {}",
            self.backend.tag(),
            expr.name
        ))
    }

    /// Subscoped brace group producing its final expression's value.
    fn emit_envelope_value(&mut self, expr: &Expr, locals: &LocalMap) -> Result<(), String> {
        let Some(value_index) = expr
            .body_arguments
            .iter()
            .rposition(|stmt| !stmt.is_binding)
        else {
            return Err(self.unsupported("value envelopes without a value"));
        };
        self.push_file_scope();
        let mut body_locals = locals.clone();
        for (index, stmt) in expr.body_arguments.iter().enumerate() {
            if index == value_index {
                continue;
            }
            self.emit_statement(stmt, &mut body_locals)?;
        }
        self.emit_expr(&expr.body_arguments[value_index], &body_locals)?;
        let out = self.alloc_temp_local();
        self.emit(IrOpcode::StoreLocal, u64::from(out));
        let scope = self.file_scopes.last().cloned().unwrap_or_default();
        self.emit_file_scope_cleanup(&scope);
        self.pop_file_scope();
        self.emit(IrOpcode::LoadLocal, u64::from(out));
        Ok(())
    }

    fn emit_if_value(&mut self, expr: &Expr, locals: &LocalMap) -> Result<(), String> {
        let out = self.alloc_temp_local();
        self.emit_expr(&expr.args[0], locals)?;
        let jump_else = self.emit_jump(IrOpcode::JumpIfZero);

        self.emit_branch_value(&expr.args[1], locals, out)?;
        let jump_end = self.emit_jump(IrOpcode::Jump);
        self.patch_jump(jump_else);
        self.emit_branch_value(&expr.args[2], locals, out)?;
        self.patch_jump(jump_end);

        self.emit(IrOpcode::LoadLocal, u64::from(out));
        Ok(())
    }

    fn emit_branch_value(
        &mut self,
        branch: &Expr,
        locals: &LocalMap,
        out: u32,
    ) -> Result<(), String> {
        if branch.has_blocks() && branch.args.is_empty() {
            let Some(value_index) = branch
                .body_arguments
                .iter()
                .rposition(|stmt| !stmt.is_binding)
            else {
                return Err(self.unsupported("if branches without a value"));
            };
            self.push_file_scope();
            let mut body_locals = locals.clone();
            for (index, stmt) in branch.body_arguments.iter().enumerate() {
                if index == value_index {
                    continue;
                }
                self.emit_statement(stmt, &mut body_locals)?;
            }
            self.emit_expr(&branch.body_arguments[value_index], &body_locals)?;
            self.emit(IrOpcode::StoreLocal, u64::from(out));
            let scope = self.file_scopes.last().cloned().unwrap_or_default();
            self.emit_file_scope_cleanup(&scope);
            self.pop_file_scope();
            return Ok(());
        }
        self.emit_expr(branch, locals)?;
        self.emit(IrOpcode::StoreLocal, u64::from(out));
        Ok(())
    }

    fn emit_assign(&mut self, expr: &Expr, locals: &LocalMap) -> Result<(), String> {
        if expr.args.len() != 2 {
            return Err("assign requires a target and a value".to_string());
        }
        let target = &expr.args[0];
        let value = &expr.args[1];
        if target.kind == ExprKind::Name {
            let local = locals
                .get(&target.name)
                .ok_or_else(|| format!("unknown identifier: {}", target.name))?;
            let slot = local.slot;
            match local.info.kind {
                BindingKind::Reference => {
                    // Write through the stored address, then re-read for
                    // the expression value.
                    self.emit(IrOpcode::LoadLocal, u64::from(slot));
                    self.emit_expr(value, locals)?;
                    self.emit(IrOpcode::StoreIndirect, 0);
                    self.emit(IrOpcode::LoadLocal, u64::from(slot));
                    self.emit(IrOpcode::LoadIndirect, 0);
                }
                _ => {
                    self.emit_expr(value, locals)?;
                    self.emit(IrOpcode::StoreLocal, u64::from(slot));
                    self.emit(IrOpcode::LoadLocal, u64::from(slot));
                }
            }
            return Ok(());
        }
        if pointer_builtin_name(target) == Some("dereference") {
            self.emit_address_of(&target.args[0], locals)?;
            let addr = self.alloc_temp_local();
            self.emit(IrOpcode::StoreLocal, u64::from(addr));
            self.emit(IrOpcode::LoadLocal, u64::from(addr));
            self.emit_expr(value, locals)?;
            self.emit(IrOpcode::StoreIndirect, 0);
            self.emit(IrOpcode::LoadLocal, u64::from(addr));
            self.emit(IrOpcode::LoadIndirect, 0);
            return Ok(());
        }
        Err(self.unsupported("assignment targets of this shape"))
    }

    fn emit_pointer_builtin(
        &mut self,
        expr: &Expr,
        locals: &LocalMap,
        helper: &str,
    ) -> Result<(), String> {
        if expr.args.len() != 1 {
            return Err(format!("{} requires exactly one argument", helper));
        }
        match helper {
            "location" | "address_of" => {
                let target = &expr.args[0];
                let local = locals
                    .get(&target.name)
                    .ok_or_else(|| format!("{} requires a local binding", helper))?;
                match local.info.kind {
                    // location of a reference forwards the stored address.
                    BindingKind::Reference => {
                        self.emit(IrOpcode::LoadLocal, u64::from(local.slot));
                    }
                    // Collections already hold their base address.
                    BindingKind::Array | BindingKind::Vector | BindingKind::Map => {
                        self.emit(IrOpcode::LoadLocal, u64::from(local.slot));
                    }
                    _ => {
                        self.emit(IrOpcode::AddressOfLocal, u64::from(local.slot));
                    }
                }
                Ok(())
            }
            _ => {
                self.emit_address_of(&expr.args[0], locals)?;
                self.emit(IrOpcode::LoadIndirect, 0);
                Ok(())
            }
        }
    }

    /// Emit the address an lvalue-ish expression designates (for
    /// dereference and assignment-through-pointer).
    fn emit_address_of(&mut self, expr: &Expr, locals: &LocalMap) -> Result<(), String> {
        if expr.kind == ExprKind::Name {
            let local = locals
                .get(&expr.name)
                .ok_or_else(|| format!("unknown identifier: {}", expr.name))?;
            match local.info.kind {
                BindingKind::Pointer | BindingKind::Reference => {
                    self.emit(IrOpcode::LoadLocal, u64::from(local.slot));
                }
                _ => {
                    self.emit(IrOpcode::AddressOfLocal, u64::from(local.slot));
                }
            }
            return Ok(());
        }
        if pointer_builtin_name(expr).is_some() {
            let helper = pointer_builtin_name(expr).unwrap_or_default();
            return self.emit_pointer_builtin(expr, locals, helper);
        }
        // Pointer-valued expressions (pointer arithmetic results).
        self.emit_expr(expr, locals)
    }

    fn emit_operator(
        &mut self,
        expr: &Expr,
        locals: &LocalMap,
        op: &str,
    ) -> Result<(), String> {
        match op {
            "and" => {
                self.emit_expr(&expr.args[0], locals)?;
                let jump_false = self.emit_jump(IrOpcode::JumpIfZero);
                self.emit_expr(&expr.args[1], locals)?;
                let jump_end = self.emit_jump(IrOpcode::Jump);
                self.patch_jump(jump_false);
                self.emit(IrOpcode::PushI32, 0);
                self.patch_jump(jump_end);
                Ok(())
            }
            "or" => {
                self.emit_expr(&expr.args[0], locals)?;
                let jump_rhs = self.emit_jump(IrOpcode::JumpIfZero);
                self.emit(IrOpcode::PushI32, 1);
                let jump_end = self.emit_jump(IrOpcode::Jump);
                self.patch_jump(jump_rhs);
                self.emit_expr(&expr.args[1], locals)?;
                self.patch_jump(jump_end);
                Ok(())
            }
            "not" => {
                let kind = self.infer_expr_kind(&expr.args[0], locals);
                self.emit_expr(&expr.args[0], locals)?;
                if matches!(kind, ValueKind::Int64 | ValueKind::UInt64) {
                    self.emit(IrOpcode::PushI64, 0);
                    self.emit(IrOpcode::CmpEqI64, 0);
                } else {
                    self.emit(IrOpcode::PushI32, 0);
                    self.emit(IrOpcode::CmpEqI32, 0);
                }
                Ok(())
            }
            "negate" => {
                let kind = self.infer_expr_kind(&expr.args[0], locals);
                self.emit_expr(&expr.args[0], locals)?;
                let op = match kind {
                    ValueKind::Int64 => IrOpcode::NegI64,
                    ValueKind::Float32 => IrOpcode::NegF32,
                    ValueKind::Float64 => IrOpcode::NegF64,
                    _ => IrOpcode::NegI32,
                };
                self.emit(op, 0);
                Ok(())
            }
            _ => self.emit_binary_operator(expr, locals, op),
        }
    }

    fn emit_binary_operator(
        &mut self,
        expr: &Expr,
        locals: &LocalMap,
        op: &str,
    ) -> Result<(), String> {
        let left_kind = self.infer_expr_kind(&expr.args[0], locals);
        let right_kind = self.infer_expr_kind(&expr.args[1], locals);

        // Pointer arithmetic: pointer on the left, integer on the right,
        // scaled by the 16-byte slot stride.
        if self.expr_is_pointer(&expr.args[0], locals) && matches!(op, "plus" | "minus") {
            self.emit_expr(&expr.args[0], locals)?;
            self.emit_expr(&expr.args[1], locals)?;
            if right_kind == ValueKind::Int32 {
                self.emit(IrOpcode::ConvertI32ToI64, 0);
            }
            self.emit(IrOpcode::PushI64, 16);
            self.emit(IrOpcode::MulI64, 0);
            let op = if op == "plus" {
                IrOpcode::AddI64
            } else {
                IrOpcode::SubI64
            };
            self.emit(op, 0);
            return Ok(());
        }

        if left_kind == ValueKind::String || right_kind == ValueKind::String {
            return Err(self.unsupported("string comparisons"));
        }
        let combined = combine_value_kinds(left_kind, right_kind);
        if combined == ValueKind::Unknown {
            return Err(format!("{} requires numeric operands", op));
        }
        self.emit_expr(&expr.args[0], locals)?;
        self.emit_widen(left_kind, combined);
        self.emit_expr(&expr.args[1], locals)?;
        self.emit_widen(right_kind, combined);

        let opcode = match op {
            "plus" => arith_op(combined, IrOpcode::AddI32, IrOpcode::AddI64, IrOpcode::AddI64, IrOpcode::AddF32, IrOpcode::AddF64),
            "minus" => arith_op(combined, IrOpcode::SubI32, IrOpcode::SubI64, IrOpcode::SubI64, IrOpcode::SubF32, IrOpcode::SubF64),
            "multiply" => arith_op(combined, IrOpcode::MulI32, IrOpcode::MulI64, IrOpcode::MulI64, IrOpcode::MulF32, IrOpcode::MulF64),
            "divide" => arith_op(combined, IrOpcode::DivI32, IrOpcode::DivI64, IrOpcode::DivU64, IrOpcode::DivF32, IrOpcode::DivF64),
            "modulo" => match combined {
                ValueKind::Int32 => IrOpcode::RemI32,
                ValueKind::Int64 => IrOpcode::RemI64,
                ValueKind::UInt64 => IrOpcode::RemU64,
                _ => return Err("modulo requires integer operands".to_string()),
            },
            "equal" => cmp_op(combined, IrOpcode::CmpEqI32, IrOpcode::CmpEqI64, IrOpcode::CmpEqI64, IrOpcode::CmpEqF32, IrOpcode::CmpEqF64),
            "not_equal" => cmp_op(combined, IrOpcode::CmpNeI32, IrOpcode::CmpNeI64, IrOpcode::CmpNeI64, IrOpcode::CmpNeF32, IrOpcode::CmpNeF64),
            "less" => cmp_op(combined, IrOpcode::CmpLtI32, IrOpcode::CmpLtI64, IrOpcode::CmpLtU64, IrOpcode::CmpLtF32, IrOpcode::CmpLtF64),
            "less_equal" => cmp_op(combined, IrOpcode::CmpLeI32, IrOpcode::CmpLeI64, IrOpcode::CmpLeU64, IrOpcode::CmpLeF32, IrOpcode::CmpLeF64),
            "greater" => cmp_op(combined, IrOpcode::CmpGtI32, IrOpcode::CmpGtI64, IrOpcode::CmpGtU64, IrOpcode::CmpGtF32, IrOpcode::CmpGtF64),
            "greater_equal" => cmp_op(combined, IrOpcode::CmpGeI32, IrOpcode::CmpGeI64, IrOpcode::CmpGeU64, IrOpcode::CmpGeF32, IrOpcode::CmpGeF64),
            other => return Err(format!("unknown operator: {}", other)),
        };
        self.emit(opcode, 0);
        Ok(())
    }

    /// Widening conversion when an operand's kind is narrower than the
    /// combined operation kind.
    pub(crate) fn emit_widen(&mut self, from: ValueKind, to: ValueKind) {
        match (from, to) {
            (ValueKind::Int32, ValueKind::Int64) | (ValueKind::Int32, ValueKind::UInt64) => {
                self.emit(IrOpcode::ConvertI32ToI64, 0);
            }
            (ValueKind::Float32, ValueKind::Float64) => {
                self.emit(IrOpcode::ConvertF32ToF64, 0);
            }
            _ => {}
        }
    }

    fn emit_convert(&mut self, expr: &Expr, locals: &LocalMap) -> Result<(), String> {
        if expr.template_args.len() != 1 || expr.args.len() != 1 {
            return Err("convert requires exactly one template argument".to_string());
        }
        let target = expr.template_args[0].as_str();
        let source = self.infer_expr_kind(&expr.args[0], locals);
        self.emit_expr(&expr.args[0], locals)?;
        match (source, target) {
            (ValueKind::Int32, "bool") => {
                self.emit(IrOpcode::PushI32, 0);
                self.emit(IrOpcode::CmpNeI32, 0);
            }
            (ValueKind::Int64 | ValueKind::UInt64, "bool") => {
                self.emit(IrOpcode::PushI64, 0);
                self.emit(IrOpcode::CmpNeI64, 0);
            }
            (ValueKind::Bool, "i32" | "int") => {}
            (ValueKind::Int32, "i64") => self.emit(IrOpcode::ConvertI32ToI64, 0),
            (ValueKind::Int64, "i32" | "int") => self.emit(IrOpcode::ConvertI64ToI32, 0),
            (ValueKind::Float32, "f64" | "float") => self.emit(IrOpcode::ConvertF32ToF64, 0),
            (ValueKind::Float64, "f32") => self.emit(IrOpcode::ConvertF64ToF32, 0),
            (ValueKind::Float32, "i32" | "int") => self.emit(IrOpcode::ConvertF32ToI32, 0),
            (ValueKind::Float64, "i32" | "int") => {
                self.emit(IrOpcode::ConvertF64ToI64, 0);
                self.emit(IrOpcode::ConvertI64ToI32, 0);
            }
            (ValueKind::Float64, "i64") => self.emit(IrOpcode::ConvertF64ToI64, 0),
            (ValueKind::Float64, "u64") => self.emit(IrOpcode::ConvertF64ToU64, 0),
            (source, target) => {
                return Err(format!(
                    "unsupported convert: {} from {:?}",
                    target, source
                ));
            }
        }
        Ok(())
    }

    /// Void-call detection for statement position.
    pub(crate) fn expr_is_void(&self, expr: &Expr, locals: &LocalMap) -> bool {
        if expr.kind != ExprKind::Call || expr.is_binding {
            return false;
        }
        if vector_helper_name(expr).is_some() && self.vector_helper_target(expr, locals) {
            return matches!(expr.name.as_str(), "clear" | "remove_at" | "remove_swap");
        }
        let callee = if expr.is_method_call {
            self.resolve_method_call_definition(expr, locals)
        } else {
            self.resolve_definition_call(expr)
        };
        callee.is_some_and(|definition| {
            let declared = definition.declared_return_type();
            declared.is_none() || declared == Some("void")
        })
    }

    pub(crate) fn emit_void_call(
        &mut self,
        expr: &Expr,
        locals: &mut LocalMap,
    ) -> Result<(), String> {
        if vector_helper_name(expr).is_some() && self.vector_helper_target(expr, locals) {
            let helper = vector_helper_name(expr).unwrap_or_default();
            return self.emit_vector_helper(expr, locals, helper);
        }
        let callee = if expr.is_method_call {
            self.resolve_method_call_definition(expr, locals)
        } else {
            self.resolve_definition_call(expr)
        };
        match callee {
            Some(definition) => {
                self.emit_inline_definition_call(expr, definition, locals, false)
            }
            None => Err(format!(
                "{} does not know identifier: {}",
                self.backend.tag(),
                expr.name
            )),
        }
    }

    // ---- lowerer-side kind inference ------------------------------------

    pub(crate) fn infer_expr_kind(&self, expr: &Expr, locals: &LocalMap) -> ValueKind {
        match expr.kind {
            ExprKind::Literal => match (expr.int_width, expr.is_unsigned) {
                (_, true) => ValueKind::UInt64,
                (64, _) => ValueKind::Int64,
                _ => ValueKind::Int32,
            },
            ExprKind::FloatLiteral => {
                if expr.float_is_single {
                    ValueKind::Float32
                } else {
                    ValueKind::Float64
                }
            }
            ExprKind::BoolLiteral => ValueKind::Bool,
            ExprKind::StringLiteral => ValueKind::String,
            ExprKind::Name => {
                if let Some(local) = locals.get(&expr.name) {
                    return match local.info.kind {
                        BindingKind::Pointer => ValueKind::Int64,
                        BindingKind::FileHandle => ValueKind::Int64,
                        _ => local.info.value_kind,
                    };
                }
                if is_math_constant(&expr.name) {
                    return ValueKind::Float64;
                }
                ValueKind::Unknown
            }
            ExprKind::Call => self.infer_call_value_kind(expr, locals),
        }
    }

    fn infer_call_value_kind(&self, expr: &Expr, locals: &LocalMap) -> ValueKind {
        if expr.is_simple_call("assign") && expr.args.len() == 2 {
            return self.infer_expr_kind(&expr.args[1], locals);
        }
        if let Some(op) = operator_name(expr) {
            if matches!(
                op,
                "equal" | "not_equal" | "less" | "less_equal" | "greater" | "greater_equal"
                    | "and" | "or" | "not"
            ) {
                return ValueKind::Bool;
            }
            let kinds: Vec<ValueKind> = expr
                .args
                .iter()
                .map(|arg| self.infer_expr_kind(arg, locals))
                .collect();
            return kinds
                .into_iter()
                .fold(ValueKind::Unknown, combine_value_kinds);
        }
        if expr.is_simple_call("convert") {
            return expr
                .template_args
                .first()
                .map(|t| ValueKind::from_type_name(t))
                .unwrap_or(ValueKind::Unknown);
        }
        if expr.is_simple_call("if") && expr.args.len() == 3 {
            for branch in &expr.args[1..=2] {
                if let Some(value) = branch
                    .body_arguments
                    .iter()
                    .rev()
                    .find(|stmt| !stmt.is_binding)
                {
                    let kind = self.infer_expr_kind(value, locals);
                    if kind != ValueKind::Unknown {
                        return kind;
                    }
                }
            }
            return ValueKind::Unknown;
        }
        if expr.has_blocks() && (expr.name.is_empty() || expr.is_simple_call("block")) {
            if let Some(value) = expr
                .body_arguments
                .iter()
                .rev()
                .find(|stmt| !stmt.is_binding)
            {
                return self.infer_expr_kind(value, locals);
            }
            return ValueKind::Unknown;
        }
        if self.is_array_count_call(expr, locals)
            || self.is_vector_capacity_call(expr, locals)
            || self.is_string_count_call(expr, locals)
        {
            return ValueKind::Int32;
        }
        if array_access_name(expr).is_some() {
            if let Some(target) = expr.args.first() {
                if self.is_entry_args_name(target, locals) {
                    return ValueKind::String;
                }
                if target.kind == ExprKind::Name {
                    if let Some(local) = locals.get(&target.name) {
                        return match local.info.kind {
                            BindingKind::Map => local.info.map_value_kind,
                            BindingKind::String => ValueKind::Int32,
                            _ => local.info.value_kind,
                        };
                    }
                }
                if let Some(collection) = collection_name(target) {
                    return match collection {
                        "map" => target
                            .template_args
                            .get(1)
                            .map(|t| ValueKind::from_type_name(t))
                            .unwrap_or(ValueKind::Unknown),
                        _ => target
                            .template_args
                            .first()
                            .map(|t| ValueKind::from_type_name(t))
                            .unwrap_or(ValueKind::Unknown),
                    };
                }
                if target.kind == ExprKind::StringLiteral {
                    return ValueKind::Int32;
                }
            }
            return ValueKind::Unknown;
        }
        if let Some(helper) = pointer_builtin_name(expr) {
            return match helper {
                "location" | "address_of" => ValueKind::Int64,
                _ => expr
                    .args
                    .first()
                    .map(|target| self.pointee_kind(target, locals))
                    .unwrap_or(ValueKind::Unknown),
            };
        }
        if expr.is_simple_call("try") {
            return ValueKind::Int32;
        }
        if self.is_result_constructor(expr) {
            return if expr.name == "ok" && expr.args.len() == 2 {
                ValueKind::Int64
            } else {
                ValueKind::Int32
            };
        }
        if expr.is_simple_call("File") {
            return ValueKind::Int64;
        }
        if self.is_file_method_call(expr, locals) {
            return ValueKind::Int32;
        }
        if is_math_builtin(&expr.name) && !expr.is_method_call {
            return match expr.name.as_str() {
                "is_nan" | "is_inf" | "is_finite" => ValueKind::Bool,
                _ => expr
                    .args
                    .iter()
                    .map(|arg| self.infer_expr_kind(arg, locals))
                    .fold(ValueKind::Unknown, combine_value_kinds),
            };
        }
        if vector_helper_name(expr).is_some() && self.vector_helper_target(expr, locals) {
            if expr.name == "pop" {
                if let Some(target) = expr.args.first() {
                    if let Some(local) = locals.get(&target.name) {
                        return local.info.value_kind;
                    }
                }
            }
            return ValueKind::Unknown;
        }

        let callee = if expr.is_method_call {
            self.resolve_method_call_definition(expr, locals)
        } else {
            self.resolve_definition_call(expr)
        };
        if let Some(definition) = callee {
            return match definition.declared_return_type() {
                Some("int") | Some("i32") | Some("Result") => ValueKind::Int32,
                Some("i64") => ValueKind::Int64,
                Some("u64") => ValueKind::UInt64,
                Some("f32") => ValueKind::Float32,
                Some("float") | Some("f64") => ValueKind::Float64,
                Some("bool") => ValueKind::Bool,
                Some("string") => ValueKind::String,
                Some(name) if name.starts_with("Result<") => ValueKind::Int64,
                _ => ValueKind::Unknown,
            };
        }
        ValueKind::Unknown
    }

    fn pointee_kind(&self, target: &Expr, locals: &LocalMap) -> ValueKind {
        if target.kind == ExprKind::Name {
            if let Some(local) = locals.get(&target.name) {
                return local.info.value_kind;
            }
        }
        if pointer_builtin_name(target) == Some("location") {
            if let Some(inner) = target.args.first() {
                if let Some(local) = locals.get(&inner.name) {
                    return local.info.value_kind;
                }
            }
        }
        ValueKind::Unknown
    }

    pub(crate) fn expr_is_pointer(&self, expr: &Expr, locals: &LocalMap) -> bool {
        match expr.kind {
            ExprKind::Name => locals
                .get(&expr.name)
                .is_some_and(|local| local.info.kind == BindingKind::Pointer),
            ExprKind::Call => {
                pointer_builtin_name(expr) == Some("address_of")
                    || (expr.is_simple_call("plus") || expr.is_simple_call("minus"))
                        && expr
                            .args
                            .first()
                            .is_some_and(|lhs| self.expr_is_pointer(lhs, locals))
            }
            _ => false,
        }
    }

    // ---- shared predicates ----------------------------------------------

    pub(crate) fn is_entry_args_name(&self, expr: &Expr, locals: &LocalMap) -> bool {
        expr.kind == ExprKind::Name
            && locals
                .get(&expr.name)
                .is_some_and(|local| local.info.is_entry_args)
    }

    pub(crate) fn is_entry_args_access(&self, expr: &Expr, locals: &LocalMap) -> bool {
        array_access_name(expr).is_some()
            && expr.args.len() == 2
            && self.is_entry_args_name(&expr.args[0], locals)
    }

    pub(crate) fn is_result_constructor(&self, expr: &Expr) -> bool {
        expr.is_method_call
            && expr
                .args
                .first()
                .is_some_and(|recv| recv.kind == ExprKind::Name && recv.name == "Result")
    }
}

fn operator_name(expr: &Expr) -> Option<&str> {
    if expr.is_method_call || expr.namespace_prefix.is_some() {
        return None;
    }
    crate::builtins::OPERATOR_BUILTINS
        .iter()
        .copied()
        .find(|op| expr.name == *op)
}

fn arith_op(
    kind: ValueKind,
    i32_op: IrOpcode,
    i64_op: IrOpcode,
    u64_op: IrOpcode,
    f32_op: IrOpcode,
    f64_op: IrOpcode,
) -> IrOpcode {
    match kind {
        ValueKind::Int64 => i64_op,
        ValueKind::UInt64 => u64_op,
        ValueKind::Float32 => f32_op,
        ValueKind::Float64 => f64_op,
        _ => i32_op,
    }
}

fn cmp_op(
    kind: ValueKind,
    i32_op: IrOpcode,
    i64_op: IrOpcode,
    u64_op: IrOpcode,
    f32_op: IrOpcode,
    f64_op: IrOpcode,
) -> IrOpcode {
    arith_op(kind, i32_op, i64_op, u64_op, f32_op, f64_op)
}

/// Operand-kind join for arithmetic lowering.
pub(crate) fn combine_value_kinds(a: ValueKind, b: ValueKind) -> ValueKind {
    if a == ValueKind::Unknown {
        return b;
    }
    if b == ValueKind::Unknown || a == b {
        return a;
    }
    match (a, b) {
        (ValueKind::Int32, ValueKind::Int64) | (ValueKind::Int64, ValueKind::Int32) => {
            ValueKind::Int64
        }
        (ValueKind::Int32, ValueKind::UInt64) | (ValueKind::UInt64, ValueKind::Int32) => {
            ValueKind::UInt64
        }
        (ValueKind::Int64, ValueKind::UInt64) | (ValueKind::UInt64, ValueKind::Int64) => {
            ValueKind::UInt64
        }
        (ValueKind::Float32, ValueKind::Float64) | (ValueKind::Float64, ValueKind::Float32) => {
            ValueKind::Float64
        }
        (f, i) if f.is_float() && i.is_integer() => f,
        (i, f) if i.is_integer() && f.is_float() => f,
        _ => ValueKind::Unknown,
    }
}
