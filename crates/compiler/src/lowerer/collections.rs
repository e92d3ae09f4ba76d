//! Collection lowering.
//!
//! Layouts, at 16 bytes per slot:
//! - array:  `[count, elem0, elem1, …]`
//! - vector: `[count, capacity, elem0, …]`
//! - map:    `[count, key0, val0, key1, val1, …]`
//!
//! Indexed access computes `base + (index + header_slots) * 16`. `at`
//! prologues verify `0 <= index < count` (the negative check is skipped
//! for unsigned indices) and exit with code 3 on violation; `at_unsafe`
//! keeps only the address computation.

use crate::ast::{Expr, ExprKind};
use crate::builtins::collection_name;
use crate::lowerer::{IrLowerer, LocalMap};
use crate::types::{BindingKind, ValueKind};
use prism_core::{encode_print, IrOpcode, PRINT_FLAG_NEWLINE, PRINT_FLAG_STDERR};

const ARRAY_HEADER_SLOTS: u64 = 1;
const VECTOR_HEADER_SLOTS: u64 = 2;

impl<'p> IrLowerer<'p> {
    // ---- predicates ------------------------------------------------------

    /// `count(x)` / `x.count()` over a collection or the entry args.
    pub(crate) fn is_array_count_call(&self, expr: &Expr, locals: &LocalMap) -> bool {
        if expr.name != "count" || expr.args.len() != 1 || expr.is_binding {
            return false;
        }
        let target = &expr.args[0];
        if self.is_entry_args_name(target, locals) {
            return true;
        }
        if target.kind == ExprKind::Name {
            if let Some(local) = locals.get(&target.name) {
                return matches!(
                    local.info.kind,
                    BindingKind::Array | BindingKind::Vector | BindingKind::Map
                ) || (local.info.kind == BindingKind::Reference
                    && local.info.reference_to_array);
            }
        }
        collection_name(target).is_some()
    }

    pub(crate) fn is_vector_capacity_call(&self, expr: &Expr, locals: &LocalMap) -> bool {
        if expr.name != "capacity" || expr.args.len() != 1 || expr.is_binding {
            return false;
        }
        let target = &expr.args[0];
        if target.kind == ExprKind::Name {
            if let Some(local) = locals.get(&target.name) {
                return local.info.kind == BindingKind::Vector;
            }
        }
        collection_name(target) == Some("vector")
    }

    pub(crate) fn is_string_count_call(&self, expr: &Expr, locals: &LocalMap) -> bool {
        if expr.name != "count" || expr.args.len() != 1 || expr.is_binding {
            return false;
        }
        let target = &expr.args[0];
        if target.kind == ExprKind::StringLiteral {
            return true;
        }
        target.kind == ExprKind::Name
            && locals
                .get(&target.name)
                .is_some_and(|local| local.info.kind == BindingKind::String)
    }

    /// True when a vector helper call's first argument is vector-shaped.
    pub(crate) fn vector_helper_target(&self, expr: &Expr, locals: &LocalMap) -> bool {
        expr.args.first().is_some_and(|target| {
            (target.kind == ExprKind::Name
                && locals
                    .get(&target.name)
                    .is_some_and(|local| local.info.kind == BindingKind::Vector))
                || collection_name(target) == Some("vector")
        })
    }

    /// Static string-table backing of an expression: a string literal, or
    /// a string binding created from one.
    pub(crate) fn resolve_string_target(
        &mut self,
        expr: &Expr,
        locals: &LocalMap,
    ) -> Option<(u32, usize)> {
        if expr.kind == ExprKind::StringLiteral {
            let bytes = expr.name.clone().into_bytes();
            let index = self.intern(&bytes);
            return Some((index, bytes.len()));
        }
        if expr.kind == ExprKind::Name {
            if let Some(local) = locals.get(&expr.name) {
                if local.info.is_entry_arg_string {
                    return None;
                }
                return local.string_literal;
            }
        }
        None
    }

    /// Emit a collection's base address. Collection bindings and
    /// references to them hold the base directly, so neither gets the
    /// reference auto-deref that scalar reads do.
    pub(crate) fn emit_collection_base(
        &mut self,
        target: &Expr,
        locals: &LocalMap,
    ) -> Result<(), String> {
        if target.kind == ExprKind::Name {
            if let Some(local) = locals.get(&target.name) {
                if local.info.is_entry_args {
                    return Err(self.unsupported("entry arguments as collection values"));
                }
                let direct = matches!(
                    local.info.kind,
                    BindingKind::Array | BindingKind::Vector | BindingKind::Map
                ) || (local.info.kind == BindingKind::Reference
                    && local.info.reference_to_array);
                if direct {
                    self.emit(IrOpcode::LoadLocal, u64::from(local.slot));
                    return Ok(());
                }
            }
        }
        self.emit_expr(target, locals)
    }

    // ---- counts ----------------------------------------------------------

    pub(crate) fn emit_array_count(
        &mut self,
        expr: &Expr,
        locals: &LocalMap,
    ) -> Result<(), String> {
        let target = &expr.args[0];
        if self.is_entry_args_name(target, locals) {
            self.emit(IrOpcode::PushArgc, 0);
            return Ok(());
        }
        self.emit_collection_base(target, locals)?;
        self.emit(IrOpcode::LoadIndirect, 0);
        Ok(())
    }

    pub(crate) fn emit_vector_capacity(
        &mut self,
        expr: &Expr,
        locals: &LocalMap,
    ) -> Result<(), String> {
        self.emit_collection_base(&expr.args[0], locals)?;
        self.emit(IrOpcode::PushI64, 16);
        self.emit(IrOpcode::AddI64, 0);
        self.emit(IrOpcode::LoadIndirect, 0);
        Ok(())
    }

    pub(crate) fn emit_string_count(
        &mut self,
        expr: &Expr,
        locals: &LocalMap,
    ) -> Result<(), String> {
        let Some((_, length)) = self.resolve_string_target(&expr.args[0], locals) else {
            return Err(format!(
                "{} only supports count() on string literals or string bindings",
                self.backend.tag()
            ));
        };
        if length > i32::MAX as usize {
            return Err(format!(
                "{} string too large for count()",
                self.backend.tag()
            ));
        }
        self.emit(IrOpcode::PushI32, length as u64);
        Ok(())
    }

    // ---- literals --------------------------------------------------------

    pub(crate) fn emit_collection_literal(
        &mut self,
        expr: &Expr,
        locals: &LocalMap,
    ) -> Result<(), String> {
        match collection_name(expr) {
            Some("array") => self.emit_array_literal(expr, locals),
            Some("vector") => self.emit_vector_literal(expr, locals),
            Some("map") => self.emit_map_literal(expr, locals),
            _ => Err(self.unsupported("this collection literal")),
        }
    }

    fn emit_array_literal(&mut self, expr: &Expr, locals: &LocalMap) -> Result<(), String> {
        let count = expr.args.len() as u32;
        let base = self.alloc_local_block(count + ARRAY_HEADER_SLOTS as u32);
        self.emit(IrOpcode::PushI32, u64::from(count));
        self.emit(IrOpcode::StoreLocal, u64::from(base));
        for (index, element) in expr.args.iter().enumerate() {
            self.emit_expr(element, locals)?;
            self.emit(
                IrOpcode::StoreLocal,
                u64::from(base + 1 + index as u32),
            );
        }
        self.emit(IrOpcode::AddressOfLocal, u64::from(base));
        Ok(())
    }

    fn emit_vector_literal(&mut self, expr: &Expr, locals: &LocalMap) -> Result<(), String> {
        let count = expr.args.len() as u64;
        let ptr = self.alloc_temp_local();
        self.emit(IrOpcode::HeapAlloc, count + VECTOR_HEADER_SLOTS);
        self.emit(IrOpcode::StoreLocal, u64::from(ptr));

        // Header: count, capacity.
        self.emit(IrOpcode::LoadLocal, u64::from(ptr));
        self.emit(IrOpcode::PushI32, count);
        self.emit(IrOpcode::StoreIndirect, 0);
        self.emit(IrOpcode::LoadLocal, u64::from(ptr));
        self.emit(IrOpcode::PushI64, 16);
        self.emit(IrOpcode::AddI64, 0);
        self.emit(IrOpcode::PushI32, count);
        self.emit(IrOpcode::StoreIndirect, 0);

        for (index, element) in expr.args.iter().enumerate() {
            self.emit(IrOpcode::LoadLocal, u64::from(ptr));
            self.emit(
                IrOpcode::PushI64,
                (index as u64 + VECTOR_HEADER_SLOTS) * 16,
            );
            self.emit(IrOpcode::AddI64, 0);
            self.emit_expr(element, locals)?;
            self.emit(IrOpcode::StoreIndirect, 0);
        }
        self.emit(IrOpcode::LoadLocal, u64::from(ptr));
        Ok(())
    }

    fn emit_map_literal(&mut self, expr: &Expr, locals: &LocalMap) -> Result<(), String> {
        let pairs = (expr.args.len() / 2) as u32;
        let base = self.alloc_local_block(1 + pairs * 2);
        self.emit(IrOpcode::PushI32, u64::from(pairs));
        self.emit(IrOpcode::StoreLocal, u64::from(base));
        for (index, entry) in expr.args.iter().enumerate() {
            // String keys store their table index; everything else stores
            // its value directly.
            if index % 2 == 0 {
                if let Some((string_index, _)) = self.resolve_string_target(entry, locals) {
                    self.emit(IrOpcode::PushI32, u64::from(string_index));
                    self.emit(IrOpcode::StoreLocal, u64::from(base + 1 + index as u32));
                    continue;
                }
            }
            self.emit_expr(entry, locals)?;
            self.emit(IrOpcode::StoreLocal, u64::from(base + 1 + index as u32));
        }
        self.emit(IrOpcode::AddressOfLocal, u64::from(base));
        Ok(())
    }

    // ---- indexed access --------------------------------------------------

    pub(crate) fn emit_access(
        &mut self,
        expr: &Expr,
        locals: &LocalMap,
        access: &str,
    ) -> Result<(), String> {
        if expr.args.len() != 2 {
            return Err(format!("{} requires exactly two arguments", access));
        }
        let target = &expr.args[0];
        let checked = access == "at";

        // String targets index the string table.
        if let Some((string_index, length)) = self.resolve_string_target(target, locals) {
            return self.emit_string_index(expr, locals, string_index, length, checked);
        }
        if target.kind == ExprKind::Name {
            if let Some(local) = locals.get(&target.name) {
                if local.info.is_entry_arg_string {
                    return Err(self.unsupported("indexing entry argument strings"));
                }
                if local.info.kind == BindingKind::String {
                    return Err(format!(
                        "{} only supports indexing into string literals or string bindings",
                        self.backend.tag()
                    ));
                }
                if local.info.kind == BindingKind::Map {
                    let key_kind = local.info.map_key_kind;
                    let value_kind = local.info.map_value_kind;
                    return self.emit_map_access(expr, locals, key_kind, value_kind, checked);
                }
            }
        }
        if collection_name(target) == Some("map") {
            let key_kind = target
                .template_args
                .first()
                .map(|t| ValueKind::from_type_name(t))
                .unwrap_or(ValueKind::Unknown);
            let value_kind = target
                .template_args
                .get(1)
                .map(|t| ValueKind::from_type_name(t))
                .unwrap_or(ValueKind::Unknown);
            return self.emit_map_access(expr, locals, key_kind, value_kind, checked);
        }
        if self.is_entry_args_name(target, locals) {
            return Err(format!(
                "{} only supports entry argument indexing in print calls or string bindings",
                self.backend.tag()
            ));
        }

        // Arrays, vectors and references to them.
        let (elem_kind, header_slots) = self.array_target_shape(target, locals)?;
        if elem_kind == ValueKind::Unknown || elem_kind == ValueKind::String {
            return Err(format!(
                "{} only supports at() on numeric/bool arrays or vectors",
                self.backend.tag()
            ));
        }
        let index_kind = self.index_kind(&expr.args[1], locals)?;

        let ptr = self.alloc_temp_local();
        self.emit_collection_base(target, locals)?;
        self.emit(IrOpcode::StoreLocal, u64::from(ptr));

        let index = self.alloc_temp_local();
        self.emit_expr(&expr.args[1], locals)?;
        self.emit(IrOpcode::StoreLocal, u64::from(index));

        if checked {
            let count = self.alloc_temp_local();
            self.emit(IrOpcode::LoadLocal, u64::from(ptr));
            self.emit(IrOpcode::LoadIndirect, 0);
            self.emit(IrOpcode::StoreLocal, u64::from(count));

            if index_kind != ValueKind::UInt64 {
                self.emit(IrOpcode::LoadLocal, u64::from(index));
                self.emit(push_for_index(index_kind), 0);
                self.emit(cmp_lt_for_index(index_kind), 0);
                let jump_ok = self.emit_jump(IrOpcode::JumpIfZero);
                self.emit_array_index_out_of_bounds();
                self.patch_jump(jump_ok);
            }

            self.emit(IrOpcode::LoadLocal, u64::from(index));
            self.emit(IrOpcode::LoadLocal, u64::from(count));
            self.emit(cmp_ge_for_index(index_kind), 0);
            let jump_in_range = self.emit_jump(IrOpcode::JumpIfZero);
            self.emit_array_index_out_of_bounds();
            self.patch_jump(jump_in_range);
        }

        self.emit(IrOpcode::LoadLocal, u64::from(ptr));
        self.emit(IrOpcode::LoadLocal, u64::from(index));
        self.emit(push_for_index(index_kind), header_slots);
        self.emit(add_for_index(index_kind), 0);
        self.emit(push_for_index(index_kind), 16);
        self.emit(mul_for_index(index_kind), 0);
        self.emit(IrOpcode::AddI64, 0);
        self.emit(IrOpcode::LoadIndirect, 0);
        Ok(())
    }

    fn array_target_shape(
        &self,
        target: &Expr,
        locals: &LocalMap,
    ) -> Result<(ValueKind, u64), String> {
        if target.kind == ExprKind::Name {
            if let Some(local) = locals.get(&target.name) {
                return Ok(match local.info.kind {
                    BindingKind::Vector => (local.info.value_kind, VECTOR_HEADER_SLOTS),
                    BindingKind::Reference if local.info.reference_to_array => {
                        (local.info.value_kind, ARRAY_HEADER_SLOTS)
                    }
                    _ => (local.info.value_kind, ARRAY_HEADER_SLOTS),
                });
            }
        }
        if let Some(collection) = collection_name(target) {
            let elem = target
                .template_args
                .first()
                .map(|t| ValueKind::from_type_name(t))
                .unwrap_or(ValueKind::Unknown);
            let header = if collection == "vector" {
                VECTOR_HEADER_SLOTS
            } else {
                ARRAY_HEADER_SLOTS
            };
            return Ok((elem, header));
        }
        Ok((ValueKind::Unknown, ARRAY_HEADER_SLOTS))
    }

    fn index_kind(&self, index: &Expr, locals: &LocalMap) -> Result<ValueKind, String> {
        let kind = self.infer_expr_kind(index, locals);
        match kind {
            ValueKind::Int32 | ValueKind::Int64 | ValueKind::UInt64 => Ok(kind),
            ValueKind::Bool => Ok(ValueKind::Int32),
            _ => Err(format!(
                "{} requires integer indices for at",
                self.backend.tag()
            )),
        }
    }

    fn emit_string_index(
        &mut self,
        expr: &Expr,
        locals: &LocalMap,
        string_index: u32,
        length: usize,
        checked: bool,
    ) -> Result<(), String> {
        if length > i32::MAX as usize {
            return Err(format!(
                "{} string too large for indexing",
                self.backend.tag()
            ));
        }
        let index_kind = self.index_kind(&expr.args[1], locals)?;
        let index = self.alloc_temp_local();
        self.emit_expr(&expr.args[1], locals)?;
        self.emit(IrOpcode::StoreLocal, u64::from(index));

        if checked {
            if index_kind != ValueKind::UInt64 {
                self.emit(IrOpcode::LoadLocal, u64::from(index));
                self.emit(push_for_index(index_kind), 0);
                self.emit(cmp_lt_for_index(index_kind), 0);
                let jump_ok = self.emit_jump(IrOpcode::JumpIfZero);
                self.emit_string_index_out_of_bounds();
                self.patch_jump(jump_ok);
            }
            self.emit(IrOpcode::LoadLocal, u64::from(index));
            self.emit(push_for_index(index_kind), length as u64);
            self.emit(cmp_ge_for_index(index_kind), 0);
            let jump_in_range = self.emit_jump(IrOpcode::JumpIfZero);
            self.emit_string_index_out_of_bounds();
            self.patch_jump(jump_in_range);
        }

        self.emit(IrOpcode::LoadLocal, u64::from(index));
        self.emit(IrOpcode::LoadStringByte, u64::from(string_index));
        Ok(())
    }

    /// Linear scan over the flat `[count, k, v, …]` layout. On a checked
    /// miss, print `map key not found` and exit 3; unchecked misses read
    /// the slot past the last pair.
    fn emit_map_access(
        &mut self,
        expr: &Expr,
        locals: &LocalMap,
        key_kind: ValueKind,
        value_kind: ValueKind,
        checked: bool,
    ) -> Result<(), String> {
        if key_kind == ValueKind::Unknown || value_kind == ValueKind::Unknown {
            return Err(format!(
                "{} requires typed map bindings for at",
                self.backend.tag()
            ));
        }
        if value_kind == ValueKind::String {
            return Err(format!(
                "{} only supports numeric/bool map values",
                self.backend.tag()
            ));
        }

        let ptr = self.alloc_temp_local();
        self.emit_collection_base(&expr.args[0], locals)?;
        self.emit(IrOpcode::StoreLocal, u64::from(ptr));

        let key = self.alloc_temp_local();
        if key_kind == ValueKind::String {
            let Some((string_index, _)) = self.resolve_string_target(&expr.args[1], locals)
            else {
                return Err(format!(
                    "{} requires map lookup key to be string literal or binding backed by literals",
                    self.backend.tag()
                ));
            };
            self.emit(IrOpcode::PushI32, u64::from(string_index));
        } else {
            self.emit_expr(&expr.args[1], locals)?;
        }
        self.emit(IrOpcode::StoreLocal, u64::from(key));

        let count = self.alloc_temp_local();
        self.emit(IrOpcode::LoadLocal, u64::from(ptr));
        self.emit(IrOpcode::LoadIndirect, 0);
        self.emit(IrOpcode::StoreLocal, u64::from(count));

        let cursor = self.alloc_temp_local();
        self.emit(IrOpcode::PushI32, 0);
        self.emit(IrOpcode::StoreLocal, u64::from(cursor));

        let loop_start = self.here();
        self.emit(IrOpcode::LoadLocal, u64::from(cursor));
        self.emit(IrOpcode::LoadLocal, u64::from(count));
        self.emit(IrOpcode::CmpLtI32, 0);
        let jump_loop_end = self.emit_jump(IrOpcode::JumpIfZero);

        // Key slot: base + (cursor*2 + 1) * 16.
        self.emit(IrOpcode::LoadLocal, u64::from(ptr));
        self.emit(IrOpcode::LoadLocal, u64::from(cursor));
        self.emit(IrOpcode::PushI32, 2);
        self.emit(IrOpcode::MulI32, 0);
        self.emit(IrOpcode::PushI32, 1);
        self.emit(IrOpcode::AddI32, 0);
        self.emit(IrOpcode::PushI32, 16);
        self.emit(IrOpcode::MulI32, 0);
        self.emit(IrOpcode::AddI64, 0);
        self.emit(IrOpcode::LoadIndirect, 0);
        self.emit(IrOpcode::LoadLocal, u64::from(key));
        let cmp_key = match key_kind {
            ValueKind::Int64 | ValueKind::UInt64 => IrOpcode::CmpEqI64,
            ValueKind::Float64 => IrOpcode::CmpEqF64,
            ValueKind::Float32 => IrOpcode::CmpEqF32,
            _ => IrOpcode::CmpEqI32,
        };
        self.emit(cmp_key, 0);
        let jump_not_match = self.emit_jump(IrOpcode::JumpIfZero);
        let jump_found = self.emit_jump(IrOpcode::Jump);

        self.patch_jump(jump_not_match);
        self.emit(IrOpcode::LoadLocal, u64::from(cursor));
        self.emit(IrOpcode::PushI32, 1);
        self.emit(IrOpcode::AddI32, 0);
        self.emit(IrOpcode::StoreLocal, u64::from(cursor));
        self.emit(IrOpcode::Jump, loop_start as u64);

        self.patch_jump(jump_loop_end);
        self.patch_jump(jump_found);

        if checked {
            self.emit(IrOpcode::LoadLocal, u64::from(cursor));
            self.emit(IrOpcode::LoadLocal, u64::from(count));
            self.emit(IrOpcode::CmpEqI32, 0);
            let jump_key_found = self.emit_jump(IrOpcode::JumpIfZero);
            self.emit_map_key_not_found();
            self.patch_jump(jump_key_found);
        }

        // Value slot: base + (cursor*2 + 2) * 16.
        self.emit(IrOpcode::LoadLocal, u64::from(ptr));
        self.emit(IrOpcode::LoadLocal, u64::from(cursor));
        self.emit(IrOpcode::PushI32, 2);
        self.emit(IrOpcode::MulI32, 0);
        self.emit(IrOpcode::PushI32, 2);
        self.emit(IrOpcode::AddI32, 0);
        self.emit(IrOpcode::PushI32, 16);
        self.emit(IrOpcode::MulI32, 0);
        self.emit(IrOpcode::AddI64, 0);
        self.emit(IrOpcode::LoadIndirect, 0);
        Ok(())
    }

    // ---- vector helpers --------------------------------------------------

    pub(crate) fn emit_vector_helper(
        &mut self,
        expr: &Expr,
        locals: &LocalMap,
        helper: &str,
    ) -> Result<(), String> {
        match helper {
            "push" | "reserve" => Err(format!(
                "{} does not support vector helper: {}",
                self.backend.tag(),
                helper
            )),
            "pop" => self.emit_vector_pop(expr, locals),
            "clear" => {
                self.emit_collection_base(&expr.args[0], locals)?;
                self.emit(IrOpcode::PushI32, 0);
                self.emit(IrOpcode::StoreIndirect, 0);
                Ok(())
            }
            "remove_swap" => self.emit_vector_remove_swap(expr, locals),
            "remove_at" => self.emit_vector_remove_at(expr, locals),
            other => Err(format!(
                "{} does not support vector helper: {}",
                self.backend.tag(),
                other
            )),
        }
    }

    fn emit_vector_pop(&mut self, expr: &Expr, locals: &LocalMap) -> Result<(), String> {
        let ptr = self.alloc_temp_local();
        self.emit_collection_base(&expr.args[0], locals)?;
        self.emit(IrOpcode::StoreLocal, u64::from(ptr));

        // count - 1 into the header and a temp.
        let last = self.alloc_temp_local();
        self.emit(IrOpcode::LoadLocal, u64::from(ptr));
        self.emit(IrOpcode::LoadIndirect, 0);
        self.emit(IrOpcode::PushI32, 1);
        self.emit(IrOpcode::SubI32, 0);
        self.emit(IrOpcode::StoreLocal, u64::from(last));
        self.emit(IrOpcode::LoadLocal, u64::from(ptr));
        self.emit(IrOpcode::LoadLocal, u64::from(last));
        self.emit(IrOpcode::StoreIndirect, 0);

        // Removed element: base + (last + 2) * 16.
        self.emit(IrOpcode::LoadLocal, u64::from(ptr));
        self.emit(IrOpcode::LoadLocal, u64::from(last));
        self.emit(IrOpcode::PushI32, VECTOR_HEADER_SLOTS);
        self.emit(IrOpcode::AddI32, 0);
        self.emit(IrOpcode::PushI32, 16);
        self.emit(IrOpcode::MulI32, 0);
        self.emit(IrOpcode::AddI64, 0);
        self.emit(IrOpcode::LoadIndirect, 0);
        Ok(())
    }

    fn emit_vector_remove_swap(
        &mut self,
        expr: &Expr,
        locals: &LocalMap,
    ) -> Result<(), String> {
        let ptr = self.alloc_temp_local();
        self.emit_collection_base(&expr.args[0], locals)?;
        self.emit(IrOpcode::StoreLocal, u64::from(ptr));

        let index = self.alloc_temp_local();
        self.emit_expr(&expr.args[1], locals)?;
        self.emit(IrOpcode::StoreLocal, u64::from(index));

        let last = self.alloc_temp_local();
        self.emit(IrOpcode::LoadLocal, u64::from(ptr));
        self.emit(IrOpcode::LoadIndirect, 0);
        self.emit(IrOpcode::PushI32, 1);
        self.emit(IrOpcode::SubI32, 0);
        self.emit(IrOpcode::StoreLocal, u64::from(last));

        // elem[index] = elem[last]
        self.emit_vector_slot_address(ptr, index);
        self.emit_vector_slot_address(ptr, last);
        self.emit(IrOpcode::LoadIndirect, 0);
        self.emit(IrOpcode::StoreIndirect, 0);

        // count = last
        self.emit(IrOpcode::LoadLocal, u64::from(ptr));
        self.emit(IrOpcode::LoadLocal, u64::from(last));
        self.emit(IrOpcode::StoreIndirect, 0);
        Ok(())
    }

    fn emit_vector_remove_at(&mut self, expr: &Expr, locals: &LocalMap) -> Result<(), String> {
        let ptr = self.alloc_temp_local();
        self.emit_collection_base(&expr.args[0], locals)?;
        self.emit(IrOpcode::StoreLocal, u64::from(ptr));

        let cursor = self.alloc_temp_local();
        self.emit_expr(&expr.args[1], locals)?;
        self.emit(IrOpcode::StoreLocal, u64::from(cursor));

        let last = self.alloc_temp_local();
        self.emit(IrOpcode::LoadLocal, u64::from(ptr));
        self.emit(IrOpcode::LoadIndirect, 0);
        self.emit(IrOpcode::PushI32, 1);
        self.emit(IrOpcode::SubI32, 0);
        self.emit(IrOpcode::StoreLocal, u64::from(last));

        // Shift left: while cursor < last { elem[cursor] = elem[cursor+1] }
        let next = self.alloc_temp_local();
        let loop_start = self.here();
        self.emit(IrOpcode::LoadLocal, u64::from(cursor));
        self.emit(IrOpcode::LoadLocal, u64::from(last));
        self.emit(IrOpcode::CmpLtI32, 0);
        let jump_end = self.emit_jump(IrOpcode::JumpIfZero);

        self.emit(IrOpcode::LoadLocal, u64::from(cursor));
        self.emit(IrOpcode::PushI32, 1);
        self.emit(IrOpcode::AddI32, 0);
        self.emit(IrOpcode::StoreLocal, u64::from(next));
        self.emit_vector_slot_address(ptr, cursor);
        self.emit_vector_slot_address(ptr, next);
        self.emit(IrOpcode::LoadIndirect, 0);
        self.emit(IrOpcode::StoreIndirect, 0);

        self.emit(IrOpcode::LoadLocal, u64::from(next));
        self.emit(IrOpcode::StoreLocal, u64::from(cursor));
        self.emit(IrOpcode::Jump, loop_start as u64);
        self.patch_jump(jump_end);

        // count = last
        self.emit(IrOpcode::LoadLocal, u64::from(ptr));
        self.emit(IrOpcode::LoadLocal, u64::from(last));
        self.emit(IrOpcode::StoreIndirect, 0);
        Ok(())
    }

    /// Push `base + (slot_local + 2) * 16` for vector element access.
    fn emit_vector_slot_address(&mut self, ptr: u32, slot_local: u32) {
        self.emit(IrOpcode::LoadLocal, u64::from(ptr));
        self.emit(IrOpcode::LoadLocal, u64::from(slot_local));
        self.emit(IrOpcode::PushI32, VECTOR_HEADER_SLOTS);
        self.emit(IrOpcode::AddI32, 0);
        self.emit(IrOpcode::PushI32, 16);
        self.emit(IrOpcode::MulI32, 0);
        self.emit(IrOpcode::AddI64, 0);
    }

    // ---- checked-failure emitters ---------------------------------------

    pub(crate) fn emit_checked_failure(&mut self, message: &str) {
        let index = self.intern(message.as_bytes());
        self.emit(
            IrOpcode::PrintString,
            encode_print(index, PRINT_FLAG_NEWLINE | PRINT_FLAG_STDERR),
        );
        self.emit(IrOpcode::Exit, 3);
    }

    pub(crate) fn emit_array_index_out_of_bounds(&mut self) {
        self.emit_checked_failure("array index out of bounds");
    }

    pub(crate) fn emit_string_index_out_of_bounds(&mut self) {
        self.emit_checked_failure("string index out of bounds");
    }

    pub(crate) fn emit_map_key_not_found(&mut self) {
        self.emit_checked_failure("map key not found");
    }
}

/// Push opcode for an index kind; the immediate is supplied by callers.
fn push_for_index(kind: ValueKind) -> IrOpcode {
    match kind {
        ValueKind::Int64 | ValueKind::UInt64 => IrOpcode::PushI64,
        _ => IrOpcode::PushI32,
    }
}

fn cmp_lt_for_index(kind: ValueKind) -> IrOpcode {
    match kind {
        ValueKind::Int64 => IrOpcode::CmpLtI64,
        _ => IrOpcode::CmpLtI32,
    }
}

fn cmp_ge_for_index(kind: ValueKind) -> IrOpcode {
    match kind {
        ValueKind::Int64 => IrOpcode::CmpGeI64,
        ValueKind::UInt64 => IrOpcode::CmpGeU64,
        _ => IrOpcode::CmpGeI32,
    }
}

fn add_for_index(kind: ValueKind) -> IrOpcode {
    match kind {
        ValueKind::Int64 | ValueKind::UInt64 => IrOpcode::AddI64,
        _ => IrOpcode::AddI32,
    }
}

fn mul_for_index(kind: ValueKind) -> IrOpcode {
    match kind {
        ValueKind::Int64 | ValueKind::UInt64 => IrOpcode::MulI64,
        _ => IrOpcode::MulI32,
    }
}
