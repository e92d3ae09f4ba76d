//! Expression validation and kind inference.
//!
//! `infer_expr_return_kind` computes the semantic kind of any expression
//! from leaves upward; `validate_expr` enforces the rules that make the
//! lowerer purely syntactic: arithmetic operand agreement, pointer
//! discipline, collection shapes, effect requirements and math-namespace
//! gating.

use crate::ast::{Definition, Expr, ExprKind};
use crate::builtins::{
    array_access_name, collection_name, is_comparison_operator, is_math_builtin,
    is_math_constant, pathspace_effect, pointer_builtin_name, print_builtin,
    vector_helper_name,
};
use crate::types::{BindingKind, ReturnKind, ValueKind};
use crate::validator::{LocalMap, Validator};

impl<'p> Validator<'p> {
    pub(crate) fn validate_expr(
        &mut self,
        definition: &'p Definition,
        locals: &LocalMap,
        expr: &Expr,
    ) -> Result<(), String> {
        match expr.kind {
            ExprKind::Literal
            | ExprKind::FloatLiteral
            | ExprKind::StringLiteral
            | ExprKind::BoolLiteral => Ok(()),
            ExprKind::Name => self.validate_name(locals, expr),
            ExprKind::Call => self.validate_call(definition, locals, expr),
        }
    }

    fn validate_name(&self, locals: &LocalMap, expr: &Expr) -> Result<(), String> {
        if expr.namespace_prefix.is_none() && locals.contains_key(&expr.name) {
            return Ok(());
        }
        if is_math_constant(&expr.name) {
            if expr.namespace_prefix.as_deref() == Some("/math")
                || (expr.namespace_prefix.is_none() && self.math_name_reachable(expr, &expr.name))
            {
                return Ok(());
            }
            if expr.namespace_prefix.is_none() {
                return Err(format!(
                    "math constant requires import /math/* or /math/<name>: {}",
                    expr.name
                ));
            }
        }
        if expr.namespace_prefix.as_deref() == Some("/math") {
            return Err(format!("unknown math builtin: {}", expr.name));
        }
        Err(format!("unknown identifier: {}", expr.name))
    }

    fn validate_call(
        &mut self,
        definition: &'p Definition,
        locals: &LocalMap,
        expr: &Expr,
    ) -> Result<(), String> {
        if expr.is_binding {
            return Err("binding not allowed in expression position".to_string());
        }
        if let Some(names) = &expr.arg_names {
            if names.len() != expr.args.len() {
                return Err("argument labels must match argument count".to_string());
            }
        }

        // if-expressions in value position share the statement rules.
        if expr.is_simple_call("if") && expr.args.len() == 3 {
            self.validate_expr(definition, locals, &expr.args[0])?;
            let cond_kind = self.infer_expr_return_kind(locals, &expr.args[0]);
            if cond_kind != ReturnKind::Bool {
                return Err("if condition requires bool".to_string());
            }
            for branch in &expr.args[1..=2] {
                let mut branch_locals = locals.clone();
                let mut saw_return = false;
                for stmt in &branch.body_arguments {
                    self.validate_statement(
                        definition,
                        &mut branch_locals,
                        stmt,
                        ReturnKind::Unknown,
                        false,
                        true,
                        &mut saw_return,
                    )?;
                }
            }
            return Ok(());
        }

        if expr.is_simple_call("assign") {
            return self.validate_assign(definition, locals, expr);
        }

        if let Some(op) = operator_name(expr) {
            return self.validate_operator(definition, locals, expr, op);
        }

        if let Some(print) = print_builtin(&expr.name) {
            if expr.is_method_call {
                return Err(format!("{} is not a method", print.name));
            }
            self.require_effect(print.name, print.effect)?;
            if expr.args.is_empty() {
                return Err(format!("{} requires at least one argument", print.name));
            }
            for arg in &expr.args {
                self.validate_print_argument(definition, locals, arg)?;
            }
            return Ok(());
        }

        if let Some(effect) = pathspace_effect(&expr.name) {
            if !expr.is_method_call && expr.namespace_prefix.is_none() {
                self.require_effect(&expr.name, effect)?;
                for arg in &expr.args {
                    self.validate_expr(definition, locals, arg)?;
                }
                return Ok(());
            }
        }

        if let Some(collection) = collection_name(expr) {
            return self.validate_collection_literal(definition, locals, expr, collection);
        }

        // at/at_unsafe are builtins in both free and method spelling; the
        // receiver is the first argument either way.
        if let Some(access) = array_access_name(expr) {
            return self.validate_access(definition, locals, expr, access);
        }

        if let Some(helper) = pointer_builtin_name(expr) {
            if !expr.template_args.is_empty() {
                return Err(format!("{} does not accept template arguments", helper));
            }
            if expr.has_blocks() {
                return Err(format!("{} does not accept block arguments", helper));
            }
            if expr.args.len() != 1 {
                return Err(format!("{} requires exactly one argument", helper));
            }
            let target = &expr.args[0];
            match helper {
                "location" | "address_of" => {
                    if target.kind != ExprKind::Name {
                        return Err(format!("{} requires a local binding", helper));
                    }
                    let info = locals
                        .get(&target.name)
                        .ok_or_else(|| format!("{} requires a local binding", helper))?;
                    if info.is_entry_args {
                        return Err(format!("{} cannot target entry arguments", helper));
                    }
                    Ok(())
                }
                _ => {
                    // dereference
                    self.validate_expr(definition, locals, target)?;
                    let kind = self.infer_expr_return_kind(locals, target);
                    if kind != ReturnKind::Pointer && kind != ReturnKind::Reference {
                        return Err("dereference requires a pointer or reference".to_string());
                    }
                    Ok(())
                }
            }
        } else if expr.is_simple_call("convert") {
            if expr.template_args.len() != 1 {
                return Err("convert requires exactly one template argument".to_string());
            }
            if expr.args.len() != 1 {
                return Err("convert requires exactly one argument".to_string());
            }
            self.validate_expr(definition, locals, &expr.args[0])
        } else if expr.is_simple_call("try") {
            if expr.args.len() != 1 {
                return Err("try requires exactly one argument".to_string());
            }
            self.validate_expr(definition, locals, &expr.args[0])
        } else if expr.is_simple_call("File") {
            if expr.template_args.len() != 1 {
                return Err("File requires exactly one template argument".to_string());
            }
            let mode = expr.template_args[0].as_str();
            if !matches!(mode, "Read" | "Write" | "Append") {
                return Err("File requires Read, Write, or Append mode".to_string());
            }
            if expr.args.len() != 1 {
                return Err("File requires exactly one path argument".to_string());
            }
            let effect = if mode == "Read" { "file_read" } else { "file_write" };
            self.require_effect("File", effect)?;
            self.validate_expr(definition, locals, &expr.args[0])
        } else if self.is_result_constructor(expr) {
            match expr.name.as_str() {
                "ok" => {
                    if expr.args.len() > 2 {
                        return Err("Result.ok accepts at most one argument".to_string());
                    }
                    if let Some(payload) = expr.args.get(1) {
                        self.validate_expr(definition, locals, payload)?;
                        let kind = self.infer_expr_return_kind(locals, payload);
                        if kind != ReturnKind::Int32 && kind != ReturnKind::Bool {
                            return Err("Result.ok requires a 32-bit payload".to_string());
                        }
                    }
                    Ok(())
                }
                "error" => {
                    if expr.args.len() != 2 {
                        return Err("Result.error requires an error code".to_string());
                    }
                    self.validate_expr(definition, locals, &expr.args[1])?;
                    let kind = self.infer_expr_return_kind(locals, &expr.args[1]);
                    if kind != ReturnKind::Int32 {
                        return Err("Result.error requires an i32 code".to_string());
                    }
                    Ok(())
                }
                other => Err(format!("unknown Result constructor: {}", other)),
            }
        } else if expr.name == "count" || expr.name == "capacity" {
            self.validate_count_call(definition, locals, expr)
        } else if let Some(helper) = vector_helper_name(expr) {
            if self.vector_helper_applies(expr, locals) {
                return self.validate_vector_helper(definition, locals, expr, helper);
            }
            self.validate_user_call(definition, locals, expr)
        } else if self.is_file_method(expr, locals) {
            self.validate_file_method(definition, locals, expr)
        } else if is_math_builtin(&expr.name) && !expr.is_method_call {
            if self.math_name_reachable(expr, &expr.name) {
                self.validate_math_call(definition, locals, expr)
            } else if expr.namespace_prefix.is_none()
                && self.resolve_callee_path(expr).is_none()
            {
                Err(format!(
                    "math builtin requires import /math/* or /math/<name>: {}",
                    expr.name
                ))
            } else {
                // Qualified under another namespace, or shadowed by a
                // user definition: ordinary call resolution.
                self.validate_user_call(definition, locals, expr)
            }
        } else {
            self.validate_user_call(definition, locals, expr)
        }
    }

    /// `assign(target, value)` writes through a mutable binding, a
    /// reference, or `dereference(pointer)`, and yields the stored value.
    fn validate_assign(
        &mut self,
        definition: &'p Definition,
        locals: &LocalMap,
        expr: &Expr,
    ) -> Result<(), String> {
        if expr.args.len() != 2 {
            return Err("assign requires a target and a value".to_string());
        }
        let target = &expr.args[0];
        let value = &expr.args[1];
        match target.kind {
            ExprKind::Name => {
                let info = locals
                    .get(&target.name)
                    .ok_or_else(|| format!("unknown identifier: {}", target.name))?;
                let writable = info.is_mutable || info.kind == BindingKind::Reference;
                if !writable {
                    return Err(format!("assign requires a mutable binding: {}", target.name));
                }
            }
            ExprKind::Call if pointer_builtin_name(target) == Some("dereference") => {
                self.validate_expr(definition, locals, target)?;
            }
            _ => return Err("assign requires a binding or dereference target".to_string()),
        }
        self.validate_expr(definition, locals, value)?;
        let target_kind = self.infer_expr_return_kind(locals, target);
        let value_kind = self.infer_expr_return_kind(locals, value);
        if target_kind != ReturnKind::Unknown
            && value_kind != ReturnKind::Unknown
            && target_kind != value_kind
        {
            return Err(format!(
                "assign value type mismatch: expected {}",
                target_kind.type_name()
            ));
        }
        Ok(())
    }

    fn validate_operator(
        &mut self,
        definition: &'p Definition,
        locals: &LocalMap,
        expr: &Expr,
        op: &str,
    ) -> Result<(), String> {
        if expr.has_named_arguments() {
            return Err("named arguments not supported for builtin calls".to_string());
        }
        for arg in &expr.args {
            self.validate_expr(definition, locals, arg)?;
        }
        match op {
            "negate" | "not" => {
                if expr.args.len() != 1 {
                    return Err(format!("{} requires exactly one argument", op));
                }
            }
            _ => {
                if expr.args.len() != 2 {
                    return Err(format!("{} requires exactly two arguments", op));
                }
            }
        }
        let kinds: Vec<ReturnKind> = expr
            .args
            .iter()
            .map(|arg| self.infer_expr_return_kind(locals, arg))
            .collect();

        match op {
            "and" | "or" | "not" => {
                for kind in &kinds {
                    if *kind != ReturnKind::Bool && !kind.to_value_kind().is_integer() {
                        return Err(format!("{} requires bool or integer operands", op));
                    }
                }
                Ok(())
            }
            "negate" => {
                let kind = kinds[0];
                if kind == ReturnKind::UInt64 {
                    return Err("negate rejects unsigned operands".to_string());
                }
                if !kind.is_numeric() {
                    return Err("negate requires a numeric operand".to_string());
                }
                Ok(())
            }
            op if is_comparison_operator(op) => {
                if matches!(op, "equal" | "not_equal") {
                    // Bool and string equality are legal programs; the
                    // backends refuse string comparisons at lowering.
                    if kinds[0] == kinds[1]
                        && matches!(kinds[0], ReturnKind::Bool | ReturnKind::String)
                    {
                        return Ok(());
                    }
                }
                self.check_numeric_pair(op, &kinds, &expr.args)?;
                Ok(())
            }
            _ => {
                // plus/minus/multiply/divide/modulo. Pointer arithmetic is
                // plus/minus with the pointer on the left and an integer
                // on the right.
                if kinds[1] == ReturnKind::Pointer {
                    return Err("pointer arithmetic requires the pointer on the left".to_string());
                }
                if kinds[0] == ReturnKind::Pointer {
                    if !matches!(op, "plus" | "minus") {
                        return Err(format!("{} does not accept pointer operands", op));
                    }
                    if !kinds[1].to_value_kind().is_integer() {
                        return Err(
                            "pointer arithmetic requires an integer right operand".to_string()
                        );
                    }
                    return Ok(());
                }
                self.check_numeric_pair(op, &kinds, &expr.args)
            }
        }
    }

    fn check_numeric_pair(
        &self,
        op: &str,
        kinds: &[ReturnKind],
        args: &[Expr],
    ) -> Result<(), String> {
        for kind in kinds {
            if !kind.is_numeric() {
                return Err(format!("{} requires numeric operands", op));
            }
        }
        let (a, b) = (kinds[0].to_value_kind(), kinds[1].to_value_kind());
        if a.is_float() != b.is_float() {
            return Err(format!("{} rejects mixed int and float operands", op));
        }
        let unsigned = |k: ValueKind, e: &Expr| {
            k == ValueKind::UInt64 || (e.kind == ExprKind::Literal && e.is_unsigned)
        };
        let signed = |k: ValueKind| matches!(k, ValueKind::Int32 | ValueKind::Int64);
        if (unsigned(a, &args[0]) && signed(b)) || (unsigned(b, &args[1]) && signed(a)) {
            return Err(format!("{} rejects mixed signed and unsigned operands", op));
        }
        Ok(())
    }

    fn validate_print_argument(
        &mut self,
        definition: &'p Definition,
        locals: &LocalMap,
        arg: &Expr,
    ) -> Result<(), String> {
        // Print reaches argv slots directly, so entry-arg accesses and
        // argv-backed bindings are legal here.
        if self.is_entry_args_access(arg, locals) {
            if let Some(index) = arg.args.get(1) {
                self.validate_expr(definition, locals, index)?;
            }
            return Ok(());
        }
        if self.is_entry_arg_string_read(arg, locals) {
            return Ok(());
        }
        self.validate_expr(definition, locals, arg)
    }

    fn validate_collection_literal(
        &mut self,
        definition: &'p Definition,
        locals: &LocalMap,
        expr: &Expr,
        collection: &str,
    ) -> Result<(), String> {
        match collection {
            "array" | "vector" => {
                if expr.template_args.len() != 1 {
                    return Err(format!(
                        "{} requires exactly one template argument",
                        collection
                    ));
                }
                if collection == "vector" && !expr.args.is_empty() {
                    self.require_effect("vector literal", "heap_alloc")?;
                }
                let elem_kind = ValueKind::from_type_name(&expr.template_args[0]);
                for arg in &expr.args {
                    self.validate_expr(definition, locals, arg)?;
                    let kind = self.infer_expr_return_kind(locals, arg).to_value_kind();
                    if elem_kind != ValueKind::Unknown && kind != elem_kind {
                        return Err(format!(
                            "{} literal requires {} elements",
                            collection, expr.template_args[0]
                        ));
                    }
                }
                Ok(())
            }
            _ => {
                if expr.template_args.len() != 2 {
                    return Err("map requires exactly two template arguments".to_string());
                }
                if expr.args.len() % 2 != 0 {
                    return Err("map literal requires key/value pairs".to_string());
                }
                let key_kind = ValueKind::from_type_name(&expr.template_args[0]);
                let value_kind = ValueKind::from_type_name(&expr.template_args[1]);
                for (index, arg) in expr.args.iter().enumerate() {
                    self.validate_expr(definition, locals, arg)?;
                    let kind = self.infer_expr_return_kind(locals, arg).to_value_kind();
                    let expected = if index % 2 == 0 { key_kind } else { value_kind };
                    if expected != ValueKind::Unknown && kind != expected {
                        let what = if index % 2 == 0 { "key" } else { "value" };
                        return Err(format!(
                            "map literal {} type mismatch: expected {}",
                            what,
                            expr.template_args[index % 2]
                        ));
                    }
                }
                Ok(())
            }
        }
    }

    fn validate_access(
        &mut self,
        definition: &'p Definition,
        locals: &LocalMap,
        expr: &Expr,
        access: &str,
    ) -> Result<(), String> {
        if expr.args.len() != 2 {
            return Err(format!("{} requires exactly two arguments", access));
        }
        let target = &expr.args[0];
        let index = &expr.args[1];

        // Entry argument elements may only be read where lowering can
        // still reach the live argv slot.
        if self.is_entry_args_name(target, locals) {
            if self.entry_arg_scope == 0 {
                return Err("entry argument strings require string bindings".to_string());
            }
            self.validate_expr(definition, locals, index)?;
            let index_kind = self.infer_expr_return_kind(locals, index);
            if !index_kind.to_value_kind().is_integer() {
                return Err(format!("{} requires an integer index", access));
            }
            return Ok(());
        }
        if self.is_entry_arg_string_read(target, locals) {
            return Err("cannot index entry argument strings".to_string());
        }

        self.validate_expr(definition, locals, target)?;
        let target_kind = self.infer_expr_return_kind(locals, target);
        match target_kind {
            ReturnKind::Map => {
                let (key_kind, _) = self.map_kinds(target, locals);
                self.validate_expr(definition, locals, index)?;
                if self.is_entry_arg_string_read(index, locals) {
                    return Err("map lookup key cannot be an entry argument string".to_string());
                }
                let lookup_kind = self.infer_expr_return_kind(locals, index).to_value_kind();
                if key_kind != ValueKind::Unknown && lookup_kind != key_kind {
                    return Err(format!(
                        "{} requires map key type {}",
                        access,
                        value_kind_name(key_kind)
                    ));
                }
                Ok(())
            }
            ReturnKind::Array | ReturnKind::Vector | ReturnKind::String | ReturnKind::Reference => {
                self.validate_expr(definition, locals, index)?;
                let index_kind = self.infer_expr_return_kind(locals, index);
                if !index_kind.to_value_kind().is_integer() {
                    return Err(format!("{} requires an integer index", access));
                }
                Ok(())
            }
            _ => Err(format!(
                "{} requires array, vector, map, or string target",
                access
            )),
        }
    }

    fn validate_count_call(
        &mut self,
        definition: &'p Definition,
        locals: &LocalMap,
        expr: &Expr,
    ) -> Result<(), String> {
        if expr.args.len() != 1 {
            return Err(format!("{} requires exactly one argument", expr.name));
        }
        let target = &expr.args[0];
        if self.is_entry_args_name(target, locals) {
            return Ok(());
        }
        self.validate_expr(definition, locals, target)?;
        let kind = self.infer_expr_return_kind(locals, target);
        match expr.name.as_str() {
            "capacity" => {
                if kind == ReturnKind::Vector {
                    Ok(())
                } else {
                    Err("capacity requires vector target".to_string())
                }
            }
            _ => match kind {
                ReturnKind::Array | ReturnKind::Vector | ReturnKind::Map | ReturnKind::String => {
                    Ok(())
                }
                _ => {
                    // Two-phase lookup: a free-form count() that is not a
                    // collection count retries as a method on the target.
                    let mut method = expr.clone();
                    method.is_method_call = true;
                    if self.resolve_method_definition(&method, locals).is_some() {
                        return self.validate_user_call(definition, locals, &method);
                    }
                    Err("count requires array, vector, map, or string target".to_string())
                }
            },
        }
    }

    fn vector_helper_applies(&self, expr: &Expr, locals: &LocalMap) -> bool {
        expr.args
            .first()
            .map(|target| {
                matches!(
                    self.infer_expr_return_kind(locals, target),
                    ReturnKind::Vector
                )
            })
            .unwrap_or(false)
    }

    fn validate_vector_helper(
        &mut self,
        definition: &'p Definition,
        locals: &LocalMap,
        expr: &Expr,
        helper: &str,
    ) -> Result<(), String> {
        for arg in &expr.args {
            self.validate_expr(definition, locals, arg)?;
        }
        let expected = match helper {
            "push" | "remove_at" | "remove_swap" | "reserve" => 2,
            _ => 1,
        };
        if expr.args.len() != expected {
            return Err(format!("{} argument count mismatch", helper));
        }
        // Growth helpers need reallocation; both backends refuse them at
        // lowering, but the program itself is legal.
        Ok(())
    }

    fn is_file_method(&self, expr: &Expr, locals: &LocalMap) -> bool {
        expr.is_method_call
            && expr
                .args
                .first()
                .and_then(|target| locals.get(&target.name))
                .is_some_and(|info| info.kind == BindingKind::FileHandle)
    }

    fn validate_file_method(
        &mut self,
        definition: &'p Definition,
        locals: &LocalMap,
        expr: &Expr,
    ) -> Result<(), String> {
        for arg in &expr.args[1..] {
            self.validate_expr(definition, locals, arg)?;
        }
        match expr.name.as_str() {
            "write" | "write_line" => self.require_effect(&expr.name, "file_write"),
            "write_byte" | "write_bytes" => {
                if expr.args.len() != 2 {
                    return Err(format!("{} requires exactly one argument", expr.name));
                }
                self.require_effect(&expr.name, "file_write")
            }
            "read_byte" => self.require_effect(&expr.name, "file_read"),
            "flush" | "close" => Ok(()),
            other => Err(format!("unknown file method: {}", other)),
        }
    }

    fn validate_math_call(
        &mut self,
        definition: &'p Definition,
        locals: &LocalMap,
        expr: &Expr,
    ) -> Result<(), String> {
        for arg in &expr.args {
            self.validate_expr(definition, locals, arg)?;
        }
        let arity = match expr.name.as_str() {
            "clamp" | "lerp" | "fma" | "saturate" => 3,
            "min" | "max" | "pow" | "atan2" | "hypot" | "copysign" => 2,
            _ => 1,
        };
        // saturate is unary in its clamp-to-[0,1] form.
        let arity = if expr.name == "saturate" { 1 } else { arity };
        if expr.args.len() != arity {
            return Err(format!(
                "{} requires exactly {} argument{}",
                expr.name,
                arity,
                if arity == 1 { "" } else { "s" }
            ));
        }
        for arg in &expr.args {
            let kind = self.infer_expr_return_kind(locals, arg);
            if !kind.is_numeric() {
                return Err(format!("{} requires numeric arguments", expr.name));
            }
        }
        Ok(())
    }

    fn validate_user_call(
        &mut self,
        definition: &'p Definition,
        locals: &LocalMap,
        expr: &Expr,
    ) -> Result<(), String> {
        if expr.is_lambda {
            // Lambdas survive validation; both backends reject them.
            return Ok(());
        }
        let resolved = if expr.is_method_call {
            self.resolve_method_definition(expr, locals)
        } else {
            self.resolve_callee_path(expr)
        };
        let Some(path) = resolved else {
            // One more retry: a free call may be a method spelled without
            // the dot (two-phase lookup).
            if !expr.is_method_call && !expr.args.is_empty() {
                let mut method = expr.clone();
                method.is_method_call = true;
                if self.resolve_method_definition(&method, locals).is_some() {
                    return self.validate_user_call(definition, locals, &method);
                }
            }
            if expr.namespace_prefix.as_deref() == Some("/math") {
                return Err(format!("unknown math builtin: {}", expr.name));
            }
            return Err(format!("unknown identifier: {}", expr.name));
        };

        let Some(&callee) = self.definitions.get(path.as_str()) else {
            return Err(format!("unknown identifier: {}", expr.name));
        };
        let given = expr.args.len();
        let required = callee
            .params
            .iter()
            .filter(|param| param.args.is_empty())
            .count();
        if given < required || given > callee.params.len() {
            return Err(format!(
                "call argument count mismatch for {}: expected {}..{}, got {}",
                path,
                required,
                callee.params.len(),
                given
            ));
        }
        for arg in &expr.args {
            self.validate_expr(definition, locals, arg)?;
        }
        // Caller must hold every effect the callee declares.
        let callee_effects = self.definition_effects(callee);
        for effect in &callee_effects {
            if !self.effect_in_scope(effect) {
                return Err(format!("{} requires {} effect", callee.name, effect));
            }
        }
        Ok(())
    }

    /// Method resolution: fully-qualified prefix first, then the
    /// receiver's type namespace (`/i32/inc` for `1i32.inc()`), then free
    /// definitions called method-style.
    pub(crate) fn resolve_method_definition(
        &self,
        expr: &Expr,
        locals: &LocalMap,
    ) -> Option<String> {
        let receiver = expr.args.first()?;
        if let Some(prefix) = &expr.namespace_prefix {
            let path = format!("{}/{}", prefix, expr.name);
            return self.definitions.contains_key(path.as_str()).then_some(path);
        }
        if let Some(type_name) = self.expr_type_name(receiver, locals) {
            let path = format!("/{}/{}", type_name, expr.name);
            if self.definitions.contains_key(path.as_str()) {
                return Some(path);
            }
            for alias in &self.import_aliases {
                let candidate = format!("{}/{}/{}", alias, type_name, expr.name);
                if self.definitions.contains_key(candidate.as_str()) {
                    return Some(candidate);
                }
            }
        }
        self.resolve_callee_path(expr)
    }

    /// Written type name of an expression, used for type-namespace method
    /// lookup.
    pub(crate) fn expr_type_name(&self, expr: &Expr, locals: &LocalMap) -> Option<String> {
        match expr.kind {
            ExprKind::Literal => Some(
                match (expr.int_width, expr.is_unsigned) {
                    (_, true) => "u64",
                    (64, _) => "i64",
                    _ => "i32",
                }
                .to_string(),
            ),
            ExprKind::FloatLiteral => {
                Some(if expr.float_is_single { "f32" } else { "f64" }.to_string())
            }
            ExprKind::BoolLiteral => Some("bool".to_string()),
            ExprKind::StringLiteral => Some("string".to_string()),
            ExprKind::Name => locals.get(&expr.name).map(|info| {
                let name = info.type_name.clone();
                if name == "int" {
                    "i32".to_string()
                } else {
                    name
                }
            }),
            ExprKind::Call => {
                let kind = self.infer_expr_return_kind(locals, expr);
                match kind {
                    ReturnKind::Unknown | ReturnKind::Void => None,
                    ReturnKind::Int32 => Some("i32".to_string()),
                    ReturnKind::Int64 => Some("i64".to_string()),
                    ReturnKind::UInt64 => Some("u64".to_string()),
                    ReturnKind::Float32 => Some("f32".to_string()),
                    ReturnKind::Float64 => Some("f64".to_string()),
                    other => Some(other.type_name().to_string()),
                }
            }
        }
    }

    /// Kind inference from leaves upward.
    pub(crate) fn infer_expr_return_kind(&self, locals: &LocalMap, expr: &Expr) -> ReturnKind {
        match expr.kind {
            ExprKind::Literal => match (expr.int_width, expr.is_unsigned) {
                (_, true) => ReturnKind::UInt64,
                (64, _) => ReturnKind::Int64,
                _ => ReturnKind::Int32,
            },
            ExprKind::FloatLiteral => {
                if expr.float_is_single {
                    ReturnKind::Float32
                } else {
                    ReturnKind::Float64
                }
            }
            ExprKind::StringLiteral => ReturnKind::String,
            ExprKind::BoolLiteral => ReturnKind::Bool,
            ExprKind::Name => {
                if let Some(info) = locals.get(&expr.name) {
                    if expr.namespace_prefix.is_none() {
                        return info.return_kind();
                    }
                }
                if is_math_constant(&expr.name) {
                    return ReturnKind::Float64;
                }
                ReturnKind::Unknown
            }
            ExprKind::Call => self.infer_call_kind(locals, expr),
        }
    }

    fn infer_call_kind(&self, locals: &LocalMap, expr: &Expr) -> ReturnKind {
        if expr.is_simple_call("assign") && expr.args.len() == 2 {
            return self.infer_expr_return_kind(locals, &expr.args[1]);
        }
        if let Some(op) = operator_name(expr) {
            if is_comparison_operator(op) || matches!(op, "and" | "or" | "not") {
                return ReturnKind::Bool;
            }
            let kinds: Vec<ReturnKind> = expr
                .args
                .iter()
                .map(|arg| self.infer_expr_return_kind(locals, arg))
                .collect();
            if kinds.contains(&ReturnKind::Pointer) {
                return ReturnKind::Pointer;
            }
            return combine_numeric_kinds(&kinds);
        }
        if expr.is_simple_call("if") && expr.args.len() == 3 {
            for branch in &expr.args[1..=2] {
                if let Some(value) = envelope_value(branch) {
                    let kind = self.infer_expr_return_kind(locals, value);
                    if kind != ReturnKind::Unknown && kind != ReturnKind::Void {
                        return kind;
                    }
                }
            }
            return ReturnKind::Unknown;
        }
        if expr.is_simple_call("block") {
            if let Some(value) = envelope_value(expr) {
                return self.infer_expr_return_kind(locals, value);
            }
            return ReturnKind::Void;
        }
        if let Some(collection) = collection_name(expr) {
            return match collection {
                "array" => ReturnKind::Array,
                "vector" => ReturnKind::Vector,
                _ => ReturnKind::Map,
            };
        }
        if expr.name == "count" || expr.name == "capacity" {
            if expr.args.len() == 1 {
                let target_kind = self.infer_expr_return_kind(locals, &expr.args[0]);
                let is_collection = matches!(
                    target_kind,
                    ReturnKind::Array | ReturnKind::Vector | ReturnKind::Map | ReturnKind::String
                ) || self.is_entry_args_name(&expr.args[0], locals);
                if is_collection {
                    return ReturnKind::Int32;
                }
                // Two-phase retry as a method call.
                let mut method = expr.clone();
                method.is_method_call = true;
                if let Some(path) = self.resolve_method_definition(&method, locals) {
                    if let Some(callee) = self.definitions.get(path.as_str()) {
                        return self
                            .declared_return_kind(callee)
                            .unwrap_or(ReturnKind::Unknown);
                    }
                }
            }
            return ReturnKind::Int32;
        }
        if array_access_name(expr).is_some() {
            if let Some(target) = expr.args.first() {
                if self.is_entry_args_name(target, locals) {
                    return ReturnKind::String;
                }
                let target_kind = self.infer_expr_return_kind(locals, target);
                return match target_kind {
                    ReturnKind::Array | ReturnKind::Vector | ReturnKind::Reference => {
                        ReturnKind::from_value_kind(self.collection_element_kind(target, locals))
                    }
                    ReturnKind::Map => {
                        ReturnKind::from_value_kind(self.map_kinds(target, locals).1)
                    }
                    ReturnKind::String => ReturnKind::Int32,
                    _ => ReturnKind::Unknown,
                };
            }
            return ReturnKind::Unknown;
        }
        if let Some(helper) = pointer_builtin_name(expr) {
            return match helper {
                "location" => ReturnKind::Reference,
                "address_of" => ReturnKind::Pointer,
                _ => expr
                    .args
                    .first()
                    .and_then(|target| {
                        if target.kind == ExprKind::Name {
                            locals.get(&target.name).map(|info| {
                                ReturnKind::from_value_kind(info.value_kind)
                            })
                        } else {
                            None
                        }
                    })
                    .unwrap_or(ReturnKind::Unknown),
            };
        }
        if expr.is_simple_call("convert") {
            return expr
                .template_args
                .first()
                .map(|t| ReturnKind::from_value_kind(ValueKind::from_type_name(t)))
                .unwrap_or(ReturnKind::Unknown);
        }
        if expr.is_simple_call("try") {
            return ReturnKind::Int32;
        }
        if expr.is_simple_call("File") {
            return ReturnKind::Int64;
        }
        if self.is_result_constructor(expr) {
            return match expr.name.as_str() {
                "ok" if expr.args.len() == 2 => ReturnKind::Int64,
                _ => ReturnKind::Int32,
            };
        }
        if self.is_file_method(expr, locals) {
            return ReturnKind::Int32;
        }
        if is_math_builtin(&expr.name) && !expr.is_method_call {
            return self.infer_math_kind(locals, expr);
        }
        if let Some(print) = print_builtin(&expr.name) {
            let _ = print;
            return ReturnKind::Void;
        }
        if pathspace_effect(&expr.name).is_some() {
            return ReturnKind::Void;
        }
        if vector_helper_name(expr).is_some() && self.vector_helper_applies(expr, locals) {
            return match expr.name.as_str() {
                "pop" => expr
                    .args
                    .first()
                    .map(|t| {
                        ReturnKind::from_value_kind(self.collection_element_kind(t, locals))
                    })
                    .unwrap_or(ReturnKind::Unknown),
                _ => ReturnKind::Void,
            };
        }

        // User definitions and struct constructors.
        let resolved = if expr.is_method_call {
            self.resolve_method_definition(expr, locals)
        } else {
            self.resolve_callee_path(expr)
        };
        if let Some(path) = resolved {
            if self.struct_paths.contains(&path) {
                return ReturnKind::Struct;
            }
            if let Some(callee) = self.definitions.get(path.as_str()) {
                return self
                    .declared_return_kind(callee)
                    .unwrap_or(ReturnKind::Unknown);
            }
        }
        ReturnKind::Unknown
    }

    fn infer_math_kind(&self, locals: &LocalMap, expr: &Expr) -> ReturnKind {
        match expr.name.as_str() {
            "is_nan" | "is_inf" | "is_finite" => ReturnKind::Bool,
            _ => {
                let kinds: Vec<ReturnKind> = expr
                    .args
                    .iter()
                    .map(|arg| self.infer_expr_return_kind(locals, arg))
                    .collect();
                combine_numeric_kinds(&kinds)
            }
        }
    }

    /// Element kind of an array/vector expression (binding or literal).
    pub(crate) fn collection_element_kind(&self, expr: &Expr, locals: &LocalMap) -> ValueKind {
        if expr.kind == ExprKind::Name {
            if let Some(info) = locals.get(&expr.name) {
                return info.value_kind;
            }
        }
        if collection_name(expr).is_some() {
            if let Some(template) = expr.template_args.first() {
                return ValueKind::from_type_name(template);
            }
        }
        ValueKind::Unknown
    }

    /// Key/value kinds of a map expression (binding or literal).
    pub(crate) fn map_kinds(&self, expr: &Expr, locals: &LocalMap) -> (ValueKind, ValueKind) {
        if expr.kind == ExprKind::Name {
            if let Some(info) = locals.get(&expr.name) {
                return (info.map_key_kind, info.map_value_kind);
            }
        }
        if collection_name(expr) == Some("map") && expr.template_args.len() == 2 {
            return (
                ValueKind::from_type_name(&expr.template_args[0]),
                ValueKind::from_type_name(&expr.template_args[1]),
            );
        }
        (ValueKind::Unknown, ValueKind::Unknown)
    }

    /// `Result.ok(...)` / `Result.error(...)` constructor shape.
    pub(crate) fn is_result_constructor(&self, expr: &Expr) -> bool {
        expr.is_method_call
            && expr
                .args
                .first()
                .is_some_and(|recv| recv.kind == ExprKind::Name && recv.name == "Result")
    }

    /// The entry's `array<string>` parameter read by name.
    pub(crate) fn is_entry_args_name(&self, expr: &Expr, locals: &LocalMap) -> bool {
        expr.kind == ExprKind::Name
            && locals
                .get(&expr.name)
                .is_some_and(|info| info.is_entry_args)
    }

    /// `at(args, i)` / `at_unsafe(args, i)` over the entry arguments.
    pub(crate) fn is_entry_args_access(&self, expr: &Expr, locals: &LocalMap) -> bool {
        array_access_name(expr).is_some()
            && expr
                .args
                .first()
                .is_some_and(|target| self.is_entry_args_name(target, locals))
    }

    /// A name bound to an argv-backed string binding.
    pub(crate) fn is_entry_arg_string_read(&self, expr: &Expr, locals: &LocalMap) -> bool {
        expr.kind == ExprKind::Name
            && locals
                .get(&expr.name)
                .is_some_and(|info| info.is_entry_arg_string)
    }

    /// Struct constructors may sit behind value envelopes and
    /// if-expressions in binding initializers.
    pub(crate) fn is_struct_constructor_value(&self, expr: &Expr) -> bool {
        if expr.kind == ExprKind::Call && !expr.is_binding {
            if let Some(path) = self.resolve_callee_path(expr) {
                if self.struct_paths.contains(&path) {
                    return true;
                }
            }
        }
        if expr.is_simple_call("if") && expr.args.len() == 3 {
            return expr.args[1..=2].iter().all(|branch| {
                envelope_value(branch)
                    .map(|value| self.is_struct_constructor_value(value))
                    .unwrap_or(false)
            });
        }
        if let Some(value) = envelope_value(expr) {
            return self.is_struct_constructor_value(value);
        }
        false
    }
}

/// Operator builtins in call position (never method calls).
fn operator_name(expr: &Expr) -> Option<&str> {
    if expr.is_method_call || expr.namespace_prefix.is_some() {
        return None;
    }
    crate::builtins::OPERATOR_BUILTINS
        .iter()
        .copied()
        .find(|op| expr.name == *op)
}

/// Last non-binding expression of a brace envelope, when the node is one.
pub(crate) fn envelope_value(expr: &Expr) -> Option<&Expr> {
    if expr.kind != ExprKind::Call || expr.is_binding || expr.is_method_call {
        return None;
    }
    if !expr.has_blocks() {
        return None;
    }
    if !expr.args.is_empty() || !expr.template_args.is_empty() || expr.has_named_arguments() {
        return None;
    }
    expr.body_arguments.iter().rev().find(|e| !e.is_binding)
}

/// Combine operand kinds for arithmetic: i32 widens to i64, ints widen to
/// the float operand's width, mismatched pairs collapse to Unknown.
pub(crate) fn combine_numeric_kinds(kinds: &[ReturnKind]) -> ReturnKind {
    let mut combined = ReturnKind::Unknown;
    for &kind in kinds {
        if combined == ReturnKind::Unknown {
            combined = kind;
            continue;
        }
        if combined == kind {
            continue;
        }
        combined = match (combined, kind) {
            (ReturnKind::Int32, ReturnKind::Int64) | (ReturnKind::Int64, ReturnKind::Int32) => {
                ReturnKind::Int64
            }
            (ReturnKind::Int32, ReturnKind::UInt64) | (ReturnKind::UInt64, ReturnKind::Int32) => {
                ReturnKind::UInt64
            }
            (ReturnKind::Int64, ReturnKind::UInt64) | (ReturnKind::UInt64, ReturnKind::Int64) => {
                ReturnKind::UInt64
            }
            (a, b) if a.to_value_kind().is_float() && b.to_value_kind().is_integer() => a,
            (a, b) if a.to_value_kind().is_integer() && b.to_value_kind().is_float() => b,
            (ReturnKind::Float32, ReturnKind::Float64)
            | (ReturnKind::Float64, ReturnKind::Float32) => ReturnKind::Float64,
            _ => return ReturnKind::Unknown,
        };
    }
    combined
}

fn value_kind_name(kind: ValueKind) -> &'static str {
    match kind {
        ValueKind::Int32 => "i32",
        ValueKind::Int64 => "i64",
        ValueKind::UInt64 => "u64",
        ValueKind::Float32 => "f32",
        ValueKind::Float64 => "f64",
        ValueKind::Bool => "bool",
        ValueKind::String => "string",
        ValueKind::Unknown => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::{Parser, TextFilters};
    use crate::validator::Validator;

    fn validate(source: &str) -> Result<(), String> {
        let program = Parser::new(source, "test.prism", &TextFilters::default())
            .unwrap()
            .parse()
            .unwrap();
        Validator::validate(&program, "/main", &[], &[])
    }

    #[test]
    fn test_math_builtin_requires_import() {
        let err =
            validate("[return<int>]\nmain() { return(clamp(2i32, 1i32, 5i32)) }\n").unwrap_err();
        assert_eq!(
            err,
            "math builtin requires import /math/* or /math/<name>: clamp"
        );
    }

    #[test]
    fn test_math_builtin_resolves_with_wildcard_import() {
        validate("import /math/*\n[return<int>]\nmain() { return(clamp(2i32, 1i32, 5i32)) }\n")
            .unwrap();
    }

    #[test]
    fn test_math_builtin_resolves_with_single_import() {
        validate(
            "import /math/clamp\n[return<int>]\nmain() { return(clamp(2i32, 1i32, 5i32)) }\n",
        )
        .unwrap();
    }

    #[test]
    fn test_single_import_does_not_expose_others() {
        let err = validate(
            "import /math/sin\n[return<int>]\nmain() { return(clamp(2i32, 1i32, 5i32)) }\n",
        )
        .unwrap_err();
        assert_eq!(
            err,
            "math builtin requires import /math/* or /math/<name>: clamp"
        );
    }

    #[test]
    fn test_math_qualified_builtin_works_without_import() {
        validate("[return<int>]\nmain() { return(/math/clamp(2i32, 1i32, 5i32)) }\n").unwrap();
    }

    #[test]
    fn test_math_constant_requires_import() {
        let err = validate("[return<float>]\nmain() { return(pi) }\n").unwrap_err();
        assert_eq!(
            err,
            "math constant requires import /math/* or /math/<name>: pi"
        );
    }

    #[test]
    fn test_math_qualified_constant_works_without_import() {
        validate("[return<float>]\nmain() { return(/math/pi) }\n").unwrap();
    }

    #[test]
    fn test_math_qualified_non_math_fails() {
        let err = validate("[return<int>]\nmain() { return(/math/frobnicate(1i32)) }\n")
            .unwrap_err();
        assert_eq!(err, "unknown math builtin: frobnicate");
    }

    #[test]
    fn test_unknown_identifier() {
        let err = validate("[return<int>]\nmain() { return(mystery) }\n").unwrap_err();
        assert_eq!(err, "unknown identifier: mystery");
    }

    #[test]
    fn test_arithmetic_rejects_bool_operands() {
        let err = validate("[return<int>]\nmain() { return(plus(true, 1i32)) }\n").unwrap_err();
        assert_eq!(err, "plus requires numeric operands");
    }

    #[test]
    fn test_arithmetic_rejects_mixed_int_float() {
        let err = validate("[return<int>]\nmain() { return(plus(1i32, 1.0f64)) }\n").unwrap_err();
        assert_eq!(err, "plus rejects mixed int and float operands");
    }

    #[test]
    fn test_arithmetic_rejects_mixed_signedness() {
        let err = validate("[return<int>]\nmain() { return(plus(1i32, 1u64)) }\n").unwrap_err();
        assert_eq!(err, "plus rejects mixed signed and unsigned operands");
    }

    #[test]
    fn test_negate_rejects_unsigned() {
        let err = validate("[return<int>]\nmain() { return(negate(1u64)) }\n").unwrap_err();
        assert_eq!(err, "negate rejects unsigned operands");
    }

    #[test]
    fn test_pointer_plus_integer_is_legal() {
        validate(
            "[return<int>]\nmain() {\n  [i32 mut] v{5i32}\n  [Pointer<i32>] p{address_of(v)}\n  [Pointer<i32>] q{plus(p, 1i32)}\n  return(0i32)\n}\n",
        )
        .unwrap();
    }

    #[test]
    fn test_pointer_plus_pointer_rejected() {
        let err = validate(
            "[return<int>]\nmain() {\n  [i32 mut] v{5i32}\n  [Pointer<i32>] p{address_of(v)}\n  [Pointer<i32>] q{plus(p, p)}\n  return(0i32)\n}\n",
        )
        .unwrap_err();
        assert_eq!(err, "pointer arithmetic requires an integer right operand");
    }

    #[test]
    fn test_print_requires_effect() {
        let err = validate(
            "[return<int>]\nmain() {\n  print_line(\"hi\"utf8)\n  return(0i32)\n}\n",
        )
        .unwrap_err();
        assert_eq!(err, "print_line requires io_out effect");
    }

    #[test]
    fn test_print_error_requires_io_err() {
        let err = validate(
            "[return<int> effects(io_out)]\nmain() {\n  print_line_error(\"hi\"utf8)\n  return(0i32)\n}\n",
        )
        .unwrap_err();
        assert_eq!(err, "print_line_error requires io_err effect");
    }

    #[test]
    fn test_effects_transform_masks_in() {
        validate(
            "[return<int>]\nmain() {\n  [effects(io_out)] print_line(\"hi\"utf8)\n  return(0i32)\n}\n",
        )
        .unwrap();
    }

    #[test]
    fn test_vector_literal_requires_heap_alloc() {
        let err = validate(
            "[return<int>]\nmain() {\n  [vector<i32>] v{vector<i32>(1i32)}\n  return(0i32)\n}\n",
        )
        .unwrap_err();
        assert_eq!(err, "vector literal requires heap_alloc effect");
    }

    #[test]
    fn test_empty_vector_literal_exempt() {
        validate(
            "[return<int>]\nmain() {\n  [vector<i32>] v{vector<i32>()}\n  return(0i32)\n}\n",
        )
        .unwrap();
    }

    #[test]
    fn test_map_key_type_checked() {
        let err = validate(
            "[return<int>]\nmain() {\n  [map<i32,i32>] m{map<i32,i32>(1i32, 10i32)}\n  return(m[1i64])\n}\n",
        )
        .unwrap_err();
        assert_eq!(err, "at requires map key type i32");
    }

    #[test]
    fn test_user_call_effect_propagation() {
        let err = validate(
            "[return<int> effects(io_out)]\nnoisy() {\n  print_line(\"x\"utf8)\n  return(1i32)\n}\n[return<int>]\nmain() { return(noisy()) }\n",
        )
        .unwrap_err();
        assert_eq!(err, "noisy requires io_out effect");
    }

    #[test]
    fn test_method_call_via_type_namespace() {
        validate(
            "namespace i32 {\n[return<int>]\ninc([i32] self) { return(plus(self, 1i32)) }\n}\n[return<int>]\nmain() { return(1i32.inc()) }\n",
        )
        .unwrap();
    }

    #[test]
    fn test_count_forwards_to_method() {
        validate(
            "namespace i32 {\n[return<int>]\ncount([i32] self) { return(plus(self, 4i32)) }\n}\n[return<int>]\nmain() { return(count(3i32)) }\n",
        )
        .unwrap();
    }

    #[test]
    fn test_boolean_ops_accept_integers() {
        validate("[return<bool>]\nmain() { return(and(1i32, 0i32)) }\n").unwrap();
    }

    #[test]
    fn test_combine_numeric_kinds() {
        assert_eq!(
            combine_numeric_kinds(&[ReturnKind::Int32, ReturnKind::Int64]),
            ReturnKind::Int64
        );
        assert_eq!(
            combine_numeric_kinds(&[ReturnKind::Float32, ReturnKind::Float64]),
            ReturnKind::Float64
        );
        assert_eq!(
            combine_numeric_kinds(&[ReturnKind::Int32, ReturnKind::Float64]),
            ReturnKind::Float64
        );
        assert_eq!(
            combine_numeric_kinds(&[ReturnKind::Bool, ReturnKind::Int32]),
            ReturnKind::Unknown
        );
    }
}
