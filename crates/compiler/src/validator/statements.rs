//! Statement-level validation: bindings, returns, control sugar.

use crate::ast::{Definition, Expr, ExprKind};
use crate::builtins::{
    collection_name, pointer_builtin_name, BINDING_TYPE_NAMES, SOFTWARE_NUMERIC_NAMES,
};
use crate::types::{BindingInfo, BindingKind, ReturnKind, ValueKind};
use crate::validator::{LocalMap, Validator};
use std::collections::HashSet;

/// Parse a binding's transform list into a [`BindingInfo`] plus the
/// `restrict<T>` target when present. Used for locals, parameters and
/// struct fields alike. Returns `info.type_name` empty when no explicit
/// type transform is present (the caller infers from the initializer).
pub fn parse_binding_info(
    transforms: &[Expr],
    struct_names: &HashSet<String>,
) -> Result<(BindingInfo, Option<String>), String> {
    let mut info = BindingInfo::default();
    let mut restrict_type: Option<String> = None;
    let mut saw_static = false;
    let mut saw_visibility = false;

    for transform in transforms {
        match transform.name.as_str() {
            "mut" => info.is_mutable = true,
            "copy" => {}
            "static" => {
                if saw_static {
                    return Err("duplicate static transform".to_string());
                }
                saw_static = true;
            }
            "public" | "private" => {
                if saw_visibility {
                    return Err("public and private transforms conflict".to_string());
                }
                saw_visibility = true;
            }
            "stack" | "heap" | "buffer" => {
                return Err("bindings do not accept placement transforms".to_string());
            }
            "effects" => {
                return Err("bindings do not accept effects transforms".to_string());
            }
            "capabilities" => {
                return Err("bindings do not accept capabilities transforms".to_string());
            }
            "return" => {
                return Err("bindings do not accept return transforms".to_string());
            }
            "restrict" => {
                if restrict_type.is_some() {
                    return Err("duplicate restrict transform".to_string());
                }
                if transform.template_args.len() != 1 {
                    return Err("restrict requires a template argument".to_string());
                }
                restrict_type = Some(transform.template_args[0].clone());
            }
            "align_bytes" | "align_kbytes" => {
                if !transform.template_args.is_empty() {
                    return Err(format!(
                        "{} does not accept template arguments",
                        transform.name
                    ));
                }
                if transform.args.len() != 1 {
                    return Err(format!("{} requires exactly one argument", transform.name));
                }
                let arg = &transform.args[0];
                if arg.kind != ExprKind::Literal || arg.int_value <= 0 {
                    return Err(format!("{} requires a positive byte count", transform.name));
                }
                if (arg.int_value as u64) & (arg.int_value as u64 - 1) != 0 {
                    return Err(format!("{} requires a power-of-two byte count", transform.name));
                }
            }
            // A tag only: never changes the binding's type.
            "handle" | "gpu_lane" => {}
            name if SOFTWARE_NUMERIC_NAMES.contains(&name) => {
                return Err(format!("software numeric type not supported: {}", name));
            }
            name if BINDING_TYPE_NAMES.contains(&name) || struct_names.contains(name) => {
                if !info.type_name.is_empty() {
                    return Err(format!("conflicting type transforms: {}", name));
                }
                apply_type_transform(&mut info, transform, struct_names)?;
            }
            name => {
                return Err(format!("unknown binding transform: {}", name));
            }
        }
    }
    Ok((info, restrict_type))
}

fn apply_type_transform(
    info: &mut BindingInfo,
    transform: &Expr,
    struct_names: &HashSet<String>,
) -> Result<(), String> {
    info.type_name = transform.name.clone();
    match transform.name.as_str() {
        "array" | "vector" => {
            if transform.template_args.len() != 1 {
                return Err(format!(
                    "{} requires exactly one template argument",
                    transform.name
                ));
            }
            let elem = &transform.template_args[0];
            if SOFTWARE_NUMERIC_NAMES.contains(&elem.as_str()) {
                return Err(format!("software numeric type not supported: {}", elem));
            }
            info.kind = if transform.name == "array" {
                BindingKind::Array
            } else {
                BindingKind::Vector
            };
            info.template_arg = Some(elem.clone());
            info.value_kind = ValueKind::from_type_name(elem);
        }
        "map" => {
            if transform.template_args.len() != 2 {
                return Err("map requires exactly two template arguments".to_string());
            }
            info.kind = BindingKind::Map;
            info.map_key_kind = ValueKind::from_type_name(&transform.template_args[0]);
            info.map_value_kind = ValueKind::from_type_name(&transform.template_args[1]);
            info.value_kind = info.map_value_kind;
        }
        "Pointer" | "Reference" => {
            if transform.template_args.len() != 1 {
                return Err(format!("{} requires a template argument", transform.name));
            }
            let target = &transform.template_args[0];
            let target_kind = ValueKind::from_type_name(target);
            if target_kind == ValueKind::Unknown
                && !struct_names.contains(target)
                && !struct_names.contains(&format!("/{}", target))
            {
                return Err(format!("unknown {} target: {}", transform.name, target));
            }
            info.kind = if transform.name == "Pointer" {
                BindingKind::Pointer
            } else {
                BindingKind::Reference
            };
            info.template_arg = Some(target.clone());
            info.value_kind = target_kind;
        }
        "string" => {
            info.kind = BindingKind::String;
            info.value_kind = ValueKind::String;
        }
        "File" => {
            info.kind = BindingKind::FileHandle;
            info.value_kind = ValueKind::Int64;
        }
        scalar => {
            info.kind = BindingKind::Value;
            info.value_kind = ValueKind::from_type_name(scalar);
            if info.value_kind == ValueKind::Unknown && !struct_names.contains(scalar) {
                return Err(format!("unsupported binding type: {}", scalar));
            }
        }
    }
    Ok(())
}

/// True when the transform list names a type (as opposed to carrying only
/// modifiers).
fn has_explicit_type_transform(transforms: &[Expr], struct_names: &HashSet<String>) -> bool {
    transforms.iter().any(|t| {
        BINDING_TYPE_NAMES.contains(&t.name.as_str()) || struct_names.contains(t.name.as_str())
    })
}

impl<'p> Validator<'p> {
    pub(crate) fn validate_parameter(
        &mut self,
        definition: &Definition,
        param: &Expr,
        locals: &mut LocalMap,
    ) -> Result<(), String> {
        if locals.contains_key(&param.name) {
            return Err(format!("duplicate binding name: {}", param.name));
        }
        let (mut info, restrict_type) =
            parse_binding_info(&param.transforms, &self.struct_paths)?;
        if param.args.len() > 1 {
            return Err("parameter default requires exactly one argument".to_string());
        }
        if let Some(default) = param.args.first() {
            self.check_parameter_default(default)?;
            if info.type_name.is_empty() {
                self.infer_binding_type(default, locals, &mut info)?;
            }
        } else if info.type_name.is_empty() {
            return Err(format!("parameter requires a type: {}", param.name));
        }
        if let Some(restrict) = restrict_type {
            check_restrict(&restrict, &info)?;
        }
        if definition.full_path == self.entry_path
            && info.kind == BindingKind::Array
            && info.template_arg.as_deref() == Some("string")
        {
            info.is_entry_args = true;
        }
        locals.insert(param.name.clone(), info);
        Ok(())
    }

    /// Parameter defaults must be pure: literals, or builtin calls over
    /// literals. Name references, user calls, blocks, bindings and named
    /// arguments are all rejected.
    fn check_parameter_default(&self, expr: &Expr) -> Result<(), String> {
        match expr.kind {
            ExprKind::Literal
            | ExprKind::FloatLiteral
            | ExprKind::StringLiteral
            | ExprKind::BoolLiteral => Ok(()),
            ExprKind::Name => Err("parameter default cannot reference names".to_string()),
            ExprKind::Call => {
                if expr.is_binding {
                    return Err("parameter default cannot contain bindings".to_string());
                }
                if expr.has_blocks() {
                    return Err("parameter default cannot take block arguments".to_string());
                }
                if expr.has_named_arguments() {
                    return Err("parameter default cannot use named arguments".to_string());
                }
                if self.resolve_callee_path(expr).is_some() {
                    return Err("parameter default cannot call user definitions".to_string());
                }
                if collection_name(expr) == Some("vector") && !expr.args.is_empty() {
                    self.require_effect("vector literal", "heap_alloc")?;
                }
                for arg in &expr.args {
                    self.check_parameter_default(arg)?;
                }
                Ok(())
            }
        }
    }

    /// Validate one statement and grow `locals` when it binds.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn validate_statement(
        &mut self,
        definition: &'p Definition,
        locals: &mut LocalMap,
        stmt: &Expr,
        return_kind: ReturnKind,
        allow_return: bool,
        allow_bindings: bool,
        saw_return: &mut bool,
    ) -> Result<(), String> {
        if stmt.is_binding {
            if !allow_bindings {
                return Err("binding not allowed in execution body".to_string());
            }
            return self.validate_binding(definition, locals, stmt);
        }

        // [effects(...)] on a call statement masks in extra effects for
        // the statement's subtree.
        let mut pushed_effects = false;
        if stmt.kind == ExprKind::Call && !stmt.transforms.is_empty() {
            let frame = Self::resolve_execution_effects(stmt)?;
            self.effect_stack.push(frame);
            pushed_effects = true;
        }
        let result = self.validate_statement_inner(
            definition,
            locals,
            stmt,
            return_kind,
            allow_return,
            allow_bindings,
            saw_return,
        );
        if pushed_effects {
            self.effect_stack.pop();
        }
        result
    }

    #[allow(clippy::too_many_arguments)]
    fn validate_statement_inner(
        &mut self,
        definition: &'p Definition,
        locals: &mut LocalMap,
        stmt: &Expr,
        return_kind: ReturnKind,
        allow_return: bool,
        allow_bindings: bool,
        saw_return: &mut bool,
    ) -> Result<(), String> {
        if stmt.kind != ExprKind::Call {
            if !allow_bindings {
                return Err("execution body arguments must be calls".to_string());
            }
            return self.validate_expr(definition, locals, stmt);
        }

        if stmt.is_simple_call("return") {
            if stmt.has_named_arguments() {
                return Err("named arguments not supported for builtin calls".to_string());
            }
            if !allow_return {
                return Err("return not allowed in execution body".to_string());
            }
            if stmt.has_blocks() {
                return Err("return does not accept block arguments".to_string());
            }
            if return_kind == ReturnKind::Void {
                if !stmt.args.is_empty() {
                    return Err("return value not allowed for void definition".to_string());
                }
            } else {
                if stmt.args.len() != 1 {
                    return Err("return requires exactly one argument".to_string());
                }
                self.validate_expr(definition, locals, &stmt.args[0])?;
                if return_kind != ReturnKind::Unknown {
                    let expr_kind = self.infer_expr_return_kind(locals, &stmt.args[0]);
                    if !return_matches(return_kind, expr_kind, &stmt.args[0], locals) {
                        return Err(format!(
                            "return type mismatch: expected {}",
                            return_kind.type_name()
                        ));
                    }
                }
            }
            *saw_return = true;
            return Ok(());
        }

        if stmt.is_simple_call("if") {
            if stmt.has_named_arguments() {
                return Err("named arguments not supported for builtin calls".to_string());
            }
            if stmt.has_blocks() {
                return Err("if does not accept trailing block arguments".to_string());
            }
            if stmt.args.len() != 3 {
                return Err("if requires condition, then, else".to_string());
            }
            self.validate_expr(definition, locals, &stmt.args[0])?;
            let cond_kind = self.infer_expr_return_kind(locals, &stmt.args[0]);
            if cond_kind != ReturnKind::Bool {
                return Err("if condition requires bool".to_string());
            }
            for branch in &stmt.args[1..=2] {
                if !is_block_envelope(branch) {
                    return Err("if branches require block envelopes".to_string());
                }
                let mut branch_locals = locals.clone();
                for body_stmt in &branch.body_arguments {
                    self.validate_statement(
                        definition,
                        &mut branch_locals,
                        body_stmt,
                        return_kind,
                        allow_return,
                        allow_bindings,
                        saw_return,
                    )?;
                }
            }
            return Ok(());
        }

        if stmt.is_simple_call("repeat") {
            if stmt.args.len() != 1 {
                return Err("repeat requires exactly one count argument".to_string());
            }
            self.validate_expr(definition, locals, &stmt.args[0])?;
            let count_kind = self.infer_expr_return_kind(locals, &stmt.args[0]);
            if !count_kind.to_value_kind().is_integer() && count_kind != ReturnKind::Bool {
                return Err("repeat requires an integer count".to_string());
            }
            let mut body_locals = locals.clone();
            for body_stmt in &stmt.body_arguments {
                self.validate_statement(
                    definition,
                    &mut body_locals,
                    body_stmt,
                    return_kind,
                    allow_return,
                    allow_bindings,
                    saw_return,
                )?;
            }
            return Ok(());
        }

        if stmt.is_simple_call("block") && stmt.args.is_empty() {
            let mut body_locals = locals.clone();
            for body_stmt in &stmt.body_arguments {
                self.validate_statement(
                    definition,
                    &mut body_locals,
                    body_stmt,
                    return_kind,
                    allow_return,
                    allow_bindings,
                    saw_return,
                )?;
            }
            return Ok(());
        }

        if stmt.is_simple_call("on_error") {
            if stmt.args.is_empty() {
                return Err("on_error requires a handler".to_string());
            }
            let handler = &stmt.args[0];
            self.resolve_callee_path(handler)
                .ok_or_else(|| format!("unknown on_error handler: {}", handler.name))?;
            // Bound arguments ride along to the handler; validate them
            // in the current scope.
            for arg in &stmt.args[1..] {
                self.validate_expr(definition, locals, arg)?;
            }
            return Ok(());
        }

        self.validate_expr(definition, locals, stmt)
    }

    fn validate_binding(
        &mut self,
        definition: &'p Definition,
        locals: &mut LocalMap,
        stmt: &Expr,
    ) -> Result<(), String> {
        if stmt.has_blocks() {
            return Err("binding does not accept block arguments".to_string());
        }
        if locals.contains_key(&stmt.name) {
            return Err(format!("duplicate binding name: {}", stmt.name));
        }
        let (mut info, restrict_type) =
            parse_binding_info(&stmt.transforms, &self.struct_paths)?;
        if stmt.args.len() != 1 {
            return Err("binding requires exactly one argument".to_string());
        }
        let initializer = &stmt.args[0];

        let entry_arg_init = self.is_entry_args_access(initializer, locals)
            || self.is_entry_arg_string_read(initializer, locals);
        if entry_arg_init {
            self.entry_arg_scope += 1;
        }
        let validated = self.validate_expr(definition, locals, initializer);
        if entry_arg_init {
            self.entry_arg_scope -= 1;
        }
        validated?;

        let init_kind = self.infer_expr_return_kind(locals, initializer);
        if init_kind == ReturnKind::Void && !self.is_struct_constructor_value(initializer) {
            return Err("binding initializer requires a value".to_string());
        }
        if !has_explicit_type_transform(&stmt.transforms, &self.struct_paths) {
            self.infer_binding_type(initializer, locals, &mut info)?;
        }
        if let Some(restrict) = restrict_type {
            check_restrict(&restrict, &info)?;
        }
        if entry_arg_init {
            if info.type_name != "string" && info.kind != BindingKind::String {
                return Err("entry argument strings require string bindings".to_string());
            }
            info.is_entry_arg_string = true;
        }
        if info.type_name == "Reference" {
            let ok = pointer_builtin_name(initializer) == Some("location")
                && initializer.args.len() == 1;
            if !ok {
                return Err("Reference bindings require location(...)".to_string());
            }
            let target = &initializer.args[0];
            if target.kind != ExprKind::Name || !locals.contains_key(&target.name) {
                return Err("location requires a local binding".to_string());
            }
            if let Some(target_info) = locals.get(&target.name) {
                info.reference_to_array =
                    matches!(target_info.kind, BindingKind::Array | BindingKind::Vector);
            }
        }
        locals.insert(stmt.name.clone(), info);
        Ok(())
    }

    /// Infer the binding's type from the initializer's expression kind
    /// when no explicit type transform is present.
    pub(crate) fn infer_binding_type(
        &self,
        initializer: &Expr,
        locals: &LocalMap,
        info: &mut BindingInfo,
    ) -> Result<(), String> {
        // Collection constructors carry their template arguments.
        if let Some(collection) = collection_name(initializer) {
            let mut synthetic = Expr::name_ref(collection);
            synthetic.template_args = initializer.template_args.clone();
            return apply_type_transform(info, &synthetic, &self.struct_paths);
        }
        if initializer.is_simple_call("File") {
            info.type_name = "File".to_string();
            info.kind = BindingKind::FileHandle;
            info.value_kind = ValueKind::Int64;
            return Ok(());
        }
        if pointer_builtin_name(initializer) == Some("location") {
            info.type_name = "Reference".to_string();
            info.kind = BindingKind::Reference;
            if let Some(target) = initializer.args.first() {
                if let Some(target_info) = locals.get(&target.name) {
                    info.value_kind = target_info.value_kind;
                    info.reference_to_array =
                        matches!(target_info.kind, BindingKind::Array | BindingKind::Vector);
                }
            }
            return Ok(());
        }
        if pointer_builtin_name(initializer) == Some("address_of") {
            info.type_name = "Pointer".to_string();
            info.kind = BindingKind::Pointer;
            if let Some(target) = initializer.args.first() {
                if let Some(target_info) = locals.get(&target.name) {
                    info.value_kind = target_info.value_kind;
                }
            }
            return Ok(());
        }
        let kind = self.infer_expr_return_kind(locals, initializer);
        match kind {
            ReturnKind::Array | ReturnKind::Vector => {
                info.kind = if kind == ReturnKind::Array {
                    BindingKind::Array
                } else {
                    BindingKind::Vector
                };
                info.type_name = kind.type_name().to_string();
                info.value_kind = self.collection_element_kind(initializer, locals);
            }
            ReturnKind::Map => {
                info.kind = BindingKind::Map;
                info.type_name = "map".to_string();
                let (key, value) = self.map_kinds(initializer, locals);
                info.map_key_kind = key;
                info.map_value_kind = value;
                info.value_kind = value;
            }
            ReturnKind::String => {
                info.kind = BindingKind::String;
                info.type_name = "string".to_string();
                info.value_kind = ValueKind::String;
            }
            ReturnKind::Struct => {
                info.kind = BindingKind::Value;
                info.type_name = "struct".to_string();
            }
            ReturnKind::Pointer => {
                info.kind = BindingKind::Pointer;
                info.type_name = "Pointer".to_string();
            }
            ReturnKind::Reference => {
                info.kind = BindingKind::Reference;
                info.type_name = "Reference".to_string();
            }
            other => {
                let value_kind = other.to_value_kind();
                if value_kind == ValueKind::Unknown {
                    return Err("binding initializer requires a value".to_string());
                }
                info.kind = BindingKind::Value;
                info.value_kind = value_kind;
                info.type_name = other.type_name().to_string();
            }
        }
        Ok(())
    }
}

/// Branches of `if` must be calls carrying only brace continuations.
pub(crate) fn is_block_envelope(expr: &Expr) -> bool {
    expr.kind == ExprKind::Call
        && !expr.is_binding
        && !expr.is_method_call
        && expr.args.is_empty()
        && expr.template_args.is_empty()
        && !expr.has_named_arguments()
        && (expr.has_body_arguments || expr.body_arguments.is_empty())
}

fn check_restrict(restrict: &str, info: &BindingInfo) -> Result<(), String> {
    if SOFTWARE_NUMERIC_NAMES.contains(&restrict) {
        return Err(format!("software numeric type not supported: {}", restrict));
    }
    let matches = match &info.template_arg {
        Some(template) => {
            restrict == format!("{}<{}>", info.type_name, template)
                || restrict == info.type_name
        }
        None => {
            restrict == info.type_name
                || ValueKind::from_type_name(restrict) == info.value_kind
        }
    };
    if !matches {
        return Err("restrict type does not match binding type".to_string());
    }
    Ok(())
}

/// Return-kind compatibility: exact matches plus the int alias and the
/// packed-Result conventions.
fn return_matches(
    declared: ReturnKind,
    actual: ReturnKind,
    expr: &Expr,
    locals: &LocalMap,
) -> bool {
    if declared == actual {
        return true;
    }
    // Result-bearing definitions return their packed representation.
    if declared == ReturnKind::Int64 && actual == ReturnKind::Int32 {
        return expr.is_method_call
            && expr.args.first().is_some_and(|a| a.name == "Result");
    }
    if declared == ReturnKind::Int32 && actual == ReturnKind::Bool {
        return false;
    }
    // An argv-backed string binding may be re-returned directly.
    if declared == ReturnKind::String && actual == ReturnKind::String {
        return true;
    }
    let _ = locals;
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::{Parser, TextFilters};

    fn validate(source: &str) -> Result<(), String> {
        let program = Parser::new(source, "test.prism", &TextFilters::default())
            .unwrap()
            .parse()
            .unwrap();
        Validator::validate(&program, "/main", &[], &[])
    }

    #[test]
    fn test_binding_accepts_brace_initializer() {
        validate("[return<int>]\nmain() {\n  [i32] value{5i32}\n  return(value)\n}\n").unwrap();
    }

    #[test]
    fn test_binding_infers_type_without_transforms() {
        validate("[return<i64>]\nmain() {\n  [mut] value{5i64}\n  return(value)\n}\n").unwrap();
    }

    #[test]
    fn test_duplicate_binding_rejected() {
        let err = validate(
            "[return<int>]\nmain() {\n  [i32] v{1i32}\n  [i32] v{2i32}\n  return(v)\n}\n",
        )
        .unwrap_err();
        assert_eq!(err, "duplicate binding name: v");
    }

    #[test]
    fn test_software_numeric_bindings_rejected() {
        let err = validate("[return<int>]\nmain() {\n  [i16] v{1i32}\n  return(1i32)\n}\n")
            .unwrap_err();
        assert_eq!(err, "software numeric type not supported: i16");
    }

    #[test]
    fn test_binding_rejects_placement_transforms() {
        let err = validate("[return<int>]\nmain() {\n  [i32 stack] v{1i32}\n  return(v)\n}\n")
            .unwrap_err();
        assert_eq!(err, "bindings do not accept placement transforms");
    }

    #[test]
    fn test_binding_rejects_return_transform() {
        let err = validate(
            "[return<int>]\nmain() {\n  [i32 return<int>] v{1i32}\n  return(v)\n}\n",
        )
        .unwrap_err();
        assert_eq!(err, "bindings do not accept return transforms");
    }

    #[test]
    fn test_restrict_matches_binding_type() {
        validate(
            "[return<int>]\nmain() {\n  [i32 restrict<i32>] v{1i32}\n  return(v)\n}\n",
        )
        .unwrap();
        let err = validate(
            "[return<int>]\nmain() {\n  [i32 restrict<i64>] v{1i32}\n  return(v)\n}\n",
        )
        .unwrap_err();
        assert_eq!(err, "restrict type does not match binding type");
    }

    #[test]
    fn test_restrict_accepts_int_alias() {
        validate(
            "[return<int>]\nmain() {\n  [int restrict<i32>] v{1i32}\n  return(v)\n}\n",
        )
        .unwrap();
    }

    #[test]
    fn test_align_bytes_validation() {
        validate(
            "[return<int>]\nmain() {\n  [i32 align_bytes(16i32)] v{1i32}\n  return(v)\n}\n",
        )
        .unwrap();
        let err = validate(
            "[return<int>]\nmain() {\n  [i32 align_bytes(12i32)] v{1i32}\n  return(v)\n}\n",
        )
        .unwrap_err();
        assert_eq!(err, "align_bytes requires a power-of-two byte count");
    }

    #[test]
    fn test_reference_requires_location() {
        let err = validate(
            "[return<int>]\nmain() {\n  [Reference<i32>] r{5i32}\n  return(1i32)\n}\n",
        )
        .unwrap_err();
        assert_eq!(err, "Reference bindings require location(...)");
    }

    #[test]
    fn test_reference_of_local_validates() {
        validate(
            "[return<int>]\nmain() {\n  [i32 mut] v{5i32}\n  [Reference<i32>] r{location(v)}\n  return(dereference(r))\n}\n",
        )
        .unwrap();
    }

    #[test]
    fn test_array_requires_one_template_argument() {
        let err = validate(
            "[return<int>]\nmain() {\n  [array] v{array<i32>(1i32)}\n  return(1i32)\n}\n",
        )
        .unwrap_err();
        assert_eq!(err, "array requires exactly one template argument");
    }

    #[test]
    fn test_map_requires_two_template_arguments() {
        let err = validate(
            "[return<int>]\nmain() {\n  [map<i32>] m{map<i32,i32>()}\n  return(1i32)\n}\n",
        )
        .unwrap_err();
        assert_eq!(err, "map requires exactly two template arguments");
    }

    #[test]
    fn test_if_condition_requires_bool() {
        let err = validate(
            "[return<int>]\nmain() {\n  if(1i32) {\n    return(1i32)\n  } else {\n    return(2i32)\n  }\n}\n",
        )
        .unwrap_err();
        assert_eq!(err, "if condition requires bool");
    }

    #[test]
    fn test_return_type_mismatch() {
        let err = validate("[return<int>]\nmain() { return(1i64) }\n").unwrap_err();
        assert_eq!(err, "return type mismatch: expected int");
    }

    #[test]
    fn test_void_return_rejects_value() {
        let err = validate("main() { return(1i32) }\n").unwrap_err();
        assert_eq!(err, "return value not allowed for void definition");
    }

    #[test]
    fn test_repeat_with_bool_count() {
        validate("[return<int>]\nmain() {\n  repeat(true) {\n  }\n  return(0i32)\n}\n").unwrap();
    }

    #[test]
    fn test_parameter_default_rejects_names() {
        let err = validate(
            "[return<int>]\nhelper([i32] x{y}) { return(x) }\n[return<int>]\nmain() { return(1i32) }\n",
        )
        .unwrap_err();
        assert_eq!(err, "parameter default cannot reference names");
    }

    #[test]
    fn test_parameter_default_literal_allowed() {
        validate(
            "[return<int>]\nhelper([i32] x{3i32}) { return(x) }\n[return<int>]\nmain() { return(helper()) }\n",
        )
        .unwrap();
    }

    #[test]
    fn test_parameter_infers_type_from_default() {
        validate(
            "[return<i64>]\nhelper([mut] x{3i64}) { return(x) }\n[return<i64>]\nmain() { return(helper()) }\n",
        )
        .unwrap();
    }

    #[test]
    fn test_entry_arg_string_binding() {
        validate(
            "[return<int> effects(io_out)]\nmain([array<string>] args) {\n  [string] key{args[1i32]}\n  print_line(key)\n  return(0i32)\n}\n",
        )
        .unwrap();
    }

    #[test]
    fn test_entry_arg_requires_string_binding() {
        let err = validate(
            "[return<int>]\nmain([array<string>] args) {\n  [i32] key{args[1i32]}\n  return(0i32)\n}\n",
        )
        .unwrap_err();
        assert_eq!(err, "entry argument strings require string bindings");
    }
}
