//! Semantic validator.
//!
//! Walks a parsed [`Program`] with a symbol environment and verifies the
//! language rules the lowerer relies on: transform legality, typing,
//! mutability, effect/capability propagation, math-namespace gating,
//! collection shape rules and entry-point shape. The walk is read-only
//! and stops at the first violation; the diagnostic string it returns is
//! what the driver prints behind the `Semantic error: ` prefix.

mod effects;
mod exprs;
mod statements;

use crate::ast::{Definition, Expr, Program};
use crate::builtins::{
    is_math_builtin, is_math_constant, DEFAULT_EFFECT_EXPANSION, EXCLUSIVE_DEFINITION_TAGS,
    EXCLUSIVE_TRANSFORM_GROUPS,
};
use crate::types::{BindingInfo, ReturnKind};
use std::collections::{HashMap, HashSet};

pub use statements::parse_binding_info;

/// Map of in-scope bindings (parameters and locals) by name.
pub(crate) type LocalMap = HashMap<String, BindingInfo>;

/// Declared Result shape of a definition's return type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResultInfo {
    pub is_result: bool,
    pub has_value: bool,
}

pub struct Validator<'p> {
    pub(crate) program: &'p Program,
    pub(crate) definitions: HashMap<String, &'p Definition>,
    pub(crate) struct_paths: HashSet<String>,
    /// Namespace prefixes whose simple names are exposed by imports.
    pub(crate) import_aliases: Vec<String>,
    pub(crate) math_wildcard: bool,
    pub(crate) math_symbols: HashSet<String>,
    pub(crate) entry_path: String,
    /// Effect sets applied to the entry when its declaration is silent.
    default_effects: Vec<String>,
    default_capabilities: Vec<String>,
    /// Effect scopes: the definition's declared set at the bottom, one
    /// frame per active `[effects(...)]` statement transform above it.
    pub(crate) effect_stack: Vec<HashSet<String>>,
    /// Non-zero while validating an initializer that binds an entry
    /// argument element; restricts where the binding may be used.
    pub(crate) entry_arg_scope: usize,
}

impl<'p> Validator<'p> {
    pub fn new(program: &'p Program) -> Self {
        Validator {
            program,
            definitions: HashMap::new(),
            struct_paths: HashSet::new(),
            import_aliases: Vec::new(),
            math_wildcard: false,
            math_symbols: HashSet::new(),
            entry_path: String::new(),
            default_effects: Vec::new(),
            default_capabilities: Vec::new(),
            effect_stack: Vec::new(),
            entry_arg_scope: 0,
        }
    }

    /// Validate the whole program for the given entry path. The default
    /// effect/capability tokens apply only when the entry definition
    /// declares none of its own.
    pub fn validate(
        program: &'p Program,
        entry_path: &str,
        default_effects: &[String],
        default_capabilities: &[String],
    ) -> Result<(), String> {
        let mut validator = Validator::new(program);
        validator.entry_path = entry_path.to_string();
        validator.default_effects = default_effects.to_vec();
        validator.default_capabilities = default_capabilities.to_vec();
        validator.build_symbol_table()?;
        validator.check_entry_shape()?;
        for definition in &program.definitions {
            validator.validate_definition(definition)?;
        }
        Ok(())
    }

    fn build_symbol_table(&mut self) -> Result<(), String> {
        for definition in &self.program.definitions {
            if self
                .definitions
                .insert(definition.full_path.clone(), definition)
                .is_some()
            {
                return Err(format!("duplicate definition: {}", definition.full_path));
            }
            if definition.is_field_only() {
                self.struct_paths.insert(definition.full_path.clone());
            }
        }

        let root_names: HashSet<&str> = self
            .program
            .definitions
            .iter()
            .filter(|d| d.full_path == format!("/{}", d.name))
            .map(|d| d.name.as_str())
            .collect();

        for import in &self.program.imports {
            let path = import.path.as_str();
            if path == "/math/*" {
                self.math_wildcard = true;
                for name in root_names.iter() {
                    if is_math_builtin(name) || is_math_constant(name) {
                        return Err(format!("import creates name conflict: {}", name));
                    }
                }
                continue;
            }
            if let Some(symbol) = path.strip_prefix("/math/") {
                if !is_math_builtin(symbol) && !is_math_constant(symbol) {
                    return Err(format!("unknown math import: {}", symbol));
                }
                if root_names.contains(symbol) {
                    return Err(format!("import creates name conflict: {}", symbol));
                }
                self.math_symbols.insert(symbol.to_string());
                continue;
            }
            if !path.starts_with('/') || path.contains('*') {
                return Err(format!("invalid import path: {}", path));
            }
            // Namespace alias: exposing /prefix/name as bare `name` must
            // not shadow a root definition of the same simple name.
            for definition in &self.program.definitions {
                if let Some(rest) = definition.full_path.strip_prefix(path) {
                    let Some(simple) = rest.strip_prefix('/') else {
                        continue;
                    };
                    if simple.contains('/') {
                        return Err(format!(
                            "import alias does not cover nested definitions: {}",
                            definition.full_path
                        ));
                    }
                    if root_names.contains(simple) {
                        return Err(format!("import creates name conflict: {}", simple));
                    }
                }
            }
            self.import_aliases.push(path.to_string());
        }
        Ok(())
    }

    fn check_entry_shape(&mut self) -> Result<(), String> {
        let entry = self
            .definitions
            .get(self.entry_path.as_str())
            .copied()
            .ok_or_else(|| format!("missing entry definition: {}", self.entry_path))?;
        match entry.params.len() {
            0 => {}
            1 => {
                let param = &entry.params[0];
                let is_args = param
                    .transforms
                    .iter()
                    .any(|t| t.name == "array" && t.template_args == ["string"]);
                if !is_args {
                    return Err("entry parameter must be array<string>".to_string());
                }
                if !param.args.is_empty() {
                    return Err("entry parameter must not have a default".to_string());
                }
            }
            _ => return Err("entry accepts at most one parameter".to_string()),
        }
        Ok(())
    }

    /// Expand `--default-effects` tokens: `default` grants the io_out
    /// set, `none` grants nothing, any other token names itself.
    pub(crate) fn expand_effect_tokens(tokens: &[String]) -> HashSet<String> {
        let mut set = HashSet::new();
        for token in tokens {
            match token.as_str() {
                "default" => {
                    for effect in DEFAULT_EFFECT_EXPANSION {
                        set.insert((*effect).to_string());
                    }
                }
                "none" | "" => {}
                other => {
                    set.insert(other.to_string());
                }
            }
        }
        set
    }

    /// Declared effects of a definition, with the entry defaults applied
    /// to an entry whose declaration is silent.
    pub(crate) fn definition_effects(&self, definition: &Definition) -> HashSet<String> {
        let declared: Vec<String> = definition
            .find_transform("effects")
            .map(|t| t.args.iter().map(|a| a.name.clone()).collect())
            .unwrap_or_default();
        if declared.is_empty() && definition.full_path == self.entry_path {
            return Self::expand_effect_tokens(&self.default_effects);
        }
        Self::expand_effect_tokens(&declared)
    }

    pub(crate) fn definition_capabilities(&self, definition: &Definition) -> HashSet<String> {
        let declared: Vec<String> = definition
            .find_transform("capabilities")
            .map(|t| t.args.iter().map(|a| a.name.clone()).collect())
            .unwrap_or_default();
        if declared.is_empty() && definition.full_path == self.entry_path {
            return Self::expand_effect_tokens(&self.default_capabilities);
        }
        Self::expand_effect_tokens(&declared)
    }

    fn validate_definition(&mut self, definition: &'p Definition) -> Result<(), String> {
        self.check_definition_transforms(definition)?;

        let effects = self.definition_effects(definition);
        let capabilities = self.definition_capabilities(definition);
        for capability in &capabilities {
            if !effects.contains(capability) {
                return Err("capabilities must be a subset of effects".to_string());
            }
        }
        self.effect_stack.clear();
        self.effect_stack.push(effects);

        // Seed the locals map with parameters.
        let mut locals: LocalMap = HashMap::new();
        for param in &definition.params {
            self.validate_parameter(definition, param, &mut locals)?;
        }

        if definition.is_field_only() {
            // Struct definitions: fields are bindings, validated above the
            // same way locals are; nothing further to walk.
            let mut field_locals = locals;
            for field in &definition.body {
                self.validate_statement(
                    definition,
                    &mut field_locals,
                    field,
                    ReturnKind::Void,
                    false,
                    true,
                    &mut false,
                )?;
            }
            return Ok(());
        }

        let return_kind = self.declared_return_kind(definition)?;
        let mut saw_return = false;
        for statement in &definition.body {
            self.validate_statement(
                definition,
                &mut locals,
                statement,
                return_kind,
                true,
                true,
                &mut saw_return,
            )?;
        }
        Ok(())
    }

    fn check_definition_transforms(&self, definition: &Definition) -> Result<(), String> {
        for group in EXCLUSIVE_TRANSFORM_GROUPS {
            let present: Vec<&str> = group
                .iter()
                .copied()
                .filter(|name| definition.has_transform(name))
                .collect();
            if present.len() > 1 {
                return Err(format!(
                    "{} and {} transforms conflict",
                    present[0], present[1]
                ));
            }
        }
        let tags: Vec<&str> = EXCLUSIVE_DEFINITION_TAGS
            .iter()
            .copied()
            .filter(|name| definition.has_transform(name))
            .collect();
        if tags.len() > 1 {
            return Err(format!("{} and {} transforms conflict", tags[0], tags[1]));
        }
        if definition.has_transform("pod") {
            for field in &definition.body {
                if field.has_transform("handle") {
                    return Err("pod definitions cannot contain handle fields".to_string());
                }
                if field.has_transform("gpu_lane") {
                    return Err("pod definitions cannot contain gpu_lane fields".to_string());
                }
            }
        }
        Ok(())
    }

    /// Declared or inferred return kind for a definition. Without a
    /// `return<T>` transform the body's `return(expr)` statements decide;
    /// a body with no return statement is void.
    pub(crate) fn declared_return_kind(&self, definition: &Definition) -> Result<ReturnKind, String> {
        if let Some(type_name) = definition.declared_return_type() {
            return Ok(return_kind_from_type_name(type_name));
        }
        if definition.has_transform("pod")
            || definition.has_transform("handle")
            || definition.is_field_only()
        {
            return Ok(ReturnKind::Struct);
        }
        Ok(ReturnKind::Unknown)
    }

    /// Result shape of a definition's declared return type
    /// (`return<Result>` or `return<Result<int>>`).
    pub(crate) fn result_info(definition: &Definition) -> ResultInfo {
        match definition.declared_return_type() {
            Some("Result") => ResultInfo {
                is_result: true,
                has_value: false,
            },
            Some(name) if name.starts_with("Result<") => ResultInfo {
                is_result: true,
                has_value: true,
            },
            _ => ResultInfo::default(),
        }
    }

    /// Resolve a call head to a definition path using the namespace
    /// prefix, the root namespace and active import aliases, in that
    /// order.
    pub(crate) fn resolve_callee_path(&self, expr: &Expr) -> Option<String> {
        if let Some(prefix) = &expr.namespace_prefix {
            let path = if prefix == "/" {
                format!("/{}", expr.name)
            } else {
                format!("{}/{}", prefix, expr.name)
            };
            return self.definitions.contains_key(path.as_str()).then_some(path);
        }
        let root = format!("/{}", expr.name);
        if self.definitions.contains_key(root.as_str()) {
            return Some(root);
        }
        for alias in &self.import_aliases {
            let candidate = format!("{}/{}", alias, expr.name);
            if self.definitions.contains_key(candidate.as_str()) {
                return Some(candidate);
            }
        }
        None
    }

    /// Whether a math builtin/constant name is reachable: qualified
    /// `/math/...` always resolves; bare names need a wildcard or
    /// matching single-symbol import.
    pub(crate) fn math_name_reachable(&self, expr: &Expr, name: &str) -> bool {
        if expr.namespace_prefix.as_deref() == Some("/math") {
            return true;
        }
        if expr.namespace_prefix.is_some() {
            return false;
        }
        self.math_wildcard || self.math_symbols.contains(name)
    }
}

/// Map a written return type name to a semantic kind.
pub(crate) fn return_kind_from_type_name(name: &str) -> ReturnKind {
    match name {
        "int" | "i32" => ReturnKind::Int32,
        "i64" => ReturnKind::Int64,
        "u64" => ReturnKind::UInt64,
        "f32" => ReturnKind::Float32,
        "float" | "f64" => ReturnKind::Float64,
        "bool" => ReturnKind::Bool,
        "string" => ReturnKind::String,
        "void" => ReturnKind::Void,
        "Result" => ReturnKind::Int32,
        name if name.starts_with("Result<") => ReturnKind::Int64,
        name if name.starts_with("array") => ReturnKind::Array,
        name if name.starts_with("vector") => ReturnKind::Vector,
        name if name.starts_with("map") => ReturnKind::Map,
        _ => ReturnKind::Struct,
    }
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
    fn test_missing_entry_fails() {
        let err = validate("[return<int>]\nother() { return(1i32) }\n").unwrap_err();
        assert_eq!(err, "missing entry definition: /main");
    }

    #[test]
    fn test_entry_rejects_non_args_parameter() {
        let err = validate("[return<int>]\nmain([i32] x) { return(x) }\n").unwrap_err();
        assert_eq!(err, "entry parameter must be array<string>");
    }

    #[test]
    fn test_entry_accepts_args_parameter() {
        validate("[return<int>]\nmain([array<string>] args) { return(args.count()) }\n").unwrap();
    }

    #[test]
    fn test_duplicate_definitions_rejected() {
        let err = validate(
            "[return<int>]\nmain() { return(1i32) }\n[return<int>]\nmain() { return(2i32) }\n",
        )
        .unwrap_err();
        assert_eq!(err, "duplicate definition: /main");
    }

    #[test]
    fn test_import_name_conflict() {
        let err = validate(
            "import /util\n[return<int>]\ndouble() { return(1i32) }\nnamespace util {\n[return<int>]\ndouble() { return(2i32) }\n}\n[return<int>]\nmain() { return(1i32) }\n",
        )
        .unwrap_err();
        assert_eq!(err, "import creates name conflict: double");
    }

    #[test]
    fn test_math_import_conflicts_with_root_definition() {
        let err = validate(
            "import /math/*\n[return<int>]\nclamp() { return(1i32) }\n[return<int>]\nmain() { return(1i32) }\n",
        )
        .unwrap_err();
        assert_eq!(err, "import creates name conflict: clamp");
    }

    #[test]
    fn test_unknown_math_import_rejected() {
        let err = validate(
            "import /math/frobnicate\n[return<int>]\nmain() { return(1i32) }\n",
        )
        .unwrap_err();
        assert_eq!(err, "unknown math import: frobnicate");
    }

    #[test]
    fn test_capabilities_must_be_subset() {
        let err = validate(
            "[return<int> effects(io_out) capabilities(io_err)]\nmain() { return(1i32) }\n",
        )
        .unwrap_err();
        assert_eq!(err, "capabilities must be a subset of effects");
    }

    #[test]
    fn test_pod_handle_conflict() {
        let err = validate(
            "[pod handle]\nPoint() {\n  [i32] x{0i32}\n}\n[return<int>]\nmain() { return(1i32) }\n",
        )
        .unwrap_err();
        assert_eq!(err, "pod and handle transforms conflict");
    }

    #[test]
    fn test_pod_rejects_handle_fields() {
        let err = validate(
            "[pod]\nPoint() {\n  [i32 handle] x{0i32}\n}\n[return<int>]\nmain() { return(1i32) }\n",
        )
        .unwrap_err();
        assert_eq!(err, "pod definitions cannot contain handle fields");
    }

    #[test]
    fn test_effect_token_expansion() {
        let set = Validator::expand_effect_tokens(&[
            "default".to_string(),
            "heap_alloc".to_string(),
            "none".to_string(),
        ]);
        assert!(set.contains("io_out"));
        assert!(set.contains("heap_alloc"));
        assert_eq!(set.len(), 2);
    }
}
