//! Abstract syntax tree for Prism.
//!
//! The language is homoiconic: every construct (calls, literals, type
//! tags, transforms) is the same [`Expr`] node, so the validator and the
//! lowerer dispatch on `kind` plus builtin-name tables instead of a
//! polymorphic hierarchy. Downstream stages never mutate an AST they
//! receive; validation is read-only and lowering copies as it rewrites.

use std::path::PathBuf;

/// Source location for error reporting.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceLocation {
    pub file: PathBuf,
    /// 0-indexed line.
    pub line: usize,
}

impl SourceLocation {
    pub fn new(file: PathBuf, line: usize) -> Self {
        SourceLocation { file, line }
    }
}

impl std::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.file.display(), self.line + 1)
    }
}

/// Node kind of an [`Expr`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExprKind {
    /// Integer literal; width and signedness ride on the node.
    Literal,
    FloatLiteral,
    StringLiteral,
    BoolLiteral,
    /// A bare name referencing a binding, parameter or constant.
    #[default]
    Name,
    Call,
}

/// Encoding suffix carried by string literals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StringEncoding {
    #[default]
    Utf8,
    Ascii,
    RawUtf8,
    RawAscii,
}

/// One AST node. Fields are populated according to `kind`; unused fields
/// stay at their defaults. Transforms are themselves expressions so that
/// parameterized forms (`align_bytes(16)`, `restrict<T>`) are
/// representable without a second node type.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Expr {
    pub kind: ExprKind,
    pub name: String,
    /// Leading-slash absolute namespace path, when written qualified.
    pub namespace_prefix: Option<String>,
    pub args: Vec<Expr>,
    /// Parallel labels for `[name] value` bracket-labeled arguments.
    /// When present, has the same length as `args`.
    pub arg_names: Option<Vec<Option<String>>>,
    /// Angle-bracket type parameters, kept as written.
    pub template_args: Vec<String>,
    /// Brace-enclosed continuations.
    pub body_arguments: Vec<Expr>,
    /// Bracketed modifiers preceding the call head.
    pub transforms: Vec<Expr>,
    pub is_method_call: bool,
    pub is_binding: bool,
    pub is_lambda: bool,
    pub has_body_arguments: bool,
    /// Integer literal payload (bit pattern for u64 literals).
    pub int_value: i64,
    /// 32 or 64 for integer literals.
    pub int_width: u8,
    pub is_unsigned: bool,
    pub float_value: f64,
    /// True when the float literal was suffixed `f32`.
    pub float_is_single: bool,
    pub bool_value: bool,
    pub string_encoding: StringEncoding,
    pub source: Option<SourceLocation>,
}

impl Expr {
    pub fn name_ref(name: impl Into<String>) -> Self {
        Expr {
            kind: ExprKind::Name,
            name: name.into(),
            ..Expr::default()
        }
    }

    pub fn literal_i32(value: i32) -> Self {
        Expr {
            kind: ExprKind::Literal,
            int_value: i64::from(value),
            int_width: 32,
            ..Expr::default()
        }
    }

    pub fn literal_i64(value: i64) -> Self {
        Expr {
            kind: ExprKind::Literal,
            int_value: value,
            int_width: 64,
            ..Expr::default()
        }
    }

    pub fn call(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr {
            kind: ExprKind::Call,
            name: name.into(),
            args,
            ..Expr::default()
        }
    }

    /// True for an unqualified, non-method, non-binding call of `name`.
    pub fn is_simple_call(&self, name: &str) -> bool {
        self.kind == ExprKind::Call
            && !self.is_method_call
            && !self.is_binding
            && self.namespace_prefix.is_none()
            && self.name == name
    }

    /// True when this call carries brace continuations.
    pub fn has_blocks(&self) -> bool {
        self.has_body_arguments || !self.body_arguments.is_empty()
    }

    /// Look up a transform by head name.
    pub fn find_transform(&self, name: &str) -> Option<&Expr> {
        self.transforms.iter().find(|t| t.name == name)
    }

    pub fn has_transform(&self, name: &str) -> bool {
        self.find_transform(name).is_some()
    }

    /// True when any `arg_names` entry is actually set.
    pub fn has_named_arguments(&self) -> bool {
        self.arg_names
            .as_ref()
            .is_some_and(|names| names.iter().any(|n| n.is_some()))
    }
}

/// A named top-level definition. A definition whose transforms carry a
/// return transform is a function; one carrying only field bindings and a
/// struct-ish tag set is usable as a type; with neither it is void.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Definition {
    /// Simple name as written.
    pub name: String,
    /// Absolute slash-delimited path (e.g. `/util/double`).
    pub full_path: String,
    /// Parameters: each an `Expr` carrying its own transforms and an
    /// optional default initializer in `args[0]`.
    pub params: Vec<Expr>,
    pub body: Vec<Expr>,
    pub transforms: Vec<Expr>,
    pub source: Option<SourceLocation>,
}

impl Definition {
    pub fn find_transform(&self, name: &str) -> Option<&Expr> {
        self.transforms.iter().find(|t| t.name == name)
    }

    pub fn has_transform(&self, name: &str) -> bool {
        self.find_transform(name).is_some()
    }

    /// The `return<T>` transform's template argument, if declared.
    pub fn declared_return_type(&self) -> Option<&str> {
        self.find_transform("return")
            .and_then(|t| t.template_args.first())
            .map(String::as_str)
    }

    /// True for definitions containing only field bindings (usable as a
    /// struct type).
    pub fn is_field_only(&self) -> bool {
        !self.body.is_empty() && self.body.iter().all(|stmt| stmt.is_binding)
    }
}

/// An `import` directive, unresolved. The validator normalizes each path
/// into a namespace alias, a math wildcard, or a single math symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct Import {
    /// Path as written (`/util`, `/math/*`, `/math/sin`).
    pub path: String,
    pub source: Option<SourceLocation>,
}

/// A parsed program: definitions in declaration order plus import
/// directives. Namespaces are already flattened into `full_path`s by the
/// front end; reopened namespaces simply contribute more definitions.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub definitions: Vec<Definition>,
    pub imports: Vec<Import>,
}

impl Program {
    pub fn new() -> Self {
        Program::default()
    }

    pub fn find_definition(&self, full_path: &str) -> Option<&Definition> {
        self.definitions.iter().find(|d| d.full_path == full_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_call_predicate() {
        let call = Expr::call("try", vec![Expr::literal_i32(1)]);
        assert!(call.is_simple_call("try"));
        assert!(!call.is_simple_call("catch"));

        let mut method = call.clone();
        method.is_method_call = true;
        assert!(!method.is_simple_call("try"));

        let mut qualified = call;
        qualified.namespace_prefix = Some("/util".to_string());
        assert!(!qualified.is_simple_call("try"));
    }

    #[test]
    fn test_named_argument_detection() {
        let mut call = Expr::call("f", vec![Expr::literal_i32(1), Expr::literal_i32(2)]);
        assert!(!call.has_named_arguments());
        call.arg_names = Some(vec![None, None]);
        assert!(!call.has_named_arguments());
        call.arg_names = Some(vec![Some("key".to_string()), None]);
        assert!(call.has_named_arguments());
    }

    #[test]
    fn test_declared_return_type() {
        let mut def = Definition {
            name: "main".to_string(),
            full_path: "/main".to_string(),
            ..Definition::default()
        };
        assert_eq!(def.declared_return_type(), None);

        let mut ret = Expr::name_ref("return");
        ret.template_args.push("int".to_string());
        def.transforms.push(ret);
        assert_eq!(def.declared_return_type(), Some("int"));
    }

    #[test]
    fn test_field_only_definition() {
        let mut binding = Expr::call("x", vec![Expr::literal_i32(0)]);
        binding.is_binding = true;
        let def = Definition {
            name: "Point".to_string(),
            full_path: "/Point".to_string(),
            body: vec![binding],
            ..Definition::default()
        };
        assert!(def.is_field_only());
    }
}
