//! Builtin name tables.
//!
//! The validator and the lowerer both dispatch on these tables; keeping
//! them in one place is what keeps the two stages in agreement about what
//! a name means.

use crate::ast::Expr;

/// Math builtins reachable through the `/math` namespace.
pub const MATH_BUILTINS: &[&str] = &[
    "abs", "sign", "min", "max", "clamp", "saturate", "lerp", "fma", "hypot", "copysign",
    "radians", "degrees", "sin", "cos", "tan", "atan2", "asin", "acos", "atan", "sinh", "cosh",
    "tanh", "asinh", "acosh", "atanh", "exp", "exp2", "log", "log2", "log10", "pow", "is_nan",
    "is_inf", "is_finite", "floor", "ceil", "round", "trunc", "fract", "sqrt", "cbrt",
];

/// Math constants reachable through the `/math` namespace.
pub const MATH_CONSTANTS: &[&str] = &["pi", "tau", "e"];

pub fn is_math_builtin(name: &str) -> bool {
    MATH_BUILTINS.contains(&name)
}

pub fn is_math_constant(name: &str) -> bool {
    MATH_CONSTANTS.contains(&name)
}

pub fn math_constant_value(name: &str) -> Option<f64> {
    match name {
        "pi" => Some(std::f64::consts::PI),
        "tau" => Some(std::f64::consts::TAU),
        "e" => Some(std::f64::consts::E),
        _ => None,
    }
}

/// Binary/unary operator builtins in canonical call form.
pub const OPERATOR_BUILTINS: &[&str] = &[
    "plus", "minus", "multiply", "divide", "modulo", "negate", "equal", "not_equal", "less",
    "less_equal", "greater", "greater_equal", "and", "or", "not",
];

pub fn is_operator_builtin(name: &str) -> bool {
    OPERATOR_BUILTINS.contains(&name)
}

pub fn is_comparison_operator(name: &str) -> bool {
    matches!(
        name,
        "equal" | "not_equal" | "less" | "less_equal" | "greater" | "greater_equal"
    )
}

/// A print builtin plus its wire behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrintBuiltin {
    pub name: &'static str,
    pub newline: bool,
    pub stderr: bool,
    /// Effect the surrounding definition must declare.
    pub effect: &'static str,
}

pub const PRINT_BUILTINS: &[PrintBuiltin] = &[
    PrintBuiltin { name: "print", newline: false, stderr: false, effect: "io_out" },
    PrintBuiltin { name: "print_line", newline: true, stderr: false, effect: "io_out" },
    PrintBuiltin { name: "print_error", newline: false, stderr: true, effect: "io_err" },
    PrintBuiltin { name: "print_line_error", newline: true, stderr: true, effect: "io_err" },
];

pub fn print_builtin(name: &str) -> Option<&'static PrintBuiltin> {
    PRINT_BUILTINS.iter().find(|p| p.name == name)
}

/// Pathspace builtins: validated for effects, lowered as no-ops.
pub fn pathspace_effect(name: &str) -> Option<&'static str> {
    match name {
        "notify" => Some("pathspace_notify"),
        "insert" => Some("pathspace_insert"),
        "take" => Some("pathspace_take"),
        _ => None,
    }
}

/// Collection constructors (`array<T>(...)`, `vector<T>(...)`,
/// `map<K,V>(...)`).
pub fn collection_name(expr: &Expr) -> Option<&'static str> {
    for candidate in ["array", "vector", "map"] {
        if expr.is_simple_call(candidate) {
            return Some(candidate);
        }
    }
    None
}

/// Pointer helpers (`location(x)`, `dereference(p)`, `address_of(x)`).
pub fn pointer_builtin_name(expr: &Expr) -> Option<&'static str> {
    for candidate in ["location", "dereference", "address_of"] {
        if expr.is_simple_call(candidate) {
            return Some(candidate);
        }
    }
    None
}

/// Indexed-access builtins.
pub fn array_access_name(expr: &Expr) -> Option<&'static str> {
    for candidate in ["at", "at_unsafe"] {
        if expr.name == candidate && !expr.is_binding {
            return Some(candidate);
        }
    }
    None
}

/// Builtin type names accepted for bindings and parameters. Software
/// numeric types (i8/i16/u8/…) are recognized and rejected by the
/// validator with a dedicated diagnostic.
pub const BINDING_TYPE_NAMES: &[&str] = &[
    "i32", "int", "i64", "u64", "f32", "f64", "float", "bool", "string", "array", "vector",
    "map", "Pointer", "Reference", "File",
];

pub const SOFTWARE_NUMERIC_NAMES: &[&str] =
    &["i8", "i16", "u8", "u16", "u32", "i128", "u128", "f16", "f128"];

/// Binding/definition modifier transforms that never change the type.
pub const MODIFIER_TRANSFORMS: &[&str] = &[
    "mut", "copy", "static", "public", "private", "restrict", "align_bytes", "align_kbytes",
    "stack", "heap", "buffer", "handle",
];

/// Mutually-exclusive transform groups; at most one member of a group may
/// appear on a node.
pub const EXCLUSIVE_TRANSFORM_GROUPS: &[&[&str]] = &[
    &["public", "private"],
    &["stack", "heap", "buffer"],
];

/// Pairwise-exclusive tags on definitions.
pub const EXCLUSIVE_DEFINITION_TAGS: &[&str] = &["pod", "handle", "gpu_lane"];

/// Effects granted by the `default` token on `--default-effects`.
pub const DEFAULT_EFFECT_EXPANSION: &[&str] = &["io_out"];

/// True for names the lowerer reserves for control sugar.
pub fn is_control_builtin(name: &str) -> bool {
    matches!(name, "if" | "repeat" | "block" | "return")
}

/// Vector helpers that mutate in place. Growth helpers are rejected by
/// both backends; shrink helpers lower to header updates.
pub fn vector_helper_name(expr: &Expr) -> Option<&'static str> {
    for candidate in ["push", "pop", "reserve", "clear", "remove_at", "remove_swap"] {
        if expr.name == candidate && !expr.is_binding {
            return Some(candidate);
        }
    }
    None
}

pub fn is_vector_growth_helper(name: &str) -> bool {
    matches!(name, "push" | "reserve")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_math_tables() {
        assert!(is_math_builtin("clamp"));
        assert!(is_math_builtin("atan2"));
        assert!(!is_math_builtin("plus"));
        assert!(is_math_constant("tau"));
        assert!(!is_math_constant("phi"));
        assert_eq!(math_constant_value("pi"), Some(std::f64::consts::PI));
    }

    #[test]
    fn test_print_table() {
        let p = print_builtin("print_line").unwrap();
        assert!(p.newline);
        assert!(!p.stderr);
        assert_eq!(p.effect, "io_out");

        let e = print_builtin("print_line_error").unwrap();
        assert!(e.newline);
        assert!(e.stderr);
        assert_eq!(e.effect, "io_err");

        assert!(print_builtin("println").is_none());
    }

    #[test]
    fn test_pathspace_effects() {
        assert_eq!(pathspace_effect("notify"), Some("pathspace_notify"));
        assert_eq!(pathspace_effect("insert"), Some("pathspace_insert"));
        assert_eq!(pathspace_effect("take"), Some("pathspace_take"));
        assert_eq!(pathspace_effect("print"), None);
    }

    #[test]
    fn test_collection_detection() {
        let mut arr = Expr::call("array", vec![]);
        arr.template_args.push("i32".to_string());
        assert_eq!(collection_name(&arr), Some("array"));

        let mut method = arr.clone();
        method.is_method_call = true;
        assert_eq!(collection_name(&method), None);
    }
}
