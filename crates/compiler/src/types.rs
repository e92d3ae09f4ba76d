//! Semantic kinds shared by the validator and the lowerer.

/// Scalar kind of a value as tracked through expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValueKind {
    Int32,
    Int64,
    UInt64,
    Float32,
    Float64,
    Bool,
    String,
    #[default]
    Unknown,
}

impl ValueKind {
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            ValueKind::Int32
                | ValueKind::Int64
                | ValueKind::UInt64
                | ValueKind::Float32
                | ValueKind::Float64
        )
    }

    pub fn is_integer(self) -> bool {
        matches!(self, ValueKind::Int32 | ValueKind::Int64 | ValueKind::UInt64)
    }

    pub fn is_float(self) -> bool {
        matches!(self, ValueKind::Float32 | ValueKind::Float64)
    }

    /// Map a written type name (`i32`, `int`, `u64`, `float`, …) to a kind.
    pub fn from_type_name(name: &str) -> ValueKind {
        match name {
            "i32" | "int" => ValueKind::Int32,
            "i64" => ValueKind::Int64,
            "u64" => ValueKind::UInt64,
            "f32" => ValueKind::Float32,
            "f64" | "float" | "f" => ValueKind::Float64,
            "bool" => ValueKind::Bool,
            "string" => ValueKind::String,
            _ => ValueKind::Unknown,
        }
    }
}

/// Shape of a local binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BindingKind {
    #[default]
    Value,
    Reference,
    Pointer,
    Array,
    Vector,
    Map,
    String,
    FileHandle,
}

/// Semantic kind of an expression's result, as computed by
/// `infer_expr_return_kind` from leaves upward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReturnKind {
    Int32,
    Int64,
    UInt64,
    Float32,
    Float64,
    Bool,
    String,
    Struct,
    Array,
    Vector,
    Map,
    Pointer,
    Reference,
    #[default]
    Unknown,
    Void,
}

impl ReturnKind {
    pub fn from_value_kind(kind: ValueKind) -> ReturnKind {
        match kind {
            ValueKind::Int32 => ReturnKind::Int32,
            ValueKind::Int64 => ReturnKind::Int64,
            ValueKind::UInt64 => ReturnKind::UInt64,
            ValueKind::Float32 => ReturnKind::Float32,
            ValueKind::Float64 => ReturnKind::Float64,
            ValueKind::Bool => ReturnKind::Bool,
            ValueKind::String => ReturnKind::String,
            ValueKind::Unknown => ReturnKind::Unknown,
        }
    }

    pub fn to_value_kind(self) -> ValueKind {
        match self {
            ReturnKind::Int32 => ValueKind::Int32,
            ReturnKind::Int64 => ValueKind::Int64,
            ReturnKind::UInt64 => ValueKind::UInt64,
            ReturnKind::Float32 => ValueKind::Float32,
            ReturnKind::Float64 => ValueKind::Float64,
            ReturnKind::Bool => ValueKind::Bool,
            ReturnKind::String => ValueKind::String,
            _ => ValueKind::Unknown,
        }
    }

    pub fn is_numeric(self) -> bool {
        self.to_value_kind().is_numeric()
    }

    /// Written name for diagnostics (`return type mismatch: expected int`).
    pub fn type_name(self) -> &'static str {
        match self {
            ReturnKind::Int32 => "int",
            ReturnKind::Int64 => "i64",
            ReturnKind::UInt64 => "u64",
            ReturnKind::Float32 => "f32",
            ReturnKind::Float64 => "float",
            ReturnKind::Bool => "bool",
            ReturnKind::String => "string",
            ReturnKind::Struct => "struct",
            ReturnKind::Array => "array",
            ReturnKind::Vector => "vector",
            ReturnKind::Map => "map",
            ReturnKind::Pointer => "Pointer",
            ReturnKind::Reference => "Reference",
            ReturnKind::Unknown => "unknown",
            ReturnKind::Void => "void",
        }
    }
}

/// Everything the validator records about one binding. The lowerer pairs
/// this with a local slot.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BindingInfo {
    /// Declared (or inferred) type name as written.
    pub type_name: String,
    /// Single template argument, when the type takes one
    /// (`array<i32>` → `i32`).
    pub template_arg: Option<String>,
    pub kind: BindingKind,
    pub value_kind: ValueKind,
    pub is_mutable: bool,
    /// Key/value kinds when the binding is map-typed.
    pub map_key_kind: ValueKind,
    pub map_value_kind: ValueKind,
    /// Binding aliases a process argv slot rather than the string table.
    pub is_entry_arg_string: bool,
    /// Reference created from an array binding (element access allowed).
    pub reference_to_array: bool,
    /// True for the entry's `array<string>` parameter.
    pub is_entry_args: bool,
}

impl BindingInfo {
    /// Result kind when this binding is read as an expression.
    pub fn return_kind(&self) -> ReturnKind {
        match self.kind {
            BindingKind::Value => ReturnKind::from_value_kind(self.value_kind),
            BindingKind::Reference => ReturnKind::from_value_kind(self.value_kind),
            BindingKind::Pointer => ReturnKind::Pointer,
            BindingKind::Array => ReturnKind::Array,
            BindingKind::Vector => ReturnKind::Vector,
            BindingKind::Map => ReturnKind::Map,
            BindingKind::String => ReturnKind::String,
            BindingKind::FileHandle => ReturnKind::Int64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_kind_from_type_name() {
        assert_eq!(ValueKind::from_type_name("i32"), ValueKind::Int32);
        assert_eq!(ValueKind::from_type_name("int"), ValueKind::Int32);
        assert_eq!(ValueKind::from_type_name("u64"), ValueKind::UInt64);
        assert_eq!(ValueKind::from_type_name("float"), ValueKind::Float64);
        assert_eq!(ValueKind::from_type_name("Point"), ValueKind::Unknown);
    }

    #[test]
    fn test_numeric_classification() {
        assert!(ValueKind::Int32.is_numeric());
        assert!(ValueKind::Float32.is_float());
        assert!(!ValueKind::Bool.is_numeric());
        assert!(!ValueKind::String.is_numeric());
        assert!(ReturnKind::UInt64.is_numeric());
        assert!(!ReturnKind::Array.is_numeric());
    }

    #[test]
    fn test_binding_return_kind() {
        let mut info = BindingInfo {
            kind: BindingKind::Array,
            value_kind: ValueKind::Int32,
            ..BindingInfo::default()
        };
        assert_eq!(info.return_kind(), ReturnKind::Array);
        info.kind = BindingKind::Value;
        assert_eq!(info.return_kind(), ReturnKind::Int32);
    }
}
