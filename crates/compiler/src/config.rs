//! Compiler configuration.

use crate::parse::TextFilters;
use std::path::PathBuf;

/// What the driver produces from a validated program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmitKind {
    /// Lower and execute in-process on the VM.
    #[default]
    Vm,
    /// Serialize the lowered module to a `.psir` artifact.
    Ir,
    /// Native executable for the host machine.
    Native,
    /// Alias for native output kept for the reference CLI surface.
    Exe,
    /// C++ source output; recognized but not included in this
    /// distribution.
    Cpp,
}

impl EmitKind {
    pub fn parse(text: &str) -> Result<EmitKind, String> {
        match text {
            "vm" => Ok(EmitKind::Vm),
            "ir" => Ok(EmitKind::Ir),
            "native" => Ok(EmitKind::Native),
            "exe" => Ok(EmitKind::Exe),
            "cpp" => Ok(EmitKind::Cpp),
            other => Err(format!("unknown emit kind: {}", other)),
        }
    }
}

/// Everything the pipeline needs besides the source text. Builder-style
/// `with_*` methods keep call sites readable.
#[derive(Debug, Clone)]
pub struct CompilerConfig {
    pub entry_path: String,
    pub emit: EmitKind,
    /// Tokens applied to the entry definition's initially-empty effect
    /// set (`default` expands to io_out, `none` to nothing).
    pub default_effects: Vec<String>,
    pub default_capabilities: Vec<String>,
    pub text_filters: TextFilters,
    /// Include roots for the surface pipeline; recorded for the external
    /// include resolver that runs ahead of the canonical parser.
    pub include_paths: Vec<PathBuf>,
    /// Disable sugar-level rewrites (bracket indexing, argument labels).
    pub no_transforms: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            entry_path: "/main".to_string(),
            emit: EmitKind::default(),
            default_effects: Vec::new(),
            default_capabilities: Vec::new(),
            text_filters: TextFilters::default(),
            include_paths: Vec::new(),
            no_transforms: false,
        }
    }
}

impl CompilerConfig {
    pub fn new() -> Self {
        CompilerConfig::default()
    }

    pub fn with_entry(mut self, entry_path: impl Into<String>) -> Self {
        self.entry_path = entry_path.into();
        self
    }

    pub fn with_emit(mut self, emit: EmitKind) -> Self {
        self.emit = emit;
        self
    }

    pub fn with_default_effects(mut self, tokens: Vec<String>) -> Self {
        self.default_effects = tokens;
        self
    }

    pub fn with_default_capabilities(mut self, tokens: Vec<String>) -> Self {
        self.default_capabilities = tokens;
        self
    }

    pub fn with_text_filters(mut self, filters: TextFilters) -> Self {
        self.text_filters = filters;
        self
    }

    pub fn with_include_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.include_paths.push(path.into());
        self
    }
}

/// Split a `--default-effects` style CSV into tokens.
pub fn split_csv(csv: &str) -> Vec<String> {
    csv.split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_kind_parsing() {
        assert_eq!(EmitKind::parse("vm").unwrap(), EmitKind::Vm);
        assert_eq!(EmitKind::parse("native").unwrap(), EmitKind::Native);
        assert_eq!(EmitKind::parse("ir").unwrap(), EmitKind::Ir);
        assert!(EmitKind::parse("wasm").is_err());
    }

    #[test]
    fn test_builder_chain() {
        let config = CompilerConfig::new()
            .with_entry("/app/main")
            .with_emit(EmitKind::Ir)
            .with_default_effects(vec!["default".to_string()])
            .with_include_path("/tmp/includes");
        assert_eq!(config.entry_path, "/app/main");
        assert_eq!(config.emit, EmitKind::Ir);
        assert_eq!(config.include_paths.len(), 1);
    }

    #[test]
    fn test_split_csv() {
        assert_eq!(split_csv("io_out, heap_alloc"), vec!["io_out", "heap_alloc"]);
        assert!(split_csv("").is_empty());
    }
}
