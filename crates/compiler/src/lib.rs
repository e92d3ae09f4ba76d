//! Prism compiler library.
//!
//! The pipeline is strictly linear: source text → canonical AST →
//! semantic validation → IR lowering → one of the backends (VM
//! execution, `.psir` serialization, native emission). Each stage runs
//! only if the previous one succeeded and surfaces the first violation
//! it finds.

pub mod ast;
pub mod builtins;
pub mod config;
pub mod lowerer;
pub mod native;
pub mod parse;
pub mod types;
pub mod validator;

pub use ast::Program;
pub use config::{CompilerConfig, EmitKind};
pub use lowerer::{Backend, IrLowerer};
pub use parse::{Parser, TextFilters};
pub use validator::Validator;

use prism_core::IrModule;
use std::path::Path;

/// Compile-stage failure, tagged with the reporting category the driver
/// prefixes (`Include error:`, `Semantic error:`, `VM lowering error:`,
/// `Native lowering error:`).
#[derive(Debug)]
pub enum CompileError {
    Include(String),
    Semantic(String),
    Lowering(Backend, String),
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompileError::Include(message) => write!(f, "Include error: {}", message),
            CompileError::Semantic(message) => write!(f, "Semantic error: {}", message),
            CompileError::Lowering(Backend::Vm, message) => {
                write!(f, "VM lowering error: {}", message)
            }
            CompileError::Lowering(Backend::Native, message) => {
                write!(f, "Native lowering error: {}", message)
            }
        }
    }
}

impl std::error::Error for CompileError {}

/// Parse source text into the canonical AST.
pub fn parse_source(
    source: &str,
    file: &Path,
    config: &CompilerConfig,
) -> Result<Program, CompileError> {
    let mut filters = config.text_filters.clone();
    filters.no_sugar |= config.no_transforms;
    let mut parser = Parser::new(source, file, &filters).map_err(CompileError::Include)?;
    parser.parse().map_err(CompileError::Include)
}

/// Validate a parsed program against the configured entry.
pub fn validate_program(program: &Program, config: &CompilerConfig) -> Result<(), CompileError> {
    Validator::validate(
        program,
        &config.entry_path,
        &config.default_effects,
        &config.default_capabilities,
    )
    .map_err(CompileError::Semantic)
}

/// Lower a validated program to an IR module for the given backend.
pub fn lower_program(
    program: &Program,
    config: &CompilerConfig,
    backend: Backend,
) -> Result<IrModule, CompileError> {
    IrLowerer::lower(program, &config.entry_path, backend)
        .map_err(|message| CompileError::Lowering(backend, message))
}

/// Full front half of the pipeline: parse, validate, lower.
pub fn compile_source(
    source: &str,
    file: &Path,
    config: &CompilerConfig,
    backend: Backend,
) -> Result<IrModule, CompileError> {
    let program = parse_source(source, file, config)?;
    validate_program(&program, config)?;
    lower_program(&program, config, backend)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn test_path() -> PathBuf {
        PathBuf::from("test.prism")
    }

    #[test]
    fn test_compile_source_end_to_end() {
        let module = compile_source(
            "[return<int>]\nmain() { return(7i32) }\n",
            &test_path(),
            &CompilerConfig::new(),
            Backend::Vm,
        )
        .unwrap();
        assert_eq!(module.functions.len(), 1);
    }

    #[test]
    fn test_error_prefixes() {
        let include = CompileError::Include("bad token".to_string());
        assert_eq!(include.to_string(), "Include error: bad token");

        let semantic = CompileError::Semantic("oops".to_string());
        assert_eq!(semantic.to_string(), "Semantic error: oops");

        let vm = CompileError::Lowering(Backend::Vm, "nope".to_string());
        assert_eq!(vm.to_string(), "VM lowering error: nope");

        let native = CompileError::Lowering(Backend::Native, "nope".to_string());
        assert_eq!(native.to_string(), "Native lowering error: nope");
    }

    #[test]
    fn test_semantic_failures_stop_the_pipeline() {
        let error = compile_source(
            "[return<int>]\nmain() { return(clamp(1i32, 0i32, 2i32)) }\n",
            &test_path(),
            &CompilerConfig::new(),
            Backend::Vm,
        )
        .unwrap_err();
        assert!(
            error
                .to_string()
                .starts_with("Semantic error: math builtin requires import"),
            "got {error}"
        );
    }
}
