//! Native backend: lowers an IR module to AArch64 assembly and links a
//! standalone executable with the host C toolchain.
//!
//! The machine model tracks the IR stack machine closely: one register
//! holds the value-stack cursor, locals live at a fixed 16-byte stride,
//! string-table entries become rodata labels, and print opcodes lower to
//! `write(2)` calls. The backend refuses opcodes it cannot express; the
//! driver wraps those refusals as `Native lowering error: …`.

mod aarch64;

use prism_core::IrModule;
use std::path::Path;
use std::process::Command;

pub use aarch64::emit_assembly;

/// Error type for native code generation: either a lowering refusal or a
/// toolchain/formatting failure.
#[derive(Debug)]
pub enum NativeError {
    /// The module uses a construct this backend does not express.
    Unsupported(String),
    /// Assembling or linking failed.
    Toolchain(String),
    Format(std::fmt::Error),
}

impl std::fmt::Display for NativeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NativeError::Unsupported(message) => write!(f, "{}", message),
            NativeError::Toolchain(message) => write!(f, "{}", message),
            NativeError::Format(error) => write!(f, "assembly emission failed: {}", error),
        }
    }
}

impl std::error::Error for NativeError {}

impl From<std::fmt::Error> for NativeError {
    fn from(error: std::fmt::Error) -> Self {
        NativeError::Format(error)
    }
}

/// Host target flavor; the assembly differs in symbol prefixes, section
/// directives and open(2) flag values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Aarch64Darwin,
    Aarch64Linux,
}

impl Target {
    /// Detect the host. Native output targets exactly the machine the
    /// compiler runs on; there is no cross-compilation.
    pub fn host() -> Result<Target, NativeError> {
        #[cfg(all(target_arch = "aarch64", target_os = "macos"))]
        {
            return Ok(Target::Aarch64Darwin);
        }
        #[cfg(all(target_arch = "aarch64", target_os = "linux"))]
        {
            return Ok(Target::Aarch64Linux);
        }
        #[allow(unreachable_code)]
        Err(NativeError::Unsupported(
            "native backend supports only aarch64 hosts".to_string(),
        ))
    }

    pub fn symbol(self, name: &str) -> String {
        match self {
            Target::Aarch64Darwin => format!("_{}", name),
            Target::Aarch64Linux => name.to_string(),
        }
    }
}

/// Compile a module to an executable at `output`. Writes the assembly
/// next to the output (kept when `keep_asm`), then assembles and links
/// with `cc`.
pub fn compile_to_executable(
    module: &IrModule,
    output: &Path,
    keep_asm: bool,
) -> Result<(), NativeError> {
    let target = Target::host()?;
    let assembly = emit_assembly(module, target)?;

    let asm_path = output.with_extension("s");
    std::fs::write(&asm_path, assembly)
        .map_err(|error| NativeError::Toolchain(format!("failed to write assembly: {}", error)))?;

    let status = Command::new("cc")
        .arg(&asm_path)
        .arg("-o")
        .arg(output)
        .output()
        .map_err(|error| NativeError::Toolchain(format!("failed to run cc: {}", error)))?;

    if !keep_asm {
        let _ = std::fs::remove_file(&asm_path);
    }
    if !status.status.success() {
        let stderr = String::from_utf8_lossy(&status.stderr);
        return Err(NativeError::Toolchain(format!(
            "cc failed:\n{}",
            stderr
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use prism_core::{IrFunction, IrInstruction, IrOpcode};

    fn sample_module() -> IrModule {
        let mut module = IrModule::new();
        module.functions.push(IrFunction {
            name: "/main".to_string(),
            param_count: 0,
            local_count: 1,
            instructions: vec![
                IrInstruction::new(IrOpcode::PushI32, 7),
                IrInstruction::new(IrOpcode::ReturnI32, 0),
            ],
        });
        module
    }

    #[test]
    fn test_emits_assembly_for_both_targets() {
        for target in [Target::Aarch64Darwin, Target::Aarch64Linux] {
            let assembly = emit_assembly(&sample_module(), target).unwrap();
            assert!(assembly.contains("mov"), "no instructions emitted");
            assert!(assembly.contains(&target.symbol("main")));
        }
    }

    #[test]
    fn test_refuses_unsupported_opcode() {
        let mut module = sample_module();
        module.functions[0]
            .instructions
            .insert(0, IrInstruction::new(IrOpcode::PrintF64, 0));
        let error = emit_assembly(&module, Target::Aarch64Linux).unwrap_err();
        assert!(
            error
                .to_string()
                .contains("native backend does not support opcode"),
            "got {error}"
        );
    }

    #[test]
    fn test_symbol_prefixing() {
        assert_eq!(Target::Aarch64Darwin.symbol("write"), "_write");
        assert_eq!(Target::Aarch64Linux.symbol("write"), "write");
    }
}
