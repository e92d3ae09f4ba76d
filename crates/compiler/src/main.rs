//! Prism compiler CLI.
//!
//! Exit codes: 0 for a successful run, 2 for any compile-time error
//! (include/parse, semantic, lowering), 3 for checked runtime failures
//! (bounds, map misses, negative pow exponents) surfaced by the program
//! itself.

use clap::Parser as ClapParser;
use prism_core::serialize_module;
use prism_vm::Vm;
use prismc::{
    compile_source, config::split_csv, native, Backend, CompilerConfig, EmitKind, TextFilters,
};
use std::path::{Path, PathBuf};
use std::process;

#[derive(ClapParser)]
#[command(name = "prismc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Prism compiler - run, serialize, or natively compile .prism programs", long_about = None)]
struct Cli {
    /// Input .prism source file
    input: PathBuf,

    /// Output kind: vm (run in-process), ir (.psir artifact), native,
    /// exe, cpp
    #[arg(long = "emit", value_name = "KIND", default_value = "vm")]
    emit: String,

    /// Output path for ir/native/exe output
    #[arg(short = 'o', value_name = "PATH")]
    output: Option<PathBuf>,

    /// Directory for outputs when -o is not given
    #[arg(long = "out-dir", value_name = "DIR")]
    out_dir: Option<PathBuf>,

    /// Entry definition path
    #[arg(long = "entry", value_name = "PATH", default_value = "/main")]
    entry: String,

    /// Include root for source lookup (repeatable)
    #[arg(long = "include-path", value_name = "DIR")]
    include_paths: Vec<PathBuf>,

    /// Optional pre-parser toggles (e.g. default,implicit-i32)
    #[arg(long = "text-filters", value_name = "CSV")]
    text_filters: Option<String>,

    /// Effect tokens applied to an entry with no declared effects
    #[arg(long = "default-effects", value_name = "CSV")]
    default_effects: Option<String>,

    /// Capability tokens applied to an entry with no declared capabilities
    #[arg(long = "default-capabilities", value_name = "CSV")]
    default_capabilities: Option<String>,

    /// Disable sugar-level transforms
    #[arg(long = "no-transforms")]
    no_transforms: bool,

    /// Keep the intermediate assembly next to native output
    #[arg(long = "keep-asm")]
    keep_asm: bool,

    /// Runtime arguments forwarded to the entry function
    #[arg(last = true)]
    runtime_args: Vec<String>,
}

fn main() {
    let cli = Cli::parse();

    let emit = match EmitKind::parse(&cli.emit) {
        Ok(kind) => kind,
        Err(message) => {
            eprintln!("Include error: {}", message);
            process::exit(2);
        }
    };
    let text_filters = match &cli.text_filters {
        Some(csv) => match TextFilters::from_csv(csv) {
            Ok(filters) => filters,
            Err(message) => {
                eprintln!("Include error: {}", message);
                process::exit(2);
            }
        },
        None => TextFilters::default(),
    };

    let mut config = CompilerConfig::new()
        .with_entry(cli.entry.clone())
        .with_emit(emit)
        .with_text_filters(text_filters);
    if let Some(csv) = &cli.default_effects {
        config = config.with_default_effects(split_csv(csv));
    }
    if let Some(csv) = &cli.default_capabilities {
        config = config.with_default_capabilities(split_csv(csv));
    }
    for path in &cli.include_paths {
        config = config.with_include_path(path.clone());
    }
    config.no_transforms = cli.no_transforms;

    let source = match std::fs::read_to_string(&cli.input) {
        Ok(source) => source,
        Err(error) => {
            eprintln!("Include error: failed to read {}: {}", cli.input.display(), error);
            process::exit(2);
        }
    };

    match emit {
        EmitKind::Vm => run_vm(&source, &cli, &config),
        EmitKind::Ir => emit_ir(&source, &cli, &config),
        EmitKind::Native | EmitKind::Exe => emit_native(&source, &cli, &config),
        EmitKind::Cpp => {
            eprintln!("Include error: the C++ emitter is not part of this distribution");
            process::exit(2);
        }
    }
}

fn compile_or_exit(
    source: &str,
    cli: &Cli,
    config: &CompilerConfig,
    backend: Backend,
) -> prism_core::IrModule {
    match compile_source(source, &cli.input, config, backend) {
        Ok(module) => module,
        Err(error) => {
            eprintln!("{}", error);
            process::exit(2);
        }
    }
}

fn run_vm(source: &str, cli: &Cli, config: &CompilerConfig) {
    let module = compile_or_exit(source, cli, config, Backend::Vm);

    // argv[0] is the source path; everything after `--` forwards.
    let mut argv: Vec<Vec<u8>> = vec![cli.input.display().to_string().into_bytes()];
    argv.extend(cli.runtime_args.iter().cloned().map(String::into_bytes));

    let mut vm = Vm::with_argv(argv);
    match vm.execute(&module) {
        Ok(result) => process::exit(result as i32),
        Err(error) => {
            eprintln!("{}", error);
            process::exit(2);
        }
    }
}

fn emit_ir(source: &str, cli: &Cli, config: &CompilerConfig) {
    let module = compile_or_exit(source, cli, config, Backend::Vm);
    let output = output_path(cli, "psir");
    let bytes = serialize_module(&module);
    if let Err(error) = std::fs::write(&output, bytes) {
        eprintln!("Include error: failed to write {}: {}", output.display(), error);
        process::exit(2);
    }
    println!("Serialized {} -> {}", cli.input.display(), output.display());
}

fn emit_native(source: &str, cli: &Cli, config: &CompilerConfig) {
    let module = compile_or_exit(source, cli, config, Backend::Native);
    let output = output_path(cli, "");
    match native::compile_to_executable(&module, &output, cli.keep_asm) {
        Ok(()) => {
            println!("Compiled {} -> {}", cli.input.display(), output.display());
        }
        Err(error) => {
            eprintln!("Native lowering error: {}", error);
            process::exit(2);
        }
    }
}

/// Default outputs take the source stem, in --out-dir when given.
fn output_path(cli: &Cli, extension: &str) -> PathBuf {
    if let Some(output) = &cli.output {
        return output.clone();
    }
    let stem = cli
        .input
        .file_stem()
        .map(Path::new)
        .unwrap_or_else(|| Path::new("out"))
        .to_path_buf();
    let mut path = match &cli.out_dir {
        Some(dir) => dir.join(stem),
        None => stem,
    };
    if !extension.is_empty() {
        path.set_extension(extension);
    }
    path
}
