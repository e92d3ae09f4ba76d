//! `prismvm`: run a serialized `.psir` module.
//!
//! Usage: `prismvm module.psir [program args…]`. The module's entry runs
//! with the given argv view and the process exits with the program's
//! result (or 2 on a decode failure, matching the compile-time error
//! convention).

use prism_core::deserialize_module;
use prism_vm::Vm;
use std::process;

fn main() {
    let mut args = std::env::args();
    let program = args.next().unwrap_or_else(|| "prismvm".to_string());
    let Some(module_path) = args.next() else {
        eprintln!("usage: {} <module.psir> [args...]", program);
        process::exit(2);
    };

    let bytes = match std::fs::read(&module_path) {
        Ok(bytes) => bytes,
        Err(error) => {
            eprintln!("failed to read {}: {}", module_path, error);
            process::exit(2);
        }
    };
    let module = match deserialize_module(&bytes) {
        Ok(module) => module,
        Err(error) => {
            eprintln!("failed to decode {}: {}", module_path, error);
            process::exit(2);
        }
    };

    // The program's argv[0] is the module path; the rest forward as-is.
    let mut argv: Vec<Vec<u8>> = vec![module_path.clone().into_bytes()];
    argv.extend(args.map(String::into_bytes));

    let mut vm = Vm::with_argv(argv);
    match vm.execute(&module) {
        Ok(result) => process::exit(result as i32),
        Err(error) => {
            eprintln!("{}", error);
            process::exit(2);
        }
    }
}
