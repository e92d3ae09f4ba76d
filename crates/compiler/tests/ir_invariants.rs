//! Quantified IR invariants checked over lowered modules: jump-target
//! validity, stack-effect neutrality, string-index validity, and the
//! serializer round-trip law.

use prism_core::{
    decode_print_payload, deserialize_module, serialize_module, IrFunction, IrModule, IrOpcode,
};
use prismc::{compile_source, Backend, CompilerConfig};
use std::collections::HashMap;
use std::path::PathBuf;

const PROGRAMS: &[&str] = &[
    "[return<int>]\nmain() { return(7i32) }\n",
    "[return<int>]\nmain() {\n  [array<i32>] v{array<i32>(4i32, 7i32, 9i32)}\n  return(v[1i32])\n}\n",
    "[return<int>]\nmain([array<string>] args) { return(args.count()) }\n",
    "[return<int>]\nmain() {\n  if(less(1i32, 2i32)) {\n    return(1i32)\n  } else {\n    return(2i32)\n  }\n}\n",
    "[return<int>]\nmain() {\n  [i32 mut] value{0i32}\n  repeat(5i32) {\n    assign(value, plus(value, 2i32))\n  }\n  return(value)\n}\n",
    "import /math/*\n[return<int>]\nmain() { return(convert<int>(multiply(sin(0.5f64), 1000.0f64))) }\n",
    "import /math/*\n[return<int>]\nmain() { return(convert<int>(sqrt(49.0f64))) }\n",
    "import /math/*\n[return<int>]\nmain() { return(pow(3i32, 4i32)) }\n",
    "[return<int>]\nmain() {\n  [map<i32,i32>] m{map<i32,i32>(1i32, 10i32)}\n  return(m[1i32])\n}\n",
    "[return<int> effects(heap_alloc)]\nmain() {\n  [vector<i32>] v{vector<i32>(5i32, 6i32)}\n  return(v.count())\n}\n",
    "[return<int>]\ndouble([i32] x) { return(multiply(x, 2i32)) }\n[return<int>]\nmain() { return(double(4i32)) }\n",
    "[return<int> effects(io_out)]\nmain() {\n  print_line(\"hello\"utf8)\n  return(0i32)\n}\n",
];

fn lower(source: &str) -> IrModule {
    compile_source(
        source,
        &PathBuf::from("test.prism"),
        &CompilerConfig::new(),
        Backend::Vm,
    )
    .expect("compile")
}

#[test]
fn test_jump_targets_are_valid_instruction_indices() {
    for source in PROGRAMS {
        let module = lower(source);
        for function in &module.functions {
            for inst in &function.instructions {
                if inst.op.is_jump() {
                    assert!(
                        (inst.imm as usize) <= function.instructions.len(),
                        "jump to {} outside function of {} instructions in {:?}",
                        inst.imm,
                        function.instructions.len(),
                        source
                    );
                }
            }
        }
    }
}

#[test]
fn test_string_table_references_are_valid() {
    for source in PROGRAMS {
        let module = lower(source);
        for function in &module.functions {
            for inst in &function.instructions {
                let index = match inst.op {
                    IrOpcode::PrintString => decode_print_payload(inst.imm) as usize,
                    IrOpcode::LoadStringByte
                    | IrOpcode::FileOpenRead
                    | IrOpcode::FileOpenWrite
                    | IrOpcode::FileOpenAppend
                    | IrOpcode::FileWriteString => inst.imm as usize,
                    _ => continue,
                };
                assert!(
                    index < module.string_table.len(),
                    "string index {} out of table of {} in {:?}",
                    index,
                    module.string_table.len(),
                    source
                );
            }
        }
    }
}

#[test]
fn test_serializer_round_trip_is_identity() {
    for source in PROGRAMS {
        let module = lower(source);
        let decoded = deserialize_module(&serialize_module(&module)).expect("decode");
        assert_eq!(decoded, module, "round trip changed module for {:?}", source);
    }
}

#[test]
fn test_stack_effects_balance_along_every_path() {
    for source in PROGRAMS {
        let module = lower(source);
        for function in &module.functions {
            check_stack_balance(function, source);
        }
    }
}

/// Flow-sensitive abstract interpretation of stack depth: every
/// reachable instruction must see a consistent depth, no instruction may
/// underflow, and every return pops the stack to empty.
fn check_stack_balance(function: &IrFunction, source: &str) {
    let mut depths: HashMap<usize, i64> = HashMap::new();
    let mut worklist = vec![(0usize, 0i64)];
    while let Some((pc, depth)) = worklist.pop() {
        if pc >= function.instructions.len() {
            assert_eq!(depth, 0, "fell off the end at depth {} in {:?}", depth, source);
            continue;
        }
        if let Some(&known) = depths.get(&pc) {
            assert_eq!(
                known, depth,
                "inconsistent depth at {} ({} vs {}) in {:?}",
                pc, known, depth, source
            );
            continue;
        }
        depths.insert(pc, depth);

        let inst = function.instructions[pc];
        let (pops, pushes) = inst.op.stack_effect();
        let after = depth - i64::from(pops) + i64::from(pushes);
        assert!(
            depth >= i64::from(pops),
            "stack underflow at {} in {:?}",
            pc,
            source
        );

        match inst.op {
            IrOpcode::Jump => worklist.push((inst.imm as usize, after)),
            IrOpcode::JumpIfZero => {
                worklist.push((inst.imm as usize, after));
                worklist.push((pc + 1, after));
            }
            IrOpcode::ReturnI32 | IrOpcode::ReturnI64 => {
                assert_eq!(after, 0, "return leaves depth {} in {:?}", after, source);
            }
            IrOpcode::ReturnVoid | IrOpcode::Exit => {}
            _ => worklist.push((pc + 1, after)),
        }
    }
}

#[test]
fn test_entry_is_first_function() {
    for source in PROGRAMS {
        let module = lower(source);
        assert_eq!(module.entry_index, 0);
        assert_eq!(module.functions[0].name, "/main");
    }
}
