//! End-to-end pipeline tests: source text through parse, validate,
//! lower, and VM execution.

use prism_vm::Vm;
use prismc::{compile_source, Backend, CompilerConfig};
use std::path::PathBuf;

fn compile(source: &str) -> Result<prism_core::IrModule, String> {
    compile_source(
        source,
        &PathBuf::from("test.prism"),
        &CompilerConfig::new(),
        Backend::Vm,
    )
    .map_err(|error| error.to_string())
}

fn run(source: &str) -> u64 {
    let module = compile(source).expect("compile");
    Vm::new().execute(&module).expect("execute")
}

fn run_with_args(source: &str, args: &[&str]) -> u64 {
    let module = compile(source).expect("compile");
    let mut argv: Vec<Vec<u8>> = vec![b"prog".to_vec()];
    argv.extend(args.iter().map(|arg| arg.as_bytes().to_vec()));
    Vm::with_argv(argv).execute(&module).expect("execute")
}

#[test]
fn test_simple_main_returns_literal() {
    assert_eq!(run("[return<int>]\nmain() { return(7i32) }\n"), 7);
}

#[test]
fn test_array_literal_indexing() {
    let source = "[return<int>]\nmain() {\n  [array<i32>] v{array<i32>(4i32, 7i32, 9i32)}\n  return(v[1i32])\n}\n";
    assert_eq!(run(source), 7);
}

#[test]
fn test_argv_count() {
    let source =
        "[return<int>]\nmain([array<string>] args) {\n  return(args.count())\n}\n";
    assert_eq!(run_with_args(source, &["alpha", "beta"]), 3);
}

#[test]
fn test_out_of_bounds_exits_three() {
    let source = "[return<int>]\nmain() {\n  [array<i32>] v{array<i32>(4i32)}\n  return(v[9i32])\n}\n";
    assert_eq!(run(source), 3);
}

#[test]
fn test_negative_index_exits_three() {
    let source = "[return<int>]\nmain() {\n  [array<i32>] v{array<i32>(4i32)}\n  return(v[-1i32])\n}\n";
    assert_eq!(run(source), 3);
}

#[test]
fn test_at_unsafe_skips_bounds_prologue() {
    let source = "[return<int>]\nmain() {\n  [array<i32>] v{array<i32>(4i32, 6i32)}\n  return(at_unsafe(v, 1i32))\n}\n";
    assert_eq!(run(source), 6);
}

#[test]
fn test_math_gating_diagnostic() {
    let error = compile("[return<int>]\nmain() { return(clamp(2i32, 1i32, 5i32)) }\n")
        .unwrap_err();
    assert!(
        error.contains("math builtin requires import /math/* or /math/<name>: clamp"),
        "got {error}"
    );
}

#[test]
fn test_result_try_success_and_handler() {
    let source = "\
[return<int>]
log_failure([i32] code) { return(code) }

[return<Result<int>>]
compute([bool] fail) {
  if(fail) {
    return(Result.error(9i32))
  } else {
    return(Result.ok(42i32))
  }
}

[return<Result<int>>]
main() {
  on_error(/log_failure)
  [i32] value{try(compute(false))}
  return(Result.ok(value))
}
";
    // Success: the packed result carries 42 in the payload half.
    assert_eq!(run(source) >> 32, 42);

    // Failure: the handler runs and the error code propagates packed in
    // the low half.
    let failing = source.replace("compute(false)", "compute(true)");
    let result = run(&failing);
    assert_eq!(result & 0xffff_ffff, 9);
    assert_eq!(result >> 32, 0);
}

#[test]
fn test_if_else_branches() {
    let source = "[return<int>]\nmain() {\n  if(greater(3i32, 2i32)) {\n    return(1i32)\n  } else {\n    return(2i32)\n  }\n}\n";
    assert_eq!(run(source), 1);
}

#[test]
fn test_repeat_accumulates() {
    let source = "[return<int>]\nmain() {\n  [i32 mut] value{0i32}\n  repeat(4i32) {\n    assign(value, plus(value, 3i32))\n  }\n  return(value)\n}\n";
    assert_eq!(run(source), 12);
}

#[test]
fn test_repeat_with_bool_count() {
    let source = "[return<int>]\nmain() {\n  [i32 mut] value{0i32}\n  repeat(false) {\n    assign(value, 9i32)\n  }\n  repeat(true) {\n    assign(value, plus(value, 2i32))\n  }\n  return(value)\n}\n";
    assert_eq!(run(source), 2);
}

#[test]
fn test_short_circuit_and_preserves_writes() {
    let source = "[return<int>]\nmain() {\n  [i32 mut] value{1i32}\n  [i32 mut] witness{0i32}\n  and(equal(value, 0i32), assign(witness, 9i32))\n  return(witness)\n}\n";
    assert_eq!(run(source), 0);
}

#[test]
fn test_short_circuit_or_skips_rhs() {
    let source = "[return<int>]\nmain() {\n  [i32 mut] witness{0i32}\n  or(equal(1i32, 1i32), assign(witness, 9i32))\n  return(witness)\n}\n";
    assert_eq!(run(source), 0);
}

#[test]
fn test_user_call_inlining() {
    let source = "[return<int>]\ndouble([i32] x) { return(multiply(x, 2i32)) }\n[return<int>]\nmain() { return(double(21i32)) }\n";
    assert_eq!(run(source), 42);
}

#[test]
fn test_method_call_via_type_namespace() {
    let source = "namespace i32 {\n[return<int>]\ninc([i32] value) { return(plus(value, 1i32)) }\n}\n[return<int>]\nmain() {\n  [i32] value{5i32}\n  return(plus(value.inc(), 2i32))\n}\n";
    assert_eq!(run(source), 8);
}

#[test]
fn test_count_forwards_to_method() {
    let source = "namespace i32 {\n[return<int>]\ncount([i32] self) { return(plus(self, 4i32)) }\n}\n[return<int>]\nmain() { return(count(3i32)) }\n";
    assert_eq!(run(source), 7);
}

#[test]
fn test_parameter_default_used_when_omitted() {
    let source = "[return<int>]\nscaled([i32] x, [i32] factor{3i32}) { return(multiply(x, factor)) }\n[return<int>]\nmain() { return(scaled(5i32)) }\n";
    assert_eq!(run(source), 15);
}

#[test]
fn test_string_count_and_indexing() {
    let source = "[return<int>]\nmain() {\n  [string] text{\"hey\"utf8}\n  return(plus(text.count(), text[0i32]))\n}\n";
    // 3 + 'h' (104)
    assert_eq!(run(source), 107);
}

#[test]
fn test_string_index_out_of_bounds_exits_three() {
    let source = "[return<int>]\nmain() {\n  [string] text{\"hey\"utf8}\n  return(text[9i32])\n}\n";
    assert_eq!(run(source), 3);
}

#[test]
fn test_map_lookup_and_missing_key() {
    let hit = "[return<int>]\nmain() {\n  [map<i32,i32>] m{map<i32,i32>(1i32, 10i32, 2i32, 20i32)}\n  return(m[2i32])\n}\n";
    assert_eq!(run(hit), 20);

    let miss = "[return<int>]\nmain() {\n  [map<i32,i32>] m{map<i32,i32>(1i32, 10i32)}\n  return(m[5i32])\n}\n";
    assert_eq!(run(miss), 3);
}

#[test]
fn test_map_count() {
    let source = "[return<int>]\nmain() {\n  [map<i32,i32>] m{map<i32,i32>(1i32, 10i32, 2i32, 20i32)}\n  return(m.count())\n}\n";
    assert_eq!(run(source), 2);
}

#[test]
fn test_vector_literal_count_and_capacity() {
    let source = "[return<int> effects(heap_alloc)]\nmain() {\n  [vector<i32>] v{vector<i32>(5i32, 6i32, 7i32)}\n  return(plus(v.count(), v.capacity()))\n}\n";
    assert_eq!(run(source), 6);
}

#[test]
fn test_vector_pop_shrinks() {
    let source = "[return<int> effects(heap_alloc)]\nmain() {\n  [vector<i32>] v{vector<i32>(5i32, 6i32, 7i32)}\n  [i32] last{v.pop()}\n  return(plus(last, v.count()))\n}\n";
    assert_eq!(run(source), 9);
}

#[test]
fn test_vector_growth_helper_rejected() {
    let source = "[return<int> effects(heap_alloc)]\nmain() {\n  [vector<i32>] v{vector<i32>(5i32)}\n  push(v, 6i32)\n  return(v.count())\n}\n";
    let error = compile(source).unwrap_err();
    assert_eq!(
        error,
        "VM lowering error: vm backend does not support vector helper: push"
    );
}

#[test]
fn test_reference_auto_deref_and_assign() {
    let source = "[return<int>]\nmain() {\n  [i32 mut] value{5i32}\n  [Reference<i32> mut] ref{location(value)}\n  assign(ref, 7i32)\n  return(value)\n}\n";
    assert_eq!(run(source), 7);
}

#[test]
fn test_pointer_assign_through_dereference() {
    let source = "[return<int>]\nmain() {\n  [i32 mut] value{5i32}\n  [Pointer<i32>] ptr{address_of(value)}\n  assign(dereference(ptr), 6i32)\n  return(value)\n}\n";
    assert_eq!(run(source), 6);
}

#[test]
fn test_pointer_arithmetic_walks_array() {
    let source = "[return<int>]\nmain() {\n  [array<i32>] v{array<i32>(4i32, 7i32, 9i32)}\n  [Pointer<i32>] base{location(v)}\n  return(dereference(plus(base, 2i32)))\n}\n";
    // base + 2 slots: header + first element -> second element.
    assert_eq!(run(source), 7);
}

#[test]
fn test_i64_and_u64_arithmetic() {
    assert_eq!(
        run("[return<i64>]\nmain() { return(plus(4000000000i64, 1i64)) }\n"),
        4000000001,
    );
    assert_eq!(
        run("[return<u64>]\nmain() { return(divide(10u64, 3u64)) }\n"),
        3
    );
}

#[test]
fn test_float_compare_drives_branches() {
    let source = "[return<int>]\nmain() {\n  if(less(1.5f64, 2.0f64)) {\n    return(1i32)\n  } else {\n    return(0i32)\n  }\n}\n";
    assert_eq!(run(source), 1);
}

#[test]
fn test_convert_f64_to_int_truncates() {
    let source = "import /math/*\n[return<int>]\nmain() {\n  [f64] sum{plus(pi, plus(tau, e))}\n  return(convert<int>(sum))\n}\n";
    assert_eq!(run(source), 12);
}

#[test]
fn test_math_pow() {
    let source = "import /math/*\n[return<int>]\nmain() { return(pow(2i32, 6i32)) }\n";
    assert_eq!(run(source), 64);
}

#[test]
fn test_math_pow_negative_exponent_exits_three() {
    let source = "import /math/*\n[return<int>]\nmain() { return(pow(2i32, -1i32)) }\n";
    assert_eq!(run(source), 3);
}

#[test]
fn test_math_clamp_min_max() {
    let source = "import /math/*\n[return<int>]\nmain() {\n  return(plus(clamp(9i32, 1i32, 5i32), plus(min(3i32, 4i32), max(3i32, 4i32))))\n}\n";
    assert_eq!(run(source), 12);
}

#[test]
fn test_math_abs_sign() {
    let source = "import /math/*\n[return<int>]\nmain() {\n  return(plus(abs(-4i32), sign(-9i32)))\n}\n";
    assert_eq!(run(source), 3);
}

#[test]
fn test_math_sqrt_converges() {
    let source = "import /math/*\n[return<int>]\nmain() {\n  return(convert<int>(sqrt(81.0f64)))\n}\n";
    assert_eq!(run(source), 9);
}

#[test]
fn test_math_trig_identity() {
    // sin²(x) + cos²(x) scaled by 1000 should land on 1000 for the
    // truncated series at a small angle.
    let source = "import /math/*\n[return<int>]\nmain() {\n  [f64] s{sin(0.5f64)}\n  [f64] c{cos(0.5f64)}\n  return(convert<int>(multiply(plus(multiply(s, s), multiply(c, c)), 1000.0f64)))\n}\n";
    let result = run(source);
    assert!((999..=1001).contains(&result), "got {result}");
}

#[test]
fn test_math_exp_log_round_trip() {
    let source = "import /math/*\n[return<int>]\nmain() {\n  return(convert<int>(multiply(log(exp(1.0f64)), 1000.0f64)))\n}\n";
    let result = run(source);
    assert!((995..=1005).contains(&result), "got {result}");
}

#[test]
fn test_qualified_math_without_import() {
    let source = "[return<int>]\nmain() { return(/math/clamp(9i32, 1i32, 5i32)) }\n";
    assert_eq!(run(source), 5);
}

#[test]
fn test_if_expression_in_binding() {
    let source = "[return<int>]\nmain() {\n  [i32] v{if(greater(2i32, 1i32)) { 7i32 } else { 9i32 }}\n  return(v)\n}\n";
    assert_eq!(run(source), 7);
}

#[test]
fn test_block_scoping() {
    let source = "[return<int>]\nmain() {\n  [i32 mut] value{1i32}\n  block() {\n    [i32] inner{10i32}\n    assign(value, plus(value, inner))\n  }\n  return(value)\n}\n";
    assert_eq!(run(source), 11);
}

#[test]
fn test_import_alias_resolution() {
    let source = "import /util\nnamespace util {\n[return<int>]\ndouble([i32] x) { return(multiply(x, 2i32)) }\n}\n[return<int>]\nmain() { return(double(6i32)) }\n";
    assert_eq!(run(source), 12);
}

#[test]
fn test_pathspace_builtins_are_noops() {
    let source = "[return<int> effects(pathspace_notify, pathspace_insert, pathspace_take)]\nmain() {\n  notify(1i32, 1i32)\n  insert(2i32, 2i32)\n  take(3i32)\n  return(0i32)\n}\n";
    assert_eq!(run(source), 0);
}

#[test]
fn test_default_effects_enable_entry_io() {
    let source = "[return<int>]\nmain() {\n  print_line(\"ok\"utf8)\n  return(0i32)\n}\n";
    // Without defaults this is a semantic error; with `default` it runs.
    assert!(compile(source).unwrap_err().contains("io_out"));

    let config = CompilerConfig::new()
        .with_default_effects(vec!["default".to_string()]);
    let module = prismc::compile_source(
        source,
        &PathBuf::from("test.prism"),
        &config,
        Backend::Vm,
    )
    .unwrap();
    assert_eq!(Vm::new().execute(&module).unwrap(), 0);
}

#[test]
fn test_lambda_rejected_by_backend() {
    let source = "[return<int>]\nmain() { return(lambda(1i32)) }\n";
    let error = compile(source).unwrap_err();
    assert_eq!(error, "VM lowering error: vm backend does not support lambdas");
}

#[test]
fn test_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.txt");
    let source = format!(
        "[return<int> effects(file_write)]\nmain() {{\n  [File] f{{File<Write>(\"{}\"utf8)}}\n  f.write_line(\"hi\"utf8)\n  return(f.close())\n}}\n",
        path.display()
    );
    assert_eq!(run(&source), 0);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "hi\n");
}

#[test]
fn test_file_scope_closes_on_return() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scoped.txt");
    let source = format!(
        "[return<int> effects(file_write)]\nmain() {{\n  [File] f{{File<Write>(\"{}\"utf8)}}\n  f.write(\"data\"utf8)\n  return(7i32)\n}}\n",
        path.display()
    );
    assert_eq!(run(&source), 7);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "data");
}
