//! IR lowerer.
//!
//! Translates a validated program into a single IR function for the
//! chosen entry, inlining every user call it reaches. The model is a
//! single-value-producing stack machine: every expression leaves exactly
//! one value on the stack, every statement leaves it balanced, and the
//! lowerer tracks that invariant itself; the VM never re-checks it.
//!
//! Structured control flow (`if`, `repeat`, `block`, short-circuit
//! `and`/`or`, `try`) becomes `Jump`/`JumpIfZero` chains: each forward
//! jump's instruction index is recorded when emitted and rewritten to the
//! current instruction count when the region closes.

mod collections;
mod explog;
mod exprs;
mod fileio;
mod math;
mod results;
mod statements;
mod trig;

use crate::ast::{Definition, Expr, ExprKind, Program};
use crate::types::{BindingInfo, BindingKind, ValueKind};
use crate::validator::{parse_binding_info, ResultInfo, Validator};
use prism_core::{IrFunction, IrInstruction, IrModule, IrOpcode};
use std::collections::{HashMap, HashSet};

/// Which backend the lowered module is destined for. The IR is identical;
/// only refusal diagnostics carry the tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Vm,
    Native,
}

impl Backend {
    pub fn tag(self) -> &'static str {
        match self {
            Backend::Vm => "vm backend",
            Backend::Native => "native backend",
        }
    }
}

/// A binding paired with its dense local slot. String bindings backed by
/// literals also carry their static string-table index and byte length so
/// print/index lowering can stay table-relative.
#[derive(Debug, Clone)]
pub(crate) struct LocalInfo {
    pub slot: u32,
    pub info: BindingInfo,
    pub string_literal: Option<(u32, usize)>,
}

impl LocalInfo {
    pub fn new(slot: u32, info: BindingInfo) -> Self {
        LocalInfo {
            slot,
            info,
            string_literal: None,
        }
    }
}

pub(crate) type LocalMap = HashMap<String, LocalInfo>;

/// Bookkeeping for one inlined call: where its synthetic return jumps go
/// and which slot carries the return value.
pub(crate) struct InlineContext {
    pub return_local: u32,
    pub return_jumps: Vec<usize>,
    pub returns_void: bool,
    /// File-scope depth at inline entry; returns inside the inline close
    /// only the scopes above this.
    pub scope_base: usize,
}

/// The `on_error` handler active for the current scope.
#[derive(Clone)]
pub(crate) struct OnErrorHandler {
    pub handler_path: String,
    pub bound_args: Vec<Expr>,
}

pub struct IrLowerer<'p> {
    pub(crate) program: &'p Program,
    pub(crate) backend: Backend,
    pub(crate) definitions: HashMap<String, &'p Definition>,
    pub(crate) struct_paths: HashSet<String>,
    pub(crate) import_aliases: Vec<String>,
    pub(crate) math_wildcard: bool,
    pub(crate) math_symbols: HashSet<String>,
    pub(crate) entry_path: String,
    /// Name of the entry's `array<string>` parameter, when present.
    pub(crate) entry_args_name: Option<String>,

    pub(crate) module: IrModule,
    pub(crate) function: IrFunction,
    next_local: u32,
    /// Open file-handle slots per scope, closed LIFO on every exit path.
    pub(crate) file_scopes: Vec<Vec<u32>>,
    pub(crate) current_on_error: Option<OnErrorHandler>,
    pub(crate) on_error_temp_counter: usize,
    /// Definition paths currently being inlined (cycle rejection).
    pub(crate) inline_stack: Vec<String>,
    pub(crate) inline_contexts: Vec<InlineContext>,
    pub(crate) current_return_result: ResultInfo,
    pub(crate) current_returns_void: bool,
}

impl<'p> IrLowerer<'p> {
    pub fn new(program: &'p Program, backend: Backend) -> Self {
        IrLowerer {
            program,
            backend,
            definitions: HashMap::new(),
            struct_paths: HashSet::new(),
            import_aliases: Vec::new(),
            math_wildcard: false,
            math_symbols: HashSet::new(),
            entry_path: String::new(),
            entry_args_name: None,
            module: IrModule::new(),
            function: IrFunction::default(),
            next_local: 0,
            file_scopes: Vec::new(),
            current_on_error: None,
            on_error_temp_counter: 0,
            inline_stack: Vec::new(),
            inline_contexts: Vec::new(),
            current_return_result: ResultInfo::default(),
            current_returns_void: false,
        }
    }

    /// Lower the entry definition (and everything it transitively calls)
    /// into `module`. The program must already have passed validation.
    pub fn lower(
        program: &'p Program,
        entry_path: &str,
        backend: Backend,
    ) -> Result<IrModule, String> {
        let mut lowerer = IrLowerer::new(program, backend);
        lowerer.entry_path = entry_path.to_string();
        lowerer.build_tables();

        let entry = lowerer
            .definitions
            .get(entry_path)
            .copied()
            .ok_or_else(|| format!("missing entry definition: {}", entry_path))?;

        lowerer.check_supported_effects(entry)?;
        lowerer.function.name = entry_path.to_string();
        lowerer.inline_stack.push(entry_path.to_string());

        let mut locals: LocalMap = HashMap::new();
        if let Some(param) = entry.params.first() {
            // The entry's array<string> parameter stays argv-backed: it
            // has no slot, accesses go through the argv opcodes.
            let mut info = BindingInfo::default();
            info.kind = BindingKind::Array;
            info.value_kind = ValueKind::String;
            info.type_name = "array".to_string();
            info.template_arg = Some("string".to_string());
            info.is_entry_args = true;
            lowerer.entry_args_name = Some(param.name.clone());
            locals.insert(param.name.clone(), LocalInfo::new(u32::MAX, info));
        }

        lowerer.current_return_result = Validator::result_info(entry);
        let return_kind = entry.declared_return_type();
        lowerer.current_returns_void = return_kind.is_none() || return_kind == Some("void");

        lowerer.push_file_scope();
        for statement in &entry.body {
            lowerer.emit_statement(statement, &mut locals)?;
        }
        let scope = lowerer.file_scopes.last().cloned().unwrap_or_default();
        lowerer.emit_file_scope_cleanup(&scope);
        lowerer.pop_file_scope();

        // Fall off the end: the process exit value defaults to 0.
        lowerer.emit(IrOpcode::PushI32, 0);
        lowerer.emit(IrOpcode::ReturnI32, 0);

        lowerer.function.local_count = lowerer.next_local;
        let function = std::mem::take(&mut lowerer.function);
        lowerer.module.functions.push(function);
        lowerer.module.entry_index = 0;
        Ok(lowerer.module)
    }

    /// Effects the runtimes implement. Anything else (render-graph
    /// pipelines and the like) is refused up front.
    fn check_supported_effects(&self, definition: &Definition) -> Result<(), String> {
        const SUPPORTED: &[&str] = &[
            "io_out",
            "io_err",
            "heap_alloc",
            "file_read",
            "file_write",
            "pathspace_notify",
            "pathspace_insert",
            "pathspace_take",
        ];
        if let Some(effects) = definition.find_transform("effects") {
            for effect in &effects.args {
                if !SUPPORTED.contains(&effect.name.as_str()) && effect.name != "none" {
                    return Err(format!(
                        "{} does not support effect: {} on {}",
                        self.backend.tag(),
                        effect.name,
                        definition.full_path
                    ));
                }
            }
        }
        Ok(())
    }

    fn build_tables(&mut self) {
        for definition in &self.program.definitions {
            self.definitions
                .insert(definition.full_path.clone(), definition);
            if definition.is_field_only() {
                self.struct_paths.insert(definition.full_path.clone());
            }
        }
        for import in &self.program.imports {
            let path = import.path.as_str();
            if path == "/math/*" {
                self.math_wildcard = true;
            } else if let Some(symbol) = path.strip_prefix("/math/") {
                self.math_symbols.insert(symbol.to_string());
            } else {
                self.import_aliases.push(path.to_string());
            }
        }
    }

    // ---- emission primitives -------------------------------------------

    pub(crate) fn emit(&mut self, op: IrOpcode, imm: u64) {
        self.function.instructions.push(IrInstruction::new(op, imm));
    }

    /// Current instruction index; the target a forward jump patches to.
    pub(crate) fn here(&self) -> usize {
        self.function.instructions.len()
    }

    /// Emit a jump with a placeholder target, returning its index for
    /// later patching.
    pub(crate) fn emit_jump(&mut self, op: IrOpcode) -> usize {
        let index = self.here();
        self.emit(op, 0);
        index
    }

    /// Rewrite a recorded forward jump to land at the current index.
    pub(crate) fn patch_jump(&mut self, jump_index: usize) {
        let target = self.here() as u64;
        self.function.instructions[jump_index].imm = target;
    }

    pub(crate) fn alloc_temp_local(&mut self) -> u32 {
        let slot = self.next_local;
        self.next_local += 1;
        slot
    }

    /// Contiguous block of slots for collection headers and elements.
    pub(crate) fn alloc_local_block(&mut self, count: u32) -> u32 {
        let base = self.next_local;
        self.next_local += count;
        base
    }

    pub(crate) fn push_float_const(&mut self, value: f64, kind: ValueKind) {
        if kind == ValueKind::Float32 {
            let bits = (value as f32).to_bits();
            self.emit(IrOpcode::PushF32, u64::from(bits));
        } else {
            self.emit(IrOpcode::PushF64, value.to_bits());
        }
    }

    pub(crate) fn intern(&mut self, bytes: &[u8]) -> u32 {
        self.module.intern_string(bytes)
    }

    pub(crate) fn unsupported(&self, what: &str) -> String {
        format!("{} does not support {}", self.backend.tag(), what)
    }

    // ---- file scopes ----------------------------------------------------

    pub(crate) fn push_file_scope(&mut self) {
        self.file_scopes.push(Vec::new());
    }

    pub(crate) fn pop_file_scope(&mut self) {
        self.file_scopes.pop();
    }

    pub(crate) fn register_file_handle(&mut self, slot: u32) {
        if let Some(scope) = self.file_scopes.last_mut() {
            scope.push(slot);
        }
    }

    /// Close the scope's still-open handles in LIFO order. Emitted at the
    /// scope's normal end and on every early exit.
    pub(crate) fn emit_file_scope_cleanup(&mut self, scope: &[u32]) {
        for &slot in scope.iter().rev() {
            self.emit(IrOpcode::LoadLocal, u64::from(slot));
            self.emit(IrOpcode::FileClose, 0);
            self.emit(IrOpcode::Pop, 0);
        }
    }

    /// Cleanup across every open scope, for returns that leave the
    /// function entirely.
    pub(crate) fn emit_file_scope_cleanup_all(&mut self) {
        self.emit_file_scope_cleanup_from(0);
    }

    /// Cleanup for every scope at or above `base`, innermost first.
    pub(crate) fn emit_file_scope_cleanup_from(&mut self, base: usize) {
        let scopes: Vec<Vec<u32>> = self.file_scopes[base.min(self.file_scopes.len())..].to_vec();
        for scope in scopes.iter().rev() {
            self.emit_file_scope_cleanup(scope);
        }
    }

    // ---- resolution ------------------------------------------------------

    pub(crate) fn resolve_definition_call(&self, expr: &Expr) -> Option<&'p Definition> {
        if let Some(prefix) = &expr.namespace_prefix {
            let path = if prefix == "/" {
                format!("/{}", expr.name)
            } else {
                format!("{}/{}", prefix, expr.name)
            };
            return self.definitions.get(path.as_str()).copied();
        }
        let root = format!("/{}", expr.name);
        if let Some(definition) = self.definitions.get(root.as_str()) {
            return Some(definition);
        }
        for alias in &self.import_aliases {
            let candidate = format!("{}/{}", alias, expr.name);
            if let Some(definition) = self.definitions.get(candidate.as_str()) {
                return Some(definition);
            }
        }
        None
    }

    /// Method resolution mirrors the validator: explicit prefix, the
    /// receiver's type namespace, then free definitions.
    pub(crate) fn resolve_method_call_definition(
        &self,
        expr: &Expr,
        locals: &LocalMap,
    ) -> Option<&'p Definition> {
        let receiver = expr.args.first()?;
        if let Some(prefix) = &expr.namespace_prefix {
            let path = format!("{}/{}", prefix, expr.name);
            return self.definitions.get(path.as_str()).copied();
        }
        if let Some(type_name) = self.receiver_type_name(receiver, locals) {
            let path = format!("/{}/{}", type_name, expr.name);
            if let Some(definition) = self.definitions.get(path.as_str()) {
                return Some(definition);
            }
            for alias in &self.import_aliases {
                let candidate = format!("{}/{}/{}", alias, type_name, expr.name);
                if let Some(definition) = self.definitions.get(candidate.as_str()) {
                    return Some(definition);
                }
            }
        }
        self.resolve_definition_call(expr)
    }

    fn receiver_type_name(&self, receiver: &Expr, locals: &LocalMap) -> Option<String> {
        match receiver.kind {
            ExprKind::Literal => Some(
                match (receiver.int_width, receiver.is_unsigned) {
                    (_, true) => "u64",
                    (64, _) => "i64",
                    _ => "i32",
                }
                .to_string(),
            ),
            ExprKind::FloatLiteral => Some(
                if receiver.float_is_single { "f32" } else { "f64" }.to_string(),
            ),
            ExprKind::BoolLiteral => Some("bool".to_string()),
            ExprKind::StringLiteral => Some("string".to_string()),
            ExprKind::Name => locals.get(&receiver.name).map(|local| {
                if local.info.type_name == "int" {
                    "i32".to_string()
                } else {
                    local.info.type_name.clone()
                }
            }),
            ExprKind::Call => match self.infer_expr_kind(receiver, locals) {
                ValueKind::Int32 => Some("i32".to_string()),
                ValueKind::Int64 => Some("i64".to_string()),
                ValueKind::UInt64 => Some("u64".to_string()),
                ValueKind::Float32 => Some("f32".to_string()),
                ValueKind::Float64 => Some("f64".to_string()),
                ValueKind::Bool => Some("bool".to_string()),
                ValueKind::String => Some("string".to_string()),
                ValueKind::Unknown => None,
            },
        }
    }

    pub(crate) fn math_reachable(&self, expr: &Expr, name: &str) -> bool {
        if expr.namespace_prefix.as_deref() == Some("/math") {
            return true;
        }
        if expr.namespace_prefix.is_some() {
            return false;
        }
        self.math_wildcard || self.math_symbols.contains(name)
    }

    // ---- inlining --------------------------------------------------------

    /// Inline a call to a user definition: arguments (and defaults) are
    /// evaluated into fresh slots mapped to the callee's parameters, the
    /// callee body is emitted in place, and its `return` statements jump
    /// to a synthetic join point that leaves the return value (if any) on
    /// the stack.
    pub(crate) fn emit_inline_definition_call(
        &mut self,
        expr: &Expr,
        callee: &'p Definition,
        locals: &LocalMap,
        push_result: bool,
    ) -> Result<(), String> {
        if self.inline_stack.contains(&callee.full_path) {
            return Err(format!("inlining cycle: {}", callee.full_path));
        }
        self.check_supported_effects(callee)?;
        if expr.args.len() > callee.params.len() {
            return Err(format!(
                "call argument count mismatch for {}",
                callee.full_path
            ));
        }

        // Bind arguments to fresh parameter slots.
        let mut callee_locals: LocalMap = HashMap::new();
        for (index, param) in callee.params.iter().enumerate() {
            let (mut info, _) = parse_binding_info(&param.transforms, &self.struct_paths)?;
            let supplied = expr.args.get(index);
            let initializer = match supplied {
                Some(arg) => arg,
                None => param.args.first().ok_or_else(|| {
                    format!("missing argument for parameter {}", param.name)
                })?,
            };
            if info.type_name.is_empty() {
                info.value_kind = self.infer_expr_kind(initializer, locals);
                info.kind = BindingKind::Value;
            }
            // Arguments evaluate in the caller's scope; defaults are pure
            // and evaluate anywhere.
            self.emit_expr(initializer, locals)?;
            let slot = self.alloc_temp_local();
            self.emit(IrOpcode::StoreLocal, u64::from(slot));
            // Collections and references flow through as addresses; the
            // callee sees the caller binding's full shape. String-literal
            // arguments keep their table backing.
            let mut string_literal = None;
            if let Some(arg) = supplied {
                if arg.kind == ExprKind::Name {
                    if let Some(local) = locals.get(&arg.name) {
                        info = local.info.clone();
                        string_literal = local.string_literal;
                    }
                }
            }
            if string_literal.is_none() {
                string_literal = self.resolve_string_target(initializer, locals);
                if string_literal.is_some() {
                    info.kind = BindingKind::String;
                    info.value_kind = ValueKind::String;
                    info.type_name = "string".to_string();
                }
            }
            callee_locals.insert(
                param.name.clone(),
                LocalInfo {
                    slot,
                    info,
                    string_literal,
                },
            );
        }

        let return_local = self.alloc_temp_local();
        let callee_result = Validator::result_info(callee);
        let callee_return = callee.declared_return_type();
        let returns_void = callee_return.is_none() || callee_return == Some("void");

        self.inline_stack.push(callee.full_path.clone());
        self.inline_contexts.push(InlineContext {
            return_local,
            return_jumps: Vec::new(),
            returns_void,
            scope_base: self.file_scopes.len(),
        });
        let saved_result = self.current_return_result;
        let saved_void = self.current_returns_void;
        let saved_on_error = self.current_on_error.clone();
        self.current_return_result = callee_result;
        self.current_returns_void = returns_void;
        self.current_on_error = None;

        self.push_file_scope();
        let mut body_locals = callee_locals;
        for statement in &callee.body {
            self.emit_statement(statement, &mut body_locals)?;
        }
        let scope = self.file_scopes.last().cloned().unwrap_or_default();
        self.emit_file_scope_cleanup(&scope);
        self.pop_file_scope();

        // Falling off the end of a void callee is fine; non-void callees
        // are guaranteed a return by the validator, but keep the slot
        // defined regardless.
        if returns_void {
            self.emit(IrOpcode::PushI32, 0);
            self.emit(IrOpcode::StoreLocal, u64::from(return_local));
        }

        let context = self
            .inline_contexts
            .pop()
            .ok_or_else(|| "inline context underflow".to_string())?;
        for jump in context.return_jumps {
            self.patch_jump(jump);
        }
        self.inline_stack.pop();
        self.current_return_result = saved_result;
        self.current_returns_void = saved_void;
        self.current_on_error = saved_on_error;

        if push_result {
            // A void callee in expression position still produces its
            // zero slot so the stack discipline holds; statement emission
            // pops it.
            self.emit(IrOpcode::LoadLocal, u64::from(return_local));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::{Parser, TextFilters};
    use prism_core::IrOpcode;

    fn lower(source: &str) -> Result<IrModule, String> {
        let program = Parser::new(source, "test.prism", &TextFilters::default())
            .unwrap()
            .parse()
            .unwrap();
        Validator::validate(&program, "/main", &[], &[])?;
        IrLowerer::lower(&program, "/main", Backend::Vm)
    }

    #[test]
    fn test_lowers_simple_return() {
        let module = lower("[return<int>]\nmain() { return(7i32) }\n").unwrap();
        let entry = module.entry().unwrap();
        assert_eq!(entry.name, "/main");
        let ops: Vec<IrOpcode> = entry.instructions.iter().map(|i| i.op).collect();
        assert!(ops.contains(&IrOpcode::PushI32));
        assert!(ops.contains(&IrOpcode::ReturnI32));
    }

    #[test]
    fn test_jump_targets_are_in_range() {
        let module = lower(
            "[return<int>]\nmain() {\n  if(true) {\n    return(1i32)\n  } else {\n    return(2i32)\n  }\n}\n",
        )
        .unwrap();
        let entry = module.entry().unwrap();
        for inst in &entry.instructions {
            if inst.op.is_jump() {
                assert!(
                    (inst.imm as usize) <= entry.instructions.len(),
                    "jump target {} out of range",
                    inst.imm
                );
            }
        }
    }

    #[test]
    fn test_inlining_cycle_rejected() {
        let err = lower(
            "[return<int>]\nloop() { return(loop()) }\n[return<int>]\nmain() { return(loop()) }\n",
        )
        .unwrap_err();
        assert_eq!(err, "inlining cycle: /loop");
    }

    #[test]
    fn test_mutual_recursion_rejected() {
        let err = lower(
            "[return<int>]\nping() { return(pong()) }\n[return<int>]\npong() { return(ping()) }\n[return<int>]\nmain() { return(ping()) }\n",
        )
        .unwrap_err();
        assert!(err.starts_with("inlining cycle: "), "got {err}");
    }

    #[test]
    fn test_user_call_is_inlined() {
        let module = lower(
            "[return<int>]\ndouble([i32] x) { return(multiply(x, 2i32)) }\n[return<int>]\nmain() { return(double(21i32)) }\n",
        )
        .unwrap();
        // Everything collapses into the single entry function.
        assert_eq!(module.functions.len(), 1);
        let ops: Vec<IrOpcode> = module.functions[0]
            .instructions
            .iter()
            .map(|i| i.op)
            .collect();
        assert!(ops.contains(&IrOpcode::MulI32));
    }
}
