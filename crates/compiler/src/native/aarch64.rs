//! AArch64 assembly emission.
//!
//! Register plan:
//! - `x19`: value-stack cursor (full descending over an 8-byte-cell
//!   buffer in bss; push is `str x0, [x19], #8`)
//! - `x20`: locals base (16-byte slots, zero-initialized bss)
//! - `x21`: heap bump cursor for `HeapAlloc`
//! - `x0..x15`, `d0/d1`: scratch
//!
//! Every IR instruction gets a local label so absolute jump targets map
//! one-to-one. Cells mirror the VM exactly: i32 results are kept
//! sign-extended, f32 values live in the low word.

use super::{NativeError, Target};
use prism_core::{decode_print_flags, decode_print_payload, IrModule, IrOpcode, PRINT_FLAG_NEWLINE, PRINT_FLAG_STDERR};
use std::fmt::Write;

/// Value-stack cells reserved in bss.
const STACK_CELLS: usize = 1 << 16;
/// Heap arena slots reserved for vector literals.
const HEAP_SLOTS: usize = 1 << 16;

pub fn emit_assembly(module: &IrModule, target: Target) -> Result<String, NativeError> {
    let entry = module.entry().ok_or_else(|| {
        NativeError::Unsupported("native backend requires an entry function".to_string())
    })?;

    let mut asm = String::new();
    emit_prologue(&mut asm, module, entry.local_count, target)?;

    for (index, inst) in entry.instructions.iter().enumerate() {
        writeln!(asm, "Lins{}:", index)?;
        emit_instruction(&mut asm, module, inst.op, inst.imm, target)?;
    }
    // Falling off the end exits 0, like the VM's implicit void return.
    writeln!(asm, "Lins{}:", entry.instructions.len())?;
    writeln!(asm, "\tmov\tx0, #0")?;
    writeln!(asm, "\tbl\t{}", target.symbol("exit"))?;

    emit_runtime_helpers(&mut asm, target)?;
    emit_data(&mut asm, module, entry.local_count, target)?;
    Ok(asm)
}

fn emit_prologue(
    asm: &mut String,
    _module: &IrModule,
    _local_count: u32,
    target: Target,
) -> Result<(), NativeError> {
    writeln!(asm, "\t.text")?;
    writeln!(asm, "\t.align\t2")?;
    writeln!(asm, "\t.globl\t{}", target.symbol("main"))?;
    writeln!(asm, "{}:", target.symbol("main"))?;
    // Save argc/argv for the argv opcodes.
    emit_load_global_address(asm, "prism_argc", "x2", target)?;
    writeln!(asm, "\tstr\tx0, [x2]")?;
    emit_load_global_address(asm, "prism_argv", "x2", target)?;
    writeln!(asm, "\tstr\tx1, [x2]")?;
    // Machine registers: stack cursor, locals base, heap cursor.
    emit_load_global_address(asm, "prism_stack", "x19", target)?;
    emit_load_global_address(asm, "prism_locals", "x20", target)?;
    emit_load_global_address(asm, "prism_heap", "x21", target)?;
    Ok(())
}

fn emit_instruction(
    asm: &mut String,
    module: &IrModule,
    op: IrOpcode,
    imm: u64,
    target: Target,
) -> Result<(), NativeError> {
    use IrOpcode::*;
    match op {
        PushI32 => {
            emit_load_imm(asm, "x0", imm as u32 as i32 as i64 as u64)?;
            emit_push(asm, "x0")?;
        }
        PushI64 | PushF64 => {
            emit_load_imm(asm, "x0", imm)?;
            emit_push(asm, "x0")?;
        }
        PushF32 => {
            emit_load_imm(asm, "x0", imm & 0xffff_ffff)?;
            emit_push(asm, "x0")?;
        }

        AddI32 => emit_binary_w(asm, "add")?,
        SubI32 => emit_binary_w(asm, "sub")?,
        MulI32 => emit_binary_w(asm, "mul")?,
        DivI32 => emit_binary_w(asm, "sdiv")?,
        RemI32 => {
            emit_pop(asm, "x1")?;
            emit_pop(asm, "x0")?;
            writeln!(asm, "\tsdiv\tw2, w0, w1")?;
            writeln!(asm, "\tmsub\tw0, w2, w1, w0")?;
            writeln!(asm, "\tsxtw\tx0, w0")?;
            emit_push(asm, "x0")?;
        }
        NegI32 => {
            emit_pop(asm, "x0")?;
            writeln!(asm, "\tneg\tw0, w0")?;
            writeln!(asm, "\tsxtw\tx0, w0")?;
            emit_push(asm, "x0")?;
        }

        AddI64 => emit_binary_x(asm, "add")?,
        SubI64 => emit_binary_x(asm, "sub")?,
        MulI64 => emit_binary_x(asm, "mul")?,
        DivI64 => emit_binary_x(asm, "sdiv")?,
        DivU64 => emit_binary_x(asm, "udiv")?,
        RemI64 | RemU64 => {
            let div = if op == RemI64 { "sdiv" } else { "udiv" };
            emit_pop(asm, "x1")?;
            emit_pop(asm, "x0")?;
            writeln!(asm, "\t{}\tx2, x0, x1", div)?;
            writeln!(asm, "\tmsub\tx0, x2, x1, x0")?;
            emit_push(asm, "x0")?;
        }
        NegI64 => {
            emit_pop(asm, "x0")?;
            writeln!(asm, "\tneg\tx0, x0")?;
            emit_push(asm, "x0")?;
        }

        AddF32 => emit_binary_f32(asm, "fadd")?,
        SubF32 => emit_binary_f32(asm, "fsub")?,
        MulF32 => emit_binary_f32(asm, "fmul")?,
        DivF32 => emit_binary_f32(asm, "fdiv")?,
        NegF32 => {
            emit_pop(asm, "x0")?;
            writeln!(asm, "\tfmov\ts0, w0")?;
            writeln!(asm, "\tfneg\ts0, s0")?;
            writeln!(asm, "\tfmov\tw0, s0")?;
            writeln!(asm, "\tmov\tw0, w0")?;
            emit_push(asm, "x0")?;
        }
        AddF64 => emit_binary_f64(asm, "fadd")?,
        SubF64 => emit_binary_f64(asm, "fsub")?,
        MulF64 => emit_binary_f64(asm, "fmul")?,
        DivF64 => emit_binary_f64(asm, "fdiv")?,
        NegF64 => {
            emit_pop(asm, "x0")?;
            writeln!(asm, "\tfmov\td0, x0")?;
            writeln!(asm, "\tfneg\td0, d0")?;
            writeln!(asm, "\tfmov\tx0, d0")?;
            emit_push(asm, "x0")?;
        }

        CmpEqI32 => emit_compare_w(asm, "eq")?,
        CmpNeI32 => emit_compare_w(asm, "ne")?,
        CmpLtI32 => emit_compare_w(asm, "lt")?,
        CmpLeI32 => emit_compare_w(asm, "le")?,
        CmpGtI32 => emit_compare_w(asm, "gt")?,
        CmpGeI32 => emit_compare_w(asm, "ge")?,
        CmpEqI64 => emit_compare_x(asm, "eq")?,
        CmpNeI64 => emit_compare_x(asm, "ne")?,
        CmpLtI64 => emit_compare_x(asm, "lt")?,
        CmpLeI64 => emit_compare_x(asm, "le")?,
        CmpGtI64 => emit_compare_x(asm, "gt")?,
        CmpGeI64 => emit_compare_x(asm, "ge")?,
        CmpLtU64 => emit_compare_x(asm, "lo")?,
        CmpLeU64 => emit_compare_x(asm, "ls")?,
        CmpGtU64 => emit_compare_x(asm, "hi")?,
        CmpGeU64 => emit_compare_x(asm, "hs")?,
        CmpEqF32 => emit_compare_f32(asm, "eq")?,
        CmpNeF32 => emit_compare_f32(asm, "ne")?,
        CmpLtF32 => emit_compare_f32(asm, "mi")?,
        CmpLeF32 => emit_compare_f32(asm, "ls")?,
        CmpGtF32 => emit_compare_f32(asm, "gt")?,
        CmpGeF32 => emit_compare_f32(asm, "ge")?,
        CmpEqF64 => emit_compare_f64(asm, "eq")?,
        CmpNeF64 => emit_compare_f64(asm, "ne")?,
        CmpLtF64 => emit_compare_f64(asm, "mi")?,
        CmpLeF64 => emit_compare_f64(asm, "ls")?,
        CmpGtF64 => emit_compare_f64(asm, "gt")?,
        CmpGeF64 => emit_compare_f64(asm, "ge")?,

        ConvertI32ToI64 => {
            emit_pop(asm, "x0")?;
            writeln!(asm, "\tsxtw\tx0, w0")?;
            emit_push(asm, "x0")?;
        }
        ConvertI64ToI32 => {
            emit_pop(asm, "x0")?;
            writeln!(asm, "\tsxtw\tx0, w0")?;
            emit_push(asm, "x0")?;
        }
        ConvertI32ToF32 => {
            emit_pop(asm, "x0")?;
            writeln!(asm, "\tscvtf\ts0, w0")?;
            writeln!(asm, "\tfmov\tw0, s0")?;
            writeln!(asm, "\tmov\tw0, w0")?;
            emit_push(asm, "x0")?;
        }
        ConvertI32ToF64 => {
            emit_pop(asm, "x0")?;
            writeln!(asm, "\tscvtf\td0, w0")?;
            writeln!(asm, "\tfmov\tx0, d0")?;
            emit_push(asm, "x0")?;
        }
        ConvertI64ToF64 => {
            emit_pop(asm, "x0")?;
            writeln!(asm, "\tscvtf\td0, x0")?;
            writeln!(asm, "\tfmov\tx0, d0")?;
            emit_push(asm, "x0")?;
        }
        ConvertU64ToF64 => {
            emit_pop(asm, "x0")?;
            writeln!(asm, "\tucvtf\td0, x0")?;
            writeln!(asm, "\tfmov\tx0, d0")?;
            emit_push(asm, "x0")?;
        }
        ConvertF32ToI32 => {
            emit_pop(asm, "x0")?;
            writeln!(asm, "\tfmov\ts0, w0")?;
            writeln!(asm, "\tfcvtzs\tw0, s0")?;
            writeln!(asm, "\tsxtw\tx0, w0")?;
            emit_push(asm, "x0")?;
        }
        ConvertF64ToI64 => {
            emit_pop(asm, "x0")?;
            writeln!(asm, "\tfmov\td0, x0")?;
            writeln!(asm, "\tfcvtzs\tx0, d0")?;
            emit_push(asm, "x0")?;
        }
        ConvertF64ToU64 => {
            emit_pop(asm, "x0")?;
            writeln!(asm, "\tfmov\td0, x0")?;
            writeln!(asm, "\tfcvtzu\tx0, d0")?;
            emit_push(asm, "x0")?;
        }
        ConvertF32ToF64 => {
            emit_pop(asm, "x0")?;
            writeln!(asm, "\tfmov\ts0, w0")?;
            writeln!(asm, "\tfcvt\td0, s0")?;
            writeln!(asm, "\tfmov\tx0, d0")?;
            emit_push(asm, "x0")?;
        }
        ConvertF64ToF32 => {
            emit_pop(asm, "x0")?;
            writeln!(asm, "\tfmov\td0, x0")?;
            writeln!(asm, "\tfcvt\ts0, d0")?;
            writeln!(asm, "\tfmov\tw0, s0")?;
            writeln!(asm, "\tmov\tw0, w0")?;
            emit_push(asm, "x0")?;
        }

        LoadLocal => {
            emit_local_address(asm, imm, "x1")?;
            writeln!(asm, "\tldr\tx0, [x1]")?;
            emit_push(asm, "x0")?;
        }
        StoreLocal => {
            emit_pop(asm, "x0")?;
            emit_local_address(asm, imm, "x1")?;
            writeln!(asm, "\tstr\tx0, [x1]")?;
        }
        AddressOfLocal => {
            emit_local_address(asm, imm, "x0")?;
            emit_push(asm, "x0")?;
        }
        LoadIndirect => {
            emit_pop(asm, "x0")?;
            writeln!(asm, "\tldr\tx0, [x0]")?;
            emit_push(asm, "x0")?;
        }
        StoreIndirect => {
            emit_pop(asm, "x1")?;
            emit_pop(asm, "x0")?;
            writeln!(asm, "\tstr\tx1, [x0]")?;
        }

        Pop => {
            emit_pop(asm, "x0")?;
        }
        Dup => {
            emit_pop(asm, "x0")?;
            emit_push(asm, "x0")?;
            emit_push(asm, "x0")?;
        }

        Jump => {
            writeln!(asm, "\tb\tLins{}", imm)?;
        }
        JumpIfZero => {
            emit_pop(asm, "x0")?;
            writeln!(asm, "\tcbz\tx0, Lins{}", imm)?;
        }
        ReturnI32 => {
            emit_pop(asm, "x0")?;
            writeln!(asm, "\tmov\tw0, w0")?;
            writeln!(asm, "\tbl\t{}", target.symbol("exit"))?;
        }
        ReturnI64 | ReturnVoid => {
            if op == ReturnI64 {
                emit_pop(asm, "x0")?;
            } else {
                writeln!(asm, "\tmov\tx0, #0")?;
            }
            writeln!(asm, "\tbl\t{}", target.symbol("exit"))?;
        }
        Exit => {
            emit_load_imm(asm, "x0", imm)?;
            writeln!(asm, "\tbl\t{}", target.symbol("exit"))?;
        }

        HeapAlloc => {
            writeln!(asm, "\tmov\tx0, x21")?;
            emit_load_imm(asm, "x1", imm * 16)?;
            writeln!(asm, "\tadd\tx21, x21, x1")?;
            emit_push(asm, "x0")?;
        }

        PrintString => {
            let index = decode_print_payload(imm) as usize;
            let length = module
                .string_table
                .get(index)
                .map(Vec::len)
                .ok_or_else(|| {
                    NativeError::Unsupported(format!("string index out of range: {}", index))
                })?;
            let flags = decode_print_flags(imm);
            emit_fd(asm, flags)?;
            emit_string_address(asm, index, "x1", target)?;
            emit_load_imm(asm, "x2", length as u64)?;
            writeln!(asm, "\tbl\t{}", target.symbol("write"))?;
            emit_optional_newline(asm, flags, target)?;
        }
        PrintI32 => {
            emit_pop(asm, "x0")?;
            writeln!(asm, "\tsxtw\tx0, w0")?;
            emit_print_int(asm, imm, false, target)?;
        }
        PrintI64 => {
            emit_pop(asm, "x0")?;
            emit_print_int(asm, imm, false, target)?;
        }
        PrintU64 => {
            emit_pop(asm, "x0")?;
            emit_print_int(asm, imm, true, target)?;
        }
        PrintBool => {
            emit_pop(asm, "x0")?;
            let flags = decode_print_flags(imm);
            let label = next_label(asm);
            writeln!(asm, "\tcbz\tx0, {}_false", label)?;
            emit_fd(asm, flags)?;
            emit_label_address(asm, "prism_true", "x1", target)?;
            writeln!(asm, "\tmov\tx2, #4")?;
            writeln!(asm, "\tbl\t{}", target.symbol("write"))?;
            writeln!(asm, "\tb\t{}_end", label)?;
            writeln!(asm, "{}_false:", label)?;
            emit_fd(asm, flags)?;
            emit_label_address(asm, "prism_false", "x1", target)?;
            writeln!(asm, "\tmov\tx2, #5")?;
            writeln!(asm, "\tbl\t{}", target.symbol("write"))?;
            writeln!(asm, "{}_end:", label)?;
            emit_optional_newline(asm, flags, target)?;
        }
        PrintNewline => {
            emit_optional_newline(asm, decode_print_flags(imm) | PRINT_FLAG_NEWLINE, target)?;
        }

        PushArgc => {
            emit_load_global_address(asm, "prism_argc", "x1", target)?;
            writeln!(asm, "\tldr\tx0, [x1]")?;
            emit_push(asm, "x0")?;
        }
        PrintArgv | PrintArgvUnsafe => {
            emit_pop(asm, "x0")?;
            let flags = decode_print_flags(imm);
            if op == PrintArgv {
                // Bounds check against argc; out of range reports the
                // collection failure and exits 3.
                let label = next_label(asm);
                emit_load_global_address(asm, "prism_argc", "x2", target)?;
                writeln!(asm, "\tldr\tx2, [x2]")?;
                writeln!(asm, "\tcmp\tx0, #0")?;
                writeln!(asm, "\tb.lt\t{}_oob", label)?;
                writeln!(asm, "\tcmp\tx0, x2")?;
                writeln!(asm, "\tb.lt\t{}_ok", label)?;
                writeln!(asm, "{}_oob:", label)?;
                writeln!(asm, "\tbl\t{}", target.symbol("prism_argv_oob"))?;
                writeln!(asm, "{}_ok:", label)?;
            }
            emit_load_imm(asm, "x1", flags)?;
            writeln!(asm, "\tbl\t{}", target.symbol("prism_print_argv"))?;
        }

        LoadStringByte => {
            emit_pop(asm, "x1")?;
            emit_string_address(asm, imm as usize, "x0", target)?;
            writeln!(asm, "\tldrb\tw0, [x0, x1]")?;
            emit_push(asm, "x0")?;
        }

        FileOpenRead | FileOpenWrite | FileOpenAppend => {
            emit_string_address(asm, imm as usize, "x0", target)?;
            let flags = open_flags(op, target);
            emit_load_imm(asm, "x1", flags)?;
            emit_load_imm(asm, "x2", 0o644)?;
            writeln!(asm, "\tbl\t{}", target.symbol("open"))?;
            writeln!(asm, "\tsxtw\tx0, w0")?;
            emit_push(asm, "x0")?;
        }
        FileWriteString => {
            let length = module
                .string_table
                .get(imm as usize)
                .map(Vec::len)
                .ok_or_else(|| {
                    NativeError::Unsupported(format!("string index out of range: {}", imm))
                })?;
            emit_pop(asm, "x0")?;
            emit_string_address(asm, imm as usize, "x1", target)?;
            emit_load_imm(asm, "x2", length as u64)?;
            writeln!(asm, "\tbl\t{}", target.symbol("prism_fd_write"))?;
            emit_push(asm, "x0")?;
        }
        FileWriteI32 => {
            emit_pop(asm, "x1")?;
            writeln!(asm, "\tsxtw\tx1, w1")?;
            emit_pop(asm, "x0")?;
            writeln!(asm, "\tbl\t{}", target.symbol("prism_fd_write_int"))?;
            emit_push(asm, "x0")?;
        }
        FileWriteI64 => {
            emit_pop(asm, "x1")?;
            emit_pop(asm, "x0")?;
            writeln!(asm, "\tbl\t{}", target.symbol("prism_fd_write_int"))?;
            emit_push(asm, "x0")?;
        }
        FileWriteU64 => {
            emit_pop(asm, "x1")?;
            emit_pop(asm, "x0")?;
            writeln!(asm, "\tbl\t{}", target.symbol("prism_fd_write_uint"))?;
            emit_push(asm, "x0")?;
        }
        FileWriteByte => {
            emit_pop(asm, "x1")?;
            emit_pop(asm, "x0")?;
            writeln!(asm, "\tbl\t{}", target.symbol("prism_fd_write_byte"))?;
            emit_push(asm, "x0")?;
        }
        FileWriteNewline => {
            emit_pop(asm, "x0")?;
            writeln!(asm, "\tmov\tx1, #10")?;
            writeln!(asm, "\tbl\t{}", target.symbol("prism_fd_write_byte"))?;
            emit_push(asm, "x0")?;
        }
        FileReadByte => {
            emit_pop(asm, "x0")?;
            writeln!(asm, "\tbl\t{}", target.symbol("prism_fd_read_byte"))?;
            emit_push(asm, "x0")?;
        }
        FileFlush => {
            // Raw fds are unbuffered; flushing always succeeds.
            emit_pop(asm, "x0")?;
            writeln!(asm, "\tmov\tx0, #0")?;
            emit_push(asm, "x0")?;
        }
        FileClose => {
            emit_pop(asm, "x0")?;
            let label = next_label(asm);
            writeln!(asm, "\ttbnz\tx0, #63, {}_skip", label)?;
            writeln!(asm, "\tbl\t{}", target.symbol("close"))?;
            writeln!(asm, "{}_skip:", label)?;
            writeln!(asm, "\tmov\tx0, #0")?;
            emit_push(asm, "x0")?;
        }

        PrintF32 | PrintF64 => {
            return Err(NativeError::Unsupported(format!(
                "native backend does not support opcode: {:?}",
                op
            )));
        }
    }
    Ok(())
}

fn open_flags(op: IrOpcode, target: Target) -> u64 {
    // O_WRONLY | O_CREAT | (O_TRUNC or O_APPEND); flag values differ per
    // platform.
    match (op, target) {
        (IrOpcode::FileOpenRead, _) => 0,
        (IrOpcode::FileOpenWrite, Target::Aarch64Darwin) => 0x601,
        (IrOpcode::FileOpenWrite, Target::Aarch64Linux) => 0o1101,
        (IrOpcode::FileOpenAppend, Target::Aarch64Darwin) => 0x209,
        (IrOpcode::FileOpenAppend, Target::Aarch64Linux) => 0o2101,
        _ => 0,
    }
}

// ---- emission primitives ------------------------------------------------

fn emit_push(asm: &mut String, reg: &str) -> Result<(), NativeError> {
    writeln!(asm, "\tstr\t{}, [x19], #8", reg)?;
    Ok(())
}

fn emit_pop(asm: &mut String, reg: &str) -> Result<(), NativeError> {
    writeln!(asm, "\tldr\t{}, [x19, #-8]!", reg)?;
    Ok(())
}

/// movz/movk sequence for an arbitrary 64-bit immediate.
fn emit_load_imm(asm: &mut String, reg: &str, value: u64) -> Result<(), NativeError> {
    writeln!(asm, "\tmovz\t{}, #{}", reg, value & 0xffff)?;
    for shift in [16u32, 32, 48] {
        let chunk = (value >> shift) & 0xffff;
        if chunk != 0 {
            writeln!(asm, "\tmovk\t{}, #{}, lsl #{}", reg, chunk, shift)?;
        }
    }
    Ok(())
}

fn emit_binary_w(asm: &mut String, mnemonic: &str) -> Result<(), NativeError> {
    emit_pop(asm, "x1")?;
    emit_pop(asm, "x0")?;
    writeln!(asm, "\t{}\tw0, w0, w1", mnemonic)?;
    writeln!(asm, "\tsxtw\tx0, w0")?;
    emit_push(asm, "x0")
}

fn emit_binary_x(asm: &mut String, mnemonic: &str) -> Result<(), NativeError> {
    emit_pop(asm, "x1")?;
    emit_pop(asm, "x0")?;
    writeln!(asm, "\t{}\tx0, x0, x1", mnemonic)?;
    emit_push(asm, "x0")
}

fn emit_binary_f32(asm: &mut String, mnemonic: &str) -> Result<(), NativeError> {
    emit_pop(asm, "x1")?;
    emit_pop(asm, "x0")?;
    writeln!(asm, "\tfmov\ts0, w0")?;
    writeln!(asm, "\tfmov\ts1, w1")?;
    writeln!(asm, "\t{}\ts0, s0, s1", mnemonic)?;
    writeln!(asm, "\tfmov\tw0, s0")?;
    writeln!(asm, "\tmov\tw0, w0")?;
    emit_push(asm, "x0")
}

fn emit_binary_f64(asm: &mut String, mnemonic: &str) -> Result<(), NativeError> {
    emit_pop(asm, "x1")?;
    emit_pop(asm, "x0")?;
    writeln!(asm, "\tfmov\td0, x0")?;
    writeln!(asm, "\tfmov\td1, x1")?;
    writeln!(asm, "\t{}\td0, d0, d1", mnemonic)?;
    writeln!(asm, "\tfmov\tx0, d0")?;
    emit_push(asm, "x0")
}

fn emit_compare_w(asm: &mut String, condition: &str) -> Result<(), NativeError> {
    emit_pop(asm, "x1")?;
    emit_pop(asm, "x0")?;
    writeln!(asm, "\tcmp\tw0, w1")?;
    writeln!(asm, "\tcset\tx0, {}", condition)?;
    emit_push(asm, "x0")
}

fn emit_compare_x(asm: &mut String, condition: &str) -> Result<(), NativeError> {
    emit_pop(asm, "x1")?;
    emit_pop(asm, "x0")?;
    writeln!(asm, "\tcmp\tx0, x1")?;
    writeln!(asm, "\tcset\tx0, {}", condition)?;
    emit_push(asm, "x0")
}

fn emit_compare_f32(asm: &mut String, condition: &str) -> Result<(), NativeError> {
    emit_pop(asm, "x1")?;
    emit_pop(asm, "x0")?;
    writeln!(asm, "\tfmov\ts0, w0")?;
    writeln!(asm, "\tfmov\ts1, w1")?;
    writeln!(asm, "\tfcmp\ts0, s1")?;
    writeln!(asm, "\tcset\tx0, {}", condition)?;
    emit_push(asm, "x0")
}

fn emit_compare_f64(asm: &mut String, condition: &str) -> Result<(), NativeError> {
    emit_pop(asm, "x1")?;
    emit_pop(asm, "x0")?;
    writeln!(asm, "\tfmov\td0, x0")?;
    writeln!(asm, "\tfmov\td1, x1")?;
    writeln!(asm, "\tfcmp\td0, d1")?;
    writeln!(asm, "\tcset\tx0, {}", condition)?;
    emit_push(asm, "x0")
}

fn emit_local_address(asm: &mut String, slot: u64, reg: &str) -> Result<(), NativeError> {
    let offset = slot * 16;
    if offset <= 4095 {
        writeln!(asm, "\tadd\t{}, x20, #{}", reg, offset)?;
    } else {
        emit_load_imm(asm, reg, offset)?;
        writeln!(asm, "\tadd\t{}, x20, {}", reg, reg)?;
    }
    Ok(())
}

fn emit_fd(asm: &mut String, flags: u64) -> Result<(), NativeError> {
    let fd = if flags & PRINT_FLAG_STDERR != 0 { 2 } else { 1 };
    writeln!(asm, "\tmov\tx0, #{}", fd)?;
    Ok(())
}

fn emit_optional_newline(asm: &mut String, flags: u64, target: Target) -> Result<(), NativeError> {
    if flags & PRINT_FLAG_NEWLINE == 0 {
        return Ok(());
    }
    emit_fd(asm, flags)?;
    emit_label_address(asm, "prism_newline", "x1", target)?;
    writeln!(asm, "\tmov\tx2, #1")?;
    writeln!(asm, "\tbl\t{}", target.symbol("write"))?;
    Ok(())
}

fn emit_print_int(
    asm: &mut String,
    imm: u64,
    unsigned: bool,
    target: Target,
) -> Result<(), NativeError> {
    let flags = decode_print_flags(imm);
    let fd = if flags & PRINT_FLAG_STDERR != 0 { 2 } else { 1 };
    writeln!(asm, "\tmov\tx1, #{}", fd)?;
    let helper = if unsigned {
        "prism_print_uint"
    } else {
        "prism_print_int"
    };
    writeln!(asm, "\tbl\t{}", target.symbol(helper))?;
    emit_optional_newline(asm, flags, target)?;
    Ok(())
}

fn emit_string_address(
    asm: &mut String,
    index: usize,
    reg: &str,
    target: Target,
) -> Result<(), NativeError> {
    emit_label_address(asm, &format!("prism_str{}", index), reg, target)
}

fn emit_label_address(
    asm: &mut String,
    label: &str,
    reg: &str,
    target: Target,
) -> Result<(), NativeError> {
    match target {
        Target::Aarch64Darwin => {
            writeln!(asm, "\tadrp\t{}, _{}@PAGE", reg, label)?;
            writeln!(asm, "\tadd\t{}, {}, _{}@PAGEOFF", reg, reg, label)?;
        }
        Target::Aarch64Linux => {
            writeln!(asm, "\tadrp\t{}, {}", reg, label)?;
            writeln!(asm, "\tadd\t{}, {}, :lo12:{}", reg, reg, label)?;
        }
    }
    Ok(())
}

fn emit_load_global_address(
    asm: &mut String,
    label: &str,
    reg: &str,
    target: Target,
) -> Result<(), NativeError> {
    emit_label_address(asm, label, reg, target)
}

/// Fresh local label for multi-branch expansions.
fn next_label(asm: &str) -> String {
    format!("Lx{}", asm.len())
}

/// Shared helper routines: decimal conversion, argv printing, fd writes.
/// Emitted once per module, in assembly, so the executable has no
/// runtime library dependency beyond libc.
fn emit_runtime_helpers(asm: &mut String, target: Target) -> Result<(), NativeError> {
    let s = |name: &str| target.symbol(name);

    // prism_print_int(x0=value, x1=fd): signed decimal.
    writeln!(asm, "{}:", s("prism_print_int"))?;
    writeln!(asm, "\tstp\tx29, x30, [sp, #-16]!")?;
    writeln!(asm, "\tmov\tx9, x1")?;
    writeln!(asm, "\tmov\tx10, #0")?;
    writeln!(asm, "\ttbz\tx0, #63, 1f")?;
    writeln!(asm, "\tneg\tx0, x0")?;
    writeln!(asm, "\tmov\tx10, #1")?;
    writeln!(asm, "1:")?;
    writeln!(asm, "\tbl\t{}", s("prism_format_uint"))?;
    writeln!(asm, "\tcbz\tx10, 2f")?;
    // Prepend the minus sign.
    writeln!(asm, "\tsub\tx0, x0, #1")?;
    writeln!(asm, "\tmov\tw2, #45")?;
    writeln!(asm, "\tstrb\tw2, [x0]")?;
    writeln!(asm, "\tadd\tx1, x1, #1")?;
    writeln!(asm, "2:")?;
    writeln!(asm, "\tmov\tx2, x1")?;
    writeln!(asm, "\tmov\tx1, x0")?;
    writeln!(asm, "\tmov\tx0, x9")?;
    writeln!(asm, "\tbl\t{}", s("write"))?;
    writeln!(asm, "\tldp\tx29, x30, [sp], #16")?;
    writeln!(asm, "\tret")?;

    // prism_print_uint(x0=value, x1=fd): unsigned decimal.
    writeln!(asm, "{}:", s("prism_print_uint"))?;
    writeln!(asm, "\tstp\tx29, x30, [sp, #-16]!")?;
    writeln!(asm, "\tmov\tx9, x1")?;
    writeln!(asm, "\tbl\t{}", s("prism_format_uint"))?;
    writeln!(asm, "\tmov\tx2, x1")?;
    writeln!(asm, "\tmov\tx1, x0")?;
    writeln!(asm, "\tmov\tx0, x9")?;
    writeln!(asm, "\tbl\t{}", s("write"))?;
    writeln!(asm, "\tldp\tx29, x30, [sp], #16")?;
    writeln!(asm, "\tret")?;

    // prism_format_uint(x0=value) -> x0=start, x1=length. Converts into
    // the tail of prism_numbuf, leaving room for a sign byte.
    writeln!(asm, "{}:", s("prism_format_uint"))?;
    emit_label_address(asm, "prism_numbuf", "x3", target)?;
    writeln!(asm, "\tadd\tx3, x3, #31")?;
    writeln!(asm, "\tmov\tx1, #0")?;
    writeln!(asm, "\tmov\tx4, #10")?;
    writeln!(asm, "1:")?;
    writeln!(asm, "\tudiv\tx5, x0, x4")?;
    writeln!(asm, "\tmsub\tx6, x5, x4, x0")?;
    writeln!(asm, "\tadd\tx6, x6, #48")?;
    writeln!(asm, "\tstrb\tw6, [x3]")?;
    writeln!(asm, "\tsub\tx3, x3, #1")?;
    writeln!(asm, "\tadd\tx1, x1, #1")?;
    writeln!(asm, "\tmov\tx0, x5")?;
    writeln!(asm, "\tcbnz\tx0, 1b")?;
    writeln!(asm, "\tadd\tx0, x3, #1")?;
    writeln!(asm, "\tret")?;

    // prism_fd_write(x0=fd, x1=buf, x2=len) -> 0 on success else 1.
    writeln!(asm, "{}:", s("prism_fd_write"))?;
    writeln!(asm, "\tstp\tx29, x30, [sp, #-16]!")?;
    writeln!(asm, "\tbl\t{}", s("write"))?;
    writeln!(asm, "\tcmp\tx0, #0")?;
    writeln!(asm, "\tcset\tx0, lt")?;
    writeln!(asm, "\tldp\tx29, x30, [sp], #16")?;
    writeln!(asm, "\tret")?;

    // prism_fd_write_byte(x0=fd, x1=byte) -> error code.
    writeln!(asm, "{}:", s("prism_fd_write_byte"))?;
    writeln!(asm, "\tstp\tx29, x30, [sp, #-16]!")?;
    emit_label_address(asm, "prism_numbuf", "x2", target)?;
    writeln!(asm, "\tstrb\tw1, [x2]")?;
    writeln!(asm, "\tmov\tx1, x2")?;
    writeln!(asm, "\tmov\tx2, #1")?;
    writeln!(asm, "\tbl\t{}", s("write"))?;
    writeln!(asm, "\tcmp\tx0, #0")?;
    writeln!(asm, "\tcset\tx0, lt")?;
    writeln!(asm, "\tldp\tx29, x30, [sp], #16")?;
    writeln!(asm, "\tret")?;

    // prism_fd_write_int / prism_fd_write_uint (x0=fd, x1=value).
    writeln!(asm, "{}:", s("prism_fd_write_int"))?;
    writeln!(asm, "\tstp\tx29, x30, [sp, #-16]!")?;
    writeln!(asm, "\tmov\tx9, x0")?;
    writeln!(asm, "\tmov\tx0, x1")?;
    writeln!(asm, "\tmov\tx1, x9")?;
    writeln!(asm, "\tbl\t{}", s("prism_print_int"))?;
    writeln!(asm, "\tmov\tx0, #0")?;
    writeln!(asm, "\tldp\tx29, x30, [sp], #16")?;
    writeln!(asm, "\tret")?;
    writeln!(asm, "{}:", s("prism_fd_write_uint"))?;
    writeln!(asm, "\tstp\tx29, x30, [sp, #-16]!")?;
    writeln!(asm, "\tmov\tx9, x0")?;
    writeln!(asm, "\tmov\tx0, x1")?;
    writeln!(asm, "\tmov\tx1, x9")?;
    writeln!(asm, "\tbl\t{}", s("prism_print_uint"))?;
    writeln!(asm, "\tmov\tx0, #0")?;
    writeln!(asm, "\tldp\tx29, x30, [sp], #16")?;
    writeln!(asm, "\tret")?;

    // prism_fd_read_byte(x0=fd) -> byte or -1.
    writeln!(asm, "{}:", s("prism_fd_read_byte"))?;
    writeln!(asm, "\tstp\tx29, x30, [sp, #-16]!")?;
    emit_label_address(asm, "prism_numbuf", "x1", target)?;
    writeln!(asm, "\tmov\tx2, #1")?;
    writeln!(asm, "\tbl\t{}", s("read"))?;
    writeln!(asm, "\tcmp\tx0, #1")?;
    writeln!(asm, "\tb.eq\t1f")?;
    writeln!(asm, "\tmov\tx0, #-1")?;
    writeln!(asm, "\tldp\tx29, x30, [sp], #16")?;
    writeln!(asm, "\tret")?;
    writeln!(asm, "1:")?;
    emit_label_address(asm, "prism_numbuf", "x1", target)?;
    writeln!(asm, "\tldrb\tw0, [x1]")?;
    writeln!(asm, "\tldp\tx29, x30, [sp], #16")?;
    writeln!(asm, "\tret")?;

    // prism_print_argv(x0=index, x1=flags): write argv[index] with the
    // print flags.
    writeln!(asm, "{}:", s("prism_print_argv"))?;
    writeln!(asm, "\tstp\tx29, x30, [sp, #-16]!")?;
    writeln!(asm, "\tstp\tx19, x20, [sp, #-16]!")?;
    writeln!(asm, "\tmov\tx19, x1")?;
    emit_label_address(asm, "prism_argv", "x2", target)?;
    writeln!(asm, "\tldr\tx2, [x2]")?;
    writeln!(asm, "\tldr\tx20, [x2, x0, lsl #3]")?;
    // strlen
    writeln!(asm, "\tmov\tx3, #0")?;
    writeln!(asm, "1:")?;
    writeln!(asm, "\tldrb\tw4, [x20, x3]")?;
    writeln!(asm, "\tcbz\tw4, 2f")?;
    writeln!(asm, "\tadd\tx3, x3, #1")?;
    writeln!(asm, "\tb\t1b")?;
    writeln!(asm, "2:")?;
    writeln!(asm, "\ttst\tx19, #{}", PRINT_FLAG_STDERR)?;
    writeln!(asm, "\tmov\tx0, #1")?;
    writeln!(asm, "\tmov\tx5, #2")?;
    writeln!(asm, "\tcsel\tx0, x5, x0, ne")?;
    writeln!(asm, "\tmov\tx1, x20")?;
    writeln!(asm, "\tmov\tx2, x3")?;
    writeln!(asm, "\tmov\tx20, x0")?;
    writeln!(asm, "\tbl\t{}", s("write"))?;
    writeln!(asm, "\ttst\tx19, #{}", PRINT_FLAG_NEWLINE)?;
    writeln!(asm, "\tb.eq\t3f")?;
    writeln!(asm, "\tmov\tx0, x20")?;
    emit_label_address(asm, "prism_newline", "x1", target)?;
    writeln!(asm, "\tmov\tx2, #1")?;
    writeln!(asm, "\tbl\t{}", s("write"))?;
    writeln!(asm, "3:")?;
    writeln!(asm, "\tldp\tx19, x20, [sp], #16")?;
    writeln!(asm, "\tldp\tx29, x30, [sp], #16")?;
    writeln!(asm, "\tret")?;

    // prism_argv_oob: report and exit 3, sharing the array wording.
    writeln!(asm, "{}:", s("prism_argv_oob"))?;
    writeln!(asm, "\tmov\tx0, #2")?;
    emit_label_address(asm, "prism_oob", "x1", target)?;
    writeln!(asm, "\tmov\tx2, #26")?;
    writeln!(asm, "\tbl\t{}", s("write"))?;
    writeln!(asm, "\tmov\tx0, #3")?;
    writeln!(asm, "\tbl\t{}", s("exit"))?;
    Ok(())
}

fn emit_data(
    asm: &mut String,
    module: &IrModule,
    local_count: u32,
    target: Target,
) -> Result<(), NativeError> {
    match target {
        Target::Aarch64Darwin => writeln!(asm, "\t.section\t__TEXT,__const")?,
        Target::Aarch64Linux => writeln!(asm, "\t.section\t.rodata")?,
    }
    for (index, bytes) in module.string_table.iter().enumerate() {
        writeln!(asm, "_prism_str{}:", index)?;
        if target == Target::Aarch64Linux {
            writeln!(asm, "prism_str{}:", index)?;
        }
        // NUL-terminated so paths can go straight to open(2); the length
        // used for writes excludes the terminator.
        write!(asm, "\t.byte\t")?;
        for (position, byte) in bytes.iter().chain(std::iter::once(&0u8)).enumerate() {
            if position > 0 {
                write!(asm, ", ")?;
            }
            write!(asm, "{}", byte)?;
        }
        writeln!(asm)?;
    }
    emit_const_bytes(asm, "prism_true", b"true", target)?;
    emit_const_bytes(asm, "prism_false", b"false", target)?;
    emit_const_bytes(asm, "prism_newline", b"\n", target)?;
    emit_const_bytes(asm, "prism_oob", b"array index out of bounds\n", target)?;

    match target {
        Target::Aarch64Darwin => writeln!(asm, "\t.section\t__DATA,__bss")?,
        Target::Aarch64Linux => writeln!(asm, "\t.bss")?,
    }
    writeln!(asm, "\t.align\t4")?;
    emit_bss(asm, "prism_stack", STACK_CELLS * 8, target)?;
    emit_bss(asm, "prism_locals", (local_count as usize).max(1) * 16, target)?;
    emit_bss(asm, "prism_heap", HEAP_SLOTS * 16, target)?;
    emit_bss(asm, "prism_numbuf", 32, target)?;
    emit_bss(asm, "prism_argc", 8, target)?;
    emit_bss(asm, "prism_argv", 8, target)?;
    Ok(())
}

fn emit_const_bytes(
    asm: &mut String,
    label: &str,
    bytes: &[u8],
    target: Target,
) -> Result<(), NativeError> {
    writeln!(asm, "_{}:", label)?;
    if target == Target::Aarch64Linux {
        writeln!(asm, "{}:", label)?;
    }
    write!(asm, "\t.byte\t")?;
    for (position, byte) in bytes.iter().enumerate() {
        if position > 0 {
            write!(asm, ", ")?;
        }
        write!(asm, "{}", byte)?;
    }
    writeln!(asm)?;
    Ok(())
}

fn emit_bss(
    asm: &mut String,
    label: &str,
    size: usize,
    target: Target,
) -> Result<(), NativeError> {
    writeln!(asm, "_{}:", label)?;
    if target == Target::Aarch64Linux {
        writeln!(asm, "{}:", label)?;
    }
    writeln!(asm, "\t.zero\t{}", size)?;
    Ok(())
}
