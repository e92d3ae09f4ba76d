//! The IR interpreter.
//!
//! A single-threaded stack machine over one activation: the lowerer
//! inlines every user call, so execution is one frame running from the
//! module's entry to a return (or an explicit `Exit`). Locals live in a
//! 16-byte-stride buffer whose addresses stay stable for the whole run,
//! which is what makes `AddressOfLocal` + `LoadIndirect` collection
//! addressing work unchanged from the native backend.
//!
//! The lowerer guarantees well-formed IR; the checks here (stack
//! underflow, slot bounds, division by zero) exist to decode foreign
//! `.psir` input, not to back the language semantics.

use crate::io::{write_bytes, write_newline};
use prism_core::{decode_print_flags, decode_print_payload, IrModule, IrOpcode, PRINT_FLAG_NEWLINE, PRINT_FLAG_STDERR};
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Write};

/// Two u64 cells per local slot: 16-byte stride.
const CELLS_PER_SLOT: usize = 2;

pub struct Vm {
    argv: Vec<Vec<u8>>,
}

impl Default for Vm {
    fn default() -> Self {
        Vm::new()
    }
}

impl Vm {
    pub fn new() -> Self {
        Vm { argv: Vec::new() }
    }

    /// Provide the argv view the program sees; index 0 is conventionally
    /// the program name.
    pub fn with_argv(argv: Vec<Vec<u8>>) -> Self {
        Vm { argv }
    }

    /// Run the module's entry function to completion. The returned value
    /// is the process exit value (a `Return*` result or an `Exit` code).
    pub fn execute(&mut self, module: &IrModule) -> Result<u64, String> {
        let entry = module
            .entry()
            .ok_or_else(|| "module has no entry function".to_string())?;

        let mut frame = Frame::new(entry.local_count as usize);
        let mut stack: Vec<u64> = Vec::with_capacity(64);
        let mut files = FileTable::new();
        let mut pc = 0usize;

        macro_rules! pop {
            () => {
                stack.pop().ok_or_else(|| "stack underflow".to_string())?
            };
        }

        while pc < entry.instructions.len() {
            let inst = entry.instructions[pc];
            pc += 1;
            match inst.op {
                IrOpcode::PushI32 => stack.push(inst.imm as u32 as i32 as i64 as u64),
                IrOpcode::PushI64 | IrOpcode::PushF64 => stack.push(inst.imm),
                IrOpcode::PushF32 => stack.push(inst.imm & 0xffff_ffff),

                IrOpcode::AddI32 => binary_i32(&mut stack, |a, b| Ok(a.wrapping_add(b)))?,
                IrOpcode::SubI32 => binary_i32(&mut stack, |a, b| Ok(a.wrapping_sub(b)))?,
                IrOpcode::MulI32 => binary_i32(&mut stack, |a, b| Ok(a.wrapping_mul(b)))?,
                IrOpcode::DivI32 => binary_i32(&mut stack, |a, b| {
                    if b == 0 {
                        Err("division by zero".to_string())
                    } else {
                        Ok(a.wrapping_div(b))
                    }
                })?,
                IrOpcode::RemI32 => binary_i32(&mut stack, |a, b| {
                    if b == 0 {
                        Err("division by zero".to_string())
                    } else {
                        Ok(a.wrapping_rem(b))
                    }
                })?,
                IrOpcode::NegI32 => {
                    let value = pop!() as i32;
                    stack.push(value.wrapping_neg() as i64 as u64);
                }

                IrOpcode::AddI64 => binary_i64(&mut stack, |a, b| Ok(a.wrapping_add(b)))?,
                IrOpcode::SubI64 => binary_i64(&mut stack, |a, b| Ok(a.wrapping_sub(b)))?,
                IrOpcode::MulI64 => binary_i64(&mut stack, |a, b| Ok(a.wrapping_mul(b)))?,
                IrOpcode::DivI64 => binary_i64(&mut stack, |a, b| {
                    if b == 0 {
                        Err("division by zero".to_string())
                    } else {
                        Ok(a.wrapping_div(b))
                    }
                })?,
                IrOpcode::RemI64 => binary_i64(&mut stack, |a, b| {
                    if b == 0 {
                        Err("division by zero".to_string())
                    } else {
                        Ok(a.wrapping_rem(b))
                    }
                })?,
                IrOpcode::NegI64 => {
                    let value = pop!() as i64;
                    stack.push(value.wrapping_neg() as u64);
                }
                IrOpcode::DivU64 => {
                    let rhs = pop!();
                    let lhs = pop!();
                    if rhs == 0 {
                        return Err("division by zero".to_string());
                    }
                    stack.push(lhs / rhs);
                }
                IrOpcode::RemU64 => {
                    let rhs = pop!();
                    let lhs = pop!();
                    if rhs == 0 {
                        return Err("division by zero".to_string());
                    }
                    stack.push(lhs % rhs);
                }

                IrOpcode::AddF32 => binary_f32(&mut stack, |a, b| a + b)?,
                IrOpcode::SubF32 => binary_f32(&mut stack, |a, b| a - b)?,
                IrOpcode::MulF32 => binary_f32(&mut stack, |a, b| a * b)?,
                IrOpcode::DivF32 => binary_f32(&mut stack, |a, b| a / b)?,
                IrOpcode::NegF32 => {
                    let value = f32::from_bits(pop!() as u32);
                    stack.push(u64::from((-value).to_bits()));
                }
                IrOpcode::AddF64 => binary_f64(&mut stack, |a, b| a + b)?,
                IrOpcode::SubF64 => binary_f64(&mut stack, |a, b| a - b)?,
                IrOpcode::MulF64 => binary_f64(&mut stack, |a, b| a * b)?,
                IrOpcode::DivF64 => binary_f64(&mut stack, |a, b| a / b)?,
                IrOpcode::NegF64 => {
                    let value = f64::from_bits(pop!());
                    stack.push((-value).to_bits());
                }

                IrOpcode::CmpEqI32 => compare_i32(&mut stack, |a, b| a == b)?,
                IrOpcode::CmpNeI32 => compare_i32(&mut stack, |a, b| a != b)?,
                IrOpcode::CmpLtI32 => compare_i32(&mut stack, |a, b| a < b)?,
                IrOpcode::CmpLeI32 => compare_i32(&mut stack, |a, b| a <= b)?,
                IrOpcode::CmpGtI32 => compare_i32(&mut stack, |a, b| a > b)?,
                IrOpcode::CmpGeI32 => compare_i32(&mut stack, |a, b| a >= b)?,
                IrOpcode::CmpEqI64 => compare_i64(&mut stack, |a, b| a == b)?,
                IrOpcode::CmpNeI64 => compare_i64(&mut stack, |a, b| a != b)?,
                IrOpcode::CmpLtI64 => compare_i64(&mut stack, |a, b| a < b)?,
                IrOpcode::CmpLeI64 => compare_i64(&mut stack, |a, b| a <= b)?,
                IrOpcode::CmpGtI64 => compare_i64(&mut stack, |a, b| a > b)?,
                IrOpcode::CmpGeI64 => compare_i64(&mut stack, |a, b| a >= b)?,
                IrOpcode::CmpLtU64 => compare_u64(&mut stack, |a, b| a < b)?,
                IrOpcode::CmpLeU64 => compare_u64(&mut stack, |a, b| a <= b)?,
                IrOpcode::CmpGtU64 => compare_u64(&mut stack, |a, b| a > b)?,
                IrOpcode::CmpGeU64 => compare_u64(&mut stack, |a, b| a >= b)?,
                IrOpcode::CmpEqF32 => compare_f32(&mut stack, |a, b| a == b)?,
                IrOpcode::CmpNeF32 => compare_f32(&mut stack, |a, b| a != b)?,
                IrOpcode::CmpLtF32 => compare_f32(&mut stack, |a, b| a < b)?,
                IrOpcode::CmpLeF32 => compare_f32(&mut stack, |a, b| a <= b)?,
                IrOpcode::CmpGtF32 => compare_f32(&mut stack, |a, b| a > b)?,
                IrOpcode::CmpGeF32 => compare_f32(&mut stack, |a, b| a >= b)?,
                IrOpcode::CmpEqF64 => compare_f64(&mut stack, |a, b| a == b)?,
                IrOpcode::CmpNeF64 => compare_f64(&mut stack, |a, b| a != b)?,
                IrOpcode::CmpLtF64 => compare_f64(&mut stack, |a, b| a < b)?,
                IrOpcode::CmpLeF64 => compare_f64(&mut stack, |a, b| a <= b)?,
                IrOpcode::CmpGtF64 => compare_f64(&mut stack, |a, b| a > b)?,
                IrOpcode::CmpGeF64 => compare_f64(&mut stack, |a, b| a >= b)?,

                IrOpcode::ConvertI32ToI64 => {
                    let value = pop!() as i32;
                    stack.push(value as i64 as u64);
                }
                IrOpcode::ConvertI64ToI32 => {
                    let value = pop!() as i64;
                    stack.push(value as i32 as i64 as u64);
                }
                IrOpcode::ConvertI32ToF32 => {
                    let value = pop!() as i32;
                    stack.push(u64::from((value as f32).to_bits()));
                }
                IrOpcode::ConvertI32ToF64 => {
                    let value = pop!() as i32;
                    stack.push((f64::from(value)).to_bits());
                }
                IrOpcode::ConvertI64ToF64 => {
                    let value = pop!() as i64;
                    stack.push((value as f64).to_bits());
                }
                IrOpcode::ConvertU64ToF64 => {
                    let value = pop!();
                    stack.push((value as f64).to_bits());
                }
                IrOpcode::ConvertF32ToI32 => {
                    let value = f32::from_bits(pop!() as u32);
                    stack.push(value as i32 as i64 as u64);
                }
                IrOpcode::ConvertF64ToI64 => {
                    let value = f64::from_bits(pop!());
                    stack.push((value as i64) as u64);
                }
                IrOpcode::ConvertF64ToU64 => {
                    let value = f64::from_bits(pop!());
                    stack.push(value as u64);
                }
                IrOpcode::ConvertF32ToF64 => {
                    let value = f32::from_bits(pop!() as u32);
                    stack.push(f64::from(value).to_bits());
                }
                IrOpcode::ConvertF64ToF32 => {
                    let value = f64::from_bits(pop!());
                    stack.push(u64::from((value as f32).to_bits()));
                }

                IrOpcode::LoadLocal => {
                    stack.push(frame.load(inst.imm as usize)?);
                }
                IrOpcode::StoreLocal => {
                    let value = pop!();
                    frame.store(inst.imm as usize, value)?;
                }
                IrOpcode::AddressOfLocal => {
                    stack.push(frame.address_of(inst.imm as usize)?);
                }
                IrOpcode::LoadIndirect => {
                    let address = pop!();
                    if address == 0 || address % 8 != 0 {
                        return Err("invalid indirect load address".to_string());
                    }
                    // SAFETY: addresses on the stack originate from
                    // AddressOfLocal/HeapAlloc over buffers that live for
                    // the whole activation.
                    let value = unsafe { *(address as *const u64) };
                    stack.push(value);
                }
                IrOpcode::StoreIndirect => {
                    let value = pop!();
                    let address = pop!();
                    if address == 0 || address % 8 != 0 {
                        return Err("invalid indirect store address".to_string());
                    }
                    // SAFETY: as for LoadIndirect; the lowerer only forms
                    // addresses into live frame or heap blocks.
                    unsafe { *(address as *mut u64) = value };
                }

                IrOpcode::Pop => {
                    pop!();
                }
                IrOpcode::Dup => {
                    let value = pop!();
                    stack.push(value);
                    stack.push(value);
                }

                IrOpcode::Jump => {
                    pc = check_target(inst.imm, entry.instructions.len())?;
                }
                IrOpcode::JumpIfZero => {
                    let value = pop!();
                    if value == 0 {
                        pc = check_target(inst.imm, entry.instructions.len())?;
                    }
                }
                IrOpcode::ReturnI32 => {
                    let value = pop!() as u32 as u64;
                    return Ok(value);
                }
                IrOpcode::ReturnI64 => {
                    return Ok(pop!());
                }
                IrOpcode::ReturnVoid => {
                    return Ok(0);
                }
                IrOpcode::Exit => {
                    return Ok(inst.imm);
                }

                IrOpcode::HeapAlloc => {
                    stack.push(frame.heap_alloc(inst.imm as usize));
                }

                IrOpcode::PrintString => {
                    let index = decode_print_payload(inst.imm) as usize;
                    let bytes = module
                        .string_table
                        .get(index)
                        .ok_or_else(|| format!("string index out of range: {}", index))?;
                    print_payload(bytes, decode_print_flags(inst.imm));
                }
                IrOpcode::PrintI32 => {
                    let value = pop!() as i32;
                    print_payload(value.to_string().as_bytes(), decode_print_flags(inst.imm));
                }
                IrOpcode::PrintI64 => {
                    let value = pop!() as i64;
                    print_payload(value.to_string().as_bytes(), decode_print_flags(inst.imm));
                }
                IrOpcode::PrintU64 => {
                    let value = pop!();
                    print_payload(value.to_string().as_bytes(), decode_print_flags(inst.imm));
                }
                IrOpcode::PrintF32 => {
                    let value = f32::from_bits(pop!() as u32);
                    print_payload(format_float(f64::from(value)).as_bytes(), decode_print_flags(inst.imm));
                }
                IrOpcode::PrintF64 => {
                    let value = f64::from_bits(pop!());
                    print_payload(format_float(value).as_bytes(), decode_print_flags(inst.imm));
                }
                IrOpcode::PrintBool => {
                    let value = pop!();
                    let text: &[u8] = if value != 0 { b"true" } else { b"false" };
                    print_payload(text, decode_print_flags(inst.imm));
                }
                IrOpcode::PrintNewline => {
                    let stderr = decode_print_flags(inst.imm) & PRINT_FLAG_STDERR != 0;
                    write_newline(stderr);
                }

                IrOpcode::PushArgc => {
                    stack.push(self.argv.len() as u64);
                }
                IrOpcode::PrintArgv => {
                    let index = pop!() as i64;
                    if index < 0 || index as usize >= self.argv.len() {
                        print_payload(
                            b"array index out of bounds",
                            PRINT_FLAG_NEWLINE | PRINT_FLAG_STDERR,
                        );
                        return Ok(3);
                    }
                    let bytes = self.argv[index as usize].clone();
                    print_payload(&bytes, decode_print_flags(inst.imm));
                }
                IrOpcode::PrintArgvUnsafe => {
                    let index = pop!() as usize;
                    let bytes = self
                        .argv
                        .get(index)
                        .cloned()
                        .ok_or_else(|| format!("argv index out of range: {}", index))?;
                    print_payload(&bytes, decode_print_flags(inst.imm));
                }

                IrOpcode::LoadStringByte => {
                    let offset = pop!() as usize;
                    let bytes = module
                        .string_table
                        .get(inst.imm as usize)
                        .ok_or_else(|| format!("string index out of range: {}", inst.imm))?;
                    let byte = bytes
                        .get(offset)
                        .copied()
                        .ok_or_else(|| "string offset out of range".to_string())?;
                    stack.push(u64::from(byte));
                }

                IrOpcode::FileOpenRead | IrOpcode::FileOpenWrite | IrOpcode::FileOpenAppend => {
                    let path = module
                        .string_table
                        .get(inst.imm as usize)
                        .ok_or_else(|| format!("string index out of range: {}", inst.imm))?;
                    stack.push(files.open(path, inst.op) as u64);
                }
                IrOpcode::FileWriteString => {
                    let handle = pop!() as i64;
                    let bytes = module
                        .string_table
                        .get(inst.imm as usize)
                        .cloned()
                        .ok_or_else(|| format!("string index out of range: {}", inst.imm))?;
                    stack.push(files.write(handle, &bytes) as u64);
                }
                IrOpcode::FileWriteI32 => {
                    let value = pop!() as i32;
                    let handle = pop!() as i64;
                    stack.push(files.write(handle, value.to_string().as_bytes()) as u64);
                }
                IrOpcode::FileWriteI64 => {
                    let value = pop!() as i64;
                    let handle = pop!() as i64;
                    stack.push(files.write(handle, value.to_string().as_bytes()) as u64);
                }
                IrOpcode::FileWriteU64 => {
                    let value = pop!();
                    let handle = pop!() as i64;
                    stack.push(files.write(handle, value.to_string().as_bytes()) as u64);
                }
                IrOpcode::FileWriteByte => {
                    let value = pop!() as u8;
                    let handle = pop!() as i64;
                    stack.push(files.write(handle, &[value]) as u64);
                }
                IrOpcode::FileWriteNewline => {
                    let handle = pop!() as i64;
                    stack.push(files.write(handle, b"\n") as u64);
                }
                IrOpcode::FileReadByte => {
                    let handle = pop!() as i64;
                    stack.push(files.read_byte(handle) as u64);
                }
                IrOpcode::FileFlush => {
                    let handle = pop!() as i64;
                    stack.push(files.flush(handle) as u64);
                }
                IrOpcode::FileClose => {
                    let handle = pop!() as i64;
                    stack.push(files.close(handle) as u64);
                }
            }
        }
        // Falling off the end without a return behaves as a void return.
        Ok(0)
    }
}

/// One activation's locals plus its heap blocks. Addresses handed out by
/// `address_of`/`heap_alloc` stay valid until the frame drops.
struct Frame {
    locals: Box<[u64]>,
    heap: Vec<Box<[u64]>>,
}

impl Frame {
    fn new(local_count: usize) -> Frame {
        Frame {
            locals: vec![0u64; local_count.max(1) * CELLS_PER_SLOT].into_boxed_slice(),
            heap: Vec::new(),
        }
    }

    fn load(&self, slot: usize) -> Result<u64, String> {
        self.locals
            .get(slot * CELLS_PER_SLOT)
            .copied()
            .ok_or_else(|| format!("local slot out of range: {}", slot))
    }

    fn store(&mut self, slot: usize, value: u64) -> Result<(), String> {
        let cell = self
            .locals
            .get_mut(slot * CELLS_PER_SLOT)
            .ok_or_else(|| format!("local slot out of range: {}", slot))?;
        *cell = value;
        Ok(())
    }

    fn address_of(&self, slot: usize) -> Result<u64, String> {
        if slot * CELLS_PER_SLOT >= self.locals.len() {
            return Err(format!("local slot out of range: {}", slot));
        }
        Ok(self.locals.as_ptr() as u64 + (slot * CELLS_PER_SLOT * 8) as u64)
    }

    fn heap_alloc(&mut self, slots: usize) -> u64 {
        let block = vec![0u64; slots.max(1) * CELLS_PER_SLOT].into_boxed_slice();
        let address = block.as_ptr() as u64;
        self.heap.push(block);
        address
    }
}

/// Open-file registry. Handles are small positive integers; a negative
/// or stale handle makes every operation a no-op returning 0 so that
/// scope cleanup after a manual `.close()` stays silent.
struct FileTable {
    files: HashMap<i64, File>,
    next_handle: i64,
}

impl FileTable {
    fn new() -> FileTable {
        FileTable {
            files: HashMap::new(),
            next_handle: 1,
        }
    }

    fn open(&mut self, path_bytes: &[u8], op: IrOpcode) -> i64 {
        let path = String::from_utf8_lossy(path_bytes).into_owned();
        let opened = match op {
            IrOpcode::FileOpenRead => File::open(&path),
            IrOpcode::FileOpenAppend => {
                std::fs::OpenOptions::new().create(true).append(true).open(&path)
            }
            _ => File::create(&path),
        };
        match opened {
            Ok(file) => {
                let handle = self.next_handle;
                self.next_handle += 1;
                self.files.insert(handle, file);
                handle
            }
            Err(_) => -1,
        }
    }

    fn write(&mut self, handle: i64, bytes: &[u8]) -> i64 {
        match self.files.get_mut(&handle) {
            Some(file) => match file.write_all(bytes) {
                Ok(()) => 0,
                Err(error) => error.raw_os_error().map(i64::from).unwrap_or(1),
            },
            None if handle < 0 => 0,
            None => 1,
        }
    }

    fn read_byte(&mut self, handle: i64) -> i64 {
        match self.files.get_mut(&handle) {
            Some(file) => {
                let mut byte = [0u8; 1];
                match file.read(&mut byte) {
                    Ok(1) => i64::from(byte[0]),
                    _ => -1,
                }
            }
            None => -1,
        }
    }

    fn flush(&mut self, handle: i64) -> i64 {
        match self.files.get_mut(&handle) {
            Some(file) => match file.flush() {
                Ok(()) => 0,
                Err(error) => error.raw_os_error().map(i64::from).unwrap_or(1),
            },
            None if handle < 0 => 0,
            None => 1,
        }
    }

    fn close(&mut self, handle: i64) -> i64 {
        if handle < 0 {
            return 0;
        }
        match self.files.remove(&handle) {
            Some(file) => {
                drop(file);
                0
            }
            None => 0,
        }
    }
}

fn check_target(imm: u64, len: usize) -> Result<usize, String> {
    let target = imm as usize;
    if target > len {
        return Err(format!("jump target out of range: {}", target));
    }
    Ok(target)
}

fn print_payload(bytes: &[u8], flags: u64) {
    let stderr = flags & PRINT_FLAG_STDERR != 0;
    write_bytes(bytes, stderr);
    if flags & PRINT_FLAG_NEWLINE != 0 {
        write_newline(stderr);
    }
}

/// Float formatting shared with the native backend's expectations:
/// finite values print with a decimal point, specials by name.
fn format_float(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value < 0.0 { "-inf" } else { "inf" }.to_string();
    }
    if value == value.trunc() && value.abs() < 1e15 {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}

fn binary_i32(stack: &mut Vec<u64>, op: impl Fn(i32, i32) -> Result<i32, String>) -> Result<(), String> {
    let rhs = stack.pop().ok_or("stack underflow")? as i32;
    let lhs = stack.pop().ok_or("stack underflow")? as i32;
    stack.push(op(lhs, rhs)? as i64 as u64);
    Ok(())
}

fn binary_i64(stack: &mut Vec<u64>, op: impl Fn(i64, i64) -> Result<i64, String>) -> Result<(), String> {
    let rhs = stack.pop().ok_or("stack underflow")? as i64;
    let lhs = stack.pop().ok_or("stack underflow")? as i64;
    stack.push(op(lhs, rhs)? as u64);
    Ok(())
}

fn binary_f32(stack: &mut Vec<u64>, op: impl Fn(f32, f32) -> f32) -> Result<(), String> {
    let rhs = f32::from_bits(stack.pop().ok_or("stack underflow")? as u32);
    let lhs = f32::from_bits(stack.pop().ok_or("stack underflow")? as u32);
    stack.push(u64::from(op(lhs, rhs).to_bits()));
    Ok(())
}

fn binary_f64(stack: &mut Vec<u64>, op: impl Fn(f64, f64) -> f64) -> Result<(), String> {
    let rhs = f64::from_bits(stack.pop().ok_or("stack underflow")?);
    let lhs = f64::from_bits(stack.pop().ok_or("stack underflow")?);
    stack.push(op(lhs, rhs).to_bits());
    Ok(())
}

fn compare_i32(stack: &mut Vec<u64>, op: impl Fn(i32, i32) -> bool) -> Result<(), String> {
    let rhs = stack.pop().ok_or("stack underflow")? as i32;
    let lhs = stack.pop().ok_or("stack underflow")? as i32;
    stack.push(u64::from(op(lhs, rhs)));
    Ok(())
}

fn compare_i64(stack: &mut Vec<u64>, op: impl Fn(i64, i64) -> bool) -> Result<(), String> {
    let rhs = stack.pop().ok_or("stack underflow")? as i64;
    let lhs = stack.pop().ok_or("stack underflow")? as i64;
    stack.push(u64::from(op(lhs, rhs)));
    Ok(())
}

fn compare_u64(stack: &mut Vec<u64>, op: impl Fn(u64, u64) -> bool) -> Result<(), String> {
    let rhs = stack.pop().ok_or("stack underflow")?;
    let lhs = stack.pop().ok_or("stack underflow")?;
    stack.push(u64::from(op(lhs, rhs)));
    Ok(())
}

fn compare_f32(stack: &mut Vec<u64>, op: impl Fn(f32, f32) -> bool) -> Result<(), String> {
    let rhs = f32::from_bits(stack.pop().ok_or("stack underflow")? as u32);
    let lhs = f32::from_bits(stack.pop().ok_or("stack underflow")? as u32);
    stack.push(u64::from(op(lhs, rhs)));
    Ok(())
}

fn compare_f64(stack: &mut Vec<u64>, op: impl Fn(f64, f64) -> bool) -> Result<(), String> {
    let rhs = f64::from_bits(stack.pop().ok_or("stack underflow")?);
    let lhs = f64::from_bits(stack.pop().ok_or("stack underflow")?);
    stack.push(u64::from(op(lhs, rhs)));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use prism_core::{encode_print, IrFunction, IrInstruction};

    fn run(instructions: Vec<IrInstruction>, local_count: u32) -> Result<u64, String> {
        let mut module = IrModule::new();
        module.functions.push(IrFunction {
            name: "/main".to_string(),
            param_count: 0,
            local_count,
            instructions,
        });
        Vm::new().execute(&module)
    }

    #[test]
    fn test_push_and_return() {
        let result = run(
            vec![
                IrInstruction::new(IrOpcode::PushI32, 7),
                IrInstruction::new(IrOpcode::ReturnI32, 0),
            ],
            0,
        )
        .unwrap();
        assert_eq!(result, 7);
    }

    #[test]
    fn test_i32_arithmetic_wraps() {
        let result = run(
            vec![
                IrInstruction::new(IrOpcode::PushI32, i32::MAX as u32 as u64),
                IrInstruction::new(IrOpcode::PushI32, 1),
                IrInstruction::new(IrOpcode::AddI32, 0),
                IrInstruction::new(IrOpcode::PushI32, i32::MIN as u32 as u64),
                IrInstruction::new(IrOpcode::CmpEqI32, 0),
                IrInstruction::new(IrOpcode::ReturnI32, 0),
            ],
            0,
        )
        .unwrap();
        assert_eq!(result, 1);
    }

    #[test]
    fn test_division_by_zero_is_an_error() {
        let err = run(
            vec![
                IrInstruction::new(IrOpcode::PushI32, 1),
                IrInstruction::new(IrOpcode::PushI32, 0),
                IrInstruction::new(IrOpcode::DivI32, 0),
                IrInstruction::new(IrOpcode::ReturnI32, 0),
            ],
            0,
        )
        .unwrap_err();
        assert_eq!(err, "division by zero");
    }

    #[test]
    fn test_float_division_by_zero_is_ieee() {
        // The log kernel relies on -1.0/0.0 producing -inf, not a trap.
        let result = run(
            vec![
                IrInstruction::new(IrOpcode::PushF64, (-1.0f64).to_bits()),
                IrInstruction::new(IrOpcode::PushF64, 0.0f64.to_bits()),
                IrInstruction::new(IrOpcode::DivF64, 0),
                IrInstruction::new(IrOpcode::PushF64, f64::NEG_INFINITY.to_bits()),
                IrInstruction::new(IrOpcode::CmpEqF64, 0),
                IrInstruction::new(IrOpcode::ReturnI32, 0),
            ],
            0,
        )
        .unwrap();
        assert_eq!(result, 1);
    }

    #[test]
    fn test_locals_and_indirect_access() {
        // Store 41 in slot 1, read it back through its address.
        let result = run(
            vec![
                IrInstruction::new(IrOpcode::PushI32, 41),
                IrInstruction::new(IrOpcode::StoreLocal, 1),
                IrInstruction::new(IrOpcode::AddressOfLocal, 1),
                IrInstruction::new(IrOpcode::LoadIndirect, 0),
                IrInstruction::new(IrOpcode::PushI32, 1),
                IrInstruction::new(IrOpcode::AddI32, 0),
                IrInstruction::new(IrOpcode::ReturnI32, 0),
            ],
            2,
        )
        .unwrap();
        assert_eq!(result, 42);
    }

    #[test]
    fn test_heap_alloc_round_trip() {
        let result = run(
            vec![
                IrInstruction::new(IrOpcode::HeapAlloc, 3),
                IrInstruction::new(IrOpcode::StoreLocal, 0),
                IrInstruction::new(IrOpcode::LoadLocal, 0),
                IrInstruction::new(IrOpcode::PushI64, 16),
                IrInstruction::new(IrOpcode::AddI64, 0),
                IrInstruction::new(IrOpcode::PushI32, 9),
                IrInstruction::new(IrOpcode::StoreIndirect, 0),
                IrInstruction::new(IrOpcode::LoadLocal, 0),
                IrInstruction::new(IrOpcode::PushI64, 16),
                IrInstruction::new(IrOpcode::AddI64, 0),
                IrInstruction::new(IrOpcode::LoadIndirect, 0),
                IrInstruction::new(IrOpcode::ReturnI32, 0),
            ],
            1,
        )
        .unwrap();
        assert_eq!(result, 9);
    }

    #[test]
    fn test_jump_if_zero() {
        let result = run(
            vec![
                IrInstruction::new(IrOpcode::PushI32, 0),
                IrInstruction::new(IrOpcode::JumpIfZero, 4),
                IrInstruction::new(IrOpcode::PushI32, 1),
                IrInstruction::new(IrOpcode::ReturnI32, 0),
                IrInstruction::new(IrOpcode::PushI32, 2),
                IrInstruction::new(IrOpcode::ReturnI32, 0),
            ],
            0,
        )
        .unwrap();
        assert_eq!(result, 2);
    }

    #[test]
    fn test_exit_short_circuits() {
        let result = run(
            vec![
                IrInstruction::new(IrOpcode::Exit, 3),
                IrInstruction::new(IrOpcode::PushI32, 7),
                IrInstruction::new(IrOpcode::ReturnI32, 0),
            ],
            0,
        )
        .unwrap();
        assert_eq!(result, 3);
    }

    #[test]
    fn test_argc() {
        let mut module = IrModule::new();
        module.functions.push(IrFunction {
            name: "/main".to_string(),
            param_count: 0,
            local_count: 0,
            instructions: vec![
                IrInstruction::new(IrOpcode::PushArgc, 0),
                IrInstruction::new(IrOpcode::ReturnI32, 0),
            ],
        });
        let mut vm = Vm::with_argv(vec![b"prog".to_vec(), b"alpha".to_vec(), b"beta".to_vec()]);
        assert_eq!(vm.execute(&module).unwrap(), 3);
    }

    #[test]
    fn test_string_byte_load() {
        let mut module = IrModule::new();
        let index = module.intern_string(b"hey");
        module.functions.push(IrFunction {
            name: "/main".to_string(),
            param_count: 0,
            local_count: 0,
            instructions: vec![
                IrInstruction::new(IrOpcode::PushI32, 1),
                IrInstruction::new(IrOpcode::LoadStringByte, u64::from(index)),
                IrInstruction::new(IrOpcode::ReturnI32, 0),
            ],
        });
        assert_eq!(Vm::new().execute(&module).unwrap(), u64::from(b'e'));
    }

    #[test]
    fn test_stack_underflow_detected() {
        let err = run(vec![IrInstruction::new(IrOpcode::Pop, 0)], 0).unwrap_err();
        assert_eq!(err, "stack underflow");
    }

    #[test]
    fn test_print_string_flags_do_not_consume_stack() {
        let mut module = IrModule::new();
        let index = module.intern_string(b"x");
        module.functions.push(IrFunction {
            name: "/main".to_string(),
            param_count: 0,
            local_count: 0,
            instructions: vec![
                IrInstruction::new(IrOpcode::PushI32, 5),
                IrInstruction::new(
                    IrOpcode::PrintString,
                    encode_print(index, PRINT_FLAG_NEWLINE | PRINT_FLAG_STDERR),
                ),
                IrInstruction::new(IrOpcode::ReturnI32, 0),
            ],
        });
        assert_eq!(Vm::new().execute(&module).unwrap(), 5);
    }
}
