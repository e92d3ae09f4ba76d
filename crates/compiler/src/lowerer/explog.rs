//! Exponential, logarithm, root and power lowering.
//!
//! exp uses the factorial series with 12 terms for f64 and 10 for f32;
//! log uses the atanh series of (x-1)/(x+1) with terms through z⁹; the
//! roots run 8/6 Newton steps. Iteration counts are part of the
//! language's observable behavior: both backends execute these exact
//! sequences, never a host libm call.

use crate::ast::Expr;
use crate::lowerer::math::FloatOps;
use crate::lowerer::{IrLowerer, LocalMap};
use crate::types::ValueKind;
use prism_core::IrOpcode;

const LN_2: f64 = 0.69314718055994530942;
const LN_10: f64 = 2.30258509299404568402;

impl<'p> IrLowerer<'p> {
    pub(crate) fn emit_exp(&mut self, expr: &Expr, locals: &LocalMap) -> Result<(), String> {
        let ops = self.float_ops_for(expr, locals)?;
        let x = self.alloc_temp_local();
        self.emit_expr(&expr.args[0], locals)?;
        self.emit(IrOpcode::StoreLocal, u64::from(x));
        if expr.name == "exp2" {
            self.emit(IrOpcode::LoadLocal, u64::from(x));
            self.push_float_const(LN_2, ops.kind);
            self.emit(ops.mul, 0);
            self.emit(IrOpcode::StoreLocal, u64::from(x));
        }
        self.emit_exp_series(x, ops);
        Ok(())
    }

    /// e^x over the local `x`; leaves the sum on the stack.
    pub(crate) fn emit_exp_series(&mut self, x: u32, ops: FloatOps) {
        let term = self.alloc_temp_local();
        let sum = self.alloc_temp_local();
        let iter = self.alloc_temp_local();

        self.push_float_const(1.0, ops.kind);
        self.emit(IrOpcode::StoreLocal, u64::from(term));
        self.push_float_const(1.0, ops.kind);
        self.emit(IrOpcode::StoreLocal, u64::from(sum));
        self.emit(IrOpcode::PushI32, 1);
        self.emit(IrOpcode::StoreLocal, u64::from(iter));

        let convert = if ops.kind == ValueKind::Float64 {
            IrOpcode::ConvertI32ToF64
        } else {
            IrOpcode::ConvertI32ToF32
        };
        let iterations: u64 = if ops.kind == ValueKind::Float64 { 12 } else { 10 };

        let loop_start = self.here();
        self.emit(IrOpcode::LoadLocal, u64::from(iter));
        self.emit(IrOpcode::PushI32, iterations + 1);
        self.emit(IrOpcode::CmpLtI32, 0);
        let jump_loop_end = self.emit_jump(IrOpcode::JumpIfZero);

        // term = term * x / iter
        self.emit(IrOpcode::LoadLocal, u64::from(term));
        self.emit(IrOpcode::LoadLocal, u64::from(x));
        self.emit(ops.mul, 0);
        self.emit(IrOpcode::StoreLocal, u64::from(term));
        self.emit(IrOpcode::LoadLocal, u64::from(term));
        self.emit(IrOpcode::LoadLocal, u64::from(iter));
        self.emit(convert, 0);
        self.emit(ops.div, 0);
        self.emit(IrOpcode::StoreLocal, u64::from(term));

        self.emit(IrOpcode::LoadLocal, u64::from(sum));
        self.emit(IrOpcode::LoadLocal, u64::from(term));
        self.emit(ops.add, 0);
        self.emit(IrOpcode::StoreLocal, u64::from(sum));

        self.emit(IrOpcode::LoadLocal, u64::from(iter));
        self.emit(IrOpcode::PushI32, 1);
        self.emit(IrOpcode::AddI32, 0);
        self.emit(IrOpcode::StoreLocal, u64::from(iter));
        self.emit(IrOpcode::Jump, loop_start as u64);

        self.patch_jump(jump_loop_end);
        self.emit(IrOpcode::LoadLocal, u64::from(sum));
    }

    pub(crate) fn emit_log(&mut self, expr: &Expr, locals: &LocalMap) -> Result<(), String> {
        let ops = self.float_ops_for(expr, locals)?;
        let x = self.alloc_temp_local();
        self.emit_expr(&expr.args[0], locals)?;
        self.emit(IrOpcode::StoreLocal, u64::from(x));
        self.emit_ln_series(x, ops);
        match expr.name.as_str() {
            "log2" => {
                self.push_float_const(LN_2, ops.kind);
                self.emit(ops.div, 0);
            }
            "log10" => {
                self.push_float_const(LN_10, ops.kind);
                self.emit(ops.div, 0);
            }
            _ => {}
        }
        Ok(())
    }

    /// ln(x) over the local `x`; leaves the value on the stack. Negative
    /// inputs produce NaN, zero produces -inf, both via explicit float
    /// division so the backends agree bit-for-bit.
    pub(crate) fn emit_ln_series(&mut self, x: u32, ops: FloatOps) {
        let out = self.alloc_temp_local();

        self.emit(IrOpcode::LoadLocal, u64::from(x));
        self.push_float_const(0.0, ops.kind);
        self.emit(ops.cmp_lt, 0);
        let jump_not_negative = self.emit_jump(IrOpcode::JumpIfZero);
        self.push_float_const(0.0, ops.kind);
        self.push_float_const(0.0, ops.kind);
        self.emit(ops.div, 0);
        self.emit(IrOpcode::StoreLocal, u64::from(out));
        let jump_end_nan = self.emit_jump(IrOpcode::Jump);

        self.patch_jump(jump_not_negative);
        self.emit(IrOpcode::LoadLocal, u64::from(x));
        self.push_float_const(0.0, ops.kind);
        self.emit(ops.cmp_eq, 0);
        let jump_positive = self.emit_jump(IrOpcode::JumpIfZero);
        self.push_float_const(-1.0, ops.kind);
        self.push_float_const(0.0, ops.kind);
        self.emit(ops.div, 0);
        self.emit(IrOpcode::StoreLocal, u64::from(out));
        let jump_end_inf = self.emit_jump(IrOpcode::Jump);

        self.patch_jump(jump_positive);
        let z = self.alloc_temp_local();
        let z2 = self.alloc_temp_local();
        let term = self.alloc_temp_local();
        let sum = self.alloc_temp_local();

        // z = (x - 1) / (x + 1)
        self.emit(IrOpcode::LoadLocal, u64::from(x));
        self.push_float_const(1.0, ops.kind);
        self.emit(ops.sub, 0);
        self.emit(IrOpcode::LoadLocal, u64::from(x));
        self.push_float_const(1.0, ops.kind);
        self.emit(ops.add, 0);
        self.emit(ops.div, 0);
        self.emit(IrOpcode::StoreLocal, u64::from(z));

        self.emit(IrOpcode::LoadLocal, u64::from(z));
        self.emit(IrOpcode::LoadLocal, u64::from(z));
        self.emit(ops.mul, 0);
        self.emit(IrOpcode::StoreLocal, u64::from(z2));

        self.emit(IrOpcode::LoadLocal, u64::from(z));
        self.emit(IrOpcode::StoreLocal, u64::from(term));
        self.emit(IrOpcode::LoadLocal, u64::from(z));
        self.emit(IrOpcode::StoreLocal, u64::from(sum));

        for divisor in [3.0, 5.0, 7.0, 9.0] {
            self.emit(IrOpcode::LoadLocal, u64::from(term));
            self.emit(IrOpcode::LoadLocal, u64::from(z2));
            self.emit(ops.mul, 0);
            self.emit(IrOpcode::StoreLocal, u64::from(term));
            self.emit(IrOpcode::LoadLocal, u64::from(sum));
            self.emit(IrOpcode::LoadLocal, u64::from(term));
            self.push_float_const(1.0 / divisor, ops.kind);
            self.emit(ops.mul, 0);
            self.emit(ops.add, 0);
            self.emit(IrOpcode::StoreLocal, u64::from(sum));
        }

        self.emit(IrOpcode::LoadLocal, u64::from(sum));
        self.push_float_const(2.0, ops.kind);
        self.emit(ops.mul, 0);
        self.emit(IrOpcode::StoreLocal, u64::from(out));

        self.patch_jump(jump_end_nan);
        self.patch_jump(jump_end_inf);
        self.emit(IrOpcode::LoadLocal, u64::from(out));
    }

    pub(crate) fn emit_root(&mut self, expr: &Expr, locals: &LocalMap) -> Result<(), String> {
        let ops = self.float_ops_for(expr, locals)?;
        let value = self.alloc_temp_local();
        self.emit_expr(&expr.args[0], locals)?;
        self.emit(IrOpcode::StoreLocal, u64::from(value));
        if expr.name == "sqrt" {
            self.emit_newton_sqrt(value, ops);
            return Ok(());
        }
        self.emit_newton_cbrt(value, ops);
        Ok(())
    }

    /// Cube root via Newton: x = (2x + v/x²) / 3, with the sign peeled
    /// off so negative inputs converge.
    fn emit_newton_cbrt(&mut self, value: u32, ops: FloatOps) {
        let magnitude = self.alloc_temp_local();
        let sign = self.alloc_temp_local();
        let out = self.alloc_temp_local();

        self.push_float_const(1.0, ops.kind);
        self.emit(IrOpcode::StoreLocal, u64::from(sign));
        self.emit(IrOpcode::LoadLocal, u64::from(value));
        self.emit(IrOpcode::StoreLocal, u64::from(magnitude));

        self.emit(IrOpcode::LoadLocal, u64::from(value));
        self.push_float_const(0.0, ops.kind);
        self.emit(ops.cmp_lt, 0);
        let jump_positive = self.emit_jump(IrOpcode::JumpIfZero);
        self.push_float_const(-1.0, ops.kind);
        self.emit(IrOpcode::StoreLocal, u64::from(sign));
        self.emit(IrOpcode::LoadLocal, u64::from(value));
        self.emit(ops.neg, 0);
        self.emit(IrOpcode::StoreLocal, u64::from(magnitude));
        self.patch_jump(jump_positive);

        self.emit(IrOpcode::LoadLocal, u64::from(magnitude));
        self.push_float_const(0.0, ops.kind);
        self.emit(ops.cmp_eq, 0);
        let jump_nonzero = self.emit_jump(IrOpcode::JumpIfZero);
        self.push_float_const(0.0, ops.kind);
        self.emit(IrOpcode::StoreLocal, u64::from(out));
        let jump_zero_end = self.emit_jump(IrOpcode::Jump);

        self.patch_jump(jump_nonzero);
        let x = self.alloc_temp_local();
        let iter = self.alloc_temp_local();
        self.emit(IrOpcode::LoadLocal, u64::from(magnitude));
        self.emit(IrOpcode::StoreLocal, u64::from(x));
        self.emit(IrOpcode::PushI32, 0);
        self.emit(IrOpcode::StoreLocal, u64::from(iter));

        let iterations = if ops.kind == ValueKind::Float64 { 8 } else { 6 };
        let loop_start = self.here();
        self.emit(IrOpcode::LoadLocal, u64::from(iter));
        self.emit(IrOpcode::PushI32, iterations);
        self.emit(IrOpcode::CmpLtI32, 0);
        let jump_loop_end = self.emit_jump(IrOpcode::JumpIfZero);

        // x = (2*x + magnitude / (x*x)) / 3
        self.emit(IrOpcode::LoadLocal, u64::from(x));
        self.push_float_const(2.0, ops.kind);
        self.emit(ops.mul, 0);
        self.emit(IrOpcode::LoadLocal, u64::from(magnitude));
        self.emit(IrOpcode::LoadLocal, u64::from(x));
        self.emit(IrOpcode::LoadLocal, u64::from(x));
        self.emit(ops.mul, 0);
        self.emit(ops.div, 0);
        self.emit(ops.add, 0);
        self.push_float_const(3.0, ops.kind);
        self.emit(ops.div, 0);
        self.emit(IrOpcode::StoreLocal, u64::from(x));

        self.emit(IrOpcode::LoadLocal, u64::from(iter));
        self.emit(IrOpcode::PushI32, 1);
        self.emit(IrOpcode::AddI32, 0);
        self.emit(IrOpcode::StoreLocal, u64::from(iter));
        self.emit(IrOpcode::Jump, loop_start as u64);

        self.patch_jump(jump_loop_end);
        self.emit(IrOpcode::LoadLocal, u64::from(x));
        self.emit(IrOpcode::StoreLocal, u64::from(out));
        self.patch_jump(jump_zero_end);
        self.emit(IrOpcode::LoadLocal, u64::from(out));
        self.emit(IrOpcode::LoadLocal, u64::from(sign));
        self.emit(ops.mul, 0);
    }

    pub(crate) fn emit_pow(&mut self, expr: &Expr, locals: &LocalMap) -> Result<(), String> {
        let base_kind = self.infer_expr_kind(&expr.args[0], locals);
        let exponent_kind = self.infer_expr_kind(&expr.args[1], locals);

        if exponent_kind.is_float() {
            // pow(x, y) = exp(y * ln x) through the shared kernels.
            if !base_kind.is_float() {
                return Err("pow requires float base for float exponents".to_string());
            }
            let ops = FloatOps::for_kind(base_kind);
            let base = self.alloc_temp_local();
            let scaled = self.alloc_temp_local();
            self.emit_expr(&expr.args[0], locals)?;
            self.emit(IrOpcode::StoreLocal, u64::from(base));
            self.emit_expr(&expr.args[1], locals)?;
            self.emit_ln_series(base, ops);
            self.emit(ops.mul, 0);
            self.emit(IrOpcode::StoreLocal, u64::from(scaled));
            self.emit_exp_series(scaled, ops);
            return Ok(());
        }
        if !exponent_kind.is_integer() {
            return Err("pow requires an integer or float exponent".to_string());
        }

        // Multiplication chain with a runtime non-negative check.
        let base = self.alloc_temp_local();
        let exponent = self.alloc_temp_local();
        let result = self.alloc_temp_local();
        let iter = self.alloc_temp_local();
        self.emit_expr(&expr.args[0], locals)?;
        self.emit(IrOpcode::StoreLocal, u64::from(base));
        self.emit_expr(&expr.args[1], locals)?;
        self.emit(IrOpcode::StoreLocal, u64::from(exponent));

        if exponent_kind != ValueKind::UInt64 {
            let cmp = if exponent_kind == ValueKind::Int64 {
                IrOpcode::CmpLtI64
            } else {
                IrOpcode::CmpLtI32
            };
            let zero = if exponent_kind == ValueKind::Int64 {
                IrOpcode::PushI64
            } else {
                IrOpcode::PushI32
            };
            self.emit(IrOpcode::LoadLocal, u64::from(exponent));
            self.emit(zero, 0);
            self.emit(cmp, 0);
            let jump_ok = self.emit_jump(IrOpcode::JumpIfZero);
            self.emit_checked_failure("pow exponent must be non-negative");
            self.patch_jump(jump_ok);
        }

        match base_kind {
            ValueKind::Float32 | ValueKind::Float64 => {
                self.push_float_const(1.0, base_kind);
            }
            ValueKind::Int64 | ValueKind::UInt64 => self.emit(IrOpcode::PushI64, 1),
            _ => self.emit(IrOpcode::PushI32, 1),
        }
        self.emit(IrOpcode::StoreLocal, u64::from(result));
        self.emit(IrOpcode::PushI32, 0);
        self.emit(IrOpcode::StoreLocal, u64::from(iter));

        let (cmp_iter, iter_push) = match exponent_kind {
            ValueKind::Int64 => (IrOpcode::CmpLtI64, true),
            ValueKind::UInt64 => (IrOpcode::CmpLtU64, true),
            _ => (IrOpcode::CmpLtI32, false),
        };
        let loop_start = self.here();
        self.emit(IrOpcode::LoadLocal, u64::from(iter));
        if iter_push {
            self.emit(IrOpcode::ConvertI32ToI64, 0);
        }
        self.emit(IrOpcode::LoadLocal, u64::from(exponent));
        self.emit(cmp_iter, 0);
        let jump_loop_end = self.emit_jump(IrOpcode::JumpIfZero);

        let mul = match base_kind {
            ValueKind::Float32 => IrOpcode::MulF32,
            ValueKind::Float64 => IrOpcode::MulF64,
            ValueKind::Int64 | ValueKind::UInt64 => IrOpcode::MulI64,
            _ => IrOpcode::MulI32,
        };
        self.emit(IrOpcode::LoadLocal, u64::from(result));
        self.emit(IrOpcode::LoadLocal, u64::from(base));
        self.emit(mul, 0);
        self.emit(IrOpcode::StoreLocal, u64::from(result));

        self.emit(IrOpcode::LoadLocal, u64::from(iter));
        self.emit(IrOpcode::PushI32, 1);
        self.emit(IrOpcode::AddI32, 0);
        self.emit(IrOpcode::StoreLocal, u64::from(iter));
        self.emit(IrOpcode::Jump, loop_start as u64);

        self.patch_jump(jump_loop_end);
        self.emit(IrOpcode::LoadLocal, u64::from(result));
        Ok(())
    }
}
