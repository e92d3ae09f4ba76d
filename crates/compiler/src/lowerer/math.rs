//! Math builtin lowering: compare-and-select kernels and the dispatcher.
//!
//! Transcendentals live in `trig.rs` and `explog.rs`. Everything here is
//! expanded inline with spill temporaries so the VM and the native
//! backend execute the identical instruction sequence.

use crate::ast::Expr;
use crate::lowerer::{IrLowerer, LocalMap};
use crate::types::ValueKind;
use prism_core::IrOpcode;

/// Typed opcode bundle for one float width, threaded through the math
/// emitters so each kernel is written once.
#[derive(Clone, Copy)]
pub(crate) struct FloatOps {
    pub kind: ValueKind,
    pub add: IrOpcode,
    pub sub: IrOpcode,
    pub mul: IrOpcode,
    pub div: IrOpcode,
    pub neg: IrOpcode,
    pub cmp_eq: IrOpcode,
    pub cmp_lt: IrOpcode,
    pub cmp_gt: IrOpcode,
}

impl FloatOps {
    pub fn for_kind(kind: ValueKind) -> FloatOps {
        if kind == ValueKind::Float32 {
            FloatOps {
                kind,
                add: IrOpcode::AddF32,
                sub: IrOpcode::SubF32,
                mul: IrOpcode::MulF32,
                div: IrOpcode::DivF32,
                neg: IrOpcode::NegF32,
                cmp_eq: IrOpcode::CmpEqF32,
                cmp_lt: IrOpcode::CmpLtF32,
                cmp_gt: IrOpcode::CmpGtF32,
            }
        } else {
            FloatOps {
                kind: ValueKind::Float64,
                add: IrOpcode::AddF64,
                sub: IrOpcode::SubF64,
                mul: IrOpcode::MulF64,
                div: IrOpcode::DivF64,
                neg: IrOpcode::NegF64,
                cmp_eq: IrOpcode::CmpEqF64,
                cmp_lt: IrOpcode::CmpLtF64,
                cmp_gt: IrOpcode::CmpGtF64,
            }
        }
    }
}

impl<'p> IrLowerer<'p> {
    pub(crate) fn emit_math_builtin(
        &mut self,
        expr: &Expr,
        locals: &LocalMap,
    ) -> Result<(), String> {
        match expr.name.as_str() {
            "abs" => self.emit_abs(expr, locals),
            "sign" => self.emit_sign(expr, locals),
            "min" | "max" => self.emit_min_max(expr, locals),
            "clamp" => self.emit_clamp(expr, locals),
            "saturate" => self.emit_saturate(expr, locals),
            "lerp" => self.emit_lerp(expr, locals),
            "fma" => self.emit_fma(expr, locals),
            "hypot" => self.emit_hypot(expr, locals),
            "copysign" => self.emit_copysign(expr, locals),
            "radians" | "degrees" => self.emit_angle(expr, locals),
            "floor" | "ceil" | "round" | "trunc" | "fract" => self.emit_rounding(expr, locals),
            "is_nan" | "is_inf" | "is_finite" => self.emit_float_predicate(expr, locals),
            "sin" | "cos" | "tan" => self.emit_trig(expr, locals),
            "asin" | "acos" | "atan" => self.emit_arc_trig(expr, locals),
            "atan2" => self.emit_atan2(expr, locals),
            "sinh" | "cosh" | "tanh" => self.emit_hyperbolic(expr, locals),
            "asinh" | "acosh" | "atanh" => self.emit_arc_hyperbolic(expr, locals),
            "exp" | "exp2" => self.emit_exp(expr, locals),
            "log" | "log2" | "log10" => self.emit_log(expr, locals),
            "sqrt" | "cbrt" => self.emit_root(expr, locals),
            "pow" => self.emit_pow(expr, locals),
            other => Err(format!(
                "{} does not support math builtin: {}",
                self.backend.tag(),
                other
            )),
        }
    }

    /// Kind agreement for a math builtin's operands; rejects non-floats
    /// where the kernel is float-only.
    pub(crate) fn math_operand_kind(
        &self,
        expr: &Expr,
        locals: &LocalMap,
        float_only: bool,
    ) -> Result<ValueKind, String> {
        let mut combined = ValueKind::Unknown;
        for arg in &expr.args {
            let kind = self.infer_expr_kind(arg, locals);
            combined = super::exprs::combine_value_kinds(combined, kind);
        }
        if combined == ValueKind::Unknown {
            return Err(format!(
                "{} requires numeric arguments of the same type",
                expr.name
            ));
        }
        if float_only && !combined.is_float() {
            return Err(format!("{} requires float arguments", expr.name));
        }
        Ok(combined)
    }

    pub(crate) fn float_ops_for(
        &self,
        expr: &Expr,
        locals: &LocalMap,
    ) -> Result<FloatOps, String> {
        let kind = self.math_operand_kind(expr, locals, true)?;
        Ok(FloatOps::for_kind(kind))
    }

    fn emit_abs(&mut self, expr: &Expr, locals: &LocalMap) -> Result<(), String> {
        let kind = self.math_operand_kind(expr, locals, false)?;
        if kind == ValueKind::UInt64 {
            return self.emit_expr(&expr.args[0], locals);
        }
        let value = self.alloc_temp_local();
        let out = self.alloc_temp_local();
        self.emit_expr(&expr.args[0], locals)?;
        self.emit(IrOpcode::StoreLocal, u64::from(value));

        self.emit(IrOpcode::LoadLocal, u64::from(value));
        self.push_zero(kind);
        self.emit(cmp_lt_for(kind), 0);
        let jump_keep = self.emit_jump(IrOpcode::JumpIfZero);
        self.emit(IrOpcode::LoadLocal, u64::from(value));
        self.emit(neg_for(kind), 0);
        self.emit(IrOpcode::StoreLocal, u64::from(out));
        let jump_end = self.emit_jump(IrOpcode::Jump);
        self.patch_jump(jump_keep);
        self.emit(IrOpcode::LoadLocal, u64::from(value));
        self.emit(IrOpcode::StoreLocal, u64::from(out));
        self.patch_jump(jump_end);
        self.emit(IrOpcode::LoadLocal, u64::from(out));
        Ok(())
    }

    fn emit_sign(&mut self, expr: &Expr, locals: &LocalMap) -> Result<(), String> {
        let kind = self.math_operand_kind(expr, locals, false)?;
        let value = self.alloc_temp_local();
        let out = self.alloc_temp_local();
        self.emit_expr(&expr.args[0], locals)?;
        self.emit(IrOpcode::StoreLocal, u64::from(value));

        // out = -1 when value < 0, +1 when value > 0, else 0.
        self.push_zero(kind);
        self.emit(IrOpcode::StoreLocal, u64::from(out));

        self.emit(IrOpcode::LoadLocal, u64::from(value));
        self.push_zero(kind);
        self.emit(cmp_gt_for(kind), 0);
        let jump_not_positive = self.emit_jump(IrOpcode::JumpIfZero);
        self.push_one(kind);
        self.emit(IrOpcode::StoreLocal, u64::from(out));
        let jump_done = self.emit_jump(IrOpcode::Jump);
        self.patch_jump(jump_not_positive);

        if kind != ValueKind::UInt64 {
            self.emit(IrOpcode::LoadLocal, u64::from(value));
            self.push_zero(kind);
            self.emit(cmp_lt_for(kind), 0);
            let jump_zero = self.emit_jump(IrOpcode::JumpIfZero);
            self.push_one(kind);
            self.emit(neg_for(kind), 0);
            self.emit(IrOpcode::StoreLocal, u64::from(out));
            self.patch_jump(jump_zero);
        }
        self.patch_jump(jump_done);
        self.emit(IrOpcode::LoadLocal, u64::from(out));
        Ok(())
    }

    fn emit_min_max(&mut self, expr: &Expr, locals: &LocalMap) -> Result<(), String> {
        let kind = self.math_operand_kind(expr, locals, false)?;
        let is_max = expr.name == "max";
        let cmp = if is_max {
            cmp_gt_for(kind)
        } else {
            cmp_lt_for(kind)
        };
        let left = self.alloc_temp_local();
        let right = self.alloc_temp_local();
        let out = self.alloc_temp_local();
        self.emit_expr(&expr.args[0], locals)?;
        self.emit(IrOpcode::StoreLocal, u64::from(left));
        self.emit_expr(&expr.args[1], locals)?;
        self.emit(IrOpcode::StoreLocal, u64::from(right));

        self.emit(IrOpcode::LoadLocal, u64::from(left));
        self.emit(IrOpcode::LoadLocal, u64::from(right));
        self.emit(cmp, 0);
        let jump_use_right = self.emit_jump(IrOpcode::JumpIfZero);
        self.emit(IrOpcode::LoadLocal, u64::from(left));
        self.emit(IrOpcode::StoreLocal, u64::from(out));
        let jump_end = self.emit_jump(IrOpcode::Jump);
        self.patch_jump(jump_use_right);
        self.emit(IrOpcode::LoadLocal, u64::from(right));
        self.emit(IrOpcode::StoreLocal, u64::from(out));
        self.patch_jump(jump_end);
        self.emit(IrOpcode::LoadLocal, u64::from(out));
        Ok(())
    }

    fn emit_clamp(&mut self, expr: &Expr, locals: &LocalMap) -> Result<(), String> {
        let kind = self.math_operand_kind(expr, locals, false)?;
        let value = self.alloc_temp_local();
        let lo = self.alloc_temp_local();
        let hi = self.alloc_temp_local();
        let out = self.alloc_temp_local();
        self.emit_expr(&expr.args[0], locals)?;
        self.emit(IrOpcode::StoreLocal, u64::from(value));
        self.emit_expr(&expr.args[1], locals)?;
        self.emit(IrOpcode::StoreLocal, u64::from(lo));
        self.emit_expr(&expr.args[2], locals)?;
        self.emit(IrOpcode::StoreLocal, u64::from(hi));

        self.emit(IrOpcode::LoadLocal, u64::from(value));
        self.emit(IrOpcode::LoadLocal, u64::from(lo));
        self.emit(cmp_lt_for(kind), 0);
        let jump_check_hi = self.emit_jump(IrOpcode::JumpIfZero);
        self.emit(IrOpcode::LoadLocal, u64::from(lo));
        self.emit(IrOpcode::StoreLocal, u64::from(out));
        let jump_end_lo = self.emit_jump(IrOpcode::Jump);

        self.patch_jump(jump_check_hi);
        self.emit(IrOpcode::LoadLocal, u64::from(value));
        self.emit(IrOpcode::LoadLocal, u64::from(hi));
        self.emit(cmp_gt_for(kind), 0);
        let jump_use_value = self.emit_jump(IrOpcode::JumpIfZero);
        self.emit(IrOpcode::LoadLocal, u64::from(hi));
        self.emit(IrOpcode::StoreLocal, u64::from(out));
        let jump_end_hi = self.emit_jump(IrOpcode::Jump);

        self.patch_jump(jump_use_value);
        self.emit(IrOpcode::LoadLocal, u64::from(value));
        self.emit(IrOpcode::StoreLocal, u64::from(out));
        self.patch_jump(jump_end_lo);
        self.patch_jump(jump_end_hi);
        self.emit(IrOpcode::LoadLocal, u64::from(out));
        Ok(())
    }

    fn emit_saturate(&mut self, expr: &Expr, locals: &LocalMap) -> Result<(), String> {
        let ops = self.float_ops_for(expr, locals)?;
        let value = self.alloc_temp_local();
        let out = self.alloc_temp_local();
        self.emit_expr(&expr.args[0], locals)?;
        self.emit(IrOpcode::StoreLocal, u64::from(value));

        self.emit(IrOpcode::LoadLocal, u64::from(value));
        self.push_float_const(0.0, ops.kind);
        self.emit(ops.cmp_lt, 0);
        let jump_check_hi = self.emit_jump(IrOpcode::JumpIfZero);
        self.push_float_const(0.0, ops.kind);
        self.emit(IrOpcode::StoreLocal, u64::from(out));
        let jump_end_lo = self.emit_jump(IrOpcode::Jump);

        self.patch_jump(jump_check_hi);
        self.emit(IrOpcode::LoadLocal, u64::from(value));
        self.push_float_const(1.0, ops.kind);
        self.emit(ops.cmp_gt, 0);
        let jump_use_value = self.emit_jump(IrOpcode::JumpIfZero);
        self.push_float_const(1.0, ops.kind);
        self.emit(IrOpcode::StoreLocal, u64::from(out));
        let jump_end_hi = self.emit_jump(IrOpcode::Jump);

        self.patch_jump(jump_use_value);
        self.emit(IrOpcode::LoadLocal, u64::from(value));
        self.emit(IrOpcode::StoreLocal, u64::from(out));
        self.patch_jump(jump_end_lo);
        self.patch_jump(jump_end_hi);
        self.emit(IrOpcode::LoadLocal, u64::from(out));
        Ok(())
    }

    fn emit_lerp(&mut self, expr: &Expr, locals: &LocalMap) -> Result<(), String> {
        let kind = self.math_operand_kind(expr, locals, false)?;
        let start = self.alloc_temp_local();
        let end = self.alloc_temp_local();
        let t = self.alloc_temp_local();
        self.emit_expr(&expr.args[0], locals)?;
        self.emit(IrOpcode::StoreLocal, u64::from(start));
        self.emit_expr(&expr.args[1], locals)?;
        self.emit(IrOpcode::StoreLocal, u64::from(end));
        self.emit_expr(&expr.args[2], locals)?;
        self.emit(IrOpcode::StoreLocal, u64::from(t));

        // (end - start) * t + start
        self.emit(IrOpcode::LoadLocal, u64::from(end));
        self.emit(IrOpcode::LoadLocal, u64::from(start));
        self.emit(sub_for(kind), 0);
        self.emit(IrOpcode::LoadLocal, u64::from(t));
        self.emit(mul_for(kind), 0);
        self.emit(IrOpcode::LoadLocal, u64::from(start));
        self.emit(add_for(kind), 0);
        Ok(())
    }

    fn emit_fma(&mut self, expr: &Expr, locals: &LocalMap) -> Result<(), String> {
        let ops = self.float_ops_for(expr, locals)?;
        self.emit_expr(&expr.args[0], locals)?;
        self.emit_expr(&expr.args[1], locals)?;
        self.emit(ops.mul, 0);
        self.emit_expr(&expr.args[2], locals)?;
        self.emit(ops.add, 0);
        Ok(())
    }

    /// sqrt(a² + b²) by Newton iteration (8 steps for f64, 6 for f32),
    /// with the zero square handled before the divide.
    fn emit_hypot(&mut self, expr: &Expr, locals: &LocalMap) -> Result<(), String> {
        let ops = self.float_ops_for(expr, locals)?;
        let a = self.alloc_temp_local();
        let b = self.alloc_temp_local();
        self.emit_expr(&expr.args[0], locals)?;
        self.emit(IrOpcode::StoreLocal, u64::from(a));
        self.emit_expr(&expr.args[1], locals)?;
        self.emit(IrOpcode::StoreLocal, u64::from(b));

        self.emit(IrOpcode::LoadLocal, u64::from(a));
        self.emit(IrOpcode::LoadLocal, u64::from(a));
        self.emit(ops.mul, 0);
        self.emit(IrOpcode::LoadLocal, u64::from(b));
        self.emit(IrOpcode::LoadLocal, u64::from(b));
        self.emit(ops.mul, 0);
        self.emit(ops.add, 0);
        let square = self.alloc_temp_local();
        self.emit(IrOpcode::StoreLocal, u64::from(square));
        self.emit_newton_sqrt(square, ops);
        Ok(())
    }

    /// Newton iterations over the value stored in `square`; leaves the
    /// root on the stack.
    pub(crate) fn emit_newton_sqrt(&mut self, square: u32, ops: FloatOps) {
        let out = self.alloc_temp_local();
        let x = self.alloc_temp_local();
        let iter = self.alloc_temp_local();

        self.emit(IrOpcode::LoadLocal, u64::from(square));
        self.push_float_const(0.0, ops.kind);
        self.emit(ops.cmp_eq, 0);
        let jump_nonzero = self.emit_jump(IrOpcode::JumpIfZero);
        self.push_float_const(0.0, ops.kind);
        self.emit(IrOpcode::StoreLocal, u64::from(out));
        let jump_zero_end = self.emit_jump(IrOpcode::Jump);

        self.patch_jump(jump_nonzero);
        self.emit(IrOpcode::LoadLocal, u64::from(square));
        self.emit(IrOpcode::StoreLocal, u64::from(x));
        self.emit(IrOpcode::PushI32, 0);
        self.emit(IrOpcode::StoreLocal, u64::from(iter));

        let iterations = if ops.kind == ValueKind::Float64 { 8 } else { 6 };
        let loop_start = self.here();
        self.emit(IrOpcode::LoadLocal, u64::from(iter));
        self.emit(IrOpcode::PushI32, iterations);
        self.emit(IrOpcode::CmpLtI32, 0);
        let jump_loop_end = self.emit_jump(IrOpcode::JumpIfZero);

        // x = (x + square / x) * 0.5
        self.emit(IrOpcode::LoadLocal, u64::from(x));
        self.emit(IrOpcode::LoadLocal, u64::from(square));
        self.emit(IrOpcode::LoadLocal, u64::from(x));
        self.emit(ops.div, 0);
        self.emit(ops.add, 0);
        self.push_float_const(0.5, ops.kind);
        self.emit(ops.mul, 0);
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
    }

    fn emit_copysign(&mut self, expr: &Expr, locals: &LocalMap) -> Result<(), String> {
        let ops = self.float_ops_for(expr, locals)?;
        let x = self.alloc_temp_local();
        let y = self.alloc_temp_local();
        let magnitude = self.alloc_temp_local();
        let out = self.alloc_temp_local();
        self.emit_expr(&expr.args[0], locals)?;
        self.emit(IrOpcode::StoreLocal, u64::from(x));
        self.emit_expr(&expr.args[1], locals)?;
        self.emit(IrOpcode::StoreLocal, u64::from(y));

        self.emit(IrOpcode::LoadLocal, u64::from(x));
        self.push_float_const(0.0, ops.kind);
        self.emit(ops.cmp_lt, 0);
        let jump_positive = self.emit_jump(IrOpcode::JumpIfZero);
        self.emit(IrOpcode::LoadLocal, u64::from(x));
        self.emit(ops.neg, 0);
        self.emit(IrOpcode::StoreLocal, u64::from(magnitude));
        let jump_abs_end = self.emit_jump(IrOpcode::Jump);
        self.patch_jump(jump_positive);
        self.emit(IrOpcode::LoadLocal, u64::from(x));
        self.emit(IrOpcode::StoreLocal, u64::from(magnitude));
        self.patch_jump(jump_abs_end);

        self.emit(IrOpcode::LoadLocal, u64::from(y));
        self.push_float_const(0.0, ops.kind);
        self.emit(ops.cmp_lt, 0);
        let jump_keep = self.emit_jump(IrOpcode::JumpIfZero);
        self.emit(IrOpcode::LoadLocal, u64::from(magnitude));
        self.emit(ops.neg, 0);
        self.emit(IrOpcode::StoreLocal, u64::from(out));
        let jump_end = self.emit_jump(IrOpcode::Jump);
        self.patch_jump(jump_keep);
        self.emit(IrOpcode::LoadLocal, u64::from(magnitude));
        self.emit(IrOpcode::StoreLocal, u64::from(out));
        self.patch_jump(jump_end);
        self.emit(IrOpcode::LoadLocal, u64::from(out));
        Ok(())
    }

    fn emit_angle(&mut self, expr: &Expr, locals: &LocalMap) -> Result<(), String> {
        let ops = self.float_ops_for(expr, locals)?;
        self.emit_expr(&expr.args[0], locals)?;
        let factor = if expr.name == "radians" {
            0.017453292519943295 // pi / 180
        } else {
            57.29577951308232 // 180 / pi
        };
        self.push_float_const(factor, ops.kind);
        self.emit(ops.mul, 0);
        Ok(())
    }

    fn emit_rounding(&mut self, expr: &Expr, locals: &LocalMap) -> Result<(), String> {
        let ops = self.float_ops_for(expr, locals)?;
        let value = self.alloc_temp_local();
        self.emit_expr(&expr.args[0], locals)?;
        self.emit(IrOpcode::StoreLocal, u64::from(value));
        match expr.name.as_str() {
            "trunc" => {
                self.emit(IrOpcode::LoadLocal, u64::from(value));
                self.emit_float_trunc(ops);
            }
            "floor" => {
                let out = self.alloc_temp_local();
                self.emit_floor_to_local(value, out, ops);
                self.emit(IrOpcode::LoadLocal, u64::from(out));
            }
            "ceil" => {
                // ceil(x) = -floor(-x)
                let negated = self.alloc_temp_local();
                let out = self.alloc_temp_local();
                self.emit(IrOpcode::LoadLocal, u64::from(value));
                self.emit(ops.neg, 0);
                self.emit(IrOpcode::StoreLocal, u64::from(negated));
                self.emit_floor_to_local(negated, out, ops);
                self.emit(IrOpcode::LoadLocal, u64::from(out));
                self.emit(ops.neg, 0);
            }
            "round" => {
                // floor(x + 0.5)
                let shifted = self.alloc_temp_local();
                let out = self.alloc_temp_local();
                self.emit(IrOpcode::LoadLocal, u64::from(value));
                self.push_float_const(0.5, ops.kind);
                self.emit(ops.add, 0);
                self.emit(IrOpcode::StoreLocal, u64::from(shifted));
                self.emit_floor_to_local(shifted, out, ops);
                self.emit(IrOpcode::LoadLocal, u64::from(out));
            }
            _ => {
                // fract(x) = x - floor(x)
                let out = self.alloc_temp_local();
                self.emit_floor_to_local(value, out, ops);
                self.emit(IrOpcode::LoadLocal, u64::from(value));
                self.emit(IrOpcode::LoadLocal, u64::from(out));
                self.emit(ops.sub, 0);
            }
        }
        Ok(())
    }

    /// Truncate the float on top of the stack toward zero via the integer
    /// round trip.
    pub(crate) fn emit_float_trunc(&mut self, ops: FloatOps) {
        if ops.kind == ValueKind::Float32 {
            self.emit(IrOpcode::ConvertF32ToI32, 0);
            self.emit(IrOpcode::ConvertI32ToF32, 0);
        } else {
            self.emit(IrOpcode::ConvertF64ToI64, 0);
            self.emit(IrOpcode::ConvertI64ToF64, 0);
        }
    }

    /// floor(value_local) into out_local: truncate, then subtract one when
    /// the truncation overshot a negative value.
    pub(crate) fn emit_floor_to_local(&mut self, value: u32, out: u32, ops: FloatOps) {
        self.emit(IrOpcode::LoadLocal, u64::from(value));
        self.emit_float_trunc(ops);
        self.emit(IrOpcode::StoreLocal, u64::from(out));

        self.emit(IrOpcode::LoadLocal, u64::from(out));
        self.emit(IrOpcode::LoadLocal, u64::from(value));
        self.emit(ops.cmp_gt, 0);
        let jump_exact = self.emit_jump(IrOpcode::JumpIfZero);
        self.emit(IrOpcode::LoadLocal, u64::from(out));
        self.push_float_const(1.0, ops.kind);
        self.emit(ops.sub, 0);
        self.emit(IrOpcode::StoreLocal, u64::from(out));
        self.patch_jump(jump_exact);
    }

    fn emit_float_predicate(&mut self, expr: &Expr, locals: &LocalMap) -> Result<(), String> {
        let ops = self.float_ops_for(expr, locals)?;
        let value = self.alloc_temp_local();
        self.emit_expr(&expr.args[0], locals)?;
        self.emit(IrOpcode::StoreLocal, u64::from(value));
        match expr.name.as_str() {
            "is_nan" => {
                self.emit(IrOpcode::LoadLocal, u64::from(value));
                self.emit(IrOpcode::LoadLocal, u64::from(value));
                self.emit(neq_for(ops), 0);
            }
            "is_inf" => {
                // |x| == +inf
                self.emit_abs_of_local(value, ops);
                self.push_float_const(f64::INFINITY, ops.kind);
                self.emit(ops.cmp_eq, 0);
            }
            _ => {
                // is_finite: |x| < +inf (false for NaN as well)
                self.emit_abs_of_local(value, ops);
                self.push_float_const(f64::INFINITY, ops.kind);
                self.emit(ops.cmp_lt, 0);
            }
        }
        Ok(())
    }

    fn emit_abs_of_local(&mut self, value: u32, ops: FloatOps) {
        let out = self.alloc_temp_local();
        self.emit(IrOpcode::LoadLocal, u64::from(value));
        self.push_float_const(0.0, ops.kind);
        self.emit(ops.cmp_lt, 0);
        let jump_keep = self.emit_jump(IrOpcode::JumpIfZero);
        self.emit(IrOpcode::LoadLocal, u64::from(value));
        self.emit(ops.neg, 0);
        self.emit(IrOpcode::StoreLocal, u64::from(out));
        let jump_end = self.emit_jump(IrOpcode::Jump);
        self.patch_jump(jump_keep);
        self.emit(IrOpcode::LoadLocal, u64::from(value));
        self.emit(IrOpcode::StoreLocal, u64::from(out));
        self.patch_jump(jump_end);
        self.emit(IrOpcode::LoadLocal, u64::from(out));
    }

    pub(crate) fn push_zero(&mut self, kind: ValueKind) {
        match kind {
            ValueKind::Int64 | ValueKind::UInt64 => self.emit(IrOpcode::PushI64, 0),
            ValueKind::Float32 | ValueKind::Float64 => self.push_float_const(0.0, kind),
            _ => self.emit(IrOpcode::PushI32, 0),
        }
    }

    pub(crate) fn push_one(&mut self, kind: ValueKind) {
        match kind {
            ValueKind::Int64 | ValueKind::UInt64 => self.emit(IrOpcode::PushI64, 1),
            ValueKind::Float32 | ValueKind::Float64 => self.push_float_const(1.0, kind),
            _ => self.emit(IrOpcode::PushI32, 1),
        }
    }
}

fn neq_for(ops: FloatOps) -> IrOpcode {
    if ops.kind == ValueKind::Float32 {
        IrOpcode::CmpNeF32
    } else {
        IrOpcode::CmpNeF64
    }
}

pub(crate) fn cmp_lt_for(kind: ValueKind) -> IrOpcode {
    match kind {
        ValueKind::Int64 => IrOpcode::CmpLtI64,
        ValueKind::UInt64 => IrOpcode::CmpLtU64,
        ValueKind::Float32 => IrOpcode::CmpLtF32,
        ValueKind::Float64 => IrOpcode::CmpLtF64,
        _ => IrOpcode::CmpLtI32,
    }
}

pub(crate) fn cmp_gt_for(kind: ValueKind) -> IrOpcode {
    match kind {
        ValueKind::Int64 => IrOpcode::CmpGtI64,
        ValueKind::UInt64 => IrOpcode::CmpGtU64,
        ValueKind::Float32 => IrOpcode::CmpGtF32,
        ValueKind::Float64 => IrOpcode::CmpGtF64,
        _ => IrOpcode::CmpGtI32,
    }
}

pub(crate) fn neg_for(kind: ValueKind) -> IrOpcode {
    match kind {
        ValueKind::Int64 => IrOpcode::NegI64,
        ValueKind::Float32 => IrOpcode::NegF32,
        ValueKind::Float64 => IrOpcode::NegF64,
        _ => IrOpcode::NegI32,
    }
}

pub(crate) fn add_for(kind: ValueKind) -> IrOpcode {
    match kind {
        ValueKind::Int64 | ValueKind::UInt64 => IrOpcode::AddI64,
        ValueKind::Float32 => IrOpcode::AddF32,
        ValueKind::Float64 => IrOpcode::AddF64,
        _ => IrOpcode::AddI32,
    }
}

pub(crate) fn sub_for(kind: ValueKind) -> IrOpcode {
    match kind {
        ValueKind::Int64 | ValueKind::UInt64 => IrOpcode::SubI64,
        ValueKind::Float32 => IrOpcode::SubF32,
        ValueKind::Float64 => IrOpcode::SubF64,
        _ => IrOpcode::SubI32,
    }
}

pub(crate) fn mul_for(kind: ValueKind) -> IrOpcode {
    match kind {
        ValueKind::Int64 | ValueKind::UInt64 => IrOpcode::MulI64,
        ValueKind::Float32 => IrOpcode::MulF32,
        ValueKind::Float64 => IrOpcode::MulF64,
        _ => IrOpcode::MulI32,
    }
}
