//! Trigonometric and hyperbolic lowering.
//!
//! Fixed-shape polynomial kernels keep the VM and the native backend
//! bit-identical: sin/cos use the degree-7/6 Taylor forms after range
//! reduction into [-π, π] with quadrant sign fixups, atan uses the odd
//! series z - z³/3 + z⁵/5, and the hyperbolics are assembled from the
//! exp and log kernels in `explog.rs`.

use crate::ast::Expr;
use crate::lowerer::math::FloatOps;
use crate::lowerer::{IrLowerer, LocalMap};
use prism_core::IrOpcode;

const PI: f64 = 3.14159265358979323846;
const TAU: f64 = 6.28318530717958647692;
const HALF_PI: f64 = 1.57079632679489661923;

impl<'p> IrLowerer<'p> {
    pub(crate) fn emit_trig(&mut self, expr: &Expr, locals: &LocalMap) -> Result<(), String> {
        let ops = self.float_ops_for(expr, locals)?;
        let x = self.alloc_temp_local();
        self.emit_expr(&expr.args[0], locals)?;
        self.emit(IrOpcode::StoreLocal, u64::from(x));

        let (sin_sign, cos_sign) = self.emit_trig_range_reduction(x, ops);
        let x2 = self.alloc_temp_local();
        self.emit_mul_locals(x, x, x2, ops);

        match expr.name.as_str() {
            "sin" => {
                self.emit_sin_series(x, x2, sin_sign, ops);
            }
            "cos" => {
                self.emit_cos_series(x2, cos_sign, ops);
            }
            _ => {
                // tan(x) = sin(x) / cos(x)
                let sin_out = self.alloc_temp_local();
                let cos_out = self.alloc_temp_local();
                self.emit_sin_series(x, x2, sin_sign, ops);
                self.emit(IrOpcode::StoreLocal, u64::from(sin_out));
                self.emit_cos_series(x2, cos_sign, ops);
                self.emit(IrOpcode::StoreLocal, u64::from(cos_out));
                self.emit(IrOpcode::LoadLocal, u64::from(sin_out));
                self.emit(IrOpcode::LoadLocal, u64::from(cos_out));
                self.emit(ops.div, 0);
            }
        }
        Ok(())
    }

    /// Reduce `x` into [-π/2, π/2] in place. Returns the locals holding
    /// the sin and cos sign factors for the quadrant fixup.
    fn emit_trig_range_reduction(&mut self, x: u32, ops: FloatOps) -> (u32, u32) {
        let scale = self.alloc_temp_local();
        let floored = self.alloc_temp_local();
        let multiple = self.alloc_temp_local();

        // x -= floor(x / tau) * tau
        self.emit(IrOpcode::LoadLocal, u64::from(x));
        self.push_float_const(TAU, ops.kind);
        self.emit(ops.div, 0);
        self.emit(IrOpcode::StoreLocal, u64::from(scale));
        self.emit_floor_to_local(scale, floored, ops);
        self.emit(IrOpcode::LoadLocal, u64::from(floored));
        self.push_float_const(TAU, ops.kind);
        self.emit(ops.mul, 0);
        self.emit(IrOpcode::StoreLocal, u64::from(multiple));
        self.emit(IrOpcode::LoadLocal, u64::from(x));
        self.emit(IrOpcode::LoadLocal, u64::from(multiple));
        self.emit(ops.sub, 0);
        self.emit(IrOpcode::StoreLocal, u64::from(x));

        // Wrap (π, τ) down into (-π, 0).
        self.emit(IrOpcode::LoadLocal, u64::from(x));
        self.push_float_const(PI, ops.kind);
        self.emit(ops.cmp_gt, 0);
        let jump_no_wrap = self.emit_jump(IrOpcode::JumpIfZero);
        self.emit(IrOpcode::LoadLocal, u64::from(x));
        self.push_float_const(TAU, ops.kind);
        self.emit(ops.sub, 0);
        self.emit(IrOpcode::StoreLocal, u64::from(x));
        self.patch_jump(jump_no_wrap);

        // Quadrant folds into [-π/2, π/2] with sign fixups.
        let sin_sign = self.alloc_temp_local();
        let cos_sign = self.alloc_temp_local();
        self.push_float_const(1.0, ops.kind);
        self.emit(IrOpcode::StoreLocal, u64::from(sin_sign));
        self.push_float_const(1.0, ops.kind);
        self.emit(IrOpcode::StoreLocal, u64::from(cos_sign));

        self.emit(IrOpcode::LoadLocal, u64::from(x));
        self.push_float_const(HALF_PI, ops.kind);
        self.emit(ops.cmp_gt, 0);
        let jump_not_upper = self.emit_jump(IrOpcode::JumpIfZero);
        self.push_float_const(PI, ops.kind);
        self.emit(IrOpcode::LoadLocal, u64::from(x));
        self.emit(ops.sub, 0);
        self.emit(IrOpcode::StoreLocal, u64::from(x));
        self.push_float_const(-1.0, ops.kind);
        self.emit(IrOpcode::StoreLocal, u64::from(cos_sign));
        self.patch_jump(jump_not_upper);

        self.emit(IrOpcode::LoadLocal, u64::from(x));
        self.push_float_const(-HALF_PI, ops.kind);
        self.emit(ops.cmp_lt, 0);
        let jump_not_lower = self.emit_jump(IrOpcode::JumpIfZero);
        self.emit(IrOpcode::LoadLocal, u64::from(x));
        self.push_float_const(PI, ops.kind);
        self.emit(ops.add, 0);
        self.emit(IrOpcode::StoreLocal, u64::from(x));
        self.push_float_const(-1.0, ops.kind);
        self.emit(IrOpcode::StoreLocal, u64::from(sin_sign));
        self.push_float_const(-1.0, ops.kind);
        self.emit(IrOpcode::StoreLocal, u64::from(cos_sign));
        self.patch_jump(jump_not_lower);

        (sin_sign, cos_sign)
    }

    /// sin(x) ≈ (x - x³/6 + x⁵/120 - x⁷/5040) * sign
    fn emit_sin_series(&mut self, x: u32, x2: u32, sign: u32, ops: FloatOps) {
        let x3 = self.alloc_temp_local();
        let x5 = self.alloc_temp_local();
        let x7 = self.alloc_temp_local();
        self.emit_mul_locals(x2, x, x3, ops);
        self.emit_mul_locals(x3, x2, x5, ops);
        self.emit_mul_locals(x5, x2, x7, ops);

        self.emit(IrOpcode::LoadLocal, u64::from(x));
        self.emit(IrOpcode::LoadLocal, u64::from(x3));
        self.push_float_const(6.0, ops.kind);
        self.emit(ops.div, 0);
        self.emit(ops.sub, 0);
        self.emit(IrOpcode::LoadLocal, u64::from(x5));
        self.push_float_const(120.0, ops.kind);
        self.emit(ops.div, 0);
        self.emit(ops.add, 0);
        self.emit(IrOpcode::LoadLocal, u64::from(x7));
        self.push_float_const(5040.0, ops.kind);
        self.emit(ops.div, 0);
        self.emit(ops.sub, 0);
        self.emit(IrOpcode::LoadLocal, u64::from(sign));
        self.emit(ops.mul, 0);
    }

    /// cos(x) ≈ (1 - x²/2 + x⁴/24 - x⁶/720) * sign
    fn emit_cos_series(&mut self, x2: u32, sign: u32, ops: FloatOps) {
        let x4 = self.alloc_temp_local();
        let x6 = self.alloc_temp_local();
        self.emit_mul_locals(x2, x2, x4, ops);
        self.emit_mul_locals(x4, x2, x6, ops);

        self.push_float_const(1.0, ops.kind);
        self.emit(IrOpcode::LoadLocal, u64::from(x2));
        self.push_float_const(2.0, ops.kind);
        self.emit(ops.div, 0);
        self.emit(ops.sub, 0);
        self.emit(IrOpcode::LoadLocal, u64::from(x4));
        self.push_float_const(24.0, ops.kind);
        self.emit(ops.div, 0);
        self.emit(ops.add, 0);
        self.emit(IrOpcode::LoadLocal, u64::from(x6));
        self.push_float_const(720.0, ops.kind);
        self.emit(ops.div, 0);
        self.emit(ops.sub, 0);
        self.emit(IrOpcode::LoadLocal, u64::from(sign));
        self.emit(ops.mul, 0);
    }

    pub(crate) fn emit_mul_locals(&mut self, left: u32, right: u32, out: u32, ops: FloatOps) {
        self.emit(IrOpcode::LoadLocal, u64::from(left));
        self.emit(IrOpcode::LoadLocal, u64::from(right));
        self.emit(ops.mul, 0);
        self.emit(IrOpcode::StoreLocal, u64::from(out));
    }

    /// atan series over the local `z`: z - z³/3 + z⁵/5.
    pub(crate) fn emit_atan_series(&mut self, z: u32, ops: FloatOps) {
        let z2 = self.alloc_temp_local();
        let z3 = self.alloc_temp_local();
        let z5 = self.alloc_temp_local();
        self.emit_mul_locals(z, z, z2, ops);
        self.emit_mul_locals(z2, z, z3, ops);
        self.emit_mul_locals(z3, z2, z5, ops);

        self.emit(IrOpcode::LoadLocal, u64::from(z));
        self.emit(IrOpcode::LoadLocal, u64::from(z3));
        self.push_float_const(3.0, ops.kind);
        self.emit(ops.div, 0);
        self.emit(ops.sub, 0);
        self.emit(IrOpcode::LoadLocal, u64::from(z5));
        self.push_float_const(5.0, ops.kind);
        self.emit(ops.div, 0);
        self.emit(ops.add, 0);
    }

    pub(crate) fn emit_arc_trig(&mut self, expr: &Expr, locals: &LocalMap) -> Result<(), String> {
        let ops = self.float_ops_for(expr, locals)?;
        let x = self.alloc_temp_local();
        self.emit_expr(&expr.args[0], locals)?;
        self.emit(IrOpcode::StoreLocal, u64::from(x));

        match expr.name.as_str() {
            "atan" => {
                self.emit_atan_series(x, ops);
            }
            name => {
                // asin(x) = atan(x / sqrt(1 - x²)); acos(x) = π/2 - asin.
                let square = self.alloc_temp_local();
                self.push_float_const(1.0, ops.kind);
                self.emit(IrOpcode::LoadLocal, u64::from(x));
                self.emit(IrOpcode::LoadLocal, u64::from(x));
                self.emit(ops.mul, 0);
                self.emit(ops.sub, 0);
                self.emit(IrOpcode::StoreLocal, u64::from(square));

                let root = self.alloc_temp_local();
                self.emit_newton_sqrt(square, ops);
                self.emit(IrOpcode::StoreLocal, u64::from(root));

                let z = self.alloc_temp_local();
                self.emit(IrOpcode::LoadLocal, u64::from(x));
                self.emit(IrOpcode::LoadLocal, u64::from(root));
                self.emit(ops.div, 0);
                self.emit(IrOpcode::StoreLocal, u64::from(z));

                if name == "asin" {
                    self.emit_atan_series(z, ops);
                } else {
                    let asin_out = self.alloc_temp_local();
                    self.emit_atan_series(z, ops);
                    self.emit(IrOpcode::StoreLocal, u64::from(asin_out));
                    self.push_float_const(HALF_PI, ops.kind);
                    self.emit(IrOpcode::LoadLocal, u64::from(asin_out));
                    self.emit(ops.sub, 0);
                }
            }
        }
        Ok(())
    }

    /// atan2(y, x) with axis cases and quadrant adjustment.
    pub(crate) fn emit_atan2(&mut self, expr: &Expr, locals: &LocalMap) -> Result<(), String> {
        let ops = self.float_ops_for(expr, locals)?;
        let y = self.alloc_temp_local();
        let x = self.alloc_temp_local();
        let out = self.alloc_temp_local();
        self.emit_expr(&expr.args[0], locals)?;
        self.emit(IrOpcode::StoreLocal, u64::from(y));
        self.emit_expr(&expr.args[1], locals)?;
        self.emit(IrOpcode::StoreLocal, u64::from(x));

        // x == 0: ±π/2 by the sign of y, 0 when both are zero.
        self.emit(IrOpcode::LoadLocal, u64::from(x));
        self.push_float_const(0.0, ops.kind);
        self.emit(ops.cmp_eq, 0);
        let jump_x_nonzero = self.emit_jump(IrOpcode::JumpIfZero);

        self.emit(IrOpcode::LoadLocal, u64::from(y));
        self.push_float_const(0.0, ops.kind);
        self.emit(ops.cmp_eq, 0);
        let jump_y_nonzero = self.emit_jump(IrOpcode::JumpIfZero);
        self.push_float_const(0.0, ops.kind);
        self.emit(IrOpcode::StoreLocal, u64::from(out));
        let jump_axis_zero = self.emit_jump(IrOpcode::Jump);

        self.patch_jump(jump_y_nonzero);
        self.emit(IrOpcode::LoadLocal, u64::from(y));
        self.push_float_const(0.0, ops.kind);
        self.emit(ops.cmp_lt, 0);
        let jump_y_positive = self.emit_jump(IrOpcode::JumpIfZero);
        self.push_float_const(-HALF_PI, ops.kind);
        self.emit(IrOpcode::StoreLocal, u64::from(out));
        let jump_axis_negative = self.emit_jump(IrOpcode::Jump);
        self.patch_jump(jump_y_positive);
        self.push_float_const(HALF_PI, ops.kind);
        self.emit(IrOpcode::StoreLocal, u64::from(out));
        let jump_axis_positive = self.emit_jump(IrOpcode::Jump);

        self.patch_jump(jump_x_nonzero);

        // atan(y / x) plus the quadrant adjustment for x < 0.
        let z = self.alloc_temp_local();
        self.emit(IrOpcode::LoadLocal, u64::from(y));
        self.emit(IrOpcode::LoadLocal, u64::from(x));
        self.emit(ops.div, 0);
        self.emit(IrOpcode::StoreLocal, u64::from(z));
        self.emit_atan_series(z, ops);
        self.emit(IrOpcode::StoreLocal, u64::from(out));

        self.emit(IrOpcode::LoadLocal, u64::from(x));
        self.push_float_const(0.0, ops.kind);
        self.emit(ops.cmp_lt, 0);
        let jump_x_positive = self.emit_jump(IrOpcode::JumpIfZero);

        self.emit(IrOpcode::LoadLocal, u64::from(y));
        self.push_float_const(0.0, ops.kind);
        self.emit(ops.cmp_lt, 0);
        let jump_adjust_up = self.emit_jump(IrOpcode::JumpIfZero);
        self.emit(IrOpcode::LoadLocal, u64::from(out));
        self.push_float_const(-PI, ops.kind);
        self.emit(ops.add, 0);
        self.emit(IrOpcode::StoreLocal, u64::from(out));
        let jump_adjusted = self.emit_jump(IrOpcode::Jump);
        self.patch_jump(jump_adjust_up);
        self.emit(IrOpcode::LoadLocal, u64::from(out));
        self.push_float_const(PI, ops.kind);
        self.emit(ops.add, 0);
        self.emit(IrOpcode::StoreLocal, u64::from(out));
        self.patch_jump(jump_adjusted);
        self.patch_jump(jump_x_positive);

        self.patch_jump(jump_axis_zero);
        self.patch_jump(jump_axis_negative);
        self.patch_jump(jump_axis_positive);
        self.emit(IrOpcode::LoadLocal, u64::from(out));
        Ok(())
    }

    pub(crate) fn emit_hyperbolic(
        &mut self,
        expr: &Expr,
        locals: &LocalMap,
    ) -> Result<(), String> {
        let ops = self.float_ops_for(expr, locals)?;
        let x = self.alloc_temp_local();
        self.emit_expr(&expr.args[0], locals)?;
        self.emit(IrOpcode::StoreLocal, u64::from(x));

        let exp_pos = self.alloc_temp_local();
        let exp_neg = self.alloc_temp_local();
        let neg_x = self.alloc_temp_local();
        self.emit_exp_series(x, ops);
        self.emit(IrOpcode::StoreLocal, u64::from(exp_pos));
        self.emit(IrOpcode::LoadLocal, u64::from(x));
        self.emit(ops.neg, 0);
        self.emit(IrOpcode::StoreLocal, u64::from(neg_x));
        self.emit_exp_series(neg_x, ops);
        self.emit(IrOpcode::StoreLocal, u64::from(exp_neg));

        match expr.name.as_str() {
            "sinh" => {
                self.emit(IrOpcode::LoadLocal, u64::from(exp_pos));
                self.emit(IrOpcode::LoadLocal, u64::from(exp_neg));
                self.emit(ops.sub, 0);
                self.push_float_const(2.0, ops.kind);
                self.emit(ops.div, 0);
            }
            "cosh" => {
                self.emit(IrOpcode::LoadLocal, u64::from(exp_pos));
                self.emit(IrOpcode::LoadLocal, u64::from(exp_neg));
                self.emit(ops.add, 0);
                self.push_float_const(2.0, ops.kind);
                self.emit(ops.div, 0);
            }
            _ => {
                // tanh = (e^x - e^-x) / (e^x + e^-x)
                self.emit(IrOpcode::LoadLocal, u64::from(exp_pos));
                self.emit(IrOpcode::LoadLocal, u64::from(exp_neg));
                self.emit(ops.sub, 0);
                self.emit(IrOpcode::LoadLocal, u64::from(exp_pos));
                self.emit(IrOpcode::LoadLocal, u64::from(exp_neg));
                self.emit(ops.add, 0);
                self.emit(ops.div, 0);
            }
        }
        Ok(())
    }

    pub(crate) fn emit_arc_hyperbolic(
        &mut self,
        expr: &Expr,
        locals: &LocalMap,
    ) -> Result<(), String> {
        let ops = self.float_ops_for(expr, locals)?;
        let x = self.alloc_temp_local();
        self.emit_expr(&expr.args[0], locals)?;
        self.emit(IrOpcode::StoreLocal, u64::from(x));

        match expr.name.as_str() {
            "atanh" => {
                // atanh(x) = ln((1 + x) / (1 - x)) / 2
                let ratio = self.alloc_temp_local();
                self.push_float_const(1.0, ops.kind);
                self.emit(IrOpcode::LoadLocal, u64::from(x));
                self.emit(ops.add, 0);
                self.push_float_const(1.0, ops.kind);
                self.emit(IrOpcode::LoadLocal, u64::from(x));
                self.emit(ops.sub, 0);
                self.emit(ops.div, 0);
                self.emit(IrOpcode::StoreLocal, u64::from(ratio));
                self.emit_ln_series(ratio, ops);
                self.push_float_const(2.0, ops.kind);
                self.emit(ops.div, 0);
            }
            name => {
                // asinh(x) = ln(x + sqrt(x² + 1)); acosh uses x² - 1.
                let square = self.alloc_temp_local();
                self.emit(IrOpcode::LoadLocal, u64::from(x));
                self.emit(IrOpcode::LoadLocal, u64::from(x));
                self.emit(ops.mul, 0);
                if name == "asinh" {
                    self.push_float_const(1.0, ops.kind);
                    self.emit(ops.add, 0);
                } else {
                    self.push_float_const(1.0, ops.kind);
                    self.emit(ops.sub, 0);
                }
                self.emit(IrOpcode::StoreLocal, u64::from(square));

                let sum = self.alloc_temp_local();
                self.emit(IrOpcode::LoadLocal, u64::from(x));
                self.emit_newton_sqrt(square, ops);
                self.emit(ops.add, 0);
                self.emit(IrOpcode::StoreLocal, u64::from(sum));
                self.emit_ln_series(sum, ops);
            }
        }
        Ok(())
    }
}
