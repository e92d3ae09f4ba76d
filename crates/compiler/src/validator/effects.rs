//! Effect and capability bookkeeping.
//!
//! Effects form an additive monoid per scope: the effective set is the
//! union of the definition's declared set and every `[effects(...)]`
//! transform on enclosing statements. Nothing in the language discharges
//! an effect, so frames only ever add.

use crate::ast::Expr;
use crate::validator::Validator;
use std::collections::HashSet;

impl Validator<'_> {
    /// True when `effect` is granted anywhere on the current stack.
    pub(crate) fn effect_in_scope(&self, effect: &str) -> bool {
        self.effect_stack.iter().any(|frame| frame.contains(effect))
    }

    /// Fail with the canonical wording unless `effect` is in scope.
    pub(crate) fn require_effect(&self, builtin: &str, effect: &str) -> Result<(), String> {
        if self.effect_in_scope(effect) {
            return Ok(());
        }
        Err(format!("{} requires {} effect", builtin, effect))
    }

    /// Effects named by an `[effects(...)]` transform on a statement.
    pub(crate) fn resolve_execution_effects(stmt: &Expr) -> Result<HashSet<String>, String> {
        let mut effects = HashSet::new();
        for transform in &stmt.transforms {
            if transform.name != "effects" {
                continue;
            }
            if !transform.template_args.is_empty() {
                return Err("effects transform does not accept template arguments".to_string());
            }
            for arg in &transform.args {
                if arg.name.is_empty() {
                    return Err("effects transform requires effect names".to_string());
                }
                if arg.name != "none" {
                    effects.insert(arg.name.clone());
                }
            }
        }
        Ok(effects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Program;

    #[test]
    fn test_effect_frames_union() {
        let program = Program::new();
        let mut validator = Validator::new(&program);
        validator.effect_stack.push(HashSet::from(["io_out".to_string()]));
        assert!(validator.effect_in_scope("io_out"));
        assert!(!validator.effect_in_scope("heap_alloc"));

        validator
            .effect_stack
            .push(HashSet::from(["heap_alloc".to_string()]));
        assert!(validator.effect_in_scope("io_out"));
        assert!(validator.effect_in_scope("heap_alloc"));

        validator.effect_stack.pop();
        assert!(!validator.effect_in_scope("heap_alloc"));
    }

    #[test]
    fn test_require_effect_wording() {
        let program = Program::new();
        let validator = Validator::new(&program);
        let err = validator.require_effect("print_line", "io_out").unwrap_err();
        assert_eq!(err, "print_line requires io_out effect");
    }

    #[test]
    fn test_resolve_execution_effects() {
        let mut stmt = Expr::call("print_line", vec![]);
        let effects = Expr::call("effects", vec![Expr::name_ref("io_out"), Expr::name_ref("none")]);
        stmt.transforms.push(effects);
        let resolved = Validator::resolve_execution_effects(&stmt).unwrap();
        assert!(resolved.contains("io_out"));
        assert_eq!(resolved.len(), 1);
    }
}
