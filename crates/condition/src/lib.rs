//! Condition evaluation (§4.5).
//!
//! A task's `when` field carries either a structured [`ConditionNode`] tree
//! or a string DSL that parses into the same tree, so both forms share one
//! evaluator. No regex: patterns support a single trailing `*` glob and
//! nothing richer.

mod eval;
mod glob;
mod parser;

pub use eval::evaluate;
pub use glob::glob_match;
pub use parser::parse_expr;

use sykli_core::ir::{Condition, ConditionNode, RunContext};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConditionError {
    #[error("failed to parse condition expression '{expr}': {reason}")]
    Parse { expr: String, reason: String },
}

/// Evaluate a task's `when` condition against a run context, parsing the
/// string DSL into a tree first if needed.
///
/// # Errors
/// Returns `ConditionError::Parse` if the string form doesn't match the
/// grammar in §4.5.
pub fn evaluate_condition(condition: &Condition, ctx: &RunContext) -> Result<bool, ConditionError> {
    match condition {
        Condition::Tree(node) => Ok(evaluate(node, ctx)),
        Condition::Expr(expr) => {
            let node = parse_expr(expr)?;
            Ok(evaluate(&node, ctx))
        }
    }
}

/// A `when` that is absent is always permitted (§4.4 pass 6).
#[must_use]
pub fn evaluate_optional(condition: Option<&Condition>, ctx: &RunContext) -> Result<bool, ConditionError> {
    match condition {
        None => Ok(true),
        Some(c) => evaluate_condition(c, ctx),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sykli_core::ir::FieldOp;

    fn ctx() -> RunContext {
        RunContext {
            branch: Some("main".into()),
            tag: None,
            event: Some("push".into()),
            in_ci: true,
            matrix_values: Default::default(),
            fields: Default::default(),
        }
    }

    #[test]
    fn tree_field_eq() {
        let node = ConditionNode::Field {
            name: "branch".into(),
            op: FieldOp::Eq,
            value: "main".into(),
        };
        assert!(evaluate(&node, &ctx()));
    }

    #[test]
    fn expr_branch_shorthand() {
        let c = Condition::Expr("branch:main".into());
        assert!(evaluate_condition(&c, &ctx()).unwrap());
    }

    #[test]
    fn expr_and_or_left_to_right() {
        let c = Condition::Expr("branch:main && event == 'push' || event == 'pull_request'".into());
        assert!(evaluate_condition(&c, &ctx()).unwrap());
    }

    #[test]
    fn expr_not_binds_tightest() {
        let c = Condition::Expr("!event == 'pull_request'".into());
        assert!(evaluate_condition(&c, &ctx()).unwrap());
    }

    #[test]
    fn absent_condition_permits() {
        assert!(evaluate_optional(None, &ctx()).unwrap());
    }

    #[test]
    fn unparseable_expr_errors() {
        let c = Condition::Expr("this is not valid &&&".into());
        assert!(evaluate_condition(&c, &ctx()).is_err());
    }
}
