//! Evaluates a [`ConditionNode`] tree against a [`RunContext`].

use sykli_core::ir::{ConditionNode, FieldOp, RunContext};

use crate::glob::glob_match;

/// Evaluate a condition tree. Unknown field names fall through to
/// `ctx.fields`, matching how the string DSL's generic `ident op literal`
/// term addresses arbitrary run fields alongside the well-known ones.
#[must_use]
pub fn evaluate(node: &ConditionNode, ctx: &RunContext) -> bool {
    match node {
        ConditionNode::Branch { pattern } => ctx.branch.as_deref().is_some_and(|b| glob_match(pattern, b)),
        ConditionNode::Tag { pattern } => ctx.tag.as_deref().is_some_and(|t| glob_match(pattern, t)),
        ConditionNode::HasTag => ctx.tag.is_some(),
        ConditionNode::Event { kind } => ctx.event.as_deref() == Some(kind.as_str()),
        ConditionNode::InCi => ctx.in_ci,
        ConditionNode::Field { name, op, value } => {
            let actual = field_value(name, ctx);
            let eq = actual.is_some_and(|a| glob_match(value, a));
            match op {
                FieldOp::Eq => eq,
                FieldOp::Ne => !eq,
            }
        }
        ConditionNode::And { terms } => terms.iter().fold(true, |acc, term| acc && evaluate(term, ctx)),
        ConditionNode::Or { terms } => terms.iter().fold(false, |acc, term| acc || evaluate(term, ctx)),
        ConditionNode::Not { term } => !evaluate(term, ctx),
    }
}

fn field_value<'a>(name: &str, ctx: &'a RunContext) -> Option<&'a str> {
    match name {
        "branch" => ctx.branch.as_deref(),
        "tag" => ctx.tag.as_deref(),
        "event" => ctx.event.as_deref(),
        "in_ci" => Some(if ctx.in_ci { "true" } else { "false" }),
        _ => ctx
            .matrix_values
            .get(name)
            .or_else(|| ctx.fields.get(name))
            .map(String::as_str),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> RunContext {
        RunContext {
            branch: Some("release-1.2".into()),
            tag: None,
            event: Some("push".into()),
            in_ci: false,
            matrix_values: [("os".to_string(), "linux".to_string())].into(),
            fields: Default::default(),
        }
    }

    #[test]
    fn branch_glob() {
        let node = ConditionNode::Branch { pattern: "release-*".into() };
        assert!(evaluate(&node, &ctx()));
    }

    #[test]
    fn has_tag_false_when_absent() {
        assert!(!evaluate(&ConditionNode::HasTag, &ctx()));
    }

    #[test]
    fn field_falls_through_to_matrix_values() {
        let node = ConditionNode::Field {
            name: "os".into(),
            op: FieldOp::Eq,
            value: "linux".into(),
        };
        assert!(evaluate(&node, &ctx()));
    }

    #[test]
    fn field_ne() {
        let node = ConditionNode::Field {
            name: "event".into(),
            op: FieldOp::Ne,
            value: "pull_request".into(),
        };
        assert!(evaluate(&node, &ctx()));
    }

    #[test]
    fn and_or_not_combinators() {
        let tree = ConditionNode::And {
            terms: vec![
                ConditionNode::Branch { pattern: "release-*".into() },
                ConditionNode::Not {
                    term: Box::new(ConditionNode::InCi),
                },
            ],
        };
        assert!(evaluate(&tree, &ctx()));
    }
}
