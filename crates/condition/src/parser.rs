//! Parses the string DSL from §4.5:
//!
//! ```text
//! expr := term (('&&'|'||') term)*
//! term := ident op literal | 'branch:' ident | '!' term
//! op   := '==' | '!='
//! ```
//!
//! No operator precedence beyond `!` binding to its immediate term;
//! `&&`/`||` are evaluated strictly left to right as encountered.

use sykli_core::ir::{ConditionNode, FieldOp};

use crate::ConditionError;

#[derive(Clone, Copy)]
enum Joiner {
    And,
    Or,
}

/// Parse a condition expression string into a [`ConditionNode`] tree.
///
/// # Errors
/// Returns `ConditionError::Parse` if the string doesn't match the grammar.
pub fn parse_expr(expr: &str) -> Result<ConditionNode, ConditionError> {
    let parts = split_top_level(expr)?;
    let mut parts = parts.into_iter();
    let (_, first_term) = parts.next().ok_or_else(|| err(expr, "empty expression"))?;
    let mut node = parse_term(expr, &first_term)?;
    for (joiner_before, term) in parts {
        let rhs = parse_term(expr, &term)?;
        node = match joiner_before {
            Joiner::And => ConditionNode::And { terms: vec![node, rhs] },
            Joiner::Or => ConditionNode::Or { terms: vec![node, rhs] },
        };
    }
    Ok(node)
}

/// Splits on top-level `&&`/`||`, returning each term alongside the joiner
/// that precedes it (the first term's joiner is never read).
fn split_top_level(expr: &str) -> Result<Vec<(Joiner, String)>, ConditionError> {
    let mut parts = Vec::new();
    let mut rest = expr;
    let mut pending_joiner = Joiner::And;
    loop {
        let and_pos = rest.find("&&");
        let or_pos = rest.find("||");
        let next = match (and_pos, or_pos) {
            (Some(a), Some(o)) if a < o => Some((a, Joiner::And)),
            (Some(_), Some(o)) => Some((o, Joiner::Or)),
            (Some(a), None) => Some((a, Joiner::And)),
            (None, Some(o)) => Some((o, Joiner::Or)),
            (None, None) => None,
        };
        match next {
            Some((pos, joiner)) => {
                let (term, remainder) = rest.split_at(pos);
                let remainder = &remainder[2..];
                parts.push((pending_joiner, term.trim().to_string()));
                pending_joiner = joiner;
                rest = remainder;
            }
            None => {
                parts.push((pending_joiner, rest.trim().to_string()));
                break;
            }
        }
    }
    if parts.iter().any(|(_, t)| t.is_empty()) {
        return Err(err(expr, "empty term between operators"));
    }
    Ok(parts)
}

fn parse_term(full_expr: &str, term: &str) -> Result<ConditionNode, ConditionError> {
    let term = term.trim();
    if let Some(rest) = term.strip_prefix('!') {
        let inner = parse_term(full_expr, rest)?;
        return Ok(ConditionNode::Not { term: Box::new(inner) });
    }
    if let Some(ident) = term.strip_prefix("branch:") {
        let ident = ident.trim();
        if ident.is_empty() {
            return Err(err(full_expr, "'branch:' requires a pattern"));
        }
        return Ok(ConditionNode::Branch { pattern: ident.to_string() });
    }

    let (op, op_str, split_at) = if let Some(pos) = term.find("==") {
        (FieldOp::Eq, "==", pos)
    } else if let Some(pos) = term.find("!=") {
        (FieldOp::Ne, "!=", pos)
    } else {
        return Err(err(
            full_expr,
            &format!("term '{term}' is neither 'ident op literal' nor 'branch:ident' nor '!term'"),
        ));
    };

    let ident = term[..split_at].trim();
    let literal = term[split_at + op_str.len()..].trim();
    if ident.is_empty() {
        return Err(err(full_expr, &format!("term '{term}' is missing an identifier")));
    }
    Ok(ConditionNode::Field {
        name: ident.to_string(),
        op,
        value: unquote(literal).to_string(),
    })
}

fn unquote(literal: &str) -> &str {
    let bytes = literal.as_bytes();
    if bytes.len() >= 2 && (bytes[0] == b'\'' || bytes[0] == b'"') && bytes[bytes.len() - 1] == bytes[0] {
        &literal[1..literal.len() - 1]
    } else {
        literal
    }
}

fn err(expr: &str, reason: &str) -> ConditionError {
    ConditionError::Parse {
        expr: expr.to_string(),
        reason: reason.to_string(),
    }
}
