//! Boolean-expression compiler used by the `if` tag
//!
//! Operator precedence, lowest first: `||`, `&&`, equality, relational,
//! unary `!`. Parsed with explicit operator and operand stacks. The
//! resulting tree is at most `max_nesting` operators deep.

use std::collections::HashMap;

use super::expr::{compile_chain, skip_whitespace, BinaryOp, CompileError, Expression, UnaryOp};
use crate::filters::Filter;

type CompileResult<T> = std::result::Result<T, CompileError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Binary(BinaryOp),
    Not,
    Open,
}

impl Operator {
    fn precedence(self) -> u8 {
        match self {
            Operator::Binary(BinaryOp::Or) => 0,
            Operator::Binary(BinaryOp::And) => 1,
            Operator::Binary(
                BinaryOp::Eq | BinaryOp::NotEq | BinaryOp::StrictEq | BinaryOp::StrictNotEq,
            ) => 2,
            Operator::Binary(_) => 3,
            Operator::Not => 4,
            Operator::Open => 0,
        }
    }
}

/// Symbols in match order (longest first)
const SYMBOLS: [(&str, Symbol); 13] = [
    ("===", Symbol::Op(BinaryOp::StrictEq)),
    ("!==", Symbol::Op(BinaryOp::StrictNotEq)),
    ("==", Symbol::Op(BinaryOp::Eq)),
    ("!=", Symbol::Op(BinaryOp::NotEq)),
    ("<=", Symbol::Op(BinaryOp::Le)),
    (">=", Symbol::Op(BinaryOp::Ge)),
    ("&&", Symbol::Op(BinaryOp::And)),
    ("||", Symbol::Op(BinaryOp::Or)),
    ("<", Symbol::Op(BinaryOp::Lt)),
    (">", Symbol::Op(BinaryOp::Gt)),
    ("!", Symbol::Not),
    ("(", Symbol::Open),
    (")", Symbol::Close),
];

#[derive(Debug, Clone, Copy)]
enum Symbol {
    Op(BinaryOp),
    Not,
    Open,
    Close,
}

/// Compile an `if` condition
pub fn compile(
    text: &str,
    filters: &HashMap<String, Filter>,
    max_nesting: usize,
) -> CompileResult<Expression> {
    let mut operands: Vec<Operand> = Vec::new();
    let mut operators: Vec<(Operator, usize)> = Vec::new();
    let mut expect_operand = true;
    let mut pos = skip_whitespace(text, 0);

    while pos < text.len() {
        let rest = &text[pos..];
        let symbol = SYMBOLS.iter().find(|(s, _)| rest.starts_with(s));

        match symbol {
            Some((s, Symbol::Op(op))) => {
                if expect_operand {
                    return Err(CompileError::new(pos, format!("Expected a value, found '{}'", s)));
                }
                let op = Operator::Binary(*op);
                while let Some(&(top, at)) = operators.last() {
                    if top == Operator::Open || top.precedence() < op.precedence() {
                        break;
                    }
                    operators.pop();
                    reduce(top, at, &mut operands, max_nesting)?;
                }
                operators.push((op, pos));
                expect_operand = true;
                pos += s.len();
            }
            Some((s, Symbol::Not)) => {
                if !expect_operand {
                    return Err(CompileError::new(pos, format!("Expected an operator, found '{}'", s)));
                }
                operators.push((Operator::Not, pos));
                pos += s.len();
            }
            Some((s, Symbol::Open)) => {
                if !expect_operand {
                    return Err(CompileError::new(pos, format!("Expected an operator, found '{}'", s)));
                }
                operators.push((Operator::Open, pos));
                pos += s.len();
            }
            Some((s, Symbol::Close)) => {
                if expect_operand {
                    return Err(CompileError::new(pos, format!("Expected a value, found '{}'", s)));
                }
                loop {
                    match operators.pop() {
                        Some((Operator::Open, _)) => break,
                        Some((op, at)) => reduce(op, at, &mut operands, max_nesting)?,
                        None => return Err(CompileError::new(pos, "Unmatched ')'")),
                    }
                }
                pos += s.len();
            }
            None => {
                if !expect_operand {
                    return Err(CompileError::new(
                        pos,
                        format!("Expected an operator, found '{}'", rest),
                    ));
                }
                let (operand, end) = compile_chain(text, pos, filters, max_nesting)?;
                operands.push((operand, 0));
                expect_operand = false;
                pos = end;
            }
        }
        pos = skip_whitespace(text, pos);
    }

    if expect_operand {
        return Err(CompileError::new(text.len(), "Unexpected end of condition"));
    }
    while let Some((op, at)) = operators.pop() {
        if op == Operator::Open {
            return Err(CompileError::new(at, "Unclosed '('"));
        }
        reduce(op, at, &mut operands, max_nesting)?;
    }

    match (operands.pop(), operands.is_empty()) {
        (Some((expr, _)), true) => Ok(expr),
        _ => Err(CompileError::new(0, "Malformed condition")),
    }
}

/// A compiled operand and the number of operators above its deepest leaf
type Operand = (Expression, usize);

/// Pop the operands an operator needs and push the combined node. The
/// operand/operator alternation checked by `compile` guarantees they exist.
fn reduce(
    op: Operator,
    at: usize,
    operands: &mut Vec<Operand>,
    max_nesting: usize,
) -> CompileResult<()> {
    let (expr, depth) = match op {
        Operator::Not => match operands.pop() {
            Some((operand, depth)) => (
                Expression::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                },
                depth + 1,
            ),
            None => return Ok(()),
        },
        Operator::Binary(op) => match (operands.pop(), operands.pop()) {
            (Some((rhs, r)), Some((lhs, l))) => (
                Expression::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                l.max(r) + 1,
            ),
            _ => return Ok(()),
        },
        Operator::Open => return Ok(()),
    };
    if depth > max_nesting {
        return Err(CompileError::new(
            at,
            format!("Condition nested deeper than {}", max_nesting),
        ));
    }
    operands.push((expr, depth));
    Ok(())
}
