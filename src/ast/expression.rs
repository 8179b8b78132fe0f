//! Expression AST nodes for WebQL.
//!
//! Expressions form the computational backbone of WebQL queries: field
//! projections, WHERE predicates, NAVIGATE targets, loop collections, and
//! SET values are all expressions.

use crate::ast::Span;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::fmt;

/// The data types known to the WebQL type system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    String,
    Number,
    Boolean,
    Null,
    Url,
    Array,
    Object,
    Bytes,
    Duration,
    Document,
    Unknown,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::String => "STRING",
            DataType::Number => "NUMBER",
            DataType::Boolean => "BOOLEAN",
            DataType::Null => "NULL",
            DataType::Url => "URL",
            DataType::Array => "ARRAY",
            DataType::Object => "OBJECT",
            DataType::Bytes => "BYTES",
            DataType::Duration => "DURATION",
            DataType::Document => "DOCUMENT",
            DataType::Unknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}

/// Literal value types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    /// String literal (single or double quoted in source).
    String(SmolStr),
    /// Numeric literal.
    Number(f64),
    /// Boolean literal.
    Boolean(bool),
    /// NULL literal.
    Null,
    /// Duration literal, normalized to milliseconds.
    Duration(f64),
    /// Byte-size literal, normalized to bytes.
    Bytes(u64),
}

impl Literal {
    /// Returns the data type of this literal.
    pub fn data_type(&self) -> DataType {
        match self {
            Literal::String(_) => DataType::String,
            Literal::Number(_) => DataType::Number,
            Literal::Boolean(_) => DataType::Boolean,
            Literal::Null => DataType::Null,
            Literal::Duration(_) => DataType::Duration,
            Literal::Bytes(_) => DataType::Bytes,
        }
    }
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOperator {
    Eq,
    NotEq,
    Gt,
    GtEq,
    Lt,
    LtEq,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    In,
    NotIn,
    Like,
    NotLike,
    Matches,
    Contains,
    Concat,
}

impl BinaryOperator {
    /// Returns true for operators that produce a boolean result.
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOperator::Eq
                | BinaryOperator::NotEq
                | BinaryOperator::Gt
                | BinaryOperator::GtEq
                | BinaryOperator::Lt
                | BinaryOperator::LtEq
                | BinaryOperator::In
                | BinaryOperator::NotIn
                | BinaryOperator::Like
                | BinaryOperator::NotLike
                | BinaryOperator::Matches
                | BinaryOperator::Contains
        )
    }

    /// Returns true for AND/OR.
    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOperator::And | BinaryOperator::Or)
    }

    /// Returns true for arithmetic operators.
    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            BinaryOperator::Add
                | BinaryOperator::Sub
                | BinaryOperator::Mul
                | BinaryOperator::Div
                | BinaryOperator::Mod
        )
    }
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            BinaryOperator::Eq => "=",
            BinaryOperator::NotEq => "!=",
            BinaryOperator::Gt => ">",
            BinaryOperator::GtEq => ">=",
            BinaryOperator::Lt => "<",
            BinaryOperator::LtEq => "<=",
            BinaryOperator::Add => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::Div => "/",
            BinaryOperator::Mod => "%",
            BinaryOperator::And => "AND",
            BinaryOperator::Or => "OR",
            BinaryOperator::In => "IN",
            BinaryOperator::NotIn => "NOT IN",
            BinaryOperator::Like => "LIKE",
            BinaryOperator::NotLike => "NOT LIKE",
            BinaryOperator::Matches => "MATCHES",
            BinaryOperator::Contains => "CONTAINS",
            BinaryOperator::Concat => "||",
        };
        f.write_str(symbol)
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOperator {
    Not,
    Neg,
    Pos,
}

impl fmt::Display for UnaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnaryOperator::Not => f.write_str("NOT"),
            UnaryOperator::Neg => f.write_str("-"),
            UnaryOperator::Pos => f.write_str("+"),
        }
    }
}

/// Property access in a member expression: either a static name
/// (`obj.field`) or a computed index (`obj[expr]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MemberProperty {
    Static(SmolStr),
    Computed(Box<Expression>),
}

/// A key/value pair in an object literal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectProperty {
    pub key: SmolStr,
    pub value: Expression,
    pub span: Span,
}

/// Represents any expression in WebQL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    /// Literal value.
    Literal(Literal, Span),

    /// Identifier reference (variable, field, or DOM-resolved name).
    Identifier(SmolStr, Span),

    /// Binary expression.
    Binary(BinaryOperator, Box<Expression>, Box<Expression>, Span),

    /// Unary prefix expression.
    Unary(UnaryOperator, Box<Expression>, Span),

    /// Function call: callee name and arguments.
    Call(SmolStr, Vec<Expression>, Span),

    /// Member access: object, property, computed flag implied by variant.
    Member(Box<Expression>, MemberProperty, Span),

    /// Array literal.
    Array(Vec<Expression>, Span),

    /// Object literal.
    Object(Vec<ObjectProperty>, Span),
}

impl Expression {
    /// Returns the span of this expression.
    pub fn span(&self) -> Span {
        match self {
            Expression::Literal(_, span) => span.clone(),
            Expression::Identifier(_, span) => span.clone(),
            Expression::Binary(_, _, _, span) => span.clone(),
            Expression::Unary(_, _, span) => span.clone(),
            Expression::Call(_, _, span) => span.clone(),
            Expression::Member(_, _, span) => span.clone(),
            Expression::Array(_, span) => span.clone(),
            Expression::Object(_, span) => span.clone(),
        }
    }

    /// Returns true when this expression is a literal.
    pub fn is_literal(&self) -> bool {
        matches!(self, Expression::Literal(_, _))
    }

    /// Returns the literal payload when this is a literal expression.
    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Expression::Literal(lit, _) => Some(lit),
            _ => None,
        }
    }

    /// Returns the identifier name when this is an identifier expression.
    pub fn as_identifier(&self) -> Option<&SmolStr> {
        match self {
            Expression::Identifier(name, _) => Some(name),
            _ => None,
        }
    }

    /// Collects every identifier name referenced in this expression,
    /// including member-expression roots.
    pub fn collect_identifiers(&self, out: &mut Vec<SmolStr>) {
        match self {
            Expression::Literal(_, _) => {}
            Expression::Identifier(name, _) => out.push(name.clone()),
            Expression::Binary(_, left, right, _) => {
                left.collect_identifiers(out);
                right.collect_identifiers(out);
            }
            Expression::Unary(_, operand, _) => operand.collect_identifiers(out),
            Expression::Call(_, args, _) => {
                for arg in args {
                    arg.collect_identifiers(out);
                }
            }
            Expression::Member(object, property, _) => {
                object.collect_identifiers(out);
                if let MemberProperty::Computed(index) = property {
                    index.collect_identifiers(out);
                }
            }
            Expression::Array(elements, _) => {
                for element in elements {
                    element.collect_identifiers(out);
                }
            }
            Expression::Object(properties, _) => {
                for property in properties {
                    property.value.collect_identifiers(out);
                }
            }
        }
    }

    /// Returns true when any sub-expression calls one of the named functions
    /// (case-insensitive).
    pub fn calls_any(&self, names: &[&str]) -> bool {
        match self {
            Expression::Literal(_, _) | Expression::Identifier(_, _) => false,
            Expression::Binary(_, left, right, _) => {
                left.calls_any(names) || right.calls_any(names)
            }
            Expression::Unary(_, operand, _) => operand.calls_any(names),
            Expression::Call(callee, args, _) => {
                names.iter().any(|n| callee.eq_ignore_ascii_case(n))
                    || args.iter().any(|arg| arg.calls_any(names))
            }
            Expression::Member(object, property, _) => {
                object.calls_any(names)
                    || matches!(property, MemberProperty::Computed(index) if index.calls_any(names))
            }
            Expression::Array(elements, _) => elements.iter().any(|e| e.calls_any(names)),
            Expression::Object(properties, _) => {
                properties.iter().any(|p| p.value.calls_any(names))
            }
        }
    }
}
