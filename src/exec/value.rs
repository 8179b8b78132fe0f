//! Runtime values for WebQL execution.

use crate::ast::expression::{DataType, Literal};
use crate::ast::printer::format_number;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// A runtime value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(SmolStr),
    Array(Vec<Value>),
    Object(BTreeMap<SmolStr, Value>),
    Bytes(Vec<u8>),
    /// Milliseconds.
    Duration(f64),
}

impl Value {
    /// Returns the data type of this value.
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Null => DataType::Null,
            Value::Bool(_) => DataType::Boolean,
            Value::Number(_) => DataType::Number,
            Value::String(_) => DataType::String,
            Value::Array(_) => DataType::Array,
            Value::Object(_) => DataType::Object,
            Value::Bytes(_) => DataType::Bytes,
            Value::Duration(_) => DataType::Duration,
        }
    }

    /// BRANCH truthiness: true, non-zero numbers, non-empty strings, and
    /// non-empty sequences are truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(value) => *value,
            Value::Number(value) => *value != 0.0,
            Value::String(value) => !value.is_empty(),
            Value::Array(values) => !values.is_empty(),
            Value::Object(map) => !map.is_empty(),
            Value::Bytes(bytes) => !bytes.is_empty(),
            Value::Duration(ms) => *ms != 0.0,
        }
    }

    /// FILTER retention: an element is kept when the predicate yields true,
    /// the number 1, or a non-empty string.
    pub fn passes_filter(&self) -> bool {
        match self {
            Value::Bool(value) => *value,
            Value::Number(value) => *value == 1.0,
            Value::String(value) => !value.is_empty(),
            _ => false,
        }
    }

    /// Returns the numeric interpretation of this value, if it has one.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(value) => Some(*value),
            Value::Duration(ms) => Some(*ms),
            Value::Bytes(bytes) => Some(bytes.len() as f64),
            _ => None,
        }
    }

    /// Returns the string slice when this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(value) => Some(value.as_str()),
            _ => None,
        }
    }

    /// Converts a literal into a value.
    pub fn from_literal(literal: &Literal) -> Self {
        match literal {
            Literal::String(value) => Value::String(value.clone()),
            Literal::Number(value) => Value::Number(*value),
            Literal::Boolean(value) => Value::Bool(*value),
            Literal::Null => Value::Null,
            Literal::Duration(ms) => Value::Duration(*ms),
            Literal::Bytes(bytes) => Value::Number(*bytes as f64),
        }
    }

    /// Converts this value back into a literal, when representable.
    pub fn to_literal(&self) -> Option<Literal> {
        match self {
            Value::Null => Some(Literal::Null),
            Value::Bool(value) => Some(Literal::Boolean(*value)),
            Value::Number(value) => Some(Literal::Number(*value)),
            Value::String(value) => Some(Literal::String(value.clone())),
            Value::Duration(ms) => Some(Literal::Duration(*ms)),
            _ => None,
        }
    }

    /// Renders this value as display text (used by `||`, `+` with strings,
    /// and cache keys).
    pub fn render(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(value) => value.to_string(),
            Value::Number(value) => format_number(*value),
            Value::String(value) => value.to_string(),
            Value::Array(values) => {
                let rendered: Vec<String> = values.iter().map(Value::render).collect();
                format!("[{}]", rendered.join(","))
            }
            Value::Object(map) => {
                let rendered: Vec<String> = map
                    .iter()
                    .map(|(key, value)| format!("{key}:{}", value.render()))
                    .collect();
                format!("{{{}}}", rendered.join(","))
            }
            Value::Bytes(bytes) => format!("<{} bytes>", bytes.len()),
            Value::Duration(ms) => format!("{}ms", format_number(*ms)),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Orders two values for SORT: nulls first, then numerics, then strings,
/// then booleans, then everything else by rendered text.
pub fn compare_values(left: &Value, right: &Value) -> Ordering {
    fn rank(value: &Value) -> u8 {
        match value {
            Value::Null => 0,
            Value::Number(_) | Value::Duration(_) => 1,
            Value::String(_) => 2,
            Value::Bool(_) => 3,
            _ => 4,
        }
    }

    let (left_rank, right_rank) = (rank(left), rank(right));
    if left_rank != right_rank {
        return left_rank.cmp(&right_rank);
    }

    match (left, right) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::String(a), Value::String(b)) => a.as_str().cmp(b.as_str()),
        _ => match (left.as_number(), right.as_number()) {
            (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
            _ => left.render().cmp(&right.render()),
        },
    }
}

/// Loose equality used by `=` and `!=`: numerics compare numerically,
/// otherwise values must have the same shape.
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left.as_number(), right.as_number()) {
        (Some(a), Some(b)) => a == b,
        _ => left == right,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness_rules() {
        assert!(Value::Bool(true).is_truthy());
        assert!(Value::Number(2.0).is_truthy());
        assert!(Value::String("x".into()).is_truthy());
        assert!(Value::Array(vec![Value::Null]).is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(!Value::Number(0.0).is_truthy());
        assert!(!Value::String("".into()).is_truthy());
        assert!(!Value::Array(vec![]).is_truthy());
        assert!(!Value::Null.is_truthy());
    }

    #[test]
    fn filter_retention_is_stricter_than_truthiness() {
        // 2 is truthy for BRANCH but not retained by FILTER.
        assert!(!Value::Number(2.0).passes_filter());
        assert!(Value::Number(1.0).passes_filter());
        assert!(Value::Bool(true).passes_filter());
        assert!(Value::String("yes".into()).passes_filter());
        assert!(!Value::Array(vec![Value::Null]).passes_filter());
    }

    #[test]
    fn sort_order_ranks_null_first() {
        let mut values = vec![
            Value::String("b".into()),
            Value::Null,
            Value::Number(3.0),
            Value::Bool(false),
            Value::Number(1.0),
        ];
        values.sort_by(compare_values);
        assert_eq!(
            values,
            vec![
                Value::Null,
                Value::Number(1.0),
                Value::Number(3.0),
                Value::String("b".into()),
                Value::Bool(false),
            ]
        );
    }

    #[test]
    fn loose_numeric_equality() {
        assert!(values_equal(&Value::Number(5000.0), &Value::Duration(5000.0)));
        assert!(!values_equal(&Value::Number(1.0), &Value::String("1".into())));
    }

    #[test]
    fn literal_round_trip() {
        let literal = Literal::Number(4.5);
        let value = Value::from_literal(&literal);
        assert_eq!(value.to_literal(), Some(literal));
    }

    #[test]
    fn render_forms() {
        assert_eq!(Value::Number(5.0).render(), "5");
        assert_eq!(
            Value::Array(vec![Value::Number(1.0), Value::Number(2.0)]).render(),
            "[1,2]"
        );
        assert_eq!(Value::Null.render(), "null");
    }
}
