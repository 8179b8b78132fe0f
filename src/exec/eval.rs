//! Runtime expression evaluation.
//!
//! Expressions are evaluated against a context of variables and an optional
//! current row. The operator kernel here is also used by the constant
//! folder, so compile-time folding and runtime evaluation agree on every
//! coercion.

use crate::ast::expression::{BinaryOperator, Expression, MemberProperty, UnaryOperator};
use crate::error::{EngineError, EngineResult, ErrorKind};
use crate::exec::context::{RuntimeCache, ScopeStack};
use crate::exec::value::{compare_values, values_equal, Value};
use regex::Regex;
use smol_str::SmolStr;
use std::cmp::Ordering;
use std::time::{SystemTime, UNIX_EPOCH};

/// Evaluation context: variable frames, an optional current row, and the
/// runtime cache for the CACHED builtin.
pub struct EvalContext<'a> {
    pub variables: &'a ScopeStack,
    pub current_row: Option<&'a Value>,
    pub cache: Option<&'a RuntimeCache>,
}

impl<'a> EvalContext<'a> {
    /// Creates a context over variables only.
    pub fn new(variables: &'a ScopeStack) -> Self {
        Self {
            variables,
            current_row: None,
            cache: None,
        }
    }

    /// Creates a context that can also answer CACHED() lookups.
    pub fn with_cache(variables: &'a ScopeStack, cache: &'a RuntimeCache) -> Self {
        Self {
            variables,
            current_row: None,
            cache: Some(cache),
        }
    }

    /// Returns a context with the given current row.
    pub fn with_row(&self, row: &'a Value) -> EvalContext<'a> {
        EvalContext {
            variables: self.variables,
            current_row: Some(row),
            cache: self.cache,
        }
    }
}

/// Evaluates an expression in the given context.
pub fn evaluate(expr: &Expression, ctx: &EvalContext<'_>) -> EngineResult<Value> {
    match expr {
        Expression::Literal(literal, _) => Ok(Value::from_literal(literal)),
        Expression::Identifier(name, _) => lookup_identifier(name, ctx),
        Expression::Binary(op, left, right, _) => {
            let left = evaluate(left, ctx)?;
            let right = evaluate(right, ctx)?;
            apply_binary(*op, &left, &right)
        }
        Expression::Unary(op, operand, _) => {
            let operand = evaluate(operand, ctx)?;
            apply_unary(*op, &operand)
        }
        Expression::Call(callee, args, _) => {
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(evaluate(arg, ctx)?);
            }
            call_builtin(callee, &values, ctx)
        }
        Expression::Member(object, property, _) => {
            let object = evaluate(object, ctx)?;
            match property {
                MemberProperty::Static(name) => member_access(&object, name),
                MemberProperty::Computed(index) => {
                    let index = evaluate(index, ctx)?;
                    match (&object, &index) {
                        (Value::Array(values), Value::Number(n)) => {
                            Ok(values.get(*n as usize).cloned().unwrap_or(Value::Null))
                        }
                        (Value::Object(_), Value::String(key)) => member_access(&object, key),
                        _ => Ok(Value::Null),
                    }
                }
            }
        }
        Expression::Array(elements, _) => {
            let mut values = Vec::with_capacity(elements.len());
            for element in elements {
                values.push(evaluate(element, ctx)?);
            }
            Ok(Value::Array(values))
        }
        Expression::Object(properties, _) => {
            let mut map = std::collections::BTreeMap::new();
            for property in properties {
                map.insert(property.key.clone(), evaluate(&property.value, ctx)?);
            }
            Ok(Value::Object(map))
        }
    }
}

/// Resolves an identifier: the current row is consulted first, then the
/// variable frames.
fn lookup_identifier(name: &str, ctx: &EvalContext<'_>) -> EngineResult<Value> {
    if let Some(Value::Object(row)) = ctx.current_row {
        if let Some(value) = row.get(name) {
            return Ok(value.clone());
        }
    }
    if let Some(value) = ctx.variables.get(name) {
        return Ok(value);
    }
    Err(
        EngineError::execution(format!("undefined variable '{name}'"))
            .with_context("variable", name),
    )
}

fn member_access(object: &Value, name: &str) -> EngineResult<Value> {
    match object {
        Value::Object(map) => Ok(map.get(name).cloned().unwrap_or(Value::Null)),
        Value::Null => Ok(Value::Null),
        other => Err(EngineError::execution(format!(
            "cannot access property '{name}' of {}",
            other.data_type()
        ))),
    }
}

/// Applies a binary operator to two values. Shared by the constant folder.
pub fn apply_binary(op: BinaryOperator, left: &Value, right: &Value) -> EngineResult<Value> {
    match op {
        BinaryOperator::Eq => Ok(Value::Bool(values_equal(left, right))),
        BinaryOperator::NotEq => Ok(Value::Bool(!values_equal(left, right))),
        BinaryOperator::Gt => ordering(op, left, right, |o| o == Ordering::Greater),
        BinaryOperator::GtEq => ordering(op, left, right, |o| o != Ordering::Less),
        BinaryOperator::Lt => ordering(op, left, right, |o| o == Ordering::Less),
        BinaryOperator::LtEq => ordering(op, left, right, |o| o != Ordering::Greater),
        BinaryOperator::Add => match (left, right) {
            (Value::String(a), b) => Ok(Value::String(format!("{a}{}", b.render()).into())),
            (a, Value::String(b)) => Ok(Value::String(format!("{}{b}", a.render()).into())),
            _ => numeric_op(op, left, right, |a, b| Ok(a + b)),
        },
        BinaryOperator::Sub => numeric_op(op, left, right, |a, b| Ok(a - b)),
        BinaryOperator::Mul => numeric_op(op, left, right, |a, b| Ok(a * b)),
        BinaryOperator::Div => numeric_op(op, left, right, |a, b| {
            if b == 0.0 {
                Err(EngineError::execution("division by zero"))
            } else {
                Ok(a / b)
            }
        }),
        BinaryOperator::Mod => numeric_op(op, left, right, |a, b| {
            if b == 0.0 {
                Err(EngineError::execution("modulo by zero"))
            } else {
                Ok(a % b)
            }
        }),
        BinaryOperator::And => match (left, right) {
            (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(*a && *b)),
            _ => Err(type_error(op, left, right)),
        },
        BinaryOperator::Or => match (left, right) {
            (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(*a || *b)),
            _ => Err(type_error(op, left, right)),
        },
        BinaryOperator::In => match right {
            Value::Array(values) => Ok(Value::Bool(values.iter().any(|v| values_equal(v, left)))),
            _ => Err(type_error(op, left, right)),
        },
        BinaryOperator::NotIn => match right {
            Value::Array(values) => Ok(Value::Bool(!values.iter().any(|v| values_equal(v, left)))),
            _ => Err(type_error(op, left, right)),
        },
        BinaryOperator::Like => like_match(left, right).map(Value::Bool),
        BinaryOperator::NotLike => like_match(left, right).map(|hit| Value::Bool(!hit)),
        BinaryOperator::Matches => match (left, right) {
            (Value::String(text), Value::String(pattern)) => {
                let regex = Regex::new(pattern).map_err(|err| {
                    EngineError::execution(format!("invalid regular expression: {err}"))
                })?;
                Ok(Value::Bool(regex.is_match(text)))
            }
            _ => Err(type_error(op, left, right)),
        },
        BinaryOperator::Contains => match (left, right) {
            (Value::String(haystack), Value::String(needle)) => {
                Ok(Value::Bool(haystack.contains(needle.as_str())))
            }
            (Value::Array(values), needle) => {
                Ok(Value::Bool(values.iter().any(|v| values_equal(v, needle))))
            }
            _ => Err(type_error(op, left, right)),
        },
        BinaryOperator::Concat => Ok(Value::String(
            format!("{}{}", left.render(), right.render()).into(),
        )),
    }
}

/// Applies a unary operator to a value. Shared by the constant folder.
pub fn apply_unary(op: UnaryOperator, operand: &Value) -> EngineResult<Value> {
    match op {
        UnaryOperator::Not => match operand {
            Value::Bool(value) => Ok(Value::Bool(!value)),
            other => Err(EngineError::execution(format!(
                "NOT requires a boolean, found {}",
                other.data_type()
            ))),
        },
        UnaryOperator::Neg => match operand.as_number() {
            Some(value) => Ok(Value::Number(-value)),
            None => Err(EngineError::execution(format!(
                "unary - requires a number, found {}",
                operand.data_type()
            ))),
        },
        UnaryOperator::Pos => match operand.as_number() {
            Some(value) => Ok(Value::Number(value)),
            None => Err(EngineError::execution(format!(
                "unary + requires a number, found {}",
                operand.data_type()
            ))),
        },
    }
}

fn ordering(
    op: BinaryOperator,
    left: &Value,
    right: &Value,
    check: impl Fn(Ordering) -> bool,
) -> EngineResult<Value> {
    match (left, right) {
        (Value::String(a), Value::String(b)) => Ok(Value::Bool(check(a.as_str().cmp(b.as_str())))),
        _ => match (left.as_number(), right.as_number()) {
            (Some(a), Some(b)) => Ok(Value::Bool(check(
                a.partial_cmp(&b).unwrap_or(Ordering::Equal),
            ))),
            _ => Err(type_error(op, left, right)),
        },
    }
}

fn numeric_op(
    op: BinaryOperator,
    left: &Value,
    right: &Value,
    apply: impl Fn(f64, f64) -> EngineResult<f64>,
) -> EngineResult<Value> {
    match (left.as_number(), right.as_number()) {
        (Some(a), Some(b)) => apply(a, b).map(Value::Number),
        _ => Err(type_error(op, left, right)),
    }
}

fn type_error(op: BinaryOperator, left: &Value, right: &Value) -> EngineError {
    EngineError::execution(format!(
        "operator {op} cannot be applied to {} and {}",
        left.data_type(),
        right.data_type()
    ))
}

/// SQL LIKE matching: `%` matches any run, `_` matches one character.
/// Matching is anchored and case-sensitive; there is no escape sequence.
fn like_match(left: &Value, right: &Value) -> EngineResult<bool> {
    let (Value::String(text), Value::String(pattern)) = (left, right) else {
        return Err(type_error(BinaryOperator::Like, left, right));
    };

    let mut regex_pattern = String::with_capacity(pattern.len() + 2);
    regex_pattern.push('^');
    for ch in pattern.chars() {
        match ch {
            '%' => regex_pattern.push_str(".*"),
            '_' => regex_pattern.push('.'),
            _ => regex_pattern.push_str(&regex::escape(&ch.to_string())),
        }
    }
    regex_pattern.push('$');

    let regex = Regex::new(&regex_pattern)
        .map_err(|err| EngineError::execution(format!("invalid LIKE pattern: {err}")))?;
    Ok(regex.is_match(text))
}

/// Dispatches a built-in function call.
fn call_builtin(name: &str, args: &[Value], ctx: &EvalContext<'_>) -> EngineResult<Value> {
    let upper = name.to_ascii_uppercase();
    match upper.as_str() {
        "UPPER" => string_arg(&upper, args, 0).map(|s| Value::String(s.to_uppercase().into())),
        "LOWER" => string_arg(&upper, args, 0).map(|s| Value::String(s.to_lowercase().into())),
        "TRIM" => string_arg(&upper, args, 0).map(|s| Value::String(s.trim().into())),
        "SUBSTRING" => {
            let text = string_arg(&upper, args, 0)?;
            let start = number_arg(&upper, args, 1)? as usize;
            let chars: Vec<char> = text.chars().collect();
            let end = match args.get(2) {
                Some(value) => value
                    .as_number()
                    .map(|n| n as usize)
                    .unwrap_or(chars.len())
                    .min(chars.len()),
                None => chars.len(),
            };
            let start = start.min(chars.len());
            Ok(Value::String(
                chars[start..end.max(start)].iter().collect::<String>().into(),
            ))
        }
        "REPLACE" => {
            let text = string_arg(&upper, args, 0)?;
            let from = string_arg(&upper, args, 1)?;
            let to = string_arg(&upper, args, 2)?;
            Ok(Value::String(text.replace(from, to).into()))
        }
        "LENGTH" | "COUNT" => match args.first() {
            Some(Value::Array(values)) => Ok(Value::Number(values.len() as f64)),
            Some(Value::String(text)) => Ok(Value::Number(text.chars().count() as f64)),
            Some(Value::Object(map)) => Ok(Value::Number(map.len() as f64)),
            Some(other) => Err(EngineError::execution(format!(
                "{upper} cannot count {}",
                other.data_type()
            ))),
            None => Err(missing_arg(&upper, 0)),
        },
        "EXISTS" => Ok(Value::Bool(
            !matches!(args.first(), None | Some(Value::Null)),
        )),
        "CACHED" => {
            let key = string_arg(&upper, args, 0)?;
            let hit = ctx.cache.is_some_and(|cache| cache.contains(key));
            Ok(Value::Bool(hit))
        }
        "PARSE_JSON" => {
            let text = string_arg(&upper, args, 0)?;
            let parsed: serde_json::Value = serde_json::from_str(text)
                .map_err(|err| EngineError::execution(format!("invalid JSON: {err}")))?;
            Ok(json_to_value(parsed))
        }
        // DOM-context accessors read from the current row by convention.
        "TEXT" | "HTML" => {
            let key = string_arg(&upper, args, 0)?;
            match ctx.current_row {
                Some(row) => member_access(row, key),
                None => Ok(Value::Null),
            }
        }
        "ATTR" => {
            let key = format!("attr:{}", string_arg(&upper, args, 0)?);
            match ctx.current_row {
                Some(row) => member_access(row, &key),
                None => Ok(Value::Null),
            }
        }
        "HEADER" => {
            let key = string_arg(&upper, args, 0)?;
            match ctx.variables.get("response.headers") {
                Some(headers) => member_access(&headers, key),
                None => Ok(Value::Null),
            }
        }
        "BODY" => Ok(ctx.variables.get("response.body").unwrap_or(Value::Null)),
        "STATUS" => Ok(ctx
            .variables
            .get("response.status")
            .unwrap_or(Value::Null)),
        "NOW" => {
            let ms = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as f64)
                .unwrap_or(0.0);
            Ok(Value::Number(ms))
        }
        "RANDOM" | "RAND" => Ok(Value::Number(rand::random::<f64>())),
        "UUID" | "NEWID" => Ok(Value::String(uuid::Uuid::new_v4().to_string().into())),
        _ => Err(EngineError::new(
            ErrorKind::Execution,
            format!("unknown function '{name}'"),
        )
        .with_context("function", name)),
    }
}

fn string_arg<'v>(name: &str, args: &'v [Value], index: usize) -> EngineResult<&'v str> {
    match args.get(index) {
        Some(Value::String(value)) => Ok(value.as_str()),
        Some(other) => Err(EngineError::execution(format!(
            "{name} expects a string argument, found {}",
            other.data_type()
        ))),
        None => Err(missing_arg(name, index)),
    }
}

fn number_arg(name: &str, args: &[Value], index: usize) -> EngineResult<f64> {
    match args.get(index).and_then(Value::as_number) {
        Some(value) => Ok(value),
        None => Err(missing_arg(name, index)),
    }
}

fn missing_arg(name: &str, index: usize) -> EngineError {
    EngineError::execution(format!("{name} is missing argument {}", index + 1))
}

fn json_to_value(json: serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(value) => Value::Bool(value),
        serde_json::Value::Number(value) => Value::Number(value.as_f64().unwrap_or(f64::NAN)),
        serde_json::Value::String(value) => Value::String(value.into()),
        serde_json::Value::Array(values) => {
            Value::Array(values.into_iter().map(json_to_value).collect())
        }
        serde_json::Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| (SmolStr::new(key), json_to_value(value)))
                .collect(),
        ),
    }
}

/// Multi-key sort comparator used by SORT steps.
pub fn compare_rows(
    left: &Value,
    right: &Value,
    keys: &[(SmolStr, bool)],
) -> Ordering {
    for (key, descending) in keys {
        let left_value = row_field(left, key);
        let right_value = row_field(right, key);
        let mut ordering = compare_values(&left_value, &right_value);
        if *descending {
            ordering = ordering.reverse();
        }
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn row_field(row: &Value, key: &str) -> Value {
    match row {
        Value::Object(map) => map.get(key).cloned().unwrap_or(Value::Null),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::context::ScopeStack;

    fn eval_str(source: &str) -> EngineResult<Value> {
        let tokens = crate::lexer::tokenize(source).tokens;
        let expr = crate::parser::expression::parse_standalone_expression(&tokens)
            .expect("expression parses");
        let variables = ScopeStack::new();
        evaluate(&expr, &EvalContext::new(&variables))
    }

    #[test]
    fn arithmetic_and_precedence() {
        assert_eq!(eval_str("2 + 3 * 4").unwrap(), Value::Number(14.0));
        assert_eq!(eval_str("10 % 3").unwrap(), Value::Number(1.0));
    }

    #[test]
    fn division_by_zero_errors() {
        assert!(eval_str("1 / 0").is_err());
        assert!(eval_str("1 % 0").is_err());
    }

    #[test]
    fn string_plus_concatenates() {
        assert_eq!(
            eval_str("'n=' + 5").unwrap(),
            Value::String("n=5".into())
        );
        assert_eq!(
            eval_str("1 || 2").unwrap(),
            Value::String("12".into())
        );
    }

    #[test]
    fn like_wildcards() {
        assert_eq!(eval_str("'hello' LIKE 'h%'").unwrap(), Value::Bool(true));
        assert_eq!(eval_str("'hello' LIKE 'h_llo'").unwrap(), Value::Bool(true));
        assert_eq!(eval_str("'hello' LIKE 'h_l'").unwrap(), Value::Bool(false));
        assert_eq!(
            eval_str("'a.c' LIKE 'a.c'").unwrap(),
            Value::Bool(true),
        );
        // Regex metacharacters in the pattern are literal.
        assert_eq!(eval_str("'abc' LIKE 'a.c'").unwrap(), Value::Bool(false));
        assert_eq!(eval_str("'x' NOT LIKE 'y%'").unwrap(), Value::Bool(true));
    }

    #[test]
    fn matches_is_regex() {
        assert_eq!(
            eval_str("'item-42' MATCHES 'item-[0-9]+'").unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn in_and_contains() {
        assert_eq!(eval_str("2 IN [1, 2, 3]").unwrap(), Value::Bool(true));
        assert_eq!(eval_str("5 NOT IN [1, 2]").unwrap(), Value::Bool(true));
        assert_eq!(
            eval_str("'hello' CONTAINS 'ell'").unwrap(),
            Value::Bool(true)
        );
        assert_eq!(eval_str("[1, 2] CONTAINS 3").unwrap(), Value::Bool(false));
    }

    #[test]
    fn logical_ops_require_booleans() {
        assert_eq!(
            eval_str("TRUE AND NOT FALSE").unwrap(),
            Value::Bool(true)
        );
        assert!(eval_str("1 AND TRUE").is_err());
    }

    #[test]
    fn row_fields_shadow_variables() {
        let mut variables = ScopeStack::new();
        variables.set("name", Value::String("from-var".into()));
        let row = Value::Object(
            [(SmolStr::new("name"), Value::String("from-row".into()))]
                .into_iter()
                .collect(),
        );
        let tokens = crate::lexer::tokenize("name").tokens;
        let expr = crate::parser::expression::parse_standalone_expression(&tokens).unwrap();
        let ctx = EvalContext::new(&variables);
        assert_eq!(
            evaluate(&expr, &ctx.with_row(&row)).unwrap(),
            Value::String("from-row".into())
        );
        assert_eq!(
            evaluate(&expr, &ctx).unwrap(),
            Value::String("from-var".into())
        );
    }

    #[test]
    fn undefined_identifier_errors() {
        assert!(eval_str("missing").is_err());
    }

    #[test]
    fn string_builtins() {
        assert_eq!(
            eval_str("UPPER('abc')").unwrap(),
            Value::String("ABC".into())
        );
        assert_eq!(
            eval_str("SUBSTRING('hello', 1, 3)").unwrap(),
            Value::String("el".into())
        );
        assert_eq!(
            eval_str("REPLACE('a-b', '-', '+')").unwrap(),
            Value::String("a+b".into())
        );
        assert_eq!(eval_str("LENGTH('abc')").unwrap(), Value::Number(3.0));
        assert_eq!(eval_str("COUNT([1, 2])").unwrap(), Value::Number(2.0));
    }

    #[test]
    fn parse_json_builtin() {
        let value = eval_str("PARSE_JSON('{\"a\": [1, 2]}')").unwrap();
        let Value::Object(map) = value else {
            panic!("expected object");
        };
        assert_eq!(
            map.get("a"),
            Some(&Value::Array(vec![Value::Number(1.0), Value::Number(2.0)]))
        );
    }

    #[test]
    fn member_and_index_access() {
        assert_eq!(
            eval_str("{a: {b: 7}}.a.b").unwrap(),
            Value::Number(7.0)
        );
        assert_eq!(eval_str("[10, 20][1]").unwrap(), Value::Number(20.0));
        assert_eq!(eval_str("[10][5]").unwrap(), Value::Null);
    }

    #[test]
    fn multi_key_row_comparison() {
        let row = |a: f64, b: &str| {
            Value::Object(
                [
                    (SmolStr::new("a"), Value::Number(a)),
                    (SmolStr::new("b"), Value::String(b.into())),
                ]
                .into_iter()
                .collect(),
            )
        };
        let keys = vec![(SmolStr::new("a"), false), (SmolStr::new("b"), true)];
        assert_eq!(
            compare_rows(&row(1.0, "x"), &row(2.0, "a"), &keys),
            Ordering::Less
        );
        assert_eq!(
            compare_rows(&row(1.0, "x"), &row(1.0, "y"), &keys),
            Ordering::Greater
        );
    }
}
