//! Bottom-up type inference for WebQL expressions.

use crate::ast::expression::{BinaryOperator, Expression, MemberProperty, UnaryOperator};
use crate::ast::{DataType, Span};
use crate::diag::Diag;
use crate::semantic::symbol_table::SymbolTable;
use std::collections::HashMap;

/// Mapping from expression nodes (keyed by span) to inferred data types.
#[derive(Debug, Clone, Default)]
pub struct TypeTable {
    types: HashMap<(usize, usize), DataType>,
}

impl TypeTable {
    /// Creates an empty type table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the inferred type of an expression.
    pub fn record(&mut self, span: &Span, data_type: DataType) {
        self.types.insert((span.start, span.end), data_type);
    }

    /// Returns the recorded type of an expression, if any.
    pub fn get(&self, expr: &Expression) -> Option<DataType> {
        let span = expr.span();
        self.types.get(&(span.start, span.end)).copied()
    }

    /// Number of typed expressions.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns true when no expression has been typed.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// Returns the return type of a built-in function, if `name` is one
/// (case-insensitive).
pub fn builtin_return_type(name: &str) -> Option<DataType> {
    let upper = name.to_ascii_uppercase();
    let data_type = match upper.as_str() {
        "UPPER" | "LOWER" | "TRIM" | "SUBSTRING" | "REPLACE" => DataType::String,
        "TEXT" | "HTML" | "ATTR" | "HEADER" | "BODY" => DataType::String,
        "COUNT" | "STATUS" | "LENGTH" => DataType::Number,
        "EXISTS" | "CACHED" => DataType::Boolean,
        "PARSE_JSON" => DataType::Object,
        "PARSE_HTML" => DataType::Document,
        "SCREENSHOT" | "PDF" => DataType::Bytes,
        "NOW" | "RANDOM" | "RAND" => DataType::Number,
        "CURRENT_TIME" | "CURRENT_DATE" | "UUID" | "NEWID" => DataType::String,
        _ => return None,
    };
    Some(data_type)
}

/// Function names whose results change between evaluations. Statements
/// referencing these are never cacheable.
pub const NON_DETERMINISTIC_BUILTINS: &[&str] = &[
    "NOW",
    "CURRENT_TIME",
    "CURRENT_DATE",
    "RANDOM",
    "RAND",
    "UUID",
    "NEWID",
];

/// Bottom-up expression type checker.
///
/// Identifier types come from the symbol table driven by the analyzer's
/// scope walk; every visited expression is recorded into the [`TypeTable`].
pub struct TypeChecker {
    types: TypeTable,
    diagnostics: Vec<Diag>,
    /// When set, unresolved identifiers type as UNKNOWN instead of erroring
    /// (they may resolve to DOM fields at runtime).
    allow_undefined: bool,
}

impl TypeChecker {
    /// Creates a new type checker.
    pub fn new(allow_undefined: bool) -> Self {
        Self {
            types: TypeTable::new(),
            diagnostics: Vec::new(),
            allow_undefined,
        }
    }

    /// Consumes the checker, returning the type table and diagnostics.
    pub fn finish(self) -> (TypeTable, Vec<Diag>) {
        (self.types, self.diagnostics)
    }

    /// Infers the type of an expression, recording it and any diagnostics.
    pub fn infer(&mut self, expr: &Expression, symbols: &SymbolTable) -> DataType {
        let data_type = match expr {
            Expression::Literal(literal, _) => literal.data_type(),
            Expression::Identifier(name, span) => {
                if name == "*" {
                    DataType::Unknown
                } else {
                    match symbols.resolve(name) {
                        Some(symbol) => symbol.data_type,
                        None => {
                            if !self.allow_undefined {
                                self.diagnostics.push(
                                    Diag::semantic(format!("undefined name '{name}'"))
                                        .at(span.clone(), "not found in any scope")
                                        .rule("undefined_name"),
                                );
                            }
                            DataType::Unknown
                        }
                    }
                }
            }
            Expression::Binary(op, left, right, span) => {
                let left_type = self.infer(left, symbols);
                let right_type = self.infer(right, symbols);
                self.infer_binary(*op, left_type, right_type, span)
            }
            Expression::Unary(op, operand, span) => {
                let operand_type = self.infer(operand, symbols);
                self.infer_unary(*op, operand_type, span)
            }
            Expression::Call(callee, args, span) => {
                for arg in args {
                    self.infer(arg, symbols);
                }
                match builtin_return_type(callee) {
                    Some(data_type) => data_type,
                    None => match symbols.resolve(callee) {
                        Some(symbol) => symbol.data_type,
                        None => {
                            if !self.allow_undefined {
                                self.diagnostics.push(
                                    Diag::type_check(format!("unknown function '{callee}'"))
                                        .at(span.clone(), "not a built-in")
                                        .rule("unknown_function"),
                                );
                            }
                            DataType::Unknown
                        }
                    },
                }
            }
            Expression::Member(object, property, _) => {
                let object_type = self.infer(object, symbols);
                if let MemberProperty::Computed(index) = property {
                    self.infer(index, symbols);
                }
                match object_type {
                    DataType::Array => DataType::Array,
                    DataType::Object => DataType::Object,
                    _ => DataType::Unknown,
                }
            }
            Expression::Array(elements, _) => {
                for element in elements {
                    self.infer(element, symbols);
                }
                DataType::Array
            }
            Expression::Object(properties, _) => {
                for property in properties {
                    self.infer(&property.value, symbols);
                }
                DataType::Object
            }
        };

        self.types.record(&expr.span(), data_type);
        data_type
    }

    fn infer_binary(
        &mut self,
        op: BinaryOperator,
        left: DataType,
        right: DataType,
        span: &Span,
    ) -> DataType {
        match op {
            _ if op.is_comparison() => {
                if !types_compatible(left, right) {
                    self.type_error(
                        span,
                        format!("cannot compare {left} with {right} using {op}"),
                        left,
                        right,
                    );
                }
                DataType::Boolean
            }
            BinaryOperator::And | BinaryOperator::Or => {
                for operand in [left, right] {
                    if !matches!(
                        operand,
                        DataType::Boolean | DataType::Unknown | DataType::Null
                    ) {
                        self.type_error(
                            span,
                            format!("{op} requires boolean operands, found {operand}"),
                            DataType::Boolean,
                            operand,
                        );
                    }
                }
                DataType::Boolean
            }
            BinaryOperator::Add
                if left == DataType::String || right == DataType::String =>
            {
                // String + anything concatenates.
                DataType::String
            }
            _ if op.is_arithmetic() => {
                for operand in [left, right] {
                    if !is_numeric(operand) {
                        self.type_error(
                            span,
                            format!("{op} requires numeric operands, found {operand}"),
                            DataType::Number,
                            operand,
                        );
                    }
                }
                DataType::Number
            }
            BinaryOperator::Concat => DataType::String,
            _ => DataType::Unknown,
        }
    }

    fn infer_unary(&mut self, op: UnaryOperator, operand: DataType, span: &Span) -> DataType {
        match op {
            UnaryOperator::Not => {
                if !matches!(
                    operand,
                    DataType::Boolean | DataType::Unknown | DataType::Null
                ) {
                    self.type_error(
                        span,
                        format!("NOT requires a boolean operand, found {operand}"),
                        DataType::Boolean,
                        operand,
                    );
                }
                DataType::Boolean
            }
            UnaryOperator::Neg | UnaryOperator::Pos => {
                if !is_numeric(operand) {
                    self.type_error(
                        span,
                        format!("unary {op} requires a numeric operand, found {operand}"),
                        DataType::Number,
                        operand,
                    );
                }
                DataType::Number
            }
        }
    }

    fn type_error(&mut self, span: &Span, message: String, expected: DataType, actual: DataType) {
        self.diagnostics.push(
            Diag::type_check(message)
                .at(span.clone(), format!("expected {expected}, found {actual}"))
                .rule("mismatch"),
        );
    }
}

/// Returns true when two types may be compared. NULL and UNKNOWN are
/// compatible with anything.
pub fn types_compatible(left: DataType, right: DataType) -> bool {
    if left == right {
        return true;
    }
    if matches!(left, DataType::Null | DataType::Unknown)
        || matches!(right, DataType::Null | DataType::Unknown)
    {
        return true;
    }
    // Numeric family members compare with each other.
    is_numeric(left) && is_numeric(right)
        // IN / CONTAINS compare scalars against collections.
        || matches!(right, DataType::Array)
        || matches!(left, DataType::Array | DataType::String)
}

fn is_numeric(data_type: DataType) -> bool {
    matches!(
        data_type,
        DataType::Number | DataType::Duration | DataType::Bytes | DataType::Unknown
    )
}
