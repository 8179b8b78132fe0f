//! Constant folding.
//!
//! Folds BINARY/UNARY nodes whose operands are literal (including literal
//! arrays and objects) using the same operator kernel as the runtime
//! evaluator, so folded results match evaluated results exactly. Nodes that
//! fail to evaluate (division by zero, type mismatches) are left intact.

use crate::ast::expression::{Expression, MemberProperty, ObjectProperty};
use crate::ast::statement::{SelectSource, Statement};
use crate::exec::eval::{apply_binary, apply_unary};
use crate::exec::value::Value;

/// Folds all expressions in a statement. Returns the rewritten statement
/// and whether anything changed.
pub fn fold_statement(statement: &Statement) -> (Statement, bool) {
    let mut changed = false;
    let folded = rewrite_statement(statement, &mut changed);
    (folded, changed)
}

fn rewrite_statement(statement: &Statement, changed: &mut bool) -> Statement {
    match statement {
        Statement::Select(select) => {
            let mut select = select.clone();
            for field in &mut select.fields {
                field.expr = fold_expression(&field.expr, changed);
            }
            if let SelectSource::Subquery(subquery, span) = &select.source {
                select.source = SelectSource::Subquery(
                    Box::new(rewrite_statement(subquery, changed)),
                    span.clone(),
                );
            }
            select.where_clause = select
                .where_clause
                .as_ref()
                .map(|w| fold_expression(w, changed));
            Statement::Select(select)
        }
        Statement::Navigate(navigate) => {
            let mut navigate = navigate.clone();
            navigate.url = fold_expression(&navigate.url, changed);
            for field in &mut navigate.capture {
                field.expr = fold_expression(&field.expr, changed);
            }
            Statement::Navigate(navigate)
        }
        Statement::Set(set) => {
            let mut set = set.clone();
            set.value = fold_expression(&set.value, changed);
            Statement::Set(set)
        }
        Statement::For(for_loop) => {
            let mut for_loop = for_loop.clone();
            for_loop.iterable = fold_expression(&for_loop.iterable, changed);
            for_loop.body = for_loop
                .body
                .iter()
                .map(|s| rewrite_statement(s, changed))
                .collect();
            Statement::For(for_loop)
        }
        Statement::If(branch) => {
            let mut branch = branch.clone();
            branch.condition = fold_expression(&branch.condition, changed);
            branch.then_branch = branch
                .then_branch
                .iter()
                .map(|s| rewrite_statement(s, changed))
                .collect();
            branch.else_branch = branch
                .else_branch
                .iter()
                .map(|s| rewrite_statement(s, changed))
                .collect();
            Statement::If(branch)
        }
        Statement::Insert(insert) => {
            let mut insert = insert.clone();
            insert.target = fold_expression(&insert.target, changed);
            insert.values = insert
                .values
                .iter()
                .map(|v| fold_expression(v, changed))
                .collect();
            Statement::Insert(insert)
        }
        Statement::Update(update) => {
            let mut update = update.clone();
            update.target = fold_expression(&update.target, changed);
            update.assignments = update
                .assignments
                .iter()
                .map(|(name, value)| (name.clone(), fold_expression(value, changed)))
                .collect();
            update.where_clause = update
                .where_clause
                .as_ref()
                .map(|w| fold_expression(w, changed));
            Statement::Update(update)
        }
        Statement::Delete(delete) => {
            let mut delete = delete.clone();
            delete.target = fold_expression(&delete.target, changed);
            delete.where_clause = delete
                .where_clause
                .as_ref()
                .map(|w| fold_expression(w, changed));
            Statement::Delete(delete)
        }
        Statement::With(with) => {
            let mut with = with.clone();
            with.ctes = with
                .ctes
                .iter()
                .map(|cte| {
                    let mut cte = cte.clone();
                    cte.statement = Box::new(rewrite_statement(&cte.statement, changed));
                    cte
                })
                .collect();
            with.body = Box::new(rewrite_statement(&with.body, changed));
            Statement::With(with)
        }
        Statement::Show(_) | Statement::Empty(_) => statement.clone(),
    }
}

/// Folds one expression bottom-up.
pub fn fold_expression(expr: &Expression, changed: &mut bool) -> Expression {
    match expr {
        Expression::Literal(_, _) | Expression::Identifier(_, _) => expr.clone(),
        Expression::Binary(op, left, right, span) => {
            let left = fold_expression(left, changed);
            let right = fold_expression(right, changed);
            if let (Some(left_value), Some(right_value)) =
                (expr_to_value(&left), expr_to_value(&right))
            {
                if let Ok(result) = apply_binary(*op, &left_value, &right_value) {
                    if let Some(literal) = result.to_literal() {
                        *changed = true;
                        return Expression::Literal(literal, span.clone());
                    }
                }
            }
            Expression::Binary(*op, Box::new(left), Box::new(right), span.clone())
        }
        Expression::Unary(op, operand, span) => {
            let operand = fold_expression(operand, changed);
            if let Some(value) = expr_to_value(&operand) {
                if let Ok(result) = apply_unary(*op, &value) {
                    if let Some(literal) = result.to_literal() {
                        *changed = true;
                        return Expression::Literal(literal, span.clone());
                    }
                }
            }
            Expression::Unary(*op, Box::new(operand), span.clone())
        }
        Expression::Call(callee, args, span) => {
            let args = args.iter().map(|a| fold_expression(a, changed)).collect();
            Expression::Call(callee.clone(), args, span.clone())
        }
        Expression::Member(object, property, span) => {
            let object = fold_expression(object, changed);
            let property = match property {
                MemberProperty::Static(name) => MemberProperty::Static(name.clone()),
                MemberProperty::Computed(index) => {
                    MemberProperty::Computed(Box::new(fold_expression(index, changed)))
                }
            };
            Expression::Member(Box::new(object), property, span.clone())
        }
        Expression::Array(elements, span) => {
            let elements = elements
                .iter()
                .map(|e| fold_expression(e, changed))
                .collect();
            Expression::Array(elements, span.clone())
        }
        Expression::Object(properties, span) => {
            let properties = properties
                .iter()
                .map(|p| ObjectProperty {
                    key: p.key.clone(),
                    value: fold_expression(&p.value, changed),
                    span: p.span.clone(),
                })
                .collect();
            Expression::Object(properties, span.clone())
        }
    }
}

/// Converts a fully-literal expression (including literal arrays and
/// objects) into a runtime value.
pub fn expr_to_value(expr: &Expression) -> Option<Value> {
    match expr {
        Expression::Literal(literal, _) => Some(Value::from_literal(literal)),
        Expression::Array(elements, _) => {
            let mut values = Vec::with_capacity(elements.len());
            for element in elements {
                values.push(expr_to_value(element)?);
            }
            Some(Value::Array(values))
        }
        Expression::Object(properties, _) => {
            let mut map = std::collections::BTreeMap::new();
            for property in properties {
                map.insert(property.key.clone(), expr_to_value(&property.value)?);
            }
            Some(Value::Object(map))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::expression::Literal;
    use crate::lexer::tokenize;
    use crate::parser::expression::parse_standalone_expression;

    fn fold(source: &str) -> Expression {
        let tokens = tokenize(source).tokens;
        let expr = parse_standalone_expression(&tokens).unwrap();
        let mut changed = false;
        fold_expression(&expr, &mut changed)
    }

    #[test]
    fn arithmetic_folds() {
        assert!(matches!(
            fold("2 + 3"),
            Expression::Literal(Literal::Number(n), _) if n == 5.0
        ));
        assert!(matches!(
            fold("2 + 3 * 4"),
            Expression::Literal(Literal::Number(n), _) if n == 14.0
        ));
    }

    #[test]
    fn division_by_zero_left_intact() {
        assert!(matches!(fold("1 / 0"), Expression::Binary(_, _, _, _)));
        assert!(matches!(fold("1 % 0"), Expression::Binary(_, _, _, _)));
    }

    #[test]
    fn comparisons_fold() {
        assert!(matches!(
            fold("2 > 1"),
            Expression::Literal(Literal::Boolean(true), _)
        ));
        assert!(matches!(
            fold("'a' = 'b'"),
            Expression::Literal(Literal::Boolean(false), _)
        ));
    }

    #[test]
    fn string_concat_folds() {
        assert!(matches!(
            fold("'a' + 'b'"),
            Expression::Literal(Literal::String(ref s), _) if s == "ab"
        ));
        assert!(matches!(
            fold("'a' || 1"),
            Expression::Literal(Literal::String(ref s), _) if s == "a1"
        ));
    }

    #[test]
    fn like_folds() {
        assert!(matches!(
            fold("'hello' LIKE 'h%'"),
            Expression::Literal(Literal::Boolean(true), _)
        ));
    }

    #[test]
    fn boolean_logic_folds() {
        assert!(matches!(
            fold("TRUE AND FALSE"),
            Expression::Literal(Literal::Boolean(false), _)
        ));
        assert!(matches!(
            fold("NOT FALSE"),
            Expression::Literal(Literal::Boolean(true), _)
        ));
    }

    #[test]
    fn in_with_literal_array_folds() {
        assert!(matches!(
            fold("2 IN [1, 2, 3]"),
            Expression::Literal(Literal::Boolean(true), _)
        ));
    }

    #[test]
    fn identifiers_block_folding() {
        assert!(matches!(fold("x + 1"), Expression::Binary(_, _, _, _)));
        // But literal subtrees still fold.
        let folded = fold("x + (1 + 2)");
        let Expression::Binary(_, _, right, _) = folded else {
            panic!("expected binary");
        };
        assert!(matches!(
            *right,
            Expression::Literal(Literal::Number(n), _) if n == 3.0
        ));
    }

    #[test]
    fn folding_matches_evaluation() {
        // eval(fold(E)) = eval(E) for literal-only expressions.
        use crate::exec::context::ScopeStack;
        use crate::exec::eval::{evaluate, EvalContext};

        for source in ["1 + 2 * 3", "'a' || 'b'", "5 > 3 AND 2 < 4", "10 / 4"] {
            let tokens = tokenize(source).tokens;
            let expr = parse_standalone_expression(&tokens).unwrap();
            let variables = ScopeStack::new();
            let ctx = EvalContext::new(&variables);
            let direct = evaluate(&expr, &ctx).unwrap();
            let mut changed = false;
            let folded = fold_expression(&expr, &mut changed);
            let via_fold = evaluate(&folded, &ctx).unwrap();
            assert_eq!(direct, via_fold, "mismatch for {source}");
        }
    }
}
