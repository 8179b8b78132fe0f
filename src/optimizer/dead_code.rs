//! Dead-code elimination.
//!
//! Collapses IF statements with constant conditions to the taken branch,
//! removes FOR loops over literal empty arrays, and collapses WITH
//! statements whose CTEs were all eliminated.

use crate::ast::expression::{Expression, Literal, UnaryOperator};
use crate::ast::statement::{IfStatement, SelectSource, Statement};
use crate::ast::Program;

/// Runs dead-code elimination over a program.
pub fn eliminate_program(program: &Program) -> (Program, bool) {
    let mut changed = false;
    let statements = program
        .statements
        .iter()
        .flat_map(|statement| eliminate_statement(statement, &mut changed))
        .collect();
    (Program::new(statements), changed)
}

/// Rewrites one statement; the result list may be empty (statement removed)
/// or contain several statements (a collapsed branch).
pub fn eliminate_statement(statement: &Statement, changed: &mut bool) -> Vec<Statement> {
    match statement {
        Statement::If(branch) => {
            let then_branch: Vec<Statement> = branch
                .then_branch
                .iter()
                .flat_map(|s| eliminate_statement(s, changed))
                .collect();
            let else_branch: Vec<Statement> = branch
                .else_branch
                .iter()
                .flat_map(|s| eliminate_statement(s, changed))
                .collect();

            if let Expression::Literal(Literal::Boolean(condition), _) = &branch.condition {
                *changed = true;
                return if *condition { then_branch } else { else_branch };
            }

            if then_branch.is_empty() && !else_branch.is_empty() {
                // The then branch died: invert the condition and keep the
                // else branch as the new then branch.
                *changed = true;
                let condition_span = branch.condition.span();
                return vec![Statement::If(IfStatement {
                    condition: Expression::Unary(
                        UnaryOperator::Not,
                        Box::new(branch.condition.clone()),
                        condition_span,
                    ),
                    then_branch: else_branch,
                    else_branch: Vec::new(),
                    span: branch.span.clone(),
                })];
            }

            if then_branch.is_empty() && else_branch.is_empty() {
                *changed = true;
                return Vec::new();
            }

            vec![Statement::If(IfStatement {
                condition: branch.condition.clone(),
                then_branch,
                else_branch,
                span: branch.span.clone(),
            })]
        }
        Statement::For(for_loop) => {
            if let Expression::Array(elements, _) = &for_loop.iterable {
                if elements.is_empty() {
                    *changed = true;
                    return Vec::new();
                }
            }
            let body: Vec<Statement> = for_loop
                .body
                .iter()
                .flat_map(|s| eliminate_statement(s, changed))
                .collect();
            if body.is_empty() {
                *changed = true;
                return Vec::new();
            }
            let mut for_loop = for_loop.clone();
            for_loop.body = body;
            vec![Statement::For(for_loop)]
        }
        Statement::With(with) => {
            let mut ctes = Vec::new();
            for cte in &with.ctes {
                let replacement = eliminate_statement(&cte.statement, changed);
                match replacement.len() {
                    0 => {
                        // CTE eliminated entirely; drop it.
                        *changed = true;
                    }
                    1 => {
                        let mut cte = cte.clone();
                        cte.statement =
                            Box::new(replacement.into_iter().next().expect("one statement"));
                        ctes.push(cte);
                    }
                    _ => ctes.push(cte.clone()),
                }
            }
            let body = eliminate_statement(&with.body, changed);
            if ctes.is_empty() {
                *changed = true;
                return body;
            }
            let body_statement = if body.len() == 1 {
                body.into_iter().next().expect("one statement")
            } else {
                with.body.as_ref().clone()
            };
            let mut with = with.clone();
            with.ctes = ctes;
            with.body = Box::new(body_statement);
            vec![Statement::With(with)]
        }
        Statement::Select(select) => {
            if let SelectSource::Subquery(subquery, span) = &select.source {
                let replacement = eliminate_statement(subquery, changed);
                if replacement.len() == 1 {
                    let mut select = select.clone();
                    select.source = SelectSource::Subquery(
                        Box::new(replacement.into_iter().next().expect("one statement")),
                        span.clone(),
                    );
                    return vec![Statement::Select(select)];
                }
            }
            vec![statement.clone()]
        }
        Statement::Empty(_) => Vec::new(),
        _ => vec![statement.clone()],
    }
}
