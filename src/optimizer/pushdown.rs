//! Predicate and projection pushdown through subquery sources.

use crate::ast::expression::{BinaryOperator, Expression};
use crate::ast::statement::{SelectSource, SelectStatement, Statement};
use crate::ast::{merge_spans, Program};
use smol_str::SmolStr;
use std::collections::HashSet;

/// Runs predicate pushdown over a program.
pub fn push_predicates_program(program: &Program) -> (Program, bool) {
    let mut changed = false;
    let statements = program
        .statements
        .iter()
        .map(|s| walk_statement(s, &mut changed, push_predicates_select))
        .collect();
    (Program::new(statements), changed)
}

/// Runs projection pushdown over a program.
pub fn prune_projections_program(program: &Program) -> (Program, bool) {
    let mut changed = false;
    let statements = program
        .statements
        .iter()
        .map(|s| walk_statement(s, &mut changed, prune_projection_select))
        .collect();
    (Program::new(statements), changed)
}

/// Applies `rewrite` to every SELECT in the statement tree.
fn walk_statement(
    statement: &Statement,
    changed: &mut bool,
    rewrite: fn(&SelectStatement, &mut bool) -> SelectStatement,
) -> Statement {
    match statement {
        Statement::Select(select) => {
            let mut select = rewrite(select, changed);
            if let SelectSource::Subquery(subquery, span) = &select.source {
                select.source = SelectSource::Subquery(
                    Box::new(walk_statement(subquery, changed, rewrite)),
                    span.clone(),
                );
            }
            Statement::Select(select)
        }
        Statement::For(for_loop) => {
            let mut for_loop = for_loop.clone();
            for_loop.body = for_loop
                .body
                .iter()
                .map(|s| walk_statement(s, changed, rewrite))
                .collect();
            Statement::For(for_loop)
        }
        Statement::If(branch) => {
            let mut branch = branch.clone();
            branch.then_branch = branch
                .then_branch
                .iter()
                .map(|s| walk_statement(s, changed, rewrite))
                .collect();
            branch.else_branch = branch
                .else_branch
                .iter()
                .map(|s| walk_statement(s, changed, rewrite))
                .collect();
            Statement::If(branch)
        }
        Statement::With(with) => {
            let mut with = with.clone();
            with.ctes = with
                .ctes
                .iter()
                .map(|cte| {
                    let mut cte = cte.clone();
                    cte.statement = Box::new(walk_statement(&cte.statement, changed, rewrite));
                    cte
                })
                .collect();
            with.body = Box::new(walk_statement(&with.body, changed, rewrite));
            Statement::With(with)
        }
        _ => statement.clone(),
    }
}

/// Moves WHERE conjuncts into a subquery source when every identifier they
/// reference is produced by the subquery.
fn push_predicates_select(select: &SelectStatement, changed: &mut bool) -> SelectStatement {
    let Some(where_clause) = &select.where_clause else {
        return select.clone();
    };
    let SelectSource::Subquery(subquery, source_span) = &select.source else {
        return select.clone();
    };
    let Statement::Select(inner) = subquery.as_ref() else {
        return select.clone();
    };
    // A wildcard subquery exposes unknown names; push nothing through it.
    if inner.is_wildcard() {
        return select.clone();
    }

    let inner_outputs: HashSet<SmolStr> = inner
        .fields
        .iter()
        .map(|field| field.output_name().clone())
        .collect();

    let mut pushed = Vec::new();
    let mut remaining = Vec::new();
    for conjunct in split_conjuncts(where_clause) {
        let mut names = Vec::new();
        conjunct.collect_identifiers(&mut names);
        let all_known =
            !names.is_empty() && names.iter().all(|name| inner_outputs.contains(name));
        if all_known {
            pushed.push(conjunct.clone());
        } else {
            remaining.push(conjunct.clone());
        }
    }

    if pushed.is_empty() {
        return select.clone();
    }

    *changed = true;
    let mut inner = inner.clone();
    let pushed_predicate = combine_and(pushed).expect("pushed set is non-empty");
    inner.where_clause = Some(match inner.where_clause.take() {
        Some(existing) => {
            let span = merge_spans(&existing.span(), &pushed_predicate.span());
            Expression::Binary(
                BinaryOperator::And,
                Box::new(existing),
                Box::new(pushed_predicate),
                span,
            )
        }
        None => pushed_predicate,
    });

    let mut select = select.clone();
    select.source = SelectSource::Subquery(
        Box::new(Statement::Select(inner)),
        source_span.clone(),
    );
    select.where_clause = combine_and(remaining);
    select
}

/// Prunes subquery fields the outer query never references. Never prunes
/// through wildcards; keeps the subquery intact when pruning would leave
/// zero fields.
fn prune_projection_select(select: &SelectStatement, changed: &mut bool) -> SelectStatement {
    let SelectSource::Subquery(subquery, source_span) = &select.source else {
        return select.clone();
    };
    let Statement::Select(inner) = subquery.as_ref() else {
        return select.clone();
    };
    if inner.is_wildcard() || select.fields.iter().any(|f| f.is_wildcard()) {
        return select.clone();
    }

    let mut needed: HashSet<SmolStr> = HashSet::new();
    for field in &select.fields {
        let mut names = Vec::new();
        field.expr.collect_identifiers(&mut names);
        needed.extend(names);
    }
    if let Some(where_clause) = &select.where_clause {
        let mut names = Vec::new();
        where_clause.collect_identifiers(&mut names);
        needed.extend(names);
    }
    for key in &select.order_by {
        needed.insert(key.name.clone());
    }

    let retained: Vec<_> = inner
        .fields
        .iter()
        .filter(|field| needed.contains(field.output_name()))
        .cloned()
        .collect();

    if retained.is_empty() || retained.len() == inner.fields.len() {
        return select.clone();
    }

    *changed = true;
    let mut inner = inner.clone();
    inner.fields = retained;
    let mut select = select.clone();
    select.source = SelectSource::Subquery(
        Box::new(Statement::Select(inner)),
        source_span.clone(),
    );
    select
}

/// Splits a predicate at top-level AND boundaries.
pub fn split_conjuncts(expr: &Expression) -> Vec<&Expression> {
    match expr {
        Expression::Binary(BinaryOperator::And, left, right, _) => {
            let mut conjuncts = split_conjuncts(left);
            conjuncts.extend(split_conjuncts(right));
            conjuncts
        }
        _ => vec![expr],
    }
}

/// Rejoins conjuncts with AND; `None` when the list is empty.
fn combine_and(conjuncts: Vec<Expression>) -> Option<Expression> {
    let mut iter = conjuncts.into_iter();
    let first = iter.next()?;
    Some(iter.fold(first, |acc, conjunct| {
        let span = merge_spans(&acc.span(), &conjunct.span());
        Expression::Binary(BinaryOperator::And, Box::new(acc), Box::new(conjunct), span)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::parser::Parser;

    fn parse(source: &str) -> Program {
        let lex = tokenize(source);
        Parser::new(lex.tokens, source)
            .with_lexer_diagnostics(lex.diagnostics)
            .parse()
            .ast
            .expect("parse")
    }

    fn outer_select(program: &Program) -> &SelectStatement {
        match &program.statements[0] {
            Statement::Select(select) => select,
            other => panic!("expected SELECT, got {other:?}"),
        }
    }

    fn inner_select(select: &SelectStatement) -> &SelectStatement {
        match &select.source {
            SelectSource::Subquery(statement, _) => match statement.as_ref() {
                Statement::Select(inner) => inner,
                other => panic!("expected inner SELECT, got {other:?}"),
            },
            other => panic!("expected subquery source, got {other:?}"),
        }
    }

    #[test]
    fn predicate_moves_into_subquery() {
        let (program, changed) = push_predicates_program(&parse(
            "SELECT name FROM (SELECT name, age FROM 'https://x.com') WHERE age > 18",
        ));
        assert!(changed);
        let outer = outer_select(&program);
        assert!(outer.where_clause.is_none());
        let inner = inner_select(outer);
        assert!(inner.where_clause.is_some());
    }

    #[test]
    fn mixed_conjuncts_split() {
        let (program, changed) = push_predicates_program(&parse(
            "SELECT name FROM (SELECT name, age FROM 'https://x.com') \
             WHERE age > 18 AND outer_flag = TRUE",
        ));
        assert!(changed);
        let outer = outer_select(&program);
        // The conjunct naming `outer_flag` stays outside.
        assert!(outer.where_clause.is_some());
        let inner = inner_select(outer);
        assert!(inner.where_clause.is_some());
    }

    #[test]
    fn unknown_names_are_not_pushed() {
        let (program, changed) = push_predicates_program(&parse(
            "SELECT name FROM (SELECT name FROM 'https://x.com') WHERE age > 18",
        ));
        assert!(!changed);
        let outer = outer_select(&program);
        assert!(outer.where_clause.is_some());
    }

    #[test]
    fn wildcard_subquery_blocks_pushdown() {
        let (_, changed) = push_predicates_program(&parse(
            "SELECT name FROM (SELECT * FROM 'https://x.com') WHERE age > 18",
        ));
        assert!(!changed);
    }

    #[test]
    fn projection_prunes_unused_fields() {
        let (program, changed) = prune_projections_program(&parse(
            "SELECT name FROM (SELECT name, age, email FROM 'https://x.com')",
        ));
        assert!(changed);
        let inner = inner_select(outer_select(&program));
        assert_eq!(inner.fields.len(), 1);
        assert_eq!(inner.fields[0].output_name().as_str(), "name");
    }

    #[test]
    fn projection_keeps_where_and_order_names() {
        let (program, changed) = prune_projections_program(&parse(
            "SELECT name FROM (SELECT name, age, email FROM 'https://x.com') \
             WHERE age > 18 ORDER BY name",
        ));
        assert!(changed);
        let inner = inner_select(outer_select(&program));
        let names: Vec<&str> = inner
            .fields
            .iter()
            .map(|f| f.output_name().as_str())
            .collect();
        assert_eq!(names, vec!["name", "age"]);
    }

    #[test]
    fn projection_never_prunes_wildcard() {
        let (_, changed) = prune_projections_program(&parse(
            "SELECT name FROM (SELECT * FROM 'https://x.com')",
        ));
        assert!(!changed);
    }

    #[test]
    fn projection_keeps_original_when_nothing_matches() {
        let (program, changed) = prune_projections_program(&parse(
            "SELECT other FROM (SELECT name, age FROM 'https://x.com')",
        ));
        assert!(!changed);
        let inner = inner_select(outer_select(&program));
        assert_eq!(inner.fields.len(), 2);
    }
}
