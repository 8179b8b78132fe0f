//! Parallel-execution detection (non-mutating).
//!
//! Finds groups of adjacent top-level statements whose read/write sets are
//! disjoint, and FOR loops over literal arrays whose iterations carry no
//! cross-iteration state. The planner uses both to fan work out.

use crate::ast::expression::Expression;
use crate::ast::statement::Statement;
use crate::ast::Program;
use smol_str::SmolStr;
use std::collections::HashSet;

/// Result of parallel detection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParallelReport {
    /// Groups of top-level statement indices that may run concurrently.
    /// Only groups with more than one member are recorded.
    pub statement_groups: Vec<Vec<usize>>,
    /// Spans of FOR statements whose iterations can fan out.
    pub parallel_loops: HashSet<(usize, usize)>,
}

/// Analyzes a program for parallel opportunities.
pub fn detect(program: &Program) -> ParallelReport {
    let mut report = ParallelReport::default();

    // Adjacent statements with disjoint dependency sets form a group.
    let accesses: Vec<Access> = program.statements.iter().map(statement_access).collect();
    let mut group: Vec<usize> = Vec::new();
    for (index, access) in accesses.iter().enumerate() {
        let independent = group
            .iter()
            .all(|&member| accesses[member].disjoint(access));
        if independent {
            group.push(index);
        } else {
            if group.len() > 1 {
                report.statement_groups.push(group.clone());
            }
            group.clear();
            group.push(index);
        }
    }
    if group.len() > 1 {
        report.statement_groups.push(group);
    }

    for statement in &program.statements {
        collect_parallel_loops(statement, &mut report.parallel_loops);
    }

    report
}

/// Read/write variable sets of one statement.
#[derive(Debug, Default)]
struct Access {
    reads: HashSet<SmolStr>,
    writes: HashSet<SmolStr>,
}

impl Access {
    /// Two statements are independent when neither writes what the other
    /// reads or writes.
    fn disjoint(&self, other: &Access) -> bool {
        self.writes.is_disjoint(&other.reads)
            && self.writes.is_disjoint(&other.writes)
            && other.writes.is_disjoint(&self.reads)
    }
}

fn statement_access(statement: &Statement) -> Access {
    let mut access = Access::default();
    collect_access(statement, &mut access);
    access
}

fn collect_access(statement: &Statement, access: &mut Access) {
    let mut read_expr = |expr: &Expression, access: &mut Access| {
        let mut names = Vec::new();
        expr.collect_identifiers(&mut names);
        access.reads.extend(names);
    };

    match statement {
        Statement::Select(select) => {
            for field in &select.fields {
                read_expr(&field.expr, access);
            }
            if let Some(where_clause) = &select.where_clause {
                read_expr(where_clause, access);
            }
            match &select.source {
                crate::ast::statement::SelectSource::Variable(name, _) => {
                    access.reads.insert(name.clone());
                }
                crate::ast::statement::SelectSource::Subquery(subquery, _) => {
                    collect_access(subquery, access);
                }
                crate::ast::statement::SelectSource::Url(_, _) => {}
            }
        }
        Statement::Navigate(navigate) => {
            read_expr(&navigate.url, access);
            for field in &navigate.capture {
                read_expr(&field.expr, access);
            }
        }
        Statement::Set(set) => {
            read_expr(&set.value, access);
            access.writes.insert(set.variable_name());
        }
        Statement::Show(show) => {
            access.reads.insert(show.target.clone());
        }
        Statement::For(for_loop) => {
            read_expr(&for_loop.iterable, access);
            let mut body = Access::default();
            for body_statement in &for_loop.body {
                collect_access(body_statement, &mut body);
            }
            // The iterator variable is loop-local.
            body.reads.remove(&for_loop.variable);
            body.writes.remove(&for_loop.variable);
            access.reads.extend(body.reads);
            access.writes.extend(body.writes);
        }
        Statement::If(branch) => {
            read_expr(&branch.condition, access);
            for body_statement in branch.then_branch.iter().chain(&branch.else_branch) {
                collect_access(body_statement, access);
            }
        }
        Statement::Insert(insert) => {
            read_expr(&insert.target, access);
            for value in &insert.values {
                read_expr(value, access);
            }
        }
        Statement::Update(update) => {
            read_expr(&update.target, access);
            for (_, value) in &update.assignments {
                read_expr(value, access);
            }
            if let Some(where_clause) = &update.where_clause {
                read_expr(where_clause, access);
            }
        }
        Statement::Delete(delete) => {
            read_expr(&delete.target, access);
            if let Some(where_clause) = &delete.where_clause {
                read_expr(where_clause, access);
            }
        }
        Statement::With(with) => {
            for cte in &with.ctes {
                collect_access(&cte.statement, access);
                access.writes.insert(cte.name.clone());
            }
            collect_access(&with.body, access);
        }
        Statement::Empty(_) => {}
    }
}

/// A FOR loop fans out when its collection is a literal array and its body
/// writes no variables that outlive an iteration.
fn collect_parallel_loops(statement: &Statement, loops: &mut HashSet<(usize, usize)>) {
    match statement {
        Statement::For(for_loop) => {
            let literal_collection = matches!(for_loop.iterable, Expression::Array(_, _));
            if literal_collection {
                let mut body = Access::default();
                for body_statement in &for_loop.body {
                    collect_access(body_statement, &mut body);
                }
                body.writes.remove(&for_loop.variable);
                if body.writes.is_empty() {
                    let span = for_loop.span.clone();
                    loops.insert((span.start, span.end));
                }
            }
            for body_statement in &for_loop.body {
                collect_parallel_loops(body_statement, loops);
            }
        }
        Statement::If(branch) => {
            for body_statement in branch.then_branch.iter().chain(&branch.else_branch) {
                collect_parallel_loops(body_statement, loops);
            }
        }
        Statement::With(with) => {
            for cte in &with.ctes {
                collect_parallel_loops(&cte.statement, loops);
            }
            collect_parallel_loops(&with.body, loops);
        }
        _ => {}
    }
}
