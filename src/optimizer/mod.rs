//! Query optimization.
//!
//! The driver runs the enabled rewrite passes in order, up to a bounded
//! number of iterations or until a fixed point. After each pass the program
//! cost is recomputed; a rewrite is kept only when it does not increase
//! total cost. The two analysis passes (cacheability, parallel detection)
//! never mutate the AST; their results ride along as metadata for the
//! planner and engine.

pub mod cacheability;
pub mod cost;
pub mod dead_code;
pub mod folding;
pub mod parallelism;
pub mod pushdown;

use crate::ast::{Program, Statement};
pub use cacheability::CacheDecision;
pub use cost::{Cost, CostEstimator, CostModel};
pub use parallelism::ParallelReport;
use tracing::debug;

/// The optimization passes, in driver order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassKind {
    ConstantFolding,
    DeadCodeElimination,
    PredicatePushdown,
    ProjectionPushdown,
    CacheabilityAnalysis,
    ParallelDetection,
}

impl PassKind {
    /// All passes in execution order.
    pub fn all() -> Vec<PassKind> {
        vec![
            PassKind::ConstantFolding,
            PassKind::DeadCodeElimination,
            PassKind::PredicatePushdown,
            PassKind::ProjectionPushdown,
            PassKind::CacheabilityAnalysis,
            PassKind::ParallelDetection,
        ]
    }

    /// Display name used in metadata.
    pub fn name(&self) -> &'static str {
        match self {
            PassKind::ConstantFolding => "constant-folding",
            PassKind::DeadCodeElimination => "dead-code-elimination",
            PassKind::PredicatePushdown => "predicate-pushdown",
            PassKind::ProjectionPushdown => "projection-pushdown",
            PassKind::CacheabilityAnalysis => "cacheability-analysis",
            PassKind::ParallelDetection => "parallel-detection",
        }
    }
}

/// Optimizer configuration.
#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    /// Which passes run, in [`PassKind::all`] order.
    pub enabled_passes: Vec<PassKind>,
    /// Maximum driver iterations over the rewrite passes.
    pub max_passes: usize,
    /// Cost model used for keep/revert decisions.
    pub cost_model: CostModel,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            enabled_passes: PassKind::all(),
            max_passes: 3,
            cost_model: CostModel::default(),
        }
    }
}

/// Everything the optimizer learned about a program.
#[derive(Debug, Clone)]
pub struct OptimizationOutcome {
    /// The rewritten program.
    pub program: Program,
    /// Passes that changed the program (or ran as analysis).
    pub applied_passes: Vec<PassKind>,
    /// Cost of the program as parsed.
    pub original_cost: Cost,
    /// Cost of the rewritten program, before discounts.
    pub optimized_cost: Cost,
    /// Total estimate with parallelism and cache-hit discounts applied.
    pub estimated_total_ms: f64,
    /// Cache metadata per top-level statement of the rewritten program.
    pub cache_decisions: Vec<CacheDecision>,
    /// Parallel groups and fan-out loops.
    pub parallel: ParallelReport,
}

/// The optimization driver.
#[derive(Debug, Clone, Default)]
pub struct Optimizer {
    config: OptimizerConfig,
}

impl Optimizer {
    /// Creates an optimizer with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an optimizer with the given configuration.
    pub fn with_config(config: OptimizerConfig) -> Self {
        Self { config }
    }

    fn enabled(&self, pass: PassKind) -> bool {
        self.config.enabled_passes.contains(&pass)
    }

    /// Optimizes a program.
    pub fn optimize(&self, program: Program) -> OptimizationOutcome {
        let estimator = CostEstimator::with_model(self.config.cost_model.clone());
        let original_cost = estimator.estimate_program(&program);

        let mut current = program;
        let mut applied: Vec<PassKind> = Vec::new();

        for iteration in 0..self.config.max_passes {
            let mut iteration_changed = false;

            for pass in [
                PassKind::ConstantFolding,
                PassKind::DeadCodeElimination,
                PassKind::PredicatePushdown,
                PassKind::ProjectionPushdown,
            ] {
                if !self.enabled(pass) {
                    continue;
                }
                let (candidate, changed) = self.run_rewrite(pass, &current);
                if !changed {
                    continue;
                }

                let before = estimator.estimate_program(&current).total();
                let after = estimator.estimate_program(&candidate).total();
                if after <= before {
                    debug!(pass = pass.name(), iteration, before, after, "pass kept");
                    current = candidate;
                    if !applied.contains(&pass) {
                        applied.push(pass);
                    }
                    iteration_changed = true;
                } else {
                    debug!(pass = pass.name(), iteration, before, after, "pass reverted");
                }
            }

            if !iteration_changed {
                break;
            }
        }

        // A fully-eliminated program keeps one no-op statement.
        if current.statements.is_empty() {
            current.statements.push(Statement::Empty(0..0));
        }

        let cache_decisions = if self.enabled(PassKind::CacheabilityAnalysis) {
            applied.push(PassKind::CacheabilityAnalysis);
            current
                .statements
                .iter()
                .map(cacheability::analyze_statement)
                .collect()
        } else {
            Vec::new()
        };

        let parallel = if self.enabled(PassKind::ParallelDetection) {
            applied.push(PassKind::ParallelDetection);
            parallelism::detect(&current)
        } else {
            ParallelReport::default()
        };

        let optimized_cost = estimator.estimate_program(&current);

        let largest_group = parallel
            .statement_groups
            .iter()
            .map(Vec::len)
            .max()
            .unwrap_or(1);
        let mut estimated_total_ms =
            estimator.apply_parallelism(optimized_cost.total(), largest_group);
        for decision in &cache_decisions {
            if decision.cacheable {
                estimated_total_ms += estimator.cache_hit_discount();
            }
        }
        let estimated_total_ms = estimated_total_ms.max(0.0);

        OptimizationOutcome {
            program: current,
            applied_passes: applied,
            original_cost,
            optimized_cost,
            estimated_total_ms,
            cache_decisions,
            parallel,
        }
    }

    fn run_rewrite(&self, pass: PassKind, program: &Program) -> (Program, bool) {
        match pass {
            PassKind::ConstantFolding => {
                let mut changed = false;
                let statements = program
                    .statements
                    .iter()
                    .map(|statement| {
                        let (folded, statement_changed) = folding::fold_statement(statement);
                        changed |= statement_changed;
                        folded
                    })
                    .collect();
                (Program::new(statements), changed)
            }
            PassKind::DeadCodeElimination => dead_code::eliminate_program(program),
            PassKind::PredicatePushdown => pushdown::push_predicates_program(program),
            PassKind::ProjectionPushdown => pushdown::prune_projections_program(program),
            PassKind::CacheabilityAnalysis | PassKind::ParallelDetection => {
                (program.clone(), false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::expression::{Expression, Literal};
    use crate::ast::statement::{SelectSource, Statement};
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

    fn optimize(source: &str) -> OptimizationOutcome {
        Optimizer::new().optimize(parse(source))
    }

    #[test]
    fn folding_is_applied() {
        let outcome = optimize("SELECT 2 + 3 AS n FROM 'about:blank'");
        assert!(outcome.applied_passes.contains(&PassKind::ConstantFolding));
        let Statement::Select(select) = &outcome.program.statements[0] else {
            panic!("expected SELECT");
        };
        assert!(matches!(
            select.fields[0].expr,
            Expression::Literal(Literal::Number(n), _) if n == 5.0
        ));
    }

    #[test]
    fn optimizer_is_monotone() {
        for source in [
            "SELECT 2 + 3 AS n FROM 'about:blank'",
            "IF FALSE THEN SHOW CACHE ELSE SHOW METRICS",
            "SELECT name FROM (SELECT name, age FROM 'https://x.com') WHERE age > 18",
            "SELECT title FROM 'https://x.com' ORDER BY title LIMIT 5",
        ] {
            let outcome = optimize(source);
            assert!(
                outcome.optimized_cost.total() <= outcome.original_cost.total(),
                "optimizer increased cost for {source}"
            );
        }
    }

    #[test]
    fn dead_branch_collapses_to_taken_side() {
        let outcome = optimize("IF FALSE THEN SHOW CACHE ELSE SHOW METRICS");
        assert_eq!(outcome.program.statements.len(), 1);
        assert!(matches!(
            &outcome.program.statements[0],
            Statement::Show(show) if show.target.as_str() == "METRICS"
        ));
    }

    #[test]
    fn fully_eliminated_program_becomes_noop() {
        let outcome = optimize("IF FALSE THEN SHOW CACHE");
        assert_eq!(outcome.program.statements.len(), 1);
        assert!(outcome.program.statements[0].is_empty());
    }

    #[test]
    fn pushdown_moves_predicate_inward() {
        let outcome =
            optimize("SELECT name FROM (SELECT name, age FROM 'https://x.com') WHERE age > 18");
        assert!(outcome
            .applied_passes
            .contains(&PassKind::PredicatePushdown));
        let Statement::Select(outer) = &outcome.program.statements[0] else {
            panic!("expected SELECT");
        };
        assert!(outer.where_clause.is_none());
        let SelectSource::Subquery(inner, _) = &outer.source else {
            panic!("expected subquery");
        };
        let Statement::Select(inner) = inner.as_ref() else {
            panic!("expected inner SELECT");
        };
        assert!(inner.where_clause.is_some());
    }

    #[test]
    fn cache_metadata_rides_along() {
        let outcome = optimize("SELECT title FROM 'https://x.com'");
        assert_eq!(outcome.cache_decisions.len(), 1);
        assert!(outcome.cache_decisions[0].cacheable);
        assert!(outcome.estimated_total_ms < outcome.optimized_cost.total());
    }

    #[test]
    fn disabled_passes_do_not_run() {
        let config = OptimizerConfig {
            enabled_passes: vec![PassKind::DeadCodeElimination],
            ..OptimizerConfig::default()
        };
        let outcome = Optimizer::with_config(config)
            .optimize(parse("SELECT 2 + 3 AS n FROM 'about:blank'"));
        let Statement::Select(select) = &outcome.program.statements[0] else {
            panic!("expected SELECT");
        };
        assert!(matches!(select.fields[0].expr, Expression::Binary(_, _, _, _)));
        assert!(outcome.cache_decisions.is_empty());
    }

    #[test]
    fn fixed_point_terminates() {
        // A program nothing can improve completes in one iteration.
        let outcome = optimize("SHOW METRICS");
        assert_eq!(outcome.program.statements.len(), 1);
    }
}
