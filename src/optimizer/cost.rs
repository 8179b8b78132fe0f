//! Deterministic cost estimation over the AST.
//!
//! The model is schema-free: costs depend only on statement shape, not on
//! data. All figures are milliseconds. The same model prices execution-plan
//! steps in the planner, so estimates line up across compile stages.

use crate::ast::expression::Expression;
use crate::ast::statement::{SelectSource, Statement};
use crate::ast::Program;
use std::ops::{Add, AddAssign};

/// Base costs and scale factors, configurable per engine.
#[derive(Debug, Clone)]
pub struct CostModel {
    pub navigate: f64,
    pub dom_query: f64,
    pub click: f64,
    pub type_text: f64,
    /// Cost per millisecond of explicit waiting.
    pub wait_per_ms: f64,
    pub screenshot: f64,
    pub render: f64,
    pub cache_lookup: f64,
    /// Signed adjustment applied when a cache hit is assumed.
    pub cache_hit: f64,
    pub network_request: f64,
    pub dom_traversal: f64,
    pub js_execution: f64,
    pub network_latency_factor: f64,
    pub dom_complexity_factor: f64,
    pub parallelism_factor: f64,
    /// Iterations assumed for loops whose trip count is unknown.
    pub assumed_iterations: usize,
}

impl Default for CostModel {
    fn default() -> Self {
        Self {
            navigate: 500.0,
            dom_query: 10.0,
            click: 50.0,
            type_text: 100.0,
            wait_per_ms: 1.0,
            screenshot: 200.0,
            render: 200.0,
            cache_lookup: 5.0,
            cache_hit: -450.0,
            network_request: 100.0,
            dom_traversal: 0.1,
            js_execution: 0.01,
            network_latency_factor: 1.5,
            dom_complexity_factor: 1.2,
            parallelism_factor: 0.7,
            assumed_iterations: 10,
        }
    }
}

/// A cost broken into components; `total` is their sum.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Cost {
    pub compute: f64,
    pub network: f64,
    pub render: f64,
    pub cache_lookup: f64,
    /// Signed cache-hit adjustment; the only component allowed negative.
    pub cache_hit_adjustment: f64,
}

impl Cost {
    /// The summed total in milliseconds.
    pub fn total(&self) -> f64 {
        self.compute + self.network + self.render + self.cache_lookup + self.cache_hit_adjustment
    }

    /// Scales every component.
    pub fn scale(self, factor: f64) -> Cost {
        Cost {
            compute: self.compute * factor,
            network: self.network * factor,
            render: self.render * factor,
            cache_lookup: self.cache_lookup * factor,
            cache_hit_adjustment: self.cache_hit_adjustment * factor,
        }
    }
}

impl Add for Cost {
    type Output = Cost;

    fn add(self, other: Cost) -> Cost {
        Cost {
            compute: self.compute + other.compute,
            network: self.network + other.network,
            render: self.render + other.render,
            cache_lookup: self.cache_lookup + other.cache_lookup,
            cache_hit_adjustment: self.cache_hit_adjustment + other.cache_hit_adjustment,
        }
    }
}

impl AddAssign for Cost {
    fn add_assign(&mut self, other: Cost) {
        *self = *self + other;
    }
}

/// Deterministic cost estimator.
#[derive(Debug, Clone, Default)]
pub struct CostEstimator {
    model: CostModel,
}

impl CostEstimator {
    /// Creates an estimator with the default model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an estimator with a custom model.
    pub fn with_model(model: CostModel) -> Self {
        Self { model }
    }

    /// Returns the underlying model.
    pub fn model(&self) -> &CostModel {
        &self.model
    }

    /// Estimates a whole program (sum over statements).
    pub fn estimate_program(&self, program: &Program) -> Cost {
        program
            .statements
            .iter()
            .fold(Cost::default(), |acc, statement| {
                acc + self.estimate_statement(statement)
            })
    }

    /// Estimates one statement.
    pub fn estimate_statement(&self, statement: &Statement) -> Cost {
        let model = &self.model;
        match statement {
            Statement::Select(select) => {
                let mut cost = Cost {
                    compute: model.dom_query * model.dom_complexity_factor
                        + select.fields.len() as f64 * model.dom_traversal,
                    ..Cost::default()
                };
                if let Some(where_clause) = &select.where_clause {
                    cost.compute += self.expression_cost(where_clause);
                }
                cost.compute += select.order_by.len() as f64 * model.dom_query;
                match &select.source {
                    SelectSource::Url(_, _) => {
                        cost.network += model.navigate * model.network_latency_factor;
                        cost.cache_lookup += model.cache_lookup;
                    }
                    SelectSource::Subquery(subquery, _) => {
                        cost += self.estimate_statement(subquery);
                    }
                    SelectSource::Variable(_, _) => {}
                }
                cost
            }
            Statement::Navigate(navigate) => {
                let mut cost = Cost {
                    network: model.navigate * model.network_latency_factor,
                    render: model.render,
                    compute: self.expression_cost(&navigate.url)
                        + navigate.capture.len() as f64 * model.dom_query,
                    ..Cost::default()
                };
                if let Some(options) = &navigate.options {
                    if options.screenshot {
                        cost.render += model.screenshot;
                    }
                    if options.wait_for.is_some() || options.wait_until.is_some() {
                        cost.compute += model.dom_query;
                    }
                }
                cost
            }
            Statement::For(for_loop) => {
                let body: Cost = for_loop
                    .body
                    .iter()
                    .fold(Cost::default(), |acc, s| acc + self.estimate_statement(s));
                let iterations = self.assumed_iterations(&for_loop.iterable);
                let mut cost = body.scale(iterations as f64);
                cost.compute += self.expression_cost(&for_loop.iterable);
                cost
            }
            Statement::If(branch) => {
                let then_cost: Cost = branch
                    .then_branch
                    .iter()
                    .fold(Cost::default(), |acc, s| acc + self.estimate_statement(s));
                let else_cost: Cost = branch
                    .else_branch
                    .iter()
                    .fold(Cost::default(), |acc, s| acc + self.estimate_statement(s));
                let mut cost = (then_cost + else_cost).scale(0.5);
                cost.compute += self.expression_cost(&branch.condition);
                cost
            }
            Statement::Set(set) => Cost {
                compute: self.expression_cost(&set.value) + model.js_execution,
                ..Cost::default()
            },
            Statement::Show(_) => Cost {
                cache_lookup: model.cache_lookup,
                ..Cost::default()
            },
            Statement::Insert(insert) => Cost {
                compute: model.type_text
                    + insert
                        .values
                        .iter()
                        .map(|v| self.expression_cost(v))
                        .sum::<f64>(),
                ..Cost::default()
            },
            Statement::Update(update) => Cost {
                compute: update
                    .assignments
                    .iter()
                    .map(|(_, value)| model.dom_query + self.expression_cost(value))
                    .sum::<f64>()
                    + update
                        .where_clause
                        .as_ref()
                        .map(|w| self.expression_cost(w))
                        .unwrap_or(0.0),
                ..Cost::default()
            },
            Statement::Delete(delete) => Cost {
                compute: model.dom_query
                    + delete
                        .where_clause
                        .as_ref()
                        .map(|w| self.expression_cost(w))
                        .unwrap_or(0.0),
                ..Cost::default()
            },
            Statement::With(with) => {
                let mut cost = Cost::default();
                for cte in &with.ctes {
                    cost += self.estimate_statement(&cte.statement);
                }
                cost + self.estimate_statement(&with.body)
            }
            Statement::Empty(_) => Cost::default(),
        }
    }

    /// Per-node expression overhead: operators cost a JS-execution tick,
    /// member access a DOM traversal, calls a DOM-query-sized dispatch.
    pub fn expression_cost(&self, expr: &Expression) -> f64 {
        let model = &self.model;
        match expr {
            Expression::Literal(_, _) | Expression::Identifier(_, _) => 0.0,
            Expression::Binary(_, left, right, _) => {
                model.js_execution + self.expression_cost(left) + self.expression_cost(right)
            }
            Expression::Unary(_, operand, _) => model.js_execution + self.expression_cost(operand),
            Expression::Call(_, args, _) => {
                model.dom_query
                    + args.iter().map(|a| self.expression_cost(a)).sum::<f64>()
            }
            Expression::Member(object, property, _) => {
                let mut cost = model.dom_traversal + self.expression_cost(object);
                if let crate::ast::MemberProperty::Computed(index) = property {
                    cost += self.expression_cost(index);
                }
                cost
            }
            Expression::Array(elements, _) => {
                model.js_execution
                    + elements.iter().map(|e| self.expression_cost(e)).sum::<f64>()
            }
            Expression::Object(properties, _) => {
                model.js_execution
                    + properties
                        .iter()
                        .map(|p| self.expression_cost(&p.value))
                        .sum::<f64>()
            }
        }
    }

    /// Assumed loop trip count: literal arrays use their length, everything
    /// else the configured assumption.
    pub fn assumed_iterations(&self, iterable: &Expression) -> usize {
        match iterable {
            Expression::Array(elements, _) => elements.len(),
            _ => self.model.assumed_iterations,
        }
    }

    /// Applies the parallelism discount for the largest concurrent group of
    /// size `n`: `total × (1 − factor × (n−1)/n)`.
    pub fn apply_parallelism(&self, total: f64, group_size: usize) -> f64 {
        if group_size <= 1 {
            return total;
        }
        let n = group_size as f64;
        total * (1.0 - self.model.parallelism_factor * (n - 1.0) / n)
    }

    /// Returns the (negative) cache-hit adjustment plus lookup overhead.
    pub fn cache_hit_discount(&self) -> f64 {
        self.model.cache_hit + self.model.cache_lookup
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::parser::Parser;

    fn estimate(source: &str) -> Cost {
        let lex = tokenize(source);
        let program = Parser::new(lex.tokens, source)
            .with_lexer_diagnostics(lex.diagnostics)
            .parse()
            .ast
            .expect("parse");
        CostEstimator::new().estimate_program(&program)
    }

    #[test]
    fn url_select_costs_more_than_variable_select() {
        let from_url = estimate("SELECT title FROM 'https://x.com'");
        let from_var = estimate("SELECT title FROM rows");
        assert!(from_url.total() > from_var.total());
        assert!(from_url.network > 0.0);
        assert_eq!(from_var.network, 0.0);
    }

    #[test]
    fn estimates_are_deterministic() {
        let a = estimate("SELECT a, b FROM 'https://x.com' WHERE a > 1 ORDER BY a");
        let b = estimate("SELECT a, b FROM 'https://x.com' WHERE a > 1 ORDER BY a");
        assert_eq!(a, b);
    }

    #[test]
    fn literal_loop_scales_by_length() {
        let two = estimate("FOR EACH u IN ['https://a.com', 'https://b.com'] { NAVIGATE TO u }");
        let three = estimate(
            "FOR EACH u IN ['https://a.com', 'https://b.com', 'https://c.com'] { NAVIGATE TO u }",
        );
        assert!(three.total() > two.total());
    }

    #[test]
    fn unknown_loop_assumes_ten_iterations() {
        let estimator = CostEstimator::new();
        let tokens = tokenize("urls").tokens;
        let expr = crate::parser::expression::parse_standalone_expression(&tokens).unwrap();
        assert_eq!(estimator.assumed_iterations(&expr), 10);
    }

    #[test]
    fn if_averages_branches() {
        let both = estimate(
            "IF flag THEN { NAVIGATE TO 'https://a.com' } ELSE { NAVIGATE TO 'https://a.com' }",
        );
        let single = estimate("NAVIGATE TO 'https://a.com'");
        // Averaging two identical branches costs about one branch.
        assert!((both.total() - single.total()).abs() < 1.0);
    }

    #[test]
    fn parallelism_discount_formula() {
        let estimator = CostEstimator::new();
        assert_eq!(estimator.apply_parallelism(1000.0, 1), 1000.0);
        let discounted = estimator.apply_parallelism(1000.0, 2);
        assert!((discounted - 650.0).abs() < 1e-9);
    }

    #[test]
    fn non_negative_components() {
        let cost = estimate("SELECT a FROM 'https://x.com' LIMIT 5");
        assert!(cost.compute >= 0.0);
        assert!(cost.network >= 0.0);
        assert!(cost.render >= 0.0);
        assert!(cost.cache_lookup >= 0.0);
    }
}
