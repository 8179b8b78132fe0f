//! Lowers an optimized program into an execution plan.
//!
//! The planner assigns sequential step ids (`step_1`, `step_2`, ...) and
//! threads dependency lists through recursive lowering. Loop and branch
//! bodies are planned detached and wrapped inside their LOOP/BRANCH step;
//! only top-level steps enter the dependency graph.

use crate::ast::expression::{BinaryOperator, Expression, Literal};
use crate::ast::statement::{SelectSource, SelectStatement, Statement};
use crate::error::{EngineError, EngineResult};
use crate::fields;
use crate::optimizer::{
    pushdown::split_conjuncts, CacheDecision, CostEstimator, CostModel, OptimizationOutcome,
    ParallelReport,
};
use crate::plan::{
    count_navigations, count_steps, DependencyGraph, ExecutionPlan, FieldExtraction, PlanMetadata,
    ResourceRequirements, SortKey, Step, StepKind,
};
use smol_str::SmolStr;

/// The planner.
#[derive(Debug, Clone, Default)]
pub struct Planner {
    model: CostModel,
}

impl Planner {
    /// Creates a planner with the default cost model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a planner with a custom cost model.
    pub fn with_model(model: CostModel) -> Self {
        Self { model }
    }

    /// Plans an optimized program.
    pub fn plan(&self, outcome: &OptimizationOutcome) -> EngineResult<ExecutionPlan> {
        let estimator = CostEstimator::with_model(self.model.clone());
        let mut counter = 0usize;
        let mut resources = ResourceRequirements::default();
        let mut builder = StepBuilder {
            estimator: &estimator,
            parallel: &outcome.parallel,
            counter: &mut counter,
            resources: &mut resources,
            steps: Vec::new(),
        };

        let mut previous: Option<SmolStr> = None;
        let mut group_entry_deps: Vec<SmolStr> = Vec::new();
        let mut result_step = None;

        for (index, statement) in outcome.program.statements.iter().enumerate() {
            let in_group_with_previous = index > 0
                && outcome
                    .parallel
                    .statement_groups
                    .iter()
                    .any(|group| group.contains(&index) && group.contains(&(index - 1)));

            let deps: Vec<SmolStr> = if in_group_with_previous {
                // Same wave as the previous statement: share its entry deps.
                group_entry_deps.clone()
            } else {
                let deps: Vec<SmolStr> = previous.iter().cloned().collect();
                group_entry_deps = deps.clone();
                deps
            };

            let cache = outcome.cache_decisions.get(index);
            if let Some(last) = builder.plan_statement(statement, deps, cache)? {
                // Parallel-wave members each become `previous` in turn; the
                // next sequential statement depends on the final member.
                previous = Some(last.clone());
                result_step = Some(last);
            }
        }

        let steps = builder.steps;
        let graph = DependencyGraph::build(&steps)?;
        let parallel_groups = graph.parallel_groups();
        let cacheable_steps: Vec<SmolStr> = collect_cacheable(&steps);
        let estimated_cost_ms = total_cost(&steps);

        let plan = ExecutionPlan {
            metadata: PlanMetadata {
                estimated_cost_ms,
                step_count: count_steps(&steps),
                navigation_count: count_navigations(&steps),
                result_step,
            },
            parallel_groups,
            cacheable_steps,
            resources,
            steps,
        };
        plan.validate()?;
        Ok(plan)
    }
}

/// Mutable planning state. Nested bodies use a detached builder sharing the
/// id counter and resource tally.
struct StepBuilder<'a> {
    estimator: &'a CostEstimator,
    parallel: &'a ParallelReport,
    counter: &'a mut usize,
    resources: &'a mut ResourceRequirements,
    steps: Vec<Step>,
}

impl<'a> StepBuilder<'a> {
    fn next_id(&mut self) -> SmolStr {
        *self.counter += 1;
        SmolStr::new(format!("step_{}", self.counter))
    }

    fn model(&self) -> &CostModel {
        self.estimator.model()
    }

    /// Pushes a step, updating the resource tally.
    fn push(&mut self, step: Step) -> SmolStr {
        self.bump_resources(&step.kind);
        let id = step.id.clone();
        self.steps.push(step);
        id
    }

    fn bump_resources(&mut self, kind: &StepKind) {
        let resources = &mut *self.resources;
        match kind {
            StepKind::Navigate { .. } => {
                resources.browsers = resources.browsers.max(1);
                resources.pages += 1;
                resources.connections += 1;
                resources.memory_mb += 100;
                resources.cpu_percent = resources.cpu_percent.max(30);
            }
            StepKind::DomQuery { .. } => {
                resources.cpu_percent = resources.cpu_percent.max(20);
                resources.memory_mb += 10;
            }
            StepKind::Screenshot { .. } | StepKind::Pdf => {
                resources.memory_mb += 50;
                resources.cpu_percent = resources.cpu_percent.max(40);
            }
            StepKind::EvaluateJs { .. } => {
                resources.memory_mb += 20;
                resources.cpu_percent = resources.cpu_percent.max(25);
            }
            StepKind::Parallel { .. } => {
                resources.cpu_percent = resources.cpu_percent.max(60);
            }
            _ => {}
        }
    }

    /// Plans one statement; returns the id of its last step, or None when
    /// the statement lowers to nothing.
    fn plan_statement(
        &mut self,
        statement: &Statement,
        deps: Vec<SmolStr>,
        cache: Option<&CacheDecision>,
    ) -> EngineResult<Option<SmolStr>> {
        match statement {
            Statement::Select(select) => self.plan_select(select, deps).map(Some),
            Statement::Navigate(navigate) => {
                let cacheable = match cache {
                    Some(decision) => decision.cacheable,
                    None => {
                        matches!(navigate.url, Expression::Literal(Literal::String(_), _))
                            && !navigate
                                .options
                                .as_ref()
                                .is_some_and(|options| options.cache_disabled())
                    }
                };
                let cache_key = if cacheable {
                    match cache.and_then(|decision| decision.cache_key.clone()) {
                        Some(key) => Some(key),
                        None => match &navigate.url {
                            Expression::Literal(Literal::String(url), _) => {
                                Some(format!("navigate:{url}"))
                            }
                            _ => None,
                        },
                    }
                } else {
                    None
                };
                let cacheable = cacheable && cache_key.is_some();

                let id = self.next_id();
                let nav_id = self.push(Step {
                    id,
                    kind: StepKind::Navigate {
                        url: navigate.url.clone(),
                        options: navigate.options.clone(),
                    },
                    estimated_cost: self.model().navigate,
                    dependencies: deps,
                    cacheable,
                    cache_key,
                });

                if navigate.capture.is_empty() {
                    return Ok(Some(nav_id));
                }

                let fields = navigate
                    .capture
                    .iter()
                    .filter(|field| !field.is_wildcard())
                    .map(|field| FieldExtraction {
                        name: field.output_name().clone(),
                        expr: field.expr.clone(),
                    })
                    .collect();
                let wildcard = navigate.capture.iter().any(|field| field.is_wildcard());
                let id = self.next_id();
                let dq_id = self.push(Step {
                    id,
                    kind: StepKind::DomQuery {
                        selector: "body".into(),
                        input: None,
                        fields,
                        wildcard,
                    },
                    estimated_cost: self.model().dom_query,
                    dependencies: vec![nav_id],
                    cacheable: false,
                    cache_key: None,
                });
                Ok(Some(dq_id))
            }
            Statement::Set(set) => {
                let id = self.next_id();
                let id = self.push(Step {
                    id,
                    kind: StepKind::Assign {
                        name: set.variable_name(),
                        value: set.value.clone(),
                    },
                    estimated_cost: self.estimator.expression_cost(&set.value)
                        + self.model().js_execution,
                    dependencies: deps,
                    cacheable: false,
                    cache_key: None,
                });
                Ok(Some(id))
            }
            Statement::Show(show) => {
                let id = self.next_id();
                let id = self.push(Step {
                    id,
                    kind: StepKind::ReadVariable {
                        name: show.target.clone(),
                    },
                    estimated_cost: self.model().cache_lookup,
                    dependencies: deps,
                    cacheable: false,
                    cache_key: None,
                });
                Ok(Some(id))
            }
            Statement::For(for_loop) => {
                let span_key = (for_loop.span.start, for_loop.span.end);
                let fan_out = self.parallel.parallel_loops.contains(&span_key);

                if fan_out {
                    if let Expression::Array(elements, _) = &for_loop.iterable {
                        return self.plan_parallel_loop(for_loop, elements, deps).map(Some);
                    }
                }

                let body = self.plan_detached(&for_loop.body)?;
                let body_cost: f64 = total_cost(&body);
                let id = self.next_id();
                let id = self.push(Step {
                    id,
                    kind: StepKind::Loop {
                        variable: for_loop.variable.clone(),
                        collection: for_loop.iterable.clone(),
                        body,
                    },
                    estimated_cost: body_cost * 10.0,
                    dependencies: deps,
                    cacheable: false,
                    cache_key: None,
                });
                Ok(Some(id))
            }
            Statement::If(branch) => {
                let then_steps = self.plan_detached(&branch.then_branch)?;
                let else_steps = self.plan_detached(&branch.else_branch)?;
                let estimated_cost = self.estimator.expression_cost(&branch.condition)
                    + (total_cost(&then_steps) + total_cost(&else_steps)) / 2.0;
                let id = self.next_id();
                let id = self.push(Step {
                    id,
                    kind: StepKind::Branch {
                        condition: branch.condition.clone(),
                        then_steps,
                        else_steps,
                    },
                    estimated_cost,
                    dependencies: deps,
                    cacheable: false,
                    cache_key: None,
                });
                Ok(Some(id))
            }
            Statement::Insert(insert) => {
                let selector = target_selector(&insert.target, "input");
                let text = if insert.values.len() == 1 {
                    insert.values[0].clone()
                } else {
                    let span = insert.span.clone();
                    Expression::Array(insert.values.clone(), span)
                };
                let id = self.next_id();
                let id = self.push(Step {
                    id,
                    kind: StepKind::Type { selector, text },
                    estimated_cost: self.model().type_text,
                    dependencies: deps,
                    cacheable: false,
                    cache_key: None,
                });
                Ok(Some(id))
            }
            Statement::Update(update) => {
                let selector = target_selector(&update.target, "body");
                let mut last: Option<SmolStr> = None;
                for (name, value) in &update.assignments {
                    let script = format!(
                        "document.querySelectorAll('{selector}').forEach((el) => {{ el.{name} = {}; }})",
                        crate::ast::printer::print_expression(value)
                    );
                    let step_deps = match &last {
                        Some(previous) => vec![previous.clone()],
                        None => deps.clone(),
                    };
                    let id = self.next_id();
                    let id = self.push(Step {
                        id,
                        kind: StepKind::EvaluateJs { script },
                        estimated_cost: self.model().dom_query,
                        dependencies: step_deps,
                        cacheable: false,
                        cache_key: None,
                    });
                    last = Some(id);
                }
                Ok(last)
            }
            Statement::Delete(delete) => {
                let selector = target_selector(&delete.target, "body");
                let script = format!(
                    "document.querySelectorAll('{selector}').forEach((el) => el.remove())"
                );
                let id = self.next_id();
                let id = self.push(Step {
                    id,
                    kind: StepKind::EvaluateJs { script },
                    estimated_cost: self.model().dom_query,
                    dependencies: deps,
                    cacheable: false,
                    cache_key: None,
                });
                Ok(Some(id))
            }
            Statement::With(with) => {
                let mut cte_ids = Vec::new();
                for cte in &with.ctes {
                    let last = self
                        .plan_statement(&cte.statement, deps.clone(), None)?
                        .ok_or_else(|| {
                            EngineError::validation(format!(
                                "CTE '{}' lowers to no steps",
                                cte.name
                            ))
                        })?;
                    // Bind the CTE name to the chain's result.
                    let id = self.next_id();
                    let assign_id = self.push(Step {
                        id,
                        kind: StepKind::Assign {
                            name: cte.name.clone(),
                            value: Expression::Identifier(last.clone(), cte.span.clone()),
                        },
                        estimated_cost: self.model().js_execution,
                        dependencies: vec![last],
                        cacheable: false,
                        cache_key: None,
                    });
                    cte_ids.push(assign_id);
                }
                self.plan_statement(&with.body, cte_ids, None)
            }
            Statement::Empty(_) => Ok(None),
        }
    }

    /// SELECT lowering: NAVIGATE -> DOM_QUERY -> FILTER? -> SORT? -> LIMIT?.
    fn plan_select(
        &mut self,
        select: &SelectStatement,
        deps: Vec<SmolStr>,
    ) -> EngineResult<SmolStr> {
        let (mut last, input) = match &select.source {
            SelectSource::Url(url, span) => {
                let id = self.next_id();
                let nav_id = self.push(Step {
                    id,
                    kind: StepKind::Navigate {
                        url: Expression::Literal(Literal::String(url.clone()), span.clone()),
                        options: None,
                    },
                    estimated_cost: self.model().navigate,
                    dependencies: deps,
                    cacheable: true,
                    cache_key: Some(format!("nav:{url}")),
                });
                (nav_id, None)
            }
            SelectSource::Subquery(subquery, _) => {
                let last = self
                    .plan_statement(subquery, deps, None)?
                    .ok_or_else(|| EngineError::validation("subquery lowers to no steps"))?;
                (last.clone(), Some(last))
            }
            SelectSource::Variable(name, _) => {
                // No producing step: the DOM_QUERY reads the variable and
                // inherits the incoming dependencies.
                let placeholder = name.clone();
                let dq = self.push_dom_query(select, Some(placeholder), deps);
                return Ok(self.finish_select(select, dq));
            }
        };

        let dq_deps = vec![last.clone()];
        last = self.push_dom_query(select, input, dq_deps);
        Ok(self.finish_select(select, last))
    }

    fn push_dom_query(
        &mut self,
        select: &SelectStatement,
        input: Option<SmolStr>,
        deps: Vec<SmolStr>,
    ) -> SmolStr {
        let selector = self.infer_selector(select);
        let fields = select
            .fields
            .iter()
            .filter(|field| !field.is_wildcard())
            .map(|field| FieldExtraction {
                name: field.output_name().clone(),
                expr: field.expr.clone(),
            })
            .collect();
        let id = self.next_id();
        self.push(Step {
            id,
            kind: StepKind::DomQuery {
                selector,
                input,
                fields,
                wildcard: select.is_wildcard(),
            },
            estimated_cost: self.model().dom_query,
            dependencies: deps,
            cacheable: false,
            cache_key: None,
        })
    }

    /// Appends FILTER/SORT/LIMIT after the projection, in that order.
    fn finish_select(&mut self, select: &SelectStatement, mut last: SmolStr) -> SmolStr {
        if let Some(predicate) = residual_predicate(select) {
            let id = self.next_id();
            last = self.push(Step {
                id,
                kind: StepKind::Filter {
                    input: last.clone(),
                    predicate: predicate.clone(),
                },
                estimated_cost: self.estimator.expression_cost(&predicate),
                dependencies: vec![last],
                cacheable: false,
                cache_key: None,
            });
        }

        if !select.order_by.is_empty() {
            let keys = select
                .order_by
                .iter()
                .map(|key| SortKey {
                    field: key.name.clone(),
                    descending: key.descending,
                })
                .collect();
            let id = self.next_id();
            last = self.push(Step {
                id,
                kind: StepKind::Sort {
                    input: last.clone(),
                    keys,
                },
                estimated_cost: select.order_by.len() as f64 * self.model().dom_query,
                dependencies: vec![last],
                cacheable: false,
                cache_key: None,
            });
        }

        if let Some(limit) = select.limit {
            let id = self.next_id();
            last = self.push(Step {
                id,
                kind: StepKind::Limit {
                    input: last.clone(),
                    limit,
                    offset: select.offset.unwrap_or(0),
                },
                estimated_cost: self.model().js_execution,
                dependencies: vec![last],
                cacheable: false,
                cache_key: None,
            });
        }

        last
    }

    /// Selector inference: URL fragment, selector-shaped field names,
    /// `WHERE selector = '...'`, then `body`.
    fn infer_selector(&self, select: &SelectStatement) -> SmolStr {
        if let SelectSource::Url(url, _) = &select.source {
            if let Some(selector) = fields::selector_from_url(url) {
                return selector;
            }
        }
        for field in &select.fields {
            if fields::looks_like_selector(field.name.as_str()) {
                return field.name.clone();
            }
        }
        if let Some(where_clause) = &select.where_clause {
            if let Some(selector) = fields::selector_from_predicate(where_clause) {
                return selector;
            }
        }
        "body".into()
    }

    /// Unrolls a fan-out loop: one SEQUENTIAL chain per element, all under
    /// one PARALLEL step.
    fn plan_parallel_loop(
        &mut self,
        for_loop: &crate::ast::statement::ForStatement,
        elements: &[Expression],
        deps: Vec<SmolStr>,
    ) -> EngineResult<SmolStr> {
        let mut children = Vec::with_capacity(elements.len());
        for element in elements {
            let mut chain = Vec::new();
            let assign_id = self.next_id();
            chain.push(Step {
                id: assign_id.clone(),
                kind: StepKind::Assign {
                    name: for_loop.variable.clone(),
                    value: element.clone(),
                },
                estimated_cost: self.model().js_execution,
                dependencies: Vec::new(),
                cacheable: false,
                cache_key: None,
            });

            let mut body = self.plan_detached_with_entry(&for_loop.body, vec![assign_id])?;
            chain.append(&mut body);
            let chain_cost = total_cost(&chain);

            let id = self.next_id();
            children.push(Step {
                id,
                kind: StepKind::Sequential { children: chain },
                estimated_cost: chain_cost,
                dependencies: Vec::new(),
                cacheable: false,
                cache_key: None,
            });
        }

        let estimated_cost = children
            .iter()
            .map(|child| child.estimated_cost)
            .fold(0.0, f64::max);
        let id = self.next_id();
        let id = self.push(Step {
            id,
            kind: StepKind::Parallel { children },
            estimated_cost,
            dependencies: deps,
            cacheable: false,
            cache_key: None,
        });
        Ok(id)
    }

    /// Plans statements into a detached step list (loop/branch bodies).
    fn plan_detached(&mut self, statements: &[Statement]) -> EngineResult<Vec<Step>> {
        self.plan_detached_with_entry(statements, Vec::new())
    }

    fn plan_detached_with_entry(
        &mut self,
        statements: &[Statement],
        entry_deps: Vec<SmolStr>,
    ) -> EngineResult<Vec<Step>> {
        let mut nested = StepBuilder {
            estimator: self.estimator,
            parallel: self.parallel,
            counter: &mut *self.counter,
            resources: &mut *self.resources,
            steps: Vec::new(),
        };
        let mut previous: Option<SmolStr> = None;
        for statement in statements {
            let deps = match &previous {
                Some(last) => vec![last.clone()],
                None => entry_deps.clone(),
            };
            if let Some(last) = nested.plan_statement(statement, deps, None)? {
                previous = Some(last);
            }
        }
        Ok(nested.steps)
    }
}

/// The WHERE predicate minus any `selector = '...'` conjunct consumed by
/// selector inference.
fn residual_predicate(select: &SelectStatement) -> Option<Expression> {
    let where_clause = select.where_clause.as_ref()?;
    let conjuncts: Vec<Expression> = split_conjuncts(where_clause)
        .into_iter()
        .filter(|conjunct| !is_selector_binding(conjunct))
        .cloned()
        .collect();
    let mut iter = conjuncts.into_iter();
    let first = iter.next()?;
    Some(iter.fold(first, |acc, conjunct| {
        let span = acc.span().start..conjunct.span().end;
        Expression::Binary(BinaryOperator::And, Box::new(acc), Box::new(conjunct), span)
    }))
}

fn is_selector_binding(conjunct: &Expression) -> bool {
    match conjunct {
        Expression::Binary(BinaryOperator::Eq, left, right, _) => {
            left.as_identifier().map(SmolStr::as_str) == Some("selector")
                && matches!(right.as_literal(), Some(Literal::String(_)))
        }
        _ => false,
    }
}

/// Chooses a CSS selector for interaction targets: string literals are
/// selectors themselves, identifiers name their element, anything else
/// falls back to the default.
fn target_selector(target: &Expression, default: &str) -> SmolStr {
    match target {
        Expression::Literal(Literal::String(value), _) => value.clone(),
        Expression::Identifier(name, _) => name.clone(),
        _ => default.into(),
    }
}

fn collect_cacheable(steps: &[Step]) -> Vec<SmolStr> {
    steps
        .iter()
        .filter(|step| step.cacheable)
        .map(|step| step.id.clone())
        .collect()
}

fn total_cost(steps: &[Step]) -> f64 {
    steps.iter().map(|step| step.estimated_cost).sum()
}
