//! Execution plans: typed steps, dependency edges, and plan-level metadata.

pub mod graph;
pub mod planner;
pub mod serialize;

use crate::ast::expression::Expression;
use crate::ast::statement::{NavigateOptions, WaitCondition};
use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

pub use graph::DependencyGraph;
pub use planner::Planner;
pub use serialize::{deserialize_plan, serialize_plan};

/// One projected field of a DOM query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldExtraction {
    /// Output column name.
    pub name: SmolStr,
    /// Expression evaluated per row to produce the column value.
    pub expr: Expression,
}

/// Join flavors supported by JOIN steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
}

/// One SORT key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortKey {
    pub field: SmolStr,
    pub descending: bool,
}

/// The unit of work in an execution plan.
///
/// Browser- and proxy-facing kinds are delegated to controllers; data kinds
/// (FILTER/MAP/REDUCE/JOIN/SORT/LIMIT) and control kinds (BRANCH/LOOP/
/// PARALLEL/SEQUENTIAL) execute inside the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StepKind {
    Navigate {
        url: Expression,
        options: Option<NavigateOptions>,
    },
    DomQuery {
        selector: SmolStr,
        /// Rows to project from instead of querying the DOM, when set.
        input: Option<SmolStr>,
        fields: Vec<FieldExtraction>,
        /// True when projecting `*`: rows pass through unchanged.
        wildcard: bool,
    },
    Click {
        selector: SmolStr,
    },
    Type {
        selector: SmolStr,
        text: Expression,
    },
    Wait {
        condition: WaitCondition,
        timeout_ms: f64,
    },
    Screenshot {
        full_page: bool,
    },
    Pdf,
    EvaluateJs {
        script: String,
    },
    InterceptRequest {
        pattern: String,
    },
    ModifyRequest {
        pattern: String,
        headers: Vec<(SmolStr, SmolStr)>,
    },
    CacheLookup {
        key: String,
    },
    CacheStore {
        key: String,
        ttl_ms: f64,
    },
    Filter {
        input: SmolStr,
        predicate: Expression,
    },
    Map {
        input: SmolStr,
        transform: Expression,
    },
    Reduce {
        input: SmolStr,
        initial: Expression,
        reducer: Expression,
    },
    Join {
        left: SmolStr,
        right: SmolStr,
        left_key: SmolStr,
        right_key: SmolStr,
        join_type: JoinType,
    },
    Sort {
        input: SmolStr,
        keys: Vec<SortKey>,
    },
    Limit {
        input: SmolStr,
        limit: u64,
        offset: u64,
    },
    Branch {
        condition: Expression,
        then_steps: Vec<Step>,
        else_steps: Vec<Step>,
    },
    Loop {
        variable: SmolStr,
        collection: Expression,
        body: Vec<Step>,
    },
    Parallel {
        children: Vec<Step>,
    },
    Sequential {
        children: Vec<Step>,
    },
    Assign {
        name: SmolStr,
        value: Expression,
    },
    ReadVariable {
        name: SmolStr,
    },
    WriteVariable {
        name: SmolStr,
        value: Expression,
    },
}

impl StepKind {
    /// Short kind name for logging and serialization metadata.
    pub fn name(&self) -> &'static str {
        match self {
            StepKind::Navigate { .. } => "NAVIGATE",
            StepKind::DomQuery { .. } => "DOM_QUERY",
            StepKind::Click { .. } => "CLICK",
            StepKind::Type { .. } => "TYPE",
            StepKind::Wait { .. } => "WAIT",
            StepKind::Screenshot { .. } => "SCREENSHOT",
            StepKind::Pdf => "PDF",
            StepKind::EvaluateJs { .. } => "EVALUATE_JS",
            StepKind::InterceptRequest { .. } => "INTERCEPT_REQUEST",
            StepKind::ModifyRequest { .. } => "MODIFY_REQUEST",
            StepKind::CacheLookup { .. } => "CACHE_LOOKUP",
            StepKind::CacheStore { .. } => "CACHE_STORE",
            StepKind::Filter { .. } => "FILTER",
            StepKind::Map { .. } => "MAP",
            StepKind::Reduce { .. } => "REDUCE",
            StepKind::Join { .. } => "JOIN",
            StepKind::Sort { .. } => "SORT",
            StepKind::Limit { .. } => "LIMIT",
            StepKind::Branch { .. } => "BRANCH",
            StepKind::Loop { .. } => "LOOP",
            StepKind::Parallel { .. } => "PARALLEL",
            StepKind::Sequential { .. } => "SEQUENTIAL",
            StepKind::Assign { .. } => "ASSIGN",
            StepKind::ReadVariable { .. } => "READ_VARIABLE",
            StepKind::WriteVariable { .. } => "WRITE_VARIABLE",
        }
    }
}

/// A single plan step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Unique step id (`step_1`, `step_2`, ...).
    pub id: SmolStr,
    /// What the step does.
    pub kind: StepKind,
    /// Estimated cost in milliseconds.
    pub estimated_cost: f64,
    /// Ids of steps that must complete first.
    pub dependencies: Vec<SmolStr>,
    /// Whether the result may be served from the runtime cache.
    pub cacheable: bool,
    /// Cache key; required when `cacheable` is set.
    pub cache_key: Option<String>,
}

/// Resources a plan needs from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResourceRequirements {
    pub browsers: u32,
    pub pages: u32,
    pub connections: u32,
    pub memory_mb: u64,
    pub cpu_percent: u32,
}

/// Plan-level metadata.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlanMetadata {
    /// Sum of step cost estimates (nested steps included).
    pub estimated_cost_ms: f64,
    /// Total number of steps, nested steps included.
    pub step_count: usize,
    /// Number of NAVIGATE steps, nested steps included.
    pub navigation_count: usize,
    /// The step whose result is the query result.
    pub result_step: Option<SmolStr>,
}

/// A validated execution plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    /// Top-level steps in creation order.
    pub steps: Vec<Step>,
    /// Groups of step ids that may execute concurrently.
    pub parallel_groups: Vec<Vec<SmolStr>>,
    /// Ids of cacheable steps.
    pub cacheable_steps: Vec<SmolStr>,
    /// Aggregated resource requirements.
    pub resources: ResourceRequirements,
    /// Plan metadata.
    pub metadata: PlanMetadata,
}

impl ExecutionPlan {
    /// Looks up a top-level step by id.
    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|step| step.id == id)
    }

    /// Validates plan invariants: unique ids, resolvable dependencies, an
    /// acyclic graph, cacheable steps carrying keys, and group/cacheable
    /// lists referring to real steps.
    pub fn validate(&self) -> EngineResult<()> {
        let graph = DependencyGraph::build(&self.steps)?;
        graph.topological_order().map_err(|err| {
            EngineError::validation(format!("execution plan contains a cycle: {}", err.message))
        })?;

        for step in &self.steps {
            if step.cacheable && step.cache_key.as_deref().unwrap_or("").is_empty() {
                return Err(EngineError::validation(format!(
                    "cacheable step '{}' has no cache key",
                    step.id
                ))
                .with_context("step", &step.id));
            }
        }

        let ids: std::collections::HashSet<&str> =
            self.steps.iter().map(|step| step.id.as_str()).collect();
        for group in &self.parallel_groups {
            for id in group {
                if !ids.contains(id.as_str()) {
                    return Err(EngineError::validation(format!(
                        "parallel group references unknown step '{id}'"
                    )));
                }
            }
        }
        for id in &self.cacheable_steps {
            if !ids.contains(id.as_str()) {
                return Err(EngineError::validation(format!(
                    "cacheable list references unknown step '{id}'"
                )));
            }
        }

        Ok(())
    }
}

/// Counts steps including nested bodies.
pub fn count_steps(steps: &[Step]) -> usize {
    steps
        .iter()
        .map(|step| {
            1 + match &step.kind {
                StepKind::Branch {
                    then_steps,
                    else_steps,
                    ..
                } => count_steps(then_steps) + count_steps(else_steps),
                StepKind::Loop { body, .. } => count_steps(body),
                StepKind::Parallel { children } | StepKind::Sequential { children } => {
                    count_steps(children)
                }
                _ => 0,
            }
        })
        .sum()
}

/// Counts NAVIGATE steps including nested bodies.
pub fn count_navigations(steps: &[Step]) -> usize {
    steps
        .iter()
        .map(|step| match &step.kind {
            StepKind::Navigate { .. } => 1,
            StepKind::Branch {
                then_steps,
                else_steps,
                ..
            } => count_navigations(then_steps) + count_navigations(else_steps),
            StepKind::Loop { body, .. } => count_navigations(body),
            StepKind::Parallel { children } | StepKind::Sequential { children } => {
                count_navigations(children)
            }
            _ => 0,
        })
        .sum()
}
