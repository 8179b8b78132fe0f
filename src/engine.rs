//! The public query engine facade.
//!
//! Ties the pipeline together: tokenize, parse, analyze, optimize, plan,
//! execute, format. Queries run synchronously through [`QueryEngine::execute`]
//! or detached through [`QueryEngine::execute_async`] with status observable
//! by id. The engine is cheaply cloneable; all shared state lives behind an
//! inner arc.

use crate::ast::print_program;
use crate::diag::{self, Phase, SourceFile};
use crate::error::{EngineError, EngineResult, ErrorKind};
use crate::exec::context::ExecutionContext;
use crate::exec::controllers::{
    BrowserController, FormatOptions, OutputFormat, ProxyController, ResultFormatter,
};
use crate::exec::value::Value;
use crate::exec::{CancelToken, Executor, ProgressEvent};
use crate::optimizer::{OptimizationOutcome, Optimizer, OptimizerConfig};
use crate::parser::Parser;
use crate::plan::{ExecutionPlan, Planner};
use crate::semantic::{AnalyzerConfig, AnnotatedAst, SemanticAnalyzer};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Engine-level configuration.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Semantic analysis configuration.
    pub analyzer: AnalyzerConfig,
    /// Optimizer configuration.
    pub optimizer: OptimizerConfig,
    /// Default per-query timeout; None disables timeouts.
    pub default_timeout_ms: Option<u64>,
}

/// Per-query options.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Timeout override in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Permission tags forwarded to the (external) policy layer.
    pub permissions: Vec<String>,
    /// Requested output format; requires a formatter.
    pub format: Option<OutputFormat>,
    /// Formatter options.
    pub format_options: FormatOptions,
    /// Include per-step results in logs.
    pub trace: bool,
    /// Include phase timing detail in logs.
    pub profile: bool,
}

/// Millisecond timings for each pipeline phase.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PhaseTimings {
    pub lexer_ms: f64,
    pub parser_ms: f64,
    pub semantic_ms: f64,
    pub optimize_ms: f64,
    pub plan_ms: f64,
    pub execute_ms: f64,
    pub format_ms: f64,
    pub total_ms: f64,
}

/// Result metadata surfaced with every query.
#[derive(Debug, Clone, Default)]
pub struct ResultMetadata {
    /// Canonical text of the post-optimization query.
    pub optimized_query: String,
    /// Optimizer passes that fired.
    pub applied_passes: Vec<String>,
    /// Steps in the plan, nested included.
    pub step_count: usize,
    /// Estimated cost from the plan.
    pub estimated_cost_ms: f64,
    /// Actual execution wall time.
    pub actual_cost_ms: f64,
    /// NAVIGATE dispatches performed.
    pub navigation_count: u64,
    /// Runtime cache hits.
    pub cache_hits: u64,
    /// Runtime cache misses.
    pub cache_misses: u64,
}

/// The result of a completed query.
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub query_id: String,
    pub data: Value,
    /// Present when a format was requested and a formatter is attached.
    pub formatted: Option<String>,
    pub timing: PhaseTimings,
    pub metadata: ResultMetadata,
}

/// Lifecycle states of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    TimedOut,
}

/// Observable status of a query.
#[derive(Debug, Clone)]
pub struct QueryStatus {
    pub state: QueryState,
    /// Completed fraction in [0, 1].
    pub progress: f64,
    pub steps_completed: usize,
    pub steps_total: usize,
    pub current_step_id: Option<String>,
    pub error: Option<String>,
}

impl Default for QueryStatus {
    fn default() -> Self {
        Self {
            state: QueryState::Pending,
            progress: 0.0,
            steps_completed: 0,
            steps_total: 0,
            current_step_id: None,
            error: None,
        }
    }
}

/// Cross-query metrics. Counters only; mutation is atomic, ordering across
/// queries is unspecified.
#[derive(Debug, Default)]
pub struct EngineMetrics {
    queries_executed: AtomicU64,
    queries_failed: AtomicU64,
    queries_cancelled: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    navigations: AtomicU64,
    total_execution_ms: AtomicU64,
}

/// Point-in-time view of [`EngineMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub queries_executed: u64,
    pub queries_failed: u64,
    pub queries_cancelled: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub navigations: u64,
    pub total_execution_ms: u64,
}

impl EngineMetrics {
    fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            queries_executed: self.queries_executed.load(Ordering::Relaxed),
            queries_failed: self.queries_failed.load(Ordering::Relaxed),
            queries_cancelled: self.queries_cancelled.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            navigations: self.navigations.load(Ordering::Relaxed),
            total_execution_ms: self.total_execution_ms.load(Ordering::Relaxed),
        }
    }
}

/// A compiled query: every artifact the pipeline produces before execution.
#[derive(Debug)]
pub struct CompiledQuery {
    pub annotated: AnnotatedAst,
    pub outcome: OptimizationOutcome,
    pub plan: ExecutionPlan,
    pub timings: PhaseTimings,
}

struct QueryHandle {
    status: QueryStatus,
    cancel: CancelToken,
    finished: bool,
}

struct EngineInner {
    config: EngineConfig,
    browser: Arc<dyn BrowserController>,
    proxy: Arc<dyn ProxyController>,
    formatter: Option<Arc<dyn ResultFormatter>>,
    queries: Mutex<HashMap<String, QueryHandle>>,
    /// Engine-held runtime cache entries. Each execution gets its own
    /// seeded copy; successful executions write new entries back, so
    /// repeated queries on one engine can short-circuit.
    runtime_cache: Mutex<HashMap<String, Value>>,
    metrics: EngineMetrics,
    initialized: AtomicBool,
}

/// The WebQL query engine.
#[derive(Clone)]
pub struct QueryEngine {
    inner: Arc<EngineInner>,
}

impl QueryEngine {
    /// Creates an engine over the given controllers. Call
    /// [`QueryEngine::initialize`] before executing queries.
    pub fn new(
        config: EngineConfig,
        browser: Arc<dyn BrowserController>,
        proxy: Arc<dyn ProxyController>,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                config,
                browser,
                proxy,
                formatter: None,
                queries: Mutex::new(HashMap::new()),
                runtime_cache: Mutex::new(HashMap::new()),
                metrics: EngineMetrics::default(),
                initialized: AtomicBool::new(false),
            }),
        }
    }

    /// Attaches a result formatter. Must be called before the engine is
    /// shared.
    pub fn with_formatter(mut self, formatter: Arc<dyn ResultFormatter>) -> Self {
        let inner = Arc::get_mut(&mut self.inner)
            .expect("with_formatter must be called before the engine is cloned");
        inner.formatter = Some(formatter);
        self
    }

    /// Marks the engine ready to accept queries.
    pub fn initialize(&self) {
        self.inner.initialized.store(true, Ordering::SeqCst);
        info!("query engine initialized");
    }

    /// Cancels all in-flight queries and stops accepting new ones.
    pub fn shutdown(&self) {
        self.inner.initialized.store(false, Ordering::SeqCst);
        let mut queries = self.inner.queries.lock();
        for handle in queries.values_mut() {
            if !handle.finished {
                handle.cancel.cancel();
            }
        }
        info!("query engine shut down");
    }

    /// Returns a snapshot of the cross-query metrics.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// Compiles a query without executing it.
    pub fn compile(&self, query: &str) -> EngineResult<CompiledQuery> {
        compile_query(query, &self.inner.config)
    }

    /// Compiles and executes a query, returning the final result.
    pub async fn execute(&self, query: &str, options: QueryOptions) -> EngineResult<QueryResult> {
        self.ensure_initialized()?;
        let query_id = uuid::Uuid::new_v4().to_string();
        self.register(&query_id);
        let result = run_query(
            self.inner.clone(),
            query_id.clone(),
            query.to_string(),
            options,
        )
        .await;
        self.finish(&query_id, &result);
        result
    }

    /// Compiles and executes a query in the background, returning its id
    /// immediately. Status is observable via [`QueryEngine::query_status`].
    pub fn execute_async(&self, query: &str, options: QueryOptions) -> EngineResult<String> {
        self.ensure_initialized()?;
        let query_id = uuid::Uuid::new_v4().to_string();
        self.register(&query_id);

        let engine = self.clone();
        let inner = self.inner.clone();
        let id = query_id.clone();
        let query = query.to_string();
        tokio::spawn(async move {
            let result = run_query(inner, id.clone(), query, options).await;
            engine.finish(&id, &result);
        });

        Ok(query_id)
    }

    /// Returns the status of a query, if known.
    pub fn query_status(&self, query_id: &str) -> Option<QueryStatus> {
        self.inner
            .queries
            .lock()
            .get(query_id)
            .map(|handle| handle.status.clone())
    }

    /// Requests cancellation of a running query. Idempotent while the query
    /// runs; errors once it has finished.
    pub fn cancel_query(&self, query_id: &str) -> EngineResult<()> {
        let mut queries = self.inner.queries.lock();
        let handle = queries.get_mut(query_id).ok_or_else(|| {
            EngineError::execution(format!("unknown query '{query_id}'"))
                .with_context("query", query_id)
        })?;
        if handle.finished {
            return Err(
                EngineError::execution(format!("query '{query_id}' has already finished"))
                    .with_context("query", query_id),
            );
        }
        handle.cancel.cancel();
        Ok(())
    }

    fn ensure_initialized(&self) -> EngineResult<()> {
        if self.inner.initialized.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(EngineError::execution("engine is not initialized"))
        }
    }

    fn register(&self, query_id: &str) {
        self.inner.queries.lock().insert(
            query_id.to_string(),
            QueryHandle {
                status: QueryStatus::default(),
                cancel: CancelToken::new(),
                finished: false,
            },
        );
    }

    fn finish(&self, query_id: &str, result: &EngineResult<QueryResult>) {
        let mut queries = self.inner.queries.lock();
        let Some(handle) = queries.get_mut(query_id) else {
            return;
        };
        handle.finished = true;
        match result {
            Ok(_) => {
                handle.status.state = QueryState::Completed;
                handle.status.progress = 1.0;
            }
            Err(err) => {
                handle.status.state = if err.kind == ErrorKind::Timeout {
                    QueryState::TimedOut
                } else if handle.cancel.is_cancelled() {
                    QueryState::Cancelled
                } else {
                    QueryState::Failed
                };
                handle.status.error = Some(err.to_string());
            }
        }
    }
}

/// The full compile pipeline with per-phase timing.
pub(crate) fn compile_query(query: &str, config: &EngineConfig) -> EngineResult<CompiledQuery> {
    let mut timings = PhaseTimings::default();
    let source = SourceFile::new(query);

    let started = Instant::now();
    let lex = crate::lexer::tokenize(query);
    timings.lexer_ms = elapsed_ms(started);
    if diag::has_errors(&lex.diagnostics) {
        return Err(diag::engine_error_from(
            &lex.diagnostics,
            &source,
            Phase::Lexer,
        ));
    }

    let started = Instant::now();
    let parse = Parser::new(lex.tokens, query)
        .with_lexer_diagnostics(lex.diagnostics)
        .parse();
    timings.parser_ms = elapsed_ms(started);
    let Some(program) = parse.ast else {
        let message = parse
            .diagnostics
            .first()
            .map(|report| format!("{report:?}"))
            .unwrap_or_else(|| "parse failed".to_string());
        return Err(EngineError::new(ErrorKind::Parser, first_line(&message)));
    };

    let started = Instant::now();
    let analyzer = SemanticAnalyzer::with_config(config.analyzer.clone());
    let annotated = analyzer
        .analyze(program)
        .map_err(|diags| diag::engine_error_from(&diags, &source, Phase::Semantic))?;
    timings.semantic_ms = elapsed_ms(started);

    let started = Instant::now();
    let optimizer = Optimizer::with_config(config.optimizer.clone());
    let outcome = optimizer.optimize(annotated.program.clone());
    timings.optimize_ms = elapsed_ms(started);

    let started = Instant::now();
    let planner = Planner::with_model(config.optimizer.cost_model.clone());
    let plan = planner.plan(&outcome)?;
    timings.plan_ms = elapsed_ms(started);

    Ok(CompiledQuery {
        annotated,
        outcome,
        plan,
        timings,
    })
}

/// Compiles and executes one query end to end.
async fn run_query(
    inner: Arc<EngineInner>,
    query_id: String,
    query: String,
    options: QueryOptions,
) -> EngineResult<QueryResult> {
    let total_started = Instant::now();

    let compiled = match compile_query(&query, &inner.config) {
        Ok(compiled) => compiled,
        Err(err) => {
            inner.metrics.queries_failed.fetch_add(1, Ordering::Relaxed);
            return Err(err);
        }
    };
    let mut timings = compiled.timings;

    let cancel = inner
        .queries
        .lock()
        .get(&query_id)
        .map(|handle| handle.cancel.clone())
        .unwrap_or_default();

    let steps_total = compiled.plan.steps.len();
    update_status(&inner, &query_id, |status| {
        status.state = QueryState::Running;
        status.steps_total = steps_total;
    });

    let progress_inner = inner.clone();
    let progress_id = query_id.clone();
    let executor = Executor::new(inner.browser.clone(), inner.proxy.clone()).with_progress(
        Arc::new(move |event: ProgressEvent| {
            update_status(&progress_inner, &progress_id, |status| {
                status.steps_completed = event.completed;
                status.current_step_id = Some(event.step_id.to_string());
                status.progress = if event.total == 0 {
                    1.0
                } else {
                    event.completed as f64 / event.total as f64
                };
            });
        }),
    );

    let mut ctx = ExecutionContext::new(query_id.as_str());
    ctx.cache =
        crate::exec::context::RuntimeCache::from_entries(inner.runtime_cache.lock().clone());
    let timeout_ms = options.timeout_ms.or(inner.config.default_timeout_ms);

    let started = Instant::now();
    let executed = match timeout_ms {
        Some(ms) => {
            match tokio::time::timeout(
                std::time::Duration::from_millis(ms),
                executor.run(&compiled.plan, &mut ctx, &cancel),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => {
                    cancel.cancel();
                    warn!(query = %query_id, timeout_ms = ms, "query timed out");
                    Err(EngineError::timeout(format!(
                        "query exceeded its {ms} ms timeout"
                    )))
                }
            }
        }
        None => executor.run(&compiled.plan, &mut ctx, &cancel).await,
    };
    timings.execute_ms = elapsed_ms(started);

    // Counters accumulate even when the query fails part-way.
    inner
        .metrics
        .cache_hits
        .fetch_add(ctx.counters.cache_hits, Ordering::Relaxed);
    inner
        .metrics
        .cache_misses
        .fetch_add(ctx.counters.cache_misses, Ordering::Relaxed);
    inner
        .metrics
        .navigations
        .fetch_add(ctx.counters.navigations, Ordering::Relaxed);
    inner
        .metrics
        .total_execution_ms
        .fetch_add(timings.execute_ms as u64, Ordering::Relaxed);

    let data = match executed {
        Ok(data) => {
            let entries = std::mem::take(&mut ctx.cache).into_entries();
            inner.runtime_cache.lock().extend(entries);
            data
        }
        Err(err) => {
            if cancel.is_cancelled() && err.kind != ErrorKind::Timeout {
                inner
                    .metrics
                    .queries_cancelled
                    .fetch_add(1, Ordering::Relaxed);
            } else {
                inner.metrics.queries_failed.fetch_add(1, Ordering::Relaxed);
            }
            return Err(err);
        }
    };

    let formatted = match (&options.format, &inner.formatter) {
        (Some(format), Some(formatter)) => {
            let started = Instant::now();
            let text = formatter.format(&data, *format, &options.format_options)?;
            timings.format_ms = elapsed_ms(started);
            Some(text)
        }
        _ => None,
    };

    timings.total_ms = elapsed_ms(total_started);
    inner
        .metrics
        .queries_executed
        .fetch_add(1, Ordering::Relaxed);

    if options.profile {
        info!(
            query = %query_id,
            lexer_ms = timings.lexer_ms,
            parser_ms = timings.parser_ms,
            semantic_ms = timings.semantic_ms,
            optimize_ms = timings.optimize_ms,
            plan_ms = timings.plan_ms,
            execute_ms = timings.execute_ms,
            "query profile"
        );
    }

    Ok(QueryResult {
        query_id,
        data,
        formatted,
        timing: timings,
        metadata: ResultMetadata {
            optimized_query: print_program(&compiled.outcome.program),
            applied_passes: compiled
                .outcome
                .applied_passes
                .iter()
                .map(|pass| pass.name().to_string())
                .collect(),
            step_count: compiled.plan.metadata.step_count,
            estimated_cost_ms: compiled.plan.metadata.estimated_cost_ms,
            actual_cost_ms: timings.execute_ms,
            navigation_count: ctx.counters.navigations,
            cache_hits: ctx.counters.cache_hits,
            cache_misses: ctx.counters.cache_misses,
        },
    })
}

fn update_status(inner: &EngineInner, query_id: &str, apply: impl FnOnce(&mut QueryStatus)) {
    if let Some(handle) = inner.queries.lock().get_mut(query_id) {
        apply(&mut handle.status);
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1_000.0
}

fn first_line(text: &str) -> String {
    text.lines().next().unwrap_or(text).to_string()
}
