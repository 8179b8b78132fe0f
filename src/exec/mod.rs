//! Plan execution.
//!
//! The executor drives a validated plan to completion: steps run in
//! topological order, cacheable steps short-circuit through the runtime
//! cache, data steps evaluate inline, and I/O steps delegate to the
//! controllers. Any step failure fails the query; cancellation is
//! cooperative and checked between steps and loop iterations.

pub mod context;
pub mod controllers;
pub mod eval;
pub mod value;

use crate::error::{EngineError, EngineResult};
use crate::plan::{ExecutionPlan, JoinType, Step, StepKind};
use context::{ExecutionContext, StepOutcome};
use controllers::{BrowserController, ProxyController, ProxyRequest};
use eval::{compare_rows, evaluate, EvalContext};
use futures::future::{try_join_all, BoxFuture};
use futures::FutureExt;
use smol_str::SmolStr;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};
use value::Value;

/// Cooperative cancellation flag shared between the engine and an
/// execution.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a fresh token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns true once cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Progress notification emitted after each completed step.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub step_id: SmolStr,
    pub completed: usize,
    pub total: usize,
}

/// Signature of the per-step progress callback.
pub type ProgressFn = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// The step executor.
pub struct Executor {
    browser: Arc<dyn BrowserController>,
    proxy: Arc<dyn ProxyController>,
    progress: Option<ProgressFn>,
}

impl Executor {
    /// Creates an executor over the given controllers.
    pub fn new(browser: Arc<dyn BrowserController>, proxy: Arc<dyn ProxyController>) -> Self {
        Self {
            browser,
            proxy,
            progress: None,
        }
    }

    /// Attaches a progress callback invoked after each top-level step.
    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Runs a plan to completion, returning the result value.
    pub async fn run(
        &self,
        plan: &ExecutionPlan,
        ctx: &mut ExecutionContext,
        cancel: &CancelToken,
    ) -> EngineResult<Value> {
        let order = match crate::plan::DependencyGraph::build(&plan.steps)
            .and_then(|graph| graph.topological_order())
        {
            Ok(order) => order,
            Err(err) => {
                warn!(
                    error = %err,
                    "dependency sort failed; executing steps in natural order"
                );
                plan.steps.iter().map(|step| step.id.clone()).collect()
            }
        };

        let total = order.len();
        for (index, id) in order.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(cancelled_error());
            }
            let step = plan.step(id).ok_or_else(|| {
                EngineError::validation(format!("plan order references unknown step '{id}'"))
            })?;
            self.execute_step(step, ctx, cancel).await?;
            if let Some(progress) = &self.progress {
                progress(ProgressEvent {
                    step_id: id.clone(),
                    completed: index + 1,
                    total,
                });
            }
        }

        let result = plan
            .metadata
            .result_step
            .as_ref()
            .and_then(|id| ctx.step_results.get(id.as_str()))
            .map(|outcome| outcome.data.clone())
            .unwrap_or(Value::Null);
        Ok(result)
    }

    /// Executes one step: cache short-circuit, dispatch, result recording,
    /// output binding, and cache write-back.
    fn execute_step<'a>(
        &'a self,
        step: &'a Step,
        ctx: &'a mut ExecutionContext,
        cancel: &'a CancelToken,
    ) -> BoxFuture<'a, EngineResult<Value>> {
        async move {
            if step.cacheable {
                if let Some(key) = step.cache_key.as_deref() {
                    if let Some(cached) = ctx.cache.get(key).cloned() {
                        debug!(step = %step.id, key, "runtime cache hit");
                        ctx.counters.cache_hits += 1;
                        ctx.counters.steps_completed += 1;
                        ctx.variables.set(step.id.clone(), cached.clone());
                        ctx.step_results
                            .insert(step.id.clone(), StepOutcome::from_cache(cached.clone()));
                        return Ok(cached);
                    }
                    ctx.counters.cache_misses += 1;
                }
            }

            let started = Instant::now();
            let result = self.dispatch(step, ctx, cancel).await;
            let duration_ms = started.elapsed().as_secs_f64() * 1_000.0;

            match result {
                Ok(value) => {
                    ctx.counters.steps_completed += 1;
                    ctx.variables.set(step.id.clone(), value.clone());
                    if step.cacheable {
                        if let Some(key) = step.cache_key.as_deref() {
                            ctx.cache.store(key, value.clone());
                        }
                    }
                    ctx.step_results
                        .insert(step.id.clone(), StepOutcome::success(value.clone(), duration_ms));
                    Ok(value)
                }
                Err(err) => {
                    ctx.step_results.insert(
                        step.id.clone(),
                        StepOutcome::failure(err.to_string(), duration_ms),
                    );
                    Err(err.with_context("step", &step.id))
                }
            }
        }
        .boxed()
    }

    async fn dispatch(
        &self,
        step: &Step,
        ctx: &mut ExecutionContext,
        cancel: &CancelToken,
    ) -> EngineResult<Value> {
        match &step.kind {
            StepKind::Navigate { url, options } => {
                let url = evaluate(url, &EvalContext::with_cache(&ctx.variables, &ctx.cache))?;
                let Some(url) = url.as_str().map(str::to_owned) else {
                    return Err(EngineError::execution(format!(
                        "NAVIGATE target must be a string, found {}",
                        url.data_type()
                    )));
                };
                let outcome = self
                    .browser
                    .execute_navigate(&url, options.as_ref())
                    .await?;
                ctx.counters.navigations += 1;
                if let Some(status) = outcome.status_code {
                    ctx.variables
                        .assign("response.status", Value::Number(status as f64));
                }
                ctx.variables
                    .assign("response.url", Value::String(outcome.url.clone().into()));

                let mut object = BTreeMap::new();
                object.insert(SmolStr::new("url"), Value::String(outcome.url.into()));
                object.insert(
                    SmolStr::new("redirects"),
                    Value::Array(
                        outcome
                            .redirects
                            .into_iter()
                            .map(|r| Value::String(r.into()))
                            .collect(),
                    ),
                );
                object.insert(
                    SmolStr::new("status"),
                    outcome
                        .status_code
                        .map(|s| Value::Number(s as f64))
                        .unwrap_or(Value::Null),
                );
                Ok(Value::Object(object))
            }
            StepKind::DomQuery {
                selector,
                input,
                fields,
                wildcard,
            } => {
                let rows = match input {
                    Some(name) => self.require_rows(ctx, name)?,
                    None => {
                        let names: Vec<SmolStr> =
                            fields.iter().map(|field| field.name.clone()).collect();
                        self.browser.execute_dom_query(selector, &names).await?
                    }
                };

                if *wildcard || fields.is_empty() {
                    return Ok(Value::Array(rows));
                }

                let base_ctx = EvalContext::with_cache(&ctx.variables, &ctx.cache);
                let mut projected = Vec::with_capacity(rows.len());
                for row in &rows {
                    let row_ctx = base_ctx.with_row(row);
                    let mut object = BTreeMap::new();
                    for field in fields {
                        let value = evaluate(&field.expr, &row_ctx)?;
                        object.insert(field.name.clone(), value);
                    }
                    projected.push(Value::Object(object));
                }
                Ok(Value::Array(projected))
            }
            StepKind::Click { selector } => {
                self.browser.execute_click(selector).await?;
                Ok(Value::Bool(true))
            }
            StepKind::Type { selector, text } => {
                let text = evaluate(text, &EvalContext::with_cache(&ctx.variables, &ctx.cache))?;
                self.browser.execute_type(selector, &text.render()).await?;
                Ok(Value::Bool(true))
            }
            StepKind::Wait {
                condition,
                timeout_ms,
            } => {
                self.browser.execute_wait(condition, *timeout_ms).await?;
                Ok(Value::Bool(true))
            }
            StepKind::Screenshot { full_page } => {
                let bytes = self.browser.execute_screenshot(*full_page).await?;
                Ok(Value::Bytes(bytes))
            }
            StepKind::Pdf => {
                let bytes = self.browser.execute_pdf().await?;
                Ok(Value::Bytes(bytes))
            }
            StepKind::EvaluateJs { script } => self.browser.execute_evaluate_js(script).await,
            StepKind::InterceptRequest { pattern } => {
                let request = self
                    .proxy
                    .intercept_request(ProxyRequest {
                        url: pattern.clone(),
                        method: "GET".to_string(),
                        headers: Vec::new(),
                    })
                    .await?;
                Ok(Value::String(request.url.into()))
            }
            StepKind::ModifyRequest { pattern, headers } => {
                let request = self
                    .proxy
                    .intercept_request(ProxyRequest {
                        url: pattern.clone(),
                        method: "GET".to_string(),
                        headers: headers.clone(),
                    })
                    .await?;
                Ok(Value::String(request.url.into()))
            }
            StepKind::CacheLookup { key } => {
                let outcome = self.proxy.execute_cache_lookup(key).await?;
                let mut object = BTreeMap::new();
                object.insert(SmolStr::new("hit"), Value::Bool(outcome.hit));
                if let Some(reason) = outcome.reason {
                    object.insert(SmolStr::new("reason"), Value::String(reason.into()));
                }
                object.insert(
                    SmolStr::new("value"),
                    outcome.value.unwrap_or(Value::Null),
                );
                Ok(Value::Object(object))
            }
            StepKind::CacheStore { key, ttl_ms } => {
                // Store the producing dependency's result.
                let value = step
                    .dependencies
                    .first()
                    .and_then(|dep| ctx.step_results.get(dep.as_str()))
                    .map(|outcome| outcome.data.clone())
                    .unwrap_or(Value::Null);
                self.proxy.execute_cache_store(key, &value, *ttl_ms).await?;
                Ok(Value::Bool(true))
            }
            StepKind::Filter { input, predicate } => {
                let rows = self.require_rows(ctx, input)?;
                let base_ctx = EvalContext::with_cache(&ctx.variables, &ctx.cache);
                let mut retained = Vec::new();
                for row in rows {
                    let verdict = evaluate(predicate, &base_ctx.with_row(&row))?;
                    if verdict.passes_filter() {
                        retained.push(row);
                    }
                }
                Ok(Value::Array(retained))
            }
            StepKind::Map { input, transform } => {
                let rows = self.require_rows(ctx, input)?;
                let base_ctx = EvalContext::with_cache(&ctx.variables, &ctx.cache);
                let mut mapped = Vec::with_capacity(rows.len());
                for row in rows {
                    mapped.push(evaluate(transform, &base_ctx.with_row(&row))?);
                }
                Ok(Value::Array(mapped))
            }
            StepKind::Reduce {
                input,
                initial,
                reducer,
            } => {
                let rows = self.require_rows(ctx, input)?;
                let mut accumulator = evaluate(initial, &EvalContext::with_cache(&ctx.variables, &ctx.cache))?;
                for row in rows {
                    ctx.variables.push_frame();
                    ctx.variables.set("accumulator", accumulator.clone());
                    let result = evaluate(
                        reducer,
                        &EvalContext::with_cache(&ctx.variables, &ctx.cache).with_row(&row),
                    );
                    ctx.variables.pop_frame();
                    accumulator = result?;
                }
                Ok(accumulator)
            }
            StepKind::Join {
                left,
                right,
                left_key,
                right_key,
                join_type,
            } => {
                let left_rows = self.require_rows(ctx, left)?;
                let right_rows = self.require_rows(ctx, right)?;
                Ok(join_rows(
                    left_rows, right_rows, left_key, right_key, *join_type,
                ))
            }
            StepKind::Sort { input, keys } => {
                let mut rows = self.require_rows(ctx, input)?;
                let keys: Vec<(SmolStr, bool)> = keys
                    .iter()
                    .map(|key| (key.field.clone(), key.descending))
                    .collect();
                rows.sort_by(|a, b| compare_rows(a, b, &keys));
                Ok(Value::Array(rows))
            }
            StepKind::Limit {
                input,
                limit,
                offset,
            } => {
                let rows = self.require_rows(ctx, input)?;
                let start = (*offset as usize).min(rows.len());
                let end = start.saturating_add(*limit as usize).min(rows.len());
                Ok(Value::Array(rows[start..end].to_vec()))
            }
            StepKind::Branch {
                condition,
                then_steps,
                else_steps,
            } => {
                let verdict = evaluate(condition, &EvalContext::with_cache(&ctx.variables, &ctx.cache))?;
                let steps = if verdict.is_truthy() {
                    then_steps
                } else {
                    else_steps
                };
                let mut last = Value::Null;
                for child in steps {
                    if cancel.is_cancelled() {
                        return Err(cancelled_error());
                    }
                    last = self.execute_step(child, ctx, cancel).await?;
                }
                Ok(last)
            }
            StepKind::Loop {
                variable,
                collection,
                body,
            } => {
                let collection =
                    evaluate(collection, &EvalContext::with_cache(&ctx.variables, &ctx.cache))?;
                let elements = match collection {
                    Value::Array(elements) => elements,
                    other => {
                        return Err(EngineError::execution(format!(
                            "LOOP collection must be an array, found {}",
                            other.data_type()
                        )));
                    }
                };

                let mut outputs = Vec::with_capacity(elements.len());
                for element in elements {
                    if cancel.is_cancelled() {
                        return Err(cancelled_error());
                    }
                    ctx.variables.push_frame();
                    ctx.variables.set(variable.clone(), element);
                    let mut iteration_result = Ok(Value::Null);
                    for child in body {
                        iteration_result = self.execute_step(child, ctx, cancel).await;
                        if iteration_result.is_err() {
                            break;
                        }
                    }
                    ctx.variables.pop_frame();
                    outputs.push(iteration_result?);
                }
                Ok(Value::Array(outputs))
            }
            StepKind::Parallel { children } => {
                let futures = children.iter().map(|child| {
                    let mut child_ctx = ctx.fork();
                    let cancel = cancel.clone();
                    async move {
                        let value = self.execute_step(child, &mut child_ctx, &cancel).await?;
                        Ok::<_, EngineError>((value, child_ctx))
                    }
                });
                let results = try_join_all(futures).await?;
                let mut values = Vec::with_capacity(results.len());
                for (value, child_ctx) in results {
                    ctx.join(child_ctx);
                    values.push(value);
                }
                Ok(Value::Array(values))
            }
            StepKind::Sequential { children } => {
                let mut last = Value::Null;
                for child in children {
                    if cancel.is_cancelled() {
                        return Err(cancelled_error());
                    }
                    last = self.execute_step(child, ctx, cancel).await?;
                }
                Ok(last)
            }
            StepKind::Assign { name, value } => {
                let value = evaluate(value, &EvalContext::with_cache(&ctx.variables, &ctx.cache))?;
                ctx.variables.set(name.clone(), value.clone());
                Ok(value)
            }
            StepKind::ReadVariable { name } => {
                ctx.variables.get(name).ok_or_else(|| {
                    EngineError::execution(format!("variable '{name}' is not defined"))
                        .with_context("variable", name)
                })
            }
            StepKind::WriteVariable { name, value } => {
                let value = evaluate(value, &EvalContext::with_cache(&ctx.variables, &ctx.cache))?;
                ctx.variables.assign(name.clone(), value.clone());
                Ok(value)
            }
        }
    }

    /// Reads an ordered sequence from a variable; anything else fails.
    fn require_rows(&self, ctx: &ExecutionContext, name: &str) -> EngineResult<Vec<Value>> {
        match ctx.variables.get(name) {
            Some(Value::Array(rows)) => Ok(rows),
            Some(other) => Err(EngineError::execution(format!(
                "'{name}' is not an ordered sequence (found {})",
                other.data_type()
            ))
            .with_context("variable", name)),
            None => Err(
                EngineError::execution(format!("input variable '{name}' is not defined"))
                    .with_context("variable", name),
            ),
        }
    }
}

fn cancelled_error() -> EngineError {
    EngineError::execution("query cancelled").with_context("cancelled", "true")
}

/// JOIN semantics: index the right side by key, emit the product of
/// matches, and append unmatched rows per join type.
fn join_rows(
    left_rows: Vec<Value>,
    right_rows: Vec<Value>,
    left_key: &str,
    right_key: &str,
    join_type: JoinType,
) -> Value {
    fn key_of(row: &Value, key: &str) -> Option<String> {
        match row {
            Value::Object(map) => map.get(key).map(Value::render),
            _ => None,
        }
    }

    fn merge(left: &Value, right: &Value) -> Value {
        match (left, right) {
            (Value::Object(a), Value::Object(b)) => {
                let mut merged = a.clone();
                for (key, value) in b {
                    merged.insert(key.clone(), value.clone());
                }
                Value::Object(merged)
            }
            _ => left.clone(),
        }
    }

    let mut right_index: BTreeMap<String, Vec<&Value>> = BTreeMap::new();
    for row in &right_rows {
        if let Some(key) = key_of(row, right_key) {
            right_index.entry(key).or_default().push(row);
        }
    }

    let mut output = Vec::new();
    let mut matched_right: Vec<bool> = vec![false; right_rows.len()];

    for left_row in &left_rows {
        let matches = key_of(left_row, left_key)
            .and_then(|key| right_index.get(&key))
            .cloned()
            .unwrap_or_default();
        if matches.is_empty() {
            if matches!(join_type, JoinType::Left | JoinType::Full) {
                output.push(left_row.clone());
            }
            continue;
        }
        for right_row in matches {
            if let Some(position) = right_rows
                .iter()
                .position(|candidate| std::ptr::eq(candidate, right_row))
            {
                matched_right[position] = true;
            }
            output.push(merge(left_row, right_row));
        }
    }

    if matches!(join_type, JoinType::Right | JoinType::Full) {
        for (row, matched) in right_rows.iter().zip(&matched_right) {
            if !matched {
                output.push(row.clone());
            }
        }
    }

    Value::Array(output)
}
