//! Per-query execution state: variables, step results, and the runtime
//! cache.
//!
//! All state here is single-owner and per-query; nothing is shared across
//! queries.

use crate::exec::value::Value;
use smol_str::SmolStr;
use std::collections::HashMap;

/// A stack of variable frames. Loops push shadowing frames; reads walk from
/// the innermost frame outward.
#[derive(Debug, Clone, Default)]
pub struct ScopeStack {
    frames: Vec<HashMap<SmolStr, Value>>,
}

impl ScopeStack {
    /// Creates a stack with a single root frame.
    pub fn new() -> Self {
        Self {
            frames: vec![HashMap::new()],
        }
    }

    /// Pushes a shadowing frame (loop iteration entry).
    pub fn push_frame(&mut self) {
        self.frames.push(HashMap::new());
    }

    /// Pops the innermost frame. The root frame is never popped.
    pub fn pop_frame(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    /// Returns the current frame depth.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Reads a variable, walking frames inner to outer.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.get(name).cloned())
    }

    /// Binds a variable in the innermost frame.
    pub fn set(&mut self, name: impl Into<SmolStr>, value: Value) {
        self.frames
            .last_mut()
            .expect("scope stack is never empty")
            .insert(name.into(), value);
    }

    /// Assigns to an existing variable in the nearest frame that defines
    /// it, falling back to the root frame. Used by WRITE_VARIABLE to reach
    /// outer names from inside loops.
    pub fn assign(&mut self, name: impl Into<SmolStr>, value: Value) {
        let name = name.into();
        for frame in self.frames.iter_mut().rev() {
            if frame.contains_key(&name) {
                frame.insert(name, value);
                return;
            }
        }
        self.frames
            .first_mut()
            .expect("scope stack is never empty")
            .insert(name, value);
    }
}

/// Outcome of a single executed step.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    /// Whether the step succeeded.
    pub ok: bool,
    /// The step's data result.
    pub data: Value,
    /// Error message when the step failed.
    pub error: Option<String>,
    /// Wall time spent executing the step, in milliseconds.
    pub duration_ms: f64,
    /// True when the result came from the runtime cache.
    pub cache_hit: bool,
}

impl StepOutcome {
    /// A successful outcome.
    pub fn success(data: Value, duration_ms: f64) -> Self {
        Self {
            ok: true,
            data,
            error: None,
            duration_ms,
            cache_hit: false,
        }
    }

    /// A cache-hit outcome.
    pub fn from_cache(data: Value) -> Self {
        Self {
            ok: true,
            data,
            error: None,
            duration_ms: 0.0,
            cache_hit: true,
        }
    }

    /// A failed outcome.
    pub fn failure(error: String, duration_ms: f64) -> Self {
        Self {
            ok: false,
            data: Value::Null,
            error: Some(error),
            duration_ms,
            cache_hit: false,
        }
    }
}

/// Per-execution runtime cache keyed by step cache keys.
#[derive(Debug, Clone, Default)]
pub struct RuntimeCache {
    entries: HashMap<String, Value>,
}

impl RuntimeCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a cached value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Returns true when the key is cached.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Stores a value under the given key.
    pub fn store(&mut self, key: impl Into<String>, value: Value) {
        self.entries.insert(key.into(), value);
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merges entries from another cache (parallel children write-back).
    pub fn merge(&mut self, other: RuntimeCache) {
        self.entries.extend(other.entries);
    }

    /// Builds a cache pre-seeded with entries.
    pub fn from_entries(entries: HashMap<String, Value>) -> Self {
        Self { entries }
    }

    /// Consumes the cache, yielding its entries.
    pub fn into_entries(self) -> HashMap<String, Value> {
        self.entries
    }
}

/// Counters accumulated during one execution.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutionCounters {
    pub navigations: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub steps_completed: u64,
}

/// The per-query execution context.
#[derive(Debug)]
pub struct ExecutionContext {
    /// The owning query's id.
    pub query_id: SmolStr,
    /// Variable frames.
    pub variables: ScopeStack,
    /// Results of executed steps, by step id.
    pub step_results: HashMap<SmolStr, StepOutcome>,
    /// Per-execution runtime cache.
    pub cache: RuntimeCache,
    /// Execution counters.
    pub counters: ExecutionCounters,
}

impl ExecutionContext {
    /// Creates a fresh context for the given query.
    pub fn new(query_id: impl Into<SmolStr>) -> Self {
        Self {
            query_id: query_id.into(),
            variables: ScopeStack::new(),
            step_results: HashMap::new(),
            cache: RuntimeCache::new(),
            counters: ExecutionCounters::default(),
        }
    }

    /// Creates a child context for a parallel branch: variables are
    /// snapshotted, the cache starts from the parent's entries, and step
    /// results start empty.
    pub fn fork(&self) -> Self {
        Self {
            query_id: self.query_id.clone(),
            variables: self.variables.clone(),
            step_results: HashMap::new(),
            cache: self.cache.clone(),
            counters: ExecutionCounters::default(),
        }
    }

    /// Merges a finished parallel child back: cache entries and step
    /// results are kept, counters are accumulated. Variable writes stay in
    /// the child.
    pub fn join(&mut self, child: ExecutionContext) {
        self.cache.merge(child.cache);
        self.step_results.extend(child.step_results);
        self.counters.navigations += child.counters.navigations;
        self.counters.cache_hits += child.counters.cache_hits;
        self.counters.cache_misses += child.counters.cache_misses;
        self.counters.steps_completed += child.counters.steps_completed;
    }
}
