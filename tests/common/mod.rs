//! Shared test harness: stub controllers and engine construction helpers.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use smol_str::SmolStr;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use webql::ast::{NavigateOptions, WaitCondition};
use webql::engine::{EngineConfig, QueryState};
use webql::error::{EngineError, EngineResult};
use webql::exec::controllers::{
    BrowserController, CacheLookupOutcome, NavigateOutcome, ProxyController, ProxyRequest,
    ProxyResponse,
};
use webql::{QueryEngine, Value};

/// Builds an object row from field/value pairs.
pub fn row(fields: &[(&str, Value)]) -> Value {
    Value::Object(
        fields
            .iter()
            .map(|(key, value)| (SmolStr::new(*key), value.clone()))
            .collect::<BTreeMap<_, _>>(),
    )
}

/// Shorthand string value.
pub fn s(text: &str) -> Value {
    Value::String(text.into())
}

/// Shorthand number value.
pub fn n(value: f64) -> Value {
    Value::Number(value)
}

/// A scripted browser controller that records every call.
pub struct StubBrowser {
    /// Rows returned by every DOM query.
    pub rows: Mutex<Vec<Value>>,
    /// URLs navigated to, in order.
    pub navigations: Mutex<Vec<String>>,
    /// Selectors queried, in order.
    pub queries: Mutex<Vec<String>>,
    /// Artificial per-navigation delay.
    pub navigate_delay: Option<Duration>,
    /// Navigations to URLs containing this substring fail.
    pub fail_url_containing: Option<String>,
}

impl StubBrowser {
    pub fn new() -> Self {
        Self {
            // One empty row, so projections of pure expressions yield one
            // output row.
            rows: Mutex::new(vec![row(&[])]),
            navigations: Mutex::new(Vec::new()),
            queries: Mutex::new(Vec::new()),
            navigate_delay: None,
            fail_url_containing: None,
        }
    }

    pub fn with_rows(rows: Vec<Value>) -> Self {
        let browser = Self::new();
        *browser.rows.lock() = rows;
        browser
    }

    pub fn with_navigate_delay(mut self, delay: Duration) -> Self {
        self.navigate_delay = Some(delay);
        self
    }

    pub fn failing_on(mut self, url_fragment: &str) -> Self {
        self.fail_url_containing = Some(url_fragment.to_string());
        self
    }

    pub fn navigation_count(&self) -> usize {
        self.navigations.lock().len()
    }

    pub fn query_count(&self) -> usize {
        self.queries.lock().len()
    }
}

#[async_trait]
impl BrowserController for StubBrowser {
    async fn execute_navigate(
        &self,
        url: &str,
        _options: Option<&NavigateOptions>,
    ) -> EngineResult<NavigateOutcome> {
        if let Some(delay) = self.navigate_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(fragment) = &self.fail_url_containing {
            if url.contains(fragment.as_str()) {
                return Err(EngineError::new(
                    webql::ErrorKind::Network,
                    format!("navigation to {url} failed"),
                ));
            }
        }
        self.navigations.lock().push(url.to_string());
        Ok(NavigateOutcome {
            url: url.to_string(),
            redirects: Vec::new(),
            status_code: Some(200),
        })
    }

    async fn execute_dom_query(
        &self,
        selector: &str,
        _fields: &[SmolStr],
    ) -> EngineResult<Vec<Value>> {
        self.queries.lock().push(selector.to_string());
        Ok(self.rows.lock().clone())
    }

    async fn execute_click(&self, _selector: &str) -> EngineResult<()> {
        Ok(())
    }

    async fn execute_type(&self, _selector: &str, _text: &str) -> EngineResult<()> {
        Ok(())
    }

    async fn execute_wait(&self, _condition: &WaitCondition, _timeout_ms: f64) -> EngineResult<()> {
        Ok(())
    }

    async fn execute_screenshot(&self, _full_page: bool) -> EngineResult<Vec<u8>> {
        Ok(vec![0x89, 0x50, 0x4e, 0x47])
    }

    async fn execute_pdf(&self) -> EngineResult<Vec<u8>> {
        Ok(vec![0x25, 0x50, 0x44, 0x46])
    }

    async fn execute_evaluate_js(&self, _script: &str) -> EngineResult<Value> {
        Ok(Value::Null)
    }
}

/// A proxy controller backed by an in-memory map.
pub struct StubProxy {
    pub store: Mutex<BTreeMap<String, Value>>,
    pub lookups: Mutex<Vec<String>>,
}

impl StubProxy {
    pub fn new() -> Self {
        Self {
            store: Mutex::new(BTreeMap::new()),
            lookups: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ProxyController for StubProxy {
    async fn execute_cache_lookup(&self, key: &str) -> EngineResult<CacheLookupOutcome> {
        self.lookups.lock().push(key.to_string());
        let value = self.store.lock().get(key).cloned();
        Ok(CacheLookupOutcome {
            hit: value.is_some(),
            reason: value.is_none().then(|| "not stored".to_string()),
            value,
            metadata: None,
        })
    }

    async fn execute_cache_store(
        &self,
        key: &str,
        value: &Value,
        _ttl_ms: f64,
    ) -> EngineResult<()> {
        self.store.lock().insert(key.to_string(), value.clone());
        Ok(())
    }

    async fn intercept_request(&self, request: ProxyRequest) -> EngineResult<ProxyRequest> {
        Ok(request)
    }

    async fn intercept_response(&self, response: ProxyResponse) -> EngineResult<ProxyResponse> {
        Ok(response)
    }

    async fn check_rate_limit(&self, _key: &str) -> EngineResult<bool> {
        Ok(true)
    }
}

/// Builds an initialized engine over the given stubs.
pub fn engine_with(browser: Arc<StubBrowser>, proxy: Arc<StubProxy>) -> QueryEngine {
    let engine = QueryEngine::new(EngineConfig::default(), browser, proxy);
    engine.initialize();
    engine
}

/// Builds an initialized engine over fresh default stubs.
pub fn engine() -> (QueryEngine, Arc<StubBrowser>, Arc<StubProxy>) {
    let browser = Arc::new(StubBrowser::new());
    let proxy = Arc::new(StubProxy::new());
    let engine = engine_with(browser.clone(), proxy.clone());
    (engine, browser, proxy)
}

/// Polls a query's status until it reaches a terminal state.
pub async fn wait_for_terminal(engine: &QueryEngine, query_id: &str) -> QueryState {
    for _ in 0..500 {
        if let Some(status) = engine.query_status(query_id) {
            match status.state {
                QueryState::Completed
                | QueryState::Failed
                | QueryState::Cancelled
                | QueryState::TimedOut => return status.state,
                _ => {}
            }
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("query {query_id} did not finish in time");
}
