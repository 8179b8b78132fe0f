//! Controller seams for I/O-bearing steps.
//!
//! The engine core never performs network or browser work itself; NAVIGATE,
//! DOM extraction, and proxy/cache operations delegate through these narrow
//! async traits. Production implementations live outside this crate.

use crate::ast::statement::{NavigateOptions, WaitCondition};
use crate::error::EngineResult;
use crate::exec::value::Value;
use async_trait::async_trait;
use smol_str::SmolStr;

/// Result of a navigation.
#[derive(Debug, Clone, PartialEq)]
pub struct NavigateOutcome {
    /// The final URL after redirects.
    pub url: String,
    /// Redirect chain, oldest first.
    pub redirects: Vec<String>,
    /// HTTP status code, when the navigation produced one.
    pub status_code: Option<u16>,
}

/// Metadata attached to a proxy cache entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheEntryMetadata {
    pub stored_at_ms: f64,
    pub expires_at_ms: f64,
    pub ttl_ms: f64,
    pub age_ms: f64,
}

/// Result of a proxy cache lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheLookupOutcome {
    pub hit: bool,
    pub reason: Option<String>,
    pub value: Option<Value>,
    pub metadata: Option<CacheEntryMetadata>,
}

/// A request passing through the proxy.
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyRequest {
    pub url: String,
    pub method: String,
    pub headers: Vec<(SmolStr, SmolStr)>,
}

/// A response passing through the proxy.
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyResponse {
    pub status: u16,
    pub headers: Vec<(SmolStr, SmolStr)>,
    pub body: Value,
}

/// Browser-side operations.
#[async_trait]
pub trait BrowserController: Send + Sync {
    /// Navigates to a URL.
    async fn execute_navigate(
        &self,
        url: &str,
        options: Option<&NavigateOptions>,
    ) -> EngineResult<NavigateOutcome>;

    /// Extracts rows matching a selector. Each row maps field names to
    /// extracted values.
    async fn execute_dom_query(
        &self,
        selector: &str,
        fields: &[SmolStr],
    ) -> EngineResult<Vec<Value>>;

    /// Clicks the first element matching the selector.
    async fn execute_click(&self, selector: &str) -> EngineResult<()>;

    /// Types text into the element matching the selector.
    async fn execute_type(&self, selector: &str, text: &str) -> EngineResult<()>;

    /// Waits for a condition, bounded by a timeout.
    async fn execute_wait(&self, condition: &WaitCondition, timeout_ms: f64) -> EngineResult<()>;

    /// Captures a screenshot of the current page.
    async fn execute_screenshot(&self, full_page: bool) -> EngineResult<Vec<u8>>;

    /// Renders the current page to PDF.
    async fn execute_pdf(&self) -> EngineResult<Vec<u8>>;

    /// Evaluates JavaScript in the page.
    async fn execute_evaluate_js(&self, script: &str) -> EngineResult<Value>;
}

/// Proxy-side operations.
#[async_trait]
pub trait ProxyController: Send + Sync {
    /// Looks up a key in the proxy cache tier.
    async fn execute_cache_lookup(&self, key: &str) -> EngineResult<CacheLookupOutcome>;

    /// Stores a value in the proxy cache tier.
    async fn execute_cache_store(&self, key: &str, value: &Value, ttl_ms: f64)
        -> EngineResult<()>;

    /// Rewrites an outgoing request.
    async fn intercept_request(&self, request: ProxyRequest) -> EngineResult<ProxyRequest>;

    /// Rewrites an incoming response.
    async fn intercept_response(&self, response: ProxyResponse) -> EngineResult<ProxyResponse>;

    /// Returns false when the key is currently rate limited.
    async fn check_rate_limit(&self, key: &str) -> EngineResult<bool>;
}

/// Output formats the engine can request from a formatter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Html,
    Xml,
    Yaml,
    Stream,
}

/// Formatter options.
#[derive(Debug, Clone, PartialEq)]
pub struct FormatOptions {
    pub pretty: bool,
    pub indent: usize,
    pub max_depth: usize,
    pub include_headers: bool,
    pub delimiter: char,
    pub quote: char,
    pub escape: char,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            pretty: false,
            indent: 2,
            max_depth: 32,
            include_headers: true,
            delimiter: ',',
            quote: '"',
            escape: '\\',
        }
    }
}

/// Result formatter seam.
pub trait ResultFormatter: Send + Sync {
    /// Renders a value in the requested format.
    fn format(
        &self,
        data: &Value,
        format: OutputFormat,
        options: &FormatOptions,
    ) -> EngineResult<String>;
}
