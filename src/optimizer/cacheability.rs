//! Cacheability analysis (non-mutating).
//!
//! Attaches `{cacheable, key, ttl}` metadata to each top-level statement.
//! A SELECT from a URL literal with only deterministic expressions is
//! cacheable; a NAVIGATE with a literal URL is cacheable unless the proxy
//! cache is explicitly disabled. Control-flow and assignment statements
//! never are.

use crate::ast::expression::{Expression, Literal};
use crate::ast::printer::{print_expression, print_fields_inline, print_order_inline};
use crate::ast::statement::{SelectSource, Statement};
use crate::semantic::NON_DETERMINISTIC_BUILTINS;

/// Cache metadata for one statement.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheDecision {
    /// Whether the statement's result may be served from cache.
    pub cacheable: bool,
    /// Stable cache key, present when cacheable.
    pub cache_key: Option<String>,
    /// Time-to-live in milliseconds, present when cacheable.
    pub ttl_ms: Option<f64>,
    /// Why the statement is not cacheable.
    pub reason: Option<String>,
}

impl CacheDecision {
    fn no(reason: impl Into<String>) -> Self {
        Self {
            cacheable: false,
            cache_key: None,
            ttl_ms: None,
            reason: Some(reason.into()),
        }
    }

    fn yes(key: String, ttl_ms: f64) -> Self {
        Self {
            cacheable: true,
            cache_key: Some(key),
            ttl_ms: Some(ttl_ms),
            reason: None,
        }
    }
}

/// Field names whose presence in a WHERE clause suggests time-sensitive
/// data and shortens the TTL.
const TIME_SENSITIVE_HINTS: &[&str] = &[
    "time", "date", "now", "today", "latest", "recent", "updated", "created",
];

/// Analyzes one statement.
pub fn analyze_statement(statement: &Statement) -> CacheDecision {
    match statement {
        Statement::Select(select) => {
            let SelectSource::Url(url, _) = &select.source else {
                return CacheDecision::no("source is not a URL literal");
            };

            let mut expressions: Vec<&Expression> =
                select.fields.iter().map(|f| &f.expr).collect();
            if let Some(where_clause) = &select.where_clause {
                expressions.push(where_clause);
            }
            if expressions
                .iter()
                .any(|e| e.calls_any(NON_DETERMINISTIC_BUILTINS))
            {
                return CacheDecision::no("references a non-deterministic function");
            }

            let key = format!(
                "select:{url}:{fields}:{predicate}:{order}:{limit}:{offset}",
                fields = print_fields_inline(&select.fields),
                predicate = select
                    .where_clause
                    .as_ref()
                    .map(print_expression)
                    .unwrap_or_default(),
                order = print_order_inline(&select.order_by),
                limit = select.limit.map(|l| l.to_string()).unwrap_or_default(),
                offset = select.offset.map(|o| o.to_string()).unwrap_or_default(),
            );

            let ttl_ms = select_ttl_ms(select);
            CacheDecision::yes(key, ttl_ms)
        }
        Statement::Navigate(navigate) => {
            let Expression::Literal(Literal::String(url), _) = &navigate.url else {
                return CacheDecision::no("URL is not a literal");
            };
            if navigate
                .options
                .as_ref()
                .is_some_and(|options| options.cache_disabled())
            {
                return CacheDecision::no("proxy cache explicitly disabled");
            }
            CacheDecision::yes(format!("navigate:{url}"), 300_000.0)
        }
        Statement::For(_) => CacheDecision::no("loops are never cacheable"),
        Statement::If(_) => CacheDecision::no("branches are never cacheable"),
        Statement::With(_) => CacheDecision::no("CTE statements are never cacheable"),
        Statement::Set(_) => CacheDecision::no("assignments are never cacheable"),
        Statement::Show(_) => CacheDecision::no("SHOW is never cacheable"),
        Statement::Insert(_) | Statement::Update(_) | Statement::Delete(_) => {
            CacheDecision::no("mutating statements are never cacheable")
        }
        Statement::Empty(_) => CacheDecision::no("statement was eliminated"),
    }
}

/// TTL heuristics: 60 s by default, 30 s when ORDER BY or LIMIT narrows the
/// result, 10 s when the WHERE clause touches a time-sensitive field.
fn select_ttl_ms(select: &crate::ast::statement::SelectStatement) -> f64 {
    if let Some(where_clause) = &select.where_clause {
        let mut names = Vec::new();
        where_clause.collect_identifiers(&mut names);
        let time_sensitive = names.iter().any(|name| {
            let lower = name.to_ascii_lowercase();
            TIME_SENSITIVE_HINTS.iter().any(|hint| lower.contains(hint))
        });
        if time_sensitive {
            return 10_000.0;
        }
    }
    if !select.order_by.is_empty() || select.limit.is_some() {
        return 30_000.0;
    }
    60_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::parser::Parser;

    fn analyze(source: &str) -> CacheDecision {
        let lex = tokenize(source);
        let program = Parser::new(lex.tokens, source)
            .with_lexer_diagnostics(lex.diagnostics)
            .parse()
            .ast
            .expect("parse");
        analyze_statement(&program.statements[0])
    }

    #[test]
    fn url_select_is_cacheable() {
        let decision = analyze("SELECT title FROM 'https://x.com'");
        assert!(decision.cacheable);
        assert!(decision.cache_key.as_deref().unwrap().starts_with("select:https://x.com:"));
        assert_eq!(decision.ttl_ms, Some(60_000.0));
    }

    #[test]
    fn order_by_shortens_ttl() {
        let decision = analyze("SELECT title FROM 'https://x.com' ORDER BY title LIMIT 5");
        assert_eq!(decision.ttl_ms, Some(30_000.0));
    }

    #[test]
    fn time_sensitive_where_shortens_ttl_further() {
        let decision =
            analyze("SELECT title FROM 'https://x.com' WHERE updated_at > 5");
        assert_eq!(decision.ttl_ms, Some(10_000.0));
    }

    #[test]
    fn non_deterministic_select_is_not_cacheable() {
        let decision = analyze("SELECT title FROM 'https://x.com' WHERE ts > NOW()");
        assert!(!decision.cacheable);
        assert!(decision.reason.as_deref().unwrap().contains("non-deterministic"));
    }

    #[test]
    fn variable_source_is_not_cacheable() {
        assert!(!analyze("SELECT title FROM rows").cacheable);
    }

    #[test]
    fn navigate_literal_is_cacheable() {
        let decision = analyze("NAVIGATE TO 'https://x.com'");
        assert!(decision.cacheable);
        assert_eq!(decision.cache_key.as_deref(), Some("navigate:https://x.com"));
        assert_eq!(decision.ttl_ms, Some(300_000.0));
    }

    #[test]
    fn navigate_with_cache_disabled_is_not_cacheable() {
        let decision = analyze("NAVIGATE TO 'https://x.com' WITH {proxy: {cache: FALSE}}");
        assert!(!decision.cacheable);
    }

    #[test]
    fn control_flow_is_never_cacheable() {
        assert!(!analyze("SHOW METRICS").cacheable);
        assert!(!analyze("SET x = 1").cacheable);
        assert!(!analyze("IF TRUE THEN SHOW CACHE").cacheable);
        assert!(!analyze("FOR EACH u IN [1] { SHOW CACHE }").cacheable);
    }

    #[test]
    fn distinct_queries_have_distinct_keys() {
        let a = analyze("SELECT title FROM 'https://x.com'");
        let b = analyze("SELECT title FROM 'https://x.com' LIMIT 3");
        assert_ne!(a.cache_key, b.cache_key);
    }
}
