//! Field-name classification heuristics.
//!
//! Identifier patterns like `dom.text`, `response.status`, `attr:href`, and
//! selector-shaped field names carry extraction semantics. The heuristics
//! are observable behavior and live here so they can be swapped wholesale.

use crate::ast::expression::{BinaryOperator, Expression, Literal};
use smol_str::SmolStr;

/// What a field name means for DOM extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldClass {
    /// The name itself is a CSS selector (`.price`, `#title`, `a[href]`).
    Selector(SmolStr),
    /// `attr:NAME` extracts an attribute value.
    Attribute(SmolStr),
    /// `dom.NAME` reads a DOM property (`dom.text`, `dom.html`).
    DomProperty(SmolStr),
    /// `response.NAME` reads response metadata (`response.status`).
    ResponseProperty(SmolStr),
    /// An ordinary field name.
    Plain(SmolStr),
}

/// Returns true when a name is shaped like a CSS selector: it starts with
/// `.` or `#`, or contains `[` or `>`.
pub fn looks_like_selector(name: &str) -> bool {
    name.starts_with('.') || name.starts_with('#') || name.contains('[') || name.contains('>')
}

/// Classifies a field name.
pub fn classify_field(name: &str) -> FieldClass {
    if let Some(attribute) = name.strip_prefix("attr:") {
        return FieldClass::Attribute(SmolStr::new(attribute));
    }
    if let Some(property) = name.strip_prefix("dom.") {
        return FieldClass::DomProperty(SmolStr::new(property));
    }
    if let Some(property) = name.strip_prefix("response.") {
        return FieldClass::ResponseProperty(SmolStr::new(property));
    }
    if looks_like_selector(name) {
        return FieldClass::Selector(SmolStr::new(name));
    }
    FieldClass::Plain(SmolStr::new(name))
}

/// Extracts a selector from a URL fragment: `https://x.com/#items` yields
/// `#items`.
pub fn selector_from_url(url: &str) -> Option<SmolStr> {
    let fragment = url.split('#').nth(1)?;
    if fragment.is_empty() {
        return None;
    }
    Some(SmolStr::new(format!("#{fragment}")))
}

/// Extracts a selector from a `WHERE selector = '...'` pattern, scanning
/// conjuncts of the predicate.
pub fn selector_from_predicate(predicate: &Expression) -> Option<SmolStr> {
    match predicate {
        Expression::Binary(BinaryOperator::And, left, right, _) => {
            selector_from_predicate(left).or_else(|| selector_from_predicate(right))
        }
        Expression::Binary(BinaryOperator::Eq, left, right, _) => {
            let name = left.as_identifier()?;
            if name != "selector" {
                return None;
            }
            match right.as_literal() {
                Some(Literal::String(value)) => Some(value.clone()),
                _ => None,
            }
        }
        _ => None,
    }
}
