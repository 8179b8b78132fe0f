//! Statement AST nodes for WebQL.

use crate::ast::expression::Expression;
use crate::ast::Span;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// A parsed WebQL program: one or more statements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub statements: Vec<Statement>,
}

impl Program {
    /// Creates a program from a statement list.
    pub fn new(statements: Vec<Statement>) -> Self {
        Self { statements }
    }
}

/// Represents any statement in WebQL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Statement {
    Select(SelectStatement),
    Navigate(NavigateStatement),
    Set(SetStatement),
    Show(ShowStatement),
    For(ForStatement),
    If(IfStatement),
    Insert(InsertStatement),
    Update(UpdateStatement),
    Delete(DeleteStatement),
    With(WithStatement),
    /// Produced when an optimizer pass eliminates a statement entirely.
    Empty(Span),
}

impl Statement {
    /// Returns the span of this statement.
    pub fn span(&self) -> Span {
        match self {
            Statement::Select(s) => s.span.clone(),
            Statement::Navigate(s) => s.span.clone(),
            Statement::Set(s) => s.span.clone(),
            Statement::Show(s) => s.span.clone(),
            Statement::For(s) => s.span.clone(),
            Statement::If(s) => s.span.clone(),
            Statement::Insert(s) => s.span.clone(),
            Statement::Update(s) => s.span.clone(),
            Statement::Delete(s) => s.span.clone(),
            Statement::With(s) => s.span.clone(),
            Statement::Empty(span) => span.clone(),
        }
    }

    /// Returns true when this statement was eliminated by optimization.
    pub fn is_empty(&self) -> bool {
        matches!(self, Statement::Empty(_))
    }
}

/// A projected field in a SELECT or CAPTURE list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectField {
    /// The field expression.
    pub expr: Expression,
    /// Explicit `AS` alias, if given.
    pub alias: Option<SmolStr>,
    /// The output name: alias, identifier name, member-expression root, or
    /// `"expr"` for anything else.
    pub name: SmolStr,
    /// Full dotted path when the expression is a member chain.
    pub path: Option<SmolStr>,
    pub span: Span,
}

impl SelectField {
    /// Returns the effective output name (alias wins over inferred name).
    pub fn output_name(&self) -> &SmolStr {
        self.alias.as_ref().unwrap_or(&self.name)
    }

    /// Returns true when this field is the `*` wildcard.
    pub fn is_wildcard(&self) -> bool {
        self.name == "*" && self.alias.is_none()
    }
}

/// The source of a SELECT statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SelectSource {
    /// A quoted URL literal.
    Url(SmolStr, Span),
    /// A parenthesized subquery.
    Subquery(Box<Statement>, Span),
    /// A variable reference.
    Variable(SmolStr, Span),
}

impl SelectSource {
    /// Returns the span of this source.
    pub fn span(&self) -> Span {
        match self {
            SelectSource::Url(_, span) => span.clone(),
            SelectSource::Subquery(_, span) => span.clone(),
            SelectSource::Variable(_, span) => span.clone(),
        }
    }
}

/// One ORDER BY key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderField {
    pub name: SmolStr,
    pub descending: bool,
    pub span: Span,
}

/// SELECT statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectStatement {
    pub fields: Vec<SelectField>,
    pub source: SelectSource,
    pub where_clause: Option<Expression>,
    pub order_by: Vec<OrderField>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub span: Span,
}

impl SelectStatement {
    /// Returns true when the only field is the `*` wildcard.
    pub fn is_wildcard(&self) -> bool {
        self.fields.len() == 1 && self.fields[0].is_wildcard()
    }
}

/// Wait condition in NAVIGATE options: a lifecycle event or a CSS selector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WaitCondition {
    Load,
    DomContentLoaded,
    NetworkIdle,
    Selector(SmolStr),
}

impl WaitCondition {
    /// Parses a wait condition from its textual form, if recognized.
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "load" => Some(WaitCondition::Load),
            "domcontentloaded" => Some(WaitCondition::DomContentLoaded),
            "networkidle" => Some(WaitCondition::NetworkIdle),
            _ if text.starts_with('.') || text.starts_with('#') || text.starts_with('[') => {
                Some(WaitCondition::Selector(SmolStr::new(text)))
            }
            _ => None,
        }
    }
}

/// Proxy sub-options of a NAVIGATE statement.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProxyOptions {
    pub enabled: Option<bool>,
    pub cache: Option<bool>,
    pub cache_ttl_ms: Option<f64>,
    pub headers: Vec<(SmolStr, SmolStr)>,
    pub timeout_ms: Option<f64>,
}

/// Browser sub-options of a NAVIGATE statement.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BrowserOptions {
    pub headless: Option<bool>,
    pub viewport: Option<(u32, u32)>,
    pub user_agent: Option<SmolStr>,
    pub timeout_ms: Option<f64>,
}

/// Validated NAVIGATE options (the `WITH {...}` object).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NavigateOptions {
    pub proxy: Option<ProxyOptions>,
    pub browser: Option<BrowserOptions>,
    pub wait_for: Option<WaitCondition>,
    pub wait_until: Option<WaitCondition>,
    pub timeout_ms: Option<f64>,
    pub screenshot: bool,
}

impl NavigateOptions {
    /// Returns true when the proxy cache is explicitly disabled.
    pub fn cache_disabled(&self) -> bool {
        self.proxy
            .as_ref()
            .is_some_and(|p| p.cache == Some(false) || p.enabled == Some(false))
    }
}

/// NAVIGATE statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigateStatement {
    pub url: Expression,
    pub options: Option<NavigateOptions>,
    pub capture: Vec<SelectField>,
    pub span: Span,
}

/// SET statement: `SET path.to.name = expr`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetStatement {
    /// Dotted path segments.
    pub path: Vec<SmolStr>,
    pub value: Expression,
    pub span: Span,
}

impl SetStatement {
    /// Returns the full dotted variable name.
    pub fn variable_name(&self) -> SmolStr {
        SmolStr::new(
            self.path
                .iter()
                .map(SmolStr::as_str)
                .collect::<Vec<_>>()
                .join("."),
        )
    }
}

/// SHOW statement: `SHOW CACHE`, `SHOW METRICS`, ...
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShowStatement {
    pub target: SmolStr,
    pub span: Span,
}

/// FOR EACH loop statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForStatement {
    pub variable: SmolStr,
    pub iterable: Expression,
    pub body: Vec<Statement>,
    pub span: Span,
}

/// IF statement with optional ELSE branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IfStatement {
    pub condition: Expression,
    pub then_branch: Vec<Statement>,
    pub else_branch: Vec<Statement>,
    pub span: Span,
}

/// INSERT statement: `INSERT INTO target VALUES (...)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertStatement {
    pub target: Expression,
    pub values: Vec<Expression>,
    pub span: Span,
}

/// UPDATE statement: `UPDATE target SET a = 1, b = 2 [WHERE ...]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateStatement {
    pub target: Expression,
    pub assignments: Vec<(SmolStr, Expression)>,
    pub where_clause: Option<Expression>,
    pub span: Span,
}

/// DELETE statement: `DELETE FROM target [WHERE ...]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteStatement {
    pub target: Expression,
    pub where_clause: Option<Expression>,
    pub span: Span,
}

/// A single common table expression in a WITH statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommonTableExpression {
    pub name: SmolStr,
    pub statement: Box<Statement>,
    pub span: Span,
}

/// WITH statement: CTE list plus a body statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithStatement {
    pub ctes: Vec<CommonTableExpression>,
    pub body: Box<Statement>,
    pub span: Span,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::expression::Literal;

    #[test]
    fn output_name_prefers_alias() {
        let field = SelectField {
            expr: Expression::Identifier("title".into(), 0..5),
            alias: Some("heading".into()),
            name: "title".into(),
            path: None,
            span: 0..5,
        };
        assert_eq!(field.output_name().as_str(), "heading");
    }

    #[test]
    fn wildcard_detection() {
        let star = SelectField {
            expr: Expression::Identifier("*".into(), 7..8),
            alias: None,
            name: "*".into(),
            path: None,
            span: 7..8,
        };
        assert!(star.is_wildcard());
    }

    #[test]
    fn wait_condition_parsing() {
        assert_eq!(WaitCondition::parse("load"), Some(WaitCondition::Load));
        assert_eq!(
            WaitCondition::parse("#main"),
            Some(WaitCondition::Selector("#main".into()))
        );
        assert_eq!(WaitCondition::parse("bogus"), None);
    }

    #[test]
    fn cache_disabled_via_proxy_options() {
        let options = NavigateOptions {
            proxy: Some(ProxyOptions {
                cache: Some(false),
                ..ProxyOptions::default()
            }),
            ..NavigateOptions::default()
        };
        assert!(options.cache_disabled());
        assert!(!NavigateOptions::default().cache_disabled());
    }

    #[test]
    fn set_statement_variable_name() {
        let set = SetStatement {
            path: vec!["config".into(), "proxy".into(), "enabled".into()],
            value: Expression::Literal(Literal::Boolean(true), 0..4),
            span: 0..10,
        };
        assert_eq!(set.variable_name().as_str(), "config.proxy.enabled");
    }
}
