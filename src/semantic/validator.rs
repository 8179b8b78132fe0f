//! Structural validation of WebQL statements.
//!
//! Validation runs after symbol resolution and type inference. It enforces
//! shape rules the grammar cannot: duplicate output names, ORDER BY
//! visibility, LIMIT/OFFSET bounds, URL well-formedness, and NAVIGATE
//! option bounds.

use crate::ast::statement::{
    NavigateStatement, SelectField, SelectSource, SelectStatement, Statement,
};
use crate::ast::{Expression, Literal, Program, Span};
use crate::diag::Diag;
use std::collections::HashSet;
use url::Url;

/// Configuration for structural validation.
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// URL schemes accepted in FROM and NAVIGATE positions.
    pub allowed_schemes: Vec<String>,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            allowed_schemes: vec!["http".into(), "https".into(), "about".into()],
        }
    }
}

/// Structural validator.
pub struct Validator {
    config: ValidatorConfig,
    diagnostics: Vec<Diag>,
}

impl Validator {
    /// Creates a validator with the given configuration.
    pub fn new(config: ValidatorConfig) -> Self {
        Self {
            config,
            diagnostics: Vec::new(),
        }
    }

    /// Validates a whole program, returning all diagnostics found.
    pub fn validate_program(mut self, program: &Program) -> Vec<Diag> {
        for statement in &program.statements {
            self.validate_statement(statement);
        }
        self.diagnostics
    }

    fn validate_statement(&mut self, statement: &Statement) {
        match statement {
            Statement::Select(select) => self.validate_select(select),
            Statement::Navigate(navigate) => self.validate_navigate(navigate),
            Statement::For(for_loop) => {
                for statement in &for_loop.body {
                    self.validate_statement(statement);
                }
            }
            Statement::If(branch) => {
                for statement in branch.then_branch.iter().chain(&branch.else_branch) {
                    self.validate_statement(statement);
                }
            }
            Statement::With(with) => {
                for cte in &with.ctes {
                    self.validate_statement(&cte.statement);
                }
                self.validate_statement(&with.body);
            }
            Statement::Update(update) => {
                let mut seen = HashSet::new();
                for (name, _) in &update.assignments {
                    if !seen.insert(name.clone()) {
                        self.error(
                            update.span.clone(),
                            format!("duplicate assignment to '{name}' in UPDATE"),
                            "duplicate_assignment",
                        );
                    }
                }
            }
            Statement::Set(_)
            | Statement::Show(_)
            | Statement::Insert(_)
            | Statement::Delete(_)
            | Statement::Empty(_) => {}
        }
    }

    fn validate_select(&mut self, select: &SelectStatement) {
        if select.fields.is_empty() {
            self.error(
                select.span.clone(),
                "SELECT requires at least one field",
                "empty_field_list",
            );
            return;
        }

        let wildcard_count = select.fields.iter().filter(|f| f.is_wildcard()).count();
        if wildcard_count > 0 && select.fields.len() > 1 {
            self.error(
                select.span.clone(),
                "'*' cannot be combined with other fields",
                "mixed_wildcard",
            );
        }

        self.check_duplicate_outputs(&select.fields);

        // ORDER BY keys must be visible in the output, unless projecting *.
        if !select.is_wildcard() {
            let outputs: HashSet<&str> = select
                .fields
                .iter()
                .map(|f| f.output_name().as_str())
                .collect();
            for key in &select.order_by {
                if !outputs.contains(key.name.as_str()) {
                    self.error(
                        key.span.clone(),
                        format!("ORDER BY field '{}' is not in the SELECT list", key.name),
                        "order_by_visibility",
                    );
                }
            }
        }

        if select.limit == Some(0) {
            self.error(
                select.span.clone(),
                "LIMIT must be greater than zero",
                "limit_bound",
            );
        }

        match &select.source {
            SelectSource::Url(url, span) => self.check_url(url, span),
            SelectSource::Subquery(statement, _) => self.validate_statement(statement),
            SelectSource::Variable(_, _) => {}
        }
    }

    fn validate_navigate(&mut self, navigate: &NavigateStatement) {
        if let Expression::Literal(Literal::String(url), span) = &navigate.url {
            self.check_url(url, span);
        }

        if let Some(options) = &navigate.options {
            if options.timeout_ms == Some(0.0) {
                self.error(
                    navigate.span.clone(),
                    "NAVIGATE timeout must be positive",
                    "timeout_bound",
                );
            }
            if let Some(browser) = &options.browser {
                if let Some((width, height)) = browser.viewport {
                    if width == 0 || height == 0 {
                        self.error(
                            navigate.span.clone(),
                            "viewport dimensions must be positive",
                            "viewport_bound",
                        );
                    }
                }
                if browser.timeout_ms == Some(0.0) {
                    self.error(
                        navigate.span.clone(),
                        "browser timeout must be positive",
                        "timeout_bound",
                    );
                }
            }
        }

        self.check_duplicate_outputs(&navigate.capture);
    }

    fn check_duplicate_outputs(&mut self, fields: &[SelectField]) {
        let mut seen: HashSet<&str> = HashSet::new();
        for field in fields {
            if field.is_wildcard() {
                continue;
            }
            let name = field.output_name().as_str();
            if !seen.insert(name) {
                self.error(
                    field.span.clone(),
                    format!("duplicate output name '{name}'"),
                    "duplicate_output",
                );
            }
        }
    }

    fn check_url(&mut self, url: &str, span: &Span) {
        match Url::parse(url) {
            Ok(parsed) => {
                let scheme = parsed.scheme();
                if !self
                    .config
                    .allowed_schemes
                    .iter()
                    .any(|allowed| allowed == scheme)
                {
                    self.error(
                        span.clone(),
                        format!("URL scheme '{scheme}:' is not allowed"),
                        "url_scheme",
                    );
                }
            }
            Err(err) => {
                self.error(
                    span.clone(),
                    format!("invalid URL: {err}"),
                    "url_parse",
                );
            }
        }
    }

    fn error(&mut self, span: Span, message: impl Into<String>, rule: &'static str) {
        self.diagnostics
            .push(Diag::validation(message).at(span, "here").rule(rule));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::parser::Parser;

    fn validate(source: &str) -> Vec<Diag> {
        let lex = tokenize(source);
        let parse = Parser::new(lex.tokens, source)
            .with_lexer_diagnostics(lex.diagnostics)
            .parse();
        let program = parse.ast.unwrap_or_else(|| {
            panic!("parse failed for `{source}`: {:?}", parse.diagnostics)
        });
        Validator::new(ValidatorConfig::default()).validate_program(&program)
    }

    #[test]
    fn clean_select_passes() {
        assert!(validate("SELECT title, url FROM 'https://example.com'").is_empty());
    }

    #[test]
    fn duplicate_output_names_rejected() {
        let diags = validate("SELECT title, body AS title FROM 'https://x.com'");
        assert!(diags.iter().any(|d| d.message.contains("duplicate output")));
    }

    #[test]
    fn order_by_must_be_selected() {
        let diags = validate("SELECT title FROM 'https://x.com' ORDER BY price");
        assert!(diags.iter().any(|d| d.message.contains("ORDER BY")));
    }

    #[test]
    fn order_by_allowed_with_wildcard() {
        assert!(validate("SELECT * FROM 'https://x.com' ORDER BY price").is_empty());
    }

    #[test]
    fn limit_zero_rejected() {
        let diags = validate("SELECT title FROM 'https://x.com' LIMIT 0");
        assert!(diags.iter().any(|d| d.message.contains("LIMIT")));
    }

    #[test]
    fn disallowed_scheme_rejected() {
        let diags = validate("SELECT title FROM 'ftp://files.example.com'");
        assert!(diags.iter().any(|d| d.message.contains("scheme")));
    }

    #[test]
    fn about_blank_is_allowed() {
        assert!(validate("SELECT 1 AS one FROM 'about:blank'").is_empty());
    }

    #[test]
    fn malformed_url_rejected() {
        let diags = validate("SELECT x FROM 'not a url'");
        assert!(diags.iter().any(|d| d.message.contains("invalid URL")));
    }

    #[test]
    fn zero_viewport_rejected() {
        let diags = validate(
            "NAVIGATE TO 'https://x.com' WITH {browser: {viewport: {width: 0, height: 600}}}",
        );
        assert!(diags.iter().any(|d| d.message.contains("viewport")));
    }

    #[test]
    fn wildcard_mixed_with_fields_rejected() {
        let diags = validate("SELECT *, title FROM 'https://x.com'");
        assert!(diags.iter().any(|d| d.message.contains("'*'")));
    }
}
