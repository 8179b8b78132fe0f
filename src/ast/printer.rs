//! Canonical text rendering of the AST.
//!
//! The printer produces parseable WebQL text in a normalized form. It backs
//! the round-trip guarantees of the parser, the cache-key encoding of the
//! cacheability pass, and the optimized-query text surfaced in result
//! metadata. Printing drops comments and normalizes whitespace; re-parsing
//! printed text yields a structurally identical AST.

use crate::ast::expression::{Expression, Literal, MemberProperty};
use crate::ast::statement::{
    NavigateOptions, Program, SelectField, SelectSource, Statement, WaitCondition,
};

/// Renders a whole program.
pub fn print_program(program: &Program) -> String {
    program
        .statements
        .iter()
        .filter(|statement| !statement.is_empty())
        .map(print_statement)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Renders a single statement.
pub fn print_statement(statement: &Statement) -> String {
    match statement {
        Statement::Select(select) => {
            let mut out = String::from("SELECT ");
            out.push_str(&print_fields(&select.fields));
            out.push_str(" FROM ");
            out.push_str(&print_source(&select.source));
            if let Some(where_clause) = &select.where_clause {
                out.push_str(" WHERE ");
                out.push_str(&print_expression(where_clause));
            }
            if !select.order_by.is_empty() {
                out.push_str(" ORDER BY ");
                let keys: Vec<String> = select
                    .order_by
                    .iter()
                    .map(|key| {
                        format!(
                            "{} {}",
                            key.name,
                            if key.descending { "DESC" } else { "ASC" }
                        )
                    })
                    .collect();
                out.push_str(&keys.join(", "));
            }
            if let Some(limit) = select.limit {
                out.push_str(&format!(" LIMIT {limit}"));
                if let Some(offset) = select.offset {
                    out.push_str(&format!(" OFFSET {offset}"));
                }
            }
            out
        }
        Statement::Navigate(navigate) => {
            let mut out = String::from("NAVIGATE TO ");
            out.push_str(&print_expression(&navigate.url));
            if let Some(options) = &navigate.options {
                out.push_str(" WITH ");
                out.push_str(&print_navigate_options(options));
            }
            if !navigate.capture.is_empty() {
                out.push_str(" CAPTURE ");
                out.push_str(&print_fields(&navigate.capture));
            }
            out
        }
        Statement::Set(set) => {
            format!(
                "SET {} = {}",
                set.path
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join("."),
                print_expression(&set.value)
            )
        }
        Statement::Show(show) => format!("SHOW {}", show.target),
        Statement::For(for_loop) => {
            format!(
                "FOR EACH {} IN {} {}",
                for_loop.variable,
                print_expression(&for_loop.iterable),
                print_block(&for_loop.body)
            )
        }
        Statement::If(branch) => {
            let mut out = format!(
                "IF {} THEN {}",
                print_expression(&branch.condition),
                print_block(&branch.then_branch)
            );
            if !branch.else_branch.is_empty() {
                out.push_str(" ELSE ");
                out.push_str(&print_block(&branch.else_branch));
            }
            out
        }
        Statement::Insert(insert) => {
            let values: Vec<String> = insert.values.iter().map(print_expression).collect();
            format!(
                "INSERT INTO {} VALUES ({})",
                print_expression(&insert.target),
                values.join(", ")
            )
        }
        Statement::Update(update) => {
            let assignments: Vec<String> = update
                .assignments
                .iter()
                .map(|(name, value)| format!("{name} = {}", print_expression(value)))
                .collect();
            let mut out = format!(
                "UPDATE {} SET {}",
                print_expression(&update.target),
                assignments.join(", ")
            );
            if let Some(where_clause) = &update.where_clause {
                out.push_str(" WHERE ");
                out.push_str(&print_expression(where_clause));
            }
            out
        }
        Statement::Delete(delete) => {
            let mut out = format!("DELETE FROM {}", print_expression(&delete.target));
            if let Some(where_clause) = &delete.where_clause {
                out.push_str(" WHERE ");
                out.push_str(&print_expression(where_clause));
            }
            out
        }
        Statement::With(with) => {
            let ctes: Vec<String> = with
                .ctes
                .iter()
                .map(|cte| format!("{} AS ({})", cte.name, print_statement(&cte.statement)))
                .collect();
            format!(
                "WITH {} {}",
                ctes.join(", "),
                print_statement(&with.body)
            )
        }
        Statement::Empty(_) => String::new(),
    }
}

/// Renders an expression.
pub fn print_expression(expr: &Expression) -> String {
    match expr {
        Expression::Literal(literal, _) => print_literal(literal),
        Expression::Identifier(name, _) => name.to_string(),
        Expression::Binary(op, left, right, _) => {
            format!(
                "{} {op} {}",
                print_operand(left),
                print_operand(right)
            )
        }
        Expression::Unary(op, operand, _) => match op {
            crate::ast::UnaryOperator::Not => format!("NOT {}", print_operand(operand)),
            _ => format!("{op}{}", print_operand(operand)),
        },
        Expression::Call(callee, args, _) => {
            let args: Vec<String> = args.iter().map(print_expression).collect();
            format!("{callee}({})", args.join(", "))
        }
        Expression::Member(object, property, _) => match property {
            MemberProperty::Static(name) => format!("{}.{name}", print_operand(object)),
            MemberProperty::Computed(index) => {
                format!("{}[{}]", print_operand(object), print_expression(index))
            }
        },
        Expression::Array(elements, _) => {
            let elements: Vec<String> = elements.iter().map(print_expression).collect();
            format!("[{}]", elements.join(", "))
        }
        Expression::Object(properties, _) => {
            let properties: Vec<String> = properties
                .iter()
                .map(|p| format!("{}: {}", p.key, print_expression(&p.value)))
                .collect();
            format!("{{{}}}", properties.join(", "))
        }
    }
}

/// Wraps compound operands in parentheses so the printed form re-parses to
/// the same tree regardless of operator precedence.
fn print_operand(expr: &Expression) -> String {
    match expr {
        Expression::Binary(_, _, _, _) | Expression::Unary(_, _, _) => {
            format!("({})", print_expression(expr))
        }
        _ => print_expression(expr),
    }
}

fn print_literal(literal: &Literal) -> String {
    match literal {
        Literal::String(value) => quote_string(value),
        Literal::Number(value) => format_number(*value),
        Literal::Boolean(true) => "TRUE".to_string(),
        Literal::Boolean(false) => "FALSE".to_string(),
        Literal::Null => "NULL".to_string(),
        Literal::Duration(ms) => format!("{}ms", format_number(*ms)),
        Literal::Bytes(bytes) => format!("{}KB", format_number(*bytes as f64 / 1024.0)),
    }
}

/// Renders a field list in its canonical inline form (used for cache keys).
pub fn print_fields_inline(fields: &[SelectField]) -> String {
    print_fields(fields)
}

/// Renders ORDER BY keys in their canonical inline form (used for cache
/// keys).
pub fn print_order_inline(keys: &[crate::ast::statement::OrderField]) -> String {
    keys.iter()
        .map(|key| {
            format!(
                "{} {}",
                key.name,
                if key.descending { "DESC" } else { "ASC" }
            )
        })
        .collect::<Vec<_>>()
        .join(",")
}

fn print_fields(fields: &[SelectField]) -> String {
    fields
        .iter()
        .map(|field| {
            let expr = print_expression(&field.expr);
            match &field.alias {
                Some(alias) => format!("{expr} AS {alias}"),
                None => expr,
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn print_source(source: &SelectSource) -> String {
    match source {
        SelectSource::Url(url, _) => quote_string(url),
        SelectSource::Subquery(statement, _) => format!("({})", print_statement(statement)),
        SelectSource::Variable(name, _) => name.to_string(),
    }
}

fn print_block(statements: &[Statement]) -> String {
    if statements.is_empty() {
        return "{ }".to_string();
    }
    let body: Vec<String> = statements
        .iter()
        .filter(|s| !s.is_empty())
        .map(print_statement)
        .collect();
    format!("{{ {} }}", body.join(" "))
}

fn print_navigate_options(options: &NavigateOptions) -> String {
    let mut entries = Vec::new();
    if let Some(proxy) = &options.proxy {
        let mut proxy_entries = Vec::new();
        if let Some(enabled) = proxy.enabled {
            proxy_entries.push(format!("enabled: {}", print_bool(enabled)));
        }
        if let Some(cache) = proxy.cache {
            proxy_entries.push(format!("cache: {}", print_bool(cache)));
        }
        if let Some(ttl) = proxy.cache_ttl_ms {
            proxy_entries.push(format!("cacheTtl: {}", format_number(ttl)));
        }
        if !proxy.headers.is_empty() {
            let headers: Vec<String> = proxy
                .headers
                .iter()
                .map(|(k, v)| format!("{k}: {}", quote_string(v)))
                .collect();
            proxy_entries.push(format!("headers: {{{}}}", headers.join(", ")));
        }
        if let Some(timeout) = proxy.timeout_ms {
            proxy_entries.push(format!("timeout: {}", format_number(timeout)));
        }
        entries.push(format!("proxy: {{{}}}", proxy_entries.join(", ")));
    }
    if let Some(browser) = &options.browser {
        let mut browser_entries = Vec::new();
        if let Some(headless) = browser.headless {
            browser_entries.push(format!("headless: {}", print_bool(headless)));
        }
        if let Some((width, height)) = browser.viewport {
            browser_entries.push(format!("viewport: {{width: {width}, height: {height}}}"));
        }
        if let Some(user_agent) = &browser.user_agent {
            browser_entries.push(format!("userAgent: {}", quote_string(user_agent)));
        }
        if let Some(timeout) = browser.timeout_ms {
            browser_entries.push(format!("timeout: {}", format_number(timeout)));
        }
        entries.push(format!("browser: {{{}}}", browser_entries.join(", ")));
    }
    if let Some(wait_for) = &options.wait_for {
        entries.push(format!("waitFor: {}", print_wait(wait_for)));
    }
    if let Some(wait_until) = &options.wait_until {
        entries.push(format!("waitUntil: {}", print_wait(wait_until)));
    }
    if let Some(timeout) = options.timeout_ms {
        entries.push(format!("timeout: {}", format_number(timeout)));
    }
    if options.screenshot {
        entries.push("screenshot: TRUE".to_string());
    }
    format!("{{{}}}", entries.join(", "))
}

fn print_wait(condition: &WaitCondition) -> String {
    match condition {
        WaitCondition::Load => quote_string("load"),
        WaitCondition::DomContentLoaded => quote_string("domcontentloaded"),
        WaitCondition::NetworkIdle => quote_string("networkidle"),
        WaitCondition::Selector(selector) => quote_string(selector),
    }
}

fn print_bool(value: bool) -> &'static str {
    if value { "TRUE" } else { "FALSE" }
}

/// Quotes and escapes a string literal with single quotes.
pub fn quote_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\0' => out.push_str("\\0"),
            _ => out.push(ch),
        }
    }
    out.push('\'');
    out
}

/// Formats a number in minimal form: integers without a decimal point.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}
