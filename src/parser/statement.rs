//! Statement parsing for WebQL.
//!
//! Each statement form dispatches on its leading keyword. The parser stops
//! at the first syntax error; there is no error recovery.

use crate::ast::expression::{Expression, Literal};
use crate::ast::statement::{
    BrowserOptions, CommonTableExpression, DeleteStatement, ForStatement, IfStatement,
    InsertStatement, NavigateOptions, NavigateStatement, OrderField, ProxyOptions, SelectField,
    SelectSource, SelectStatement, SetStatement, ShowStatement, Statement, UpdateStatement,
    WaitCondition, WithStatement,
};
use crate::ast::{MemberProperty, ObjectProperty};
use crate::diag::Diag;
use crate::lexer::token::TokenKind;
use crate::parser::base::{ParseResult, TokenStream};
use crate::parser::expression::ExpressionParser;
use smol_str::SmolStr;

/// Parser for statements, sharing a cursor with expression parsing.
pub struct StatementParser<'a, 'b> {
    stream: &'b mut TokenStream<'a>,
}

impl<'a, 'b> StatementParser<'a, 'b> {
    /// Creates a new statement parser over the given stream.
    pub fn new(stream: &'b mut TokenStream<'a>) -> Self {
        Self { stream }
    }

    /// Parses a single statement, dispatching on the leading token.
    pub fn parse_statement(&mut self) -> ParseResult<Statement> {
        match &self.stream.current().kind {
            TokenKind::Select => self.parse_select().map(Statement::Select),
            TokenKind::Navigate => self.parse_navigate().map(Statement::Navigate),
            TokenKind::Set => self.parse_set().map(Statement::Set),
            TokenKind::Show => self.parse_show().map(Statement::Show),
            TokenKind::For => self.parse_for().map(Statement::For),
            TokenKind::If => self.parse_if().map(Statement::If),
            TokenKind::Insert => self.parse_insert().map(Statement::Insert),
            TokenKind::Update => self.parse_update().map(Statement::Update),
            TokenKind::Delete => self.parse_delete().map(Statement::Delete),
            TokenKind::With => self.parse_with().map(Statement::With),
            other => Err(self.stream.error_here_with_rule(
                format!("expected statement, found {other}"),
                "expected_statement",
            )),
        }
    }

    fn parse_expression(&mut self) -> ParseResult<Expression> {
        ExpressionParser::new(self.stream).parse_expression()
    }

    // ------------------------------------------------------------------
    // SELECT
    // ------------------------------------------------------------------

    fn parse_select(&mut self) -> ParseResult<SelectStatement> {
        let start = self.stream.expect(TokenKind::Select)?.start;

        let fields = self.parse_field_list()?;
        self.stream.expect(TokenKind::From)?;
        let source = self.parse_source()?;

        let where_clause = if self.stream.consume(&TokenKind::Where) {
            Some(self.parse_expression()?)
        } else {
            None
        };

        let order_by = if self.stream.consume(&TokenKind::Order) {
            self.stream.expect(TokenKind::By)?;
            self.parse_order_fields()?
        } else {
            Vec::new()
        };

        let (limit, offset) = self.parse_limit_offset()?;

        let end = self.stream.previous_span().end;
        Ok(SelectStatement {
            fields,
            source,
            where_clause,
            order_by,
            limit,
            offset,
            span: start..end,
        })
    }

    /// Parses a comma-separated field list. A lone `*` becomes the wildcard
    /// field.
    fn parse_field_list(&mut self) -> ParseResult<Vec<SelectField>> {
        let mut fields = Vec::new();
        loop {
            fields.push(self.parse_field()?);
            if !self.stream.consume(&TokenKind::Comma) {
                break;
            }
        }
        Ok(fields)
    }

    fn parse_field(&mut self) -> ParseResult<SelectField> {
        if self.stream.check(&TokenKind::Star) {
            let span = self.stream.current().span.clone();
            self.stream.advance();
            return Ok(SelectField {
                expr: Expression::Identifier("*".into(), span.clone()),
                alias: None,
                name: "*".into(),
                path: None,
                span,
            });
        }

        let expr = self.parse_expression()?;
        let alias = if self.stream.consume(&TokenKind::As) {
            let (name, _) = self.stream.expect_identifier("field alias")?;
            Some(name)
        } else {
            None
        };

        let (name, path) = infer_field_name(&expr);
        let span = expr.span().start..self.stream.previous_span().end;
        Ok(SelectField {
            expr,
            alias,
            name,
            path,
            span,
        })
    }

    fn parse_source(&mut self) -> ParseResult<SelectSource> {
        let token = self.stream.current().clone();
        match &token.kind {
            TokenKind::StringLiteral(url) => {
                self.stream.advance();
                Ok(SelectSource::Url(url.clone(), token.span))
            }
            TokenKind::LParen => {
                let start = token.span.start;
                self.stream.advance();
                let statement = self.parse_statement()?;
                let end = self.stream.expect(TokenKind::RParen)?.end;
                Ok(SelectSource::Subquery(Box::new(statement), start..end))
            }
            TokenKind::Identifier(name) => {
                self.stream.advance();
                Ok(SelectSource::Variable(name.clone(), token.span))
            }
            other => Err(self.stream.error_here(format!(
                "expected URL literal, subquery, or variable after FROM, found {other}"
            ))),
        }
    }

    fn parse_order_fields(&mut self) -> ParseResult<Vec<OrderField>> {
        let mut fields = Vec::new();
        loop {
            let (name, span) = self.stream.expect_identifier("ORDER BY")?;
            let descending = if self.stream.consume(&TokenKind::Desc) {
                true
            } else {
                self.stream.consume(&TokenKind::Asc);
                false
            };
            let end = self.stream.previous_span().end;
            fields.push(OrderField {
                name,
                descending,
                span: span.start..end,
            });
            if !self.stream.consume(&TokenKind::Comma) {
                break;
            }
        }
        Ok(fields)
    }

    fn parse_limit_offset(&mut self) -> ParseResult<(Option<u64>, Option<u64>)> {
        if !self.stream.consume(&TokenKind::Limit) {
            return Ok((None, None));
        }
        let limit = self.parse_count("LIMIT")?;
        let offset = if self.stream.consume(&TokenKind::Offset) {
            Some(self.parse_count("OFFSET")?)
        } else {
            None
        };
        Ok((Some(limit), offset))
    }

    fn parse_count(&mut self, context: &str) -> ParseResult<u64> {
        match &self.stream.current().kind {
            TokenKind::NumberLiteral(value) if value.fract() == 0.0 && *value >= 0.0 => {
                let value = *value as u64;
                self.stream.advance();
                Ok(value)
            }
            other => Err(self.stream.error_here(format!(
                "expected a non-negative integer after {context}, found {other}"
            ))),
        }
    }

    // ------------------------------------------------------------------
    // NAVIGATE
    // ------------------------------------------------------------------

    fn parse_navigate(&mut self) -> ParseResult<NavigateStatement> {
        let start = self.stream.expect(TokenKind::Navigate)?.start;
        self.stream.expect(TokenKind::To)?;
        let url = self.parse_expression()?;

        let options = if self.stream.consume(&TokenKind::With) {
            let object = ExpressionParser::new(self.stream).parse_object_literal()?;
            Some(self.validate_navigate_options(&object)?)
        } else {
            None
        };

        let capture = if self.stream.consume(&TokenKind::Capture) {
            self.parse_field_list()?
        } else {
            Vec::new()
        };

        let end = self.stream.previous_span().end;
        Ok(NavigateStatement {
            url,
            options,
            capture,
            span: start..end,
        })
    }

    /// Validates a NAVIGATE options object against the closed key sets and
    /// converts it into structured [`NavigateOptions`].
    fn validate_navigate_options(&self, object: &Expression) -> ParseResult<NavigateOptions> {
        let Expression::Object(properties, span) = object else {
            return Err(self.stream.error_here("NAVIGATE options must be an object"));
        };

        let mut options = NavigateOptions::default();
        for property in properties {
            match property.key.as_str() {
                "proxy" => options.proxy = Some(self.validate_proxy_options(&property.value)?),
                "browser" => {
                    options.browser = Some(self.validate_browser_options(&property.value)?)
                }
                "waitFor" => options.wait_for = Some(self.validate_wait(property)?),
                "waitUntil" => options.wait_until = Some(self.validate_wait(property)?),
                "timeout" => options.timeout_ms = Some(self.validate_timeout(property)?),
                "screenshot" => match property.value.as_literal() {
                    Some(Literal::Boolean(value)) => options.screenshot = *value,
                    _ => {
                        return Err(self.option_error(property, "screenshot must be a boolean"));
                    }
                },
                other => {
                    return Err(self.option_error(
                        property,
                        format!("unrecognized NAVIGATE option '{other}'"),
                    ));
                }
            }
        }

        if options.wait_for.is_some() && options.wait_until.is_some() {
            return Err(Box::new(
                Diag::parser("waitFor and waitUntil cannot both be set")
                    .at(span.clone(), "conflicting wait options")
                    .suggest("keep whichever condition should gate the navigation")
                    .rule("navigate_options"),
            ));
        }

        Ok(options)
    }

    fn validate_proxy_options(&self, value: &Expression) -> ParseResult<ProxyOptions> {
        let Expression::Object(properties, _) = value else {
            return Err(self.stream.error_here("proxy options must be an object"));
        };

        let mut proxy = ProxyOptions::default();
        for property in properties {
            match property.key.as_str() {
                "enabled" => proxy.enabled = Some(self.expect_bool(property)?),
                "cache" => proxy.cache = Some(self.expect_bool(property)?),
                "cacheTtl" => proxy.cache_ttl_ms = Some(self.validate_timeout(property)?),
                "timeout" => proxy.timeout_ms = Some(self.validate_timeout(property)?),
                "headers" => {
                    let Expression::Object(headers, _) = &property.value else {
                        return Err(self.option_error(property, "headers must be an object"));
                    };
                    for header in headers {
                        match header.value.as_literal() {
                            Some(Literal::String(value)) => {
                                proxy.headers.push((header.key.clone(), value.clone()));
                            }
                            _ => {
                                return Err(
                                    self.option_error(header, "header values must be strings")
                                );
                            }
                        }
                    }
                }
                other => {
                    return Err(
                        self.option_error(property, format!("unrecognized proxy option '{other}'"))
                    );
                }
            }
        }
        Ok(proxy)
    }

    fn validate_browser_options(&self, value: &Expression) -> ParseResult<BrowserOptions> {
        let Expression::Object(properties, _) = value else {
            return Err(self.stream.error_here("browser options must be an object"));
        };

        let mut browser = BrowserOptions::default();
        for property in properties {
            match property.key.as_str() {
                "headless" => browser.headless = Some(self.expect_bool(property)?),
                "timeout" => browser.timeout_ms = Some(self.validate_timeout(property)?),
                "userAgent" => match property.value.as_literal() {
                    Some(Literal::String(value)) => browser.user_agent = Some(value.clone()),
                    _ => return Err(self.option_error(property, "userAgent must be a string")),
                },
                "viewport" => {
                    let Expression::Object(dimensions, _) = &property.value else {
                        return Err(self.option_error(
                            property,
                            "viewport must be an object with width and height",
                        ));
                    };
                    let mut width = None;
                    let mut height = None;
                    for dimension in dimensions {
                        let value = match dimension.value.as_literal() {
                            Some(Literal::Number(n)) => *n,
                            _ => {
                                return Err(self.option_error(
                                    dimension,
                                    "viewport dimensions must be numbers",
                                ));
                            }
                        };
                        match dimension.key.as_str() {
                            "width" => width = Some(value as u32),
                            "height" => height = Some(value as u32),
                            other => {
                                return Err(self.option_error(
                                    dimension,
                                    format!("unrecognized viewport key '{other}'"),
                                ));
                            }
                        }
                    }
                    match (width, height) {
                        (Some(w), Some(h)) => browser.viewport = Some((w, h)),
                        _ => {
                            return Err(self
                                .option_error(property, "viewport requires width and height"));
                        }
                    }
                }
                other => {
                    return Err(self.option_error(
                        property,
                        format!("unrecognized browser option '{other}'"),
                    ));
                }
            }
        }
        Ok(browser)
    }

    fn validate_wait(&self, property: &ObjectProperty) -> ParseResult<WaitCondition> {
        match property.value.as_literal() {
            Some(Literal::String(value)) => WaitCondition::parse(value).ok_or_else(|| {
                self.option_error(
                    property,
                    format!(
                        "'{value}' is not a lifecycle event (load, domcontentloaded, \
                         networkidle) or a CSS selector"
                    ),
                )
            }),
            _ => Err(self.option_error(property, "wait condition must be a string")),
        }
    }

    fn validate_timeout(&self, property: &ObjectProperty) -> ParseResult<f64> {
        let value = match property.value.as_literal() {
            Some(Literal::Number(n)) => *n,
            Some(Literal::Duration(ms)) => *ms,
            _ => {
                return Err(
                    self.option_error(property, "timeout must be a number or duration")
                );
            }
        };
        if value < 0.0 {
            return Err(self.option_error(property, "timeout must not be negative"));
        }
        Ok(value)
    }

    fn expect_bool(&self, property: &ObjectProperty) -> ParseResult<bool> {
        match property.value.as_literal() {
            Some(Literal::Boolean(value)) => Ok(*value),
            _ => Err(self.option_error(
                property,
                format!("{} must be a boolean", property.key),
            )),
        }
    }

    fn option_error(
        &self,
        property: &ObjectProperty,
        message: impl Into<String>,
    ) -> Box<Diag> {
        Box::new(
            Diag::parser(message.into())
                .at(property.span.clone(), "in this option")
                .rule("navigate_options"),
        )
    }

    // ------------------------------------------------------------------
    // SET / SHOW
    // ------------------------------------------------------------------

    fn parse_set(&mut self) -> ParseResult<SetStatement> {
        let start = self.stream.expect(TokenKind::Set)?.start;
        let mut path = Vec::new();
        let (first, _) = self.stream.expect_identifier("SET path")?;
        path.push(first);
        while self.stream.consume(&TokenKind::Dot) {
            let (segment, _) = self.stream.expect_identifier("SET path")?;
            path.push(segment);
        }
        self.stream.expect(TokenKind::Eq)?;
        let value = self.parse_expression()?;
        let end = self.stream.previous_span().end;
        Ok(SetStatement {
            path,
            value,
            span: start..end,
        })
    }

    fn parse_show(&mut self) -> ParseResult<ShowStatement> {
        let start = self.stream.expect(TokenKind::Show)?.start;
        let (target, span) = self.stream.expect_identifier("SHOW")?;
        Ok(ShowStatement {
            target,
            span: start..span.end,
        })
    }

    // ------------------------------------------------------------------
    // FOR / IF
    // ------------------------------------------------------------------

    fn parse_for(&mut self) -> ParseResult<ForStatement> {
        let start = self.stream.expect(TokenKind::For)?.start;
        self.stream.expect(TokenKind::Each)?;
        let (variable, _) = self.stream.expect_identifier("FOR EACH")?;
        self.stream.expect(TokenKind::In)?;
        let iterable = self.parse_expression()?;
        let body = self.parse_block()?;
        let end = self.stream.previous_span().end;
        Ok(ForStatement {
            variable,
            iterable,
            body,
            span: start..end,
        })
    }

    fn parse_if(&mut self) -> ParseResult<IfStatement> {
        let start = self.stream.expect(TokenKind::If)?.start;
        let condition = self.parse_expression()?;
        self.stream.expect(TokenKind::Then)?;
        let then_branch = self.parse_branch()?;
        let else_branch = if self.stream.consume(&TokenKind::Else) {
            self.parse_branch()?
        } else {
            Vec::new()
        };
        let end = self.stream.previous_span().end;
        Ok(IfStatement {
            condition,
            then_branch,
            else_branch,
            span: start..end,
        })
    }

    /// A branch is either a braced block or a single statement.
    fn parse_branch(&mut self) -> ParseResult<Vec<Statement>> {
        if self.stream.check(&TokenKind::LBrace) {
            self.parse_block()
        } else {
            Ok(vec![self.parse_statement()?])
        }
    }

    fn parse_block(&mut self) -> ParseResult<Vec<Statement>> {
        self.stream.expect(TokenKind::LBrace)?;
        let mut statements = Vec::new();
        while !self.stream.check(&TokenKind::RBrace) && !self.stream.at_end() {
            statements.push(self.parse_statement()?);
            self.stream.consume(&TokenKind::Semicolon);
        }
        self.stream.expect(TokenKind::RBrace)?;
        Ok(statements)
    }

    // ------------------------------------------------------------------
    // INSERT / UPDATE / DELETE
    // ------------------------------------------------------------------

    fn parse_insert(&mut self) -> ParseResult<InsertStatement> {
        let start = self.stream.expect(TokenKind::Insert)?.start;
        self.stream.expect(TokenKind::Into)?;
        let target = self.parse_expression()?;
        self.stream.expect(TokenKind::Values)?;
        self.stream.expect(TokenKind::LParen)?;
        let mut values = Vec::new();
        loop {
            values.push(self.parse_expression()?);
            if !self.stream.consume(&TokenKind::Comma) {
                break;
            }
        }
        let end = self.stream.expect(TokenKind::RParen)?.end;
        Ok(InsertStatement {
            target,
            values,
            span: start..end,
        })
    }

    fn parse_update(&mut self) -> ParseResult<UpdateStatement> {
        let start = self.stream.expect(TokenKind::Update)?.start;
        let target = self.parse_expression()?;
        self.stream.expect(TokenKind::Set)?;

        let mut assignments = Vec::new();
        loop {
            let (name, _) = self.stream.expect_identifier("UPDATE assignment")?;
            self.stream.expect(TokenKind::Eq)?;
            let value = self.parse_expression()?;
            assignments.push((name, value));
            if !self.stream.consume(&TokenKind::Comma) {
                break;
            }
        }

        let where_clause = if self.stream.consume(&TokenKind::Where) {
            Some(self.parse_expression()?)
        } else {
            None
        };

        let end = self.stream.previous_span().end;
        Ok(UpdateStatement {
            target,
            assignments,
            where_clause,
            span: start..end,
        })
    }

    fn parse_delete(&mut self) -> ParseResult<DeleteStatement> {
        let start = self.stream.expect(TokenKind::Delete)?.start;
        self.stream.expect(TokenKind::From)?;
        let target = self.parse_expression()?;
        let where_clause = if self.stream.consume(&TokenKind::Where) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        let end = self.stream.previous_span().end;
        Ok(DeleteStatement {
            target,
            where_clause,
            span: start..end,
        })
    }

    // ------------------------------------------------------------------
    // WITH
    // ------------------------------------------------------------------

    fn parse_with(&mut self) -> ParseResult<WithStatement> {
        let start = self.stream.expect(TokenKind::With)?.start;

        let mut ctes: Vec<CommonTableExpression> = Vec::new();
        loop {
            let (name, name_span) = self.stream.expect_identifier("WITH clause")?;
            if ctes.iter().any(|cte| cte.name == name) {
                return Err(Box::new(
                    Diag::parser(format!("duplicate CTE name '{name}'"))
                        .at(name_span, "second definition here")
                        .rule("duplicate_cte"),
                ));
            }
            self.stream.expect(TokenKind::As)?;
            self.stream.expect(TokenKind::LParen)?;
            let statement = self.parse_statement()?;
            let end = self.stream.expect(TokenKind::RParen)?.end;
            ctes.push(CommonTableExpression {
                name,
                statement: Box::new(statement),
                span: name_span.start..end,
            });
            if !self.stream.consume(&TokenKind::Comma) {
                break;
            }
        }

        let body = self.parse_statement()?;
        let end = self.stream.previous_span().end;
        Ok(WithStatement {
            ctes,
            body: Box::new(body),
            span: start..end,
        })
    }
}

/// Infers the output name (and dotted path, when applicable) of a field
/// expression without an alias.
fn infer_field_name(expr: &Expression) -> (SmolStr, Option<SmolStr>) {
    match expr {
        Expression::Identifier(name, _) => (name.clone(), None),
        Expression::Member(_, _, _) => {
            let mut segments = Vec::new();
            let mut current = expr;
            loop {
                match current {
                    Expression::Member(object, MemberProperty::Static(name), _) => {
                        segments.push(name.clone());
                        current = object;
                    }
                    Expression::Identifier(name, _) => {
                        segments.push(name.clone());
                        break;
                    }
                    _ => return ("expr".into(), None),
                }
            }
            segments.reverse();
            let root = segments[0].clone();
            let path = segments
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(".");
            (root, Some(SmolStr::new(path)))
        }
        _ => ("expr".into(), None),
    }
}
