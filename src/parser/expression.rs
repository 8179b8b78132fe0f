//! Expression parsing for WebQL.
//!
//! Implements precedence climbing over the operator ladder, lowest first:
//! OR, AND, equality (`=`, `!=`, `IN`, `LIKE`, `MATCHES`, `CONTAINS`),
//! comparison (`>`, `>=`, `<`, `<=`), concatenation (`||`), additive,
//! multiplicative, unary prefix, call/member, primary. Every binary level is
//! left-associative.

use crate::ast::expression::{
    BinaryOperator, Expression, Literal, MemberProperty, ObjectProperty, UnaryOperator,
};
use crate::lexer::token::{Token, TokenKind};
use crate::parser::base::{ParseResult, TokenStream};
use smol_str::SmolStr;

/// Parser for expressions.
///
/// Operates on a borrowed [`TokenStream`] so statement parsing and
/// expression parsing share one cursor.
pub struct ExpressionParser<'a, 'b> {
    stream: &'b mut TokenStream<'a>,
}

impl<'a, 'b> ExpressionParser<'a, 'b> {
    /// Creates a new expression parser over the given stream.
    pub fn new(stream: &'b mut TokenStream<'a>) -> Self {
        Self { stream }
    }

    /// Parses an expression using standard precedence rules.
    pub fn parse_expression(&mut self) -> ParseResult<Expression> {
        self.parse_or_expression()
    }

    fn parse_or_expression(&mut self) -> ParseResult<Expression> {
        let mut left = self.parse_and_expression()?;

        while self.stream.check(&TokenKind::Or) {
            self.stream.advance();
            let right = self.parse_and_expression()?;
            let span = left.span().start..right.span().end;
            left = Expression::Binary(BinaryOperator::Or, Box::new(left), Box::new(right), span);
        }

        Ok(left)
    }

    fn parse_and_expression(&mut self) -> ParseResult<Expression> {
        let mut left = self.parse_equality_expression()?;

        while self.stream.check(&TokenKind::And) {
            self.stream.advance();
            let right = self.parse_equality_expression()?;
            let span = left.span().start..right.span().end;
            left = Expression::Binary(BinaryOperator::And, Box::new(left), Box::new(right), span);
        }

        Ok(left)
    }

    fn parse_equality_expression(&mut self) -> ParseResult<Expression> {
        let mut left = self.parse_comparison_expression()?;

        while let Some(op) = self.consume_equality_operator()? {
            let right = self.parse_comparison_expression()?;
            let span = left.span().start..right.span().end;
            left = Expression::Binary(op, Box::new(left), Box::new(right), span);
        }

        Ok(left)
    }

    /// Consumes `=`, `!=`, `IN`, `LIKE`, `MATCHES`, `CONTAINS`, or their
    /// `NOT`-negated forms when present.
    fn consume_equality_operator(&mut self) -> ParseResult<Option<BinaryOperator>> {
        let op = match &self.stream.current().kind {
            TokenKind::Eq => Some(BinaryOperator::Eq),
            TokenKind::NotEq => Some(BinaryOperator::NotEq),
            TokenKind::In => Some(BinaryOperator::In),
            TokenKind::Like => Some(BinaryOperator::Like),
            TokenKind::Matches => Some(BinaryOperator::Matches),
            TokenKind::Contains => Some(BinaryOperator::Contains),
            TokenKind::Not => {
                // Infix NOT is only valid before IN or LIKE.
                return match self.stream.peek().map(|t| &t.kind) {
                    Some(TokenKind::In) => {
                        self.stream.advance();
                        self.stream.advance();
                        Ok(Some(BinaryOperator::NotIn))
                    }
                    Some(TokenKind::Like) => {
                        self.stream.advance();
                        self.stream.advance();
                        Ok(Some(BinaryOperator::NotLike))
                    }
                    _ => Ok(None),
                };
            }
            _ => None,
        };
        if op.is_some() {
            self.stream.advance();
        }
        Ok(op)
    }

    fn parse_comparison_expression(&mut self) -> ParseResult<Expression> {
        let mut left = self.parse_concatenation_expression()?;

        loop {
            let op = match &self.stream.current().kind {
                TokenKind::Gt => BinaryOperator::Gt,
                TokenKind::GtEq => BinaryOperator::GtEq,
                TokenKind::Lt => BinaryOperator::Lt,
                TokenKind::LtEq => BinaryOperator::LtEq,
                _ => break,
            };
            self.stream.advance();
            let right = self.parse_concatenation_expression()?;
            let span = left.span().start..right.span().end;
            left = Expression::Binary(op, Box::new(left), Box::new(right), span);
        }

        Ok(left)
    }

    fn parse_concatenation_expression(&mut self) -> ParseResult<Expression> {
        let mut left = self.parse_additive_expression()?;

        while self.stream.check(&TokenKind::DoublePipe) {
            self.stream.advance();
            let right = self.parse_additive_expression()?;
            let span = left.span().start..right.span().end;
            left = Expression::Binary(
                BinaryOperator::Concat,
                Box::new(left),
                Box::new(right),
                span,
            );
        }

        Ok(left)
    }

    fn parse_additive_expression(&mut self) -> ParseResult<Expression> {
        let mut left = self.parse_multiplicative_expression()?;

        loop {
            let op = match &self.stream.current().kind {
                TokenKind::Plus => BinaryOperator::Add,
                TokenKind::Minus => BinaryOperator::Sub,
                _ => break,
            };
            self.stream.advance();
            let right = self.parse_multiplicative_expression()?;
            let span = left.span().start..right.span().end;
            left = Expression::Binary(op, Box::new(left), Box::new(right), span);
        }

        Ok(left)
    }

    fn parse_multiplicative_expression(&mut self) -> ParseResult<Expression> {
        let mut left = self.parse_unary_expression()?;

        loop {
            let op = match &self.stream.current().kind {
                TokenKind::Star => BinaryOperator::Mul,
                TokenKind::Slash => BinaryOperator::Div,
                TokenKind::Percent => BinaryOperator::Mod,
                _ => break,
            };
            self.stream.advance();
            let right = self.parse_unary_expression()?;
            let span = left.span().start..right.span().end;
            left = Expression::Binary(op, Box::new(left), Box::new(right), span);
        }

        Ok(left)
    }

    fn parse_unary_expression(&mut self) -> ParseResult<Expression> {
        let op = match &self.stream.current().kind {
            TokenKind::Not => Some(UnaryOperator::Not),
            TokenKind::Minus => Some(UnaryOperator::Neg),
            TokenKind::Plus => Some(UnaryOperator::Pos),
            _ => None,
        };

        match op {
            Some(op) => {
                let start = self.stream.current().span.start;
                self.stream.advance();
                let operand = self.parse_unary_expression()?;
                let span = start..operand.span().end;
                Ok(Expression::Unary(op, Box::new(operand), span))
            }
            None => self.parse_postfix_expression(),
        }
    }

    /// Parses a primary expression followed by call and member postfixes.
    fn parse_postfix_expression(&mut self) -> ParseResult<Expression> {
        let mut expr = self.parse_primary()?;

        loop {
            match &self.stream.current().kind {
                TokenKind::LParen if expr.as_identifier().is_some() => {
                    let callee = expr.as_identifier().cloned().unwrap_or_default();
                    let start = expr.span().start;
                    self.stream.advance();
                    let mut args = Vec::new();
                    if !self.stream.check(&TokenKind::RParen) {
                        loop {
                            args.push(self.parse_expression()?);
                            if !self.stream.consume(&TokenKind::Comma) {
                                break;
                            }
                        }
                    }
                    let end = self.stream.expect(TokenKind::RParen)?.end;
                    expr = Expression::Call(callee, args, start..end);
                }
                TokenKind::Dot => {
                    self.stream.advance();
                    let (name, name_span) = self.stream.expect_identifier("member access")?;
                    let span = expr.span().start..name_span.end;
                    expr = Expression::Member(Box::new(expr), MemberProperty::Static(name), span);
                }
                TokenKind::LBracket => {
                    self.stream.advance();
                    let index = self.parse_expression()?;
                    let end = self.stream.expect(TokenKind::RBracket)?.end;
                    let span = expr.span().start..end;
                    expr = Expression::Member(
                        Box::new(expr),
                        MemberProperty::Computed(Box::new(index)),
                        span,
                    );
                }
                _ => break,
            }
        }

        Ok(expr)
    }

    fn parse_primary(&mut self) -> ParseResult<Expression> {
        let token = self.stream.current().clone();
        match &token.kind {
            TokenKind::StringLiteral(value) => {
                self.stream.advance();
                Ok(Expression::Literal(
                    Literal::String(value.clone()),
                    token.span,
                ))
            }
            TokenKind::NumberLiteral(value) => {
                self.stream.advance();
                Ok(Expression::Literal(Literal::Number(*value), token.span))
            }
            TokenKind::BooleanLiteral(value) => {
                self.stream.advance();
                Ok(Expression::Literal(Literal::Boolean(*value), token.span))
            }
            TokenKind::DurationLiteral(ms) => {
                self.stream.advance();
                Ok(Expression::Literal(Literal::Duration(*ms), token.span))
            }
            TokenKind::BytesLiteral(bytes) => {
                self.stream.advance();
                Ok(Expression::Literal(Literal::Bytes(*bytes), token.span))
            }
            TokenKind::Null => {
                self.stream.advance();
                Ok(Expression::Literal(Literal::Null, token.span))
            }
            TokenKind::Identifier(name) => {
                self.stream.advance();
                Ok(Expression::Identifier(name.clone(), token.span))
            }
            TokenKind::LParen => {
                self.stream.advance();
                let expr = self.parse_expression()?;
                self.stream.expect(TokenKind::RParen)?;
                Ok(expr)
            }
            TokenKind::LBracket => self.parse_array_literal(),
            TokenKind::LBrace => self.parse_object_literal(),
            other => Err(self
                .stream
                .error_here(format!("expected expression, found {other}"))),
        }
    }

    fn parse_array_literal(&mut self) -> ParseResult<Expression> {
        let start = self.stream.current().span.start;
        self.stream.expect(TokenKind::LBracket)?;

        let mut elements = Vec::new();
        if !self.stream.check(&TokenKind::RBracket) {
            loop {
                elements.push(self.parse_expression()?);
                if !self.stream.consume(&TokenKind::Comma) {
                    break;
                }
            }
        }

        let end = self.stream.expect(TokenKind::RBracket)?.end;
        Ok(Expression::Array(elements, start..end))
    }

    /// Parses an object literal `{key: value, ...}`. Keys are identifiers or
    /// string literals.
    pub fn parse_object_literal(&mut self) -> ParseResult<Expression> {
        let start = self.stream.current().span.start;
        self.stream.expect(TokenKind::LBrace)?;

        let mut properties = Vec::new();
        if !self.stream.check(&TokenKind::RBrace) {
            loop {
                let key_token = self.stream.current().clone();
                let key: SmolStr = match &key_token.kind {
                    TokenKind::Identifier(name) => name.clone(),
                    TokenKind::StringLiteral(value) => value.clone(),
                    other => {
                        return Err(self
                            .stream
                            .error_here(format!("expected object key, found {other}")));
                    }
                };
                self.stream.advance();
                self.stream.expect(TokenKind::Colon)?;
                let value = self.parse_expression()?;
                let span = key_token.span.start..value.span().end;
                properties.push(ObjectProperty { key, value, span });

                if !self.stream.consume(&TokenKind::Comma) {
                    break;
                }
            }
        }

        let end = self.stream.expect(TokenKind::RBrace)?.end;
        Ok(Expression::Object(properties, start..end))
    }
}

/// Convenience entry point used by tests: parses a standalone expression
/// from a token slice.
pub fn parse_standalone_expression(tokens: &[Token]) -> ParseResult<Expression> {
    let mut stream = TokenStream::new(tokens);
    let expr = ExpressionParser::new(&mut stream).parse_expression()?;
    if !stream.at_end() {
        return Err(stream.error_here(format!(
            "unexpected trailing tokens after expression: {}",
            stream.current().kind
        )));
    }
    Ok(expr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn parse(source: &str) -> Expression {
        let result = tokenize(source);
        assert!(
            result.diagnostics.is_empty(),
            "lexer diagnostics for `{source}`: {:?}",
            result.diagnostics
        );
        parse_standalone_expression(&result.tokens)
            .unwrap_or_else(|err| panic!("parse error for `{source}`: {}", err.message))
    }

    #[test]
    fn precedence_or_binds_loosest() {
        let expr = parse("a OR b AND c");
        match expr {
            Expression::Binary(BinaryOperator::Or, _, right, _) => {
                assert!(matches!(
                    *right,
                    Expression::Binary(BinaryOperator::And, _, _, _)
                ));
            }
            other => panic!("expected OR at root, got {other:?}"),
        }
    }

    #[test]
    fn precedence_mul_over_add() {
        let expr = parse("1 + 2 * 3");
        match expr {
            Expression::Binary(BinaryOperator::Add, _, right, _) => {
                assert!(matches!(
                    *right,
                    Expression::Binary(BinaryOperator::Mul, _, _, _)
                ));
            }
            other => panic!("expected + at root, got {other:?}"),
        }
    }

    #[test]
    fn left_associative_subtraction() {
        let expr = parse("10 - 4 - 3");
        match expr {
            Expression::Binary(BinaryOperator::Sub, left, _, _) => {
                assert!(matches!(
                    *left,
                    Expression::Binary(BinaryOperator::Sub, _, _, _)
                ));
            }
            other => panic!("expected left-nested -, got {other:?}"),
        }
    }

    #[test]
    fn not_in_and_not_like() {
        assert!(matches!(
            parse("x NOT IN [1, 2]"),
            Expression::Binary(BinaryOperator::NotIn, _, _, _)
        ));
        assert!(matches!(
            parse("name NOT LIKE '%x%'"),
            Expression::Binary(BinaryOperator::NotLike, _, _, _)
        ));
    }

    #[test]
    fn prefix_not_still_works() {
        assert!(matches!(
            parse("NOT done"),
            Expression::Unary(UnaryOperator::Not, _, _)
        ));
    }

    #[test]
    fn comparison_and_concat_levels() {
        // `a || b > c` parses as `(a || b) > c`: concat binds tighter.
        let expr = parse("a || b > c");
        match expr {
            Expression::Binary(BinaryOperator::Gt, left, _, _) => {
                assert!(matches!(
                    *left,
                    Expression::Binary(BinaryOperator::Concat, _, _, _)
                ));
            }
            other => panic!("expected > at root, got {other:?}"),
        }
    }

    #[test]
    fn call_and_member_chains() {
        let expr = parse("UPPER(row.name)");
        match expr {
            Expression::Call(callee, args, _) => {
                assert_eq!(callee.as_str(), "UPPER");
                assert_eq!(args.len(), 1);
                assert!(matches!(args[0], Expression::Member(_, _, _)));
            }
            other => panic!("expected call, got {other:?}"),
        }
    }

    #[test]
    fn computed_member_access() {
        assert!(matches!(
            parse("rows[0]"),
            Expression::Member(_, MemberProperty::Computed(_), _)
        ));
    }

    #[test]
    fn array_and_object_literals() {
        assert!(matches!(parse("[1, 2, 3]"), Expression::Array(ref e, _) if e.len() == 3));
        match parse("{timeout: 5000, screenshot: TRUE}") {
            Expression::Object(properties, _) => {
                assert_eq!(properties.len(), 2);
                assert_eq!(properties[0].key.as_str(), "timeout");
            }
            other => panic!("expected object, got {other:?}"),
        }
    }

    #[test]
    fn parenthesized_grouping() {
        let expr = parse("(1 + 2) * 3");
        match expr {
            Expression::Binary(BinaryOperator::Mul, left, _, _) => {
                assert!(matches!(
                    *left,
                    Expression::Binary(BinaryOperator::Add, _, _, _)
                ));
            }
            other => panic!("expected * at root, got {other:?}"),
        }
    }

    #[test]
    fn trailing_tokens_rejected() {
        let result = tokenize("1 2");
        assert!(parse_standalone_expression(&result.tokens).is_err());
    }
}
