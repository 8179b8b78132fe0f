//! Shared parser infrastructure for token stream navigation and error
//! handling.
//!
//! All parser modules use composition with [`TokenStream`] rather than
//! reimplementing navigation and matching.

use crate::ast::Span;
use crate::diag::Diag;
use crate::lexer::token::{Token, TokenKind};

/// Common error type for parsing operations.
pub type ParseError = Box<Diag>;

/// Common result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Token stream navigator providing common operations for all parsers.
pub struct TokenStream<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> TokenStream<'a> {
    /// Creates a new token stream from a token slice.
    pub fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, pos: 0 }
    }

    /// Returns the current token.
    ///
    /// If the position is past the end, returns the last token (which should
    /// be EOF).
    pub fn current(&self) -> &Token {
        self.tokens
            .get(self.pos)
            .unwrap_or_else(|| self.tokens.last().expect("token stream must be non-empty"))
    }

    /// Returns the next token without consuming the current one.
    pub fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos + 1)
    }

    /// Advances to the next token.
    ///
    /// Does nothing if already at EOF (last token).
    pub fn advance(&mut self) {
        if self.pos < self.tokens.len().saturating_sub(1) {
            self.pos += 1;
        }
    }

    /// Checks if the current token matches the given kind.
    pub fn check(&self, kind: &TokenKind) -> bool {
        &self.current().kind == kind
    }

    /// Returns true if the current token is an identifier.
    pub fn check_identifier(&self) -> bool {
        matches!(self.current().kind, TokenKind::Identifier(_))
    }

    /// Consumes the current token if it matches the given kind.
    ///
    /// Returns `true` if the token was consumed, `false` otherwise.
    pub fn consume(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Expects a specific token kind and returns its span.
    ///
    /// If the current token doesn't match, returns an error.
    pub fn expect(&mut self, kind: TokenKind) -> ParseResult<Span> {
        if self.check(&kind) {
            let span = self.current().span.clone();
            self.advance();
            Ok(span)
        } else {
            Err(self.error_here(format!("expected {kind}, found {}", self.current().kind)))
        }
    }

    /// Expects an identifier token and returns its name and span.
    pub fn expect_identifier(&mut self, context: &str) -> ParseResult<(smol_str::SmolStr, Span)> {
        match &self.current().kind {
            TokenKind::Identifier(name) => {
                let name = name.clone();
                let span = self.current().span.clone();
                self.advance();
                Ok((name, span))
            }
            other => Err(self.error_here(format!("expected identifier in {context}, found {other}"))),
        }
    }

    /// Creates an error at the current token position.
    pub fn error_here(&self, message: impl Into<String>) -> ParseError {
        self.error_here_with_rule(message, "syntax")
    }

    /// Creates an error at the current token position, naming the rule that
    /// rejected it.
    pub fn error_here_with_rule(
        &self,
        message: impl Into<String>,
        rule: &'static str,
    ) -> ParseError {
        let token = self.current();
        Box::new(
            Diag::parser(message.into())
                .at(token.span.clone(), "here")
                .note(format!("at line {}, column {}", token.line, token.column))
                .rule(rule),
        )
    }

    /// Returns the current position in the token stream.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Sets the position in the token stream (used for backtracking).
    pub fn set_position(&mut self, pos: usize) {
        self.pos = pos.min(self.tokens.len().saturating_sub(1));
    }

    /// Returns the span of the previous token (useful after consuming one).
    pub fn previous_span(&self) -> Span {
        if self.pos > 0 {
            self.tokens[self.pos - 1].span.clone()
        } else {
            self.current().span.clone()
        }
    }

    /// Returns true when all input has been consumed (current is EOF).
    pub fn at_end(&self) -> bool {
        self.current().is_eof()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_tokens() -> Vec<Token> {
        vec![
            Token::new(TokenKind::Select, "SELECT", 0..6, 1, 1),
            Token::new(TokenKind::Star, "*", 7..8, 1, 8),
            Token::new(TokenKind::From, "FROM", 9..13, 1, 10),
            Token::new(TokenKind::Identifier("x".into()), "x", 14..15, 1, 15),
            Token::new(TokenKind::Eof, "", 15..15, 1, 16),
        ]
    }

    #[test]
    fn token_stream_navigation() {
        let tokens = make_tokens();
        let mut stream = TokenStream::new(&tokens);

        assert_eq!(stream.current().kind, TokenKind::Select);
        assert_eq!(stream.peek().map(|t| &t.kind), Some(&TokenKind::Star));
        stream.advance();
        assert_eq!(stream.current().kind, TokenKind::Star);
    }

    #[test]
    fn consume_and_expect() {
        let tokens = make_tokens();
        let mut stream = TokenStream::new(&tokens);

        assert!(stream.consume(&TokenKind::Select));
        assert!(!stream.consume(&TokenKind::From));
        assert!(stream.expect(TokenKind::Star).is_ok());
        assert!(stream.expect(TokenKind::Select).is_err());
    }

    #[test]
    fn advance_stops_at_eof() {
        let tokens = make_tokens();
        let mut stream = TokenStream::new(&tokens);
        for _ in 0..20 {
            stream.advance();
        }
        assert!(stream.at_end());
    }

    #[test]
    fn error_includes_position_note() {
        let tokens = make_tokens();
        let stream = TokenStream::new(&tokens);
        let err = stream.error_here("boom");
        assert!(err.notes.iter().any(|n| n.contains("line 1")));
    }
}
