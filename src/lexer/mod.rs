//! Lexical analysis for WebQL.
//!
//! This module implements an error-tolerant lexer that converts WebQL source
//! text into a stream of tokens. Comments and whitespace are discarded; line
//! and column positions are tracked for every token. The lexer integrates
//! with the diagnostic infrastructure for rich error reporting.

pub mod keywords;
pub mod token;

use crate::diag::Diag;
use smol_str::SmolStr;
use token::{Token, TokenKind};

/// Result of lexical analysis.
///
/// Contains both the tokens produced and any diagnostics encountered during
/// scanning.
#[derive(Debug, Clone, PartialEq)]
pub struct LexerResult {
    /// The tokens produced, including an EOF token at the end.
    pub tokens: Vec<Token>,
    /// Diagnostics (errors, warnings) encountered during lexing.
    pub diagnostics: Vec<Diag>,
}

/// Tokenizes WebQL source text.
pub fn tokenize(source: &str) -> LexerResult {
    Lexer::new(source).tokenize()
}

/// A lexical analyzer for WebQL source text.
///
/// The lexer scans source text character by character and produces tokens.
/// It continues scanning after errors to provide comprehensive diagnostics.
pub struct Lexer<'a> {
    /// The source text being lexed.
    source: &'a str,
    /// Current byte position in source.
    pos: usize,
    /// Current 1-based line.
    line: u32,
    /// Current 1-based column.
    column: u32,
    /// Accumulated tokens.
    tokens: Vec<Token>,
    /// Accumulated diagnostics.
    diagnostics: Vec<Diag>,
}

impl<'a> Lexer<'a> {
    /// Creates a new lexer for the given source text.
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            pos: 0,
            line: 1,
            column: 1,
            tokens: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Tokenizes the source text and returns the result.
    pub fn tokenize(mut self) -> LexerResult {
        while !self.is_at_end() {
            self.skip_whitespace_and_comments();
            if self.is_at_end() {
                break;
            }
            self.scan_token();
        }

        // Always add EOF token
        let eof_pos = self.source.len();
        self.tokens.push(Token::new(
            TokenKind::Eof,
            "",
            eof_pos..eof_pos,
            self.line,
            self.column,
        ));

        LexerResult {
            tokens: self.tokens,
            diagnostics: self.diagnostics,
        }
    }

    /// Scans a single token.
    fn scan_token(&mut self) {
        let start = self.pos;
        let line = self.line;
        let column = self.column;
        let ch = self.advance();

        match ch {
            '(' => self.add_token(TokenKind::LParen, start, line, column),
            ')' => self.add_token(TokenKind::RParen, start, line, column),
            '{' => self.add_token(TokenKind::LBrace, start, line, column),
            '}' => self.add_token(TokenKind::RBrace, start, line, column),
            '[' => self.add_token(TokenKind::LBracket, start, line, column),
            ']' => self.add_token(TokenKind::RBracket, start, line, column),
            ',' => self.add_token(TokenKind::Comma, start, line, column),
            '.' => self.add_token(TokenKind::Dot, start, line, column),
            ':' => self.add_token(TokenKind::Colon, start, line, column),
            ';' => self.add_token(TokenKind::Semicolon, start, line, column),
            '+' => self.add_token(TokenKind::Plus, start, line, column),
            '*' => self.add_token(TokenKind::Star, start, line, column),
            '/' => self.add_token(TokenKind::Slash, start, line, column),
            '%' => self.add_token(TokenKind::Percent, start, line, column),
            '=' => self.add_token(TokenKind::Eq, start, line, column),

            '-' => {
                if self.match_char('>') {
                    self.add_token(TokenKind::Arrow, start, line, column);
                } else {
                    self.add_token(TokenKind::Minus, start, line, column);
                }
            }
            '>' => {
                if self.match_char('=') {
                    self.add_token(TokenKind::GtEq, start, line, column);
                } else {
                    self.add_token(TokenKind::Gt, start, line, column);
                }
            }
            '<' => {
                if self.match_char('=') {
                    self.add_token(TokenKind::LtEq, start, line, column);
                } else {
                    self.add_token(TokenKind::Lt, start, line, column);
                }
            }
            '!' => {
                if self.match_char('=') {
                    self.add_token(TokenKind::NotEq, start, line, column);
                } else {
                    self.error(start, line, column, "unexpected character '!'");
                    self.add_token(TokenKind::Unknown("!".into()), start, line, column);
                }
            }
            '|' => {
                if self.match_char('|') {
                    self.add_token(TokenKind::DoublePipe, start, line, column);
                } else {
                    self.error(start, line, column, "unexpected character '|'");
                    self.add_token(TokenKind::Unknown("|".into()), start, line, column);
                }
            }

            '\'' | '"' => self.scan_string_literal(start, line, column, ch),

            '0'..='9' => self.scan_number(start, line, column),

            'a'..='z' | 'A'..='Z' | '_' => self.scan_identifier_or_keyword(start, line, column),

            _ => {
                self.error(
                    start,
                    line,
                    column,
                    format!("invalid character '{ch}'"),
                );
                // Error recovery: skip this character and continue
            }
        }
    }

    /// Scans a string literal delimited by `quote`.
    fn scan_string_literal(&mut self, start: usize, line: u32, column: u32, quote: char) {
        let mut value = String::new();
        let mut terminated = false;

        while !self.is_at_end() {
            let ch = self.advance();
            if ch == quote {
                terminated = true;
                break;
            }
            if ch == '\\' {
                if self.is_at_end() {
                    break;
                }
                let escaped = self.advance();
                match escaped {
                    'n' => value.push('\n'),
                    't' => value.push('\t'),
                    'r' => value.push('\r'),
                    '\\' => value.push('\\'),
                    '\'' => value.push('\''),
                    '"' => value.push('"'),
                    '0' => value.push('\0'),
                    'b' => value.push('\u{0008}'),
                    'f' => value.push('\u{000C}'),
                    'v' => value.push('\u{000B}'),
                    'u' => {
                        let mut code = 0u32;
                        let mut valid = true;
                        for _ in 0..4 {
                            match self.peek().and_then(|c| c.to_digit(16)) {
                                Some(digit) => {
                                    code = code * 16 + digit;
                                    self.advance();
                                }
                                None => {
                                    valid = false;
                                    break;
                                }
                            }
                        }
                        if valid {
                            match char::from_u32(code) {
                                Some(c) => value.push(c),
                                None => {
                                    self.error(
                                        start,
                                        line,
                                        column,
                                        format!("invalid unicode escape '\\u{code:04X}'"),
                                    );
                                }
                            }
                        } else {
                            self.error(
                                start,
                                line,
                                column,
                                "\\u escape requires four hex digits",
                            );
                        }
                    }
                    other => {
                        self.error(
                            start,
                            line,
                            column,
                            format!("unknown escape sequence '\\{other}'"),
                        );
                    }
                }
            } else {
                value.push(ch);
            }
        }

        if !terminated {
            self.diagnostics.push(
                Diag::lexer(format!(
                    "unterminated string literal starting at line {line}, column {column}"
                ))
                .at(start..self.pos, "string opened here")
                .suggest("close the literal with a matching quote")
                .rule("unterminated_string"),
            );
            return;
        }

        let text = &self.source[start..self.pos];
        self.tokens.push(Token::new(
            TokenKind::StringLiteral(SmolStr::new(&value)),
            text,
            start..self.pos,
            line,
            column,
        ));
    }

    /// Scans a numeric literal with optional fraction, exponent, and unit
    /// suffix (`ms`/`s`/`m`/`h` for durations, `KB`/`MB`/`GB` for sizes).
    fn scan_number(&mut self, start: usize, line: u32, column: u32) {
        while matches!(self.peek(), Some('0'..='9')) {
            self.advance();
        }

        // Fractional part: only when a digit follows the dot, so member
        // access on a number-named variable still lexes as Dot.
        if self.peek() == Some('.') && matches!(self.peek_at(1), Some('0'..='9')) {
            self.advance();
            while matches!(self.peek(), Some('0'..='9')) {
                self.advance();
            }
        }

        // Exponent part.
        if matches!(self.peek(), Some('e' | 'E')) {
            let mut lookahead = 1;
            if matches!(self.peek_at(1), Some('+' | '-')) {
                lookahead = 2;
            }
            if matches!(self.peek_at(lookahead), Some('0'..='9')) {
                for _ in 0..=lookahead {
                    self.advance();
                }
                while matches!(self.peek(), Some('0'..='9')) {
                    self.advance();
                }
            }
        }

        let numeric_end = self.pos;
        let numeric_text = &self.source[start..numeric_end];
        let value: f64 = match numeric_text.parse() {
            Ok(v) => v,
            Err(_) => {
                self.error(
                    start,
                    line,
                    column,
                    format!("invalid number literal '{numeric_text}'"),
                );
                return;
            }
        };

        // Unit suffix: the maximal identifier run after the digits. Only an
        // exact unit match consumes it; `5seconds` stays NUMBER + identifier.
        let mut suffix_end = numeric_end;
        while self
            .source[suffix_end..]
            .chars()
            .next()
            .is_some_and(is_identifier_continue)
        {
            suffix_end += self.source[suffix_end..].chars().next().map_or(0, char::len_utf8);
        }
        let suffix = &self.source[numeric_end..suffix_end];

        let kind = match suffix {
            "ms" => Some(TokenKind::DurationLiteral(value)),
            "s" => Some(TokenKind::DurationLiteral(value * 1_000.0)),
            "m" => Some(TokenKind::DurationLiteral(value * 60_000.0)),
            "h" => Some(TokenKind::DurationLiteral(value * 3_600_000.0)),
            "KB" => Some(TokenKind::BytesLiteral((value * 1024.0) as u64)),
            "MB" => Some(TokenKind::BytesLiteral((value * 1024.0 * 1024.0) as u64)),
            "GB" => Some(TokenKind::BytesLiteral((value * 1024.0 * 1024.0 * 1024.0) as u64)),
            _ => None,
        };

        match kind {
            Some(kind) => {
                while self.pos < suffix_end {
                    self.advance();
                }
                let text = &self.source[start..self.pos];
                self.tokens
                    .push(Token::new(kind, text, start..self.pos, line, column));
            }
            None => {
                self.tokens.push(Token::new(
                    TokenKind::NumberLiteral(value),
                    numeric_text,
                    start..numeric_end,
                    line,
                    column,
                ));
            }
        }
    }

    /// Scans an identifier or keyword.
    fn scan_identifier_or_keyword(&mut self, start: usize, line: u32, column: u32) {
        while self.peek().is_some_and(is_identifier_continue) {
            self.advance();
        }

        let text = &self.source[start..self.pos];
        let kind = keywords::lookup_keyword(text)
            .unwrap_or_else(|| TokenKind::Identifier(SmolStr::new(text)));

        self.tokens
            .push(Token::new(kind, text, start..self.pos, line, column));
    }

    /// Skips whitespace, line comments (`--`, `//`) and block comments.
    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek() {
                Some(' ' | '\t' | '\r' | '\n') => {
                    self.advance();
                }
                Some('-') if self.peek_at(1) == Some('-') => {
                    self.skip_line_comment();
                }
                Some('/') if self.peek_at(1) == Some('/') => {
                    self.skip_line_comment();
                }
                Some('/') if self.peek_at(1) == Some('*') => {
                    self.skip_block_comment();
                }
                _ => break,
            }
        }
    }

    fn skip_line_comment(&mut self) {
        while let Some(ch) = self.peek() {
            if ch == '\n' {
                break;
            }
            self.advance();
        }
    }

    fn skip_block_comment(&mut self) {
        let start = self.pos;
        let line = self.line;
        let column = self.column;
        self.advance(); // /
        self.advance(); // *

        loop {
            match self.peek() {
                None => {
                    self.diagnostics.push(
                        Diag::lexer("unterminated block comment")
                            .at(start..self.pos, "comment opened here")
                            .rule("unterminated_comment"),
                    );
                    self.error_noted_at(line, column);
                    return;
                }
                Some('*') if self.peek_at(1) == Some('/') => {
                    self.advance();
                    self.advance();
                    return;
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    // Records line/column context on the most recent diagnostic.
    fn error_noted_at(&mut self, line: u32, column: u32) {
        if let Some(last) = self.diagnostics.last_mut() {
            last.notes.push(format!("at line {line}, column {column}"));
        }
    }

    fn error(&mut self, start: usize, line: u32, column: u32, message: impl Into<String>) {
        self.diagnostics.push(
            Diag::lexer(message)
                .at(start..self.pos.max(start + 1), "here")
                .note(format!("at line {line}, column {column}"))
                .rule("invalid_token"),
        );
    }

    fn add_token(&mut self, kind: TokenKind, start: usize, line: u32, column: u32) {
        let text = &self.source[start..self.pos];
        self.tokens
            .push(Token::new(kind, text, start..self.pos, line, column));
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.source.len()
    }

    fn peek(&self) -> Option<char> {
        self.source[self.pos..].chars().next()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.source[self.pos..].chars().nth(offset)
    }

    fn advance(&mut self) -> char {
        let ch = self.peek().unwrap_or('\0');
        self.pos += ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        ch
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }
}

fn is_identifier_continue(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let result = tokenize(source);
        assert!(
            result.diagnostics.is_empty(),
            "unexpected diagnostics for `{source}`: {:?}",
            result.diagnostics
        );
        result.tokens.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn simple_select() {
        let kinds = kinds("SELECT title FROM 'https://example.com'");
        assert_eq!(
            kinds,
            vec![
                TokenKind::Select,
                TokenKind::Identifier("title".into()),
                TokenKind::From,
                TokenKind::StringLiteral("https://example.com".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn keywords_case_insensitive() {
        let kinds = kinds("select WHERE oRdEr");
        assert_eq!(
            kinds,
            vec![
                TokenKind::Select,
                TokenKind::Where,
                TokenKind::Order,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn line_and_column_tracking() {
        let result = tokenize("SELECT *\n  FROM x");
        assert_eq!(result.tokens[0].line, 1);
        assert_eq!(result.tokens[0].column, 1);
        let from = &result.tokens[2];
        assert_eq!(from.kind, TokenKind::From);
        assert_eq!(from.line, 2);
        assert_eq!(from.column, 3);
    }

    #[test]
    fn comments_are_discarded() {
        let kinds = kinds("-- leading\nSELECT // trailing\n/* block\nspanning */ x");
        assert_eq!(
            kinds,
            vec![
                TokenKind::Select,
                TokenKind::Identifier("x".into()),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn string_escapes() {
        let result = tokenize(r#"'a\n\t\\\'b' "cAd""#);
        assert!(result.diagnostics.is_empty());
        assert_eq!(
            result.tokens[0].kind,
            TokenKind::StringLiteral("a\n\t\\'b".into())
        );
        assert_eq!(result.tokens[1].kind, TokenKind::StringLiteral("cAd".into()));
    }

    #[test]
    fn unterminated_string_reports_opening_position() {
        let result = tokenize("SELECT 'oops");
        assert_eq!(result.diagnostics.len(), 1);
        let message = &result.diagnostics[0].message;
        assert!(message.contains("line 1"), "message: {message}");
        assert!(message.contains("column 8"), "message: {message}");
    }

    #[test]
    fn numbers_with_fraction_and_exponent() {
        let kinds = kinds("1 2.5 3e2 4.5E-1");
        assert_eq!(
            kinds,
            vec![
                TokenKind::NumberLiteral(1.0),
                TokenKind::NumberLiteral(2.5),
                TokenKind::NumberLiteral(300.0),
                TokenKind::NumberLiteral(0.45),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn duration_suffixes_normalize_to_ms() {
        let kinds = kinds("100ms 5s 2m 1h");
        assert_eq!(
            kinds,
            vec![
                TokenKind::DurationLiteral(100.0),
                TokenKind::DurationLiteral(5_000.0),
                TokenKind::DurationLiteral(120_000.0),
                TokenKind::DurationLiteral(3_600_000.0),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn byte_suffixes_normalize_to_bytes() {
        let kinds = kinds("2KB 1MB 1GB");
        assert_eq!(
            kinds,
            vec![
                TokenKind::BytesLiteral(2048),
                TokenKind::BytesLiteral(1_048_576),
                TokenKind::BytesLiteral(1_073_741_824),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn suffix_followed_by_identifier_char_is_plain_number() {
        let kinds = kinds("5seconds");
        assert_eq!(
            kinds,
            vec![
                TokenKind::NumberLiteral(5.0),
                TokenKind::Identifier("seconds".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn two_character_operators() {
        let kinds = kinds(">= <= != || ->");
        assert_eq!(
            kinds,
            vec![
                TokenKind::GtEq,
                TokenKind::LtEq,
                TokenKind::NotEq,
                TokenKind::DoublePipe,
                TokenKind::Arrow,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lone_bang_is_unknown() {
        let result = tokenize("!");
        assert_eq!(result.tokens[0].kind, TokenKind::Unknown("!".into()));
        assert!(!result.diagnostics.is_empty());
    }

    #[test]
    fn lone_pipe_is_unknown() {
        let result = tokenize("a | b");
        assert!(
            result
                .tokens
                .iter()
                .any(|t| matches!(t.kind, TokenKind::Unknown(_)))
        );
        assert!(!result.diagnostics.is_empty());
    }

    #[test]
    fn member_access_number_boundary() {
        let kinds = kinds("row.field");
        assert_eq!(
            kinds,
            vec![
                TokenKind::Identifier("row".into()),
                TokenKind::Dot,
                TokenKind::Identifier("field".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn eof_always_present() {
        let result = tokenize("");
        assert_eq!(result.tokens.len(), 1);
        assert!(result.tokens[0].is_eof());
    }
}
