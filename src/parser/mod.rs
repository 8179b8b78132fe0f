//! Recursive-descent parsing for WebQL.
//!
//! The parser consumes the lexer's token stream and produces a [`Program`]
//! AST. Expressions are parsed with precedence climbing; statements dispatch
//! on their leading keyword. The parser stops at the first syntax error and
//! reports it as a rich diagnostic.

pub mod base;
pub mod expression;
pub mod statement;

use crate::ast::{Program, Statement};
use crate::diag::{self, Diag, SourceFile};
use crate::lexer::token::Token;
use base::TokenStream;
use miette::Report;
use statement::StatementParser;

/// Result of parsing: the AST (when successful) and rendered diagnostics.
#[derive(Debug)]
pub struct ParseResult {
    /// The parsed program, if parsing succeeded.
    pub ast: Option<Program>,
    /// Diagnostics from lexing and parsing, rendered as miette reports.
    pub diagnostics: Vec<Report>,
}

/// The WebQL parser.
pub struct Parser<'a> {
    tokens: Vec<Token>,
    source: &'a str,
    lexer_diagnostics: Vec<Diag>,
}

impl<'a> Parser<'a> {
    /// Creates a new parser over a token stream and its originating source.
    pub fn new(tokens: Vec<Token>, source: &'a str) -> Self {
        Self {
            tokens,
            source,
            lexer_diagnostics: Vec::new(),
        }
    }

    /// Attaches diagnostics produced during lexing; any lexer error aborts
    /// parsing.
    pub fn with_lexer_diagnostics(mut self, diagnostics: Vec<Diag>) -> Self {
        self.lexer_diagnostics = diagnostics;
        self
    }

    /// Parses the token stream into a program.
    pub fn parse(self) -> ParseResult {
        let source_file = SourceFile::new(self.source);

        if diag::has_errors(&self.lexer_diagnostics) {
            return ParseResult {
                ast: None,
                diagnostics: diag::render_all(&self.lexer_diagnostics, &source_file),
            };
        }

        let mut stream = TokenStream::new(&self.tokens);
        let mut statements: Vec<Statement> = Vec::new();

        while !stream.at_end() {
            match StatementParser::new(&mut stream).parse_statement() {
                Ok(statement) => {
                    statements.push(statement);
                    // Optional statement separator.
                    stream.consume(&crate::lexer::token::TokenKind::Semicolon);
                }
                Err(err) => {
                    return ParseResult {
                        ast: None,
                        diagnostics: diag::render_all(&[*err], &source_file),
                    };
                }
            }
        }

        if statements.is_empty() {
            let empty = Diag::parser("empty query")
                .at(0..0, "nothing to parse")
                .suggest("provide at least one statement")
                .rule("empty_query");
            return ParseResult {
                ast: None,
                diagnostics: diag::render_all(&[empty], &source_file),
            };
        }

        ParseResult {
            ast: Some(Program::new(statements)),
            diagnostics: diag::render_all(&self.lexer_diagnostics, &source_file),
        }
    }
}
