//! Compiler and execution engine for WebQL, a SQL-like query language for
//! web automation and HTTP proxy orchestration.
//!
//! A query string flows through the pipeline: lexer, parser, semantic
//! analyzer, optimizer, planner, executor. I/O-bearing steps (navigation,
//! DOM extraction, caching) delegate to external controllers through narrow
//! async traits.
//!
//! # Parse
//!
//! ```
//! use webql::parse;
//!
//! let result = parse("SELECT title, price FROM 'https://example.com' WHERE price > 3");
//! assert!(result.ast.is_some());
//! ```
//!
//! # Compile
//!
//! ```
//! use webql::compile;
//!
//! let compiled = compile("SELECT 2 + 3 AS n FROM 'about:blank'").unwrap();
//! assert_eq!(compiled.plan.steps.len(), 2);
//! ```
//!
//! # Execute
//!
//! Executing requires controller implementations; see the
//! [`exec::controllers`] traits and the engine facade in [`engine`].

pub mod ast;
pub mod diag;
pub mod engine;
pub mod error;
pub mod exec;
pub mod fields;
pub mod lexer;
pub mod optimizer;
pub mod parser;
pub mod plan;
pub mod semantic;

// Re-export syntax primitives.
pub use ast::{Expression, Program, Span, Spanned, Statement};

// Re-export diagnostic types for convenience.
pub use diag::{Diag, DiagLabel, DiagSeverity, LabelRole, Phase};
pub use lexer::token::{Token, TokenKind};
pub use lexer::{tokenize, Lexer, LexerResult};

// Re-export parser types for convenience.
pub use parser::{ParseResult, Parser};

// Re-export semantic analysis types for convenience.
pub use semantic::{AnalyzerConfig, AnnotatedAst, SemanticAnalyzer};

// Re-export the compile/execute surface.
pub use engine::{
    CompiledQuery, EngineConfig, QueryEngine, QueryOptions, QueryResult, QueryState, QueryStatus,
};
pub use error::{EngineError, EngineResult, ErrorKind};
pub use exec::value::Value;
pub use plan::{deserialize_plan, serialize_plan, ExecutionPlan};

/// Parses WebQL source text end-to-end (lexing + parsing).
///
/// This is the recommended syntax-only entry point. It guarantees parser
/// input comes from the lexer and merges diagnostics from both phases.
pub fn parse(source: &str) -> ParseResult {
    let lex_result = tokenize(source);
    Parser::new(lex_result.tokens, source)
        .with_lexer_diagnostics(lex_result.diagnostics)
        .parse()
}

/// Compiles WebQL source text to an execution plan with default
/// configuration: parse, analyze, optimize, plan.
pub fn compile(source: &str) -> EngineResult<CompiledQuery> {
    compile_with_config(source, &EngineConfig::default())
}

/// Compiles WebQL source text with custom configuration.
pub fn compile_with_config(source: &str, config: &EngineConfig) -> EngineResult<CompiledQuery> {
    engine::compile_query(source, config)
}
