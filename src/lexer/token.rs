//! Token types and source positions for WebQL lexical analysis.

use crate::ast::Span;
use smol_str::SmolStr;
use std::fmt;

/// The kind of a lexical token in WebQL.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Statement keywords
    Select,
    From,
    Where,
    Order,
    By,
    Asc,
    Desc,
    Limit,
    Offset,
    As,
    Navigate,
    To,
    With,
    Capture,
    Set,
    Show,
    For,
    Each,
    If,
    Then,
    Else,
    Insert,
    Into,
    Values,
    Update,
    Delete,

    // Operator keywords
    And,
    Or,
    Not,
    In,
    Like,
    Matches,
    Contains,

    // Literal keywords
    Null,

    // Identifiers
    Identifier(SmolStr),

    // Literals
    StringLiteral(SmolStr),
    NumberLiteral(f64),
    BooleanLiteral(bool),
    /// Duration literal normalized to milliseconds (`5s` -> 5000.0).
    DurationLiteral(f64),
    /// Byte-size literal normalized to bytes (`2KB` -> 2048).
    BytesLiteral(u64),

    // Operators
    Eq,         // =
    NotEq,      // !=
    Lt,         // <
    Gt,         // >
    LtEq,       // <=
    GtEq,       // >=
    Plus,       // +
    Minus,      // -
    Star,       // *
    Slash,      // /
    Percent,    // %
    DoublePipe, // ||
    Arrow,      // ->

    // Punctuation
    LParen,    // (
    RParen,    // )
    LBrace,    // {
    RBrace,    // }
    LBracket,  // [
    RBracket,  // ]
    Comma,     // ,
    Dot,       // .
    Colon,     // :
    Semicolon, // ;

    /// A character sequence the lexer could not classify (e.g. a lone `!`).
    Unknown(SmolStr),

    /// End of input.
    Eof,
}

impl TokenKind {
    /// Returns true if this token kind is a keyword.
    pub fn is_keyword(&self) -> bool {
        matches!(
            self,
            TokenKind::Select
                | TokenKind::From
                | TokenKind::Where
                | TokenKind::Order
                | TokenKind::By
                | TokenKind::Asc
                | TokenKind::Desc
                | TokenKind::Limit
                | TokenKind::Offset
                | TokenKind::As
                | TokenKind::Navigate
                | TokenKind::To
                | TokenKind::With
                | TokenKind::Capture
                | TokenKind::Set
                | TokenKind::Show
                | TokenKind::For
                | TokenKind::Each
                | TokenKind::If
                | TokenKind::Then
                | TokenKind::Else
                | TokenKind::Insert
                | TokenKind::Into
                | TokenKind::Values
                | TokenKind::Update
                | TokenKind::Delete
                | TokenKind::And
                | TokenKind::Or
                | TokenKind::Not
                | TokenKind::In
                | TokenKind::Like
                | TokenKind::Matches
                | TokenKind::Contains
                | TokenKind::Null
        )
    }

    /// Returns true if this token kind carries a literal value.
    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            TokenKind::StringLiteral(_)
                | TokenKind::NumberLiteral(_)
                | TokenKind::BooleanLiteral(_)
                | TokenKind::DurationLiteral(_)
                | TokenKind::BytesLiteral(_)
                | TokenKind::Null
        )
    }

    /// Returns true if a statement can begin with this token.
    pub fn starts_statement(&self) -> bool {
        matches!(
            self,
            TokenKind::Select
                | TokenKind::Navigate
                | TokenKind::Set
                | TokenKind::Show
                | TokenKind::For
                | TokenKind::If
                | TokenKind::Insert
                | TokenKind::Update
                | TokenKind::Delete
                | TokenKind::With
        )
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Select => write!(f, "SELECT"),
            TokenKind::From => write!(f, "FROM"),
            TokenKind::Where => write!(f, "WHERE"),
            TokenKind::Order => write!(f, "ORDER"),
            TokenKind::By => write!(f, "BY"),
            TokenKind::Asc => write!(f, "ASC"),
            TokenKind::Desc => write!(f, "DESC"),
            TokenKind::Limit => write!(f, "LIMIT"),
            TokenKind::Offset => write!(f, "OFFSET"),
            TokenKind::As => write!(f, "AS"),
            TokenKind::Navigate => write!(f, "NAVIGATE"),
            TokenKind::To => write!(f, "TO"),
            TokenKind::With => write!(f, "WITH"),
            TokenKind::Capture => write!(f, "CAPTURE"),
            TokenKind::Set => write!(f, "SET"),
            TokenKind::Show => write!(f, "SHOW"),
            TokenKind::For => write!(f, "FOR"),
            TokenKind::Each => write!(f, "EACH"),
            TokenKind::If => write!(f, "IF"),
            TokenKind::Then => write!(f, "THEN"),
            TokenKind::Else => write!(f, "ELSE"),
            TokenKind::Insert => write!(f, "INSERT"),
            TokenKind::Into => write!(f, "INTO"),
            TokenKind::Values => write!(f, "VALUES"),
            TokenKind::Update => write!(f, "UPDATE"),
            TokenKind::Delete => write!(f, "DELETE"),
            TokenKind::And => write!(f, "AND"),
            TokenKind::Or => write!(f, "OR"),
            TokenKind::Not => write!(f, "NOT"),
            TokenKind::In => write!(f, "IN"),
            TokenKind::Like => write!(f, "LIKE"),
            TokenKind::Matches => write!(f, "MATCHES"),
            TokenKind::Contains => write!(f, "CONTAINS"),
            TokenKind::Null => write!(f, "NULL"),
            TokenKind::Identifier(name) => write!(f, "identifier `{name}`"),
            TokenKind::StringLiteral(_) => write!(f, "string literal"),
            TokenKind::NumberLiteral(_) => write!(f, "number literal"),
            TokenKind::BooleanLiteral(_) => write!(f, "boolean literal"),
            TokenKind::DurationLiteral(_) => write!(f, "duration literal"),
            TokenKind::BytesLiteral(_) => write!(f, "byte-size literal"),
            TokenKind::Eq => write!(f, "="),
            TokenKind::NotEq => write!(f, "!="),
            TokenKind::Lt => write!(f, "<"),
            TokenKind::Gt => write!(f, ">"),
            TokenKind::LtEq => write!(f, "<="),
            TokenKind::GtEq => write!(f, ">="),
            TokenKind::Plus => write!(f, "+"),
            TokenKind::Minus => write!(f, "-"),
            TokenKind::Star => write!(f, "*"),
            TokenKind::Slash => write!(f, "/"),
            TokenKind::Percent => write!(f, "%"),
            TokenKind::DoublePipe => write!(f, "||"),
            TokenKind::Arrow => write!(f, "->"),
            TokenKind::LParen => write!(f, "("),
            TokenKind::RParen => write!(f, ")"),
            TokenKind::LBrace => write!(f, "{{"),
            TokenKind::RBrace => write!(f, "}}"),
            TokenKind::LBracket => write!(f, "["),
            TokenKind::RBracket => write!(f, "]"),
            TokenKind::Comma => write!(f, ","),
            TokenKind::Dot => write!(f, "."),
            TokenKind::Colon => write!(f, ":"),
            TokenKind::Semicolon => write!(f, ";"),
            TokenKind::Unknown(text) => write!(f, "unknown `{text}`"),
            TokenKind::Eof => write!(f, "end of input"),
        }
    }
}

/// A single lexical token with its source position.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// The kind of this token.
    pub kind: TokenKind,
    /// The raw source text of this token.
    pub text: SmolStr,
    /// Byte span in the source.
    pub span: Span,
    /// 1-based source line.
    pub line: u32,
    /// 1-based source column.
    pub column: u32,
}

impl Token {
    /// Creates a new token.
    pub fn new(kind: TokenKind, text: impl Into<SmolStr>, span: Span, line: u32, column: u32) -> Self {
        Self {
            kind,
            text: text.into(),
            span,
            line,
            column,
        }
    }

    /// Returns true if this is the EOF token.
    pub fn is_eof(&self) -> bool {
        self.kind == TokenKind::Eof
    }
}
