//! Keyword recognition for WebQL.
//!
//! WebQL keywords are case-insensitive.

use super::token::TokenKind;

/// Looks up a keyword by name (case-insensitive).
///
/// `TRUE` and `FALSE` are returned as boolean literal tokens rather than
/// keyword tokens.
pub fn lookup_keyword(name: &str) -> Option<TokenKind> {
    match name.to_ascii_uppercase().as_str() {
        // Statement keywords
        "SELECT" => Some(TokenKind::Select),
        "FROM" => Some(TokenKind::From),
        "WHERE" => Some(TokenKind::Where),
        "ORDER" => Some(TokenKind::Order),
        "BY" => Some(TokenKind::By),
        "ASC" => Some(TokenKind::Asc),
        "DESC" => Some(TokenKind::Desc),
        "LIMIT" => Some(TokenKind::Limit),
        "OFFSET" => Some(TokenKind::Offset),
        "AS" => Some(TokenKind::As),
        "NAVIGATE" => Some(TokenKind::Navigate),
        "TO" => Some(TokenKind::To),
        "WITH" => Some(TokenKind::With),
        "CAPTURE" => Some(TokenKind::Capture),
        "SET" => Some(TokenKind::Set),
        "SHOW" => Some(TokenKind::Show),
        "FOR" => Some(TokenKind::For),
        "EACH" => Some(TokenKind::Each),
        "IF" => Some(TokenKind::If),
        "THEN" => Some(TokenKind::Then),
        "ELSE" => Some(TokenKind::Else),
        "INSERT" => Some(TokenKind::Insert),
        "INTO" => Some(TokenKind::Into),
        "VALUES" => Some(TokenKind::Values),
        "UPDATE" => Some(TokenKind::Update),
        "DELETE" => Some(TokenKind::Delete),

        // Operator keywords
        "AND" => Some(TokenKind::And),
        "OR" => Some(TokenKind::Or),
        "NOT" => Some(TokenKind::Not),
        "IN" => Some(TokenKind::In),
        "LIKE" => Some(TokenKind::Like),
        "MATCHES" => Some(TokenKind::Matches),
        "CONTAINS" => Some(TokenKind::Contains),

        // Literal keywords
        "NULL" => Some(TokenKind::Null),
        "TRUE" => Some(TokenKind::BooleanLiteral(true)),
        "FALSE" => Some(TokenKind::BooleanLiteral(false)),

        _ => None,
    }
}

/// Returns true if the given name is a reserved word (case-insensitive).
pub fn is_reserved_word(name: &str) -> bool {
    lookup_keyword(name).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_are_case_insensitive() {
        assert_eq!(lookup_keyword("select"), Some(TokenKind::Select));
        assert_eq!(lookup_keyword("SeLeCt"), Some(TokenKind::Select));
        assert_eq!(lookup_keyword("NAVIGATE"), Some(TokenKind::Navigate));
    }

    #[test]
    fn booleans_become_literals() {
        assert_eq!(lookup_keyword("true"), Some(TokenKind::BooleanLiteral(true)));
        assert_eq!(
            lookup_keyword("FALSE"),
            Some(TokenKind::BooleanLiteral(false))
        );
    }

    #[test]
    fn non_keywords_miss() {
        assert_eq!(lookup_keyword("title"), None);
        assert_eq!(lookup_keyword("selector"), None);
        assert!(!is_reserved_word("body"));
        assert!(is_reserved_word("where"));
    }
}
