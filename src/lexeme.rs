use std::fmt;

/// Tokens of the surface syntax. Atoms are classified later by the parser
/// (number vs variable); string literals are kept distinct because the lexer
/// carves them out before any other splitting.
#[derive(Clone, Debug, PartialEq)]
pub enum Lexeme {
    LParen,
    RParen,
    /// A bare atom: operator, keyword, number, or identifier.
    Atom(String),
    /// A double-quoted string literal, quotes stripped, no escape processing.
    Str(String),
    Eof,
}

impl fmt::Display for Lexeme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lexeme::LParen => write!(f, "'('"),
            Lexeme::RParen => write!(f, "')'"),
            Lexeme::Atom(s) => write!(f, "'{}'", s),
            Lexeme::Str(s) => write!(f, "\"{}\"", s),
            Lexeme::Eof => write!(f, "end of input"),
        }
    }
}
