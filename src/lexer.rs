use crate::error::{Error, Result};
use crate::lexeme::Lexeme;
use crate::span::{Span, Spanned};

/// Byte-level scanner for the S-expression surface syntax.
///
/// String literals are carved out first: everything between a pair of double
/// quotes becomes a single `Str` token regardless of embedded parentheses or
/// whitespace, and no escape processing is done. Outside strings, `;` starts
/// a comment that runs to end of line, parentheses are single tokens, and any
/// other run of non-delimiter bytes is an `Atom`.
pub struct Lexer<'src> {
    source: &'src [u8],
    pos: usize,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str) -> Self {
        Self {
            source: source.as_bytes(),
            pos: 0,
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Spanned<Lexeme>>> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token()?;
            let is_eof = tok.node == Lexeme::Eof;
            tokens.push(tok);
            if is_eof {
                break;
            }
        }
        Ok(tokens)
    }

    fn next_token(&mut self) -> Result<Spanned<Lexeme>> {
        self.skip_whitespace_and_comments();

        if self.pos >= self.source.len() {
            return Ok(self.make_token(Lexeme::Eof, self.pos, self.pos));
        }

        let start = self.pos;
        match self.source[self.pos] {
            b'(' => {
                self.pos += 1;
                Ok(self.make_token(Lexeme::LParen, start, self.pos))
            }
            b')' => {
                self.pos += 1;
                Ok(self.make_token(Lexeme::RParen, start, self.pos))
            }
            b'"' => self.scan_string(start),
            _ => Ok(self.scan_atom(start)),
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            while self.pos < self.source.len() && self.source[self.pos].is_ascii_whitespace() {
                self.pos += 1;
            }
            if self.pos < self.source.len() && self.source[self.pos] == b';' {
                while self.pos < self.source.len() && self.source[self.pos] != b'\n' {
                    self.pos += 1;
                }
                continue;
            }
            break;
        }
    }

    fn scan_string(&mut self, start: usize) -> Result<Spanned<Lexeme>> {
        self.pos += 1; // opening quote
        let body_start = self.pos;
        while self.pos < self.source.len() && self.source[self.pos] != b'"' {
            self.pos += 1;
        }
        if self.pos >= self.source.len() {
            return Err(Error::syntax(
                "unterminated string literal",
                Span::new(start as u32, self.pos as u32),
            ));
        }
        let body = std::str::from_utf8(&self.source[body_start..self.pos])
            .map_err(|_| {
                Error::syntax(
                    "string literal is not valid UTF-8",
                    Span::new(start as u32, self.pos as u32),
                )
            })?
            .to_string();
        self.pos += 1; // closing quote
        Ok(self.make_token(Lexeme::Str(body), start, self.pos))
    }

    fn scan_atom(&mut self, start: usize) -> Spanned<Lexeme> {
        while self.pos < self.source.len() && !is_delimiter(self.source[self.pos]) {
            self.pos += 1;
        }
        // Atoms start at a non-delimiter byte, so the slice is never empty.
        let text = String::from_utf8_lossy(&self.source[start..self.pos]).into_owned();
        self.make_token(Lexeme::Atom(text), start, self.pos)
    }

    fn make_token(&self, token: Lexeme, start: usize, end: usize) -> Spanned<Lexeme> {
        Spanned::new(token, Span::new(start as u32, end as u32))
    }
}

fn is_delimiter(ch: u8) -> bool {
    ch.is_ascii_whitespace() || ch == b'(' || ch == b')' || ch == b'"' || ch == b';'
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::line_col;

    fn lex(source: &str) -> Vec<Lexeme> {
        Lexer::new(source)
            .tokenize()
            .expect("lexing should succeed")
            .into_iter()
            .map(|t| t.node)
            .collect()
    }

    #[test]
    fn test_parens_and_atoms() {
        let tokens = lex("(+ 1 2)");
        assert_eq!(
            tokens,
            vec![
                Lexeme::LParen,
                Lexeme::Atom("+".into()),
                Lexeme::Atom("1".into()),
                Lexeme::Atom("2".into()),
                Lexeme::RParen,
                Lexeme::Eof,
            ]
        );
    }

    #[test]
    fn test_defun_form() {
        let tokens = lex("(defun double (x) (* x 2))");
        assert_eq!(tokens[1], Lexeme::Atom("defun".into()));
        assert_eq!(tokens[2], Lexeme::Atom("double".into()));
        assert_eq!(tokens[4], Lexeme::Atom("x".into()));
    }

    #[test]
    fn test_string_literal_single_token() {
        // Parens and whitespace inside quotes must not split the token.
        let tokens = lex("(print \"a (b) c\")");
        assert_eq!(
            tokens,
            vec![
                Lexeme::LParen,
                Lexeme::Atom("print".into()),
                Lexeme::Str("a (b) c".into()),
                Lexeme::RParen,
                Lexeme::Eof,
            ]
        );
    }

    #[test]
    fn test_comments_discarded() {
        let tokens = lex("; leading comment\n(print 1) ; trailing\n");
        assert_eq!(
            tokens,
            vec![
                Lexeme::LParen,
                Lexeme::Atom("print".into()),
                Lexeme::Atom("1".into()),
                Lexeme::RParen,
                Lexeme::Eof,
            ]
        );
    }

    #[test]
    fn test_float_and_comparison_atoms() {
        let tokens = lex("(<= 1.5 n)");
        assert_eq!(tokens[1], Lexeme::Atom("<=".into()));
        assert_eq!(tokens[2], Lexeme::Atom("1.5".into()));
        assert_eq!(tokens[3], Lexeme::Atom("n".into()));
    }

    #[test]
    fn test_spans_track_position() {
        let source = "(print\n  foo)";
        let tokens = Lexer::new(source).tokenize().unwrap();
        // tokens: ( print foo ) eof
        let foo = &tokens[2];
        assert_eq!(foo.node, Lexeme::Atom("foo".into()));
        assert_eq!(line_col(source, foo.span.start), (2, 3));
    }

    #[test]
    fn test_span_after_multiline_string() {
        let source = "\"a\nb\" x";
        let tokens = Lexer::new(source).tokenize().unwrap();
        let x = &tokens[1];
        assert_eq!(x.node, Lexeme::Atom("x".into()));
        assert_eq!(line_col(source, x.span.start), (2, 4));
    }

    #[test]
    fn test_error_unterminated_string() {
        let err = Lexer::new("(print \"oops)").tokenize().unwrap_err();
        match err {
            Error::Syntax { message, .. } => {
                assert!(message.contains("unterminated string"), "got: {}", message)
            }
            other => panic!("expected syntax error, got {:?}", other),
        }
    }
}
