use crate::ast::*;
use crate::error::{Error, Result};
use crate::lexeme::Lexeme;
use crate::span::{Span, Spanned};

const MAX_NESTING_DEPTH: u32 = 256;

/// Recursive-descent parser over the flat token stream, with one token of
/// lookahead. All failures are fatal `Error::Syntax` values carrying the span
/// of the offending token (or the end-of-input position).
pub struct Parser {
    tokens: Vec<Spanned<Lexeme>>,
    pos: usize,
    depth: u32,
}

/// Parse a full source text into a module AST.
pub fn parse(source: &str) -> Result<Module> {
    let tokens = crate::lexer::Lexer::new(source).tokenize()?;
    Parser::new(tokens).parse_module()
}

impl Parser {
    pub fn new(tokens: Vec<Spanned<Lexeme>>) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    pub fn parse_module(mut self) -> Result<Module> {
        let mut items = Vec::new();
        while !self.at_eof() {
            if self.at(&Lexeme::RParen) {
                return Err(Error::syntax("unexpected ')'", self.current_span()));
            }
            if self.at(&Lexeme::LParen) && self.peek_at(1) == Some(&Lexeme::Atom("defun".into())) {
                items.push(Item::Defun(self.parse_defun()?));
            } else {
                items.push(Item::Expr(self.parse_expr()?));
            }
        }
        Ok(Module { items })
    }

    fn parse_defun(&mut self) -> Result<Function> {
        self.expect_lparen()?;
        self.consume(); // defun
        let name = self.expect_name("function name")?;

        self.expect_lparen()?;
        let mut params = Vec::new();
        while !self.at(&Lexeme::RParen) {
            params.push(self.expect_name("parameter name")?);
        }
        self.expect_rparen()?;

        let mut body = Vec::new();
        while !self.at(&Lexeme::RParen) {
            body.push(self.parse_expr()?);
        }
        self.expect_rparen()?;

        Ok(Function { name, params, body })
    }

    fn parse_expr(&mut self) -> Result<Spanned<Expr>> {
        if !self.enter_nesting() {
            return Err(Error::syntax(
                "expression nesting exceeds 256 levels",
                self.current_span(),
            ));
        }
        let result = self.parse_expr_inner();
        self.exit_nesting();
        result
    }

    fn parse_expr_inner(&mut self) -> Result<Spanned<Expr>> {
        let tok = self.peek().cloned();
        match tok {
            None => Err(self.eof_error("an expression")),
            Some(t) if t.node == Lexeme::LParen => self.parse_form(),
            Some(t) => {
                self.consume();
                match t.node {
                    Lexeme::Str(s) => Ok(Spanned::new(Expr::Str(s), t.span)),
                    Lexeme::Atom(a) => Ok(Spanned::new(classify_atom(&a), t.span)),
                    // A ')' where an expression is required is read as a bare
                    // atom; the enclosing form then reports its own missing
                    // close paren, which for a truncated source is the
                    // end-of-input position.
                    Lexeme::RParen => {
                        Ok(Spanned::new(Expr::Variable(")".to_string()), t.span))
                    }
                    other => Err(Error::syntax(
                        format!("expected an expression, got {}", other),
                        t.span,
                    )),
                }
            }
        }
    }

    /// Parse a parenthesized form, dispatching on its head atom.
    fn parse_form(&mut self) -> Result<Spanned<Expr>> {
        let open = self.consume().expect("caller checked '('");
        let head = match self.peek() {
            None => return Err(self.eof_error("a form head after '('")),
            Some(t) => t.clone(),
        };

        let head_text = match &head.node {
            Lexeme::Atom(a) => a.clone(),
            other => {
                return Err(Error::syntax(
                    format!("expected an operator or function name, got {}", other),
                    head.span,
                ))
            }
        };

        let expr = match head_text.as_str() {
            "print" => {
                self.consume();
                let arg = self.parse_expr()?;
                Expr::Print(Box::new(arg))
            }
            "return" => {
                self.consume();
                let arg = self.parse_expr()?;
                Expr::Return(Box::new(arg))
            }
            "if" => {
                self.consume();
                let cond = self.parse_expr()?;
                let then_expr = self.parse_expr()?;
                let else_expr = self.parse_expr()?;
                Expr::If {
                    cond: Box::new(cond),
                    then_expr: Box::new(then_expr),
                    else_expr: Box::new(else_expr),
                }
            }
            _ => {
                if let Some(op) = BinOp::from_atom(&head_text) {
                    self.consume();
                    let lhs = self.parse_expr()?;
                    let rhs = self.parse_expr()?;
                    Expr::Binary {
                        op,
                        lhs: Box::new(lhs),
                        rhs: Box::new(rhs),
                    }
                } else {
                    // Anything else is a call with the head as callee.
                    self.consume();
                    let callee = Spanned::new(head_text, head.span);
                    let mut args = Vec::new();
                    while !self.at(&Lexeme::RParen) {
                        args.push(self.parse_expr()?);
                    }
                    Expr::Call { callee, args }
                }
            }
        };

        let close = self.expect_rparen()?;
        Ok(Spanned::new(expr, open.span.merge(close)))
    }

    // ─── Token stream helpers ─────────────────────────────────────

    fn peek(&self) -> Option<&Spanned<Lexeme>> {
        match self.tokens.get(self.pos) {
            Some(t) if t.node != Lexeme::Eof => Some(t),
            _ => None,
        }
    }

    fn peek_at(&self, offset: usize) -> Option<&Lexeme> {
        match self.tokens.get(self.pos + offset) {
            Some(t) if t.node != Lexeme::Eof => Some(&t.node),
            _ => None,
        }
    }

    fn consume(&mut self) -> Option<Spanned<Lexeme>> {
        let tok = self.peek().cloned()?;
        self.pos += 1;
        Some(tok)
    }

    fn at(&self, lexeme: &Lexeme) -> bool {
        self.peek().map(|t| &t.node) == Some(lexeme)
    }

    fn at_eof(&self) -> bool {
        self.peek().is_none()
    }

    fn expect_lparen(&mut self) -> Result<Span> {
        match self.peek() {
            Some(t) if t.node == Lexeme::LParen => Ok(self.consume().unwrap().span),
            Some(t) => Err(Error::syntax(
                format!("expected '(', got {}", t.node),
                t.span,
            )),
            None => Err(self.eof_error("'('")),
        }
    }

    fn expect_rparen(&mut self) -> Result<Span> {
        match self.peek() {
            Some(t) if t.node == Lexeme::RParen => Ok(self.consume().unwrap().span),
            Some(t) => Err(Error::syntax(
                format!("expected ')', got {}", t.node),
                t.span,
            )),
            None => Err(self.eof_error("')'")),
        }
    }

    fn expect_name(&mut self, what: &str) -> Result<Spanned<String>> {
        match self.peek().cloned() {
            Some(t) => match t.node {
                Lexeme::Atom(a) => {
                    self.consume();
                    Ok(Spanned::new(a, t.span))
                }
                other => Err(Error::syntax(
                    format!("expected {}, got {}", what, other),
                    t.span,
                )),
            },
            None => Err(self.eof_error(what)),
        }
    }

    /// The span of the current token, or the end-of-input point.
    fn current_span(&self) -> Span {
        match self.tokens.get(self.pos) {
            Some(t) => t.span,
            None => self.eof_span(),
        }
    }

    fn eof_span(&self) -> Span {
        // The Eof token carries the source length as its position.
        self.tokens
            .last()
            .map(|t| t.span)
            .unwrap_or_else(Span::dummy)
    }

    fn eof_error(&self, expected: &str) -> Error {
        Error::syntax(
            format!("expected {}, got end of input", expected),
            self.eof_span(),
        )
    }

    fn enter_nesting(&mut self) -> bool {
        self.depth += 1;
        self.depth <= MAX_NESTING_DEPTH
    }

    fn exit_nesting(&mut self) {
        self.depth -= 1;
    }
}

/// Classify a bare atom: numeric-parseable atoms are numbers (int when there
/// is no decimal point), everything else is a variable reference.
fn classify_atom(text: &str) -> Expr {
    if !text.contains('.') {
        if let Ok(n) = text.parse::<i64>() {
            return Expr::Number(Number::Int(n));
        }
    } else if let Ok(f) = text.parse::<f64>() {
        return Expr::Number(Number::Float(f));
    }
    Expr::Variable(text.to_string())
}
