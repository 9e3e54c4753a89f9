use crate::span::{Span, Spanned};

/// A parsed source file: function definitions plus any bare top-level
/// expressions (collected into an implicit `main` during IR generation).
#[derive(Clone, Debug)]
pub struct Module {
    pub items: Vec<Item>,
}

#[derive(Clone, Debug)]
pub enum Item {
    Defun(Function),
    Expr(Spanned<Expr>),
}

/// `(defun name (params...) body...)`
#[derive(Clone, Debug)]
pub struct Function {
    pub name: Spanned<String>,
    pub params: Vec<Spanned<String>>,
    pub body: Vec<Spanned<Expr>>,
}

/// Expressions. Everything in the language is an expression, including `if`.
#[derive(Clone, Debug)]
pub enum Expr {
    Number(Number),
    Str(String),
    Variable(String),
    Binary {
        op: BinOp,
        lhs: Box<Spanned<Expr>>,
        rhs: Box<Spanned<Expr>>,
    },
    Call {
        callee: Spanned<String>,
        args: Vec<Spanned<Expr>>,
    },
    Print(Box<Spanned<Expr>>),
    If {
        cond: Box<Spanned<Expr>>,
        then_expr: Box<Spanned<Expr>>,
        else_expr: Box<Spanned<Expr>>,
    },
    Return(Box<Spanned<Expr>>),
}

/// Numeric literal: integer if the atom has no decimal point, float otherwise.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add, // +
    Sub, // -
    Mul, // *
    Le,  // <=
}

impl BinOp {
    pub fn from_atom(text: &str) -> Option<Self> {
        match text {
            "+" => Some(BinOp::Add),
            "-" => Some(BinOp::Sub),
            "*" => Some(BinOp::Mul),
            "<=" => Some(BinOp::Le),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Le => "<=",
        }
    }
}

impl Module {
    /// Span of the first bare top-level expression, if any.
    pub fn first_bare_expr_span(&self) -> Option<Span> {
        self.items.iter().find_map(|item| match item {
            Item::Expr(e) => Some(e.span),
            Item::Defun(_) => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binop_from_atom() {
        assert_eq!(BinOp::from_atom("+"), Some(BinOp::Add));
        assert_eq!(BinOp::from_atom("-"), Some(BinOp::Sub));
        assert_eq!(BinOp::from_atom("*"), Some(BinOp::Mul));
        assert_eq!(BinOp::from_atom("<="), Some(BinOp::Le));
        assert_eq!(BinOp::from_atom("<"), None);
        assert_eq!(BinOp::from_atom("defun"), None);
    }

    #[test]
    fn test_binop_roundtrip() {
        for op in [BinOp::Add, BinOp::Sub, BinOp::Mul, BinOp::Le] {
            assert_eq!(BinOp::from_atom(op.as_str()), Some(op));
        }
    }
}
