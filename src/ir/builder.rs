//! AST to IR generation.
//!
//! Generation runs in two passes. The first walks every call site in the
//! program and infers a signature for each defined function from the shapes
//! of the arguments: a numeric literal contributes its own type, a string
//! literal its byte type, and anything else defaults to i32. The return type
//! is the first parameter type, or i32 for a nullary function. When a
//! function is called more than once the later call site wins. The second
//! pass generates IR for each function body against those signatures.

use std::collections::HashMap;

use crate::ast::{self, BinOp, Expr, Item, Number};
use crate::error::{Error, Result};
use crate::span::Spanned;

use super::verify::verify;
use super::{BlockId, Literal, Module, OpKind, RegionId, Type, ValueId};

/// Inferred function signature.
#[derive(Clone, Debug)]
pub struct FuncSig {
    pub params: Vec<Type>,
    pub ret: Type,
}

/// Generate and verify an IR module from a parsed program. Bare top-level
/// expressions are collected into an implicit `main`.
pub fn build(ast: &ast::Module) -> Result<Module> {
    let sigs = infer_signatures(ast);
    let mut builder = Builder {
        module: Module::new(),
        sigs,
        scopes: ScopeStack::new(),
    };

    let mut seen = Vec::new();
    for item in &ast.items {
        if let Item::Defun(f) = item {
            if seen.contains(&f.name.node) {
                return Err(Error::syntax(
                    format!("function '{}' is defined twice", f.name.node),
                    f.name.span,
                ));
            }
            seen.push(f.name.node.clone());
            let sig = builder.sigs[&f.name.node].clone();
            builder.gen_function(&f.name.node, &f.params, &f.body, &sig)?;
        }
    }

    let bare: Vec<Spanned<Expr>> = ast
        .items
        .iter()
        .filter_map(|item| match item {
            Item::Expr(e) => Some(e.clone()),
            Item::Defun(_) => None,
        })
        .collect();
    if !bare.is_empty() {
        if seen.iter().any(|name| name == "main") {
            let span = ast.first_bare_expr_span().unwrap_or(bare[0].span);
            return Err(Error::syntax(
                "top-level expressions are not allowed alongside an explicit 'main'",
                span,
            ));
        }
        let sig = FuncSig {
            params: vec![],
            ret: Type::I32,
        };
        builder.gen_function("main", &[], &bare, &sig)?;
    }

    verify(&builder.module)?;
    Ok(builder.module)
}

// ─── Signature inference ──────────────────────────────────────────

fn infer_signatures(ast: &ast::Module) -> HashMap<String, FuncSig> {
    let mut arities = HashMap::new();
    let mut sigs = HashMap::new();
    for item in &ast.items {
        if let Item::Defun(f) = item {
            arities.insert(f.name.node.clone(), f.params.len());
            sigs.insert(
                f.name.node.clone(),
                FuncSig {
                    params: vec![Type::I32; f.params.len()],
                    ret: Type::I32,
                },
            );
        }
    }
    for item in &ast.items {
        match item {
            Item::Defun(f) => {
                for e in &f.body {
                    visit_calls(&e.node, &arities, &mut sigs);
                }
            }
            Item::Expr(e) => visit_calls(&e.node, &arities, &mut sigs),
        }
    }
    sigs
}

fn visit_calls(
    expr: &Expr,
    arities: &HashMap<String, usize>,
    sigs: &mut HashMap<String, FuncSig>,
) {
    match expr {
        Expr::Call { callee, args } => {
            for a in args {
                visit_calls(&a.node, arities, sigs);
            }
            // Call sites with the wrong arity are rejected during
            // generation; they must not poison the signature here.
            if arities.get(&callee.node) == Some(&args.len()) {
                let params: Vec<Type> = args.iter().map(|a| arg_type(&a.node)).collect();
                let ret = params.first().cloned().unwrap_or(Type::I32);
                sigs.insert(callee.node.clone(), FuncSig { params, ret });
            }
        }
        Expr::Binary { lhs, rhs, .. } => {
            visit_calls(&lhs.node, arities, sigs);
            visit_calls(&rhs.node, arities, sigs);
        }
        Expr::Print(e) | Expr::Return(e) => visit_calls(&e.node, arities, sigs),
        Expr::If {
            cond,
            then_expr,
            else_expr,
        } => {
            visit_calls(&cond.node, arities, sigs);
            visit_calls(&then_expr.node, arities, sigs);
            visit_calls(&else_expr.node, arities, sigs);
        }
        Expr::Number(_) | Expr::Str(_) | Expr::Variable(_) => {}
    }
}

fn arg_type(expr: &Expr) -> Type {
    match expr {
        Expr::Number(Number::Int(_)) => Type::I32,
        Expr::Number(Number::Float(_)) => Type::Float,
        Expr::Str(s) => Type::Bytes { len: s.len() },
        _ => Type::I32,
    }
}

// ─── Symbol table ─────────────────────────────────────────────────

/// Lexically scoped name-to-value map: a stack of frames searched from the
/// innermost outward, so inner bindings shadow outer ones.
struct ScopeStack {
    frames: Vec<HashMap<String, ValueId>>,
}

impl ScopeStack {
    fn new() -> Self {
        Self { frames: Vec::new() }
    }

    fn push(&mut self) {
        self.frames.push(HashMap::new());
    }

    fn pop(&mut self) {
        self.frames.pop();
    }

    fn declare(&mut self, name: &str, value: ValueId) {
        if let Some(frame) = self.frames.last_mut() {
            frame.insert(name.to_string(), value);
        }
    }

    fn lookup(&self, name: &str) -> Option<ValueId> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.get(name).copied())
    }
}

// ─── Generation ───────────────────────────────────────────────────

struct Builder {
    module: Module,
    sigs: HashMap<String, FuncSig>,
    scopes: ScopeStack,
}

impl Builder {
    fn gen_function(
        &mut self,
        name: &str,
        params: &[Spanned<String>],
        body: &[Spanned<Expr>],
        sig: &FuncSig,
    ) -> Result<()> {
        let region = self.module.new_region_with_block(&sig.params);
        let entry = self.module.region(region).blocks[0];

        self.scopes.push();
        let args = self.module.block(entry).args.clone();
        for (param, &arg) in params.iter().zip(args.iter()) {
            self.scopes.declare(&param.node, arg);
        }

        let mut last = None;
        for expr in body {
            // Anything after an explicit return is unreachable.
            if self.block_terminated(entry) {
                break;
            }
            last = self.gen_expr(entry, expr)?;
        }
        if !self.block_terminated(entry) {
            let value = match last {
                Some(v) => v,
                None => self.const_zero(entry),
            };
            self.module
                .push_op(entry, OpKind::Return, vec![value], vec![], vec![]);
        }
        self.scopes.pop();

        let func = self.module.create_op(
            OpKind::Func {
                name: name.to_string(),
            },
            vec![],
            vec![],
            vec![region],
        );
        let root = self.module.root_block();
        self.module.append_op(root, func);
        Ok(())
    }

    /// Generate one expression. `None` means the expression produced no
    /// value (a print, or a return that terminated the block).
    fn gen_expr(&mut self, block: BlockId, expr: &Spanned<Expr>) -> Result<Option<ValueId>> {
        match &expr.node {
            Expr::Number(Number::Int(n)) => {
                let op = self.module.push_op(
                    block,
                    OpKind::Constant(Literal::Int(*n)),
                    vec![],
                    vec![Type::I32],
                    vec![],
                );
                Ok(Some(self.module.result(op)))
            }
            Expr::Number(Number::Float(f)) => {
                let op = self.module.push_op(
                    block,
                    OpKind::Constant(Literal::Float(*f)),
                    vec![],
                    vec![Type::Float],
                    vec![],
                );
                Ok(Some(self.module.result(op)))
            }
            Expr::Str(s) => {
                let op = self.module.push_op(
                    block,
                    OpKind::StringConstant(s.clone()),
                    vec![],
                    vec![Type::Bytes { len: s.len() }],
                    vec![],
                );
                Ok(Some(self.module.result(op)))
            }
            Expr::Variable(name) => match self.scopes.lookup(name) {
                Some(value) => Ok(Some(value)),
                None => Err(Error::UndefinedVariable {
                    name: name.clone(),
                    span: expr.span,
                }),
            },
            Expr::Binary { op, lhs, rhs } => {
                let lhs_v = self.gen_value(block, lhs)?;
                let rhs_v = self.gen_value(block, rhs)?;
                let (kind, ty) = match op {
                    BinOp::Add => (OpKind::Add, self.module.value_ty(lhs_v).clone()),
                    BinOp::Sub => (OpKind::Sub, self.module.value_ty(lhs_v).clone()),
                    BinOp::Mul => (OpKind::Mul, self.module.value_ty(lhs_v).clone()),
                    BinOp::Le => (OpKind::LessEq, Type::BOOL),
                };
                let op = self
                    .module
                    .push_op(block, kind, vec![lhs_v, rhs_v], vec![ty], vec![]);
                Ok(Some(self.module.result(op)))
            }
            Expr::Call { callee, args } => {
                let sig = match self.sigs.get(&callee.node) {
                    Some(sig) => sig.clone(),
                    None => {
                        return Err(Error::UndefinedFunction {
                            name: callee.node.clone(),
                            span: Some(callee.span),
                        })
                    }
                };
                if args.len() != sig.params.len() {
                    return Err(Error::syntax(
                        format!(
                            "function '{}' expects {} argument(s), got {}",
                            callee.node,
                            sig.params.len(),
                            args.len()
                        ),
                        expr.span,
                    ));
                }
                let mut arg_vals = Vec::with_capacity(args.len());
                for arg in args {
                    arg_vals.push(self.gen_value(block, arg)?);
                }
                let op = self.module.push_op(
                    block,
                    OpKind::Call {
                        callee: callee.node.clone(),
                    },
                    arg_vals,
                    vec![sig.ret.clone()],
                    vec![],
                );
                Ok(Some(self.module.result(op)))
            }
            Expr::Print(arg) => {
                let value = self.gen_value(block, arg)?;
                self.module
                    .push_op(block, OpKind::Print, vec![value], vec![], vec![]);
                Ok(None)
            }
            Expr::Return(arg) => {
                let value = self.gen_value(block, arg)?;
                self.module
                    .push_op(block, OpKind::Return, vec![value], vec![], vec![]);
                Ok(None)
            }
            Expr::If {
                cond,
                then_expr,
                else_expr,
            } => {
                let cond_v = self.gen_value(block, cond)?;
                let then_region = self.module.new_region_with_block(&[]);
                let else_region = self.module.new_region_with_block(&[]);
                let then_ty = self.gen_branch(then_region, then_expr)?;
                let else_ty = self.gen_branch(else_region, else_expr)?;
                // The result type comes from the first branch that yields;
                // a branch ending in a return contributes none.
                let result_tys: Vec<Type> = then_ty.or(else_ty).into_iter().collect();
                let op = self.module.create_op(
                    OpKind::If,
                    vec![cond_v],
                    result_tys,
                    vec![then_region, else_region],
                );
                self.module.append_op(block, op);
                Ok(self.module.op(op).results.first().copied())
            }
        }
    }

    /// Generate an expression that must produce a value.
    fn gen_value(&mut self, block: BlockId, expr: &Spanned<Expr>) -> Result<ValueId> {
        match self.gen_expr(block, expr)? {
            Some(value) => Ok(value),
            None => Err(Error::syntax(
                "expression produces no value here",
                expr.span,
            )),
        }
    }

    /// Generate an `if` branch body and terminate it. Returns the type of
    /// the value the branch yields, or `None` when it returns instead.
    fn gen_branch(&mut self, region: RegionId, expr: &Spanned<Expr>) -> Result<Option<Type>> {
        let block = self.module.region(region).blocks[0];
        self.scopes.push();
        let value = self.gen_expr(block, expr)?;
        self.scopes.pop();

        if self.block_terminated(block) {
            return Ok(None);
        }
        let value = match value {
            Some(v) => v,
            None => self.const_zero(block),
        };
        let ty = self.module.value_ty(value).clone();
        self.module
            .push_op(block, OpKind::Yield, vec![value], vec![], vec![]);
        Ok(Some(ty))
    }

    fn block_terminated(&self, block: BlockId) -> bool {
        self.module
            .block(block)
            .ops
            .last()
            .map(|&op| self.module.op(op).kind.is_terminator())
            .unwrap_or(false)
    }

    fn const_zero(&mut self, block: BlockId) -> ValueId {
        let op = self.module.push_op(
            block,
            OpKind::Constant(Literal::Int(0)),
            vec![],
            vec![Type::I32],
            vec![],
        );
        self.module.result(op)
    }
}
