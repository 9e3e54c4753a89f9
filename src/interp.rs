//! Tree-walking interpreter over the IR.
//!
//! Execution is structural recursion over blocks and regions; there are no
//! jumps. Both dialects are executable, so a module can be run before,
//! between, or after lowering passes and must behave the same. Values are
//! dynamically tagged; string buffers live in an interpreter-owned memory
//! table and are passed around as handles.

use std::collections::HashMap;
use std::io::Write;

use crate::error::{Error, Result};
use crate::ir::{FloatPred, IntPred, Literal, Module, OpKind, ValueId};

/// Call frames are explicit, so runaway recursion is reported as a runtime
/// error instead of overflowing the host stack. Each interpreted frame costs
/// several native frames (`call` plus one `exec_block` per nested region),
/// so the cap must stay well below what a default thread stack can hold.
const MAX_CALL_DEPTH: usize = 200;

/// A runtime value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    /// Handle into the interpreter's buffer table.
    Buf(usize),
}

/// How a block finished: fell through or yielded a value, or hit a return
/// that unwinds through every enclosing region up to the function call.
enum Flow {
    Normal(Option<Value>),
    Return(Vec<Value>),
}

type Env = HashMap<ValueId, Value>;

pub struct Interp<'m, W: Write> {
    module: &'m Module,
    out: W,
    memory: Vec<Vec<u8>>,
    depth: usize,
}

/// Run a module's `main` function, writing program output to `out`.
pub fn run_module<W: Write>(module: &Module, out: &mut W) -> Result<()> {
    Interp::new(module, out).run()?;
    Ok(())
}

impl<'m, W: Write> Interp<'m, W> {
    pub fn new(module: &'m Module, out: W) -> Self {
        Self {
            module,
            out,
            memory: Vec::new(),
            depth: 0,
        }
    }

    pub fn run(&mut self) -> Result<Vec<Value>> {
        self.call("main", vec![])
    }

    pub fn call(&mut self, name: &str, args: Vec<Value>) -> Result<Vec<Value>> {
        let func = self.module.find_func(name).ok_or_else(|| Error::UndefinedFunction {
            name: name.to_string(),
            span: None,
        })?;
        self.depth += 1;
        if self.depth > MAX_CALL_DEPTH {
            self.depth -= 1;
            return Err(Error::Runtime(format!(
                "call depth exceeded {} frames in '{}'",
                MAX_CALL_DEPTH, name
            )));
        }

        let entry = self.module.func_entry(func)?;
        let params = self.module.block(entry).args.clone();
        if params.len() != args.len() {
            self.depth -= 1;
            return Err(Error::Runtime(format!(
                "'{}' takes {} argument(s), got {}",
                name,
                params.len(),
                args.len()
            )));
        }
        let mut env: Env = params.into_iter().zip(args).collect();

        let result = self.exec_block(entry, &mut env);
        self.depth -= 1;
        match result? {
            Flow::Return(values) => Ok(values),
            Flow::Normal(Some(value)) => Ok(vec![value]),
            Flow::Normal(None) => Ok(vec![]),
        }
    }

    fn exec_block(&mut self, block: crate::ir::BlockId, env: &mut Env) -> Result<Flow> {
        let ops = self.module.block(block).ops.clone();
        for op in ops {
            let data = self.module.op(op);
            match &data.kind {
                OpKind::Return | OpKind::SReturn => {
                    let mut values = Vec::with_capacity(data.operands.len());
                    for &operand in &data.operands {
                        values.push(self.get(env, operand)?);
                    }
                    return Ok(Flow::Return(values));
                }
                OpKind::Yield | OpKind::SYield => {
                    let value = match data.operands.first() {
                        Some(&operand) => Some(self.get(env, operand)?),
                        None => None,
                    };
                    return Ok(Flow::Normal(value));
                }
                OpKind::If | OpKind::SIf => {
                    let cond = self.get(env, data.operands[0])?;
                    let region = if truthy(cond) {
                        data.regions[0]
                    } else {
                        data.regions[1]
                    };
                    let inner = self.module.region(region).blocks[0];
                    match self.exec_block(inner, env)? {
                        Flow::Return(values) => return Ok(Flow::Return(values)),
                        Flow::Normal(value) => {
                            if let (Some(&result), Some(value)) = (data.results.first(), value) {
                                env.insert(result, value);
                            }
                        }
                    }
                }
                OpKind::For => {
                    let lb = as_int(self.get(env, data.operands[0])?)?;
                    let ub = as_int(self.get(env, data.operands[1])?)?;
                    let step = as_int(self.get(env, data.operands[2])?)?;
                    if step <= 0 {
                        return Err(Error::Runtime(format!(
                            "loop step must be positive, got {}",
                            step
                        )));
                    }
                    let body = self.module.region(data.regions[0]).blocks[0];
                    let induction = self.module.block(body).args.first().copied();
                    let mut i = lb;
                    while i < ub {
                        if let Some(iv) = induction {
                            env.insert(iv, Value::Int(i));
                        }
                        if let Flow::Return(values) = self.exec_block(body, env)? {
                            return Ok(Flow::Return(values));
                        }
                        i += step;
                    }
                }
                OpKind::Call { callee } | OpKind::SCall { callee } => {
                    let mut args = Vec::with_capacity(data.operands.len());
                    for &operand in &data.operands {
                        args.push(self.get(env, operand)?);
                    }
                    let returned = self.call(callee, args)?;
                    if let (Some(&result), Some(&value)) =
                        (data.results.first(), returned.first())
                    {
                        env.insert(result, value);
                    }
                }
                OpKind::Func { .. } | OpKind::SFunc { .. } => {
                    return Err(Error::Runtime(
                        "function definition inside a function body".to_string(),
                    ));
                }
                _ => self.exec_simple(op, env)?,
            }
        }
        Ok(Flow::Normal(None))
    }

    /// Region-free operations: evaluate and bind the result, if any.
    fn exec_simple(&mut self, op: crate::ir::OpId, env: &mut Env) -> Result<()> {
        let data = self.module.op(op);
        let value = match &data.kind {
            OpKind::Constant(Literal::Int(n)) => Value::Int(*n),
            OpKind::Constant(Literal::Float(f)) => Value::Float(*f),
            OpKind::ConstInt { value, .. } => Value::Int(*value),
            OpKind::ConstFloat(f) => Value::Float(*f),
            OpKind::StringConstant(s) => {
                self.memory.push(s.clone().into_bytes());
                Value::Buf(self.memory.len() - 1)
            }
            OpKind::Alloc { len } => {
                self.memory.push(vec![0; *len]);
                Value::Buf(self.memory.len() - 1)
            }
            OpKind::Add | OpKind::AddI | OpKind::AddF => {
                let (a, b) = self.pair(env, data)?;
                arith(a, b, |x, y| x.wrapping_add(y), |x, y| x + y)?
            }
            OpKind::Sub | OpKind::SubI | OpKind::SubF => {
                let (a, b) = self.pair(env, data)?;
                arith(a, b, |x, y| x.wrapping_sub(y), |x, y| x - y)?
            }
            OpKind::Mul | OpKind::MulI | OpKind::MulF => {
                let (a, b) = self.pair(env, data)?;
                arith(a, b, |x, y| x.wrapping_mul(y), |x, y| x * y)?
            }
            OpKind::LessEq | OpKind::CmpI(IntPred::Sle) => {
                let (a, b) = self.pair(env, data)?;
                bool_value(compare_le(a, b)?)
            }
            OpKind::CmpF(FloatPred::Ole) => {
                let (a, b) = self.pair(env, data)?;
                bool_value(as_float(a)? <= as_float(b)?)
            }
            OpKind::CmpF(FloatPred::One) => {
                let (a, b) = self.pair(env, data)?;
                bool_value(as_float(a)? != as_float(b)?)
            }
            OpKind::CmpI(IntPred::Ne) => {
                let (a, b) = self.pair(env, data)?;
                bool_value(as_int(a)? != as_int(b)?)
            }
            OpKind::And => {
                let (a, b) = self.pair(env, data)?;
                Value::Int(as_int(a)? & as_int(b)?)
            }
            OpKind::Or => {
                let (a, b) = self.pair(env, data)?;
                Value::Int(as_int(a)? | as_int(b)?)
            }
            OpKind::Xor => {
                let (a, b) = self.pair(env, data)?;
                Value::Int(as_int(a)? ^ as_int(b)?)
            }
            OpKind::Zext => self.get(env, data.operands[0])?,
            OpKind::Select => {
                let cond = self.get(env, data.operands[0])?;
                if truthy(cond) {
                    self.get(env, data.operands[1])?
                } else {
                    self.get(env, data.operands[2])?
                }
            }
            OpKind::Store => {
                let value = as_int(self.get(env, data.operands[0])?)?;
                let buf = as_buf(self.get(env, data.operands[1])?)?;
                let index = as_int(self.get(env, data.operands[2])?)?;
                let slot = self
                    .memory
                    .get_mut(buf)
                    .and_then(|bytes| bytes.get_mut(index as usize))
                    .ok_or_else(|| {
                        Error::Runtime(format!("store out of bounds at index {}", index))
                    })?;
                *slot = value as u8;
                return Ok(());
            }
            OpKind::Load => {
                let buf = as_buf(self.get(env, data.operands[0])?)?;
                let index = as_int(self.get(env, data.operands[1])?)?;
                let byte = self
                    .memory
                    .get(buf)
                    .and_then(|bytes| bytes.get(index as usize))
                    .copied()
                    .ok_or_else(|| {
                        Error::Runtime(format!("load out of bounds at index {}", index))
                    })?;
                Value::Int(byte as i64)
            }
            OpKind::Print => {
                let value = self.get(env, data.operands[0])?;
                match value {
                    Value::Int(n) => writeln!(self.out, "{}", n)?,
                    Value::Float(f) => writeln!(self.out, "{}", f)?,
                    Value::Buf(buf) => {
                        let bytes = self.memory.get(buf).cloned().unwrap_or_default();
                        self.out.write_all(&bytes)?;
                    }
                }
                return Ok(());
            }
            OpKind::PrintVal => {
                let value = self.get(env, data.operands[0])?;
                match value {
                    Value::Int(n) => writeln!(self.out, "{}", n)?,
                    Value::Float(f) => writeln!(self.out, "{}", f)?,
                    Value::Buf(_) => {
                        return Err(Error::Runtime(
                            "cannot print a buffer as a number".to_string(),
                        ))
                    }
                }
                return Ok(());
            }
            OpKind::PrintChar => {
                let byte = as_int(self.get(env, data.operands[0])?)? as u8;
                self.out.write_all(&[byte])?;
                return Ok(());
            }
            other => {
                return Err(Error::Runtime(format!(
                    "cannot execute {} here",
                    other.name()
                )))
            }
        };
        if let Some(&result) = data.results.first() {
            env.insert(result, value);
        }
        Ok(())
    }

    fn pair(&self, env: &Env, data: &crate::ir::OpData) -> Result<(Value, Value)> {
        Ok((
            self.get(env, data.operands[0])?,
            self.get(env, data.operands[1])?,
        ))
    }

    fn get(&self, env: &Env, value: ValueId) -> Result<Value> {
        env.get(&value)
            .copied()
            .ok_or_else(|| Error::Runtime("use of an unbound value".to_string()))
    }
}

fn truthy(value: Value) -> bool {
    match value {
        Value::Int(n) => n != 0,
        Value::Float(f) => f != 0.0,
        Value::Buf(_) => true,
    }
}

fn bool_value(b: bool) -> Value {
    Value::Int(b as i64)
}

fn arith(
    a: Value,
    b: Value,
    int_op: fn(i64, i64) -> i64,
    float_op: fn(f64, f64) -> f64,
) -> Result<Value> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(Value::Int(int_op(x, y))),
        _ => Ok(Value::Float(float_op(as_float(a)?, as_float(b)?))),
    }
}

fn compare_le(a: Value, b: Value) -> Result<bool> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(x <= y),
        _ => Ok(as_float(a)? <= as_float(b)?),
    }
}

fn as_int(value: Value) -> Result<i64> {
    match value {
        Value::Int(n) => Ok(n),
        Value::Float(_) => Err(Error::Runtime("expected an integer, got a float".to_string())),
        Value::Buf(_) => Err(Error::Runtime("expected an integer, got a buffer".to_string())),
    }
}

fn as_float(value: Value) -> Result<f64> {
    match value {
        Value::Int(n) => Ok(n as f64),
        Value::Float(f) => Ok(f),
        Value::Buf(_) => Err(Error::Runtime("expected a number, got a buffer".to_string())),
    }
}

fn as_buf(value: Value) -> Result<usize> {
    match value {
        Value::Buf(handle) => Ok(handle),
        _ => Err(Error::Runtime("expected a buffer".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::build;
    use crate::ir::lower::{lower_select, lower_to_standard};
    use crate::ir::{OpKind, Type};
    use crate::parser::parse;

    fn run_source(source: &str, lower: bool) -> String {
        let mut module = build(&parse(source).unwrap()).unwrap();
        if lower {
            lower_to_standard(&mut module);
        }
        let mut out = Vec::new();
        run_module(&module, &mut out).expect("run should succeed");
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_arithmetic_print() {
        assert_eq!(run_source("(defun main () (print (+ 1 2)))", false), "3\n");
        assert_eq!(run_source("(defun main () (print (+ 1 2)))", true), "3\n");
    }

    #[test]
    fn test_call_and_implicit_main() {
        let src = "(defun double (x) (* x 2)) (print (double 21))";
        assert_eq!(run_source(src, false), "42\n");
        assert_eq!(run_source(src, true), "42\n");
    }

    #[test]
    fn test_float_arithmetic() {
        let src = "(defun double (x) (+ x x)) (print (double 2.5))";
        assert_eq!(run_source(src, false), "5\n");
        assert_eq!(run_source(src, true), "5\n");
    }

    #[test]
    fn test_if_selects_branch() {
        let src = "(defun f (n) (if (<= n 1) 10 20)) (print (f 0)) (print (f 5))";
        assert_eq!(run_source(src, false), "10\n20\n");
        assert_eq!(run_source(src, true), "10\n20\n");
    }

    #[test]
    fn test_return_unwinds_through_if() {
        let src = "(defun f (n) (if (<= n 1) (return 10) 0) 20) (print (f 0)) (print (f 5))";
        assert_eq!(run_source(src, false), "10\n20\n");
        assert_eq!(run_source(src, true), "10\n20\n");
    }

    #[test]
    fn test_recursive_factorial() {
        let src = "(defun fact (n) (if (<= n 1) 1 (* n (fact (- n 1))))) (print (fact 5))";
        assert_eq!(run_source(src, false), "120\n");
        assert_eq!(run_source(src, true), "120\n");
    }

    #[test]
    fn test_string_print_before_and_after_lowering() {
        assert_eq!(run_source("(print \"hi\")", false), "hi");
        assert_eq!(run_source("(print \"hi\")", true), "hi");
    }

    #[test]
    fn test_float_condition_runs_at_both_stages() {
        let src = "(defun f (x) (if x 1 2)) (print (f 2.5)) (print (f 0.0))";
        assert_eq!(run_source(src, false), "1\n2\n");
        assert_eq!(run_source(src, true), "1\n2\n");
    }

    #[test]
    fn test_arithmetic_on_buffer_is_an_error() {
        let module = build(&parse("(print (+ 1.5 \"hi\"))").unwrap()).unwrap();
        let mut out = Vec::new();
        let err = run_module(&module, &mut out).unwrap_err();
        let Error::Runtime(message) = err else {
            panic!("expected runtime error, got {:?}", err);
        };
        assert!(message.contains("buffer"), "got: {}", message);
    }

    #[test]
    fn test_call_depth_limit() {
        let module = build(&parse("(defun spin (n) (spin n)) (spin 1)").unwrap()).unwrap();
        let mut out = Vec::new();
        let err = run_module(&module, &mut out).unwrap_err();
        let Error::Runtime(message) = err else {
            panic!("expected runtime error");
        };
        assert!(message.contains("call depth"), "got: {}", message);
    }

    #[test]
    fn test_missing_main() {
        let module = build(&parse("(defun f () 1)").unwrap()).unwrap();
        let mut out = Vec::new();
        let err = run_module(&module, &mut out).unwrap_err();
        assert!(matches!(err, Error::UndefinedFunction { .. }));
    }

    #[test]
    fn test_select_mask_lowering_preserves_meaning() {
        // Build a main that selects between 7 and 9 on each condition, then
        // run it before and after the mask lowering.
        for (cond, expected) in [(1, "7\n"), (0, "9\n")] {
            let mut module = Module::new();
            let region = module.new_region_with_block(&[]);
            let entry = module.region(region).blocks[0];
            let c = module.push_op(
                entry,
                OpKind::ConstInt { value: cond, width: 1 },
                vec![],
                vec![Type::BOOL],
                vec![],
            );
            let t = module.push_op(
                entry,
                OpKind::ConstInt { value: 7, width: 32 },
                vec![],
                vec![Type::I32],
                vec![],
            );
            let f = module.push_op(
                entry,
                OpKind::ConstInt { value: 9, width: 32 },
                vec![],
                vec![Type::I32],
                vec![],
            );
            let (cv, tv, fv) = (module.result(c), module.result(t), module.result(f));
            let select = module.push_op(
                entry,
                OpKind::Select,
                vec![cv, tv, fv],
                vec![Type::I32],
                vec![],
            );
            let sv = module.result(select);
            module.push_op(entry, OpKind::PrintVal, vec![sv], vec![], vec![]);
            module.push_op(entry, OpKind::SReturn, vec![sv], vec![], vec![]);
            let func = module.create_op(
                OpKind::SFunc {
                    name: "main".to_string(),
                },
                vec![],
                vec![],
                vec![region],
            );
            let root = module.root_block();
            module.append_op(root, func);

            let mut out = Vec::new();
            run_module(&module, &mut out).unwrap();
            assert_eq!(String::from_utf8(out).unwrap(), expected);

            lower_select(&mut module);
            let mut out = Vec::new();
            run_module(&module, &mut out).unwrap();
            assert_eq!(String::from_utf8(out).unwrap(), expected);
        }
    }
}
