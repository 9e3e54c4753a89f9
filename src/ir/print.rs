//! Textual IR dump. Values are numbered `%0, %1, ...` in the order they are
//! first printed, which is module pre-order, so dumps are stable across runs
//! and readable enough to diff between lowering stages.

use std::collections::HashMap;
use std::fmt::Write;

use super::{BlockId, FloatPred, IntPred, Literal, Module, OpId, OpKind, RegionId, ValueId};

impl std::fmt::Display for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&print_module(self))
    }
}

pub fn print_module(module: &Module) -> String {
    let mut printer = Printer {
        module,
        names: HashMap::new(),
        out: String::new(),
    };
    for &op in &module.block(module.root_block()).ops {
        printer.print_op(op, 0);
    }
    printer.out
}

struct Printer<'m> {
    module: &'m Module,
    names: HashMap<ValueId, usize>,
    out: String,
}

impl Printer<'_> {
    fn name(&mut self, value: ValueId) -> String {
        let next = self.names.len();
        let n = *self.names.entry(value).or_insert(next);
        format!("%{}", n)
    }

    fn operand_list(&mut self, operands: &[ValueId]) -> String {
        let mut parts = Vec::with_capacity(operands.len());
        for &operand in operands {
            parts.push(self.name(operand));
        }
        parts.join(", ")
    }

    fn print_op(&mut self, op: OpId, indent: usize) {
        let pad = "  ".repeat(indent);
        let data = self.module.op(op).clone();
        let kind = &data.kind;

        let mut line = pad.clone();
        if let Some(&result) = data.results.first() {
            let name = self.name(result);
            let _ = write!(line, "{} = ", name);
        }

        match kind {
            OpKind::Constant(Literal::Int(v)) => {
                let _ = write!(line, "{} {} : i32", kind.name(), v);
            }
            OpKind::Constant(Literal::Float(v)) => {
                let _ = write!(line, "{} {:?} : f64", kind.name(), v);
            }
            OpKind::StringConstant(s) => {
                let _ = write!(line, "{} {:?} : bytes<{}>", kind.name(), s, s.len());
            }
            OpKind::ConstInt { value, width } => {
                let _ = write!(line, "{} {} : i{}", kind.name(), value, width);
            }
            OpKind::ConstFloat(v) => {
                let _ = write!(line, "{} {:?} : f64", kind.name(), v);
            }
            OpKind::Alloc { len } => {
                let _ = write!(line, "{} : bytes<{}>", kind.name(), len);
            }
            OpKind::CmpI(pred) => {
                let pred = match pred {
                    IntPred::Sle => "sle",
                    IntPred::Ne => "ne",
                };
                let ops = self.operand_list(&data.operands);
                let _ = write!(line, "{} {}, {} : i1", kind.name(), pred, ops);
            }
            OpKind::CmpF(pred) => {
                let pred = match pred {
                    FloatPred::Ole => "ole",
                    FloatPred::One => "one",
                };
                let ops = self.operand_list(&data.operands);
                let _ = write!(line, "{} {}, {} : i1", kind.name(), pred, ops);
            }
            OpKind::Func { name } | OpKind::SFunc { name } => {
                let entry = self.module.region(data.regions[0]).blocks[0];
                let args = self.block_arg_list(entry);
                let _ = write!(line, "{} @{}({}) {{", kind.name(), name, args);
                self.out.push_str(&line);
                self.out.push('\n');
                self.print_region(data.regions[0], indent + 1);
                self.out.push_str(&pad);
                self.out.push_str("}\n");
                return;
            }
            OpKind::Call { callee } | OpKind::SCall { callee } => {
                let ops = self.operand_list(&data.operands);
                let ty = self.module.value_ty(data.results[0]).clone();
                let _ = write!(line, "{} @{}({}) : {}", kind.name(), callee, ops, ty);
            }
            OpKind::If | OpKind::SIf => {
                let cond = self.name(data.operands[0]);
                let _ = write!(line, "{} {}", kind.name(), cond);
                if let Some(&result) = data.results.first() {
                    let ty = self.module.value_ty(result).clone();
                    let _ = write!(line, " : {}", ty);
                }
                line.push_str(" {");
                self.out.push_str(&line);
                self.out.push('\n');
                self.print_region(data.regions[0], indent + 1);
                self.out.push_str(&pad);
                self.out.push_str("} else {\n");
                self.print_region(data.regions[1], indent + 1);
                self.out.push_str(&pad);
                self.out.push_str("}\n");
                return;
            }
            OpKind::For => {
                let entry = self.module.region(data.regions[0]).blocks[0];
                let iv = self.module.block(entry).args[0];
                let iv = self.name(iv);
                let lb = self.name(data.operands[0]);
                let ub = self.name(data.operands[1]);
                let step = self.name(data.operands[2]);
                let _ = write!(
                    line,
                    "{} {} = {} to {} step {} {{",
                    kind.name(),
                    iv,
                    lb,
                    ub,
                    step
                );
                self.out.push_str(&line);
                self.out.push('\n');
                self.print_region(data.regions[0], indent + 1);
                self.out.push_str(&pad);
                self.out.push_str("}\n");
                return;
            }
            _ => {
                let _ = write!(line, "{}", kind.name());
                if !data.operands.is_empty() {
                    let ops = self.operand_list(&data.operands);
                    let _ = write!(line, " {}", ops);
                    let ty = self.module.value_ty(data.operands[0]).clone();
                    let _ = write!(line, " : {}", ty);
                }
            }
        }

        self.out.push_str(&line);
        self.out.push('\n');
    }

    fn block_arg_list(&mut self, block: BlockId) -> String {
        let args = self.module.block(block).args.clone();
        let mut parts = Vec::with_capacity(args.len());
        for arg in args {
            let name = self.name(arg);
            parts.push(format!("{} : {}", name, self.module.value_ty(arg)));
        }
        parts.join(", ")
    }

    fn print_region(&mut self, region: RegionId, indent: usize) {
        for &block in &self.module.region(region).blocks {
            for &op in &self.module.block(block).ops.clone() {
                self.print_op(op, indent);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Type;

    #[test]
    fn test_print_function() {
        let mut module = Module::new();
        let region = module.new_region_with_block(&[]);
        let entry = module.region(region).blocks[0];
        let a = module.push_op(
            entry,
            OpKind::Constant(Literal::Int(1)),
            vec![],
            vec![Type::I32],
            vec![],
        );
        let b = module.push_op(
            entry,
            OpKind::Constant(Literal::Int(2)),
            vec![],
            vec![Type::I32],
            vec![],
        );
        let (va, vb) = (module.result(a), module.result(b));
        let add = module.push_op(entry, OpKind::Add, vec![va, vb], vec![Type::I32], vec![]);
        let sum = module.result(add);
        module.push_op(entry, OpKind::Return, vec![sum], vec![], vec![]);
        let func = module.create_op(
            OpKind::Func {
                name: "main".to_string(),
            },
            vec![],
            vec![],
            vec![region],
        );
        let root = module.root_block();
        module.append_op(root, func);

        insta::assert_snapshot!(print_module(&module), @r###"
        sprig.func @main() {
          %0 = sprig.constant 1 : i32
          %1 = sprig.constant 2 : i32
          %2 = sprig.add %0, %1 : i32
          sprig.return %2 : i32
        }
        "###);
    }

    #[test]
    fn test_print_function_args_and_call() {
        let mut module = Module::new();
        let region = module.new_region_with_block(&[Type::I32]);
        let entry = module.region(region).blocks[0];
        let x = module.block(entry).args[0];
        module.push_op(entry, OpKind::Return, vec![x], vec![], vec![]);
        let func = module.create_op(
            OpKind::Func {
                name: "id".to_string(),
            },
            vec![],
            vec![],
            vec![region],
        );
        let root = module.root_block();
        module.append_op(root, func);

        let out = print_module(&module);
        assert!(out.contains("sprig.func @id(%0 : i32)"), "got:\n{}", out);
        assert!(out.contains("sprig.return %0 : i32"), "got:\n{}", out);
    }

    #[test]
    fn test_numbering_is_stable_across_dumps() {
        let mut module = Module::new();
        let block = module.root_block();
        let region = module.new_region_with_block(&[]);
        let entry = module.region(region).blocks[0];
        let c = module.push_op(
            entry,
            OpKind::ConstInt { value: 7, width: 32 },
            vec![],
            vec![Type::I32],
            vec![],
        );
        let v = module.result(c);
        module.push_op(entry, OpKind::SReturn, vec![v], vec![], vec![]);
        let func = module.create_op(
            OpKind::SFunc {
                name: "main".to_string(),
            },
            vec![],
            vec![],
            vec![region],
        );
        module.append_op(block, func);

        assert_eq!(print_module(&module), print_module(&module));
        assert!(print_module(&module).contains("%0 = std.const 7 : i32"));
    }
}
