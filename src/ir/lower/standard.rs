//! Source-dialect to standard-dialect lowering.
//!
//! One pattern per source opcode. Arithmetic is type-directed: the operand
//! types (fixed at IR generation) pick the integer or float form. Strings
//! become an allocated byte buffer filled by stores, and printing a byte
//! buffer becomes a counted loop that loads and prints one byte at a time.

use crate::ir::rewrite::{apply_patterns, PatternSet, RewritePattern, Rewriter};
use crate::ir::{FloatPred, IntPred, Literal, Module, OpId, OpKind, Type};

/// Rewrite every source-dialect operation in the module to its standard
/// form. Running it on already-lowered IR is a no-op.
pub fn lower_to_standard(module: &mut Module) {
    let set = PatternSet::new()
        .add(ConstantLowering)
        .add(StringConstantLowering)
        .add(AddLowering)
        .add(SubLowering)
        .add(MulLowering)
        .add(LessEqLowering)
        .add(PrintLowering)
        .add(FuncLowering)
        .add(CallLowering)
        .add(IfLowering)
        .add(ReturnLowering)
        .add(YieldLowering);
    apply_patterns(module, &set);
}

struct ConstantLowering;

impl RewritePattern for ConstantLowering {
    fn match_and_rewrite(&self, op: OpId, rw: &mut Rewriter) -> bool {
        let &OpKind::Constant(literal) = &rw.module().op(op).kind else {
            return false;
        };
        let new = match literal {
            Literal::Int(value) => rw.create_op(
                OpKind::ConstInt { value, width: 32 },
                vec![],
                vec![Type::I32],
                vec![],
            ),
            Literal::Float(value) => rw.create_op(
                OpKind::ConstFloat(value),
                vec![],
                vec![Type::Float],
                vec![],
            ),
        };
        rw.replace_op(op, vec![new]);
        true
    }
}

struct StringConstantLowering;

impl RewritePattern for StringConstantLowering {
    fn match_and_rewrite(&self, op: OpId, rw: &mut Rewriter) -> bool {
        let OpKind::StringConstant(text) = &rw.module().op(op).kind else {
            return false;
        };
        let bytes = text.clone().into_bytes();
        let len = bytes.len();

        let mut ops = Vec::with_capacity(1 + 3 * len);
        let alloc = rw.create_op(
            OpKind::Alloc { len },
            vec![],
            vec![Type::Bytes { len }],
            vec![],
        );
        let buffer = rw.module().op(alloc).results[0];
        ops.push(alloc);
        for (i, byte) in bytes.into_iter().enumerate() {
            let value = rw.create_op(
                OpKind::ConstInt {
                    value: byte as i64,
                    width: 8,
                },
                vec![],
                vec![Type::BYTE],
                vec![],
            );
            let index = rw.create_op(
                OpKind::ConstInt {
                    value: i as i64,
                    width: 64,
                },
                vec![],
                vec![Type::INDEX],
                vec![],
            );
            let (v, ix) = (rw.module().op(value).results[0], rw.module().op(index).results[0]);
            let store = rw.create_op(OpKind::Store, vec![v, buffer, ix], vec![], vec![]);
            ops.push(value);
            ops.push(index);
            ops.push(store);
        }

        // The buffer is never freed.
        rw.replace_op_with_values(op, ops, vec![buffer]);
        true
    }
}

fn lower_binary(op: OpId, rw: &mut Rewriter, int_kind: OpKind, float_kind: OpKind) -> bool {
    let data = rw.module().op(op);
    let operands = data.operands.clone();
    let ty = rw.module().value_ty(operands[0]).clone();
    let kind = if ty.is_float() { float_kind } else { int_kind };
    let new = rw.create_op(kind, operands, vec![ty], vec![]);
    rw.replace_op(op, vec![new]);
    true
}

struct AddLowering;

impl RewritePattern for AddLowering {
    fn match_and_rewrite(&self, op: OpId, rw: &mut Rewriter) -> bool {
        if rw.module().op(op).kind != OpKind::Add {
            return false;
        }
        lower_binary(op, rw, OpKind::AddI, OpKind::AddF)
    }
}

struct SubLowering;

impl RewritePattern for SubLowering {
    fn match_and_rewrite(&self, op: OpId, rw: &mut Rewriter) -> bool {
        if rw.module().op(op).kind != OpKind::Sub {
            return false;
        }
        lower_binary(op, rw, OpKind::SubI, OpKind::SubF)
    }
}

struct MulLowering;

impl RewritePattern for MulLowering {
    fn match_and_rewrite(&self, op: OpId, rw: &mut Rewriter) -> bool {
        if rw.module().op(op).kind != OpKind::Mul {
            return false;
        }
        lower_binary(op, rw, OpKind::MulI, OpKind::MulF)
    }
}

struct LessEqLowering;

impl RewritePattern for LessEqLowering {
    fn match_and_rewrite(&self, op: OpId, rw: &mut Rewriter) -> bool {
        if rw.module().op(op).kind != OpKind::LessEq {
            return false;
        }
        let operands = rw.module().op(op).operands.clone();
        let kind = if rw.module().value_ty(operands[0]).is_float() {
            OpKind::CmpF(FloatPred::Ole)
        } else {
            OpKind::CmpI(IntPred::Sle)
        };
        let new = rw.create_op(kind, operands, vec![Type::BOOL], vec![]);
        rw.replace_op(op, vec![new]);
        true
    }
}

struct PrintLowering;

impl RewritePattern for PrintLowering {
    fn match_and_rewrite(&self, op: OpId, rw: &mut Rewriter) -> bool {
        if rw.module().op(op).kind != OpKind::Print {
            return false;
        }
        let value = rw.module().op(op).operands[0];
        let ty = rw.module().value_ty(value).clone();

        let Type::Bytes { len } = ty else {
            let new = rw.create_op(OpKind::PrintVal, vec![value], vec![], vec![]);
            rw.replace_op(op, vec![new]);
            return true;
        };

        // A byte buffer is printed one character at a time.
        let lb = rw.create_op(
            OpKind::ConstInt { value: 0, width: 64 },
            vec![],
            vec![Type::INDEX],
            vec![],
        );
        let ub = rw.create_op(
            OpKind::ConstInt {
                value: len as i64,
                width: 64,
            },
            vec![],
            vec![Type::INDEX],
            vec![],
        );
        let step = rw.create_op(
            OpKind::ConstInt { value: 1, width: 64 },
            vec![],
            vec![Type::INDEX],
            vec![],
        );
        let (lb_v, ub_v, step_v) = (
            rw.module().op(lb).results[0],
            rw.module().op(ub).results[0],
            rw.module().op(step).results[0],
        );

        let body = rw.module_mut().new_region_with_block(&[Type::INDEX]);
        let block = rw.module().region(body).blocks[0];
        let iv = rw.module().block(block).args[0];
        let load = rw
            .module_mut()
            .push_op(block, OpKind::Load, vec![value, iv], vec![Type::BYTE], vec![]);
        let byte = rw.module().result(load);
        rw.module_mut()
            .push_op(block, OpKind::PrintChar, vec![byte], vec![], vec![]);
        rw.module_mut()
            .push_op(block, OpKind::SYield, vec![], vec![], vec![]);

        let for_op = rw.create_op(
            OpKind::For,
            vec![lb_v, ub_v, step_v],
            vec![],
            vec![body],
        );
        rw.replace_op_with_values(op, vec![lb, ub, step, for_op], vec![]);
        true
    }
}

struct FuncLowering;

impl RewritePattern for FuncLowering {
    fn match_and_rewrite(&self, op: OpId, rw: &mut Rewriter) -> bool {
        let OpKind::Func { name } = &rw.module().op(op).kind else {
            return false;
        };
        let name = name.clone();
        let body = rw.take_region(op, 0);
        let new = rw.create_op(OpKind::SFunc { name }, vec![], vec![], vec![body]);
        rw.replace_op(op, vec![new]);
        true
    }
}

struct CallLowering;

impl RewritePattern for CallLowering {
    fn match_and_rewrite(&self, op: OpId, rw: &mut Rewriter) -> bool {
        let OpKind::Call { callee } = &rw.module().op(op).kind else {
            return false;
        };
        let callee = callee.clone();
        let data = rw.module().op(op);
        let operands = data.operands.clone();
        let ty = rw.module().value_ty(data.results[0]).clone();
        let new = rw.create_op(OpKind::SCall { callee }, operands, vec![ty], vec![]);
        rw.replace_op(op, vec![new]);
        true
    }
}

struct IfLowering;

impl RewritePattern for IfLowering {
    fn match_and_rewrite(&self, op: OpId, rw: &mut Rewriter) -> bool {
        if rw.module().op(op).kind != OpKind::If {
            return false;
        }
        let cond = rw.module().op(op).operands[0];
        let result_tys: Vec<Type> = rw
            .module()
            .op(op)
            .results
            .iter()
            .map(|&r| rw.module().value_ty(r).clone())
            .collect();

        let then_region = rw.take_region(op, 0);
        let else_region = rw.take_region(op, 1);

        let mut replacements = Vec::new();
        let cond_ty = rw.module().value_ty(cond).clone();
        let cond = if cond_ty.int_width() == Some(1) {
            cond
        } else if cond_ty.is_float() {
            // A float condition is taken when it is not 0.0.
            let zero = rw.create_op(OpKind::ConstFloat(0.0), vec![], vec![Type::Float], vec![]);
            let zero_v = rw.module().op(zero).results[0];
            let cmp = rw.create_op(
                OpKind::CmpF(FloatPred::One),
                vec![cond, zero_v],
                vec![Type::BOOL],
                vec![],
            );
            let cmp_v = rw.module().op(cmp).results[0];
            replacements.push(zero);
            replacements.push(cmp);
            cmp_v
        } else {
            // Widen a non-boolean integer condition: taken when nonzero.
            let width = cond_ty.int_width().unwrap_or(32);
            let zero = rw.create_op(
                OpKind::ConstInt { value: 0, width },
                vec![],
                vec![Type::Int { width }],
                vec![],
            );
            let zero_v = rw.module().op(zero).results[0];
            let cmp = rw.create_op(
                OpKind::CmpI(IntPred::Ne),
                vec![cond, zero_v],
                vec![Type::BOOL],
                vec![],
            );
            let cmp_v = rw.module().op(cmp).results[0];
            replacements.push(zero);
            replacements.push(cmp);
            cmp_v
        };

        let new = rw.create_op(
            OpKind::SIf,
            vec![cond],
            result_tys,
            vec![then_region, else_region],
        );
        replacements.push(new);
        rw.replace_op(op, replacements);
        true
    }
}

struct ReturnLowering;

impl RewritePattern for ReturnLowering {
    fn match_and_rewrite(&self, op: OpId, rw: &mut Rewriter) -> bool {
        if rw.module().op(op).kind != OpKind::Return {
            return false;
        }
        let operands = rw.module().op(op).operands.clone();
        let new = rw.create_op(OpKind::SReturn, operands, vec![], vec![]);
        rw.replace_op(op, vec![new]);
        true
    }
}

struct YieldLowering;

impl RewritePattern for YieldLowering {
    fn match_and_rewrite(&self, op: OpId, rw: &mut Rewriter) -> bool {
        if rw.module().op(op).kind != OpKind::Yield {
            return false;
        }
        let operands = rw.module().op(op).operands.clone();
        let new = rw.create_op(OpKind::SYield, operands, vec![], vec![]);
        rw.replace_op(op, vec![new]);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::build;
    use crate::ir::verify::verify;
    use crate::parser::parse;

    fn lowered(source: &str) -> Module {
        let mut module = build(&parse(source).unwrap()).unwrap();
        lower_to_standard(&mut module);
        verify(&module).expect("lowered module should verify");
        module
    }

    #[test]
    fn test_integer_arithmetic_lowers_to_int_forms() {
        let dump = lowered("(defun main () (print (* (+ 1 2) (- 5 3))))").to_string();
        assert!(dump.contains("std.addi"), "got:\n{}", dump);
        assert!(dump.contains("std.subi"), "got:\n{}", dump);
        assert!(dump.contains("std.muli"), "got:\n{}", dump);
        assert!(dump.contains("std.print"), "got:\n{}", dump);
        assert!(!dump.contains("sprig."), "got:\n{}", dump);
    }

    #[test]
    fn test_float_arithmetic_lowers_to_float_forms() {
        let dump = lowered("(defun double (x) (+ x x)) (print (double 2.5))").to_string();
        assert!(dump.contains("std.addf"), "got:\n{}", dump);
        assert!(!dump.contains("std.addi"), "got:\n{}", dump);
    }

    #[test]
    fn test_compare_lowers_by_operand_type() {
        let dump = lowered("(defun f (n) (if (<= n 1) 1 2)) (f 5)").to_string();
        assert!(dump.contains("std.cmpi sle"), "got:\n{}", dump);
        assert!(dump.contains("std.if"), "got:\n{}", dump);
    }

    #[test]
    fn test_boolean_condition_is_not_widened() {
        let dump = lowered("(defun f (n) (if (<= n 1) 1 2)) (f 5)").to_string();
        // The le result is already i1; no extra ne-compare may appear.
        assert!(!dump.contains("cmpi ne"), "got:\n{}", dump);
    }

    #[test]
    fn test_integer_condition_is_widened() {
        let dump = lowered("(defun f (n) (if n 1 2)) (f 5)").to_string();
        assert!(dump.contains("std.cmpi ne"), "got:\n{}", dump);
    }

    #[test]
    fn test_float_condition_is_widened_with_float_compare() {
        let dump = lowered("(defun f (x) (if x 1 2)) (f 2.5)").to_string();
        assert!(dump.contains("std.cmpf one"), "got:\n{}", dump);
        assert!(dump.contains("std.constf 0.0"), "got:\n{}", dump);
        assert!(!dump.contains("std.cmpi"), "got:\n{}", dump);
    }

    #[test]
    fn test_string_lowers_to_alloc_and_stores() {
        let module = lowered("(defun main () (print \"hi\"))");
        let dump = module.to_string();
        assert!(dump.contains("std.alloc : bytes<2>"), "got:\n{}", dump);
        let stores = module
            .ops_preorder()
            .into_iter()
            .filter(|&op| module.op(op).kind == OpKind::Store)
            .count();
        assert_eq!(stores, 2, "one store per byte");
        // 'h' = 104, 'i' = 105, stored in order.
        assert!(dump.contains("std.const 104 : i8"), "got:\n{}", dump);
        assert!(dump.contains("std.const 105 : i8"), "got:\n{}", dump);
    }

    #[test]
    fn test_string_print_lowers_to_loop() {
        let dump = lowered("(defun main () (print \"hi\"))").to_string();
        assert!(dump.contains("std.for"), "got:\n{}", dump);
        assert!(dump.contains("std.load"), "got:\n{}", dump);
        assert!(dump.contains("std.putc"), "got:\n{}", dump);
        assert!(!dump.contains("std.print "), "got:\n{}", dump);
    }

    #[test]
    fn test_functions_and_calls_lowered() {
        let dump = lowered("(defun double (x) (* x 2)) (print (double 21))").to_string();
        assert!(dump.contains("std.func @double"), "got:\n{}", dump);
        assert!(dump.contains("std.func @main"), "got:\n{}", dump);
        assert!(dump.contains("std.call @double"), "got:\n{}", dump);
        assert!(dump.contains("std.return"), "got:\n{}", dump);
    }

    #[test]
    fn test_lowering_is_idempotent() {
        let mut module = build(&parse("(defun main () (print (+ 1 2)))").unwrap()).unwrap();
        lower_to_standard(&mut module);
        let first = module.to_string();
        lower_to_standard(&mut module);
        assert_eq!(module.to_string(), first);
    }
}
