//! Branchless lowering of `std.select`.
//!
//! A select on an i1 condition becomes pure bit arithmetic: the condition is
//! zero-extended to the operand width, negated into an all-ones-or-zero
//! mask, and the two candidate values are combined as
//! `(t & mask) | (f & ~mask)` where `~mask` is `mask ^ -1`.

use crate::ir::rewrite::{apply_patterns, PatternSet, RewritePattern, Rewriter};
use crate::ir::{Module, OpId, OpKind};

pub fn lower_select(module: &mut Module) {
    let set = PatternSet::new().add(SelectLowering);
    apply_patterns(module, &set);
}

struct SelectLowering;

impl RewritePattern for SelectLowering {
    fn match_and_rewrite(&self, op: OpId, rw: &mut Rewriter) -> bool {
        if rw.module().op(op).kind != OpKind::Select {
            return false;
        }
        let operands = rw.module().op(op).operands.clone();
        let (cond, then_v, else_v) = (operands[0], operands[1], operands[2]);
        let ty = rw.module().value_ty(then_v).clone();

        let zext = rw.create_op(OpKind::Zext, vec![cond], vec![ty.clone()], vec![]);
        let wide = rw.module().op(zext).results[0];

        let width = ty.int_width().unwrap_or(32);
        let zero = rw.create_op(
            OpKind::ConstInt { value: 0, width },
            vec![],
            vec![ty.clone()],
            vec![],
        );
        let zero_v = rw.module().op(zero).results[0];
        // 0 - cond: all ones when the condition holds, all zeros otherwise.
        let mask = rw.create_op(OpKind::SubI, vec![zero_v, wide], vec![ty.clone()], vec![]);
        let mask_v = rw.module().op(mask).results[0];

        let neg_one = rw.create_op(
            OpKind::ConstInt { value: -1, width },
            vec![],
            vec![ty.clone()],
            vec![],
        );
        let neg_one_v = rw.module().op(neg_one).results[0];
        let not_mask = rw.create_op(
            OpKind::Xor,
            vec![mask_v, neg_one_v],
            vec![ty.clone()],
            vec![],
        );
        let not_mask_v = rw.module().op(not_mask).results[0];

        let then_masked = rw.create_op(OpKind::And, vec![then_v, mask_v], vec![ty.clone()], vec![]);
        let then_masked_v = rw.module().op(then_masked).results[0];
        let else_masked = rw.create_op(
            OpKind::And,
            vec![else_v, not_mask_v],
            vec![ty.clone()],
            vec![],
        );
        let else_masked_v = rw.module().op(else_masked).results[0];
        let result = rw.create_op(
            OpKind::Or,
            vec![then_masked_v, else_masked_v],
            vec![ty],
            vec![],
        );

        rw.replace_op(
            op,
            vec![
                zext,
                zero,
                mask,
                neg_one,
                not_mask,
                then_masked,
                else_masked,
                result,
            ],
        );
        true
    }
}
