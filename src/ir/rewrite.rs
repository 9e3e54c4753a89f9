//! Generic greedy rewrite engine.
//!
//! A lowering pass is a fixed set of patterns applied to a structural
//! fixpoint: a worklist walker seeds itself with every operation in
//! deterministic pre-order, and every mutation re-enqueues the operations
//! adjacent to the mutation site so one walk converges without repeated full
//! passes. The walk has no iteration cap; a pattern that re-introduces its
//! own match is a bug in the pattern set, not a condition the engine guards
//! against.

use std::collections::VecDeque;

use super::{Module, OpId, OpKind, RegionId, Type, ValueId};

/// One rewrite rule. `match_and_rewrite` returns false when the operation is
/// not a match; on a match it must perform the rewrite through the handle
/// and return true.
pub trait RewritePattern {
    fn match_and_rewrite(&self, op: OpId, rw: &mut Rewriter) -> bool;
}

/// An ordered pattern collection. When several patterns could accept the
/// same operation, the first one registered wins.
#[derive(Default)]
pub struct PatternSet {
    patterns: Vec<Box<dyn RewritePattern>>,
}

impl PatternSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, pattern: impl RewritePattern + 'static) -> Self {
        self.patterns.push(Box::new(pattern));
        self
    }
}

/// Mutation handle passed to patterns. Exposes the three structural
/// primitives (insert, replace, move-region) and records which operations a
/// mutation touched so the walker can re-enqueue them.
pub struct Rewriter<'m> {
    module: &'m mut Module,
    touched: Vec<OpId>,
}

impl<'m> Rewriter<'m> {
    fn new(module: &'m mut Module) -> Self {
        Self {
            module,
            touched: Vec::new(),
        }
    }

    pub fn module(&self) -> &Module {
        self.module
    }

    /// Direct mutable access, for patterns that build region bodies before
    /// attaching them to a replacement op.
    pub fn module_mut(&mut self) -> &mut Module {
        self.module
    }

    /// Create a detached operation for use in a later insert or replace.
    pub fn create_op(
        &mut self,
        kind: OpKind,
        operands: Vec<ValueId>,
        result_tys: Vec<Type>,
        regions: Vec<RegionId>,
    ) -> OpId {
        self.module.create_op(kind, operands, result_tys, regions)
    }

    /// Insert a detached op immediately before the anchor, within the same
    /// block.
    pub fn insert_before(&mut self, anchor: OpId, op: OpId) {
        self.module.insert_op_before(anchor, op);
        self.touched.push(op);
    }

    /// Insert a detached op immediately after the anchor, within the same
    /// block.
    pub fn insert_after(&mut self, anchor: OpId, op: OpId) {
        self.module.insert_op_after(anchor, op);
        self.touched.push(op);
    }

    /// Replace `op` with the given detached replacement ops, inserted in
    /// order at its position. Uses of `op`'s results are rewired positionally
    /// to the results of the last replacement.
    pub fn replace_op(&mut self, op: OpId, replacements: Vec<OpId>) {
        let substitutes = replacements
            .last()
            .map(|&last| self.module.op(last).results.clone())
            .unwrap_or_default();
        self.replace_op_with_values(op, replacements, substitutes);
    }

    /// Replace `op`, explicitly supplying the values that stand in for its
    /// results (used when the replacement sequence's last op does not define
    /// them, e.g. a buffer allocation followed by stores).
    pub fn replace_op_with_values(
        &mut self,
        op: OpId,
        replacements: Vec<OpId>,
        substitutes: Vec<ValueId>,
    ) {
        let old_results = self.module.op(op).results.clone();
        debug_assert_eq!(
            old_results.len(),
            substitutes.len(),
            "every result of the replaced op needs a substitute value"
        );

        for replacement in replacements {
            self.module.insert_op_before(op, replacement);
            self.touched.push(replacement);
        }
        for (old, new) in old_results.into_iter().zip(substitutes) {
            self.module.replace_all_uses(old, new);
        }

        // Remember the neighborhood before the op disappears.
        if let Some(prev) = self.module.prev_op(op) {
            self.touched.push(prev);
        }
        if let Some(next) = self.module.next_op(op) {
            self.touched.push(next);
        }
        if let Some(parent) = self.module.parent_op(op) {
            self.touched.push(parent);
        }
        self.module.erase_op(op);
    }

    /// Move-region primitive: detach the `index`th region of `op` so it can
    /// be owned by a replacement operation. Region contents are untouched.
    pub fn take_region(&mut self, op: OpId, index: usize) -> RegionId {
        self.module.take_region(op, index)
    }
}

/// Apply a pattern set to a structural fixpoint.
pub fn apply_patterns(module: &mut Module, set: &PatternSet) {
    let mut queue: VecDeque<OpId> = module.ops_preorder().into();

    while let Some(op) = queue.pop_front() {
        // Stale entries: the op may have been erased or detached by an
        // earlier rewrite.
        if !module.is_attached(op) {
            continue;
        }
        for pattern in &set.patterns {
            let mut rw = Rewriter::new(module);
            if pattern.match_and_rewrite(op, &mut rw) {
                let touched = rw.touched;
                for t in touched {
                    queue.push_back(t);
                    // New ops may own regions with further work inside.
                    if module.is_live(t) {
                        for &region in &module.op(t).regions {
                            collect_region_ops(module, region, &mut queue);
                        }
                    }
                }
                break;
            }
        }
    }
}

fn collect_region_ops(module: &Module, region: RegionId, queue: &mut VecDeque<OpId>) {
    for &block in &module.region(region).blocks {
        for &op in &module.block(block).ops {
            queue.push_back(op);
            for &nested in &module.op(op).regions {
                collect_region_ops(module, nested, queue);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Literal, ValueDef};

    /// Rewrites source-dialect integer constants to standard constants.
    struct ConstLowering;

    impl RewritePattern for ConstLowering {
        fn match_and_rewrite(&self, op: OpId, rw: &mut Rewriter) -> bool {
            let &OpKind::Constant(Literal::Int(value)) = &rw.module().op(op).kind else {
                return false;
            };
            let new = rw.create_op(
                OpKind::ConstInt { value, width: 32 },
                vec![],
                vec![Type::I32],
                vec![],
            );
            rw.replace_op(op, vec![new]);
            true
        }
    }

    /// Claims every `Add` so the pattern after it never fires.
    struct AddToMul;

    impl RewritePattern for AddToMul {
        fn match_and_rewrite(&self, op: OpId, rw: &mut Rewriter) -> bool {
            if rw.module().op(op).kind != OpKind::Add {
                return false;
            }
            let data = rw.module().op(op);
            let operands = data.operands.clone();
            let new = rw.create_op(OpKind::MulI, operands, vec![Type::I32], vec![]);
            rw.replace_op(op, vec![new]);
            true
        }
    }

    struct AddToAddI;

    impl RewritePattern for AddToAddI {
        fn match_and_rewrite(&self, op: OpId, rw: &mut Rewriter) -> bool {
            if rw.module().op(op).kind != OpKind::Add {
                return false;
            }
            let operands = rw.module().op(op).operands.clone();
            let new = rw.create_op(OpKind::AddI, operands, vec![Type::I32], vec![]);
            rw.replace_op(op, vec![new]);
            true
        }
    }

    fn test_module() -> (Module, OpId, OpId, OpId) {
        let mut module = Module::new();
        let block = module.root_block();
        let a = module.push_op(
            block,
            OpKind::Constant(Literal::Int(1)),
            vec![],
            vec![Type::I32],
            vec![],
        );
        let b = module.push_op(
            block,
            OpKind::Constant(Literal::Int(2)),
            vec![],
            vec![Type::I32],
            vec![],
        );
        let (va, vb) = (module.result(a), module.result(b));
        let add = module.push_op(block, OpKind::Add, vec![va, vb], vec![Type::I32], vec![]);
        (module, a, b, add)
    }

    #[test]
    fn test_rewrite_to_fixpoint() {
        let (mut module, a, b, add) = test_module();
        let set = PatternSet::new().add(ConstLowering).add(AddToAddI);
        apply_patterns(&mut module, &set);

        assert!(!module.is_live(a));
        assert!(!module.is_live(b));
        assert!(!module.is_live(add));

        let kinds: Vec<_> = module
            .ops_preorder()
            .iter()
            .map(|&op| module.op(op).kind.clone())
            .collect();
        assert_eq!(
            kinds,
            vec![
                OpKind::ConstInt { value: 1, width: 32 },
                OpKind::ConstInt { value: 2, width: 32 },
                OpKind::AddI,
            ]
        );
    }

    #[test]
    fn test_uses_rewired_positionally() {
        let (mut module, ..) = test_module();
        let set = PatternSet::new().add(ConstLowering);
        apply_patterns(&mut module, &set);

        let ops = module.ops_preorder();
        let add = *ops.last().unwrap();
        assert_eq!(module.op(add).kind, OpKind::Add);
        for &operand in &module.op(add).operands {
            let def = module.value(operand).def;
            let ValueDef::OpResult { op, .. } = def else {
                panic!("operand should be an op result");
            };
            assert!(matches!(module.op(op).kind, OpKind::ConstInt { .. }));
        }
    }

    #[test]
    fn test_first_pattern_wins() {
        let (mut module, ..) = test_module();
        // AddToMul is registered first, so the Add must become MulI even
        // though AddToAddI would also accept it.
        let set = PatternSet::new().add(AddToMul).add(AddToAddI);
        apply_patterns(&mut module, &set);
        let kinds: Vec<_> = module
            .ops_preorder()
            .iter()
            .map(|&op| module.op(op).kind.clone())
            .collect();
        assert!(kinds.contains(&OpKind::MulI));
        assert!(!kinds.contains(&OpKind::AddI));
    }

    #[test]
    fn test_idempotent_when_nothing_matches() {
        let (mut module, ..) = test_module();
        let set = PatternSet::new().add(ConstLowering).add(AddToAddI);
        apply_patterns(&mut module, &set);
        let before: Vec<_> = module.ops_preorder();
        apply_patterns(&mut module, &set);
        assert_eq!(module.ops_preorder(), before, "second run must be a no-op");
    }

    #[test]
    fn test_unmatched_ops_left_untouched() {
        let (mut module, a, ..) = test_module();
        let set = PatternSet::new().add(AddToAddI);
        apply_patterns(&mut module, &set);
        // Constants had no pattern: still present, still source dialect.
        assert!(module.is_live(a));
        assert!(matches!(module.op(a).kind, OpKind::Constant(_)));
    }
}
