//! Structural verifier, run after IR generation and after each lowering
//! pass. Catches malformed IR early instead of letting the interpreter or a
//! later pass trip over it.

use crate::error::{Error, Result};

use super::{Module, OpData, OpId, OpKind, ValueDef};

/// Check every structural invariant of the module:
/// blocks end in a terminator, region and operand/result arities match each
/// opcode, every value's definition points back at its definer, and call
/// sites resolve to a defined function.
pub fn verify(module: &Module) -> Result<()> {
    for op in module.ops_preorder() {
        verify_op(module, op)?;
    }
    verify_blocks(module)?;
    Ok(())
}

fn verify_op(module: &Module, op: OpId) -> Result<()> {
    let data = module.op(op);
    let kind = &data.kind;

    if data.regions.len() != kind.num_regions() {
        return Err(Error::Verification(format!(
            "{} owns {} region(s), expected {}",
            kind.name(),
            data.regions.len(),
            kind.num_regions()
        )));
    }
    for &region in &data.regions {
        if module.region(region).blocks.is_empty() {
            return Err(Error::Verification(format!(
                "{} owns a region with no blocks",
                kind.name()
            )));
        }
    }

    check_arity(kind, data)?;

    // Single assignment: each result's def must point back here.
    for (index, &result) in data.results.iter().enumerate() {
        if module.value(result).def != (ValueDef::OpResult { op, index }) {
            return Err(Error::Verification(format!(
                "result {} of {} has a mismatched definition record",
                index,
                kind.name()
            )));
        }
    }

    // Calls must resolve; surfaced as UndefinedFunction, not a generic
    // verification failure, so the caller can report the symbol.
    if let Some(callee) = kind.callee() {
        if module.find_func(callee).is_none() {
            return Err(Error::UndefinedFunction {
                name: callee.to_string(),
                span: None,
            });
        }
    }

    Ok(())
}

/// Expected operand/result counts per opcode. `None` means any count.
fn check_arity(kind: &OpKind, data: &OpData) -> Result<()> {
    let (operands, results): (Option<usize>, Option<usize>) = match kind {
        OpKind::Add
        | OpKind::Sub
        | OpKind::Mul
        | OpKind::LessEq
        | OpKind::AddI
        | OpKind::SubI
        | OpKind::MulI
        | OpKind::AddF
        | OpKind::SubF
        | OpKind::MulF
        | OpKind::CmpI(_)
        | OpKind::CmpF(_)
        | OpKind::And
        | OpKind::Or
        | OpKind::Xor => (Some(2), Some(1)),
        OpKind::Constant(_)
        | OpKind::StringConstant(_)
        | OpKind::ConstInt { .. }
        | OpKind::ConstFloat(_)
        | OpKind::Alloc { .. } => (Some(0), Some(1)),
        OpKind::Print | OpKind::PrintVal | OpKind::PrintChar => (Some(1), Some(0)),
        OpKind::Func { .. } | OpKind::SFunc { .. } => (Some(0), Some(0)),
        OpKind::Call { .. } | OpKind::SCall { .. } => (None, Some(1)),
        OpKind::If | OpKind::SIf => (Some(1), None),
        OpKind::Return | OpKind::SReturn | OpKind::Yield | OpKind::SYield => (None, Some(0)),
        OpKind::Zext => (Some(1), Some(1)),
        OpKind::Select => (Some(3), Some(1)),
        OpKind::Store => (Some(3), Some(0)),
        OpKind::Load => (Some(2), Some(1)),
        OpKind::For => (Some(3), Some(0)),
    };

    if let Some(n) = operands {
        if data.operands.len() != n {
            return Err(Error::Verification(format!(
                "{} has {} operand(s), expected {}",
                kind.name(),
                data.operands.len(),
                n
            )));
        }
    }
    if let Some(n) = results {
        if data.results.len() != n {
            return Err(Error::Verification(format!(
                "{} defines {} result(s), expected {}",
                kind.name(),
                data.results.len(),
                n
            )));
        }
    }
    Ok(())
}

fn verify_blocks(module: &Module) -> Result<()> {
    // Walk blocks through the ops that own them, skipping the root block
    // (it holds function definitions, which are not terminated).
    for op in module.ops_preorder() {
        for &region in &module.op(op).regions {
            for &block in &module.region(region).blocks {
                let ops = &module.block(block).ops;
                match ops.last() {
                    None => {
                        return Err(Error::Verification(format!(
                            "block in {} is empty",
                            module.op(op).kind.name()
                        )))
                    }
                    Some(&last) => {
                        if !module.op(last).kind.is_terminator() {
                            return Err(Error::Verification(format!(
                                "block in {} does not end in a terminator",
                                module.op(op).kind.name()
                            )));
                        }
                    }
                }
                // Terminators may appear only in the final position.
                for &mid in &ops[..ops.len() - 1] {
                    if module.op(mid).kind.is_terminator() {
                        return Err(Error::Verification(format!(
                            "{} appears before the end of its block",
                            module.op(mid).kind.name()
                        )));
                    }
                }
            }
        }
    }
    Ok(())
}
