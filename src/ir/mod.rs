//! Region-based intermediate representation.
//!
//! The IR is a tree of operations: a `Module` owns a root region, a region
//! owns blocks, a block owns an ordered list of operations, and an operation
//! may own nested regions (function bodies, `if` branches, loop bodies).
//! Values are SSA: each is defined exactly once, by an operation result or a
//! block argument.
//!
//! Storage is arena-style. Operations, blocks, regions, and values live in
//! flat vectors inside the `Module` and are addressed by copyable index ids.
//! Erasing an operation tombstones its slot; moving a region between
//! operations is O(1) re-parenting. This is what makes the rewrite engine's
//! structural mutations cheap.

pub mod builder;
pub mod lower;
pub mod print;
pub mod rewrite;
pub mod verify;

use crate::error::{Error, Result};

// ─── Ids ──────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OpId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlockId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RegionId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ValueId(pub u32);

// ─── Types ────────────────────────────────────────────────────────

/// Static type of a value.
#[derive(Clone, Debug, PartialEq)]
pub enum Type {
    /// Fixed-width integer. Width 1 doubles as bool, 8 as a byte,
    /// 64 as the loop-index type.
    Int { width: u32 },
    Float,
    /// Fixed-size byte sequence (string storage).
    Bytes { len: usize },
    Fn {
        params: Vec<Type>,
        results: Vec<Type>,
    },
}

impl Type {
    pub const BOOL: Type = Type::Int { width: 1 };
    pub const BYTE: Type = Type::Int { width: 8 };
    pub const I32: Type = Type::Int { width: 32 };
    pub const INDEX: Type = Type::Int { width: 64 };

    pub fn is_float(&self) -> bool {
        matches!(self, Type::Float)
    }

    pub fn is_bytes(&self) -> bool {
        matches!(self, Type::Bytes { .. })
    }

    pub fn int_width(&self) -> Option<u32> {
        match self {
            Type::Int { width } => Some(*width),
            _ => None,
        }
    }
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Int { width } => write!(f, "i{}", width),
            Type::Float => write!(f, "f64"),
            Type::Bytes { len } => write!(f, "bytes<{}>", len),
            Type::Fn { params, results } => {
                write!(f, "fn(")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", p)?;
                }
                write!(f, ")")?;
                match results.len() {
                    0 => Ok(()),
                    1 => write!(f, " -> {}", results[0]),
                    _ => {
                        write!(f, " -> (")?;
                        for (i, r) in results.iter().enumerate() {
                            if i > 0 {
                                write!(f, ", ")?;
                            }
                            write!(f, "{}", r)?;
                        }
                        write!(f, ")")
                    }
                }
            }
        }
    }
}

/// Literal payload of a source-dialect constant.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
}

impl Literal {
    pub fn ty(&self) -> Type {
        match self {
            Literal::Int(_) => Type::I32,
            Literal::Float(_) => Type::Float,
        }
    }
}

/// Integer comparison predicate (signed).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntPred {
    /// signed less-or-equal
    Sle,
    /// not equal
    Ne,
}

/// Float comparison predicate (ordered).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FloatPred {
    /// ordered less-or-equal
    Ole,
    /// ordered not-equal
    One,
}

// ─── Operation kinds ──────────────────────────────────────────────

/// The closed operation vocabulary, one tag per opcode. Dispatch anywhere in
/// the compiler is an exhaustive match, so adding an opcode surfaces every
/// site that needs updating.
#[derive(Clone, Debug, PartialEq)]
pub enum OpKind {
    // ── source dialect ──
    Add,
    Sub,
    Mul,
    LessEq,
    Constant(Literal),
    StringConstant(String),
    Print,
    /// Function definition; owns one body region.
    Func { name: String },
    Call { callee: String },
    /// Value-producing conditional; owns then and else regions.
    If,
    Return,
    Yield,

    // ── standard dialect: arithmetic ──
    AddI,
    SubI,
    MulI,
    AddF,
    SubF,
    MulF,
    CmpI(IntPred),
    CmpF(FloatPred),
    ConstInt { value: i64, width: u32 },
    ConstFloat(f64),

    // ── standard dialect: bit manipulation ──
    And,
    Or,
    Xor,
    /// Zero-extend an integer to a wider width.
    Zext,
    /// Choose between two values based on an i1 condition.
    Select,

    // ── standard dialect: memory ──
    /// Allocate a fixed-size byte buffer.
    Alloc { len: usize },
    /// Store a byte: operands (value, buffer, index).
    Store,
    /// Load a byte: operands (buffer, index).
    Load,

    // ── standard dialect: control flow ──
    /// Counted loop: operands (lb, ub, step); one region whose block takes
    /// the induction variable as argument.
    For,
    SFunc { name: String },
    SCall { callee: String },
    SIf,
    SReturn,
    SYield,

    // ── standard dialect: io ──
    /// Print a numeric value followed by a newline.
    PrintVal,
    /// Print a single byte as a character, no newline.
    PrintChar,
}

impl OpKind {
    /// Dialect-qualified name used by the printer.
    pub fn name(&self) -> &'static str {
        match self {
            OpKind::Add => "sprig.add",
            OpKind::Sub => "sprig.sub",
            OpKind::Mul => "sprig.mul",
            OpKind::LessEq => "sprig.le",
            OpKind::Constant(_) => "sprig.constant",
            OpKind::StringConstant(_) => "sprig.string",
            OpKind::Print => "sprig.print",
            OpKind::Func { .. } => "sprig.func",
            OpKind::Call { .. } => "sprig.call",
            OpKind::If => "sprig.if",
            OpKind::Return => "sprig.return",
            OpKind::Yield => "sprig.yield",
            OpKind::AddI => "std.addi",
            OpKind::SubI => "std.subi",
            OpKind::MulI => "std.muli",
            OpKind::AddF => "std.addf",
            OpKind::SubF => "std.subf",
            OpKind::MulF => "std.mulf",
            OpKind::CmpI(_) => "std.cmpi",
            OpKind::CmpF(_) => "std.cmpf",
            OpKind::ConstInt { .. } => "std.const",
            OpKind::ConstFloat(_) => "std.constf",
            OpKind::And => "std.and",
            OpKind::Or => "std.or",
            OpKind::Xor => "std.xor",
            OpKind::Zext => "std.zext",
            OpKind::Select => "std.select",
            OpKind::Alloc { .. } => "std.alloc",
            OpKind::Store => "std.store",
            OpKind::Load => "std.load",
            OpKind::For => "std.for",
            OpKind::SFunc { .. } => "std.func",
            OpKind::SCall { .. } => "std.call",
            OpKind::SIf => "std.if",
            OpKind::SReturn => "std.return",
            OpKind::SYield => "std.yield",
            OpKind::PrintVal => "std.print",
            OpKind::PrintChar => "std.putc",
        }
    }

    /// Number of regions an operation of this kind must own.
    pub fn num_regions(&self) -> usize {
        match self {
            OpKind::If | OpKind::SIf => 2,
            OpKind::Func { .. } | OpKind::SFunc { .. } | OpKind::For => 1,
            _ => 0,
        }
    }

    /// Terminators end a block and transfer control or a value out of it.
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            OpKind::Return | OpKind::Yield | OpKind::SReturn | OpKind::SYield
        )
    }

    /// Symbol name if this operation defines a function.
    pub fn func_name(&self) -> Option<&str> {
        match self {
            OpKind::Func { name } | OpKind::SFunc { name } => Some(name),
            _ => None,
        }
    }

    /// Callee symbol if this operation is a call.
    pub fn callee(&self) -> Option<&str> {
        match self {
            OpKind::Call { callee } | OpKind::SCall { callee } => Some(callee),
            _ => None,
        }
    }
}

// ─── Arena records ────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct OpData {
    pub kind: OpKind,
    pub operands: Vec<ValueId>,
    pub results: Vec<ValueId>,
    pub regions: Vec<RegionId>,
    pub parent: Option<BlockId>,
}

#[derive(Clone, Debug)]
pub struct BlockData {
    pub args: Vec<ValueId>,
    pub ops: Vec<OpId>,
    pub parent: Option<RegionId>,
}

#[derive(Clone, Debug)]
pub struct RegionData {
    pub blocks: Vec<BlockId>,
    pub parent: Option<OpId>,
}

#[derive(Clone, Debug)]
pub struct ValueData {
    pub ty: Type,
    pub def: ValueDef,
}

/// The single definition site of a value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueDef {
    OpResult { op: OpId, index: usize },
    BlockArg { block: BlockId, index: usize },
}

// ─── Module ───────────────────────────────────────────────────────

/// Root container: arenas for every IR entity plus the root region that
/// holds all top-level function definitions.
#[derive(Debug)]
pub struct Module {
    ops: Vec<Option<OpData>>,
    blocks: Vec<Option<BlockData>>,
    regions: Vec<RegionData>,
    values: Vec<ValueData>,
    pub body: RegionId,
}

impl Default for Module {
    fn default() -> Self {
        Self::new()
    }
}

impl Module {
    pub fn new() -> Self {
        let mut module = Module {
            ops: Vec::new(),
            blocks: Vec::new(),
            regions: Vec::new(),
            values: Vec::new(),
            body: RegionId(0),
        };
        let body = module.new_region();
        module.new_block(body);
        module.body = body;
        module
    }

    // ── Accessors ──

    /// Panics on an erased id; rewrite passes must check `is_live` first.
    pub fn op(&self, id: OpId) -> &OpData {
        self.ops[id.0 as usize]
            .as_ref()
            .unwrap_or_else(|| panic!("use of erased operation {:?}", id))
    }

    fn op_mut(&mut self, id: OpId) -> &mut OpData {
        self.ops[id.0 as usize]
            .as_mut()
            .unwrap_or_else(|| panic!("use of erased operation {:?}", id))
    }

    pub fn is_live(&self, id: OpId) -> bool {
        self.ops[id.0 as usize].is_some()
    }

    pub fn block(&self, id: BlockId) -> &BlockData {
        self.blocks[id.0 as usize]
            .as_ref()
            .unwrap_or_else(|| panic!("use of erased block {:?}", id))
    }

    fn block_mut(&mut self, id: BlockId) -> &mut BlockData {
        self.blocks[id.0 as usize]
            .as_mut()
            .unwrap_or_else(|| panic!("use of erased block {:?}", id))
    }

    pub fn region(&self, id: RegionId) -> &RegionData {
        &self.regions[id.0 as usize]
    }

    pub fn value(&self, id: ValueId) -> &ValueData {
        &self.values[id.0 as usize]
    }

    pub fn value_ty(&self, id: ValueId) -> &Type {
        &self.values[id.0 as usize].ty
    }

    /// The root block holding top-level function definitions.
    pub fn root_block(&self) -> BlockId {
        self.region(self.body).blocks[0]
    }

    // ── Construction ──

    pub fn new_region(&mut self) -> RegionId {
        let id = RegionId(self.regions.len() as u32);
        self.regions.push(RegionData {
            blocks: Vec::new(),
            parent: None,
        });
        id
    }

    pub fn new_block(&mut self, region: RegionId) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(Some(BlockData {
            args: Vec::new(),
            ops: Vec::new(),
            parent: Some(region),
        }));
        self.regions[region.0 as usize].blocks.push(id);
        id
    }

    /// A region holding a single empty block with the given argument types.
    pub fn new_region_with_block(&mut self, arg_tys: &[Type]) -> RegionId {
        let region = self.new_region();
        let block = self.new_block(region);
        for ty in arg_tys {
            self.add_block_arg(block, ty.clone());
        }
        region
    }

    pub fn add_block_arg(&mut self, block: BlockId, ty: Type) -> ValueId {
        let index = self.block(block).args.len();
        let value = ValueId(self.values.len() as u32);
        self.values.push(ValueData {
            ty,
            def: ValueDef::BlockArg { block, index },
        });
        self.block_mut(block).args.push(value);
        value
    }

    /// Create a detached operation. Result values are created from the given
    /// types; owned regions are re-parented to the new op.
    pub fn create_op(
        &mut self,
        kind: OpKind,
        operands: Vec<ValueId>,
        result_tys: Vec<Type>,
        regions: Vec<RegionId>,
    ) -> OpId {
        let id = OpId(self.ops.len() as u32);
        let mut results = Vec::with_capacity(result_tys.len());
        for (index, ty) in result_tys.into_iter().enumerate() {
            let value = ValueId(self.values.len() as u32);
            self.values.push(ValueData {
                ty,
                def: ValueDef::OpResult { op: id, index },
            });
            results.push(value);
        }
        for &region in &regions {
            self.regions[region.0 as usize].parent = Some(id);
        }
        self.ops.push(Some(OpData {
            kind,
            operands,
            results,
            regions,
            parent: None,
        }));
        id
    }

    pub fn append_op(&mut self, block: BlockId, op: OpId) {
        debug_assert!(self.op(op).parent.is_none(), "op is already attached");
        self.op_mut(op).parent = Some(block);
        self.block_mut(block).ops.push(op);
    }

    /// Create an operation and append it to a block in one step.
    pub fn push_op(
        &mut self,
        block: BlockId,
        kind: OpKind,
        operands: Vec<ValueId>,
        result_tys: Vec<Type>,
        regions: Vec<RegionId>,
    ) -> OpId {
        let op = self.create_op(kind, operands, result_tys, regions);
        self.append_op(block, op);
        op
    }

    /// Sole result of an operation; panics if it has none.
    pub fn result(&self, op: OpId) -> ValueId {
        self.op(op).results[0]
    }

    // ── Structural mutation ──

    pub fn insert_op_before(&mut self, anchor: OpId, op: OpId) {
        let block = self.op(anchor).parent.expect("anchor must be attached");
        let pos = self.position_in_block(block, anchor);
        self.op_mut(op).parent = Some(block);
        self.block_mut(block).ops.insert(pos, op);
    }

    pub fn insert_op_after(&mut self, anchor: OpId, op: OpId) {
        let block = self.op(anchor).parent.expect("anchor must be attached");
        let pos = self.position_in_block(block, anchor);
        self.op_mut(op).parent = Some(block);
        self.block_mut(block).ops.insert(pos + 1, op);
    }

    fn position_in_block(&self, block: BlockId, op: OpId) -> usize {
        self.block(block)
            .ops
            .iter()
            .position(|&o| o == op)
            .expect("op not found in its parent block")
    }

    /// Detach a region from its owning operation, so it can be handed to a
    /// replacement op. The source op keeps an empty slot and is expected to
    /// be erased by the caller.
    pub fn take_region(&mut self, op: OpId, index: usize) -> RegionId {
        let region = self.op_mut(op).regions[index];
        self.op_mut(op).regions[index] = {
            // Leave a fresh empty region behind so the op stays structurally
            // consistent until it is erased.
            let placeholder = self.new_region();
            self.regions[placeholder.0 as usize].parent = Some(op);
            placeholder
        };
        self.regions[region.0 as usize].parent = None;
        region
    }

    /// Unlink an operation from its block and tombstone it together with all
    /// operations nested in its remaining regions.
    pub fn erase_op(&mut self, op: OpId) {
        if let Some(block) = self.op(op).parent {
            let pos = self.position_in_block(block, op);
            self.block_mut(block).ops.remove(pos);
        }
        self.erase_op_tree(op);
    }

    fn erase_op_tree(&mut self, op: OpId) {
        let data = match self.ops[op.0 as usize].take() {
            Some(data) => data,
            None => return,
        };
        for region in data.regions {
            let blocks = self.regions[region.0 as usize].blocks.clone();
            for block in blocks {
                if let Some(block_data) = self.blocks[block.0 as usize].take() {
                    for nested in block_data.ops {
                        self.erase_op_tree(nested);
                    }
                }
            }
        }
    }

    /// Rewire every use of `old` to `new` across all live operations.
    pub fn replace_all_uses(&mut self, old: ValueId, new: ValueId) {
        for slot in self.ops.iter_mut() {
            if let Some(op) = slot {
                for operand in op.operands.iter_mut() {
                    if *operand == old {
                        *operand = new;
                    }
                }
            }
        }
    }

    // ── Queries ──

    pub fn prev_op(&self, op: OpId) -> Option<OpId> {
        let block = self.op(op).parent?;
        let pos = self.position_in_block(block, op);
        if pos > 0 {
            Some(self.block(block).ops[pos - 1])
        } else {
            None
        }
    }

    pub fn next_op(&self, op: OpId) -> Option<OpId> {
        let block = self.op(op).parent?;
        let pos = self.position_in_block(block, op);
        self.block(block).ops.get(pos + 1).copied()
    }

    /// The operation owning the region that contains this op's block.
    pub fn parent_op(&self, op: OpId) -> Option<OpId> {
        let block = self.op(op).parent?;
        let region = self.block(block).parent?;
        self.region(region).parent
    }

    /// True if the op is live and reachable from the module root.
    pub fn is_attached(&self, op: OpId) -> bool {
        if !self.is_live(op) {
            return false;
        }
        let mut current = op;
        loop {
            let block = match self.op(current).parent {
                Some(b) => b,
                None => return false,
            };
            if self.blocks[block.0 as usize].is_none() {
                return false;
            }
            let region = match self.block(block).parent {
                Some(r) => r,
                None => return false,
            };
            if region == self.body {
                return true;
            }
            current = match self.region(region).parent {
                Some(p) if self.is_live(p) => p,
                _ => return false,
            };
        }
    }

    /// All live operations in deterministic pre-order: module root first,
    /// then each op before the contents of its regions.
    pub fn ops_preorder(&self) -> Vec<OpId> {
        let mut out = Vec::new();
        self.collect_region(self.body, &mut out);
        out
    }

    fn collect_region(&self, region: RegionId, out: &mut Vec<OpId>) {
        for &block in &self.region(region).blocks {
            if self.blocks[block.0 as usize].is_none() {
                continue;
            }
            for &op in &self.block(block).ops {
                out.push(op);
                for &nested in &self.op(op).regions {
                    self.collect_region(nested, out);
                }
            }
        }
    }

    /// Top-level function ops (either dialect), in definition order.
    pub fn funcs(&self) -> Vec<OpId> {
        self.block(self.root_block())
            .ops
            .iter()
            .copied()
            .filter(|&op| self.op(op).kind.func_name().is_some())
            .collect()
    }

    /// Look up a top-level function by symbol name.
    pub fn find_func(&self, name: &str) -> Option<OpId> {
        self.funcs()
            .into_iter()
            .find(|&op| self.op(op).kind.func_name() == Some(name))
    }

    /// Entry block of a function op.
    pub fn func_entry(&self, func: OpId) -> Result<BlockId> {
        let data = self.op(func);
        let region = *data
            .regions
            .first()
            .ok_or_else(|| Error::Verification("function op has no body region".into()))?;
        self.region(region)
            .blocks
            .first()
            .copied()
            .ok_or_else(|| Error::Verification("function body region has no block".into()))
    }
}
