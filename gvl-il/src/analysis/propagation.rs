use std::collections::{HashMap, HashSet, VecDeque};

use crate::function::Function;
use crate::ids::{BlockId, ValueId};
use crate::instruction::Instruction;
use crate::opcode::Opcode;

/// A loop whose header gets re-visited this many times without its lattice
/// values settling is treated as overdefined rather than iterated further.
/// Guards against non-terminating fixpoint search on malformed or
/// adversarial CFGs fed in from an untrusted bytecode module.
pub const LOOP_ITERATION_CAP: u32 = 128;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LatticeValue {
    /// No facts reached this value yet.
    Unknown,
    Constant(u64),
    /// Proven to vary across executions; folding is unsound.
    Overdefined,
}

impl LatticeValue {
    fn meet(self, other: LatticeValue) -> LatticeValue {
        match (self, other) {
            (LatticeValue::Unknown, x) | (x, LatticeValue::Unknown) => x,
            (LatticeValue::Constant(a), LatticeValue::Constant(b)) if a == b => {
                LatticeValue::Constant(a)
            }
            _ => LatticeValue::Overdefined,
        }
    }
}

/// Outcome of folding a single instruction against the current lattice,
/// returned by [`PropagateInstruction::propagate`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PropagationResult {
    /// The instruction's operands don't carry enough information yet.
    None,
    /// This opcode is outside what the folder understands; treat its result
    /// as having no lattice contribution of its own (distinct from
    /// `Overdefined`, which actively poisons dependents through control
    /// flow such as branch conditions).
    Ignore,
    Mapped(u64),
    Overdefined,
    /// Proven to differ from call to call even though every operand is
    /// constant (resource loads, invocation ids) -- never collapse to a
    /// single constant regardless of how the worklist revisits it.
    Varying,
}

/// Per-opcode constant-folding rule, looked up by the engine for every
/// worklist instruction. The default table below covers scalar arithmetic,
/// comparisons and the `Literal` pseudo-op; pass authors can supply their
/// own opcodes (resource-load invariance rules, e.g.) by implementing this
/// on a custom type and building the engine with `with_folder`.
pub trait PropagateInstruction {
    fn propagate(&self, inst: &Instruction, operand: impl Fn(ValueId) -> LatticeValue) -> PropagationResult;
}

pub struct DefaultFolder;

impl PropagateInstruction for DefaultFolder {
    fn propagate(&self, inst: &Instruction, operand: impl Fn(ValueId) -> LatticeValue) -> PropagationResult {
        match inst.opcode {
            Opcode::Literal => inst
                .immediates
                .first()
                .map(|v| PropagationResult::Mapped(*v))
                .unwrap_or(PropagationResult::None),
            Opcode::LoadBuffer | Opcode::LoadTexture | Opcode::ResourceSize => PropagationResult::Varying,
            Opcode::Add
            | Opcode::Sub
            | Opcode::Mul
            | Opcode::Div
            | Opcode::BitAnd
            | Opcode::BitOr
            | Opcode::BitShiftLeft
            | Opcode::BitShiftRight
            | Opcode::And
            | Opcode::Or
            | Opcode::Equal
            | Opcode::NotEqual
            | Opcode::LessThan
            | Opcode::LessThanEqual
            | Opcode::GreaterThan
            | Opcode::GreaterThanEqual => fold_binary(inst, operand),
            _ => PropagationResult::Ignore,
        }
    }
}

fn fold_binary(inst: &Instruction, operand: impl Fn(ValueId) -> LatticeValue) -> PropagationResult {
    if inst.operands.len() != 2 {
        return PropagationResult::Ignore;
    }
    let lhs = operand(inst.operands[0]);
    let rhs = operand(inst.operands[1]);
    match (lhs, rhs) {
        (LatticeValue::Overdefined, _) | (_, LatticeValue::Overdefined) => PropagationResult::Overdefined,
        (LatticeValue::Constant(a), LatticeValue::Constant(b)) => {
            if inst.opcode == Opcode::Div && b == 0 {
                return PropagationResult::Overdefined;
            }
            let result = match inst.opcode {
                Opcode::Add => a.wrapping_add(b),
                Opcode::Sub => a.wrapping_sub(b),
                Opcode::Mul => a.wrapping_mul(b),
                Opcode::Div => a / b,
                Opcode::BitAnd => a & b,
                Opcode::BitOr => a | b,
                Opcode::BitShiftLeft => a.wrapping_shl(b as u32),
                Opcode::BitShiftRight => a.wrapping_shr(b as u32),
                Opcode::And => ((a != 0) && (b != 0)) as u64,
                Opcode::Or => ((a != 0) || (b != 0)) as u64,
                Opcode::Equal => (a == b) as u64,
                Opcode::NotEqual => (a != b) as u64,
                Opcode::LessThan => (a < b) as u64,
                Opcode::LessThanEqual => (a <= b) as u64,
                Opcode::GreaterThan => (a > b) as u64,
                Opcode::GreaterThanEqual => (a >= b) as u64,
                _ => return PropagationResult::Ignore,
            };
            PropagationResult::Mapped(result)
        }
        _ => PropagationResult::None,
    }
}

/// Sparse conditional constant propagation over one function: a worklist of
/// executable CFG edges and a worklist of SSA def-use edges, each processed
/// until both drain. Only blocks reached via an executable edge are
/// evaluated, so dead branches never poison the lattice of code that
/// dominates them.
pub struct PropagationEngine<'f, F: PropagateInstruction> {
    function: &'f Function,
    folder: F,
    lattice: HashMap<ValueId, LatticeValue>,
    executable_edges: HashSet<(BlockId, BlockId)>,
    executable_blocks: HashSet<BlockId>,
    block_worklist: VecDeque<BlockId>,
    ssa_worklist: VecDeque<ValueId>,
    visits: HashMap<BlockId, u32>,
}

impl<'f> PropagationEngine<'f, DefaultFolder> {
    pub fn new(function: &'f Function) -> Self {
        Self::with_folder(function, DefaultFolder)
    }
}

impl<'f, F: PropagateInstruction> PropagationEngine<'f, F> {
    pub fn with_folder(function: &'f Function, folder: F) -> Self {
        let mut engine = PropagationEngine {
            function,
            folder,
            lattice: HashMap::new(),
            executable_edges: HashSet::new(),
            executable_blocks: HashSet::new(),
            block_worklist: VecDeque::new(),
            ssa_worklist: VecDeque::new(),
            visits: HashMap::new(),
        };
        engine.executable_blocks.insert(function.entry);
        engine.block_worklist.push_back(function.entry);
        engine
    }

    fn lattice_of(&self, value: ValueId) -> LatticeValue {
        self.lattice.get(&value).copied().unwrap_or(LatticeValue::Unknown)
    }

    fn set_lattice(&mut self, value: ValueId, new_value: LatticeValue) {
        let merged = self.lattice_of(value).meet(new_value);
        if merged != self.lattice_of(value) {
            self.lattice.insert(value, merged);
            self.ssa_worklist.push_back(value);
        }
    }

    pub fn run(mut self) -> HashMap<ValueId, LatticeValue> {
        while !self.block_worklist.is_empty() || !self.ssa_worklist.is_empty() {
            while let Some(block_id) = self.block_worklist.pop_front() {
                self.visit_block(block_id);
            }
            while let Some(value) = self.ssa_worklist.pop_front() {
                self.revisit_users(value);
            }
        }
        self.lattice
    }

    fn visit_block(&mut self, block_id: BlockId) {
        let count = self.visits.entry(block_id).or_insert(0);
        *count += 1;
        if *count > LOOP_ITERATION_CAP {
            self.widen_block_to_overdefined(block_id);
            return;
        }
        let Some(block) = self.function.block(block_id) else { return };
        for inst in &block.instructions {
            self.evaluate(inst);
        }
        self.queue_successor_edges(block_id);
    }

    /// A block revisited past the iteration cap gets every result it defines
    /// forced to `Overdefined` rather than left at whatever `Constant` a
    /// stale earlier visit computed -- a loop that never settles must not
    /// leave behind lattice values a downstream fold would treat as proven.
    fn widen_block_to_overdefined(&mut self, block_id: BlockId) {
        let Some(block) = self.function.block(block_id) else { return };
        for inst in &block.instructions {
            if inst.result.is_valid() {
                self.set_lattice(inst.result, LatticeValue::Overdefined);
            }
        }
        self.queue_successor_edges(block_id);
    }

    fn queue_successor_edges(&mut self, block_id: BlockId) {
        let Some(block) = self.function.block(block_id) else { return };
        let successors = block.successors();
        let targets = self.resolve_branch_targets(block, &successors);
        for succ in targets {
            if self.executable_edges.insert((block_id, succ)) {
                // Re-queue even if `succ` was already executable: a newly
                // live predecessor edge can change what its phis merge.
                self.executable_blocks.insert(succ);
                self.block_worklist.push_back(succ);
            }
        }
    }

    /// A conditional branch whose condition has collapsed to a known
    /// constant only makes its taken arm's edge executable -- this is what
    /// lets dead-branch code stay unevaluated instead of poisoning the
    /// lattice of the live path.
    fn resolve_branch_targets(&self, block: &crate::block::BasicBlock, successors: &[BlockId]) -> Vec<BlockId> {
        match block.terminator().map(|t| t.opcode) {
            Some(Opcode::BranchConditional) => {
                let term = block.terminator().unwrap();
                let cond = term.operands.first().copied();
                match cond.map(|c| self.lattice_of(c)) {
                    Some(LatticeValue::Constant(0)) => successors.get(1).cloned().into_iter().collect(),
                    Some(LatticeValue::Constant(_)) => successors.get(0).cloned().into_iter().collect(),
                    _ => successors.to_vec(),
                }
            }
            _ => successors.to_vec(),
        }
    }

    fn evaluate(&mut self, inst: &Instruction) {
        if !inst.result.is_valid() {
            return;
        }
        if inst.is_phi() {
            self.evaluate_phi(inst);
            return;
        }
        let lattice = &self.lattice;
        let result = self.folder.propagate(inst, |v| {
            lattice.get(&v).copied().unwrap_or(LatticeValue::Unknown)
        });
        match result {
            PropagationResult::Mapped(v) => self.set_lattice(inst.result, LatticeValue::Constant(v)),
            PropagationResult::Overdefined => self.set_lattice(inst.result, LatticeValue::Overdefined),
            PropagationResult::Varying => self.set_lattice(inst.result, LatticeValue::Overdefined),
            PropagationResult::None | PropagationResult::Ignore => {}
        }
    }

    /// Merges only the operands arriving along executable predecessor edges
    /// -- an unreachable predecessor's value must not drag a live phi result
    /// down to `Overdefined`.
    fn evaluate_phi(&mut self, inst: &Instruction) {
        let preds = self.function.predecessors(self.containing_block(inst.result));
        let mut merged = LatticeValue::Unknown;
        for (i, operand) in inst.operands.iter().enumerate() {
            let Some(pred) = preds.get(i) else { break };
            if !self.executable_edges.contains(&(*pred, self.containing_block(inst.result))) {
                continue;
            }
            merged = merged.meet(self.lattice_of(*operand));
        }
        self.set_lattice(inst.result, merged);
    }

    fn containing_block(&self, value: ValueId) -> BlockId {
        for block in &self.function.blocks {
            if block.instructions.iter().any(|i| i.result == value) {
                return block.id;
            }
        }
        BlockId::INVALID
    }

    fn revisit_users(&mut self, value: ValueId) {
        let users: Vec<BlockId> = self
            .function
            .blocks
            .iter()
            .filter(|b| self.executable_blocks.contains(&b.id))
            .filter(|b| b.instructions.iter().any(|i| i.operands.contains(&value)))
            .map(|b| b.id)
            .collect();
        for block_id in users {
            if let Some(block) = self.function.block(block_id) {
                for inst in &block.instructions {
                    if inst.operands.contains(&value) {
                        self.evaluate(inst);
                    }
                }
            }
        }
    }
}
