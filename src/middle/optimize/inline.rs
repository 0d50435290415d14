//! Module passes: inlining and declaration cleanup

use std::collections::{HashMap, HashSet};

use crate::middle::ir::*;

use super::{OptLevel, OptimizationPass, SizeLevel};

/// Inlined call sites allowed per caller, so mutual recursion terminates
const MAX_INLINES_PER_CALLER: usize = 32;

fn calls_itself(func: &IRFunction) -> bool {
    func.blocks
        .iter()
        .flat_map(|b| &b.instructions)
        .any(|inst| matches!(inst, Instruction::Call { func: callee, .. } if *callee == func.name))
}

/// Find the first call in `caller` that `eligible` accepts
fn find_site(
    caller: &IRFunction,
    eligible: &dyn Fn(&str) -> bool,
) -> Option<(BlockId, usize, String)> {
    caller.blocks.iter().find_map(|block| {
        block.instructions.iter().enumerate().find_map(|(i, inst)| match inst {
            Instruction::Call { func, .. } if *func != caller.name && eligible(func) => {
                Some((block.id, i, func.clone()))
            }
            _ => None,
        })
    })
}

/// Splice a copy of `callee` into `caller` at `block[index]`.
///
/// The block is split after the call; callee returns jump to the
/// continuation and the call result becomes a phi there.
fn inline_call(caller: &mut IRFunction, site: BlockId, index: usize, callee: &IRFunction) -> bool {
    let Some(block) = caller.get_block_mut(site) else {
        return false;
    };
    if index >= block.instructions.len() {
        return false;
    }
    let tail = block.instructions.split_off(index + 1);
    let Some(Instruction::Call { dest, args, ret, .. }) = block.instructions.pop() else {
        return false;
    };
    let term = block.terminator.take();

    // Continuation block takes over the tail and the old terminator
    let cont = caller.add_block(&format!("{}.cont", callee.name));
    let successors = term.as_ref().map(Terminator::successors).unwrap_or_default();
    if let Some(block) = caller.get_block_mut(cont) {
        block.instructions = tail;
        block.terminator = term;
    }
    for succ in successors {
        if let Some(block) = caller.get_block_mut(succ) {
            for inst in &mut block.instructions {
                if let Instruction::Phi { incoming, .. } = inst {
                    for (_, from) in incoming.iter_mut() {
                        if *from == site {
                            *from = cont;
                        }
                    }
                }
            }
        }
    }

    // Fresh blocks and registers for the callee body
    let mut block_map = HashMap::new();
    for block in &callee.blocks {
        let id = caller.add_block(&format!("{}.{}", callee.name, block.label));
        block_map.insert(block.id, id);
    }
    let mut reg_map = HashMap::new();
    for (i, ty) in callee.registers.iter().enumerate() {
        reg_map.insert(Register(i), caller.new_register(ty.clone()));
    }
    let map_value = |value: &Value| -> Value {
        match value {
            Value::Register(r) => reg_map.get(r).map(|r| Value::Register(*r)).unwrap_or(Value::Undef(IRType::Void)),
            Value::Parameter(i) => args.get(*i).cloned().unwrap_or(Value::Undef(IRType::Void)),
            other => other.clone(),
        }
    };

    let mut returns = Vec::new();
    let mut hoisted = Vec::new();
    for block in &callee.blocks {
        let new_id = block_map[&block.id];
        let mut instructions = Vec::with_capacity(block.instructions.len());
        for inst in &block.instructions {
            let mut inst = inst.clone();
            for operand in inst.operands_mut() {
                *operand = map_value(operand);
            }
            match &mut inst {
                Instruction::Assign { dest, .. }
                | Instruction::BinOp { dest, .. }
                | Instruction::Cmp { dest, .. }
                | Instruction::UnaryOp { dest, .. }
                | Instruction::Cast { dest, .. }
                | Instruction::Alloca { dest, .. }
                | Instruction::Load { dest, .. }
                | Instruction::Phi { dest, .. } => *dest = reg_map[&*dest],
                Instruction::Call { dest: Some(dest), .. } => *dest = reg_map[&*dest],
                Instruction::Call { dest: None, .. } | Instruction::Store { .. } => {}
            }
            if let Instruction::Phi { incoming, .. } = &mut inst {
                for (_, from) in incoming.iter_mut() {
                    *from = block_map[&*from];
                }
            }
            if matches!(inst, Instruction::Alloca { .. }) {
                hoisted.push(inst);
            } else {
                instructions.push(inst);
            }
        }

        let terminator = match &block.terminator {
            Some(Terminator::Return { value }) => {
                if let Some(value) = value {
                    returns.push((map_value(value), new_id));
                }
                Terminator::Jump { target: cont }
            }
            Some(term) => {
                let mut term = term.clone();
                for operand in term.operands_mut() {
                    *operand = map_value(operand);
                }
                term.map_targets(|t| block_map[&t]);
                term
            }
            None => Terminator::Unreachable,
        };
        if let Some(target) = caller.get_block_mut(new_id) {
            target.instructions = instructions;
            target.terminator = Some(terminator);
        }
    }

    if let Some(dest) = dest {
        let result = match returns.len() {
            1 => Instruction::Assign { dest, value: returns.remove(0).0 },
            _ => Instruction::Phi { dest, ty: ret, incoming: returns },
        };
        if let Some(block) = caller.get_block_mut(cont) {
            block.instructions.insert(0, result);
        }
    }

    let entry = caller.entry_block;
    if let Some(block) = caller.get_block_mut(entry) {
        let at = block
            .instructions
            .iter()
            .take_while(|i| matches!(i, Instruction::Alloca { .. }))
            .count();
        block.instructions.splice(at..at, hoisted);
    }

    let callee_entry = block_map[&callee.entry_block];
    if let Some(block) = caller.get_block_mut(site) {
        block.terminator = Some(Terminator::Jump { target: callee_entry });
    }
    true
}

/// Inline every eligible call site, callee snapshots taken per site
fn inline_module(module: &mut IRModule, eligible: impl Fn(&IRFunction) -> bool) -> bool {
    let candidates: HashSet<String> = module
        .functions
        .iter()
        .filter(|f| !f.is_declaration() && !calls_itself(f) && eligible(f))
        .map(|f| f.name.clone())
        .collect();
    if candidates.is_empty() {
        return false;
    }

    let mut changed = false;
    for index in 0..module.functions.len() {
        for _ in 0..MAX_INLINES_PER_CALLER {
            let is_candidate = |name: &str| candidates.contains(name);
            let Some((block, i, name)) = find_site(&module.functions[index], &is_candidate) else {
                break;
            };
            let Some(callee) = module.function(&name).cloned() else {
                break;
            };
            if !inline_call(&mut module.functions[index], block, i, &callee) {
                break;
            }
            log::trace!("inlined {} into {}", name, module.functions[index].name);
            changed = true;
        }
    }
    changed
}

// ==================== Inliners ====================

/// Inlines functions declared `inline`
#[derive(Default)]
pub struct AlwaysInliner;

impl OptimizationPass for AlwaysInliner {
    fn name(&self) -> &'static str {
        "always-inline"
    }

    fn run_on_module(&mut self, module: &mut IRModule) -> bool {
        inline_module(module, |f| f.always_inline)
    }

    fn run_on_function(&mut self, _func: &mut IRFunction) -> bool {
        false
    }
}

/// Inlines `inline` functions and every callee under an instruction budget
pub struct CostInliner {
    budget: usize,
}

impl CostInliner {
    pub fn new(opt: OptLevel, size: SizeLevel) -> Self {
        let budget = match (opt.0, size.0) {
            (_, 2) => 8,
            (_, 1) => 20,
            (0..=2, _) => 40,
            _ => 100,
        };
        Self { budget }
    }
}

impl OptimizationPass for CostInliner {
    fn name(&self) -> &'static str {
        "inline"
    }

    fn run_on_module(&mut self, module: &mut IRModule) -> bool {
        let budget = self.budget;
        inline_module(module, |f| f.always_inline || f.instruction_count() <= budget)
    }

    fn run_on_function(&mut self, _func: &mut IRFunction) -> bool {
        false
    }
}

// ==================== Unused Declaration Elimination ====================

/// Drops body-less functions nothing refers to
#[derive(Default)]
pub struct UnusedDeclarationElimination;

impl OptimizationPass for UnusedDeclarationElimination {
    fn name(&self) -> &'static str {
        "unused-declaration-elimination"
    }

    fn run_on_module(&mut self, module: &mut IRModule) -> bool {
        let mut referenced = HashSet::new();
        for block in module.functions.iter().flat_map(|f| &f.blocks) {
            for inst in &block.instructions {
                if let Instruction::Call { func, .. } = inst {
                    referenced.insert(func.clone());
                }
                for value in inst.operands() {
                    if let Value::Function(name) = value {
                        referenced.insert(name.clone());
                    }
                }
            }
        }

        let before = module.functions.len();
        module
            .functions
            .retain(|f| !f.is_declaration() || referenced.contains(&f.name));
        module.functions.len() != before
    }

    fn run_on_function(&mut self, _func: &mut IRFunction) -> bool {
        false
    }
}
