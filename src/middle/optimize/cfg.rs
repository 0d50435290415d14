//! Control-flow passes

use std::collections::HashMap;

use crate::middle::ir::*;

use super::{predecessors, OptimizationPass};

/// Drop the phi edges in `target` that come from `from`
fn remove_phi_edges(func: &mut IRFunction, target: BlockId, from: BlockId) {
    if let Some(block) = func.get_block_mut(target) {
        for inst in &mut block.instructions {
            if let Instruction::Phi { incoming, .. } = inst {
                incoming.retain(|(_, b)| *b != from);
            }
        }
    }
}

// ==================== Simplify Branches ====================

/// Branches on constants, or to the same block twice, become jumps
#[derive(Default)]
pub struct SimplifyBranches;

impl OptimizationPass for SimplifyBranches {
    fn name(&self) -> &'static str {
        "simplify-branches"
    }

    fn run_on_function(&mut self, func: &mut IRFunction) -> bool {
        let mut changed = false;
        let mut dropped_edges = Vec::new();

        for block in &mut func.blocks {
            let Some(Terminator::Branch { cond, then_target, else_target }) = &block.terminator else {
                continue;
            };
            let (taken, not_taken) = if then_target == else_target {
                (*then_target, None)
            } else {
                match cond.as_constant().and_then(Constant::as_int) {
                    Some(0) => (*else_target, Some(*then_target)),
                    Some(_) => (*then_target, Some(*else_target)),
                    None => continue,
                }
            };
            if let Some(not_taken) = not_taken {
                dropped_edges.push((not_taken, block.id));
            }
            block.terminator = Some(Terminator::Jump { target: taken });
            changed = true;
        }

        for (target, from) in dropped_edges {
            remove_phi_edges(func, target, from);
        }
        changed
    }
}

// ==================== Unreachable Block Elimination ====================

/// Removes blocks not reachable from the entry block and renumbers the rest
#[derive(Default)]
pub struct UnreachableBlockElimination;

impl UnreachableBlockElimination {
    fn reachable(func: &IRFunction) -> Vec<bool> {
        let mut seen = vec![false; func.blocks.len()];
        let mut worklist = vec![func.entry_block];

        while let Some(id) = worklist.pop() {
            match seen.get_mut(id.0) {
                Some(flag) if !*flag => *flag = true,
                _ => continue,
            }
            if let Some(term) = func.get_block(id).and_then(|b| b.terminator.as_ref()) {
                worklist.extend(term.successors());
            }
        }
        seen
    }
}

impl OptimizationPass for UnreachableBlockElimination {
    fn name(&self) -> &'static str {
        "unreachable-block-elimination"
    }

    fn run_on_function(&mut self, func: &mut IRFunction) -> bool {
        let reachable = Self::reachable(func);
        if reachable.iter().all(|r| *r) {
            return false;
        }

        let mut remap = HashMap::new();
        let blocks = std::mem::take(&mut func.blocks);
        for (old, mut block) in blocks.into_iter().enumerate() {
            if !reachable[old] {
                continue;
            }
            let new = BlockId(func.blocks.len());
            remap.insert(BlockId(old), new);
            block.id = new;
            func.blocks.push(block);
        }

        for block in &mut func.blocks {
            for inst in &mut block.instructions {
                if let Instruction::Phi { incoming, .. } = inst {
                    incoming.retain_mut(|(_, from)| match remap.get(from) {
                        Some(new) => {
                            *from = *new;
                            true
                        }
                        None => false,
                    });
                }
            }
            if let Some(term) = &mut block.terminator {
                term.map_targets(|t| remap.get(&t).copied().unwrap_or(t));
            }
        }
        func.entry_block = remap.get(&func.entry_block).copied().unwrap_or(BlockId(0));
        true
    }
}

// ==================== Block Merging ====================

/// Folds a block into its only predecessor when that predecessor jumps to it
#[derive(Default)]
pub struct BlockMerging;

impl BlockMerging {
    fn candidate(func: &IRFunction) -> Option<(BlockId, BlockId)> {
        let preds = predecessors(func);
        func.blocks.iter().find_map(|block| {
            let Some(Terminator::Jump { target }) = block.terminator else {
                return None;
            };
            let single = preds.get(target.0).is_some_and(|p| p.len() == 1);
            (single && target != block.id && target != func.entry_block).then_some((block.id, target))
        })
    }
}

impl OptimizationPass for BlockMerging {
    fn name(&self) -> &'static str {
        "block-merging"
    }

    fn run_on_function(&mut self, func: &mut IRFunction) -> bool {
        let mut changed = false;

        while let Some((pred, succ)) = Self::candidate(func) {
            let Some(block) = func.get_block_mut(succ) else {
                break;
            };
            let mut moved = std::mem::take(&mut block.instructions);
            let term = block.terminator.replace(Terminator::Unreachable);

            // The only edge in makes every phi a copy
            for inst in &mut moved {
                if let Instruction::Phi { dest, incoming, .. } = inst {
                    let value = incoming.first().map(|(v, _)| v.clone()).unwrap_or(Value::Unit);
                    *inst = Instruction::Assign { dest: *dest, value };
                }
            }
            let successors = term.as_ref().map(Terminator::successors).unwrap_or_default();

            if let Some(block) = func.get_block_mut(pred) {
                block.instructions.append(&mut moved);
                block.terminator = term;
            }
            for s in successors {
                if let Some(block) = func.get_block_mut(s) {
                    for inst in &mut block.instructions {
                        if let Instruction::Phi { incoming, .. } = inst {
                            for (_, from) in incoming.iter_mut() {
                                if *from == succ {
                                    *from = pred;
                                }
                            }
                        }
                    }
                }
            }
            changed = true;
        }

        changed
    }
}
