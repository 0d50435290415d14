//! Stack slot passes
//!
//! Only slots whose address never escapes are touched: the alloca result is
//! used solely as the pointer operand of loads and stores.

use std::collections::{HashMap, HashSet};

use crate::middle::ir::*;

use super::OptimizationPass;

fn local_slots(func: &IRFunction) -> HashSet<Register> {
    let mut slots: HashSet<Register> = func
        .blocks
        .iter()
        .flat_map(|b| &b.instructions)
        .filter_map(|inst| match inst {
            Instruction::Alloca { dest, .. } => Some(*dest),
            _ => None,
        })
        .collect();

    for block in &func.blocks {
        for inst in &block.instructions {
            let escaping: Vec<&Value> = match inst {
                Instruction::Load { .. } => Vec::new(),
                Instruction::Store { value, .. } => vec![value],
                other => other.operands(),
            };
            for value in escaping {
                if let Some(r) = value.as_register() {
                    slots.remove(&r);
                }
            }
        }
        for value in block.terminator.iter().flat_map(|t| t.operands()) {
            if let Some(r) = value.as_register() {
                slots.remove(&r);
            }
        }
    }
    slots
}

fn slot_of(ptr: &Value, slots: &HashSet<Register>) -> Option<Register> {
    ptr.as_register().filter(|r| slots.contains(r))
}

// ==================== Store-to-Load Forwarding ====================

/// Replaces loads from local slots with the value last stored there.
///
/// Within a block the last store (or load) wins. A slot stored exactly once,
/// in the entry block, forwards that value to loads in every other block.
#[derive(Default)]
pub struct StoreToLoadForwarding;

impl StoreToLoadForwarding {
    fn forward_in_block(block: &mut BasicBlock, slots: &HashSet<Register>) -> bool {
        let mut changed = false;
        let mut known: HashMap<Register, Value> = HashMap::new();

        for inst in &mut block.instructions {
            let replacement = match &*inst {
                Instruction::Store { ptr, value, .. } => {
                    if let Some(slot) = slot_of(ptr, slots) {
                        known.insert(slot, value.clone());
                    }
                    None
                }
                Instruction::Load { dest, ptr, .. } => match slot_of(ptr, slots) {
                    Some(slot) => match known.get(&slot) {
                        Some(value) => Some(Instruction::Assign { dest: *dest, value: value.clone() }),
                        None => {
                            known.insert(slot, Value::Register(*dest));
                            None
                        }
                    },
                    None => None,
                },
                _ => None,
            };
            if let Some(replacement) = replacement {
                *inst = replacement;
                changed = true;
            }
        }
        changed
    }

    /// Slots with a single store, located in the entry block
    fn single_entry_stores(func: &IRFunction, slots: &HashSet<Register>) -> HashMap<Register, Value> {
        let mut stores: HashMap<Register, (usize, Option<Value>)> = HashMap::new();
        for block in &func.blocks {
            for inst in &block.instructions {
                if let Instruction::Store { ptr, value, .. } = inst {
                    if let Some(slot) = slot_of(ptr, slots) {
                        let entry = stores.entry(slot).or_insert((0, None));
                        entry.0 += 1;
                        if block.id == func.entry_block {
                            entry.1 = Some(value.clone());
                        }
                    }
                }
            }
        }
        stores
            .into_iter()
            .filter_map(|(slot, (count, value))| (count == 1).then_some(value).flatten().map(|v| (slot, v)))
            .collect()
    }
}

impl OptimizationPass for StoreToLoadForwarding {
    fn name(&self) -> &'static str {
        "store-to-load-forwarding"
    }

    fn run_on_function(&mut self, func: &mut IRFunction) -> bool {
        let slots = local_slots(func);
        if slots.is_empty() {
            return false;
        }

        let mut changed = false;
        for block in &mut func.blocks {
            changed |= Self::forward_in_block(block, &slots);
        }

        let single = Self::single_entry_stores(func, &slots);
        let entry = func.entry_block;
        for block in func.blocks.iter_mut().filter(|b| b.id != entry) {
            for inst in &mut block.instructions {
                let Instruction::Load { dest, ptr, .. } = &*inst else {
                    continue;
                };
                let Some(value) = slot_of(ptr, &slots).and_then(|s| single.get(&s)) else {
                    continue;
                };
                *inst = Instruction::Assign { dest: *dest, value: value.clone() };
                changed = true;
            }
        }
        changed
    }
}

// ==================== Dead Slot Elimination ====================

/// Removes local slots that are never loaded, with all their stores
#[derive(Default)]
pub struct DeadSlotElimination;

impl OptimizationPass for DeadSlotElimination {
    fn name(&self) -> &'static str {
        "dead-slot-elimination"
    }

    fn run_on_function(&mut self, func: &mut IRFunction) -> bool {
        let mut dead = local_slots(func);
        for inst in func.blocks.iter().flat_map(|b| &b.instructions) {
            if let Instruction::Load { ptr, .. } = inst {
                if let Some(r) = ptr.as_register() {
                    dead.remove(&r);
                }
            }
        }
        if dead.is_empty() {
            return false;
        }

        for block in &mut func.blocks {
            block.instructions.retain(|inst| match inst {
                Instruction::Alloca { dest, .. } => !dead.contains(dest),
                Instruction::Store { ptr, .. } => slot_of(ptr, &dead).is_none(),
                _ => true,
            });
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middle::builder::{IrBuilder, ModuleBuilder};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_forwarding_then_dead_slot() {
        let mut b = ModuleBuilder::new("m");
        let f = b.declare_function("f", vec![("x".into(), IRType::I32)], IRType::I32);
        b.enter_function(f).unwrap();
        let entry = b.append_block("entry").unwrap();
        let exit = b.append_block("exit").unwrap();
        b.set_insert_point(entry);
        let slot = b.create_entry_alloca(IRType::I32).unwrap();
        b.create_store(IRType::I32, Value::Parameter(0), slot.clone()).unwrap();
        b.create_br(exit).unwrap();
        b.set_insert_point(exit);
        let x = b.create_load(IRType::I32, slot).unwrap();
        b.create_ret(x.clone()).unwrap();
        let mut func = b.finish().functions.remove(0);

        assert!(StoreToLoadForwarding.run_on_function(&mut func));
        let dest = x.as_register().unwrap();
        assert_eq!(
            func.blocks[1].instructions[0],
            Instruction::Assign { dest, value: Value::Parameter(0) }
        );

        assert!(DeadSlotElimination.run_on_function(&mut func));
        assert!(func.blocks[0].instructions.is_empty());
    }

    #[test]
    fn test_escaping_slot_is_kept() {
        let mut b = ModuleBuilder::new("m");
        let f = b.declare_function("f", vec![], IRType::Void);
        b.enter_function(f).unwrap();
        let entry = b.append_block("entry").unwrap();
        b.set_insert_point(entry);
        let slot = b.create_entry_alloca(IRType::I32).unwrap();
        b.create_store(IRType::I32, Value::int(1), slot.clone()).unwrap();
        b.create_call("g", vec![slot], IRType::Void).unwrap();
        b.create_ret_void().unwrap();
        let mut func = b.finish().functions.remove(0);

        assert!(!DeadSlotElimination.run_on_function(&mut func));
        assert_eq!(func.blocks[0].instructions.len(), 3);
    }
}
