//! Instruction-level passes

use std::collections::{HashMap, HashSet};

use crate::middle::fold;
use crate::middle::ir::*;

use super::{replace_uses, OptimizationPass};

// ==================== Constant Folding ====================

/// Folds operations whose operands are all constants
#[derive(Default)]
pub struct ConstantFolding;

impl ConstantFolding {
    fn fold(inst: &Instruction) -> Option<Constant> {
        match inst {
            Instruction::BinOp { op, ty, left: Value::Constant(l), right: Value::Constant(r), .. } => {
                fold::binop(*op, ty, l, r)
            }
            Instruction::Cmp { pred, ty, left: Value::Constant(l), right: Value::Constant(r), .. } => {
                fold::cmp(*pred, ty, l, r)
            }
            Instruction::UnaryOp { op, ty, value: Value::Constant(c), .. } => fold::unary(*op, ty, c),
            Instruction::Cast { op, value: Value::Constant(c), from, to, .. } => fold::cast(*op, c, from, to),
            _ => None,
        }
    }
}

impl OptimizationPass for ConstantFolding {
    fn name(&self) -> &'static str {
        "constant-folding"
    }

    fn run_on_function(&mut self, func: &mut IRFunction) -> bool {
        let mut changed = false;

        for block in &mut func.blocks {
            for inst in &mut block.instructions {
                let (Some(dest), Some(result)) = (inst.dest(), Self::fold(inst)) else {
                    continue;
                };
                *inst = Instruction::Assign {
                    dest,
                    value: Value::Constant(result),
                };
                changed = true;
            }
        }

        changed
    }
}

// ==================== Algebraic Simplification ====================

/// Integer identities: `x + 0`, `x * 1`, `x * 0`, `x - x` and friends
#[derive(Default)]
pub struct AlgebraicSimplification;

impl AlgebraicSimplification {
    fn simplify(inst: &Instruction) -> Option<Value> {
        let Instruction::BinOp { op, ty, left, right, .. } = inst else {
            return None;
        };
        if !ty.is_integer() || *ty == IRType::Bool {
            return None;
        }
        let int = |v: &Value| match v {
            Value::Constant(Constant::Int(n)) => Some(*n),
            _ => None,
        };
        let zero = Value::int(0);
        // constants go on the right of commutative operators
        let (left, right) = if op.is_commutative() && int(left).is_some() && int(right).is_none() {
            (right, left)
        } else {
            (left, right)
        };

        match (op, int(left), int(right)) {
            (BinOp::Add | BinOp::Sub | BinOp::Or | BinOp::Xor | BinOp::Shl | BinOp::AShr | BinOp::LShr, _, Some(0)) => {
                Some(left.clone())
            }
            (BinOp::Mul | BinOp::SDiv | BinOp::UDiv, _, Some(1)) => Some(left.clone()),
            (BinOp::Mul | BinOp::And, _, Some(0)) => Some(zero),
            (BinOp::SRem | BinOp::URem, _, Some(1)) => Some(zero),
            (BinOp::Sub | BinOp::Xor, _, _) if left == right && left.as_register().is_some() => Some(zero),
            (BinOp::And | BinOp::Or, _, _) if left == right && left.as_register().is_some() => Some(left.clone()),
            _ => None,
        }
    }
}

impl OptimizationPass for AlgebraicSimplification {
    fn name(&self) -> &'static str {
        "algebraic-simplification"
    }

    fn run_on_function(&mut self, func: &mut IRFunction) -> bool {
        let mut changed = false;

        for block in &mut func.blocks {
            for inst in &mut block.instructions {
                let (Some(dest), Some(value)) = (inst.dest(), Self::simplify(inst)) else {
                    continue;
                };
                *inst = Instruction::Assign { dest, value };
                changed = true;
            }
        }

        changed
    }
}

// ==================== Copy Propagation ====================

/// Replaces uses of `dest = value` copies (and trivial phis) with the value
#[derive(Default)]
pub struct CopyPropagation;

impl CopyPropagation {
    fn copies(func: &IRFunction) -> HashMap<Register, Value> {
        let mut copies = HashMap::new();
        for inst in func.blocks.iter().flat_map(|b| &b.instructions) {
            match inst {
                Instruction::Assign { dest, value } if *value != Value::Register(*dest) => {
                    copies.insert(*dest, value.clone());
                }
                Instruction::Phi { dest, incoming, .. } => {
                    let mut values = incoming
                        .iter()
                        .map(|(v, _)| v)
                        .filter(|v| **v != Value::Register(*dest));
                    if let Some(first) = values.next() {
                        if values.all(|v| v == first) {
                            copies.insert(*dest, first.clone());
                        }
                    }
                }
                _ => {}
            }
        }

        // Resolve chains; a cycle of copies is left alone
        let keys: Vec<Register> = copies.keys().copied().collect();
        for reg in keys {
            let mut value = copies[&reg].clone();
            let mut seen = HashSet::from([reg]);
            while let Some(next) = value.as_register().and_then(|r| copies.get(&r)) {
                let Some(r) = value.as_register() else { break };
                if !seen.insert(r) {
                    break;
                }
                value = next.clone();
            }
            if value.as_register().is_some_and(|r| seen.contains(&r)) {
                copies.remove(&reg);
            } else {
                copies.insert(reg, value);
            }
        }
        copies
    }
}

impl OptimizationPass for CopyPropagation {
    fn name(&self) -> &'static str {
        "copy-propagation"
    }

    fn run_on_function(&mut self, func: &mut IRFunction) -> bool {
        let copies = Self::copies(func);
        if copies.is_empty() {
            return false;
        }
        replace_uses(func, &copies)
    }
}

// ==================== Dead Instruction Elimination ====================

/// Removes side-effect free instructions whose result is never used
#[derive(Default)]
pub struct DeadInstructionElimination;

impl DeadInstructionElimination {
    fn used_registers(func: &IRFunction) -> HashSet<Register> {
        let mut used = HashSet::new();
        for block in &func.blocks {
            let operands = block
                .instructions
                .iter()
                .flat_map(|i| i.operands())
                .chain(block.terminator.iter().flat_map(|t| t.operands()));
            used.extend(operands.filter_map(Value::as_register));
        }
        used
    }
}

impl OptimizationPass for DeadInstructionElimination {
    fn name(&self) -> &'static str {
        "dead-instruction-elimination"
    }

    fn run_on_function(&mut self, func: &mut IRFunction) -> bool {
        let mut changed = false;
        loop {
            let used = Self::used_registers(func);
            let mut removed = false;
            for block in &mut func.blocks {
                let before = block.instructions.len();
                block.instructions.retain(|inst| match inst.dest() {
                    Some(dest) => inst.has_side_effects() || used.contains(&dest),
                    None => true,
                });
                removed |= block.instructions.len() != before;
            }
            if !removed {
                return changed;
            }
            changed = true;
        }
    }
}
