//! IR Optimizer for Ember
//!
//! A façade over a catalog of passes. [`Optimizer::new`] picks a function
//! pipeline and a module pipeline for the requested `(opt, size)` levels;
//! [`Optimizer::optimize`] runs them with verification on both sides.

mod cfg;
mod inline;
mod memory;
mod scalar;

use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;

use crate::middle::ir::*;
use crate::middle::verify::verify_module;
use crate::utils::Result;

pub use cfg::{BlockMerging, SimplifyBranches, UnreachableBlockElimination};
pub use inline::{AlwaysInliner, CostInliner, UnusedDeclarationElimination};
pub use memory::{DeadSlotElimination, StoreToLoadForwarding};
pub use scalar::{AlgebraicSimplification, ConstantFolding, CopyPropagation, DeadInstructionElimination};

/// Rounds of the function pipeline before giving up on a fixed point
const MAX_ITERATIONS: usize = 10;

/// Speed optimization level, `0..=3`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct OptLevel(pub u8);

/// Size optimization level, `0..=2`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SizeLevel(pub u8);

impl OptLevel {
    /// Parse `0`..`3`, `s` or `z` into a level pair
    pub fn parse(s: &str) -> Option<(OptLevel, SizeLevel)> {
        match s {
            "0" | "1" | "2" | "3" => s.parse().ok().map(|n| (OptLevel(n), SizeLevel(0))),
            "s" => Some((OptLevel(2), SizeLevel(1))),
            "z" => Some((OptLevel(2), SizeLevel(2))),
            _ => None,
        }
    }
}

impl fmt::Display for OptLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "O{}", self.0)
    }
}

/// Optimization pass trait
pub trait OptimizationPass: Send {
    /// Name of the optimization pass
    fn name(&self) -> &'static str;

    /// Run the pass on a module; by default on every defined function
    fn run_on_module(&mut self, module: &mut IRModule) -> bool {
        let mut changed = false;
        for func in module.functions.iter_mut().filter(|f| !f.is_declaration()) {
            changed |= self.run_on_function(func);
        }
        changed
    }

    /// Run the pass on a function
    fn run_on_function(&mut self, func: &mut IRFunction) -> bool;
}

// ==================== Shared helpers ====================

/// Rewrite every use of the mapped registers; reports whether anything changed
pub(crate) fn replace_uses(func: &mut IRFunction, map: &HashMap<Register, Value>) -> bool {
    let mut changed = false;
    let mut rewrite = |value: &mut Value| {
        if let Some(new) = value.as_register().and_then(|r| map.get(&r)) {
            *value = new.clone();
            changed = true;
        }
    };
    for block in &mut func.blocks {
        for inst in &mut block.instructions {
            inst.operands_mut().into_iter().for_each(&mut rewrite);
        }
        if let Some(term) = &mut block.terminator {
            term.operands_mut().into_iter().for_each(&mut rewrite);
        }
    }
    changed
}

/// Predecessor edges of every block, one entry per edge
pub(crate) fn predecessors(func: &IRFunction) -> Vec<Vec<BlockId>> {
    let mut preds = vec![Vec::new(); func.blocks.len()];
    for block in &func.blocks {
        for succ in block.terminator.iter().flat_map(Terminator::successors) {
            if let Some(list) = preds.get_mut(succ.0) {
                list.push(block.id);
            }
        }
    }
    preds
}

// ==================== Pass catalog ====================

type PassConstructor = fn(OptLevel, SizeLevel) -> Box<dyn OptimizationPass>;

static CATALOG: Lazy<HashMap<&'static str, PassConstructor>> = Lazy::new(|| {
    let mut catalog: HashMap<&'static str, PassConstructor> = HashMap::new();
    catalog.insert("constant-folding", |_, _| Box::new(ConstantFolding));
    catalog.insert("algebraic-simplification", |_, _| Box::new(AlgebraicSimplification));
    catalog.insert("copy-propagation", |_, _| Box::new(CopyPropagation));
    catalog.insert("simplify-branches", |_, _| Box::new(SimplifyBranches));
    catalog.insert("unreachable-block-elimination", |_, _| Box::new(UnreachableBlockElimination));
    catalog.insert("block-merging", |_, _| Box::new(BlockMerging));
    catalog.insert("dead-instruction-elimination", |_, _| Box::new(DeadInstructionElimination));
    catalog.insert("store-to-load-forwarding", |_, _| Box::new(StoreToLoadForwarding));
    catalog.insert("dead-slot-elimination", |_, _| Box::new(DeadSlotElimination));
    catalog.insert("always-inline", |_, _| Box::new(AlwaysInliner));
    catalog.insert("inline", |opt, size| Box::new(CostInliner::new(opt, size)));
    catalog.insert("unused-declaration-elimination", |_, _| Box::new(UnusedDeclarationElimination));
    log::debug!("registered {} optimization passes", catalog.len());
    catalog
});

/// Instantiate a pass by name
pub fn create_pass(name: &str, opt: OptLevel, size: SizeLevel) -> Option<Box<dyn OptimizationPass>> {
    CATALOG.get(name).map(|ctor| ctor(opt, size))
}

fn function_pipeline(opt: OptLevel) -> Vec<&'static str> {
    let mut names = Vec::new();
    if opt >= OptLevel(2) {
        names.extend(["store-to-load-forwarding", "dead-slot-elimination"]);
    }
    if opt >= OptLevel(1) {
        names.extend([
            "constant-folding",
            "algebraic-simplification",
            "copy-propagation",
            "simplify-branches",
            "unreachable-block-elimination",
            "block-merging",
            "dead-instruction-elimination",
        ]);
    }
    names
}

fn module_pipeline(opt: OptLevel) -> Vec<&'static str> {
    let inliner = if opt < OptLevel(2) { "always-inline" } else { "inline" };
    vec![inliner, "unused-declaration-elimination"]
}

// ==================== Optimizer ====================

/// The optimizer - runs optimization passes
pub struct Optimizer {
    opt: OptLevel,
    function_passes: Vec<Box<dyn OptimizationPass>>,
    module_passes: Vec<Box<dyn OptimizationPass>>,
}

impl Optimizer {
    pub fn new(opt: OptLevel, size: SizeLevel) -> Self {
        let build = |names: Vec<&'static str>| -> Vec<Box<dyn OptimizationPass>> {
            names.into_iter().filter_map(|n| create_pass(n, opt, size)).collect()
        };
        Self {
            opt,
            function_passes: build(function_pipeline(opt)),
            module_passes: build(module_pipeline(opt)),
        }
    }

    /// Names of the function pipeline, in order
    pub fn function_pass_names(&self) -> Vec<&'static str> {
        self.function_passes.iter().map(|p| p.name()).collect()
    }

    pub fn module_pass_names(&self) -> Vec<&'static str> {
        self.module_passes.iter().map(|p| p.name()).collect()
    }

    /// Run both pipelines, verifying the module before and after
    pub fn optimize(&mut self, module: &mut IRModule) -> Result<()> {
        verify_module(module)?;
        log::debug!(
            "optimizing {} at {}: [{}] then [{}]",
            module.name,
            self.opt,
            self.function_pass_names().join(", "),
            self.module_pass_names().join(", ")
        );

        self.run_function_pipeline(module);
        for pass in &mut self.module_passes {
            if pass.run_on_module(module) {
                log::trace!("{}: {} changed the module", module.name, pass.name());
            }
        }
        if self.opt >= OptLevel(1) {
            self.run_function_pipeline(module);
        }

        verify_module(module)
    }

    /// Iterate the function passes to a fixed point, per function
    fn run_function_pipeline(&mut self, module: &mut IRModule) {
        if self.function_passes.is_empty() {
            return;
        }
        for func in module.functions.iter_mut().filter(|f| !f.is_declaration()) {
            let mut iteration = 0;
            let mut changed = true;
            while changed && iteration < MAX_ITERATIONS {
                changed = false;
                for pass in &mut self.function_passes {
                    if pass.run_on_function(func) {
                        log::trace!("{}: {} changed", func.name, pass.name());
                        changed = true;
                    }
                }
                iteration += 1;
            }
        }
    }
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::new(OptLevel(2), SizeLevel(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middle::builder::{IrBuilder, ModuleBuilder};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_level_parsing() {
        assert_eq!(OptLevel::parse("0"), Some((OptLevel(0), SizeLevel(0))));
        assert_eq!(OptLevel::parse("3"), Some((OptLevel(3), SizeLevel(0))));
        assert_eq!(OptLevel::parse("s"), Some((OptLevel(2), SizeLevel(1))));
        assert_eq!(OptLevel::parse("z"), Some((OptLevel(2), SizeLevel(2))));
        assert_eq!(OptLevel::parse("4"), None);
        assert_eq!(OptLevel::parse("fast"), None);
    }

    #[test]
    fn test_catalog_is_complete() {
        for opt in 0..=3 {
            let names = function_pipeline(OptLevel(opt))
                .into_iter()
                .chain(module_pipeline(OptLevel(opt)));
            for name in names {
                assert!(create_pass(name, OptLevel(opt), SizeLevel(0)).is_some(), "{} missing", name);
            }
        }
        assert_eq!(CATALOG.len(), 12);
    }

    #[test]
    fn test_pipelines_by_level() {
        let o0 = Optimizer::new(OptLevel(0), SizeLevel(0));
        assert!(o0.function_pass_names().is_empty());
        assert_eq!(o0.module_pass_names(), vec!["always-inline", "unused-declaration-elimination"]);

        let o1 = Optimizer::new(OptLevel(1), SizeLevel(0));
        assert!(!o1.function_pass_names().contains(&"store-to-load-forwarding"));

        let o2 = Optimizer::new(OptLevel(2), SizeLevel(0));
        assert!(o2.function_pass_names().contains(&"dead-slot-elimination"));
        assert_eq!(o2.module_pass_names()[0], "inline");
    }

    #[test]
    fn test_slot_round_trip_folds_at_o2() {
        // slot = alloca; store 1 + 2; ret load slot
        let mut b = ModuleBuilder::new("m");
        let f = b.declare_function("f", vec![], IRType::I32);
        b.enter_function(f).unwrap();
        let entry = b.append_block("entry").unwrap();
        b.set_insert_point(entry);
        let slot = b.create_entry_alloca(IRType::I32).unwrap();
        let sum = b.create_binop(BinOp::Add, IRType::I32, Value::int(1), Value::int(2)).unwrap();
        b.create_store(IRType::I32, sum, slot.clone()).unwrap();
        let v = b.create_load(IRType::I32, slot).unwrap();
        b.create_ret(v).unwrap();
        let mut module = b.finish();

        Optimizer::new(OptLevel(2), SizeLevel(0)).optimize(&mut module).unwrap();
        let f = &module.functions[0];
        assert!(f.blocks[0].instructions.is_empty());
        assert_eq!(f.blocks[0].terminator, Some(Terminator::Return { value: Some(Value::int(3)) }));
    }

    #[test]
    fn test_invalid_module_is_rejected() {
        let mut b = ModuleBuilder::new("m");
        let f = b.declare_function("f", vec![], IRType::I32);
        b.enter_function(f).unwrap();
        b.append_block("entry").unwrap();
        let mut module = b.finish();
        let err = Optimizer::default().optimize(&mut module).unwrap_err();
        assert_eq!(err.tag(), "InternalInvariant");
    }
}
