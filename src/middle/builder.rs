//! Instruction builder over an [`IRModule`]
//!
//! Codegen and the type operations talk to the IR only through the
//! [`IrBuilder`] trait; [`ModuleBuilder`] is the implementation that
//! appends to an in-memory module.

use crate::middle::ir::*;
use crate::utils::{Error, Result};

/// Cursor-based IR construction interface
pub trait IrBuilder {
    /// Declare a function if absent and return its index in the module
    fn declare_function(&mut self, name: &str, params: Vec<(String, IRType)>, ret: IRType) -> usize;

    /// Select the function subsequent blocks are appended to
    fn enter_function(&mut self, index: usize) -> Result<()>;

    fn append_block(&mut self, label: &str) -> Result<BlockId>;

    fn set_insert_point(&mut self, block: BlockId);

    fn get_insert_block(&self) -> Option<BlockId>;

    /// The current block already ends in a terminator
    fn is_terminated(&self) -> bool;

    fn emit(&mut self, inst: Instruction) -> Result<()>;

    fn terminate(&mut self, term: Terminator) -> Result<()>;

    fn new_register(&mut self, ty: IRType) -> Result<Register>;

    /// Alloca placed at the start of the current function's entry block
    fn create_entry_alloca(&mut self, ty: IRType) -> Result<Value>;

    fn add_global(&mut self, global: IRGlobal);

    fn add_import(&mut self, target: &str);

    fn set_module_name(&mut self, name: &str);

    // ==================== Provided helpers ====================

    fn create_binop(&mut self, op: BinOp, ty: IRType, left: Value, right: Value) -> Result<Value> {
        let dest = self.new_register(ty.clone())?;
        self.emit(Instruction::BinOp { dest, op, ty, left, right })?;
        Ok(Value::Register(dest))
    }

    fn create_cmp(&mut self, pred: CmpPred, ty: IRType, left: Value, right: Value) -> Result<Value> {
        let dest = self.new_register(IRType::Bool)?;
        self.emit(Instruction::Cmp { dest, pred, ty, left, right })?;
        Ok(Value::Register(dest))
    }

    fn create_icmp_eq(&mut self, ty: IRType, left: Value, right: Value) -> Result<Value> {
        self.create_cmp(CmpPred::Eq, ty, left, right)
    }

    fn create_unary(&mut self, op: UnaryOp, ty: IRType, value: Value) -> Result<Value> {
        let dest = self.new_register(ty.clone())?;
        self.emit(Instruction::UnaryOp { dest, op, ty, value })?;
        Ok(Value::Register(dest))
    }

    fn create_neg(&mut self, ty: IRType, value: Value) -> Result<Value> {
        let op = if ty.is_float() { UnaryOp::FNeg } else { UnaryOp::Neg };
        self.create_unary(op, ty, value)
    }

    fn create_not(&mut self, ty: IRType, value: Value) -> Result<Value> {
        self.create_unary(UnaryOp::Not, ty, value)
    }

    fn create_cast(&mut self, op: CastOp, value: Value, from: IRType, to: IRType) -> Result<Value> {
        let dest = self.new_register(to.clone())?;
        self.emit(Instruction::Cast { dest, op, value, from, to })?;
        Ok(Value::Register(dest))
    }

    fn create_load(&mut self, ty: IRType, ptr: Value) -> Result<Value> {
        let dest = self.new_register(ty.clone())?;
        self.emit(Instruction::Load { dest, ptr, ty })?;
        Ok(Value::Register(dest))
    }

    fn create_store(&mut self, ty: IRType, value: Value, ptr: Value) -> Result<()> {
        self.emit(Instruction::Store { ptr, value, ty })
    }

    /// Void calls produce [`Value::Unit`]
    fn create_call(&mut self, func: &str, args: Vec<Value>, ret: IRType) -> Result<Value> {
        let dest = if ret == IRType::Void {
            None
        } else {
            Some(self.new_register(ret.clone())?)
        };
        self.emit(Instruction::Call { dest, func: func.to_string(), args, ret })?;
        Ok(dest.map(Value::Register).unwrap_or(Value::Unit))
    }

    fn create_br(&mut self, target: BlockId) -> Result<()> {
        self.terminate(Terminator::Jump { target })
    }

    fn create_cond_br(&mut self, cond: Value, then_target: BlockId, else_target: BlockId) -> Result<()> {
        self.terminate(Terminator::Branch { cond, then_target, else_target })
    }

    fn create_ret(&mut self, value: Value) -> Result<()> {
        self.terminate(Terminator::Return { value: Some(value) })
    }

    fn create_ret_void(&mut self) -> Result<()> {
        self.terminate(Terminator::Return { value: None })
    }

    fn create_unreachable(&mut self) -> Result<()> {
        self.terminate(Terminator::Unreachable)
    }
}

/// [`IrBuilder`] appending into an owned module
#[derive(Debug, Default)]
pub struct ModuleBuilder {
    module: IRModule,
    function: Option<usize>,
    block: Option<BlockId>,
}

impl ModuleBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            module: IRModule::new(name),
            function: None,
            block: None,
        }
    }

    pub fn module(&self) -> &IRModule {
        &self.module
    }

    pub fn module_mut(&mut self) -> &mut IRModule {
        &mut self.module
    }

    pub fn finish(self) -> IRModule {
        self.module
    }

    pub fn current_function(&self) -> Option<&IRFunction> {
        self.function.and_then(|i| self.module.functions.get(i))
    }

    fn function_mut(&mut self) -> Result<&mut IRFunction> {
        let index = self
            .function
            .ok_or_else(|| Error::invariant("no function selected in builder"))?;
        self.module
            .functions
            .get_mut(index)
            .ok_or_else(|| Error::invariant("builder function index out of range"))
    }

    fn block_mut(&mut self) -> Result<&mut BasicBlock> {
        let block = self
            .block
            .ok_or_else(|| Error::invariant("no insert point in builder"))?;
        self.function_mut()?
            .get_block_mut(block)
            .ok_or_else(|| Error::invariant("insert block out of range"))
    }
}

impl IrBuilder for ModuleBuilder {
    fn declare_function(&mut self, name: &str, params: Vec<(String, IRType)>, ret: IRType) -> usize {
        if let Some(index) = self.module.function_index(name) {
            return index;
        }
        self.module.functions.push(IRFunction::new(name, params, ret));
        self.module.functions.len() - 1
    }

    fn enter_function(&mut self, index: usize) -> Result<()> {
        if index >= self.module.functions.len() {
            return Err(Error::invariant(format!("no function #{}", index)));
        }
        self.function = Some(index);
        self.block = None;
        Ok(())
    }

    fn append_block(&mut self, label: &str) -> Result<BlockId> {
        Ok(self.function_mut()?.add_block(label))
    }

    fn set_insert_point(&mut self, block: BlockId) {
        self.block = Some(block);
    }

    fn get_insert_block(&self) -> Option<BlockId> {
        self.block
    }

    fn is_terminated(&self) -> bool {
        match (self.current_function(), self.block) {
            (Some(f), Some(b)) => f.get_block(b).is_some_and(|b| b.is_terminated()),
            _ => false,
        }
    }

    fn emit(&mut self, inst: Instruction) -> Result<()> {
        let block = self.block_mut()?;
        if block.is_terminated() {
            return Err(Error::invariant(format!(
                "instruction appended after terminator in block {}",
                block.label
            )));
        }
        block.push(inst);
        Ok(())
    }

    fn terminate(&mut self, term: Terminator) -> Result<()> {
        let block = self.block_mut()?;
        if block.is_terminated() {
            return Err(Error::invariant(format!(
                "second terminator in block {}",
                block.label
            )));
        }
        block.terminator = Some(term);
        Ok(())
    }

    fn new_register(&mut self, ty: IRType) -> Result<Register> {
        Ok(self.function_mut()?.new_register(ty))
    }

    fn create_entry_alloca(&mut self, ty: IRType) -> Result<Value> {
        let function = self.function_mut()?;
        let dest = function.new_register(IRType::Ptr);
        let entry = function.entry_block;
        let block = function
            .get_block_mut(entry)
            .ok_or_else(|| Error::invariant("function has no entry block"))?;
        let at = block
            .instructions
            .iter()
            .take_while(|i| matches!(i, Instruction::Alloca { .. }))
            .count();
        block.instructions.insert(at, Instruction::Alloca { dest, ty });
        Ok(Value::Register(dest))
    }

    fn add_global(&mut self, global: IRGlobal) {
        self.module.globals.push(global);
    }

    fn add_import(&mut self, target: &str) {
        self.module.imports.push(target.to_string());
    }

    fn set_module_name(&mut self, name: &str) {
        self.module.name = name.to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder_with_function() -> ModuleBuilder {
        let mut b = ModuleBuilder::new("m");
        let f = b.declare_function("f", vec![], IRType::I32);
        b.enter_function(f).unwrap();
        let entry = b.append_block("entry").unwrap();
        b.set_insert_point(entry);
        b
    }

    #[test]
    fn test_declare_is_idempotent() {
        let mut b = ModuleBuilder::new("m");
        let first = b.declare_function("f", vec![], IRType::Void);
        let second = b.declare_function("f", vec![], IRType::Void);
        assert_eq!(first, second);
        assert_eq!(b.module().functions.len(), 1);
    }

    #[test]
    fn test_second_terminator_rejected() {
        let mut b = builder_with_function();
        b.create_ret(Value::int(1)).unwrap();
        let err = b.create_ret(Value::int(2)).unwrap_err();
        assert_eq!(err.tag(), "InternalInvariant");
        assert!(b.create_binop(BinOp::Add, IRType::I32, Value::int(1), Value::int(1)).is_err());
    }

    #[test]
    fn test_entry_allocas_come_first() {
        let mut b = builder_with_function();
        b.create_binop(BinOp::Add, IRType::I32, Value::int(1), Value::int(2)).unwrap();
        b.create_entry_alloca(IRType::I32).unwrap();
        b.create_entry_alloca(IRType::I64).unwrap();
        let f = b.current_function().unwrap();
        let insts = &f.blocks[0].instructions;
        assert!(matches!(insts[0], Instruction::Alloca { ty: IRType::I32, .. }));
        assert!(matches!(insts[1], Instruction::Alloca { ty: IRType::I64, .. }));
        assert!(matches!(insts[2], Instruction::BinOp { .. }));
    }

    #[test]
    fn test_void_call_has_no_dest() {
        let mut b = builder_with_function();
        let v = b.create_call("g", vec![], IRType::Void).unwrap();
        assert_eq!(v, Value::Unit);
        let r = b.create_call("h", vec![], IRType::I32).unwrap();
        assert!(r.as_register().is_some());
    }
}
