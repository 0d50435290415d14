//! Reference interpreter over Ember IR
//!
//! Executes one function with constant arguments. Memory is a flat list of
//! cells: every `alloca` and every global owns one cell and pointers are
//! cell indices. Execution is bounded by a fuel counter.

use std::collections::HashMap;

use thiserror::Error;

use crate::middle::fold;
use crate::middle::ir::*;

const DEFAULT_FUEL: u64 = 1_000_000;
const MAX_DEPTH: usize = 256;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("unknown function {0}")]
    UnknownFunction(String),

    #[error("function {0} is only declared")]
    Declaration(String),

    #[error("out of fuel")]
    OutOfFuel,

    #[error("call depth limit exceeded")]
    StackOverflow,

    #[error("trap in {0}: division by zero or invalid shift")]
    Trap(String),

    #[error("reached unreachable in {0}")]
    Unreachable(String),

    #[error("use of an undefined value in {0}")]
    Undefined(String),

    #[error("malformed IR: {0}")]
    Malformed(String),
}

/// Runtime value of a register, parameter or memory cell
#[derive(Debug, Clone, PartialEq)]
pub enum RtValue {
    Const(Constant),
    /// Index of a memory cell
    Ptr(usize),
    Undef,
    Unit,
}

impl RtValue {
    pub fn int(n: i64) -> Self {
        RtValue::Const(Constant::Int(n))
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            RtValue::Const(c) => c.as_int(),
            _ => None,
        }
    }
}

struct Frame<'f> {
    function: &'f IRFunction,
    args: Vec<RtValue>,
    registers: Vec<RtValue>,
}

impl Frame<'_> {
    fn name(&self) -> String {
        self.function.name.clone()
    }
}

pub struct Evaluator<'m> {
    module: &'m IRModule,
    memory: Vec<RtValue>,
    globals: HashMap<String, usize>,
    fuel: u64,
    depth: usize,
}

impl<'m> Evaluator<'m> {
    pub fn new(module: &'m IRModule) -> Self {
        let mut memory = Vec::with_capacity(module.globals.len());
        let mut globals = HashMap::new();
        for global in &module.globals {
            globals.insert(global.name.clone(), memory.len());
            memory.push(RtValue::Const(global.init.clone()));
        }
        Self {
            module,
            memory,
            globals,
            fuel: DEFAULT_FUEL,
            depth: 0,
        }
    }

    pub fn with_fuel(mut self, fuel: u64) -> Self {
        self.fuel = fuel;
        self
    }

    /// Current contents of a global
    pub fn global(&self, name: &str) -> Option<&RtValue> {
        self.globals.get(name).and_then(|&cell| self.memory.get(cell))
    }

    /// Execute `name` and return its result (`Unit` for void functions)
    pub fn call(&mut self, name: &str, args: Vec<RtValue>) -> Result<RtValue, EvalError> {
        let module = self.module;
        let function = module
            .function(name)
            .ok_or_else(|| EvalError::UnknownFunction(name.to_string()))?;
        if function.is_declaration() {
            return Err(EvalError::Declaration(name.to_string()));
        }
        if args.len() != function.params.len() {
            return Err(EvalError::Malformed(format!(
                "{} takes {} arguments, got {}",
                name,
                function.params.len(),
                args.len()
            )));
        }
        if self.depth >= MAX_DEPTH {
            return Err(EvalError::StackOverflow);
        }

        self.depth += 1;
        let mut frame = Frame {
            function,
            args,
            registers: vec![RtValue::Undef; function.registers.len()],
        };
        let result = self.run(&mut frame);
        self.depth -= 1;
        result
    }

    fn run(&mut self, frame: &mut Frame<'m>) -> Result<RtValue, EvalError> {
        let function = frame.function;
        let mut current = function.entry_block;
        let mut previous: Option<BlockId> = None;

        loop {
            let block = function
                .get_block(current)
                .ok_or_else(|| EvalError::Malformed(format!("missing block {}", current.0)))?;

            for inst in &block.instructions {
                self.tick()?;
                self.step(frame, inst, previous)?;
            }

            self.tick()?;
            match &block.terminator {
                Some(Terminator::Return { value: Some(value) }) => return self.operand(frame, value),
                Some(Terminator::Return { value: None }) => return Ok(RtValue::Unit),
                Some(Terminator::Jump { target }) => {
                    previous = Some(current);
                    current = *target;
                }
                Some(Terminator::Branch { cond, then_target, else_target }) => {
                    let cond = self.operand(frame, cond)?;
                    let taken = match cond {
                        RtValue::Const(c) => c.as_int().map(|n| n != 0),
                        _ => None,
                    }
                    .ok_or_else(|| EvalError::Undefined(frame.name()))?;
                    previous = Some(current);
                    current = if taken { *then_target } else { *else_target };
                }
                Some(Terminator::Unreachable) => return Err(EvalError::Unreachable(frame.name())),
                None => {
                    return Err(EvalError::Malformed(format!(
                        "block {} of {} has no terminator",
                        block.label, function.name
                    )))
                }
            }
        }
    }

    fn tick(&mut self) -> Result<(), EvalError> {
        if self.fuel == 0 {
            return Err(EvalError::OutOfFuel);
        }
        self.fuel -= 1;
        Ok(())
    }

    fn step(&mut self, frame: &mut Frame<'m>, inst: &Instruction, previous: Option<BlockId>) -> Result<(), EvalError> {
        let result = match inst {
            Instruction::Assign { value, .. } => self.operand(frame, value)?,
            Instruction::BinOp { op, ty, left, right, .. } => {
                let (a, b) = (self.constant(frame, left)?, self.constant(frame, right)?);
                let folded = fold::binop(*op, ty, &a, &b).ok_or_else(|| EvalError::Trap(frame.name()))?;
                RtValue::Const(folded)
            }
            Instruction::Cmp { pred, ty, left, right, .. } => {
                let (a, b) = (self.constant(frame, left)?, self.constant(frame, right)?);
                fold::cmp(*pred, ty, &a, &b)
                    .map(RtValue::Const)
                    .ok_or_else(|| EvalError::Malformed(format!("cannot compare {} and {}", a, b)))?
            }
            Instruction::UnaryOp { op, ty, value, .. } => {
                let a = self.constant(frame, value)?;
                fold::unary(*op, ty, &a)
                    .map(RtValue::Const)
                    .ok_or_else(|| EvalError::Malformed(format!("cannot apply {} to {}", op, a)))?
            }
            Instruction::Cast { op, value, from, to, .. } => {
                let a = self.constant(frame, value)?;
                fold::cast(*op, &a, from, to)
                    .map(RtValue::Const)
                    .ok_or_else(|| EvalError::Malformed(format!("cannot {} {}", op, a)))?
            }
            Instruction::Call { func, args, .. } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.operand(frame, arg)?);
                }
                self.call(func, values)?
            }
            Instruction::Alloca { .. } => {
                self.memory.push(RtValue::Undef);
                RtValue::Ptr(self.memory.len() - 1)
            }
            Instruction::Load { ptr, .. } => {
                let cell = self.address(frame, ptr)?;
                self.memory[cell].clone()
            }
            Instruction::Store { ptr, value, .. } => {
                let cell = self.address(frame, ptr)?;
                let value = self.operand(frame, value)?;
                self.memory[cell] = value;
                return Ok(());
            }
            Instruction::Phi { incoming, .. } => {
                let from = previous.ok_or_else(|| EvalError::Malformed("phi in entry block".to_string()))?;
                let (value, _) = incoming
                    .iter()
                    .find(|(_, block)| *block == from)
                    .ok_or_else(|| EvalError::Malformed(format!("phi has no edge from block {}", from.0)))?;
                self.operand(frame, value)?
            }
        };

        if let Some(dest) = inst.dest() {
            let slot = frame
                .registers
                .get_mut(dest.0)
                .ok_or_else(|| EvalError::Malformed(format!("register {} out of range", dest)))?;
            *slot = result;
        }
        Ok(())
    }

    fn operand(&self, frame: &Frame<'_>, value: &Value) -> Result<RtValue, EvalError> {
        Ok(match value {
            Value::Register(r) => frame
                .registers
                .get(r.0)
                .cloned()
                .ok_or_else(|| EvalError::Malformed(format!("register {} out of range", r)))?,
            Value::Constant(c) => RtValue::Const(c.clone()),
            Value::Parameter(i) => frame
                .args
                .get(*i)
                .cloned()
                .ok_or_else(|| EvalError::Malformed(format!("parameter {} out of range", i)))?,
            Value::Global(name) => self
                .globals
                .get(name)
                .map(|&cell| RtValue::Ptr(cell))
                .ok_or_else(|| EvalError::Malformed(format!("unknown global @{}", name)))?,
            Value::Function(name) => return Err(EvalError::Malformed(format!("@{} used as a value", name))),
            Value::Undef(_) => RtValue::Undef,
            Value::Unit => RtValue::Unit,
        })
    }

    fn constant(&self, frame: &Frame<'_>, value: &Value) -> Result<Constant, EvalError> {
        match self.operand(frame, value)? {
            RtValue::Const(c) => Ok(c),
            _ => Err(EvalError::Undefined(frame.name())),
        }
    }

    fn address(&self, frame: &Frame<'_>, ptr: &Value) -> Result<usize, EvalError> {
        match self.operand(frame, ptr)? {
            RtValue::Ptr(cell) if cell < self.memory.len() => Ok(cell),
            other => Err(EvalError::Malformed(format!("{:?} is not an address", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middle::builder::{IrBuilder, ModuleBuilder};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_arithmetic_through_slots() {
        let mut b = ModuleBuilder::new("m");
        let f = b.declare_function("f", vec![("x".into(), IRType::I32)], IRType::I32);
        b.enter_function(f).unwrap();
        let entry = b.append_block("entry").unwrap();
        b.set_insert_point(entry);
        let slot = b.create_entry_alloca(IRType::I32).unwrap();
        b.create_store(IRType::I32, Value::Parameter(0), slot.clone()).unwrap();
        let x = b.create_load(IRType::I32, slot).unwrap();
        let y = b.create_binop(BinOp::Mul, IRType::I32, x, Value::int(3)).unwrap();
        b.create_ret(y).unwrap();
        let module = b.finish();

        let result = Evaluator::new(&module).call("f", vec![RtValue::int(14)]).unwrap();
        assert_eq!(result, RtValue::int(42));
    }

    #[test]
    fn test_fuel_stops_infinite_loop() {
        let mut b = ModuleBuilder::new("m");
        let f = b.declare_function("spin", vec![], IRType::Void);
        b.enter_function(f).unwrap();
        let entry = b.append_block("entry").unwrap();
        b.set_insert_point(entry);
        b.create_br(entry).unwrap();
        let module = b.finish();

        let err = Evaluator::new(&module).with_fuel(100).call("spin", vec![]).unwrap_err();
        assert_eq!(err, EvalError::OutOfFuel);
    }

    #[test]
    fn test_division_by_zero_traps() {
        let mut b = ModuleBuilder::new("m");
        let f = b.declare_function("d", vec![("x".into(), IRType::I32)], IRType::I32);
        b.enter_function(f).unwrap();
        let entry = b.append_block("entry").unwrap();
        b.set_insert_point(entry);
        let q = b.create_binop(BinOp::SDiv, IRType::I32, Value::int(1), Value::Parameter(0)).unwrap();
        b.create_ret(q).unwrap();
        let module = b.finish();

        let err = Evaluator::new(&module).call("d", vec![RtValue::int(0)]).unwrap_err();
        assert_eq!(err, EvalError::Trap("d".into()));
    }

    #[test]
    fn test_unknown_and_declared_functions() {
        let mut b = ModuleBuilder::new("m");
        b.declare_function("ext", vec![], IRType::Void);
        let module = b.finish();
        let mut eval = Evaluator::new(&module);
        assert_eq!(eval.call("nope", vec![]), Err(EvalError::UnknownFunction("nope".into())));
        assert_eq!(eval.call("ext", vec![]), Err(EvalError::Declaration("ext".into())));
    }
}
