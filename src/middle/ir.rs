//! Ember IR definitions
//!
//! Three-address code style IR with typed virtual registers and explicit
//! stack slots. Phi nodes only appear after inlining.

use std::fmt;

/// IR Module - globals, imports and functions of one source file
#[derive(Debug, Clone, Default)]
pub struct IRModule {
    pub name: String,
    /// Path of the source file the module was lowered from
    pub source: String,
    pub functions: Vec<IRFunction>,
    pub globals: Vec<IRGlobal>,
    pub imports: Vec<String>,
}

impl IRModule {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn function_index(&self, name: &str) -> Option<usize> {
        self.functions.iter().position(|f| f.name == name)
    }

    pub fn function(&self, name: &str) -> Option<&IRFunction> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn function_mut(&mut self, name: &str) -> Option<&mut IRFunction> {
        self.functions.iter_mut().find(|f| f.name == name)
    }

    pub fn global(&self, name: &str) -> Option<&IRGlobal> {
        self.globals.iter().find(|g| g.name == name)
    }
}

/// Module-level variable with a constant initializer
#[derive(Debug, Clone, PartialEq)]
pub struct IRGlobal {
    pub name: String,
    pub ty: IRType,
    pub init: Constant,
    pub mutable: bool,
}

/// Source position of a function, attached with `--debug-info`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugSubprogram {
    pub file: String,
    pub line: u32,
    /// Return type first, then each parameter
    pub types: Vec<String>,
}

/// IR Function
#[derive(Debug, Clone)]
pub struct IRFunction {
    pub name: String,
    /// Mangled companion symbol: `_E<len><name><type code>`
    pub mangled: String,
    pub params: Vec<(String, IRType)>,
    pub ret_type: IRType,
    pub blocks: Vec<BasicBlock>,
    pub entry_block: BlockId,
    /// Type of every virtual register, indexed by register number
    pub registers: Vec<IRType>,
    /// Declared `inline`; consumed by the always-inline inliner
    pub always_inline: bool,
    pub debug: Option<DebugSubprogram>,
}

impl IRFunction {
    pub fn new(name: &str, params: Vec<(String, IRType)>, ret_type: IRType) -> Self {
        Self {
            name: name.to_string(),
            mangled: String::new(),
            params,
            ret_type,
            blocks: Vec::new(),
            entry_block: BlockId(0),
            registers: Vec::new(),
            always_inline: false,
            debug: None,
        }
    }

    /// A function without blocks is only declared
    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Append a block, uniquifying its label with a `.N` suffix
    pub fn add_block(&mut self, label: &str) -> BlockId {
        let id = BlockId(self.blocks.len());
        let mut unique = label.to_string();
        let mut n = 1;
        while self.blocks.iter().any(|b| b.label == unique) {
            unique = format!("{}.{}", label, n);
            n += 1;
        }
        self.blocks.push(BasicBlock::new(id, &unique));
        id
    }

    pub fn get_block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.get(id.0)
    }

    pub fn get_block_mut(&mut self, id: BlockId) -> Option<&mut BasicBlock> {
        self.blocks.get_mut(id.0)
    }

    pub fn new_register(&mut self, ty: IRType) -> Register {
        let reg = Register(self.registers.len());
        self.registers.push(ty);
        reg
    }

    pub fn register_type(&self, reg: Register) -> Option<&IRType> {
        self.registers.get(reg.0)
    }

    /// Type of a value as seen from inside this function
    pub fn value_type(&self, value: &Value) -> Option<IRType> {
        match value {
            Value::Register(r) => self.register_type(*r).cloned(),
            Value::Parameter(i) => self.params.get(*i).map(|(_, ty)| ty.clone()),
            Value::Global(_) | Value::Function(_) => Some(IRType::Ptr),
            Value::Constant(c) => Some(c.natural_type()),
            Value::Undef(ty) => Some(ty.clone()),
            Value::Unit => Some(IRType::Void),
        }
    }

    /// Blocks that some terminator branches to, plus the entry block
    pub fn reachable_targets(&self) -> Vec<bool> {
        let mut targeted = vec![false; self.blocks.len()];
        if let Some(entry) = targeted.get_mut(self.entry_block.0) {
            *entry = true;
        }
        for block in &self.blocks {
            if let Some(term) = &block.terminator {
                for succ in term.successors() {
                    if let Some(slot) = targeted.get_mut(succ.0) {
                        *slot = true;
                    }
                }
            }
        }
        targeted
    }

    pub fn instruction_count(&self) -> usize {
        self.blocks.iter().map(|b| b.instructions.len() + 1).sum()
    }
}

/// Basic Block - a sequence of instructions with single entry/exit
#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub id: BlockId,
    pub label: String,
    pub instructions: Vec<Instruction>,
    pub terminator: Option<Terminator>,
}

impl BasicBlock {
    pub fn new(id: BlockId, label: &str) -> Self {
        Self {
            id,
            label: label.to_string(),
            instructions: Vec::new(),
            terminator: None,
        }
    }

    pub fn push(&mut self, inst: Instruction) {
        self.instructions.push(inst);
    }

    pub fn is_terminated(&self) -> bool {
        self.terminator.is_some()
    }
}

/// Block identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub usize);

/// Virtual register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Register(pub usize);

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// IR Instruction (non-terminating)
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// dest = value
    Assign { dest: Register, value: Value },

    /// dest = op ty left, right
    BinOp { dest: Register, op: BinOp, ty: IRType, left: Value, right: Value },

    /// dest = icmp/fcmp pred ty left, right
    Cmp { dest: Register, pred: CmpPred, ty: IRType, left: Value, right: Value },

    /// dest = op ty value
    UnaryOp { dest: Register, op: UnaryOp, ty: IRType, value: Value },

    /// dest = op value from -> to
    Cast { dest: Register, op: CastOp, value: Value, from: IRType, to: IRType },

    /// dest = func(args...)
    Call { dest: Option<Register>, func: String, args: Vec<Value>, ret: IRType },

    /// dest = alloca type
    Alloca { dest: Register, ty: IRType },

    /// dest = load ty, ptr
    Load { dest: Register, ptr: Value, ty: IRType },

    /// store ty value, ptr
    Store { ptr: Value, value: Value, ty: IRType },

    /// dest = phi ty [(val1, block1), (val2, block2), ...]
    Phi { dest: Register, ty: IRType, incoming: Vec<(Value, BlockId)> },
}

impl Instruction {
    pub fn dest(&self) -> Option<Register> {
        match self {
            Instruction::Assign { dest, .. }
            | Instruction::BinOp { dest, .. }
            | Instruction::Cmp { dest, .. }
            | Instruction::UnaryOp { dest, .. }
            | Instruction::Cast { dest, .. }
            | Instruction::Alloca { dest, .. }
            | Instruction::Load { dest, .. }
            | Instruction::Phi { dest, .. } => Some(*dest),
            Instruction::Call { dest, .. } => *dest,
            Instruction::Store { .. } => None,
        }
    }

    pub fn operands(&self) -> Vec<&Value> {
        match self {
            Instruction::Assign { value, .. }
            | Instruction::UnaryOp { value, .. }
            | Instruction::Cast { value, .. } => vec![value],
            Instruction::BinOp { left, right, .. } | Instruction::Cmp { left, right, .. } => {
                vec![left, right]
            }
            Instruction::Call { args, .. } => args.iter().collect(),
            Instruction::Alloca { .. } => Vec::new(),
            Instruction::Load { ptr, .. } => vec![ptr],
            Instruction::Store { ptr, value, .. } => vec![ptr, value],
            Instruction::Phi { incoming, .. } => incoming.iter().map(|(v, _)| v).collect(),
        }
    }

    pub fn operands_mut(&mut self) -> Vec<&mut Value> {
        match self {
            Instruction::Assign { value, .. }
            | Instruction::UnaryOp { value, .. }
            | Instruction::Cast { value, .. } => vec![value],
            Instruction::BinOp { left, right, .. } | Instruction::Cmp { left, right, .. } => {
                vec![left, right]
            }
            Instruction::Call { args, .. } => args.iter_mut().collect(),
            Instruction::Alloca { .. } => Vec::new(),
            Instruction::Load { ptr, .. } => vec![ptr],
            Instruction::Store { ptr, value, .. } => vec![ptr, value],
            Instruction::Phi { incoming, .. } => incoming.iter_mut().map(|(v, _)| v).collect(),
        }
    }

    /// Whether removing the instruction could change behaviour
    pub fn has_side_effects(&self) -> bool {
        matches!(self, Instruction::Call { .. } | Instruction::Store { .. })
    }
}

/// Block terminator
#[derive(Debug, Clone, PartialEq)]
pub enum Terminator {
    /// return value
    Return { value: Option<Value> },

    /// br target
    Jump { target: BlockId },

    /// br cond, then_target, else_target
    Branch { cond: Value, then_target: BlockId, else_target: BlockId },

    /// unreachable
    Unreachable,
}

impl Terminator {
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Terminator::Jump { target } => vec![*target],
            Terminator::Branch { then_target, else_target, .. } => vec![*then_target, *else_target],
            Terminator::Return { .. } | Terminator::Unreachable => Vec::new(),
        }
    }

    pub fn operands_mut(&mut self) -> Vec<&mut Value> {
        match self {
            Terminator::Return { value: Some(value) } => vec![value],
            Terminator::Branch { cond, .. } => vec![cond],
            _ => Vec::new(),
        }
    }

    pub fn operands(&self) -> Vec<&Value> {
        match self {
            Terminator::Return { value: Some(value) } => vec![value],
            Terminator::Branch { cond, .. } => vec![cond],
            _ => Vec::new(),
        }
    }

    /// Rewrite every branch target through `map`
    pub fn map_targets(&mut self, mut map: impl FnMut(BlockId) -> BlockId) {
        match self {
            Terminator::Jump { target } => *target = map(*target),
            Terminator::Branch { then_target, else_target, .. } => {
                *then_target = map(*then_target);
                *else_target = map(*else_target);
            }
            Terminator::Return { .. } | Terminator::Unreachable => {}
        }
    }
}

/// IR Value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Register(Register),
    Constant(Constant),
    Parameter(usize),
    /// Address of a module global
    Global(String),
    /// A function symbol
    Function(String),
    Undef(IRType),
    Unit,
}

impl Value {
    pub fn int(n: i64) -> Self {
        Value::Constant(Constant::Int(n))
    }

    pub fn as_constant(&self) -> Option<&Constant> {
        match self {
            Value::Constant(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_register(&self) -> Option<Register> {
        match self {
            Value::Register(r) => Some(*r),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Register(r) => write!(f, "{}", r),
            Value::Constant(c) => write!(f, "{}", c),
            Value::Parameter(i) => write!(f, "%arg{}", i),
            Value::Global(name) | Value::Function(name) => write!(f, "@{}", name),
            Value::Undef(_) => write!(f, "undef"),
            Value::Unit => write!(f, "()"),
        }
    }
}

/// Constant value
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Int(i64),
    Float(f64),
    Bool(bool),
    String(String),
}

impl Constant {
    /// The type a constant has when nothing else is known
    pub fn natural_type(&self) -> IRType {
        match self {
            Constant::Int(_) => IRType::I32,
            Constant::Float(_) => IRType::F64,
            Constant::Bool(_) => IRType::Bool,
            Constant::String(_) => IRType::Ptr,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Constant::Int(n) => Some(*n),
            Constant::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Constant::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Int(n) => write!(f, "{}", n),
            Constant::Float(n) => write!(f, "{:?}", n),
            Constant::Bool(b) => write!(f, "{}", b),
            Constant::String(s) => write!(f, "c{:?}", s),
        }
    }
}

/// Binary operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    // Integer arithmetic
    Add, Sub, Mul, SDiv, UDiv, SRem, URem,
    // Floating arithmetic
    FAdd, FSub, FMul, FDiv, FRem,
    // Bitwise
    And, Or, Xor, Shl, AShr, LShr,
}

impl BinOp {
    pub fn is_commutative(self) -> bool {
        matches!(
            self,
            BinOp::Add | BinOp::Mul | BinOp::FAdd | BinOp::FMul | BinOp::And | BinOp::Or | BinOp::Xor
        )
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::SDiv => "sdiv",
            BinOp::UDiv => "udiv",
            BinOp::SRem => "srem",
            BinOp::URem => "urem",
            BinOp::FAdd => "fadd",
            BinOp::FSub => "fsub",
            BinOp::FMul => "fmul",
            BinOp::FDiv => "fdiv",
            BinOp::FRem => "frem",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::Xor => "xor",
            BinOp::Shl => "shl",
            BinOp::AShr => "ashr",
            BinOp::LShr => "lshr",
        };
        write!(f, "{}", s)
    }
}

/// Comparison predicate; integer predicates print as `icmp`, the rest as `fcmp`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpPred {
    // Integer
    Eq, Ne, Slt, Sle, Sgt, Sge, Ult, Ule, Ugt, Uge,
    // Floating, ordered
    Oeq, One, Olt, Ole, Ogt, Oge,
    // Floating, unordered not-equal
    Une,
}

impl CmpPred {
    pub fn is_float(self) -> bool {
        matches!(
            self,
            CmpPred::Oeq | CmpPred::One | CmpPred::Olt | CmpPred::Ole | CmpPred::Ogt | CmpPred::Oge | CmpPred::Une
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            CmpPred::Eq => "eq",
            CmpPred::Ne => "ne",
            CmpPred::Slt => "slt",
            CmpPred::Sle => "sle",
            CmpPred::Sgt => "sgt",
            CmpPred::Sge => "sge",
            CmpPred::Ult => "ult",
            CmpPred::Ule => "ule",
            CmpPred::Ugt => "ugt",
            CmpPred::Uge => "uge",
            CmpPred::Oeq => "oeq",
            CmpPred::One => "one",
            CmpPred::Olt => "olt",
            CmpPred::Ole => "ole",
            CmpPred::Ogt => "ogt",
            CmpPred::Oge => "oge",
            CmpPred::Une => "une",
        }
    }
}

/// Unary operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// Integer negation
    Neg,
    /// Floating negation
    FNeg,
    /// Bitwise not (logical not on `i1`)
    Not,
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UnaryOp::Neg => "neg",
            UnaryOp::FNeg => "fneg",
            UnaryOp::Not => "not",
        })
    }
}

/// Conversion operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CastOp {
    Trunc,
    SExt,
    ZExt,
    FPTrunc,
    FPExt,
    SIToFP,
    UIToFP,
    FPToSI,
    FPToUI,
    Bitcast,
}

impl fmt::Display for CastOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CastOp::Trunc => "trunc",
            CastOp::SExt => "sext",
            CastOp::ZExt => "zext",
            CastOp::FPTrunc => "fptrunc",
            CastOp::FPExt => "fpext",
            CastOp::SIToFP => "sitofp",
            CastOp::UIToFP => "uitofp",
            CastOp::FPToSI => "fptosi",
            CastOp::FPToUI => "fptoui",
            CastOp::Bitcast => "bitcast",
        })
    }
}

/// IR Type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IRType {
    Void,
    /// i1
    Bool,
    I8, I16, I32, I64,
    F32, F64,
    /// Opaque pointer
    Ptr,
    Function { params: Vec<IRType>, ret: Box<IRType> },
}

impl IRType {
    pub fn size_bytes(&self) -> usize {
        match self {
            IRType::Void | IRType::Function { .. } => 0,
            IRType::Bool | IRType::I8 => 1,
            IRType::I16 => 2,
            IRType::I32 | IRType::F32 => 4,
            IRType::I64 | IRType::F64 | IRType::Ptr => 8,
        }
    }

    /// Width in bits; pointers count as 64
    pub fn bit_width(&self) -> u32 {
        match self {
            IRType::Bool => 1,
            other => other.size_bytes() as u32 * 8,
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, IRType::Bool | IRType::I8 | IRType::I16 | IRType::I32 | IRType::I64)
    }

    pub fn is_float(&self) -> bool {
        matches!(self, IRType::F32 | IRType::F64)
    }

    /// Wrap `value` to this integer width, sign-extending back to 64 bits
    pub fn normalize(&self, value: i64) -> i64 {
        match self {
            IRType::Bool => value & 1,
            IRType::I8 => value as i8 as i64,
            IRType::I16 => value as i16 as i64,
            IRType::I32 => value as i32 as i64,
            _ => value,
        }
    }

    /// Zero-extended view of `value` at this width
    pub fn unsigned(&self, value: i64) -> u64 {
        match self {
            IRType::Bool => (value & 1) as u64,
            IRType::I8 => value as u8 as u64,
            IRType::I16 => value as u16 as u64,
            IRType::I32 => value as u32 as u64,
            _ => value as u64,
        }
    }
}

impl fmt::Display for IRType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IRType::Void => write!(f, "void"),
            IRType::Bool => write!(f, "i1"),
            IRType::I8 => write!(f, "i8"),
            IRType::I16 => write!(f, "i16"),
            IRType::I32 => write!(f, "i32"),
            IRType::I64 => write!(f, "i64"),
            IRType::F32 => write!(f, "float"),
            IRType::F64 => write!(f, "double"),
            IRType::Ptr => write!(f, "ptr"),
            IRType::Function { params, ret } => {
                write!(f, "{} (", ret)?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", p)?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_labels_are_unique() {
        let mut f = IRFunction::new("f", vec![], IRType::Void);
        f.add_block("entry");
        f.add_block("then");
        let again = f.add_block("then");
        let third = f.add_block("then");
        assert_eq!(f.blocks[again.0].label, "then.1");
        assert_eq!(f.blocks[third.0].label, "then.2");
    }

    #[test]
    fn test_normalize_wraps() {
        assert_eq!(IRType::I8.normalize(200), -56);
        assert_eq!(IRType::I8.unsigned(-56), 200);
        assert_eq!(IRType::I32.normalize(i64::from(i32::MAX) + 1), i64::from(i32::MIN));
        assert_eq!(IRType::Bool.normalize(3), 1);
    }

    #[test]
    fn test_reachable_targets() {
        let mut f = IRFunction::new("f", vec![], IRType::Void);
        let entry = f.add_block("entry");
        let dead = f.add_block("dead");
        let exit = f.add_block("exit");
        f.blocks[entry.0].terminator = Some(Terminator::Jump { target: exit });
        f.blocks[dead.0].terminator = Some(Terminator::Jump { target: exit });
        assert_eq!(f.reachable_targets(), vec![true, false, true]);
    }
}
