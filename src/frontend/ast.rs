//! Abstract Syntax Tree definitions for Ember
//!
//! Nodes live in an arena owned by [`Ast`] and refer to their children by
//! [`NodeId`]. Ownership flows strictly from the root down; `parent` is a
//! back-edge filled in by the parent solver.

use std::fmt;
use std::sync::Arc;

use crate::utils::{SourceFile, SourceLoc};

/// Index of a node in its [`Ast`] arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

/// A complete compilation unit
#[derive(Debug)]
pub struct Ast {
    nodes: Vec<Node>,
    /// The global block
    pub root: NodeId,
    /// The file this tree was parsed from
    pub file: Arc<SourceFile>,
}

/// Common node header plus the variant payload
#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub loc: SourceLoc,
    pub parent: Option<NodeId>,
}

/// Operators shared by unary, binary, assignment and n-ary nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatorKind {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    // Comparison
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    // Logical
    LogicalAnd,
    LogicalOr,
    // Bitwise
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    // Unary
    UnaryPlus,
    UnaryMinus,
    BitNot,
    LogicalNot,
    // Assignment
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    ModAssign,
    // N-ary
    Call,
}

impl OperatorKind {
    /// The binary operator a compound assignment applies before storing
    pub fn compound_base(self) -> Option<OperatorKind> {
        match self {
            Self::AddAssign => Some(Self::Add),
            Self::SubAssign => Some(Self::Sub),
            Self::MulAssign => Some(Self::Mul),
            Self::DivAssign => Some(Self::Div),
            Self::ModAssign => Some(Self::Mod),
            _ => None,
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(self, Self::Eq | Self::Ne | Self::Lt | Self::Le | Self::Gt | Self::Ge)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add | Self::UnaryPlus => "+",
            Self::Sub | Self::UnaryMinus => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::LogicalAnd => "&&",
            Self::LogicalOr => "||",
            Self::BitAnd => "&",
            Self::BitOr => "|",
            Self::BitXor => "^",
            Self::Shl => "<<",
            Self::Shr => ">>",
            Self::BitNot => "~",
            Self::LogicalNot => "!",
            Self::Assign => "=",
            Self::AddAssign => "+=",
            Self::SubAssign => "-=",
            Self::MulAssign => "*=",
            Self::DivAssign => "/=",
            Self::ModAssign => "%=",
            Self::Call => "()",
        }
    }
}

impl fmt::Display for OperatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A written type: `T` or `mut T`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeRef {
    pub name: String,
    pub mutable: bool,
    pub loc: SourceLoc,
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.mutable {
            write!(f, "mut {}", self.name)
        } else {
            f.write_str(&self.name)
        }
    }
}

/// Payload of local and global variable definitions
#[derive(Debug, Clone, PartialEq)]
pub struct VariableDefinition {
    pub name: String,
    pub ty: Option<TypeRef>,
    pub init: Option<NodeId>,
    /// The type comes from the initializer
    pub inferred: bool,
    pub mutable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringKind {
    Plain,
    C,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportKind {
    Unspecified,
    Module,
    Package,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassMode {
    Copy,
    Ref,
    View,
}

impl fmt::Display for PassMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PassMode::Copy => "copy",
            PassMode::Ref => "ref",
            PassMode::View => "view",
        })
    }
}

/// Node variants
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    // ==================== Expressions ====================
    Identifier {
        name: String,
    },
    VariableReference {
        name: String,
    },
    VariableDefinition(VariableDefinition),
    GlobalVariableDefinition(VariableDefinition),
    Cast {
        expr: NodeId,
        ty: TypeRef,
    },
    Call {
        callee: NodeId,
        args: Vec<NodeId>,
    },
    MemberAccess {
        object: NodeId,
        member: String,
    },
    Subscript {
        object: NodeId,
        index: NodeId,
    },
    SubscriptRanged {
        object: NodeId,
        start: Option<NodeId>,
        end: Option<NodeId>,
    },
    IntegerLiteral(i64),
    FloatLiteral(f64),
    StringLiteral {
        value: String,
        kind: StringKind,
    },
    CharLiteral {
        value: u32,
        /// `b'x'` literal
        byte: bool,
    },
    BoolLiteral(bool),
    NoneLiteral,
    UnaryOp {
        op: OperatorKind,
        operand: NodeId,
    },
    BinaryOp {
        op: OperatorKind,
        lhs: NodeId,
        rhs: NodeId,
    },
    AssignmentOp {
        op: OperatorKind,
        lhs: NodeId,
        rhs: NodeId,
    },

    // ==================== Statements ====================
    EmptyStmt,
    Block {
        stmts: Vec<NodeId>,
    },
    ExprStmt {
        expr: NodeId,
    },
    If {
        cond: NodeId,
        then_block: NodeId,
        else_block: Option<NodeId>,
    },
    For {
        init: Option<NodeId>,
        end: Option<NodeId>,
        step: Option<NodeId>,
        body: NodeId,
    },
    While {
        cond: NodeId,
        body: NodeId,
    },
    ForEach {
        iterator: NodeId,
        iteratee: NodeId,
        body: NodeId,
    },
    Return {
        value: Option<NodeId>,
    },
    Import {
        target: String,
        kind: ImportKind,
        /// The target is a file path rather than a name
        is_path: bool,
    },
    Module {
        name: String,
    },
    TypeAlias {
        name: String,
        target: TypeRef,
    },
    FunctionParameter {
        def: NodeId,
        mode: PassMode,
    },
    FunctionPrototype {
        name: String,
        return_type: TypeRef,
        params: Vec<NodeId>,
        always_inline: bool,
    },
    FunctionDefinition {
        prototype: NodeId,
        body: Option<NodeId>,
        is_declaration: bool,
    },
}

impl NodeKind {
    /// Stable kind name, used by the dump and in diagnostics
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Identifier { .. } => "Identifier",
            NodeKind::VariableReference { .. } => "VariableReference",
            NodeKind::VariableDefinition(_) => "VariableDefinition",
            NodeKind::GlobalVariableDefinition(_) => "GlobalVariableDefinition",
            NodeKind::Cast { .. } => "CastExpression",
            NodeKind::Call { .. } => "CallExpression",
            NodeKind::MemberAccess { .. } => "MemberAccess",
            NodeKind::Subscript { .. } => "Subscript",
            NodeKind::SubscriptRanged { .. } => "SubscriptRanged",
            NodeKind::IntegerLiteral(_) => "IntegerLiteral",
            NodeKind::FloatLiteral(_) => "FloatLiteral",
            NodeKind::StringLiteral { .. } => "StringLiteral",
            NodeKind::CharLiteral { .. } => "CharLiteral",
            NodeKind::BoolLiteral(_) => "BoolLiteral",
            NodeKind::NoneLiteral => "NoneLiteral",
            NodeKind::UnaryOp { .. } => "UnaryOperator",
            NodeKind::BinaryOp { .. } => "BinaryOperator",
            NodeKind::AssignmentOp { .. } => "AssignmentOperator",
            NodeKind::EmptyStmt => "EmptyStatement",
            NodeKind::Block { .. } => "BlockStatement",
            NodeKind::ExprStmt { .. } => "ExpressionStatement",
            NodeKind::If { .. } => "IfStatement",
            NodeKind::For { .. } => "ForStatement",
            NodeKind::While { .. } => "WhileStatement",
            NodeKind::ForEach { .. } => "ForEachStatement",
            NodeKind::Return { .. } => "ReturnStatement",
            NodeKind::Import { .. } => "ImportStatement",
            NodeKind::Module { .. } => "ModuleStatement",
            NodeKind::TypeAlias { .. } => "TypeAliasStatement",
            NodeKind::FunctionParameter { .. } => "FunctionParameter",
            NodeKind::FunctionPrototype { .. } => "FunctionPrototype",
            NodeKind::FunctionDefinition { .. } => "FunctionDefinition",
        }
    }

    /// Child nodes in source order
    pub fn children(&self) -> Vec<NodeId> {
        match self {
            NodeKind::Identifier { .. }
            | NodeKind::VariableReference { .. }
            | NodeKind::IntegerLiteral(_)
            | NodeKind::FloatLiteral(_)
            | NodeKind::StringLiteral { .. }
            | NodeKind::CharLiteral { .. }
            | NodeKind::BoolLiteral(_)
            | NodeKind::NoneLiteral
            | NodeKind::EmptyStmt
            | NodeKind::Import { .. }
            | NodeKind::Module { .. }
            | NodeKind::TypeAlias { .. } => Vec::new(),
            NodeKind::VariableDefinition(def) | NodeKind::GlobalVariableDefinition(def) => {
                def.init.into_iter().collect()
            }
            NodeKind::Cast { expr, .. } => vec![*expr],
            NodeKind::Call { callee, args } => {
                let mut children = vec![*callee];
                children.extend(args.iter().copied());
                children
            }
            NodeKind::MemberAccess { object, .. } => vec![*object],
            NodeKind::Subscript { object, index } => vec![*object, *index],
            NodeKind::SubscriptRanged { object, start, end } => {
                let mut children = vec![*object];
                children.extend(start.iter().chain(end.iter()).copied());
                children
            }
            NodeKind::UnaryOp { operand, .. } => vec![*operand],
            NodeKind::BinaryOp { lhs, rhs, .. } | NodeKind::AssignmentOp { lhs, rhs, .. } => {
                vec![*lhs, *rhs]
            }
            NodeKind::Block { stmts } => stmts.clone(),
            NodeKind::ExprStmt { expr } => vec![*expr],
            NodeKind::If { cond, then_block, else_block } => {
                let mut children = vec![*cond, *then_block];
                children.extend(else_block.iter().copied());
                children
            }
            NodeKind::For { init, end, step, body } => init
                .iter()
                .chain(end.iter())
                .chain(step.iter())
                .copied()
                .chain(std::iter::once(*body))
                .collect(),
            NodeKind::While { cond, body } => vec![*cond, *body],
            NodeKind::ForEach { iterator, iteratee, body } => vec![*iterator, *iteratee, *body],
            NodeKind::Return { value } => value.iter().copied().collect(),
            NodeKind::FunctionParameter { def, .. } => vec![*def],
            NodeKind::FunctionPrototype { params, .. } => params.clone(),
            NodeKind::FunctionDefinition { prototype, body, .. } => {
                let mut children = vec![*prototype];
                children.extend(body.iter().copied());
                children
            }
        }
    }
}

impl Ast {
    /// Create an empty tree; the parser pushes nodes and then sets the root
    pub fn new(file: Arc<SourceFile>) -> Self {
        let loc = SourceLoc::new(file.id, 1, 1);
        let mut ast = Self {
            nodes: Vec::new(),
            root: NodeId(0),
            file,
        };
        ast.root = ast.push(NodeKind::Block { stmts: Vec::new() }, loc);
        ast
    }

    /// Append a node to the arena
    pub fn push(&mut self, kind: NodeKind, loc: SourceLoc) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node { kind, loc, parent: None });
        id
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0 as usize]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.node(id).kind
    }

    pub fn loc(&self, id: NodeId) -> SourceLoc {
        self.node(id).loc
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Statements of the global block
    pub fn top_level(&self) -> &[NodeId] {
        match self.kind(self.root) {
            NodeKind::Block { stmts } => stmts,
            _ => &[],
        }
    }

    /// Every node reachable from the root, in pre-order
    pub fn reachable(&self) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            order.push(id);
            let children = self.kind(id).children();
            stack.extend(children.into_iter().rev());
        }
        order
    }
}
