//! Expression lowering

use crate::frontend::ast::{NodeId, NodeKind, OperatorKind, PassMode, StringKind};
use crate::middle::ir::{Constant, IRType, Value};
use crate::types::{cast, operations, CastMode, Kind, TypeId, TypedValue};
use crate::utils::{Error, Result, SourceLoc};

use super::CodegenVisitor;

impl<'a> CodegenVisitor<'a> {
    pub(super) fn lower_expr(&mut self, id: NodeId) -> Result<TypedValue> {
        let ast = self.ast;
        let loc = ast.loc(id);
        match ast.kind(id) {
            NodeKind::Identifier { name } => self.lookup(name, loc),
            NodeKind::VariableReference { name } => {
                let symbol = self.lookup(name, loc)?;
                self.ctx(loc).load(symbol)
            }
            NodeKind::VariableDefinition(def) => self.lower_variable(id, def),
            NodeKind::Cast { expr, ty } => {
                let value = self.lower_rvalue(*expr)?;
                let dst = self.resolve_type(ty)?;
                let dst = self.types.immutable_of(dst);
                cast(&mut self.ctx(loc), CastMode::Explicit, value, dst)
            }
            NodeKind::Call { callee, args } => self.lower_call(*callee, args, loc),
            NodeKind::MemberAccess { object, .. } => self.unsupported_access("member access", *object, loc),
            NodeKind::Subscript { object, .. } => self.unsupported_access("[]", *object, loc),
            NodeKind::SubscriptRanged { object, .. } => self.unsupported_access("[:]", *object, loc),
            NodeKind::UnaryOp { op, operand } => {
                let x = self.lower_rvalue(*operand)?;
                let kind = self.types.kind(x.ty);
                operations(kind).unary_op(&mut self.ctx(loc), *op, vec![x])
            }
            NodeKind::BinaryOp { op, lhs, rhs } => {
                let l = self.lower_rvalue(*lhs)?;
                let r = self.lower_rvalue(*rhs)?;
                let (l, r) = match (l.literal, r.literal) {
                    (true, false) => (self.adapt_literal(l, r.ty), r),
                    (false, true) => {
                        let ty = l.ty;
                        (l, self.adapt_literal(r, ty))
                    }
                    // two literals meet at the wider type
                    (true, true) if self.literal_width(&l) < self.literal_width(&r) => {
                        let ty = r.ty;
                        (self.adapt_literal(l, ty), r)
                    }
                    (true, true) => {
                        let ty = l.ty;
                        (l, self.adapt_literal(r, ty))
                    }
                    _ => (l, r),
                };
                let kind = self.types.kind(l.ty);
                operations(kind).binary_op(&mut self.ctx(loc), *op, vec![l, r])
            }
            NodeKind::AssignmentOp { op, lhs, rhs } => {
                let target = self.lower_expr(*lhs)?;
                let value = self.lower_rvalue(*rhs)?;
                let value = self.adapt_literal(value, target.ty);
                let kind = self.types.kind(target.ty);
                operations(kind).assignment_op(&mut self.ctx(loc), *op, vec![target, value])
            }
            kind => self
                .lower_literal(kind)
                .ok_or_else(|| Error::invariant(format!("{} is not an expression", kind.name()))),
        }
    }

    /// Lower and read through any lvalue
    fn lower_rvalue(&mut self, id: NodeId) -> Result<TypedValue> {
        let loc = self.ast.loc(id);
        let value = self.lower_expr(id)?;
        self.ctx(loc).load(value)
    }

    fn lookup(&self, name: &str, loc: SourceLoc) -> Result<TypedValue> {
        self.symbols
            .find(name)
            .map(|s| s.value.clone())
            .ok_or_else(|| Error::UndefinedSymbol { name: name.to_string(), loc })
    }

    fn unsupported_access(&mut self, op: &str, object: NodeId, loc: SourceLoc) -> Result<TypedValue> {
        let object = self.lower_expr(object)?;
        Err(Error::unsupported(op, self.type_name(object.ty), loc))
    }

    /// Literals of every kind; `None` for anything else
    fn lower_literal(&self, kind: &NodeKind) -> Option<TypedValue> {
        let value = match kind {
            NodeKind::IntegerLiteral(n) => {
                let ty = if i32::try_from(*n).is_ok() {
                    self.types.i32()
                } else {
                    self.types.primitive("i64")
                };
                TypedValue::literal(ty, Value::int(*n))
            }
            NodeKind::FloatLiteral(x) => TypedValue::literal(self.types.f64(), Value::Constant(Constant::Float(*x))),
            NodeKind::BoolLiteral(b) => TypedValue::rvalue(self.types.bool(), Value::Constant(Constant::Bool(*b))),
            NodeKind::StringLiteral { value, kind } => {
                let ty = match kind {
                    StringKind::Plain => self.types.primitive("string"),
                    StringKind::C => self.types.primitive("cstring"),
                };
                TypedValue::rvalue(ty, Value::Constant(Constant::String(value.clone())))
            }
            NodeKind::CharLiteral { value, byte } => {
                let (ty, n) = if *byte {
                    (self.types.primitive("bchar"), i64::from(*value as u8 as i8))
                } else {
                    (self.types.primitive("char"), IRType::I32.normalize(i64::from(*value)))
                };
                TypedValue::rvalue(ty, Value::int(n))
            }
            NodeKind::NoneLiteral => TypedValue::rvalue(self.types.void(), Value::Unit),
            _ => return None,
        };
        Some(value)
    }

    /// Global initializers: literals and casts of constants
    pub(super) fn lower_constant(&mut self, id: NodeId) -> Result<TypedValue> {
        let ast = self.ast;
        let loc = ast.loc(id);
        match ast.kind(id) {
            NodeKind::Cast { expr, ty } => {
                let value = self.lower_constant(*expr)?;
                let dst = self.resolve_type(ty)?;
                let dst = self.types.immutable_of(dst);
                cast(&mut self.ctx(loc), CastMode::Explicit, value, dst)
            }
            kind => match self.lower_literal(kind) {
                Some(value) if value.value.as_constant().is_some() => Ok(value),
                _ => Err(Error::unsupported("non-constant initializer", kind.name(), loc)),
            },
        }
    }

    /// Re-type an integer or float literal to the type its context expects.
    /// An integer that does not fit the target keeps its own type.
    pub(super) fn adapt_literal(&mut self, value: TypedValue, target: TypeId) -> TypedValue {
        if !value.literal {
            return value;
        }
        let target = self.types.immutable_of(target);
        let kind = self.types.kind(target);
        let ir = self.types.get(target).ir.clone();
        let constant = match &value.value {
            Value::Constant(Constant::Int(n)) if kind.is_integral() => {
                let fits = match kind {
                    Kind::Byte => (0..=255).contains(n),
                    _ => ir.normalize(*n) == *n,
                };
                if !fits {
                    return value;
                }
                Constant::Int(ir.normalize(*n))
            }
            Value::Constant(Constant::Float(x)) if kind.is_floating() => match ir {
                IRType::F32 => Constant::Float(*x as f32 as f64),
                _ => Constant::Float(*x),
            },
            _ => return value,
        };
        TypedValue::literal(target, Value::Constant(constant))
    }

    fn literal_width(&self, value: &TypedValue) -> u32 {
        self.types.get(value.ty).ir.bit_width()
    }

    /// Calls: `ref` arguments that name a variable are passed as lvalues
    fn lower_call(&mut self, callee: NodeId, args: &[NodeId], loc: SourceLoc) -> Result<TypedValue> {
        let ast = self.ast;
        let callee = self.lower_rvalue(callee)?;
        if self.types.kind(callee.ty) != Kind::Function {
            return Err(Error::unsupported(OperatorKind::Call, self.type_name(callee.ty), loc));
        }
        let params = self
            .types
            .get(callee.ty)
            .signature
            .as_ref()
            .map(|s| s.params.clone())
            .unwrap_or_default();

        let mut operands = Vec::with_capacity(args.len() + 1);
        operands.push(callee);
        for (i, &arg) in args.iter().enumerate() {
            let value = match (params.get(i), ast.kind(arg)) {
                (Some((_, PassMode::Ref)), NodeKind::VariableReference { name }) => self.lookup(name, ast.loc(arg))?,
                (Some(&(ty, _)), _) => {
                    let value = self.lower_rvalue(arg)?;
                    self.adapt_literal(value, ty)
                }
                (None, _) => self.lower_rvalue(arg)?,
            };
            operands.push(value);
        }
        operations(Kind::Function).arbitrary_op(&mut self.ctx(loc), OperatorKind::Call, operands)
    }
}
