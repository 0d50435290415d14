//! Per-type operation dispatch
//!
//! Each type kind has a static [`TypeOperations`] strategy. Codegen lowers
//! every operand first and then hands the operator and operands to the
//! strategy of operand 0's type.

use crate::frontend::ast::{OperatorKind, PassMode};
use crate::middle::builder::IrBuilder;
use crate::middle::ir::{BinOp, CmpPred, IRType, Value};
use crate::types::cast::{cast, is_same_or_implicitly_castable, CastMode};
use crate::types::{Category, Kind, TypeId, TypeTable, TypedValue};
use crate::utils::{Error, Result, SourceLoc};

/// Everything an operation needs besides its operands
pub struct OpContext<'a> {
    pub builder: &'a mut dyn IrBuilder,
    pub types: &'a mut TypeTable,
    pub loc: SourceLoc,
}

impl<'a> OpContext<'a> {
    pub fn new(builder: &'a mut dyn IrBuilder, types: &'a mut TypeTable, loc: SourceLoc) -> Self {
        Self { builder, types, loc }
    }

    fn name(&self, ty: TypeId) -> String {
        self.types.get(ty).decorated_name()
    }

    fn unsupported(&self, op: OperatorKind, ty: TypeId) -> Error {
        Error::unsupported(op, self.name(ty), self.loc)
    }

    fn ir(&self, ty: TypeId) -> IRType {
        self.types.get(ty).ir.clone()
    }

    /// Read through an lvalue; rvalues pass through
    pub fn load(&mut self, value: TypedValue) -> Result<TypedValue> {
        if value.category != Category::LValue {
            return Ok(value);
        }
        let ty = self.types.immutable_of(value.ty);
        let ir = self.ir(ty);
        let loaded = self.builder.create_load(ir, value.value)?;
        Ok(TypedValue::rvalue(ty, loaded))
    }

    /// Both operands share a type up to mutability; yields that type unqualified
    fn same_type(&mut self, lhs: &TypedValue, rhs: &TypedValue) -> Result<TypeId> {
        if !self.types.basic_equal(lhs.ty, rhs.ty) {
            return Err(Error::mismatch(self.name(lhs.ty), self.name(rhs.ty), self.loc));
        }
        Ok(self.types.immutable_of(lhs.ty))
    }
}

fn expect_operands<const N: usize>(operands: Vec<TypedValue>) -> Result<[TypedValue; N]> {
    let got = operands.len();
    operands
        .try_into()
        .map_err(|_| Error::invariant(format!("expected {} operands, got {}", N, got)))
}

/// Operation strategy of one type kind
pub trait TypeOperations: Sync {
    /// `[lhs, rhs]`: store `rhs` (or `lhs op rhs` for compound forms) into `lhs`
    fn assignment_op(&self, ctx: &mut OpContext<'_>, op: OperatorKind, operands: Vec<TypedValue>) -> Result<TypedValue> {
        let [lhs, rhs] = expect_operands(operands)?;
        if !lhs.is_lvalue() || !lhs.mutable {
            let plain = ctx.name(lhs.ty);
            return Err(Error::mismatch(format!("mut {}", plain.trim_start_matches("mut ")), plain, ctx.loc));
        }
        let slot = lhs.value.clone();
        let target = ctx.types.immutable_of(lhs.ty);

        let value = match op {
            OperatorKind::Assign => ctx.load(rhs)?,
            _ => {
                let base = op.compound_base().ok_or_else(|| ctx.unsupported(op, lhs.ty))?;
                let current = ctx.load(lhs)?;
                let rhs = ctx.load(rhs)?;
                self.binary_op(ctx, base, vec![current, rhs])?
            }
        };
        if !is_same_or_implicitly_castable(ctx.types, &value, target) {
            return Err(Error::mismatch(ctx.name(target), ctx.name(value.ty), ctx.loc));
        }
        let value = cast(ctx, CastMode::Implicit, value, target)?;
        let ir = ctx.ir(target);
        ctx.builder.create_store(ir, value.value.clone(), slot)?;
        Ok(value)
    }

    fn unary_op(&self, ctx: &mut OpContext<'_>, op: OperatorKind, operands: Vec<TypedValue>) -> Result<TypedValue> {
        let [x] = expect_operands(operands)?;
        Err(ctx.unsupported(op, x.ty))
    }

    fn binary_op(&self, ctx: &mut OpContext<'_>, op: OperatorKind, operands: Vec<TypedValue>) -> Result<TypedValue> {
        let [l, _] = expect_operands(operands)?;
        Err(ctx.unsupported(op, l.ty))
    }

    fn arbitrary_op(&self, ctx: &mut OpContext<'_>, op: OperatorKind, operands: Vec<TypedValue>) -> Result<TypedValue> {
        let ty = operands
            .first()
            .map(|v| v.ty)
            .ok_or_else(|| Error::invariant("n-ary operation without operands"))?;
        Err(ctx.unsupported(op, ty))
    }
}

/// Strategy for a kind
pub fn operations(kind: Kind) -> &'static dyn TypeOperations {
    match kind {
        k if k.is_integral() => &IntegralOps,
        k if k.is_floating() => &FloatingOps,
        k if k.is_char() => &CharOps,
        Kind::Bool => &BoolOps,
        Kind::Function => &FunctionOps,
        _ => &OpaqueOps,
    }
}

fn compare(
    ctx: &mut OpContext<'_>,
    pred: CmpPred,
    ty: TypeId,
    l: TypedValue,
    r: TypedValue,
) -> Result<TypedValue> {
    let ir = ctx.ir(ty);
    let v = ctx.builder.create_cmp(pred, ir, l.value, r.value)?;
    Ok(TypedValue::rvalue(ctx.types.bool(), v))
}

fn int_predicate(op: OperatorKind, unsigned: bool) -> Option<CmpPred> {
    Some(match (op, unsigned) {
        (OperatorKind::Eq, _) => CmpPred::Eq,
        (OperatorKind::Ne, _) => CmpPred::Ne,
        (OperatorKind::Lt, false) => CmpPred::Slt,
        (OperatorKind::Le, false) => CmpPred::Sle,
        (OperatorKind::Gt, false) => CmpPred::Sgt,
        (OperatorKind::Ge, false) => CmpPred::Sge,
        (OperatorKind::Lt, true) => CmpPred::Ult,
        (OperatorKind::Le, true) => CmpPred::Ule,
        (OperatorKind::Gt, true) => CmpPred::Ugt,
        (OperatorKind::Ge, true) => CmpPred::Uge,
        _ => return None,
    })
}

/// i8 through i64, `int` and `byte`
struct IntegralOps;

impl TypeOperations for IntegralOps {
    fn unary_op(&self, ctx: &mut OpContext<'_>, op: OperatorKind, operands: Vec<TypedValue>) -> Result<TypedValue> {
        let [x] = expect_operands(operands)?;
        let x = ctx.load(x)?;
        let ty = ctx.types.immutable_of(x.ty);
        match op {
            OperatorKind::UnaryPlus => {
                let int = ctx.types.int();
                cast(ctx, CastMode::Explicit, x, int)
            }
            OperatorKind::UnaryMinus => {
                let ir = ctx.ir(ty);
                let v = ctx.builder.create_neg(ir, x.value)?;
                Ok(TypedValue::rvalue(ty, v))
            }
            OperatorKind::BitNot => {
                let ir = ctx.ir(ty);
                let v = ctx.builder.create_not(ir, x.value)?;
                Ok(TypedValue::rvalue(ty, v))
            }
            OperatorKind::LogicalNot => {
                let ir = ctx.ir(ty);
                let v = ctx.builder.create_icmp_eq(ir, x.value, Value::int(0))?;
                Ok(TypedValue::rvalue(ctx.types.bool(), v))
            }
            _ => Err(ctx.unsupported(op, ty)),
        }
    }

    fn binary_op(&self, ctx: &mut OpContext<'_>, op: OperatorKind, operands: Vec<TypedValue>) -> Result<TypedValue> {
        let [l, r] = expect_operands(operands)?;
        let ty = ctx.same_type(&l, &r)?;
        let unsigned = ctx.types.kind(ty).is_unsigned();

        if let Some(pred) = int_predicate(op, unsigned) {
            return compare(ctx, pred, ty, l, r);
        }
        let bin = match op {
            OperatorKind::Add => BinOp::Add,
            OperatorKind::Sub => BinOp::Sub,
            OperatorKind::Mul => BinOp::Mul,
            OperatorKind::Div if unsigned => BinOp::UDiv,
            OperatorKind::Div => BinOp::SDiv,
            OperatorKind::Mod if unsigned => BinOp::URem,
            OperatorKind::Mod => BinOp::SRem,
            OperatorKind::BitAnd => BinOp::And,
            OperatorKind::BitOr => BinOp::Or,
            OperatorKind::BitXor => BinOp::Xor,
            OperatorKind::Shl => BinOp::Shl,
            OperatorKind::Shr if unsigned => BinOp::LShr,
            OperatorKind::Shr => BinOp::AShr,
            _ => return Err(ctx.unsupported(op, ty)),
        };
        let ir = ctx.ir(ty);
        let v = ctx.builder.create_binop(bin, ir, l.value, r.value)?;
        Ok(TypedValue::rvalue(ty, v))
    }
}

/// f32, f64 and `float`
struct FloatingOps;

impl TypeOperations for FloatingOps {
    fn unary_op(&self, ctx: &mut OpContext<'_>, op: OperatorKind, operands: Vec<TypedValue>) -> Result<TypedValue> {
        let [x] = expect_operands(operands)?;
        let x = ctx.load(x)?;
        let ty = ctx.types.immutable_of(x.ty);
        if op != OperatorKind::UnaryMinus {
            return Err(ctx.unsupported(op, ty));
        }
        let ir = ctx.ir(ty);
        let v = ctx.builder.create_neg(ir, x.value)?;
        Ok(TypedValue::rvalue(ty, v))
    }

    fn binary_op(&self, ctx: &mut OpContext<'_>, op: OperatorKind, operands: Vec<TypedValue>) -> Result<TypedValue> {
        let [l, r] = expect_operands(operands)?;
        let ty = ctx.same_type(&l, &r)?;
        let pred = match op {
            OperatorKind::Eq => Some(CmpPred::Oeq),
            OperatorKind::Ne => Some(CmpPred::One),
            OperatorKind::Lt => Some(CmpPred::Olt),
            OperatorKind::Le => Some(CmpPred::Ole),
            OperatorKind::Gt => Some(CmpPred::Ogt),
            OperatorKind::Ge => Some(CmpPred::Oge),
            _ => None,
        };
        if let Some(pred) = pred {
            return compare(ctx, pred, ty, l, r);
        }
        let bin = match op {
            OperatorKind::Add => BinOp::FAdd,
            OperatorKind::Sub => BinOp::FSub,
            OperatorKind::Mul => BinOp::FMul,
            OperatorKind::Div => BinOp::FDiv,
            OperatorKind::Mod => BinOp::FRem,
            _ => return Err(ctx.unsupported(op, ty)),
        };
        let ir = ctx.ir(ty);
        let v = ctx.builder.create_binop(bin, ir, l.value, r.value)?;
        Ok(TypedValue::rvalue(ty, v))
    }
}

struct BoolOps;

impl TypeOperations for BoolOps {
    fn unary_op(&self, ctx: &mut OpContext<'_>, op: OperatorKind, operands: Vec<TypedValue>) -> Result<TypedValue> {
        let [x] = expect_operands(operands)?;
        let x = ctx.load(x)?;
        let ty = ctx.types.bool();
        if op != OperatorKind::LogicalNot {
            return Err(ctx.unsupported(op, ty));
        }
        let v = ctx.builder.create_not(IRType::Bool, x.value)?;
        Ok(TypedValue::rvalue(ty, v))
    }

    fn binary_op(&self, ctx: &mut OpContext<'_>, op: OperatorKind, operands: Vec<TypedValue>) -> Result<TypedValue> {
        let [l, r] = expect_operands(operands)?;
        let ty = ctx.same_type(&l, &r)?;
        let bin = match op {
            OperatorKind::Eq => return compare(ctx, CmpPred::Eq, ty, l, r),
            OperatorKind::Ne => return compare(ctx, CmpPred::Ne, ty, l, r),
            OperatorKind::BitAnd | OperatorKind::LogicalAnd => BinOp::And,
            OperatorKind::BitOr | OperatorKind::LogicalOr => BinOp::Or,
            OperatorKind::BitXor => BinOp::Xor,
            _ => return Err(ctx.unsupported(op, ty)),
        };
        let v = ctx.builder.create_binop(bin, IRType::Bool, l.value, r.value)?;
        Ok(TypedValue::rvalue(ty, v))
    }
}

/// `char` and `bchar`: comparisons only
struct CharOps;

impl TypeOperations for CharOps {
    fn binary_op(&self, ctx: &mut OpContext<'_>, op: OperatorKind, operands: Vec<TypedValue>) -> Result<TypedValue> {
        let [l, r] = expect_operands(operands)?;
        if !op.is_comparison() {
            return Err(ctx.unsupported(op, l.ty));
        }
        let ty = ctx.same_type(&l, &r)?;
        match int_predicate(op, true) {
            Some(pred) => compare(ctx, pred, ty, l, r),
            None => Err(ctx.unsupported(op, ty)),
        }
    }
}

/// Function types: calls
struct FunctionOps;

impl TypeOperations for FunctionOps {
    fn arbitrary_op(&self, ctx: &mut OpContext<'_>, op: OperatorKind, operands: Vec<TypedValue>) -> Result<TypedValue> {
        let mut operands = operands.into_iter();
        let callee = operands
            .next()
            .ok_or_else(|| Error::invariant("call without callee"))?;
        if op != OperatorKind::Call {
            return Err(ctx.unsupported(op, callee.ty));
        }
        let Value::Function(name) = &callee.value else {
            return Err(Error::mismatch("function", ctx.name(callee.ty), ctx.loc));
        };
        let signature = ctx
            .types
            .get(callee.ty)
            .signature
            .clone()
            .ok_or_else(|| Error::invariant(format!("function type {} has no signature", ctx.name(callee.ty))))?;

        let args: Vec<TypedValue> = operands.collect();
        if args.len() != signature.params.len() {
            return Err(Error::mismatch(
                format!("{} arguments to {}", signature.params.len(), name),
                format!("{}", args.len()),
                ctx.loc,
            ));
        }

        let mut lowered = Vec::with_capacity(args.len());
        for (i, (arg, (param, mode))) in args.into_iter().zip(signature.params.iter()).enumerate() {
            let expected = || format!("{} {} for argument {}", mode, ctx.types.get(*param).decorated_name(), i + 1);
            if *mode == PassMode::Ref {
                if !arg.is_lvalue() || !arg.mutable || !ctx.types.basic_equal(arg.ty, *param) {
                    return Err(Error::mismatch(expected(), ctx.name(arg.ty), ctx.loc));
                }
                lowered.push(arg.value);
                continue;
            }
            let arg = ctx.load(arg)?;
            if !is_same_or_implicitly_castable(ctx.types, &arg, *param) {
                return Err(Error::mismatch(
                    format!("{} for argument {}", ctx.name(*param), i + 1),
                    ctx.name(arg.ty),
                    ctx.loc,
                ));
            }
            lowered.push(cast(ctx, CastMode::Implicit, arg, *param)?.value);
        }

        let ret_ir = ctx.ir(signature.ret);
        let v = ctx.builder.create_call(name, lowered, ret_ir)?;
        let ret = ctx.types.immutable_of(signature.ret);
        Ok(TypedValue::rvalue(ret, v))
    }
}

/// void, string and cstring: assignment only
struct OpaqueOps;

impl TypeOperations for OpaqueOps {}
