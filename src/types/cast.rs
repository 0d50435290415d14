//! Cast decisions and their lowering

use crate::middle::builder::IrBuilder;
use crate::middle::fold;
use crate::middle::ir::{CastOp, CmpPred, Constant, IRType, Value};
use crate::types::{Kind, OpContext, TypeId, TypeTable, TypedValue};
use crate::utils::{Error, Result};

/// Which conversions a cast site allows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastMode {
    /// Only identity (mutability and aliases aside)
    Implicit,
    /// `as` casts
    Explicit,
    /// Reinterpretation between equal-width representations
    Bitcast,
}

/// How a value of one type becomes a value of another
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastPlan {
    Identity,
    /// Same IR value under a different source type
    Retag,
    Convert(CastOp),
    /// Compare against zero, yielding `bool`
    NotZero,
}

/// Decide whether `from` converts to `to` under `mode`
pub fn plan(types: &TypeTable, from: TypeId, to: TypeId, mode: CastMode) -> Option<CastPlan> {
    if from == to {
        return Some(CastPlan::Identity);
    }
    if types.basic_equal(from, to) {
        return Some(CastPlan::Retag);
    }
    match mode {
        CastMode::Implicit => None,
        CastMode::Bitcast => bitcast_plan(types, from, to),
        CastMode::Explicit => {
            let (fk, tk) = (types.kind(from), types.kind(to));
            if fk.is_char() || tk.is_char() {
                return bitcast_plan(types, from, to);
            }
            explicit_plan(types, fk, tk, from, to)
        }
    }
}

fn bitcast_plan(types: &TypeTable, from: TypeId, to: TypeId) -> Option<CastPlan> {
    let (fi, ti) = (&types.get(from).ir, &types.get(to).ir);
    let castable = |ty: &IRType| !matches!(ty, IRType::Void | IRType::Function { .. });
    if !castable(fi) || !castable(ti) || fi.bit_width() != ti.bit_width() {
        return None;
    }
    if fi == ti {
        Some(CastPlan::Retag)
    } else {
        Some(CastPlan::Convert(CastOp::Bitcast))
    }
}

fn explicit_plan(types: &TypeTable, fk: Kind, tk: Kind, from: TypeId, to: TypeId) -> Option<CastPlan> {
    let (fw, tw) = (types.get(from).ir.bit_width(), types.get(to).ir.bit_width());
    let plan = if fk.is_integral() && tk.is_integral() {
        if fw > tw {
            CastPlan::Convert(CastOp::Trunc)
        } else if fw < tw && fk.is_unsigned() {
            CastPlan::Convert(CastOp::ZExt)
        } else if fw < tw {
            CastPlan::Convert(CastOp::SExt)
        } else {
            CastPlan::Retag
        }
    } else if fk.is_integral() && tk == Kind::Bool {
        CastPlan::NotZero
    } else if fk.is_integral() && tk.is_floating() {
        CastPlan::Convert(if fk.is_unsigned() { CastOp::UIToFP } else { CastOp::SIToFP })
    } else if fk == Kind::Bool && tk.is_integral() {
        CastPlan::Convert(CastOp::ZExt)
    } else if fk == Kind::Bool && tk.is_floating() {
        CastPlan::Convert(CastOp::UIToFP)
    } else if fk.is_floating() && tk.is_integral() {
        CastPlan::Convert(if tk.is_unsigned() { CastOp::FPToUI } else { CastOp::FPToSI })
    } else if fk.is_floating() && tk == Kind::Bool {
        CastPlan::NotZero
    } else if fk.is_floating() && tk.is_floating() {
        if fw > tw {
            CastPlan::Convert(CastOp::FPTrunc)
        } else if fw < tw {
            CastPlan::Convert(CastOp::FPExt)
        } else {
            CastPlan::Retag
        }
    } else {
        return None;
    };
    Some(plan)
}

/// `dst` equals the value's type up to mutability, or an implicit cast exists
pub fn is_same_or_implicitly_castable(types: &TypeTable, value: &TypedValue, dst: TypeId) -> bool {
    types.basic_equal(value.ty, dst) || plan(types, value.ty, dst, CastMode::Implicit).is_some()
}

/// Lower a cast of an rvalue. Constant operands are folded.
pub fn cast(ctx: &mut OpContext<'_>, mode: CastMode, value: TypedValue, dst: TypeId) -> Result<TypedValue> {
    let Some(plan) = plan(ctx.types, value.ty, dst, mode) else {
        return Err(Error::mismatch(
            ctx.types.get(dst).decorated_name(),
            ctx.types.get(value.ty).decorated_name(),
            ctx.loc,
        ));
    };

    let from_ir = ctx.types.get(value.ty).ir.clone();
    let to_ir = ctx.types.get(dst).ir.clone();
    let lowered = match plan {
        CastPlan::Identity => return Ok(value),
        CastPlan::Retag => value.value,
        CastPlan::Convert(op) => match value.value.as_constant() {
            Some(c) => fold::cast(op, c, &from_ir, &to_ir)
                .map(Value::Constant)
                .ok_or_else(|| Error::invariant(format!("cannot fold {} of {}", op, c)))?,
            None => ctx.builder.create_cast(op, value.value, from_ir, to_ir)?,
        },
        CastPlan::NotZero => not_zero(ctx.builder, value.value, from_ir)?,
    };

    Ok(TypedValue::rvalue(dst, lowered))
}

/// `icmp ne v, 0` or `fcmp une v, 0.0`
fn not_zero(builder: &mut dyn IrBuilder, value: Value, ty: IRType) -> Result<Value> {
    let (pred, zero) = if ty.is_float() {
        (CmpPred::Une, Constant::Float(0.0))
    } else {
        (CmpPred::Ne, Constant::Int(0))
    };
    if let Some(c) = value.as_constant() {
        if let Some(folded) = fold::cmp(pred, &ty, c, &zero) {
            return Ok(Value::Constant(folded));
        }
    }
    builder.create_cmp(pred, ty, value, Value::Constant(zero))
}
