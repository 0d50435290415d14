//! Constant semantics of IR operations
//!
//! Shared by the constant folder, the cast lowering and the evaluator so
//! the three agree on wrapping, signedness and float rounding.

use crate::middle::ir::{BinOp, CastOp, CmpPred, Constant, IRType, UnaryOp};

fn int_result(ty: &IRType, value: i64) -> Constant {
    if *ty == IRType::Bool {
        Constant::Bool(value & 1 != 0)
    } else {
        Constant::Int(ty.normalize(value))
    }
}

fn float_result(ty: &IRType, value: f64) -> Constant {
    if *ty == IRType::F32 {
        Constant::Float(value as f32 as f64)
    } else {
        Constant::Float(value)
    }
}

pub fn binop(op: BinOp, ty: &IRType, a: &Constant, b: &Constant) -> Option<Constant> {
    if ty.is_float() {
        let (x, y) = (a.as_float()?, b.as_float()?);
        let r = match op {
            BinOp::FAdd => x + y,
            BinOp::FSub => x - y,
            BinOp::FMul => x * y,
            BinOp::FDiv => x / y,
            BinOp::FRem => x % y,
            _ => return None,
        };
        return Some(float_result(ty, r));
    }

    let (x, y) = (ty.normalize(a.as_int()?), ty.normalize(b.as_int()?));
    let (ux, uy) = (ty.unsigned(x), ty.unsigned(y));
    let width = ty.bit_width();
    let r = match op {
        BinOp::Add => x.wrapping_add(y),
        BinOp::Sub => x.wrapping_sub(y),
        BinOp::Mul => x.wrapping_mul(y),
        BinOp::SDiv if y != 0 => x.wrapping_div(y),
        BinOp::SRem if y != 0 => x.wrapping_rem(y),
        BinOp::UDiv if uy != 0 => (ux / uy) as i64,
        BinOp::URem if uy != 0 => (ux % uy) as i64,
        BinOp::And => x & y,
        BinOp::Or => x | y,
        BinOp::Xor => x ^ y,
        BinOp::Shl if (0..i64::from(width)).contains(&y) => x.wrapping_shl(y as u32),
        BinOp::AShr if (0..i64::from(width)).contains(&y) => x >> y,
        BinOp::LShr if (0..i64::from(width)).contains(&y) => (ux >> y) as i64,
        _ => return None,
    };
    Some(int_result(ty, r))
}

pub fn cmp(pred: CmpPred, ty: &IRType, a: &Constant, b: &Constant) -> Option<Constant> {
    let r = if pred.is_float() {
        let (x, y) = (a.as_float()?, b.as_float()?);
        let ordered = !x.is_nan() && !y.is_nan();
        match pred {
            CmpPred::Oeq => ordered && x == y,
            CmpPred::One => ordered && x != y,
            CmpPred::Olt => ordered && x < y,
            CmpPred::Ole => ordered && x <= y,
            CmpPred::Ogt => ordered && x > y,
            CmpPred::Oge => ordered && x >= y,
            CmpPred::Une => !ordered || x != y,
            _ => return None,
        }
    } else {
        let (x, y) = (ty.normalize(a.as_int()?), ty.normalize(b.as_int()?));
        let (ux, uy) = (ty.unsigned(x), ty.unsigned(y));
        match pred {
            CmpPred::Eq => x == y,
            CmpPred::Ne => x != y,
            CmpPred::Slt => x < y,
            CmpPred::Sle => x <= y,
            CmpPred::Sgt => x > y,
            CmpPred::Sge => x >= y,
            CmpPred::Ult => ux < uy,
            CmpPred::Ule => ux <= uy,
            CmpPred::Ugt => ux > uy,
            CmpPred::Uge => ux >= uy,
            _ => return None,
        }
    };
    Some(Constant::Bool(r))
}

pub fn unary(op: UnaryOp, ty: &IRType, a: &Constant) -> Option<Constant> {
    match op {
        UnaryOp::FNeg => Some(float_result(ty, -a.as_float()?)),
        UnaryOp::Neg => Some(int_result(ty, a.as_int()?.wrapping_neg())),
        UnaryOp::Not => Some(int_result(ty, !a.as_int()?)),
    }
}

pub fn cast(op: CastOp, a: &Constant, from: &IRType, to: &IRType) -> Option<Constant> {
    let r = match op {
        CastOp::Trunc | CastOp::SExt => int_result(to, from.normalize(a.as_int()?)),
        CastOp::ZExt => int_result(to, from.unsigned(a.as_int()?) as i64),
        CastOp::SIToFP => float_result(to, from.normalize(a.as_int()?) as f64),
        CastOp::UIToFP => float_result(to, from.unsigned(a.as_int()?) as f64),
        CastOp::FPToSI => int_result(to, a.as_float()? as i64),
        CastOp::FPToUI => int_result(to, a.as_float()? as u64 as i64),
        CastOp::FPTrunc | CastOp::FPExt => float_result(to, a.as_float()?),
        CastOp::Bitcast => match (a, from, to) {
            (Constant::Int(n), IRType::I32, IRType::F32) => {
                Constant::Float(f32::from_bits(*n as u32) as f64)
            }
            (Constant::Int(n), IRType::I64, IRType::F64) => Constant::Float(f64::from_bits(*n as u64)),
            (Constant::Float(f), IRType::F32, IRType::I32) => {
                Constant::Int((*f as f32).to_bits() as i32 as i64)
            }
            (Constant::Float(f), IRType::F64, IRType::I64) => Constant::Int(f.to_bits() as i64),
            (c, from, to) if from == to => c.clone(),
            (Constant::Int(n), from, to) if from.is_integer() && to.is_integer() => int_result(to, *n),
            _ => return None,
        },
    };
    Some(r)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_wrapping() {
        assert_eq!(
            binop(BinOp::Add, &IRType::I8, &Constant::Int(127), &Constant::Int(1)),
            Some(Constant::Int(-128))
        );
        assert_eq!(
            binop(BinOp::UDiv, &IRType::I8, &Constant::Int(-2), &Constant::Int(2)),
            Some(Constant::Int(127))
        );
        assert_eq!(binop(BinOp::SDiv, &IRType::I32, &Constant::Int(1), &Constant::Int(0)), None);
        assert_eq!(binop(BinOp::Shl, &IRType::I32, &Constant::Int(1), &Constant::Int(40)), None);
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(
            cmp(CmpPred::Ult, &IRType::I8, &Constant::Int(1), &Constant::Int(-1)),
            Some(Constant::Bool(true))
        );
        assert_eq!(
            cmp(CmpPred::Slt, &IRType::I8, &Constant::Int(1), &Constant::Int(-1)),
            Some(Constant::Bool(false))
        );
        assert_eq!(
            cmp(CmpPred::Une, &IRType::F64, &Constant::Float(f64::NAN), &Constant::Float(0.0)),
            Some(Constant::Bool(true))
        );
    }

    #[test]
    fn test_casts() {
        assert_eq!(
            cast(CastOp::ZExt, &Constant::Int(-1), &IRType::I8, &IRType::I32),
            Some(Constant::Int(255))
        );
        assert_eq!(
            cast(CastOp::SExt, &Constant::Int(-1), &IRType::I8, &IRType::I32),
            Some(Constant::Int(-1))
        );
        assert_eq!(
            cast(CastOp::Trunc, &Constant::Int(300), &IRType::I32, &IRType::I8),
            Some(Constant::Int(44))
        );
        assert_eq!(
            cast(CastOp::ZExt, &Constant::Bool(true), &IRType::Bool, &IRType::I64),
            Some(Constant::Int(1))
        );
        assert_eq!(
            cast(CastOp::FPToSI, &Constant::Float(-2.75), &IRType::F64, &IRType::I32),
            Some(Constant::Int(-2))
        );
    }
}
