//! Typed values flowing through codegen

use crate::middle::ir::Value;
use crate::types::TypeId;

/// Value category of a lowered node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    /// The value is the address of a storage slot
    LValue,
    RValue,
}

/// An IR value paired with its source-level type
#[derive(Debug, Clone, PartialEq)]
pub struct TypedValue {
    pub ty: TypeId,
    pub value: Value,
    pub category: Category,
    pub mutable: bool,
    /// An integer or float literal that may still be re-typed
    pub literal: bool,
}

impl TypedValue {
    pub fn rvalue(ty: TypeId, value: Value) -> Self {
        Self {
            ty,
            value,
            category: Category::RValue,
            mutable: false,
            literal: false,
        }
    }

    pub fn lvalue(ty: TypeId, address: Value, mutable: bool) -> Self {
        Self {
            ty,
            value: address,
            category: Category::LValue,
            mutable,
            literal: false,
        }
    }

    pub fn literal(ty: TypeId, value: Value) -> Self {
        Self {
            literal: true,
            ..Self::rvalue(ty, value)
        }
    }

    pub fn is_lvalue(&self) -> bool {
        self.category == Category::LValue
    }
}
