//! Type system: interned types, casts and per-type operations

pub mod cast;
pub mod ops;
pub mod table;
pub mod value;

pub use cast::{cast, is_same_or_implicitly_castable, CastMode};
pub use ops::{operations, OpContext};
pub use table::{Kind, TypeId, TypeTable};
pub use value::{Category, TypedValue};
