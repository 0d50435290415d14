//! Middle-end module - semantic analysis, IR and optimization

pub mod builder;
pub mod codegen;
#[cfg(test)]
pub mod eval;
pub mod fold;
pub mod ir;
pub mod ir_printer;
pub mod optimize;
pub mod symbols;
pub mod verify;
