//! Backend module - object code generation

pub mod c;
pub mod codegen;

pub use c::CCodeGen;
pub use codegen::{host_triple, CodeGen};
