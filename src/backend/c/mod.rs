//! C Backend - Generate C code from Ember IR
//!
//! The module is rendered as portable C and handed to the system C compiler.

mod c_codegen;

pub use c_codegen::CCodeGen;
