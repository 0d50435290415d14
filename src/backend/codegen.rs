//! Code Generation trait - Backend abstraction
//!
//! `--emit obj` goes through a `CodeGen`; the bytes it returns are written
//! to the artifact path by the driver.

use crate::middle::ir::IRModule;
use crate::utils::Result;

/// Code generation backend trait
pub trait CodeGen {
    /// Generate an object file from an optimized IR module
    fn generate(&mut self, module: &IRModule) -> Result<Vec<u8>>;

    /// Target triple the object is built for
    fn target_triple(&self) -> &str;

    /// Backend name, for logs
    fn name(&self) -> &str;
}

/// Triple of the machine running the compiler
pub fn host_triple() -> String {
    format!("{}-unknown-{}", std::env::consts::ARCH, std::env::consts::OS)
}
