//! Utility module

mod diagnostics;
mod error;
mod source;

pub use diagnostics::{Diagnostic, Diagnostics, Severity};
pub use error::{Error, Result};
pub use source::{FileCache, FileId, SourceFile, SourceLoc};
