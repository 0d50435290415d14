//! Non-fatal diagnostics collected while compiling one file

use crate::utils::{Error, SourceLoc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// A single reported problem
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub tag: &'static str,
    pub message: String,
    pub loc: Option<SourceLoc>,
}

/// Per-file diagnostic sink.
///
/// Warnings are logged as they are raised and never upgraded to errors.
#[derive(Debug, Default)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(&mut self, tag: &'static str, message: impl Into<String>, loc: SourceLoc) {
        let message = message.into();
        log::warn!("{}: warning[{}]: {}", loc, tag, message);
        self.items.push(Diagnostic {
            severity: Severity::Warning,
            tag,
            message,
            loc: Some(loc),
        });
    }

    pub fn error(&mut self, error: &Error) {
        self.items.push(Diagnostic {
            severity: Severity::Error,
            tag: error.tag(),
            message: error.to_string(),
            loc: error.loc(),
        });
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter().filter(|d| d.severity == Severity::Warning)
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.items
    }
}
