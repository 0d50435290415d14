//! Structured Feedback Module
//!
//! Machine-readable compile report written by `--report <path>`: one entry
//! per input file with its diagnostics and artifact, plus the overall status.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::utils::{Diagnostic, Error, Result};

// ==================== Report entries ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

impl From<crate::utils::Severity> for Severity {
    fn from(severity: crate::utils::Severity) -> Self {
        match severity {
            crate::utils::Severity::Error => Severity::Error,
            crate::utils::Severity::Warning => Severity::Warning,
        }
    }
}

/// One diagnostic, as reported
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticReport {
    /// Stable machine tag (e.g. "TypeMismatch")
    pub tag: String,
    pub severity: Severity,
    pub message: String,
    pub line: Option<u32>,
    pub column: Option<u32>,
}

impl From<&Diagnostic> for DiagnosticReport {
    fn from(d: &Diagnostic) -> Self {
        Self {
            tag: d.tag.to_string(),
            severity: d.severity.into(),
            message: d.message.clone(),
            line: d.loc.map(|l| l.line),
            column: d.loc.map(|l| l.column),
        }
    }
}

/// Outcome of compiling one file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileReport {
    pub path: String,
    pub success: bool,
    pub diagnostics: Vec<DiagnosticReport>,
    /// Functions in the lowered module; zero when lowering failed
    pub functions: usize,
    /// Written artifact, if any
    pub artifact: Option<String>,
}

impl FileReport {
    pub fn new(path: &str, diagnostics: &[Diagnostic]) -> Self {
        let mut report = Self {
            path: path.to_string(),
            success: true,
            diagnostics: diagnostics.iter().map(DiagnosticReport::from).collect(),
            functions: 0,
            artifact: None,
        };
        let success = report.errors().next().is_none();
        report.success = success;
        report
    }

    pub fn errors(&self) -> impl Iterator<Item = &DiagnosticReport> {
        self.diagnostics.iter().filter(|d| d.severity == Severity::Error)
    }
}

// ==================== Compile report ====================

/// Complete report of one compiler invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompileReport {
    pub success: bool,
    pub files: Vec<FileReport>,
}

impl CompileReport {
    pub fn new(files: Vec<FileReport>) -> Self {
        Self {
            success: files.iter().all(|f| f.success),
            files,
        }
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_json()).map_err(|e| Error::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }
}
