//! Source files and location tracking

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::utils::{Error, Result};

/// Dense index of a registered source file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct FileId(pub usize);

/// A position in the source code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceLoc {
    /// File ID
    pub file_id: FileId,
    /// 1-based line
    pub line: u32,
    /// 1-based column
    pub column: u32,
}

impl SourceLoc {
    /// Create a new location
    pub fn new(file_id: FileId, line: u32, column: u32) -> Self {
        Self { file_id, line, column }
    }

    /// Create a dummy location (for testing and synthesized nodes)
    pub fn dummy() -> Self {
        Self { file_id: FileId(0), line: 0, column: 0 }
    }
}

impl Default for SourceLoc {
    fn default() -> Self {
        Self::dummy()
    }
}

impl fmt::Display for SourceLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A source file, read once and kept alive for diagnostics
#[derive(Debug)]
pub struct SourceFile {
    pub id: FileId,
    pub path: PathBuf,
    pub contents: String,
}

impl SourceFile {
    pub fn new(id: FileId, path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        Self {
            id,
            path: path.into(),
            contents: contents.into(),
        }
    }

    /// Module name derived from the file stem
    pub fn stem(&self) -> &str {
        self.path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("module")
    }

    /// Text of a 1-based line, for diagnostics
    pub fn line_text(&self, line: u32) -> Option<&str> {
        if line == 0 {
            return None;
        }
        self.contents.lines().nth(line as usize - 1)
    }
}

/// Registry of every input file.
///
/// Append-only while the driver registers inputs, read-only once tasks run.
#[derive(Debug, Default)]
pub struct FileCache {
    files: Vec<Arc<SourceFile>>,
}

impl FileCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a file from disk and register it
    pub fn register(&mut self, path: &Path) -> Result<Arc<SourceFile>> {
        let contents = fs::read_to_string(path).map_err(|e| Error::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Ok(self.register_source(path, contents))
    }

    /// Register in-memory contents under a path
    pub fn register_source(&mut self, path: impl Into<PathBuf>, contents: impl Into<String>) -> Arc<SourceFile> {
        let id = FileId(self.files.len());
        let file = Arc::new(SourceFile::new(id, path, contents));
        self.files.push(Arc::clone(&file));
        file
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }
}
