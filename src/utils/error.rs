//! Error handling for the Ember compiler

use crate::utils::SourceLoc;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Compiler error
///
/// Every variant maps to a stable tag (see [`Error::tag`]) so reports and
/// tests can match on the kind without parsing messages.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    // ==================== Front-end Errors ====================

    #[error("syntax error: expected {expected}, got {got}")]
    Syntax {
        expected: String,
        got: String,
        loc: SourceLoc,
    },

    #[error("malformed {node}: {message}")]
    Grammar {
        node: String,
        message: String,
        loc: SourceLoc,
    },

    // ==================== Semantic Errors ====================

    #[error("unknown type: {name}")]
    TypeNotFound { name: String, loc: SourceLoc },

    #[error("type mismatch: expected {expected}, got {got}")]
    TypeMismatch {
        expected: String,
        got: String,
        loc: SourceLoc,
    },

    #[error("redefinition of symbol: {name}")]
    RedefinedSymbol { name: String, loc: SourceLoc },

    #[error("undefined symbol: {name}")]
    UndefinedSymbol { name: String, loc: SourceLoc },

    #[error("type {name} has no size")]
    UnsizedType { name: String, loc: SourceLoc },

    #[error("unsupported operation {op} on {ty}")]
    UnsupportedOperation {
        op: String,
        ty: String,
        loc: SourceLoc,
    },

    #[error("function {name} does not return a value on every path")]
    MissingReturn { name: String, loc: SourceLoc },

    // ==================== Internal / Environment Errors ====================

    #[error("internal error: {0}")]
    InternalInvariant(String),

    #[error("cannot access {path}: {message}")]
    Io { path: String, message: String },

    #[error("backend error: {0}")]
    Backend(String),
}

impl Error {
    /// Stable, machine-recognizable tag of the error kind
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Syntax { .. } => "SyntaxError",
            Self::Grammar { .. } => "GrammarError",
            Self::TypeNotFound { .. } => "TypeNotFound",
            Self::TypeMismatch { .. } => "TypeMismatch",
            Self::RedefinedSymbol { .. } => "RedefinedSymbol",
            Self::UndefinedSymbol { .. } => "UndefinedSymbol",
            Self::UnsizedType { .. } => "UnsizedType",
            Self::UnsupportedOperation { .. } => "UnsupportedOperation",
            Self::MissingReturn { .. } => "MissingReturn",
            Self::InternalInvariant(_) => "InternalInvariant",
            Self::Io { .. } => "IoError",
            Self::Backend(_) => "BackendError",
        }
    }

    /// Get the source location associated with this error
    pub fn loc(&self) -> Option<SourceLoc> {
        match self {
            Self::Syntax { loc, .. }
            | Self::Grammar { loc, .. }
            | Self::TypeNotFound { loc, .. }
            | Self::TypeMismatch { loc, .. }
            | Self::RedefinedSymbol { loc, .. }
            | Self::UndefinedSymbol { loc, .. }
            | Self::UnsizedType { loc, .. }
            | Self::UnsupportedOperation { loc, .. }
            | Self::MissingReturn { loc, .. } => Some(*loc),
            Self::InternalInvariant(_) | Self::Io { .. } | Self::Backend(_) => None,
        }
    }

    pub(crate) fn mismatch(expected: impl Into<String>, got: impl Into<String>, loc: SourceLoc) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            got: got.into(),
            loc,
        }
    }

    pub(crate) fn unsupported(op: impl ToString, ty: impl Into<String>, loc: SourceLoc) -> Self {
        Self::UnsupportedOperation {
            op: op.to_string(),
            ty: ty.into(),
            loc,
        }
    }

    pub(crate) fn invariant(message: impl Into<String>) -> Self {
        Self::InternalInvariant(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::FileId;

    #[test]
    fn test_tags_are_stable() {
        let loc = SourceLoc::new(FileId(0), 3, 7);
        assert_eq!(Error::mismatch("i32", "bool", loc).tag(), "TypeMismatch");
        assert_eq!(Error::invariant("boom").tag(), "InternalInvariant");
        assert_eq!(Error::Backend("cc".into()).tag(), "BackendError");
        assert_eq!(
            Error::RedefinedSymbol { name: "x".into(), loc }.tag(),
            "RedefinedSymbol"
        );
    }

    #[test]
    fn test_loc_is_carried() {
        let loc = SourceLoc::new(FileId(2), 10, 1);
        let err = Error::unsupported("%", "string", loc);
        assert_eq!(err.loc(), Some(loc));
        assert_eq!(err.to_string(), "unsupported operation % on string");
        assert_eq!(Error::invariant("x").loc(), None);
    }
}
