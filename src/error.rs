//! Error types for loading workflow documents.

use std::path::PathBuf;
use thiserror::Error;

/// Errors while reading and parsing a workflow file into a document tree.
///
/// Structural problems inside a document (unknown keys, bad value shapes)
/// are not errors: the loader keeps what it can parse and the engine
/// degrades to "no constraint" for the rest. Only conditions that prevent
/// building a tree at all are reported here.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("cannot read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("tab character used for indentation at line {line}")]
    TabIndentation { line: usize },
}

impl LoadError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            LoadError::FileNotFound { .. } | LoadError::ReadError { .. } => 3,
            LoadError::TabIndentation { .. } => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_error_exit_codes() {
        let err = LoadError::FileNotFound {
            path: PathBuf::from("missing.yml"),
        };
        assert_eq!(err.exit_code(), 3);

        let err = LoadError::TabIndentation { line: 4 };
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn load_error_display() {
        let err = LoadError::TabIndentation { line: 2 };
        assert_eq!(
            err.to_string(),
            "tab character used for indentation at line 2"
        );
    }
}
