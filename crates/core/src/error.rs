//! Error types for the migration engine
//!
//! Stage-internal plumbing uses `anyhow`; the variants here are the failures
//! callers are expected to match on (missing meta file, unknown entity, I/O
//! against a specific path).

use std::path::PathBuf;

/// Errors raised by the migration pipeline
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    /// The mandatory `{name}.meta.ts` file is absent for a discovered entity
    #[error("no meta file found for entity '{entity}' in {dir}")]
    MissingMetaFile { entity: String, dir: PathBuf },

    /// `--entity` named something the module does not contain
    #[error("entity '{entity}' not found in {dir}")]
    EntityNotFound { entity: String, dir: PathBuf },

    /// `--path` does not point at a directory
    #[error("module directory not found: {0}")]
    ModuleNotFound(PathBuf),

    /// IO error against a specific file
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// tree-sitter could not produce a tree for the file
    #[error("syntax error in {path}: {message}")]
    Syntax { path: PathBuf, message: String },

    /// The TypeScript grammar could not be loaded
    #[error("failed to initialise TypeScript parser: {0}")]
    ParserInit(String),

    /// `migrator.toml` could not be parsed
    #[error("invalid configuration in {path}: {message}")]
    Config { path: PathBuf, message: String },
}

impl MigrationError {
    /// Create IO error for path
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create syntax error for path
    pub fn syntax(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Syntax {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Read a file, attaching the path to any IO failure
pub fn read_source(path: &std::path::Path) -> Result<String, MigrationError> {
    std::fs::read_to_string(path).map_err(|e| MigrationError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_meta_display() {
        let err = MigrationError::MissingMetaFile {
            entity: "photo".to_string(),
            dir: PathBuf::from("/src/photo/entities"),
        };
        assert_eq!(
            err.to_string(),
            "no meta file found for entity 'photo' in /src/photo/entities"
        );
    }

    #[test]
    fn read_source_reports_path() {
        let err = read_source(std::path::Path::new("/definitely/not/here.ts")).unwrap_err();
        assert!(matches!(err, MigrationError::Io { .. }));
        assert!(err.to_string().contains("/definitely/not/here.ts"));
    }
}
