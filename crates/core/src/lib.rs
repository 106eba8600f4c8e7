//! Entity Migrator Core Library
//!
//! This library converts legacy five-file entity definitions (meta, type,
//! model, map, serialiser) into a single descriptor file and rewrites every
//! reference to the retired symbols across a TypeScript source tree.

pub mod changes;
pub mod config;
pub mod cypher;
pub mod diagnostics;
pub mod discovery;
pub mod edit;
pub mod error;
pub mod generator;
pub mod import;
pub mod migrator;
pub mod module_updater;
pub mod overlay;
pub mod parser;
pub mod paths;
pub mod resolver;
pub mod rewriter;

// Re-export commonly used types
pub use changes::{ChangeKind, FileChange};
pub use config::{MigrationOptions, MigratorConfig};
pub use diagnostics::{Diagnostic, Severity};
pub use discovery::EntityFileSet;
pub use error::MigrationError;
pub use migrator::{EntityMigrationResult, MigrationResult, Migrator};
pub use overlay::Overlay;
