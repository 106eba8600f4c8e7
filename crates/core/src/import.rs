//! Import statement extraction from TypeScript source files.
//!
//! Import data is captured losslessly (statement text and byte range included)
//! so the rewriting stages can replace or drop whole statements without
//! re-deriving where they start and end.
//!
//! # Example
//!
//! ```
//! use std::path::Path;
//! use entity_migrator_core::import;
//! use entity_migrator_core::parser::typescript::SourceFile;
//!
//! # fn main() -> Result<(), anyhow::Error> {
//! let file = SourceFile::parse(
//!     Path::new("photo.service.ts"),
//!     "import { PhotoModel } from \"../entities/photo.model\";\n".to_string(),
//! )?;
//!
//! for statement in import::extract_imports(&file) {
//!     println!("Line {}: {}", statement.range.start_line, statement.source);
//! }
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};

use crate::parser::typescript::{named_children, SourceFile};

/// Whether a statement imports symbols or re-exports them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImportKind {
    /// `import ... from "x"`
    Import,
    /// `export { ... } from "x"`
    ReExport,
}

/// A single import (or re-export) statement from a TypeScript file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportStatement {
    pub kind: ImportKind,
    /// Default import binding (`import Foo from "x"`)
    pub default: Option<String>,
    /// Namespace binding (`import * as foo from "x"`)
    pub namespace: Option<String>,
    /// Named specifiers, in source order
    pub names: Vec<ImportedName>,
    /// Module specifier without quotes
    pub source: String,
    /// `import type { ... }`
    pub type_only: bool,
    /// Full statement text as written
    pub text: String,
    pub range: SourceRange,
}

/// A single symbol imported via `{ ... }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportedName {
    /// Exported symbol name
    pub name: String,
    /// Local alias if present (`{ A as B }` → Some("B"))
    pub alias: Option<String>,
}

impl ImportedName {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
        }
    }

    /// Name the symbol is bound to in the importing file
    pub fn local(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    fn render(&self) -> String {
        match &self.alias {
            Some(alias) => format!("{} as {}", self.name, alias),
            None => self.name.clone(),
        }
    }
}

/// Source location in a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRange {
    /// Byte offset of start (0-based).
    pub start_byte: usize,
    /// Byte offset of end (0-based, exclusive).
    pub end_byte: usize,
    /// Start line (1-indexed for human readability).
    pub start_line: usize,
    /// End line (1-indexed for human readability).
    pub end_line: usize,
}

impl ImportStatement {
    /// Build a fresh named import
    pub fn named<I, S>(names: I, source: impl Into<String>, type_only: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names = names.into_iter().map(ImportedName::new).collect();
        let mut statement = Self {
            kind: ImportKind::Import,
            default: None,
            namespace: None,
            names,
            source: source.into(),
            type_only,
            text: String::new(),
            range: SourceRange {
                start_byte: 0,
                end_byte: 0,
                start_line: 0,
                end_line: 0,
            },
        };
        statement.text = statement.render();
        statement
    }

    /// Whether the statement binds `name` locally
    pub fn binds(&self, name: &str) -> bool {
        self.default.as_deref() == Some(name)
            || self.namespace.as_deref() == Some(name)
            || self.names.iter().any(|n| n.local() == name)
    }

    /// Whether the module specifier is relative (`./`, `../`)
    pub fn is_relative(&self) -> bool {
        self.source.starts_with('.')
    }

    /// Render the statement in canonical single-line form
    pub fn render(&self) -> String {
        let keyword = match self.kind {
            ImportKind::Import => "import",
            ImportKind::ReExport => "export",
        };
        let type_marker = if self.type_only { " type" } else { "" };

        let mut clauses = Vec::new();
        if let Some(default) = &self.default {
            clauses.push(default.clone());
        }
        if let Some(namespace) = &self.namespace {
            clauses.push(format!("* as {namespace}"));
        }
        if !self.names.is_empty() {
            let names: Vec<String> = self.names.iter().map(ImportedName::render).collect();
            clauses.push(format!("{{ {} }}", names.join(", ")));
        }

        if clauses.is_empty() {
            format!("{keyword} \"{}\";", self.source)
        } else {
            format!(
                "{keyword}{type_marker} {} from \"{}\";",
                clauses.join(", "),
                self.source
            )
        }
    }
}

/// Extract import and re-export statements from a parsed file.
///
/// Statements are returned in source order. Only top-level statements are
/// considered; dynamic `import()` calls are ignored.
pub fn extract_imports(file: &SourceFile) -> Vec<ImportStatement> {
    let mut statements = Vec::new();

    for node in named_children(file.root()) {
        let kind = match node.kind() {
            "import_statement" => ImportKind::Import,
            "export_statement" if node.child_by_field_name("source").is_some() => {
                ImportKind::ReExport
            }
            _ => continue,
        };

        let Some(source) = node
            .child_by_field_name("source")
            .and_then(|s| file.string_value(s))
        else {
            continue;
        };

        let mut statement = ImportStatement {
            kind,
            default: None,
            namespace: None,
            names: Vec::new(),
            source,
            type_only: false,
            text: file.text(node).to_string(),
            range: SourceRange {
                start_byte: node.start_byte(),
                end_byte: node.end_byte(),
                start_line: node.start_position().row + 1,
                end_line: node.end_position().row + 1,
            },
        };

        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            match child.kind() {
                "type" => statement.type_only = true,
                "import_clause" => collect_import_clause(file, child, &mut statement),
                "export_clause" => {
                    statement.names = collect_specifiers(file, child, "export_specifier")
                }
                _ => {}
            }
        }

        statements.push(statement);
    }

    statements
}

fn collect_import_clause(
    file: &SourceFile,
    clause: tree_sitter::Node<'_>,
    statement: &mut ImportStatement,
) {
    for child in named_children(clause) {
        match child.kind() {
            "identifier" => statement.default = Some(file.text(child).to_string()),
            "namespace_import" => {
                statement.namespace = named_children(child)
                    .into_iter()
                    .find(|n| n.kind() == "identifier")
                    .map(|n| file.text(n).to_string());
            }
            "named_imports" => {
                statement.names = collect_specifiers(file, child, "import_specifier");
            }
            _ => {}
        }
    }
}

fn collect_specifiers(
    file: &SourceFile,
    list: tree_sitter::Node<'_>,
    specifier_kind: &str,
) -> Vec<ImportedName> {
    named_children(list)
        .into_iter()
        .filter(|n| n.kind() == specifier_kind)
        .filter_map(|specifier| {
            let name = file.field_text(specifier, "name")?.to_string();
            let alias = file.field_text(specifier, "alias").map(str::to_string);
            Some(ImportedName { name, alias })
        })
        .collect()
}
