//! Reference rewriting across the source tree
//!
//! Once an entity is migrated its `{Label}Model` (and alias models) no longer
//! exist. Every other file that used them is rewritten to go through the
//! descriptor instead:
//!
//! | Usage                                | Rewritten to                                   |
//! |--------------------------------------|------------------------------------------------|
//! | `PhotoModel.type`                    | `PhotoDescriptor.model.type`                   |
//! | `serialiserFactory.create(PhotoModel)` | `serialiserFactory.create(PhotoDescriptor.model)` |
//! | `modelRegistry.register(PhotoModel)` | `modelRegistry.register(PhotoDescriptor.model)` |
//! | `PhotoModel`                         | `PhotoDescriptor.model`                        |
//!
//! The imports that pointed at the legacy files collapse into one statement
//! pointing at the descriptor module.

use indexmap::IndexMap;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tree_sitter::Node;

use crate::diagnostics::Diagnostic;
use crate::discovery::discover_source_files;
use crate::edit::{apply_edits, TextEdit};
use crate::error::MigrationError;
use crate::import::{extract_imports, ImportKind, ImportStatement, ImportedName};
use crate::overlay::Overlay;
use crate::parser::typescript::{has_ancestor, start_line, SourceFile};
use crate::paths::{relative_specifier, strip_legacy_suffix};

/// Call shapes that receive a model as their argument
const FACTORY_CALLS: &[&str] = &["serialiserFactory.create"];
const REGISTRY_CALLS: &[&str] = &["modelRegistry.register"];

/// Legacy suffixes under which the entity type and model were imported
const TYPE_SOURCE_SUFFIXES: &[&str] = &[".entity", ".model"];

/// Old model symbol and the descriptor that replaces it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SymbolRename {
    pub old: String,
    pub descriptor: String,
}

/// What a migrated entity exposed, and what replaces it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferenceTarget {
    pub entity_name: String,
    pub label: String,
    /// Directory of the new descriptor file
    pub entity_dir: PathBuf,
    /// Base model first, then alias models
    pub renames: Vec<SymbolRename>,
}

impl ReferenceTarget {
    fn rename_for(&self, symbol: &str) -> Option<&SymbolRename> {
        self.renames.iter().find(|r| r.old == symbol)
    }

    /// Whether a specifier points at this entity's legacy type or model file
    fn is_legacy_type_source(&self, source: &str) -> bool {
        let source = source.strip_suffix(".ts").unwrap_or(source);
        TYPE_SOURCE_SUFFIXES.iter().any(|suffix| {
            source.strip_suffix(suffix).is_some_and(|stem| {
                stem.rsplit('/').next() == Some(self.entity_name.as_str())
            })
        })
    }

    fn descriptor_module(&self) -> PathBuf {
        self.entity_dir.join(&self.entity_name)
    }
}

/// One distinct rewrite within a file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferenceUsage {
    /// First line the pattern occurs on
    pub line: usize,
    pub old_text: String,
    pub new_text: String,
}

/// Planned rewrite of one referencing file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reference {
    pub file_path: PathBuf,
    /// Legacy import statements, as written
    pub old_imports: Vec<String>,
    /// Consolidated replacement, if the file still needs anything
    pub new_import: Option<String>,
    /// Distinct usage rewrites, deduplicated by old text
    pub usages: Vec<ReferenceUsage>,
    /// Byte edits realising the plan against the analysed content
    pub edits: Vec<TextEdit>,
    #[serde(skip)]
    pub diagnostics: Vec<Diagnostic>,
}

/// Scan every source file under `source_root`, except `exclude`, for uses of
/// the migrated entity's old symbols
///
/// Files are listed and read as they stand once `overlay` is applied.
///
/// # Errors
/// Fails when a candidate file cannot be read or parsed.
pub fn find_external_references(
    target: &ReferenceTarget,
    source_root: &Path,
    exclude: &[PathBuf],
    overlay: &Overlay,
) -> Result<Vec<Reference>, MigrationError> {
    let needles = needles(target);
    let mut references = Vec::new();

    let files = overlay.merge_listing(discover_source_files(source_root), |path| {
        path.starts_with(source_root) && is_source_file(path)
    });
    for path in files {
        if exclude.contains(&path) {
            continue;
        }
        let content = overlay.read(&path)?;
        if !needles.iter().any(|needle| content.contains(needle.as_str())) {
            continue;
        }

        let file = SourceFile::parse(&path, content)?;
        if let Some(reference) = analyse_file(&file, target) {
            tracing::debug!(
                file = %path.display(),
                usages = reference.usages.len(),
                "found references"
            );
            references.push(reference);
        }
    }

    Ok(references)
}

fn is_source_file(path: &Path) -> bool {
    let name = path.to_string_lossy();
    (name.ends_with(".ts") || name.ends_with(".tsx")) && !name.ends_with(".d.ts")
}

/// Substrings at least one of which must appear for a file to be analysed
fn needles(target: &ReferenceTarget) -> Vec<String> {
    let mut needles: Vec<String> = target.renames.iter().map(|r| r.old.clone()).collect();
    for suffix in TYPE_SOURCE_SUFFIXES {
        needles.push(format!("{}{suffix}", target.entity_name));
    }
    needles
}

/// Plan the rewrite of a single parsed file; `None` when nothing changes
pub fn analyse_file(file: &SourceFile, target: &ReferenceTarget) -> Option<Reference> {
    let content = file.source();
    let imports = extract_imports(file);

    let (old_imports, retained): (Vec<&ImportStatement>, Vec<&ImportStatement>) = imports
        .iter()
        .filter(|s| s.kind == ImportKind::Import)
        .partition(|s| is_old_import(s, target));

    // Local binding → descriptor, honouring `{ PhotoModel as Model }`
    let mut bindings: Vec<(String, String)> = target
        .renames
        .iter()
        .map(|r| (r.old.clone(), r.descriptor.clone()))
        .collect();
    for statement in &old_imports {
        for name in &statement.names {
            if let Some(rename) = target.rename_for(&name.name) {
                if name.alias.is_some() {
                    bindings.push((name.local().to_string(), rename.descriptor.clone()));
                }
            }
        }
    }

    let found = find_symbol_usages(file, &bindings);
    let re_export_edits = re_export_edits(content, &imports, target);

    if old_imports.is_empty() && found.is_empty() && re_export_edits.is_empty() {
        return None;
    }

    let mut diagnostics = Vec::new();
    let mut edits: Vec<TextEdit> = found.iter().map(|u| u.edit.clone()).collect();
    edits.extend(re_export_edits);

    // Which descriptors the body now needs
    let mut needed: Vec<ImportedName> = Vec::new();
    for rename in &target.renames {
        if found.iter().any(|u| u.descriptor == rename.descriptor) {
            needed.push(ImportedName::new(&rename.descriptor));
        }
    }

    // The entity type, under whatever local name it was imported as
    let label_binding = old_imports
        .iter()
        .flat_map(|s| s.names.iter())
        .find(|n| n.name == target.label)
        .cloned()
        .unwrap_or_else(|| ImportedName::new(&target.label));
    let label_needed = references_identifier(file, label_binding.local())
        && !retained.iter().any(|s| s.binds(label_binding.local()));
    if label_needed {
        needed.insert(0, label_binding);
    }

    // Anything else the old statements imported keeps its binding
    for statement in &old_imports {
        for name in &statement.names {
            let is_old = target.rename_for(&name.name).is_some() || name.name == target.label;
            let duplicate = needed.iter().any(|n| n.local() == name.local());
            if !is_old && !duplicate {
                needed.push(name.clone());
            }
        }
    }

    let new_import = if needed.is_empty() {
        None
    } else {
        let source = match old_imports.first() {
            Some(first) => strip_legacy_suffix(&first.source),
            None => {
                let dir = file.path().parent().unwrap_or(Path::new("."));
                let fallback = relative_specifier(dir, &target.descriptor_module());
                diagnostics.push(
                    Diagnostic::warning(format!(
                        "no import of the old symbols found; assumed descriptor path \"{fallback}\""
                    ))
                    .in_file(file.path()),
                );
                fallback
            }
        };
        let type_only = needed.len() == 1
            && label_needed
            && !old_imports.is_empty()
            && old_imports.iter().all(|s| s.type_only);

        let mut statement = ImportStatement::named(Vec::<String>::new(), source, type_only);
        statement.names = needed;
        Some(statement.render())
    };

    // First old import becomes the new one, the rest disappear
    match (old_imports.first(), &new_import) {
        (Some(first), Some(new_import)) => {
            edits.push(TextEdit::replace(
                content,
                first.range.start_byte,
                first.range.end_byte,
                new_import.clone(),
            ));
        }
        (Some(first), None) => {
            edits.push(TextEdit::delete_statement(
                content,
                first.range.start_byte,
                first.range.end_byte,
            ));
        }
        (None, Some(new_import)) => edits.push(insert_import(&imports, new_import)),
        (None, None) => {}
    }
    for statement in old_imports.iter().skip(1) {
        edits.push(TextEdit::delete_statement(
            content,
            statement.range.start_byte,
            statement.range.end_byte,
        ));
    }

    let mut usages: IndexMap<String, ReferenceUsage> = IndexMap::new();
    for usage in found {
        usages.entry(usage.old_text.clone()).or_insert(ReferenceUsage {
            line: usage.line,
            old_text: usage.old_text,
            new_text: usage.new_text,
        });
    }

    Some(Reference {
        file_path: file.path().to_path_buf(),
        old_imports: old_imports.iter().map(|s| s.text.clone()).collect(),
        new_import,
        usages: usages.into_values().collect(),
        edits,
        diagnostics,
    })
}

fn is_old_import(statement: &ImportStatement, target: &ReferenceTarget) -> bool {
    statement
        .names
        .iter()
        .any(|n| target.rename_for(&n.name).is_some())
        || target.is_legacy_type_source(&statement.source)
}

/// Apply a planned rewrite to the content it was planned against
pub fn rewrite_file_references(content: &str, reference: &Reference) -> String {
    apply_edits(content, &reference.edits)
}

/// Read the referencing file and return its rewritten content
///
/// # Errors
/// Fails when the file cannot be read.
pub fn update_file_references(reference: &Reference, overlay: &Overlay) -> Result<String, MigrationError> {
    let content = overlay.read(&reference.file_path)?;
    Ok(rewrite_file_references(&content, reference))
}

/// A located use of an old symbol
#[derive(Debug, Clone)]
pub(crate) struct SymbolUsage {
    pub line: usize,
    pub descriptor: String,
    pub old_text: String,
    pub new_text: String,
    pub edit: TextEdit,
}

/// Every non-import use of the bound symbols, in source order
pub(crate) fn find_symbol_usages(file: &SourceFile, bindings: &[(String, String)]) -> Vec<SymbolUsage> {
    let content = file.source();
    let mut usages = Vec::new();

    for node in file.descendants() {
        let kind = node.kind();
        if kind != "identifier" && kind != "shorthand_property_identifier" {
            continue;
        }
        let text = file.text(node);
        let Some((_, descriptor)) = bindings.iter().find(|(local, _)| local == text) else {
            continue;
        };
        if in_import_or_export_clause(node) {
            continue;
        }

        let replacement = format!("{descriptor}.model");
        let edit_text = if kind == "shorthand_property_identifier" {
            format!("{text}: {replacement}")
        } else {
            replacement.clone()
        };
        let (old_text, new_text) = describe_usage(file, node, text, &edit_text);

        usages.push(SymbolUsage {
            line: start_line(node),
            descriptor: descriptor.clone(),
            old_text,
            new_text,
            edit: TextEdit::replace(content, node.start_byte(), node.end_byte(), edit_text),
        });
    }

    usages
}

fn in_import_or_export_clause(node: Node<'_>) -> bool {
    has_ancestor(
        node,
        &["import_statement", "import_specifier", "export_specifier", "export_clause"],
    )
}

/// Old and new text of the usage shape around an identifier
fn describe_usage(file: &SourceFile, node: Node<'_>, text: &str, replacement: &str) -> (String, String) {
    let Some(parent) = node.parent() else {
        return (text.to_string(), replacement.to_string());
    };

    if parent.kind() == "member_expression"
        && parent.child_by_field_name("object") == Some(node)
    {
        if let Some(property) = file.field_text(parent, "property") {
            return (
                format!("{text}.{property}"),
                format!("{replacement}.{property}"),
            );
        }
    }

    if parent.kind() == "arguments" {
        if let Some(call) = parent.parent().filter(|c| c.kind() == "call_expression") {
            let callee = file.field_text(call, "function").unwrap_or_default();
            let known = FACTORY_CALLS
                .iter()
                .chain(REGISTRY_CALLS)
                .any(|shape| callee.ends_with(shape));
            if known {
                let call_text = file.text(call);
                let relative_start = node.start_byte() - call.start_byte();
                let relative_end = node.end_byte() - call.start_byte();
                let mut rewritten = call_text.to_string();
                rewritten.replace_range(relative_start..relative_end, replacement);
                return (call_text.to_string(), rewritten);
            }
        }
    }

    (text.to_string(), replacement.to_string())
}

/// Whether `name` is referenced anywhere outside import statements,
/// type positions included
fn references_identifier(file: &SourceFile, name: &str) -> bool {
    file.descendants().into_iter().any(|node| {
        matches!(node.kind(), "identifier" | "type_identifier")
            && file.text(node) == name
            && !in_import_or_export_clause(node)
    })
}

/// In-place rewrites of `export ... from` statements naming this entity
fn re_export_edits(content: &str, imports: &[ImportStatement], target: &ReferenceTarget) -> Vec<TextEdit> {
    let mut edits = Vec::new();

    for statement in imports.iter().filter(|s| s.kind == ImportKind::ReExport) {
        let names_old = statement.names.iter().any(|n| target.rename_for(&n.name).is_some());
        let legacy_source = target.is_legacy_type_source(&statement.source);
        if !names_old && !legacy_source {
            continue;
        }

        let new_source = strip_legacy_suffix(&statement.source);
        let rewritten = if statement.names.is_empty() {
            // `export * from "./photo.model"`: only the specifier changes
            match statement.text.rfind(statement.source.as_str()) {
                Some(index) => {
                    let mut text = statement.text.clone();
                    text.replace_range(index..index + statement.source.len(), &new_source);
                    text
                }
                None => continue,
            }
        } else {
            let mut updated = statement.clone();
            updated.source = new_source;
            for name in &mut updated.names {
                if let Some(rename) = target.rename_for(&name.name) {
                    name.name = rename.descriptor.clone();
                }
            }
            updated.render()
        };

        edits.push(TextEdit::replace(
            content,
            statement.range.start_byte,
            statement.range.end_byte,
            rewritten,
        ));
    }

    edits
}

/// Insert an import after the last existing one, or at the top of the file
pub(crate) fn insert_import(imports: &[ImportStatement], import: &str) -> TextEdit {
    match imports.last() {
        Some(last) => TextEdit::insert(last.range.end_byte, format!("\n{import}")),
        None => TextEdit::insert(0, format!("{import}\n")),
    }
}
