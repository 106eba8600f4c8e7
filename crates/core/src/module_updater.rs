//! Registration file (`*.module.ts`) updates
//!
//! After migration the module no longer provides the entity's serialiser and
//! registers the descriptor's model instead of the legacy model constant.

use serde::Serialize;
use std::path::{Path, PathBuf};
use tree_sitter::Node;

use crate::edit::{apply_edits, TextEdit};
use crate::error::MigrationError;
use crate::import::{extract_imports, ImportKind, ImportStatement};
use crate::overlay::Overlay;
use crate::parser::typescript::{has_ancestor, SourceFile};
use crate::paths::relative_specifier;
use crate::rewriter::{find_symbol_usages, insert_import, ReferenceTarget};

/// Planned change to one module file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleUpdate {
    pub path: PathBuf,
    pub content: String,
    /// Serialiser references removed
    pub removed_serialisers: usize,
    /// Model usages redirected to the descriptor
    pub replaced_models: usize,
}

/// Compute the updated module file; `None` when it needs no change
///
/// # Errors
/// Fails when the file cannot be read or parsed.
pub fn update_module_file(
    path: &Path,
    target: &ReferenceTarget,
    overlay: &Overlay,
) -> Result<Option<ModuleUpdate>, MigrationError> {
    let file = SourceFile::read(path, overlay)?;
    Ok(plan_module_update(&file, target))
}

/// Pure core of [`update_module_file`]
pub fn plan_module_update(file: &SourceFile, target: &ReferenceTarget) -> Option<ModuleUpdate> {
    let content = file.source();
    let serialiser = format!("{}Serialiser", target.label);
    let imports = extract_imports(file);
    let mut edits = Vec::new();

    let bindings: Vec<(String, String)> = target
        .renames
        .iter()
        .map(|r| (r.old.clone(), r.descriptor.clone()))
        .collect();
    let usages = find_symbol_usages(file, &bindings);

    let mut needed: Vec<&str> = Vec::new();
    for rename in &target.renames {
        let used = usages.iter().any(|u| u.descriptor == rename.descriptor);
        let bound = imports.iter().any(|s| s.binds(&rename.descriptor));
        if used && !bound {
            needed.push(&rename.descriptor);
        }
    }
    let mut descriptor_import = (!needed.is_empty()).then(|| {
        let dir = file.path().parent().unwrap_or(Path::new("."));
        let source = relative_specifier(dir, &target.entity_dir.join(&target.entity_name));
        ImportStatement::named(needed, source, false).text
    });

    let old_models: Vec<&str> = target.renames.iter().map(|r| r.old.as_str()).collect();
    for statement in imports.iter().filter(|s| s.kind == ImportKind::Import) {
        let drop: Vec<&str> = statement
            .names
            .iter()
            .map(|n| n.name.as_str())
            .filter(|name| *name == serialiser || old_models.contains(name))
            .collect();
        if !drop.is_empty() {
            edits.push(drop_specifiers(content, statement, &drop, &mut descriptor_import));
        }
    }

    let serialiser_elements: Vec<Node<'_>> = file
        .descendants()
        .into_iter()
        .filter(|n| n.kind() == "identifier" && file.text(*n) == serialiser)
        .filter(|n| n.parent().is_some_and(|p| p.kind() == "array"))
        .filter(|n| !has_ancestor(*n, &["import_statement"]))
        .collect();
    for element in &serialiser_elements {
        edits.push(remove_array_element(content, *element));
    }

    edits.extend(usages.iter().map(|u| u.edit.clone()));
    if let Some(import) = descriptor_import {
        edits.push(insert_import(&imports, &import));
    }

    if edits.is_empty() {
        return None;
    }

    Some(ModuleUpdate {
        path: file.path().to_path_buf(),
        content: apply_edits(content, &edits),
        removed_serialisers: serialiser_elements.len(),
        replaced_models: usages.len(),
    })
}

/// Remove names from an import; a statement left empty is replaced by the
/// pending descriptor import, or deleted when that is already placed
fn drop_specifiers(
    content: &str,
    statement: &ImportStatement,
    drop: &[&str],
    descriptor_import: &mut Option<String>,
) -> TextEdit {
    let mut updated = statement.clone();
    updated.names.retain(|n| !drop.contains(&n.name.as_str()));

    if updated.names.is_empty() && updated.default.is_none() && updated.namespace.is_none() {
        match descriptor_import.take() {
            Some(import) => TextEdit::replace(
                content,
                statement.range.start_byte,
                statement.range.end_byte,
                import,
            ),
            None => TextEdit::delete_statement(content, statement.range.start_byte, statement.range.end_byte),
        }
    } else {
        TextEdit::replace(
            content,
            statement.range.start_byte,
            statement.range.end_byte,
            updated.render(),
        )
    }
}

/// Span covering an array element and one adjoining comma
fn remove_array_element(content: &str, element: Node<'_>) -> TextEdit {
    let next_named = element.next_named_sibling();
    if let Some(next) = next_named {
        return TextEdit::replace(content, element.start_byte(), next.start_byte(), "");
    }

    // Last element: with a trailing comma the previous comma stays, without
    // one the previous comma goes
    let previous_comma = element.prev_sibling().filter(|s| s.kind() == ",");
    let (start, end) = match element.next_sibling().filter(|s| s.kind() == ",") {
        Some(trailing) => (
            previous_comma.map_or(element.start_byte(), |comma| comma.end_byte()),
            trailing.end_byte(),
        ),
        None => (
            previous_comma.map_or(element.start_byte(), |comma| comma.start_byte()),
            element.end_byte(),
        ),
    };
    TextEdit::replace(content, start, end, "")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewriter::SymbolRename;

    fn target() -> ReferenceTarget {
        ReferenceTarget {
            entity_name: "photo".to_string(),
            label: "Photo".to_string(),
            entity_dir: PathBuf::from("/app/src/photo/entities"),
            renames: vec![SymbolRename {
                old: "PhotoModel".to_string(),
                descriptor: "PhotoDescriptor".to_string(),
            }],
        }
    }

    fn plan(source: &str) -> Option<ModuleUpdate> {
        let file = SourceFile::parse(Path::new("/app/src/photo/photo.module.ts"), source.to_string()).unwrap();
        plan_module_update(&file, &target())
    }

    #[test]
    fn serialiser_and_model_are_replaced() {
        let update = plan(
            r#"import { Module, OnModuleInit } from "@nestjs/common";
import { PhotoModel } from "./entities/photo.model";
import { PhotoSerialiser } from "./serialisers/photo.serialiser";
import { PhotoService } from "./services/photo.service";

@Module({
  providers: [
    PhotoSerialiser,
    PhotoService,
  ],
})
export class PhotoModule implements OnModuleInit {
  onModuleInit() {
    modelRegistry.register(PhotoModel);
  }
}
"#,
        )
        .unwrap();

        assert_eq!(
            update.content,
            r#"import { Module, OnModuleInit } from "@nestjs/common";
import { PhotoDescriptor } from "./entities/photo";
import { PhotoService } from "./services/photo.service";

@Module({
  providers: [
    PhotoService,
  ],
})
export class PhotoModule implements OnModuleInit {
  onModuleInit() {
    modelRegistry.register(PhotoDescriptor.model);
  }
}
"#
        );
        assert_eq!(update.removed_serialisers, 1);
        assert_eq!(update.replaced_models, 1);
    }

    #[test]
    fn last_and_only_elements() {
        let update = plan(
            "import { A } from \"./a\";\nexport const x = [A, PhotoSerialiser];\nexport const y = [PhotoSerialiser];\n",
        )
        .unwrap();
        assert_eq!(
            update.content,
            "import { A } from \"./a\";\nexport const x = [A];\nexport const y = [];\n"
        );
    }

    #[test]
    fn shared_import_keeps_other_names() {
        let update = plan(
            "import { PhotoSerialiser, PhotoHelper } from \"./photo.serialiser\";\nexport const p = [PhotoSerialiser, PhotoHelper];\n",
        )
        .unwrap();
        assert_eq!(
            update.content,
            "import { PhotoHelper } from \"./photo.serialiser\";\nexport const p = [PhotoHelper];\n"
        );
    }

    #[test]
    fn descriptor_import_survives_deleting_the_last_import() {
        let update = plan(
            "import { Module } from \"@nestjs/common\";\nimport { PhotoModel } from \"./entities/photo.model\";\nimport { PhotoSerialiser } from \"./serialisers/photo.serialiser\";\n\n@Module({ providers: [PhotoSerialiser] })\nexport class PhotoModule {\n  constructor() {\n    modelRegistry.register(PhotoModel);\n  }\n}\n",
        )
        .unwrap();
        assert_eq!(
            update.content,
            "import { Module } from \"@nestjs/common\";\nimport { PhotoDescriptor } from \"./entities/photo\";\n\n@Module({ providers: [] })\nexport class PhotoModule {\n  constructor() {\n    modelRegistry.register(PhotoDescriptor.model);\n  }\n}\n"
        );
    }

    #[test]
    fn unrelated_module_is_untouched() {
        assert!(plan("import { Module } from \"@nestjs/common\";\n@Module({})\nexport class AlbumModule {}\n").is_none());
    }
}
