//! File discovery with gitignore-aware filtering
//!
//! Locates the legacy per-entity files under a module directory, the modules
//! under a source root, and the TypeScript files the rewriting stages scan.

use ignore::WalkBuilder;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::error::MigrationError;
use crate::overlay::Overlay;

/// Token whose presence in `{name}.ts` marks an entity as already migrated
pub const MIGRATED_MARKER: &str = "defineEntity<";

/// Paths to the legacy files of one entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityFileSet {
    /// File stem shared by every legacy file (e.g. `photo`)
    pub entity_name: String,
    /// Directory holding `{name}.meta.ts`
    pub entity_dir: PathBuf,
    /// Module directory the entity belongs to
    pub module_dir: PathBuf,
    /// `{name}.ts` or `{name}.entity.ts`
    pub entity: Option<PathBuf>,
    pub meta: PathBuf,
    pub model: Option<PathBuf>,
    pub map: Option<PathBuf>,
    pub serialiser: Option<PathBuf>,
}

impl EntityFileSet {
    /// Where the consolidated descriptor is written
    pub fn descriptor_path(&self) -> PathBuf {
        self.entity_dir.join(format!("{}.ts", self.entity_name))
    }

    /// Legacy files removed once the descriptor exists
    pub fn legacy_files(&self) -> Vec<PathBuf> {
        let descriptor = self.descriptor_path();
        let mut files: Vec<PathBuf> = [&self.model, &self.map, &self.serialiser]
            .into_iter()
            .flatten()
            .cloned()
            .collect();
        if let Some(entity) = &self.entity {
            if *entity != descriptor {
                files.push(entity.clone());
            }
        }
        files
    }

    /// Every path that belongs to this entity, old or new
    pub fn owned_paths(&self) -> Vec<PathBuf> {
        let mut paths = self.legacy_files();
        paths.push(self.meta.clone());
        paths.push(self.descriptor_path());
        paths
    }
}

/// Discover files matching glob patterns in a project directory
///
/// # Arguments
/// * `root` - Root directory to search
/// * `patterns` - Glob patterns relative to `root` (e.g., &["**/*.ts"])
///
/// # Returns
/// Sorted absolute paths, excluding `.gitignore`d files and anything under
/// `node_modules`
pub fn discover_files(root: &Path, patterns: &[&str]) -> Vec<PathBuf> {
    // Canonicalize root upfront to ensure all returned paths are absolute
    let canonical_root = match root.canonicalize() {
        Ok(path) => path,
        Err(_) => return Vec::new(),
    };

    let glob_matcher = match build_glob_matcher(patterns) {
        Ok(matcher) => matcher,
        Err(err) => {
            tracing::warn!("invalid discovery pattern: {err}");
            return Vec::new();
        }
    };

    let mut files = Vec::new();
    for result in build_walker(&canonical_root) {
        match result {
            Ok(entry) => {
                if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                    continue;
                }
                let Ok(rel_path) = entry.path().strip_prefix(&canonical_root) else {
                    continue;
                };
                if rel_path
                    .components()
                    .any(|c| c.as_os_str() == "node_modules")
                {
                    continue;
                }
                if glob_matcher.is_match(rel_path) {
                    files.push(entry.into_path());
                }
            }
            Err(err) => {
                // Keep walking; one unreadable directory should not hide the rest
                tracing::warn!("error walking directory: {err}");
            }
        }
    }

    files.sort();
    files
}

/// Every TypeScript source file under `root` (declaration files excluded)
pub fn discover_source_files(root: &Path) -> Vec<PathBuf> {
    discover_files(root, &["**/*.ts", "**/*.tsx"])
        .into_iter()
        .filter(|p| !p.to_string_lossy().ends_with(".d.ts"))
        .collect()
}

/// Module directories under a source root, sorted and deduplicated
///
/// A module is any directory owning a `*.meta.ts` file, either directly or
/// through an `entities/` subdirectory.
pub fn discover_modules(source_root: &Path) -> Vec<PathBuf> {
    let modules: BTreeSet<PathBuf> = discover_files(source_root, &["**/*.meta.ts"])
        .into_iter()
        .filter_map(|meta| meta.parent().map(module_dir_for))
        .collect();
    modules.into_iter().collect()
}

/// Directory holding entity files for a module
pub fn entity_dir_for(module_dir: &Path) -> PathBuf {
    let nested = module_dir.join("entities");
    if nested.is_dir() {
        nested
    } else {
        module_dir.to_path_buf()
    }
}

fn module_dir_for(entity_dir: &Path) -> PathBuf {
    if entity_dir.file_name().is_some_and(|n| n == "entities") {
        if let Some(parent) = entity_dir.parent() {
            return parent.to_path_buf();
        }
    }
    entity_dir.to_path_buf()
}

/// Entity names declared in a module, sorted
///
/// Names come from `*.model.ts` stems (so a model whose meta file is missing
/// is still reported) and from `*.meta.ts` stems that have a sibling type
/// file. A meta file standing alone is an alias meta, not an entity.
pub fn discover_entity_names(module_dir: &Path, overlay: &Overlay) -> Vec<String> {
    let entity_dir = entity_dir_for(module_dir);
    let mut names = BTreeSet::new();

    let Ok(entries) = overlay.list_dir(&entity_dir) else {
        return Vec::new();
    };
    for path in entries {
        let Some(file_name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };
        if let Some(stem) = file_name.strip_suffix(".model.ts") {
            names.insert(stem.to_string());
        } else if let Some(stem) = file_name.strip_suffix(".meta.ts") {
            let has_type_file = [format!("{stem}.ts"), format!("{stem}.entity.ts")]
                .iter()
                .any(|sibling| overlay.is_file(&entity_dir.join(sibling)));
            if has_type_file {
                names.insert(stem.to_string());
            }
        }
    }

    names.into_iter().collect()
}

/// Build the file set of one entity as it stands once `overlay` is applied
///
/// # Errors
/// `MissingMetaFile` when `{name}.meta.ts` does not exist.
pub fn discover_entity(
    module_dir: &Path,
    entity_name: &str,
    overlay: &Overlay,
) -> Result<EntityFileSet, MigrationError> {
    let entity_dir = entity_dir_for(module_dir);
    let existing = |path: PathBuf| overlay.is_file(&path).then_some(path);

    let meta = entity_dir.join(format!("{entity_name}.meta.ts"));
    if !overlay.is_file(&meta) {
        return Err(MigrationError::MissingMetaFile {
            entity: entity_name.to_string(),
            dir: entity_dir,
        });
    }

    let entity = existing(entity_dir.join(format!("{entity_name}.ts")))
        .or_else(|| existing(entity_dir.join(format!("{entity_name}.entity.ts"))));

    let serialiser_name = format!("{entity_name}.serialiser.ts");
    let serialiser = [
        entity_dir.join(&serialiser_name),
        entity_dir.join("serialisers").join(&serialiser_name),
        module_dir.join("serialisers").join(&serialiser_name),
    ]
    .into_iter()
    .find(|p| overlay.is_file(p));

    Ok(EntityFileSet {
        entity_name: entity_name.to_string(),
        model: existing(entity_dir.join(format!("{entity_name}.model.ts"))),
        map: existing(entity_dir.join(format!("{entity_name}.map.ts"))),
        entity,
        meta,
        serialiser,
        entity_dir,
        module_dir: module_dir.to_path_buf(),
    })
}

/// Whether the entity's type file already carries the descriptor builder call
pub fn is_already_migrated(files: &EntityFileSet, overlay: &Overlay) -> bool {
    let descriptor = files.descriptor_path();
    if files.entity.as_ref() != Some(&descriptor) {
        return false;
    }
    overlay
        .read(&descriptor)
        .map(|content| content.contains(MIGRATED_MARKER))
        .unwrap_or(false)
}

/// Registration files (`*.module.ts`) directly inside a module directory
pub fn find_module_files(module_dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(module_dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.to_string_lossy().ends_with(".module.ts"))
        .collect();
    files.sort();
    files
}

/// Query-bearing files (repositories, services, cypher helpers) of a module
pub fn find_query_files(module_dir: &Path) -> Vec<PathBuf> {
    discover_files(
        module_dir,
        &["**/*.repository.ts", "**/*.service.ts", "**/*.cypher.ts"],
    )
}

/// Build a glob matcher from the provided patterns
fn build_glob_matcher(patterns: &[&str]) -> Result<globset::GlobSet, globset::Error> {
    use globset::GlobSetBuilder;

    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(globset::Glob::new(pattern)?);
    }
    builder.build()
}

/// Build a WalkBuilder with proper ignore configuration
fn build_walker(root: &Path) -> ignore::Walk {
    let mut builder = WalkBuilder::new(root);
    builder
        .git_ignore(true)
        .git_exclude(true)
        .hidden(false)
        .parents(true);

    // Outside a git checkout the walker does not pick up .gitignore on its own
    let gitignore_path = root.join(".gitignore");
    if gitignore_path.exists() {
        let _ = builder.add_ignore(gitignore_path);
    }

    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changes::FileChange;
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_discover_respects_gitignore_and_node_modules() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        let mut gitignore = File::create(root.join(".gitignore")).unwrap();
        gitignore.write_all(b"dist/\n").unwrap();

        touch(root, "src/a.ts", "");
        touch(root, "dist/a.ts", "");
        touch(root, "node_modules/pkg/index.ts", "");
        touch(root, "src/types.d.ts", "");

        let files = discover_source_files(root);

        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("src/a.ts"));
        assert!(files[0].is_absolute());
    }

    #[test]
    fn test_entity_names_from_meta_and_model() {
        let temp_dir = TempDir::new().unwrap();
        let module = temp_dir.path().join("photo");
        touch(&module, "entities/photo.meta.ts", "");
        touch(&module, "entities/photo.entity.ts", "");
        touch(&module, "entities/album.model.ts", "");
        touch(&module, "entities/cover.meta.ts", "");

        assert_eq!(discover_entity_names(&module, &Overlay::new()), vec!["album", "photo"]);
    }

    #[test]
    fn test_entity_file_set_with_serialiser_subdir() {
        let temp_dir = TempDir::new().unwrap();
        let module = temp_dir.path().join("photo");
        touch(&module, "entities/photo.meta.ts", "");
        touch(&module, "entities/photo.entity.ts", "");
        touch(&module, "entities/photo.model.ts", "");
        touch(&module, "entities/photo.map.ts", "");
        touch(&module, "serialisers/photo.serialiser.ts", "");

        let files = discover_entity(&module, "photo", &Overlay::new()).unwrap();

        assert!(files.entity.as_ref().unwrap().ends_with("photo.entity.ts"));
        assert!(files.serialiser.as_ref().unwrap().ends_with("serialisers/photo.serialiser.ts"));
        assert_eq!(files.legacy_files().len(), 4);
        assert!(files.descriptor_path().ends_with("entities/photo.ts"));
    }

    #[test]
    fn test_missing_meta_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let module = temp_dir.path().join("album");
        touch(&module, "entities/album.model.ts", "");

        let err = discover_entity(&module, "album", &Overlay::new()).unwrap_err();
        assert!(matches!(err, MigrationError::MissingMetaFile { .. }));
    }

    #[test]
    fn test_planned_changes_shape_the_file_set() {
        let temp_dir = TempDir::new().unwrap();
        let module = temp_dir.path().join("photo");
        touch(&module, "entities/photo.meta.ts", "");
        touch(&module, "entities/photo.entity.ts", "");
        touch(&module, "entities/photo.model.ts", "");
        touch(&module, "serialisers/photo.serialiser.ts", "");

        let entity_dir = module.join("entities");
        let mut overlay = Overlay::new();
        overlay.record(&[
            FileChange::create(entity_dir.join("photo.ts"), "export const PhotoDescriptor = defineEntity<Photo>()({});\n"),
            FileChange::delete(entity_dir.join("photo.entity.ts")),
            FileChange::delete(entity_dir.join("photo.model.ts")),
            FileChange::delete(module.join("serialisers/photo.serialiser.ts")),
        ]);

        assert_eq!(discover_entity_names(&module, &overlay), vec!["photo"]);
        let files = discover_entity(&module, "photo", &overlay).unwrap();
        assert_eq!(files.entity, Some(entity_dir.join("photo.ts")));
        assert!(files.model.is_none());
        assert!(files.serialiser.is_none());
        assert!(is_already_migrated(&files, &overlay));
        assert!(!is_already_migrated(&files, &Overlay::new()));
    }

    #[test]
    fn test_already_migrated_marker() {
        let temp_dir = TempDir::new().unwrap();
        let module = temp_dir.path().join("photo");
        touch(&module, "photo.meta.ts", "");
        touch(
            &module,
            "photo.ts",
            "export const PhotoDescriptor = defineEntity<Photo>()({});\n",
        );

        let files = discover_entity(&module, "photo", &Overlay::new()).unwrap();
        assert!(is_already_migrated(&files, &Overlay::new()));
        assert_eq!(files.entity_dir, module);
    }

    #[test]
    fn test_discover_modules_collapses_entities_dir() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        touch(root, "features/photo/entities/photo.meta.ts", "");
        touch(root, "features/photo/entities/album.meta.ts", "");
        touch(root, "foundations/user/user.meta.ts", "");

        let modules = discover_modules(root);

        assert_eq!(modules.len(), 2);
        assert!(modules[0].ends_with("features/photo"));
        assert!(modules[1].ends_with("foundations/user"));
    }

    #[test]
    fn test_module_files_are_not_recursive() {
        let temp_dir = TempDir::new().unwrap();
        let module = temp_dir.path().join("photo");
        touch(&module, "photo.module.ts", "");
        touch(&module, "nested/other.module.ts", "");

        let files = find_module_files(&module);
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("photo.module.ts"));
    }

    #[test]
    fn test_empty_directory() {
        let temp_dir = TempDir::new().unwrap();
        assert!(discover_source_files(temp_dir.path()).is_empty());
        assert!(discover_files(&temp_dir.path().join("missing"), &["**/*.ts"]).is_empty());
    }
}
