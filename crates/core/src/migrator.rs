//! Migration orchestrator
//!
//! Runs discovery, parsing, generation, reference rewriting and the module
//! update for each entity in turn, then previews or applies the resulting
//! change plan. Each entity is its own failure boundary: an error inside its
//! pipeline is recorded on its result and the batch continues.
//!
//! One [`Overlay`] spans the whole run. Each successful plan is recorded in it
//! so later entities see earlier rewrites whether or not they hit disk.

use anyhow::Context;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::changes::{apply_changes, preview_changes, FileChange};
use crate::config::{MigrationOptions, MigratorConfig};
use crate::cypher::{extract_module_relationships, review_query_files};
use crate::diagnostics::Diagnostic;
use crate::discovery::{
    discover_entity, discover_entity_names, discover_modules, find_module_files, is_already_migrated,
    EntityFileSet,
};
use crate::error::MigrationError;
use crate::generator::{generate, GeneratorContext};
use crate::module_updater::update_module_file;
use crate::overlay::Overlay;
use crate::parser::{parse_entity, ParsedEntity};
use crate::rewriter::{find_external_references, update_file_references, ReferenceTarget, SymbolRename};

/// Outcome for one entity
#[derive(Debug, Clone, Serialize)]
pub struct EntityMigrationResult {
    pub entity: String,
    pub module: PathBuf,
    pub success: bool,
    pub already_migrated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub changes: Vec<FileChange>,
    pub diagnostics: Vec<Diagnostic>,
}

impl EntityMigrationResult {
    fn failed(entity: &str, module: &Path, error: String, changes: Vec<FileChange>, diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            entity: entity.to_string(),
            module: module.to_path_buf(),
            success: false,
            already_migrated: false,
            error: Some(error),
            changes,
            diagnostics,
        }
    }
}

/// Outcome of a run
#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationResult {
    pub results: Vec<EntityMigrationResult>,
    pub total_entities: usize,
    pub success_count: usize,
    pub failure_count: usize,
}

impl MigrationResult {
    pub fn from_results(results: Vec<EntityMigrationResult>) -> Self {
        let success_count = results.iter().filter(|r| r.success).count();
        Self {
            total_entities: results.len(),
            failure_count: results.len() - success_count,
            success_count,
            results,
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &EntityMigrationResult> {
        self.results.iter().filter(|r| !r.success)
    }

    /// Every planned change across all entities
    pub fn changes(&self) -> impl Iterator<Item = &FileChange> {
        self.results.iter().flat_map(|r| r.changes.iter())
    }
}

/// Changes and diagnostics planned for one entity
struct EntityPlan {
    changes: Vec<FileChange>,
    diagnostics: Vec<Diagnostic>,
}

pub struct Migrator {
    project_root: PathBuf,
    config: MigratorConfig,
    options: MigrationOptions,
}

impl Migrator {
    /// Create a migrator for a project, loading `migrator.toml` when present
    ///
    /// # Errors
    /// Fails when the project root does not exist or the config is invalid.
    pub fn new(project_root: &Path, options: MigrationOptions) -> Result<Self, MigrationError> {
        let project_root = canonical(project_root)?;
        let config = MigratorConfig::load(&project_root)?;
        Ok(Self {
            project_root,
            config,
            options,
        })
    }

    pub fn with_config(
        project_root: &Path,
        config: MigratorConfig,
        options: MigrationOptions,
    ) -> Result<Self, MigrationError> {
        Ok(Self {
            project_root: canonical(project_root)?,
            config,
            options,
        })
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Migrate one module, or a single entity of it
    ///
    /// Relative paths resolve against the project root.
    ///
    /// # Errors
    /// `ModuleNotFound` when the module directory does not exist,
    /// `EntityNotFound` when a named entity has no legacy files. Failures of
    /// individual entities are reported in the result instead.
    pub fn migrate(&self, module_path: &Path, entity: Option<&str>) -> Result<MigrationResult, MigrationError> {
        let module_dir = self.resolve_module(module_path)?;
        tracing::info!(module = %module_dir.display(), "migrating module");

        let mut overlay = Overlay::new();
        let results = match entity {
            Some(name) => {
                let known = discover_entity_names(&module_dir, &overlay).iter().any(|n| n == name);
                let file_set = discover_entity(&module_dir, name, &overlay);
                if !known && file_set.is_err() {
                    return Err(MigrationError::EntityNotFound {
                        entity: name.to_string(),
                        dir: module_dir,
                    });
                }
                vec![self.migrate_entity(&module_dir, name, file_set, &mut overlay)]
            }
            None => self.migrate_module(&module_dir, &mut overlay),
        };

        Ok(MigrationResult::from_results(results))
    }

    /// Migrate every module under the configured source root
    ///
    /// # Errors
    /// Fails when the source root does not exist.
    pub fn migrate_all(&self) -> Result<MigrationResult, MigrationError> {
        let source_root = canonical(&self.config.source_root(&self.project_root))?;
        let modules = discover_modules(&source_root);
        tracing::info!(source_root = %source_root.display(), modules = modules.len(), "migrating all modules");

        let mut overlay = Overlay::new();
        let mut results = Vec::new();
        for module_dir in &modules {
            results.extend(self.migrate_module(module_dir, &mut overlay));
        }
        Ok(MigrationResult::from_results(results))
    }

    fn resolve_module(&self, module_path: &Path) -> Result<PathBuf, MigrationError> {
        let joined = if module_path.is_absolute() {
            module_path.to_path_buf()
        } else {
            self.project_root.join(module_path)
        };
        match joined.canonicalize() {
            Ok(dir) if dir.is_dir() => Ok(dir),
            _ => Err(MigrationError::ModuleNotFound(joined)),
        }
    }

    /// Entity file sets are discovered one at a time, after the previous
    /// entity's plan is recorded
    fn migrate_module(&self, module_dir: &Path, overlay: &mut Overlay) -> Vec<EntityMigrationResult> {
        let mut results = Vec::new();
        for name in discover_entity_names(module_dir, overlay) {
            let file_set = discover_entity(module_dir, &name, overlay);
            results.push(self.migrate_entity(module_dir, &name, file_set, overlay));
        }
        results
    }

    fn migrate_entity(
        &self,
        module_dir: &Path,
        name: &str,
        file_set: Result<EntityFileSet, MigrationError>,
        overlay: &mut Overlay,
    ) -> EntityMigrationResult {
        let files = match file_set {
            Ok(files) => files,
            Err(err) => {
                tracing::error!(entity = %name, error = %err, "migration failed");
                return EntityMigrationResult::failed(name, module_dir, err.to_string(), Vec::new(), Vec::new());
            }
        };

        if is_already_migrated(&files, overlay) {
            tracing::info!(entity = %name, "already migrated, skipping");
            return EntityMigrationResult {
                entity: name.to_string(),
                module: module_dir.to_path_buf(),
                success: true,
                already_migrated: true,
                error: None,
                changes: Vec::new(),
                diagnostics: Vec::new(),
            };
        }

        tracing::info!(entity = %name, "migrating entity");
        let plan = match self.plan_entity(&files, overlay) {
            Ok(plan) => plan,
            Err(err) => {
                tracing::error!(entity = %name, error = %format!("{err:#}"), "migration failed");
                return EntityMigrationResult::failed(name, module_dir, format!("{err:#}"), Vec::new(), Vec::new());
            }
        };

        let outcome = if self.options.dry_run {
            preview_changes(name, &plan.changes, &self.options);
            Ok(())
        } else {
            apply_changes(&plan.changes, &self.options)
        };

        match outcome {
            Ok(()) => {
                overlay.record(&plan.changes);
                EntityMigrationResult {
                    entity: name.to_string(),
                    module: module_dir.to_path_buf(),
                    success: true,
                    already_migrated: false,
                    error: None,
                    changes: plan.changes,
                    diagnostics: plan.diagnostics,
                }
            }
            Err(err) => {
                tracing::error!(entity = %name, error = %err, "applying changes failed");
                EntityMigrationResult::failed(name, module_dir, err.to_string(), plan.changes, plan.diagnostics)
            }
        }
    }

    /// Compute the full change plan of one entity without touching disk
    fn plan_entity(&self, files: &EntityFileSet, overlay: &Overlay) -> anyhow::Result<EntityPlan> {
        let name = files.entity_name.as_str();
        let mut diagnostics = Vec::new();
        let mut report = |found: Vec<Diagnostic>| {
            for diagnostic in &found {
                diagnostic.emit(name);
            }
            diagnostics.extend(found);
        };

        let mut parsed = parse_entity(files, overlay).with_context(|| format!("parsing entity {name}"))?;
        report(std::mem::take(&mut parsed.diagnostics));
        tracing::debug!(entity = %name, fields = parsed.entity_type.fields.len(), "parsed");

        let node_name = if parsed.meta.node_name.is_empty() {
            heck::AsLowerCamelCase(name).to_string()
        } else {
            parsed.meta.node_name.clone()
        };
        let extracted = extract_module_relationships(&files.module_dir, &node_name, overlay)
            .context("scanning query files")?;
        tracing::debug!(entity = %name, relationships = extracted.len(), "extracted query relationships");
        report(review_query_files(&files.module_dir, name, overlay).context("reviewing query files")?);

        let context = GeneratorContext {
            framework_barrel: self.config.barrel_path(&self.project_root),
            framework_package: self.config.framework_package.clone(),
            extracted_relationships: extracted,
        };
        let mut generated = generate(&parsed, &files.entity_dir, &context);
        report(std::mem::take(&mut generated.diagnostics));

        let mut changes = vec![
            FileChange::update(&files.meta, generated.meta_code),
            FileChange::write(files.descriptor_path(), generated.code, overlay),
        ];

        let target = reference_target(&parsed, files);
        let module_files = overlay.merge_listing(find_module_files(&files.module_dir), |_| false);
        let mut exclude = files.owned_paths();
        exclude.extend(module_files.iter().cloned());

        let source_root = self.config.source_root(&self.project_root);
        let references = find_external_references(&target, &source_root, &exclude, overlay)
            .context("finding external references")?;
        for mut reference in references {
            let content = update_file_references(&reference, overlay)
                .with_context(|| format!("rewriting {}", reference.file_path.display()))?;
            tracing::debug!(
                entity = %name,
                file = %reference.file_path.display(),
                usages = reference.usages.len(),
                "reference rewritten"
            );
            report(std::mem::take(&mut reference.diagnostics));
            changes.push(FileChange::update(reference.file_path, content));
        }

        for module_file in &module_files {
            if let Some(update) = update_module_file(module_file, &target, overlay)
                .with_context(|| format!("updating module {}", module_file.display()))?
            {
                changes.push(FileChange::update(update.path, update.content));
            }
        }

        changes.extend(files.legacy_files().into_iter().map(FileChange::delete));
        if let Some(dir) = emptied_serialiser_dir(files, overlay)? {
            changes.push(FileChange::delete(dir));
        }

        Ok(EntityPlan { changes, diagnostics })
    }
}

fn canonical(path: &Path) -> Result<PathBuf, MigrationError> {
    path.canonicalize().map_err(|e| MigrationError::io(path, e))
}

/// Old symbols of an entity and the descriptors replacing them
pub fn reference_target(parsed: &ParsedEntity, files: &EntityFileSet) -> ReferenceTarget {
    let mut renames = vec![SymbolRename {
        old: parsed.model_symbol(),
        descriptor: parsed.descriptor_symbol(),
    }];
    renames.extend(parsed.alias_models.iter().map(|alias| SymbolRename {
        old: alias.model_name.clone(),
        descriptor: alias.descriptor_name.clone(),
    }));

    ReferenceTarget {
        entity_name: files.entity_name.clone(),
        label: parsed.label(),
        entity_dir: files.entity_dir.clone(),
        renames,
    }
}

/// A `serialisers` directory the entity's serialiser is the last file of
///
/// Backups do not count; they are moved out when the directory is removed.
fn emptied_serialiser_dir(files: &EntityFileSet, overlay: &Overlay) -> Result<Option<PathBuf>, MigrationError> {
    let Some(serialiser) = &files.serialiser else {
        return Ok(None);
    };
    let Some(dir) = serialiser.parent().filter(|d| d.ends_with("serialisers")) else {
        return Ok(None);
    };

    let others = overlay.list_dir(dir)?.iter().any(|entry| entry != serialiser);
    Ok((!others).then(|| dir.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changes::ChangeKind;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str, content: &str) -> PathBuf {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    fn dry_run() -> MigrationOptions {
        MigrationOptions {
            dry_run: true,
            ..MigrationOptions::default()
        }
    }

    const META: &str = r#"export const tagMeta = {
  type: "tags",
  endpoint: "tags",
  nodeName: "tag",
  labelName: "Tag",
};
"#;

    #[test]
    fn missing_meta_is_recorded_not_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        touch(root, "src/features/tag/entities/tag.meta.ts", META);
        touch(root, "src/features/tag/entities/tag.ts", "export type Tag = Entity & { name: string };\n");
        touch(root, "src/features/tag/entities/orphan.model.ts", "export const OrphanModel = {};\n");

        let migrator = Migrator::new(root, dry_run()).unwrap();
        let result = migrator.migrate(Path::new("src/features/tag"), None).unwrap();

        assert_eq!(result.total_entities, 2);
        assert_eq!(result.failure_count, 1);
        let failure = result.failures().next().unwrap();
        assert_eq!(failure.entity, "orphan");
        assert!(failure.error.as_deref().unwrap().contains("meta"));
        assert!(result.results.iter().any(|r| r.entity == "tag" && r.success));
    }

    #[test]
    fn unknown_entity_and_module_abort() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        touch(root, "src/features/tag/entities/tag.meta.ts", META);

        let migrator = Migrator::new(root, dry_run()).unwrap();
        assert!(matches!(
            migrator.migrate(Path::new("src/features/tag"), Some("nope")),
            Err(MigrationError::EntityNotFound { .. })
        ));
        assert!(matches!(
            migrator.migrate(Path::new("src/features/missing"), None),
            Err(MigrationError::ModuleNotFound(_))
        ));
    }

    #[test]
    fn plan_orders_writes_before_deletes() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        touch(root, "src/features/tag/entities/tag.meta.ts", META);
        touch(root, "src/features/tag/entities/tag.entity.ts", "export type Tag = Entity & { name: string };\n");
        touch(root, "src/features/tag/entities/tag.model.ts", "export const TagModel = {};\n");
        touch(root, "src/features/tag/serialisers/tag.serialiser.ts", "export class TagSerialiser {}\n");

        let migrator = Migrator::new(root, dry_run()).unwrap();
        let result = migrator.migrate(Path::new("src/features/tag"), Some("tag")).unwrap();
        let entity = &result.results[0];
        assert!(entity.success, "{:?}", entity.error);

        let kinds: Vec<ChangeKind> = entity.changes.iter().map(|c| c.kind).collect();
        assert_eq!(kinds[0], ChangeKind::Update);
        assert!(entity.changes[0].path.ends_with("tag.meta.ts"));
        assert_eq!(kinds[1], ChangeKind::Create);
        assert!(entity.changes[1].path.ends_with("entities/tag.ts"));

        let first_delete = kinds.iter().position(|k| *k == ChangeKind::Delete).unwrap();
        assert!(kinds[first_delete..].iter().all(|k| *k == ChangeKind::Delete));
        assert!(entity.changes.last().unwrap().path.ends_with("serialisers"));
    }

    #[test]
    fn result_counts() {
        let result = MigrationResult::from_results(vec![
            EntityMigrationResult::failed("a", Path::new("/m"), "boom".into(), Vec::new(), Vec::new()),
        ]);
        assert_eq!((result.total_entities, result.success_count, result.failure_count), (1, 0, 1));
    }
}
