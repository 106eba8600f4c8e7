//! File change plans and their application
//!
//! A migration is planned as an ordered list of [`FileChange`]s and then
//! either previewed (dry run) or applied. Application stages every write in a
//! temporary file next to its destination before anything on disk changes;
//! staged files are then renamed into place in plan order, deletions follow.

use serde::Serialize;
use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::config::MigrationOptions;
use crate::error::MigrationError;
use crate::overlay::Overlay;

/// Suffix appended to the original path for backups
pub const BACKUP_SUFFIX: &str = ".bak";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Create,
    Update,
    Delete,
}

/// One planned file-system mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileChange {
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    pub path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl FileChange {
    pub fn create(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        Self {
            kind: ChangeKind::Create,
            path: path.into(),
            content: Some(content.into()),
        }
    }

    pub fn update(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        Self {
            kind: ChangeKind::Update,
            path: path.into(),
            content: Some(content.into()),
        }
    }

    /// Delete a file, or a directory when it is empty at apply time
    pub fn delete(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: ChangeKind::Delete,
            path: path.into(),
            content: None,
        }
    }

    /// `create` when nothing exists at `path` yet, `update` otherwise
    pub fn write(path: impl Into<PathBuf>, content: impl Into<String>, overlay: &Overlay) -> Self {
        let path = path.into();
        if overlay.is_file(&path) {
            Self::update(path, content)
        } else {
            Self::create(path, content)
        }
    }
}

/// Where the backup of `path` is written
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(BACKUP_SUFFIX);
    PathBuf::from(name)
}

/// Log what a plan would do without touching the file system
pub fn preview_changes(entity: &str, changes: &[FileChange], options: &MigrationOptions) {
    for change in changes {
        let action = match change.kind {
            ChangeKind::Create => "would create",
            ChangeKind::Update => "would update",
            ChangeKind::Delete => "would delete",
        };
        tracing::info!(entity = %entity, path = %change.path.display(), "{action}");
        if options.verbose {
            if let Some(content) = &change.content {
                tracing::info!(entity = %entity, path = %change.path.display(), "\n{content}");
            }
        }
    }
}

/// Apply a plan: stage writes, back up, rename into place, then delete
///
/// # Errors
/// A staging failure leaves the tree untouched. A failure after the first
/// rename leaves earlier changes (and their backups) in place.
pub fn apply_changes(changes: &[FileChange], options: &MigrationOptions) -> Result<(), MigrationError> {
    let mut staged = Vec::new();
    for change in changes {
        if let Some(content) = &change.content {
            staged.push((change, stage(&change.path, content)?));
        }
    }

    for (change, temp) in staged {
        if change.path.is_file() && !options.skip_backup {
            let backup = backup_path(&change.path);
            std::fs::copy(&change.path, &backup).map_err(|e| MigrationError::io(&backup, e))?;
            tracing::debug!(path = %backup.display(), "backup written");
        }
        temp.persist(&change.path)
            .map_err(|e| MigrationError::io(&change.path, e.error))?;
        tracing::info!(path = %change.path.display(), "{}", match change.kind {
            ChangeKind::Create => "created",
            _ => "updated",
        });
    }

    for change in changes.iter().filter(|c| c.kind == ChangeKind::Delete) {
        delete(&change.path)?;
    }

    Ok(())
}

fn stage(path: &Path, content: &str) -> Result<NamedTempFile, MigrationError> {
    let dir = path.parent().unwrap_or(Path::new("."));
    std::fs::create_dir_all(dir).map_err(|e| MigrationError::io(dir, e))?;

    let mut temp = NamedTempFile::new_in(dir).map_err(|e| MigrationError::io(dir, e))?;
    temp.write_all(content.as_bytes())
        .and_then(|()| temp.flush())
        .map_err(|e| MigrationError::io(temp.path(), e))?;
    Ok(temp)
}

fn delete(path: &Path) -> Result<(), MigrationError> {
    if path.is_dir() {
        let entries = std::fs::read_dir(path)
            .map_err(|e| MigrationError::io(path, e))?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| MigrationError::io(path, e))?;
        let (backups, others): (Vec<PathBuf>, Vec<PathBuf>) = entries
            .into_iter()
            .partition(|entry| entry.to_string_lossy().ends_with(BACKUP_SUFFIX));
        if !others.is_empty() {
            tracing::warn!(path = %path.display(), "directory not empty, left in place");
            return Ok(());
        }
        if !relocate_backups(path, &backups)? {
            tracing::warn!(path = %path.display(), "backups could not be moved out, left in place");
            return Ok(());
        }
        std::fs::remove_dir(path).map_err(|e| MigrationError::io(path, e))?;
    } else {
        match std::fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "already gone");
                return Ok(());
            }
            Err(e) => return Err(MigrationError::io(path, e)),
        }
    }
    tracing::info!(path = %path.display(), "deleted");
    Ok(())
}

/// Move the backups out of a directory about to be removed, into its parent
///
/// Returns `false`, moving nothing, when any backup would overwrite a file in
/// the parent.
fn relocate_backups(dir: &Path, backups: &[PathBuf]) -> Result<bool, MigrationError> {
    if backups.is_empty() {
        return Ok(true);
    }
    let Some(parent) = dir.parent() else {
        return Ok(false);
    };
    let moves: Vec<(&PathBuf, PathBuf)> = backups
        .iter()
        .filter_map(|backup| backup.file_name().map(|name| (backup, parent.join(name))))
        .collect();
    if let Some((_, taken)) = moves.iter().find(|(_, target)| target.exists()) {
        tracing::warn!(path = %taken.display(), "backup already exists, not relocating");
        return Ok(false);
    }

    for (backup, target) in moves {
        std::fs::rename(backup, &target).map_err(|e| MigrationError::io(backup, e))?;
        tracing::debug!(from = %backup.display(), to = %target.display(), "backup relocated");
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn writes_back_up_before_overwrite() {
        let temp_dir = TempDir::new().unwrap();
        let existing = temp_dir.path().join("photo.meta.ts");
        fs::write(&existing, "old").unwrap();
        let created = temp_dir.path().join("photo.ts");

        let changes = vec![
            FileChange::write(&existing, "new", &Overlay::new()),
            FileChange::write(&created, "descriptor", &Overlay::new()),
        ];
        assert_eq!(changes[0].kind, ChangeKind::Update);
        assert_eq!(changes[1].kind, ChangeKind::Create);

        apply_changes(&changes, &MigrationOptions::default()).unwrap();

        assert_eq!(fs::read_to_string(&existing).unwrap(), "new");
        assert_eq!(fs::read_to_string(backup_path(&existing)).unwrap(), "old");
        assert_eq!(fs::read_to_string(&created).unwrap(), "descriptor");
        assert!(!backup_path(&created).exists());
    }

    #[test]
    fn skip_backup_writes_none() {
        let temp_dir = TempDir::new().unwrap();
        let existing = temp_dir.path().join("a.ts");
        fs::write(&existing, "old").unwrap();

        let options = MigrationOptions {
            skip_backup: true,
            ..MigrationOptions::default()
        };
        apply_changes(&[FileChange::update(&existing, "new")], &options).unwrap();

        assert!(!backup_path(&existing).exists());
    }

    #[test]
    fn deletes_files_then_empty_directories() {
        let temp_dir = TempDir::new().unwrap();
        let serialisers = temp_dir.path().join("serialisers");
        fs::create_dir(&serialisers).unwrap();
        let serialiser = serialisers.join("photo.serialiser.ts");
        fs::write(&serialiser, "x").unwrap();

        let changes = vec![FileChange::delete(&serialiser), FileChange::delete(&serialisers)];
        apply_changes(&changes, &MigrationOptions::default()).unwrap();

        assert!(!serialisers.exists());
    }

    #[test]
    fn backups_move_out_of_a_removed_directory() {
        let temp_dir = TempDir::new().unwrap();
        let serialisers = temp_dir.path().join("serialisers");
        fs::create_dir(&serialisers).unwrap();
        let serialiser = serialisers.join("shelf.serialiser.ts");
        fs::write(&serialiser, "x").unwrap();
        fs::write(serialisers.join("book.serialiser.ts.bak"), "old book").unwrap();

        let changes = vec![FileChange::delete(&serialiser), FileChange::delete(&serialisers)];
        apply_changes(&changes, &MigrationOptions::default()).unwrap();

        assert!(!serialisers.exists());
        let moved = temp_dir.path().join("book.serialiser.ts.bak");
        assert_eq!(fs::read_to_string(moved).unwrap(), "old book");
    }

    #[test]
    fn planned_files_count_as_existing() {
        let temp_dir = TempDir::new().unwrap();
        let descriptor = temp_dir.path().join("photo.ts");
        let mut overlay = Overlay::new();
        assert_eq!(FileChange::write(&descriptor, "a", &overlay).kind, ChangeKind::Create);

        overlay.record(&[FileChange::create(&descriptor, "a")]);
        assert_eq!(FileChange::write(&descriptor, "b", &overlay).kind, ChangeKind::Update);
    }

    #[test]
    fn non_empty_directory_is_kept() {
        let temp_dir = TempDir::new().unwrap();
        let serialisers = temp_dir.path().join("serialisers");
        fs::create_dir(&serialisers).unwrap();
        fs::write(serialisers.join("album.serialiser.ts"), "x").unwrap();

        apply_changes(&[FileChange::delete(&serialisers)], &MigrationOptions::default()).unwrap();
        assert!(serialisers.exists());
    }

    #[test]
    fn no_temp_files_left_behind() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("photo.ts");
        apply_changes(&[FileChange::create(&path, "x")], &MigrationOptions::default()).unwrap();

        let entries: Vec<_> = fs::read_dir(temp_dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn change_serializes_with_type_tag() {
        let json = serde_json::to_value(FileChange::delete("/a/photo.map.ts")).unwrap();
        assert_eq!(json["type"], "delete");
        assert!(json.get("content").is_none());
    }
}
