//! Planned file contents layered over the file system
//!
//! A run plans entities one after another, and a later entity must see what
//! earlier ones changed: a serialiser rewritten to `AlbumDescriptor.model`, a
//! legacy file already gone. Every stage reads through an [`Overlay`] holding
//! the run's planned changes, so a dry run plans exactly what a real run
//! applies.

use std::collections::{BTreeSet, HashMap};
use std::io;
use std::path::{Path, PathBuf};

use crate::changes::{FileChange, BACKUP_SUFFIX};
use crate::error::{read_source, MigrationError};

#[derive(Debug, Clone, Default)]
pub struct Overlay {
    /// Planned content per path; `None` once the path is planned for deletion
    files: HashMap<PathBuf, Option<String>>,
}

impl Overlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Layer a plan on top of what is already recorded
    pub fn record(&mut self, changes: &[FileChange]) {
        for change in changes {
            self.files.insert(change.path.clone(), change.content.clone());
        }
    }

    pub fn is_deleted(&self, path: &Path) -> bool {
        matches!(self.files.get(path), Some(None))
    }

    /// Whether `path` is a file once the recorded plan is applied
    pub fn is_file(&self, path: &Path) -> bool {
        match self.files.get(path) {
            Some(content) => content.is_some(),
            None => path.is_file(),
        }
    }

    /// Planned content of `path`, else its content on disk
    ///
    /// # Errors
    /// `Io` when the path is planned for deletion or cannot be read.
    pub fn read(&self, path: &Path) -> Result<String, MigrationError> {
        match self.files.get(path) {
            Some(Some(content)) => Ok(content.clone()),
            Some(None) => Err(MigrationError::io(
                path,
                io::Error::new(io::ErrorKind::NotFound, "planned for deletion"),
            )),
            None => read_source(path),
        }
    }

    /// Drop deleted paths from a listing and add planned files it lacks
    ///
    /// `include` selects which planned paths belong to the listing. The result
    /// is sorted.
    pub fn merge_listing(&self, listing: Vec<PathBuf>, include: impl Fn(&Path) -> bool) -> Vec<PathBuf> {
        let mut merged: BTreeSet<PathBuf> = listing
            .into_iter()
            .filter(|path| !self.is_deleted(path))
            .collect();
        merged.extend(
            self.files
                .iter()
                .filter(|(path, content)| content.is_some() && include(path))
                .map(|(path, _)| path.clone()),
        );
        merged.into_iter().collect()
    }

    /// Files directly inside `dir` once the plan is applied, backups excluded
    ///
    /// # Errors
    /// `Io` when the directory exists but cannot be listed.
    pub fn list_dir(&self, dir: &Path) -> Result<Vec<PathBuf>, MigrationError> {
        let listing = match std::fs::read_dir(dir) {
            Ok(entries) => entries
                .map(|entry| entry.map(|e| e.path()))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| MigrationError::io(dir, e))?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(MigrationError::io(dir, e)),
        };

        Ok(self
            .merge_listing(listing, |path| path.parent() == Some(dir))
            .into_iter()
            .filter(|path| !path.to_string_lossy().ends_with(BACKUP_SUFFIX))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn planned_content_shadows_disk() {
        let temp_dir = TempDir::new().unwrap();
        let model = temp_dir.path().join("photo.model.ts");
        let service = temp_dir.path().join("feed.service.ts");
        fs::write(&model, "export const PhotoModel = {};\n").unwrap();
        fs::write(&service, "PhotoModel.endpoint;\n").unwrap();

        let mut overlay = Overlay::new();
        overlay.record(&[
            FileChange::update(&service, "PhotoDescriptor.model.endpoint;\n"),
            FileChange::delete(&model),
        ]);

        assert_eq!(overlay.read(&service).unwrap(), "PhotoDescriptor.model.endpoint;\n");
        assert!(matches!(overlay.read(&model), Err(MigrationError::Io { .. })));
        assert!(!overlay.is_file(&model));
        assert!(overlay.is_file(&service));
        // Disk is untouched
        assert!(model.exists());
    }

    #[test]
    fn listings_follow_the_plan() {
        let temp_dir = TempDir::new().unwrap();
        let serialisers = temp_dir.path().join("serialisers");
        fs::create_dir(&serialisers).unwrap();
        let photo = serialisers.join("photo.serialiser.ts");
        let album = serialisers.join("album.serialiser.ts");
        fs::write(&photo, "x").unwrap();
        fs::write(&album, "x").unwrap();
        fs::write(serialisers.join("photo.serialiser.ts.bak"), "x").unwrap();

        let mut overlay = Overlay::new();
        overlay.record(&[FileChange::delete(&album)]);
        assert_eq!(overlay.list_dir(&serialisers).unwrap(), vec![photo.clone()]);

        let descriptor = temp_dir.path().join("album.ts");
        overlay.record(&[FileChange::create(&descriptor, "export const AlbumDescriptor = 1;\n")]);
        let merged = overlay.merge_listing(vec![album.clone(), photo.clone()], |p| p.starts_with(temp_dir.path()));
        assert_eq!(merged, vec![descriptor, photo]);
    }

    #[test]
    fn missing_directory_lists_nothing() {
        let overlay = Overlay::new();
        assert!(overlay.list_dir(Path::new("/definitely/not/here")).unwrap().is_empty());
    }
}
