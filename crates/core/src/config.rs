//! Project configuration loaded from `migrator.toml`

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::MigrationError;

/// File name looked up in the project root
pub const CONFIG_FILE_NAME: &str = "migrator.toml";

/// Configuration stored in `migrator.toml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigratorConfig {
    /// Directory holding every module, relative to the project root
    #[serde(default = "default_source_root")]
    pub source_root: String,

    /// Public package of the descriptor runtime; its imports are never copied
    #[serde(default = "default_framework_package")]
    pub framework_package: String,

    /// Internal barrel (relative to `source_root`) used for framework symbols
    #[serde(default = "default_framework_barrel")]
    pub framework_barrel: String,
}

impl Default for MigratorConfig {
    fn default() -> Self {
        Self {
            source_root: default_source_root(),
            framework_package: default_framework_package(),
            framework_barrel: default_framework_barrel(),
        }
    }
}

fn default_source_root() -> String {
    "src".to_string()
}

fn default_framework_package() -> String {
    "@carlonicora/nestjs-neo4jsonapi".to_string()
}

fn default_framework_barrel() -> String {
    "common".to_string()
}

impl MigratorConfig {
    /// Load `migrator.toml` from the project root, falling back to defaults
    pub fn load(project_root: &Path) -> Result<Self, MigrationError> {
        let config_path = project_root.join(CONFIG_FILE_NAME);
        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| MigrationError::io(&config_path, e))?;
        toml::from_str(&content).map_err(|e| MigrationError::Config {
            path: config_path,
            message: e.to_string(),
        })
    }

    /// Absolute source root for a project
    pub fn source_root(&self, project_root: &Path) -> PathBuf {
        project_root.join(&self.source_root)
    }

    /// Absolute location of the framework barrel module
    pub fn barrel_path(&self, project_root: &Path) -> PathBuf {
        self.source_root(project_root).join(&self.framework_barrel)
    }
}

/// Per-run switches supplied by the CLI
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationOptions {
    /// Compute the full plan but never touch the file system
    pub dry_run: bool,
    /// Do not write `.bak` copies before overwriting
    pub skip_backup: bool,
    /// Emit per-step detail
    pub verbose: bool,
}
