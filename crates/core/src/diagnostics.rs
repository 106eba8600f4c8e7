//! Diagnostics returned by pipeline stages as data
//!
//! Stages never print. They hand back `Diagnostic`s; the orchestrator logs them
//! as they arrive and keeps them on the entity result for the CLI to render.

use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Diagnostic {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            message: message.into(),
            file: None,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
            file: None,
        }
    }

    pub fn in_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }

    /// Forward to `tracing` at the matching level
    pub fn emit(&self, entity: &str) {
        let file = self
            .file
            .as_ref()
            .map(|f| f.display().to_string())
            .unwrap_or_default();
        match self.severity {
            Severity::Info => tracing::info!(entity = %entity, file = %file, "{}", self.message),
            Severity::Warning => tracing::warn!(entity = %entity, file = %file, "{}", self.message),
        }
    }
}
