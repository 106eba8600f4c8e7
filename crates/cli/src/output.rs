use anyhow::Result;
use colored::{Color, Colorize};
use entity_migrator_core::{ChangeKind, MigrationResult, Severity};
use serde::Serialize;

const SUCCESS: Color = Color::Green;
const ERROR: Color = Color::Red;
const WARNING: Color = Color::Yellow;
const MUTED: Color = Color::BrightBlack;

/// Options that affect how results are printed
#[derive(Clone, Debug, Default)]
pub struct GlobalOptions {
    pub json: bool,
    pub verbose: bool,
    pub no_color: bool,
    pub dry_run: bool,
}

/// Output manager handles formatting and display
pub struct OutputManager {
    pub options: GlobalOptions,
}

impl OutputManager {
    pub fn new(options: GlobalOptions) -> Self {
        if options.no_color {
            colored::control::set_override(false);
        }
        Self { options }
    }

    fn paint(&self, icon: &str, message: &str, color: Color) -> String {
        if self.options.no_color {
            format!("{icon} {message}")
        } else {
            format!("{} {}", icon.color(color), message.color(color))
        }
    }

    pub fn success(&self, message: &str) {
        println!("{}", self.paint("✓", message, SUCCESS));
    }

    pub fn error(&self, message: &str) {
        eprintln!("{}", self.paint("✗", message, ERROR));
    }

    pub fn warning(&self, message: &str) {
        println!("{}", self.paint("!", message, WARNING));
    }

    pub fn muted(&self, message: &str) {
        println!("{}", self.paint("→", message, MUTED));
    }

    pub fn json<T: Serialize>(&self, data: &T) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(data)?);
        Ok(())
    }

    /// Run-level summary: counts, then each failure with its error
    pub fn summary(&self, result: &MigrationResult) -> Result<()> {
        if self.options.json {
            return self.json(result);
        }

        println!();
        for entity in &result.results {
            if entity.already_migrated {
                self.muted(&format!("{}: already migrated", entity.entity));
                continue;
            }
            if !entity.success {
                continue;
            }
            let count = |kind: ChangeKind| entity.changes.iter().filter(|c| c.kind == kind).count();
            self.success(&format!(
                "{}: {} created, {} updated, {} deleted",
                entity.entity,
                count(ChangeKind::Create),
                count(ChangeKind::Update),
                count(ChangeKind::Delete),
            ));
            if self.options.verbose {
                for change in &entity.changes {
                    self.muted(&format!("{:?} {}", change.kind, change.path.display()));
                }
            }
            let warnings = entity
                .diagnostics
                .iter()
                .filter(|d| d.severity == Severity::Warning)
                .count();
            if warnings > 0 {
                self.warning(&format!("{}: {warnings} warning(s) need review", entity.entity));
            }
        }

        println!();
        let mode = if self.options.dry_run { " (dry run)" } else { "" };
        println!(
            "Total: {}  Succeeded: {}  Failed: {}{mode}",
            result.total_entities, result.success_count, result.failure_count
        );

        for failure in result.failures() {
            self.error(&format!(
                "{}: {}",
                failure.entity,
                failure.error.as_deref().unwrap_or("unknown error")
            ));
        }
        Ok(())
    }
}
