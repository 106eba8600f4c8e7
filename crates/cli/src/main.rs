mod output;

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use entity_migrator_core::{MigrationOptions, MigrationResult, Migrator};
use output::{GlobalOptions, OutputManager};

/// Entity Migrator - consolidate legacy entity files into descriptors
#[derive(Parser)]
#[command(name = "migrator")]
#[command(version)] // Auto-pull version from Cargo.toml
#[command(
    about = "Migrate legacy meta/type/model/map/serialiser entities to a single descriptor",
    long_about = None
)]
struct Cli {
    /// Module directory to migrate (relative to --root)
    #[arg(long)]
    path: Option<PathBuf>,

    /// Migrate a single entity of the module
    #[arg(long, requires = "path")]
    entity: Option<String>,

    /// Migrate every module under the source root
    #[arg(long, conflicts_with_all = ["path", "entity"])]
    all: bool,

    /// Compute and log every change without writing
    #[arg(long)]
    dry_run: bool,

    /// Do not write .bak copies before overwriting
    #[arg(long)]
    skip_backup: bool,

    /// Enable verbose output
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Project root holding migrator.toml
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let output = OutputManager::new(GlobalOptions {
        json: cli.json,
        verbose: cli.verbose,
        no_color: cli.no_color,
        dry_run: cli.dry_run,
    });

    let code = match run(&cli).and_then(|result| {
        output.summary(&result)?;
        Ok(result)
    }) {
        Ok(result) if result.failure_count == 0 => 0,
        Ok(_) => 1,
        Err(err) => {
            output.error(&format!("{err:#}"));
            1
        }
    };
    std::process::exit(code);
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: &Cli) -> Result<MigrationResult> {
    let options = MigrationOptions {
        dry_run: cli.dry_run,
        skip_backup: cli.skip_backup,
        verbose: cli.verbose,
    };
    let migrator = Migrator::new(&cli.root, options)
        .with_context(|| format!("opening project at {}", cli.root.display()))?;
    tracing::debug!(root = %migrator.project_root().display(), "project opened");

    if cli.all {
        return Ok(migrator.migrate_all()?);
    }
    let Some(path) = &cli.path else {
        bail!("either --path <module-dir> or --all is required");
    };
    Ok(migrator.migrate(path, cli.entity.as_deref())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn all_conflicts_with_path() {
        assert!(Cli::try_parse_from(["migrator", "--all", "--path", "src/x"]).is_err());
        let cli = Cli::try_parse_from(["migrator", "--path", "src/x", "--entity", "photo", "--dry-run"]).unwrap();
        assert_eq!(cli.entity.as_deref(), Some("photo"));
        assert!(cli.dry_run);
    }
}
