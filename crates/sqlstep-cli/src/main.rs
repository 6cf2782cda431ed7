use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use sqlstep_db::{MigrationStore, paths, runner};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "sqlstep",
    version,
    about = "Apply pending SQLite schema migrations"
)]
struct Cli {
    /// Store file location (falls back to the platform data directory)
    #[arg(long, env = "SQLSTEP_DB")]
    db_path: Option<PathBuf>,

    /// Directory containing *.sql migration files
    #[arg(long, default_value = "migrations")]
    dir: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .init();

    let db_path = cli.db_path.unwrap_or_else(paths::default_db_path);
    let store = MigrationStore::open(&db_path)
        .with_context(|| format!("failed to open store at {}", db_path.display()))?;

    let report = runner::run_pending(&store, &cli.dir)
        .with_context(|| format!("migration run failed in {}", cli.dir.display()))?;

    for name in &report.applied {
        println!("applied {name}");
    }
    report.print_summary();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::Cli;
    use clap::Parser;

    #[test]
    fn parses_with_no_arguments() {
        let cli = Cli::try_parse_from(["sqlstep"]).expect("bare invocation should parse");
        assert!(cli.db_path.is_none());
        assert_eq!(cli.dir.to_str(), Some("migrations"));
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn accepts_explicit_paths() {
        let cli = Cli::try_parse_from(["sqlstep", "--db-path", "/tmp/x.db", "--dir", "schema"])
            .expect("flags should parse");
        assert_eq!(cli.db_path.as_deref().map(|p| p.to_str()), Some(Some("/tmp/x.db")));
        assert_eq!(cli.dir.to_str(), Some("schema"));
    }
}
