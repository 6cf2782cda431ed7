use sqlstep_common::Result;
use std::path::Path;
use tracing::info;

use crate::store::MigrationStore;

/// Outcome of one runner invocation.
#[derive(Debug)]
pub struct RunReport {
    /// Names applied during this run, in application order.
    pub applied: Vec<String>,
    /// Files skipped because they were already recorded.
    pub skipped: usize,
}

impl RunReport {
    fn new() -> Self {
        Self {
            applied: Vec::new(),
            skipped: 0,
        }
    }

    pub fn print_summary(&self) {
        println!("Migration Report");
        println!("────────────────");
        println!(
            "  {} applied, {} already up to date",
            self.applied.len(),
            self.skipped
        );
    }
}

/// Discovers pending `*.sql` files in `dir` and applies each through the
/// store, in ascending lexicographic filename order. Filename ordering is
/// the sole sequencing mechanism; the comparison is byte-wise, so numeric
/// prefixes must be zero-padded by the author.
///
/// A missing directory is created and treated as "nothing to apply". The
/// run halts on the first failure; files applied earlier in the same run
/// stay applied (each migration commits independently).
pub fn run_pending(store: &MigrationStore, dir: &Path) -> Result<RunReport> {
    let mut report = RunReport::new();

    if !dir.exists() {
        info!("migrations directory {} missing, creating it", dir.display());
        std::fs::create_dir_all(dir)?;
        return Ok(report);
    }

    let mut files: Vec<String> = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if name.ends_with(".sql") {
            files.push(name.to_string());
        }
    }
    files.sort();

    let applied = store.list_applied()?;

    for name in files {
        if applied.contains(&name) {
            report.skipped += 1;
            continue;
        }

        let sql = std::fs::read_to_string(dir.join(&name))?;
        store.apply(&name, &sql)?;
        report.applied.push(name);
    }

    Ok(report)
}
