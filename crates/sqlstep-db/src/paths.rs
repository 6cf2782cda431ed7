use std::path::PathBuf;

/// Environment variable that overrides where the store file lives.
pub const DB_PATH_ENV: &str = "SQLSTEP_DB";

/// Resolves the store file location: `SQLSTEP_DB` wins when set, otherwise a
/// `sqlstep/sqlstep.db` file under the platform data directory, falling back
/// to `data/sqlstep.db` relative to the working directory when the platform
/// has no data dir.
pub fn default_db_path() -> PathBuf {
    if let Ok(path) = std::env::var(DB_PATH_ENV)
        && !path.is_empty()
    {
        return PathBuf::from(path);
    }

    match dirs::data_dir() {
        Some(data) => data.join("sqlstep").join("sqlstep.db"),
        None => PathBuf::from("data").join("sqlstep.db"),
    }
}

/// Default migrations directory, resolved relative to the working directory
/// of the invoking process.
pub fn default_migrations_dir() -> PathBuf {
    PathBuf::from("migrations")
}
