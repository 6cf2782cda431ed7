pub mod paths;
pub mod runner;
pub mod store;

pub use runner::{RunReport, run_pending};
pub use store::{AppliedMigration, MigrationStore};
