//! Record-based database migrations.
//!
//! `strata-migrate` drives [`strata_core`] against a real database:
//! - Migrations are diffed from declared models and stored as JSON records
//! - Applying a migration and recording it in history is one transaction
//! - The applied history alone is enough to rebuild the expected schema state
//!
//! # Architecture
//!
//! - **Store** - a directory of numbered migration record files
//! - **Executor** - applies migrations to a SQLite database
//! - **History** - the `strata_migrations` table of applied records
//!
//! # CLI Usage
//!
//! ```bash
//! # Diff models.json against the stored migrations and write a new record
//! strata-migrate makemigrations --name add_email
//!
//! # Apply pending migrations
//! strata-migrate migrate
//!
//! # Show migration status
//! strata-migrate showmigrations
//!
//! # Preview a migration's DDL for another dialect
//! strata-migrate sqlmigrate 0002_add_email --dialect mysql
//! ```

pub mod error;
pub mod executor;
pub mod history;
pub mod store;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::error::{MigrateError, Result};
    pub use crate::executor::{MigrationExecutor, NamedMigration};
    pub use crate::history::{AppliedMigration, MigrationHistory};
    pub use crate::store::{generate_migration_name, suggest_description, MigrationStore};
    pub use strata_core::prelude::*;
}
