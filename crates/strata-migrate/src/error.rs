//! Error types for the migration tooling.

use std::path::PathBuf;

use strata_core::SchemaError;

/// Errors that can occur while storing, loading or applying migrations.
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    /// Building, replaying or rendering a migration failed.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// A failure attributed to one named migration.
    #[error("Migration '{migration}' failed: {source}")]
    InMigration {
        /// Migration name.
        migration: String,
        /// Underlying error.
        #[source]
        source: Box<MigrateError>,
    },

    /// Database error during migration execution.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// IO error (reading/writing migration files).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Migration file already exists.
    #[error("Migration file already exists: {0}")]
    MigrationExists(PathBuf),

    /// No migrations directory found.
    #[error("Migrations directory not found: {0}")]
    MigrationsDirNotFound(PathBuf),

    /// Migration not found.
    #[error("Migration not found: {0}")]
    MigrationNotFound(String),

    /// Invalid migration state.
    #[error("Invalid migration state: {0}")]
    InvalidState(String),
}

impl MigrateError {
    /// Attributes this error to `migration`.
    #[must_use]
    pub fn in_migration(self, migration: impl Into<String>) -> Self {
        match self {
            already @ Self::InMigration { .. } => already,
            other => Self::InMigration {
                migration: migration.into(),
                source: Box::new(other),
            },
        }
    }
}

/// Result type for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
