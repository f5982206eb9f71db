//! Migration history tracking.
//!
//! This module manages the `strata_migrations` table. Every applied
//! migration is stored with its full JSON record, so the schema state the
//! database should have can be rebuilt from the table alone.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;
use sqlx::sqlite::SqlitePool;
use sqlx::SqliteExecutor;
use strata_core::{Migration, State};
use tracing::debug;

use crate::error::{MigrateError, Result};

/// SQL to create the migrations history table (SQLite).
pub const CREATE_MIGRATIONS_TABLE_SQL: &str = r"
CREATE TABLE IF NOT EXISTS strata_migrations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    record TEXT NOT NULL,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
)
";

const SELECT_APPLIED_SQL: &str = "SELECT id, name, record, applied_at FROM strata_migrations";

type AppliedRow = (i64, String, String, String);

/// A record of an applied migration.
#[derive(Debug, Clone)]
pub struct AppliedMigration {
    /// Unique ID in the migrations table.
    pub id: i64,
    /// Migration name.
    pub name: String,
    /// The persisted migration record.
    pub record: Value,
    /// When the migration was applied.
    pub applied_at: DateTime<Utc>,
}

impl AppliedMigration {
    fn from_row((id, name, record, applied_at): AppliedRow) -> Result<Self> {
        let record = serde_json::from_str(&record)
            .map_err(|e| MigrateError::from(e).in_migration(name.as_str()))?;
        Ok(Self {
            id,
            name,
            record,
            applied_at: parse_timestamp(&applied_at),
        })
    }

    /// Rebuilds the migration from its stored record.
    ///
    /// # Errors
    ///
    /// Fails if the stored record is not a valid migration.
    pub fn migration(&self) -> Result<Migration> {
        Migration::from_entry(&self.record)
            .map_err(|e| MigrateError::from(e).in_migration(self.name.as_str()))
    }
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| {
            // SQLite datetime format fallback
            NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
                .map(|dt| dt.and_utc())
                .unwrap_or_else(|_| Utc::now())
        })
}

/// Manages the migration history in the database.
#[derive(Debug, Clone)]
pub struct MigrationHistory {
    pool: SqlitePool,
}

impl MigrationHistory {
    /// Creates a new migration history manager.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Ensures the migrations table exists.
    pub async fn ensure_table(&self) -> Result<()> {
        sqlx::query(CREATE_MIGRATIONS_TABLE_SQL)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Checks whether the migrations table exists yet.
    pub async fn table_exists(&self) -> Result<bool> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'strata_migrations'",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    /// Records a migration as applied.
    pub async fn record_applied(&self, name: &str, migration: &Migration) -> Result<()> {
        Self::insert(&self.pool, name, migration).await
    }

    /// Records a migration as applied through `executor`, typically an open
    /// transaction that also ran the migration's DDL.
    pub async fn insert<'e, E>(executor: E, name: &str, migration: &Migration) -> Result<()>
    where
        E: SqliteExecutor<'e>,
    {
        let record = serde_json::to_string(&migration.to_record()?)?;
        sqlx::query("INSERT INTO strata_migrations (name, record) VALUES (?, ?)")
            .bind(name)
            .bind(record)
            .execute(executor)
            .await?;
        debug!(name, "Recorded migration in history");
        Ok(())
    }

    /// Checks if a migration has been applied.
    pub async fn is_applied(&self, name: &str) -> Result<bool> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM strata_migrations WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.is_some())
    }

    /// Gets all applied migrations, oldest first.
    pub async fn get_applied(&self) -> Result<Vec<AppliedMigration>> {
        let rows: Vec<AppliedRow> = sqlx::query_as(&format!("{SELECT_APPLIED_SQL} ORDER BY id"))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(AppliedMigration::from_row).collect()
    }

    /// Gets the most recently applied migration.
    pub async fn get_last_applied(&self) -> Result<Option<AppliedMigration>> {
        let row: Option<AppliedRow> =
            sqlx::query_as(&format!("{SELECT_APPLIED_SQL} ORDER BY id DESC LIMIT 1"))
                .fetch_optional(&self.pool)
                .await?;

        row.map(AppliedMigration::from_row).transpose()
    }

    /// Counts applied migrations.
    pub async fn count_applied(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM strata_migrations")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    /// Gets the names of all applied migrations.
    pub async fn get_applied_set(&self) -> Result<HashSet<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT name FROM strata_migrations")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    /// Rebuilds the schema state by replaying every applied migration in
    /// the order it was applied.
    pub async fn replay_state(&self) -> Result<State> {
        let mut state = State::new();
        for applied in self.get_applied().await? {
            state
                .mutate(&applied.record)
                .map_err(|e| MigrateError::from(e).in_migration(applied.name.as_str()))?;
        }
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;
    use strata_core::{FieldMeta, Fields};

    async fn create_test_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .expect("Failed to create in-memory SQLite pool")
    }

    fn users_fields() -> Fields {
        let mut fields = Fields::new();
        fields.insert("id".to_string(), FieldMeta::new("INTEGER").primary_key());
        fields.insert("name".to_string(), FieldMeta::new("TEXT"));
        fields
    }

    fn create_users() -> Migration {
        let mut migration = Migration::new();
        migration.add_create_table_operation("users", users_fields());
        migration
    }

    fn add_email() -> Migration {
        let mut migration = Migration::new();
        migration
            .add_change_table_operation("users", users_fields())
            .add_create_field_suboperation("email", FieldMeta::new("TEXT").nullable());
        migration
    }

    #[tokio::test]
    async fn test_ensure_table() {
        let pool = create_test_pool().await;
        let history = MigrationHistory::new(pool);

        assert!(!history.table_exists().await.unwrap());

        // Should be idempotent
        history.ensure_table().await.unwrap();
        assert!(history.table_exists().await.unwrap());
        history.ensure_table().await.unwrap();
        assert_eq!(history.count_applied().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_record_and_check_applied() {
        let pool = create_test_pool().await;
        let history = MigrationHistory::new(pool);
        history.ensure_table().await.unwrap();

        assert!(!history.is_applied("0001_initial").await.unwrap());

        history
            .record_applied("0001_initial", &create_users())
            .await
            .unwrap();

        assert!(history.is_applied("0001_initial").await.unwrap());
        assert!(history
            .record_applied("0001_initial", &create_users())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_get_applied_keeps_records() {
        let pool = create_test_pool().await;
        let history = MigrationHistory::new(pool);
        history.ensure_table().await.unwrap();

        history
            .record_applied("0001_initial", &create_users())
            .await
            .unwrap();
        history
            .record_applied("0002_add_email", &add_email())
            .await
            .unwrap();

        let all = history.get_applied().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].name, "0001_initial");
        assert_eq!(all[1].migration().unwrap(), add_email());

        let last = history.get_last_applied().await.unwrap().unwrap();
        assert_eq!(last.name, "0002_add_email");
        assert_eq!(history.count_applied().await.unwrap(), 2);
        assert!(history
            .get_applied_set()
            .await
            .unwrap()
            .contains("0001_initial"));
    }

    #[tokio::test]
    async fn test_replay_state() {
        let pool = create_test_pool().await;
        let history = MigrationHistory::new(pool);
        history.ensure_table().await.unwrap();
        assert!(history.replay_state().await.unwrap().is_empty());

        history
            .record_applied("0001_initial", &create_users())
            .await
            .unwrap();
        history
            .record_applied("0002_add_email", &add_email())
            .await
            .unwrap();

        let state = history.replay_state().await.unwrap();
        let columns: Vec<&String> = state.get("users").unwrap().keys().collect();
        assert_eq!(columns, vec!["id", "name", "email"]);
    }

    #[tokio::test]
    async fn test_replay_names_the_broken_migration() {
        let pool = create_test_pool().await;
        let history = MigrationHistory::new(pool);
        history.ensure_table().await.unwrap();

        history
            .record_applied("0001_orphan", &add_email())
            .await
            .unwrap();

        let err = history.replay_state().await.unwrap_err();
        assert!(matches!(
            err,
            MigrateError::InMigration { ref migration, .. } if migration == "0001_orphan"
        ));
    }

    #[test]
    fn test_parse_sqlite_timestamp() {
        let parsed = parse_timestamp("2024-05-01 12:30:00");
        assert_eq!(parsed.format("%Y-%m-%d %H:%M").to_string(), "2024-05-01 12:30");
    }
}
