//! Migration executor.
//!
//! This module applies migrations against a SQLite database. Each migration
//! runs in its own transaction together with its history entry, so a
//! failing statement leaves neither partial DDL nor a history row behind.

use sqlx::sqlite::{SqliteConnection, SqlitePool};
use strata_core::{Dialect, Executor, Migration, SchemaEngine};
use tracing::{debug, info, warn};

use crate::error::{MigrateError, Result};
use crate::history::MigrationHistory;
use crate::store::migration_number;

/// A migration together with its name.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedMigration {
    /// Migration name, such as `0001_initial`.
    pub name: String,
    /// The migration.
    pub migration: Migration,
}

impl NamedMigration {
    /// Creates a named migration.
    #[must_use]
    pub fn new(name: impl Into<String>, migration: Migration) -> Self {
        Self {
            name: name.into(),
            migration,
        }
    }

    /// Returns the sequence number encoded in the name.
    #[must_use]
    pub fn number(&self) -> Option<u32> {
        migration_number(&self.name)
    }
}

/// Runs rendered scripts on one connection, usually an open transaction.
struct ConnectionExecutor<'c> {
    conn: &'c mut SqliteConnection,
    dialect: Dialect,
}

impl Executor for ConnectionExecutor<'_> {
    type Error = MigrateError;

    fn schema_engine(&self) -> SchemaEngine {
        SchemaEngine::new(self.dialect)
    }

    async fn execute_script(&mut self, sql: &str) -> Result<()> {
        debug!(sql = %sql, "Executing SQL");
        sqlx::raw_sql(sql).execute(&mut *self.conn).await?;
        Ok(())
    }
}

/// Executes migrations against a database.
pub struct MigrationExecutor {
    pool: SqlitePool,
    dialect: Dialect,
    history: MigrationHistory,
    dry_run: bool,
}

impl MigrationExecutor {
    /// Creates a new migration executor.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        let history = MigrationHistory::new(pool.clone());
        Self {
            pool,
            dialect: Dialect::SQLITE,
            history,
            dry_run: false,
        }
    }

    /// Enables dry-run mode (SQL is printed but not executed).
    #[must_use]
    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    /// Ensures the migrations history table exists.
    pub async fn init(&self) -> Result<()> {
        if !self.dry_run {
            self.history.ensure_table().await?;
        }
        Ok(())
    }

    /// Returns the migration history.
    #[must_use]
    pub fn history(&self) -> &MigrationHistory {
        &self.history
    }

    /// Returns the dialect.
    #[must_use]
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Checks if a migration has been applied.
    pub async fn is_applied(&self, name: &str) -> Result<bool> {
        self.history.is_applied(name).await
    }

    /// Applies a single migration.
    ///
    /// Errors are attributed to the migration by name.
    pub async fn apply(&self, migration: &NamedMigration) -> Result<()> {
        self.apply_inner(migration)
            .await
            .map_err(|e| e.in_migration(migration.name.as_str()))
    }

    async fn apply_inner(&self, named: &NamedMigration) -> Result<()> {
        info!(name = %named.name, "Applying migration");

        if self.dry_run {
            println!("-- {}", named.name);
            println!("{}", self.sql_for(named)?);
            return Ok(());
        }

        if self.history.is_applied(&named.name).await? {
            warn!(name = %named.name, "Migration already applied, skipping");
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        let mut session = ConnectionExecutor {
            conn: &mut *tx,
            dialect: self.dialect,
        };
        named.migration.apply(&mut session).await?;
        MigrationHistory::insert(&mut *tx, &named.name, &named.migration).await?;
        tx.commit().await?;

        info!(name = %named.name, "Migration applied successfully");
        Ok(())
    }

    /// Applies multiple migrations in order, stopping at the first failure.
    pub async fn apply_all(&self, migrations: &[NamedMigration]) -> Result<()> {
        for migration in migrations {
            self.apply(migration).await?;
        }
        Ok(())
    }

    /// Returns pending migrations (not yet applied). Without a history table
    /// every migration is pending.
    pub async fn pending<'a>(
        &self,
        migrations: &'a [NamedMigration],
    ) -> Result<Vec<&'a NamedMigration>> {
        if !self.history.table_exists().await? {
            return Ok(migrations.iter().collect());
        }
        let applied = self.history.get_applied_set().await?;
        Ok(migrations
            .iter()
            .filter(|m| !applied.contains(&m.name))
            .collect())
    }

    /// Renders the SQL for a migration without executing it.
    pub fn sql_for(&self, migration: &NamedMigration) -> Result<String> {
        migration
            .migration
            .render(self.dialect)
            .map_err(|e| MigrateError::from(e).in_migration(migration.name.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;
    use strata_core::{FieldMeta, Fields, SchemaError};

    async fn create_test_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .expect("Failed to create in-memory SQLite pool")
    }

    async fn table_exists(pool: &SqlitePool, table: &str) -> bool {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT name FROM sqlite_master WHERE type='table' AND name=?")
                .bind(table)
                .fetch_optional(pool)
                .await
                .unwrap();
        row.is_some()
    }

    async fn columns(pool: &SqlitePool, table: &str) -> Vec<String> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT name FROM pragma_table_info(?)")
            .bind(table)
            .fetch_all(pool)
            .await
            .unwrap();
        rows.into_iter().map(|(name,)| name).collect()
    }

    fn users_fields() -> Fields {
        let mut fields = Fields::new();
        fields.insert("id".to_string(), FieldMeta::new("INTEGER").primary_key());
        fields.insert("username".to_string(), FieldMeta::new("VARCHAR(255)"));
        fields
    }

    fn create_users_migration() -> NamedMigration {
        let mut migration = Migration::new();
        migration.add_create_table_operation("users", users_fields());
        NamedMigration::new("0001_initial", migration)
    }

    fn add_email_migration() -> NamedMigration {
        let mut migration = Migration::new();
        migration
            .add_change_table_operation("users", users_fields())
            .add_create_field_suboperation("email", FieldMeta::new("TEXT").nullable());
        NamedMigration::new("0002_add_email", migration)
    }

    #[tokio::test]
    async fn test_apply_migration() {
        let pool = create_test_pool().await;
        let executor = MigrationExecutor::new(pool);
        executor.init().await.unwrap();

        executor.apply(&create_users_migration()).await.unwrap();

        assert!(table_exists(&executor.pool, "users").await);
        assert!(executor.is_applied("0001_initial").await.unwrap());
    }

    #[tokio::test]
    async fn test_apply_idempotent() {
        let pool = create_test_pool().await;
        let executor = MigrationExecutor::new(pool);
        executor.init().await.unwrap();

        let migration = create_users_migration();

        // Apply twice - should not error
        executor.apply(&migration).await.unwrap();
        executor.apply(&migration).await.unwrap();
        assert_eq!(executor.history().count_applied().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_apply_all_and_replay() {
        let pool = create_test_pool().await;
        let executor = MigrationExecutor::new(pool);
        executor.init().await.unwrap();

        let migrations = vec![create_users_migration(), add_email_migration()];
        executor.apply_all(&migrations).await.unwrap();

        assert_eq!(
            columns(&executor.pool, "users").await,
            vec!["id", "username", "email"]
        );

        let mut expected = strata_core::State::new();
        for named in &migrations {
            named.migration.apply_to_state(&mut expected).unwrap();
        }
        assert_eq!(executor.history().replay_state().await.unwrap(), expected);
    }

    #[tokio::test]
    async fn test_failed_migration_is_rolled_back() {
        let pool = create_test_pool().await;
        let executor = MigrationExecutor::new(pool);
        executor.init().await.unwrap();

        let mut migration = Migration::new();
        migration.add_create_table_operation("posts", users_fields());
        migration
            .add_change_table_operation("ghosts", Fields::new())
            .add_delete_field_suboperation("id");
        let broken = NamedMigration::new("0001_broken", migration);

        let err = executor.apply(&broken).await.unwrap_err();
        assert!(matches!(
            err,
            MigrateError::InMigration { ref migration, .. } if migration == "0001_broken"
        ));

        assert!(!table_exists(&executor.pool, "posts").await);
        assert!(!executor.is_applied("0001_broken").await.unwrap());
    }

    #[tokio::test]
    async fn test_render_error_names_migration() {
        let pool = create_test_pool().await;
        let executor = MigrationExecutor::new(pool);
        executor.init().await.unwrap();

        let mut migration = Migration::new();
        migration.add_create_table_operation("posts", {
            let mut fields = Fields::new();
            fields.insert("title".to_string(), FieldMeta::default());
            fields
        });
        let named = NamedMigration::new("0003_untyped", migration);

        let err = executor.apply(&named).await.unwrap_err();
        let MigrateError::InMigration { migration, source } = err else {
            panic!("expected a migration error");
        };
        assert_eq!(migration, "0003_untyped");
        assert!(matches!(
            *source,
            MigrateError::Schema(SchemaError::MissingRequiredAttribute { .. })
        ));
    }

    #[tokio::test]
    async fn test_pending_migrations() {
        let pool = create_test_pool().await;
        let executor = MigrationExecutor::new(pool);
        executor.init().await.unwrap();

        let migrations = vec![create_users_migration(), add_email_migration()];

        let pending = executor.pending(&migrations).await.unwrap();
        assert_eq!(pending.len(), 2);

        executor.apply(&migrations[0]).await.unwrap();

        let pending = executor.pending(&migrations).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].name, "0002_add_email");
        assert_eq!(pending[0].number(), Some(2));
    }

    #[tokio::test]
    async fn test_sql_generation() {
        let pool = create_test_pool().await;
        let executor = MigrationExecutor::new(pool);

        let sql = executor.sql_for(&add_email_migration()).unwrap();
        assert_eq!(sql, "ALTER TABLE users\nADD email TEXT NULL;");
    }

    #[tokio::test]
    async fn test_dry_run() {
        let pool = create_test_pool().await;
        let executor = MigrationExecutor::new(pool.clone()).dry_run(true);
        executor.init().await.unwrap();

        executor.apply(&create_users_migration()).await.unwrap();

        // Table should NOT exist (dry run)
        assert!(!table_exists(&pool, "users").await);
    }
}
