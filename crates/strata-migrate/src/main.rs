//! strata-migrate CLI
//!
//! Command-line tool for generating and applying record-based migrations.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use strata_migrate::prelude::*;

/// Record-based database migrations driven by schema state diffing.
#[derive(Parser)]
#[command(name = "strata-migrate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database URL (SQLite path or connection string).
    #[arg(short, long, env = "DATABASE_URL", default_value = "sqlite:db.sqlite3")]
    database: String,

    /// Migrations directory.
    #[arg(short, long, default_value = "migrations")]
    migrations_dir: PathBuf,

    /// Declared models: a JSON object mapping each table to its fields.
    #[arg(long, env = "STRATA_MODELS", default_value = "models.json")]
    models: PathBuf,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the migrations system (create history table).
    Init,

    /// Generate a new migration from model changes.
    #[command(name = "makemigrations")]
    MakeMigrations {
        /// Migration name/description.
        #[arg(short, long)]
        name: Option<String>,

        /// Show the migration without writing it (dry run).
        #[arg(long)]
        dry_run: bool,
    },

    /// Apply pending migrations.
    Migrate {
        /// Show SQL without executing (dry run).
        #[arg(long)]
        dry_run: bool,
    },

    /// Show migration status.
    #[command(name = "showmigrations")]
    ShowMigrations,

    /// Show SQL for a migration without executing.
    #[command(name = "sqlmigrate")]
    SqlMigrate {
        /// Migration name, such as `0002_add_email`.
        migration: String,

        /// Dialect to render for.
        #[arg(long, default_value = "sqlite")]
        dialect: String,
    },

    /// Fail if the models have changes not captured by a migration.
    Check,
}

async fn connect(database: &str) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database)
        .with_context(|| format!("invalid database URL '{database}'"))?
        .create_if_missing(true);
    Ok(SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?)
}

fn load_models(path: &Path) -> anyhow::Result<State> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read models from {}", path.display()))?;
    Ok(State::from_json(&json)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let store = MigrationStore::new(&cli.migrations_dir);

    match cli.command {
        Commands::Init => {
            info!("Initializing migrations system...");
            let executor = MigrationExecutor::new(connect(&cli.database).await?);
            executor.init().await?;
            info!("Migrations table created successfully.");
        }

        Commands::MakeMigrations { name, dry_run } => {
            let declared = load_models(&cli.models)?;
            let previous = store.replay_state()?;
            let migration = declared.diff(&previous);

            if migration.is_empty() {
                info!("No changes detected.");
                return Ok(());
            }

            let description = name.unwrap_or_else(|| suggest_description(&migration));
            let full_name = generate_migration_name(store.next_number()?, &description);

            for operation in migration.operations() {
                info!("  - {}", operation.description());
            }

            if dry_run {
                println!("Would create migration: {full_name}");
                println!("\n{}", migration.to_json()?);
                println!("\n{}", migration.render(Dialect::SQLITE)?);
            } else {
                let path = store.write(&full_name, &migration)?;
                info!("Created migration: {}", path.display());
            }
        }

        Commands::Migrate { dry_run } => {
            let migrations = store.load_all()?;
            let executor =
                MigrationExecutor::new(connect(&cli.database).await?).dry_run(dry_run);
            executor.init().await?;

            if dry_run {
                info!("Dry run mode - SQL will be printed but not executed.");
            }

            let pending = executor.pending(&migrations).await?;
            if pending.is_empty() {
                info!("No migrations to apply.");
                return Ok(());
            }

            for migration in pending {
                executor.apply(migration).await?;
            }
        }

        Commands::ShowMigrations => {
            let migrations = if store.exists() {
                store.names()?
            } else {
                Vec::new()
            };
            let executor = MigrationExecutor::new(connect(&cli.database).await?);
            executor.init().await?;
            let applied = executor.history().get_applied().await?;

            if migrations.is_empty() && applied.is_empty() {
                info!("No migrations found.");
                return Ok(());
            }

            println!("\nMigrations:");
            println!("{:-<60}", "");
            for name in &migrations {
                match applied.iter().find(|a| &a.name == name) {
                    Some(a) => println!(
                        " [X] {name} ({})",
                        a.applied_at.format("%Y-%m-%d %H:%M:%S")
                    ),
                    None => println!(" [ ] {name}"),
                }
            }
            for a in applied.iter().filter(|a| !migrations.contains(&a.name)) {
                warn!(name = %a.name, "Applied migration has no record file");
                println!(" [?] {}", a.name);
            }
            println!();
        }

        Commands::SqlMigrate { migration, dialect } => {
            let dialect: Dialect = dialect.parse()?;
            let named = store.load(&migration)?;
            println!("{}", named.migration.render(dialect)?);
        }

        Commands::Check => {
            let declared = load_models(&cli.models)?;
            let migration = declared.diff(&store.replay_state()?);
            if !migration.is_empty() {
                for operation in migration.operations() {
                    println!("  - {}", operation.description());
                }
                bail!(
                    "{} change(s) in {} are not captured by migrations in {}",
                    migration.len(),
                    cli.models.display(),
                    cli.migrations_dir.display()
                );
            }
            info!("Models and migrations are in sync.");
        }
    }

    Ok(())
}
