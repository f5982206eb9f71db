//! File-based migration records.
//!
//! A store is a directory of `NNNN_<name>.json` files, one persisted
//! migration record each. The numeric prefix orders them.

use std::fs;
use std::path::{Path, PathBuf};

use strata_core::{Migration, Operation, State};
use tracing::{debug, info};

use crate::error::{MigrateError, Result};
use crate::executor::NamedMigration;

const RECORD_EXTENSION: &str = "json";

/// Generates a migration name from a sequence number and a description.
///
/// The description is lowercased and every run of characters other than
/// ASCII letters and digits becomes a single underscore.
#[must_use]
pub fn generate_migration_name(number: u32, description: &str) -> String {
    let mut slug = String::with_capacity(description.len());
    for c in description.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('_') {
            slug.push('_');
        }
    }
    let slug = slug.trim_end_matches('_');
    let slug = if slug.is_empty() { "auto" } else { slug };
    format!("{number:04}_{slug}")
}

/// Suggests a description for `migration` from its operations.
#[must_use]
pub fn suggest_description(migration: &Migration) -> String {
    let operations: Vec<Operation> = migration.operations().collect();
    match operations.as_slice() {
        [Operation::CreateTable(op)] => format!("create_{}", op.table),
        [Operation::DeleteTable(op)] => format!("delete_{}", op.table),
        [Operation::AlterTable(op)] => format!("alter_{}", op.table),
        ops if !ops.is_empty() && ops.iter().all(|op| matches!(op, Operation::CreateTable(_))) => {
            "initial".to_string()
        }
        _ => "auto".to_string(),
    }
}

/// Returns the sequence number of a migration name such as `0003_add_email`.
#[must_use]
pub fn migration_number(name: &str) -> Option<u32> {
    let (prefix, _) = name.split_once('_')?;
    if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    prefix.parse().ok()
}

/// A directory of migration record files.
#[derive(Debug, Clone)]
pub struct MigrationStore {
    dir: PathBuf,
}

impl MigrationStore {
    /// Creates a store rooted at `dir`. The directory is created lazily.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the store directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns true if the store directory exists.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.dir.is_dir()
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.{RECORD_EXTENSION}"))
    }

    /// Lists migration names in sequence order.
    pub fn names(&self) -> Result<Vec<String>> {
        if !self.exists() {
            return Err(MigrateError::MigrationsDirNotFound(self.dir.clone()));
        }

        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if let Some(number) = migration_number(stem) {
                names.push((number, stem.to_string()));
            } else {
                debug!(path = %path.display(), "Ignoring file without a migration number");
            }
        }
        names.sort();
        Ok(names.into_iter().map(|(_, name)| name).collect())
    }

    /// Loads one migration by name.
    pub fn load(&self, name: &str) -> Result<NamedMigration> {
        let path = self.path_for(name);
        if !path.is_file() {
            return Err(MigrateError::MigrationNotFound(name.to_string()));
        }
        let json = fs::read_to_string(&path)?;
        let migration =
            Migration::from_json(&json).map_err(|e| MigrateError::from(e).in_migration(name))?;
        Ok(NamedMigration::new(name, migration))
    }

    /// Loads every migration in sequence order.
    pub fn load_all(&self) -> Result<Vec<NamedMigration>> {
        self.names()?
            .iter()
            .map(|name| self.load(name))
            .collect()
    }

    /// Returns the number the next migration should carry.
    pub fn next_number(&self) -> Result<u32> {
        if !self.exists() {
            return Ok(1);
        }
        let last = self
            .names()?
            .iter()
            .filter_map(|name| migration_number(name))
            .max()
            .unwrap_or(0);
        Ok(last + 1)
    }

    /// Writes a migration record. Existing files are never overwritten.
    pub fn write(&self, name: &str, migration: &Migration) -> Result<PathBuf> {
        let path = self.path_for(name);
        if path.exists() {
            return Err(MigrateError::MigrationExists(path));
        }
        fs::create_dir_all(&self.dir)?;
        let mut json = migration.to_json()?;
        json.push('\n');
        fs::write(&path, json)?;
        info!(path = %path.display(), operations = migration.len(), "Wrote migration");
        Ok(path)
    }

    /// Rebuilds the schema state the stored migrations produce. A missing
    /// directory yields the empty state.
    pub fn replay_state(&self) -> Result<State> {
        let mut state = State::new();
        if !self.exists() {
            return Ok(state);
        }
        for named in self.load_all()? {
            named
                .migration
                .apply_to_state(&mut state)
                .map_err(|e| MigrateError::from(e).in_migration(named.name.as_str()))?;
        }
        Ok(state)
    }
}
