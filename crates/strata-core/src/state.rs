//! State snapshots and the comparer that diffs them.
//!
//! A [`State`] maps table names to their fields. It is either built from the
//! declared models or replayed from historical migration records, and the
//! two must agree. [`StateComparer`] produces the [`Migration`] that turns
//! one state into another.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{Result, SchemaError};
use crate::meta::{Fields, TableMeta};
use crate::migration::Migration;

/// A declared model the state can snapshot.
pub trait Model {
    /// Returns the stable table name of the model.
    fn table_name(&self) -> &str;

    /// Returns the model's table definition.
    fn deconstruct(&self) -> TableMeta;
}

/// An enumerable set of declared models.
pub trait ModelRegistry {
    /// Returns every registered model.
    fn models(&self) -> Vec<&dyn Model>;
}

impl Model for TableMeta {
    fn table_name(&self) -> &str {
        &self.name
    }

    fn deconstruct(&self) -> TableMeta {
        self.clone()
    }
}

impl<M: Model> ModelRegistry for [M] {
    fn models(&self) -> Vec<&dyn Model> {
        self.iter().map(|model| model as &dyn Model).collect()
    }
}

impl<M: Model> ModelRegistry for Vec<M> {
    fn models(&self) -> Vec<&dyn Model> {
        self.as_slice().models()
    }
}

/// The structure that should exist at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct State {
    tables: IndexMap<String, Fields>,
}

impl State {
    /// Creates an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshots every model of `registry`.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::DuplicateTableDefinition`] if two models share
    /// a table name.
    pub fn build<R: ModelRegistry + ?Sized>(registry: &R) -> Result<Self> {
        let mut state = Self::new();
        for model in registry.models() {
            let meta = model.deconstruct();
            debug!(table = model.table_name(), fields = meta.fields.len(), "Snapshotting model");
            state.insert_table(meta)?;
        }
        Ok(state)
    }

    /// Parses a declared-model document: a JSON object mapping each table
    /// to its ordered field definitions.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Serialization`] on malformed input.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Rebuilds a state by replaying migration records from the empty state.
    ///
    /// # Errors
    ///
    /// Propagates the first record that cannot be parsed or applied.
    pub fn replay<'a, I>(records: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a Value>,
    {
        let mut state = Self::new();
        for record in records {
            state.mutate(record)?;
        }
        Ok(state)
    }

    /// Applies one persisted migration record to this state.
    ///
    /// # Errors
    ///
    /// Fails if the record is invalid or does not fit the current state.
    pub fn mutate(&mut self, record: &Value) -> Result<()> {
        Migration::from_entry(record)?.apply_to_state(self)
    }

    /// Returns the fields of `table`.
    #[must_use]
    pub fn get(&self, table: &str) -> Option<&Fields> {
        self.tables.get(table)
    }

    /// Returns the table definition for `table`.
    #[must_use]
    pub fn table(&self, table: &str) -> Option<TableMeta> {
        self.tables.get_key_value(table).map(|(name, fields)| TableMeta {
            name: name.clone(),
            fields: fields.clone(),
        })
    }

    /// Iterates over tables in insertion order.
    pub fn tables(&self) -> impl Iterator<Item = (&str, &Fields)> {
        self.tables
            .iter()
            .map(|(name, fields)| (name.as_str(), fields))
    }

    /// Returns true if `table` exists.
    #[must_use]
    pub fn contains(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    /// Returns the number of tables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Returns true if the state holds no tables.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Adds a table.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::DuplicateTableDefinition`] if it already exists.
    pub fn insert_table(&mut self, table: TableMeta) -> Result<()> {
        if self.tables.contains_key(&table.name) {
            return Err(SchemaError::DuplicateTableDefinition { table: table.name });
        }
        self.tables.insert(table.name, table.fields);
        Ok(())
    }

    /// Removes a table and returns its fields.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::UnknownTableReference`] if it does not exist.
    pub fn remove_table(&mut self, table: &str) -> Result<Fields> {
        self.tables
            .shift_remove(table)
            .ok_or_else(|| SchemaError::UnknownTableReference {
                table: table.to_string(),
            })
    }

    /// Returns the fields of `table` for in-place modification.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::UnknownTableReference`] if it does not exist.
    pub fn fields_mut(&mut self, table: &str) -> Result<&mut Fields> {
        self.tables
            .get_mut(table)
            .ok_or_else(|| SchemaError::UnknownTableReference {
                table: table.to_string(),
            })
    }

    /// Returns a comparer targeting this state.
    #[must_use]
    pub fn comparer(&self) -> StateComparer<'_> {
        StateComparer::new(self)
    }

    /// Returns the migration that turns `previous` into this state.
    #[must_use]
    pub fn diff(&self, previous: &State) -> Migration {
        self.comparer().compare(previous)
    }
}

/// Diffs a previous state against a target state.
#[derive(Debug, Clone, Copy)]
pub struct StateComparer<'a> {
    target: &'a State,
}

impl<'a> StateComparer<'a> {
    /// Creates a comparer producing migrations towards `target`.
    #[must_use]
    pub fn new(target: &'a State) -> Self {
        Self { target }
    }

    /// Returns the operations that transform `previous` into the target.
    ///
    /// Alterations left without suboperations are not emitted.
    #[must_use]
    pub fn compare(&self, previous: &State) -> Migration {
        let mut migration = Migration::new();

        for (table, fields) in &self.target.tables {
            match previous.get(table) {
                None => {
                    debug!(table = %table, "Table added");
                    migration.add_create_table_operation(table.as_str(), fields.clone());
                }
                Some(prior) => {
                    let alter = migration.add_change_table_operation(table.as_str(), prior.clone());
                    for (field, meta) in fields {
                        match prior.get(field) {
                            None => {
                                debug!(table = %table, field = %field, "Field added");
                                alter.add_create_field_suboperation(field.as_str(), meta.clone());
                            }
                            Some(before) => {
                                if let Some(attribute) = meta.first_difference(before) {
                                    debug!(
                                        table = %table,
                                        field = %field,
                                        attribute,
                                        "Field changed"
                                    );
                                    alter.add_change_field_suboperation(
                                        field.as_str(),
                                        meta.clone(),
                                    );
                                }
                            }
                        }
                    }
                    for field in prior.keys() {
                        if !fields.contains_key(field) {
                            debug!(table = %table, field = %field, "Field removed");
                            alter.add_delete_field_suboperation(field.as_str());
                        }
                    }
                }
            }
        }

        for table in previous.tables.keys() {
            if !self.target.contains(table) {
                debug!(table = %table, "Table removed");
                migration.add_delete_table_operation(table.as_str());
            }
        }

        migration.prune_empty_alterations();
        migration
    }
}
