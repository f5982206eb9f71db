//! Ordered, persistable sets of operations.
//!
//! A [`Migration`] groups its operations by kind. It is replayed kind by
//! kind (creations, deletions, then alterations) rather than in insertion
//! order, so a table always exists before anything alters it.

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::dialect::Dialect;
use crate::error::{Result, SchemaError};
use crate::executor::Executor;
use crate::meta::Fields;
use crate::operation::{
    AlterTableOperation, CreateTableOperation, DeleteTableOperation, Operation, OperationKind,
};
use crate::schema::SchemaEngine;
use crate::state::State;

/// Operations transforming one state into another.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Migration {
    create_table: Vec<CreateTableOperation>,
    delete_table: Vec<DeleteTableOperation>,
    change_table: Vec<AlterTableOperation>,
}

impl Migration {
    /// Creates an empty migration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a migration from its persisted record.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::InvalidOperationKind`] for an unknown top-level
    /// key and [`SchemaError::InvalidRecord`] for a malformed entry.
    pub fn from_entry(record: &Value) -> Result<Self> {
        let entries = record.as_object().ok_or_else(|| {
            SchemaError::InvalidRecord("expected an object keyed by operation kind".to_string())
        })?;

        let mut migration = Self::new();
        for (key, operations) in entries {
            let kind: OperationKind = key.parse()?;
            let operations = operations.as_array().ok_or_else(|| {
                SchemaError::InvalidRecord(format!("{kind}: expected a list of operations"))
            })?;
            for operation in operations {
                migration.push(Operation::from_record(kind, operation.clone())?);
            }
        }
        Ok(migration)
    }

    /// Parses a migration from its JSON text.
    ///
    /// # Errors
    ///
    /// Fails on invalid JSON or an invalid record.
    pub fn from_json(json: &str) -> Result<Self> {
        let record: Value = serde_json::from_str(json)?;
        Self::from_entry(&record)
    }

    /// Serializes the migration into its persisted record. Kinds without
    /// operations are omitted.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Serialization`] if an operation cannot be
    /// serialized.
    pub fn to_record(&self) -> Result<Value> {
        let mut record = Map::new();
        for kind in OperationKind::ALL {
            let operations = self
                .operations_of(kind)
                .map(|op| op.deconstruct())
                .collect::<Result<Vec<_>>>()?;
            if !operations.is_empty() {
                record.insert(kind.as_str().to_string(), Value::Array(operations));
            }
        }
        Ok(Value::Object(record))
    }

    /// Serializes the migration into pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Serialization`] on failure.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_record()?)?)
    }

    /// Adds a create-table operation.
    pub fn add_create_table_operation(
        &mut self,
        table: impl Into<String>,
        fields: Fields,
    ) -> &mut CreateTableOperation {
        let index = self.create_table.len();
        self.create_table
            .push(CreateTableOperation::new(table, fields));
        &mut self.create_table[index]
    }

    /// Adds a delete-table operation.
    pub fn add_delete_table_operation(
        &mut self,
        table: impl Into<String>,
    ) -> &mut DeleteTableOperation {
        let index = self.delete_table.len();
        self.delete_table.push(DeleteTableOperation::new(table));
        &mut self.delete_table[index]
    }

    /// Adds an alter-table operation and returns it so field-level
    /// suboperations can be pushed onto it. `fields` is the table's
    /// definition before the change.
    pub fn add_change_table_operation(
        &mut self,
        table: impl Into<String>,
        fields: Fields,
    ) -> &mut AlterTableOperation {
        let index = self.change_table.len();
        self.change_table
            .push(AlterTableOperation::new(table, fields));
        &mut self.change_table[index]
    }

    /// Adds an already built operation under its kind.
    pub fn push(&mut self, operation: Operation) {
        match operation {
            Operation::CreateTable(op) => self.create_table.push(op),
            Operation::DeleteTable(op) => self.delete_table.push(op),
            Operation::AlterTable(op) => self.change_table.push(op),
        }
    }

    /// Drops alter-table operations that have no suboperations.
    pub fn prune_empty_alterations(&mut self) {
        self.change_table.retain(|op| !op.is_empty());
    }

    fn operations_of(&self, kind: OperationKind) -> Box<dyn Iterator<Item = Operation> + '_> {
        match kind {
            OperationKind::CreateTable => {
                Box::new(self.create_table.iter().cloned().map(Operation::from))
            }
            OperationKind::DeleteTable => {
                Box::new(self.delete_table.iter().cloned().map(Operation::from))
            }
            OperationKind::ChangeTable => {
                Box::new(self.change_table.iter().cloned().map(Operation::from))
            }
        }
    }

    /// Returns every operation in application order.
    pub fn operations(&self) -> impl Iterator<Item = Operation> + '_ {
        OperationKind::ALL
            .into_iter()
            .flat_map(move |kind| self.operations_of(kind))
    }

    /// Returns the number of operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.create_table.len() + self.delete_table.len() + self.change_table.len()
    }

    /// Returns true if no operation kind holds entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replays every operation onto `schema`.
    ///
    /// # Errors
    ///
    /// Propagates the first failing operation's error.
    pub fn apply_to_schema(&self, schema: &mut SchemaEngine) -> Result<()> {
        for op in &self.create_table {
            op.apply(schema);
        }
        for op in &self.delete_table {
            op.apply(schema);
        }
        for op in &self.change_table {
            op.apply(schema)?;
        }
        Ok(())
    }

    /// Renders the migration's DDL program for `dialect` without executing it.
    ///
    /// # Errors
    ///
    /// Propagates replay and rendering errors.
    pub fn render(&self, dialect: Dialect) -> Result<String> {
        let mut schema = SchemaEngine::new(dialect);
        self.apply_to_schema(&mut schema)?;
        schema.render()
    }

    /// Renders the migration through the executor's schema engine and hands
    /// the resulting script to the executor in a single call.
    ///
    /// # Errors
    ///
    /// Propagates replay, rendering and execution errors.
    pub async fn apply<E: Executor>(&self, executor: &mut E) -> std::result::Result<(), E::Error> {
        let mut schema = executor.schema_engine();
        self.apply_to_schema(&mut schema)?;
        let sql = schema.render()?;
        if sql.is_empty() {
            warn!("Migration rendered no SQL, nothing to execute");
            return Ok(());
        }
        info!(
            dialect = schema.dialect().name,
            operations = self.len(),
            "Executing migration script"
        );
        executor.execute_script(&sql).await
    }

    /// Replays every operation onto `state`.
    ///
    /// # Errors
    ///
    /// Fails fast on the first operation that does not fit the state, in
    /// which case `state` is left as it was.
    pub fn apply_to_state(&self, state: &mut State) -> Result<()> {
        let mut next = state.clone();
        for op in self.operations() {
            debug!(operation = %op.description(), "Applying to state");
            op.apply_to_state(&mut next)?;
        }
        *state = next;
        Ok(())
    }
}
