//! Structural operations on one table.
//!
//! An operation can be deconstructed into a flat JSON record and rebuilt
//! from it, replayed onto a [`SchemaEngine`] to produce DDL, or replayed onto
//! a [`State`] to produce the next snapshot. The two replays must agree.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, SchemaError};
use crate::meta::{FieldMeta, Fields, TableMeta};
use crate::schema::SchemaEngine;
use crate::state::State;

/// The three kinds of table-level operation, in application order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OperationKind {
    /// Create a table.
    CreateTable,
    /// Delete a table.
    DeleteTable,
    /// Alter a table's fields.
    ChangeTable,
}

impl OperationKind {
    /// All kinds, in application order.
    pub const ALL: [Self; 3] = [Self::CreateTable, Self::DeleteTable, Self::ChangeTable];

    /// Returns the key used in persisted records.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CreateTable => "CREATE_TABLE",
            Self::DeleteTable => "DELETE_TABLE",
            Self::ChangeTable => "CHANGE_TABLE",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "CREATE_TABLE" => Ok(Self::CreateTable),
            "DELETE_TABLE" => Ok(Self::DeleteTable),
            "CHANGE_TABLE" => Ok(Self::ChangeTable),
            other => Err(SchemaError::InvalidOperationKind {
                kind: other.to_string(),
            }),
        }
    }
}

/// Creates a table with the given fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTableOperation {
    /// Table name.
    pub table: String,
    /// Fields of the new table.
    #[serde(default)]
    pub fields: Fields,
}

impl CreateTableOperation {
    /// Creates the operation.
    #[must_use]
    pub fn new(table: impl Into<String>, fields: Fields) -> Self {
        Self {
            table: table.into(),
            fields,
        }
    }

    /// Queues the table creation on `schema`.
    pub fn apply(&self, schema: &mut SchemaEngine) {
        schema.create_table(self.table.as_str(), self.fields.clone());
    }

    /// Adds the table to `state`.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::DuplicateTableDefinition`] if the table exists.
    pub fn apply_to_state(&self, state: &mut State) -> Result<()> {
        state.insert_table(TableMeta {
            name: self.table.clone(),
            fields: self.fields.clone(),
        })
    }
}

/// Deletes a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteTableOperation {
    /// Table name.
    pub table: String,
}

impl DeleteTableOperation {
    /// Creates the operation.
    #[must_use]
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
        }
    }

    /// Queues the table drop on `schema`.
    pub fn apply(&self, schema: &mut SchemaEngine) {
        schema.delete_table(self.table.as_str());
    }

    /// Removes the table from `state`.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::UnknownTableReference`] if the table is absent.
    pub fn apply_to_state(&self, state: &mut State) -> Result<()> {
        state.remove_table(&self.table).map(|_| ())
    }
}

/// A field-level change nested in an [`AlterTableOperation`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FieldOperation {
    /// Add a field.
    Create {
        /// Field name.
        field: String,
        /// Field definition.
        meta: FieldMeta,
    },
    /// Remove a field.
    Delete {
        /// Field name.
        field: String,
    },
    /// Replace a field's whole definition.
    Change {
        /// Field name.
        field: String,
        /// New field definition.
        meta: FieldMeta,
    },
}

impl FieldOperation {
    /// Returns the field this suboperation targets.
    #[must_use]
    pub fn field(&self) -> &str {
        match self {
            Self::Create { field, .. } | Self::Delete { field } | Self::Change { field, .. } => {
                field
            }
        }
    }
}

/// Alters the fields of an existing table.
///
/// `fields` holds the table's definition before the change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlterTableOperation {
    /// Table name.
    pub table: String,
    /// Field set before the change.
    #[serde(default)]
    pub fields: Fields,
    /// Field-level suboperations, in order.
    #[serde(default)]
    pub operations: Vec<FieldOperation>,
}

impl AlterTableOperation {
    /// Creates an alteration with no suboperations.
    #[must_use]
    pub fn new(table: impl Into<String>, fields: Fields) -> Self {
        Self {
            table: table.into(),
            fields,
            operations: Vec::new(),
        }
    }

    /// Adds a create-field suboperation.
    pub fn add_create_field_suboperation(
        &mut self,
        field: impl Into<String>,
        meta: FieldMeta,
    ) -> &mut Self {
        self.operations.push(FieldOperation::Create {
            field: field.into(),
            meta,
        });
        self
    }

    /// Adds a delete-field suboperation.
    pub fn add_delete_field_suboperation(&mut self, field: impl Into<String>) -> &mut Self {
        self.operations.push(FieldOperation::Delete {
            field: field.into(),
        });
        self
    }

    /// Adds a change-field suboperation carrying the full new definition.
    pub fn add_change_field_suboperation(
        &mut self,
        field: impl Into<String>,
        meta: FieldMeta,
    ) -> &mut Self {
        self.operations.push(FieldOperation::Change {
            field: field.into(),
            meta,
        });
        self
    }

    /// Returns true if there are no suboperations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Checks that no field is both created and changed.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::ConflictingFieldOperations`] naming the field.
    pub fn validate(&self) -> Result<()> {
        for op in &self.operations {
            if let FieldOperation::Change { field, .. } = op {
                let created = self.operations.iter().any(
                    |other| matches!(other, FieldOperation::Create { field: f, .. } if f == field),
                );
                if created {
                    return Err(SchemaError::ConflictingFieldOperations {
                        table: self.table.clone(),
                        field: field.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Replays the suboperations through a [`TableSchema`] handle.
    ///
    /// [`TableSchema`]: crate::schema::TableSchema
    pub fn apply(&self, schema: &mut SchemaEngine) -> Result<()> {
        self.validate()?;
        let table = schema.alter_table(self.table.as_str(), self.fields.clone());
        for op in &self.operations {
            match op {
                FieldOperation::Create { field, meta } => {
                    table.add(field.as_str(), meta.clone());
                }
                FieldOperation::Delete { field } => {
                    table.drop(field.as_str());
                }
                FieldOperation::Change { field, meta } => {
                    table.alter(field.as_str(), meta.clone())?;
                }
            }
        }
        Ok(())
    }

    /// Replays the suboperations onto the table's entry in `state`.
    ///
    /// # Errors
    ///
    /// Fails fast on a missing table, on creating an existing field and on
    /// deleting or changing a missing one. The table is left untouched on
    /// failure.
    pub fn apply_to_state(&self, state: &mut State) -> Result<()> {
        self.validate()?;
        let current = state.fields_mut(&self.table)?;
        let mut fields = current.clone();
        for op in &self.operations {
            match op {
                FieldOperation::Create { field, meta } => {
                    if fields.contains_key(field) {
                        return Err(SchemaError::DuplicateFieldDefinition {
                            table: self.table.clone(),
                            field: field.clone(),
                        });
                    }
                    fields.insert(field.clone(), meta.clone());
                }
                FieldOperation::Delete { field } => {
                    if fields.shift_remove(field).is_none() {
                        return Err(SchemaError::UnknownFieldReference {
                            table: self.table.clone(),
                            field: field.clone(),
                        });
                    }
                }
                FieldOperation::Change { field, meta } => {
                    let existing = fields.get_mut(field).ok_or_else(|| {
                        SchemaError::UnknownFieldReference {
                            table: self.table.clone(),
                            field: field.clone(),
                        }
                    })?;
                    *existing = meta.clone();
                }
            }
        }
        *current = fields;
        Ok(())
    }
}

/// One structural change on one table.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Create a table.
    CreateTable(CreateTableOperation),
    /// Delete a table.
    DeleteTable(DeleteTableOperation),
    /// Alter a table's fields.
    AlterTable(AlterTableOperation),
}

impl Operation {
    /// Rebuilds an operation of `kind` from its flat record.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::InvalidRecord`] if the record does not match
    /// the kind's shape.
    pub fn from_record(kind: OperationKind, record: Value) -> Result<Self> {
        let invalid = |e: serde_json::Error| SchemaError::InvalidRecord(format!("{kind}: {e}"));
        Ok(match kind {
            OperationKind::CreateTable => {
                Self::CreateTable(serde_json::from_value(record).map_err(invalid)?)
            }
            OperationKind::DeleteTable => {
                Self::DeleteTable(serde_json::from_value(record).map_err(invalid)?)
            }
            OperationKind::ChangeTable => {
                let op: AlterTableOperation = serde_json::from_value(record).map_err(invalid)?;
                op.validate()?;
                Self::AlterTable(op)
            }
        })
    }

    /// Deconstructs the operation into its flat record.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::NonFiniteDefault`] for a default JSON cannot
    /// hold and [`SchemaError::Serialization`] if the record cannot be built.
    pub fn deconstruct(&self) -> Result<Value> {
        self.check_defaults()?;
        Ok(match self {
            Self::CreateTable(op) => serde_json::to_value(op)?,
            Self::DeleteTable(op) => serde_json::to_value(op)?,
            Self::AlterTable(op) => serde_json::to_value(op)?,
        })
    }

    fn check_defaults(&self) -> Result<()> {
        match self {
            Self::CreateTable(op) => op
                .fields
                .iter()
                .try_for_each(|(field, meta)| meta.check_default(&op.table, field)),
            Self::DeleteTable(_) => Ok(()),
            Self::AlterTable(op) => {
                for (field, meta) in &op.fields {
                    meta.check_default(&op.table, field)?;
                }
                for sub in &op.operations {
                    if let FieldOperation::Create { field, meta }
                    | FieldOperation::Change { field, meta } = sub
                    {
                        meta.check_default(&op.table, field)?;
                    }
                }
                Ok(())
            }
        }
    }

    /// Returns the operation kind.
    #[must_use]
    pub const fn kind(&self) -> OperationKind {
        match self {
            Self::CreateTable(_) => OperationKind::CreateTable,
            Self::DeleteTable(_) => OperationKind::DeleteTable,
            Self::AlterTable(_) => OperationKind::ChangeTable,
        }
    }

    /// Returns the table the operation targets.
    #[must_use]
    pub fn table(&self) -> &str {
        match self {
            Self::CreateTable(op) => &op.table,
            Self::DeleteTable(op) => &op.table,
            Self::AlterTable(op) => &op.table,
        }
    }

    /// Replays the operation onto a schema engine.
    pub fn apply(&self, schema: &mut SchemaEngine) -> Result<()> {
        match self {
            Self::CreateTable(op) => op.apply(schema),
            Self::DeleteTable(op) => op.apply(schema),
            Self::AlterTable(op) => op.apply(schema)?,
        }
        Ok(())
    }

    /// Replays the operation onto a state snapshot.
    pub fn apply_to_state(&self, state: &mut State) -> Result<()> {
        match self {
            Self::CreateTable(op) => op.apply_to_state(state),
            Self::DeleteTable(op) => op.apply_to_state(state),
            Self::AlterTable(op) => op.apply_to_state(state),
        }
    }

    /// Returns a human-readable description of this operation.
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::CreateTable(op) => format!("Create table '{}'", op.table),
            Self::DeleteTable(op) => format!("Delete table '{}'", op.table),
            Self::AlterTable(op) => {
                let changes: Vec<String> = op
                    .operations
                    .iter()
                    .map(|sub| match sub {
                        FieldOperation::Create { field, .. } => format!("+{field}"),
                        FieldOperation::Delete { field } => format!("-{field}"),
                        FieldOperation::Change { field, .. } => format!("~{field}"),
                    })
                    .collect();
                format!("Alter table '{}' ({})", op.table, changes.join(", "))
            }
        }
    }
}

impl From<CreateTableOperation> for Operation {
    fn from(op: CreateTableOperation) -> Self {
        Self::CreateTable(op)
    }
}

impl From<DeleteTableOperation> for Operation {
    fn from(op: DeleteTableOperation) -> Self {
        Self::DeleteTable(op)
    }
}

impl From<AlterTableOperation> for Operation {
    fn from(op: AlterTableOperation) -> Self {
        Self::AlterTable(op)
    }
}
