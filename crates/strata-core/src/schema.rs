//! Dialect-bound DDL accumulation and rendering.
//!
//! A [`SchemaEngine`] owns one operator of each table-level kind and a list
//! of [`TableSchema`] handles for in-place alterations. Nothing is executed
//! here: the engine only builds the SQL program.

use tracing::debug;

use crate::dialect::Dialect;
use crate::error::{Result, SchemaError};
use crate::meta::{FieldMeta, Fields};
use crate::operators::{
    AddColumnOperator, AddForeignKeyOperator, ChangeColumnOperator, CreateTableOperator,
    DeleteTableOperator, DropColumnOperator, RenameTableOperator,
};

/// Accumulates DDL for one dialect.
#[derive(Debug, Clone)]
pub struct SchemaEngine {
    dialect: Dialect,
    delete_table: DeleteTableOperator,
    create_table: CreateTableOperator,
    alter_table: Vec<TableSchema>,
}

impl SchemaEngine {
    /// Creates an empty engine for `dialect`.
    #[must_use]
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            delete_table: DeleteTableOperator::default(),
            create_table: CreateTableOperator::default(),
            alter_table: Vec::new(),
        }
    }

    /// Returns the dialect this engine renders for.
    #[must_use]
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Queues a table creation. Last write wins for the same name.
    pub fn create_table(&mut self, name: impl Into<String>, fields: Fields) {
        self.create_table.set(name, fields);
    }

    /// Queues a table for dropping.
    pub fn delete_table(&mut self, name: impl Into<String>) {
        self.delete_table.set(name);
    }

    /// Returns a handle scoped to `name` for column-level changes. `fields`
    /// is the table's current field set.
    pub fn alter_table(&mut self, name: impl Into<String>, fields: Fields) -> &mut TableSchema {
        let index = self.alter_table.len();
        self.alter_table
            .push(TableSchema::new(self.dialect, name, fields));
        &mut self.alter_table[index]
    }

    /// Returns true if nothing has been queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.delete_table.is_empty()
            && self.create_table.is_empty()
            && self.alter_table.iter().all(TableSchema::is_empty)
    }

    /// Discards everything queued so far.
    pub fn reset(&mut self) {
        *self = Self::new(self.dialect);
    }

    /// Renders the accumulated program: table deletions, then creations,
    /// then alterations.
    ///
    /// Rendering does not consume or modify the queued work, so it may be
    /// called repeatedly. An empty engine renders an empty string.
    pub fn render(&self) -> Result<String> {
        let mut statements = Vec::new();
        if !self.delete_table.is_empty() {
            statements.push(self.delete_table.render(&self.dialect));
        }
        if !self.create_table.is_empty() {
            statements.push(self.create_table.render(&self.dialect)?);
        }
        for table in &self.alter_table {
            if !table.is_empty() {
                statements.push(table.render()?);
            }
        }
        let sql = statements.join("\n");
        debug!(dialect = self.dialect.name, sql = %sql, "Rendered schema program");
        Ok(sql)
    }
}

/// Column-level changes to a single table.
///
/// The handle tracks the table's field set as changes are queued so that
/// [`alter`](Self::alter) can find the prior definition of a column.
#[derive(Debug, Clone)]
pub struct TableSchema {
    dialect: Dialect,
    table: String,
    state: Fields,
    drop: DropColumnOperator,
    change: ChangeColumnOperator,
    add: AddColumnOperator,
    add_foreign_key: AddForeignKeyOperator,
    rename_to: RenameTableOperator,
}

impl TableSchema {
    fn new(dialect: Dialect, table: impl Into<String>, fields: Fields) -> Self {
        let table = table.into();
        Self {
            dialect,
            state: fields,
            drop: DropColumnOperator::new(table.as_str()),
            change: ChangeColumnOperator::new(table.as_str()),
            add: AddColumnOperator::new(table.as_str()),
            add_foreign_key: AddForeignKeyOperator::new(table.as_str()),
            rename_to: RenameTableOperator::new(table.as_str()),
            table,
        }
    }

    /// Returns the table name.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Returns the field set as it will be after the queued changes.
    #[must_use]
    pub fn state(&self) -> &Fields {
        &self.state
    }

    /// Queues a new column.
    ///
    /// A referencing column gets a separate foreign key where the dialect
    /// can add constraints to an existing table; otherwise the column
    /// definition carries the reference inline.
    pub fn add(&mut self, column: impl Into<String>, meta: FieldMeta) -> &mut Self {
        let column = column.into();
        if let (true, Some(references)) = (self.dialect.alter_add_constraint, &meta.references) {
            self.add_foreign_key.set(column.as_str(), references.as_str());
        }
        self.add.set(column.as_str(), meta.clone());
        self.state.insert(column, meta);
        self
    }

    /// Queues dropping a column.
    pub fn drop(&mut self, column: impl Into<String>) -> &mut Self {
        let column = column.into();
        self.state.shift_remove(&column);
        self.drop.set(column);
        self
    }

    /// Replaces a column's definition.
    ///
    /// Dialects without native alteration get a drop followed by an add of
    /// the same column.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::UnknownFieldReference`] if the column is not
    /// part of the table.
    pub fn alter(&mut self, column: impl Into<String>, meta: FieldMeta) -> Result<&mut Self> {
        let column = column.into();
        let prior = self
            .state
            .get(&column)
            .cloned()
            .ok_or_else(|| SchemaError::UnknownFieldReference {
                table: self.table.clone(),
                field: column.clone(),
            })?;

        if !self.dialect.native_alter_column {
            self.drop(column.as_str());
            self.add(column, meta);
            return Ok(self);
        }

        if let Some(references) = &meta.references {
            if prior.references.as_ref() != Some(references) {
                self.add_foreign_key
                    .set(column.as_str(), references.as_str());
            }
        }
        self.change.set(column.as_str(), meta.clone());
        self.state.insert(column, meta);
        Ok(self)
    }

    /// Queues renaming the table.
    pub fn rename_to(&mut self, new_name: impl Into<String>) -> &mut Self {
        self.rename_to.set(new_name);
        self
    }

    /// Queues a foreign key from `column` to `references`.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Unsupported`] if the dialect cannot add
    /// constraints to an existing table.
    pub fn add_foreign_key(
        &mut self,
        column: impl Into<String>,
        references: impl Into<String>,
    ) -> Result<&mut Self> {
        if !self.dialect.alter_add_constraint {
            return Err(SchemaError::Unsupported {
                dialect: self.dialect.name,
                operation: format!("adding foreign keys to existing table '{}'", self.table),
            });
        }
        self.add_foreign_key.set(column, references);
        Ok(self)
    }

    /// Returns true if no change has been queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.drop.is_empty()
            && self.change.is_empty()
            && self.add.is_empty()
            && self.add_foreign_key.is_empty()
            && self.rename_to.is_empty()
    }

    /// Renders the queued changes: drops, changes, adds, foreign keys, then
    /// the rename.
    pub fn render(&self) -> Result<String> {
        let d = &self.dialect;
        let mut statements = Vec::new();
        if !self.drop.is_empty() {
            statements.push(self.drop.render(d));
        }
        if !self.change.is_empty() {
            statements.push(self.change.render(d)?);
        }
        if !self.add.is_empty() {
            statements.push(self.add.render(d)?);
        }
        if !self.add_foreign_key.is_empty() {
            statements.push(self.add_foreign_key.render(d)?);
        }
        if !self.rename_to.is_empty() {
            statements.push(self.rename_to.render(d));
        }
        Ok(statements.join("\n"))
    }
}
