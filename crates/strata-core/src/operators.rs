//! SQL fragment builders, one per DDL verb.
//!
//! Each operator accumulates pending changes through `set` (setting the same
//! key twice overwrites rather than duplicates) and renders them with
//! `render`. `is_empty` lets the schema engine skip operators that have no
//! pending work.

use indexmap::IndexMap;

use crate::dialect::Dialect;
use crate::error::{Result, SchemaError};
use crate::meta::{FieldMeta, Fields};

/// Column every foreign key points at.
pub const REFERENCED_KEY: &str = "id";

/// Renders `<name> <data_type>` followed by either `DEFAULT <literal>` or the
/// null keyword. With `inline_reference` a `REFERENCES <table>(id)` clause is
/// appended for referencing fields.
pub fn column_definition(
    dialect: &Dialect,
    table: &str,
    field: &str,
    meta: &FieldMeta,
    inline_reference: bool,
) -> Result<String> {
    if meta.data_type.trim().is_empty() {
        return Err(SchemaError::MissingRequiredAttribute {
            table: table.to_string(),
            field: field.to_string(),
            attribute: "data_type",
        });
    }

    meta.check_default(table, field)?;

    let mut sql = format!("{} {}", dialect.quote_identifier(field), meta.data_type);
    match &meta.default {
        Some(default) => {
            sql.push_str(" DEFAULT ");
            sql.push_str(&default.to_sql());
        }
        None => sql.push_str(if meta.null { " NULL" } else { " NOT NULL" }),
    }
    if inline_reference {
        if let Some(references) = &meta.references {
            sql.push_str(&format!(
                " REFERENCES {}({REFERENCED_KEY})",
                dialect.quote_identifier(references)
            ));
        }
    }
    Ok(sql)
}

/// Wraps clauses into `ALTER TABLE` statements: one statement holding every
/// clause, or one statement per clause when the dialect cannot combine them.
fn alter_table_statements(dialect: &Dialect, table: &str, clauses: &[String]) -> String {
    let table = dialect.quote_identifier(table);
    if dialect.combined_clauses {
        format!("ALTER TABLE {table}\n{};", clauses.join(", "))
    } else {
        clauses
            .iter()
            .map(|clause| format!("ALTER TABLE {table}\n{clause};"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// `CREATE TABLE <t> (<col_defs>, <constraints>);`
#[derive(Debug, Clone, Default)]
pub struct CreateTableOperator {
    tables: IndexMap<String, Fields>,
}

impl CreateTableOperator {
    /// Queues a table; a second call for the same name replaces the first.
    pub fn set(&mut self, table: impl Into<String>, fields: Fields) {
        self.tables.insert(table.into(), fields);
    }

    /// Returns true if no table is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    fn constraints(dialect: &Dialect, fields: &Fields) -> Vec<String> {
        let mut constraints: Vec<String> = fields
            .iter()
            .filter_map(|(field, meta)| {
                meta.references.as_ref().map(|references| {
                    format!(
                        "FOREIGN KEY ({}) REFERENCES {}({REFERENCED_KEY})",
                        dialect.quote_identifier(field),
                        dialect.quote_identifier(references)
                    )
                })
            })
            .collect();

        let primary_key: Vec<_> = fields
            .iter()
            .filter(|(_, meta)| meta.primary_key)
            .map(|(field, _)| dialect.quote_identifier(field))
            .collect();
        if !primary_key.is_empty() {
            constraints.push(format!("PRIMARY KEY ({})", primary_key.join(", ")));
        }
        constraints
    }

    fn render_table(dialect: &Dialect, table: &str, fields: &Fields) -> Result<String> {
        if fields.is_empty() {
            return Err(SchemaError::EmptyTable {
                table: table.to_string(),
            });
        }
        let mut definition = fields
            .iter()
            .map(|(field, meta)| column_definition(dialect, table, field, meta, false))
            .collect::<Result<Vec<_>>>()?;
        definition.extend(Self::constraints(dialect, fields));

        Ok(format!(
            "CREATE TABLE {} ({});",
            dialect.quote_identifier(table),
            definition.join(", ")
        ))
    }

    /// Renders one statement per queued table.
    pub fn render(&self, dialect: &Dialect) -> Result<String> {
        let statements = self
            .tables
            .iter()
            .map(|(table, fields)| Self::render_table(dialect, table, fields))
            .collect::<Result<Vec<_>>>()?;
        Ok(statements.join("\n"))
    }
}

/// `DROP TABLE <t1>, <t2>, ...;`
#[derive(Debug, Clone, Default)]
pub struct DeleteTableOperator {
    tables: Vec<String>,
}

impl DeleteTableOperator {
    /// Queues a table for dropping.
    pub fn set(&mut self, table: impl Into<String>) {
        let table = table.into();
        if !self.tables.contains(&table) {
            self.tables.push(table);
        }
    }

    /// Returns true if no table is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Renders the drop statement(s).
    #[must_use]
    pub fn render(&self, dialect: &Dialect) -> String {
        let tables: Vec<_> = self
            .tables
            .iter()
            .map(|t| dialect.quote_identifier(t))
            .collect();
        if dialect.combined_clauses {
            format!("DROP TABLE {};", tables.join(", "))
        } else {
            tables
                .iter()
                .map(|t| format!("DROP TABLE {t};"))
                .collect::<Vec<_>>()
                .join("\n")
        }
    }
}

/// `ALTER TABLE <t> ADD <col_def>[, ADD <col_def>...]`
#[derive(Debug, Clone)]
pub struct AddColumnOperator {
    table: String,
    columns: Fields,
}

impl AddColumnOperator {
    /// Creates an operator scoped to `table`.
    #[must_use]
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Fields::new(),
        }
    }

    /// Queues a column.
    pub fn set(&mut self, column: impl Into<String>, meta: FieldMeta) {
        self.columns.insert(column.into(), meta);
    }

    /// Returns true if no column is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Renders the ADD clauses. Dialects that cannot add constraints later
    /// get the foreign key inline in the column definition.
    pub fn render(&self, dialect: &Dialect) -> Result<String> {
        let clauses = self
            .columns
            .iter()
            .map(|(column, meta)| {
                column_definition(
                    dialect,
                    &self.table,
                    column,
                    meta,
                    !dialect.alter_add_constraint,
                )
                .map(|def| format!("ADD {def}"))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(alter_table_statements(dialect, &self.table, &clauses))
    }
}

/// `ALTER TABLE <t> DROP <col>[, DROP <col>...]`
#[derive(Debug, Clone)]
pub struct DropColumnOperator {
    table: String,
    columns: Vec<String>,
}

impl DropColumnOperator {
    /// Creates an operator scoped to `table`.
    #[must_use]
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
        }
    }

    /// Queues a column.
    pub fn set(&mut self, column: impl Into<String>) {
        let column = column.into();
        if !self.columns.contains(&column) {
            self.columns.push(column);
        }
    }

    /// Returns true if no column is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Renders the DROP clauses.
    #[must_use]
    pub fn render(&self, dialect: &Dialect) -> String {
        let clauses: Vec<String> = self
            .columns
            .iter()
            .map(|column| format!("DROP {}", dialect.quote_identifier(column)))
            .collect();
        alter_table_statements(dialect, &self.table, &clauses)
    }
}

/// `ALTER TABLE <t> CHANGE <col> <col_def>[, ...]`, for dialects that alter
/// columns in place.
#[derive(Debug, Clone)]
pub struct ChangeColumnOperator {
    table: String,
    columns: Fields,
}

impl ChangeColumnOperator {
    /// Creates an operator scoped to `table`.
    #[must_use]
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Fields::new(),
        }
    }

    /// Queues a column's new definition.
    pub fn set(&mut self, column: impl Into<String>, meta: FieldMeta) {
        self.columns.insert(column.into(), meta);
    }

    /// Returns true if no column is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Renders the CHANGE clauses.
    pub fn render(&self, dialect: &Dialect) -> Result<String> {
        if !dialect.native_alter_column {
            return Err(SchemaError::Unsupported {
                dialect: dialect.name,
                operation: format!("altering columns of '{}' in place", self.table),
            });
        }
        let clauses = self
            .columns
            .iter()
            .map(|(column, meta)| {
                column_definition(dialect, &self.table, column, meta, false)
                    .map(|def| format!("CHANGE {} {def}", dialect.quote_identifier(column)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(alter_table_statements(dialect, &self.table, &clauses))
    }
}

/// `ALTER TABLE <t> RENAME TO <new_name>`
#[derive(Debug, Clone)]
pub struct RenameTableOperator {
    table: String,
    new_name: Option<String>,
}

impl RenameTableOperator {
    /// Creates an operator scoped to `table`.
    #[must_use]
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            new_name: None,
        }
    }

    /// Sets the new name, replacing any earlier one.
    pub fn set(&mut self, new_name: impl Into<String>) {
        self.new_name = Some(new_name.into());
    }

    /// Returns true if no rename is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.new_name.is_none()
    }

    /// Renders the rename statement, or nothing.
    #[must_use]
    pub fn render(&self, dialect: &Dialect) -> String {
        self.new_name.as_ref().map_or_else(String::new, |new_name| {
            let clause = format!("RENAME TO {}", dialect.quote_identifier(new_name));
            alter_table_statements(dialect, &self.table, &[clause])
        })
    }
}

/// `ALTER TABLE <t> ADD FOREIGN KEY (<col>) REFERENCES <ref_table>(id)`
#[derive(Debug, Clone)]
pub struct AddForeignKeyOperator {
    table: String,
    foreign_keys: IndexMap<String, String>,
}

impl AddForeignKeyOperator {
    /// Creates an operator scoped to `table`.
    #[must_use]
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            foreign_keys: IndexMap::new(),
        }
    }

    /// Queues a foreign key from `column` to `references`.
    pub fn set(&mut self, column: impl Into<String>, references: impl Into<String>) {
        self.foreign_keys.insert(column.into(), references.into());
    }

    /// Returns true if no foreign key is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.foreign_keys.is_empty()
    }

    /// Renders the ADD FOREIGN KEY clauses.
    pub fn render(&self, dialect: &Dialect) -> Result<String> {
        if !dialect.alter_add_constraint {
            return Err(SchemaError::Unsupported {
                dialect: dialect.name,
                operation: format!("adding foreign keys to existing table '{}'", self.table),
            });
        }
        let clauses: Vec<String> = self
            .foreign_keys
            .iter()
            .map(|(column, references)| {
                format!(
                    "ADD FOREIGN KEY ({}) REFERENCES {}({REFERENCED_KEY})",
                    dialect.quote_identifier(column),
                    dialect.quote_identifier(references)
                )
            })
            .collect();
        Ok(alter_table_statements(dialect, &self.table, &clauses))
    }
}
