//! Error types for the schema engine.

/// Errors raised while building, replaying or rendering migrations.
///
/// Every variant names the table, field or operation kind involved so the
/// message can be surfaced to a user as-is.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// A persisted record used a top-level key that is not an operation kind.
    #[error("Invalid operation kind '{kind}' (expected CREATE_TABLE, DELETE_TABLE or CHANGE_TABLE)")]
    InvalidOperationKind {
        /// The unrecognized key.
        kind: String,
    },

    /// A field definition lacks an attribute needed to render it.
    #[error("Field '{table}.{field}' is missing required attribute '{attribute}'")]
    MissingRequiredAttribute {
        /// Table owning the field.
        table: String,
        /// Field name.
        field: String,
        /// Name of the missing attribute.
        attribute: &'static str,
    },

    /// A float default is NaN or infinite and has no SQL or JSON literal.
    #[error("Field '{table}.{field}' has a non-finite default value")]
    NonFiniteDefault {
        /// Table owning the field.
        table: String,
        /// Field name.
        field: String,
    },

    /// A table would be created without any column.
    #[error("Table '{table}' has no fields")]
    EmptyTable {
        /// Table name.
        table: String,
    },

    /// An operation targets a table absent from the state.
    #[error("Table '{table}' does not exist")]
    UnknownTableReference {
        /// Table name.
        table: String,
    },

    /// A table is created while already present in the state.
    #[error("Table '{table}' already exists")]
    DuplicateTableDefinition {
        /// Table name.
        table: String,
    },

    /// A create-field suboperation targets a field that already exists.
    #[error("Field '{field}' already exists in table '{table}'")]
    DuplicateFieldDefinition {
        /// Table name.
        table: String,
        /// Field name.
        field: String,
    },

    /// A delete-field or change-field suboperation targets a missing field.
    #[error("Field '{field}' does not exist in table '{table}'")]
    UnknownFieldReference {
        /// Table name.
        table: String,
        /// Field name.
        field: String,
    },

    /// One alter-table operation both creates and changes the same field.
    #[error("Field '{field}' of table '{table}' is both created and changed in one operation")]
    ConflictingFieldOperations {
        /// Table name.
        table: String,
        /// Field name.
        field: String,
    },

    /// The dialect cannot express the requested DDL.
    #[error("Dialect '{dialect}' does not support {operation}")]
    Unsupported {
        /// Dialect name.
        dialect: &'static str,
        /// Description of the operation.
        operation: String,
    },

    /// A persisted record has the wrong shape.
    #[error("Invalid migration record: {0}")]
    InvalidRecord(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for schema operations.
pub type Result<T> = std::result::Result<T, SchemaError>;
