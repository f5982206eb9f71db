//! # strata-core
//!
//! Schema state diffing and migration operations.
//!
//! The crate snapshots declared models into a [`State`], diffs two states
//! into a [`Migration`], persists migrations as JSON records and renders
//! them into dialect-specific DDL:
//!
//! - **Metadata** - [`FieldMeta`] and [`TableMeta`] describe columns and tables
//! - **Operators** - one SQL fragment builder per DDL verb
//! - **Schema engine** - accumulates DDL for one [`Dialect`] and renders it
//! - **Operations** - create, delete and alter a table
//! - **State** - snapshots, replay and the [`StateComparer`]
//!
//! Nothing here touches a database. Execution goes through the
//! [`Executor`] trait.
//!
//! ## Example
//!
//! ```rust,ignore
//! use strata_core::prelude::*;
//!
//! let previous = State::build(&vec![TableMeta::new("users")
//!     .field("id", FieldMeta::new("INT").primary_key())])?;
//! let target = State::build(&vec![TableMeta::new("users")
//!     .field("id", FieldMeta::new("INT").primary_key())
//!     .field("email", FieldMeta::new("TEXT").nullable())])?;
//!
//! let migration = target.diff(&previous);
//! assert_eq!(
//!     migration.render(Dialect::SQLITE)?,
//!     "ALTER TABLE users\nADD email TEXT NULL;"
//! );
//!
//! // Persist the record, later replay it.
//! let record = migration.to_record()?;
//! let mut state = previous.clone();
//! state.mutate(&record)?;
//! assert_eq!(state, target);
//! ```

pub mod dialect;
pub mod error;
pub mod executor;
pub mod meta;
pub mod migration;
pub mod operation;
pub mod operators;
pub mod schema;
pub mod state;

pub use dialect::Dialect;
pub use error::{Result, SchemaError};
pub use executor::Executor;
pub use meta::{DefaultValue, FieldMeta, Fields, TableMeta};
pub use migration::Migration;
pub use operation::{
    AlterTableOperation, CreateTableOperation, DeleteTableOperation, FieldOperation, Operation,
    OperationKind,
};
pub use schema::{SchemaEngine, TableSchema};
pub use state::{Model, ModelRegistry, State, StateComparer};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::dialect::Dialect;
    pub use crate::error::{Result, SchemaError};
    pub use crate::executor::Executor;
    pub use crate::meta::{DefaultValue, FieldMeta, Fields, TableMeta};
    pub use crate::migration::Migration;
    pub use crate::operation::{
        AlterTableOperation, CreateTableOperation, DeleteTableOperation, FieldOperation,
        Operation, OperationKind,
    };
    pub use crate::schema::{SchemaEngine, TableSchema};
    pub use crate::state::{Model, ModelRegistry, State, StateComparer};
}
