//! The database-side collaborator a migration is applied through.

use std::future::Future;

use crate::error::SchemaError;
use crate::schema::SchemaEngine;

/// Executes rendered DDL against a database.
///
/// Retry, timeout and transaction policy belong to the implementation.
pub trait Executor {
    /// Error produced by execution. Schema errors raised while rendering
    /// are converted into it.
    type Error: From<SchemaError>;

    /// Returns a fresh schema engine bound to this executor's dialect.
    fn schema_engine(&self) -> SchemaEngine;

    /// Executes a multi-statement script.
    fn execute_script(&mut self, sql: &str) -> impl Future<Output = Result<(), Self::Error>>;
}
