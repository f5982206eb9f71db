//! Field and table metadata.
//!
//! These records describe the structure of a table as declared by the model
//! layer and as produced by replaying migrations. They carry data only; the
//! rendering and diffing logic lives in the operator and state modules.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SchemaError};

/// Ordered mapping of field name to field definition.
///
/// Insertion order drives the column order of generated DDL. Equality is
/// order-insensitive.
pub type Fields = IndexMap<String, FieldMeta>;

/// Literal default value of a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DefaultValue {
    /// Boolean default.
    Bool(bool),
    /// Integer default.
    Integer(i64),
    /// Float default.
    Float(f64),
    /// String default.
    Text(String),
}

impl DefaultValue {
    /// Returns the SQL literal for this default value.
    ///
    /// Strings are single-quoted with embedded quotes doubled.
    #[must_use]
    pub fn to_sql(&self) -> String {
        match self {
            Self::Bool(b) => if *b { "1" } else { "0" }.to_string(),
            Self::Integer(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Text(s) => format!("'{}'", s.replace('\'', "''")),
        }
    }

    /// Returns false for NaN and infinite floats.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        match self {
            Self::Float(f) => f.is_finite(),
            _ => true,
        }
    }
}

impl From<bool> for DefaultValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for DefaultValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for DefaultValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for DefaultValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for DefaultValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_false(value: &bool) -> bool {
    !*value
}

/// Definition of a single column.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FieldMeta {
    /// Dialect-level type token, passed through verbatim.
    #[serde(default)]
    pub data_type: String,
    /// Whether the column accepts NULL.
    #[serde(default)]
    pub null: bool,
    /// Default literal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<DefaultValue>,
    /// Whether the column is (part of) the primary key.
    #[serde(default, skip_serializing_if = "is_false")]
    pub primary_key: bool,
    /// Referenced table; implies a foreign key on this column.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<String>,
    /// Whether the model layer generates values for this column.
    #[serde(default, skip_serializing_if = "is_false")]
    pub autoincrement: bool,
}

impl FieldMeta {
    /// Creates a NOT NULL field of the given type.
    #[must_use]
    pub fn new(data_type: impl Into<String>) -> Self {
        Self {
            data_type: data_type.into(),
            ..Self::default()
        }
    }

    /// Allows NULL values.
    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.null = true;
        self
    }

    /// Sets the default value.
    #[must_use]
    pub fn default_value(mut self, value: impl Into<DefaultValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Marks the field as primary key.
    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Adds a foreign key to `table`.
    #[must_use]
    pub fn references(mut self, table: impl Into<String>) -> Self {
        self.references = Some(table.into());
        self
    }

    /// Marks the field as auto-incrementing.
    #[must_use]
    pub fn autoincrement(mut self) -> Self {
        self.autoincrement = true;
        self
    }

    /// Checks that the default, if any, can be written as a literal.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::NonFiniteDefault`] for a NaN or infinite float.
    pub fn check_default(&self, table: &str, field: &str) -> Result<()> {
        match &self.default {
            Some(default) if !default.is_finite() => Err(SchemaError::NonFiniteDefault {
                table: table.to_string(),
                field: field.to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// Returns the name of the first attribute whose value differs from
    /// `previous`, checked in declaration order.
    ///
    /// Any difference replaces the whole definition, so the comparison stops
    /// at the first mismatch.
    #[must_use]
    pub fn first_difference(&self, previous: &Self) -> Option<&'static str> {
        if self.data_type != previous.data_type {
            Some("data_type")
        } else if self.null != previous.null {
            Some("null")
        } else if self.default != previous.default {
            Some("default")
        } else if self.primary_key != previous.primary_key {
            Some("primary_key")
        } else if self.references != previous.references {
            Some("references")
        } else if self.autoincrement != previous.autoincrement {
            Some("autoincrement")
        } else {
            None
        }
    }
}

/// A table name plus its ordered field definitions.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TableMeta {
    /// Table name.
    #[serde(rename = "table")]
    pub name: String,
    /// Field definitions in declaration order.
    #[serde(default)]
    pub fields: Fields,
}

impl TableMeta {
    /// Creates a table with no fields.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Fields::new(),
        }
    }

    /// Appends a field definition.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, meta: FieldMeta) -> Self {
        self.fields.insert(name.into(), meta);
        self
    }

    /// Looks up a field by name.
    #[must_use]
    pub fn get_field(&self, name: &str) -> Option<&FieldMeta> {
        self.fields.get(name)
    }

    /// Returns the names of the primary key fields, in declaration order.
    #[must_use]
    pub fn primary_key(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|(_, meta)| meta.primary_key)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_builder() {
        let field = FieldMeta::new("INTEGER")
            .primary_key()
            .autoincrement()
            .references("users");

        assert_eq!(field.data_type, "INTEGER");
        assert!(!field.null);
        assert!(field.primary_key);
        assert!(field.autoincrement);
        assert_eq!(field.references.as_deref(), Some("users"));
    }

    #[test]
    fn test_default_to_sql() {
        assert_eq!(DefaultValue::Bool(true).to_sql(), "1");
        assert_eq!(DefaultValue::Integer(-3).to_sql(), "-3");
        assert_eq!(DefaultValue::Float(1.5).to_sql(), "1.5");
        assert_eq!(DefaultValue::from("it's").to_sql(), "'it''s'");
    }

    #[test]
    fn test_non_finite_default_rejected() {
        assert!(!DefaultValue::Float(f64::NAN).is_finite());
        assert!(DefaultValue::Float(2.5).is_finite());

        let field = FieldMeta::new("REAL").default_value(f64::INFINITY);
        assert!(matches!(
            field.check_default("t", "x"),
            Err(SchemaError::NonFiniteDefault { field, .. }) if field == "x"
        ));
        assert!(FieldMeta::new("REAL")
            .default_value(0.5)
            .check_default("t", "x")
            .is_ok());
    }

    #[test]
    fn test_field_serializes_only_set_keys() {
        let json = serde_json::to_value(FieldMeta::new("INT").primary_key()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"data_type": "INT", "null": false, "primary_key": true})
        );
    }

    #[test]
    fn test_field_deserializes_defaults() {
        let field: FieldMeta =
            serde_json::from_value(serde_json::json!({"data_type": "TEXT", "default": "x"}))
                .unwrap();
        assert!(!field.null);
        assert_eq!(field.default, Some(DefaultValue::Text("x".to_string())));

        let field: FieldMeta =
            serde_json::from_value(serde_json::json!({"data_type": "INT", "default": 7})).unwrap();
        assert_eq!(field.default, Some(DefaultValue::Integer(7)));
    }

    #[test]
    fn test_first_difference() {
        let before = FieldMeta::new("TEXT");
        assert_eq!(before.first_difference(&before), None);
        assert_eq!(
            FieldMeta::new("VARCHAR(255)")
                .nullable()
                .first_difference(&before),
            Some("data_type")
        );
        assert_eq!(
            FieldMeta::new("TEXT").nullable().first_difference(&before),
            Some("null")
        );
    }

    #[test]
    fn test_table_equality_ignores_order() {
        let a = TableMeta::new("users")
            .field("id", FieldMeta::new("INT"))
            .field("name", FieldMeta::new("TEXT"));
        let b = TableMeta::new("users")
            .field("name", FieldMeta::new("TEXT"))
            .field("id", FieldMeta::new("INT"));
        assert_eq!(a, b);
    }

    #[test]
    fn test_primary_key_columns() {
        let table = TableMeta::new("memberships")
            .field("user_id", FieldMeta::new("INT").primary_key())
            .field("group_id", FieldMeta::new("INT").primary_key())
            .field("role", FieldMeta::new("TEXT"));
        assert_eq!(table.primary_key(), vec!["user_id", "group_id"]);
    }
}
