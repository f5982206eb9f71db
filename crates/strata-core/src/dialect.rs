//! Database dialect capabilities.
//!
//! A dialect is a small capability descriptor consumed by the one generic
//! [`SchemaEngine`](crate::schema::SchemaEngine). Dialects differ in what
//! they can express, not in how the engine is structured.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use crate::error::SchemaError;

/// Words that always require quoting when used as identifiers.
const RESERVED_WORDS: &[&str] = &[
    "ADD", "ALTER", "AND", "AS", "BY", "CHECK", "COLUMN", "CREATE", "DEFAULT", "DELETE", "DROP",
    "FOREIGN", "FROM", "GROUP", "IN", "INDEX", "INSERT", "IS", "JOIN", "KEY", "LIMIT", "NOT",
    "NULL", "ON", "OR", "ORDER", "PRIMARY", "REFERENCES", "SELECT", "SET", "TABLE", "TO",
    "UNIQUE", "UPDATE", "VALUES", "WHERE",
];

/// Capabilities of a target database's SQL variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dialect {
    /// Dialect name.
    pub name: &'static str,
    /// Whether a column can be altered in place (`CHANGE`). When false the
    /// alteration is emulated by dropping and re-adding the column.
    pub native_alter_column: bool,
    /// Whether several targets or clauses can share one statement
    /// (`DROP TABLE a, b` or `ALTER TABLE t ADD .., ADD ..`).
    pub combined_clauses: bool,
    /// Whether a foreign key can be added to an existing table.
    pub alter_add_constraint: bool,
    /// Character used to quote identifiers.
    pub identifier_quote: char,
}

impl Dialect {
    /// SQLite: no in-place column alteration, one clause per ALTER TABLE.
    pub const SQLITE: Self = Self {
        name: "sqlite",
        native_alter_column: false,
        combined_clauses: false,
        alter_add_constraint: false,
        identifier_quote: '"',
    };

    /// MySQL: native `CHANGE`, combined clauses, `ADD FOREIGN KEY`.
    pub const MYSQL: Self = Self {
        name: "mysql",
        native_alter_column: true,
        combined_clauses: true,
        alter_add_constraint: true,
        identifier_quote: '`',
    };

    /// Quotes an identifier when it is not a plain, non-reserved word.
    #[must_use]
    pub fn quote_identifier<'a>(&self, name: &'a str) -> Cow<'a, str> {
        if is_plain_identifier(name) {
            return Cow::Borrowed(name);
        }
        let q = self.identifier_quote;
        let escaped = name.replace(q, &format!("{q}{q}"));
        Cow::Owned(format!("{q}{escaped}{q}"))
    }
}

impl Default for Dialect {
    fn default() -> Self {
        Self::SQLITE
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl FromStr for Dialect {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::SQLITE),
            "mysql" => Ok(Self::MYSQL),
            other => Err(SchemaError::Unsupported {
                dialect: "unknown",
                operation: format!("dialect '{other}'"),
            }),
        }
    }
}

fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let starts_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    starts_ok
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !RESERVED_WORDS.contains(&name.to_ascii_uppercase().as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_identifiers_pass_through() {
        assert_eq!(Dialect::SQLITE.quote_identifier("users"), "users");
        assert_eq!(Dialect::MYSQL.quote_identifier("created_at"), "created_at");
    }

    #[test]
    fn test_reserved_and_odd_identifiers_are_quoted() {
        assert_eq!(Dialect::SQLITE.quote_identifier("order"), "\"order\"");
        assert_eq!(Dialect::MYSQL.quote_identifier("order"), "`order`");
        assert_eq!(Dialect::SQLITE.quote_identifier("first name"), "\"first name\"");
        assert_eq!(Dialect::SQLITE.quote_identifier("a\"b"), "\"a\"\"b\"");
        assert_eq!(Dialect::SQLITE.quote_identifier("1st"), "\"1st\"");
    }

    #[test]
    fn test_from_str() {
        assert_eq!("SQLite".parse::<Dialect>().unwrap(), Dialect::SQLITE);
        assert_eq!("mysql".parse::<Dialect>().unwrap(), Dialect::MYSQL);
        assert!("oracle".parse::<Dialect>().is_err());
    }

    #[test]
    fn test_capabilities() {
        assert!(!Dialect::SQLITE.native_alter_column);
        assert!(!Dialect::SQLITE.combined_clauses);
        assert!(Dialect::MYSQL.native_alter_column);
        assert!(Dialect::MYSQL.alter_add_constraint);
    }
}
