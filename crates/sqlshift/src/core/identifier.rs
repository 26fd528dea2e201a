//! Schema-qualified table identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A schema-qualified table reference such as `dbo.Customers`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableRef {
    pub schema: String,
    pub table: String,
}

impl TableRef {
    /// Create a reference from explicit parts.
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
        }
    }

    /// Parse `schema.table`; a bare name gets the given default schema.
    pub fn parse(identifier: &str, default_schema: &str) -> Self {
        match identifier.split_once('.') {
            Some((schema, table)) => Self::new(schema, table),
            None => Self::new(default_schema, identifier),
        }
    }

    /// The `schema.table` form used in logs and artefacts.
    #[must_use]
    pub fn qualified(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }

    /// Key-map table name derivation: dots become underscores under a fixed
    /// prefix, so `dbo.Customers` owns `<prefix>dbo_Customers`.
    #[must_use]
    pub fn keymap_name(&self, prefix: &str) -> String {
        format!("{}{}_{}", prefix, self.schema, self.table)
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

/// Quote an identifier for SQL Server: `[name]`, doubling closing brackets.
#[must_use]
pub fn quote_bracket(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

/// Quote an identifier with double quotes (Oracle, PostgreSQL), doubling
/// embedded quotes.
#[must_use]
pub fn quote_double(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote an identifier with backticks (MySQL), doubling embedded backticks.
#[must_use]
pub fn quote_backtick(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Escape a SQL string literal value: `O'Brien` -> `O''Brien`.
///
/// Keys written into key-map value lists are user data; everything that
/// interpolates them must come through here.
#[must_use]
pub fn escape_literal(s: &str) -> String {
    s.replace('\'', "''")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_qualified() {
        let t = TableRef::parse("sales.Orders", "dbo");
        assert_eq!(t.schema, "sales");
        assert_eq!(t.table, "Orders");
        assert_eq!(t.qualified(), "sales.Orders");
    }

    #[test]
    fn test_parse_bare_uses_default_schema() {
        let t = TableRef::parse("Orders", "dbo");
        assert_eq!(t.schema, "dbo");
        assert_eq!(t.table, "Orders");
    }

    #[test]
    fn test_keymap_name() {
        let t = TableRef::new("dbo", "Customers");
        assert_eq!(t.keymap_name("sqlshift_keymap_"), "sqlshift_keymap_dbo_Customers");
    }

    #[test]
    fn test_quoting() {
        assert_eq!(quote_bracket("Or]ders"), "[Or]]ders]");
        assert_eq!(quote_double("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(quote_backtick("ta`ble"), "`ta``ble`");
    }

    #[test]
    fn test_escape_literal() {
        assert_eq!(escape_literal("O'Brien"), "O''Brien");
        assert_eq!(escape_literal("plain"), "plain");
    }
}
