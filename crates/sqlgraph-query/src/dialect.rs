//! SQL dialects and the syntax points where they differ.

use serde::{Deserialize, Serialize};

/// Target SQL dialect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// Double-quoted symbols, `LIMIT offset, count`, MySQL-style functions
    #[default]
    Generic,
    /// Back-tick symbols, otherwise as generic
    #[serde(alias = "mariadb")]
    MySql,
    /// SQLite
    Sqlite,
    /// PostgreSQL (`OFFSET o LIMIT c`)
    #[serde(alias = "postgresql")]
    Postgres,
}

impl Dialect {
    /// Quote an identifier for this dialect.
    ///
    /// Embedded quote characters are doubled.
    pub fn quote_symbol(self, name: &str) -> String {
        match self {
            Dialect::MySql => {
                let escaped = name.replace('`', "``");
                format!("`{}`", escaped)
            }
            Dialect::Generic | Dialect::Sqlite | Dialect::Postgres => {
                let escaped = name.replace('"', "\"\"");
                format!("\"{}\"", escaped)
            }
        }
    }

    /// Column suffix for server-generated keys.
    pub const fn auto_increment(self) -> &'static str {
        match self {
            Dialect::Generic | Dialect::MySql => " AUTO_INCREMENT",
            Dialect::Sqlite => " AUTOINCREMENT",
            Dialect::Postgres => " GENERATED BY DEFAULT AS IDENTITY",
        }
    }

    /// Function returning the key generated by the last insert.
    pub const fn last_inserted_id(self) -> &'static str {
        match self {
            Dialect::Generic | Dialect::MySql => "last_insert_id()",
            Dialect::Sqlite => "last_insert_rowid()",
            Dialect::Postgres => "lastval()",
        }
    }

    /// Whether pagination is written `OFFSET o LIMIT c` instead of `LIMIT o, c`.
    pub const fn offset_first(self) -> bool {
        matches!(self, Dialect::Postgres)
    }

    /// Whether a column is renamed or retyped with `CHANGE COLUMN old new`.
    pub const fn uses_change_column(self) -> bool {
        matches!(self, Dialect::Generic | Dialect::MySql)
    }
}
