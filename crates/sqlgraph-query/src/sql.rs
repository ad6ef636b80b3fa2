//! Accumulating SQL text buffer with dialect-aware append primitives.
//!
//! The builder never validates SQL. It only guarantees spacing: keywords
//! appended through [`SqlStringBuilder::append_after_space`] are separated
//! from the previous token by exactly one space.

use crate::dialect::Dialect;
use std::fmt;

#[derive(Debug, Clone, Default)]
pub struct SqlStringBuilder {
    text: String,
    dialect: Dialect,
}

impl SqlStringBuilder {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            text: String::new(),
            dialect,
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Append raw text.
    pub fn append(&mut self, s: &str) -> &mut Self {
        self.text.push_str(s);
        self
    }

    /// Insert a space unless the buffer is empty or already ends with one.
    pub fn append_space(&mut self) -> &mut Self {
        if !self.text.is_empty() && !self.text.ends_with(' ') {
            self.text.push(' ');
        }
        self
    }

    /// Append a keyword separated from the previous token by one space.
    pub fn append_after_space(&mut self, s: &str) -> &mut Self {
        self.append_space();
        self.text.push_str(s);
        self
    }

    /// Append a quoted table or column name.
    pub fn append_symbol(&mut self, name: &str) -> &mut Self {
        let quoted = self.dialect.quote_symbol(name);
        self.text.push_str(&quoted);
        self
    }

    /// Append `"schema"."table"`, or just the table when there is no schema.
    pub fn append_table_name(&mut self, schema: Option<&str>, table: &str) -> &mut Self {
        self.append_space();
        if let Some(schema) = schema {
            self.append_symbol(schema);
            self.text.push('.');
        }
        self.append_symbol(table)
    }

    /// Append a column qualified by a table alias: ` "alias"."column"`.
    pub fn append_column(&mut self, alias: Option<&str>, column: &str) -> &mut Self {
        self.text.push(' ');
        if let Some(alias) = alias {
            self.append_symbol(alias);
            self.text.push('.');
        }
        self.append_symbol(column)
    }

    pub fn append_auto_increment(&mut self) -> &mut Self {
        let s = self.dialect.auto_increment();
        self.append(s)
    }

    pub fn append_last_inserted_id(&mut self) -> &mut Self {
        let f = self.dialect.last_inserted_id();
        self.append_after_space(f)
    }

    pub fn append_drop_table(&mut self, schema: Option<&str>, table: &str) -> &mut Self {
        self.append_after_space("DROP TABLE");
        self.append_table_name(schema, table)
    }

    pub fn before_add_column(&mut self) -> &mut Self {
        self.append_after_space("ADD COLUMN ")
    }

    /// Start redefining `previous`; the new definition follows.
    pub fn before_alter_column(&mut self, previous: &str) -> &mut Self {
        if self.dialect.uses_change_column() {
            self.append(" CHANGE COLUMN ");
            self.append_symbol(previous);
            self.append(" ")
        } else {
            self.append(" ALTER COLUMN ");
            self.append_symbol(previous);
            self.append(" TYPE ")
        }
    }

    /// Opens a pagination clause; the offset parameter follows.
    pub fn before_limit(&mut self) -> &mut Self {
        if self.dialect.offset_first() {
            self.append_after_space("OFFSET ")
        } else {
            self.append_after_space("LIMIT ")
        }
    }

    /// Separates offset from count.
    pub fn during_limit(&mut self) -> &mut Self {
        if self.dialect.offset_first() {
            self.append_after_space("LIMIT ")
        } else {
            self.append(",")
        }
    }

    /// Closes a pagination clause.
    pub fn after_limit(&mut self) -> &mut Self {
        self
    }

    /// Opens a count-only limit; the count parameter follows.
    pub fn before_take(&mut self) -> &mut Self {
        self.append_after_space("LIMIT ")
    }

    /// Append the placeholder for parameter `index`.
    pub fn append_parameter(&mut self, index: usize) -> &mut Self {
        self.append_space();
        self.text.push_str(&format!("@Item{}", index));
        self
    }
}

impl fmt::Display for SqlStringBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
