//! Schema statement collection
//!
//! Statements are only run when the table does not exist yet, so every
//! statement should describe the table or its indexes from scratch.

use super::sql::quote_identifier;

#[derive(Debug, Clone)]
enum Entry {
    Statement(String),
    Index { name: String, columns: String, unique: bool },
    JsonTable { id_type: String, data_type: String },
}

/// Ordered DDL statements for one table.
///
/// Index and JSON table entries are rendered against the table name in
/// effect when [`statements`](Self::statements) is called.
#[derive(Debug, Clone, Default)]
pub struct SchemaBuilder {
    table_name: String,
    entries: Vec<Entry>,
}

impl SchemaBuilder {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            entries: Vec::new(),
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub(crate) fn set_table_name(&mut self, table_name: impl Into<String>) {
        self.table_name = table_name.into();
    }

    /// Queue a raw DDL statement
    pub fn ensure_schema(&mut self, statement: impl Into<String>) -> &mut Self {
        self.entries.push(Entry::Statement(statement.into()));
        self
    }

    /// Queue `CREATE [UNIQUE] INDEX IF NOT EXISTS`. Keys are `(column, ascending)`.
    pub fn ensure_index(&mut self, name: &str, keys: &[(&str, bool)], unique: bool) -> &mut Self {
        let columns = keys
            .iter()
            .map(|(column, ascending)| {
                if *ascending {
                    column.to_string()
                } else {
                    format!("{} DESC", column)
                }
            })
            .collect::<Vec<_>>()
            .join(", ");

        self.entries.push(Entry::Index {
            name: name.to_string(),
            columns,
            unique,
        });
        self
    }

    /// Queue the two-column table used by JSON document persistences
    pub fn ensure_json_table(&mut self, id_type: Option<&str>, data_type: Option<&str>) -> &mut Self {
        self.entries.push(Entry::JsonTable {
            id_type: id_type.unwrap_or("TEXT").to_string(),
            data_type: data_type.unwrap_or("JSON").to_string(),
        });
        self
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn statements(&self) -> Vec<String> {
        let table = quote_identifier(&self.table_name);
        self.entries
            .iter()
            .map(|entry| match entry {
                Entry::Statement(statement) => statement.clone(),
                Entry::Index { name, columns, unique } => format!(
                    "CREATE {}INDEX IF NOT EXISTS {} ON {} ({})",
                    if *unique { "UNIQUE " } else { "" },
                    quote_identifier(name),
                    table,
                    columns
                ),
                Entry::JsonTable { id_type, data_type } => format!(
                    "CREATE TABLE IF NOT EXISTS {} (\"id\" {} PRIMARY KEY, \"data\" {})",
                    table, id_type, data_type
                ),
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
