//! SQL fragment synthesis over [`Row`] maps

use rusqlite::types::Value as SqlValue;

use super::value::json_to_sql;
use super::Row;
use crate::data::ID_COLUMN;

/// Double-quote an identifier. Empty, already double-quoted and
/// single-quoted (literal) values pass through unchanged.
pub fn quote_identifier(value: &str) -> String {
    if value.is_empty() {
        return String::new();
    }
    if value.len() >= 2
        && ((value.starts_with('"') && value.ends_with('"'))
            || (value.starts_with('\'') && value.ends_with('\'')))
    {
        return value.to_string();
    }
    format!("\"{}\"", value.replace('"', "\"\""))
}

/// Quoted column names in row order, comma-joined
pub fn generate_columns(row: &Row) -> String {
    row.keys()
        .map(|key| quote_identifier(key))
        .collect::<Vec<_>>()
        .join(",")
}

/// `?1,?2,...,?count`
pub fn generate_parameters(count: usize) -> String {
    (1..=count)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(",")
}

/// `"col"=?n` pairs for every column except the id, numbered from
/// `first_index`. Also returns the columns in placeholder order.
pub fn generate_set_parameters(row: &Row, first_index: usize) -> (String, Vec<String>) {
    let columns: Vec<String> = row
        .keys()
        .filter(|key| key.as_str() != ID_COLUMN)
        .cloned()
        .collect();
    let clause = columns
        .iter()
        .enumerate()
        .map(|(i, column)| format!("{}=?{}", quote_identifier(column), first_index + i))
        .collect::<Vec<_>>()
        .join(",");
    (clause, columns)
}

/// Values in the order of `columns`; missing columns bind NULL
pub fn generate_values<S: AsRef<str>>(columns: &[S], row: &Row) -> Vec<SqlValue> {
    columns
        .iter()
        .map(|column| row.get(column.as_ref()).map_or(SqlValue::Null, json_to_sql))
        .collect()
}

/// Append ` WHERE <filter>` when the fragment is present
pub(crate) fn push_where(sql: &mut String, filter: Option<&str>) {
    if let Some(filter) = non_blank(filter) {
        sql.push_str(" WHERE ");
        sql.push_str(filter);
    }
}

/// Blank fragments count as absent
pub(crate) fn non_blank(fragment: Option<&str>) -> Option<&str> {
    fragment.filter(|f| !f.trim().is_empty())
}
