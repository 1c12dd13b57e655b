//! Mapping between JSON values and SQLite storage classes

use rusqlite::types::{Value as SqlValue, ValueRef};
use serde::Deserialize;
use serde::de::{self, DeserializeOwned, DeserializeSeed, Deserializer, MapAccess, Visitor};
use serde_json::{Number, Value};

use super::Row;

/// JSON value to bind parameter. Nested arrays and objects are stored as JSON text.
pub fn json_to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => n.as_f64().map_or(SqlValue::Null, SqlValue::Real),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Array(_) | Value::Object(_) => SqlValue::Text(value.to_string()),
    }
}

/// Column value to JSON. Blobs become byte arrays.
pub fn sql_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Array(bytes.iter().map(|b| Value::from(*b)).collect()),
    }
}

/// Read a result row into a column-ordered map
pub fn row_to_map(row: &rusqlite::Row<'_>) -> rusqlite::Result<Row> {
    let stmt: &rusqlite::Statement<'_> = row.as_ref();
    let mut map = Row::new();
    for i in 0..stmt.column_count() {
        let name = stmt.column_name(i)?.to_string();
        map.insert(name, sql_to_json(row.get_ref(i)?));
    }
    Ok(map)
}

/// Deserialize a record from a row read by [`row_to_map`].
///
/// Undoes [`json_to_sql`] where the target type asks for it: integers are
/// accepted as booleans and JSON text as sequences, maps, structs and enums.
pub fn from_row<T: DeserializeOwned>(row: Row) -> serde_json::Result<T> {
    T::deserialize(ColumnValue(Value::Object(row)))
}

/// Array or object text parsed back into JSON, anything else as is
fn parse_json_text(value: Value) -> Value {
    match value {
        Value::String(text) => match serde_json::from_str(&text) {
            Ok(parsed @ (Value::Array(_) | Value::Object(_))) => parsed,
            _ => Value::String(text),
        },
        other => other,
    }
}

struct ColumnValue(Value);

macro_rules! forward_to_value {
    ($($method:ident)*) => {
        $(
            fn $method<V: Visitor<'de>>(self, visitor: V) -> serde_json::Result<V::Value> {
                self.0.$method(visitor)
            }
        )*
    };
}

impl<'de> Deserializer<'de> for ColumnValue {
    type Error = serde_json::Error;

    forward_to_value! {
        deserialize_i8 deserialize_i16 deserialize_i32 deserialize_i64
        deserialize_u8 deserialize_u16 deserialize_u32 deserialize_u64
        deserialize_f32 deserialize_f64 deserialize_char deserialize_str deserialize_string
        deserialize_bytes deserialize_byte_buf deserialize_unit
        deserialize_identifier deserialize_ignored_any
    }

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> serde_json::Result<V::Value> {
        match self.0 {
            Value::Object(map) => visitor.visit_map(Columns::new(map)),
            other => other.deserialize_any(visitor),
        }
    }

    fn deserialize_bool<V: Visitor<'de>>(self, visitor: V) -> serde_json::Result<V::Value> {
        match self.0 {
            Value::Number(n) => match n.as_i64() {
                Some(i) => visitor.visit_bool(i != 0),
                None => Value::Number(n).deserialize_bool(visitor),
            },
            other => other.deserialize_bool(visitor),
        }
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> serde_json::Result<V::Value> {
        match self.0 {
            Value::Null => visitor.visit_none(),
            other => visitor.visit_some(ColumnValue(other)),
        }
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        visitor: V,
    ) -> serde_json::Result<V::Value> {
        self.0.deserialize_unit_struct(name, visitor)
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> serde_json::Result<V::Value> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> serde_json::Result<V::Value> {
        parse_json_text(self.0).deserialize_seq(visitor)
    }

    fn deserialize_tuple<V: Visitor<'de>>(self, len: usize, visitor: V) -> serde_json::Result<V::Value> {
        parse_json_text(self.0).deserialize_tuple(len, visitor)
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        len: usize,
        visitor: V,
    ) -> serde_json::Result<V::Value> {
        parse_json_text(self.0).deserialize_tuple_struct(name, len, visitor)
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> serde_json::Result<V::Value> {
        match parse_json_text(self.0) {
            Value::Object(map) => visitor.visit_map(Columns::new(map)),
            other => other.deserialize_map(visitor),
        }
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> serde_json::Result<V::Value> {
        match parse_json_text(self.0) {
            Value::Object(map) => visitor.visit_map(Columns::new(map)),
            other => other.deserialize_struct(name, fields, visitor),
        }
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        name: &'static str,
        variants: &'static [&'static str],
        visitor: V,
    ) -> serde_json::Result<V::Value> {
        parse_json_text(self.0).deserialize_enum(name, variants, visitor)
    }
}

/// Fields of a row or stored object, each value read as a [`ColumnValue`]
struct Columns {
    iter: serde_json::map::IntoIter,
    value: Option<Value>,
}

impl Columns {
    fn new(map: Row) -> Self {
        Self {
            iter: map.into_iter(),
            value: None,
        }
    }
}

impl<'de> MapAccess<'de> for Columns {
    type Error = serde_json::Error;

    fn next_key_seed<K: DeserializeSeed<'de>>(&mut self, seed: K) -> serde_json::Result<Option<K::Value>> {
        match self.iter.next() {
            Some((key, value)) => {
                self.value = Some(value);
                seed.deserialize(Value::String(key)).map(Some)
            }
            None => Ok(None),
        }
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> serde_json::Result<V::Value> {
        match self.value.take() {
            Some(value) => seed.deserialize(ColumnValue(value)),
            None => Err(de::Error::custom("value is missing")),
        }
    }
}
