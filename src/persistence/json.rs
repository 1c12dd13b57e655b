//! JSON document persistence: one `id` column and one `data` column

use std::ops::{Deref, DerefMut};

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::convert::JsonColumnConverter;
use super::identifiable::IdentifiableSqlitePersistence;
use super::schema::SchemaBuilder;
use crate::data::Identifiable;

/// Stores whole records as JSON text through [`JsonColumnConverter`].
/// Partial updates are merged in SQL with `JSON_PATCH`.
pub struct IdentifiableJsonSqlitePersistence<T> {
    inner: IdentifiableSqlitePersistence<T>,
}

impl<T> IdentifiableJsonSqlitePersistence<T>
where
    T: Identifiable + Clone + Serialize + DeserializeOwned + 'static,
{
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            inner: IdentifiableSqlitePersistence::with_converter(
                table_name,
                JsonColumnConverter::new(),
            ),
        }
    }

    pub fn with_schema(self, hook: impl Fn(&mut SchemaBuilder) + Send + Sync + 'static) -> Self {
        Self {
            inner: self.inner.with_schema(hook),
        }
    }

    /// Queue the `(id, data)` table. Defaults to `TEXT` and `JSON` column types.
    ///
    /// The table is named when the schema is created, so a later `configure`
    /// with another table still applies.
    pub fn ensure_table(&mut self, id_type: Option<&str>, data_type: Option<&str>) {
        self.schema_mut().ensure_json_table(id_type, data_type);
    }
}

impl<T> Deref for IdentifiableJsonSqlitePersistence<T> {
    type Target = IdentifiableSqlitePersistence<T>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<T> DerefMut for IdentifiableJsonSqlitePersistence<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

impl<T> std::fmt::Debug for IdentifiableJsonSqlitePersistence<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("IdentifiableJsonSqlitePersistence")
            .field(&self.inner)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::Row;
    use crate::testing::{self, Dummy, dummy_json_schema, temp_config};
    use serde_json::{Value, json};

    fn open_dummies() -> (tempfile::TempDir, IdentifiableJsonSqlitePersistence<Dummy>) {
        let (dir, config) = temp_config();
        let mut persistence =
            IdentifiableJsonSqlitePersistence::<Dummy>::new("dummies_json").with_schema(dummy_json_schema);
        persistence.configure(&config);
        persistence.open("").unwrap();
        persistence.clear("").unwrap();
        (dir, persistence)
    }

    #[test]
    fn test_crud_operations() {
        let (_dir, mut persistence) = open_dummies();
        testing::check_crud_operations(&persistence);
        persistence.close("").unwrap();
    }

    #[test]
    fn test_batch_operations() {
        let (_dir, mut persistence) = open_dummies();
        testing::check_batch_operations(&persistence);
        persistence.close("").unwrap();
    }

    #[test]
    fn test_page_and_random() {
        let (_dir, mut persistence) = open_dummies();
        testing::check_page_and_random(&persistence);
        persistence.close("").unwrap();
    }

    #[test]
    fn test_documents_are_stored_as_json_text() {
        let (_dir, mut persistence) = open_dummies();
        persistence
            .create("", &Dummy::new("1", "Key 1", "Content 1"))
            .unwrap();

        let data: String = persistence
            .client("")
            .unwrap()
            .with(|conn| {
                Ok(conn.query_row(
                    "SELECT \"data\" FROM \"dummies_json\" WHERE \"id\"='1'",
                    [],
                    |row| row.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(
            serde_json::from_str::<serde_json::Value>(&data).unwrap(),
            json!({"id": "1", "key": "Key 1", "content": "Content 1"})
        );

        persistence.close("").unwrap();
    }

    #[test]
    fn test_patch_updates_fields() {
        let (_dir, mut persistence) = open_dummies();
        persistence
            .create("", &Dummy::new("1", "Key 1", "Content 1"))
            .unwrap();

        let patch = json!({"content": "Patched"}).as_object().unwrap().clone();
        let patched = persistence.update_partially("", "1", &patch).unwrap().unwrap();
        assert_eq!(patched, Dummy::new("1", "Key 1", "Patched"));

        assert!(persistence.update_partially("", "missing", &patch).unwrap().is_none());
        persistence.close("").unwrap();
    }

    #[test]
    fn test_patch_through_identifiable_persistence() {
        let (_dir, mut persistence) = open_dummies();
        persistence
            .create("", &Dummy::new("1", "Key 1", "Content 1"))
            .unwrap();

        let inner: &IdentifiableSqlitePersistence<Dummy> = &persistence;
        let patch = json!({"content": "Y"}).as_object().unwrap().clone();
        let patched = inner.update_partially("", "1", &patch).unwrap().unwrap();
        assert_eq!(patched, Dummy::new("1", "Key 1", "Y"));

        persistence.close("").unwrap();
    }

    #[test]
    fn test_patch_merges_nested_fields() {
        let (_dir, config) = temp_config();
        let mut persistence = IdentifiableJsonSqlitePersistence::<Row>::new("documents");
        persistence.ensure_table(None, None);
        persistence.configure(&config);
        persistence.open("").unwrap();

        let doc = json!({"id": "1", "title": "x", "meta": {"a": 1, "b": 1}});
        persistence
            .create("", doc.as_object().unwrap())
            .unwrap();

        let patch = json!({"meta": {"b": 2, "c": 3}, "title": null});
        let patched = persistence
            .update_partially("", "1", patch.as_object().unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(
            Value::Object(patched),
            json!({"id": "1", "meta": {"a": 1, "b": 2, "c": 3}})
        );

        persistence.close("").unwrap();
    }

    #[test]
    fn test_ensure_table() {
        let (_dir, config) = temp_config();
        let mut persistence = IdentifiableJsonSqlitePersistence::<Row>::new("documents");
        persistence.ensure_table(None, None);
        persistence.configure(&config);
        persistence.open("").unwrap();

        let doc = json!({"title": "hello", "tags": ["a", "b"]}).as_object().unwrap().clone();
        let created = persistence.create("", &doc).unwrap();
        let id = created.id().unwrap().to_string();

        let stored = persistence.get_one_by_id("", &id).unwrap().unwrap();
        assert_eq!(stored, created);
        assert_eq!(
            persistence
                .get_count_by_filter("", Some("json_extract(\"data\", '$.title')='hello'"))
                .unwrap(),
            1
        );
        persistence.close("").unwrap();
    }

    #[test]
    fn test_ensure_table_uses_configured_table() {
        let (_dir, config) = temp_config();
        let mut persistence = IdentifiableJsonSqlitePersistence::<Row>::new("documents");
        persistence.ensure_table(None, None);
        persistence.configure(&config.with_table("notes"));
        persistence.open("").unwrap();
        assert_eq!(persistence.table_name(), "notes");

        let doc = json!({"title": "hello"}).as_object().unwrap().clone();
        let created = persistence.create("", &doc).unwrap();
        assert!(persistence.get_one_by_id("", created.id().unwrap()).unwrap().is_some());

        let tables: Vec<String> = persistence
            .client("")
            .unwrap()
            .with(|conn| {
                let mut stmt =
                    conn.prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<rusqlite::Result<Vec<String>>>()?;
                Ok(names)
            })
            .unwrap();
        assert_eq!(tables, vec!["notes".to_string()]);

        persistence.close("").unwrap();
    }
}
