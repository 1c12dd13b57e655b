//! Shared test fixtures: a `Dummy` record, its schemas and CRUD checks run
//! against every id-addressed persistence.

use serde::{Deserialize, Serialize};

use crate::config::PersistenceConfig;
use crate::data::{DataPage, Identifiable, PagingParams};
use crate::persistence::{
    IdentifiableJsonSqlitePersistence, IdentifiableSqlitePersistence, Row, SchemaBuilder,
};
use crate::Result;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct Dummy {
    #[serde(default)]
    pub id: String,
    pub key: String,
    pub content: String,
}

impl Dummy {
    pub fn new(id: &str, key: &str, content: &str) -> Self {
        Self {
            id: id.to_string(),
            key: key.to_string(),
            content: content.to_string(),
        }
    }
}

impl Identifiable for Dummy {
    fn id(&self) -> Option<&str> {
        Some(self.id.as_str()).filter(|id| !id.is_empty())
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

/// Typed-column table with a unique key index
pub(crate) fn dummy_schema(schema: &mut SchemaBuilder) {
    let table = schema.table_name().to_string();
    schema
        .ensure_schema(format!(
            "CREATE TABLE \"{}\" (\"id\" VARCHAR(32) PRIMARY KEY, \"key\" VARCHAR(50), \"content\" TEXT)",
            table
        ))
        .ensure_index(&format!("{}_key", table), &[("key", true)], true);
}

/// JSON document table with a unique index on the embedded key
pub(crate) fn dummy_json_schema(schema: &mut SchemaBuilder) {
    let table = schema.table_name().to_string();
    schema.ensure_json_table(None, None).ensure_index(
        &format!("{}_json_key", table),
        &[("json_extract(\"data\", '$.key')", true)],
        true,
    );
}

/// Config pointing at a fresh database file. Keep the dir alive for the test.
pub(crate) fn temp_config() -> (tempfile::TempDir, PersistenceConfig) {
    let dir = tempfile::tempdir().unwrap();
    let database = dir.path().join("test.db");
    let config = PersistenceConfig::from_database(database.to_string_lossy());
    (dir, config)
}

/// Dummy operations with key filters rendered per storage layout
pub(crate) trait DummyPersistence {
    fn create(&self, item: &Dummy) -> Result<Dummy>;
    fn get_page_by_key(&self, key: Option<&str>, paging: PagingParams) -> Result<DataPage<Dummy>>;
    fn get_count_by_key(&self, key: Option<&str>) -> Result<i64>;
    fn get_one_random_by_key(&self, key: Option<&str>) -> Result<Option<Dummy>>;
    fn get_list_by_ids(&self, ids: &[String]) -> Result<Vec<Dummy>>;
    fn get_one_by_id(&self, id: &str) -> Result<Option<Dummy>>;
    fn update(&self, item: &Dummy) -> Result<Option<Dummy>>;
    fn set(&self, item: &Dummy) -> Result<Option<Dummy>>;
    fn update_partially(&self, id: &str, patch: &Row) -> Result<Option<Dummy>>;
    fn delete_by_id(&self, id: &str) -> Result<Option<Dummy>>;
    fn delete_by_ids(&self, ids: &[String]) -> Result<usize>;
}

const KEY_COLUMN: &str = "\"key\"";
const KEY_JSON_PATH: &str = "json_extract(\"data\", '$.key')";

fn key_filter(column: &str, key: Option<&str>) -> Option<String> {
    key.filter(|k| !k.is_empty())
        .map(|k| format!("{}='{}'", column, k.replace('\'', "''")))
}

impl DummyPersistence for IdentifiableSqlitePersistence<Dummy> {
    fn create(&self, item: &Dummy) -> Result<Dummy> {
        IdentifiableSqlitePersistence::create(self, "", item)
    }

    fn get_page_by_key(&self, key: Option<&str>, paging: PagingParams) -> Result<DataPage<Dummy>> {
        let filter = key_filter(KEY_COLUMN, key);
        self.get_page_by_filter("", filter.as_deref(), Some(paging), Some(KEY_COLUMN), None)
    }

    fn get_count_by_key(&self, key: Option<&str>) -> Result<i64> {
        self.get_count_by_filter("", key_filter(KEY_COLUMN, key).as_deref())
    }

    fn get_one_random_by_key(&self, key: Option<&str>) -> Result<Option<Dummy>> {
        self.get_one_random("", key_filter(KEY_COLUMN, key).as_deref())
    }

    fn get_list_by_ids(&self, ids: &[String]) -> Result<Vec<Dummy>> {
        IdentifiableSqlitePersistence::get_list_by_ids(self, "", ids)
    }

    fn get_one_by_id(&self, id: &str) -> Result<Option<Dummy>> {
        IdentifiableSqlitePersistence::get_one_by_id(self, "", id)
    }

    fn update(&self, item: &Dummy) -> Result<Option<Dummy>> {
        IdentifiableSqlitePersistence::update(self, "", item)
    }

    fn set(&self, item: &Dummy) -> Result<Option<Dummy>> {
        IdentifiableSqlitePersistence::set(self, "", item)
    }

    fn update_partially(&self, id: &str, patch: &Row) -> Result<Option<Dummy>> {
        IdentifiableSqlitePersistence::update_partially(self, "", id, patch)
    }

    fn delete_by_id(&self, id: &str) -> Result<Option<Dummy>> {
        IdentifiableSqlitePersistence::delete_by_id(self, "", id)
    }

    fn delete_by_ids(&self, ids: &[String]) -> Result<usize> {
        IdentifiableSqlitePersistence::delete_by_ids(self, "", ids)
    }
}

impl DummyPersistence for IdentifiableJsonSqlitePersistence<Dummy> {
    fn create(&self, item: &Dummy) -> Result<Dummy> {
        IdentifiableSqlitePersistence::create(&**self, "", item)
    }

    fn get_page_by_key(&self, key: Option<&str>, paging: PagingParams) -> Result<DataPage<Dummy>> {
        let filter = key_filter(KEY_JSON_PATH, key);
        self.get_page_by_filter("", filter.as_deref(), Some(paging), Some(KEY_JSON_PATH), None)
    }

    fn get_count_by_key(&self, key: Option<&str>) -> Result<i64> {
        self.get_count_by_filter("", key_filter(KEY_JSON_PATH, key).as_deref())
    }

    fn get_one_random_by_key(&self, key: Option<&str>) -> Result<Option<Dummy>> {
        self.get_one_random("", key_filter(KEY_JSON_PATH, key).as_deref())
    }

    fn get_list_by_ids(&self, ids: &[String]) -> Result<Vec<Dummy>> {
        IdentifiableSqlitePersistence::get_list_by_ids(&**self, "", ids)
    }

    fn get_one_by_id(&self, id: &str) -> Result<Option<Dummy>> {
        IdentifiableSqlitePersistence::get_one_by_id(&**self, "", id)
    }

    fn update(&self, item: &Dummy) -> Result<Option<Dummy>> {
        IdentifiableSqlitePersistence::update(&**self, "", item)
    }

    fn set(&self, item: &Dummy) -> Result<Option<Dummy>> {
        IdentifiableSqlitePersistence::set(&**self, "", item)
    }

    fn update_partially(&self, id: &str, patch: &Row) -> Result<Option<Dummy>> {
        IdentifiableSqlitePersistence::update_partially(&**self, "", id, patch)
    }

    fn delete_by_id(&self, id: &str) -> Result<Option<Dummy>> {
        IdentifiableSqlitePersistence::delete_by_id(&**self, "", id)
    }

    fn delete_by_ids(&self, ids: &[String]) -> Result<usize> {
        IdentifiableSqlitePersistence::delete_by_ids(&**self, "", ids)
    }
}

fn fixture_dummies() -> (Dummy, Dummy) {
    (
        Dummy::new("", "Key 11", "Content 1"),
        Dummy::new("", "Key 2", "Content 2"),
    )
}

fn patch_of(field: &str, value: &str) -> Row {
    let mut patch = Row::new();
    patch.insert(field.to_string(), serde_json::Value::String(value.to_string()));
    patch
}

pub(crate) fn check_crud_operations(persistence: &impl DummyPersistence) {
    let (template1, template2) = fixture_dummies();

    let mut dummy1 = persistence.create(&template1).unwrap();
    assert!(!dummy1.id.is_empty());
    assert_eq!(dummy1.key, template1.key);
    assert_eq!(dummy1.content, template1.content);

    let mut dummy2 = persistence.create(&template2).unwrap();
    assert!(!dummy2.id.is_empty());
    assert_eq!(dummy2.key, template2.key);

    let page = persistence
        .get_page_by_key(None, PagingParams::new(Some(0), Some(5), true))
        .unwrap();
    assert_eq!(page.data.len(), 2);
    assert_eq!(page.total, Some(2));
    assert_eq!(page.data[0].key, dummy1.key);
    assert_eq!(page.data[1].key, dummy2.key);

    let page = persistence
        .get_page_by_key(Some("Key 11"), PagingParams::new(Some(0), Some(5), false))
        .unwrap();
    assert_eq!(page.data.len(), 1);
    assert_eq!(page.data[0].key, dummy1.key);
    assert_eq!(persistence.get_count_by_key(Some("Key 11")).unwrap(), 1);

    // Update
    dummy1.content = "Updated Content 1".to_string();
    let result = persistence.update(&dummy1).unwrap().unwrap();
    assert_eq!(result, dummy1);

    // Set existing
    dummy1.content = "Updated Content 2".to_string();
    let result = persistence.set(&dummy1).unwrap().unwrap();
    assert_eq!(result, dummy1);

    // Set new
    dummy2.id = "New_id".to_string();
    dummy2.key = "New_key".to_string();
    let result = persistence.set(&dummy2).unwrap().unwrap();
    assert_eq!(result, dummy2);

    // Partial update
    let result = persistence
        .update_partially(&dummy1.id, &patch_of("content", "Partially Updated Content 1"))
        .unwrap()
        .unwrap();
    assert_eq!(result.id, dummy1.id);
    assert_eq!(result.key, dummy1.key);
    assert_eq!(result.content, "Partially Updated Content 1");

    let result = persistence.get_one_by_id(&dummy1.id).unwrap().unwrap();
    assert_eq!(result.content, "Partially Updated Content 1");

    // Delete
    let result = persistence.delete_by_id(&dummy1.id).unwrap().unwrap();
    assert_eq!(result.id, dummy1.id);
    assert_eq!(result.content, "Partially Updated Content 1");

    assert!(persistence.get_one_by_id(&dummy1.id).unwrap().is_none());
    assert!(persistence.delete_by_id(&dummy1.id).unwrap().is_none());
}

pub(crate) fn check_batch_operations(persistence: &impl DummyPersistence) {
    let (template1, template2) = fixture_dummies();

    let dummy1 = persistence.create(&template1).unwrap();
    let dummy2 = persistence.create(&template2).unwrap();
    let ids = vec![dummy1.id.clone(), dummy2.id.clone()];

    let items = persistence.get_list_by_ids(&ids).unwrap();
    assert_eq!(items.len(), 2);

    assert_eq!(persistence.delete_by_ids(&ids).unwrap(), 2);

    let items = persistence.get_list_by_ids(&ids).unwrap();
    assert!(items.is_empty());

    // Unknown ids are skipped
    let dummy3 = persistence.create(&template1).unwrap();
    let ids = vec![dummy3.id.clone(), "missing".to_string()];
    assert_eq!(persistence.get_list_by_ids(&ids).unwrap(), vec![dummy3.clone()]);
    assert_eq!(persistence.delete_by_ids(&ids).unwrap(), 1);
    assert!(persistence.get_one_by_id(&dummy3.id).unwrap().is_none());
}

pub(crate) fn check_page_and_random(persistence: &impl DummyPersistence) {
    assert!(persistence.get_one_random_by_key(None).unwrap().is_none());

    let (template1, template2) = fixture_dummies();
    let dummy1 = persistence.create(&template1).unwrap();
    let dummy2 = persistence.create(&template2).unwrap();

    let item = persistence.get_one_random_by_key(None).unwrap().unwrap();
    assert!(item == dummy1 || item == dummy2);

    let item = persistence.get_one_random_by_key(Some("Key 2")).unwrap().unwrap();
    assert_eq!(item, dummy2);
    assert!(persistence.get_one_random_by_key(Some("Key 3")).unwrap().is_none());

    let page = persistence
        .get_page_by_key(None, PagingParams::new(Some(1), Some(1), true))
        .unwrap();
    assert_eq!(page.total, Some(2));
    assert_eq!(page.data, vec![dummy2]);
}
