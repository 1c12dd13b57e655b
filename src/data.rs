//! Paging and identity primitives shared by every persistence

use serde::{Deserialize, Serialize};

/// Name of the primary-key column used by id-addressed operations
pub const ID_COLUMN: &str = "id";

/// Page request. Missing values fall back to the persistence defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PagingParams {
    pub skip: Option<i64>,
    pub take: Option<i64>,
    /// Also count matching rows
    pub total: bool,
}

impl PagingParams {
    pub fn new(skip: Option<i64>, take: Option<i64>, total: bool) -> Self {
        Self { skip, take, total }
    }

    /// Rows to skip, never below `min`
    pub fn get_skip(&self, min: i64) -> i64 {
        self.skip.map_or(min, |skip| skip.max(min))
    }

    /// Rows to return, clamped into `0..=max`
    pub fn get_take(&self, max: i64) -> i64 {
        self.take.map_or(max, |take| take.clamp(0, max.max(0)))
    }
}

/// One page of results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPage<T> {
    /// Count of all matching rows, only when requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<i64>,
    pub data: Vec<T>,
}

impl<T> DataPage<T> {
    pub fn new(total: Option<i64>, data: Vec<T>) -> Self {
        Self { total, data }
    }
}

impl<T> Default for DataPage<T> {
    fn default() -> Self {
        Self {
            total: None,
            data: Vec::new(),
        }
    }
}

/// Records addressed by a string id
pub trait Identifiable {
    /// Current id; empty ids count as unset
    fn id(&self) -> Option<&str>;
    fn set_id(&mut self, id: String);
}

impl Identifiable for serde_json::Map<String, serde_json::Value> {
    fn id(&self) -> Option<&str> {
        self.get(ID_COLUMN)
            .and_then(serde_json::Value::as_str)
            .filter(|id| !id.is_empty())
    }

    fn set_id(&mut self, id: String) {
        self.insert(ID_COLUMN.to_string(), serde_json::Value::String(id));
    }
}

/// New 32-character hex id
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Assign a fresh id when the item has none. Returns the id in effect.
pub fn ensure_id<T: Identifiable>(item: &mut T) -> String {
    if let Some(id) = item.id() {
        return id.to_string();
    }
    let id = generate_id();
    item.set_id(id.clone());
    id
}
