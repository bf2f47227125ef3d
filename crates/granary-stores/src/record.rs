//! Key-value record store
//!
//! One store instance corresponds to one table with a single key
//! attribute. Records are loose JSON documents; typed views live in
//! granary-core. `update` merges fields into the existing record
//! (upserting when absent), it never replaces wholesale.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// A single comparison a query filter applies to one field
#[derive(Debug, Clone)]
pub enum Condition {
    /// Field equals the value
    Eq(Value),
    /// Field is one of the values
    AnyOf(Vec<Value>),
}

impl Condition {
    fn matches(&self, actual: Option<&Value>) -> bool {
        match self {
            Condition::Eq(expected) => actual == Some(expected),
            Condition::AnyOf(options) => {
                actual.is_some_and(|v| options.iter().any(|o| o == v))
            }
        }
    }
}

/// Simple conjunctive query filter
#[derive(Debug, Clone, Default)]
pub struct Filter {
    conditions: Vec<(String, Condition)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require a field to equal a value
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push((field.into(), Condition::Eq(value.into())));
        self
    }

    /// Require a field to be one of the given values
    pub fn any_of(mut self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.conditions
            .push((field.into(), Condition::AnyOf(values)));
        self
    }

    /// Whether a document satisfies every condition
    pub fn matches(&self, doc: &Value) -> bool {
        self.conditions
            .iter()
            .all(|(field, condition)| condition.matches(doc.get(field)))
    }
}

/// Record store contract
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a record, replacing any record with the same key
    async fn insert(&self, record: Value) -> Result<()>;

    /// Point lookup by key value
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Fetch all records matching the filter (all records when `None`)
    async fn query(&self, filter: Option<&Filter>) -> Result<Vec<Value>>;

    /// Merge fields into the record with the given key, creating it if
    /// it does not exist
    async fn update(&self, key: &str, fields: Map<String, Value>) -> Result<()>;
}

fn key_of<'a>(key_attr: &str, record: &'a Value) -> Result<&'a str> {
    record
        .get(key_attr)
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("record is missing key attribute '{}'", key_attr))
}

fn merge_fields(doc: &mut Value, fields: Map<String, Value>) {
    if let Some(object) = doc.as_object_mut() {
        for (field, value) in fields {
            object.insert(field, value);
        }
    }
}

/// In-memory record store, for tests and embedding
pub struct MemoryRecordStore {
    key_attr: String,
    records: Mutex<Vec<Value>>,
}

impl MemoryRecordStore {
    pub fn new(key_attr: impl Into<String>) -> Self {
        Self {
            key_attr: key_attr.into(),
            records: Mutex::new(Vec::new()),
        }
    }

    /// Seed a record without going through the async trait
    pub fn seed(&self, record: Value) {
        self.records.lock().expect("poisoned").push(record);
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn insert(&self, record: Value) -> Result<()> {
        let key = key_of(&self.key_attr, &record)?.to_string();
        let mut records = self.records.lock().expect("poisoned");
        records.retain(|r| r.get(&self.key_attr).and_then(Value::as_str) != Some(key.as_str()));
        records.push(record);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let records = self.records.lock().expect("poisoned");
        Ok(records
            .iter()
            .find(|r| r.get(&self.key_attr).and_then(Value::as_str) == Some(key))
            .cloned())
    }

    async fn query(&self, filter: Option<&Filter>) -> Result<Vec<Value>> {
        let records = self.records.lock().expect("poisoned");
        Ok(records
            .iter()
            .filter(|r| filter.map(|f| f.matches(r)).unwrap_or(true))
            .cloned()
            .collect())
    }

    async fn update(&self, key: &str, fields: Map<String, Value>) -> Result<()> {
        let mut records = self.records.lock().expect("poisoned");
        if let Some(doc) = records
            .iter_mut()
            .find(|r| r.get(&self.key_attr).and_then(Value::as_str) == Some(key))
        {
            merge_fields(doc, fields);
        } else {
            let mut doc = Map::new();
            doc.insert(self.key_attr.clone(), Value::String(key.to_string()));
            let mut value = Value::Object(doc);
            merge_fields(&mut value, fields);
            records.push(value);
        }
        Ok(())
    }
}

/// File-backed record store: one JSON document per key under a directory
pub struct FsRecordStore {
    key_attr: String,
    dir: PathBuf,
}

impl FsRecordStore {
    pub fn new(dir: impl Into<PathBuf>, key_attr: impl Into<String>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            key_attr: key_attr.into(),
            dir,
        })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // keys may contain path separators (repo names do not, but be safe)
        let safe: String = key
            .chars()
            .map(|c| if c == '/' || c == '\\' { '_' } else { c })
            .collect();
        self.dir.join(format!("{}.json", safe))
    }

    fn read_doc(&self, path: &Path) -> Result<Value> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn write_doc(&self, path: &Path, doc: &Value) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(doc)?)?;
        Ok(())
    }
}

#[async_trait]
impl RecordStore for FsRecordStore {
    async fn insert(&self, record: Value) -> Result<()> {
        let key = key_of(&self.key_attr, &record)?;
        let path = self.path_for(key);
        debug!("Writing record {} to {:?}", key, path);
        self.write_doc(&path, &record)
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(self.read_doc(&path)?))
    }

    async fn query(&self, filter: Option<&Filter>) -> Result<Vec<Value>> {
        let mut results = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let doc = self.read_doc(&path)?;
            if filter.map(|f| f.matches(&doc)).unwrap_or(true) {
                results.push(doc);
            }
        }
        Ok(results)
    }

    async fn update(&self, key: &str, fields: Map<String, Value>) -> Result<()> {
        let path = self.path_for(key);
        let mut doc = if path.exists() {
            self.read_doc(&path)?
        } else {
            let mut object = Map::new();
            object.insert(self.key_attr.clone(), Value::String(key.to_string()));
            Value::Object(object)
        };
        merge_fields(&mut doc, fields);
        self.write_doc(&path, &doc)
    }
}
