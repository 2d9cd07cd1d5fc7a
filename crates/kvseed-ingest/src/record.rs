//! Record types flowing through the pipeline

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::HashMap;

/// One raw row as read from a partition.
///
/// `offset` is the zero-based position of the row within its partition,
/// header excluded. A `None` field means the cell was absent from the row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub offset: u64,
    pub fields: HashMap<String, Option<String>>,
}

impl RawRecord {
    pub fn new(offset: u64) -> Self {
        Self {
            offset,
            fields: HashMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), Some(value.into()));
        self
    }

    /// Cell value for a source header, if present
    pub fn get(&self, header: &str) -> Option<&str> {
        self.fields.get(header).and_then(|v| v.as_deref())
    }
}

/// A cleaned field value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Integer(i64),
    Text(String),
    List(Vec<String>),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// A record after header normalization and value cleaning.
///
/// Fields keep source column order so the serialized JSON object mirrors
/// the input file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedRecord {
    fields: Vec<(String, FieldValue)>,
}

impl NormalizedRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a field. Replacement keeps the original position.
    pub fn insert(&mut self, name: impl Into<String>, value: FieldValue) {
        let name = name.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }
}

impl Serialize for NormalizedRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// A unit of work for the transport: namespaced key plus JSON payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadItem {
    pub key: String,
    pub payload: Vec<u8>,
    /// Offset of the originating row within its partition
    pub offset: u64,
}

impl UploadItem {
    /// Build the item for a cleaned record. The key is `prefix + key`.
    pub fn build(
        prefix: &str,
        key: &str,
        record: &NormalizedRecord,
        offset: u64,
    ) -> serde_json::Result<Self> {
        Ok(Self {
            key: format!("{prefix}{key}"),
            payload: serde_json::to_vec(record)?,
            offset,
        })
    }

    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Leading characters of the payload, for dry-run previews
    pub fn preview(&self, max_chars: usize) -> String {
        String::from_utf8_lossy(&self.payload)
            .chars()
            .take(max_chars)
            .collect()
    }
}
