//! Header normalization, value cleaning and key extraction
//!
//! A [`RecordTransformer`] is bound once per partition to that partition's
//! header row, producing a [`PartitionSchema`]. Each raw row is then turned
//! into a key plus a [`NormalizedRecord`]:
//!
//! - headers are lower-cased and every run of non-alphanumerics becomes `_`
//! - cells are trimmed (ideographic space included); empty cells and `*`
//!   become null
//! - integer-looking cells (`-?[0-9]+`, thousands commas and full-width
//!   digits allowed) become integers, except in the key column and list
//!   columns
//! - list columns are split on `;`, `，` or `、` when splitting is enabled

use crate::record::{FieldValue, NormalizedRecord, RawRecord};
use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

/// Source header holding the record key
pub const DEFAULT_KEY_FIELD: &str = "KEY_CODE";

/// Field treated as a delimited list
pub const DEFAULT_LIST_FIELD: &str = "htksaki";

/// Separators recognized inside list fields
pub const LIST_SEPARATORS: [char; 3] = [';', '，', '、'];

/// Marker used by the source data for "no value"
const NULL_MARKER: &str = "*";

#[allow(clippy::expect_used)]
static NON_ALNUM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^0-9a-z]+").expect("valid header pattern"));

#[allow(clippy::expect_used)]
static INTEGER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?[0-9]+$").expect("valid integer pattern"));

/// Normalize a header name: trim, lower-case, collapse runs of
/// non-alphanumeric characters to `_`.
pub fn normalize_header(header: &str) -> String {
    let lowered = header.trim().to_lowercase();
    NON_ALNUM.replace_all(&lowered, "_").into_owned()
}

/// Clean a raw cell. Returns `None` for absent, blank or `*` cells.
pub fn clean_value(raw: Option<&str>) -> Option<String> {
    let trimmed = raw?.trim();
    if trimmed.is_empty() || trimmed == NULL_MARKER {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Parse an integer-looking cell. Thousands commas are ignored and
/// full-width digits count as digits; anything outside `i64` stays text.
pub fn parse_integer(value: &str) -> Option<i64> {
    let compact: String = value
        .chars()
        .filter(|&c| c != ',')
        .map(ascii_digit)
        .collect();
    if INTEGER.is_match(&compact) {
        compact.parse().ok()
    } else {
        None
    }
}

/// Split a list cell on the list separators, dropping empty parts
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(|c| LIST_SEPARATORS.contains(&c))
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

/// Transformer settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformConfig {
    /// Header holding the key, matched case-insensitively
    pub key_field: String,
    /// Fields treated as lists, matched after normalization
    pub list_fields: Vec<String>,
    /// Split list fields into arrays instead of keeping the raw text
    pub split_lists: bool,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            key_field: DEFAULT_KEY_FIELD.to_string(),
            list_fields: vec![DEFAULT_LIST_FIELD.to_string()],
            split_lists: false,
        }
    }
}

/// Per-item data errors. These fail the item, never the run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
    #[error("missing key: column '{0}' is empty")]
    MissingKey(String),

    #[error("missing key: partition has no header")]
    NoHeader,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Key,
    List,
    Scalar,
}

#[derive(Debug, Clone)]
struct Column {
    source: String,
    name: String,
    kind: ColumnKind,
}

/// Column layout of one partition
#[derive(Debug, Clone)]
pub struct PartitionSchema {
    columns: Vec<Column>,
    key_header: Option<String>,
}

impl PartitionSchema {
    /// Source header the key is read from
    pub fn key_header(&self) -> Option<&str> {
        self.key_header.as_deref()
    }

    /// Normalized column names in source order
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

/// Turns raw rows into keyed, cleaned records
#[derive(Debug, Clone)]
pub struct RecordTransformer {
    config: TransformConfig,
    list_names: Vec<String>,
}

impl RecordTransformer {
    pub fn new(config: TransformConfig) -> Self {
        let list_names = config
            .list_fields
            .iter()
            .map(|f| compact_name(&normalize_header(f)))
            .collect();
        Self { config, list_names }
    }

    pub fn config(&self) -> &TransformConfig {
        &self.config
    }

    /// Resolve the column layout for a partition's header row.
    ///
    /// The key column is the header equal to the configured key field
    /// (case-insensitive), falling back to the first header.
    pub fn bind(&self, headers: &[String]) -> PartitionSchema {
        let key_header = headers
            .iter()
            .find(|h| h.trim().eq_ignore_ascii_case(self.config.key_field.trim()))
            .or_else(|| headers.first())
            .cloned();

        let columns = headers
            .iter()
            .map(|source| {
                let name = normalize_header(source);
                let kind = if Some(source) == key_header.as_ref() {
                    ColumnKind::Key
                } else if self.list_names.contains(&compact_name(&name)) {
                    ColumnKind::List
                } else {
                    ColumnKind::Scalar
                };
                Column {
                    source: source.clone(),
                    name,
                    kind,
                }
            })
            .collect();

        PartitionSchema {
            columns,
            key_header,
        }
    }

    /// Transform one row into `(key, record)`. The key is the cleaned key
    /// cell without any namespace prefix.
    pub fn transform(
        &self,
        schema: &PartitionSchema,
        raw: &RawRecord,
    ) -> Result<(String, NormalizedRecord), TransformError> {
        let key_header = schema.key_header().ok_or(TransformError::NoHeader)?;
        let key = clean_value(raw.get(key_header))
            .ok_or_else(|| TransformError::MissingKey(key_header.to_string()))?;

        let mut record = NormalizedRecord::new();
        for column in &schema.columns {
            let cleaned = clean_value(raw.get(&column.source));
            let value = match (column.kind, cleaned) {
                (_, None) => FieldValue::Null,
                (ColumnKind::Key, Some(text)) => FieldValue::Text(text),
                (ColumnKind::List, Some(text)) => {
                    if self.config.split_lists {
                        FieldValue::List(split_list(&text))
                    } else {
                        FieldValue::Text(text)
                    }
                },
                (ColumnKind::Scalar, Some(text)) => match parse_integer(&text) {
                    Some(n) => FieldValue::Integer(n),
                    None => FieldValue::Text(text),
                },
            };
            record.insert(column.name.clone(), value);
        }

        Ok((key, record))
    }
}

impl Default for RecordTransformer {
    fn default() -> Self {
        Self::new(TransformConfig::default())
    }
}

// U+FF10..=U+FF19 map to '0'..='9'
fn ascii_digit(c: char) -> char {
    match c {
        '\u{ff10}'..='\u{ff19}' => {
            char::from_u32(u32::from(c) - 0xff10 + u32::from('0')).unwrap_or(c)
        },
        _ => c,
    }
}

// "htk_saki" and "htksaki" name the same field
fn compact_name(name: &str) -> String {
    name.replace('_', "")
}
