use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

/// The only value kinds a normalized row may hold.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Number(f64),
    Text(String),
}

impl CellValue {
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Number(number) => number
                .as_f64()
                .map(Self::Number)
                .unwrap_or(Self::Null),
            Value::String(text) => Self::Text(text.clone()),
            Value::Bool(flag) => Self::Text(flag.to_string()),
            // Nested structures surviving normalization are stored verbatim.
            other => Self::Text(other.to_string()),
        }
    }
}

/// One extracted record keyed by canonical column name. Unknown-key and
/// missing-key policies are applied by the row store, not here.
#[derive(Debug, Clone, Default)]
pub struct NormalizedRow {
    values: HashMap<String, CellValue>,
}

impl NormalizedRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: CellValue) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&CellValue> {
        self.values.get(name)
    }

    /// True when the column is absent, null, or an empty string.
    pub fn is_blank(&self, name: &str) -> bool {
        match self.values.get(name) {
            None | Some(CellValue::Null) => true,
            Some(CellValue::Text(text)) => text.is_empty(),
            Some(CellValue::Number(_)) => false,
        }
    }
}

/// Per-table outcome reported by a document run.
#[derive(Debug, Clone, Serialize)]
pub struct TableOutcome {
    pub table_name: String,
    pub ok: bool,
    pub rows_written: usize,
    pub failure: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub generated_at: String,
    pub document: String,
    pub model_id: String,
    pub page_range: Option<String>,
    pub source_text_chars: usize,
    pub tables_attempted: usize,
    pub tables_succeeded: usize,
    pub outcomes: Vec<TableOutcome>,
    pub warnings: Vec<String>,
}
