use anyhow::{Context, Result};
use regex::Regex;
use serde_json::Value;
use tracing::warn;

use crate::model::{CellValue, NormalizedRow};
use crate::schema::TableSchema;

use super::identity::{assign_identities, IdentityAssigner};

/// Observed synonym spellings mapped to the canonical column name. Applied
/// to every row of every table.
const FIELD_ALIASES: [(&str, &str); 3] = [
    ("mfi_instl_holding_pct", "mf_insti_holding_pct"),
    ("mf_holding_pct", "mf_insti_holding_pct"),
    ("institutional_holding_pct", "mf_insti_holding_pct"),
];

const NARRATIVE_TABLE: &str = "management_discussion";

/// Turns a raw model response into normalized rows, absorbing the fenced,
/// truncated, and inconsistently-typed variants the service produces.
pub struct ResponseNormalizer {
    plain: Regex,
    grouped: Regex,
    multi_grouped: Regex,
    decimal_comma: Regex,
}

impl ResponseNormalizer {
    pub fn new() -> Result<Self> {
        Ok(Self {
            plain: Regex::new(r"^-?\d+(\.\d+)?$").context("failed to compile plain pattern")?,
            grouped: Regex::new(r"^-?\d{1,3}(,\d{3})+(\.\d+)?$")
                .context("failed to compile grouped pattern")?,
            multi_grouped: Regex::new(r"^-?\d+(,\d+){2,}(\.\d+)?$")
                .context("failed to compile multi-grouped pattern")?,
            decimal_comma: Regex::new(r"^-?\d+,\d+$")
                .context("failed to compile decimal-comma pattern")?,
        })
    }

    /// Returns `None` when no parse strategy produced a usable payload;
    /// callers treat that as zero rows for the table, never as fatal.
    pub fn normalize(
        &self,
        raw: &str,
        schema: &TableSchema,
        assigner: &dyn IdentityAssigner,
        source_name: &str,
    ) -> Option<Vec<NormalizedRow>> {
        let mut payload = parse_payload(raw)?;

        let row_values = take_rows(&mut payload, &schema.table_name)?;

        let mut rows = Vec::<NormalizedRow>::with_capacity(row_values.len());
        for mut value in row_values {
            if !value.is_object() {
                warn!(table = %schema.table_name, "skipping non-object row element");
                continue;
            }

            self.coerce_numeric_values(&mut value);
            if schema.table_name == NARRATIVE_TABLE {
                collapse_narrative(&mut value);
            }
            rename_aliases(&mut value);

            let Some(object) = value.as_object() else {
                continue;
            };
            let mut row = NormalizedRow::new();
            for (key, cell) in object {
                row.insert(key.clone(), CellValue::from_json(cell));
            }
            rows.push(row);
        }

        assign_identities(&mut rows, assigner, schema, source_name);

        Some(rows)
    }

    /// Depth-first rewrite of numeric-looking strings into numbers and of
    /// missing-value placeholders into nulls.
    fn coerce_numeric_values(&self, value: &mut Value) {
        match value {
            Value::Object(map) => {
                for entry in map.values_mut() {
                    self.coerce_numeric_values(entry);
                }
            }
            Value::Array(items) => {
                for item in items {
                    self.coerce_numeric_values(item);
                }
            }
            Value::String(text) => {
                if let Some(rewritten) = self.coerce_numeric_str(text) {
                    *value = rewritten;
                }
            }
            _ => {}
        }
    }

    /// `Some(value)` when the string should be rewritten; `None` passes the
    /// string through unchanged. Numeric-looking identifier strings are
    /// rewritten too, an accepted tradeoff rather than a bug.
    pub(super) fn coerce_numeric_str(&self, text: &str) -> Option<Value> {
        let trimmed = text.trim();
        if trimmed.is_empty() || trimmed == "-" {
            return Some(Value::Null);
        }

        if self.plain.is_match(trimmed) {
            return number_value(trimmed.parse::<f64>().ok()?);
        }

        // Separator-grouped forms, including lakh/crore grouping, strip to
        // their digit runs.
        if self.grouped.is_match(trimmed) || self.multi_grouped.is_match(trimmed) {
            let stripped = trimmed.replace(',', "");
            return number_value(stripped.parse::<f64>().ok()?);
        }

        // A lone comma whose groups do not form a thousands pattern reads as
        // a decimal comma: "45,0" is 45.0, not 450.
        if self.decimal_comma.is_match(trimmed) {
            let rewritten = trimmed.replacen(',', ".", 1);
            return number_value(rewritten.parse::<f64>().ok()?);
        }

        None
    }
}

fn number_value(value: f64) -> Option<Value> {
    serde_json::Number::from_f64(value).map(Value::Number)
}

/// Ordered parse ladder: direct parse, fence-stripped parse, then the first
/// top-level brace-delimited substring. First success wins.
pub(super) fn parse_payload(raw: &str) -> Option<Value> {
    parse_direct(raw)
        .or_else(|| parse_fence_stripped(raw))
        .or_else(|| parse_brace_span(raw))
}

fn parse_direct(raw: &str) -> Option<Value> {
    serde_json::from_str(raw.trim()).ok()
}

fn parse_fence_stripped(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    let rest = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))?;
    let inner = rest.trim_start_matches(['\r', '\n']);
    let inner = inner.strip_suffix("```").unwrap_or(inner);
    serde_json::from_str(inner.trim()).ok()
}

fn parse_brace_span(raw: &str) -> Option<Value> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(raw[start..=end].trim()).ok()
}

/// Shape validation: the payload must be an object carrying a `rows` array.
fn take_rows(payload: &mut Value, table_name: &str) -> Option<Vec<Value>> {
    let rows = payload
        .as_object_mut()
        .and_then(|object| object.remove("rows"));

    match rows {
        Some(Value::Array(items)) => Some(items),
        _ => {
            warn!(table = %table_name, "response payload has no rows array");
            None
        }
    }
}

/// Keep only the longest candidate passage and the first line of the topic.
fn collapse_narrative(row: &mut Value) {
    let Some(object) = row.as_object_mut() else {
        return;
    };

    if let Some(discussion) = object.get_mut("discussion_text") {
        if let Value::Array(candidates) = discussion {
            let longest = candidates
                .iter()
                .filter_map(|candidate| candidate.as_str())
                .max_by_key(|candidate| candidate.chars().count())
                .map(ToOwned::to_owned)
                .unwrap_or_default();
            *discussion = Value::String(longest);
        }
    }

    if let Some(topic) = object.get_mut("topic") {
        if let Some(text) = topic.as_str() {
            if let Some((first_line, _)) = text.split_once('\n') {
                *topic = Value::String(first_line.to_string());
            }
        }
    }
}

fn rename_aliases(row: &mut Value) {
    let Some(object) = row.as_object_mut() else {
        return;
    };

    for (alias, canonical) in FIELD_ALIASES {
        if let Some(value) = object.remove(alias) {
            object.entry(canonical.to_string()).or_insert(value);
        }
    }
}
