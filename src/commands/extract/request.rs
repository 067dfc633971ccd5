use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::AppConfig;
use crate::error::PipelineError;
use crate::schema::{SchemaSet, TableSchema};

const GENERATE_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Low temperature biases the service toward structural compliance over
/// variety.
const TEMPERATURE: f64 = 0.1;

/// One outbound call per invocation; no retry or backoff here. A transport
/// failure, non-success status, or empty candidate surfaces as
/// `ExtractionFailed`, which the caller treats as zero rows for the table.
pub fn request_table(
    client: &Client,
    config: &AppConfig,
    source_text: &str,
    table_name: &str,
    schemas: &SchemaSet,
) -> Result<String, PipelineError> {
    let schema = schemas
        .table(table_name)
        .ok_or_else(|| PipelineError::UnknownTable(table_name.to_string()))?;

    let body = build_request_body(schema, source_text);
    let url = format!(
        "{}/{}:generateContent",
        GENERATE_ENDPOINT, config.model_id
    );

    let response = client
        .post(&url)
        .header("x-goog-api-key", &config.api_key)
        .json(&body)
        .send()
        .map_err(|err| extraction_failed(table_name, err.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let detail = response.text().unwrap_or_default();
        return Err(extraction_failed(
            table_name,
            format!("service returned {status}: {detail}"),
        ));
    }

    let parsed: GenerateContentResponse = response
        .json()
        .map_err(|err| extraction_failed(table_name, format!("undecodable response: {err}")))?;

    candidate_text(&parsed)
        .ok_or_else(|| extraction_failed(table_name, "response carried no candidate text".into()))
}

fn extraction_failed(table: &str, reason: String) -> PipelineError {
    PipelineError::ExtractionFailed {
        table: table.to_string(),
        reason,
    }
}

fn build_request_body(schema: &TableSchema, source_text: &str) -> Value {
    let prompt = build_instruction(schema);

    json!({
        "contents": [{
            "role": "user",
            "parts": [{
                "text": format!("{prompt}\n\nExtract data from this text:\n{source_text}")
            }]
        }],
        "generationConfig": {
            "temperature": TEMPERATURE,
            "responseMimeType": "application/json",
            "responseSchema": response_shape(schema),
        }
    })
}

fn build_instruction(schema: &TableSchema) -> String {
    format!(
        "Extract every '{}' record from the given equity research report text.\n\
         IMPORTANT:\n\
         1. Do NOT use commas or any thousands separators in numeric values.\n\
         2. Use null for missing numeric values, never an empty string.\n\
         3. Return one row for EVERY occurrence of the record in the text, \
         not only the first.\n\
         4. All numeric values must be plain numbers without formatting.",
        schema.table_name
    )
}

/// The structural constraint sent with the request: an object holding a
/// `rows` array whose elements allow exactly the table's declared columns,
/// with `data_source` always required.
pub fn response_shape(schema: &TableSchema) -> Value {
    let mut properties = serde_json::Map::new();
    for column in &schema.columns {
        properties.insert(
            column.name.clone(),
            json!({
                "type": column.column_type.response_type(),
                "nullable": column.nullable,
            }),
        );
    }

    json!({
        "type": "object",
        "properties": {
            "rows": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": properties,
                    "required": ["data_source"],
                }
            }
        },
        "required": ["rows"],
    })
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

fn candidate_text(response: &GenerateContentResponse) -> Option<String> {
    let text = response
        .candidates
        .first()?
        .content
        .as_ref()?
        .parts
        .iter()
        .filter_map(|part| part.text.as_deref())
        .collect::<Vec<&str>>()
        .join("");

    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}
