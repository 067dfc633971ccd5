use std::fs;
use std::path::PathBuf;

use serde_json::{json, Value};
use tempfile::TempDir;

use crate::config::AppConfig;
use crate::error::PipelineError;
use crate::model::{CellValue, NormalizedRow};
use crate::schema::{ColumnDef, ColumnType, SchemaSet, TableSchema};

use super::identity::{assign_identities, HashIdentityAssigner, IdentityAssigner};
use super::normalize::{parse_payload, ResponseNormalizer};
use super::request::{request_table, response_shape};
use super::store::{append_rows, table_path};

fn column(name: &str, column_type: ColumnType) -> ColumnDef {
    ColumnDef {
        name: name.to_string(),
        column_type,
        nullable: name != "data_source",
    }
}

fn shareholding_schema() -> TableSchema {
    TableSchema {
        table_name: "shareholding".to_string(),
        columns: vec![
            column("company_id", ColumnType::Integer),
            column("quarter", ColumnType::Text),
            column("promoter_holding_pct", ColumnType::Decimal),
            column("fii_holding_pct", ColumnType::Decimal),
            column("mf_insti_holding_pct", ColumnType::Decimal),
            column("data_source", ColumnType::Text),
        ],
    }
}

fn discussion_schema() -> TableSchema {
    TableSchema {
        table_name: "management_discussion".to_string(),
        columns: vec![
            column("discussion_id", ColumnType::Integer),
            column("company_id", ColumnType::Integer),
            column("fiscal_period", ColumnType::Text),
            column("topic", ColumnType::Text),
            column("discussion_text", ColumnType::Text),
            column("data_source", ColumnType::Text),
        ],
    }
}

fn normalizer() -> ResponseNormalizer {
    ResponseNormalizer::new().expect("patterns compile")
}

fn number(value: &Option<Value>) -> f64 {
    value
        .as_ref()
        .and_then(|v| v.as_f64())
        .expect("numeric value")
}

#[test]
fn coerces_thousand_separated_strings_to_numbers() {
    let normalizer = normalizer();
    assert_eq!(number(&normalizer.coerce_numeric_str("1,234.50")), 1234.50);
    assert_eq!(number(&normalizer.coerce_numeric_str("12,345")), 12345.0);
    assert_eq!(number(&normalizer.coerce_numeric_str("-1,234")), -1234.0);
}

#[test]
fn coerces_lakh_grouped_strings_to_numbers() {
    let normalizer = normalizer();
    assert_eq!(number(&normalizer.coerce_numeric_str("1,23,456")), 123456.0);
}

#[test]
fn single_comma_without_thousands_group_reads_as_decimal_point() {
    let normalizer = normalizer();
    assert_eq!(number(&normalizer.coerce_numeric_str("45,0")), 45.0);
}

#[test]
fn placeholder_strings_become_null() {
    let normalizer = normalizer();
    assert_eq!(normalizer.coerce_numeric_str(""), Some(Value::Null));
    assert_eq!(normalizer.coerce_numeric_str("-"), Some(Value::Null));
}

#[test]
fn non_numeric_strings_pass_through_unchanged() {
    let normalizer = normalizer();
    assert_eq!(normalizer.coerce_numeric_str("Q1 FY25"), None);
    assert_eq!(normalizer.coerce_numeric_str("BUY"), None);
    assert_eq!(normalizer.coerce_numeric_str("12.3.4"), None);
}

#[test]
fn parse_ladder_accepts_plain_json() {
    let payload = parse_payload(r#"{"rows": []}"#).expect("parses");
    assert!(payload.get("rows").is_some());
}

#[test]
fn parse_ladder_strips_markdown_fences() {
    let raw = "```json\n{\"rows\": [{\"quarter\": \"Q1\"}]}\n```";
    let payload = parse_payload(raw).expect("parses after fence strip");
    assert_eq!(payload["rows"][0]["quarter"], "Q1");
}

#[test]
fn parse_ladder_scans_for_brace_span_in_prose() {
    let raw = "Here is the extraction you asked for:\n{\"rows\": []}\nLet me know!";
    assert!(parse_payload(raw).is_some());
}

#[test]
fn unparseable_response_yields_no_rows_not_an_error() {
    let result = normalizer().normalize(
        "Sorry, I cannot process this.",
        &shareholding_schema(),
        &HashIdentityAssigner,
        "report.pdf",
    );
    assert!(result.is_none());
}

#[test]
fn fenced_response_with_grouped_numeric_is_repaired() {
    let raw = "```json\n{\"rows\": [{\"quarter\": \"Q1\", \"promoter_holding_pct\": \"45,0\"}]}\n```";
    let rows = normalizer()
        .normalize(
            raw,
            &shareholding_schema(),
            &HashIdentityAssigner,
            "report.pdf",
        )
        .expect("rows parse");

    assert_eq!(rows.len(), 1);
    assert_eq!(
        rows[0].get("promoter_holding_pct"),
        Some(&CellValue::Number(45.0))
    );
}

#[test]
fn payload_without_rows_array_is_rejected() {
    let raw = r#"{"shareholding": {"quarter": "Q1"}}"#;
    let result = normalizer().normalize(
        raw,
        &shareholding_schema(),
        &HashIdentityAssigner,
        "report.pdf",
    );
    assert!(result.is_none());
}

#[test]
fn non_object_row_elements_are_skipped() {
    let raw = r#"{"rows": [{"quarter": "Q1"}, "stray", 42]}"#;
    let rows = normalizer()
        .normalize(
            raw,
            &shareholding_schema(),
            &HashIdentityAssigner,
            "report.pdf",
        )
        .expect("rows parse");
    assert_eq!(rows.len(), 1);
}

#[test]
fn alias_fields_are_renamed_in_any_table() {
    let raw = r#"{"rows": [{"quarter": "Q1", "mf_holding_pct": 12.5}]}"#;
    let rows = normalizer()
        .normalize(
            raw,
            &shareholding_schema(),
            &HashIdentityAssigner,
            "report.pdf",
        )
        .expect("rows parse");

    assert_eq!(
        rows[0].get("mf_insti_holding_pct"),
        Some(&CellValue::Number(12.5))
    );
    assert!(rows[0].get("mf_holding_pct").is_none());

    // Same renaming applies outside the shareholding section.
    let discussion_raw =
        r#"{"rows": [{"topic": "Holdings", "institutional_holding_pct": "8.1"}]}"#;
    let discussion_rows = normalizer()
        .normalize(
            discussion_raw,
            &discussion_schema(),
            &HashIdentityAssigner,
            "report.pdf",
        )
        .expect("rows parse");
    assert_eq!(
        discussion_rows[0].get("mf_insti_holding_pct"),
        Some(&CellValue::Number(8.1))
    );
    assert!(discussion_rows[0]
        .get("institutional_holding_pct")
        .is_none());
}

#[test]
fn narrative_collapse_keeps_longest_passage_and_first_topic_line() {
    let raw = json!({
        "rows": [{
            "topic": "Q3 Update\nDetails that spill over",
            "discussion_text": [
                "Short remark.",
                "A considerably longer management commentary about the quarter.",
                "Medium length passage here."
            ]
        }]
    })
    .to_string();

    let rows = normalizer()
        .normalize(
            &raw,
            &discussion_schema(),
            &HashIdentityAssigner,
            "report.pdf",
        )
        .expect("rows parse");

    assert_eq!(rows[0].get("topic"), Some(&CellValue::Text("Q3 Update".to_string())));
    assert_eq!(
        rows[0].get("discussion_text"),
        Some(&CellValue::Text(
            "A considerably longer management commentary about the quarter.".to_string()
        ))
    );
}

#[test]
fn identity_assignment_is_deterministic_and_bounded() {
    let assigner = HashIdentityAssigner;
    let first = assigner.company_id("SP20241006120459650BATA.pdf");
    let second = assigner.company_id("SP20241006120459650BATA.pdf");
    assert_eq!(first, second);
    assert!((0.0..10_000.0).contains(&first));

    let row_a = assigner.row_id("report.pdf", "financial_results", 0);
    let row_b = assigner.row_id("report.pdf", "financial_results", 1);
    assert_ne!(row_a, row_b);
}

#[test]
fn identity_backfills_company_id_and_data_source() {
    let mut rows = vec![NormalizedRow::new()];
    rows[0].insert("quarter", CellValue::Text("Q1".to_string()));

    assign_identities(
        &mut rows,
        &HashIdentityAssigner,
        &shareholding_schema(),
        "report.pdf",
    );

    assert!(matches!(rows[0].get("company_id"), Some(CellValue::Number(_))));
    assert_eq!(
        rows[0].get("data_source"),
        Some(&CellValue::Text("report.pdf".to_string()))
    );
}

#[test]
fn identity_assigns_row_level_id_for_declared_tables() {
    let schema = discussion_schema();
    let mut rows = vec![NormalizedRow::new(), NormalizedRow::new()];

    assign_identities(&mut rows, &HashIdentityAssigner, &schema, "report.pdf");

    let first = rows[0].get("discussion_id").cloned();
    let second = rows[1].get("discussion_id").cloned();
    assert!(matches!(first, Some(CellValue::Number(_))));
    assert_ne!(first, second);
}

#[test]
fn identity_preserves_populated_identifiers() {
    let mut rows = vec![NormalizedRow::new()];
    rows[0].insert("company_id", CellValue::Number(42.0));

    assign_identities(
        &mut rows,
        &HashIdentityAssigner,
        &shareholding_schema(),
        "report.pdf",
    );

    assert_eq!(rows[0].get("company_id"), Some(&CellValue::Number(42.0)));
}

#[test]
fn response_shape_declares_rows_and_requires_data_source() {
    let shape = response_shape(&shareholding_schema());
    assert_eq!(shape["type"], "object");
    assert_eq!(shape["required"][0], "rows");

    let items = &shape["properties"]["rows"]["items"];
    assert_eq!(items["required"][0], "data_source");
    assert_eq!(items["properties"]["promoter_holding_pct"]["type"], "number");
    assert_eq!(items["properties"]["quarter"]["type"], "string");
    assert_eq!(items["properties"]["company_id"]["type"], "number");
}

#[test]
fn unknown_table_is_rejected_before_any_call() {
    let tmp = TempDir::new().expect("tempdir");
    let config = AppConfig {
        api_key: "test-key".to_string(),
        model_id: "gemini-1.5-flash".to_string(),
        output_dir: tmp.path().to_path_buf(),
    };
    let schemas = SchemaSet::from_tables(vec![shareholding_schema()]);
    let client = reqwest::blocking::Client::new();

    let result = request_table(&client, &config, "text", "no_such_table", &schemas);
    assert!(matches!(result, Err(PipelineError::UnknownTable(_))));

    // The same schema set still serves later, valid tables.
    assert!(schemas.table("shareholding").is_some());
}

fn sample_row(quarter: &str, promoter: f64) -> NormalizedRow {
    let mut row = NormalizedRow::new();
    row.insert("quarter", CellValue::Text(quarter.to_string()));
    row.insert("promoter_holding_pct", CellValue::Number(promoter));
    row.insert("data_source", CellValue::Text("report.pdf".to_string()));
    row.insert("unexpected_extra", CellValue::Text("dropped".to_string()));
    row
}

#[test]
fn store_writes_schema_columns_in_declared_order() {
    let tmp = TempDir::new().expect("tempdir");
    let schema = shareholding_schema();

    let written = append_rows(tmp.path(), &schema, &[sample_row("Q1", 45.0)]).expect("write");
    assert_eq!(written, 1);

    let content = fs::read_to_string(table_path(tmp.path(), "shareholding")).expect("read");
    let mut lines = content.lines();
    assert_eq!(
        lines.next(),
        Some("company_id,quarter,promoter_holding_pct,fii_holding_pct,mf_insti_holding_pct,data_source")
    );
    // Extra keys dropped, missing declared columns empty.
    assert_eq!(lines.next(), Some(",Q1,45,,,report.pdf"));
    assert!(!content.contains("dropped"));
}

#[test]
fn store_appends_across_runs_with_single_header() {
    let tmp = TempDir::new().expect("tempdir");
    let schema = shareholding_schema();

    append_rows(tmp.path(), &schema, &[sample_row("Q1", 45.0)]).expect("first write");
    append_rows(
        tmp.path(),
        &schema,
        &[sample_row("Q2", 44.2), sample_row("Q3", 44.0)],
    )
    .expect("second write");

    let content = fs::read_to_string(table_path(tmp.path(), "shareholding")).expect("read");
    let header_count = content
        .lines()
        .filter(|line| line.starts_with("company_id,"))
        .count();
    assert_eq!(header_count, 1);
    assert_eq!(content.lines().count(), 4);
}

#[test]
fn store_skips_file_creation_for_empty_row_sets() {
    let tmp = TempDir::new().expect("tempdir");
    let schema = shareholding_schema();

    let written = append_rows(tmp.path(), &schema, &[]).expect("no-op");
    assert_eq!(written, 0);
    assert!(!table_path(tmp.path(), "shareholding").exists());
}

#[test]
fn store_escapes_embedded_commas_and_quotes() {
    let tmp = TempDir::new().expect("tempdir");
    let schema = discussion_schema();

    let mut row = NormalizedRow::new();
    row.insert("topic", CellValue::Text("Margins, guidance".to_string()));
    row.insert(
        "discussion_text",
        CellValue::Text("Management said \"stable\" outlook".to_string()),
    );
    row.insert("data_source", CellValue::Text("report.pdf".to_string()));

    append_rows(tmp.path(), &schema, &[row]).expect("write");

    let content =
        fs::read_to_string(table_path(tmp.path(), "management_discussion")).expect("read");
    assert!(content.contains("\"Margins, guidance\""));
    assert!(content.contains("\"Management said \"\"stable\"\" outlook\""));
}

#[test]
fn normalized_pipeline_row_survives_store_roundtrip() {
    let tmp = TempDir::new().expect("tempdir");
    let schema = shareholding_schema();
    let raw = "```json\n{\"rows\": [{\"quarter\": \"Q1\", \"promoter_holding_pct\": \"1,234.50\", \"mf_holding_pct\": \"12.5\"}]}\n```";

    let rows = normalizer()
        .normalize(raw, &schema, &HashIdentityAssigner, "report.pdf")
        .expect("rows parse");
    append_rows(tmp.path(), &schema, &rows).expect("write");

    let content = fs::read_to_string(table_path(tmp.path(), "shareholding")).expect("read");
    let data_line = content.lines().nth(1).expect("data row");
    assert!(data_line.contains("1234.5"));
    assert!(data_line.contains("12.5"));
    assert!(data_line.ends_with("report.pdf"));
}

#[test]
fn output_path_is_table_name_csv() {
    assert_eq!(
        table_path(&PathBuf::from("output_csvs"), "key_ratios"),
        PathBuf::from("output_csvs/key_ratios.csv")
    );
}
