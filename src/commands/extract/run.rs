use anyhow::{Context, Result};
use chrono::Utc;
use reqwest::blocking::Client;
use tracing::{info, warn};

use crate::cli::ExtractArgs;
use crate::config::AppConfig;
use crate::model::{ExtractRunManifest, NormalizedRow, TableOutcome};
use crate::pdf_text::{self, PageRange};
use crate::schema::{load_schemas, SchemaSet};
use crate::util::{now_utc_string, utc_compact_string, write_json_pretty};

use super::identity::{HashIdentityAssigner, IdentityAssigner};
use super::normalize::ResponseNormalizer;
use super::request::request_table;
use super::store::append_rows;

pub fn run(args: ExtractArgs) -> Result<()> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("extract-{}", utc_compact_string(started_ts));

    let config = AppConfig::from_env(&args.model_id, &args.output_dir)?;
    let schemas = load_schemas(&args.schema_path)?;

    let page_range = args
        .pages
        .as_deref()
        .map(PageRange::parse)
        .transpose()
        .context("invalid --pages value")?;

    let source_name = args
        .pdf_path
        .file_name()
        .and_then(|name| name.to_str())
        .map(ToOwned::to_owned)
        .with_context(|| format!("invalid UTF-8 filename: {}", args.pdf_path.display()))?;

    info!(
        document = %source_name,
        run_id = %run_id,
        model_id = %config.model_id,
        "starting extraction"
    );

    // Extracted once; every table call reuses the same text.
    let source_text = pdf_text::extract_text(&args.pdf_path, page_range)?;

    let table_names: Vec<String> = match &args.table {
        Some(table) => vec![table.clone()],
        None => schemas
            .table_names()
            .into_iter()
            .map(ToOwned::to_owned)
            .collect(),
    };

    let normalizer = ResponseNormalizer::new()?;
    let assigner = HashIdentityAssigner;
    let client = Client::new();

    let mut outcomes = Vec::<TableOutcome>::with_capacity(table_names.len());
    let mut warnings = Vec::<String>::new();

    for table_name in &table_names {
        let outcome = process_table(
            &client,
            &config,
            &normalizer,
            &assigner,
            &schemas,
            &source_text,
            &source_name,
            table_name,
        );

        if let Some(failure) = &outcome.failure {
            warnings.push(format!("{table_name}: {failure}"));
        }
        outcomes.push(outcome);
    }

    let tables_succeeded = outcomes.iter().filter(|outcome| outcome.ok).count();
    let rows_total: usize = outcomes.iter().map(|outcome| outcome.rows_written).sum();

    let manifest = ExtractRunManifest {
        manifest_version: 1,
        run_id: run_id.clone(),
        generated_at: started_at,
        document: source_name.clone(),
        model_id: config.model_id.clone(),
        page_range: args.pages.clone(),
        source_text_chars: source_text.len(),
        tables_attempted: table_names.len(),
        tables_succeeded,
        outcomes,
        warnings,
    };

    let manifest_path = args
        .output_dir
        .join("manifests")
        .join(format!("extract_run_{}.json", utc_compact_string(started_ts)));
    write_json_pretty(&manifest_path, &manifest)?;

    info!(path = %manifest_path.display(), "wrote extraction run manifest");
    info!(
        document = %source_name,
        tables_attempted = table_names.len(),
        tables_succeeded,
        rows_total,
        "extraction completed"
    );

    Ok(())
}

/// One table, fully contained: any failure is logged and reported in the
/// outcome so the remaining tables still run.
#[allow(clippy::too_many_arguments)]
fn process_table(
    client: &Client,
    config: &AppConfig,
    normalizer: &ResponseNormalizer,
    assigner: &dyn IdentityAssigner,
    schemas: &SchemaSet,
    source_text: &str,
    source_name: &str,
    table_name: &str,
) -> TableOutcome {
    let raw = match request_table(client, config, source_text, table_name, schemas) {
        Ok(raw) => raw,
        Err(err) => {
            warn!(table = %table_name, error = %err, "extraction request failed");
            return failed_outcome(table_name, err.to_string());
        }
    };

    // Unknown tables were rejected above, so the schema lookup holds.
    let Some(schema) = schemas.table(table_name) else {
        return failed_outcome(table_name, "table disappeared from schema set".to_string());
    };

    let rows: Vec<NormalizedRow> =
        match normalizer.normalize(&raw, schema, assigner, source_name) {
            Some(rows) => rows,
            None => {
                warn!(table = %table_name, "response unparseable, treating as zero rows");
                return failed_outcome(table_name, "response unparseable".to_string());
            }
        };

    match append_rows(&config.output_dir, schema, &rows) {
        Ok(rows_written) => TableOutcome {
            table_name: table_name.to_string(),
            ok: true,
            rows_written,
            failure: None,
        },
        Err(err) => {
            warn!(table = %table_name, error = %err, "row store write failed, rows lost for this run");
            failed_outcome(table_name, err.to_string())
        }
    }
}

fn failed_outcome(table_name: &str, failure: String) -> TableOutcome {
    TableOutcome {
        table_name: table_name.to_string(),
        ok: false,
        rows_written: 0,
        failure: Some(failure),
    }
}
