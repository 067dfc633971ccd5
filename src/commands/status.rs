use std::fs;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::commands::extract::table_path;
use crate::schema::load_schemas;

pub fn run(args: StatusArgs) -> Result<()> {
    let schemas = load_schemas(&args.schema_path)?;

    info!(output_dir = %args.output_dir.display(), "status requested");

    let mut rows_total = 0_usize;
    for table in schemas.tables() {
        let path = table_path(&args.output_dir, &table.table_name);
        if !path.exists() {
            warn!(table = %table.table_name, path = %path.display(), "output file missing");
            continue;
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let records = count_records(&content).saturating_sub(1);
        rows_total += records;

        info!(
            table = %table.table_name,
            rows = records,
            path = %path.display(),
            "output file status"
        );
    }

    info!(rows_total, "status completed");

    Ok(())
}

/// Record count that ignores newlines inside quoted fields.
fn count_records(content: &str) -> usize {
    let mut records = 0_usize;
    let mut in_quotes = false;
    let mut line_has_content = false;

    for character in content.chars() {
        match character {
            '"' => {
                in_quotes = !in_quotes;
                line_has_content = true;
            }
            '\n' if !in_quotes => {
                if line_has_content {
                    records += 1;
                }
                line_has_content = false;
            }
            '\r' => {}
            _ => line_has_content = true,
        }
    }

    if line_has_content {
        records += 1;
    }

    records
}
