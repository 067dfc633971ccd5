use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::info;

use crate::error::PipelineError;
use crate::model::{CellValue, NormalizedRow};
use crate::schema::TableSchema;

/// Append normalized rows to the table's CSV output.
///
/// Column order is the schema's declared order; row keys outside the schema
/// are dropped and declared columns absent from a row are written empty. The
/// full intended content is built in a scratch file in the destination
/// directory and moved over the output in one rename, so an interrupted run
/// leaves either the pre-run file or the fully-appended one. Two processes
/// racing the read-then-replace sequence can still lose one side's rows; a
/// lock held across the whole sequence would be needed to close that.
pub fn append_rows(
    output_dir: &Path,
    schema: &TableSchema,
    rows: &[NormalizedRow],
) -> Result<usize, PipelineError> {
    if rows.is_empty() {
        return Ok(0);
    }

    let path = table_path(output_dir, &schema.table_name);
    let mut content = match read_existing(&path, &schema.table_name)? {
        Some(existing) => {
            let mut existing = existing;
            if !existing.ends_with('\n') {
                existing.push('\n');
            }
            existing
        }
        None => {
            let mut header = render_record(
                &schema
                    .column_names()
                    .iter()
                    .map(|name| CellValue::Text((*name).to_string()))
                    .collect::<Vec<CellValue>>(),
            );
            header.push('\n');
            header
        }
    };

    for row in rows {
        let record = schema
            .columns
            .iter()
            .map(|column| {
                row.get(&column.name)
                    .cloned()
                    .unwrap_or(CellValue::Null)
            })
            .collect::<Vec<CellValue>>();
        content.push_str(&render_record(&record));
        content.push('\n');
    }

    replace_file(&path, output_dir, &content, &schema.table_name)?;

    info!(
        table = %schema.table_name,
        rows = rows.len(),
        path = %path.display(),
        "appended rows"
    );

    Ok(rows.len())
}

pub fn table_path(output_dir: &Path, table_name: &str) -> PathBuf {
    output_dir.join(format!("{table_name}.csv"))
}

fn read_existing(path: &Path, table: &str) -> Result<Option<String>, PipelineError> {
    if !path.exists() {
        return Ok(None);
    }

    fs::read_to_string(path)
        .map(Some)
        .map_err(|source| storage_error(table, source))
}

fn replace_file(
    path: &Path,
    output_dir: &Path,
    content: &str,
    table: &str,
) -> Result<(), PipelineError> {
    let mut scratch =
        NamedTempFile::new_in(output_dir).map_err(|source| storage_error(table, source))?;
    scratch
        .write_all(content.as_bytes())
        .map_err(|source| storage_error(table, source))?;
    scratch
        .persist(path)
        .map_err(|err| storage_error(table, err.error))?;
    Ok(())
}

fn storage_error(table: &str, source: std::io::Error) -> PipelineError {
    PipelineError::StorageWrite {
        table: table.to_string(),
        source,
    }
}

fn render_record(cells: &[CellValue]) -> String {
    cells
        .iter()
        .map(render_cell)
        .collect::<Vec<String>>()
        .join(",")
}

fn render_cell(cell: &CellValue) -> String {
    match cell {
        CellValue::Null => String::new(),
        CellValue::Number(number) => format!("{number}"),
        CellValue::Text(text) => escape_csv_cell(text),
    }
}

fn escape_csv_cell(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
