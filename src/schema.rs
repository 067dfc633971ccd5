use std::fs;
use std::path::Path;

use crate::error::PipelineError;

/// Declared type of an output column, mapped from the schema source's SQL-ish
/// type tokens. Drives both the response-shape type sent to the generative
/// service and numeric handling downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Decimal,
    Text,
}

impl ColumnType {
    pub fn response_type(self) -> &'static str {
        match self {
            Self::Integer | Self::Decimal => "number",
            Self::Text => "string",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ColumnDef {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
}

/// Ordered column list for one output table. Column order is declaration
/// order and determines both the response shape and the CSV column order.
#[derive(Debug, Clone)]
pub struct TableSchema {
    pub table_name: String,
    pub columns: Vec<ColumnDef>,
}

impl TableSchema {
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|column| column.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|column| column.name == name)
    }
}

/// Immutable table-definition map, loaded once per process.
#[derive(Debug, Clone)]
pub struct SchemaSet {
    tables: Vec<TableSchema>,
}

impl SchemaSet {
    #[cfg(test)]
    pub fn from_tables(tables: Vec<TableSchema>) -> Self {
        Self { tables }
    }

    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|table| table.table_name == name)
    }

    pub fn tables(&self) -> &[TableSchema] {
        &self.tables
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.tables
            .iter()
            .map(|table| table.table_name.as_str())
            .collect()
    }
}

const CONSTRAINT_KEYWORDS: [&str; 6] =
    ["PRIMARY", "FOREIGN", "UNIQUE", "CONSTRAINT", "CHECK", "KEY"];

pub fn load_schemas(path: &Path) -> Result<SchemaSet, PipelineError> {
    let source = fs::read_to_string(path).map_err(|err| PipelineError::SchemaParse {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;

    let tables = parse_schema_source(&source);
    if tables.is_empty() {
        return Err(PipelineError::SchemaParse {
            path: path.to_path_buf(),
            reason: "no table definitions found".to_string(),
        });
    }

    Ok(SchemaSet { tables })
}

fn parse_schema_source(source: &str) -> Vec<TableSchema> {
    let mut tables = Vec::<TableSchema>::new();
    let mut current: Option<TableSchema> = None;

    for raw_line in source.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with("--") {
            continue;
        }

        if let Some(table_name) = parse_table_start(line) {
            current = Some(TableSchema {
                table_name,
                columns: Vec::new(),
            });
            continue;
        }

        if is_block_end(line) {
            if let Some(mut table) = current.take() {
                if !table.columns.is_empty() {
                    ensure_data_source_column(&mut table);
                    tables.push(table);
                }
            }
            continue;
        }

        let Some(table) = current.as_mut() else {
            continue;
        };

        if let Some(column) = parse_column_line(line) {
            table.columns.push(column);
        }
    }

    tables
}

/// Every output row must carry its source document; a definition that omits
/// the column still gets it, as the last column.
fn ensure_data_source_column(table: &mut TableSchema) {
    if table.column("data_source").is_none() {
        table.columns.push(ColumnDef {
            name: "data_source".to_string(),
            column_type: ColumnType::Text,
            nullable: false,
        });
    }
}

fn parse_table_start(line: &str) -> Option<String> {
    let mut tokens = line.split_whitespace();
    if !tokens.next()?.eq_ignore_ascii_case("create") {
        return None;
    }
    if !tokens.next()?.eq_ignore_ascii_case("table") {
        return None;
    }

    let name_token = tokens.next()?;
    let name = name_token.trim_end_matches('(').trim();
    if name.is_empty() {
        return None;
    }

    Some(name.to_string())
}

fn is_block_end(line: &str) -> bool {
    let compact = line
        .chars()
        .filter(|character| !character.is_whitespace())
        .collect::<String>();
    compact == ")" || compact == ");"
}

fn parse_column_line(line: &str) -> Option<ColumnDef> {
    let mut tokens = line.split_whitespace();
    let name_token = tokens.next()?;
    let name = name_token.trim_end_matches(',');
    if name.is_empty() || name == "(" {
        return None;
    }

    if CONSTRAINT_KEYWORDS
        .iter()
        .any(|keyword| name.eq_ignore_ascii_case(keyword))
    {
        return None;
    }

    let type_token = tokens.next().unwrap_or("");
    let column_type = map_type_token(type_token);
    let nullable = !line.to_ascii_uppercase().contains("NOT NULL");

    Some(ColumnDef {
        name: name.to_string(),
        column_type,
        nullable,
    })
}

fn map_type_token(token: &str) -> ColumnType {
    let base = token
        .trim_end_matches(',')
        .split('(')
        .next()
        .unwrap_or("")
        .to_ascii_uppercase();

    match base.as_str() {
        "INT" | "INTEGER" | "BIGINT" | "SMALLINT" => ColumnType::Integer,
        "DECIMAL" | "NUMERIC" | "FLOAT" | "REAL" | "DOUBLE" => ColumnType::Decimal,
        "TEXT" | "VARCHAR" | "CHAR" => ColumnType::Text,
        _ => ColumnType::Text,
    }
}
