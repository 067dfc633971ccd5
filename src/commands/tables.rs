use anyhow::Result;
use tracing::info;

use crate::cli::TablesArgs;
use crate::schema::load_schemas;

pub fn run(args: TablesArgs) -> Result<()> {
    let schemas = load_schemas(&args.schema_path)?;

    for table in schemas.tables() {
        info!(
            table = %table.table_name,
            columns = table.columns.len(),
            column_names = %table.column_names().join(","),
            "loaded table definition"
        );
    }

    info!(
        path = %args.schema_path.display(),
        tables = schemas.tables().len(),
        "schema load completed"
    );

    Ok(())
}
