use crate::model::{CellValue, NormalizedRow};
use crate::schema::TableSchema;
use crate::util::stable_hash_u64;

/// Synthetic-identifier derivation for rows the source text left without one.
///
/// The default implementation is deterministic but collision-prone; it sits
/// behind this trait so a collision-resistant scheme can replace it without
/// touching normalization.
pub trait IdentityAssigner {
    fn company_id(&self, source_name: &str) -> f64;
    fn row_id(&self, source_name: &str, table_name: &str, row_index: usize) -> f64;
}

/// Hash-based surrogate keys in the range 0..10000, derived from the source
/// document filename (and table/position for row-level ids). Collisions
/// across documents are accepted; the ids are advisory join keys only.
#[derive(Debug, Clone, Copy, Default)]
pub struct HashIdentityAssigner;

const ID_RANGE: u64 = 10_000;

impl IdentityAssigner for HashIdentityAssigner {
    fn company_id(&self, source_name: &str) -> f64 {
        (stable_hash_u64(source_name) % ID_RANGE) as f64
    }

    fn row_id(&self, source_name: &str, table_name: &str, row_index: usize) -> f64 {
        let key = format!("{source_name}_{table_name}_{row_index}");
        (stable_hash_u64(&key) % ID_RANGE) as f64
    }
}

/// Columns that carry a row-level surrogate key, by table.
pub fn row_id_column(table_name: &str) -> Option<&'static str> {
    match table_name {
        "financial_results" => Some("financial_id"),
        "balance_sheet" => Some("balance_sheet_id"),
        "cash_flow" => Some("cash_flow_id"),
        "key_ratios" => Some("ratio_id"),
        "management_discussion" => Some("discussion_id"),
        "recommendations" => Some("recommendation_id"),
        _ => None,
    }
}

/// Backfill `company_id`, the table's row-id column, and `data_source` on
/// every row that lacks them.
pub fn assign_identities(
    rows: &mut [NormalizedRow],
    assigner: &dyn IdentityAssigner,
    schema: &TableSchema,
    source_name: &str,
) {
    let table_name = schema.table_name.as_str();
    let id_column = row_id_column(table_name).filter(|name| schema.column(name).is_some());

    for (index, row) in rows.iter_mut().enumerate() {
        if schema.column("company_id").is_some() && row.is_blank("company_id") {
            row.insert("company_id", CellValue::Number(assigner.company_id(source_name)));
        }

        if let Some(column) = id_column {
            if row.is_blank(column) {
                row.insert(
                    column,
                    CellValue::Number(assigner.row_id(source_name, table_name, index)),
                );
            }
        }

        if row.is_blank("data_source") {
            row.insert("data_source", CellValue::Text(source_name.to_string()));
        }
    }
}
