//! Row projection onto a column schema

use super::flatten::FlatRow;
use super::schema::ColumnSchema;
use crate::collect::ScopeContext;

/// Reshape a flattened resource into exactly the schema's columns
///
/// Missing columns become `""`, unknown keys are dropped, and scope metadata
/// (account, region, sub-scope) overwrites same-named flattened values for
/// every metadata column the schema declares.
pub fn project(flat: &FlatRow, schema: &ColumnSchema, scope: &ScopeContext) -> FlatRow {
    let mut row: FlatRow = schema
        .columns()
        .iter()
        .map(|column| (column.clone(), flat.get(column).cloned().unwrap_or_default()))
        .collect();

    for (column, value) in scope.metadata() {
        if let Some(slot) = row.get_mut(column) {
            *slot = value.to_string();
        }
    }

    row
}
