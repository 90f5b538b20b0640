//! Row output formatters

use crate::table::{ColumnSchema, FlatRow};
use anyhow::Result;
use clap::ValueEnum;
use comfy_table::{presets::NOTHING, Table};

/// Output format for generated rows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One JSON object per line
    #[default]
    Json,
    /// Aligned text table, columns in schema order
    Table,
}

pub fn render(rows: &[FlatRow], schema: &ColumnSchema, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => render_json_lines(rows),
        OutputFormat::Table => Ok(render_table(rows, schema)),
    }
}

pub fn render_json_lines(rows: &[FlatRow]) -> Result<String> {
    let mut out = String::new();
    for row in rows {
        out.push_str(&serde_json::to_string(row)?);
        out.push('\n');
    }
    Ok(out)
}

pub fn render_table(rows: &[FlatRow], schema: &ColumnSchema) -> String {
    let mut table = Table::new();
    table.load_preset(NOTHING).set_header(schema.columns());

    for row in rows {
        table.add_row(
            schema
                .columns()
                .iter()
                .map(|column| row.get(column).map(String::as_str).unwrap_or_default()),
        );
    }

    table.to_string()
}
