// ABOUTME: CSV writer: one RFC 4180 file per table with a header row
// ABOUTME: Nulls are empty fields; bytes are base64

use super::EmitContext;
use crate::value::SqlValue;
use anyhow::{Context, Result};
use std::path::Path;

/// One `<table>.csv` per table in the plan order. The csv crate handles
/// quoting; empty fields stand for NULL.
pub fn write_per_table(ctx: &EmitContext, dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create output directory '{}'", dir.display()))?;

    for &table_id in &ctx.plan.ordered_tables {
        let table = ctx.schema.table(table_id);
        let path = dir.join(format!("{}.csv", table.name));
        let mut writer = csv::Writer::from_path(&path)
            .with_context(|| format!("failed to create '{}'", path.display()))?;

        writer.write_record(table.column_names())?;

        if let Some(rows) = ctx.collected.table_rows(table_id) {
            for row in rows.rows() {
                let values = ctx.emitted_values(table_id, row);
                let fields: Vec<String> = values.iter().map(csv_field).collect();
                writer.write_record(&fields)?;
            }
        }
        writer
            .flush()
            .with_context(|| format!("failed to flush '{}'", path.display()))?;
    }
    Ok(())
}

fn csv_field(value: &SqlValue) -> String {
    // to_text renders NULL as the empty string, which is the CSV convention.
    value.to_text()
}
