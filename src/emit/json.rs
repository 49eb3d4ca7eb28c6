// ABOUTME: JSON writer: one document or one file per table
// ABOUTME: JSON-native values; timestamps as ISO-8601 strings, bytes as base64

use super::EmitContext;
use crate::schema::TableId;
use crate::value::SqlValue;
use anyhow::{Context, Result};
use serde_json::{Map, Number, Value};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// `{ "<table>": [ {col: val, ...}, ... ], ... }` with tables in plan order.
pub fn write_single(ctx: &EmitContext, w: &mut dyn Write) -> Result<()> {
    let mut document = Map::new();
    for &table_id in &ctx.plan.ordered_tables {
        let table = ctx.schema.table(table_id);
        document.insert(table.name.clone(), Value::Array(table_array(ctx, table_id)));
    }
    write_value(ctx, w, &Value::Object(document))
}

/// One `<table>.json` per table, each an array of row objects.
pub fn write_per_table(ctx: &EmitContext, dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create output directory '{}'", dir.display()))?;

    for &table_id in &ctx.plan.ordered_tables {
        let table = ctx.schema.table(table_id);
        let path = dir.join(format!("{}.json", table.name));
        let file = File::create(&path)
            .with_context(|| format!("failed to create '{}'", path.display()))?;
        let mut writer = BufWriter::new(file);
        write_value(ctx, &mut writer, &Value::Array(table_array(ctx, table_id)))?;
        writer.flush()?;
    }
    Ok(())
}

fn write_value(ctx: &EmitContext, w: &mut dyn Write, value: &Value) -> Result<()> {
    if ctx.options.json_pretty {
        serde_json::to_writer_pretty(&mut *w, value)?;
    } else {
        serde_json::to_writer(&mut *w, value)?;
    }
    writeln!(w)?;
    Ok(())
}

fn table_array(ctx: &EmitContext, table_id: TableId) -> Vec<Value> {
    let table = ctx.schema.table(table_id);
    let Some(rows) = ctx.collected.table_rows(table_id) else {
        return Vec::new();
    };
    rows.rows()
        .iter()
        .map(|row| {
            let values = ctx.emitted_values(table_id, row);
            let mut object = Map::new();
            for (column, value) in table.columns.iter().zip(values) {
                object.insert(column.name.clone(), json_value(value));
            }
            Value::Object(object)
        })
        .collect()
}

/// Map to JSON-native types. Decimals that fit a JSON number are numbers;
/// non-finite floats have no JSON form and fall back to strings.
fn json_value(value: SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Bool(b) => Value::Bool(b),
        SqlValue::Int(i) => Value::Number(i.into()),
        SqlValue::Float(f) => Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(f.to_string())),
        SqlValue::Numeric { ref text, .. } => {
            if let Ok(i) = text.parse::<i64>() {
                Value::Number(i.into())
            } else if let Some(n) = text.parse::<f64>().ok().and_then(Number::from_f64) {
                Value::Number(n)
            } else {
                Value::String(text.clone())
            }
        }
        SqlValue::Json(j) => j,
        other => Value::String(other.to_text()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_values_use_native_types() {
        assert_eq!(json_value(SqlValue::Null), Value::Null);
        assert_eq!(json_value(SqlValue::Bool(true)), Value::Bool(true));
        assert_eq!(json_value(SqlValue::Int(5)), serde_json::json!(5));
        assert_eq!(
            json_value(SqlValue::numeric("19.99").unwrap()),
            serde_json::json!(19.99)
        );
        assert_eq!(
            json_value(SqlValue::Text("hello".into())),
            serde_json::json!("hello")
        );
        assert_eq!(
            json_value(SqlValue::Bytes(vec![1, 2, 3])),
            serde_json::json!("AQID")
        );
    }

    #[test]
    fn nonfinite_floats_become_strings() {
        assert_eq!(json_value(SqlValue::Float(f64::NAN)), serde_json::json!("NaN"));
    }

    #[test]
    fn embedded_json_is_inlined() {
        let inner = serde_json::json!({"a": [1, 2]});
        assert_eq!(json_value(SqlValue::Json(inner.clone())), inner);
    }
}
