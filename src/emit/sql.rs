// ABOUTME: SQL writer: framing, DROPs, batched INSERTs, deferred-edge UPDATEs
// ABOUTME: Insert order follows the plan; row order follows BFS discovery

use super::EmitContext;
use crate::dialect::{Dialect, PostgresDialect};
use crate::schema::{EdgeId, TableId};
use crate::value::SqlValue;
use anyhow::Result;
use std::collections::HashSet;
use std::io::Write;

/// Rows per multi-row INSERT statement.
const INSERT_BATCH_ROWS: usize = 1000;

/// Write the whole SQL artifact: optional FK-check disable, transaction
/// framing, DROPs in reverse dependency order, INSERTs in plan order, and
/// the deferred-edge UPDATEs after all inserts.
pub fn write_sql(ctx: &EmitContext, w: &mut dyn Write) -> Result<()> {
    let dialect = PostgresDialect;

    if ctx.options.disable_fk_checks {
        if let Some(stmt) = dialect.fk_disable_stmt() {
            writeln!(w, "{}", stmt)?;
        }
    }
    if ctx.options.include_transaction {
        writeln!(w, "BEGIN;")?;
    }
    if ctx.options.include_drop_tables {
        for &table_id in ctx.plan.ordered_tables.iter().rev() {
            let table = ctx.schema.table(table_id);
            writeln!(w, "{}", dialect.drop_table_stmt(&table.qualified_name()))?;
        }
    }

    for &table_id in &ctx.plan.ordered_tables {
        write_table_inserts(ctx, &dialect, table_id, w)?;
    }

    for &edge_id in &ctx.plan.deferred_edges {
        write_deferred_updates(ctx, &dialect, edge_id, w)?;
    }

    if ctx.options.include_transaction {
        writeln!(w, "COMMIT;")?;
    }
    Ok(())
}

fn write_table_inserts(
    ctx: &EmitContext,
    dialect: &PostgresDialect,
    table_id: TableId,
    w: &mut dyn Write,
) -> Result<()> {
    let Some(rows) = ctx.collected.table_rows(table_id) else {
        return Ok(());
    };
    let table = ctx.schema.table(table_id);

    // Source columns of deferred edges start out NULL and are back-filled
    // after every table is inserted.
    let deferred_columns: HashSet<usize> = ctx
        .plan
        .deferred_edges
        .iter()
        .map(|&e| ctx.schema.edge(e))
        .filter(|e| e.source == table_id)
        .flat_map(|e| e.source_columns.iter().copied())
        .collect();

    let column_list: Vec<String> = table
        .columns
        .iter()
        .map(|c| dialect.quote_identifier(&c.name))
        .collect();
    let insert_head = format!(
        "INSERT INTO {} ({}) VALUES",
        table.qualified_name(),
        column_list.join(", ")
    );

    for batch in rows.rows().chunks(INSERT_BATCH_ROWS) {
        let mut tuples = Vec::with_capacity(batch.len());
        for row in batch {
            let values = ctx.emitted_values(table_id, row);
            let rendered: Vec<String> = values
                .iter()
                .enumerate()
                .map(|(i, v)| {
                    if deferred_columns.contains(&i) {
                        "NULL".to_string()
                    } else {
                        dialect.quote_literal(v)
                    }
                })
                .collect();
            tuples.push(format!("({})", rendered.join(", ")));
        }
        writeln!(w, "{} {};", insert_head, tuples.join(", "))?;
    }
    Ok(())
}

/// One UPDATE per affected row, restoring a deferred FK column set. Rows
/// whose FK tuple is entirely null need no back-fill.
fn write_deferred_updates(
    ctx: &EmitContext,
    dialect: &PostgresDialect,
    edge_id: EdgeId,
    w: &mut dyn Write,
) -> Result<()> {
    let edge = ctx.schema.edge(edge_id);
    let table = ctx.schema.table(edge.source);
    let Some(rows) = ctx.collected.table_rows(edge.source) else {
        return Ok(());
    };

    // Identify rows by their key columns, skipping any column the deferral
    // just nulled out (only relevant for tables without a primary key).
    let deferred: HashSet<usize> = edge.source_columns.iter().copied().collect();
    let where_columns: Vec<usize> = table
        .key_columns()
        .into_iter()
        .filter(|i| !deferred.contains(i))
        .collect();

    for row in rows.rows() {
        let values = ctx.emitted_values(edge.source, row);
        if edge
            .source_columns
            .iter()
            .all(|&i| values[i].is_null())
        {
            continue;
        }

        let assignments: Vec<String> = edge
            .source_columns
            .iter()
            .map(|&i| {
                format!(
                    "{} = {}",
                    dialect.quote_identifier(&table.columns[i].name),
                    dialect.quote_literal(&values[i])
                )
            })
            .collect();
        let conditions: Vec<String> = where_columns
            .iter()
            .map(|&i| {
                let ident = dialect.quote_identifier(&table.columns[i].name);
                match &values[i] {
                    SqlValue::Null => format!("{} IS NULL", ident),
                    value => format!("{} = {}", ident, dialect.quote_literal(value)),
                }
            })
            .collect();

        writeln!(
            w,
            "UPDATE {} SET {} WHERE {};",
            table.qualified_name(),
            assignments.join(", "),
            conditions.join(" AND ")
        )?;
    }
    Ok(())
}
