// ABOUTME: Populates the schema model from pg_catalog and merges virtual FKs
// ABOUTME: Read-only catalog queries; validation errors surface as SchemaError

use crate::config::VirtualFkConfig;
use crate::error::ExtractError;
use crate::ident;
use crate::schema::{Column, SchemaModel, Table, TableId};
use std::collections::HashMap;
use tokio_postgres::Client;

/// Build the schema model for one schema: base tables, columns, primary
/// keys, and real FK constraints, then merge user-declared virtual FKs.
///
/// The model is immutable after this returns (sensitivity annotation runs
/// as part of the same introspection phase, before traversal starts).
pub async fn introspect_schema(
    client: &Client,
    schema: &str,
    virtual_fks: &[VirtualFkConfig],
) -> Result<SchemaModel, ExtractError> {
    ident::validate_identifier(schema)
        .map_err(|e| ExtractError::schema(format!("invalid schema name: {}", e)))?;

    let mut model = SchemaModel::default();

    for (name, row_estimate) in list_tables(client, schema).await? {
        let columns = get_table_columns(client, schema, &name).await?;
        let pk_names = get_primary_key(client, schema, &name).await?;
        let primary_key: Vec<usize> = pk_names
            .iter()
            .filter_map(|pk| columns.iter().position(|c| &c.name == pk))
            .collect();
        if primary_key.len() != pk_names.len() {
            return Err(ExtractError::schema(format!(
                "primary key of '{}' references columns missing from pg_attribute",
                name
            )));
        }
        let sensitivity = vec![Default::default(); columns.len()];
        model.add_table(Table {
            schema: schema.to_string(),
            name,
            columns,
            primary_key,
            row_estimate,
            sensitivity,
        });
    }

    for fk in load_foreign_keys(client, schema).await? {
        // Constraints referencing tables outside the schema were filtered
        // by the catalog query; both lookups are expected to succeed.
        let (source, target) = match (model.table_id(&fk.source_table), model.table_id(&fk.target_table)) {
            (Some(s), Some(t)) => (s, t),
            _ => continue,
        };
        let source_columns = resolve_columns(&model, source, &fk.source_columns)?;
        let target_columns = resolve_columns(&model, target, &fk.target_columns)?;
        model.add_edge(fk.name, source, source_columns, target, target_columns, false);
    }

    merge_virtual_fks(&mut model, virtual_fks)?;
    model.finalize();

    tracing::info!(
        "Introspected schema '{}': {} tables, {} FK edges ({} virtual)",
        schema,
        model.tables().len(),
        model.edges().len(),
        model.edges().iter().filter(|e| e.is_virtual).count()
    );

    Ok(model)
}

/// List base tables in the schema with their planner row estimates.
async fn list_tables(client: &Client, schema: &str) -> Result<Vec<(String, i64)>, ExtractError> {
    let rows = client
        .query(
            "SELECT
                pg_tables.tablename,
                COALESCE(n_live_tup, 0) AS row_estimate
             FROM pg_catalog.pg_tables
             LEFT JOIN pg_catalog.pg_stat_user_tables
                ON pg_tables.schemaname = pg_stat_user_tables.schemaname
                AND pg_tables.tablename = pg_stat_user_tables.relname
             WHERE pg_tables.schemaname = $1
             ORDER BY pg_tables.tablename",
            &[&schema],
        )
        .await
        .map_err(|e| ExtractError::schema(format!("failed to list tables: {}", e)))?;

    Ok(rows.iter().map(|row| (row.get(0), row.get(1))).collect())
}

/// Columns of one table in attnum order, with type name and nullability.
async fn get_table_columns(
    client: &Client,
    schema: &str,
    table: &str,
) -> Result<Vec<Column>, ExtractError> {
    let rows = client
        .query(
            "SELECT
                a.attname,
                pg_catalog.format_type(a.atttypid, a.atttypmod),
                NOT a.attnotnull AS nullable
             FROM pg_catalog.pg_attribute a
             JOIN pg_catalog.pg_class c ON a.attrelid = c.oid
             JOIN pg_catalog.pg_namespace n ON c.relnamespace = n.oid
             WHERE n.nspname = $1
               AND c.relname = $2
               AND a.attnum > 0
               AND NOT a.attisdropped
             ORDER BY a.attnum",
            &[&schema, &table],
        )
        .await
        .map_err(|e| {
            ExtractError::schema(format!("failed to get columns for '{}': {}", table, e))
        })?;

    Ok(rows
        .iter()
        .map(|row| Column {
            name: row.get(0),
            sql_type: row.get(1),
            nullable: row.get(2),
        })
        .collect())
}

/// Primary key column names of one table, in key order. Empty when the
/// table has no PK.
async fn get_primary_key(
    client: &Client,
    schema: &str,
    table: &str,
) -> Result<Vec<String>, ExtractError> {
    let rows = client
        .query(
            "SELECT a.attname
             FROM pg_catalog.pg_index i
             JOIN unnest(i.indkey) WITH ORDINALITY AS k(attnum, ord) ON true
             JOIN pg_catalog.pg_attribute a
                ON a.attrelid = i.indrelid AND a.attnum = k.attnum
             JOIN pg_catalog.pg_class c ON c.oid = i.indrelid
             JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
             WHERE n.nspname = $1
               AND c.relname = $2
               AND i.indisprimary
             ORDER BY k.ord",
            &[&schema, &table],
        )
        .await
        .map_err(|e| {
            ExtractError::schema(format!("failed to get primary key of '{}': {}", table, e))
        })?;

    Ok(rows.iter().map(|row| row.get(0)).collect())
}

struct RawFk {
    name: String,
    source_table: String,
    target_table: String,
    source_columns: Vec<String>,
    target_columns: Vec<String>,
}

/// All FK constraints where both endpoints live in the schema, one entry
/// per constraint with column pairs in constraint order.
async fn load_foreign_keys(client: &Client, schema: &str) -> Result<Vec<RawFk>, ExtractError> {
    let rows = client
        .query(
            "SELECT
                con.conname,
                src.relname,
                tgt.relname,
                sa.attname,
                ta.attname
             FROM pg_catalog.pg_constraint con
             JOIN pg_catalog.pg_class src ON src.oid = con.conrelid
             JOIN pg_catalog.pg_namespace src_ns ON src_ns.oid = src.relnamespace
             JOIN pg_catalog.pg_class tgt ON tgt.oid = con.confrelid
             JOIN pg_catalog.pg_namespace tgt_ns ON tgt_ns.oid = tgt.relnamespace
             JOIN unnest(con.conkey, con.confkey)
                  WITH ORDINALITY AS k(src_attnum, tgt_attnum, ord) ON true
             JOIN pg_catalog.pg_attribute sa
                ON sa.attrelid = src.oid AND sa.attnum = k.src_attnum
             JOIN pg_catalog.pg_attribute ta
                ON ta.attrelid = tgt.oid AND ta.attnum = k.tgt_attnum
             WHERE con.contype = 'f'
               AND src_ns.nspname = $1
               AND tgt_ns.nspname = $2
             ORDER BY src.relname, con.conname, k.ord",
            &[&schema, &schema],
        )
        .await
        .map_err(|e| ExtractError::schema(format!("failed to load FK constraints: {}", e)))?;

    let mut by_constraint: Vec<RawFk> = Vec::new();
    let mut index: HashMap<(String, String), usize> = HashMap::new();
    for row in &rows {
        let name: String = row.get(0);
        let source_table: String = row.get(1);
        let key = (source_table.clone(), name.clone());
        let at = *index.entry(key).or_insert_with(|| {
            by_constraint.push(RawFk {
                name: name.clone(),
                source_table,
                target_table: row.get(2),
                source_columns: Vec::new(),
                target_columns: Vec::new(),
            });
            by_constraint.len() - 1
        });
        by_constraint[at].source_columns.push(row.get(3));
        by_constraint[at].target_columns.push(row.get(4));
    }
    Ok(by_constraint)
}

fn resolve_columns(
    model: &SchemaModel,
    table: TableId,
    names: &[String],
) -> Result<Vec<usize>, ExtractError> {
    let t = model.table(table);
    names
        .iter()
        .map(|name| {
            t.column_index(name).ok_or_else(|| {
                ExtractError::schema(format!(
                    "column '{}' does not exist in table '{}'",
                    ident::sanitize_for_display(name),
                    t.name
                ))
            })
        })
        .collect()
}

/// Merge user-declared virtual FK edges into the model.
///
/// Every referenced table and column must exist and column arities must
/// match; a missing `target_columns` defaults to the target's primary key.
/// Multiple virtual edges with the same source columns but different
/// targets are allowed and traversed independently.
pub fn merge_virtual_fks(
    model: &mut SchemaModel,
    virtual_fks: &[VirtualFkConfig],
) -> Result<(), ExtractError> {
    for vfk in virtual_fks {
        for name in [&vfk.source_table, &vfk.target_table] {
            ident::validate_identifier(name)
                .map_err(|e| ExtractError::schema(format!("invalid virtual FK table: {}", e)))?;
        }

        let source = model.require_table(&vfk.source_table)?;
        let target = model.require_table(&vfk.target_table)?;
        let source_columns = resolve_columns(model, source, &vfk.source_columns)?;

        let target_columns = match &vfk.target_columns {
            Some(names) => resolve_columns(model, target, names)?,
            None => {
                let pk = model.table(target).primary_key.clone();
                if pk.is_empty() {
                    return Err(ExtractError::schema(format!(
                        "virtual FK to '{}' omits target columns but the table has no primary key",
                        vfk.target_table
                    )));
                }
                pk
            }
        };

        if source_columns.len() != target_columns.len() {
            return Err(ExtractError::schema(format!(
                "virtual FK '{}' -> '{}' has mismatched column counts ({} vs {})",
                vfk.source_table,
                vfk.target_table,
                source_columns.len(),
                target_columns.len()
            )));
        }

        let name = vfk.name.clone().unwrap_or_else(|| {
            format!(
                "virtual_{}_{}_{}",
                vfk.source_table,
                vfk.source_columns.join("_"),
                vfk.target_table
            )
        });
        model.add_edge(name, source, source_columns, target, target_columns, true);
    }
    Ok(())
}
