// ABOUTME: Kahn's algorithm over the induced FK sub-graph, parents first
// ABOUTME: Cycles are broken by deferring nullable edges to post-insert UPDATEs

use crate::error::ExtractError;
use crate::schema::{EdgeId, SchemaModel, TableId};
use crate::traverse::collected::CollectedSet;
use std::collections::{BTreeSet, HashMap, HashSet};

/// The emit plan: tables in an order where every non-deferred edge points
/// from a later table to an earlier one, plus the edges that had to be
/// deferred (inserted NULL, back-filled by UPDATE) to make that possible.
#[derive(Debug)]
pub struct InsertPlan {
    pub ordered_tables: Vec<TableId>,
    pub deferred_edges: Vec<EdgeId>,
}

/// Order the collected tables for insertion.
///
/// Only tables with at least one collected row participate; the sub-graph
/// is the real and virtual edges between them. When no table is free and
/// rows remain, one edge is deferred: nullable edges only, preferring the
/// fewest rows needing back-fill, ties broken by `(source_table, name)`.
/// A cycle with no nullable edge is unbreakable.
pub fn plan_insert_order(
    schema: &SchemaModel,
    collected: &CollectedSet,
) -> Result<InsertPlan, ExtractError> {
    let nodes: HashSet<TableId> = collected.tables_with_rows().into_iter().collect();

    let induced: Vec<EdgeId> = schema
        .edges()
        .iter()
        .filter(|e| nodes.contains(&e.source) && nodes.contains(&e.target))
        .map(|e| e.id)
        .collect();

    let mut in_degree: HashMap<TableId, usize> = nodes.iter().map(|&t| (t, 0)).collect();
    // parent -> edges it unblocks when placed
    let mut unblocks: HashMap<TableId, Vec<EdgeId>> = HashMap::new();
    for &edge_id in &induced {
        let edge = schema.edge(edge_id);
        *in_degree.get_mut(&edge.source).unwrap() += 1;
        unblocks.entry(edge.target).or_default().push(edge_id);
    }

    // Ready set keyed by name so the output order is stable across runs.
    let mut ready: BTreeSet<(String, TableId)> = in_degree
        .iter()
        .filter(|(_, &deg)| deg == 0)
        .map(|(&t, _)| (schema.table(t).name.clone(), t))
        .collect();

    let mut removed: HashSet<EdgeId> = HashSet::new();
    let mut deferred: Vec<EdgeId> = Vec::new();
    let mut ordered: Vec<TableId> = Vec::with_capacity(nodes.len());
    let mut placed: HashSet<TableId> = HashSet::new();

    while ordered.len() < nodes.len() {
        if let Some(entry) = ready.iter().next().cloned() {
            ready.remove(&entry);
            let (_, table) = entry;
            ordered.push(table);
            placed.insert(table);
            for &edge_id in unblocks.get(&table).map(Vec::as_slice).unwrap_or(&[]) {
                if removed.contains(&edge_id) {
                    continue;
                }
                let child = schema.edge(edge_id).source;
                if placed.contains(&child) {
                    continue;
                }
                let deg = in_degree.get_mut(&child).unwrap();
                *deg -= 1;
                if *deg == 0 {
                    ready.insert((schema.table(child).name.clone(), child));
                }
            }
            continue;
        }

        // Stuck: everything unplaced sits on a cycle. Pick an edge to defer.
        let blocking: Vec<EdgeId> = induced
            .iter()
            .copied()
            .filter(|id| {
                let e = schema.edge(*id);
                !removed.contains(id) && !placed.contains(&e.target) && !placed.contains(&e.source)
            })
            .collect();

        let chosen = blocking
            .iter()
            .copied()
            .filter(|id| schema.edge(*id).nullable)
            .min_by_key(|id| {
                let e = schema.edge(*id);
                (
                    backfill_row_count(schema, collected, *id),
                    schema.table(e.source).name.clone(),
                    e.name.clone(),
                )
            });

        let Some(edge_id) = chosen else {
            let cycle = describe_cycle(schema, &blocking, &placed);
            return Err(ExtractError::UnbreakableCycle { cycle });
        };

        let edge = schema.edge(edge_id);
        tracing::info!(
            "deferring FK '{}' ({} -> {}) to break a cycle",
            edge.name,
            schema.table(edge.source).name,
            schema.table(edge.target).name
        );
        removed.insert(edge_id);
        deferred.push(edge_id);
        let deg = in_degree.get_mut(&edge.source).unwrap();
        *deg -= 1;
        if *deg == 0 {
            ready.insert((schema.table(edge.source).name.clone(), edge.source));
        }
    }

    Ok(InsertPlan {
        ordered_tables: ordered,
        deferred_edges: deferred,
    })
}

/// Rows that would need a back-fill UPDATE if the edge were deferred:
/// collected source rows whose FK tuple is fully non-null.
fn backfill_row_count(schema: &SchemaModel, collected: &CollectedSet, edge: EdgeId) -> usize {
    let e = schema.edge(edge);
    collected
        .table_rows(e.source)
        .map(|rows| {
            rows.rows()
                .iter()
                .filter(|row| {
                    e.source_columns
                        .iter()
                        .all(|&i| !row.values[i].is_null())
                })
                .count()
        })
        .unwrap_or(0)
}

/// Walk child -> parent over the blocking edges until a table repeats,
/// producing a readable cycle path for the error message.
fn describe_cycle(
    schema: &SchemaModel,
    blocking: &[EdgeId],
    placed: &HashSet<TableId>,
) -> Vec<String> {
    let mut next: HashMap<TableId, TableId> = HashMap::new();
    for &id in blocking {
        let e = schema.edge(id);
        next.entry(e.source).or_insert(e.target);
    }

    let Some(&start) = next.keys().find(|t| !placed.contains(t)) else {
        return Vec::new();
    };

    let mut path = vec![start];
    let mut seen: HashSet<TableId> = [start].into();
    let mut current = start;
    while let Some(&parent) = next.get(&current) {
        path.push(parent);
        if !seen.insert(parent) {
            break;
        }
        current = parent;
    }

    // Trim the tail down to the actual loop.
    let loop_entry = *path.last().unwrap();
    let from = path.iter().position(|&t| t == loop_entry).unwrap();
    path[from..]
        .iter()
        .map(|&t| schema.table(t).name.clone())
        .collect()
}
