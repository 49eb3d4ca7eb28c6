// ABOUTME: Breadth-first traversal over the row graph, seed-rooted and bounded
// ABOUTME: Drives a RowSource; depth, direction, exclusions, and cycles respected

pub mod collected;

use crate::cancel::CancelFlag;
use crate::config::Direction;
use crate::error::ExtractError;
use crate::schema::{EdgeId, SchemaModel, Table, TableId};
use crate::seed::SeedPredicate;
use crate::value::SqlValue;
use async_trait::async_trait;
use collected::{CollectedSet, Row, RowKey};
use std::collections::{HashMap, HashSet, VecDeque};

/// Where rows come from. The production implementation wraps a database
/// client; tests drive the engine with an in-memory fixture.
#[async_trait]
pub trait RowSource {
    /// All rows of `table` matching the seed predicate.
    async fn fetch_seed(
        &mut self,
        table: &Table,
        seed: &SeedPredicate,
    ) -> Result<Vec<Row>, ExtractError>;

    /// All rows of `table` whose `key_columns` tuple is in `keys`.
    async fn fetch_by_keys(
        &mut self,
        table: &Table,
        key_columns: &[usize],
        keys: &[Vec<SqlValue>],
    ) -> Result<Vec<Row>, ExtractError>;
}

#[derive(Debug, Clone)]
pub struct TraversalOptions {
    /// Hop budget from the nearest seed. 0 collects seed rows only.
    pub max_depth: u32,
    pub direction: Direction,
    pub exclude_tables: HashSet<TableId>,
}

/// One unit of frontier work: rows of a table whose neighbors have not
/// been expanded yet.
#[derive(Debug)]
struct WorkItem {
    table: TableId,
    keys: Vec<RowKey>,
    depth: u32,
    origin: Option<EdgeId>,
}

/// A candidate edge viewed from the table being expanded.
struct Hop {
    edge: EdgeId,
    other: TableId,
    /// Columns to project out of the current table's rows.
    project: Vec<usize>,
    /// Columns on the other side that the projected tuples address.
    fetch_columns: Vec<usize>,
}

/// Run the traversal and return the collected set.
///
/// Seed row sets are unioned; every seed row starts at depth 0. The engine
/// never enqueues a row key twice: the collected set dedups discovery, the
/// per-(table, columns) request log dedups fetches.
pub async fn run<S: RowSource>(
    schema: &SchemaModel,
    source: &mut S,
    seeds: &[SeedPredicate],
    opts: &TraversalOptions,
    cancel: &CancelFlag,
) -> Result<CollectedSet, ExtractError> {
    let mut collected = CollectedSet::default();
    // The visited bookkeeping: tuples already requested per (table, column
    // set). A key enters it when its fetch is issued, so no edge ever
    // re-fetches or re-enqueues a row that has been expanded.
    let mut requested: HashMap<(TableId, Vec<usize>), HashSet<Vec<SqlValue>>> = HashMap::new();
    let mut queue: VecDeque<WorkItem> = VecDeque::new();

    for seed in seeds {
        cancel.check()?;
        let table_id = schema.table_id(&seed.table).ok_or_else(|| {
            ExtractError::invalid_seed(&seed.table, "table does not exist in the schema")
        })?;
        if opts.exclude_tables.contains(&table_id) {
            return Err(ExtractError::invalid_seed(
                &seed.table,
                "seed table is in the excluded set",
            ));
        }

        let table = schema.table(table_id);
        if !table.has_primary_key() {
            return Err(ExtractError::invalid_seed(
                &seed.table,
                "table has no primary key; rows here can only be reached as leaves",
            ));
        }
        let rows = source.fetch_seed(table, seed).await?;
        tracing::debug!("seed on '{}' matched {} row(s)", table.name, rows.len());

        let key_columns = table.key_columns();
        let mut new_keys = Vec::new();
        for row in rows {
            let key = RowKey::of(&row, &key_columns);
            if collected.insert(table_id, key.clone(), row) {
                new_keys.push(key);
            }
        }
        if !new_keys.is_empty() {
            queue.push_back(WorkItem {
                table: table_id,
                keys: new_keys,
                depth: 0,
                origin: None,
            });
        }
    }

    while let Some(item) = queue.pop_front() {
        cancel.check()?;
        if item.depth >= opts.max_depth {
            continue;
        }

        let table = schema.table(item.table);
        if let Some(edge_id) = item.origin {
            tracing::debug!(
                "expanding {} row(s) of '{}' at depth {} (via '{}')",
                item.keys.len(),
                table.name,
                item.depth,
                schema.edge(edge_id).name
            );
        }

        for hop in candidate_hops(schema, item.table, opts.direction) {
            if opts.exclude_tables.contains(&hop.other) {
                continue;
            }

            // Project neighbor key tuples out of the rows in this item,
            // dropping tuples with a null component (never match in IN).
            let mut frontier: Vec<Vec<SqlValue>> = Vec::new();
            let mut seen: HashSet<Vec<SqlValue>> = HashSet::new();
            for key in &item.keys {
                let Some(row) = collected.get(item.table, key) else {
                    continue;
                };
                let tuple = row.project(&hop.project);
                if tuple.iter().any(SqlValue::is_null) {
                    continue;
                }
                if seen.insert(tuple.clone()) {
                    frontier.push(tuple);
                }
            }

            let other_table = schema.table(hop.other);
            let other_key_columns = other_table.key_columns();
            let already = requested
                .entry((hop.other, hop.fetch_columns.clone()))
                .or_default();
            frontier.retain(|tuple| !already.contains(tuple));
            // When the addressed columns are the row key itself, rows we
            // already hold need no refetch.
            if hop.fetch_columns == other_key_columns {
                frontier.retain(|tuple| !collected.contains(hop.other, &RowKey(tuple.clone())));
            }
            if frontier.is_empty() {
                continue;
            }
            frontier.sort();
            for tuple in &frontier {
                already.insert(tuple.clone());
            }

            let fetched = source
                .fetch_by_keys(other_table, &hop.fetch_columns, &frontier)
                .await?;

            let mut new_keys = Vec::new();
            for row in fetched {
                let key = RowKey::of(&row, &other_key_columns);
                if collected.insert(hop.other, key.clone(), row) {
                    new_keys.push(key);
                }
            }
            tracing::debug!(
                "edge '{}': {} new row(s) in '{}' at depth {}",
                schema.edge(hop.edge).name,
                new_keys.len(),
                other_table.name,
                item.depth + 1
            );
            if !new_keys.is_empty() && other_table.has_primary_key() {
                queue.push_back(WorkItem {
                    table: hop.other,
                    keys: new_keys,
                    depth: item.depth + 1,
                    origin: Some(hop.edge),
                });
            }
        }
    }

    Ok(collected)
}

/// Edges leaving `table` under the configured direction, in the schema's
/// stable order (real before virtual, then by name). `up` follows edges
/// where the table is the child; `down` where it is the parent.
fn candidate_hops(schema: &SchemaModel, table: TableId, direction: Direction) -> Vec<Hop> {
    let mut hops = Vec::new();
    if matches!(direction, Direction::Up | Direction::Both) {
        for edge in schema.edges_from(table) {
            hops.push(Hop {
                edge: edge.id,
                other: edge.target,
                project: edge.source_columns.clone(),
                fetch_columns: edge.target_columns.clone(),
            });
        }
    }
    if matches!(direction, Direction::Down | Direction::Both) {
        for edge in schema.edges_to(table) {
            hops.push(Hop {
                edge: edge.id,
                other: edge.source,
                project: edge.target_columns.clone(),
                fetch_columns: edge.source_columns.clone(),
            });
        }
    }
    hops
}
