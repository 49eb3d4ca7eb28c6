// ABOUTME: Rows, row keys, and the per-table collected/visited sets
// ABOUTME: Rows are positional value vectors addressed through the table schema

use crate::schema::TableId;
use crate::value::SqlValue;
use std::collections::HashMap;
use std::fmt;

/// One fetched row: values in the table's column order. Column lookup is
/// positional through the owning [`crate::schema::Table`].
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub values: Vec<SqlValue>,
}

impl Row {
    pub fn new(values: Vec<SqlValue>) -> Self {
        Row { values }
    }

    /// Values at the given column indexes, in that order.
    pub fn project(&self, columns: &[usize]) -> Vec<SqlValue> {
        columns.iter().map(|&i| self.values[i].clone()).collect()
    }
}

/// The tuple of values identifying a row within its table: the primary key,
/// or the full column tuple for tables without one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowKey(pub Vec<SqlValue>);

impl RowKey {
    pub fn of(row: &Row, key_columns: &[usize]) -> Self {
        RowKey(row.project(key_columns))
    }

    pub fn has_null(&self) -> bool {
        self.0.iter().any(SqlValue::is_null)
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|v| v.to_string()).collect();
        write!(f, "({})", parts.join(", "))
    }
}

/// Rows of one table in discovery order, deduplicated by row key.
#[derive(Debug, Default)]
pub struct TableRows {
    rows: Vec<Row>,
    index: HashMap<RowKey, usize>,
}

impl TableRows {
    /// Insert a row under its key. Returns false (and keeps the first
    /// occurrence) when the key was already present.
    pub fn insert(&mut self, key: RowKey, row: Row) -> bool {
        if self.index.contains_key(&key) {
            return false;
        }
        self.index.insert(key, self.rows.len());
        self.rows.push(row);
        true
    }

    pub fn contains(&self, key: &RowKey) -> bool {
        self.index.contains_key(key)
    }

    pub fn get(&self, key: &RowKey) -> Option<&Row> {
        self.index.get(key).map(|&i| &self.rows[i])
    }

    /// Rows in the order they were discovered.
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn keys(&self) -> impl Iterator<Item = &RowKey> {
        self.index.keys()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Everything gathered during one extraction, keyed `(table, row-key)`.
/// The single source of truth for emit and validation.
#[derive(Debug, Default)]
pub struct CollectedSet {
    tables: HashMap<TableId, TableRows>,
}

impl CollectedSet {
    /// Returns true when the row was new.
    pub fn insert(&mut self, table: TableId, key: RowKey, row: Row) -> bool {
        self.tables.entry(table).or_default().insert(key, row)
    }

    pub fn contains(&self, table: TableId, key: &RowKey) -> bool {
        self.tables.get(&table).is_some_and(|t| t.contains(key))
    }

    pub fn get(&self, table: TableId, key: &RowKey) -> Option<&Row> {
        self.tables.get(&table).and_then(|t| t.get(key))
    }

    pub fn table_rows(&self, table: TableId) -> Option<&TableRows> {
        self.tables.get(&table)
    }

    /// Tables holding at least one row, in table-id order.
    pub fn tables_with_rows(&self) -> Vec<TableId> {
        let mut ids: Vec<TableId> = self
            .tables
            .iter()
            .filter(|(_, rows)| !rows.is_empty())
            .map(|(&id, _)| id)
            .collect();
        ids.sort();
        ids
    }

    pub fn row_count(&self, table: TableId) -> usize {
        self.tables.get(&table).map_or(0, TableRows::len)
    }

    pub fn total_rows(&self) -> usize {
        self.tables.values().map(TableRows::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_rows() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(values: &[i64]) -> Row {
        Row::new(values.iter().map(|&v| SqlValue::Int(v)).collect())
    }

    #[test]
    fn duplicate_keys_keep_first_row() {
        let mut rows = TableRows::default();
        assert!(rows.insert(RowKey(vec![SqlValue::Int(1)]), row(&[1, 10])));
        assert!(!rows.insert(RowKey(vec![SqlValue::Int(1)]), row(&[1, 99])));
        assert_eq!(rows.len(), 1);
        assert_eq!(
            rows.get(&RowKey(vec![SqlValue::Int(1)])).unwrap().values[1],
            SqlValue::Int(10)
        );
    }

    #[test]
    fn discovery_order_is_preserved() {
        let mut rows = TableRows::default();
        for id in [5, 3, 9] {
            rows.insert(RowKey(vec![SqlValue::Int(id)]), row(&[id]));
        }
        let order: Vec<i64> = rows
            .rows()
            .iter()
            .map(|r| match r.values[0] {
                SqlValue::Int(i) => i,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(order, vec![5, 3, 9]);
    }

    #[test]
    fn collected_set_counts_and_membership() {
        let mut set = CollectedSet::default();
        let t = TableId(0);
        assert!(set.insert(t, RowKey(vec![SqlValue::Int(1)]), row(&[1])));
        assert!(!set.insert(t, RowKey(vec![SqlValue::Int(1)]), row(&[1])));
        assert!(set.contains(t, &RowKey(vec![SqlValue::Int(1)])));
        assert_eq!(set.row_count(t), 1);
        assert_eq!(set.total_rows(), 1);
        assert_eq!(set.tables_with_rows(), vec![t]);
    }

    #[test]
    fn row_key_null_detection_and_display() {
        let key = RowKey(vec![SqlValue::Int(1), SqlValue::Null]);
        assert!(key.has_null());
        assert_eq!(key.to_string(), "(1, NULL)");
    }
}
