// ABOUTME: In-memory schema model: tables, columns, primary keys, FK edges
// ABOUTME: Edges are flat records with integer ids; adjacency is kept separately

pub mod introspect;

use crate::error::ExtractError;
use std::collections::HashMap;
use std::fmt;

/// Index of a table within a [`SchemaModel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableId(pub u32);

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TableId({})", self.0)
    }
}

/// Index of an FK edge within a [`SchemaModel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeId(pub u32);

/// How a column is treated when values are emitted.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SensitivityTag {
    #[default]
    None,
    /// Replace with a deterministic fake generated by the named method.
    Fake(String),
    /// Authentication material: always emitted as NULL.
    NullOut,
}

#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub sql_type: String,
    pub nullable: bool,
}

#[derive(Debug, Clone)]
pub struct Table {
    pub schema: String,
    pub name: String,
    pub columns: Vec<Column>,
    /// Indexes into `columns`, in key order. Empty for tables without a PK;
    /// such tables can be collected as leaves but never traversed from.
    pub primary_key: Vec<usize>,
    /// Planner row estimate from pg_stat_user_tables, used by `inspect`
    /// output and the streaming-mode heuristic.
    pub row_estimate: i64,
    /// Parallel to `columns`; filled in after introspection from the
    /// sensitivity rule set.
    pub sensitivity: Vec<SensitivityTag>,
}

impl Table {
    pub fn qualified_name(&self) -> String {
        format!("\"{}\".\"{}\"", self.schema, self.name)
    }

    pub fn has_primary_key(&self) -> bool {
        !self.primary_key.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Column indexes identifying a row: the PK, or every column for
    /// tables without one.
    pub fn key_columns(&self) -> Vec<usize> {
        if self.has_primary_key() {
            self.primary_key.clone()
        } else {
            (0..self.columns.len()).collect()
        }
    }
}

/// A directed foreign-key relation from a referencing (child) table to a
/// referenced (parent) table. Real edges come from pg_constraint; virtual
/// edges come from user configuration.
#[derive(Debug, Clone)]
pub struct FkEdge {
    pub id: EdgeId,
    pub name: String,
    pub source: TableId,
    pub source_columns: Vec<usize>,
    pub target: TableId,
    pub target_columns: Vec<usize>,
    /// True when every source column is nullable, which makes the edge
    /// legally deferrable (insert NULL, back-fill with UPDATE).
    pub nullable: bool,
    pub is_virtual: bool,
}

/// Immutable after introspection. Built once per extraction run.
#[derive(Debug, Default)]
pub struct SchemaModel {
    tables: Vec<Table>,
    by_name: HashMap<String, TableId>,
    edges: Vec<FkEdge>,
    /// Edges where the table is the child (outgoing, child -> parent).
    outgoing: Vec<Vec<EdgeId>>,
    /// Edges where the table is the parent (incoming).
    incoming: Vec<Vec<EdgeId>>,
}

impl SchemaModel {
    pub fn add_table(&mut self, table: Table) -> TableId {
        let id = TableId(self.tables.len() as u32);
        self.by_name.insert(table.name.clone(), id);
        self.tables.push(table);
        self.outgoing.push(Vec::new());
        self.incoming.push(Vec::new());
        id
    }

    pub fn add_edge(
        &mut self,
        name: String,
        source: TableId,
        source_columns: Vec<usize>,
        target: TableId,
        target_columns: Vec<usize>,
        is_virtual: bool,
    ) -> EdgeId {
        let nullable = source_columns
            .iter()
            .all(|&i| self.tables[source.0 as usize].columns[i].nullable);
        let id = EdgeId(self.edges.len() as u32);
        self.edges.push(FkEdge {
            id,
            name,
            source,
            source_columns,
            target,
            target_columns,
            nullable,
            is_virtual,
        });
        self.outgoing[source.0 as usize].push(id);
        self.incoming[target.0 as usize].push(id);
        id
    }

    /// Sort adjacency lists so traversal visits edges in a stable order:
    /// real edges first, then alphabetical by constraint name.
    pub fn finalize(&mut self) {
        let edges = &self.edges;
        let key = |id: &EdgeId| {
            let e = &edges[id.0 as usize];
            (e.is_virtual, e.name.clone())
        };
        for list in self.outgoing.iter_mut() {
            list.sort_by_key(key);
        }
        for list in self.incoming.iter_mut() {
            list.sort_by_key(key);
        }
    }

    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    pub fn table(&self, id: TableId) -> &Table {
        &self.tables[id.0 as usize]
    }

    /// Mutable access for the sensitivity-annotation step of introspection.
    /// Nothing mutates the model once traversal starts.
    pub fn tables_mut(&mut self) -> &mut [Table] {
        &mut self.tables
    }

    pub fn table_id(&self, name: &str) -> Option<TableId> {
        // Accept both bare and schema-qualified names.
        let bare = name.rsplit('.').next().unwrap_or(name);
        self.by_name.get(bare).copied()
    }

    pub fn edges(&self) -> &[FkEdge] {
        &self.edges
    }

    pub fn edge(&self, id: EdgeId) -> &FkEdge {
        &self.edges[id.0 as usize]
    }

    /// Edges where `id` is the child, ordered `(is_virtual, name)`.
    pub fn edges_from(&self, id: TableId) -> impl Iterator<Item = &FkEdge> {
        self.outgoing[id.0 as usize].iter().map(|e| self.edge(*e))
    }

    /// Edges where `id` is the parent, ordered `(is_virtual, name)`.
    pub fn edges_to(&self, id: TableId) -> impl Iterator<Item = &FkEdge> {
        self.incoming[id.0 as usize].iter().map(|e| self.edge(*e))
    }

    /// Whether the column participates in any FK edge, as source or target.
    /// Such columns are never anonymized.
    pub fn column_in_fk(&self, table: TableId, column: usize) -> bool {
        self.edges.iter().any(|e| {
            (e.source == table && e.source_columns.contains(&column))
                || (e.target == table && e.target_columns.contains(&column))
        })
    }

    /// Resolve a table name or fail with a schema error naming it.
    pub fn require_table(&self, name: &str) -> Result<TableId, ExtractError> {
        self.table_id(name).ok_or_else(|| {
            ExtractError::schema(format!(
                "table '{}' does not exist in the introspected schema",
                crate::ident::sanitize_for_display(name)
            ))
        })
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;

    /// Build a table whose columns are `(name, type, nullable)` triples and
    /// whose PK is named columns. Shared by unit tests across modules.
    pub fn table(name: &str, cols: &[(&str, &str, bool)], pk: &[&str]) -> Table {
        let columns: Vec<Column> = cols
            .iter()
            .map(|(n, t, null)| Column {
                name: n.to_string(),
                sql_type: t.to_string(),
                nullable: *null,
            })
            .collect();
        let primary_key = pk
            .iter()
            .map(|n| columns.iter().position(|c| c.name == *n).unwrap())
            .collect();
        let sensitivity = vec![SensitivityTag::None; columns.len()];
        Table {
            schema: "public".to_string(),
            name: name.to_string(),
            columns,
            primary_key,
            row_estimate: 0,
            sensitivity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testutil::table;
    use super::*;

    fn two_table_model() -> (SchemaModel, TableId, TableId) {
        let mut model = SchemaModel::default();
        let users = model.add_table(table(
            "users",
            &[("id", "int8", false), ("email", "text", true)],
            &["id"],
        ));
        let orders = model.add_table(table(
            "orders",
            &[("id", "int8", false), ("user_id", "int8", true)],
            &["id"],
        ));
        model.add_edge(
            "orders_user_id_fkey".to_string(),
            orders,
            vec![1],
            users,
            vec![0],
            false,
        );
        model.finalize();
        (model, users, orders)
    }

    #[test]
    fn adjacency_is_directional() {
        let (model, users, orders) = two_table_model();
        assert_eq!(model.edges_from(orders).count(), 1);
        assert_eq!(model.edges_from(users).count(), 0);
        assert_eq!(model.edges_to(users).count(), 1);
        assert_eq!(model.edges_to(orders).count(), 0);
    }

    #[test]
    fn edge_nullability_requires_all_source_columns_nullable() {
        let (model, _, _) = two_table_model();
        assert!(model.edges()[0].nullable);

        let mut strict = SchemaModel::default();
        let parent = strict.add_table(table("parent", &[("id", "int8", false)], &["id"]));
        let child = strict.add_table(table(
            "child",
            &[("id", "int8", false), ("parent_id", "int8", false)],
            &["id"],
        ));
        strict.add_edge(
            "child_parent_fkey".to_string(),
            child,
            vec![1],
            parent,
            vec![0],
            false,
        );
        assert!(!strict.edges()[0].nullable);
    }

    #[test]
    fn edge_order_puts_real_before_virtual() {
        let mut model = SchemaModel::default();
        let a = model.add_table(table("a", &[("id", "int8", false)], &["id"]));
        let b = model.add_table(table(
            "b",
            &[("id", "int8", false), ("a_id", "int8", true)],
            &["id"],
        ));
        model.add_edge("zz_virtual".to_string(), b, vec![1], a, vec![0], true);
        model.add_edge("b_real_fkey".to_string(), b, vec![1], a, vec![0], false);
        model.add_edge("aa_virtual".to_string(), b, vec![1], a, vec![0], true);
        model.finalize();

        let names: Vec<&str> = model.edges_from(b).map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["b_real_fkey", "aa_virtual", "zz_virtual"]);
    }

    #[test]
    fn fk_membership_covers_both_endpoints() {
        let (model, users, orders) = two_table_model();
        assert!(model.column_in_fk(orders, 1));
        assert!(model.column_in_fk(users, 0));
        assert!(!model.column_in_fk(users, 1));
    }

    #[test]
    fn qualified_name_lookup() {
        let (model, users, _) = two_table_model();
        assert_eq!(model.table_id("users"), Some(users));
        assert_eq!(model.table_id("public.users"), Some(users));
        assert!(model.table_id("missing").is_none());
        assert!(model.require_table("missing").is_err());
    }

    #[test]
    fn key_columns_fall_back_to_all_columns() {
        let t = table("log", &[("msg", "text", true), ("at", "timestamptz", true)], &[]);
        assert!(!t.has_primary_key());
        assert_eq!(t.key_columns(), vec![0, 1]);
    }
}
