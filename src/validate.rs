// ABOUTME: Post-extraction referential integrity check over the collected set
// ABOUTME: Deferred edges are exempt; their UPDATEs supply the reference later

use crate::schema::{EdgeId, SchemaModel};
use crate::traverse::collected::CollectedSet;
use crate::value::SqlValue;
use std::collections::HashSet;

/// One FK gap: a collected row whose referenced row is not in the set.
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    pub table: String,
    pub row_key: String,
    pub edge: String,
    pub missing_target: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} row {} references {} via '{}' which is not in the extracted set",
            self.table, self.row_key, self.missing_target, self.edge
        )
    }
}

/// Check every collected row against every real FK edge of its table.
///
/// A non-null FK tuple must resolve to a collected target row, unless the
/// edge was deferred by the sorter (the post-insert UPDATE references a row
/// inserted earlier in the same artifact). Virtual edges express traversal
/// intent, not database constraints, so they are not checked.
pub fn check_referential_integrity(
    schema: &SchemaModel,
    collected: &CollectedSet,
    deferred_edges: &[EdgeId],
) -> Vec<Violation> {
    let deferred: HashSet<EdgeId> = deferred_edges.iter().copied().collect();
    let mut violations = Vec::new();

    for edge in schema.edges() {
        if edge.is_virtual || deferred.contains(&edge.id) {
            continue;
        }
        let Some(source_rows) = collected.table_rows(edge.source) else {
            continue;
        };

        // Index the referenced tuples once per edge.
        let target_tuples: HashSet<Vec<SqlValue>> = collected
            .table_rows(edge.target)
            .map(|rows| {
                rows.rows()
                    .iter()
                    .map(|r| r.project(&edge.target_columns))
                    .collect()
            })
            .unwrap_or_default();

        let source_table = schema.table(edge.source);
        let target_table = schema.table(edge.target);
        let key_columns = source_table.key_columns();

        for row in source_rows.rows() {
            let tuple = row.project(&edge.source_columns);
            if tuple.iter().any(SqlValue::is_null) {
                continue;
            }
            if !target_tuples.contains(&tuple) {
                let rendered: Vec<String> = tuple.iter().map(|v| v.to_string()).collect();
                violations.push(Violation {
                    table: source_table.name.clone(),
                    row_key: crate::traverse::collected::RowKey(row.project(&key_columns))
                        .to_string(),
                    edge: edge.name.clone(),
                    missing_target: format!("{}({})", target_table.name, rendered.join(", ")),
                });
            }
        }
    }

    violations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::testutil::table;
    use crate::schema::SchemaModel;
    use crate::traverse::collected::{Row, RowKey};

    fn model() -> SchemaModel {
        let mut model = SchemaModel::default();
        let users = model.add_table(table("users", &[("id", "int8", false)], &["id"]));
        let orders = model.add_table(table(
            "orders",
            &[("id", "int8", false), ("user_id", "int8", true)],
            &["id"],
        ));
        model.add_edge("orders_user_fkey".into(), orders, vec![1], users, vec![0], false);
        model.finalize();
        model
    }

    fn insert(collected: &mut CollectedSet, model: &SchemaModel, name: &str, values: Vec<i64>) {
        let id = model.table_id(name).unwrap();
        let row = Row::new(values.into_iter().map(SqlValue::Int).collect());
        let key = RowKey(vec![row.values[0].clone()]);
        collected.insert(id, key, row);
    }

    #[test]
    fn complete_set_has_no_violations() {
        let model = model();
        let mut collected = CollectedSet::default();
        insert(&mut collected, &model, "users", vec![1]);
        insert(&mut collected, &model, "orders", vec![10, 1]);
        assert!(check_referential_integrity(&model, &collected, &[]).is_empty());
    }

    #[test]
    fn missing_parent_is_reported() {
        let model = model();
        let mut collected = CollectedSet::default();
        insert(&mut collected, &model, "orders", vec![10, 1]);

        let violations = check_referential_integrity(&model, &collected, &[]);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].table, "orders");
        assert_eq!(violations[0].row_key, "(10)");
        assert_eq!(violations[0].edge, "orders_user_fkey");
        assert!(violations[0].missing_target.contains("users(1)"));
    }

    #[test]
    fn null_fk_tuple_is_not_a_violation() {
        let model = model();
        let mut collected = CollectedSet::default();
        let orders = model.table_id("orders").unwrap();
        let row = Row::new(vec![SqlValue::Int(10), SqlValue::Null]);
        collected.insert(orders, RowKey(vec![SqlValue::Int(10)]), row);
        assert!(check_referential_integrity(&model, &collected, &[]).is_empty());
    }

    #[test]
    fn deferred_edges_are_exempt() {
        let model = model();
        let mut collected = CollectedSet::default();
        insert(&mut collected, &model, "orders", vec![10, 1]);

        let deferred = vec![model.edges()[0].id];
        assert!(check_referential_integrity(&model, &collected, &deferred).is_empty());
    }

    #[test]
    fn virtual_edges_are_not_checked() {
        let mut model = SchemaModel::default();
        let users = model.add_table(table("users", &[("id", "int8", false)], &["id"]));
        let notes = model.add_table(table(
            "notes",
            &[("id", "int8", false), ("object_id", "int8", true)],
            &["id"],
        ));
        model.add_edge("virtual_notes_users".into(), notes, vec![1], users, vec![0], true);
        model.finalize();

        let mut collected = CollectedSet::default();
        let row = Row::new(vec![SqlValue::Int(1), SqlValue::Int(99)]);
        collected.insert(notes, RowKey(vec![SqlValue::Int(1)]), row);
        assert!(check_referential_integrity(&model, &collected, &[]).is_empty());
    }
}
