// ABOUTME: Set-based row retrieval against the source database
// ABOUTME: Splits oversized IN lists and streams large tables in chunks

use crate::cancel::CancelFlag;
use crate::config::StreamingConfig;
use crate::error::ExtractError;
use crate::schema::Table;
use crate::seed::SeedPredicate;
use crate::traverse::collected::Row;
use crate::traverse::RowSource;
use crate::value::SqlValue;
use async_trait::async_trait;
use futures::{pin_mut, TryStreamExt};
use tokio_postgres::types::ToSql;
use tokio_postgres::Client;

/// PostgreSQL parameters are capped at 65535 per statement; stay clear of
/// the limit when sizing IN-list chunks.
const MAX_PARAMS_PER_QUERY: usize = 60_000;

/// The production [`RowSource`]: parameterized SELECTs over one client.
pub struct PgRowSource<'a> {
    client: &'a Client,
    batch_size: usize,
    streaming: StreamingConfig,
    cancel: CancelFlag,
}

impl<'a> PgRowSource<'a> {
    pub fn new(
        client: &'a Client,
        batch_size: usize,
        streaming: StreamingConfig,
        cancel: CancelFlag,
    ) -> Self {
        PgRowSource {
            client,
            batch_size,
            streaming,
            cancel,
        }
    }

    fn should_stream(&self, table: &Table) -> bool {
        self.streaming.enabled || table.row_estimate >= self.streaming.threshold
    }

    async fn run_query(
        &self,
        table: &Table,
        sql: &str,
        params: Vec<&SqlValue>,
    ) -> Result<Vec<Row>, ExtractError> {
        let fetch_error = |source| ExtractError::Fetch {
            sql: sql.to_string(),
            param_count: params.len(),
            source,
        };

        if self.should_stream(table) {
            // Server-side stream: rows arrive in protocol chunks instead of
            // one materialized response. Collected still holds them all;
            // this bounds the per-read allocation, not the total.
            let stream = self
                .client
                .query_raw(sql, params.clone())
                .await
                .map_err(fetch_error)?;
            pin_mut!(stream);

            let mut rows = Vec::new();
            while let Some(pg_row) = stream.try_next().await.map_err(|source| {
                ExtractError::Fetch {
                    sql: sql.to_string(),
                    param_count: params.len(),
                    source,
                }
            })? {
                rows.push(convert_row(&pg_row).map_err(|source| ExtractError::Fetch {
                    sql: sql.to_string(),
                    param_count: params.len(),
                    source,
                })?);
                if rows.len() % self.streaming.chunk_size == 0 {
                    self.cancel.check()?;
                    tracing::trace!("streamed {} rows from '{}'", rows.len(), table.name);
                }
            }
            Ok(rows)
        } else {
            let refs: Vec<&(dyn ToSql + Sync)> =
                params.iter().map(|v| *v as &(dyn ToSql + Sync)).collect();
            let pg_rows = self
                .client
                .query(sql, &refs)
                .await
                .map_err(fetch_error)?;
            pg_rows
                .iter()
                .map(|r| {
                    convert_row(r).map_err(|source| ExtractError::Fetch {
                        sql: sql.to_string(),
                        param_count: params.len(),
                        source,
                    })
                })
                .collect()
        }
    }
}

#[async_trait]
impl RowSource for PgRowSource<'_> {
    async fn fetch_seed(
        &mut self,
        table: &Table,
        seed: &SeedPredicate,
    ) -> Result<Vec<Row>, ExtractError> {
        self.cancel.check()?;
        let sql = format!(
            "SELECT {} FROM {} WHERE ({})",
            select_list(table),
            table.qualified_name(),
            seed.sql_fragment
        );
        let params: Vec<&SqlValue> = seed.params.iter().collect();
        self.run_query(table, &sql, params).await
    }

    async fn fetch_by_keys(
        &mut self,
        table: &Table,
        key_columns: &[usize],
        keys: &[Vec<SqlValue>],
    ) -> Result<Vec<Row>, ExtractError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let arity = key_columns.len();
        let tuples_per_query = self
            .batch_size
            .min((MAX_PARAMS_PER_QUERY / arity).max(1));

        let mut rows = Vec::new();
        for chunk in keys.chunks(tuples_per_query) {
            self.cancel.check()?;
            let sql = in_list_sql(table, key_columns, chunk.len());
            let params: Vec<&SqlValue> = chunk.iter().flatten().collect();
            rows.extend(self.run_query(table, &sql, params).await?);
        }
        Ok(rows)
    }
}

fn convert_row(pg_row: &tokio_postgres::Row) -> Result<Row, tokio_postgres::Error> {
    let mut values = Vec::with_capacity(pg_row.len());
    for i in 0..pg_row.len() {
        values.push(pg_row.try_get::<_, SqlValue>(i)?);
    }
    Ok(Row::new(values))
}

fn select_list(table: &Table) -> String {
    table
        .columns
        .iter()
        .map(|c| format!("\"{}\"", c.name))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `SELECT cols FROM t WHERE (key-cols) IN (tuple placeholders)`.
/// Single-column keys skip the row-value syntax.
fn in_list_sql(table: &Table, key_columns: &[usize], tuple_count: usize) -> String {
    let arity = key_columns.len();
    let key_list: Vec<String> = key_columns
        .iter()
        .map(|&i| format!("\"{}\"", table.columns[i].name))
        .collect();

    let mut placeholders = Vec::with_capacity(tuple_count);
    for t in 0..tuple_count {
        let slots: Vec<String> = (0..arity).map(|k| format!("${}", t * arity + k + 1)).collect();
        if arity == 1 {
            placeholders.push(slots.into_iter().next().unwrap());
        } else {
            placeholders.push(format!("({})", slots.join(", ")));
        }
    }

    let key_expr = if arity == 1 {
        key_list.into_iter().next().unwrap()
    } else {
        format!("({})", key_list.join(", "))
    };

    format!(
        "SELECT {} FROM {} WHERE {} IN ({})",
        select_list(table),
        table.qualified_name(),
        key_expr,
        placeholders.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::testutil::table;

    #[test]
    fn single_column_in_list() {
        let t = table(
            "users",
            &[("id", "int8", false), ("email", "text", true)],
            &["id"],
        );
        assert_eq!(
            in_list_sql(&t, &[0], 3),
            "SELECT \"id\", \"email\" FROM \"public\".\"users\" \
             WHERE \"id\" IN ($1, $2, $3)"
        );
    }

    #[test]
    fn composite_key_uses_row_value_syntax() {
        let t = table(
            "order_items",
            &[
                ("order_id", "int8", false),
                ("line_no", "int4", false),
                ("sku", "text", false),
            ],
            &["order_id", "line_no"],
        );
        assert_eq!(
            in_list_sql(&t, &[0, 1], 2),
            "SELECT \"order_id\", \"line_no\", \"sku\" FROM \"public\".\"order_items\" \
             WHERE (\"order_id\", \"line_no\") IN (($1, $2), ($3, $4))"
        );
    }

    #[tokio::test]
    #[ignore]
    async fn fetch_against_real_database() {
        let url = std::env::var("TEST_SOURCE_URL")
            .expect("TEST_SOURCE_URL must be set for integration tests");
        let client = crate::db::connect(&url).await.unwrap();
        client
            .execute(
                "CREATE TABLE IF NOT EXISTS fetch_test (id BIGINT PRIMARY KEY, label TEXT)",
                &[],
            )
            .await
            .unwrap();
        client
            .execute(
                "INSERT INTO fetch_test VALUES (1, 'a'), (2, 'b') ON CONFLICT DO NOTHING",
                &[],
            )
            .await
            .unwrap();

        let t = table(
            "fetch_test",
            &[("id", "int8", false), ("label", "text", true)],
            &["id"],
        );
        let mut source = PgRowSource::new(
            &client,
            1000,
            StreamingConfig::default(),
            CancelFlag::new(),
        );
        let rows = source
            .fetch_by_keys(&t, &[0], &[vec![SqlValue::Int(1)], vec![SqlValue::Int(2)]])
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);

        client
            .execute("DROP TABLE fetch_test", &[])
            .await
            .unwrap();
    }
}
