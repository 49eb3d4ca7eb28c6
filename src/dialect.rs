// ABOUTME: Narrow dialect surface used by the SQL emitter
// ABOUTME: Identifier/literal quoting plus DROP and FK-disable statement shapes

use crate::value::SqlValue;

/// The capabilities the emitter needs from a SQL dialect. PostgreSQL is the
/// only concrete implementation; the seam exists so quoting rules stay in
/// one place rather than scattered through the writers.
pub trait Dialect {
    fn quote_identifier(&self, ident: &str) -> String;
    fn quote_literal(&self, value: &SqlValue) -> String;
    fn drop_table_stmt(&self, qualified_name: &str) -> String;
    /// Session-level statement that relaxes FK enforcement, if the dialect
    /// has one.
    fn fk_disable_stmt(&self) -> Option<String>;
    fn supports_server_cursors(&self) -> bool;
}

pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn quote_identifier(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    fn quote_literal(&self, value: &SqlValue) -> String {
        match value {
            SqlValue::Null => "NULL".to_string(),
            SqlValue::Bool(true) => "TRUE".to_string(),
            SqlValue::Bool(false) => "FALSE".to_string(),
            SqlValue::Int(i) => i.to_string(),
            SqlValue::Float(f) => {
                if f.is_finite() {
                    f.to_string()
                } else if f.is_nan() {
                    "'NaN'::float8".to_string()
                } else if *f > 0.0 {
                    "'Infinity'::float8".to_string()
                } else {
                    "'-Infinity'::float8".to_string()
                }
            }
            SqlValue::Numeric { text, .. } => {
                if text == "NaN" {
                    "'NaN'::numeric".to_string()
                } else {
                    text.clone()
                }
            }
            SqlValue::Text(s) => quote_string(s),
            SqlValue::Bytes(b) => format!("'\\x{}'", hex::encode(b)),
            SqlValue::Timestamp(t) => {
                format!("'{}'", t.format("%Y-%m-%dT%H:%M:%S%.f"))
            }
            SqlValue::TimestampTz(t) => format!("'{}'", t.to_rfc3339()),
            SqlValue::Date(d) => format!("'{}'", d),
            SqlValue::Time(t) => format!("'{}'", t),
            SqlValue::Uuid(u) => format!("'{}'", u),
            SqlValue::Json(j) => quote_string(&j.to_string()),
        }
    }

    fn drop_table_stmt(&self, qualified_name: &str) -> String {
        format!("DROP TABLE IF EXISTS {} CASCADE;", qualified_name)
    }

    fn fk_disable_stmt(&self) -> Option<String> {
        Some("SET session_replication_role = replica;".to_string())
    }

    fn supports_server_cursors(&self) -> bool {
        true
    }
}

/// Single-quoted string with standard quote doubling.
fn quote_string(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};

    #[test]
    fn string_quoting_doubles_single_quotes() {
        let d = PostgresDialect;
        assert_eq!(
            d.quote_literal(&SqlValue::Text("O'Brien".into())),
            "'O''Brien'"
        );
        assert_eq!(d.quote_literal(&SqlValue::Text("plain".into())), "'plain'");
    }

    #[test]
    fn scalar_literals() {
        let d = PostgresDialect;
        assert_eq!(d.quote_literal(&SqlValue::Null), "NULL");
        assert_eq!(d.quote_literal(&SqlValue::Bool(true)), "TRUE");
        assert_eq!(d.quote_literal(&SqlValue::Bool(false)), "FALSE");
        assert_eq!(d.quote_literal(&SqlValue::Int(-42)), "-42");
        assert_eq!(d.quote_literal(&SqlValue::Float(1.5)), "1.5");
        assert_eq!(
            d.quote_literal(&SqlValue::numeric("19.99").unwrap()),
            "19.99"
        );
    }

    #[test]
    fn nonfinite_floats_are_cast_literals() {
        let d = PostgresDialect;
        assert_eq!(d.quote_literal(&SqlValue::Float(f64::NAN)), "'NaN'::float8");
        assert_eq!(
            d.quote_literal(&SqlValue::Float(f64::NEG_INFINITY)),
            "'-Infinity'::float8"
        );
    }

    #[test]
    fn bytes_use_hex_literals() {
        let d = PostgresDialect;
        assert_eq!(
            d.quote_literal(&SqlValue::Bytes(vec![0xDE, 0xAD])),
            "'\\xdead'"
        );
    }

    #[test]
    fn temporal_literals_are_iso8601() {
        let d = PostgresDialect;
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(d.quote_literal(&SqlValue::Date(date)), "'2024-03-09'");

        let tz = Utc.with_ymd_and_hms(2024, 3, 9, 12, 30, 0).unwrap();
        assert_eq!(
            d.quote_literal(&SqlValue::TimestampTz(tz)),
            "'2024-03-09T12:30:00+00:00'"
        );
    }

    #[test]
    fn identifier_quoting() {
        let d = PostgresDialect;
        assert_eq!(d.quote_identifier("users"), "\"users\"");
        assert_eq!(d.quote_identifier("weird\"name"), "\"weird\"\"name\"");
    }

    #[test]
    fn statement_shapes() {
        let d = PostgresDialect;
        assert_eq!(
            d.drop_table_stmt("\"public\".\"users\""),
            "DROP TABLE IF EXISTS \"public\".\"users\" CASCADE;"
        );
        assert!(d.fk_disable_stmt().unwrap().contains("session_replication_role"));
        assert!(d.supports_server_cursors());
    }
}
