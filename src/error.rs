// ABOUTME: Typed error kinds for the extraction pipeline
// ABOUTME: Library callers match on these; the CLI wraps them in anyhow

use thiserror::Error;

/// Errors surfaced by the extraction engine.
///
/// Everything here is fatal to the run except `Validation`, whose severity
/// is decided by the `fail_on_validation_error` setting at the command layer.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// Introspection failed or a virtual foreign key references a table or
    /// column that does not exist (or has mismatched column arity).
    #[error("schema error: {0}")]
    Schema(String),

    /// A seed specification could not be parsed or references an unknown
    /// table, unknown column, or an excluded table.
    #[error("invalid seed '{spec}': {reason}")]
    InvalidSeed { spec: String, reason: String },

    /// A database error during seed or neighbor row retrieval. Carries the
    /// offending SQL; bound parameter values are redacted.
    #[error("fetch failed ({sql} with {param_count} bound parameters): {source}")]
    Fetch {
        sql: String,
        param_count: usize,
        #[source]
        source: tokio_postgres::Error,
    },

    /// The topological sorter found a cycle with no nullable foreign key to
    /// defer, so no valid insert order exists.
    #[error("unbreakable foreign-key cycle through tables: {}", cycle.join(" -> "))]
    UnbreakableCycle { cycle: Vec<String> },

    /// Post-extraction referential integrity violations, fatal only when
    /// `fail_on_validation_error` is set.
    #[error("{count} referential integrity violation(s) in extracted set")]
    Validation { count: usize },

    /// The run was cancelled (Ctrl-C). Partial output is left on disk.
    #[error("extraction cancelled")]
    Cancelled,

    /// The connection does not speak PostgreSQL. Other dialects are reserved.
    #[error("unsupported dialect: {0} (only PostgreSQL is supported)")]
    UnsupportedDialect(String),
}

impl ExtractError {
    pub fn schema(msg: impl Into<String>) -> Self {
        ExtractError::Schema(msg.into())
    }

    pub fn invalid_seed(spec: impl Into<String>, reason: impl Into<String>) -> Self {
        ExtractError::InvalidSeed {
            spec: spec.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_error_redacts_parameters() {
        // The Display form must never include bound values, only their count.
        let err = ExtractError::UnbreakableCycle {
            cycle: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(
            err.to_string(),
            "unbreakable foreign-key cycle through tables: a -> b -> a"
        );
    }

    #[test]
    fn invalid_seed_names_spec() {
        let err = ExtractError::invalid_seed("users.id=", "missing literal");
        assert!(err.to_string().contains("users.id="));
        assert!(err.to_string().contains("missing literal"));
    }
}
