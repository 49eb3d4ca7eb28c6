// ABOUTME: Parses textual seed specs into canonical predicates
// ABOUTME: Two forms: table.column=literal (bound) and table:where-fragment (raw)

use crate::error::ExtractError;
use crate::ident;
use crate::value::SqlValue;

/// A parsed seed: the rows matching `WHERE (sql_fragment)` in `table` are
/// the roots of the traversal. Multiple seeds form a set; their row sets
/// are unioned per table.
#[derive(Debug, Clone, PartialEq)]
pub struct SeedPredicate {
    pub table: String,
    pub sql_fragment: String,
    pub params: Vec<SqlValue>,
}

/// Parse one seed spec.
///
/// * `table.column=literal` becomes a bound equality predicate. Literals:
///   `'quoted string'`, integer, decimal, `true`/`false`, `null`.
/// * `table:<fragment>` embeds the fragment verbatim as a boolean
///   expression. The fragment is not parsed or escaped; whoever writes it
///   accepts SQL-injection responsibility. The table name is still
///   validated.
pub fn parse_seed(spec: &str) -> Result<SeedPredicate, ExtractError> {
    let trimmed = spec.trim();
    if trimmed.is_empty() {
        return Err(ExtractError::invalid_seed(spec, "empty seed specification"));
    }

    // Whichever separator appears first decides the form, so equality
    // literals may contain ':' and predicates may contain '='.
    let colon = trimmed.find(':');
    let equals = trimmed.find('=');
    match (colon, equals) {
        (Some(c), Some(e)) if c < e => parse_predicate(spec, trimmed, c),
        (Some(c), None) => parse_predicate(spec, trimmed, c),
        (_, Some(_)) => parse_equality(spec, trimmed),
        (None, None) => Err(ExtractError::invalid_seed(
            spec,
            "expected table.column=literal or table:<where-fragment>",
        )),
    }
}

fn parse_predicate(
    spec: &str,
    trimmed: &str,
    colon: usize,
) -> Result<SeedPredicate, ExtractError> {
    let table = trimmed[..colon].trim();
    let fragment = trimmed[colon + 1..].trim();
    ident::validate_identifier(table)
        .map_err(|e| ExtractError::invalid_seed(spec, e.to_string()))?;
    if fragment.is_empty() {
        return Err(ExtractError::invalid_seed(
            spec,
            "predicate fragment is empty",
        ));
    }
    Ok(SeedPredicate {
        table: table.to_string(),
        sql_fragment: fragment.to_string(),
        params: Vec::new(),
    })
}

fn parse_equality(spec: &str, trimmed: &str) -> Result<SeedPredicate, ExtractError> {
    let (lhs, literal) = trimmed.split_once('=').ok_or_else(|| {
        ExtractError::invalid_seed(spec, "expected table.column=literal")
    })?;
    let (table, column) = lhs.trim().split_once('.').ok_or_else(|| {
        ExtractError::invalid_seed(spec, "equality seed must be table.column=literal")
    })?;
    let (table, column) = (table.trim(), column.trim());

    ident::validate_identifier(table)
        .map_err(|e| ExtractError::invalid_seed(spec, e.to_string()))?;
    ident::validate_identifier(column)
        .map_err(|e| ExtractError::invalid_seed(spec, e.to_string()))?;

    let value = parse_literal(spec, literal.trim())?;
    let sql_fragment = if value.is_null() {
        // NULL never matches '=', the useful reading is IS NULL.
        format!("\"{}\" IS NULL", column)
    } else {
        format!("\"{}\" = $1", column)
    };
    let params = if value.is_null() { Vec::new() } else { vec![value] };

    Ok(SeedPredicate {
        table: table.to_string(),
        sql_fragment,
        params,
    })
}

fn parse_literal(spec: &str, literal: &str) -> Result<SqlValue, ExtractError> {
    if literal.is_empty() {
        return Err(ExtractError::invalid_seed(spec, "missing literal after '='"));
    }

    if let Some(inner) = literal
        .strip_prefix('\'')
        .and_then(|rest| rest.strip_suffix('\''))
    {
        return Ok(SqlValue::Text(inner.replace("''", "'")));
    }

    match literal {
        "true" => return Ok(SqlValue::Bool(true)),
        "false" => return Ok(SqlValue::Bool(false)),
        "null" => return Ok(SqlValue::Null),
        _ => {}
    }

    if let Ok(int) = literal.parse::<i64>() {
        return Ok(SqlValue::Int(int));
    }
    if literal.contains('.') {
        if let Ok(value) = SqlValue::numeric(literal) {
            return Ok(value);
        }
    }

    Err(ExtractError::invalid_seed(
        spec,
        format!(
            "unrecognized literal '{}' (expected quoted string, number, boolean, or null)",
            literal
        ),
    ))
}
