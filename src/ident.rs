// ABOUTME: PostgreSQL identifier validation for names arriving from user input
// ABOUTME: Seeds, config excludes, and virtual-FK declarations pass through here

use anyhow::{bail, Result};

/// Validate a PostgreSQL identifier (table, column, or schema name).
///
/// Accepted names are at most 63 bytes and match `[A-Za-z_][A-Za-z0-9_]*`.
/// Every name that can end up embedded in SQL text goes through this check;
/// values travel as bound parameters and never need it.
pub fn validate_identifier(identifier: &str) -> Result<()> {
    let name = identifier.trim();
    if name.is_empty() {
        bail!("expected an identifier, got nothing");
    }
    if name.len() > 63 {
        bail!(
            "identifier '{}' is {} bytes long, over PostgreSQL's limit of 63",
            sanitize_for_display(name),
            name.len()
        );
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && *c != '_')
    {
        bail!(
            "identifier '{}' contains '{}'; only ASCII letters, digits, and underscores are allowed",
            sanitize_for_display(name),
            bad.escape_default()
        );
    }
    if name.as_bytes()[0].is_ascii_digit() {
        bail!(
            "identifier '{}' starts with a digit; PostgreSQL names start with a letter or underscore",
            sanitize_for_display(name)
        );
    }
    Ok(())
}

/// Make an untrusted name safe to echo into error messages and logs:
/// control characters become '?', and the result is capped at 64 chars.
pub fn sanitize_for_display(identifier: &str) -> String {
    identifier
        .chars()
        .take(64)
        .map(|c| if c.is_control() { '?' } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_identifiers() {
        assert!(validate_identifier("users").is_ok());
        assert!(validate_identifier("order_items").is_ok());
        assert!(validate_identifier("_private").is_ok());
        assert!(validate_identifier("t2024").is_ok());

        let max_length = "a".repeat(63);
        assert!(validate_identifier(&max_length).is_ok());
    }

    #[test]
    fn invalid_identifiers() {
        // Injection attempts
        assert!(validate_identifier("users\"; DROP TABLE users; --").is_err());
        assert!(validate_identifier("t'; DELETE FROM users; --").is_err());

        assert!(validate_identifier("123abc").is_err());
        assert!(validate_identifier("-t").is_err());
        assert!(validate_identifier("my-table").is_err());
        assert!(validate_identifier("my table").is_err());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("   ").is_err());
        assert!(validate_identifier("my\ntable").is_err());

        let too_long = "a".repeat(64);
        assert!(validate_identifier(&too_long).is_err());
    }

    #[test]
    fn error_messages_name_the_problem() {
        let err = validate_identifier("9lives").unwrap_err().to_string();
        assert!(err.contains("starts with a digit"));

        let err = validate_identifier("a-b").unwrap_err().to_string();
        assert!(err.contains("only ASCII letters"));
    }

    #[test]
    fn sanitize_neutralizes_control_chars() {
        assert_eq!(sanitize_for_display("normal_table"), "normal_table");
        assert_eq!(sanitize_for_display("tab\x00le"), "tab?le");
        assert_eq!(sanitize_for_display("tab\nle"), "tab?le");
        assert_eq!(sanitize_for_display(&"a".repeat(200)).len(), 64);
    }
}
