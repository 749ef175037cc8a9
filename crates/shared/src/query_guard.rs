//! Conservative read-only query validation and email shape checks.
//!
//! The validator follows the principle of least privilege: only single
//! SELECT statements are allowed, destructive or leaking keywords are
//! rejected as whole words, and system schemas are off limits.

use thiserror::Error;

/// Errors produced by [`validate_query`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryGuardError {
    #[error("only SELECT queries are allowed")]
    NotSelect,

    #[error("multi-statement queries are not allowed")]
    MultipleStatements,

    #[error("forbidden keyword detected: {0}")]
    ForbiddenKeyword(&'static str),

    #[error("access to system schema blocked: {0}")]
    SystemSchema(&'static str),
}

/// Error produced by [`validate_email`].
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid email address format")]
pub struct InvalidEmail;

/// Deny list of DML/DDL keywords and information leakage vectors.
const FORBIDDEN: &[&str] = &[
    "DELETE",
    "DROP",
    "INSERT",
    "UPDATE",
    "ALTER",
    "TRUNCATE",
    "GRANT",
    "REVOKE",
    "CREATE",
    "REPLACE",
    "CALL",
    "DO",
    "HANDLER",
    "LOAD",
    "UNION",
    "USER(",
    "VERSION(",
    "DATABASE(",
    "LOAD_FILE(",
    "@@VERSION",
    "@@HOSTNAME",
];

/// System schemas that must never be referenced by an export query.
const SYSTEM_SCHEMAS: &[&str] = &["INFORMATION_SCHEMA", "MYSQL", "PERFORMANCE_SCHEMA", "SYS"];

/// Validates that a query is a single read-only SELECT statement.
///
/// Rules, applied in order:
/// 1. Must begin with `SELECT` (case-insensitive) after trimming.
/// 2. Must not contain `;` (statement stacking).
/// 3. Must not contain any deny-listed keyword as a whole word.
/// 4. Must not reference a system schema.
pub fn validate_query(query: &str) -> Result<(), QueryGuardError> {
    let trimmed = query.trim();
    let upper = trimmed.to_uppercase();

    if !upper.starts_with("SELECT") {
        return Err(QueryGuardError::NotSelect);
    }

    if trimmed.contains(';') {
        return Err(QueryGuardError::MultipleStatements);
    }

    for word in FORBIDDEN {
        if contains_word(&upper, word) {
            return Err(QueryGuardError::ForbiddenKeyword(word));
        }
    }

    for schema in SYSTEM_SCHEMAS {
        if contains_word(&upper, schema) {
            return Err(QueryGuardError::SystemSchema(schema));
        }
    }

    Ok(())
}

/// Checks that an email address is safe to place in a message header.
///
/// Rejects CR/LF (header injection) and applies a cheap shape check: at least
/// one character before `@`, a `.` at least two characters after it, and a
/// non-empty tail.
pub fn validate_email(email: &str) -> Result<(), InvalidEmail> {
    if email.contains('\r') || email.contains('\n') {
        return Err(InvalidEmail);
    }

    let at = email.find('@').ok_or(InvalidEmail)?;
    let dot = email.rfind('.').ok_or(InvalidEmail)?;
    if at < 1 || dot < at + 2 || dot == email.len() - 1 {
        return Err(InvalidEmail);
    }
    Ok(())
}

/// Returns true when `word` occurs in `haystack` with SQL token boundaries
/// (or the string edge) on both sides. `haystack` must already be uppercase.
fn contains_word(haystack: &str, word: &str) -> bool {
    let h = haystack.as_bytes();
    let w = word.as_bytes();
    if w.is_empty() || h.len() < w.len() {
        return false;
    }

    let mut start = 0;
    while start + w.len() <= h.len() {
        if &h[start..start + w.len()] == w {
            let start_ok = start == 0 || is_boundary(h[start - 1]);
            let end = start + w.len();
            let end_ok = end == h.len() || is_boundary(h[end]);
            if start_ok && end_ok {
                return true;
            }
        }
        start += 1;
    }
    false
}

/// Standard SQL token delimiters.
fn is_boundary(b: u8) -> bool {
    b.is_ascii_whitespace()
        || matches!(
            b,
            b'(' | b')' | b',' | b'=' | b'<' | b'>' | b'`' | b'.' | b'"' | b'[' | b']'
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_select_accepted() {
        assert_eq!(validate_query("SELECT id FROM users LIMIT 10"), Ok(()));
    }

    #[test]
    fn test_lowercase_select_accepted() {
        assert_eq!(validate_query("  select * from orders"), Ok(()));
    }

    #[test]
    fn test_delete_rejected() {
        assert_eq!(
            validate_query("DELETE FROM users"),
            Err(QueryGuardError::NotSelect)
        );
    }

    #[test]
    fn test_stacked_statement_rejected() {
        assert_eq!(
            validate_query("SELECT id FROM users; DROP TABLE users"),
            Err(QueryGuardError::MultipleStatements)
        );
    }

    #[test]
    fn test_embedded_delete_keyword_rejected() {
        assert_eq!(
            validate_query("SELECT * FROM users WHERE id = (DELETE)"),
            Err(QueryGuardError::ForbiddenKeyword("DELETE"))
        );
    }

    #[test]
    fn test_deleted_at_column_accepted() {
        // Reserved word inside an identifier is not a whole-word match.
        assert_eq!(
            validate_query("SELECT deleted_at FROM users WHERE is_deleted = 0"),
            Ok(())
        );
    }

    #[test]
    fn test_union_rejected() {
        assert_eq!(
            validate_query("SELECT id FROM a UNION SELECT id FROM b"),
            Err(QueryGuardError::ForbiddenKeyword("UNION"))
        );
    }

    #[test]
    fn test_version_function_rejected() {
        assert_eq!(
            validate_query("SELECT VERSION()"),
            Err(QueryGuardError::ForbiddenKeyword("VERSION("))
        );
    }

    #[test]
    fn test_global_variable_rejected() {
        assert_eq!(
            validate_query("SELECT @@VERSION"),
            Err(QueryGuardError::ForbiddenKeyword("@@VERSION"))
        );
    }

    #[test]
    fn test_information_schema_rejected() {
        assert_eq!(
            validate_query("SELECT * FROM information_schema.tables"),
            Err(QueryGuardError::SystemSchema("INFORMATION_SCHEMA"))
        );
    }

    #[test]
    fn test_mysql_schema_rejected() {
        assert_eq!(
            validate_query("SELECT * FROM mysql.user"),
            Err(QueryGuardError::SystemSchema("MYSQL"))
        );
    }

    #[test]
    fn test_sys_as_identifier_part_accepted() {
        assert_eq!(validate_query("SELECT sys_id FROM tickets"), Ok(()));
    }

    #[test]
    fn test_keyword_at_boundary_chars_rejected() {
        assert_eq!(
            validate_query("SELECT (TRUNCATE) FROM x"),
            Err(QueryGuardError::ForbiddenKeyword("TRUNCATE"))
        );
    }

    #[test]
    fn test_valid_email() {
        assert_eq!(validate_email("user@example.com"), Ok(()));
    }

    #[test]
    fn test_email_header_injection_rejected() {
        assert_eq!(
            validate_email("user@example.com\r\nBcc: spam@evil.com"),
            Err(InvalidEmail)
        );
    }

    #[test]
    fn test_email_missing_at_rejected() {
        assert_eq!(validate_email("user.example.com"), Err(InvalidEmail));
    }

    #[test]
    fn test_email_trailing_dot_rejected() {
        assert_eq!(validate_email("user@example."), Err(InvalidEmail));
    }

    #[test]
    fn test_email_dot_too_close_to_at_rejected() {
        assert_eq!(validate_email("user@.com"), Err(InvalidEmail));
    }
}
