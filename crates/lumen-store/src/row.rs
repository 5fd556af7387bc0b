//! Column encoding shared by the per-entity modules.
//!
//! Identifiers are stored as hyphenated UUID text and timestamps as RFC-3339
//! with a fixed microsecond precision, so that `ORDER BY created_at` on the
//! text column matches chronological order.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;

pub(crate) fn ts(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Current time truncated to the stored precision.
pub(crate) fn now() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::parse_from_rfc3339(&ts(&now))
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(now)
}

pub(crate) fn get_ts(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn get_id<T>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = uuid::Error>,
{
    let raw: String = row.get(idx)?;
    T::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn get_opt_id<T>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr<Err = uuid::Error>,
{
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| T::from_str(&s))
        .transpose()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Unicode lowercase form stored next to searchable text. SQLite's own
/// `LIKE` and `lower()` only fold ASCII.
pub(crate) fn fold_case(text: &str) -> String {
    text.to_lowercase()
}

/// Escape `%`, `_` and `\` so user input matches literally inside `LIKE`.
/// Use with `ESCAPE '\'`.
pub(crate) fn like_pattern(needle: &str) -> String {
    let mut out = String::with_capacity(needle.len() + 2);
    out.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_sort_lexicographically() {
        let a = DateTime::parse_from_rfc3339("2024-01-01T00:00:05Z")
            .unwrap()
            .with_timezone(&Utc);
        let b = DateTime::parse_from_rfc3339("2024-01-01T00:00:05.000010Z")
            .unwrap()
            .with_timezone(&Utc);
        assert!(ts(&a) < ts(&b));
        assert_eq!(ts(&a), "2024-01-01T00:00:05.000000Z");
    }

    #[test]
    fn fold_case_handles_non_ascii() {
        assert_eq!(fold_case("Émile"), "émile");
        assert_eq!(fold_case("ÇA VA"), "ça va");
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("ali"), "%ali%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }
}
