//! Submission-time validation of user rows, before any record reaches the store.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use url::Url;

use crate::error::{SubmissionError, ValidationError};
use crate::models::LinkRecord;
use crate::shortcode;

pub const DEFAULT_MAX_BATCH_SIZE: usize = 5;
pub const DEFAULT_VALIDITY_MINUTES: i64 = 30;

const MILLIS_PER_MINUTE: i64 = 60_000;

/// One row of the shorten form, as typed by the user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionRow {
    pub original: String,
    /// Minutes; empty or omitted means the default, "0" means never expires
    #[serde(default)]
    pub validity: Option<String>,
    #[serde(default)]
    pub preferred: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmissionLimits {
    pub max_batch_size: usize,
    pub default_validity_minutes: i64,
}

impl Default for SubmissionLimits {
    fn default() -> Self {
        Self {
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            default_validity_minutes: DEFAULT_VALIDITY_MINUTES,
        }
    }
}

impl SubmissionRow {
    pub fn new(original: impl Into<String>) -> Self {
        Self {
            original: original.into(),
            ..Default::default()
        }
    }

    pub fn validity(mut self, minutes: impl Into<String>) -> Self {
        self.validity = Some(minutes.into());
        self
    }

    pub fn preferred(mut self, code: impl Into<String>) -> Self {
        self.preferred = Some(code.into());
        self
    }
}

/// Accept only absolute `http`/`https` URLs. Returns the trimmed input.
pub fn parse_original(original: &str) -> Result<String, ValidationError> {
    let trimmed = original.trim();
    let url = Url::parse(trimmed).map_err(|_| ValidationError::InvalidUrl)?;
    match url.scheme() {
        "http" | "https" if url.has_host() => Ok(trimmed.to_string()),
        _ => Err(ValidationError::InvalidUrl),
    }
}

/// Parse a validity in minutes; blank input yields `default_minutes`
pub fn parse_validity(
    validity: Option<&str>,
    default_minutes: i64,
) -> Result<i64, ValidationError> {
    let raw = validity.map(str::trim).unwrap_or("");
    if raw.is_empty() {
        return Ok(default_minutes);
    }
    match raw.parse::<i64>() {
        Ok(minutes) if minutes >= 0 => Ok(minutes),
        _ => Err(ValidationError::InvalidValidity),
    }
}

/// Expiry timestamp for a validity; zero minutes never expires
pub fn expires_at(now: i64, minutes: i64) -> Result<Option<i64>, ValidationError> {
    if minutes == 0 {
        return Ok(None);
    }
    minutes
        .checked_mul(MILLIS_PER_MINUTE)
        .and_then(|offset| now.checked_add(offset))
        .map(Some)
        .ok_or(ValidationError::InvalidValidity)
}

/// Validate every row and allocate its shortcode.
///
/// Rows are checked in order against `existing` plus the ids already
/// allocated to earlier rows of the same batch. The first failing row
/// rejects the whole batch; nothing is returned for partial success.
pub fn prepare_batch(
    rows: &[SubmissionRow],
    existing: &HashSet<String>,
    now: i64,
    limits: &SubmissionLimits,
) -> Result<Vec<LinkRecord>, SubmissionError> {
    if rows.len() > limits.max_batch_size {
        return Err(SubmissionError::TooManyRows {
            rows: rows.len(),
            max: limits.max_batch_size,
        });
    }

    let mut taken = existing.clone();
    let mut records = Vec::with_capacity(rows.len());

    for (index, row) in rows.iter().enumerate() {
        let record = prepare_row(row, &taken, now, limits)
            .map_err(|source| SubmissionError::Row { row: index, source })?;
        taken.insert(record.id.clone());
        records.push(record);
    }

    Ok(records)
}

fn prepare_row(
    row: &SubmissionRow,
    taken: &HashSet<String>,
    now: i64,
    limits: &SubmissionLimits,
) -> Result<LinkRecord, ValidationError> {
    let original = parse_original(&row.original)?;
    let default_minutes = limits.default_validity_minutes;
    let minutes = parse_validity(row.validity.as_deref(), default_minutes)?;
    let expires_at = expires_at(now, minutes)?;
    let id = shortcode::allocate(row.preferred.as_deref(), taken)?;

    Ok(LinkRecord::new(id, original, now, expires_at))
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000_000;

    fn prepare(rows: &[SubmissionRow]) -> Result<Vec<LinkRecord>, SubmissionError> {
        prepare_batch(rows, &HashSet::new(), NOW, &SubmissionLimits::default())
    }

    #[test]
    fn test_parse_original() {
        assert!(parse_original("https://example.com").is_ok());
        assert!(parse_original(" http://example.com/a?b=c ").is_ok());
        assert_eq!(parse_original("ftp://x"), Err(ValidationError::InvalidUrl));
        assert_eq!(parse_original("example.com"), Err(ValidationError::InvalidUrl));
        assert_eq!(parse_original(""), Err(ValidationError::InvalidUrl));
        assert_eq!(parse_original("mailto:a@b.c"), Err(ValidationError::InvalidUrl));
    }

    #[test]
    fn test_parse_validity() {
        assert_eq!(parse_validity(None, 30), Ok(30));
        assert_eq!(parse_validity(Some("  "), 30), Ok(30));
        assert_eq!(parse_validity(Some("0"), 30), Ok(0));
        assert_eq!(parse_validity(Some("45"), 30), Ok(45));
        assert_eq!(
            parse_validity(Some("-1"), 30),
            Err(ValidationError::InvalidValidity)
        );
        assert_eq!(
            parse_validity(Some("ten"), 30),
            Err(ValidationError::InvalidValidity)
        );
        assert_eq!(
            parse_validity(Some("1.5"), 30),
            Err(ValidationError::InvalidValidity)
        );
    }

    #[test]
    fn test_expires_at() {
        assert_eq!(expires_at(NOW, 0), Ok(None));
        assert_eq!(expires_at(NOW, 30), Ok(Some(NOW + 30 * 60_000)));
        assert_eq!(expires_at(NOW, i64::MAX), Err(ValidationError::InvalidValidity));
    }

    #[test]
    fn test_zero_validity_never_expires() {
        let rows = [SubmissionRow::new("https://example.com").validity("0")];
        let records = prepare(&rows).unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].expires_at, None);
        assert_eq!(records[0].created_at, NOW);
        assert_eq!(records[0].clicks, 0);
    }

    #[test]
    fn test_default_validity_applies() {
        let rows = [SubmissionRow::new("https://example.com")];
        let records = prepare(&rows).unwrap();
        assert_eq!(records[0].expires_at, Some(NOW + 30 * 60_000));
    }

    #[test]
    fn test_invalid_url_rejected() {
        let rows = [SubmissionRow::new("ftp://x")];
        let err = prepare(&rows).unwrap_err();
        assert_eq!(err.row(), Some(0));
        assert_eq!(err.validation(), Some(&ValidationError::InvalidUrl));
    }

    #[test]
    fn test_duplicate_preferred_within_batch() {
        let rows = [
            SubmissionRow::new("https://a.example").preferred("promo"),
            SubmissionRow::new("https://b.example").preferred("promo"),
        ];
        let err = prepare(&rows).unwrap_err();

        assert_eq!(
            err,
            SubmissionError::Row {
                row: 1,
                source: ValidationError::ShortcodeTaken("promo".to_string()),
            }
        );
    }

    #[test]
    fn test_padded_preferred_is_invalid() {
        let rows = [SubmissionRow::new("https://a.example").preferred(" promo ")];
        let err = prepare(&rows).unwrap_err();
        assert_eq!(err.validation(), Some(&ValidationError::InvalidShortcode));
    }

    #[test]
    fn test_first_failure_is_reported() {
        let rows = [
            SubmissionRow::new("https://a.example"),
            SubmissionRow::new("https://b.example").validity("-5"),
            SubmissionRow::new("not a url"),
        ];
        let err = prepare(&rows).unwrap_err();
        assert_eq!(err.row(), Some(1));
        assert_eq!(err.validation(), Some(&ValidationError::InvalidValidity));
    }

    #[test]
    fn test_batch_size_limit() {
        let rows = vec![SubmissionRow::new("https://a.example"); 6];
        let err = prepare(&rows).unwrap_err();
        assert_eq!(err, SubmissionError::TooManyRows { rows: 6, max: 5 });
    }

    #[test]
    fn test_generated_ids_are_unique_within_batch() {
        let rows = vec![SubmissionRow::new("https://a.example"); 5];
        let records = prepare(&rows).unwrap();
        let ids: HashSet<_> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids.len(), 5);
    }
}
