//! Partition key derivation (country code × registration month)

use std::path::PathBuf;

use chrono::NaiveDate;

use crate::extract::Record;

/// Country used when the record has no usable country code
pub const UNKNOWN_COUNTRY: &str = "XX";

/// Month used when the record has no usable registration date
pub const UNKNOWN_MONTH: &str = "unknown";

/// Destination of a record: `<month>/<prefix>.<country>.xml`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionKey {
    pub month: String,
    pub country: String,
}

impl PartitionKey {
    pub fn new(country: impl Into<String>, month: impl Into<String>) -> Self {
        Self {
            month: month.into(),
            country: country.into(),
        }
    }

    /// Path relative to the extracts directory
    pub fn relative_path(&self, prefix: &str) -> PathBuf {
        PathBuf::from(&self.month).join(format!("{prefix}.{}.xml", self.country))
    }
}

impl std::fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.month, self.country)
    }
}

/// Why a key field fell back to its sentinel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldIssue {
    Missing,
    Invalid,
}

/// Which parts of a key are sentinels, and why
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Degradation {
    pub country: Option<FieldIssue>,
    pub date: Option<FieldIssue>,
}

impl Degradation {
    pub fn is_degraded(&self) -> bool {
        self.country.is_some() || self.date.is_some()
    }
}

/// Key derived for one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedKey {
    pub key: PartitionKey,
    pub degradation: Degradation,
}

impl DerivedKey {
    pub fn is_degraded(&self) -> bool {
        self.degradation.is_degraded()
    }
}

/// Derive the partition key of a record. Never fails: unusable fields map to
/// [`UNKNOWN_COUNTRY`] / [`UNKNOWN_MONTH`].
pub fn derive_key(record: &Record) -> DerivedKey {
    let mut degradation = Degradation::default();

    let country = country_code(record.country.as_deref()).unwrap_or_else(|issue| {
        degradation.country = Some(issue);
        UNKNOWN_COUNTRY.to_string()
    });
    let month = registration_month(record.regdate.as_deref()).unwrap_or_else(|issue| {
        degradation.date = Some(issue);
        UNKNOWN_MONTH.to_string()
    });

    DerivedKey {
        key: PartitionKey { month, country },
        degradation,
    }
}

/// Normalize a country code: two ASCII letters, upper-cased.
pub fn country_code(raw: Option<&str>) -> Result<String, FieldIssue> {
    let code = raw.map(str::trim).unwrap_or_default();
    if code.is_empty() {
        return Err(FieldIssue::Missing);
    }
    if code.len() != 2 || !code.bytes().all(|b| b.is_ascii_alphabetic()) {
        return Err(FieldIssue::Invalid);
    }
    Ok(code.to_ascii_uppercase())
}

/// `YYYY-MM` of a registration date.
///
/// The first 10 characters must be a real `YYYY-MM-DD` calendar date; anything
/// after them (time, zone) is ignored.
pub fn registration_month(raw: Option<&str>) -> Result<String, FieldIssue> {
    let text = raw.map(str::trim).unwrap_or_default();
    if text.is_empty() {
        return Err(FieldIssue::Missing);
    }
    let date = text.get(..10).ok_or(FieldIssue::Invalid)?;

    let shape_ok = date.bytes().enumerate().all(|(i, b)| match i {
        4 | 7 => b == b'-',
        _ => b.is_ascii_digit(),
    });
    if !shape_ok || NaiveDate::parse_from_str(date, "%Y-%m-%d").is_err() {
        return Err(FieldIssue::Invalid);
    }
    Ok(date[..7].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(country: Option<&str>, regdate: Option<&str>) -> Record {
        Record {
            seq: 1,
            raw: Vec::new(),
            country: country.map(String::from),
            regdate: regdate.map(String::from),
            end_offset: 0,
        }
    }

    #[test]
    fn clean_key() {
        let d = derive_key(&record(Some("BE"), Some("2025-10-14")));
        assert_eq!(d.key, PartitionKey::new("BE", "2025-10"));
        assert!(!d.is_degraded());
    }

    #[test]
    fn country_is_uppercased() {
        assert_eq!(country_code(Some(" fr ")), Ok("FR".to_string()));
    }

    #[test]
    fn missing_country() {
        let d = derive_key(&record(None, Some("2025-03-01")));
        assert_eq!(d.key, PartitionKey::new("XX", "2025-03"));
        assert_eq!(d.degradation.country, Some(FieldIssue::Missing));
        assert_eq!(d.degradation.date, None);
        assert_eq!(country_code(Some("  ")), Err(FieldIssue::Missing));
    }

    #[test]
    fn invalid_country() {
        assert_eq!(country_code(Some("BEL")), Err(FieldIssue::Invalid));
        assert_eq!(country_code(Some("1A")), Err(FieldIssue::Invalid));
        assert_eq!(country_code(Some("É")), Err(FieldIssue::Invalid));
    }

    #[test]
    fn missing_date() {
        let d = derive_key(&record(Some("NL"), None));
        assert_eq!(d.key, PartitionKey::new("NL", "unknown"));
        assert_eq!(d.degradation.date, Some(FieldIssue::Missing));
        assert_eq!(registration_month(Some("")), Err(FieldIssue::Missing));
    }

    #[test]
    fn invalid_dates() {
        for bad in [
            "2025-13-01",
            "2025-02-30",
            "2025-00-10",
            "2025-1-011",
            "20251001",
            "2025-10",
            "abcd-ef-gh",
            "+202-10-01",
            "2025/10/01",
        ] {
            assert_eq!(
                registration_month(Some(bad)),
                Err(FieldIssue::Invalid),
                "{bad} should be invalid"
            );
        }
    }

    #[test]
    fn date_with_time_suffix() {
        assert_eq!(
            registration_month(Some("2024-02-29T10:00:00Z")),
            Ok("2024-02".to_string())
        );
        assert_eq!(
            registration_month(Some(" 2023-12-31 ")),
            Ok("2023-12".to_string())
        );
    }

    #[test]
    fn both_missing_is_doubly_sentinel() {
        let d = derive_key(&record(None, None));
        assert_eq!(d.key, PartitionKey::new(UNKNOWN_COUNTRY, UNKNOWN_MONTH));
        assert_eq!(
            d.degradation,
            Degradation {
                country: Some(FieldIssue::Missing),
                date: Some(FieldIssue::Missing),
            }
        );
    }

    #[test]
    fn relative_path_layout() {
        let key = PartitionKey::new("BE", "2025-10");
        assert_eq!(key.relative_path("x"), PathBuf::from("2025-10/x.BE.xml"));
        assert_eq!(key.to_string(), "2025-10/BE");
    }
}
