//! Core domain types for filings and their analysis state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FilingScanError;

// ---------------------------------------------------------------------------
// DocumentId
// ---------------------------------------------------------------------------

/// Opaque document identifier. For EDGAR filings this is the path the
/// primary document was saved under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub String);

impl DocumentId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for DocumentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ---------------------------------------------------------------------------
// DocumentStatus
// ---------------------------------------------------------------------------

/// Processing status of a document. A document moves from
/// `Unprocessed` to `Processed` exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Unprocessed,
    Processed,
}

impl DocumentStatus {
    /// Value stored in the `filings.status` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unprocessed => "not_checked",
            Self::Processed => "checked",
        }
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DocumentStatus {
    type Err = FilingScanError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "not_checked" => Ok(Self::Unprocessed),
            "checked" => Ok(Self::Processed),
            other => Err(FilingScanError::validation(format!(
                "unknown document status '{other}'"
            ))),
        }
    }
}

/// A document handle as listed by a document source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRef {
    pub id: DocumentId,
    pub status: DocumentStatus,
}

// ---------------------------------------------------------------------------
// Filings
// ---------------------------------------------------------------------------

/// Metadata for a filing about to be recorded by the acquisition client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFiling {
    /// Company display name.
    pub company: String,
    /// SEC Central Index Key, as configured.
    pub cik: String,
    /// Primary document description (e.g. `10-K`).
    pub filing_type: String,
    /// Report date, `YYYY-MM-DD`.
    pub report_date: String,
    /// Path the primary document is stored under. Doubles as [`DocumentId`].
    pub filename: String,
    /// SHA-256 of the stored bytes.
    pub content_hash: Option<String>,
}

/// A stored filing row, including its analysis outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilingRecord {
    pub company: String,
    pub cik: String,
    pub filing_type: String,
    pub report_date: String,
    pub filename: String,
    pub status: DocumentStatus,
    /// Whether an analysis result has been written.
    pub analyzed: bool,
    /// Whether any context window evidenced a drug discontinuation.
    pub discontinued: bool,
    /// Discontinued drug names, in order of first appearance.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub drug_names: Vec<String>,
    /// Reason quoted from the first positive window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// When the analysis result was written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analyzed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_roundtrips_through_column_value() {
        for status in [DocumentStatus::Unprocessed, DocumentStatus::Processed] {
            let parsed: DocumentStatus = status.as_str().parse().expect("parse status");
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn unknown_status_is_rejected() {
        let err = "pending".parse::<DocumentStatus>().unwrap_err();
        assert!(err.to_string().contains("pending"));
    }

    #[test]
    fn document_id_serializes_transparently() {
        let id = DocumentId::from("sec-edgar-filings/59478/10-K/lly-20221231.htm");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, r#""sec-edgar-filings/59478/10-K/lly-20221231.htm""#);
        assert_eq!(id.to_string(), id.as_str());
    }

    #[test]
    fn filing_record_omits_empty_findings() {
        let record = FilingRecord {
            company: "Sanofi".into(),
            cik: "1121404".into(),
            filing_type: "20-F".into(),
            report_date: "2021-12-31".into(),
            filename: "sec-edgar-filings/1121404/20-F/a.htm".into(),
            status: DocumentStatus::Processed,
            analyzed: true,
            discontinued: false,
            drug_names: Vec::new(),
            reason: None,
            analyzed_at: None,
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("drug_names"));
        assert!(json.contains(r#""status":"processed""#));
    }
}
