//! EDGAR submissions API payload.
//!
//! `https://data.sec.gov/submissions/CIK##########.json` lists a company's
//! recent filings as parallel arrays under `filings.recent`.

use chrono::{Datelike, NaiveDate};
use serde::Deserialize;

/// Top-level submissions document. Only the fields we read are modeled.
#[derive(Debug, Clone, Deserialize)]
pub struct Submissions {
    #[serde(default)]
    pub name: Option<String>,
    pub filings: Filings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Filings {
    pub recent: RecentFilings,
}

/// Column-oriented listing of recent filings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentFilings {
    #[serde(default)]
    pub accession_number: Vec<String>,
    #[serde(default)]
    pub report_date: Vec<String>,
    #[serde(default)]
    pub form: Vec<String>,
    #[serde(default)]
    pub primary_document: Vec<String>,
    #[serde(default)]
    pub primary_doc_description: Vec<String>,
}

/// One row of [`RecentFilings`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilingEntry<'a> {
    pub accession_number: &'a str,
    pub report_date: &'a str,
    pub form: &'a str,
    pub primary_document: &'a str,
    pub description: &'a str,
}

impl FilingEntry<'_> {
    /// Year of the report date, if the date is present and well formed.
    pub fn report_year(&self) -> Option<i32> {
        NaiveDate::parse_from_str(self.report_date, "%Y-%m-%d")
            .ok()
            .map(|d| d.year())
    }

    /// The configured filing type this entry belongs to, if any. The primary
    /// document description is checked first, then the form type.
    pub fn matching_type<'t>(&self, types: &'t [String]) -> Option<&'t str> {
        let find = |value: &str| {
            let value = value.trim();
            types
                .iter()
                .find(|t| !value.is_empty() && t.eq_ignore_ascii_case(value))
                .map(String::as_str)
        };
        find(self.description).or_else(|| find(self.form))
    }
}

impl RecentFilings {
    /// Number of filings listed (the length of the accession column).
    pub fn len(&self) -> usize {
        self.accession_number.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accession_number.is_empty()
    }

    /// Iterate rows. Short columns read as empty strings.
    pub fn entries(&self) -> impl Iterator<Item = FilingEntry<'_>> {
        fn col(v: &[String], i: usize) -> &str {
            v.get(i).map(String::as_str).unwrap_or("")
        }
        (0..self.len()).map(move |i| FilingEntry {
            accession_number: col(&self.accession_number, i),
            report_date: col(&self.report_date, i),
            form: col(&self.form, i),
            primary_document: col(&self.primary_document, i),
            description: col(&self.primary_doc_description, i),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "cik": "59478",
        "name": "ELI LILLY & Co",
        "filings": {
            "recent": {
                "accessionNumber": ["0000059478-23-000012", "0000059478-11-000001", "0000059478-23-000099"],
                "reportDate": ["2022-12-31", "2010-12-31", ""],
                "form": ["10-K", "10-K", "4"],
                "primaryDocument": ["lly-20221231.htm", "old.htm", "xslF345X03/doc4.xml"],
                "primaryDocDescription": ["10-K", "10-K", ""]
            }
        }
    }"#;

    #[test]
    fn parses_recent_columns() {
        let subs: Submissions = serde_json::from_str(SAMPLE).expect("parse");
        assert_eq!(subs.name.as_deref(), Some("ELI LILLY & Co"));
        assert_eq!(subs.filings.recent.len(), 3);

        let first = subs.filings.recent.entries().next().unwrap();
        assert_eq!(first.accession_number, "0000059478-23-000012");
        assert_eq!(first.primary_document, "lly-20221231.htm");
        assert_eq!(first.report_year(), Some(2022));
    }

    #[test]
    fn missing_report_date_has_no_year() {
        let subs: Submissions = serde_json::from_str(SAMPLE).unwrap();
        let third = subs.filings.recent.entries().nth(2).unwrap();
        assert_eq!(third.report_year(), None);
    }

    #[test]
    fn matching_type_prefers_description_then_form() {
        let types = vec!["10-K".to_string(), "8-K".to_string()];
        let entry = FilingEntry {
            accession_number: "a",
            report_date: "2020-01-01",
            form: "8-K",
            primary_document: "d.htm",
            description: "10-k",
        };
        assert_eq!(entry.matching_type(&types), Some("10-K"));

        let by_form = FilingEntry {
            description: "",
            ..entry.clone()
        };
        assert_eq!(by_form.matching_type(&types), Some("8-K"));

        let neither = FilingEntry {
            description: "EX-99",
            form: "4",
            ..entry
        };
        assert_eq!(neither.matching_type(&types), None);
    }

    #[test]
    fn ragged_columns_read_as_empty() {
        let recent = RecentFilings {
            accession_number: vec!["a".into(), "b".into()],
            primary_document: vec!["x.htm".into()],
            ..Default::default()
        };
        let rows: Vec<_> = recent.entries().collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].primary_document, "");
    }
}
