//! EDGAR download client.
//!
//! Fetches a company's submissions listing, keeps the filings of the
//! configured types and years, downloads each primary document into the
//! filings directory, and records it in the storage layer.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use reqwest::Client;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};
use url::Url;

use filingscan_shared::{DownloadConfig, FilingScanError, NewFiling, Result};
use filingscan_storage::Storage;

use crate::submissions::{FilingEntry, Submissions};

// ---------------------------------------------------------------------------
// DownloadResult
// ---------------------------------------------------------------------------

/// Summary of one company's download.
#[derive(Debug, Clone, Default)]
pub struct DownloadResult {
    /// Filings fetched from EDGAR and recorded.
    pub downloaded: usize,
    /// Filings already recorded in the database.
    pub already_recorded: usize,
    /// Filings found on disk and recorded without a fetch.
    pub found_on_disk: usize,
    /// Listed filings outside the configured types or years.
    pub skipped: usize,
    /// Per-filing fetch failures (document URL, error message).
    pub errors: Vec<(String, String)>,
    /// Total duration of the download.
    pub duration: Duration,
}

// ---------------------------------------------------------------------------
// EdgarClient
// ---------------------------------------------------------------------------

/// Client for the EDGAR submissions API and filing archives.
pub struct EdgarClient {
    config: DownloadConfig,
    client: Client,
}

impl EdgarClient {
    /// Create a client. EDGAR rejects requests without a contact user agent,
    /// so `user_agent` is required.
    pub fn new(config: DownloadConfig, user_agent: &str) -> Result<Self> {
        if user_agent.trim().is_empty() {
            return Err(FilingScanError::config("EDGAR user agent must not be empty"));
        }
        for base in [&config.submissions_base_url, &config.archives_base_url] {
            Url::parse(base)
                .map_err(|e| FilingScanError::config(format!("invalid EDGAR URL {base}: {e}")))?;
        }

        let client = Client::builder()
            .user_agent(user_agent.to_string())
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| FilingScanError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    /// Download all matching filings for one company.
    #[instrument(skip_all, fields(company = %company, cik = %cik))]
    pub async fn download_company(
        &self,
        company: &str,
        cik: &str,
        storage: &Storage,
    ) -> Result<DownloadResult> {
        let start_time = Instant::now();
        let mut result = DownloadResult::default();

        let submissions = self.fetch_submissions(cik).await?;
        let recent = &submissions.filings.recent;

        info!(listed = recent.len(), "fetched submissions");

        for (i, entry) in recent.entries().enumerate() {
            let Some(doc_type) = self.accept(&entry) else {
                result.skipped += 1;
                continue;
            };

            let path = filing_path(&self.config.filings_dir, cik, doc_type, entry.primary_document);
            let filename = path.to_string_lossy().into_owned();

            if storage.is_filing_recorded(&filename).await? {
                debug!(n = i + 1, %filename, "filing already recorded");
                result.already_recorded += 1;
                continue;
            }

            let content_hash = if path.is_file() {
                debug!(n = i + 1, %filename, "filing found on disk");
                result.found_on_disk += 1;
                None
            } else {
                let url = self.submission_url(cik, entry.accession_number, entry.primary_document);
                debug!(n = i + 1, %url, "downloading filing");
                let fetched = self.fetch_document(&url).await;
                self.pause().await;
                match fetched {
                    Ok(body) => {
                        write_filing(&path, &body).await?;
                        result.downloaded += 1;
                        Some(compute_hash(&body))
                    }
                    Err(e) => {
                        warn!(%url, error = %e, "filing download failed");
                        result.errors.push((url, e.to_string()));
                        continue;
                    }
                }
            };

            storage
                .insert_filing(&NewFiling {
                    company: company.to_string(),
                    cik: cik.to_string(),
                    filing_type: doc_type.to_string(),
                    report_date: entry.report_date.to_string(),
                    filename,
                    content_hash,
                })
                .await?;
        }

        result.duration = start_time.elapsed();
        info!(
            downloaded = result.downloaded,
            already_recorded = result.already_recorded,
            found_on_disk = result.found_on_disk,
            skipped = result.skipped,
            errors = result.errors.len(),
            duration_ms = result.duration.as_millis(),
            "company download completed"
        );
        Ok(result)
    }

    /// Filing type of `entry` if it should be kept.
    fn accept<'c>(&'c self, entry: &FilingEntry<'_>) -> Option<&'c str> {
        let doc_type = entry.matching_type(&self.config.filing_types)?;
        if !is_safe_segment(entry.primary_document) {
            if !entry.primary_document.is_empty() {
                warn!(document = entry.primary_document, "unusable document name");
            }
            return None;
        }
        match entry.report_year() {
            Some(year) if year >= self.config.start_year => Some(doc_type),
            _ => None,
        }
    }

    /// Fetch and parse the submissions listing for `cik`.
    async fn fetch_submissions(&self, cik: &str) -> Result<Submissions> {
        let url = self.submissions_url(cik);
        debug!(%url, "fetching submissions");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FilingScanError::Network(format!("{url}: {e}")));
        self.pause().await;
        let response = response?;

        let status = response.status();
        if !status.is_success() {
            return Err(FilingScanError::Network(format!("{url}: HTTP {status}")));
        }

        response
            .json::<Submissions>()
            .await
            .map_err(|e| FilingScanError::parse(format!("{url}: invalid submissions JSON: {e}")))
    }

    /// Fetch one filing document body.
    async fn fetch_document(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FilingScanError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FilingScanError::Network(format!("{url}: HTTP {status}")));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FilingScanError::Network(format!("{url}: body read failed: {e}")))?;
        Ok(body.to_vec())
    }

    /// EDGAR allows at most 10 requests per second.
    async fn pause(&self) {
        if self.config.rate_limit_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.rate_limit_ms)).await;
        }
    }

    /// `{base}/submissions/CIK##########.json`
    pub fn submissions_url(&self, cik: &str) -> String {
        format!(
            "{}/submissions/CIK{:0>10}.json",
            self.config.submissions_base_url.trim_end_matches('/'),
            cik.trim()
        )
    }

    /// Archive URL of a filing's primary document.
    pub fn submission_url(&self, cik: &str, accession: &str, document: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.config.archives_base_url.trim_end_matches('/'),
            cik.trim().trim_start_matches('0'),
            accession.replace('-', ""),
            document
        )
    }
}

/// Local path of a filing: `{filings_dir}/{cik}/{type}/{document}`.
pub fn filing_path(filings_dir: &Path, cik: &str, doc_type: &str, document: &str) -> PathBuf {
    filings_dir.join(cik).join(doc_type).join(document)
}

/// Whether `name` can be used as a single path component.
fn is_safe_segment(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
}

async fn write_filing(path: &Path, body: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| FilingScanError::io(parent, e))?;
    }
    tokio::fs::write(path, body)
        .await
        .map_err(|e| FilingScanError::io(path, e))
}

/// Compute SHA-256 hash of content.
fn compute_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}
