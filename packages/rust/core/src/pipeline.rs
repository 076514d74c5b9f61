//! End-to-end workflows: EDGAR download → filing store → analysis pass.

use std::time::{Duration, Instant};

use tracing::{info, instrument, warn};

use filingscan_edgar::{DownloadResult, EdgarClient};
use filingscan_shared::{AnalysisSettings, CompanyEntry, DocumentId, FilingScanError, Result};
use filingscan_storage::Storage;

use crate::analysis::{AnalysisProgress, DocumentReport, PassReport, run_analysis_pass};
use crate::classifier::Classify;

/// Progress callback for the full pipeline.
pub trait ProgressReporter: AnalysisProgress {
    /// Called after each company's download, successful or not.
    fn company_downloaded(&self, company: &str, current: usize, total: usize, result: Option<&DownloadResult>);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl AnalysisProgress for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn document_started(&self, _id: &DocumentId, _current: usize, _total: usize) {}
    fn window_classified(&self, _id: &DocumentId, _current: usize, _total: usize, _ok: bool) {}
    fn document_finished(&self, _report: &DocumentReport) {}
}

impl ProgressReporter for SilentProgress {
    fn company_downloaded(&self, _company: &str, _current: usize, _total: usize, _result: Option<&DownloadResult>) {}
}

// ---------------------------------------------------------------------------
// Download
// ---------------------------------------------------------------------------

/// Result of downloading every configured company.
#[derive(Debug, Default)]
pub struct DownloadSummary {
    /// Per-company results, in configuration order.
    pub companies: Vec<(String, DownloadResult)>,
    /// Companies whose listing could not be fetched (name, error message).
    pub failed: Vec<(String, String)>,
    pub elapsed: Duration,
}

impl DownloadSummary {
    pub fn downloaded(&self) -> usize {
        self.companies.iter().map(|(_, r)| r.downloaded).sum()
    }

    pub fn recorded(&self) -> usize {
        self.companies
            .iter()
            .map(|(_, r)| r.downloaded + r.found_on_disk)
            .sum()
    }

    pub fn errors(&self) -> usize {
        self.companies.iter().map(|(_, r)| r.errors.len()).sum::<usize>() + self.failed.len()
    }
}

/// Download filings for each company. A company whose EDGAR listing fails is
/// skipped; storage failures abort.
#[instrument(skip_all, fields(companies = companies.len()))]
pub async fn download_filings(
    client: &EdgarClient,
    companies: &[CompanyEntry],
    storage: &Storage,
    progress: &dyn ProgressReporter,
) -> Result<DownloadSummary> {
    let start = Instant::now();
    let mut summary = DownloadSummary::default();
    let total = companies.len();

    progress.phase("Downloading filings");
    for (i, company) in companies.iter().enumerate() {
        match client.download_company(&company.name, &company.cik, storage).await {
            Ok(result) => {
                progress.company_downloaded(&company.name, i + 1, total, Some(&result));
                summary.companies.push((company.name.clone(), result));
            }
            Err(e @ (FilingScanError::Network(_) | FilingScanError::Parse { .. })) => {
                warn!(company = %company.name, error = %e, "company download failed, skipping");
                progress.company_downloaded(&company.name, i + 1, total, None);
                summary.failed.push((company.name.clone(), e.to_string()));
            }
            Err(e) => return Err(e),
        }
    }

    summary.elapsed = start.elapsed();
    info!(
        downloaded = summary.downloaded(),
        recorded = summary.recorded(),
        errors = summary.errors(),
        duration_ms = summary.elapsed.as_millis() as u64,
        "download completed"
    );
    Ok(summary)
}

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

/// A recorded analysis pass.
#[derive(Debug)]
pub struct AnalysisRun {
    pub run_id: String,
    pub report: PassReport,
}

/// Run one analysis pass over the store and record it in the run history.
#[instrument(skip_all)]
pub async fn analyze_filings(
    storage: &Storage,
    classifier: &dyn Classify,
    settings: &AnalysisSettings,
    progress: &dyn AnalysisProgress,
) -> Result<AnalysisRun> {
    let run_id = storage.insert_analysis_run().await?;
    info!(%run_id, "analysis run started");

    match run_analysis_pass(storage, storage, classifier, settings, progress).await {
        Ok(report) => {
            storage
                .finish_analysis_run(&run_id, &report.stats().to_string())
                .await?;
            Ok(AnalysisRun { run_id, report })
        }
        Err(e) => {
            let stats = serde_json::json!({ "status": "failed", "error": e.to_string() });
            let _ = storage.finish_analysis_run(&run_id, &stats.to_string()).await;
            Err(e)
        }
    }
}
