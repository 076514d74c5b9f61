//! The analysis pass: every unprocessed document is windowed, each window is
//! classified, and one aggregated result is written per document before the
//! document is marked processed.
//!
//! Classifier failures are per window: they are logged, counted, and the pass
//! moves on. Store failures end the pass, since a document must not be marked
//! processed unless its result was recorded.

use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use filingscan_extract::{ContextWindow, WindowOptions, extract, plain_text};
use filingscan_shared::{AnalysisSettings, DocumentId, DocumentStatus, Result};

use crate::classifier::{Classify, Verdict};
use crate::store::{DocumentSource, ResultSink};
use crate::throttle::CallThrottle;

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Document-level aggregate of the positive window verdicts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AnalysisResult {
    pub discontinued: bool,
    /// Union over positive windows, first spelling and first appearance kept.
    pub drug_names: Vec<String>,
    /// Reason given by the first positive window.
    pub reason: Option<String>,
}

impl AnalysisResult {
    /// Fold one window verdict into the aggregate.
    pub fn absorb(&mut self, verdict: Verdict) {
        if !verdict.discontinued || verdict.drug_names.is_empty() {
            return;
        }
        if !self.discontinued {
            self.discontinued = true;
            self.reason = verdict.reason;
        }
        for name in verdict.drug_names {
            let key = name.to_lowercase();
            if !self.drug_names.iter().any(|n| n.to_lowercase() == key) {
                self.drug_names.push(name);
            }
        }
    }
}

/// Outcome of one document.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentReport {
    pub id: DocumentId,
    /// Windows extracted from the document.
    pub windows: usize,
    /// Windows whose classification failed and were skipped.
    pub calls_failed: usize,
    pub result: AnalysisResult,
}

/// Outcome of a whole pass.
#[derive(Debug, Clone, Default)]
pub struct PassReport {
    pub documents: Vec<DocumentReport>,
    pub elapsed: Duration,
}

impl PassReport {
    pub fn total_windows(&self) -> usize {
        self.documents.iter().map(|d| d.windows).sum()
    }

    pub fn total_calls_failed(&self) -> usize {
        self.documents.iter().map(|d| d.calls_failed).sum()
    }

    /// Documents with a positive result.
    pub fn findings(&self) -> impl Iterator<Item = &DocumentReport> {
        self.documents.iter().filter(|d| d.result.discontinued)
    }

    /// Summary stats as JSON, for the run history.
    pub fn stats(&self) -> serde_json::Value {
        serde_json::json!({
            "documents": self.documents.len(),
            "windows": self.total_windows(),
            "calls_failed": self.total_calls_failed(),
            "findings": self.findings().count(),
            "elapsed_ms": self.elapsed.as_millis() as u64,
        })
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Progress callback for the analysis pass.
pub trait AnalysisProgress: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called before a document is read. `current` is 1-based.
    fn document_started(&self, id: &DocumentId, current: usize, total: usize);
    /// Called after each classifier call. `current` is 1-based.
    fn window_classified(&self, id: &DocumentId, current: usize, total: usize, ok: bool);
    /// Called once the document's result is recorded.
    fn document_finished(&self, report: &DocumentReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentAnalysisProgress;

impl AnalysisProgress for SilentAnalysisProgress {
    fn phase(&self, _name: &str) {}
    fn document_started(&self, _id: &DocumentId, _current: usize, _total: usize) {}
    fn window_classified(&self, _id: &DocumentId, _current: usize, _total: usize, _ok: bool) {}
    fn document_finished(&self, _report: &DocumentReport) {}
}

// ---------------------------------------------------------------------------
// Pass
// ---------------------------------------------------------------------------

/// Analyze every unprocessed document, one at a time.
#[instrument(skip_all)]
pub async fn run_analysis_pass(
    source: &dyn DocumentSource,
    sink: &dyn ResultSink,
    classifier: &dyn Classify,
    settings: &AnalysisSettings,
    progress: &dyn AnalysisProgress,
) -> Result<PassReport> {
    let start = Instant::now();

    progress.phase("Listing unprocessed documents");
    let pending: Vec<DocumentId> = source
        .list_unprocessed()
        .await?
        .into_iter()
        .filter(|r| r.status == DocumentStatus::Unprocessed)
        .map(|r| r.id)
        .collect();

    info!(
        documents = pending.len(),
        before = settings.before,
        after = settings.after,
        call_interval_ms = settings.min_call_interval.as_millis() as u64,
        "starting analysis pass"
    );

    let opts = WindowOptions {
        before: settings.before,
        after: settings.after,
        max_len: settings.max_window_chars,
    };
    let mut throttle = CallThrottle::new(settings.min_call_interval);
    let mut report = PassReport::default();

    progress.phase("Analyzing documents");
    let total = pending.len();
    for (i, id) in pending.into_iter().enumerate() {
        progress.document_started(&id, i + 1, total);
        let doc = analyze_document(id, source, sink, classifier, opts, &mut throttle, progress)
            .await?;
        progress.document_finished(&doc);
        report.documents.push(doc);
    }

    report.elapsed = start.elapsed();
    info!(
        documents = report.documents.len(),
        windows = report.total_windows(),
        calls_failed = report.total_calls_failed(),
        findings = report.findings().count(),
        duration_ms = report.elapsed.as_millis() as u64,
        "analysis pass completed"
    );
    Ok(report)
}

#[instrument(skip_all, fields(document = %id))]
async fn analyze_document(
    id: DocumentId,
    source: &dyn DocumentSource,
    sink: &dyn ResultSink,
    classifier: &dyn Classify,
    opts: WindowOptions,
    throttle: &mut CallThrottle,
    progress: &dyn AnalysisProgress,
) -> Result<DocumentReport> {
    let raw = source.get_text(&id).await?;
    let text = plain_text(&raw);
    let windows: Vec<ContextWindow> = extract(&text, opts).collect();
    debug!(chars = text.chars().count(), windows = windows.len(), "document windowed");

    let mut result = AnalysisResult::default();
    let mut calls_failed = 0;

    for (n, window) in windows.iter().enumerate() {
        throttle.acquire().await;
        let ok = match classifier.classify(&window.text).await {
            Ok(verdict) => {
                result.absorb(verdict);
                true
            }
            Err(e) => {
                calls_failed += 1;
                warn!(
                    window = n + 1,
                    start = window.start,
                    end = window.end,
                    error = %e,
                    "window classification failed, skipping"
                );
                false
            }
        };
        progress.window_classified(&id, n + 1, windows.len(), ok);
    }

    if result.discontinued {
        sink.record_result(&id, true, &result.drug_names, result.reason.as_deref())
            .await?;
    } else {
        sink.record_no_findings(&id).await?;
    }
    source.mark_processed(&id).await?;

    info!(
        windows = windows.len(),
        calls_failed,
        discontinued = result.discontinued,
        drug_names = ?result.drug_names,
        "document analyzed"
    );

    Ok(DocumentReport {
        id,
        windows: windows.len(),
        calls_failed,
        result,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use filingscan_shared::{DocumentRef, FilingScanError};

    use crate::classifier::ClassifyError;

    // -----------------------------------------------------------------------
    // Fakes
    // -----------------------------------------------------------------------

    #[derive(Debug, Clone, PartialEq)]
    enum Write {
        Result(String, Vec<String>, Option<String>),
        NoFindings(String),
        Processed(String),
    }

    #[derive(Default)]
    struct MemoryStore {
        docs: Vec<(String, String, DocumentStatus)>,
        writes: Mutex<Vec<Write>>,
        fail_writes: bool,
    }

    impl MemoryStore {
        fn with_docs(docs: &[(&str, &str)]) -> Self {
            Self {
                docs: docs
                    .iter()
                    .map(|(id, text)| (id.to_string(), text.to_string(), DocumentStatus::Unprocessed))
                    .collect(),
                ..Default::default()
            }
        }

        fn writes(&self) -> Vec<Write> {
            self.writes.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DocumentSource for MemoryStore {
        async fn list_unprocessed(&self) -> Result<Vec<DocumentRef>> {
            Ok(self
                .docs
                .iter()
                .map(|(id, _, status)| DocumentRef {
                    id: DocumentId::from(id.as_str()),
                    status: *status,
                })
                .collect())
        }

        async fn get_text(&self, id: &DocumentId) -> Result<String> {
            self.docs
                .iter()
                .find(|(doc, _, _)| doc == id.as_str())
                .map(|(_, text, _)| text.clone())
                .ok_or_else(|| FilingScanError::Storage(format!("no document {id}")))
        }

        async fn mark_processed(&self, id: &DocumentId) -> Result<()> {
            self.writes
                .lock()
                .unwrap()
                .push(Write::Processed(id.to_string()));
            Ok(())
        }
    }

    #[async_trait]
    impl ResultSink for MemoryStore {
        async fn record_result(
            &self,
            id: &DocumentId,
            _discontinued: bool,
            drug_names: &[String],
            reason: Option<&str>,
        ) -> Result<()> {
            if self.fail_writes {
                return Err(FilingScanError::Storage("disk full".into()));
            }
            self.writes.lock().unwrap().push(Write::Result(
                id.to_string(),
                drug_names.to_vec(),
                reason.map(String::from),
            ));
            Ok(())
        }

        async fn record_no_findings(&self, id: &DocumentId) -> Result<()> {
            if self.fail_writes {
                return Err(FilingScanError::Storage("disk full".into()));
            }
            self.writes
                .lock()
                .unwrap()
                .push(Write::NoFindings(id.to_string()));
            Ok(())
        }
    }

    /// Replays scripted outcomes in order; negative once the script runs out.
    #[derive(Default)]
    struct Scripted {
        outcomes: Mutex<VecDeque<std::result::Result<Verdict, ClassifyError>>>,
        calls: Mutex<Vec<(String, tokio::time::Instant)>>,
    }

    impl Scripted {
        fn new(outcomes: Vec<std::result::Result<Verdict, ClassifyError>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                calls: Mutex::default(),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Classify for Scripted {
        async fn classify(&self, window_text: &str) -> std::result::Result<Verdict, ClassifyError> {
            self.calls
                .lock()
                .unwrap()
                .push((window_text.to_string(), tokio::time::Instant::now()));
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Verdict::negative()))
        }
    }

    fn settings() -> AnalysisSettings {
        AnalysisSettings {
            before: 20,
            after: 20,
            max_window_chars: None,
            min_call_interval: Duration::ZERO,
        }
    }

    fn positive(names: &[&str], reason: Option<&str>) -> std::result::Result<Verdict, ClassifyError> {
        Ok(Verdict::positive(
            names.iter().map(|s| s.to_string()).collect(),
            reason.map(String::from),
        ))
    }

    /// A document with `n` matches spaced far enough apart to stay separate.
    fn doc_with_matches(n: usize) -> String {
        let gap = ". ".repeat(60);
        let mut text = gap.clone();
        for i in 0..n {
            text.push_str(&format!("We discontinued the trial of compound {i}"));
            text.push_str(&gap);
        }
        text
    }

    async fn run(store: &MemoryStore, classifier: &Scripted) -> Result<PassReport> {
        run_analysis_pass(store, store, classifier, &settings(), &SilentAnalysisProgress).await
    }

    // -----------------------------------------------------------------------
    // Aggregation
    // -----------------------------------------------------------------------

    #[test]
    fn absorb_unions_names_and_keeps_first_reason() {
        let mut result = AnalysisResult::default();
        result.absorb(Verdict::negative());
        assert!(!result.discontinued);

        result.absorb(Verdict::positive(vec!["A".into(), "b".into()], Some("r1".into())));
        result.absorb(Verdict::positive(vec!["a".into(), "C".into()], Some("r2".into())));
        assert!(result.discontinued);
        assert_eq!(result.drug_names, vec!["A", "b", "C"]);
        assert_eq!(result.reason.as_deref(), Some("r1"));
    }

    #[test]
    fn absorb_keeps_missing_first_reason() {
        let mut result = AnalysisResult::default();
        result.absorb(Verdict::positive(vec!["A".into()], None));
        result.absorb(Verdict::positive(vec!["B".into()], Some("later".into())));
        assert_eq!(result.reason, None);
    }

    // -----------------------------------------------------------------------
    // Pass behavior
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn zero_matches_records_no_findings_without_calls() {
        let store = MemoryStore::with_docs(&[("a", "Revenue grew in every region.")]);
        let classifier = Scripted::default();

        let report = run(&store, &classifier).await.unwrap();

        assert_eq!(classifier.call_count(), 0);
        assert_eq!(report.documents[0].windows, 0);
        assert_eq!(
            store.writes(),
            vec![Write::NoFindings("a".into()), Write::Processed("a".into())]
        );
    }

    #[tokio::test]
    async fn all_negative_windows_record_no_findings() {
        let text = doc_with_matches(3);
        let store = MemoryStore::with_docs(&[("a", &text)]);
        let classifier = Scripted::default();

        let report = run(&store, &classifier).await.unwrap();

        assert_eq!(classifier.call_count(), 3);
        assert_eq!(report.total_windows(), 3);
        assert_eq!(
            store.writes(),
            vec![Write::NoFindings("a".into()), Write::Processed("a".into())]
        );
    }

    #[tokio::test]
    async fn single_positive_window_is_recorded() {
        let text = doc_with_matches(3);
        let store = MemoryStore::with_docs(&[("a", &text)]);
        let classifier = Scripted::new(vec![
            Ok(Verdict::negative()),
            positive(&["X"], None),
            Ok(Verdict::negative()),
        ]);

        let report = run(&store, &classifier).await.unwrap();

        assert_eq!(report.findings().count(), 1);
        assert_eq!(report.documents[0].result.drug_names, vec!["X"]);
        assert_eq!(
            store.writes(),
            vec![
                Write::Result("a".into(), vec!["X".into()], None),
                Write::Processed("a".into())
            ]
        );
    }

    #[tokio::test]
    async fn markup_is_stripped_before_windowing() {
        let html = format!(
            "<html><body><p>{}</p><script>discontinued the trial</script></body></html>",
            doc_with_matches(1)
        );
        let store = MemoryStore::with_docs(&[("a", &html)]);
        let classifier = Scripted::default();

        run(&store, &classifier).await.unwrap();

        let calls = classifier.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert!(!calls[0].0.contains('<'));
    }

    #[tokio::test]
    async fn classifier_errors_skip_window_and_continue() {
        let text = doc_with_matches(3);
        let store = MemoryStore::with_docs(&[("a", &text), ("b", &text)]);
        let classifier = Scripted::new(vec![
            Ok(Verdict::negative()),
            Err(ClassifyError::Transport("connection reset".into())),
            positive(&["Y"], Some("futility")),
            Err(ClassifyError::Format("not json".into())),
        ]);

        let report = run(&store, &classifier).await.unwrap();

        assert_eq!(classifier.call_count(), 6);
        assert_eq!(report.documents[0].calls_failed, 1);
        assert_eq!(report.documents[1].calls_failed, 1);
        assert_eq!(report.total_calls_failed(), 2);
        assert_eq!(
            store.writes(),
            vec![
                Write::Result("a".into(), vec!["Y".into()], Some("futility".into())),
                Write::Processed("a".into()),
                Write::NoFindings("b".into()),
                Write::Processed("b".into()),
            ]
        );
    }

    #[tokio::test]
    async fn store_write_failure_aborts_pass() {
        let text = doc_with_matches(1);
        let mut store = MemoryStore::with_docs(&[("a", &text), ("b", &text)]);
        store.fail_writes = true;
        let classifier = Scripted::default();

        let err = run(&store, &classifier).await.unwrap_err();

        assert!(matches!(err, FilingScanError::Storage(_)));
        assert_eq!(classifier.call_count(), 1);
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn text_fetch_failure_aborts_pass() {
        struct Missing;

        #[async_trait]
        impl DocumentSource for Missing {
            async fn list_unprocessed(&self) -> Result<Vec<DocumentRef>> {
                Ok(vec![DocumentRef {
                    id: "gone".into(),
                    status: DocumentStatus::Unprocessed,
                }])
            }
            async fn get_text(&self, id: &DocumentId) -> Result<String> {
                Err(FilingScanError::Storage(format!("no document {id}")))
            }
            async fn mark_processed(&self, _id: &DocumentId) -> Result<()> {
                panic!("must not mark an unread document processed");
            }
        }

        let sink = MemoryStore::default();
        let classifier = Scripted::default();
        let result = run_analysis_pass(
            &Missing,
            &sink,
            &classifier,
            &settings(),
            &SilentAnalysisProgress,
        )
        .await;
        assert!(result.is_err());
        assert!(sink.writes().is_empty());
    }

    #[tokio::test]
    async fn processed_refs_are_skipped() {
        let text = doc_with_matches(1);
        let mut store = MemoryStore::with_docs(&[("a", &text), ("b", &text)]);
        store.docs[0].2 = DocumentStatus::Processed;
        let classifier = Scripted::default();

        let report = run(&store, &classifier).await.unwrap();

        assert_eq!(report.documents.len(), 1);
        assert_eq!(report.documents[0].id.as_str(), "b");
    }

    #[tokio::test(start_paused = true)]
    async fn calls_are_spaced_across_documents() {
        let text = doc_with_matches(2);
        let store = MemoryStore::with_docs(&[("a", &text), ("b", &text)]);
        let classifier = Scripted::new(vec![
            Ok(Verdict::negative()),
            Err(ClassifyError::Transport("boom".into())),
        ]);
        let settings = AnalysisSettings {
            min_call_interval: Duration::from_secs(5),
            ..settings()
        };

        let start = tokio::time::Instant::now();
        run_analysis_pass(&store, &store, &classifier, &settings, &SilentAnalysisProgress)
            .await
            .unwrap();

        let calls = classifier.calls.lock().unwrap();
        assert_eq!(calls.len(), 4);
        assert_eq!(calls[0].1 - start, Duration::ZERO);
        for pair in calls.windows(2) {
            assert_eq!(pair[1].1 - pair[0].1, Duration::from_secs(5));
        }
    }

    #[tokio::test]
    async fn progress_sees_every_document_and_window() {
        #[derive(Default)]
        struct Counting {
            started: Mutex<Vec<(String, usize, usize)>>,
            windows: Mutex<usize>,
            finished: Mutex<usize>,
        }

        impl AnalysisProgress for Counting {
            fn phase(&self, _name: &str) {}
            fn document_started(&self, id: &DocumentId, current: usize, total: usize) {
                self.started
                    .lock()
                    .unwrap()
                    .push((id.to_string(), current, total));
            }
            fn window_classified(&self, _id: &DocumentId, _current: usize, _total: usize, _ok: bool) {
                *self.windows.lock().unwrap() += 1;
            }
            fn document_finished(&self, _report: &DocumentReport) {
                *self.finished.lock().unwrap() += 1;
            }
        }

        let text = doc_with_matches(2);
        let store = MemoryStore::with_docs(&[("a", &text), ("b", "nothing here")]);
        let classifier = Scripted::default();
        let progress = Counting::default();

        run_analysis_pass(&store, &store, &classifier, &settings(), &progress)
            .await
            .unwrap();

        assert_eq!(
            *progress.started.lock().unwrap(),
            vec![("a".to_string(), 1, 2), ("b".to_string(), 2, 2)]
        );
        assert_eq!(*progress.windows.lock().unwrap(), 2);
        assert_eq!(*progress.finished.lock().unwrap(), 2);
    }

    #[test]
    fn pass_report_stats() {
        let report = PassReport {
            documents: vec![DocumentReport {
                id: "a".into(),
                windows: 4,
                calls_failed: 1,
                result: AnalysisResult {
                    discontinued: true,
                    drug_names: vec!["X".into()],
                    reason: None,
                },
            }],
            elapsed: Duration::from_millis(1500),
        };
        let stats = report.stats();
        assert_eq!(stats["documents"], 1);
        assert_eq!(stats["windows"], 4);
        assert_eq!(stats["calls_failed"], 1);
        assert_eq!(stats["findings"], 1);
        assert_eq!(stats["elapsed_ms"], 1500);
    }
}
