//! Core analysis logic for filingscan.
//!
//! This crate classifies keyword context windows with an LLM and ties
//! acquisition, windowing, classification, and storage into end-to-end
//! workflows:
//! - [`classifier`]: prompt, reply parsing, and [`VerdictClient`]
//! - [`completion`]: chat-completion transport
//! - [`analysis`]: the per-document analysis pass
//! - [`store`]: the store interfaces the pass depends on
//! - [`pipeline`]: download and analysis workflows over [`filingscan_storage::Storage`]

pub mod analysis;
pub mod classifier;
pub mod completion;
pub mod pipeline;
pub mod store;
pub mod throttle;

pub use analysis::{
    AnalysisProgress, AnalysisResult, DocumentReport, PassReport, SilentAnalysisProgress,
    run_analysis_pass,
};
pub use classifier::{
    ClassifierSettings, Classify, ClassifyError, Verdict, VerdictClient, build_prompt,
    parse_verdict,
};
pub use completion::{CompletionRequest, CompletionService, OpenAiChat};
pub use pipeline::{
    AnalysisRun, DownloadSummary, ProgressReporter, SilentProgress, analyze_filings,
    download_filings,
};
pub use store::{DocumentSource, ResultSink};
pub use throttle::CallThrottle;
