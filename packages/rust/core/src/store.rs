//! Store interfaces consumed by the analysis pass.
//!
//! The pass only sees documents through [`DocumentSource`] and writes results
//! through [`ResultSink`]; [`Storage`] implements both.

use async_trait::async_trait;

use filingscan_shared::{DocumentId, DocumentRef, DocumentStatus, FilingScanError, Result};
use filingscan_storage::Storage;

/// Where documents come from.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Documents whose status is still unprocessed.
    async fn list_unprocessed(&self) -> Result<Vec<DocumentRef>>;
    /// Raw text of a document.
    async fn get_text(&self, id: &DocumentId) -> Result<String>;
    /// Transition a document to processed.
    async fn mark_processed(&self, id: &DocumentId) -> Result<()>;
}

/// Where per-document results go.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn record_result(
        &self,
        id: &DocumentId,
        discontinued: bool,
        drug_names: &[String],
        reason: Option<&str>,
    ) -> Result<()>;

    async fn record_no_findings(&self, id: &DocumentId) -> Result<()>;
}

#[async_trait]
impl DocumentSource for Storage {
    async fn list_unprocessed(&self) -> Result<Vec<DocumentRef>> {
        Ok(Storage::list_unprocessed(self)
            .await?
            .into_iter()
            .map(|filename| DocumentRef {
                id: DocumentId(filename),
                status: DocumentStatus::Unprocessed,
            })
            .collect())
    }

    /// Reads the filing from disk; the id is its path. Invalid UTF-8 is
    /// replaced rather than rejected.
    async fn get_text(&self, id: &DocumentId) -> Result<String> {
        let bytes = tokio::fs::read(id.as_str())
            .await
            .map_err(|e| FilingScanError::io(id.as_str(), e))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    async fn mark_processed(&self, id: &DocumentId) -> Result<()> {
        Storage::mark_processed(self, id.as_str()).await
    }
}

#[async_trait]
impl ResultSink for Storage {
    async fn record_result(
        &self,
        id: &DocumentId,
        discontinued: bool,
        drug_names: &[String],
        reason: Option<&str>,
    ) -> Result<()> {
        self.record_analysis(id.as_str(), discontinued, drug_names, reason)
            .await
    }

    async fn record_no_findings(&self, id: &DocumentId) -> Result<()> {
        Storage::record_no_findings(self, id.as_str()).await
    }
}
