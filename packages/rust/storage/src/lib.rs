//! libSQL storage layer (local file mode).
//!
//! The [`Storage`] struct wraps a libSQL database holding filing metadata,
//! per-filing analysis state, and the history of analysis passes.
//!
//! **Access rules:**
//! - The CLI opens read-write via [`Storage::open`] and is the sole writer.
//! - Reporting commands may use [`Storage::open_readonly`].
//!
//! Every write is a single statement, so each status or result update is
//! atomic on its own.

mod migrations;

use std::path::Path;

use chrono::Utc;
use filingscan_shared::{DocumentStatus, FilingRecord, FilingScanError, NewFiling, Result};
use libsql::{Connection, Database, params};
use uuid::Uuid;

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

/// Filing counts by processing state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub unprocessed: u64,
    pub processed: u64,
    pub discontinued: u64,
}

const FILING_COLUMNS: &str = "company, cik, filing_type, report_date, filename, status, \
     analyzed, discontinued, drug_names, reason, analyzed_at";

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| FilingScanError::io(parent, e))?;
            }
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| FilingScanError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| FilingScanError::Storage(e.to_string()))?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open a database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(FilingScanError::Storage(format!(
                "database not found at {}",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| FilingScanError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| FilingScanError::Storage(e.to_string()))?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        FilingScanError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(FilingScanError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    /// Run an UPDATE that must touch exactly one filing.
    async fn update_filing(
        &self,
        filename: &str,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<()> {
        self.check_writable()?;
        let changed = self
            .conn
            .execute(sql, params)
            .await
            .map_err(|e| FilingScanError::Storage(e.to_string()))?;
        if changed == 0 {
            return Err(FilingScanError::Storage(format!(
                "no filing recorded for {filename}"
            )));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Filing metadata
    // -----------------------------------------------------------------------

    /// Record a downloaded filing. A filename that is already recorded is left
    /// untouched. Returns whether a row was inserted.
    pub async fn insert_filing(&self, filing: &NewFiling) -> Result<bool> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        let inserted = self
            .conn
            .execute(
                "INSERT INTO filings (company, cik, filing_type, report_date, filename, content_hash, recorded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(filename) DO NOTHING",
                params![
                    filing.company.as_str(),
                    filing.cik.as_str(),
                    filing.filing_type.as_str(),
                    filing.report_date.as_str(),
                    filing.filename.as_str(),
                    filing.content_hash.as_deref(),
                    now.as_str(),
                ],
            )
            .await
            .map_err(|e| FilingScanError::Storage(e.to_string()))?;
        Ok(inserted > 0)
    }

    /// Whether a filing with this filename is already recorded.
    pub async fn is_filing_recorded(&self, filename: &str) -> Result<bool> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM filings WHERE filename = ?1",
                params![filename],
            )
            .await
            .map_err(|e| FilingScanError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let count: i64 = row
                    .get(0)
                    .map_err(|e| FilingScanError::Storage(e.to_string()))?;
                Ok(count > 0)
            }
            Ok(None) => Ok(false),
            Err(e) => Err(FilingScanError::Storage(e.to_string())),
        }
    }

    /// Get a filing by filename.
    pub async fn get_filing(&self, filename: &str) -> Result<Option<FilingRecord>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {FILING_COLUMNS} FROM filings WHERE filename = ?1"),
                params![filename],
            )
            .await
            .map_err(|e| FilingScanError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_filing_record(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(FilingScanError::Storage(e.to_string())),
        }
    }

    // -----------------------------------------------------------------------
    // Analysis state
    // -----------------------------------------------------------------------

    /// Filenames of all filings not yet analyzed, in recording order.
    pub async fn list_unprocessed(&self) -> Result<Vec<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT filename FROM filings WHERE status = ?1 ORDER BY id",
                params![DocumentStatus::Unprocessed.as_str()],
            )
            .await
            .map_err(|e| FilingScanError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(
                row.get::<String>(0)
                    .map_err(|e| FilingScanError::Storage(e.to_string()))?,
            );
        }
        Ok(results)
    }

    /// Transition a filing to the processed state.
    pub async fn mark_processed(&self, filename: &str) -> Result<()> {
        self.update_filing(
            filename,
            "UPDATE filings SET status = ?1 WHERE filename = ?2",
            params![DocumentStatus::Processed.as_str(), filename],
        )
        .await
    }

    /// Write a filing's analysis result.
    pub async fn record_analysis(
        &self,
        filename: &str,
        discontinued: bool,
        drug_names: &[String],
        reason: Option<&str>,
    ) -> Result<()> {
        let names_json = if drug_names.is_empty() {
            None
        } else {
            Some(
                serde_json::to_string(drug_names)
                    .map_err(|e| FilingScanError::Storage(e.to_string()))?,
            )
        };
        let now = Utc::now().to_rfc3339();
        self.update_filing(
            filename,
            "UPDATE filings
             SET analyzed = 1, discontinued = ?1, drug_names = ?2, reason = ?3, analyzed_at = ?4
             WHERE filename = ?5",
            params![
                i64::from(discontinued),
                names_json.as_deref(),
                reason,
                now.as_str(),
                filename,
            ],
        )
        .await
    }

    /// Mark a filing as analyzed with no findings.
    pub async fn record_no_findings(&self, filename: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.update_filing(
            filename,
            "UPDATE filings
             SET analyzed = 1, discontinued = 0, drug_names = NULL, reason = NULL, analyzed_at = ?1
             WHERE filename = ?2",
            params![now.as_str(), filename],
        )
        .await
    }

    /// Clear a filing's analysis so the next pass picks it up again.
    pub async fn reset_filing(&self, filename: &str) -> Result<()> {
        self.update_filing(
            filename,
            "UPDATE filings
             SET status = ?1, analyzed = 0, discontinued = 0, drug_names = NULL, reason = NULL,
                 analyzed_at = NULL
             WHERE filename = ?2",
            params![DocumentStatus::Unprocessed.as_str(), filename],
        )
        .await
    }

    // -----------------------------------------------------------------------
    // Reporting
    // -----------------------------------------------------------------------

    /// All filings with a positive finding, by company then report date.
    pub async fn list_findings(&self) -> Result<Vec<FilingRecord>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {FILING_COLUMNS} FROM filings
                     WHERE discontinued = 1
                     ORDER BY company, report_date"
                ),
                params![],
            )
            .await
            .map_err(|e| FilingScanError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_filing_record(&row)?);
        }
        Ok(results)
    }

    /// Count filings by processing state.
    pub async fn status_counts(&self) -> Result<StatusCounts> {
        let mut rows = self
            .conn
            .query(
                "SELECT
                   COALESCE(SUM(CASE WHEN status = ?1 THEN 1 ELSE 0 END), 0),
                   COALESCE(SUM(CASE WHEN status = ?2 THEN 1 ELSE 0 END), 0),
                   COALESCE(SUM(discontinued), 0)
                 FROM filings",
                params![
                    DocumentStatus::Unprocessed.as_str(),
                    DocumentStatus::Processed.as_str()
                ],
            )
            .await
            .map_err(|e| FilingScanError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let get = |idx: i32| -> Result<u64> {
                    row.get::<i64>(idx)
                        .map(|v| v.max(0) as u64)
                        .map_err(|e| FilingScanError::Storage(e.to_string()))
                };
                Ok(StatusCounts {
                    unprocessed: get(0)?,
                    processed: get(1)?,
                    discontinued: get(2)?,
                })
            }
            Ok(None) => Ok(StatusCounts::default()),
            Err(e) => Err(FilingScanError::Storage(e.to_string())),
        }
    }

    // -----------------------------------------------------------------------
    // Analysis runs
    // -----------------------------------------------------------------------

    /// Insert a new analysis run. Returns the generated run ID.
    pub async fn insert_analysis_run(&self) -> Result<String> {
        self.check_writable()?;
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO analysis_runs (id, started_at) VALUES (?1, ?2)",
                params![id.as_str(), now.as_str()],
            )
            .await
            .map_err(|e| FilingScanError::Storage(e.to_string()))?;
        Ok(id)
    }

    /// Update an analysis run with completion data.
    pub async fn finish_analysis_run(&self, run_id: &str, stats_json: &str) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE analysis_runs SET finished_at = ?1, stats_json = ?2 WHERE id = ?3",
                params![now.as_str(), stats_json, run_id],
            )
            .await
            .map_err(|e| FilingScanError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Stats JSON of a finished run, if any.
    pub async fn get_analysis_run_stats(&self, run_id: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT stats_json FROM analysis_runs WHERE id = ?1",
                params![run_id],
            )
            .await
            .map_err(|e| FilingScanError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(row.get::<String>(0).ok()),
            Ok(None) => Ok(None),
            Err(e) => Err(FilingScanError::Storage(e.to_string())),
        }
    }
}

/// Decode the `drug_names` column: a JSON array, or a legacy comma list.
fn decode_drug_names(raw: Option<String>) -> Vec<String> {
    let Some(raw) = raw else {
        return Vec::new();
    };
    serde_json::from_str::<Vec<String>>(&raw).unwrap_or_else(|_| {
        raw.split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(String::from)
            .collect()
    })
}

/// Convert a database row (selected with `FILING_COLUMNS`) to a [`FilingRecord`].
fn row_to_filing_record(row: &libsql::Row) -> Result<FilingRecord> {
    let text = |idx: i32| -> Result<String> {
        row.get::<String>(idx)
            .map_err(|e| FilingScanError::Storage(e.to_string()))
    };
    let flag = |idx: i32| -> Result<bool> {
        row.get::<i64>(idx)
            .map(|v| v != 0)
            .map_err(|e| FilingScanError::Storage(e.to_string()))
    };

    Ok(FilingRecord {
        company: text(0)?,
        cik: text(1)?,
        filing_type: text(2)?,
        report_date: text(3)?,
        filename: text(4)?,
        status: text(5)?.parse()?,
        analyzed: flag(6)?,
        discontinued: flag(7)?,
        drug_names: decode_drug_names(row.get::<String>(8).ok()),
        reason: row.get::<String>(9).ok(),
        analyzed_at: match row.get::<String>(10).ok() {
            Some(s) => Some(
                chrono::DateTime::parse_from_rfc3339(&s)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|e| FilingScanError::Storage(format!("invalid date: {e}")))?,
            ),
            None => None,
        },
    })
}
