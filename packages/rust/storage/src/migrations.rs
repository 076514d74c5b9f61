//! SQL migration definitions for the filing database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: filings, analysis_runs",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Downloaded filings and their analysis outcome
CREATE TABLE IF NOT EXISTS filings (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    company       TEXT NOT NULL,
    cik           TEXT NOT NULL,
    filing_type   TEXT NOT NULL,
    report_date   TEXT NOT NULL,
    filename      TEXT NOT NULL UNIQUE,
    content_hash  TEXT,
    recorded_at   TEXT NOT NULL,
    status        TEXT NOT NULL DEFAULT 'not_checked',
    analyzed      INTEGER NOT NULL DEFAULT 0,
    discontinued  INTEGER NOT NULL DEFAULT 0,
    drug_names    TEXT,
    reason        TEXT,
    analyzed_at   TEXT
);

CREATE INDEX IF NOT EXISTS idx_filings_status ON filings(status);
CREATE INDEX IF NOT EXISTS idx_filings_cik ON filings(cik);

-- Analysis pass history
CREATE TABLE IF NOT EXISTS analysis_runs (
    id          TEXT PRIMARY KEY,
    started_at  TEXT NOT NULL,
    finished_at TEXT,
    stats_json  TEXT
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
