//! Shared types, error model, and configuration for filingscan.
//!
//! This crate is the foundation depended on by all other filingscan crates.
//! It provides:
//! - [`FilingScanError`]: the unified error type
//! - Domain types ([`DocumentId`], [`DocumentStatus`], [`FilingRecord`], [`NewFiling`])
//! - Configuration ([`AppConfig`], [`AnalysisSettings`], [`DownloadConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AnalysisConfig, AnalysisSettings, AppConfig, CompanyEntry, DefaultsConfig, DownloadConfig,
    EdgarConfig, OpenAiConfig, config_dir, config_file_path, init_config, load_config,
    load_config_from, resolve_api_key, resolve_user_agent, validate_api_key,
};
pub use error::{FilingScanError, Result};
pub use types::{DocumentId, DocumentRef, DocumentStatus, FilingRecord, NewFiling};
