//! SEC EDGAR acquisition.
//!
//! This crate provides:
//! - [`submissions`]: the submissions API payload
//! - [`EdgarClient`]: downloads a company's filings and records them in storage

pub mod client;
pub mod submissions;

pub use client::{DownloadResult, EdgarClient, filing_path};
pub use submissions::{FilingEntry, RecentFilings, Submissions};
