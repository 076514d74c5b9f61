//! Application configuration for filingscan.
//!
//! User config lives at `~/.filingscan/filingscan.toml`.
//! CLI flags override config file values, which override defaults.
//! Secrets (the classifier API key, the EDGAR user agent) are read from the
//! environment variables the config names, never from the file itself.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{FilingScanError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "filingscan.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".filingscan";

// ---------------------------------------------------------------------------
// Config structs (matching filingscan.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Classifier service settings.
    #[serde(default)]
    pub openai: OpenAiConfig,

    /// Context-window and pacing settings for analysis passes.
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// EDGAR download settings.
    #[serde(default)]
    pub edgar: EdgarConfig,

    /// Companies whose filings are downloaded.
    #[serde(default = "default_companies")]
    pub companies: Vec<CompanyEntry>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            defaults: DefaultsConfig::default(),
            openai: OpenAiConfig::default(),
            analysis: AnalysisConfig::default(),
            edgar: EdgarConfig::default(),
            companies: default_companies(),
        }
    }
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Path of the filing database.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Directory downloaded filings are stored under.
    #[serde(default = "default_filings_dir")]
    pub filings_dir: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            filings_dir: default_filings_dir(),
        }
    }
}

fn default_db_path() -> String {
    "var/filingscan.db".into()
}
fn default_filings_dir() -> String {
    "sec-edgar-filings".into()
}

/// `[openai]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Base URL of an OpenAI-compatible chat-completions API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model identifier sent with every classification request.
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Ask the service for a JSON-object response format.
    #[serde(default = "default_true")]
    pub json_mode: bool,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            base_url: default_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            json_mode: true,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f64 {
    0.6
}
fn default_true() -> bool {
    true
}
fn default_timeout_secs() -> u64 {
    60
}

/// `[analysis]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Characters of context kept before each keyword match.
    #[serde(default = "default_context")]
    pub context_before: usize,

    /// Characters of context kept after each keyword match.
    #[serde(default = "default_context")]
    pub context_after: usize,

    /// Upper bound on a merged window, in characters. 0 disables the cap.
    #[serde(default = "default_max_window_chars")]
    pub max_window_chars: usize,

    /// Minimum ms between consecutive classifier calls.
    #[serde(default = "default_call_interval")]
    pub call_interval_ms: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            context_before: default_context(),
            context_after: default_context(),
            max_window_chars: default_max_window_chars(),
            call_interval_ms: default_call_interval(),
        }
    }
}

fn default_context() -> usize {
    300
}
fn default_max_window_chars() -> usize {
    12_000
}
fn default_call_interval() -> u64 {
    5_000
}

/// `[edgar]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgarConfig {
    /// Name of the env var holding the EDGAR user agent
    /// (`"Company Name admin@example.com"`, per SEC fair-access rules).
    #[serde(default = "default_user_agent_env")]
    pub user_agent_env: String,

    /// Earliest report year to download.
    #[serde(default = "default_start_year")]
    pub start_year: i32,

    /// Primary document descriptions to download.
    #[serde(default = "default_filing_types")]
    pub filing_types: Vec<String>,

    /// Pause in ms after each EDGAR request.
    #[serde(default = "default_rate_limit")]
    pub rate_limit_ms: u64,

    /// Base URL of the submissions API.
    #[serde(default = "default_submissions_base_url")]
    pub submissions_base_url: String,

    /// Base URL of the filing archives.
    #[serde(default = "default_archives_base_url")]
    pub archives_base_url: String,
}

impl Default for EdgarConfig {
    fn default() -> Self {
        Self {
            user_agent_env: default_user_agent_env(),
            start_year: default_start_year(),
            filing_types: default_filing_types(),
            rate_limit_ms: default_rate_limit(),
            submissions_base_url: default_submissions_base_url(),
            archives_base_url: default_archives_base_url(),
        }
    }
}

fn default_user_agent_env() -> String {
    "EDGAR_USER_AGENT".into()
}
fn default_start_year() -> i32 {
    2012
}
fn default_filing_types() -> Vec<String> {
    ["10-K", "10-Q", "20-F", "8-K", "6-K"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_rate_limit() -> u64 {
    200
}
fn default_submissions_base_url() -> String {
    "https://data.sec.gov".into()
}
fn default_archives_base_url() -> String {
    "https://www.sec.gov/Archives/edgar/data".into()
}

/// `[[companies]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyEntry {
    /// Human-readable name.
    pub name: String,
    /// SEC Central Index Key.
    pub cik: String,
}

fn default_companies() -> Vec<CompanyEntry> {
    [
        ("Novartis", "1114448"),
        ("Sanofi", "1121404"),
        ("AstraZeneca", "901832"),
        ("Eli Lilly", "59478"),
        ("Mast Therapeutics", "1160308"),
        ("Novo Nordisk", "353278"),
        ("Regulus Therapeutics", "1505512"),
    ]
    .into_iter()
    .map(|(name, cik)| CompanyEntry {
        name: name.into(),
        cik: cik.into(),
    })
    .collect()
}

// ---------------------------------------------------------------------------
// Runtime settings (merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime analysis settings.
#[derive(Debug, Clone)]
pub struct AnalysisSettings {
    /// Characters of context before a match.
    pub before: usize,
    /// Characters of context after a match.
    pub after: usize,
    /// Cap on merged window length, `None` for unbounded.
    pub max_window_chars: Option<usize>,
    /// Minimum delay between consecutive classifier calls.
    pub min_call_interval: Duration,
}

impl From<&AppConfig> for AnalysisSettings {
    fn from(config: &AppConfig) -> Self {
        let analysis = &config.analysis;
        Self {
            before: analysis.context_before,
            after: analysis.context_after,
            max_window_chars: (analysis.max_window_chars > 0).then_some(analysis.max_window_chars),
            min_call_interval: Duration::from_millis(analysis.call_interval_ms),
        }
    }
}

/// Runtime EDGAR download configuration.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Directory filings are written under.
    pub filings_dir: PathBuf,
    /// Earliest report year to keep.
    pub start_year: i32,
    /// Primary document descriptions to keep.
    pub filing_types: Vec<String>,
    /// Pause in ms after each EDGAR request.
    pub rate_limit_ms: u64,
    /// Base URL of the submissions API.
    pub submissions_base_url: String,
    /// Base URL of the filing archives.
    pub archives_base_url: String,
}

impl From<&AppConfig> for DownloadConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            filings_dir: PathBuf::from(&config.defaults.filings_dir),
            start_year: config.edgar.start_year,
            filing_types: config.edgar.filing_types.clone(),
            rate_limit_ms: config.edgar.rate_limit_ms,
            submissions_base_url: config.edgar.submissions_base_url.clone(),
            archives_base_url: config.edgar.archives_base_url.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.filingscan/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| FilingScanError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.filingscan/filingscan.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| FilingScanError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        FilingScanError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| FilingScanError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| FilingScanError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| FilingScanError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read a required, non-empty environment variable.
fn required_env(var_name: &str, what: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(val),
        _ => Err(FilingScanError::config(format!(
            "{what} not found. Set the {var_name} environment variable."
        ))),
    }
}

/// Check that the classifier API key env var is set and non-empty.
pub fn validate_api_key(config: &AppConfig) -> Result<()> {
    resolve_api_key(config).map(|_| ())
}

/// Read the classifier API key from the env var named in the config.
pub fn resolve_api_key(config: &AppConfig) -> Result<String> {
    required_env(&config.openai.api_key_env, "Classifier API key")
}

/// Read the EDGAR user agent from the env var named in the config.
pub fn resolve_user_agent(config: &AppConfig) -> Result<String> {
    required_env(&config.edgar.user_agent_env, "EDGAR user agent")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("db_path"));
        assert!(toml_str.contains("OPENAI_API_KEY"));
        assert!(toml_str.contains("Regulus Therapeutics"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.analysis.context_before, 300);
        assert_eq!(parsed.openai.api_key_env, "OPENAI_API_KEY");
        assert_eq!(parsed.companies.len(), 7);
        assert_eq!(parsed.edgar.filing_types.len(), 5);
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let toml_str = r#"
[openai]
model = "gpt-3.5-turbo-16k"

[[companies]]
name = "Eli Lilly"
cik = "59478"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.openai.model, "gpt-3.5-turbo-16k");
        assert!((config.openai.temperature - 0.6).abs() < f64::EPSILON);
        assert_eq!(config.companies.len(), 1);
        assert_eq!(config.companies[0].cik, "59478");
        assert_eq!(config.defaults.filings_dir, "sec-edgar-filings");
    }

    #[test]
    fn analysis_settings_from_app_config() {
        let mut app = AppConfig::default();
        let settings = AnalysisSettings::from(&app);
        assert_eq!(settings.before, 300);
        assert_eq!(settings.after, 300);
        assert_eq!(settings.max_window_chars, Some(12_000));
        assert_eq!(settings.min_call_interval, Duration::from_secs(5));

        app.analysis.max_window_chars = 0;
        assert_eq!(AnalysisSettings::from(&app).max_window_chars, None);
    }

    #[test]
    fn download_config_from_app_config() {
        let app = AppConfig::default();
        let download = DownloadConfig::from(&app);
        assert_eq!(download.filings_dir, PathBuf::from("sec-edgar-filings"));
        assert_eq!(download.start_year, 2012);
        assert_eq!(download.rate_limit_ms, 200);
    }

    #[test]
    fn api_key_validation() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.openai.api_key_env = "FS_TEST_NONEXISTENT_KEY_12345".into();
        let result = validate_api_key(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("FS_TEST_NONEXISTENT_KEY_12345"));
    }

    #[test]
    fn user_agent_validation() {
        let mut config = AppConfig::default();
        config.edgar.user_agent_env = "FS_TEST_NONEXISTENT_AGENT_12345".into();
        let err = resolve_user_agent(&config).unwrap_err();
        assert!(err.to_string().contains("EDGAR user agent"));
    }
}
