//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use filingscan_core::{
    AnalysisProgress, ClassifierSettings, DocumentReport, OpenAiChat, ProgressReporter,
    VerdictClient, analyze_filings, download_filings,
};
use filingscan_edgar::{DownloadResult, EdgarClient};
use filingscan_shared::{
    AnalysisSettings, AppConfig, CompanyEntry, DocumentId, DownloadConfig, init_config,
    load_config, resolve_api_key, resolve_user_agent,
};
use filingscan_storage::Storage;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// filingscan: find discontinued drug programs in SEC filings.
#[derive(Parser)]
#[command(
    name = "filingscan",
    version,
    about = "Download SEC filings and flag discontinued drug programs with an LLM.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Database path (defaults to `defaults.db_path` from the config).
    #[arg(long, env = "FILINGSCAN_DB", global = true)]
    pub db: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Download filings for the configured companies.
    Download {
        /// Only download this company (matches the configured name).
        #[arg(short, long)]
        company: Option<String>,
    },

    /// Classify every filing not yet analyzed.
    Analyze,

    /// Download, then analyze.
    Run {
        /// Analyze already-recorded filings only.
        #[arg(long)]
        skip_download: bool,
    },

    /// List filings with a discontinued drug.
    Findings {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Show filing counts by processing state.
    Status,

    /// Return a filing to the unprocessed queue.
    Reset {
        /// Filename as recorded in the database.
        filename: String,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "filingscan=info",
        1 => "filingscan=debug",
        _ => "filingscan=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let db = cli.db.clone();
    match cli.command {
        Command::Download { company } => cmd_download(db, company.as_deref()).await,
        Command::Analyze => cmd_analyze(db).await,
        Command::Run { skip_download } => cmd_run(db, skip_download).await,
        Command::Findings { json } => cmd_findings(db, json).await,
        Command::Status => cmd_status(db).await,
        Command::Reset { filename } => cmd_reset(db, &filename).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

/// The database path: `--db` if given, else the configured default.
fn db_path(db: Option<PathBuf>, config: &AppConfig) -> PathBuf {
    db.unwrap_or_else(|| PathBuf::from(&config.defaults.db_path))
}

/// Configured companies, optionally narrowed to one by name.
fn select_companies(config: &AppConfig, only: Option<&str>) -> Result<Vec<CompanyEntry>> {
    let Some(name) = only else {
        return Ok(config.companies.clone());
    };
    let selected: Vec<CompanyEntry> = config
        .companies
        .iter()
        .filter(|c| c.name.eq_ignore_ascii_case(name))
        .cloned()
        .collect();
    if selected.is_empty() {
        let known: Vec<&str> = config.companies.iter().map(|c| c.name.as_str()).collect();
        return Err(eyre!(
            "unknown company '{name}': expected one of {}",
            known.join(", ")
        ));
    }
    Ok(selected)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_download(db: Option<PathBuf>, company: Option<&str>) -> Result<()> {
    let config = load_config()?;
    let user_agent = resolve_user_agent(&config)?;
    let companies = select_companies(&config, company)?;
    let storage = Storage::open(&db_path(db, &config)).await?;

    download(&config, &user_agent, &companies, &storage).await
}

async fn download(
    config: &AppConfig,
    user_agent: &str,
    companies: &[CompanyEntry],
    storage: &Storage,
) -> Result<()> {
    let client = EdgarClient::new(DownloadConfig::from(config), user_agent)?;

    info!(companies = companies.len(), "downloading filings");

    let reporter = CliProgress::new();
    let summary = download_filings(&client, companies, storage, &reporter).await?;
    reporter.finish();

    println!();
    println!("  Download complete");
    for (name, result) in &summary.companies {
        println!(
            "  {name:<24} {:>4} new  {:>4} on disk  {:>4} known  {:>3} errors",
            result.downloaded,
            result.found_on_disk,
            result.already_recorded,
            result.errors.len()
        );
    }
    for (name, error) in &summary.failed {
        println!("  {name:<24} failed: {error}");
    }
    println!("  Time: {:.1}s", summary.elapsed.as_secs_f64());
    println!();

    Ok(())
}

async fn cmd_analyze(db: Option<PathBuf>) -> Result<()> {
    let config = load_config()?;
    let api_key = resolve_api_key(&config)?;
    let storage = Storage::open(&db_path(db, &config)).await?;

    analyze(&config, api_key, &storage).await
}

async fn analyze(config: &AppConfig, api_key: String, storage: &Storage) -> Result<()> {
    let chat = OpenAiChat::new(&config.openai, api_key)?;
    let classifier = VerdictClient::new(chat, ClassifierSettings::from(&config.openai));
    let settings = AnalysisSettings::from(config);

    info!(model = %config.openai.model, "analyzing filings");

    let reporter = CliProgress::new();
    let run = analyze_filings(storage, &classifier, &settings, &reporter).await?;
    reporter.finish();

    let report = &run.report;
    println!();
    println!("  Analysis complete");
    println!("  Run:       {}", run.run_id);
    println!("  Filings:   {}", report.documents.len());
    println!("  Windows:   {}", report.total_windows());
    println!("  Failures:  {}", report.total_calls_failed());
    println!("  Findings:  {}", report.findings().count());
    for doc in report.findings() {
        println!("    {}  {}", doc.id, doc.result.drug_names.join(", "));
    }
    println!("  Time:      {:.1}s", report.elapsed.as_secs_f64());
    println!();

    Ok(())
}

async fn cmd_run(db: Option<PathBuf>, skip_download: bool) -> Result<()> {
    let config = load_config()?;
    // Fail on missing credentials before any network work.
    let api_key = resolve_api_key(&config)?;
    let user_agent = if skip_download {
        None
    } else {
        Some(resolve_user_agent(&config)?)
    };
    let storage = Storage::open(&db_path(db, &config)).await?;

    if let Some(user_agent) = user_agent {
        download(&config, &user_agent, &config.companies, &storage).await?;
    }
    analyze(&config, api_key, &storage).await
}

async fn cmd_findings(db: Option<PathBuf>, json: bool) -> Result<()> {
    let config = load_config()?;
    let storage = Storage::open_readonly(&db_path(db, &config)).await?;
    let findings = storage.list_findings().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&findings)?);
        return Ok(());
    }

    if findings.is_empty() {
        println!("No discontinued drugs found yet.");
        return Ok(());
    }

    for f in &findings {
        println!(
            "{:<24} {:<6} {:<10} {}",
            f.company,
            f.filing_type,
            f.report_date,
            f.drug_names.join(", ")
        );
        if let Some(reason) = &f.reason {
            println!("{:>42}reason: {reason}", "");
        }
        println!("{:>42}{}", "", f.filename);
    }
    Ok(())
}

async fn cmd_status(db: Option<PathBuf>) -> Result<()> {
    let config = load_config()?;
    let storage = Storage::open_readonly(&db_path(db, &config)).await?;
    let counts = storage.status_counts().await?;

    println!("  Unprocessed:   {}", counts.unprocessed);
    println!("  Processed:     {}", counts.processed);
    println!("  Discontinued:  {}", counts.discontinued);
    Ok(())
}

async fn cmd_reset(db: Option<PathBuf>, filename: &str) -> Result<()> {
    let config = load_config()?;
    let storage = Storage::open(&db_path(db, &config)).await?;
    storage.reset_filing(filename).await?;
    println!("Reset {filename}; it will be analyzed on the next run.");
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl AnalysisProgress for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn document_started(&self, id: &DocumentId, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Analyzing [{current}/{total}] {id}"));
    }

    fn window_classified(&self, id: &DocumentId, current: usize, total: usize, ok: bool) {
        let mark = if ok { "" } else { " (failed)" };
        self.spinner
            .set_message(format!("Classifying window {current}/{total}{mark} in {id}"));
    }

    fn document_finished(&self, report: &DocumentReport) {
        if report.result.discontinued {
            self.spinner.println(format!(
                "  found {} in {}",
                report.result.drug_names.join(", "),
                report.id
            ));
        }
    }
}

impl ProgressReporter for CliProgress {
    fn company_downloaded(
        &self,
        company: &str,
        current: usize,
        total: usize,
        result: Option<&DownloadResult>,
    ) {
        let msg = match result {
            Some(r) => format!(
                "Downloaded [{current}/{total}] {company}: {} new, {} errors",
                r.downloaded,
                r.errors.len()
            ),
            None => format!("Downloaded [{current}/{total}] {company}: listing failed"),
        };
        self.spinner.set_message(msg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["filingscan", "findings", "--json", "--db", "x.db", "-vv"])
            .unwrap();
        assert_eq!(cli.db, Some(PathBuf::from("x.db")));
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Command::Findings { json: true }));
    }

    #[test]
    fn select_companies_by_name() {
        let config = AppConfig::default();
        assert_eq!(select_companies(&config, None).unwrap().len(), 7);

        let one = select_companies(&config, Some("eli lilly")).unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].cik, "59478");

        assert!(select_companies(&config, Some("Acme")).is_err());
    }

    #[test]
    fn db_flag_overrides_config() {
        let config = AppConfig::default();
        assert_eq!(db_path(None, &config), PathBuf::from("var/filingscan.db"));
        assert_eq!(
            db_path(Some(PathBuf::from("other.db")), &config),
            PathBuf::from("other.db")
        );
    }
}
