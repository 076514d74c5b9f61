//! Window classification: prompt construction, reply parsing, and the
//! [`VerdictClient`] that joins them to a [`CompletionService`].

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument};

use filingscan_shared::{FilingScanError, OpenAiConfig};

use crate::completion::{CompletionRequest, CompletionService};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure to classify one window. Both kinds are recoverable per window.
#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    /// The call to the classifier service failed (network, HTTP status, timeout).
    #[error("classifier transport error: {0}")]
    Transport(String),

    /// The reply could not be parsed into a [`Verdict`].
    #[error("classifier format error: {0}")]
    Format(String),
}

impl ClassifyError {
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl From<ClassifyError> for FilingScanError {
    fn from(e: ClassifyError) -> Self {
        FilingScanError::Classification(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Verdict
// ---------------------------------------------------------------------------

/// The classifier's answer for one window.
///
/// `discontinued` implies a non-empty `drug_names`; [`parse_verdict`] turns a
/// positive flag without names into a negative verdict.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub discontinued: bool,
    pub drug_names: Vec<String>,
    pub reason: Option<String>,
}

impl Verdict {
    /// A negative verdict.
    pub fn negative() -> Self {
        Self::default()
    }

    /// A positive verdict, or a negative one when `drug_names` has no
    /// non-blank entry.
    pub fn positive(drug_names: Vec<String>, reason: Option<String>) -> Self {
        let drug_names: Vec<String> = drug_names
            .into_iter()
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .collect();
        if drug_names.is_empty() {
            return Self::negative();
        }
        Self {
            discontinued: true,
            drug_names,
            reason: reason
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty()),
        }
    }
}

// ---------------------------------------------------------------------------
// Prompt
// ---------------------------------------------------------------------------

/// Build the instruction for one window. The window text is embedded verbatim.
pub fn build_prompt(window_text: &str) -> String {
    format!(
        r#"The following text is extracted from a pharmaceutical company's SEC filing:
"""
{window_text}
"""

Does it describe the discontinuation of a drug? Only a drug or compound counts.
The discontinuation of a lab, facility, partnership, or any other operation does not.

If it does, reply with exactly this JSON object:
{{"discontinued": true, "drug_names": ["<name>", ...], "reason": "<reason>"}}

If it does not, reply with exactly:
{{"discontinued": false}}

Include "reason" only when the reason is stated in the extracted text. Do not infer one.
Reply with the JSON object and nothing else."#
    )
}

// ---------------------------------------------------------------------------
// Reply parsing
// ---------------------------------------------------------------------------

const DRUG_NAME_KEYS: [&str; 3] = ["drug_names", "drug_name(s)", "drug_name"];
const REASON_KEYS: [&str; 2] = ["reason", "reason_for_discontinuation"];

/// Locate the JSON object in a reply, tolerating code fences and prose
/// around it.
fn extract_json(reply: &str) -> Option<&str> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    (end > start).then(|| &reply[start..=end])
}

/// Parse a classifier reply into a [`Verdict`].
///
/// The reply must contain a JSON object with a boolean `discontinued`.
/// Drug names may be a string or an array; blank names are dropped.
pub fn parse_verdict(reply: &str) -> Result<Verdict, ClassifyError> {
    let json = extract_json(reply)
        .ok_or_else(|| ClassifyError::Format(format!("no JSON object in reply: {}", preview(reply))))?;

    let value: Value = serde_json::from_str(json)
        .map_err(|e| ClassifyError::Format(format!("invalid JSON: {e}")))?;
    let object = value
        .as_object()
        .ok_or_else(|| ClassifyError::Format("reply is not a JSON object".into()))?;

    let discontinued = match object.get("discontinued") {
        Some(Value::Bool(b)) => *b,
        Some(other) => {
            return Err(ClassifyError::Format(format!(
                "`discontinued` is not a boolean: {other}"
            )));
        }
        None => return Err(ClassifyError::Format("missing `discontinued` key".into())),
    };

    if !discontinued {
        return Ok(Verdict::negative());
    }

    let drug_names = DRUG_NAME_KEYS
        .iter()
        .find_map(|k| object.get(*k))
        .map(string_list)
        .unwrap_or_default();

    let reason = REASON_KEYS
        .iter()
        .find_map(|k| object.get(*k))
        .and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        });

    Ok(Verdict::positive(drug_names, reason))
}

/// A string or an array of scalars as a list of strings.
fn string_list(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => vec![s.clone()],
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn preview(s: &str) -> String {
    const MAX: usize = 120;
    match s.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

// ---------------------------------------------------------------------------
// VerdictClient
// ---------------------------------------------------------------------------

/// Anything that can classify a window.
#[async_trait]
pub trait Classify: Send + Sync {
    async fn classify(&self, window_text: &str) -> Result<Verdict, ClassifyError>;
}

/// Generation parameters sent with every call.
#[derive(Debug, Clone)]
pub struct ClassifierSettings {
    pub model: String,
    pub temperature: f64,
}

impl From<&OpenAiConfig> for ClassifierSettings {
    fn from(config: &OpenAiConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
        }
    }
}

/// Classifies windows with one completion call each. No retries.
pub struct VerdictClient<S> {
    service: S,
    settings: ClassifierSettings,
}

impl<S: CompletionService> VerdictClient<S> {
    pub fn new(service: S, settings: ClassifierSettings) -> Self {
        Self { service, settings }
    }

    pub fn settings(&self) -> &ClassifierSettings {
        &self.settings
    }
}

#[async_trait]
impl<S: CompletionService> Classify for VerdictClient<S> {
    #[instrument(skip_all, fields(window_chars = window_text.chars().count()))]
    async fn classify(&self, window_text: &str) -> Result<Verdict, ClassifyError> {
        let request = CompletionRequest {
            prompt: build_prompt(window_text),
            model: self.settings.model.clone(),
            temperature: self.settings.temperature,
        };
        let reply = self.service.complete(&request).await?;
        let verdict = parse_verdict(&reply)?;
        debug!(
            discontinued = verdict.discontinued,
            drug_names = ?verdict.drug_names,
            "window classified"
        );
        Ok(verdict)
    }
}
