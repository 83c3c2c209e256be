use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod backend;
pub mod config_file;
pub mod extractor;
pub mod llm;
pub mod pipeline;
pub mod prompt;
pub mod response;

// Re-export for convenience
pub use backend::{BackendError, PdfBackend, TextFuture};
pub use extractor::{TextExtractor, VoteExtractor};
pub use llm::gemini::{GeminiClient, GeminiConfig};
pub use llm::{LanguageModel, ModelError};
pub use pipeline::Pipeline;
pub use response::{ResponseError, ShapeProblem, parse_completion};

/// One member's recorded position on one [`VoteRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberVote {
    #[serde(rename = "vereador")]
    member: String,
    #[serde(rename = "voto")]
    choice: String,
}

impl MemberVote {
    pub(crate) fn new(member: String, choice: String) -> Self {
        Self { member, choice }
    }

    pub fn member(&self) -> &str {
        &self.member
    }

    /// The choice exactly as the minutes phrase it ("Sim", "Não", "Ausente", ...).
    pub fn choice(&self) -> &str {
        &self.choice
    }
}

/// One legislative item voted on in a session.
///
/// The descriptive fields are optional: minutes often omit them and the model
/// may leave them out. They are serialized only when present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoteRecord {
    #[serde(rename = "id_projeto")]
    project_id: String,
    #[serde(rename = "data_votacao", skip_serializing_if = "Option::is_none")]
    session_date: Option<String>,
    #[serde(rename = "objeto_da_votacao", skip_serializing_if = "Option::is_none")]
    subject: Option<String>,
    #[serde(rename = "projetos_relacionados", skip_serializing_if = "Vec::is_empty")]
    related_projects: Vec<String>,
    #[serde(rename = "resumo", skip_serializing_if = "Option::is_none")]
    summary: Option<String>,
    #[serde(rename = "resultado")]
    outcome: String,
    #[serde(rename = "votos")]
    member_votes: Vec<MemberVote>,
}

impl VoteRecord {
    pub(crate) fn new(project_id: String, outcome: String, member_votes: Vec<MemberVote>) -> Self {
        Self {
            project_id,
            session_date: None,
            subject: None,
            related_projects: Vec::new(),
            summary: None,
            outcome,
            member_votes,
        }
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Session date as written by the model, usually `YYYY-MM-DD`.
    pub fn session_date(&self) -> Option<&str> {
        self.session_date.as_deref()
    }

    /// Short description of what was put to the vote.
    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    /// Every bill or decree mentioned in connection with this vote.
    pub fn related_projects(&self) -> &[String] {
        &self.related_projects
    }

    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    pub fn outcome(&self) -> &str {
        &self.outcome
    }

    pub fn member_votes(&self) -> &[MemberVote] {
        &self.member_votes
    }

    /// Count votes per choice, in order of first appearance.
    ///
    /// Choices are compared case-insensitively after trimming; the label kept
    /// is the first spelling seen.
    pub fn tally(&self) -> Vec<(&str, usize)> {
        let mut counts: Vec<(&str, usize)> = Vec::new();
        for vote in &self.member_votes {
            let choice = vote.choice.trim();
            match counts
                .iter_mut()
                .find(|(label, _)| label.to_lowercase() == choice.to_lowercase())
            {
                Some((_, n)) => *n += 1,
                None => counts.push((choice, 1)),
            }
        }
        counts
    }
}

/// The validated result of processing one session minutes document.
///
/// Serializes as a bare JSON array using the same field names the model is
/// asked to produce. Deserializing runs the same validation as a completion,
/// so a file read back in upholds the same invariants.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionExtraction {
    #[serde(deserialize_with = "response::deserialize_records")]
    records: Vec<VoteRecord>,
}

impl SessionExtraction {
    pub(crate) fn new(records: Vec<VoteRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[VoteRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, VoteRecord> {
        self.records.iter()
    }
}

impl<'a> IntoIterator for &'a SessionExtraction {
    type Item = &'a VoteRecord;
    type IntoIter = std::slice::Iter<'a, VoteRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Pipeline stage an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    TextExtraction,
    Inference,
    Validation,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::TextExtraction => write!(f, "text extraction"),
            Stage::Inference => write!(f, "model inference"),
            Stage::Validation => write!(f, "response validation"),
        }
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("text extraction failed: {0}")]
    Extraction(#[from] BackendError),
    #[error("model inference failed: {0}")]
    Inference(#[from] ModelError),
    #[error("malformed model response: {0}")]
    MalformedResponse(#[from] ResponseError),
    #[error("extraction cancelled")]
    Cancelled,
}

impl PipelineError {
    /// The stage that failed. `None` for cancellation, which can interrupt any stage.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineError::Extraction(_) => Some(Stage::TextExtraction),
            PipelineError::Inference(_) => Some(Stage::Inference),
            PipelineError::MalformedResponse(_) => Some(Stage::Validation),
            PipelineError::Cancelled => None,
        }
    }

    /// Whether a caller could reasonably try the document again.
    ///
    /// The pipeline itself never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::Inference(_) | PipelineError::MalformedResponse(_)
        )
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("no Gemini API key configured (set GEMINI_API_KEY or `api_key` under [gemini])")]
    MissingApiKey,
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Runtime configuration for the extraction pipeline.
#[derive(Clone)]
pub struct Config {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    /// Per-request timeout for the model call.
    pub request_timeout_secs: u64,
    pub temperature: Option<f32>,
    /// Overall deadline for one document. Expiry surfaces as
    /// [`PipelineError::Cancelled`].
    pub deadline_secs: Option<u64>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("temperature", &self.temperature)
            .field("deadline_secs", &self.deadline_secs)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            model: llm::gemini::DEFAULT_MODEL.to_string(),
            base_url: llm::gemini::DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: 120,
            temperature: None,
            deadline_secs: None,
        }
    }
}

impl Config {
    /// Build the Gemini client settings. Fails if no API key is set.
    pub fn gemini_config(&self) -> Result<GeminiConfig, ConfigError> {
        let api_key = self
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(ConfigError::MissingApiKey)?;
        Ok(GeminiConfig {
            api_key: api_key.to_string(),
            model: self.model.clone(),
            base_url: self.base_url.clone(),
            timeout: Duration::from_secs(self.request_timeout_secs),
            temperature: self.temperature,
        })
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }
}
