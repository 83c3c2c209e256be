//! The two pipeline stages: document text, then structured votes.

use std::path::Path;
use std::sync::Arc;

use crate::backend::{BackendError, PdfBackend};
use crate::llm::LanguageModel;
use crate::prompt::INSTRUCTION_PROMPT;
use crate::response::parse_completion;
use crate::{PipelineError, SessionExtraction};

/// Turns a document path into its raw text via a [`PdfBackend`].
#[derive(Clone)]
pub struct TextExtractor {
    backend: Arc<dyn PdfBackend>,
}

impl TextExtractor {
    pub fn new(backend: Arc<dyn PdfBackend>) -> Self {
        Self { backend }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Extract all text from the document at `path`.
    ///
    /// A missing file fails before the backend is touched. Dropping the
    /// returned future drops the backend's work with it.
    pub async fn extract_text(&self, path: &Path) -> Result<String, PipelineError> {
        if !path.exists() {
            return Err(BackendError::NotFound(path.to_path_buf()).into());
        }

        tracing::debug!(backend = self.backend.name(), path = %path.display(), "extracting text");
        let text = Arc::clone(&self.backend)
            .extract_text_async(path.to_path_buf())
            .await?;

        if text.trim().is_empty() {
            tracing::warn!(
                path = %path.display(),
                "document has no extractable text (scanned PDF? try the OCR backend)"
            );
        }
        tracing::debug!(chars = text.chars().count(), "text extracted");
        Ok(text)
    }
}

/// Asks a [`LanguageModel`] for the votes in a document and validates the answer.
#[derive(Clone)]
pub struct VoteExtractor {
    model: Arc<dyn LanguageModel>,
}

impl VoteExtractor {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Extract vote records from raw minutes text.
    ///
    /// Makes exactly one model call. Either every record validates or the
    /// call fails with [`PipelineError::MalformedResponse`].
    pub async fn extract_votes(&self, raw_text: &str) -> Result<SessionExtraction, PipelineError> {
        let completion = self.model.generate(INSTRUCTION_PROMPT, raw_text).await?;
        tracing::debug!(
            model = self.model.name(),
            chars = completion.len(),
            "completion received"
        );

        let extraction = parse_completion(&completion).inspect_err(|e| {
            tracing::debug!(error = %e, "completion failed validation");
        })?;
        tracing::info!(records = extraction.len(), "vote records extracted");
        Ok(extraction)
    }
}
