//! Document-to-records pipeline with cancellation.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::backend::PdfBackend;
use crate::extractor::{TextExtractor, VoteExtractor};
use crate::llm::gemini::GeminiClient;
use crate::{Config, ConfigError, PipelineError, SessionExtraction};

/// Text extraction followed by vote extraction, strictly in sequence.
///
/// Holds no per-document state; one `Pipeline` can serve any number of
/// concurrent runs.
#[derive(Clone)]
pub struct Pipeline {
    text: TextExtractor,
    votes: VoteExtractor,
    deadline: Option<Duration>,
}

impl Pipeline {
    pub fn new(text: TextExtractor, votes: VoteExtractor) -> Self {
        Self {
            text,
            votes,
            deadline: None,
        }
    }

    /// Build a pipeline backed by Gemini from configuration.
    pub fn from_config(config: &Config, backend: Arc<dyn PdfBackend>) -> Result<Self, ConfigError> {
        let model = GeminiClient::new(config.gemini_config()?)?;
        Ok(Self::new(
            TextExtractor::new(backend),
            VoteExtractor::new(Arc::new(model)),
        )
        .with_deadline(config.deadline()))
    }

    /// Overall time budget for one document. Expiry surfaces as
    /// [`PipelineError::Cancelled`].
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn text_extractor(&self) -> &TextExtractor {
        &self.text
    }

    pub fn vote_extractor(&self) -> &VoteExtractor {
        &self.votes
    }

    /// Run both stages on one document.
    pub async fn run(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<SessionExtraction, PipelineError> {
        self.run_inspect(path, cancel, |_| {}).await
    }

    /// Like [`run`](Self::run), handing the extracted text to `on_text` before
    /// the model is called.
    pub async fn run_inspect(
        &self,
        path: &Path,
        cancel: &CancellationToken,
        on_text: impl FnOnce(&str),
    ) -> Result<SessionExtraction, PipelineError> {
        let deadline = deadline_after(self.deadline);

        let text = guarded(self.text.extract_text(path), cancel, deadline).await?;
        on_text(&text);
        guarded(self.votes.extract_votes(&text), cancel, deadline).await
    }

    /// Run only the text stage.
    pub async fn extract_text(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<String, PipelineError> {
        guarded(
            self.text.extract_text(path),
            cancel,
            deadline_after(self.deadline),
        )
        .await
    }
}

/// The instant `budget` from now. A budget too large to represent means no
/// deadline at all.
pub fn deadline_after(budget: Option<Duration>) -> Option<Instant> {
    budget.and_then(|d| Instant::now().checked_add(d))
}

/// Race `work` against cancellation and the deadline. The losing future is
/// dropped, which aborts any request or child process it had in flight.
pub async fn guarded<T>(
    work: impl Future<Output = Result<T, PipelineError>>,
    cancel: &CancellationToken,
    deadline: Option<Instant>,
) -> Result<T, PipelineError> {
    let expired = async {
        match deadline {
            Some(at) => tokio::time::sleep_until(at).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            tracing::debug!("pipeline cancelled");
            Err(PipelineError::Cancelled)
        }
        _ = expired => {
            tracing::debug!("pipeline deadline expired");
            Err(PipelineError::Cancelled)
        }
        result = work => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadline_after_overflow_is_none() {
        assert!(deadline_after(None).is_none());
        assert!(deadline_after(Some(Duration::from_secs(u64::MAX))).is_none());
        assert!(deadline_after(Some(Duration::from_secs(30))).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn guarded_deadline_yields_cancelled() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<_, PipelineError>(())
        };
        let deadline = deadline_after(Some(Duration::from_secs(1)));
        let result = guarded(slow, &CancellationToken::new(), deadline).await;
        assert!(matches!(result, Err(PipelineError::Cancelled)));
    }
}
