//! Language-model trait and implementations.

pub mod gemini;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("rate limited (429){}", retry_hint(.retry_after))]
    RateLimited { retry_after: Option<Duration> },
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("prompt blocked by the model: {0}")]
    Blocked(String),
    #[error("model returned no completion text")]
    EmptyCompletion,
}

fn retry_hint(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(d) => format!(", retry after {:.1}s", d.as_secs_f64()),
        None => String::new(),
    }
}

/// A language model that turns an instruction plus a document into a text completion.
///
/// The instruction and the document are separate inputs so the model can tell
/// task framing apart from the text under analysis.
pub trait LanguageModel: Send + Sync {
    /// Display name of the model service (e.g. "Gemini").
    fn name(&self) -> &str;

    /// Request one completion. Resolves exactly once.
    fn generate<'a>(
        &'a self,
        instruction: &'a str,
        document: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, ModelError>> + Send + 'a>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_display() {
        let with = ModelError::RateLimited {
            retry_after: Some(Duration::from_secs(3)),
        };
        assert_eq!(with.to_string(), "rate limited (429), retry after 3.0s");
        let without = ModelError::RateLimited { retry_after: None };
        assert_eq!(without.to_string(), "rate limited (429)");
    }
}
