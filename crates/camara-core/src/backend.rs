use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("document not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("failed to open PDF: {0}")]
    OpenError(String),
    #[error("failed to extract text: {0}")]
    ExtractionError(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Future returned by [`PdfBackend::extract_text_async`].
pub type TextFuture = Pin<Box<dyn Future<Output = Result<String, BackendError>> + Send>>;

/// Trait for PDF text extraction backends.
///
/// Implementors turn a document on disk into one plain-text string. Page and
/// column structure does not need to survive; only the textual content does.
pub trait PdfBackend: Send + Sync + 'static {
    /// Short backend name used in logs (e.g. "mupdf", "ocr").
    fn name(&self) -> &str;

    /// Extract the full text content of a PDF file.
    fn extract_text(&self, path: &Path) -> Result<String, BackendError>;

    /// Extract text without blocking the runtime.
    ///
    /// The default moves [`extract_text`](Self::extract_text) onto the blocking
    /// pool, where it runs to completion even if the future is dropped.
    /// Backends that drive external processes override this so that dropping
    /// the future stops them.
    fn extract_text_async(self: Arc<Self>, path: PathBuf) -> TextFuture {
        Box::pin(async move {
            tokio::task::spawn_blocking(move || self.extract_text(&path))
                .await
                .map_err(|e| BackendError::ExtractionError(format!("extraction task failed: {e}")))?
        })
    }
}
