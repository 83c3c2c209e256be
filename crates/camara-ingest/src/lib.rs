use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;

pub mod ocr;

// Re-export the backend trait for convenience
pub use camara_core::{BackendError, PdfBackend};
pub use ocr::OcrBackend;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("unknown extraction backend `{0}` (expected `mupdf` or `ocr`)")]
    UnknownBackend(String),
    #[cfg(not(feature = "pdf"))]
    #[error("MuPDF support not compiled in (enable the `pdf` feature of camara-ingest)")]
    NoPdfSupport,
}

/// Which engine turns a PDF into text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// Read the embedded text layer with MuPDF.
    #[default]
    Mupdf,
    /// Rasterize pages and run Tesseract, for scanned minutes.
    Ocr,
}

impl FromStr for BackendKind {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mupdf" | "text" => Ok(BackendKind::Mupdf),
            "ocr" | "tesseract" => Ok(BackendKind::Ocr),
            other => Err(IngestError::UnknownBackend(other.to_string())),
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Mupdf => write!(f, "mupdf"),
            BackendKind::Ocr => write!(f, "ocr"),
        }
    }
}

/// Settings for building a backend.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub kind: BackendKind,
    /// Tesseract language code(s), e.g. "por" or "por+eng".
    pub ocr_language: String,
    /// Rasterization resolution for OCR.
    pub ocr_dpi: u32,
    /// Fraction of each page's height skipped at the top by MuPDF. `0.0` keeps everything.
    pub header_exclusion: f32,
    /// Fraction of each page's height skipped at the bottom by MuPDF.
    pub footer_exclusion: f32,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::default(),
            ocr_language: ocr::DEFAULT_LANGUAGE.to_string(),
            ocr_dpi: ocr::DEFAULT_DPI,
            header_exclusion: 0.0,
            footer_exclusion: 0.0,
        }
    }
}

/// Build the text extraction backend described by `config`.
pub fn backend_for(config: &IngestConfig) -> Result<Arc<dyn PdfBackend>, IngestError> {
    tracing::debug!(kind = %config.kind, "selecting extraction backend");
    match config.kind {
        BackendKind::Mupdf => mupdf_backend(config),
        BackendKind::Ocr => Ok(Arc::new(
            OcrBackend::new()
                .with_language(&config.ocr_language)
                .with_dpi(config.ocr_dpi),
        )),
    }
}

#[cfg(feature = "pdf")]
fn mupdf_backend(config: &IngestConfig) -> Result<Arc<dyn PdfBackend>, IngestError> {
    Ok(Arc::new(configured_mupdf(config)))
}

#[cfg(feature = "pdf")]
fn configured_mupdf(config: &IngestConfig) -> camara_pdf_mupdf::MupdfBackend {
    camara_pdf_mupdf::MupdfBackend::new()
        .with_header_exclusion(config.header_exclusion)
        .with_footer_exclusion(config.footer_exclusion)
}

#[cfg(not(feature = "pdf"))]
fn mupdf_backend(_config: &IngestConfig) -> Result<Arc<dyn PdfBackend>, IngestError> {
    Err(IngestError::NoPdfSupport)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_backend_kind() {
        assert_eq!("mupdf".parse::<BackendKind>().unwrap(), BackendKind::Mupdf);
        assert_eq!(" OCR ".parse::<BackendKind>().unwrap(), BackendKind::Ocr);
        assert_eq!(
            "tesseract".parse::<BackendKind>().unwrap(),
            BackendKind::Ocr
        );
        assert!(matches!(
            "pdfium".parse::<BackendKind>(),
            Err(IngestError::UnknownBackend(s)) if s == "pdfium"
        ));
    }

    #[test]
    fn display_roundtrips() {
        for kind in [BackendKind::Mupdf, BackendKind::Ocr] {
            assert_eq!(kind.to_string().parse::<BackendKind>().unwrap(), kind);
        }
    }

    #[test]
    fn ocr_backend_selected() {
        let config = IngestConfig {
            kind: BackendKind::Ocr,
            ..IngestConfig::default()
        };
        assert_eq!(backend_for(&config).unwrap().name(), "ocr");
    }

    #[cfg(feature = "pdf")]
    #[test]
    fn mupdf_exclusion_bands_come_from_config() {
        let plain = configured_mupdf(&IngestConfig::default());
        assert_eq!(plain.header_exclusion(), None);
        assert_eq!(plain.footer_exclusion(), None);

        let config = IngestConfig {
            header_exclusion: 0.08,
            footer_exclusion: 0.05,
            ..IngestConfig::default()
        };
        let banded = configured_mupdf(&config);
        assert_eq!(banded.header_exclusion(), Some(0.08));
        assert_eq!(banded.footer_exclusion(), Some(0.05));
    }

    #[cfg(feature = "pdf")]
    #[test]
    fn mupdf_backend_selected_by_default() {
        assert_eq!(
            backend_for(&IngestConfig::default()).unwrap().name(),
            "mupdf"
        );
    }
}
