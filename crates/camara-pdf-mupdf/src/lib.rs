use std::path::Path;

use mupdf::{Document, TextPageFlags};

use camara_core::{BackendError, PdfBackend};

/// MuPDF-based implementation of [`PdfBackend`].
///
/// This crate is the sole AGPL island: it isolates the mupdf dependency so
/// that the pipeline and the OCR path do not transitively depend on it.
///
/// Text is read block by block, line by line. Minutes often carry vote tallies
/// right at the page edge, so nothing is excluded by default; the header and
/// footer bands can be switched on for municipalities whose letterhead or
/// page footer repeats on every page.
#[derive(Debug, Clone, Default)]
pub struct MupdfBackend {
    /// Fraction of page height from bottom to exclude as footer (0.0–1.0).
    footer_exclusion_ratio: Option<f32>,
    /// Fraction of page height from top to exclude as header (0.0–1.0).
    header_exclusion_ratio: Option<f32>,
}

impl MupdfBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the footer exclusion ratio. Pass `0.0` to disable.
    pub fn with_footer_exclusion(mut self, ratio: f32) -> Self {
        self.footer_exclusion_ratio = band(ratio);
        self
    }

    /// Set the header exclusion ratio. Pass `0.0` to disable.
    pub fn with_header_exclusion(mut self, ratio: f32) -> Self {
        self.header_exclusion_ratio = band(ratio);
        self
    }

    pub fn header_exclusion(&self) -> Option<f32> {
        self.header_exclusion_ratio
    }

    pub fn footer_exclusion(&self) -> Option<f32> {
        self.footer_exclusion_ratio
    }

    /// Whether a block spanning `y0..y1` falls inside an excluded band of a
    /// page spanning `top..bottom`.
    fn is_excluded(&self, top: f32, bottom: f32, y0: f32, y1: f32) -> bool {
        let height = bottom - top;
        // Blocks entirely within the header band
        if let Some(r) = self.header_exclusion_ratio {
            if y1 <= top + height * r {
                return true;
            }
        }
        // Blocks whose top edge is in the footer band
        if let Some(r) = self.footer_exclusion_ratio {
            if y0 >= bottom - height * r {
                return true;
            }
        }
        false
    }
}

fn band(ratio: f32) -> Option<f32> {
    if ratio > 0.0 {
        Some(ratio.min(1.0))
    } else {
        None
    }
}

impl PdfBackend for MupdfBackend {
    fn name(&self) -> &str {
        "mupdf"
    }

    fn extract_text(&self, path: &Path) -> Result<String, BackendError> {
        let path_str = path
            .to_str()
            .ok_or_else(|| BackendError::OpenError("invalid path encoding".into()))?;

        let document =
            Document::open(path_str).map_err(|e| BackendError::OpenError(e.to_string()))?;

        let mut pages_text = Vec::new();

        for page_result in document
            .pages()
            .map_err(|e| BackendError::ExtractionError(e.to_string()))?
        {
            let page = page_result.map_err(|e| BackendError::ExtractionError(e.to_string()))?;
            let text_page = page
                .to_text_page(TextPageFlags::empty())
                .map_err(|e| BackendError::ExtractionError(e.to_string()))?;
            let bounds = page
                .bounds()
                .map_err(|e| BackendError::ExtractionError(e.to_string()))?;

            let mut page_text = String::new();
            for block in text_page.blocks() {
                let b = block.bounds();
                if self.is_excluded(bounds.y0, bounds.y1, b.y0, b.y1) {
                    continue;
                }
                for line in block.lines() {
                    let line_text: String = line
                        .chars()
                        .map(|c| c.char().unwrap_or('\u{FFFD}'))
                        .collect();
                    page_text.push_str(&line_text);
                    page_text.push('\n');
                }
            }
            pages_text.push(page_text);
        }

        tracing::debug!(
            pages = pages_text.len(),
            header = ?self.header_exclusion_ratio,
            footer = ?self.footer_exclusion_ratio,
            "mupdf extraction complete"
        );
        Ok(pages_text.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_excludes_nothing() {
        let backend = MupdfBackend::new();
        assert!(!backend.is_excluded(0.0, 800.0, 0.0, 10.0));
        assert!(!backend.is_excluded(0.0, 800.0, 790.0, 800.0));
    }

    #[test]
    fn header_band() {
        let backend = MupdfBackend::new().with_header_exclusion(0.05);
        // band is 0..40
        assert!(backend.is_excluded(0.0, 800.0, 5.0, 35.0));
        assert!(!backend.is_excluded(0.0, 800.0, 30.0, 60.0));
    }

    #[test]
    fn footer_band() {
        let backend = MupdfBackend::new().with_footer_exclusion(0.05);
        // band is 760..800
        assert!(backend.is_excluded(0.0, 800.0, 770.0, 790.0));
        assert!(!backend.is_excluded(0.0, 800.0, 700.0, 770.0));
    }

    #[test]
    fn zero_ratio_disables() {
        let backend = MupdfBackend::new()
            .with_footer_exclusion(0.05)
            .with_footer_exclusion(0.0);
        assert!(!backend.is_excluded(0.0, 800.0, 790.0, 800.0));
    }

    #[test]
    fn missing_file_is_open_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = MupdfBackend::new()
            .extract_text(&dir.path().join("absent.pdf"))
            .unwrap_err();
        assert!(matches!(err, BackendError::OpenError(_)));
    }

    #[test]
    fn garbage_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.pdf");
        std::fs::write(&path, b"this is not a pdf").unwrap();
        assert!(MupdfBackend::new().extract_text(&path).is_err());
    }
}
