//! OCR backend for scanned minutes.
//!
//! Pages are rendered to PNG with poppler's `pdftoppm`, then each image goes
//! through the `tesseract` CLI. Both tools must be on `PATH` (or configured
//! explicitly).

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::Arc;

use camara_core::{BackendError, PdfBackend, TextFuture};

pub const DEFAULT_LANGUAGE: &str = "por";
pub const DEFAULT_DPI: u32 = 300;

const PAGE_PREFIX: &str = "pagina";

/// Text extraction through rasterization and Tesseract OCR.
#[derive(Debug, Clone)]
pub struct OcrBackend {
    language: String,
    dpi: u32,
    pdftoppm: PathBuf,
    tesseract: PathBuf,
}

impl Default for OcrBackend {
    fn default() -> Self {
        Self {
            language: DEFAULT_LANGUAGE.to_string(),
            dpi: DEFAULT_DPI,
            pdftoppm: PathBuf::from("pdftoppm"),
            tesseract: PathBuf::from("tesseract"),
        }
    }
}

impl OcrBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_language(mut self, language: &str) -> Self {
        self.language = language.to_string();
        self
    }

    pub fn with_dpi(mut self, dpi: u32) -> Self {
        self.dpi = dpi.max(72);
        self
    }

    /// Use specific executables instead of looking them up on `PATH`.
    pub fn with_programs(mut self, pdftoppm: impl Into<PathBuf>, tesseract: impl Into<PathBuf>) -> Self {
        self.pdftoppm = pdftoppm.into();
        self.tesseract = tesseract.into();
        self
    }

    /// `pdftoppm` invocation rendering every page of `pdf` into `dir`.
    fn rasterize_command(&self, pdf: &Path, dir: &Path) -> Command {
        let mut cmd = Command::new(&self.pdftoppm);
        cmd.arg("-png")
            .arg("-r")
            .arg(self.dpi.to_string())
            .arg(pdf)
            .arg(dir.join(PAGE_PREFIX));
        cmd
    }

    /// `tesseract` invocation printing the text of one page image.
    fn recognize_command(&self, image: &Path) -> Command {
        let mut cmd = Command::new(&self.tesseract);
        cmd.arg(image).arg("stdout").arg("-l").arg(&self.language);
        cmd
    }
}

impl PdfBackend for OcrBackend {
    fn name(&self) -> &str {
        "ocr"
    }

    fn extract_text(&self, path: &Path) -> Result<String, BackendError> {
        let workdir = tempfile::tempdir()?;
        checked(
            self.rasterize_command(path, workdir.path()).output(),
            "pdftoppm",
            BackendError::OpenError,
        )?;
        let images = page_images(workdir.path())?;
        tracing::debug!(pages = images.len(), language = %self.language, "running OCR");

        let texts = images
            .iter()
            .map(|img| {
                checked(
                    self.recognize_command(img).output(),
                    "tesseract",
                    BackendError::ExtractionError,
                )
                .map(|out| stdout_text(&out))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(texts.join("\n"))
    }

    /// Same steps as [`extract_text`](Self::extract_text), with the tools run
    /// as child processes of the runtime. Dropping the future kills the tool
    /// currently running and removes the page images.
    fn extract_text_async(self: Arc<Self>, path: PathBuf) -> TextFuture {
        Box::pin(async move {
            let workdir = tempfile::tempdir()?;
            checked(
                run_killable(self.rasterize_command(&path, workdir.path())).await,
                "pdftoppm",
                BackendError::OpenError,
            )?;
            let images = page_images(workdir.path())?;
            tracing::debug!(pages = images.len(), language = %self.language, "running OCR");

            let mut texts = Vec::with_capacity(images.len());
            for img in &images {
                let output = checked(
                    run_killable(self.recognize_command(img)).await,
                    "tesseract",
                    BackendError::ExtractionError,
                )?;
                texts.push(stdout_text(&output));
            }
            Ok(texts.join("\n"))
        })
    }
}

/// Page images written by `pdftoppm` into `dir`, in page order.
fn page_images(dir: &Path) -> Result<Vec<PathBuf>, BackendError> {
    let mut pages: Vec<(u32, PathBuf)> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter_map(|p| page_number(&p).map(|n| (n, p)))
        .collect();
    pages.sort_by_key(|(n, _)| *n);

    if pages.is_empty() {
        return Err(BackendError::ExtractionError(
            "pdftoppm produced no page images".into(),
        ));
    }
    Ok(pages.into_iter().map(|(_, p)| p).collect())
}

/// Page number from a `pdftoppm` output name such as `pagina-07.png`.
fn page_number(path: &Path) -> Option<u32> {
    if path.extension()?.to_str()? != "png" {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    let digits = stem.strip_prefix(PAGE_PREFIX)?.trim_start_matches('-');
    digits.parse().ok()
}

fn stdout_text(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// Run `cmd` as a child of the runtime, killed if the future is dropped.
async fn run_killable(cmd: Command) -> std::io::Result<Output> {
    let mut cmd = tokio::process::Command::from(cmd);
    cmd.kill_on_drop(true);
    cmd.output().await
}

/// Classify the result of running `tool`, mapping a non-zero exit through
/// `on_failure`.
fn checked(
    result: std::io::Result<Output>,
    tool: &str,
    on_failure: fn(String) -> BackendError,
) -> Result<Output, BackendError> {
    let output = result.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            BackendError::ExtractionError(format!("{tool} not found; install it or configure its path"))
        } else {
            BackendError::Io(e)
        }
    })?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(on_failure(format!(
            "{tool} exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }
    Ok(output)
}
