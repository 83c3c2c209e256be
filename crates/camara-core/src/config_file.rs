use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::Config;

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub gemini: Option<GeminiSection>,
    pub extraction: Option<ExtractionSection>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeminiSection {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub timeout_secs: Option<u64>,
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionSection {
    /// "mupdf" or "ocr".
    pub backend: Option<String>,
    /// Tesseract language code for the OCR backend.
    pub ocr_language: Option<String>,
    pub deadline_secs: Option<u64>,
    /// Fraction of page height dropped from the top by the MuPDF backend.
    pub header_exclusion: Option<f32>,
    /// Fraction of page height dropped from the bottom by the MuPDF backend.
    pub footer_exclusion: Option<f32>,
}

/// Platform config directory path: `<config_dir>/camara/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("camara").join("config.toml"))
}

/// Load config by cascading CWD `.camara.toml` over platform config.
/// CWD values override platform values.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(Path::new(".camara.toml"));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

/// Load a config from a specific path. Returns `None` if the file doesn't
/// exist or can't be parsed.
pub fn load_from_path(path: &Path) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unparseable config file");
            None
        }
    }
}

/// Pick the overlay value if present, otherwise the base value.
fn pick<S, T>(base: &Option<S>, overlay: &Option<S>, f: impl Fn(&S) -> Option<T>) -> Option<T> {
    overlay
        .as_ref()
        .and_then(&f)
        .or_else(|| base.as_ref().and_then(&f))
}

/// Merge two configs: `overlay` values take precedence over `base`.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    let (bg, og) = (&base.gemini, &overlay.gemini);
    let (be, oe) = (&base.extraction, &overlay.extraction);
    ConfigFile {
        gemini: Some(GeminiSection {
            api_key: pick(bg, og, |g| g.api_key.clone()),
            model: pick(bg, og, |g| g.model.clone()),
            base_url: pick(bg, og, |g| g.base_url.clone()),
            timeout_secs: pick(bg, og, |g| g.timeout_secs),
            temperature: pick(bg, og, |g| g.temperature),
        }),
        extraction: Some(ExtractionSection {
            backend: pick(be, oe, |e| e.backend.clone()),
            ocr_language: pick(be, oe, |e| e.ocr_language.clone()),
            deadline_secs: pick(be, oe, |e| e.deadline_secs),
            header_exclusion: pick(be, oe, |e| e.header_exclusion),
            footer_exclusion: pick(be, oe, |e| e.footer_exclusion),
        }),
    }
}

impl ConfigFile {
    /// Apply file values on top of [`Config::default`].
    pub fn to_config(&self) -> Config {
        let mut config = Config::default();
        if let Some(ref g) = self.gemini {
            if let Some(ref key) = g.api_key {
                config.api_key = Some(key.clone());
            }
            if let Some(ref model) = g.model {
                config.model = model.clone();
            }
            if let Some(ref url) = g.base_url {
                config.base_url = url.clone();
            }
            if let Some(secs) = g.timeout_secs {
                config.request_timeout_secs = secs;
            }
            config.temperature = g.temperature;
        }
        if let Some(ref e) = self.extraction {
            config.deadline_secs = e.deadline_secs;
        }
        config
    }
}

/// Write `config` to `path` as TOML. Creates parent dirs if needed.
pub fn save_to_path(config: &ConfigFile, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config dir: {}", e))?;
    }
    let content =
        toml::to_string_pretty(config).map_err(|e| format!("Failed to serialize config: {}", e))?;
    std::fs::write(path, content).map_err(|e| format!("Failed to write config: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_partial_config() {
        let content = r#"
[gemini]
model = "gemini-1.5-pro"
"#;
        let config: ConfigFile = toml::from_str(content).unwrap();
        let g = config.gemini.unwrap();
        assert_eq!(g.model.as_deref(), Some("gemini-1.5-pro"));
        assert!(g.api_key.is_none());
        assert!(config.extraction.is_none());
    }

    #[test]
    fn test_merge_overlay_wins() {
        let base: ConfigFile = toml::from_str(
            r#"
[gemini]
api_key = "base-key"
model = "base-model"
timeout_secs = 60

[extraction]
backend = "mupdf"
"#,
        )
        .unwrap();
        let overlay: ConfigFile = toml::from_str(
            r#"
[gemini]
model = "overlay-model"

[extraction]
backend = "ocr"
ocr_language = "eng"
footer_exclusion = 0.05
"#,
        )
        .unwrap();

        let merged = merge(base, overlay);
        let g = merged.gemini.unwrap();
        assert_eq!(g.api_key.as_deref(), Some("base-key"));
        assert_eq!(g.model.as_deref(), Some("overlay-model"));
        assert_eq!(g.timeout_secs, Some(60));
        let e = merged.extraction.unwrap();
        assert_eq!(e.backend.as_deref(), Some("ocr"));
        assert_eq!(e.ocr_language.as_deref(), Some("eng"));
        assert_eq!(e.footer_exclusion, Some(0.05));
        assert!(e.header_exclusion.is_none());
    }

    #[test]
    fn test_to_config_defaults() {
        let config = ConfigFile::default().to_config();
        assert_eq!(config.model, crate::llm::gemini::DEFAULT_MODEL);
        assert!(config.api_key.is_none());
        assert!(config.deadline_secs.is_none());
    }

    #[test]
    fn test_to_config_applies_values() {
        let file: ConfigFile = toml::from_str(
            r#"
[gemini]
api_key = "AIzaFromFile"
base_url = "http://localhost:1234"
temperature = 0.2

[extraction]
deadline_secs = 300
"#,
        )
        .unwrap();
        let config = file.to_config();
        assert_eq!(config.api_key.as_deref(), Some("AIzaFromFile"));
        assert_eq!(config.base_url, "http://localhost:1234");
        assert_eq!(config.temperature, Some(0.2));
        assert_eq!(config.deadline_secs, Some(300));
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = ConfigFile {
            gemini: Some(GeminiSection {
                model: Some("gemini-2.0-flash".into()),
                ..Default::default()
            }),
            extraction: None,
        };
        save_to_path(&config, &path).unwrap();
        let loaded = load_from_path(&path).unwrap();
        assert_eq!(
            loaded.gemini.unwrap().model.as_deref(),
            Some("gemini-2.0-flash")
        );
    }

    #[test]
    fn test_load_missing_or_invalid() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_from_path(&dir.path().join("absent.toml")).is_none());

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "[gemini\nmodel = ").unwrap();
        assert!(load_from_path(&bad).is_none());
    }
}
