use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde_json::{Value, json};

use super::{LanguageModel, ModelError};

pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Settings for [`GeminiClient`].
#[derive(Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    /// Scheme and host of the Generative Language API, without a trailing path.
    pub base_url: String,
    pub timeout: Duration,
    pub temperature: Option<f32>,
}

impl fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_key", &"***")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(120),
            temperature: None,
        }
    }
}

/// Google Gemini `generateContent` client.
pub struct GeminiClient {
    config: GeminiConfig,
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("camara-aberta/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_client(config, client))
    }

    /// Reuse an existing connection pool.
    pub fn with_client(config: GeminiConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }

    fn request_body(&self, instruction: &str, document: &str) -> Value {
        let mut body = json!({
            "contents": [{
                "role": "user",
                "parts": [
                    { "text": instruction },
                    { "text": document }
                ]
            }]
        });
        if let Some(temperature) = self.config.temperature {
            body["generationConfig"] = json!({ "temperature": temperature });
        }
        body
    }

    fn map_send_error(&self, err: reqwest::Error) -> ModelError {
        if err.is_timeout() {
            ModelError::Timeout(self.config.timeout)
        } else {
            ModelError::Http(err)
        }
    }
}

impl LanguageModel for GeminiClient {
    fn name(&self) -> &str {
        "Gemini"
    }

    fn generate<'a>(
        &'a self,
        instruction: &'a str,
        document: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, ModelError>> + Send + 'a>> {
        Box::pin(async move {
            let body = self.request_body(instruction, document);
            tracing::debug!(
                model = %self.config.model,
                document_chars = document.chars().count(),
                "sending generateContent request"
            );

            let resp = self
                .client
                .post(self.endpoint())
                .header("x-goog-api-key", &self.config.api_key)
                .timeout(self.config.timeout)
                .json(&body)
                .send()
                .await
                .map_err(|e| self.map_send_error(e))?;

            let status = resp.status();
            if status.as_u16() == 429 {
                let retry_after = resp
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.trim().parse::<u64>().ok())
                    .map(Duration::from_secs);
                return Err(ModelError::RateLimited { retry_after });
            }
            if !status.is_success() {
                let body = error_body(status.as_u16(), resp.text().await);
                return Err(ModelError::Status {
                    status: status.as_u16(),
                    body,
                });
            }

            let data: Value = resp.json().await.map_err(|e| self.map_send_error(e))?;
            completion_text(&data)
        })
    }
}

/// Body of a non-2xx response, for the error message. A body that cannot be
/// read is logged and left empty; the status alone still classifies the error.
fn error_body<E: fmt::Display>(status: u16, body: Result<String, E>) -> String {
    body.unwrap_or_else(|e| {
        tracing::debug!(status, error = %e, "failed to read error response body");
        String::new()
    })
}

/// Pull the completion out of a `generateContent` response body.
///
/// Concatenates the text of every part of the first candidate.
fn completion_text(data: &Value) -> Result<String, ModelError> {
    if let Some(reason) = data["promptFeedback"]["blockReason"].as_str() {
        return Err(ModelError::Blocked(reason.to_string()));
    }

    let text: String = data["candidates"]
        .as_array()
        .and_then(|c| c.first())
        .and_then(|c| c["content"]["parts"].as_array())
        .map(|parts| parts.iter().filter_map(|p| p["text"].as_str()).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        if let Some(reason) = data["candidates"][0]["finishReason"].as_str() {
            if reason != "STOP" {
                return Err(ModelError::Blocked(format!("finish reason {reason}")));
            }
        }
        return Err(ModelError::EmptyCompletion);
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> GeminiClient {
        GeminiClient::with_client(GeminiConfig::new("AIzaTestKey"), reqwest::Client::new())
    }

    #[test]
    fn test_endpoint() {
        let mut config = GeminiConfig::new("k");
        config.base_url = "http://localhost:9999/".into();
        config.model = "gemini-test".into();
        let c = GeminiClient::with_client(config, reqwest::Client::new());
        assert_eq!(
            c.endpoint(),
            "http://localhost:9999/v1beta/models/gemini-test:generateContent"
        );
    }

    #[test]
    fn test_request_body_keeps_inputs_separate() {
        let body = client().request_body("INSTRUCTION", "DOCUMENT");
        let parts = body["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0]["text"], "INSTRUCTION");
        assert_eq!(parts[1]["text"], "DOCUMENT");
        assert!(body.get("generationConfig").is_none());
    }

    #[test]
    fn test_request_body_temperature() {
        let mut config = GeminiConfig::new("k");
        config.temperature = Some(0.0);
        let c = GeminiClient::with_client(config, reqwest::Client::new());
        let body = c.request_body("i", "d");
        assert_eq!(body["generationConfig"]["temperature"], 0.0);
    }

    #[test]
    fn test_completion_text_joins_parts() {
        let data = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "[{\"id" }, { "text": "_projeto\": 1}]" }] },
                "finishReason": "STOP"
            }]
        });
        assert_eq!(completion_text(&data).unwrap(), "[{\"id_projeto\": 1}]");
    }

    #[test]
    fn test_completion_text_blocked() {
        let data = json!({ "promptFeedback": { "blockReason": "SAFETY" } });
        assert!(matches!(
            completion_text(&data),
            Err(ModelError::Blocked(r)) if r == "SAFETY"
        ));
    }

    #[test]
    fn test_completion_text_empty() {
        let data = json!({ "candidates": [] });
        assert!(matches!(
            completion_text(&data),
            Err(ModelError::EmptyCompletion)
        ));
    }

    #[test]
    fn test_completion_text_max_tokens_without_text() {
        let data = json!({ "candidates": [{ "finishReason": "MAX_TOKENS" }] });
        assert!(matches!(completion_text(&data), Err(ModelError::Blocked(_))));
    }

    #[test]
    fn test_error_body_unreadable_is_empty() {
        assert_eq!(error_body(502, Ok::<_, String>("Bad Gateway".into())), "Bad Gateway");
        assert_eq!(error_body(502, Err("connection reset by peer")), "");
    }

    #[test]
    fn test_config_debug_redacts_key() {
        let dbg = format!("{:?}", GeminiConfig::new("AIzaSecret"));
        assert!(!dbg.contains("AIzaSecret"));
    }
}
