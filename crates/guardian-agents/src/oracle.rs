//! AI oracle client
//!
//! One textual prompt in, free text (or no answer) out. The transport does not
//! enforce any schema on the reply; callers run it through
//! [`crate::extraction`].
//!
//! Availability is decided once, when the client is built. A unit whose client
//! could not be initialised gets a [`DisabledOracle`], which behaves exactly
//! like a reachable oracle that declines every request.

use async_trait::async_trait;
use guardian_core::config::OracleConfig;
use guardian_core::ports::SecretStore;
use guardian_core::OracleError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// External generative-AI analysis service
#[async_trait]
pub trait OracleClient: Send + Sync + fmt::Debug {
    /// Human-readable provider name
    fn name(&self) -> &str;

    /// Fixed at construction time
    fn is_available(&self) -> bool;

    /// Ask the oracle. `Ok(None)` means no answer (unavailable or declined);
    /// `Err` describes a failed call.
    async fn analyze(&self, prompt: &str, context: &Value) -> Result<Option<String>, OracleError>;
}

/// Append the context mapping to the prompt as pretty-printed JSON
pub fn compose_prompt(prompt: &str, context: &Value) -> String {
    let has_context = match context {
        Value::Null => false,
        Value::Object(map) => !map.is_empty(),
        _ => true,
    };

    if !has_context {
        return prompt.to_string();
    }

    let context_str =
        serde_json::to_string_pretty(context).unwrap_or_else(|_| context.to_string());
    format!("{}\n\nContext:\n{}", prompt, context_str)
}

/// Oracle that never answers
#[derive(Debug, Clone)]
pub struct DisabledOracle {
    reason: String,
}

impl DisabledOracle {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

#[async_trait]
impl OracleClient for DisabledOracle {
    fn name(&self) -> &str {
        "disabled"
    }

    fn is_available(&self) -> bool {
        false
    }

    async fn analyze(&self, _prompt: &str, _context: &Value) -> Result<Option<String>, OracleError> {
        tracing::debug!("Oracle not available ({}) - skipping request", self.reason);
        Ok(None)
    }
}

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Gemini `generateContent` REST client. The key travels in the
/// `x-goog-api-key` header, never in the URL.
#[derive(Clone)]
pub struct GeminiOracle {
    name: String,
    api_key: String,
    model: String,
    base_url: String,
    temperature: f64,
    max_tokens: u32,
    timeout_secs: u64,
    http_client: reqwest::Client,
}

impl fmt::Debug for GeminiOracle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiOracle")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl GeminiOracle {
    pub fn new(
        api_key: String,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, OracleError> {
        let model = model.into();
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OracleError::Transport(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            name: format!("Gemini {}", model),
            api_key,
            model,
            base_url: GEMINI_BASE_URL.to_string(),
            temperature: 0.1,
            max_tokens: 2000,
            timeout_secs: timeout.as_secs(),
            http_client,
        })
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Point the client at another Gemini-compatible host
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model)
    }

    async fn request_completion(&self, prompt: &str) -> Result<String, OracleError> {
        let request = GeminiRequest {
            contents: vec![GeminiContent {
                role: "user".to_string(),
                parts: vec![GeminiPart {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GeminiGenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_tokens,
            },
        };

        let response = self
            .http_client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    OracleError::Timeout(self.timeout_secs)
                } else {
                    OracleError::Transport(e.without_url().to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), &error_text));
        }

        let completion: GeminiResponse = response
            .json()
            .await
            .map_err(|e| {
                OracleError::Protocol(format!("failed to parse Gemini response: {}", e.without_url()))
            })?;

        Ok(completion
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.clone())
            .unwrap_or_default())
    }
}

/// Credential and quota failures repeat on every call; everything else is
/// local to the request.
fn classify_status(status: u16, body: &str) -> OracleError {
    let message = format!("Gemini API error ({}): {}", status, body.trim());
    match status {
        401 | 403 | 429 => OracleError::Rejected(message),
        _ => OracleError::Transport(message),
    }
}

#[async_trait]
impl OracleClient for GeminiOracle {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn analyze(&self, prompt: &str, context: &Value) -> Result<Option<String>, OracleError> {
        let full_prompt = compose_prompt(prompt, context);
        let text = self.request_completion(&full_prompt).await?;

        if text.trim().is_empty() {
            tracing::warn!("{} returned an empty answer", self.name);
            return Ok(None);
        }

        tracing::info!("Gemini analysis completed ({} chars)", text.len());
        Ok(Some(text))
    }
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    role: String,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
struct GeminiGenerationConfig {
    temperature: f64,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
}

/// Build the oracle for a unit. The API key comes from the secret store when
/// `api_key_secret` is set, otherwise from the `api_key_env` variable. Any
/// failure yields a [`DisabledOracle`].
pub async fn build_oracle(config: &OracleConfig, secrets: &dyn SecretStore) -> Arc<dyn OracleClient> {
    let mut api_key = match &config.api_key_secret {
        Some(secret_id) => secrets.fetch(secret_id).await,
        None => String::new(),
    };
    if api_key.trim().is_empty() {
        api_key = std::env::var(&config.api_key_env).unwrap_or_default();
    }

    if api_key.trim().is_empty() {
        tracing::warn!("{} not set - Gemini AI disabled", config.api_key_env);
        return Arc::new(DisabledOracle::new(format!("{} not set", config.api_key_env)));
    }

    match GeminiOracle::new(
        api_key.trim().to_string(),
        config.model.clone(),
        Duration::from_secs(config.request_timeout_secs),
    ) {
        Ok(client) => {
            tracing::info!("Gemini AI initialized with model {}", config.model);
            Arc::new(
                client
                    .with_temperature(config.temperature)
                    .with_max_tokens(config.max_output_tokens),
            )
        }
        Err(e) => {
            tracing::warn!("Failed to initialize Gemini AI: {} - using fallback", e);
            Arc::new(DisabledOracle::new(e.to_string()))
        }
    }
}
