// gemini.rs — Google Gemini `generateContent` client (non-streaming).
//
// One request per classification: instruction text + inline JPEG, temperature
// pinned by the caller. HTTP and Google RPC failures are folded into
// `InferenceError` here.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::{Candidate, InferenceError, InferenceProvider, InferenceRequest, ProviderResponse};

pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

pub struct GeminiVisionClient {
    endpoint: String,
    api_key: String,
    model: String,
    client: Client,
}

impl GeminiVisionClient {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.into(),
            client: Client::new(),
        }
    }

    fn url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.endpoint.trim_end_matches('/'),
            self.model
        )
    }

    fn build_request_body(&self, request: &InferenceRequest) -> Value {
        json!({
            "contents": [
                {
                    "role": "user",
                    "parts": [
                        { "text": request.instruction },
                        {
                            "inline_data": {
                                "mime_type": request.mime_type,
                                "data": request.image_base64
                            }
                        }
                    ]
                }
            ],
            "generationConfig": {
                "temperature": request.temperature,
                "candidateCount": 1
            }
        })
    }
}

#[async_trait]
impl InferenceProvider for GeminiVisionClient {
    async fn generate(&self, request: &InferenceRequest) -> Result<ProviderResponse, InferenceError> {
        let body = self.build_request_body(request);

        let response = self
            .client
            .post(self.url())
            .header("Content-Type", "application/json")
            .header("x-goog-api-key", &self.api_key)
            .timeout(request.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    InferenceError::Timeout(request.timeout)
                } else {
                    InferenceError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            if e.is_timeout() {
                InferenceError::Timeout(request.timeout)
            } else {
                InferenceError::Transport(format!("reading body: {}", e))
            }
        })?;

        if !status.is_success() {
            return Err(classify_http_error(status.as_u16(), &text, request));
        }

        let parsed: Value = serde_json::from_str(&text)
            .map_err(|e| InferenceError::ExtractionFailed(format!("invalid JSON: {}", e)))?;
        Ok(parse_generate_response(&parsed))
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

/// Reduce a `generateContent` JSON body to candidates + block reason.
fn parse_generate_response(body: &Value) -> ProviderResponse {
    let candidates = body
        .get("candidates")
        .and_then(|c| c.as_array())
        .map(|items| {
            items
                .iter()
                .map(|item| Candidate {
                    text_parts: item
                        .pointer("/content/parts")
                        .and_then(|p| p.as_array())
                        .map(|parts| {
                            parts
                                .iter()
                                .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
                                .map(str::to_string)
                                .collect()
                        })
                        .unwrap_or_default(),
                    finish_reason: item
                        .get("finishReason")
                        .and_then(|f| f.as_str())
                        .map(str::to_string),
                })
                .collect()
        })
        .unwrap_or_default();

    let block_reason = body
        .pointer("/promptFeedback/blockReason")
        .and_then(|r| r.as_str())
        .map(str::to_string);

    ProviderResponse {
        candidates,
        block_reason,
    }
}

/// Map a non-2xx reply onto the error taxonomy.
///
/// Google puts the canonical RPC code in `error.status`; that wins over the
/// HTTP status, which is only a fallback. A rejected API key is reported as
/// a permission problem whatever the status says.
fn classify_http_error(status: u16, body: &str, request: &InferenceRequest) -> InferenceError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let rpc_status = parsed
        .as_ref()
        .and_then(|v| v.pointer("/error/status"))
        .and_then(|s| s.as_str())
        .unwrap_or("");
    let message = parsed
        .as_ref()
        .and_then(|v| v.pointer("/error/message"))
        .and_then(|m| m.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP {}: {}", status, body.trim()));

    // A bad key comes back as 400 INVALID_ARGUMENT.
    let key_rejected = parsed
        .as_ref()
        .and_then(|v| v.pointer("/error/details"))
        .and_then(|d| d.as_array())
        .is_some_and(|details| {
            details
                .iter()
                .any(|d| d.get("reason").and_then(|r| r.as_str()) == Some("API_KEY_INVALID"))
        })
        || message.contains("API key not valid");
    if key_rejected {
        return InferenceError::PermissionDenied(message);
    }

    match rpc_status {
        "RESOURCE_EXHAUSTED" => InferenceError::QuotaExceeded(message),
        "PERMISSION_DENIED" | "UNAUTHENTICATED" => InferenceError::PermissionDenied(message),
        "DEADLINE_EXCEEDED" => InferenceError::Timeout(request.timeout),
        "INVALID_ARGUMENT" | "FAILED_PRECONDITION" | "NOT_FOUND" => {
            InferenceError::InvalidArgument(message)
        }
        "INTERNAL" => InferenceError::Internal(message),
        "UNAVAILABLE" => InferenceError::Unavailable(message),
        _ => match status {
            429 => InferenceError::QuotaExceeded(message),
            401 | 403 => InferenceError::PermissionDenied(message),
            408 | 504 => InferenceError::Timeout(request.timeout),
            400 | 404 => InferenceError::InvalidArgument(message),
            500 => InferenceError::Internal(message),
            502 | 503 => InferenceError::Unavailable(message),
            _ => InferenceError::Transport(message),
        },
    }
}
