use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// One letter of the answer alphabet. Always stored upper-case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Symbol(char);

impl Symbol {
    /// Accepts any ASCII letter and normalizes it to upper case.
    pub fn new(c: char) -> Option<Self> {
        if c.is_ascii_alphabetic() {
            Some(Self(c.to_ascii_uppercase()))
        } else {
            None
        }
    }

    pub fn as_char(self) -> char {
        self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Normalized result of one classification call.
#[derive(Debug)]
pub enum InferenceOutcome {
    Answer(Symbol),
    NoAnswer(NoAnswerReason),
    Error(InferenceError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoAnswerReason {
    /// The model replied with the decline sentinel.
    Declined,
    /// The reply could not be read as a single valid letter.
    Ambiguous { raw: String },
}

/// Error type for inference calls.
///
/// Closed set: callers match on it exhaustively instead of inspecting HTTP
/// bodies or library errors.
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("Response blocked or empty (reason: {})", .reason.as_deref().unwrap_or("unknown"))]
    Blocked { reason: Option<String> },
    #[error("Could not extract text from response: {0}")]
    ExtractionFailed(String),
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("Request timed out after {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Provider internal error: {0}")]
    Internal(String),
    #[error("Service unavailable: {0}")]
    Unavailable(String),
    #[error("Transport failure: {0}")]
    Transport(String),
    #[error("Image encoding failed: {0}")]
    ImageEncoding(String),
}

impl InferenceError {
    /// One line telling the user what to do about it.
    pub fn hint(&self) -> &'static str {
        match self {
            Self::Blocked { .. } => "The provider refused to answer; try a clearer capture.",
            Self::ExtractionFailed(_) => "The provider answered without text; trigger again.",
            Self::QuotaExceeded(_) => "API quota exhausted; wait or check billing for the key.",
            Self::PermissionDenied(_) => {
                "Check GEMINI_API_KEY and that the Generative Language API is enabled."
            }
            Self::Timeout(_) => "The provider was too slow; check the network and trigger again.",
            Self::InvalidArgument(_) => "The request was rejected; check the model name in settings.",
            Self::Internal(_) => "The provider failed internally; trigger again later.",
            Self::Unavailable(_) => "The provider is overloaded or down; trigger again later.",
            Self::Transport(_) => "Network failure; check connectivity and the endpoint setting.",
            Self::ImageEncoding(_) => "The screenshot could not be encoded; check max_image_width.",
        }
    }
}

/// Everything a provider needs for one call.
#[derive(Debug, Clone)]
pub struct InferenceRequest {
    pub instruction: String,
    /// Base64-encoded image bytes.
    pub image_base64: String,
    pub mime_type: &'static str,
    pub temperature: f32,
    pub timeout: Duration,
}

/// Provider reply, reduced to what normalization looks at.
#[derive(Debug, Clone, Default)]
pub struct ProviderResponse {
    pub candidates: Vec<Candidate>,
    pub block_reason: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Candidate {
    pub text_parts: Vec<String>,
    pub finish_reason: Option<String>,
}

impl ProviderResponse {
    /// Convenience for a reply holding a single text candidate.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            candidates: vec![Candidate {
                text_parts: vec![text.into()],
                finish_reason: Some("STOP".into()),
            }],
            block_reason: None,
        }
    }
}

impl Candidate {
    /// Concatenated text of all parts, or `None` when the candidate has none.
    pub fn text(&self) -> Option<String> {
        if self.text_parts.is_empty() {
            None
        } else {
            Some(self.text_parts.concat())
        }
    }
}
