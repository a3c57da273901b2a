use thiserror::Error;

/// Failure taxonomy of a model call.
///
/// Display strings are what gets logged and persisted in attempt traces; the
/// run-level redaction keys off the variant, not the text.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("model API key missing; set DOCAUDIT_GEMINI_API_KEY or [model] api_key")]
    Config,
    #[error("rule set missing for selected framework")]
    Input,
    #[error("failed to download document: {0}")]
    Fetch(String),
    #[error("document too large for inline processing ({:.2}MB)", *bytes as f64 / (1024.0 * 1024.0))]
    Size { bytes: usize },
    #[error("model quota/ratelimit (429)")]
    RateLimit,
    #[error("model server error ({0})")]
    Server(u16),
    #[error("{}", http_message(*status, snippet))]
    Http { status: u16, snippet: String },
    #[error("HTTP request failed: {0}")]
    Transport(String),
    #[error("model response was not valid JSON")]
    InvalidEnvelope,
    #[error("model did not return valid JSON")]
    Parse,
}

fn http_message(status: u16, snippet: &str) -> String {
    if snippet.is_empty() {
        format!("model HTTP error {status}.")
    } else {
        format!("model HTTP error {status}: {snippet}")
    }
}

impl ModelError {
    /// Whether the same call could succeed later without changing inputs or
    /// configuration.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ModelError::Fetch(_)
                | ModelError::RateLimit
                | ModelError::Server(_)
                | ModelError::Transport(_)
                | ModelError::InvalidEnvelope
                | ModelError::Parse
        )
    }
}
