use chrono::{DateTime, Utc};
use docaudit_core::RunId;
use docaudit_model::ModelError;

/// User-facing category of a run failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    Oversize,
    Busy,
    Generic,
}

impl FailureKind {
    pub fn user_message(self) -> &'static str {
        match self {
            FailureKind::Oversize => {
                "This PDF is too large for the current processing mode. Please upload a smaller PDF (under 5MB)."
            }
            FailureKind::Busy => "The AI service is temporarily busy. Please try again in a moment.",
            FailureKind::Generic => "Could not generate findings for this document. Please try again.",
        }
    }
}

/// Typed model errors anywhere in the chain decide first; otherwise the
/// rendered message is inspected.
pub fn classify(err: &anyhow::Error) -> FailureKind {
    if let Some(model_err) = err.chain().find_map(|e| e.downcast_ref::<ModelError>()) {
        return match model_err {
            ModelError::Size { .. } => FailureKind::Oversize,
            ModelError::RateLimit | ModelError::Server(_) => FailureKind::Busy,
            _ => FailureKind::Generic,
        };
    }
    classify_message(&format!("{err:#}"))
}

pub fn classify_message(message: &str) -> FailureKind {
    let lower = message.to_ascii_lowercase();
    if lower.contains("too large") {
        FailureKind::Oversize
    } else if lower.contains("quota/ratelimit") || lower.contains("server error") {
        FailureKind::Busy
    } else {
        FailureKind::Generic
    }
}

/// Correlation id shared by the server log and the user-facing message.
pub fn failure_reference(run_id: RunId, at: DateTime<Utc>) -> String {
    format!("RUN-{}-{}", run_id, at.format("%Y%m%d%H%M%S"))
}

pub fn redacted_message(kind: FailureKind, reference: &str) -> String {
    format!("{} Reference: {}", kind.user_message(), reference)
}
