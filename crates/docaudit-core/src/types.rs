use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ids::*, model::*};

/// One checklist item of a framework.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub rule_code: String,
    pub title: String,
    pub requirement: String,
}

impl Rule {
    pub fn new(rule_code: &str, title: &str, requirement: &str) -> Self {
        Self {
            rule_code: rule_code.to_string(),
            title: title.to_string(),
            requirement: requirement.to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Case {
    pub id: CaseId,
    pub owner: Option<String>,
    pub title: String,
    pub framework_key: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewCase {
    pub owner: Option<String>,
    pub title: String,
    pub framework_key: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub case_id: CaseId,
    pub file_url: String,
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewDocument {
    pub file_url: String,
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub case_id: CaseId,
    pub document_id: DocumentId,
    pub status: RunStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Run {
    /// Move to `status`, applying the field rules each status carries.
    pub fn apply_status(&mut self, status: RunStatus, error_message: Option<&str>, now: DateTime<Utc>) {
        self.status = status;
        match status {
            RunStatus::Running => {
                self.started_at = Some(now);
                self.finished_at = None;
                self.error_message = None;
            }
            RunStatus::Queued => {
                self.started_at = None;
                self.finished_at = None;
                self.error_message = None;
            }
            RunStatus::Done | RunStatus::Failed => {
                self.finished_at = Some(now);
                if let Some(msg) = error_message.filter(|m| !m.is_empty()) {
                    self.error_message = Some(msg.to_string());
                }
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<i64>,
    pub snippet: String,
}

/// A normalized verdict for one rule in one run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub rule_code: String,
    pub status: FindingStatus,
    pub reason: String,
    #[serde(default)]
    pub evidence: Vec<Evidence>,
}

/// One entry of the per-call attempt log kept by the model client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttemptTrace {
    pub attempt: String,
    pub status: AttemptStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_code: Option<u16>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub output_excerpt: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub raw_excerpt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub at: DateTime<Utc>,
}

impl AttemptTrace {
    pub fn failed(attempt: &str, error: impl Into<String>) -> Self {
        Self {
            attempt: attempt.to_string(),
            status: AttemptStatus::Error,
            response_code: None,
            output_excerpt: String::new(),
            raw_excerpt: String::new(),
            error: Some(error.into()),
            at: Utc::now(),
        }
    }
}

/// Snapshot a polling client observes while a run is in flight.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunProgress {
    pub status: RunStatus,
    #[serde(default)]
    pub framework: String,
    pub total_rules: usize,
    pub evaluated_rules: usize,
    pub assessed_rules: usize,
    pub pass_count: usize,
    pub fail_count: usize,
    pub unknown_count: usize,
    pub score_current: u32,
    pub coverage_percent: u32,
    pub progress_percent: u32,
    pub eta_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_batch: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_batches: Option<usize>,
    pub status_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_batch_error: Option<String>,
    #[serde(default)]
    pub last_batch_trace: Vec<AttemptTrace>,
}

/// Diagnostic payload written when a run fails as a whole.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FailureReport {
    pub status: RunStatus,
    pub reference: String,
    pub error: String,
    #[serde(default)]
    pub attempts: Vec<AttemptTrace>,
}

/// Whole-value payload of the per-run debug channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DebugPayload {
    Progress(RunProgress),
    Failure(FailureReport),
}

impl DebugPayload {
    pub fn progress(&self) -> Option<&RunProgress> {
        match self {
            DebugPayload::Progress(p) => Some(p),
            DebugPayload::Failure(_) => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunDebug {
    pub run_id: RunId,
    pub updated_at: DateTime<Utc>,
    pub payload: DebugPayload,
}
