use docaudit_core::{
    Case, CaseId, DebugPayload, Document, DocumentId, Finding, NewCase, NewDocument, Run, RunDebug,
    RunId, RunStatus,
};

/// Durable state for cases, documents, runs, findings and the per-run debug
/// payload.
pub trait RunStore: Send + Sync {
    fn create_case(&self, case: NewCase) -> anyhow::Result<Case>;
    fn get_case(&self, case_id: CaseId) -> anyhow::Result<Option<Case>>;
    fn list_cases(&self) -> anyhow::Result<Vec<Case>>;

    fn add_document(&self, case_id: CaseId, doc: NewDocument) -> anyhow::Result<Document>;
    /// Latest document uploaded for a case.
    fn get_case_document(&self, case_id: CaseId) -> anyhow::Result<Option<Document>>;

    /// Create a `queued` run.
    fn create_run(&self, case_id: CaseId, document_id: DocumentId) -> anyhow::Result<Run>;
    fn get_run(&self, run_id: RunId) -> anyhow::Result<Option<Run>>;
    fn get_latest_run(&self, case_id: CaseId) -> anyhow::Result<Option<Run>>;

    /// Set the status and apply the per-status field rules:
    /// `running` stamps `started_at` and clears `finished_at`/`error_message`,
    /// `queued` clears all three, `done`/`failed` stamp `finished_at` and keep
    /// `error_message` only when one is given.
    ///
    /// Returns false when the run does not exist.
    fn set_run_status(&self, run_id: RunId, status: RunStatus, error_message: Option<&str>) -> anyhow::Result<bool>;

    /// Compare-and-swap transition to `running`. Succeeds only when the
    /// current status is one of `from`.
    fn claim_run(&self, run_id: RunId, from: &[RunStatus]) -> anyhow::Result<bool>;

    fn clear_run_findings(&self, run_id: RunId) -> anyhow::Result<()>;
    /// Insert findings in order. A second finding for a `(run, rule_code)`
    /// pair is ignored; returns the number actually stored.
    fn insert_findings(&self, run_id: RunId, findings: &[Finding]) -> anyhow::Result<usize>;
    /// Findings in insertion order.
    fn get_run_findings(&self, run_id: RunId) -> anyhow::Result<Vec<Finding>>;

    /// Replace the whole debug payload of a run.
    fn set_run_debug(&self, run_id: RunId, payload: &DebugPayload) -> anyhow::Result<()>;
    fn get_run_debug(&self, run_id: RunId) -> anyhow::Result<Option<RunDebug>>;
    fn clear_run_debug(&self, run_id: RunId) -> anyhow::Result<()>;
}
