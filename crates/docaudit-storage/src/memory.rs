use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use anyhow::anyhow;
use chrono::Utc;
use docaudit_core::{
    Case, CaseId, DebugPayload, Document, DocumentId, Finding, NewCase, NewDocument, Run, RunDebug,
    RunId, RunStatus,
};

use crate::traits::RunStore;

/// In-memory store for tests and throwaway sessions. Not durable.
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    next_id: i64,
    cases: Vec<Case>,
    documents: Vec<Document>,
    runs: HashMap<RunId, Run>,
    findings: HashMap<RunId, Vec<Finding>>,
    debug: HashMap<RunId, RunDebug>,
}

impl Inner {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> anyhow::Result<MutexGuard<'_, Inner>> {
        self.inner.lock().map_err(|_| anyhow!("in-memory store lock poisoned"))
    }
}

impl RunStore for InMemoryStore {
    fn create_case(&self, case: NewCase) -> anyhow::Result<Case> {
        let mut inner = self.lock()?;
        let case = Case {
            id: CaseId(inner.next_id()),
            owner: case.owner,
            title: case.title,
            framework_key: case.framework_key,
            created_at: Utc::now(),
        };
        inner.cases.push(case.clone());
        Ok(case)
    }

    fn get_case(&self, case_id: CaseId) -> anyhow::Result<Option<Case>> {
        let inner = self.lock()?;
        Ok(inner.cases.iter().find(|c| c.id == case_id).cloned())
    }

    fn list_cases(&self) -> anyhow::Result<Vec<Case>> {
        let inner = self.lock()?;
        let mut cases = inner.cases.clone();
        cases.reverse();
        Ok(cases)
    }

    fn add_document(&self, case_id: CaseId, doc: NewDocument) -> anyhow::Result<Document> {
        let mut inner = self.lock()?;
        if !inner.cases.iter().any(|c| c.id == case_id) {
            return Err(anyhow!("case {case_id} does not exist"));
        }
        let doc = Document {
            id: DocumentId(inner.next_id()),
            case_id,
            file_url: doc.file_url,
            file_name: doc.file_name,
            mime_type: doc.mime_type,
            created_at: Utc::now(),
        };
        inner.documents.push(doc.clone());
        Ok(doc)
    }

    fn get_case_document(&self, case_id: CaseId) -> anyhow::Result<Option<Document>> {
        let inner = self.lock()?;
        Ok(inner.documents.iter().rev().find(|d| d.case_id == case_id).cloned())
    }

    fn create_run(&self, case_id: CaseId, document_id: DocumentId) -> anyhow::Result<Run> {
        let mut inner = self.lock()?;
        let run = Run {
            id: RunId(inner.next_id()),
            case_id,
            document_id,
            status: RunStatus::Queued,
            started_at: None,
            finished_at: None,
            error_message: None,
            created_at: Utc::now(),
        };
        inner.runs.insert(run.id, run.clone());
        Ok(run)
    }

    fn get_run(&self, run_id: RunId) -> anyhow::Result<Option<Run>> {
        let inner = self.lock()?;
        Ok(inner.runs.get(&run_id).cloned())
    }

    fn get_latest_run(&self, case_id: CaseId) -> anyhow::Result<Option<Run>> {
        let inner = self.lock()?;
        Ok(inner
            .runs
            .values()
            .filter(|r| r.case_id == case_id)
            .max_by_key(|r| r.id)
            .cloned())
    }

    fn set_run_status(&self, run_id: RunId, status: RunStatus, error_message: Option<&str>) -> anyhow::Result<bool> {
        let mut inner = self.lock()?;
        match inner.runs.get_mut(&run_id) {
            Some(run) => {
                run.apply_status(status, error_message, Utc::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn claim_run(&self, run_id: RunId, from: &[RunStatus]) -> anyhow::Result<bool> {
        let mut inner = self.lock()?;
        match inner.runs.get_mut(&run_id) {
            Some(run) if from.contains(&run.status) => {
                run.apply_status(RunStatus::Running, None, Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn clear_run_findings(&self, run_id: RunId) -> anyhow::Result<()> {
        let mut inner = self.lock()?;
        inner.findings.remove(&run_id);
        Ok(())
    }

    fn insert_findings(&self, run_id: RunId, findings: &[Finding]) -> anyhow::Result<usize> {
        let mut inner = self.lock()?;
        let stored = inner.findings.entry(run_id).or_default();
        let mut inserted = 0;
        for f in findings {
            if f.rule_code.is_empty() || stored.iter().any(|s| s.rule_code == f.rule_code) {
                continue;
            }
            stored.push(f.clone());
            inserted += 1;
        }
        Ok(inserted)
    }

    fn get_run_findings(&self, run_id: RunId) -> anyhow::Result<Vec<Finding>> {
        let inner = self.lock()?;
        Ok(inner.findings.get(&run_id).cloned().unwrap_or_default())
    }

    fn set_run_debug(&self, run_id: RunId, payload: &DebugPayload) -> anyhow::Result<()> {
        let mut inner = self.lock()?;
        inner.debug.insert(
            run_id,
            RunDebug {
                run_id,
                updated_at: Utc::now(),
                payload: payload.clone(),
            },
        );
        Ok(())
    }

    fn get_run_debug(&self, run_id: RunId) -> anyhow::Result<Option<RunDebug>> {
        let inner = self.lock()?;
        Ok(inner.debug.get(&run_id).cloned())
    }

    fn clear_run_debug(&self, run_id: RunId) -> anyhow::Result<()> {
        let mut inner = self.lock()?;
        inner.debug.remove(&run_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docaudit_core::{FindingStatus, ProgressTracker};

    fn seeded() -> (InMemoryStore, Run) {
        let store = InMemoryStore::new();
        let case = store
            .create_case(NewCase {
                owner: None,
                title: "FY24 annual report".into(),
                framework_key: "indas".into(),
            })
            .unwrap();
        let doc = store
            .add_document(
                case.id,
                NewDocument {
                    file_url: "https://files.example/report.pdf".into(),
                    file_name: Some("report.pdf".into()),
                    mime_type: Some("application/pdf".into()),
                },
            )
            .unwrap();
        let run = store.create_run(case.id, doc.id).unwrap();
        (store, run)
    }

    fn finding(code: &str, status: FindingStatus) -> Finding {
        Finding {
            rule_code: code.into(),
            status,
            reason: "r".into(),
            evidence: vec![],
        }
    }

    #[test]
    fn new_runs_are_queued_and_latest() {
        let (store, run) = seeded();
        assert_eq!(run.status, RunStatus::Queued);
        let second = store.create_run(run.case_id, run.document_id).unwrap();
        assert_eq!(store.get_latest_run(run.case_id).unwrap().unwrap().id, second.id);
    }

    #[test]
    fn documents_require_an_existing_case() {
        let store = InMemoryStore::new();
        let err = store.add_document(
            CaseId(99),
            NewDocument {
                file_url: "x".into(),
                file_name: None,
                mime_type: None,
            },
        );
        assert!(err.is_err());
    }

    #[test]
    fn claim_is_a_compare_and_swap() {
        let (store, run) = seeded();
        assert!(store.claim_run(run.id, &RunStatus::STARTABLE).unwrap());
        assert!(!store.claim_run(run.id, &RunStatus::STARTABLE).unwrap());
        assert_eq!(store.get_run(run.id).unwrap().unwrap().status, RunStatus::Running);
        assert!(!store.claim_run(RunId(404), &RunStatus::STARTABLE).unwrap());
    }

    #[test]
    fn set_status_on_missing_run_reports_false() {
        let store = InMemoryStore::new();
        assert!(!store.set_run_status(RunId(1), RunStatus::Done, None).unwrap());
    }

    #[test]
    fn duplicate_rule_codes_are_ignored() {
        let (store, run) = seeded();
        let n = store
            .insert_findings(
                run.id,
                &[finding("A", FindingStatus::Pass), finding("B", FindingStatus::Fail)],
            )
            .unwrap();
        assert_eq!(n, 2);
        let n = store
            .insert_findings(run.id, &[finding("A", FindingStatus::Fail)])
            .unwrap();
        assert_eq!(n, 0);
        let stored = store.get_run_findings(run.id).unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].status, FindingStatus::Pass);

        store.clear_run_findings(run.id).unwrap();
        assert!(store.get_run_findings(run.id).unwrap().is_empty());
    }

    #[test]
    fn debug_payload_is_replaced_wholesale() {
        let (store, run) = seeded();
        let tracker = ProgressTracker::new("indas", 15, 3);
        store
            .set_run_debug(run.id, &DebugPayload::Progress(tracker.initial("first")))
            .unwrap();
        store
            .set_run_debug(run.id, &DebugPayload::Progress(tracker.finished()))
            .unwrap();
        let debug = store.get_run_debug(run.id).unwrap().unwrap();
        assert_eq!(debug.payload.progress().unwrap().status_text, "Completed");

        store.clear_run_debug(run.id).unwrap();
        assert!(store.get_run_debug(run.id).unwrap().is_none());
    }
}
