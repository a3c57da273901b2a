use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use docaudit_core::{
    Case, CaseId, DebugPayload, Document, DocumentId, Evidence, Finding, FindingStatus, NewCase, NewDocument, Run,
    RunDebug, RunId, RunStatus,
};
use docaudit_storage::RunStore;
use rusqlite::{params, types::Type, Connection, OptionalExtension, Row};

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

const RUN_COLUMNS: &str = "id, case_id, document_id, status, started_at, finished_at, error_message, created_at";

impl SqliteStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(db_path).with_context(|| format!("open sqlite db {}", db_path.display()))?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(include_str!("../migrations/0001_init.sql"))?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| anyhow!("sqlite connection lock poisoned"))
    }

    fn millis(at: DateTime<Utc>) -> i64 {
        at.timestamp_millis()
    }

    fn from_millis(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(ms).unwrap_or_default()
    }

    fn row_to_case(r: &Row<'_>) -> rusqlite::Result<Case> {
        Ok(Case {
            id: CaseId(r.get(0)?),
            owner: r.get(1)?,
            title: r.get(2)?,
            framework_key: r.get(3)?,
            created_at: Self::from_millis(r.get(4)?),
        })
    }

    fn row_to_document(r: &Row<'_>) -> rusqlite::Result<Document> {
        Ok(Document {
            id: DocumentId(r.get(0)?),
            case_id: CaseId(r.get(1)?),
            file_url: r.get(2)?,
            file_name: r.get(3)?,
            mime_type: r.get(4)?,
            created_at: Self::from_millis(r.get(5)?),
        })
    }

    fn row_to_run(r: &Row<'_>) -> rusqlite::Result<Run> {
        let status: String = r.get(3)?;
        let status = status
            .parse::<RunStatus>()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;
        Ok(Run {
            id: RunId(r.get(0)?),
            case_id: CaseId(r.get(1)?),
            document_id: DocumentId(r.get(2)?),
            status,
            started_at: r.get::<_, Option<i64>>(4)?.map(Self::from_millis),
            finished_at: r.get::<_, Option<i64>>(5)?.map(Self::from_millis),
            error_message: r.get(6)?,
            created_at: Self::from_millis(r.get(7)?),
        })
    }

    fn load_run(conn: &Connection, run_id: RunId) -> Result<Option<Run>> {
        let run = conn
            .query_row(
                &format!("SELECT {RUN_COLUMNS} FROM runs WHERE id = ?1"),
                [run_id.get()],
                Self::row_to_run,
            )
            .optional()?;
        Ok(run)
    }

    fn write_run(conn: &Connection, run: &Run) -> Result<()> {
        conn.execute(
            "UPDATE runs SET status = ?2, started_at = ?3, finished_at = ?4, error_message = ?5 WHERE id = ?1",
            params![
                run.id.get(),
                run.status.as_str(),
                run.started_at.map(Self::millis),
                run.finished_at.map(Self::millis),
                run.error_message,
            ],
        )?;
        Ok(())
    }
}

impl RunStore for SqliteStore {
    fn create_case(&self, case: NewCase) -> Result<Case> {
        let conn = self.lock()?;
        let now = Utc::now();
        conn.execute(
            "INSERT INTO cases(owner, title, framework_key, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![case.owner, case.title, case.framework_key, Self::millis(now)],
        )?;
        Ok(Case {
            id: CaseId(conn.last_insert_rowid()),
            owner: case.owner,
            title: case.title,
            framework_key: case.framework_key,
            created_at: Self::from_millis(Self::millis(now)),
        })
    }

    fn get_case(&self, case_id: CaseId) -> Result<Option<Case>> {
        let conn = self.lock()?;
        let case = conn
            .query_row(
                "SELECT id, owner, title, framework_key, created_at FROM cases WHERE id = ?1",
                [case_id.get()],
                Self::row_to_case,
            )
            .optional()?;
        Ok(case)
    }

    fn list_cases(&self) -> Result<Vec<Case>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT id, owner, title, framework_key, created_at FROM cases ORDER BY id DESC")?;
        let rows = stmt.query_map([], Self::row_to_case)?;
        let mut out = vec![];
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn add_document(&self, case_id: CaseId, doc: NewDocument) -> Result<Document> {
        let conn = self.lock()?;
        let now = Utc::now();
        conn.execute(
            "INSERT INTO documents(case_id, file_url, file_name, mime_type, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![case_id.get(), doc.file_url, doc.file_name, doc.mime_type, Self::millis(now)],
        )
        .with_context(|| format!("add document to case {case_id}"))?;
        Ok(Document {
            id: DocumentId(conn.last_insert_rowid()),
            case_id,
            file_url: doc.file_url,
            file_name: doc.file_name,
            mime_type: doc.mime_type,
            created_at: Self::from_millis(Self::millis(now)),
        })
    }

    fn get_case_document(&self, case_id: CaseId) -> Result<Option<Document>> {
        let conn = self.lock()?;
        let doc = conn
            .query_row(
                "SELECT id, case_id, file_url, file_name, mime_type, created_at FROM documents
                 WHERE case_id = ?1 ORDER BY id DESC LIMIT 1",
                [case_id.get()],
                Self::row_to_document,
            )
            .optional()?;
        Ok(doc)
    }

    fn create_run(&self, case_id: CaseId, document_id: DocumentId) -> Result<Run> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO runs(case_id, document_id, status, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![case_id.get(), document_id.get(), RunStatus::Queued.as_str(), Self::millis(Utc::now())],
        )?;
        let run_id = RunId(conn.last_insert_rowid());
        Self::load_run(&conn, run_id)?.ok_or_else(|| anyhow!("run {run_id} vanished after insert"))
    }

    fn get_run(&self, run_id: RunId) -> Result<Option<Run>> {
        let conn = self.lock()?;
        Self::load_run(&conn, run_id)
    }

    fn get_latest_run(&self, case_id: CaseId) -> Result<Option<Run>> {
        let conn = self.lock()?;
        let run = conn
            .query_row(
                &format!("SELECT {RUN_COLUMNS} FROM runs WHERE case_id = ?1 ORDER BY id DESC LIMIT 1"),
                [case_id.get()],
                Self::row_to_run,
            )
            .optional()?;
        Ok(run)
    }

    fn set_run_status(&self, run_id: RunId, status: RunStatus, error_message: Option<&str>) -> Result<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let Some(mut run) = Self::load_run(&tx, run_id)? else {
            return Ok(false);
        };
        run.apply_status(status, error_message, Utc::now());
        Self::write_run(&tx, &run)?;
        tx.commit()?;
        Ok(true)
    }

    fn claim_run(&self, run_id: RunId, from: &[RunStatus]) -> Result<bool> {
        if from.is_empty() {
            return Ok(false);
        }
        let conn = self.lock()?;
        let allowed = from
            .iter()
            .map(|s| format!("'{}'", s.as_str()))
            .collect::<Vec<_>>()
            .join(", ");
        let changed = conn.execute(
            &format!(
                "UPDATE runs SET status = ?2, started_at = ?3, finished_at = NULL, error_message = NULL
                 WHERE id = ?1 AND status IN ({allowed})"
            ),
            params![run_id.get(), RunStatus::Running.as_str(), Self::millis(Utc::now())],
        )?;
        Ok(changed == 1)
    }

    fn clear_run_findings(&self, run_id: RunId) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM findings WHERE run_id = ?1", [run_id.get()])?;
        Ok(())
    }

    fn insert_findings(&self, run_id: RunId, findings: &[Finding]) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO findings(run_id, rule_code, status, reason, evidence_json)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for f in findings.iter().filter(|f| !f.rule_code.is_empty()) {
                let evidence_json = serde_json::to_string(&f.evidence)?;
                inserted += stmt.execute(params![run_id.get(), f.rule_code, f.status.as_str(), f.reason, evidence_json])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    fn get_run_findings(&self, run_id: RunId) -> Result<Vec<Finding>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT rule_code, status, reason, evidence_json FROM findings WHERE run_id = ?1 ORDER BY id")?;
        let rows = stmt.query_map([run_id.get()], |r| {
            let evidence_json: String = r.get(3)?;
            let evidence: Vec<Evidence> = serde_json::from_str(&evidence_json).unwrap_or_default();
            Ok(Finding {
                rule_code: r.get(0)?,
                status: FindingStatus::coerce(&r.get::<_, String>(1)?),
                reason: r.get(2)?,
                evidence,
            })
        })?;
        let mut out = vec![];
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn set_run_debug(&self, run_id: RunId, payload: &DebugPayload) -> Result<()> {
        let conn = self.lock()?;
        let payload_json = serde_json::to_string(payload)?;
        conn.execute(
            "INSERT INTO run_debug(run_id, updated_at, payload_json) VALUES (?1, ?2, ?3)
             ON CONFLICT(run_id) DO UPDATE SET updated_at = excluded.updated_at, payload_json = excluded.payload_json",
            params![run_id.get(), Self::millis(Utc::now()), payload_json],
        )?;
        Ok(())
    }

    fn get_run_debug(&self, run_id: RunId) -> Result<Option<RunDebug>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT updated_at, payload_json FROM run_debug WHERE run_id = ?1",
                [run_id.get()],
                |r| Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?)),
            )
            .optional()?;
        let Some((updated_at, payload_json)) = row else {
            return Ok(None);
        };
        let payload: DebugPayload =
            serde_json::from_str(&payload_json).with_context(|| format!("decode debug payload of run {run_id}"))?;
        Ok(Some(RunDebug {
            run_id,
            updated_at: Self::from_millis(updated_at),
            payload,
        }))
    }

    fn clear_run_debug(&self, run_id: RunId) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM run_debug WHERE run_id = ?1", [run_id.get()])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docaudit_core::{FailureReport, ProgressTracker};

    fn seeded(store: &SqliteStore) -> Run {
        let case = store
            .create_case(NewCase {
                owner: Some("auditor@firm".into()),
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
        store.create_run(case.id, doc.id).unwrap()
    }

    #[test]
    fn state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("nested").join("docaudit.sqlite");
        let run_id = {
            let store = SqliteStore::open(&db).unwrap();
            let run = seeded(&store);
            store
                .insert_findings(
                    run.id,
                    &[Finding {
                        rule_code: "INDAS-01-001".into(),
                        status: FindingStatus::Pass,
                        reason: "Statement of compliance present.".into(),
                        evidence: vec![Evidence {
                            page: Some(3),
                            snippet: "prepared in accordance with Ind AS".into(),
                        }],
                    }],
                )
                .unwrap();
            run.id
        };

        let store = SqliteStore::open(&db).unwrap();
        let run = store.get_run(run_id).unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Queued);
        let findings = store.get_run_findings(run_id).unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].evidence[0].page, Some(3));
        assert_eq!(store.list_cases().unwrap().len(), 1);
    }

    #[test]
    fn claim_only_succeeds_from_allowed_statuses() {
        let store = SqliteStore::open_in_memory().unwrap();
        let run = seeded(&store);
        assert!(store.claim_run(run.id, &RunStatus::STARTABLE).unwrap());
        assert!(!store.claim_run(run.id, &RunStatus::STARTABLE).unwrap());

        let running = store.get_run(run.id).unwrap().unwrap();
        assert_eq!(running.status, RunStatus::Running);
        assert!(running.started_at.is_some());
    }

    #[test]
    fn terminal_status_keeps_existing_error_when_none_given() {
        let store = SqliteStore::open_in_memory().unwrap();
        let run = seeded(&store);
        store.set_run_status(run.id, RunStatus::Running, None).unwrap();
        store.set_run_status(run.id, RunStatus::Failed, Some("boom")).unwrap();
        store.set_run_status(run.id, RunStatus::Failed, None).unwrap();
        let failed = store.get_run(run.id).unwrap().unwrap();
        assert_eq!(failed.error_message.as_deref(), Some("boom"));
        assert!(failed.finished_at.is_some());

        store.set_run_status(run.id, RunStatus::Queued, None).unwrap();
        let queued = store.get_run(run.id).unwrap().unwrap();
        assert!(queued.error_message.is_none());
        assert!(queued.started_at.is_none());
        assert!(queued.finished_at.is_none());
    }

    #[test]
    fn first_finding_per_rule_wins() {
        let store = SqliteStore::open_in_memory().unwrap();
        let run = seeded(&store);
        let mk = |status| Finding {
            rule_code: "INDAS-07-001".into(),
            status,
            reason: "r".into(),
            evidence: vec![],
        };
        assert_eq!(store.insert_findings(run.id, &[mk(FindingStatus::Fail)]).unwrap(), 1);
        assert_eq!(store.insert_findings(run.id, &[mk(FindingStatus::Pass)]).unwrap(), 0);
        let findings = store.get_run_findings(run.id).unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].status, FindingStatus::Fail);
    }

    #[test]
    fn debug_payload_round_trips_both_shapes() {
        let store = SqliteStore::open_in_memory().unwrap();
        let run = seeded(&store);
        let tracker = ProgressTracker::new("indas", 15, 3);
        let progress = DebugPayload::Progress(tracker.initial("Queued for analysis"));
        store.set_run_debug(run.id, &progress).unwrap();
        assert_eq!(store.get_run_debug(run.id).unwrap().unwrap().payload, progress);

        let failure = DebugPayload::Failure(FailureReport {
            status: RunStatus::Failed,
            reference: "RUN-1-20260101000000".into(),
            error: "fetch failed".into(),
            attempts: vec![],
        });
        store.set_run_debug(run.id, &failure).unwrap();
        assert_eq!(store.get_run_debug(run.id).unwrap().unwrap().payload, failure);

        store.clear_run_debug(run.id).unwrap();
        assert!(store.get_run_debug(run.id).unwrap().is_none());
    }

    #[test]
    fn missing_run_status_update_reports_false() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(!store.set_run_status(RunId(42), RunStatus::Done, None).unwrap());
    }
}
