use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use docaudit_core::{
    resolve_framework, Case, CaseId, DebugPayload, Document, Finding, NewCase, NewDocument, ProgressTracker,
    Run, RunDebug, RunId, RunProgress, RunStatus,
};
use docaudit_model::{ComplianceModel, GeminiClient};
use docaudit_storage::RunStore;
use docaudit_storage_sqlite::SqliteStore;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{Config, ServiceError, Worker};

pub const QUEUED_STATUS_TEXT: &str = "Queued for analysis";

/// Input of [`Runner::create_case`].
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CaseRequest {
    pub title: String,
    #[serde(default)]
    pub framework_key: Option<String>,
    pub document_url: String,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CaseCreated {
    pub case: Case,
    pub document: Document,
    pub run: Run,
}

/// What a polling client sees for one run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunStatusView {
    pub id: RunId,
    pub case_id: CaseId,
    pub status: RunStatus,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<RunProgress>,
}

/// Service facade over the store and the worker.
pub struct Runner {
    pub cfg: Config,
    store: Arc<dyn RunStore>,
    worker: Arc<Worker>,
}

impl Runner {
    /// Open (and initialise if needed) the workspace at `root`.
    pub fn open(root: PathBuf) -> Result<Self> {
        let cfg = Config::load_or_init(&root)?;
        let store = SqliteStore::open(&cfg.db_path(&root))?;
        let model = GeminiClient::new(cfg.model.clone())?;
        Ok(Self::with_parts(cfg, Arc::new(store), Arc::new(model)))
    }

    pub fn init_root(root: &Path) -> Result<PathBuf> {
        let cfg = Config::load_or_init(root)?;
        let db_path = cfg.db_path(root);
        let _ = SqliteStore::open(&db_path)?;
        Ok(Config::config_path(root))
    }

    pub fn with_parts(cfg: Config, store: Arc<dyn RunStore>, model: Arc<dyn ComplianceModel>) -> Self {
        let worker = Worker::new(store.clone(), model, cfg.batch_size());
        Self::with_worker(cfg, store, worker)
    }

    pub fn with_worker(cfg: Config, store: Arc<dyn RunStore>, worker: Worker) -> Self {
        Self {
            cfg,
            store,
            worker: Arc::new(worker),
        }
    }

    pub fn store(&self) -> &Arc<dyn RunStore> {
        &self.store
    }

    pub fn worker(&self) -> &Arc<Worker> {
        &self.worker
    }

    /// Create a case with its document and an initial `queued` run.
    pub fn create_case(&self, req: CaseRequest) -> Result<CaseCreated, ServiceError> {
        let title = req.title.trim();
        if title.is_empty() {
            return Err(ServiceError::invalid("title must not be blank"));
        }
        let document_url = req.document_url.trim();
        if document_url.is_empty() {
            return Err(ServiceError::invalid("document_url must not be blank"));
        }
        let framework = resolve_framework(req.framework_key.as_deref().unwrap_or_default());

        let case = self.store.create_case(NewCase {
            owner: req.owner.filter(|o| !o.trim().is_empty()),
            title: title.to_string(),
            framework_key: framework.key.to_string(),
        })?;
        let document = self.store.add_document(
            case.id,
            NewDocument {
                file_url: document_url.to_string(),
                file_name: req.file_name.filter(|n| !n.trim().is_empty()),
                mime_type: Some("application/pdf".to_string()),
            },
        )?;
        let run = self.store.create_run(case.id, document.id)?;
        info!(case_id = %case.id, run_id = %run.id, framework = framework.key, "case created");
        Ok(CaseCreated { case, document, run })
    }

    pub fn list_cases(&self) -> Result<Vec<Case>, ServiceError> {
        Ok(self.store.list_cases()?)
    }

    /// Claim the latest run of a case and reset its results. The caller
    /// schedules [`Runner::process_run`] afterwards.
    pub fn start_run(&self, case_id: CaseId) -> Result<RunId, ServiceError> {
        let case = self
            .store
            .get_case(case_id)?
            .ok_or_else(|| ServiceError::not_found(format!("case {case_id}")))?;
        let run = self
            .store
            .get_latest_run(case.id)?
            .ok_or_else(|| ServiceError::not_found(format!("run for case {case_id}")))?;

        let Some(_held) = self.worker.try_hold(run.id)? else {
            return Err(ServiceError::conflict(format!("run {} is already running", run.id)));
        };
        if !self.store.claim_run(run.id, &RunStatus::STARTABLE)? {
            return Err(ServiceError::conflict(format!("run {} is already running", run.id)));
        }

        self.store.clear_run_findings(run.id)?;
        self.store.clear_run_debug(run.id)?;
        let total_rules = self.worker.rules_for(&case.framework_key).len();
        let tracker = ProgressTracker::new(&case.framework_key, total_rules, self.worker.batch_size());
        self.store
            .set_run_debug(run.id, &DebugPayload::Progress(tracker.initial(QUEUED_STATUS_TEXT)))?;
        info!(case_id = %case_id, run_id = %run.id, "run started");
        Ok(run.id)
    }

    pub async fn process_run(&self, run_id: RunId) -> Result<()> {
        self.worker.process_run(run_id).await
    }

    /// Discard findings and progress and put the run back to `queued`.
    ///
    /// `force` allows resetting a run left `running` by a crashed process;
    /// a run orchestrated by this process is never reset. The run is held
    /// for the whole reset, so a `process_run` arriving meanwhile skips it.
    pub fn reset_run(&self, run_id: RunId, force: bool) -> Result<Run, ServiceError> {
        let Some(_held) = self.worker.try_hold(run_id)? else {
            return Err(ServiceError::conflict(format!("run {run_id} is being processed")));
        };
        let run = self
            .store
            .get_run(run_id)?
            .ok_or_else(|| ServiceError::not_found(format!("run {run_id}")))?;
        if run.status == RunStatus::Running && !force {
            return Err(ServiceError::conflict(format!("run {run_id} is running; pass force to reset it")));
        }

        self.store.clear_run_findings(run_id)?;
        self.store.clear_run_debug(run_id)?;
        self.store.set_run_status(run_id, RunStatus::Queued, None)?;
        info!(run_id = %run_id, force, "run reset");
        self.store
            .get_run(run_id)?
            .ok_or_else(|| ServiceError::not_found(format!("run {run_id}")))
    }

    pub fn run_status(&self, run_id: RunId) -> Result<RunStatusView, ServiceError> {
        let run = self
            .store
            .get_run(run_id)?
            .ok_or_else(|| ServiceError::not_found(format!("run {run_id}")))?;
        let progress = self
            .store
            .get_run_debug(run_id)?
            .and_then(|d| d.payload.progress().cloned());
        Ok(RunStatusView {
            id: run.id,
            case_id: run.case_id,
            status: run.status,
            error_message: run.error_message,
            started_at: run.started_at,
            finished_at: run.finished_at,
            progress,
        })
    }

    pub fn run_debug(&self, run_id: RunId) -> Result<Option<RunDebug>, ServiceError> {
        self.ensure_run(run_id)?;
        Ok(self.store.get_run_debug(run_id)?)
    }

    pub fn findings(&self, run_id: RunId) -> Result<Vec<Finding>, ServiceError> {
        self.ensure_run(run_id)?;
        Ok(self.store.get_run_findings(run_id)?)
    }

    fn ensure_run(&self, run_id: RunId) -> Result<(), ServiceError> {
        match self.store.get_run(run_id)? {
            Some(_) => Ok(()),
            None => Err(ServiceError::not_found(format!("run {run_id}"))),
        }
    }
}
