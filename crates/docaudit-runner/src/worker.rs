use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use docaudit_core::{
    get_rules, normalize, unknown_findings, AttemptLog, AttemptTrace, Case, DebugPayload, Document, FailureReport,
    ProgressTracker, Rule, Run, RunId, RunStatus,
};
use docaudit_model::ComplianceModel;
use docaudit_storage::RunStore;
use tracing::{debug, error, info, warn};

use crate::redact::{classify, failure_reference, redacted_message};

pub const BATCH_FALLBACK_REASON: &str = "Could not complete automated evaluation for this rule in this run.";
const BATCH_FALLBACK_ATTEMPT: &str = "batch_fallback";

/// Maps a framework key to its ordered rule list.
pub type RuleSource = fn(&str) -> Vec<Rule>;

/// Drives one run from `running` to `done` or `failed`.
pub struct Worker {
    store: Arc<dyn RunStore>,
    model: Arc<dyn ComplianceModel>,
    batch_size: usize,
    rule_source: RuleSource,
    active: Mutex<HashSet<RunId>>,
}

/// Marks a run as held by this process until dropped: either orchestrated
/// by [`Worker::process_run`] or reserved by a control operation.
pub struct ActiveRun<'a> {
    active: &'a Mutex<HashSet<RunId>>,
    run_id: RunId,
}

impl Drop for ActiveRun<'_> {
    fn drop(&mut self) {
        if let Ok(mut active) = self.active.lock() {
            active.remove(&self.run_id);
        }
    }
}

struct Resolved {
    case: Case,
    document: Document,
    rules: Vec<Rule>,
}

impl Worker {
    pub fn new(store: Arc<dyn RunStore>, model: Arc<dyn ComplianceModel>, batch_size: usize) -> Self {
        Self {
            store,
            model,
            batch_size: batch_size.max(1),
            rule_source: get_rules,
            active: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_rule_source(mut self, rule_source: RuleSource) -> Self {
        self.rule_source = rule_source;
        self
    }

    pub fn rules_for(&self, framework_key: &str) -> Vec<Rule> {
        (self.rule_source)(framework_key)
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Reserve a run for this process. `None` when it is already held.
    pub fn try_hold(&self, run_id: RunId) -> Result<Option<ActiveRun<'_>>> {
        let mut active = self.active.lock().map_err(|_| anyhow!("active run set poisoned"))?;
        if !active.insert(run_id) {
            return Ok(None);
        }
        Ok(Some(ActiveRun {
            active: &self.active,
            run_id,
        }))
    }

    /// Entry point for a scheduling event.
    ///
    /// Safe to call more than once: a concurrent call for the same run, a
    /// call for a finished run and a call for a missing run are no-ops. A
    /// `queued` run is claimed here; a `running` run is assumed to have been
    /// claimed by whoever scheduled it.
    pub async fn process_run(&self, run_id: RunId) -> Result<()> {
        let Some(_active) = self.try_hold(run_id)? else {
            warn!(run_id = %run_id, "run is already being processed; skipping");
            return Ok(());
        };

        let Some(run) = self.store.get_run(run_id)? else {
            warn!(run_id = %run_id, "run not found; nothing to process");
            return Ok(());
        };
        match run.status {
            RunStatus::Done | RunStatus::Failed => {
                debug!(run_id = %run_id, status = %run.status, "run already finished");
                return Ok(());
            }
            RunStatus::Queued => {
                if !self.store.claim_run(run_id, &[RunStatus::Queued])? {
                    warn!(run_id = %run_id, "lost claim race for queued run");
                    return Ok(());
                }
            }
            RunStatus::Running => {}
        }

        let mut log = AttemptLog::new();
        match self.orchestrate(&run, &mut log).await {
            Ok(()) => Ok(()),
            Err(err) => self.fail_run(run_id, &err, &log),
        }
    }

    fn resolve(&self, run: &Run) -> Result<Resolved> {
        let case = self
            .store
            .get_case(run.case_id)?
            .ok_or_else(|| anyhow!("case {} not found", run.case_id))?;
        let document = self
            .store
            .get_case_document(case.id)?
            .filter(|d| !d.file_url.trim().is_empty())
            .ok_or_else(|| anyhow!("document not found for case {}", case.id))?;
        let rules = self.rules_for(&case.framework_key);
        if rules.is_empty() {
            return Err(anyhow!("no rules configured for framework {}", case.framework_key));
        }
        Ok(Resolved { case, document, rules })
    }

    async fn orchestrate(&self, run: &Run, log: &mut AttemptLog) -> Result<()> {
        let run_id = run.id;
        let Resolved { case, document, rules } = self.resolve(run)?;
        let framework = case.framework_key.as_str();

        let mut tracker = ProgressTracker::new(framework, rules.len(), self.batch_size);
        let opening = tracker.initial(&format!("Running (0/{})", rules.len()));
        self.store.set_run_debug(run_id, &DebugPayload::Progress(opening))?;
        info!(run_id = %run_id, rules = rules.len(), batches = tracker.total_batches(), "run started");

        let started = Instant::now();
        for (index, batch) in rules.chunks(self.batch_size).enumerate() {
            let batch_no = index + 1;
            let (findings, batch_error, trace) =
                match self.model.evaluate(framework, &document.file_url, batch, log).await {
                    Ok(raw) => (normalize(batch, &raw), None, log.to_vec()),
                    Err(err) => {
                        warn!(run_id = %run_id, batch = batch_no, error = %err, "batch evaluation failed; recording unknown findings");
                        let message = err.to_string();
                        let trace = vec![AttemptTrace::failed(BATCH_FALLBACK_ATTEMPT, message.clone())];
                        (unknown_findings(batch, BATCH_FALLBACK_REASON), Some(message), trace)
                    }
                };

            self.store
                .insert_findings(run_id, &findings)
                .with_context(|| format!("persist findings of batch {batch_no}"))?;
            tracker.record_batch(batch.len(), &findings);
            let snapshot = tracker.running(started.elapsed(), batch_error, trace);
            self.store.set_run_debug(run_id, &DebugPayload::Progress(snapshot))?;
            debug!(
                run_id = %run_id,
                batch = batch_no,
                evaluated = tracker.evaluated_rules(),
                total = tracker.total_rules(),
                "batch recorded"
            );
        }

        self.store.set_run_debug(run_id, &DebugPayload::Progress(tracker.finished()))?;
        self.store.set_run_status(run_id, RunStatus::Done, None)?;
        info!(run_id = %run_id, elapsed_ms = started.elapsed().as_millis() as u64, "run completed");
        Ok(())
    }

    fn fail_run(&self, run_id: RunId, err: &anyhow::Error, log: &AttemptLog) -> Result<()> {
        let reference = failure_reference(run_id, Utc::now());
        let raw = format!("{err:#}");
        error!(run_id = %run_id, reference = %reference, error = %raw, "run failed");

        let report = FailureReport {
            status: RunStatus::Failed,
            reference: reference.clone(),
            error: raw,
            attempts: log.to_vec(),
        };
        self.store.set_run_debug(run_id, &DebugPayload::Failure(report))?;
        let message = redacted_message(classify(err), &reference);
        self.store.set_run_status(run_id, RunStatus::Failed, Some(&message))?;
        Ok(())
    }
}
