//! Run-level aggregates and the snapshots derived from them.
//!
//! Score and coverage are computed against `total_rules`, so they only reach
//! their final values once every batch has been evaluated.

use std::time::Duration;

use crate::{AttemptTrace, Finding, FindingStatus, RunProgress, RunStatus};

/// `round(100 * part / total)`, zero when `total` is zero.
pub fn percent(part: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    (100.0 * part as f64 / total as f64).round() as u32
}

/// Remaining rules times the average time per evaluated rule so far.
pub fn eta_seconds(remaining: usize, evaluated: usize, elapsed: Duration) -> u64 {
    if evaluated == 0 {
        return 0;
    }
    let elapsed = elapsed.as_secs_f64().max(0.1);
    let per_rule = elapsed / evaluated as f64;
    (remaining as f64 * per_rule).round().max(0.0) as u64
}

pub fn batch_count(total_rules: usize, batch_size: usize) -> usize {
    total_rules.div_ceil(batch_size.max(1))
}

#[derive(Clone, Debug)]
pub struct ProgressTracker {
    framework: String,
    total_rules: usize,
    total_batches: usize,
    batches_done: usize,
    evaluated: usize,
    assessed: usize,
    pass: usize,
    fail: usize,
    unknown: usize,
}

impl ProgressTracker {
    pub fn new(framework: &str, total_rules: usize, batch_size: usize) -> Self {
        Self {
            framework: framework.to_string(),
            total_rules,
            total_batches: batch_count(total_rules, batch_size),
            batches_done: 0,
            evaluated: 0,
            assessed: 0,
            pass: 0,
            fail: 0,
            unknown: 0,
        }
    }

    /// Fold one evaluated batch into the aggregates.
    ///
    /// `batch_len` is the number of rules in the batch; it advances
    /// `evaluated_rules` even if fewer findings came back, and any shortfall
    /// is counted as unknown so the counts keep adding up.
    pub fn record_batch(&mut self, batch_len: usize, findings: &[Finding]) {
        let mut counted = 0;
        for f in findings.iter().take(batch_len) {
            match f.status {
                FindingStatus::Pass => self.pass += 1,
                FindingStatus::Fail => self.fail += 1,
                FindingStatus::Unknown => self.unknown += 1,
            }
            if f.status.is_assessed() {
                self.assessed += 1;
            }
            counted += 1;
        }
        self.unknown += batch_len - counted;
        self.evaluated += batch_len;
        self.batches_done += 1;
    }

    pub fn total_rules(&self) -> usize {
        self.total_rules
    }

    pub fn total_batches(&self) -> usize {
        self.total_batches
    }

    pub fn evaluated_rules(&self) -> usize {
        self.evaluated
    }

    /// Snapshot written before the first batch.
    pub fn initial(&self, status_text: &str) -> RunProgress {
        let mut p = self.base(RunStatus::Running, status_text.to_string());
        p.eta_seconds = None;
        p
    }

    /// Snapshot written after each batch.
    pub fn running(
        &self,
        elapsed: Duration,
        last_batch_error: Option<String>,
        last_batch_trace: Vec<AttemptTrace>,
    ) -> RunProgress {
        let status_text = format!("Running ({}/{})", self.evaluated, self.total_rules);
        let mut p = self.base(RunStatus::Running, status_text);
        let remaining = self.total_rules.saturating_sub(self.evaluated);
        p.eta_seconds = Some(eta_seconds(remaining, self.evaluated, elapsed));
        p.current_batch = Some(self.batches_done);
        p.total_batches = Some(self.total_batches);
        p.last_batch_error = last_batch_error;
        p.last_batch_trace = last_batch_trace;
        p
    }

    /// Final snapshot of a completed run.
    pub fn finished(&self) -> RunProgress {
        let mut p = self.base(RunStatus::Done, "Completed".to_string());
        p.progress_percent = 100;
        p.eta_seconds = Some(0);
        p
    }

    fn base(&self, status: RunStatus, status_text: String) -> RunProgress {
        RunProgress {
            status,
            framework: self.framework.clone(),
            total_rules: self.total_rules,
            evaluated_rules: self.evaluated,
            assessed_rules: self.assessed,
            pass_count: self.pass,
            fail_count: self.fail,
            unknown_count: self.unknown,
            score_current: percent(self.pass, self.total_rules),
            coverage_percent: percent(self.pass + self.fail, self.total_rules),
            progress_percent: percent(self.evaluated, self.total_rules),
            eta_seconds: None,
            current_batch: None,
            total_batches: None,
            status_text,
            last_batch_error: None,
            last_batch_trace: vec![],
        }
    }
}
