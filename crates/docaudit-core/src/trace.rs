use std::collections::VecDeque;

use crate::AttemptTrace;

pub const ATTEMPT_LOG_CAPACITY: usize = 20;

/// Fixed-capacity attempt log scoped to one model-client call.
///
/// Oldest entries are evicted once the capacity is reached.
#[derive(Clone, Debug)]
pub struct AttemptLog {
    entries: VecDeque<AttemptTrace>,
    capacity: usize,
}

impl Default for AttemptLog {
    fn default() -> Self {
        Self::with_capacity(ATTEMPT_LOG_CAPACITY)
    }
}

impl AttemptLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn record(&mut self, entry: AttemptTrace) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn reset(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AttemptTrace> {
        self.entries.iter()
    }

    pub fn to_vec(&self) -> Vec<AttemptTrace> {
        self.entries.iter().cloned().collect()
    }
}
