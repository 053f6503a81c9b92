//! Caller-owned record of the runs made during one session

use std::collections::VecDeque;

use dicomesh_core::error::Result;
use dicomesh_core::models::ConversionResult;

use crate::ports::ResultRepository;

/// Runs kept in memory before the oldest is dropped
pub const REGISTRY_CAPACITY: usize = 10;

/// Recent runs of the current session, backed by a repository for runs
/// made by earlier sessions
#[derive(Debug)]
pub struct JobRegistry<R> {
    repository: R,
    recent: VecDeque<ConversionResult>,
}

impl<R: ResultRepository> JobRegistry<R> {
    pub fn new(repository: R) -> Self {
        Self {
            repository,
            recent: VecDeque::with_capacity(REGISTRY_CAPACITY),
        }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Remember a finished run; re-running a job replaces its entry
    pub fn record(&mut self, result: ConversionResult) {
        self.recent.retain(|r| r.job.job_id != result.job.job_id);
        self.recent.push_back(result);
        while self.recent.len() > REGISTRY_CAPACITY {
            self.recent.pop_front();
        }
    }

    /// Up to `limit` runs, oldest first.
    ///
    /// Uses this session's runs when there are any; otherwise reads history
    /// from the repository.
    pub fn recent(&self, limit: usize) -> Result<Vec<ConversionResult>> {
        if self.recent.is_empty() {
            return self.repository.load_recent(limit);
        }

        let skip = self.recent.len().saturating_sub(limit);
        Ok(self.recent.iter().skip(skip).cloned().collect())
    }

    pub fn get(&self, job_id: &str) -> Result<Option<ConversionResult>> {
        match self.recent.iter().find(|r| r.job.job_id == job_id) {
            Some(result) => Ok(Some(result.clone())),
            None => self.repository.get(job_id),
        }
    }

    pub fn latest(&self) -> Option<&ConversionResult> {
        self.recent.back()
    }

    pub fn len(&self) -> usize {
        self.recent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recent.is_empty()
    }
}
