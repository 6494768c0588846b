//! job_list.rs
//! Thread-safe ordered queue of Jobs, drained once per control cycle.
//!
//! Producers (see-think modules, the job network port) call `add` concurrently;
//! the sense-act loop is the single consumer and calls `drain`. A single
//! mutex guards the whole sequence so an append is never observed half done
//! and `clear` never interleaves with one.

use parking_lot::Mutex;

use crate::error::DecodeError;
use crate::jobs::{
    codec,
    job::{Job, JobKind},
};

#[derive(Debug, Default)]
pub struct JobList {
    jobs: Mutex<Vec<Job>>,
}

impl JobList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the tail.
    pub fn add(&self, job: Job) {
        self.jobs.lock().push(job);
    }

    /// Append a decoded batch atomically, preserving its order.
    pub fn extend(&self, jobs: Vec<Job>) {
        if jobs.is_empty() {
            return;
        }
        self.jobs.lock().extend(jobs);
    }

    pub fn add_motion_job(&self, job: Job) {
        debug_assert!(matches!(job.kind(), JobKind::Motion(_)));
        self.add(job);
    }

    pub fn add_vision_job(&self, job: Job) {
        debug_assert!(matches!(job.kind(), JobKind::Vision(_)));
        self.add(job);
    }

    pub fn add_behaviour_job(&self, job: Job) {
        debug_assert!(matches!(job.kind(), JobKind::Behaviour(_)));
        self.add(job);
    }

    /// Remove and return every Job in insertion order.
    pub fn drain(&self) -> Vec<Job> {
        std::mem::take(&mut *self.jobs.lock())
    }

    pub fn clear(&self) {
        self.jobs.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.lock().is_empty()
    }

    /// Human-readable descriptions of the current contents.
    ///
    /// The list is not modified. The returned summary can be iterated any
    /// number of times; each description is only formatted when reached.
    pub fn summarize(&self) -> JobSummary {
        JobSummary {
            jobs: self.jobs.lock().clone(),
        }
    }

    /// Serialize the current contents without removing them.
    pub fn encode(&self) -> Vec<u8> {
        let guard = self.jobs.lock();
        codec::encode_jobs(&guard)
    }

    /// Decode `bytes` and append the result. Nothing is appended on error.
    pub fn extend_from_bytes(&self, bytes: &[u8]) -> Result<usize, DecodeError> {
        let jobs = codec::decode_jobs(bytes)?;
        let count = jobs.len();
        self.extend(jobs);
        Ok(count)
    }
}

/// Snapshot taken by [`JobList::summarize`].
#[derive(Debug, Clone)]
pub struct JobSummary {
    jobs: Vec<Job>,
}

impl JobSummary {
    pub fn iter(&self) -> impl Iterator<Item = String> + '_ {
        self.into_iter()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

impl<'a> IntoIterator for &'a JobSummary {
    type Item = String;
    type IntoIter = std::iter::Map<std::slice::Iter<'a, Job>, fn(&Job) -> String>;

    fn into_iter(self) -> Self::IntoIter {
        self.jobs.iter().map(describe as fn(&Job) -> String)
    }
}

fn describe(job: &Job) -> String {
    job.to_string()
}
