//! Sequential job dispatch: one submission is judged and published before the
//! next one is taken from the queue.

use std::{
    sync::atomic::{AtomicBool, Ordering},
    thread,
    time::Duration,
};

use crate::{error::Result, judge::Pipeline, submission::Submission, JudgeResult};

mod dir;

pub use dir::{check_id, DirQueue, DirStore};

/// Publishing attempts for one job's results before they are dropped.
pub const MAX_PUBLISH_ATTEMPTS: u32 = 3;

/// A job as read from the queue. The payload is kept raw so a malformed job
/// can still be acknowledged.
#[derive(Debug, Clone)]
pub struct QueuedJob {
    pub id: String,
    pub payload: Vec<u8>,
}

pub trait JobQueue {
    /// Oldest pending job, if any. The job stays queued until `complete`.
    fn poll(&mut self) -> Result<Option<QueuedJob>>;
    fn complete(&mut self, id: &str) -> Result<()>;
}

pub trait ResultSink {
    fn publish(&mut self, id: &str, results: &[JudgeResult]) -> Result<()>;
}

/// Results judged but not yet accepted by the sink.
struct Unpublished {
    id: String,
    results: Vec<JudgeResult>,
    attempts: u32,
}

pub struct Dispatcher<Q, S> {
    queue: Q,
    sink: S,
    pipeline: Pipeline,
    poll_interval: Duration,
    unpublished: Option<Unpublished>,
}

impl<Q: JobQueue, S: ResultSink> Dispatcher<Q, S> {
    pub fn new(queue: Q, sink: S, pipeline: Pipeline, poll_interval: Duration) -> Self {
        Self {
            queue,
            sink,
            pipeline,
            poll_interval,
            unpublished: None,
        }
    }

    /// Takes at most one job off the queue. Returns whether there was one.
    /// Results the sink refused are retried before a new job is taken, and
    /// dropped after `MAX_PUBLISH_ATTEMPTS`.
    pub fn run_once(&mut self) -> Result<bool> {
        let mut job = match self.unpublished.take() {
            Some(job) => job,
            None => match self.queue.poll()? {
                Some(job) => {
                    let results = self.judge(&job);
                    Unpublished {
                        id: job.id,
                        results,
                        attempts: 0,
                    }
                }
                None => return Ok(false),
            },
        };

        match self.sink.publish(&job.id, &job.results) {
            Ok(()) => log::info!("results for job {} published", job.id),
            Err(e) => {
                job.attempts += 1;
                if job.attempts < MAX_PUBLISH_ATTEMPTS {
                    self.unpublished = Some(job);
                    return Err(e);
                }
                log::error!(
                    "dropping results of job {} after {} attempts: {}",
                    job.id,
                    job.attempts,
                    e
                );
            }
        }
        self.queue.complete(&job.id)?;

        Ok(true)
    }

    fn judge(&self, job: &QueuedJob) -> Vec<JudgeResult> {
        let default_limit = self.pipeline.settings().memory_limit_mb;
        match Submission::from_json(&job.id, &job.payload, default_limit) {
            Ok(submission) => self.pipeline.judge(&submission),
            Err(e) => {
                log::error!("dropping malformed job {}: {}", job.id, e);
                vec![JudgeResult::aborted(format!("malformed job: {}", e))]
            }
        }
    }

    /// Drains the queue until `shutdown` is raised, sleeping between polls
    /// while it is empty. Queue and sink failures are logged and retried on
    /// the next poll.
    pub fn run(&mut self, shutdown: &AtomicBool) {
        log::info!("dispatcher started");
        while !shutdown.load(Ordering::SeqCst) {
            match self.run_once() {
                Ok(true) => {}
                Ok(false) => thread::sleep(self.poll_interval),
                Err(e) => {
                    log::error!("dispatch failed: {}", e);
                    thread::sleep(self.poll_interval);
                }
            }
        }
        log::info!("dispatcher stopped");
    }

    pub fn into_parts(self) -> (Q, S) {
        (self.queue, self.sink)
    }
}
