//! A single worker: dequeues tasks, drives its authenticator and reports
//! outcomes.
//!
//! The per-task retry policy is an explicit state machine:
//!
//! ```text
//! Idle --Work--> Authenticating --Success/Invalid--> Idle
//!                     |  ^
//!          ConnError  v  | budget left, after backoff
//!                   Retrying --budget spent--> Idle (ConnectionError outcome)
//! Idle --Shutdown--> Terminated
//! ```
//!
//! Success and invalid-credential answers are never retried: only a failure
//! to reach the endpoint leaves the credential unevaluated. An authenticator
//! that panics ends the task with a `ConnectionError` outcome and the worker
//! moves on.
//!
//! Outcomes are added to the shared [`Tally`] before they are reported, so
//! results survive a worker that dies later in the run.
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use crossbeam_channel::Receiver;
use log::{debug, error, warn};

use crate::auth::{AttemptResult, Authenticator};
use crate::credential::{CredentialPair, Task};
use crate::engine::EngineConfig;
use crate::pacing::Sleeper;
use crate::report::{Event, Outcome, OutcomeKind, Reporter};

/// Running totals across all workers of a run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WorkerStats {
    pub processed: usize,
    pub successes: Vec<CredentialPair>,
    pub invalid: usize,
    pub connection_errors: usize,
    pub retries: usize,
}

impl WorkerStats {
    fn record(&mut self, outcome: &Outcome) {
        self.processed += 1;
        self.retries += outcome.attempts.saturating_sub(1) as usize;
        match outcome.kind {
            OutcomeKind::Success => self.successes.push(outcome.pair.clone()),
            OutcomeKind::InvalidCredential => self.invalid += 1,
            OutcomeKind::ConnectionError => self.connection_errors += 1,
        }
    }
}

/// Shared by the engine and every worker; written once per outcome.
#[derive(Debug, Default, Clone)]
pub struct Tally(Arc<Mutex<WorkerStats>>);

impl Tally {
    fn record(&self, outcome: &Outcome) {
        // record() cannot panic, so a poisoned lock still holds consistent totals.
        let mut stats = self.0.lock().unwrap_or_else(|e| e.into_inner());
        stats.record(outcome);
    }

    pub fn snapshot(&self) -> WorkerStats {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// One in-flight credential and what is left of its retry budget.
#[derive(Debug)]
struct Job {
    pair: CredentialPair,
    attempts: u32,
    retries_left: u32,
}

#[derive(Debug)]
enum State {
    Idle,
    Authenticating(Job),
    Retrying(Job, String),
    Terminated,
}

pub struct Worker<A> {
    id: usize,
    authenticator: A,
    config: Arc<EngineConfig>,
    reporter: Arc<dyn Reporter>,
    sleeper: Arc<dyn Sleeper>,
    tally: Tally,
}

impl<A: Authenticator> Worker<A> {
    pub fn new(
        id: usize,
        authenticator: A,
        config: Arc<EngineConfig>,
        reporter: Arc<dyn Reporter>,
        sleeper: Arc<dyn Sleeper>,
        tally: Tally,
    ) -> Self {
        Self {
            id,
            authenticator,
            config,
            reporter,
            sleeper,
            tally,
        }
    }

    /// Process tasks until a shutdown marker arrives or the queue closes.
    /// Returns the number of tasks this worker finished.
    pub fn run(mut self, queue: Receiver<Task>) -> usize {
        let mut processed = 0;
        let mut state = State::Idle;
        debug!("worker {} started", self.id);
        loop {
            state = match state {
                State::Idle => match queue.recv() {
                    Ok(Task::Work(pair)) => State::Authenticating(Job {
                        pair,
                        attempts: 0,
                        retries_left: self.config.max_retries,
                    }),
                    // A closed queue means the producer is gone; nothing more will come.
                    Ok(Task::Shutdown) | Err(_) => State::Terminated,
                },
                State::Authenticating(mut job) => {
                    job.attempts += 1;
                    let authenticator = &mut self.authenticator;
                    let pair = &job.pair;
                    let result =
                        panic::catch_unwind(AssertUnwindSafe(|| authenticator.attempt(pair)));
                    match result {
                        Ok(AttemptResult::Success) => {
                            processed += 1;
                            self.finish(job, OutcomeKind::Success, None)
                        }
                        Ok(AttemptResult::InvalidCredential(detail)) => {
                            processed += 1;
                            self.finish(job, OutcomeKind::InvalidCredential, Some(detail))
                        }
                        Ok(AttemptResult::ConnectionError(detail)) => State::Retrying(job, detail),
                        Err(_) => {
                            error!(
                                "{} -- authenticator panicked; giving up on this pair",
                                job.pair.reference_id
                            );
                            processed += 1;
                            self.finish(
                                job,
                                OutcomeKind::ConnectionError,
                                Some("authenticator panicked".to_string()),
                            )
                        }
                    }
                }
                State::Retrying(mut job, detail) => {
                    if job.retries_left == 0 {
                        processed += 1;
                        self.finish(job, OutcomeKind::ConnectionError, Some(detail))
                    } else {
                        job.retries_left -= 1;
                        warn!(
                            "{} -- error connecting: {} (trying {} more time(s))",
                            job.pair.reference_id,
                            detail,
                            job.retries_left + 1
                        );
                        self.sleeper.sleep(self.config.retry_backoff);
                        State::Authenticating(job)
                    }
                }
                State::Terminated => break,
            };
        }
        self.reporter
            .report(&Event::WorkerStopped { worker: self.id });
        debug!("worker {} terminated after {} task(s)", self.id, processed);
        processed
    }

    fn finish(&self, job: Job, kind: OutcomeKind, detail: Option<String>) -> State {
        let outcome = Outcome {
            pair: job.pair,
            kind,
            attempts: job.attempts,
            detail,
        };
        self.tally.record(&outcome);
        self.reporter.report(&Event::Outcome(outcome));
        State::Idle
    }
}
