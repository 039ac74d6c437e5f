//! Engine: drives a [`CredentialSource`] through a bounded queue into a fixed
//! pool of worker threads, pacing rounds and items, and tears the pool down
//! with one shutdown marker per worker.
//!
//! Typical usage:
//!
//! ```no_run
//! use std::sync::Arc;
//! use ldapspray::engine::{Engine, EngineConfig};
//! use ldapspray::ldap::LdapAuthenticator;
//! use ldapspray::report::LogReporter;
//! use ldapspray::source::CredentialSource;
//! # fn main() -> anyhow::Result<()> {
//! let source = CredentialSource::spray_from_files("accounts.list", "passwords.list", u64::MAX)?;
//! let auth = LdapAuthenticator::builder("ldaps://dc01.corp.example").build()?;
//! let summary = Engine::new(EngineConfig::default()).run(source, auth, Arc::new(LogReporter::new(false)))?;
//! println!("{}", ldapspray::report::render_summary(&summary));
//! # Ok(())
//! # }
//! ```
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Sender, bounded};
use log::{debug, error, info};

use crate::auth::Authenticator;
use crate::credential::{CredentialPair, Task};
use crate::pacing::{Sleeper, ThreadSleeper};
use crate::report::{Event, Reporter};
use crate::source::{CredentialSource, Emission, Mode, SourceError};
use crate::worker::{Tally, Worker, WorkerStats};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid engine configuration: {0}")]
    Config(String),
    #[error("failed to spawn worker {worker}: {source}")]
    Spawn {
        worker: usize,
        #[source]
        source: std::io::Error,
    },
    #[error("credential enumeration failed after {submitted} pair(s): {source}")]
    Source {
        submitted: usize,
        #[source]
        source: SourceError,
    },
    #[error("all workers exited before the queue was drained")]
    WorkersGone,
}

/// Immutable run parameters shared by the engine and every worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub worker_count: usize,
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub inter_round_pause: Duration,
    pub inter_item_pause: Duration,
    pub queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_count: 2,
            max_retries: 3,
            retry_backoff: Duration::from_millis(100),
            inter_round_pause: Duration::from_secs(10),
            inter_item_pause: Duration::from_millis(10),
            queue_capacity: 2,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.worker_count == 0 {
            return Err(EngineError::Config(
                "worker count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Totals for a finished run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub rounds: usize,
    pub submitted: usize,
    pub successes: Vec<CredentialPair>,
    pub invalid: usize,
    pub connection_errors: usize,
    pub retries: usize,
    pub shutdown_markers: usize,
    pub workers_joined: usize,
    pub worker_panics: usize,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn completed(&self) -> usize {
        self.successes.len() + self.invalid + self.connection_errors
    }

    fn absorb(&mut self, stats: WorkerStats) {
        self.successes.extend(stats.successes);
        self.invalid += stats.invalid;
        self.connection_errors += stats.connection_errors;
        self.retries += stats.retries;
    }
}

pub struct Engine {
    config: Arc<EngineConfig>,
    sleeper: Arc<dyn Sleeper>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_sleeper(config, Arc::new(ThreadSleeper))
    }

    /// Build an engine whose pacing and backoff pauses go through `sleeper`.
    pub fn with_sleeper(config: EngineConfig, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            config: Arc::new(config),
            sleeper,
        }
    }

    /// Run every pair from `source` through the worker pool. Returns once all
    /// workers have terminated, including when enumeration fails part way.
    pub fn run<A>(
        &self,
        source: CredentialSource,
        authenticator: A,
        reporter: Arc<dyn Reporter>,
    ) -> Result<RunSummary, EngineError>
    where
        A: Authenticator + Clone + 'static,
    {
        self.config.validate()?;
        let started = Instant::now();
        let (tx, rx) = bounded::<Task>(self.config.queue_capacity);

        let tally = Tally::default();
        let mut handles: Vec<JoinHandle<usize>> = Vec::with_capacity(self.config.worker_count);
        let mut spawn_error = None;
        for id in 0..self.config.worker_count {
            let worker = Worker::new(
                id,
                authenticator.clone(),
                self.config.clone(),
                reporter.clone(),
                self.sleeper.clone(),
                tally.clone(),
            );
            let queue = rx.clone();
            match thread::Builder::new()
                .name(format!("worker-{}", id))
                .spawn(move || worker.run(queue))
            {
                Ok(handle) => handles.push(handle),
                Err(source) => {
                    spawn_error = Some(EngineError::Spawn { worker: id, source });
                    break;
                }
            }
        }
        // Workers hold the only receivers, so a dead pool shows up as a send error.
        drop(rx);

        let mut summary = RunSummary::default();
        let fed = match spawn_error {
            Some(e) => Err(e),
            None => self.feed(source, &tx, reporter.as_ref(), &mut summary),
        };

        info!("Approaching end of test space...");
        summary.shutdown_markers = self.shut_down(&tx, handles.len());
        drop(tx);

        info!("Wrapping up.");
        for handle in handles {
            summary.workers_joined += 1;
            if handle.join().is_err() {
                summary.worker_panics += 1;
                error!("a worker panicked outside an authentication attempt");
            }
        }
        // Outcomes recorded before a panic are still in the tally.
        summary.absorb(tally.snapshot());
        summary.elapsed = started.elapsed();
        fed?;
        info!("Done.");
        Ok(summary)
    }

    /// Enqueue work in source order, pausing between rounds (spray) or items
    /// (validation). Blocks whenever the queue is full.
    fn feed(
        &self,
        source: CredentialSource,
        tx: &Sender<Task>,
        reporter: &dyn Reporter,
        summary: &mut RunSummary,
    ) -> Result<(), EngineError> {
        let mode = source.mode();
        for emission in source.enumerate() {
            let emission = emission.map_err(|source| EngineError::Source {
                submitted: summary.submitted,
                source,
            })?;
            match emission {
                Emission::RoundStart(round) => {
                    if summary.rounds > 0 {
                        self.sleeper.sleep(self.config.inter_round_pause);
                    }
                    summary.rounds += 1;
                    reporter.report(&Event::RoundStarted(round));
                }
                Emission::Pair(pair) => {
                    if mode == Mode::Validation && summary.submitted > 0 {
                        self.sleeper.sleep(self.config.inter_item_pause);
                    }
                    tx.send(Task::Work(pair))
                        .map_err(|_| EngineError::WorkersGone)?;
                    summary.submitted += 1;
                }
            }
        }
        Ok(())
    }

    /// Enqueue one shutdown marker per started worker. Stops early only if no
    /// worker is left to receive them.
    fn shut_down(&self, tx: &Sender<Task>, workers: usize) -> usize {
        let mut sent = 0;
        for _ in 0..workers {
            if tx.send(Task::Shutdown).is_err() {
                debug!("queue closed after {} shutdown marker(s)", sent);
                break;
            }
            sent += 1;
        }
        sent
    }
}
