use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ldapspray::engine::{Engine, EngineConfig, EngineError};
use ldapspray::notify::{Notice, Notifier, NotifyError};
use ldapspray::pacing::Sleeper;
use ldapspray::prelude::*;
use ldapspray::report::LogReporter;
use ldapspray::source::Mode;

#[derive(Default)]
struct Collector {
    events: Mutex<Vec<Event>>,
}

impl Reporter for Collector {
    fn report(&self, event: &Event) {
        self.events.lock().unwrap().push(event.clone());
    }
}

impl Collector {
    fn outcomes(&self) -> Vec<Outcome> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                Event::Outcome(o) => Some(o.clone()),
                _ => None,
            })
            .collect()
    }

    fn by_reference(&self) -> HashMap<String, Outcome> {
        self.outcomes()
            .into_iter()
            .map(|o| (o.pair.reference_id.clone(), o))
            .collect()
    }

    fn stopped_workers(&self) -> Vec<usize> {
        let mut ids: Vec<usize> = self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                Event::WorkerStopped { worker } => Some(*worker),
                _ => None,
            })
            .collect();
        ids.sort();
        ids
    }
}

#[derive(Default)]
struct NapLog {
    naps: Mutex<Vec<Duration>>,
}

impl Sleeper for NapLog {
    fn sleep(&self, duration: Duration) {
        self.naps.lock().unwrap().push(duration);
    }
}

#[derive(Clone, Default)]
struct NoticeLog {
    notices: Arc<Mutex<Vec<Notice>>>,
}

impl Notifier for NoticeLog {
    fn notify(&self, notice: &Notice) -> Result<(), NotifyError> {
        self.notices.lock().unwrap().push(notice.clone());
        Ok(())
    }
}

fn strings(v: &[&str]) -> Vec<String> {
    v.iter().map(|s| s.to_string()).collect()
}

fn engine(config: EngineConfig) -> (Engine, Arc<NapLog>) {
    let naps = Arc::new(NapLog::default());
    (Engine::with_sleeper(config, naps.clone()), naps)
}

#[test]
fn alice_and_bob_single_round() {
    let calls = Arc::new(AtomicUsize::new(0));
    let c = calls.clone();
    let auth = move |pair: &CredentialPair| {
        c.fetch_add(1, Ordering::SeqCst);
        if pair.account == "bob" && pair.password == "Winter2024" {
            AttemptResult::Success
        } else {
            AttemptResult::InvalidCredential("invalid credentials".to_string())
        }
    };
    let reporter = Arc::new(Collector::default());
    let (engine, naps) = engine(EngineConfig::default());
    let summary = engine
        .run(
            CredentialSource::spray(strings(&["alice", "bob"]), strings(&["Winter2024"])),
            auth,
            reporter.clone(),
        )
        .unwrap();

    let outcomes = reporter.by_reference();
    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes["0-0"].kind, OutcomeKind::InvalidCredential);
    assert_eq!(outcomes["0-0"].pair.account, "alice");
    assert_eq!(outcomes["0-1"].kind, OutcomeKind::Success);
    assert_eq!(outcomes["0-1"].pair.account, "bob");
    assert!(outcomes.values().all(|o| o.attempts == 1));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(naps.naps.lock().unwrap().is_empty());

    let successes: Vec<&Outcome> = outcomes
        .values()
        .filter(|o| o.kind == OutcomeKind::Success)
        .collect();
    assert_eq!(successes.len(), 1);
    assert_eq!(summary.successes.len(), 1);
    assert_eq!(summary.retries, 0);

    let rounds: Vec<Event> = reporter
        .events
        .lock()
        .unwrap()
        .iter()
        .filter(|e| matches!(e, Event::RoundStarted(_)))
        .cloned()
        .collect();
    assert_eq!(rounds.len(), 1);
}

#[test]
fn unreachable_pair_is_tried_four_times_with_three_backoffs() {
    let calls = Arc::new(AtomicUsize::new(0));
    let c = calls.clone();
    let auth = move |_: &CredentialPair| {
        c.fetch_add(1, Ordering::SeqCst);
        AttemptResult::ConnectionError("connection refused".to_string())
    };
    let reporter = Arc::new(Collector::default());
    let (engine, naps) = engine(EngineConfig {
        worker_count: 1,
        max_retries: 3,
        ..EngineConfig::default()
    });
    let summary = engine
        .run(
            CredentialSource::validation(strings(&["carol:Summer2023"])),
            auth,
            reporter.clone(),
        )
        .unwrap();

    let outcomes = reporter.outcomes();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].kind, OutcomeKind::ConnectionError);
    assert_eq!(outcomes[0].attempts, 4);
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    let backoffs = naps
        .naps
        .lock()
        .unwrap()
        .iter()
        .filter(|d| **d == Duration::from_millis(100))
        .count();
    assert_eq!(backoffs, 3);
    assert_eq!(summary.connection_errors, 1);
    assert_eq!(summary.retries, 3);
}

#[test]
fn three_workers_ten_lines_all_terminate() {
    let reporter = Arc::new(Collector::default());
    let (engine, _) = engine(EngineConfig {
        worker_count: 3,
        queue_capacity: 3,
        ..EngineConfig::default()
    });
    let lines: Vec<String> = (0..10).map(|i| format!("user{}:Pass{}!", i, i)).collect();
    let summary = engine
        .run(
            CredentialSource::validation(lines),
            |_: &CredentialPair| AttemptResult::Success,
            reporter.clone(),
        )
        .unwrap();

    assert_eq!(summary.submitted, 10);
    assert_eq!(summary.shutdown_markers, 3);
    assert_eq!(summary.workers_joined, 3);
    assert_eq!(summary.worker_panics, 0);
    assert_eq!(reporter.stopped_workers(), vec![0, 1, 2]);

    let mut ids: Vec<usize> = reporter
        .outcomes()
        .iter()
        .map(|o| o.pair.reference_id.parse().unwrap())
        .collect();
    ids.sort();
    assert_eq!(ids, (0..10).collect::<Vec<_>>());
}

#[test]
fn every_submitted_pair_yields_exactly_one_outcome() {
    let reporter = Arc::new(Collector::default());
    let (engine, _) = engine(EngineConfig {
        worker_count: 4,
        queue_capacity: 1,
        ..EngineConfig::default()
    });
    let accounts: Vec<String> = (0..9).map(|j| format!("acct{}", j)).collect();
    let passwords: Vec<String> = (0..6).map(|i| format!("Guess{}", i)).collect();
    // Mix of results, including transient failures on every third call.
    let calls = Arc::new(AtomicUsize::new(0));
    let c = calls.clone();
    let auth = move |pair: &CredentialPair| {
        let n = c.fetch_add(1, Ordering::SeqCst);
        if n % 3 == 0 {
            AttemptResult::ConnectionError("timeout".to_string())
        } else if pair.account == "acct4" {
            AttemptResult::Success
        } else {
            AttemptResult::InvalidCredential("49".to_string())
        }
    };
    let summary = engine
        .run(CredentialSource::spray(accounts, passwords), auth, reporter.clone())
        .unwrap();

    let mut submitted: Vec<String> = Vec::new();
    for i in 0..6 {
        for j in 0..9 {
            submitted.push(format!("{}-{}", i, j));
        }
    }
    submitted.sort();
    let mut reported: Vec<String> = reporter
        .outcomes()
        .into_iter()
        .map(|o| o.pair.reference_id)
        .collect();
    reported.sort();
    assert_eq!(reported, submitted);
    assert_eq!(summary.submitted, 54);
    assert_eq!(summary.completed(), 54);
    assert_eq!(summary.rounds, 6);
    assert!(reporter.outcomes().iter().all(|o| o.attempts <= 4));
}

#[test]
fn malformed_line_stops_feeding_but_drains_workers() {
    let reporter = Arc::new(Collector::default());
    let (engine, _) = engine(EngineConfig {
        worker_count: 2,
        ..EngineConfig::default()
    });
    let err = engine
        .run(
            CredentialSource::validation(strings(&["a:1", "b:2", "oops", "d:4"])),
            |_: &CredentialPair| AttemptResult::InvalidCredential("49".to_string()),
            reporter.clone(),
        )
        .unwrap_err();

    match err {
        EngineError::Source { submitted, .. } => assert_eq!(submitted, 2),
        other => panic!("unexpected error: {other}"),
    }
    let ids: Vec<String> = {
        let mut v: Vec<String> = reporter
            .outcomes()
            .into_iter()
            .map(|o| o.pair.reference_id)
            .collect();
        v.sort();
        v
    };
    assert_eq!(ids, vec!["0", "1"]);
    assert_eq!(reporter.stopped_workers(), vec![0, 1]);
}

#[test]
fn alice_and_bob_fire_one_success_notification() {
    let auth = |pair: &CredentialPair| {
        if pair.account == "bob" && pair.password == "Winter2024" {
            AttemptResult::Success
        } else {
            AttemptResult::InvalidCredential("invalid credentials".to_string())
        }
    };
    let log = NoticeLog::default();
    let reporter = LogReporter::new(false).with_notifier(Box::new(log.clone()));
    let (engine, _) = engine(EngineConfig::default());
    engine
        .run(
            CredentialSource::spray(strings(&["alice", "bob"]), strings(&["Winter2024"])),
            auth,
            Arc::new(reporter),
        )
        .unwrap();

    let notices = log.notices.lock().unwrap();
    let found: Vec<&Notice> = notices
        .iter()
        .filter(|n| matches!(n, Notice::ValidCredential { .. }))
        .collect();
    assert_eq!(
        found,
        vec![&Notice::ValidCredential {
            reference_id: "0-1".to_string(),
            account: "bob".to_string(),
        }]
    );
    let rounds = notices
        .iter()
        .filter(|n| matches!(n, Notice::RoundStarted(_)))
        .count();
    assert_eq!(rounds, 1);
    assert_eq!(notices.len(), 2);
}

#[test]
fn panicking_authenticator_does_not_hang_the_run() {
    let reporter = Arc::new(Collector::default());
    let (engine, _) = engine(EngineConfig {
        worker_count: 2,
        queue_capacity: 0,
        ..EngineConfig::default()
    });
    let auth = |pair: &CredentialPair| {
        if pair.account == "boom" {
            panic!("authenticator blew up");
        }
        AttemptResult::Success
    };
    let summary = engine
        .run(
            CredentialSource::validation(strings(&["a:1", "boom:2", "c:3"])),
            auth,
            reporter.clone(),
        )
        .unwrap();
    assert_eq!(summary.workers_joined, 2);
    assert_eq!(summary.worker_panics, 0);
    assert_eq!(summary.successes.len(), 2);
    assert_eq!(summary.connection_errors, 1);
    let outcomes = reporter.by_reference();
    let boom = &outcomes["1"];
    assert_eq!(boom.kind, OutcomeKind::ConnectionError);
    assert_eq!(boom.detail.as_deref(), Some("authenticator panicked"));
    assert_eq!(reporter.stopped_workers(), vec![0, 1]);
}

/// Panics while reporting the outcome for account "boom".
struct Tripwire;

impl Reporter for Tripwire {
    fn report(&self, event: &Event) {
        if let Event::Outcome(o) = event {
            if o.pair.account == "boom" {
                panic!("reporter blew up");
            }
        }
    }
}

#[test]
fn results_found_before_a_worker_dies_stay_in_the_summary() {
    let (engine, _) = engine(EngineConfig {
        worker_count: 2,
        ..EngineConfig::default()
    });
    let summary = engine
        .run(
            CredentialSource::validation(strings(&["a:1", "boom:2", "c:3", "d:4"])),
            |_: &CredentialPair| AttemptResult::Success,
            Arc::new(Tripwire),
        )
        .unwrap();
    assert_eq!(summary.workers_joined, 2);
    assert_eq!(summary.worker_panics, 1);
    let mut accounts: Vec<String> = summary.successes.iter().map(|p| p.account.clone()).collect();
    accounts.sort();
    assert_eq!(accounts, strings(&["a", "boom", "c", "d"]));
}

#[test]
fn round_events_carry_spray_indexes() {
    let reporter = Arc::new(Collector::default());
    let (engine, naps) = engine(EngineConfig::default());
    engine
        .run(
            CredentialSource::spray(strings(&["a"]), strings(&["p0", "p1"])),
            |_: &CredentialPair| AttemptResult::InvalidCredential("49".to_string()),
            reporter.clone(),
        )
        .unwrap();
    let rounds: Vec<(usize, Mode)> = reporter
        .events
        .lock()
        .unwrap()
        .iter()
        .filter_map(|e| match e {
            Event::RoundStarted(r) => Some((r.index, r.mode)),
            _ => None,
        })
        .collect();
    assert_eq!(rounds, vec![(0, Mode::Spray), (1, Mode::Spray)]);
    assert_eq!(*naps.naps.lock().unwrap(), vec![Duration::from_secs(10)]);
}
