//! Outcome events and the reporters that consume them.
//!
//! Workers and the engine hand every [`Event`] to a shared [`Reporter`]. The
//! stock [`LogReporter`] writes one result line per outcome through the `log`
//! facade and forwards round starts and successes to an optional
//! [`Notifier`]. [`render_summary`] formats the end-of-run totals for the
//! terminal.
use colored::*;
use log::{debug, info, warn};

use crate::credential::CredentialPair;
use crate::engine::RunSummary;
use crate::notify::{Notice, Notifier};
use crate::source::{Mode, Round};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeKind {
    Success,
    InvalidCredential,
    ConnectionError,
}

impl OutcomeKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::InvalidCredential => "Failed",
            // Never evaluated; the reporter adds a line saying so.
            Self::ConnectionError => "Failed",
        }
    }
}

/// Final result for one submitted pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub pair: CredentialPair,
    pub kind: OutcomeKind,
    pub attempts: u32,
    /// Last error text from the authenticator, if any.
    pub detail: Option<String>,
}

impl Outcome {
    pub fn reference_id(&self) -> &str {
        &self.pair.reference_id
    }

    pub fn log_line(&self) -> String {
        format!("{}::{}", self.pair, self.kind.label())
    }

    /// Marks a `Failed` line whose credential never reached the directory.
    pub fn unreached_line(&self) -> String {
        let mut line = format!(
            "{} -- not evaluated: no connection after {} attempt(s)",
            self.reference_id(),
            self.attempts
        );
        if let Some(detail) = &self.detail {
            line.push_str(" (");
            line.push_str(detail);
            line.push(')');
        }
        line
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    RoundStarted(Round),
    Outcome(Outcome),
    WorkerStopped { worker: usize },
}

/// Sink for run events. Called concurrently from every worker.
pub trait Reporter: Send + Sync {
    fn report(&self, event: &Event);
}

pub struct LogReporter {
    verbose_errors: bool,
    notifier: Option<Box<dyn Notifier>>,
}

impl LogReporter {
    pub fn new(verbose_errors: bool) -> Self {
        Self {
            verbose_errors,
            notifier: None,
        }
    }

    pub fn with_notifier(mut self, notifier: Box<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    fn send(&self, notice: Notice) {
        let Some(notifier) = &self.notifier else {
            return;
        };
        // A missed alert never affects the run.
        if let Err(e) = notifier.notify(&notice) {
            warn!("notification failed: {}", e);
        }
    }
}

impl Reporter for LogReporter {
    fn report(&self, event: &Event) {
        match event {
            Event::RoundStarted(round) => {
                match round.mode {
                    Mode::Spray => info!("***************** NEW ROUND ({})", round.index + 1),
                    Mode::Validation => info!("***************** VALIDATION STARTING"),
                }
                self.send(Notice::RoundStarted(*round));
            }
            Event::Outcome(outcome) => {
                info!("{}", outcome.log_line());
                if outcome.kind == OutcomeKind::ConnectionError {
                    warn!("{}", outcome.unreached_line());
                } else if self.verbose_errors {
                    if let Some(detail) = &outcome.detail {
                        warn!("{} -- {}", outcome.reference_id(), detail);
                    }
                }
                if outcome.kind == OutcomeKind::Success {
                    self.send(Notice::ValidCredential {
                        reference_id: outcome.pair.reference_id.clone(),
                        account: outcome.pair.account.clone(),
                    });
                }
            }
            Event::WorkerStopped { worker } => debug!("worker {} stopped", worker),
        }
    }
}

/// One summary line. `plain` sets the section width, `styled` is printed.
struct Line {
    plain: String,
    styled: String,
}

impl Line {
    fn plain(text: String) -> Self {
        Self {
            styled: text.clone(),
            plain: text,
        }
    }

    fn painted(text: String, color: Color) -> Self {
        Self {
            styled: text.color(color).to_string(),
            plain: text,
        }
    }
}

fn push_section(out: &mut String, title: &str, color: Color, lines: &[Line]) {
    let width = lines
        .iter()
        .map(|l| l.plain.chars().count())
        .fold(title.chars().count(), usize::max);
    out.push('\n');
    out.push_str(&title.bold().color(color).to_string());
    out.push('\n');
    out.push_str(&"─".repeat(width));
    out.push_str("\n\n");
    for line in lines {
        out.push_str(&line.styled);
        out.push('\n');
    }
}

pub fn render_summary(summary: &RunSummary) -> String {
    let mut totals = vec![
        Line::plain(format!("Rounds started: {}", summary.rounds)),
        Line::plain(format!("Pairs submitted: {}", summary.submitted)),
        Line::plain(format!("Valid: {}", summary.successes.len())),
        Line::plain(format!("Rejected: {}", summary.invalid)),
        Line::plain(format!("Unreachable: {}", summary.connection_errors)),
        Line::plain(format!("Retries: {}", summary.retries)),
        Line::plain(format!(
            "Workers stopped: {}/{}",
            summary.workers_joined, summary.shutdown_markers
        )),
    ];
    if summary.worker_panics > 0 {
        totals.push(Line::painted(
            format!("Workers panicked: {}", summary.worker_panics),
            Color::Red,
        ));
    }
    totals.push(Line::plain(format!("Elapsed: {:.1?}", summary.elapsed)));

    let mut found = summary.successes.clone();
    found.sort_by(|a, b| a.account.cmp(&b.account));
    let credentials: Vec<Line> = if found.is_empty() {
        vec![Line::plain("(No valid credentials found)".to_string())]
    } else {
        found
            .iter()
            .map(|pair| Line {
                plain: format!("  {}: {} ({})", pair.account, pair.password, pair.reference_id),
                styled: format!(
                    "  {}: {} ({})",
                    pair.account,
                    pair.password.red(),
                    pair.reference_id
                ),
            })
            .collect()
    };

    let mut out = String::new();
    push_section(&mut out, "Run Summary", Color::Yellow, &totals);
    push_section(&mut out, "Valid Credentials", Color::Cyan, &credentials);
    out
}
