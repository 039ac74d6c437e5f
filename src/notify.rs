//! Outbound alerts for round starts and valid credentials.
//!
//! The webhook notifier posts a small JSON document to a configured URL (chat
//! incoming-webhooks, a mail relay, ...). Passwords are never included.
//!
//! Wrap a slow notifier in a [`BackgroundNotifier`] so that workers and the
//! feeder only enqueue notices and never wait on the network.
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::Sender;
use log::{debug, warn};
use serde::Serialize;

use crate::source::{Mode, Round};

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("webhook request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("webhook answered with status {0}")]
    Rejected(u16),
    #[error("notifier thread is no longer running")]
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    RoundStarted(Round),
    ValidCredential {
        reference_id: String,
        account: String,
    },
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct Payload {
    pub subject: String,
    pub body: String,
}

impl Notice {
    pub fn payload(&self) -> Payload {
        match self {
            Self::RoundStarted(Round {
                mode: Mode::Spray,
                index,
            }) => Payload {
                subject: "New Round!".to_string(),
                body: format!("Password round {} starting.", index + 1),
            },
            Self::RoundStarted(Round {
                mode: Mode::Validation,
                ..
            }) => Payload {
                subject: "Credential Validation Starting".to_string(),
                body: "Validation run starting.".to_string(),
            },
            Self::ValidCredential {
                reference_id,
                account,
            } => Payload {
                subject: "Valid credential found".to_string(),
                body: format!("{} -- {}", reference_id, account),
            },
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notice: &Notice) -> Result<(), NotifyError>;
}

pub struct WebhookNotifier {
    client: reqwest::blocking::Client,
    url: url::Url,
}

impl WebhookNotifier {
    pub const TIMEOUT: Duration = Duration::from_secs(10);
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

    pub fn new(url: url::Url) -> Result<Self, NotifyError> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(Self::CONNECT_TIMEOUT)
            .timeout(Self::TIMEOUT)
            .build()?;
        Ok(Self { client, url })
    }
}

impl Notifier for WebhookNotifier {
    fn notify(&self, notice: &Notice) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(self.url.clone())
            .json(&notice.payload())
            .send()?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(NotifyError::Rejected(status.as_u16()))
        }
    }
}

/// Hands notices to a dedicated thread that delivers them in order.
///
/// Delivery failures are logged there. Dropping the notifier closes the
/// queue and waits for the notices already accepted to go out.
pub struct BackgroundNotifier {
    queue: Option<Sender<Notice>>,
    handle: Option<JoinHandle<()>>,
}

impl BackgroundNotifier {
    pub fn spawn(inner: Box<dyn Notifier>) -> std::io::Result<Self> {
        let (tx, rx) = crossbeam_channel::unbounded::<Notice>();
        let handle = thread::Builder::new()
            .name("notifier".to_string())
            .spawn(move || {
                for notice in rx {
                    if let Err(e) = inner.notify(&notice) {
                        warn!("notification failed: {}", e);
                    }
                }
                debug!("notifier drained");
            })?;
        Ok(Self {
            queue: Some(tx),
            handle: Some(handle),
        })
    }
}

impl Notifier for BackgroundNotifier {
    fn notify(&self, notice: &Notice) -> Result<(), NotifyError> {
        let queue = self.queue.as_ref().ok_or(NotifyError::Closed)?;
        queue.send(notice.clone()).map_err(|_| NotifyError::Closed)
    }
}

impl Drop for BackgroundNotifier {
    fn drop(&mut self) {
        drop(self.queue.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("notifier thread panicked; pending notices were lost");
            }
        }
    }
}
