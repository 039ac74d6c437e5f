//! Credential data model shared by the source, the engine and the workers.
//!
//! A [`CredentialPair`] is created once at enumeration time and consumed by
//! exactly one worker. Its `reference_id` only correlates log output; it is
//! never used for equality or ordering decisions.
//!
//! Use [`parse_validation_line`] to turn an `account:password` line into a
//! pair, and [`Task`] to wrap pairs (or the shutdown marker) for the queue.
use std::fmt;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CredentialError {
    #[error("malformed credential line {index}: missing ':' separator")]
    MissingSeparator { index: usize },
}

/// One account/password combination to test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialPair {
    pub reference_id: String,
    pub account: String,
    pub password: String,
}

impl CredentialPair {
    /// Pair produced in spray mode: password round `round`, account `slot`.
    pub fn spray(round: usize, slot: usize, account: &str, password: &str) -> Self {
        Self {
            reference_id: format!("{}-{}", round, slot),
            account: account.to_string(),
            password: password.to_string(),
        }
    }

    /// Pair produced in validation mode from the zero-based line `index`.
    pub fn validation(index: usize, account: &str, password: &str) -> Self {
        Self {
            reference_id: index.to_string(),
            account: account.to_string(),
            password: password.to_string(),
        }
    }
}

impl fmt::Display for CredentialPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -- {}::{}",
            self.reference_id, self.account, self.password
        )
    }
}

/// Queue element. The shutdown marker tells exactly one worker to exit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    Work(CredentialPair),
    Shutdown,
}

pub fn parse_validation_line(index: usize, line: &str) -> Result<CredentialPair, CredentialError> {
    // account:password, only the first ':' splits so passwords may hold colons
    match line.split_once(':') {
        Some((account, password)) => Ok(CredentialPair::validation(index, account, password)),
        None => Err(CredentialError::MissingSeparator { index }),
    }
}
