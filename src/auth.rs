//! The authentication capability the workers drive.
//!
//! Implementations open a fresh connection per attempt and release it before
//! returning. Each worker receives its own clone, so an implementation never
//! has to coordinate between workers.
use crate::credential::CredentialPair;

/// Result of a single attempt against the endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptResult {
    Success,
    /// The endpoint answered and rejected the bind.
    InvalidCredential(String),
    /// The endpoint could not be reached; the credential was not evaluated.
    ConnectionError(String),
}

pub trait Authenticator: Send {
    fn attempt(&mut self, pair: &CredentialPair) -> AttemptResult;
}

impl<F> Authenticator for F
where
    F: FnMut(&CredentialPair) -> AttemptResult + Send,
{
    fn attempt(&mut self, pair: &CredentialPair) -> AttemptResult {
        self(pair)
    }
}
