pub mod auth;
pub mod credential;
pub mod engine;
pub mod export;
pub mod ldap;
pub mod logging;
pub mod notify;
pub mod pacing;
pub mod report;
pub mod source;
pub mod wordlist;
pub mod worker;

pub mod prelude {
    pub use crate::auth::{AttemptResult, Authenticator};
    pub use crate::credential::{CredentialPair, Task};
    pub use crate::engine::{Engine, EngineConfig, EngineError, RunSummary};
    pub use crate::report::{Event, Outcome, OutcomeKind, Reporter};
    pub use crate::source::CredentialSource;
}
