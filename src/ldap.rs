//! LDAP simple-bind authenticator.
//!
//! Every attempt dials the endpoint, binds once with the pair under test and
//! unbinds. Directory servers may reset connections between binds, so nothing
//! is pooled.
//!
//! Classification:
//! - the connection (TCP/TLS) cannot be established: `ConnectionError`;
//! - bind result code 0: `Success`;
//! - anything else once connected: `InvalidCredential`. A failed bind is never
//!   repeated, since each bind may count against the lockout threshold.
//!
//! An empty password is rejected without dialing: directories treat it as an
//! unauthenticated bind and answer rc=0, which is not a valid credential.
use std::path::{Path, PathBuf};
use std::time::Duration;

use ldap3::{LdapConn, LdapConnSettings};
use native_tls::{Certificate, TlsConnector};

use crate::auth::{AttemptResult, Authenticator};
use crate::credential::CredentialPair;

#[derive(Debug, thiserror::Error)]
pub enum LdapSetupError {
    #[error("invalid endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
    #[error("failed to read certificate {}: {source}", .path.display())]
    CertificateRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse certificate {}: {source}", .path.display())]
    Certificate {
        path: PathBuf,
        #[source]
        source: native_tls::Error,
    },
    #[error("failed to build TLS connector: {0}")]
    Tls(#[from] native_tls::Error),
}

/// Result code the directory returns for a rejected password.
pub const RC_INVALID_CREDENTIALS: u32 = 49;

/// Accept `ldaps://host[:port]`, `ldap://host[:port]` or a bare host name,
/// which is taken as `ldaps://host`.
pub fn normalize_endpoint(raw: &str) -> Result<url::Url, LdapSetupError> {
    let raw = raw.trim();
    let invalid = |reason: &str| LdapSetupError::InvalidEndpoint {
        endpoint: raw.to_string(),
        reason: reason.to_string(),
    };
    if raw.is_empty() {
        return Err(invalid("empty"));
    }
    let candidate = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("ldaps://{}", raw)
    };
    let url = url::Url::parse(&candidate).map_err(|e| invalid(&e.to_string()))?;
    match url.scheme() {
        "ldap" | "ldaps" => {}
        other => return Err(invalid(&format!("unsupported scheme {:?}", other))),
    }
    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(url),
        _ => Err(invalid("missing host")),
    }
}

fn load_connector(path: &Path) -> Result<TlsConnector, LdapSetupError> {
    let pem = std::fs::read(path).map_err(|source| LdapSetupError::CertificateRead {
        path: path.to_path_buf(),
        source,
    })?;
    let cert = Certificate::from_pem(&pem).map_err(|source| LdapSetupError::Certificate {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(TlsConnector::builder().add_root_certificate(cert).build()?)
}

pub struct LdapAuthenticatorBuilder {
    endpoint: String,
    trust_certificate: Option<PathBuf>,
    connect_timeout: Duration,
}

impl LdapAuthenticatorBuilder {
    /// Trust the PEM certificate at `path` in addition to the system roots.
    pub fn trust_certificate<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.trust_certificate = Some(path.into());
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn build(self) -> Result<LdapAuthenticator, LdapSetupError> {
        let url = normalize_endpoint(&self.endpoint)?;
        let connector = match &self.trust_certificate {
            Some(path) => Some(load_connector(path)?),
            None => None,
        };
        Ok(LdapAuthenticator {
            url,
            connector,
            connect_timeout: self.connect_timeout,
        })
    }
}

#[derive(Clone)]
pub struct LdapAuthenticator {
    url: url::Url,
    connector: Option<TlsConnector>,
    connect_timeout: Duration,
}

impl LdapAuthenticator {
    pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn builder(endpoint: &str) -> LdapAuthenticatorBuilder {
        LdapAuthenticatorBuilder {
            endpoint: endpoint.to_string(),
            trust_certificate: None,
            connect_timeout: Self::DEFAULT_CONNECT_TIMEOUT,
        }
    }

    fn settings(&self) -> LdapConnSettings {
        let settings = LdapConnSettings::new().set_conn_timeout(self.connect_timeout);
        match &self.connector {
            Some(connector) => settings.set_connector(connector.clone()),
            None => settings,
        }
    }
}

impl Authenticator for LdapAuthenticator {
    fn attempt(&mut self, pair: &CredentialPair) -> AttemptResult {
        if pair.password.is_empty() {
            return AttemptResult::InvalidCredential("empty password not allowed".to_string());
        }
        let mut conn = match LdapConn::with_settings(self.settings(), self.url.as_str()) {
            Ok(conn) => conn,
            Err(e) => return AttemptResult::ConnectionError(e.to_string()),
        };
        // Account names are usually best given as UPNs (user@domain).
        let result = match conn.simple_bind(&pair.account, &pair.password) {
            Ok(res) if res.rc == 0 => AttemptResult::Success,
            Ok(res) if res.rc == RC_INVALID_CREDENTIALS => {
                AttemptResult::InvalidCredential(format!("invalid credentials: {}", res.text))
            }
            Ok(res) => AttemptResult::InvalidCredential(format!(
                "bind rejected with rc={}: {}",
                res.rc, res.text
            )),
            Err(e) => AttemptResult::InvalidCredential(format!("bind failed: {}", e)),
        };
        let _ = conn.unbind();
        result
    }
}
