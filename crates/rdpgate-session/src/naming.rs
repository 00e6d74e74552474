//! Deterministic naming for per-session artifacts
//!
//! Every local artifact is a pure function of the session id, the base domain
//! and the directory layout. Teardown depends on this: it recomputes every
//! name from the id alone. Nothing in this module performs I/O.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SessionError;
use crate::settings::Layout;

/// Fixed tag every session id starts with
pub const SESSION_PREFIX: &str = "rdp";

/// Number of lowercase hex characters after the prefix
pub const SESSION_SUFFIX_LEN: usize = 8;

const UNIT_PREFIX: &str = "rdpgate-tunnel-";
const EXPIRY_PREFIX: &str = "rdpgate-expire-";
const INGRESS_EXTENSION: &str = "yml";
const PARTIAL_BUNDLE_SUFFIX: &str = ".json.partial";

/// Session identifier of the form `rdp-<8 lowercase hex>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    /// Build an id from its four random bytes
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(format!("{}-{}", SESSION_PREFIX, hex::encode(bytes)))
    }

    /// Parse a bare session id
    pub fn parse(raw: &str) -> Result<Self, SessionError> {
        let suffix = raw
            .strip_prefix(SESSION_PREFIX)
            .and_then(|rest| rest.strip_prefix('-'))
            .ok_or_else(|| {
                SessionError::InvalidInput(format!(
                    "session id '{}' must start with '{}-'",
                    raw, SESSION_PREFIX
                ))
            })?;

        if suffix.len() != SESSION_SUFFIX_LEN
            || !suffix
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
        {
            return Err(SessionError::InvalidInput(format!(
                "session id '{}' must end with {} lowercase hex characters",
                raw, SESSION_SUFFIX_LEN
            )));
        }

        Ok(Self(raw.to_string()))
    }

    /// Resolve a teardown target: either a bare id or a hostname whose
    /// leading label is the id.
    pub fn from_target(target: &str) -> Result<Self, SessionError> {
        let normalized = target.trim().trim_end_matches('.').to_ascii_lowercase();
        let label = normalized.split('.').next().unwrap_or_default();
        if label.is_empty() {
            return Err(SessionError::InvalidInput(
                "teardown target cannot be empty".to_string(),
            ));
        }
        Self::parse(label)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SessionId {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for SessionId {
    type Error = SessionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0
    }
}

/// Public hostname for a session
pub fn fqdn(id: &SessionId, base_domain: &str) -> String {
    format!("{}.{}", id, base_domain.trim_matches('.'))
}

/// All locally derivable names of one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionNames {
    pub id: SessionId,
    pub fqdn: String,
    /// Supervised unit name, including the `.service` suffix
    pub unit_name: String,
    pub unit_path: PathBuf,
    /// Ingress mapping consumed by the tunnel client
    pub config_path: PathBuf,
    /// `username:secret` lines for the desktop login
    pub credentials_path: PathBuf,
    pub log_path: PathBuf,
    /// Name of the one-shot expiry trigger
    pub expiry_trigger: String,
    /// Where the provider writes the bundle before it is renamed by tunnel id
    pub partial_bundle_path: PathBuf,
    tunnel_credentials_dir: PathBuf,
}

impl SessionNames {
    pub fn new(id: &SessionId, base_domain: &str, layout: &Layout) -> Self {
        let unit_name = format!("{}{}.service", UNIT_PREFIX, id);
        Self {
            id: id.clone(),
            fqdn: fqdn(id, base_domain),
            unit_path: layout.unit_dir.join(&unit_name),
            unit_name,
            config_path: layout
                .ingress_dir
                .join(format!("{}.{}", id, INGRESS_EXTENSION)),
            credentials_path: layout.credentials_dir.join(format!("{}.credentials", id)),
            log_path: layout.log_dir.join(format!("{}.log", id)),
            expiry_trigger: format!("{}{}", EXPIRY_PREFIX, id),
            partial_bundle_path: layout
                .tunnel_credentials_dir
                .join(format!("{}{}", id, PARTIAL_BUNDLE_SUFFIX)),
            tunnel_credentials_dir: layout.tunnel_credentials_dir.clone(),
        }
    }

    /// Final location of the credential bundle, named by the provider-assigned id
    pub fn bundle_path(&self, tunnel_id: &str) -> PathBuf {
        self.tunnel_credentials_dir
            .join(format!("{}.json", tunnel_id))
    }

    pub fn tunnel_credentials_dir(&self) -> &Path {
        &self.tunnel_credentials_dir
    }

    /// Whether a file in the tunnel-credentials directory belongs to this session
    pub fn is_session_bundle(&self, file_name: &str, tunnel_id: Option<&str>) -> bool {
        file_name.starts_with(self.id.as_str())
            || tunnel_id.is_some_and(|tid| !tid.is_empty() && file_name.starts_with(tid))
    }
}

/// Recover a session id from an ingress config file name
pub fn session_from_config_file(file_name: &str) -> Option<SessionId> {
    let stem = file_name.strip_suffix(&format!(".{}", INGRESS_EXTENSION))?;
    SessionId::parse(stem).ok()
}
