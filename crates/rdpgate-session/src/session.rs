//! Session data model

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::credentials::{self, UserCredential};
use crate::error::SessionError;
use crate::naming::{SessionId, SessionNames};
use crate::pipeline::{CreateStep, StepRecord};
use crate::provider::ExpiryHandle;

/// Validated input of a create invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRequest {
    pub usernames: Vec<String>,
    /// Teardown is scheduled only for a positive TTL
    pub ttl: Option<Duration>,
}

impl CreateRequest {
    /// Parse a comma-separated username list and an optional TTL in hours
    pub fn parse(
        users: Option<&str>,
        ttl_hours: Option<u64>,
        default_username: &str,
    ) -> Result<Self, SessionError> {
        let mut usernames: Vec<String> = users
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();

        if usernames.is_empty() {
            usernames.push(default_username.to_string());
        }

        for (i, name) in usernames.iter().enumerate() {
            credentials::validate_username(name)?;
            if usernames[..i].contains(name) {
                return Err(SessionError::InvalidInput(format!(
                    "username '{}' listed more than once",
                    name
                )));
            }
        }

        let ttl = ttl_hours
            .filter(|hours| *hours > 0)
            .map(|hours| {
                hours
                    .checked_mul(3600)
                    .map(Duration::from_secs)
                    .ok_or_else(|| {
                        SessionError::InvalidInput(format!("TTL of {} hours is too large", hours))
                    })
            })
            .transpose()?;

        Ok(Self { usernames, ttl })
    }
}

/// Whether the hostname was published
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DnsBinding {
    Published { record_id: String, target: String },
    Skipped(String),
}

/// A fully created session
///
/// Every field is set once at creation; nothing is updated in place.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub fqdn: String,
    /// Provider-assigned tunnel id; teardown looks it up by name instead
    pub tunnel_id: String,
    pub tunnel_bundle_path: PathBuf,
    pub unit_name: String,
    pub unit_path: PathBuf,
    pub config_path: PathBuf,
    pub credentials_path: PathBuf,
    pub log_path: PathBuf,
    pub ttl: Option<Duration>,
    pub created_at: DateTime<Utc>,
    pub credentials: Vec<UserCredential>,
    pub dns: DnsBinding,
    pub expiry: Option<ExpiryHandle>,
}

impl Session {
    pub(crate) fn assemble(
        names: &SessionNames,
        tunnel_id: String,
        created_at: DateTime<Utc>,
        ttl: Option<Duration>,
        credentials: Vec<UserCredential>,
        dns: DnsBinding,
        expiry: Option<ExpiryHandle>,
    ) -> Self {
        Self {
            id: names.id.clone(),
            fqdn: names.fqdn.clone(),
            tunnel_bundle_path: names.bundle_path(&tunnel_id),
            tunnel_id,
            unit_name: names.unit_name.clone(),
            unit_path: names.unit_path.clone(),
            config_path: names.config_path.clone(),
            credentials_path: names.credentials_path.clone(),
            log_path: names.log_path.clone(),
            ttl,
            created_at,
            credentials,
            dns,
            expiry,
        }
    }

    /// When the expiry trigger fires, if one was installed
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expiry.as_ref().and_then(|handle| handle.fires_at)
    }
}

/// A successful create run
#[derive(Debug, Clone)]
pub struct CreateReport {
    pub session: Session,
    pub steps: Vec<StepRecord<CreateStep>>,
}
