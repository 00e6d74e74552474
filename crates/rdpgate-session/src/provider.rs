//! Capability traits for the external systems a session touches
//!
//! The OS service supervisor and the provider's tunnel/DNS registries are
//! global mutable state. The orchestrator only reaches them through these
//! traits, which lets tests drive the full lifecycle against fakes.
//!
//! Removal methods report [`Removal::AlreadyAbsent`] (or
//! [`ProviderError::NotFound`]) instead of failing when the target is gone;
//! teardown treats both as success.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::naming::{SessionId, SessionNames};

/// Errors raised by provider and host adapters
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("`{command}` failed ({status}): {stderr}")]
    Command {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("Unexpected response: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of an idempotent removal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    Removed,
    AlreadyAbsent,
}

/// A freshly registered tunnel and its credential bundle
#[derive(Clone, PartialEq, Eq)]
pub struct ProvisionedTunnel {
    /// Provider-assigned identifier
    pub id: String,
    pub name: String,
    /// Opaque bundle the tunnel client authenticates with
    pub bundle: Vec<u8>,
}

impl std::fmt::Debug for ProvisionedTunnel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvisionedTunnel")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("bundle", &format_args!("<{} bytes>", self.bundle.len()))
            .finish()
    }
}

/// An existing tunnel registration, as listed by the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelRef {
    pub id: String,
    pub name: String,
}

/// Tunnel registry of the provider's control plane
#[async_trait]
pub trait TunnelProvider: Send + Sync {
    /// Register a tunnel named `name`
    ///
    /// `scratch_path` is a session-owned path the adapter may use to receive
    /// the bundle from its tooling; the orchestrator persists the returned
    /// bundle under the provider id and deletes the scratch file.
    async fn create(&self, name: &str, scratch_path: &Path)
        -> Result<ProvisionedTunnel, ProviderError>;

    /// Find a live tunnel by exact name
    async fn find(&self, name: &str) -> Result<Option<TunnelRef>, ProviderError>;

    /// Delete a tunnel by provider id
    async fn delete(&self, tunnel_id: &str) -> Result<Removal, ProviderError>;

    /// Hostname a DNS record must point at to reach the tunnel
    fn route_target(&self, tunnel_id: &str) -> String;
}

/// A DNS record as reported by the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsRecord {
    pub id: String,
    pub name: String,
    pub content: String,
}

/// DNS zone management of the provider
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Publish `name` as an alias of `target`
    async fn create_cname(&self, name: &str, target: &str) -> Result<DnsRecord, ProviderError>;

    /// Every record whose name is exactly `name`, any type
    async fn list(&self, name: &str) -> Result<Vec<DnsRecord>, ProviderError>;

    async fn delete(&self, record_id: &str) -> Result<Removal, ProviderError>;
}

/// Definition of a supervised tunnel-client process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitSpec {
    /// Unit name including its `.service` suffix
    pub name: String,
    pub description: String,
    /// Program followed by its arguments
    pub exec_start: Vec<String>,
    /// stdout and stderr are appended here
    pub log_path: PathBuf,
    /// Account the process runs as; the supervisor default when unset
    pub user: Option<String>,
}

/// Supervisor view of a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    Running,
    Activating,
    Failed,
    Inactive,
    NotFound,
}

impl std::fmt::Display for UnitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnitState::Running => write!(f, "running"),
            UnitState::Activating => write!(f, "activating"),
            UnitState::Failed => write!(f, "failed"),
            UnitState::Inactive => write!(f, "inactive"),
            UnitState::NotFound => write!(f, "not installed"),
        }
    }
}

/// OS service supervision (register/start/stop/remove)
#[async_trait]
pub trait ServiceSupervisor: Send + Sync {
    /// Install the unit definition without starting it
    async fn register(&self, unit: &UnitSpec) -> Result<(), ProviderError>;

    async fn start(&self, unit_name: &str) -> Result<(), ProviderError>;

    async fn state(&self, unit_name: &str) -> Result<UnitState, ProviderError>;

    async fn stop(&self, unit_name: &str) -> Result<Removal, ProviderError>;

    /// Disable and delete the unit definition
    async fn remove(&self, unit_name: &str) -> Result<Removal, ProviderError>;
}

/// Cancel handle of a scheduled expiry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiryHandle {
    pub session_id: SessionId,
    pub trigger_name: String,
    /// Known when the handle comes from `schedule`; re-derived handles leave it unset
    pub fires_at: Option<DateTime<Utc>>,
}

impl ExpiryHandle {
    /// Re-derive the handle of a session from its names alone
    pub fn for_session(names: &SessionNames) -> Self {
        Self {
            session_id: names.id.clone(),
            trigger_name: names.expiry_trigger.clone(),
            fires_at: None,
        }
    }
}

/// One-shot deferred teardown
#[async_trait]
pub trait ExpiryScheduler: Send + Sync {
    /// Arrange for teardown of `session` once `ttl` has elapsed from now
    async fn schedule(
        &self,
        session: &SessionId,
        trigger_name: &str,
        ttl: Duration,
    ) -> Result<ExpiryHandle, ProviderError>;

    async fn cancel(&self, handle: &ExpiryHandle) -> Result<Removal, ProviderError>;

    /// Whether the trigger is still waiting to fire
    async fn is_pending(&self, handle: &ExpiryHandle) -> Result<bool, ProviderError>;
}
