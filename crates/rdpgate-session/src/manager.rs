//! Session lifecycle orchestrator
//!
//! [`SessionManager`] owns the injected capabilities and runs the create
//! (`create.rs`) and teardown (`teardown.rs`) pipelines. Each invocation is
//! one sequential workflow; concurrent invocations for different sessions
//! never share names, so no locking is needed.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::artifact;
use crate::error::SessionError;
use crate::naming::{self, SessionId, SessionNames};
use crate::provider::{
    DnsProvider, ExpiryHandle, ExpiryScheduler, ServiceSupervisor, TunnelProvider, UnitState,
};
use crate::settings::Settings;

pub struct SessionManager {
    pub(crate) settings: Settings,
    pub(crate) tunnels: Arc<dyn TunnelProvider>,
    pub(crate) dns: Option<Arc<dyn DnsProvider>>,
    pub(crate) supervisor: Arc<dyn ServiceSupervisor>,
    pub(crate) expiry: Arc<dyn ExpiryScheduler>,
}

/// Read-only view of one session's local artifacts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub names: SessionNames,
    pub unit_state: UnitState,
    pub ingress_config: bool,
    pub credentials_file: bool,
    pub log_file: bool,
    pub expiry_pending: bool,
}

impl SessionStatus {
    /// True when nothing of the session is left locally
    pub fn is_absent(&self) -> bool {
        self.unit_state == UnitState::NotFound
            && !self.ingress_config
            && !self.credentials_file
            && !self.log_file
            && !self.expiry_pending
    }
}

impl SessionManager {
    /// Create a manager without DNS management; see [`SessionManager::with_dns`]
    pub fn new(
        settings: Settings,
        tunnels: Arc<dyn TunnelProvider>,
        supervisor: Arc<dyn ServiceSupervisor>,
        expiry: Arc<dyn ExpiryScheduler>,
    ) -> Self {
        Self {
            settings,
            tunnels,
            dns: None,
            supervisor,
            expiry,
        }
    }

    /// Enable DNS publishing and cleanup
    pub fn with_dns(mut self, dns: Arc<dyn DnsProvider>) -> Self {
        self.dns = Some(dns);
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn dns_enabled(&self) -> bool {
        self.dns.is_some()
    }

    /// Every locally derivable name of a session
    pub fn names(&self, id: &SessionId) -> SessionNames {
        SessionNames::new(id, &self.settings.base_domain, &self.settings.layout)
    }

    /// Inspect what is left of a session
    pub async fn status(&self, id: &SessionId) -> Result<SessionStatus, SessionError> {
        let names = self.names(id);

        let unit_state = self
            .supervisor
            .state(&names.unit_name)
            .await
            .map_err(|source| SessionError::Supervisor {
                unit: names.unit_name.clone(),
                source,
            })?;

        let handle = ExpiryHandle::for_session(&names);
        let expiry_pending = match self.expiry.is_pending(&handle).await {
            Ok(pending) => pending,
            Err(e) => {
                warn!("Could not query expiry trigger {}: {}", handle.trigger_name, e);
                false
            }
        };

        Ok(SessionStatus {
            unit_state,
            ingress_config: artifact::exists(&names.config_path).await,
            credentials_file: artifact::exists(&names.credentials_path).await,
            log_file: artifact::exists(&names.log_path).await,
            expiry_pending,
            names,
        })
    }

    /// Sessions that still have an ingress config on this host
    pub async fn list(&self) -> Result<Vec<SessionId>, SessionError> {
        let dir = &self.settings.layout.ingress_dir;
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(SessionError::local("read directory", dir, e)),
        };

        let mut sessions = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| SessionError::local("read directory", dir, e))?
        {
            if let Some(id) = entry
                .file_name()
                .to_str()
                .and_then(naming::session_from_config_file)
            {
                sessions.push(id);
            }
        }

        sessions.sort();
        Ok(sessions)
    }

    /// Tear down every session id received until the channel closes
    ///
    /// Pairs with [`crate::InProcessExpiryScheduler`], whose triggers send the
    /// expired session id on this channel.
    pub async fn serve_expirations(self: Arc<Self>, mut expirations: mpsc::UnboundedReceiver<SessionId>) {
        while let Some(id) = expirations.recv().await {
            info!("Tearing down expired session {}", id);
            match self.teardown(&id).await {
                Ok(report) => {
                    for leak in report.possible_leaks() {
                        warn!("Expired session {}: {} failed: {}", id, leak.step, leak.message);
                    }
                }
                Err(e) => error!("Teardown of expired session {} failed: {}", id, e),
            }
        }
    }
}
