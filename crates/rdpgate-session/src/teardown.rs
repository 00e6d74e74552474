//! Teardown pipeline
//!
//! Every step runs regardless of earlier failures and treats a missing
//! target as success, so teardown can be repeated for the same id and is safe
//! after a create that stopped anywhere.

use tracing::{info, warn};

use crate::artifact;
use crate::error::SessionError;
use crate::ingress;
use crate::manager::SessionManager;
use crate::naming::{SessionId, SessionNames};
use crate::pipeline::{StepOutcome, TeardownReport, TeardownStep};
use crate::provider::{ExpiryHandle, ProviderError, Removal};

impl SessionManager {
    /// Remove every resource of a session
    ///
    /// Returns the per-step report when all local steps succeeded. Failures of
    /// provider-side cleanup are in [`TeardownReport::possible_leaks`] and do
    /// not fail the call.
    pub async fn teardown(&self, id: &SessionId) -> Result<TeardownReport, SessionError> {
        let names = self.names(id);
        let mut report = TeardownReport::new(id.clone(), names.fqdn.clone());
        info!("Tearing down session {} ({})", id, names.fqdn);

        // The ingress config is the only local record of the provider's tunnel id
        let recorded_tunnel = ingress::read(&names.config_path)
            .await
            .map(|config| config.tunnel);

        report.record(TeardownStep::ServiceRemoval, self.remove_service(&names).await);
        report.record(
            TeardownStep::IngressRemoval,
            remove_artifact(&names.config_path).await,
        );
        report.record(TeardownStep::ExpiryCancel, self.cancel_expiry(&names).await);
        report.record(
            TeardownStep::CredentialRemoval,
            remove_artifact(&names.credentials_path).await,
        );
        report.record(TeardownStep::LogRemoval, remove_artifact(&names.log_path).await);
        report.record(TeardownStep::DnsCleanup, self.clean_dns(&names).await);

        let (outcome, tunnel_id) = self
            .deregister_tunnel(&names, recorded_tunnel.as_deref())
            .await;
        report.record(TeardownStep::TunnelDeregistration, outcome);
        report.record(
            TeardownStep::BundleCleanup,
            remove_bundles(&names, tunnel_id.as_deref()).await,
        );

        for record in &report.steps {
            match &record.outcome {
                StepOutcome::Failed(message) if record.step.is_best_effort() => {
                    warn!("{} for {} failed (possible leak): {}", record.step, id, message)
                }
                StepOutcome::Failed(message) => {
                    warn!("{} for {} failed: {}", record.step, id, message)
                }
                outcome => info!("{}: {}", record.step, outcome),
            }
        }

        let failures = report.fatal_failures();
        if failures.is_empty() {
            Ok(report)
        } else {
            Err(SessionError::Teardown {
                session: id.clone(),
                failures,
            })
        }
    }

    async fn remove_service(&self, names: &SessionNames) -> StepOutcome {
        let unit = &names.unit_name;
        let stopped = match self.supervisor.stop(unit).await {
            Ok(removal) => removal,
            Err(ProviderError::NotFound(_)) => Removal::AlreadyAbsent,
            Err(e) => return StepOutcome::Failed(format!("stop {}: {}", unit, e)),
        };
        let removed = match self.supervisor.remove(unit).await {
            Ok(removal) => removal,
            Err(ProviderError::NotFound(_)) => Removal::AlreadyAbsent,
            Err(e) => return StepOutcome::Failed(format!("remove {}: {}", unit, e)),
        };

        match (stopped, removed) {
            (Removal::AlreadyAbsent, Removal::AlreadyAbsent) => StepOutcome::AlreadyAbsent,
            _ => StepOutcome::Done(unit.clone()),
        }
    }

    async fn cancel_expiry(&self, names: &SessionNames) -> StepOutcome {
        let handle = ExpiryHandle::for_session(names);
        match self.expiry.cancel(&handle).await {
            Ok(Removal::Removed) => StepOutcome::Done(handle.trigger_name),
            Ok(Removal::AlreadyAbsent) | Err(ProviderError::NotFound(_)) => {
                StepOutcome::AlreadyAbsent
            }
            Err(e) => StepOutcome::Failed(format!("cancel {}: {}", handle.trigger_name, e)),
        }
    }

    /// Delete every record named after the session, not only the one create made
    async fn clean_dns(&self, names: &SessionNames) -> StepOutcome {
        let Some(dns) = &self.dns else {
            return StepOutcome::Skipped("DNS management not configured".to_string());
        };

        let records = match dns.list(&names.fqdn).await {
            Ok(records) => records,
            Err(e) => return StepOutcome::Failed(format!("list {}: {}", names.fqdn, e)),
        };

        let mut deleted = 0;
        let mut errors = Vec::new();
        for record in &records {
            match dns.delete(&record.id).await {
                Ok(Removal::Removed) => deleted += 1,
                Ok(Removal::AlreadyAbsent) | Err(ProviderError::NotFound(_)) => {}
                Err(e) => errors.push(format!("record {}: {}", record.id, e)),
            }
        }

        if !errors.is_empty() {
            StepOutcome::Failed(errors.join("; "))
        } else if deleted == 0 {
            StepOutcome::AlreadyAbsent
        } else {
            StepOutcome::Done(format!("{} record(s) for {}", deleted, names.fqdn))
        }
    }

    /// Looks the tunnel up by session name, falling back to the id recorded in
    /// the ingress config. Returns the tunnel id used, if any.
    async fn deregister_tunnel(
        &self,
        names: &SessionNames,
        recorded: Option<&str>,
    ) -> (StepOutcome, Option<String>) {
        let name = names.id.as_str();
        let tunnel_id = match self.tunnels.find(name).await {
            Ok(Some(tunnel)) => tunnel.id,
            Ok(None) | Err(ProviderError::NotFound(_)) => match recorded {
                Some(id) => id.to_string(),
                None => return (StepOutcome::AlreadyAbsent, None),
            },
            Err(e) => {
                let outcome = StepOutcome::Failed(format!("look up {}: {}", name, e));
                return (outcome, recorded.map(str::to_string));
            }
        };

        let outcome = match self.tunnels.delete(&tunnel_id).await {
            Ok(Removal::Removed) => StepOutcome::Done(format!("tunnel {}", tunnel_id)),
            Ok(Removal::AlreadyAbsent) | Err(ProviderError::NotFound(_)) => {
                StepOutcome::AlreadyAbsent
            }
            Err(e) => StepOutcome::Failed(format!("delete tunnel {}: {}", tunnel_id, e)),
        };
        (outcome, Some(tunnel_id))
    }
}

async fn remove_artifact(path: &std::path::Path) -> StepOutcome {
    match artifact::remove_file(path).await {
        Ok(Removal::Removed) => StepOutcome::Done(path.display().to_string()),
        Ok(Removal::AlreadyAbsent) => StepOutcome::AlreadyAbsent,
        Err(e) => StepOutcome::Failed(format!("remove {}: {}", path.display(), e)),
    }
}

/// Bundle files are named by provider id, which may be unknown by now
async fn remove_bundles(names: &SessionNames, tunnel_id: Option<&str>) -> StepOutcome {
    let dir = names.tunnel_credentials_dir();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return StepOutcome::AlreadyAbsent,
        Err(e) => return StepOutcome::Failed(format!("read {}: {}", dir.display(), e)),
    };

    let mut removed = Vec::new();
    let mut errors = Vec::new();
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                errors.push(format!("read {}: {}", dir.display(), e));
                break;
            }
        };
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        if !names.is_session_bundle(file_name, tunnel_id) {
            continue;
        }
        match artifact::remove_file(&entry.path()).await {
            Ok(Removal::Removed) => removed.push(file_name.to_string()),
            Ok(Removal::AlreadyAbsent) => {}
            Err(e) => errors.push(format!("remove {}: {}", entry.path().display(), e)),
        }
    }

    if !errors.is_empty() {
        StepOutcome::Failed(errors.join("; "))
    } else if removed.is_empty() {
        StepOutcome::AlreadyAbsent
    } else {
        removed.sort();
        StepOutcome::Done(removed.join(", "))
    }
}
