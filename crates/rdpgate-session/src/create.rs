//! Create pipeline
//!
//! Identity → tunnel → ingress → service → liveness → DNS → credentials →
//! expiry. A failure stops the pipeline where it is. Nothing is rolled back:
//! teardown is idempotent and reclaims whatever was created.

use chrono::Utc;
use tracing::{error, info, warn};

use crate::artifact::{self, PRIVATE_DIR_MODE, SHARED_DIR_MODE};
use crate::credentials;
use crate::error::{CreateFailure, SessionError};
use crate::identity;
use crate::ingress::{self, IngressConfig};
use crate::liveness::{self, LivenessError};
use crate::manager::SessionManager;
use crate::naming::SessionId;
use crate::pipeline::{CreateStep, StepOutcome, StepRecord};
use crate::provider::UnitSpec;
use crate::session::{CreateReport, CreateRequest, DnsBinding, Session};

const DNS_SKIPPED: &str = "CF_API_TOKEN/CF_ZONE_ID not set";

#[derive(Default)]
struct Progress {
    session_id: Option<SessionId>,
    current: Option<CreateStep>,
    steps: Vec<StepRecord<CreateStep>>,
}

impl Progress {
    fn begin(&mut self, step: CreateStep) {
        self.current = Some(step);
    }

    fn finish(&mut self, outcome: StepOutcome) {
        if let Some(step) = self.current.take() {
            self.steps.push(StepRecord { step, outcome });
        }
    }
}

impl SessionManager {
    /// Provision a new session
    pub async fn create(&self, request: &CreateRequest) -> Result<CreateReport, CreateFailure> {
        let mut progress = Progress::default();

        match self.run_create(request, &mut progress).await {
            Ok(session) => Ok(CreateReport {
                session,
                steps: progress.steps,
            }),
            Err(error) => {
                let failed_step = progress.current.unwrap_or(CreateStep::Identity);
                error!("Create failed at {}: {}", failed_step, error);
                Err(CreateFailure {
                    session_id: progress.session_id,
                    failed_step,
                    completed: progress.steps,
                    error,
                })
            }
        }
    }

    async fn run_create(
        &self,
        request: &CreateRequest,
        progress: &mut Progress,
    ) -> Result<Session, SessionError> {
        let layout = &self.settings.layout;

        progress.begin(CreateStep::Identity);
        let id = identity::generate()?;
        progress.session_id = Some(id.clone());
        let names = self.names(&id);
        info!("Creating session {} ({})", id, names.fqdn);
        progress.finish(StepOutcome::Done(id.to_string()));

        // Fail fast: nothing exists yet if the provider refuses
        progress.begin(CreateStep::TunnelRegistration);
        let owner = self.settings.service_user.as_deref();
        // The client reads its bundle and ingress config from these
        for dir in [&layout.tunnel_credentials_dir, &layout.ingress_dir] {
            let created = artifact::ensure_dir(dir, SHARED_DIR_MODE).await?;
            if let Some(user) = owner {
                artifact::admit_user(dir, user, created)?;
            }
        }
        let tunnel = self
            .tunnels
            .create(id.as_str(), &names.partial_bundle_path)
            .await
            .map_err(|source| SessionError::ProviderCall {
                step: CreateStep::TunnelRegistration,
                source,
            })?;
        let bundle_path = names.bundle_path(&tunnel.id);
        artifact::write_private(&bundle_path, &tunnel.bundle).await?;
        artifact::remove_file(&names.partial_bundle_path)
            .await
            .map_err(|e| SessionError::local("remove", &names.partial_bundle_path, e))?;
        info!("Registered tunnel {} for {}", tunnel.id, id);
        progress.finish(StepOutcome::Done(format!(
            "tunnel {} ({})",
            tunnel.id,
            bundle_path.display()
        )));

        progress.begin(CreateStep::IngressConfig);
        let config = IngressConfig::for_session(
            &tunnel.id,
            &bundle_path,
            &names.fqdn,
            &self.settings.local_service,
        );
        ingress::write(&names.config_path, &config, owner).await?;
        if let Some(user) = owner {
            artifact::chown_to_user(&bundle_path, user)?;
        }
        progress.finish(StepOutcome::Done(names.config_path.display().to_string()));

        progress.begin(CreateStep::ServiceInstall);
        artifact::ensure_dir(&layout.log_dir, 0o755).await?;
        let unit = UnitSpec {
            name: names.unit_name.clone(),
            description: format!("rdpgate tunnel for {}", names.fqdn),
            exec_start: vec![
                self.settings.cloudflared_bin.display().to_string(),
                "--no-autoupdate".to_string(),
                "tunnel".to_string(),
                "--config".to_string(),
                names.config_path.display().to_string(),
                "run".to_string(),
                tunnel.id.clone(),
            ],
            log_path: names.log_path.clone(),
            user: self.settings.service_user.clone(),
        };
        let supervisor_error = |source| SessionError::Supervisor {
            unit: names.unit_name.clone(),
            source,
        };
        self.supervisor
            .register(&unit)
            .await
            .map_err(supervisor_error)?;
        self.supervisor
            .start(&names.unit_name)
            .await
            .map_err(supervisor_error)?;
        progress.finish(StepOutcome::Done(names.unit_name.clone()));

        progress.begin(CreateStep::LivenessCheck);
        let liveness = &self.settings.liveness;
        match liveness::wait_until_running(
            self.supervisor.as_ref(),
            &names.unit_name,
            liveness.timeout(),
            liveness.poll_interval(),
        )
        .await
        {
            Ok(()) => progress.finish(StepOutcome::Done("running".to_string())),
            Err(LivenessError::TimedOut(state)) => {
                warn!("Unit {} still {} after {:?}", names.unit_name, state, liveness.timeout());
                return Err(SessionError::Liveness {
                    unit: names.unit_name.clone(),
                    timeout: liveness.timeout(),
                    log_excerpt: artifact::tail(&names.log_path, liveness.log_excerpt_lines).await,
                });
            }
            Err(LivenessError::Probe(source)) => return Err(supervisor_error(source)),
        }

        // Only reached with a live backend
        progress.begin(CreateStep::DnsPublish);
        let dns = match &self.dns {
            Some(dns) => {
                let target = self.tunnels.route_target(&tunnel.id);
                let record = dns
                    .create_cname(&names.fqdn, &target)
                    .await
                    .map_err(|source| SessionError::ProviderCall {
                        step: CreateStep::DnsPublish,
                        source,
                    })?;
                info!("Published {} -> {} (record {})", names.fqdn, target, record.id);
                progress.finish(StepOutcome::Done(format!("{} -> {}", names.fqdn, target)));
                DnsBinding::Published {
                    record_id: record.id,
                    target,
                }
            }
            None => {
                warn!("DNS publishing skipped for {}: {}", names.fqdn, DNS_SKIPPED);
                progress.finish(StepOutcome::Skipped(DNS_SKIPPED.to_string()));
                DnsBinding::Skipped(DNS_SKIPPED.to_string())
            }
        };

        progress.begin(CreateStep::CredentialMint);
        artifact::ensure_dir(&layout.credentials_dir, PRIVATE_DIR_MODE).await?;
        let minted = credentials::mint(&request.usernames);
        credentials::write(&names.credentials_path, &minted).await?;
        progress.finish(StepOutcome::Done(format!(
            "{} user(s) in {}",
            minted.len(),
            names.credentials_path.display()
        )));

        progress.begin(CreateStep::ExpirySchedule);
        let expiry = match request.ttl {
            Some(ttl) if !ttl.is_zero() => {
                let handle = self
                    .expiry
                    .schedule(&id, &names.expiry_trigger, ttl)
                    .await
                    .map_err(|source| SessionError::Supervisor {
                        unit: names.expiry_trigger.clone(),
                        source,
                    })?;
                info!("Session {} expires in {:?}", id, ttl);
                progress.finish(StepOutcome::Done(names.expiry_trigger.clone()));
                Some(handle)
            }
            _ => {
                progress.finish(StepOutcome::Skipped("no TTL".to_string()));
                None
            }
        };

        Ok(Session::assemble(
            &names,
            tunnel.id,
            Utc::now(),
            request.ttl,
            minted,
            dns,
            expiry,
        ))
    }
}
