//! TTL expiry as a transient systemd timer
//!
//! `systemd-run --on-active` creates `<trigger>.timer` plus `<trigger>.service`,
//! the latter running `rdpgate teardown <id>`. The timer survives the CLI
//! process and unloads itself once it has fired.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rdpgate_session::{ExpiryHandle, ExpiryScheduler, ProviderError, Removal, SessionId};
use tracing::info;

use crate::command::{self, args};

pub struct SystemdTimerScheduler {
    /// `rdpgate` executable the timer runs
    program: PathBuf,
    config_path: PathBuf,
    /// Variables the teardown run needs, passed without touching argv
    env: Vec<(String, String)>,
    systemd_run: PathBuf,
    systemctl: PathBuf,
}

impl SystemdTimerScheduler {
    pub fn new(program: impl Into<PathBuf>, config_path: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            config_path: config_path.into(),
            env: Vec::new(),
            systemd_run: PathBuf::from("systemd-run"),
            systemctl: PathBuf::from("systemctl"),
        }
    }

    /// Forward a variable to the scheduled teardown
    pub fn forward_env(mut self, name: &str, value: Option<&str>) -> Self {
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            self.env.push((name.to_string(), value.to_string()));
        }
        self
    }

    /// Use other `systemd-run`/`systemctl` executables
    pub fn with_tools(mut self, systemd_run: impl Into<PathBuf>, systemctl: impl Into<PathBuf>) -> Self {
        self.systemd_run = systemd_run.into();
        self.systemctl = systemctl.into();
        self
    }

    fn run_args(&self, session: &SessionId, trigger_name: &str, ttl: Duration) -> Vec<String> {
        let mut run = vec![
            format!("--unit={}", trigger_name),
            format!("--on-active={}s", ttl.as_secs().max(1)),
            "--timer-property=AccuracySec=1s".to_string(),
            "--timer-property=RemainAfterElapse=no".to_string(),
            format!("--description=rdpgate expiry for {}", session),
        ];
        // Name only: systemd-run copies the value from its own environment
        run.extend(self.env.iter().map(|(name, _)| format!("--setenv={}", name)));
        run.push("--".to_string());
        run.push(self.program.display().to_string());
        run.push("--config".to_string());
        run.push(self.config_path.display().to_string());
        run.push("teardown".to_string());
        run.push(session.to_string());
        run
    }
}

fn timer_unit(trigger_name: &str) -> String {
    format!("{}.timer", trigger_name)
}

#[async_trait]
impl ExpiryScheduler for SystemdTimerScheduler {
    async fn schedule(
        &self,
        session: &SessionId,
        trigger_name: &str,
        ttl: Duration,
    ) -> Result<ExpiryHandle, ProviderError> {
        command::run_checked(
            &self.systemd_run,
            &self.run_args(session, trigger_name, ttl),
            &self.env,
        )
        .await?;
        info!("Scheduled {} in {}s", timer_unit(trigger_name), ttl.as_secs());

        Ok(ExpiryHandle {
            session_id: session.clone(),
            trigger_name: trigger_name.to_string(),
            fires_at: chrono::Duration::from_std(ttl).ok().map(|d| Utc::now() + d),
        })
    }

    /// Stops the timer only; its service half may be the teardown running now
    async fn cancel(&self, handle: &ExpiryHandle) -> Result<Removal, ProviderError> {
        if !self.is_pending(handle).await? {
            return Ok(Removal::AlreadyAbsent);
        }

        let timer = timer_unit(&handle.trigger_name);
        let output = command::run(&self.systemctl, &args(&["stop", &timer]), &[]).await?;
        if output.success {
            Ok(Removal::Removed)
        } else if command::is_not_loaded(&output.stderr) {
            Ok(Removal::AlreadyAbsent)
        } else {
            Err(ProviderError::Command {
                command: format!("systemctl stop {}", timer),
                status: output.status,
                stderr: output.stderr,
            })
        }
    }

    async fn is_pending(&self, handle: &ExpiryHandle) -> Result<bool, ProviderError> {
        let timer = timer_unit(&handle.trigger_name);
        let output = command::run(&self.systemctl, &args(&["is-active", &timer]), &[]).await?;
        Ok(output.stdout.lines().next() == Some("active"))
    }
}
