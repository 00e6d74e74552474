//! Supervised tunnel client as a systemd system unit
//!
//! The unit restarts the client on failure with a growing delay, is enabled
//! for boot, and appends its output to the per-session log file. It is a
//! notify unit: cloudflared signals readiness once an edge connection is
//! registered, so `active` means the tunnel is actually serving.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rdpgate_session::{ProviderError, Removal, ServiceSupervisor, UnitSpec, UnitState};
use tracing::{info, warn};

use crate::command::{self, args};

const UNIT_FILE_MODE: u32 = 0o644;

pub struct SystemdSupervisor {
    unit_dir: PathBuf,
    systemctl: PathBuf,
}

impl SystemdSupervisor {
    pub fn new(unit_dir: impl Into<PathBuf>) -> Self {
        Self {
            unit_dir: unit_dir.into(),
            systemctl: PathBuf::from("systemctl"),
        }
    }

    /// Use another `systemctl` executable
    pub fn with_systemctl(mut self, systemctl: impl Into<PathBuf>) -> Self {
        self.systemctl = systemctl.into();
        self
    }

    fn unit_path(&self, unit_name: &str) -> PathBuf {
        self.unit_dir.join(unit_name)
    }

    async fn systemctl(&self, items: &[&str]) -> Result<command::Output, ProviderError> {
        command::run_checked(&self.systemctl, &args(items), &[]).await
    }

    async fn daemon_reload(&self) -> Result<(), ProviderError> {
        self.systemctl(&["daemon-reload"]).await.map(|_| ())
    }
}

/// Unit file contents for a supervised tunnel client
pub fn render_unit(spec: &UnitSpec) -> String {
    let exec_start = spec
        .exec_start
        .iter()
        .map(|arg| quote_exec_arg(arg))
        .collect::<Vec<_>>()
        .join(" ");
    let log = spec.log_path.display();
    let user = spec
        .user
        .as_ref()
        .map(|u| format!("User={}\n", u))
        .unwrap_or_default();

    format!(
        r#"[Unit]
Description={description}
After=network-online.target
Wants=network-online.target
StartLimitIntervalSec=0

[Service]
Type=notify
TimeoutStartSec=0
ExecStart={exec_start}
Restart=on-failure
RestartSec=5s
RestartSteps=5
RestartMaxDelaySec=60s
StandardOutput=append:{log}
StandardError=append:{log}
{user}
[Install]
WantedBy=multi-user.target
"#,
        description = spec.description,
    )
}

/// Quote one ExecStart argument for systemd's command-line parser
fn quote_exec_arg(arg: &str) -> String {
    let escaped = arg.replace('%', "%%").replace('$', "$$");
    if !escaped.is_empty()
        && !escaped
            .chars()
            .any(|c| c.is_whitespace() || c == '"' || c == '\'' || c == '\\' || c == ';')
    {
        return escaped;
    }
    format!("\"{}\"", escaped.replace('\\', "\\\\").replace('"', "\\\""))
}

/// `systemctl is-active` output to unit state
fn parse_active_state(stdout: &str) -> UnitState {
    match stdout.lines().next().unwrap_or_default().trim() {
        "active" | "reloading" => UnitState::Running,
        "activating" => UnitState::Activating,
        "failed" => UnitState::Failed,
        _ => UnitState::Inactive,
    }
}

#[async_trait]
impl ServiceSupervisor for SystemdSupervisor {
    async fn register(&self, unit: &UnitSpec) -> Result<(), ProviderError> {
        tokio::fs::create_dir_all(&self.unit_dir).await?;
        let path = self.unit_path(&unit.name);
        tokio::fs::write(&path, render_unit(unit)).await?;
        tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(UNIT_FILE_MODE)).await?;

        self.daemon_reload().await?;
        self.systemctl(&["enable", &unit.name]).await?;
        info!("Installed unit {}", path.display());
        Ok(())
    }

    /// Queues the start job; the unit stays `activating` until the client
    /// notifies readiness, which the liveness gate polls for
    async fn start(&self, unit_name: &str) -> Result<(), ProviderError> {
        self.systemctl(&["--no-block", "start", unit_name]).await?;
        info!("Queued start of {}", unit_name);
        Ok(())
    }

    async fn state(&self, unit_name: &str) -> Result<UnitState, ProviderError> {
        if !unit_file_exists(&self.unit_path(unit_name)).await {
            return Ok(UnitState::NotFound);
        }
        // is-active exits non-zero for every state but active
        let output = command::run(&self.systemctl, &args(&["is-active", unit_name]), &[]).await?;
        Ok(parse_active_state(&output.stdout))
    }

    async fn stop(&self, unit_name: &str) -> Result<Removal, ProviderError> {
        if !unit_file_exists(&self.unit_path(unit_name)).await {
            return Ok(Removal::AlreadyAbsent);
        }
        let output = command::run(&self.systemctl, &args(&["stop", unit_name]), &[]).await?;
        if output.success {
            Ok(Removal::Removed)
        } else if command::is_not_loaded(&output.stderr) {
            Ok(Removal::AlreadyAbsent)
        } else {
            Err(ProviderError::Command {
                command: format!("systemctl stop {}", unit_name),
                status: output.status,
                stderr: output.stderr,
            })
        }
    }

    async fn remove(&self, unit_name: &str) -> Result<Removal, ProviderError> {
        let path = self.unit_path(unit_name);
        if !unit_file_exists(&path).await {
            return Ok(Removal::AlreadyAbsent);
        }

        let disable = command::run(&self.systemctl, &args(&["disable", unit_name]), &[]).await?;
        if !disable.success && !command::is_not_loaded(&disable.stderr) {
            warn!("systemctl disable {} failed: {}", unit_name, disable.stderr);
        }

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        self.daemon_reload().await?;

        // Clears a lingering failed state; nothing to do otherwise
        let _ = command::run(&self.systemctl, &args(&["reset-failed", unit_name]), &[]).await;
        info!("Removed unit {}", path.display());
        Ok(Removal::Removed)
    }
}

async fn unit_file_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}
