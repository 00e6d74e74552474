//! Named tunnels through the `cloudflared` CLI
//!
//! `cloudflared` talks to the control plane with the origin certificate of
//! the account; this adapter only shells out to it and parses its JSON output.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rdpgate_session::{ProviderError, ProvisionedTunnel, Removal, TunnelProvider, TunnelRef};
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, error, info};

use crate::error::CloudflareError;

/// DNS aliases of a tunnel point at `<tunnel id>` under this domain
pub const ROUTE_TARGET_SUFFIX: &str = "cfargotunnel.com";

/// `deleted_at` value the CLI reports for live tunnels
const NOT_DELETED: &str = "0001-01-01T00:00:00Z";

#[derive(Debug, Deserialize)]
struct TunnelInfo {
    id: String,
    name: String,
    #[serde(default)]
    deleted_at: Option<String>,
}

impl TunnelInfo {
    fn is_live(&self) -> bool {
        match self.deleted_at.as_deref() {
            None | Some("") | Some(NOT_DELETED) => true,
            Some(_) => false,
        }
    }
}

pub struct CloudflaredTunnels {
    bin: PathBuf,
    origin_cert: Option<PathBuf>,
}

impl CloudflaredTunnels {
    pub fn new(bin: impl Into<PathBuf>) -> Self {
        Self {
            bin: bin.into(),
            origin_cert: None,
        }
    }

    /// Use an account certificate other than the CLI default
    pub fn with_origin_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.origin_cert = Some(path.into());
        self
    }

    /// Full argument list for `cloudflared tunnel <args>`
    fn tunnel_args(&self, args: &[&str]) -> Vec<String> {
        let mut full = vec!["tunnel".to_string()];
        if let Some(cert) = &self.origin_cert {
            full.push("--origincert".to_string());
            full.push(cert.display().to_string());
        }
        full.extend(args.iter().map(|a| a.to_string()));
        full
    }

    /// Run the CLI and return its stdout
    async fn run(&self, args: &[&str]) -> Result<String, CloudflareError> {
        let args = self.tunnel_args(args);
        let command = format!("{} {}", self.bin.display(), args.join(" "));
        debug!("Running command: {}", command);

        let output = Command::new(&self.bin)
            .args(&args)
            .output()
            .await
            .map_err(|source| CloudflareError::Spawn {
                command: command.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            error!("Command failed: {} {}", output.status, stderr);
            return Err(CloudflareError::Command {
                command,
                status: output.status.to_string(),
                stderr,
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[async_trait]
impl TunnelProvider for CloudflaredTunnels {
    async fn create(
        &self,
        name: &str,
        scratch_path: &Path,
    ) -> Result<ProvisionedTunnel, ProviderError> {
        let scratch = scratch_path.display().to_string();
        let stdout = self
            .run(&[
                "create",
                "--output",
                "json",
                "--credentials-file",
                &scratch,
                name,
            ])
            .await?;

        let tunnel: TunnelInfo = parse_json(&stdout)?;
        let bundle = tokio::fs::read(scratch_path)
            .await
            .map_err(CloudflareError::Io)?;
        info!("cloudflared created tunnel {} ({})", tunnel.name, tunnel.id);

        Ok(ProvisionedTunnel {
            id: tunnel.id,
            name: tunnel.name,
            bundle,
        })
    }

    async fn find(&self, name: &str) -> Result<Option<TunnelRef>, ProviderError> {
        let stdout = self
            .run(&["list", "--output", "json", "--name", name])
            .await?;
        let tunnels: Vec<TunnelInfo> = parse_json(&stdout)?;

        Ok(tunnels
            .into_iter()
            .find(|t| t.name == name && t.is_live())
            .map(|t| TunnelRef {
                id: t.id,
                name: t.name,
            }))
    }

    async fn delete(&self, tunnel_id: &str) -> Result<Removal, ProviderError> {
        match self.run(&["delete", "--force", tunnel_id]).await {
            Ok(_) => Ok(Removal::Removed),
            Err(CloudflareError::Command { ref stderr, .. }) if is_not_found(stderr) => {
                Ok(Removal::AlreadyAbsent)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn route_target(&self, tunnel_id: &str) -> String {
        format!("{}.{}", tunnel_id, ROUTE_TARGET_SUFFIX)
    }
}

/// Parse JSON from CLI stdout, skipping any log lines printed before it
fn parse_json<T: serde::de::DeserializeOwned>(stdout: &str) -> Result<T, CloudflareError> {
    let start = stdout
        .find(|c| c == '{' || c == '[')
        .ok_or_else(|| CloudflareError::Parse(format!("no JSON in output: {}", stdout.trim())))?;
    serde_json::from_str(&stdout[start..]).map_err(|e| CloudflareError::Parse(e.to_string()))
}

fn is_not_found(stderr: &str) -> bool {
    let lower = stderr.to_ascii_lowercase();
    lower.contains("not found") || lower.contains("does not exist") || lower.contains("no tunnel")
}
