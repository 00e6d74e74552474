//! Subprocess helper for the host tools

use std::path::Path;

use rdpgate_session::ProviderError;
use tokio::process::Command;
use tracing::{debug, error};

pub(crate) struct Output {
    pub success: bool,
    pub status: String,
    pub stdout: String,
    pub stderr: String,
}

/// Run `program` and collect its output, whatever the exit status
pub(crate) async fn run(
    program: &Path,
    args: &[String],
    env: &[(String, String)],
) -> Result<Output, ProviderError> {
    let command = display(program, args);
    debug!("Running command: {}", command);

    let output = Command::new(program)
        .args(args)
        .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .output()
        .await
        .map_err(|e| ProviderError::Command {
            command: command.clone(),
            status: "not started".to_string(),
            stderr: e.to_string(),
        })?;

    Ok(Output {
        success: output.status.success(),
        status: output.status.to_string(),
        stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}

/// Like [`run`], failing on a non-zero exit
pub(crate) async fn run_checked(
    program: &Path,
    args: &[String],
    env: &[(String, String)],
) -> Result<Output, ProviderError> {
    let output = run(program, args, env).await?;
    if !output.success {
        let command = display(program, args);
        error!("Command failed: {} {}", output.status, output.stderr);
        return Err(ProviderError::Command {
            command,
            status: output.status,
            stderr: output.stderr,
        });
    }
    Ok(output)
}

pub(crate) fn args(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// systemd's wording for a unit it has no record of
pub(crate) fn is_not_loaded(stderr: &str) -> bool {
    stderr.contains("not loaded") || stderr.contains("does not exist") || stderr.contains("not found")
}

fn display(program: &Path, args: &[String]) -> String {
    format!("{} {}", program.display(), args.join(" "))
}
