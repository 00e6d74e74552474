//! Checks run before any resource is touched

use std::path::{Path, PathBuf};

use rdpgate_session::SessionError;

/// Host tools every mutating command shells out to
pub const HOST_TOOLS: &[&str] = &["systemctl", "systemd-run"];

/// Fail unless running with an effective uid of 0
pub fn require_root() -> Result<(), SessionError> {
    if nix::unistd::Uid::effective().is_root() {
        Ok(())
    } else {
        Err(SessionError::Precondition(
            "must run as root (service units and /etc/cloudflared are system-wide)".to_string(),
        ))
    }
}

/// Resolve each tool on PATH (or as given, when it is a path); all missing
/// tools are reported at once
pub fn require_tools<P: AsRef<Path>>(tools: &[P]) -> Result<Vec<PathBuf>, SessionError> {
    let mut found = Vec::new();
    let mut missing = Vec::new();
    for tool in tools {
        match which::which(tool.as_ref()) {
            Ok(path) => found.push(path),
            Err(_) => missing.push(tool.as_ref().display().to_string()),
        }
    }

    if missing.is_empty() {
        Ok(found)
    } else {
        Err(SessionError::Precondition(format!(
            "required tool(s) not found: {}",
            missing.join(", ")
        )))
    }
}
