//! Runtime settings
//!
//! Loaded from an optional JSON file (missing file means defaults); the CLI
//! then overlays environment-provided values such as the base domain and the
//! provider API credentials.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// Base domain used when neither the config file nor the environment sets one
pub const DEFAULT_BASE_DOMAIN: &str = "rdp.accesscontrole.com";

/// Local desktop endpoint the ingress rule points at
pub const DEFAULT_LOCAL_SERVICE: &str = "rdp://localhost:3389";

/// Username minted when a create request names none
pub const DEFAULT_USERNAME: &str = "admin";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Domain under which session hostnames are published
    pub base_domain: String,
    /// Service URL the ingress rule routes the hostname to
    pub local_service: String,
    /// Fallback username for create requests without users
    pub default_username: String,
    /// Account the tunnel client runs as; root when unset
    pub service_user: Option<String>,
    /// Tunnel client executable
    pub cloudflared_bin: PathBuf,
    /// Account certificate for tunnel management; the client default when unset
    pub origin_cert: Option<PathBuf>,
    pub layout: Layout,
    pub liveness: LivenessSettings,
    pub dns: DnsSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_domain: DEFAULT_BASE_DOMAIN.to_string(),
            local_service: DEFAULT_LOCAL_SERVICE.to_string(),
            default_username: DEFAULT_USERNAME.to_string(),
            service_user: None,
            cloudflared_bin: PathBuf::from("cloudflared"),
            origin_cert: None,
            layout: Layout::default(),
            liveness: LivenessSettings::default(),
            dns: DnsSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from a JSON file, falling back to defaults when it is absent
    pub fn load(path: &Path) -> Result<Self, SessionError> {
        let json = match fs::read_to_string(path) {
            Ok(json) => json,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(SessionError::Config {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })
            }
        };

        let settings: Settings = serde_json::from_str(&json).map_err(|e| SessionError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        settings.validate().map_err(|message| SessionError::Config {
            path: path.to_path_buf(),
            message,
        })?;

        Ok(settings)
    }

    /// Check values that would otherwise produce broken artifact names
    pub fn validate(&self) -> Result<(), String> {
        let domain = self.base_domain.trim_matches('.');
        if domain.is_empty() {
            return Err("base_domain cannot be empty".to_string());
        }
        if !domain
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
        {
            return Err(format!(
                "base_domain '{}' may only contain letters, digits, hyphens and dots",
                self.base_domain
            ));
        }
        if self.local_service.is_empty() {
            return Err("local_service cannot be empty".to_string());
        }
        if self.liveness.timeout_secs == 0 {
            return Err("liveness.timeout_secs must be positive".to_string());
        }
        Ok(())
    }
}

/// Directories holding per-session artifacts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Layout {
    /// Provider credential bundles, one per tunnel
    pub tunnel_credentials_dir: PathBuf,
    /// Ingress mapping files
    pub ingress_dir: PathBuf,
    /// Per-session desktop login secrets
    pub credentials_dir: PathBuf,
    /// Tunnel client stdout/stderr
    pub log_dir: PathBuf,
    /// Supervisor unit files
    pub unit_dir: PathBuf,
}

impl Default for Layout {
    fn default() -> Self {
        Self::rooted_at(Path::new("/"))
    }
}

impl Layout {
    /// Standard layout below an arbitrary root (useful for tests and chroots)
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            tunnel_credentials_dir: root.join("etc/cloudflared"),
            ingress_dir: root.join("etc/cloudflared/sessions"),
            credentials_dir: root.join("var/lib/rdpgate/credentials"),
            log_dir: root.join("var/log/rdpgate"),
            unit_dir: root.join("etc/systemd/system"),
        }
    }
}

/// Bounds of the post-start health gate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LivenessSettings {
    pub timeout_secs: u64,
    pub poll_interval_ms: u64,
    /// Log lines surfaced when the gate fails
    pub log_excerpt_lines: usize,
}

impl Default for LivenessSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            poll_interval_ms: 500,
            log_excerpt_lines: 20,
        }
    }
}

impl LivenessSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

/// DNS provider credentials; DNS steps are skipped unless both are present
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DnsSettings {
    pub api_token: Option<String>,
    pub zone_id: Option<String>,
}

impl DnsSettings {
    /// `(api_token, zone_id)` when DNS management is enabled
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.api_token.as_deref(), self.zone_id.as_deref()) {
            (Some(token), Some(zone)) if !token.is_empty() && !zone.is_empty() => {
                Some((token, zone))
            }
            _ => None,
        }
    }
}

impl std::fmt::Debug for DnsSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DnsSettings")
            .field("api_token", &self.api_token.as_ref().map(|_| "<redacted>"))
            .field("zone_id", &self.zone_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.base_domain, "rdp.accesscontrole.com");
        assert_eq!(settings.local_service, "rdp://localhost:3389");
        assert!(settings.dns.credentials().is_none());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let temp = TempDir::new().unwrap();
        let settings = Settings::load(&temp.path().join("absent.json")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_unreadable_file_is_an_error() {
        use std::os::unix::fs::PermissionsExt;

        // Root reads through the mode bits
        if nix::unistd::Uid::effective().is_root() {
            return;
        }
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        fs::write(&path, r#"{"base_domain": "desk.example.org"}"#).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o000)).unwrap();

        match Settings::load(&path) {
            Err(SessionError::Config { path: p, message }) => {
                assert_eq!(p, path);
                assert!(message.to_lowercase().contains("permission denied"), "{}", message);
            }
            other => panic!("expected a config error, got {:?}", other),
        }
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        fs::write(
            &path,
            r#"{"base_domain": "desk.example.org", "liveness": {"timeout_secs": 30}}"#,
        )
        .unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.base_domain, "desk.example.org");
        assert_eq!(settings.liveness.timeout_secs, 30);
        assert_eq!(settings.liveness.poll_interval_ms, 500);
        assert_eq!(settings.layout, Layout::default());
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            Settings::load(&path),
            Err(SessionError::Config { .. })
        ));

        fs::write(&path, r#"{"base_domain": "bad domain"}"#).unwrap();
        assert!(matches!(
            Settings::load(&path),
            Err(SessionError::Config { .. })
        ));
    }

    #[test]
    fn test_dns_credentials_require_both_values() {
        let mut dns = DnsSettings {
            api_token: Some("token".to_string()),
            zone_id: None,
        };
        assert!(dns.credentials().is_none());

        dns.zone_id = Some(String::new());
        assert!(dns.credentials().is_none());

        dns.zone_id = Some("zone".to_string());
        assert_eq!(dns.credentials(), Some(("token", "zone")));
    }

    #[test]
    fn test_debug_redacts_token() {
        let dns = DnsSettings {
            api_token: Some("super-secret".to_string()),
            zone_id: Some("zone".to_string()),
        };
        let rendered = format!("{:?}", dns);
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("zone"));
    }
}
