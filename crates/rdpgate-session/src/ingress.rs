//! Ingress mapping consumed by the tunnel client
//!
//! One hostname rule pointing at the local desktop service, followed by a
//! catch-all that refuses every other hostname.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::artifact;
use crate::error::SessionError;

/// Catch-all rule: anything not matching the session hostname gets a 404
pub const CATCH_ALL_SERVICE: &str = "http_status:404";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressConfig {
    pub tunnel: String,
    #[serde(rename = "credentials-file")]
    pub credentials_file: PathBuf,
    pub ingress: Vec<IngressRule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    pub service: String,
}

impl IngressConfig {
    pub fn for_session(
        tunnel_id: &str,
        bundle_path: &Path,
        fqdn: &str,
        local_service: &str,
    ) -> Self {
        Self {
            tunnel: tunnel_id.to_string(),
            credentials_file: bundle_path.to_path_buf(),
            ingress: vec![
                IngressRule {
                    hostname: Some(fqdn.to_string()),
                    service: local_service.to_string(),
                },
                IngressRule {
                    hostname: None,
                    service: CATCH_ALL_SERVICE.to_string(),
                },
            ],
        }
    }

    pub fn render(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

/// Write the config as a 0600 file, owned by `owner` when given
pub async fn write(
    path: &Path,
    config: &IngressConfig,
    owner: Option<&str>,
) -> Result<(), SessionError> {
    let yaml = config.render().map_err(|e| {
        SessionError::local(
            "render",
            path,
            std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        )
    })?;

    artifact::write_private(path, yaml.as_bytes()).await?;

    if let Some(user) = owner {
        artifact::chown_to_user(path, user)?;
    }
    Ok(())
}

/// Read back a written config; `None` when it is missing or unparsable
pub async fn read(path: &Path) -> Option<IngressConfig> {
    let yaml = tokio::fs::read_to_string(path).await.ok()?;
    serde_yaml::from_str(&yaml).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> IngressConfig {
        IngressConfig::for_session(
            "6ff42ae2-765d-4adf-8112-31c55c1551ef",
            Path::new("/etc/cloudflared/6ff42ae2-765d-4adf-8112-31c55c1551ef.json"),
            "rdp-0011aabb.rdp.example.com",
            "rdp://localhost:3389",
        )
    }

    #[test]
    fn test_rules_end_with_catch_all() {
        let config = sample();
        assert_eq!(config.ingress.len(), 2);
        assert_eq!(
            config.ingress[0].hostname.as_deref(),
            Some("rdp-0011aabb.rdp.example.com")
        );
        assert_eq!(config.ingress[0].service, "rdp://localhost:3389");
        assert!(config.ingress[1].hostname.is_none());
        assert_eq!(config.ingress[1].service, CATCH_ALL_SERVICE);
    }

    #[test]
    fn test_render_uses_client_keys() {
        let yaml = sample().render().unwrap();
        assert!(yaml.contains("tunnel: 6ff42ae2-765d-4adf-8112-31c55c1551ef"));
        assert!(yaml.contains(
            "credentials-file: /etc/cloudflared/6ff42ae2-765d-4adf-8112-31c55c1551ef.json"
        ));
        assert!(yaml.contains("hostname: rdp-0011aabb.rdp.example.com"));
        assert!(yaml.contains("service: http_status:404"));

        let parsed: IngressConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, sample());
    }

    #[tokio::test]
    async fn test_write_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let path = temp.path().join("rdp-0011aabb.yml");
        write(&path, &sample(), None).await.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
        assert!(std::fs::read_to_string(&path)
            .unwrap()
            .contains("ingress:"));

        assert_eq!(read(&path).await, Some(sample()));
        assert_eq!(read(&temp.path().join("missing.yml")).await, None);
    }
}
