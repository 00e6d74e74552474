//! `cloudflared` adapter against a scripted stand-in binary

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use rdpgate_cloudflare::CloudflaredTunnels;
use rdpgate_session::{ProviderError, Removal, TunnelProvider};
use tempfile::TempDir;

const TUNNEL_ID: &str = "6ff42ae2-765d-4adf-8112-31c55c1551ef";

/// Write an executable shell script that records its arguments and replays
/// canned output per subcommand.
fn fake_cloudflared(dir: &Path) -> PathBuf {
    let script = format!(
        r#"#!/bin/sh
echo "$@" >> "{dir}/calls"
# the subcommand follows "tunnel" and any --origincert pair
shift
if [ "$1" = "--origincert" ]; then shift 2; fi
case "$1" in
  create)
    while [ "$#" -gt 1 ]; do
      if [ "$1" = "--credentials-file" ]; then
        printf '{{"AccountTag":"acct","TunnelID":"{id}","TunnelSecret":"c2VjcmV0"}}' > "$2"
      fi
      shift
    done
    echo "2026-10-14T10:00:00Z INF Tunnel credentials written" >&2
    printf '{{"id":"{id}","name":"%s","created_at":"2026-10-14T10:00:00Z","deleted_at":"0001-01-01T00:00:00Z","connections":[]}}' "$1"
    ;;
  list)
    if [ -f "{dir}/deleted" ]; then echo "[]"; exit 0; fi
    printf '[{{"id":"{id}","name":"rdp-0011aabb","deleted_at":"0001-01-01T00:00:00Z"}}]'
    ;;
  delete)
    if [ -f "{dir}/deleted" ]; then
      echo "Tunnel {id} not found" >&2
      exit 1
    fi
    touch "{dir}/deleted"
    ;;
  *)
    echo "unknown command $1" >&2
    exit 2
    ;;
esac
"#,
        dir = dir.display(),
        id = TUNNEL_ID
    );

    let path = dir.join("cloudflared");
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn calls(dir: &Path) -> String {
    std::fs::read_to_string(dir.join("calls")).unwrap_or_default()
}

#[tokio::test]
async fn test_create_returns_bundle_from_credentials_file() {
    let temp = TempDir::new().unwrap();
    let tunnels = CloudflaredTunnels::new(fake_cloudflared(temp.path()));
    let scratch = temp.path().join("rdp-0011aabb.json.partial");

    let tunnel = tunnels.create("rdp-0011aabb", &scratch).await.unwrap();
    assert_eq!(tunnel.id, TUNNEL_ID);
    assert_eq!(tunnel.name, "rdp-0011aabb");
    assert!(String::from_utf8(tunnel.bundle).unwrap().contains("TunnelSecret"));

    let log = calls(temp.path());
    assert!(log.contains("tunnel create --output json --credentials-file"));
    assert!(log.contains("rdp-0011aabb"));
}

#[tokio::test]
async fn test_find_then_delete_is_idempotent() {
    let temp = TempDir::new().unwrap();
    let tunnels = CloudflaredTunnels::new(fake_cloudflared(temp.path()));

    let found = tunnels.find("rdp-0011aabb").await.unwrap().unwrap();
    assert_eq!(found.id, TUNNEL_ID);
    assert!(tunnels.find("rdp-99999999").await.unwrap().is_none());

    assert_eq!(tunnels.delete(TUNNEL_ID).await.unwrap(), Removal::Removed);
    assert_eq!(tunnels.delete(TUNNEL_ID).await.unwrap(), Removal::AlreadyAbsent);
    assert!(tunnels.find("rdp-0011aabb").await.unwrap().is_none());

    assert!(calls(temp.path()).contains(&format!("tunnel delete --force {}", TUNNEL_ID)));
}

#[tokio::test]
async fn test_origin_cert_is_passed_through() {
    let temp = TempDir::new().unwrap();
    let tunnels = CloudflaredTunnels::new(fake_cloudflared(temp.path()))
        .with_origin_cert("/etc/cloudflared/cert.pem");

    tunnels.find("rdp-0011aabb").await.unwrap();
    assert!(calls(temp.path()).contains("tunnel --origincert /etc/cloudflared/cert.pem list"));
}

#[tokio::test]
async fn test_missing_binary_is_a_command_error() {
    let temp = TempDir::new().unwrap();
    let tunnels = CloudflaredTunnels::new(temp.path().join("does-not-exist"));

    let err = tunnels.find("rdp-0011aabb").await.unwrap_err();
    assert!(matches!(err, ProviderError::Command { .. }));
}
