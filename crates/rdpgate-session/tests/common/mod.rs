//! In-memory providers shared by the lifecycle tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rdpgate_session::{
    DnsProvider, DnsRecord, InProcessExpiryScheduler, Layout, LivenessSettings, ProviderError,
    ProvisionedTunnel, Removal, ServiceSupervisor, SessionId, SessionManager, Settings,
    TunnelProvider, TunnelRef, UnitSpec, UnitState,
};
use tempfile::TempDir;
use tokio::sync::mpsc;

pub const BASE_DOMAIN: &str = "rdp.example.com";

/// Tunnel registry keyed by tunnel name
#[derive(Default)]
pub struct FakeTunnels {
    tunnels: Mutex<HashMap<String, TunnelRef>>,
    next: AtomicUsize,
    pub fail_create: AtomicBool,
    /// Register the tunnel and write the bundle, then fail to report it
    pub garble_create_output: AtomicBool,
    pub fail_delete: AtomicBool,
}

impl FakeTunnels {
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tunnels.lock().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn id_of(&self, name: &str) -> Option<String> {
        self.tunnels.lock().unwrap().get(name).map(|t| t.id.clone())
    }

    /// Drop a registration behind the orchestrator's back
    pub fn forget(&self, name: &str) {
        self.tunnels.lock().unwrap().remove(name);
    }
}

#[async_trait]
impl TunnelProvider for FakeTunnels {
    async fn create(
        &self,
        name: &str,
        scratch_path: &Path,
    ) -> Result<ProvisionedTunnel, ProviderError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(ProviderError::Rejected("tunnel quota exceeded".to_string()));
        }

        let n = self.next.fetch_add(1, Ordering::SeqCst);
        let id = format!("6ff42ae2-765d-4adf-8112-{:012x}", n);
        let bundle = format!("{{\"TunnelID\":\"{}\",\"TunnelSecret\":\"c2VjcmV0\"}}", id);

        // Mimic the client tool, which writes the bundle itself
        std::fs::write(scratch_path, &bundle)?;

        let mut tunnels = self.tunnels.lock().unwrap();
        if tunnels.contains_key(name) {
            return Err(ProviderError::Rejected(format!("tunnel {} already exists", name)));
        }
        tunnels.insert(
            name.to_string(),
            TunnelRef {
                id: id.clone(),
                name: name.to_string(),
            },
        );
        if self.garble_create_output.load(Ordering::SeqCst) {
            return Err(ProviderError::Protocol("no JSON in output".to_string()));
        }

        Ok(ProvisionedTunnel {
            id,
            name: name.to_string(),
            bundle: bundle.into_bytes(),
        })
    }

    async fn find(&self, name: &str) -> Result<Option<TunnelRef>, ProviderError> {
        Ok(self.tunnels.lock().unwrap().get(name).cloned())
    }

    async fn delete(&self, tunnel_id: &str) -> Result<Removal, ProviderError> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(ProviderError::Transport("connection reset".to_string()));
        }
        let mut tunnels = self.tunnels.lock().unwrap();
        let before = tunnels.len();
        tunnels.retain(|_, t| t.id != tunnel_id);
        Ok(if tunnels.len() < before {
            Removal::Removed
        } else {
            Removal::AlreadyAbsent
        })
    }

    fn route_target(&self, tunnel_id: &str) -> String {
        format!("{}.cfargotunnel.com", tunnel_id)
    }
}

/// DNS zone keyed by record id
#[derive(Default)]
pub struct FakeDns {
    records: Mutex<HashMap<String, DnsRecord>>,
    next: AtomicUsize,
    pub fail_create: AtomicBool,
    pub fail_delete: AtomicBool,
}

impl FakeDns {
    pub fn records_named(&self, name: &str) -> Vec<DnsRecord> {
        self.records
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.name == name)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    /// Add a record as if someone created it by hand
    pub fn insert(&self, name: &str, content: &str) {
        let id = format!("manual-{}", self.next.fetch_add(1, Ordering::SeqCst));
        self.records.lock().unwrap().insert(
            id.clone(),
            DnsRecord {
                id,
                name: name.to_string(),
                content: content.to_string(),
            },
        );
    }
}

#[async_trait]
impl DnsProvider for FakeDns {
    async fn create_cname(&self, name: &str, target: &str) -> Result<DnsRecord, ProviderError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(ProviderError::Rejected("81053: record already exists".to_string()));
        }
        let id = format!("rec-{}", self.next.fetch_add(1, Ordering::SeqCst));
        let record = DnsRecord {
            id: id.clone(),
            name: name.to_string(),
            content: target.to_string(),
        };
        self.records.lock().unwrap().insert(id, record.clone());
        Ok(record)
    }

    async fn list(&self, name: &str) -> Result<Vec<DnsRecord>, ProviderError> {
        Ok(self.records_named(name))
    }

    async fn delete(&self, record_id: &str) -> Result<Removal, ProviderError> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(ProviderError::Rejected("10000: authentication error".to_string()));
        }
        Ok(match self.records.lock().unwrap().remove(record_id) {
            Some(_) => Removal::Removed,
            None => Removal::AlreadyAbsent,
        })
    }
}

/// Service supervisor that tracks unit state in memory
#[derive(Default)]
pub struct FakeSupervisor {
    units: Mutex<HashMap<String, (UnitSpec, UnitState)>>,
    /// Units start but immediately fail
    pub never_runs: AtomicBool,
}

impl FakeSupervisor {
    pub fn unit(&self, name: &str) -> Option<UnitSpec> {
        self.units.lock().unwrap().get(name).map(|(spec, _)| spec.clone())
    }

    pub fn len(&self) -> usize {
        self.units.lock().unwrap().len()
    }
}

#[async_trait]
impl ServiceSupervisor for FakeSupervisor {
    async fn register(&self, unit: &UnitSpec) -> Result<(), ProviderError> {
        self.units
            .lock()
            .unwrap()
            .insert(unit.name.clone(), (unit.clone(), UnitState::Inactive));
        Ok(())
    }

    async fn start(&self, unit_name: &str) -> Result<(), ProviderError> {
        let mut units = self.units.lock().unwrap();
        let (spec, state) = units
            .get_mut(unit_name)
            .ok_or_else(|| ProviderError::NotFound(unit_name.to_string()))?;

        let (next, line) = if self.never_runs.load(Ordering::SeqCst) {
            (UnitState::Failed, "ERR failed to dial edge: connection refused")
        } else {
            (UnitState::Running, "INF Registered tunnel connection")
        };
        *state = next;

        let mut log = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&spec.log_path)?;
        writeln!(log, "{}", line)?;
        Ok(())
    }

    async fn state(&self, unit_name: &str) -> Result<UnitState, ProviderError> {
        Ok(self
            .units
            .lock()
            .unwrap()
            .get(unit_name)
            .map(|(_, state)| *state)
            .unwrap_or(UnitState::NotFound))
    }

    async fn stop(&self, unit_name: &str) -> Result<Removal, ProviderError> {
        match self.units.lock().unwrap().get_mut(unit_name) {
            Some((_, state)) => {
                *state = UnitState::Inactive;
                Ok(Removal::Removed)
            }
            None => Ok(Removal::AlreadyAbsent),
        }
    }

    async fn remove(&self, unit_name: &str) -> Result<Removal, ProviderError> {
        Ok(match self.units.lock().unwrap().remove(unit_name) {
            Some(_) => Removal::Removed,
            None => Removal::AlreadyAbsent,
        })
    }
}

/// A session manager wired to fakes under a scratch root
pub struct Harness {
    pub temp: TempDir,
    pub manager: Arc<SessionManager>,
    pub tunnels: Arc<FakeTunnels>,
    pub dns: Arc<FakeDns>,
    pub supervisor: Arc<FakeSupervisor>,
    pub scheduler: Arc<InProcessExpiryScheduler>,
    pub expirations: Option<mpsc::UnboundedReceiver<SessionId>>,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(true, None)
    }

    /// No DNS credentials configured
    pub fn without_dns() -> Self {
        Self::build(false, None)
    }

    /// Tunnel client runs as `user`
    pub fn with_service_user(user: &str) -> Self {
        Self::build(true, Some(user))
    }

    fn build(with_dns: bool, service_user: Option<&str>) -> Self {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        let temp = TempDir::new().unwrap();
        let settings = Settings {
            base_domain: BASE_DOMAIN.to_string(),
            service_user: service_user.map(str::to_string),
            layout: Layout::rooted_at(temp.path()),
            liveness: LivenessSettings {
                timeout_secs: 1,
                poll_interval_ms: 50,
                log_excerpt_lines: 5,
            },
            ..Settings::default()
        };

        let tunnels = Arc::new(FakeTunnels::default());
        let dns = Arc::new(FakeDns::default());
        let supervisor = Arc::new(FakeSupervisor::default());
        let (scheduler, expirations) = InProcessExpiryScheduler::new();
        let scheduler = Arc::new(scheduler);

        let mut manager = SessionManager::new(
            settings,
            tunnels.clone(),
            supervisor.clone(),
            scheduler.clone(),
        );
        if with_dns {
            manager = manager.with_dns(dns.clone());
        }

        Self {
            temp,
            manager: Arc::new(manager),
            tunnels,
            dns,
            supervisor,
            scheduler,
            expirations: Some(expirations),
        }
    }

    pub fn layout(&self) -> &Layout {
        &self.manager.settings().layout
    }

    /// Files left in the tunnel-credentials directory
    pub fn bundle_files(&self) -> Vec<PathBuf> {
        files_in(&self.layout().tunnel_credentials_dir)
    }

    pub fn ingress_files(&self) -> Vec<PathBuf> {
        files_in(&self.layout().ingress_dir)
    }
}

pub fn files_in(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();
    files.sort();
    files
}

pub fn mode_of(path: &Path) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path).unwrap().permissions().mode() & 0o777
}
