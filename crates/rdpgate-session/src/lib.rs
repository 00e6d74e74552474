//! Session lifecycle core for ephemeral remote-desktop access
//!
//! A session binds a public hostname to the local desktop service through an
//! outbound-only tunnel. Creating one touches several independently failable
//! resources (tunnel registration, ingress config, supervised service, DNS
//! record, login credentials, expiry trigger); tearing one down reverses all
//! of them given nothing but the session id.
//!
//! Every external system is reached through a capability trait in
//! [`provider`], so the orchestrator in [`manager`] runs unchanged against the
//! real host adapters or against in-memory fakes.
//!
//! # Example
//!
//! ```ignore
//! use rdpgate_session::{CreateRequest, SessionManager, Settings};
//! use std::sync::Arc;
//!
//! # async fn example(
//! #     tunnels: Arc<dyn rdpgate_session::TunnelProvider>,
//! #     supervisor: Arc<dyn rdpgate_session::ServiceSupervisor>,
//! #     expiry: Arc<dyn rdpgate_session::ExpiryScheduler>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let manager = SessionManager::new(Settings::default(), tunnels, supervisor, expiry);
//!
//! let request = CreateRequest::parse(Some("alice,bob"), Some(2), "admin")?;
//! let report = manager.create(&request).await?;
//! println!("{}", report.session.fqdn);
//!
//! manager.teardown(&report.session.id).await?;
//! # Ok(())
//! # }
//! ```

pub mod artifact;
pub mod credentials;
pub mod error;
pub mod expiry;
pub mod identity;
pub mod ingress;
pub mod liveness;
pub mod manager;
pub mod naming;
pub mod pipeline;
pub mod provider;
pub mod session;
pub mod settings;
pub mod task_tracker;

mod create;
mod teardown;

pub use credentials::UserCredential;
pub use error::{CreateFailure, SessionError, StepFailure};
pub use expiry::InProcessExpiryScheduler;
pub use manager::{SessionManager, SessionStatus};
pub use naming::{SessionId, SessionNames};
pub use pipeline::{CreateStep, StepOutcome, StepRecord, TeardownReport, TeardownStep};
pub use provider::{
    DnsProvider, DnsRecord, ExpiryHandle, ExpiryScheduler, ProviderError, ProvisionedTunnel,
    Removal, ServiceSupervisor, TunnelProvider, TunnelRef, UnitSpec, UnitState,
};
pub use session::{CreateReport, CreateRequest, DnsBinding, Session};
pub use settings::{DnsSettings, Layout, LivenessSettings, Settings};
