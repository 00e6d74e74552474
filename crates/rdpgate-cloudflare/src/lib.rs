//! Cloudflare adapters for the session core
//!
//! - [`CloudflaredTunnels`]: named-tunnel registry through the `cloudflared` CLI
//! - [`CloudflareDns`]: zone records through the Cloudflare v4 REST API

pub mod dns;
pub mod error;
pub mod tunnel;

pub use dns::{CloudflareDns, DEFAULT_API_BASE};
pub use error::CloudflareError;
pub use tunnel::{CloudflaredTunnels, ROUTE_TARGET_SUFFIX};
