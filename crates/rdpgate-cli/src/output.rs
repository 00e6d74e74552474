//! Operator-facing output
//!
//! Everything here goes to stdout; logs go to stderr.

use std::fmt::Write;

use rdpgate_session::{
    CreateFailure, CreateReport, DnsBinding, SessionId, SessionStatus, TeardownReport,
};

pub const API_OUTPUT_START: &str = "--- API_OUTPUT_START ---";
pub const API_OUTPUT_END: &str = "--- API_OUTPUT_END ---";

pub fn render_created(report: &CreateReport) -> String {
    let session = &report.session;
    let mut out = String::new();

    let _ = writeln!(out, "✅ Session {} is up", session.id);
    let _ = writeln!(out, "   Hostname:  {}", session.fqdn);
    let _ = writeln!(out, "   Tunnel:    {}", session.tunnel_id);
    match &session.dns {
        DnsBinding::Published { target, .. } => {
            let _ = writeln!(out, "   DNS:       {} -> {}", session.fqdn, target);
        }
        DnsBinding::Skipped(reason) => {
            let _ = writeln!(out, "   DNS:       skipped ({})", reason);
        }
    }
    match session.expires_at() {
        Some(at) => {
            let _ = writeln!(out, "   Expires:   {}", at.to_rfc3339());
        }
        None => {
            let _ = writeln!(out, "   Expires:   never (run `rdpgate teardown {}`)", session.id);
        }
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "Credentials:");
    for credential in &session.credentials {
        let _ = writeln!(out, "   {}", credential.to_line());
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "Artifacts:");
    let _ = writeln!(out, "   Unit:        {}", session.unit_path.display());
    let _ = writeln!(out, "   Config:      {}", session.config_path.display());
    let _ = writeln!(out, "   Bundle:      {}", session.tunnel_bundle_path.display());
    let _ = writeln!(out, "   Credentials: {}", session.credentials_path.display());
    let _ = writeln!(out, "   Log:         {}", session.log_path.display());

    let _ = writeln!(out);
    out.push_str(&render_api_block(report));
    out
}

/// Key/value block parsed by the session API
pub fn render_api_block(report: &CreateReport) -> String {
    let session = &report.session;
    let first = session.credentials.first();
    let expires = session
        .expires_at()
        .map(|at| at.to_rfc3339())
        .unwrap_or_else(|| "never".to_string());

    let mut out = String::new();
    let _ = writeln!(out, "{}", API_OUTPUT_START);
    let _ = writeln!(out, "SESSION_SUB={}", session.id);
    let _ = writeln!(out, "FQDN={}", session.fqdn);
    let _ = writeln!(out, "RDP_USERNAME={}", first.map(|c| c.username.as_str()).unwrap_or_default());
    let _ = writeln!(out, "RDP_PASSWORD={}", first.map(|c| c.secret.as_str()).unwrap_or_default());
    let _ = writeln!(out, "EXPIRES_AT={}", expires);
    let _ = writeln!(out, "{}", API_OUTPUT_END);
    out
}

pub fn render_create_failure(failure: &CreateFailure) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "❌ Create failed at {}: {}", failure.failed_step, failure.error);
    for record in &failure.completed {
        let _ = writeln!(out, "   {}: {}", record.step, record.outcome);
    }
    if let Some(id) = &failure.session_id {
        if failure.needs_teardown() {
            let _ = writeln!(out);
            let _ = writeln!(
                out,
                "Resources of {} may still exist. Reclaim them with: rdpgate teardown {}",
                id, id
            );
        }
    }
    out
}

pub fn render_teardown(report: &TeardownReport) -> String {
    let mut out = String::new();
    if report.was_noop() {
        let _ = writeln!(out, "Nothing left of {} ({})", report.session, report.fqdn);
    } else {
        let _ = writeln!(out, "🧹 Tore down {} ({})", report.session, report.fqdn);
    }
    for record in &report.steps {
        let _ = writeln!(out, "   {}: {}", record.step, record.outcome);
    }

    let leaks = report.possible_leaks();
    if !leaks.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "⚠️  Provider-side cleanup failed; these may have leaked:");
        for leak in leaks {
            let _ = writeln!(out, "   {}: {}", leak.step, leak.message);
        }
    }
    out
}

pub fn render_status(status: &SessionStatus) -> String {
    let names = &status.names;
    let mut out = String::new();
    let _ = writeln!(out, "Session {} ({})", names.id, names.fqdn);
    let _ = writeln!(out, "   Service:     {} ({})", names.unit_name, status.unit_state);
    let _ = writeln!(out, "   Config:      {}", presence(status.ingress_config, &names.config_path));
    let _ = writeln!(
        out,
        "   Credentials: {}",
        presence(status.credentials_file, &names.credentials_path)
    );
    let _ = writeln!(out, "   Log:         {}", presence(status.log_file, &names.log_path));
    let _ = writeln!(
        out,
        "   Expiry:      {}",
        if status.expiry_pending {
            format!("{} pending", names.expiry_trigger)
        } else {
            "none".to_string()
        }
    );
    out
}

pub fn render_list(sessions: &[SessionId], base_domain: &str) -> String {
    if sessions.is_empty() {
        return "No sessions on this host\n".to_string();
    }
    let mut out = String::new();
    for id in sessions {
        let _ = writeln!(out, "{}  {}", id, rdpgate_session::naming::fqdn(id, base_domain));
    }
    out
}

fn presence(present: bool, path: &std::path::Path) -> String {
    if present {
        path.display().to_string()
    } else {
        format!("absent ({})", path.display())
    }
}
