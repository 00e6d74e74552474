//! Error taxonomy for session create/teardown

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::naming::SessionId;
use crate::pipeline::{CreateStep, StepRecord, TeardownStep};
use crate::provider::ProviderError;

/// Errors that terminate a create or teardown invocation
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid configuration {path:?}: {message}")]
    Config { path: PathBuf, message: String },

    /// Missing tool or insufficient privilege, raised before any resource exists
    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Entropy source unavailable: {0}")]
    Entropy(String),

    /// Provider rejected tunnel registration, DNS publication or route binding
    #[error("{step} rejected by provider: {source}")]
    ProviderCall {
        step: CreateStep,
        #[source]
        source: ProviderError,
    },

    #[error(
        "Service {unit} did not reach a running state within {}s\n--- last log lines ---\n{log_excerpt}",
        .timeout.as_secs()
    )]
    Liveness {
        unit: String,
        timeout: Duration,
        log_excerpt: String,
    },

    #[error("Failed to {action} {path:?}: {source}")]
    LocalArtifact {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Service supervision or trigger scheduling command failed
    #[error("Service supervision failed for {unit}: {source}")]
    Supervisor {
        unit: String,
        #[source]
        source: ProviderError,
    },

    /// One or more local teardown steps failed after every step was attempted
    #[error("Teardown of {session} incomplete: {}", summarize(.failures))]
    Teardown {
        session: SessionId,
        failures: Vec<StepFailure>,
    },
}

impl SessionError {
    /// Process exit status for this failure kind
    pub fn exit_code(&self) -> u8 {
        match self {
            SessionError::InvalidInput(_) | SessionError::Config { .. } => 2,
            SessionError::Precondition(_) => 3,
            SessionError::ProviderCall { .. } => 4,
            SessionError::Liveness { .. } => 5,
            SessionError::Teardown { .. } => 6,
            SessionError::LocalArtifact { .. } => 7,
            SessionError::Supervisor { .. } => 8,
            SessionError::Entropy(_) => 9,
        }
    }

    pub(crate) fn local(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SessionError::LocalArtifact {
            action,
            path: path.into(),
            source,
        }
    }
}

/// A failed teardown step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepFailure {
    pub step: TeardownStep,
    pub message: String,
}

fn summarize(failures: &[StepFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({})", f.step, f.message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// A create invocation that stopped part-way
///
/// Create never rolls back. When `session_id` is set, some resources may
/// exist and teardown for that id reclaims them.
#[derive(Error, Debug)]
#[error("{error}")]
pub struct CreateFailure {
    pub session_id: Option<SessionId>,
    pub failed_step: CreateStep,
    /// Steps that finished before the failure, in order
    pub completed: Vec<StepRecord<CreateStep>>,
    #[source]
    pub error: SessionError,
}

impl CreateFailure {
    /// Whether anything was created that teardown has to reclaim
    ///
    /// Only an explicit rejection of the registration, or a precondition that
    /// failed before the provider was called, leaves nothing behind. Transport,
    /// protocol and IO failures may follow a registration the provider already
    /// accepted.
    pub fn needs_teardown(&self) -> bool {
        if self.session_id.is_none() || self.failed_step < CreateStep::TunnelRegistration {
            return false;
        }
        let nothing_registered = self.failed_step == CreateStep::TunnelRegistration
            && matches!(
                self.error,
                SessionError::ProviderCall {
                    source: ProviderError::Rejected(_),
                    ..
                } | SessionError::Precondition(_)
            );
        !nothing_registered
    }

    pub fn exit_code(&self) -> u8 {
        self.error.exit_code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct() {
        let errors = vec![
            SessionError::InvalidInput("x".into()),
            SessionError::Precondition("x".into()),
            SessionError::ProviderCall {
                step: CreateStep::DnsPublish,
                source: ProviderError::Rejected("x".into()),
            },
            SessionError::Liveness {
                unit: "u".into(),
                timeout: Duration::from_secs(1),
                log_excerpt: String::new(),
            },
            SessionError::Teardown {
                session: SessionId::parse("rdp-00000000").unwrap(),
                failures: vec![],
            },
            SessionError::LocalArtifact {
                action: "write",
                path: PathBuf::from("/x"),
                source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
            },
            SessionError::Supervisor {
                unit: "u".into(),
                source: ProviderError::Rejected("x".into()),
            },
            SessionError::Entropy("x".into()),
        ];

        let mut codes: Vec<u8> = errors.iter().map(|e| e.exit_code()).collect();
        assert!(codes.iter().all(|c| *c != 0));
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_liveness_message_carries_excerpt() {
        let err = SessionError::Liveness {
            unit: "rdpgate-tunnel-rdp-00000000.service".into(),
            timeout: Duration::from_secs(15),
            log_excerpt: "ERR failed to dial edge".into(),
        };
        let message = err.to_string();
        assert!(message.contains("within 15s"));
        assert!(message.contains("ERR failed to dial edge"));
    }

    #[test]
    fn test_teardown_message_lists_steps() {
        let err = SessionError::Teardown {
            session: SessionId::parse("rdp-00000000").unwrap(),
            failures: vec![
                StepFailure {
                    step: TeardownStep::ServiceRemoval,
                    message: "systemctl exited 1".into(),
                },
                StepFailure {
                    step: TeardownStep::LogRemoval,
                    message: "permission denied".into(),
                },
            ],
        };
        let message = err.to_string();
        assert!(message.contains("service removal (systemctl exited 1)"));
        assert!(message.contains("log removal (permission denied)"));
    }

    fn registration_failure(error: SessionError) -> CreateFailure {
        CreateFailure {
            session_id: Some(SessionId::parse("rdp-00000000").unwrap()),
            failed_step: CreateStep::TunnelRegistration,
            completed: vec![],
            error,
        }
    }

    #[test]
    fn test_only_a_rejected_registration_needs_no_teardown() {
        let rejected = registration_failure(SessionError::ProviderCall {
            step: CreateStep::TunnelRegistration,
            source: ProviderError::Rejected("quota".into()),
        });
        assert!(!rejected.needs_teardown());

        let precondition =
            registration_failure(SessionError::Precondition("cannot enter dir".into()));
        assert!(!precondition.needs_teardown());

        for source in [
            ProviderError::Protocol("no JSON in output".into()),
            ProviderError::Transport("timed out".into()),
            ProviderError::Io(std::io::Error::from(std::io::ErrorKind::BrokenPipe)),
        ] {
            let failure = registration_failure(SessionError::ProviderCall {
                step: CreateStep::TunnelRegistration,
                source,
            });
            assert!(failure.needs_teardown(), "{}", failure.error);
        }

        let bundle_write = registration_failure(SessionError::LocalArtifact {
            action: "write",
            path: PathBuf::from("/etc/cloudflared/x.json"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        });
        assert!(bundle_write.needs_teardown());
    }
}
