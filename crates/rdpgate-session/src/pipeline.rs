//! Typed steps of the create and teardown pipelines
//!
//! Both workflows are a plain finite sequence. Each step yields a tagged
//! [`StepOutcome`] which is recorded in order, so callers (and tests) can see
//! exactly how far a run got and what each step did.

use std::fmt;

use crate::error::StepFailure;
use crate::naming::SessionId;

/// Create steps in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CreateStep {
    Identity,
    TunnelRegistration,
    IngressConfig,
    ServiceInstall,
    LivenessCheck,
    DnsPublish,
    CredentialMint,
    ExpirySchedule,
}

impl fmt::Display for CreateStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CreateStep::Identity => "session identity",
            CreateStep::TunnelRegistration => "tunnel registration",
            CreateStep::IngressConfig => "ingress config",
            CreateStep::ServiceInstall => "service install",
            CreateStep::LivenessCheck => "liveness check",
            CreateStep::DnsPublish => "DNS publish",
            CreateStep::CredentialMint => "credential mint",
            CreateStep::ExpirySchedule => "expiry schedule",
        };
        f.write_str(name)
    }
}

/// Teardown steps in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TeardownStep {
    ServiceRemoval,
    IngressRemoval,
    ExpiryCancel,
    CredentialRemoval,
    LogRemoval,
    DnsCleanup,
    TunnelDeregistration,
    BundleCleanup,
}

impl TeardownStep {
    /// Best-effort steps log failures and never fail the invocation
    pub fn is_best_effort(&self) -> bool {
        matches!(
            self,
            TeardownStep::DnsCleanup | TeardownStep::TunnelDeregistration | TeardownStep::BundleCleanup
        )
    }
}

impl fmt::Display for TeardownStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TeardownStep::ServiceRemoval => "service removal",
            TeardownStep::IngressRemoval => "ingress removal",
            TeardownStep::ExpiryCancel => "expiry cancel",
            TeardownStep::CredentialRemoval => "credential removal",
            TeardownStep::LogRemoval => "log removal",
            TeardownStep::DnsCleanup => "DNS cleanup",
            TeardownStep::TunnelDeregistration => "tunnel deregistration",
            TeardownStep::BundleCleanup => "bundle cleanup",
        };
        f.write_str(name)
    }
}

/// Result of one pipeline step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Step acted; the detail says what it did
    Done(String),
    /// Step deliberately not executed
    Skipped(String),
    /// Nothing to remove
    AlreadyAbsent,
    Failed(String),
}

impl StepOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, StepOutcome::Failed(_))
    }
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepOutcome::Done(detail) => write!(f, "done ({})", detail),
            StepOutcome::Skipped(reason) => write!(f, "skipped ({})", reason),
            StepOutcome::AlreadyAbsent => write!(f, "already absent"),
            StepOutcome::Failed(message) => write!(f, "FAILED ({})", message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRecord<S> {
    pub step: S,
    pub outcome: StepOutcome,
}

/// Per-step account of one teardown run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeardownReport {
    pub session: SessionId,
    pub fqdn: String,
    pub steps: Vec<StepRecord<TeardownStep>>,
}

impl TeardownReport {
    pub fn new(session: SessionId, fqdn: String) -> Self {
        Self {
            session,
            fqdn,
            steps: Vec::new(),
        }
    }

    pub fn record(&mut self, step: TeardownStep, outcome: StepOutcome) {
        self.steps.push(StepRecord { step, outcome });
    }

    pub fn outcome(&self, step: TeardownStep) -> Option<&StepOutcome> {
        self.steps
            .iter()
            .find(|r| r.step == step)
            .map(|r| &r.outcome)
    }

    /// Failed steps that make the invocation fail
    pub fn fatal_failures(&self) -> Vec<StepFailure> {
        self.failures(false)
    }

    /// Failed best-effort steps: provider-side resources that may have leaked
    pub fn possible_leaks(&self) -> Vec<StepFailure> {
        self.failures(true)
    }

    /// True when the run found nothing to remove
    pub fn was_noop(&self) -> bool {
        self.steps.iter().all(|r| {
            matches!(
                r.outcome,
                StepOutcome::AlreadyAbsent | StepOutcome::Skipped(_)
            )
        })
    }

    fn failures(&self, best_effort: bool) -> Vec<StepFailure> {
        self.steps
            .iter()
            .filter(|r| r.step.is_best_effort() == best_effort)
            .filter_map(|r| match &r.outcome {
                StepOutcome::Failed(message) => Some(StepFailure {
                    step: r.step,
                    message: message.clone(),
                }),
                _ => None,
            })
            .collect()
    }
}
