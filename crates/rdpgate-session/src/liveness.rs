//! Post-start health gate
//!
//! DNS is only published once the supervised tunnel client reports running,
//! so no hostname ever points at a dead backend.

use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::provider::{ProviderError, ServiceSupervisor, UnitState};

#[derive(Debug)]
pub enum LivenessError {
    /// Deadline passed; carries the last state observed
    TimedOut(UnitState),
    /// The supervisor could not be queried
    Probe(ProviderError),
}

/// Poll `unit` until it is running or `timeout` elapses
pub async fn wait_until_running(
    supervisor: &dyn ServiceSupervisor,
    unit: &str,
    timeout: Duration,
    interval: Duration,
) -> Result<(), LivenessError> {
    let deadline = Instant::now() + timeout;

    loop {
        let state = supervisor
            .state(unit)
            .await
            .map_err(LivenessError::Probe)?;
        debug!("Unit {} state: {}", unit, state);

        if state == UnitState::Running {
            return Ok(());
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(LivenessError::TimedOut(state));
        }
        tokio::time::sleep(interval.min(deadline - now)).await;
    }
}
