//! In-process expiry scheduler
//!
//! For hosts that embed the session core in a long-running process: each TTL
//! is a tokio task tracked by trigger name. When it fires, the session id is
//! sent on a channel that [`crate::SessionManager::serve_expirations`] drains
//! into teardown. Cancelling aborts the task.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::naming::SessionId;
use crate::provider::{ExpiryHandle, ExpiryScheduler, ProviderError, Removal};
use crate::task_tracker::TaskTracker;

pub struct InProcessExpiryScheduler {
    tracker: Arc<TaskTracker>,
    fired: mpsc::UnboundedSender<SessionId>,
}

impl InProcessExpiryScheduler {
    /// Create the scheduler and the receiving end of its expiry channel
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SessionId>) {
        let (fired, expirations) = mpsc::unbounded_channel();
        (
            Self {
                tracker: Arc::new(TaskTracker::new()),
                fired,
            },
            expirations,
        )
    }

    /// Number of triggers waiting to fire
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }
}

#[async_trait]
impl ExpiryScheduler for InProcessExpiryScheduler {
    async fn schedule(
        &self,
        session: &SessionId,
        trigger_name: &str,
        ttl: Duration,
    ) -> Result<ExpiryHandle, ProviderError> {
        let tracker = Arc::clone(&self.tracker);
        let fired = self.fired.clone();
        let name = trigger_name.to_string();
        let id = session.clone();
        let (start, started) = oneshot::channel::<()>();

        // Held until registered, so a short TTL cannot release an unknown name
        let task = tokio::spawn(async move {
            if started.await.is_err() {
                return;
            }
            tokio::time::sleep(ttl).await;
            // Teardown cancels the trigger; it must not abort this task mid-send
            tracker.release(&name);
            info!("Session {} expired", id);
            if fired.send(id).is_err() {
                debug!("Expiry receiver dropped; nothing will tear the session down");
            }
        });
        self.tracker.register(trigger_name.to_string(), task);
        let _ = start.send(());

        Ok(ExpiryHandle {
            session_id: session.clone(),
            trigger_name: trigger_name.to_string(),
            fires_at: chrono::Duration::from_std(ttl).ok().map(|d| Utc::now() + d),
        })
    }

    async fn cancel(&self, handle: &ExpiryHandle) -> Result<Removal, ProviderError> {
        if self.tracker.cancel(&handle.trigger_name) {
            Ok(Removal::Removed)
        } else {
            Ok(Removal::AlreadyAbsent)
        }
    }

    async fn is_pending(&self, handle: &ExpiryHandle) -> Result<bool, ProviderError> {
        Ok(self.tracker.contains(&handle.trigger_name))
    }
}
