//! Tracking of per-session background tasks
//!
//! Holds the JoinHandle of each pending task keyed by trigger name, so an
//! explicit teardown can abort a trigger before it fires.

use std::collections::HashMap;
use std::sync::Mutex;
use tokio::task::JoinHandle;

/// Background tasks keyed by name
pub struct TaskTracker {
    tasks: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl TaskTracker {
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Register a task, aborting any previous task under the same name
    pub fn register(&self, name: String, handle: JoinHandle<()>) {
        if let Ok(mut tasks) = self.tasks.lock() {
            if let Some(old_handle) = tasks.insert(name, handle) {
                old_handle.abort();
            }
        }
    }

    /// Remove and abort a task. Returns whether one was pending.
    pub fn cancel(&self, name: &str) -> bool {
        match self.tasks.lock() {
            Ok(mut tasks) => match tasks.remove(name) {
                Some(handle) => {
                    handle.abort();
                    true
                }
                None => false,
            },
            Err(_) => false,
        }
    }

    /// Forget a task without aborting it; called by the task itself once it fires
    pub fn release(&self, name: &str) -> bool {
        self.tasks
            .lock()
            .map(|mut tasks| tasks.remove(name).is_some())
            .unwrap_or(false)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tasks
            .lock()
            .map(|tasks| tasks.contains_key(name))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().map(|tasks| tasks.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TaskTracker {
    fn default() -> Self {
        Self::new()
    }
}
