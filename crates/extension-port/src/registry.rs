//! Worker registry: `(role, tab)` to live port.

use crate::{Port, PortError, PortResult};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

/// Browser tab identifier.
pub type TabId = i64;

/// Kind of content script behind a port.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkerRole(Cow<'static, str>);

impl WorkerRole {
    /// Page integration script that can fill forms.
    pub const WEB_INTEGRATION: WorkerRole = WorkerRole(Cow::Borrowed("WebIntegration"));
    /// Quick access popup.
    pub const QUICK_ACCESS: WorkerRole = WorkerRole(Cow::Borrowed("QuickAccess"));
    /// Login page.
    pub const LOGIN: WorkerRole = WorkerRole(Cow::Borrowed("Login"));
    /// Bridge to browser APIs (tabs, crypto).
    pub const BROWSER: WorkerRole = WorkerRole(Cow::Borrowed("Browser"));

    pub fn new(role: impl Into<String>) -> Self {
        WorkerRole(Cow::Owned(role.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for WorkerRole {
    fn from(role: String) -> Self {
        WorkerRole::new(role)
    }
}

impl From<&str> for WorkerRole {
    fn from(role: &str) -> Self {
        WorkerRole::new(role)
    }
}

/// A registered worker.
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    pub role: WorkerRole,
    pub tab_id: TabId,
    pub port: Port,
}

type WorkerKey = (WorkerRole, TabId);

/// Live workers by role and tab.
#[derive(Clone, Default)]
pub struct WorkerRegistry {
    workers: Arc<Mutex<HashMap<WorkerKey, WorkerHandle>>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a port under `(role, tab_id)`, replacing any previous one.
    ///
    /// The entry is dropped automatically when the port's channel closes.
    pub fn register(&self, role: WorkerRole, tab_id: TabId, port: Port) -> WorkerHandle {
        let handle = WorkerHandle {
            role: role.clone(),
            tab_id,
            port,
        };
        let channel_id = handle.port.id();

        let previous = self
            .lock()
            .insert((role.clone(), tab_id), handle.clone());
        match previous {
            Some(old) if old.port.id() != channel_id => {
                info!(role = %role, tab_id, old = %old.port.id(), new = %channel_id, "Replaced worker");
            }
            _ => {
                info!(role = %role, tab_id, channel = %channel_id, "Registered worker");
            }
        }

        let closed = handle.port.channel().closed();
        let registry = self.clone();
        tokio::spawn(async move {
            closed.await;
            let mut workers = registry.lock();
            let key = (role, tab_id);
            if workers
                .get(&key)
                .is_some_and(|current| current.port.id() == channel_id)
            {
                workers.remove(&key);
                debug!(role = %key.0, tab_id, channel = %channel_id, "Worker channel closed, deregistered");
            }
        });

        handle
    }

    /// Resolve the live worker for `(role, tab_id)`.
    pub fn get(&self, role: &WorkerRole, tab_id: TabId) -> PortResult<WorkerHandle> {
        let mut workers = self.lock();
        let key = (role.clone(), tab_id);
        match workers.get(&key) {
            Some(handle) if !handle.port.is_closed() => Ok(handle.clone()),
            Some(_) => {
                workers.remove(&key);
                Err(PortError::WorkerNotFound {
                    role: role.clone(),
                    tab_id,
                })
            }
            None => Err(PortError::WorkerNotFound {
                role: role.clone(),
                tab_id,
            }),
        }
    }

    pub fn deregister(&self, role: &WorkerRole, tab_id: TabId) -> Option<WorkerHandle> {
        let removed = self.lock().remove(&(role.clone(), tab_id));
        if removed.is_some() {
            debug!(role = %role, tab_id, "Deregistered worker");
        }
        removed
    }

    /// Drop every worker of a closed tab.
    pub fn remove_tab(&self, tab_id: TabId) -> usize {
        let mut workers = self.lock();
        let before = workers.len();
        workers.retain(|(_, tab), _| *tab != tab_id);
        let removed = before - workers.len();
        if removed > 0 {
            debug!(tab_id, removed, "Removed workers of closed tab");
        }
        removed
    }

    pub fn workers(&self) -> Vec<WorkerHandle> {
        self.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<WorkerKey, WorkerHandle>> {
        self.workers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
