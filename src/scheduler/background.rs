use std::sync::Arc;

use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::debug;

use super::Work;
use crate::{subscribe::SubscriptionHandle, FlowError};

/// Spawns one worker per unit of work.
///
/// Inside a multi-threaded Tokio runtime the worker is a `spawn_blocking`
/// task. Otherwise, including `current_thread` runtimes, it is a named OS
/// thread.
#[derive(Clone, Debug)]
pub struct Background {
    worker_name: Arc<str>,
}

impl Background {
    pub fn new(worker_name: impl Into<String>) -> Self {
        Background {
            worker_name: Arc::from(worker_name.into()),
        }
    }

    pub fn worker_name(&self) -> &str {
        &self.worker_name
    }

    pub(crate) fn spawn(&self, work: Work) -> Result<SubscriptionHandle, FlowError> {
        if let Some(handle) = multi_thread_runtime() {
            debug!(worker = %self.worker_name, "spawning blocking task");
            return Ok(SubscriptionHandle::JoinTask(handle.spawn_blocking(work)));
        }

        debug!(worker = %self.worker_name, "spawning worker thread");
        std::thread::Builder::new()
            .name(self.worker_name.to_string())
            .spawn(work)
            .map(SubscriptionHandle::JoinThread)
            .map_err(|e| FlowError::Spawn {
                reason: e.to_string(),
            })
    }
}

fn multi_thread_runtime() -> Option<Handle> {
    let handle = Handle::try_current().ok()?;
    match handle.runtime_flavor() {
        RuntimeFlavor::CurrentThread => None,
        _ => Some(handle),
    }
}
