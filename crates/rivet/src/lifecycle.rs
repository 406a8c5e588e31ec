use crate::transform::Transform;
use crate::types::RivetError;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ServiceState {
    Stopped,
    Running { watching: bool },
}

/// Keeps the transform service up for the duration of a build, and across
/// rebuilds in watch mode.
pub struct Lifecycle {
    transform: Arc<dyn Transform>,
    state: Mutex<ServiceState>,
    starts: AtomicUsize,
}

impl Lifecycle {
    pub fn new(transform: Arc<dyn Transform>) -> Self {
        Self { transform, state: Mutex::new(ServiceState::Stopped), starts: AtomicUsize::new(0) }
    }

    /// Hook for a one-off build
    pub async fn on_run(&self) -> Result<(), RivetError> {
        self.ensure_started(false).await
    }

    /// Hook for every rebuild in watch mode; the running service is reused
    pub async fn on_watch_run(&self) -> Result<(), RivetError> {
        self.ensure_started(true).await
    }

    /// Hook for build completion. Stops the service unless watching.
    pub async fn on_done(&self) {
        let mut state = self.state.lock().await;
        if *state == (ServiceState::Running { watching: false }) {
            debug!(implementation = self.transform.name(), "Stopping transform service");
            self.transform.stop().await;
            *state = ServiceState::Stopped;
        }
    }

    /// How many times the service was started
    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::Relaxed)
    }

    pub async fn is_running(&self) -> bool {
        matches!(*self.state.lock().await, ServiceState::Running { .. })
    }

    async fn ensure_started(&self, watching: bool) -> Result<(), RivetError> {
        let mut state = self.state.lock().await;
        if let ServiceState::Running { watching: was_watching } = *state {
            *state = ServiceState::Running { watching: was_watching || watching };
            return Ok(());
        }

        debug!(implementation = self.transform.name(), watching, "Starting transform service");
        self.transform.start().await.map_err(RivetError::ServiceStart)?;
        self.starts.fetch_add(1, Ordering::Relaxed);
        *state = ServiceState::Running { watching };
        Ok(())
    }
}
