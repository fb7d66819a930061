//! Run-loop controllers for `QueueDriver::subscribe`

use crate::traits::RunLoop;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

/// Keeps a subscribe loop going until shutdown is requested
///
/// Optionally stops by itself after a fixed number of iterations.
#[derive(Debug, Clone, Default)]
pub struct ShutdownLoop {
    shutdown: Arc<AtomicBool>,
    remaining: Option<Arc<AtomicU64>>,
}

/// Cloneable stop switch for a `ShutdownLoop`
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    shutdown: Arc<AtomicBool>,
}

impl ShutdownLoop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow at most `iterations` more iterations
    pub fn with_max_iterations(mut self, iterations: u64) -> Self {
        self.remaining = Some(Arc::new(AtomicU64::new(iterations)));
        self
    }

    pub fn handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            shutdown: Arc::clone(&self.shutdown),
        }
    }

    /// Check if shutdown was requested
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Request shutdown on Ctrl-C
    pub fn stop_on_ctrl_c(&self) -> tokio::task::JoinHandle<()> {
        let handle = self.handle();
        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                info!("Received shutdown signal");
                handle.stop();
            }
        })
    }
}

impl RunLoop for ShutdownLoop {
    fn can_continue(&self) -> bool {
        if self.is_shutdown() {
            return false;
        }

        match &self.remaining {
            Some(remaining) => remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok(),
            None => true,
        }
    }
}

impl ShutdownHandle {
    /// Signal shutdown; takes effect at the next iteration boundary
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}
