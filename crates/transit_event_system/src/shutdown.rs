//! Shutdown coordination shared by every tier of one process.
//!
//! Shutdown happens in two phases. Once it is *initiated*, record sources
//! stop pulling and tiers reject newly ingested records; events already in
//! flight keep moving through the chain. Routers stop accepting upstream
//! events only when their tier is shut down. Once it is *complete*, in-flight
//! work has drained and snapshots may be written.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::info;

/// Cloneable handle on the process-wide shutdown flags.
#[derive(Debug, Clone, Default)]
pub struct ShutdownState {
    inner: Arc<Flags>,
}

#[derive(Debug, Default)]
struct Flags {
    initiated: AtomicBool,
    complete: AtomicBool,
    notify: Notify,
}

impl ShutdownState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_shutdown_initiated(&self) -> bool {
        self.inner.initiated.load(Ordering::Acquire)
    }

    pub fn is_shutdown_complete(&self) -> bool {
        self.inner.complete.load(Ordering::Acquire)
    }

    /// Stops intake and wakes every task waiting in [`wait`](Self::wait).
    pub fn initiate_shutdown(&self) {
        if !self.inner.initiated.swap(true, Ordering::AcqRel) {
            info!("🛑 Shutdown initiated - sources stop pulling new records");
            self.inner.notify.notify_waiters();
        }
    }

    pub fn complete_shutdown(&self) {
        if !self.inner.complete.swap(true, Ordering::AcqRel) {
            info!("✅ In-flight events drained - ready to persist and exit");
        }
    }

    /// Resolves once shutdown has been initiated.
    pub async fn wait(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_shutdown_initiated() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_flags_are_shared_between_clones() {
        let state = ShutdownState::new();
        let other = state.clone();
        assert!(!other.is_shutdown_initiated());

        state.initiate_shutdown();
        assert!(other.is_shutdown_initiated());
        assert!(!other.is_shutdown_complete());

        state.complete_shutdown();
        assert!(other.is_shutdown_complete());
    }

    #[tokio::test]
    async fn test_wait_wakes_on_initiate() {
        let state = ShutdownState::new();
        let waiter = {
            let state = state.clone();
            tokio::spawn(async move { state.wait().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        state.initiate_shutdown();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .expect("waiter task panicked");
    }

    #[tokio::test]
    async fn test_wait_returns_immediately_after_initiate() {
        let state = ShutdownState::new();
        state.initiate_shutdown();
        tokio::time::timeout(Duration::from_millis(100), state.wait())
            .await
            .expect("already initiated");
    }
}
