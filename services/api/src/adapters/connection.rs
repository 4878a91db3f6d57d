//! services/api/src/adapters/connection.rs
//!
//! Lifecycle of the process-wide store handle. The handle is created once at
//! startup and moves `Uninitialized -> Connecting -> Ready -> Closed`; the current
//! state is published on a watch channel so the health endpoint can report it.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreLifecycle {
    Uninitialized,
    Connecting { attempt: u32 },
    Ready,
    Closed,
}

impl StoreLifecycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreLifecycle::Uninitialized => "uninitialized",
            StoreLifecycle::Connecting { .. } => "connecting",
            StoreLifecycle::Ready => "ready",
            StoreLifecycle::Closed => "closed",
        }
    }
}

impl fmt::Display for StoreLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Owns the sending side of the lifecycle channel.
pub struct StoreMonitor {
    tx: watch::Sender<StoreLifecycle>,
}

impl StoreMonitor {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(StoreLifecycle::Uninitialized);
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<StoreLifecycle> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> StoreLifecycle {
        *self.tx.borrow()
    }

    pub fn mark_ready(&self) {
        self.tx.send_replace(StoreLifecycle::Ready);
    }

    pub fn mark_closed(&self) {
        self.tx.send_replace(StoreLifecycle::Closed);
        info!("Store handle closed");
    }

    /// Calls `connect` until it succeeds, waiting `retry_delay` between attempts.
    /// There is no attempt limit: the service is useless without its store.
    pub async fn connect_with_retry<T, E, F, Fut>(&self, retry_delay: Duration, mut connect: F) -> T
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let mut attempt = 1;
        loop {
            self.tx.send_replace(StoreLifecycle::Connecting { attempt });
            match connect().await {
                Ok(handle) => {
                    self.mark_ready();
                    info!(attempt, "Store connection established");
                    return handle;
                }
                Err(e) => {
                    warn!(
                        attempt,
                        error = %e,
                        "Store connection failed, retrying in {:?}",
                        retry_delay
                    );
                    tokio::time::sleep(retry_delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for StoreMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_until_the_store_answers() {
        let monitor = StoreMonitor::new();
        let status = monitor.subscribe();
        assert_eq!(*status.borrow(), StoreLifecycle::Uninitialized);

        let calls = AtomicU32::new(0);
        let handle = monitor
            .connect_with_retry(Duration::from_millis(1), || {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 3 {
                        Err(format!("connection refused ({n})"))
                    } else {
                        Ok("pool")
                    }
                }
            })
            .await;

        assert_eq!(handle, "pool");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(*status.borrow(), StoreLifecycle::Ready);

        monitor.mark_closed();
        assert_eq!(monitor.current(), StoreLifecycle::Closed);
        assert_eq!(monitor.current().to_string(), "closed");
    }
}
