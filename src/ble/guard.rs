//! Teardown that survives cancellation.
//!
//! Radio operations are cancelled by dropping their futures, so any resource
//! opened before an `.await` needs a release path that does not depend on
//! reaching the next line.

use std::future::Future;
use tokio::runtime::Handle;
use tracing::warn;

/// Runs `cleanup` when dropped, unless [`disarm`](Self::disarm)ed first.
pub(crate) struct DropGuard<F: FnOnce()> {
    cleanup: Option<F>,
}

impl<F: FnOnce()> DropGuard<F> {
    pub(crate) fn new(cleanup: F) -> Self {
        Self {
            cleanup: Some(cleanup),
        }
    }

    /// The resource was handed off; do nothing on drop.
    pub(crate) fn disarm(mut self) {
        self.cleanup = None;
    }
}

impl<F: FnOnce()> Drop for DropGuard<F> {
    fn drop(&mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            cleanup();
        }
    }
}

/// Spawn async teardown from a synchronous context such as `Drop`.
///
/// Outside a runtime there is nothing to drive the task, so it is skipped.
pub(crate) fn spawn_cleanup<T>(task: T)
where
    T: Future<Output = ()> + Send + 'static,
{
    match Handle::try_current() {
        Ok(runtime) => {
            runtime.spawn(task);
        }
        Err(_) => warn!("No async runtime available, skipping radio cleanup"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::oneshot;

    fn counting() -> (Arc<AtomicUsize>, impl FnOnce() + Send) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        (calls, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test]
    async fn test_cleanup_runs_when_future_is_cancelled() {
        let (calls, cleanup) = counting();
        let operation = async move {
            let _guard = DropGuard::new(cleanup);
            std::future::pending::<()>().await;
        };

        let outcome = tokio::time::timeout(Duration::from_millis(10), operation).await;

        assert!(outcome.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cleanup_runs_on_early_return() {
        let (calls, cleanup) = counting();

        let attempt = |fail: bool| -> Result<(), ()> {
            let guard = DropGuard::new(cleanup);
            if fail {
                return Err(());
            }
            guard.disarm();
            Ok(())
        };

        assert!(attempt(true).is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_disarmed_guard_does_nothing() {
        let (calls, cleanup) = counting();

        DropGuard::new(cleanup).disarm();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_spawn_cleanup_runs_on_current_runtime() {
        let (tx, rx) = oneshot::channel();

        DropGuard::new(move || {
            spawn_cleanup(async move {
                let _ = tx.send(());
            })
        });

        assert!(tokio::time::timeout(Duration::from_secs(1), rx)
            .await
            .is_ok());
    }

    #[test]
    fn test_spawn_cleanup_without_runtime_is_skipped() {
        spawn_cleanup(async {});
    }
}
