//! Cooperative cancellation
//!
//! A `CancelSignal` is handed down a call chain (handler → controller →
//! gateway → retry loop). Cancelling it wakes every waiter; clones share state.
//! Servers hand down the process shutdown signal; dropping a call's future
//! covers client-side cancellation.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;

/// Cancellation signal shared between a caller and the work it started
#[derive(Clone, Debug)]
pub struct CancelSignal {
    sender: Arc<watch::Sender<bool>>,
}

impl CancelSignal {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Fire the signal. Idempotent.
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    /// Resolves once the signal has fired
    pub async fn cancelled(&self) {
        let mut receiver = self.sender.subscribe();
        // The sender lives as long as `self`, so this only returns once fired.
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Run a future until it completes or the signal fires.
///
/// Returns `None` when cancelled; the future is dropped in that case.
pub async fn run_until_cancelled<F, T>(future: F, signal: &CancelSignal) -> Option<T>
where
    F: Future<Output = T>,
{
    if signal.is_cancelled() {
        return None;
    }

    tokio::select! {
        biased;
        _ = signal.cancelled() => None,
        result = future => Some(result),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_cancel_wakes_waiter() {
        let signal = CancelSignal::new();
        assert!(!signal.is_cancelled());

        let remote = signal.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            remote.cancel();
        });

        let result = tokio::time::timeout(Duration::from_secs(1), signal.cancelled()).await;
        assert!(result.is_ok());
        assert!(signal.is_cancelled());
    }

    #[tokio::test]
    async fn test_run_until_cancelled_completes() {
        let signal = CancelSignal::new();
        let result = run_until_cancelled(async { 7 }, &signal).await;
        assert_eq!(result, Some(7));
    }

    #[tokio::test]
    async fn test_run_until_cancelled_drops_work() {
        let signal = CancelSignal::new();
        let remote = signal.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            remote.cancel();
        });

        let task = async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            42
        };
        assert_eq!(run_until_cancelled(task, &signal).await, None);
    }

    #[tokio::test]
    async fn test_already_cancelled_skips_work() {
        let signal = CancelSignal::new();
        signal.cancel();
        signal.cancel();

        let result = run_until_cancelled(async { 1 }, &signal).await;
        assert_eq!(result, None);
    }
}
