//! Completion barrier
//!
//! Counts finished workers and wakes the experiment once the expected number
//! has reported. Releases that arrive before the barrier is armed are kept
//! and counted against the target once it is set.

use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::warn;

/// Outcome of a single release
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    /// The release was counted; carries the new total
    Counted(u32),
    /// The target was already reached
    Ignored,
}

#[derive(Debug, Error)]
pub enum BarrierError {
    #[error("timed out after {waited:?}: {released} of {expected} workers finished")]
    Timeout {
        waited: Duration,
        released: u32,
        expected: u32,
    },
}

#[derive(Debug, Clone, Copy, Default)]
struct State {
    expected: u32,
    released: u32,
}

impl State {
    fn is_armed(&self) -> bool {
        self.expected > 0
    }

    fn is_open(&self) -> bool {
        self.is_armed() && self.released >= self.expected
    }
}

pub struct CompletionBarrier {
    state: watch::Sender<State>,
}

impl CompletionBarrier {
    pub fn new() -> Self {
        let (state, _) = watch::channel(State::default());
        Self { state }
    }

    /// Sets the number of releases to wait for
    pub fn arm(&self, expected: u32) {
        self.state.send_modify(|state| {
            state.expected = expected;
            state.released = state.released.min(expected);
        });
    }

    /// Counts one finished worker, never past the armed target
    pub fn release(&self) -> Release {
        let mut outcome = Release::Ignored;
        self.state.send_if_modified(|state| {
            if state.is_open() {
                return false;
            }
            state.released += 1;
            outcome = Release::Counted(state.released);
            true
        });

        if outcome == Release::Ignored {
            warn!("Completion received after all expected workers finished; ignoring");
        }
        outcome
    }

    /// Current `(released, expected)` counts
    pub fn progress(&self) -> (u32, u32) {
        let state = *self.state.borrow();
        (state.released, state.expected)
    }

    /// Waits until the armed target is reached
    pub async fn wait(&self) {
        let mut rx = self.state.subscribe();
        // the sender lives in self, so the channel cannot close while we wait
        let _ = rx.wait_for(State::is_open).await;
    }

    /// Waits until the armed target is reached or `limit` elapses
    pub async fn wait_timeout(&self, limit: Duration) -> Result<(), BarrierError> {
        match tokio::time::timeout(limit, self.wait()).await {
            Ok(()) => Ok(()),
            Err(_) => {
                let (released, expected) = self.progress();
                Err(BarrierError::Timeout {
                    waited: limit,
                    released,
                    expected,
                })
            }
        }
    }
}

impl Default for CompletionBarrier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_barrier_opens_at_target_and_ignores_extra() {
        let barrier = CompletionBarrier::new();
        barrier.arm(3);

        assert_eq!(barrier.release(), Release::Counted(1));
        assert_eq!(barrier.release(), Release::Counted(2));
        assert!(
            barrier
                .wait_timeout(Duration::from_millis(50))
                .await
                .is_err()
        );

        assert_eq!(barrier.release(), Release::Counted(3));
        barrier.wait().await;

        assert_eq!(barrier.release(), Release::Ignored);
        assert_eq!(barrier.progress(), (3, 3));
    }

    #[tokio::test]
    async fn test_barrier_wakes_waiting_task() {
        let barrier = Arc::new(CompletionBarrier::new());
        barrier.arm(1);

        let waiter = {
            let barrier = Arc::clone(&barrier);
            tokio::spawn(async move { barrier.wait().await })
        };

        tokio::task::yield_now().await;
        barrier.release();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_releases_before_arming_count() {
        let barrier = CompletionBarrier::new();
        assert_eq!(barrier.release(), Release::Counted(1));

        barrier.arm(1);
        barrier
            .wait_timeout(Duration::from_millis(50))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_timeout_reports_progress() {
        let barrier = CompletionBarrier::new();
        barrier.arm(2);
        barrier.release();

        match barrier.wait_timeout(Duration::from_millis(20)).await {
            Err(BarrierError::Timeout {
                released, expected, ..
            }) => {
                assert_eq!((released, expected), (1, 2));
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }
}
