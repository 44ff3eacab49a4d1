//! Fail-fast task group and the interval loop runner used by every main loop.

use std::future::Future;
use std::time::Duration;

use eyre::{eyre, Result, WrapErr};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::retry::is_cancelled;

/// A set of tasks sharing one cancellation scope.
///
/// The first task to fail cancels the scope, and [`TaskGroup::join`] returns
/// that error once every task has wound down. Errors that arrive after the
/// scope was already cancelled (by a sibling or by the parent) are not
/// reported.
pub struct TaskGroup {
    tasks: JoinSet<Result<()>>,
    cancel: CancellationToken,
}

impl TaskGroup {
    /// Create a group whose scope is cancelled along with `parent`.
    pub fn new(parent: &CancellationToken) -> Self {
        Self {
            tasks: JoinSet::new(),
            cancel: parent.child_token(),
        }
    }

    /// Token tasks must watch to exit promptly.
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn spawn<F>(&mut self, name: &'static str, task: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        self.tasks.spawn(async move {
            task.await
                .wrap_err_with(|| format!("{} exited with error", name))
        });
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait for all tasks; fail with the first error.
    pub async fn join(mut self) -> Result<()> {
        let mut first_err = None;

        while let Some(joined) = self.tasks.join_next().await {
            let result = match joined {
                Ok(result) => result,
                Err(e) if e.is_panic() => Err(eyre!("task panicked: {}", e)),
                Err(e) => Err(eyre!("task aborted: {}", e)),
            };

            let Err(err) = result else {
                continue;
            };

            if first_err.is_some() || self.cancel.is_cancelled() || is_cancelled(&err) {
                debug!(error = %format!("{:#}", err), "Ignoring error after cancellation");
                continue;
            }

            error!(error = %format!("{:#}", err), "Task failed, cancelling group");
            self.cancel.cancel();
            first_err = Some(err);
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Invoke `tick` every `period` until `cancel` fires.
///
/// The first tick runs immediately. A tick that returns an error ends the
/// loop with that error; ticks are expected to absorb their own non-fatal
/// failures. Cancellation drops an in-flight tick.
pub async fn run_loop<F, Fut>(
    cancel: &CancellationToken,
    name: &str,
    period: Duration,
    mut tick: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!("loop" = name, ?period, "Loop started");

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            outcome = tick() => outcome,
        };

        if let Err(err) = outcome {
            if is_cancelled(&err) {
                break;
            }
            error!("loop" = name, error = %format!("{:#}", err), "Loop failed");
            return Err(err);
        }
    }

    info!("loop" = name, "Loop stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_all_ok_joins_ok() {
        let root = CancellationToken::new();
        let mut group = TaskGroup::new(&root);
        group.spawn("a", async { Ok(()) });
        group.spawn("b", async { Ok(()) });
        assert_eq!(group.len(), 2);
        assert!(group.join().await.is_ok());
    }

    #[tokio::test]
    async fn test_first_error_cancels_siblings() {
        let root = CancellationToken::new();
        let mut group = TaskGroup::new(&root);
        let token = group.token();

        group.spawn("long", async move {
            token.cancelled().await;
            Ok(())
        });
        group.spawn("failing", async { Err(eyre!("boom")) });

        let err = group.join().await.unwrap_err();
        assert!(format!("{:#}", err).contains("boom"));
        assert!(!root.is_cancelled());
    }

    #[tokio::test]
    async fn test_panic_is_error() {
        let root = CancellationToken::new();
        let mut group = TaskGroup::new(&root);
        group.spawn("panics", async {
            if true {
                panic!("kaboom");
            }
            Ok(())
        });
        assert!(group.join().await.is_err());
    }

    #[tokio::test]
    async fn test_external_cancel_is_not_error() {
        let root = CancellationToken::new();
        let mut group = TaskGroup::new(&root);
        let token = group.token();
        group.spawn("worker", async move {
            token.cancelled().await;
            Err(eyre!("interrupted mid-call"))
        });

        root.cancel();
        assert!(group.join().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_loop_ticks_until_cancelled() {
        let cancel = CancellationToken::new();
        let ticks = Arc::new(AtomicU32::new(0));
        let counter = ticks.clone();
        let stopper = cancel.clone();

        let result = run_loop(&cancel, "test", Duration::from_secs(1), || {
            let counter = counter.clone();
            let stopper = stopper.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 2 {
                    stopper.cancel();
                }
                Ok(())
            }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_loop_returns_tick_error() {
        let cancel = CancellationToken::new();
        let result = run_loop(&cancel, "test", Duration::from_secs(1), || async {
            Err(eyre!("fatal"))
        })
        .await;
        assert!(result.is_err());
    }
}
