//! Runs named long-lived processes side by side with graceful shutdown.
//!
//! - Every process receives the same `CancellationToken`
//! - SIGINT/SIGTERM, or the first process to fail, cancels the token
//! - Cancelled processes get a grace period to finish before being aborted
//! - Closers run afterwards under a timeout, whatever the outcome
//!
//! # Example
//!
//! ```no_run
//! use torque_runner::Runner;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     Runner::new()
//!         .with_app_process("ticker", |ctx| async move {
//!             while !ctx.is_cancelled() {
//!                 tokio::time::sleep(Duration::from_secs(1)).await;
//!             }
//!             Ok(())
//!         })
//!         .with_closer(|| async move { Ok(()) })
//!         .with_closer_timeout(Duration::from_secs(5))
//!         .run()
//!         .await
//! }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

type BoxFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// An app process: takes the shared cancellation token
pub type AppProcess = Box<dyn FnOnce(CancellationToken) -> BoxFuture + Send>;

/// A cleanup step run after every process has stopped
pub type Closer = Box<dyn FnOnce() -> BoxFuture + Send>;

pub struct Runner {
    app_processes: Vec<(String, AppProcess)>,
    closers: Vec<Closer>,
    closer_timeout: Duration,
    shutdown_grace: Duration,
    cancellation_token: CancellationToken,
    handle_signals: bool,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner {
    /// Closer timeout and shutdown grace period both default to 10 seconds
    pub fn new() -> Self {
        Self {
            app_processes: Vec::new(),
            closers: Vec::new(),
            closer_timeout: Duration::from_secs(10),
            shutdown_grace: Duration::from_secs(10),
            cancellation_token: CancellationToken::new(),
            handle_signals: true,
        }
    }

    /// Add a process. A process that returns `Ok` simply ends; one that
    /// returns `Err` or panics shuts every other process down.
    pub fn with_app_process<F, Fut>(mut self, name: impl Into<String>, process: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.app_processes
            .push((name.into(), Box::new(|token| Box::pin(process(token)))));
        self
    }

    /// Add an already boxed process
    pub fn with_boxed_process(mut self, name: impl Into<String>, process: AppProcess) -> Self {
        self.app_processes.push((name.into(), process));
        self
    }

    pub fn with_closer<F, Fut>(mut self, closer: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.closers.push(Box::new(|| Box::pin(closer())));
        self
    }

    pub fn with_closer_timeout(mut self, timeout: Duration) -> Self {
        self.closer_timeout = timeout;
        self
    }

    /// How long cancelled processes may take to wind down before they are aborted
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    /// Skip installing SIGINT/SIGTERM handlers
    pub fn without_signal_handlers(mut self) -> Self {
        self.handle_signals = false;
        self
    }

    /// Run until every process ends, one fails, or a shutdown signal arrives.
    ///
    /// Returns the first process error, if any, after closers have run.
    pub async fn run(self) -> anyhow::Result<()> {
        let token = self.cancellation_token;
        let mut join_set = JoinSet::new();

        for (name, process) in self.app_processes {
            let process_token = token.clone();
            join_set.spawn(async move {
                debug!(process = %name, "starting app process");
                let result = process(process_token).await;
                (name, result)
            });
        }

        if self.handle_signals {
            spawn_signal_handlers(token.clone());
        }

        let mut first_error: Option<anyhow::Error> = None;

        loop {
            let joined = tokio::select! {
                joined = join_set.join_next() => joined,
                _ = token.cancelled() => break,
            };

            match joined {
                None => break,
                Some(Ok((name, Ok(())))) => {
                    debug!(process = %name, "app process completed");
                }
                Some(Ok((name, Err(err)))) => {
                    error!(process = %name, "app process error: {:#}", err);
                    first_error = Some(err.context(format!("process '{}' failed", name)));
                    token.cancel();
                }
                Some(Err(err)) => {
                    error!("app process panicked: {}", err);
                    first_error = Some(anyhow::anyhow!("app process panicked: {}", err));
                    token.cancel();
                }
            }
        }

        if !join_set.is_empty() {
            info!(
                remaining = join_set.len(),
                grace = ?self.shutdown_grace,
                "waiting for app processes to stop"
            );
            let drained = tokio::time::timeout(self.shutdown_grace, async {
                while let Some(joined) = join_set.join_next().await {
                    if let Ok((name, Err(err))) = joined {
                        warn!(process = %name, "app process error during shutdown: {:#}", err);
                    }
                }
            })
            .await;
            if drained.is_err() {
                warn!("app processes did not stop in time, aborting");
                join_set.shutdown().await;
            }
        }

        if !self.closers.is_empty() {
            info!("running closers with timeout of {:?}", self.closer_timeout);
            match tokio::time::timeout(self.closer_timeout, run_closers(self.closers)).await {
                Ok(()) => info!("all closers completed"),
                Err(_) => error!("closers timed out after {:?}", self.closer_timeout),
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => {
                info!("application exiting normally");
                Ok(())
            }
        }
    }
}

fn spawn_signal_handlers(token: CancellationToken) {
    let ctrl_c_token = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received shutdown signal");
                ctrl_c_token.cancel();
            }
            Err(err) => error!("error setting up signal handler: {}", err),
        }
    });

    #[cfg(unix)]
    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("received SIGTERM signal");
                token.cancel();
            }
            Err(err) => error!("error setting up SIGTERM handler: {}", err),
        }
    });
}

async fn run_closers(closers: Vec<Closer>) {
    let mut closer_set = JoinSet::new();
    for closer in closers {
        closer_set.spawn(closer());
    }

    while let Some(result) = closer_set.join_next().await {
        match result {
            Ok(Ok(())) => debug!("closer completed successfully"),
            Ok(Err(err)) => error!("closer error: {:#}", err),
            Err(err) => error!("closer panicked: {}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    fn runner() -> Runner {
        Runner::new()
            .without_signal_handlers()
            .with_shutdown_grace(Duration::from_secs(1))
            .with_closer_timeout(Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_completed_processes_end_run() {
        let closer_called = Arc::new(AtomicBool::new(false));
        let flag = closer_called.clone();

        runner()
            .with_app_process("one", |_| async { Ok(()) })
            .with_app_process("two", |_| async { Ok(()) })
            .with_closer(move || async move {
                flag.store(true, Ordering::SeqCst);
                Ok(())
            })
            .run()
            .await
            .unwrap();

        assert!(closer_called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_failure_cancels_other_processes() {
        let stopped = Arc::new(AtomicBool::new(false));
        let flag = stopped.clone();

        let result = runner()
            .with_app_process("waiter", move |ctx| async move {
                ctx.cancelled().await;
                flag.store(true, Ordering::SeqCst);
                Ok(())
            })
            .with_app_process("failing", |_| async { Err(anyhow::anyhow!("boom")) })
            .run()
            .await;

        let err = result.unwrap_err();
        assert!(format!("{:#}", err).contains("boom"));
        assert!(format!("{:#}", err).contains("failing"));
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_external_cancellation_stops_processes() {
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        runner()
            .with_cancellation_token(token)
            .with_app_process("waiter", |ctx| async move {
                ctx.cancelled().await;
                Ok(())
            })
            .run()
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_stuck_process_is_aborted_after_grace() {
        let token = CancellationToken::new();
        token.cancel();

        runner()
            .with_shutdown_grace(Duration::from_millis(20))
            .with_cancellation_token(token)
            .with_app_process("stuck", |_| async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            })
            .run()
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_all_closers_run_even_if_one_fails() {
        let count = Arc::new(AtomicUsize::new(0));
        let first = count.clone();
        let second = count.clone();

        runner()
            .with_closer(|| async { Err(anyhow::anyhow!("closer failed")) })
            .with_closer(move || async move {
                first.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .with_closer(move || async move {
                second.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .run()
            .await
            .unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
