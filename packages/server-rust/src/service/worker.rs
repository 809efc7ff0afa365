//! Background workers.
//!
//! `BackgroundWorker<R>` drives a `BackgroundRunnable` from an mpsc channel and
//! an optional tick. `EndpointRefresher` is the runnable that keeps the
//! resolver's endpoint snapshot current so dispatches only read it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::remote::RemoteEndpointResolver;

/// Capacity of a worker's task channel.
const TASK_CHANNEL_CAPACITY: usize = 64;

// ---------------------------------------------------------------------------
// BackgroundRunnable trait
// ---------------------------------------------------------------------------

/// Task handler executed by `BackgroundWorker`.
#[async_trait]
pub trait BackgroundRunnable: Send + 'static {
    type Task: Send + 'static;

    /// Handles one submitted task.
    async fn run(&mut self, task: Self::Task);

    /// Called on every tick. Default is a no-op.
    async fn on_tick(&mut self) {}

    /// Called once when the worker stops. Default is a no-op.
    async fn shutdown(&mut self) {}
}

// ---------------------------------------------------------------------------
// BackgroundWorker
// ---------------------------------------------------------------------------

/// Handle to a spawned background task.
pub struct BackgroundWorker<R: BackgroundRunnable> {
    tx: Option<mpsc::Sender<R::Task>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl<R: BackgroundRunnable> BackgroundWorker<R> {
    /// Spawns the worker. The first tick fires one `tick` after start.
    #[must_use]
    pub fn start(mut runnable: R, tick: Duration) -> Self {
        let (tx, mut rx) = mpsc::channel::<R::Task>(TASK_CHANNEL_CAPACITY);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + tick, tick);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    task = rx.recv() => match task {
                        Some(task) => runnable.run(task).await,
                        None => break,
                    },
                    _ = ticker.tick() => runnable.on_tick().await,
                    _ = &mut shutdown_rx => break,
                }
            }

            runnable.shutdown().await;
        });

        Self {
            tx: Some(tx),
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    /// Queues a task for the worker.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker has been stopped.
    pub async fn submit(&self, task: R::Task) -> anyhow::Result<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("worker not running"))?;
        tx.send(task)
            .await
            .map_err(|_| anyhow::anyhow!("worker channel closed"))
    }

    /// Sender for submitting from other owners. Tasks sent after `stop()`
    /// are dropped.
    #[must_use]
    pub fn sender(&self) -> Option<mpsc::Sender<R::Task>> {
        self.tx.clone()
    }

    /// Stops the worker and waits for it to finish.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

// ---------------------------------------------------------------------------
// EndpointRefresher
// ---------------------------------------------------------------------------

/// Tasks accepted by [`EndpointRefresher`].
#[derive(Debug)]
pub enum RefreshTask {
    /// Resolve immediately, optionally reporting the new base URL.
    RefreshNow {
        reply: Option<oneshot::Sender<String>>,
    },
}

/// Re-resolves the remote endpoint on every tick and on demand.
pub struct EndpointRefresher {
    resolver: Arc<RemoteEndpointResolver>,
}

impl EndpointRefresher {
    #[must_use]
    pub fn new(resolver: Arc<RemoteEndpointResolver>) -> Self {
        Self { resolver }
    }

    /// Starts a worker ticking at the resolver's refresh interval.
    #[must_use]
    pub fn spawn(resolver: Arc<RemoteEndpointResolver>) -> BackgroundWorker<Self> {
        let tick = resolver.refresh_interval().max(Duration::from_secs(1));
        BackgroundWorker::start(Self::new(resolver), tick)
    }

    async fn refresh(&self) -> String {
        let endpoint = self.resolver.resolve().await;
        debug!(
            base_url = %endpoint.base_url,
            via = endpoint.resolved_via.as_str(),
            "remote endpoint refreshed"
        );
        endpoint.base_url.clone()
    }
}

#[async_trait]
impl BackgroundRunnable for EndpointRefresher {
    type Task = RefreshTask;

    async fn run(&mut self, task: RefreshTask) {
        match task {
            RefreshTask::RefreshNow { reply } => {
                let base_url = self.refresh().await;
                if let Some(reply) = reply {
                    let _ = reply.send(base_url);
                }
            }
        }
    }

    async fn on_tick(&mut self) {
        self.refresh().await;
    }

    async fn shutdown(&mut self) {
        info!("endpoint refresher stopped");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
