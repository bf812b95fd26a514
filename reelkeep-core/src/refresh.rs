use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::StoreError;
use crate::library_manager::LibraryManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshReason {
    Startup,
    Scheduled,
    Requested,
}

/// One refresh pass.
#[async_trait]
pub trait Refresh: Send + Sync + 'static {
    async fn refresh(&self) -> Result<(), StoreError>;
}

#[async_trait]
impl Refresh for LibraryManager {
    async fn refresh(&self) -> Result<(), StoreError> {
        self.activate_all().await.map(|_| ())
    }
}

/// Cloneable trigger for the refresh loop.
///
/// Requests arriving while a pass is already queued are folded into that
/// pass.
#[derive(Debug, Clone)]
pub struct RefreshHandle {
    tx: mpsc::Sender<RefreshReason>,
}

impl RefreshHandle {
    /// Returns false once the loop has stopped.
    pub fn request(&self) -> bool {
        match self.tx.try_send(RefreshReason::Requested) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!("Refresh already pending");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

/// Runs `target` on request and, when `interval` is set, on a fixed tick
/// until `cancel` fires. For a [`LibraryManager`] each pass is one
/// [`LibraryManager::activate_all`].
pub fn spawn_refresh_loop<R: Refresh>(
    target: Arc<R>,
    interval: Option<Duration>,
    run_on_start: bool,
    cancel: CancellationToken,
) -> (RefreshHandle, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel(1);
    if run_on_start {
        let _ = tx.try_send(RefreshReason::Startup);
    }

    let task = tokio::spawn(async move {
        let mut ticker = interval.map(|period| {
            let start = tokio::time::Instant::now() + period;
            let mut ticker = tokio::time::interval_at(start, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker
        });

        loop {
            let reason = tokio::select! {
                _ = cancel.cancelled() => break,
                reason = rx.recv() => match reason {
                    Some(reason) => reason,
                    None => break,
                },
                _ = next_tick(ticker.as_mut()) => RefreshReason::Scheduled,
            };

            info!(?reason, "Refreshing libraries");
            tokio::select! {
                _ = cancel.cancelled() => break,
                result = target.refresh() => {
                    if let Err(err) = result {
                        error!("Refresh failed: {}", err);
                    }
                }
            }
        }
        debug!("Refresh loop stopped");
    });

    (RefreshHandle { tx }, task)
}

async fn next_tick(ticker: Option<&mut tokio::time::Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}
