//! Periodic capture worker

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use tracing::{debug, error, info};

use crate::camera::controller::CameraController;
use crate::camera::snapshot::{SnapshotEvent, SnapshotProperty};
use crate::workers::scheduler::{SchedulerEvent, SchedulerState, SchedulerStatus};

/// Capture worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Wait between the end of one capture and the start of the next
    pub interval: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
        }
    }
}

/// Run the capture worker until `shutdown_signal` resolves.
///
/// A capture that has started always completes; cancellation is observed at
/// the top of each iteration and during the wait between captures. Capture
/// failures are logged and counted, never fatal.
pub async fn run<S, F>(
    options: &Options,
    controller: Arc<CameraController>,
    snapshot: &SnapshotProperty,
    status: &SchedulerStatus,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!("Capture worker starting...");

    loop {
        if (&mut shutdown_signal).now_or_never().is_some() {
            break;
        }

        capture_once(&controller, snapshot, status).await;

        tokio::select! {
            _ = &mut shutdown_signal => {
                break;
            }
            _ = sleep_fn(options.interval) => {
                // Continue with next capture
            }
        }
    }

    info!("Capture worker shutting down...");

    // The owner normally records the cancel; do it here if the signal fired on its own
    if status.state() == SchedulerState::Running {
        if let Err(e) = status.process(SchedulerEvent::Cancel) {
            error!("Capture worker: {}", e);
        }
    }
    if let Err(e) = status.process(SchedulerEvent::Finish) {
        error!("Capture worker: {}", e);
    }
}

async fn capture_once(
    controller: &Arc<CameraController>,
    snapshot: &SnapshotProperty,
    status: &SchedulerStatus,
) {
    status.stats.record_attempt();
    let path = snapshot.path().to_path_buf();

    debug!("Capturing image...");
    let target = path.clone();
    let result = controller
        .blocking(move |c| c.capture(&target))
        .await
        .and_then(|captured| captured);

    match result {
        Ok(()) => {
            let sequence = status.stats.record_success();
            debug!("Snapshot {} written to {}", sequence, path.display());
            snapshot.notify(SnapshotEvent {
                sequence,
                path,
                captured_at: Utc::now(),
            });
        }
        Err(e) => {
            status.stats.record_failure();
            error!("Failed to update snapshot: {}", e);
        }
    }
}
