//! Capture scheduler: lifecycle state machine and owner handle

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::camera::controller::CameraController;
use crate::camera::snapshot::SnapshotProperty;
use crate::errors::ThingError;
use crate::workers::capture;

/// Scheduler lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    /// Created, loop not spawned yet
    Idle,

    /// Loop spawned and capturing
    Running,

    /// Shutdown asked the loop to stop
    CancelRequested,

    /// Loop observed the cancellation and returned
    Stopped,
}

/// Scheduler lifecycle event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerEvent {
    Start,
    Cancel,
    Finish,
}

/// Compute the state after `event`, rejecting anything off the
/// `Idle -> Running -> CancelRequested -> Stopped` path.
pub fn transition(
    state: SchedulerState,
    event: SchedulerEvent,
) -> Result<SchedulerState, ThingError> {
    match (state, event) {
        (SchedulerState::Idle, SchedulerEvent::Start) => Ok(SchedulerState::Running),
        (SchedulerState::Running, SchedulerEvent::Cancel) => Ok(SchedulerState::CancelRequested),
        (SchedulerState::CancelRequested, SchedulerEvent::Finish) => Ok(SchedulerState::Stopped),
        (state, event) => Err(ThingError::InvalidTransition(format!(
            "{:?} -> {:?}",
            state, event
        ))),
    }
}

/// Capture counters
#[derive(Debug, Default)]
pub struct SchedulerStats {
    attempts: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
}

impl SchedulerStats {
    pub fn record_attempt(&self) {
        self.attempts.fetch_add(1, Ordering::SeqCst);
    }

    /// Returns the number of successes so far, this one included
    pub fn record_success(&self) -> u64 {
        self.successes.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn successes(&self) -> u64 {
        self.successes.load(Ordering::SeqCst)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::SeqCst)
    }
}

/// State shared between the scheduler owner and its loop
pub struct SchedulerStatus {
    state: watch::Sender<SchedulerState>,
    pub stats: SchedulerStats,
}

impl SchedulerStatus {
    pub fn new() -> Self {
        let (state, _) = watch::channel(SchedulerState::Idle);
        Self {
            state,
            stats: SchedulerStats::default(),
        }
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    /// Apply an event, leaving the state untouched if the transition is invalid
    pub fn process(&self, event: SchedulerEvent) -> Result<SchedulerState, ThingError> {
        let mut outcome = Err(ThingError::Internal("transition not evaluated".to_string()));
        self.state.send_if_modified(|state| match transition(*state, event) {
            Ok(next) => {
                info!("Capture scheduler: {:?} -> {:?}", state, next);
                *state = next;
                outcome = Ok(next);
                true
            }
            Err(e) => {
                outcome = Err(e);
                false
            }
        });
        outcome
    }
}

impl Default for SchedulerStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// Owner handle for the background capture loop
pub struct CaptureScheduler {
    options: capture::Options,
    status: Arc<SchedulerStatus>,
    cancel_tx: broadcast::Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl CaptureScheduler {
    pub fn new(options: capture::Options) -> Self {
        let (cancel_tx, _) = broadcast::channel(1);
        Self {
            options,
            status: Arc::new(SchedulerStatus::new()),
            cancel_tx,
            handle: None,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.status.state()
    }

    pub fn status(&self) -> Arc<SchedulerStatus> {
        self.status.clone()
    }

    /// Spawn the capture loop
    pub fn start(
        &mut self,
        controller: Arc<CameraController>,
        snapshot: Arc<SnapshotProperty>,
    ) -> Result<(), ThingError> {
        self.status.process(SchedulerEvent::Start)?;

        let options = self.options.clone();
        let status = self.status.clone();
        let mut cancel_rx = self.cancel_tx.subscribe();

        let handle = tokio::spawn(async move {
            capture::run(
                &options,
                controller,
                snapshot.as_ref(),
                status.as_ref(),
                tokio::time::sleep,
                Box::pin(async move {
                    let _ = cancel_rx.recv().await;
                }),
            )
            .await;
        });

        self.handle = Some(handle);
        Ok(())
    }

    /// Ask the loop to stop. An in-flight capture still runs to completion.
    pub fn request_cancel(&self) -> Result<(), ThingError> {
        self.status.process(SchedulerEvent::Cancel)?;
        let _ = self.cancel_tx.send(());
        Ok(())
    }

    /// Wait for the loop to return, at most `timeout`
    pub async fn wait_stopped(&mut self, timeout: Duration) -> Result<(), ThingError> {
        let Some(handle) = self.handle.as_mut() else {
            return Ok(());
        };

        let outcome = tokio::time::timeout(timeout, handle).await;
        match outcome {
            Ok(Ok(())) => {
                self.handle = None;
                Ok(())
            }
            Ok(Err(e)) => {
                self.handle = None;
                error!("Capture loop ended abnormally: {}", e);
                Err(ThingError::ShutdownError(e.to_string()))
            }
            Err(_) => {
                error!("Capture loop did not stop within {:?}", timeout);
                Err(ThingError::CancellationTimeout(timeout))
            }
        }
    }

    /// Request cancellation and wait for the loop to stop
    pub async fn stop(&mut self, timeout: Duration) -> Result<(), ThingError> {
        self.request_cancel()?;
        self.wait_stopped(timeout).await
    }
}
