//! Main application run loop

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::app::options::{AppOptions, LifecycleOptions, ServerOptions};
use crate::app::state::AppState;
use crate::camera::controller::CameraController;
use crate::errors::ThingError;
use crate::hardware::camera::CameraDevice;
use crate::server::serve::serve;
use crate::server::state::ServerState;
use crate::workers::scheduler::CaptureScheduler;

pub type ShutdownSignal = Pin<Box<dyn Future<Output = ()> + Send>>;
pub type ServerHandle = JoinHandle<Result<(), ThingError>>;

/// Run the camera thing with the HTTP server
pub async fn run(
    options: AppOptions,
    device: Box<dyn CameraDevice>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ThingError> {
    run_with_server(options, device, launch_http_server, shutdown_signal).await
}

async fn launch_http_server(
    options: ServerOptions,
    state: Arc<ServerState>,
    shutdown_signal: ShutdownSignal,
) -> Result<ServerHandle, ThingError> {
    serve(&options, state, shutdown_signal).await
}

/// Run the camera thing, starting the protocol server through `launch_server`.
///
/// The camera is set up (warm-up included) before the capture loop starts
/// and before `launch_server` is called.
pub async fn run_with_server<L, Fut>(
    options: AppOptions,
    device: Box<dyn CameraDevice>,
    launch_server: L,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ThingError>
where
    L: FnOnce(ServerOptions, Arc<ServerState>, ShutdownSignal) -> Fut,
    Fut: Future<Output = Result<ServerHandle, ThingError>>,
{
    info!("Initializing camera thing...");

    let (shutdown_tx, _shutdown_rx): (broadcast::Sender<()>, _) = broadcast::channel(1);
    let mut shutdown_manager = ShutdownManager::new(shutdown_tx.clone(), options.lifecycle.clone());

    let app_state = AppState::init(&options, device)?;
    shutdown_manager.with_controller(app_state.controller.clone())?;

    if let Err(e) = init(
        &options,
        &app_state,
        launch_server,
        shutdown_tx.clone(),
        &mut shutdown_manager,
    )
    .await
    {
        error!("Failed to start camera thing: {}", e);
        if let Err(shutdown_err) = shutdown_manager.shutdown().await {
            error!("Cleanup after failed start: {}", shutdown_err);
        }
        return Err(e);
    }

    shutdown_signal.await;
    info!("Shutdown signal received, shutting down...");

    drop(shutdown_tx);
    shutdown_manager.shutdown().await
}

// =============================== INITIALIZATION ================================== //

async fn init<L, Fut>(
    options: &AppOptions,
    app_state: &AppState,
    launch_server: L,
    shutdown_tx: broadcast::Sender<()>,
    shutdown_manager: &mut ShutdownManager,
) -> Result<(), ThingError>
where
    L: FnOnce(ServerOptions, Arc<ServerState>, ShutdownSignal) -> Fut,
    Fut: Future<Output = Result<ServerHandle, ThingError>>,
{
    init_camera(app_state.controller.clone()).await?;

    let mut scheduler = CaptureScheduler::new(options.capture_worker.clone());
    info!("Starting the camera update loop");
    scheduler.start(app_state.controller.clone(), app_state.snapshot.clone())?;
    let scheduler_status = scheduler.status();
    shutdown_manager.with_scheduler(scheduler)?;

    if options.enable_server {
        info!("Initializing Web Thing server...");
        let server_state = Arc::new(ServerState::new(
            app_state.controller.clone(),
            app_state.snapshot.clone(),
            scheduler_status,
            app_state.description.clone(),
        ));

        let mut shutdown_rx = shutdown_tx.subscribe();
        let handle = launch_server(
            options.server.clone(),
            server_state,
            Box::pin(async move {
                let _ = shutdown_rx.recv().await;
            }),
        )
        .await?;
        shutdown_manager.with_server_handle(handle)?;
    }

    Ok(())
}

async fn init_camera(controller: Arc<CameraController>) -> Result<(), ThingError> {
    info!("Setting up camera...");
    controller.blocking(|c| c.setup()).await?
}

// ================================= SHUTDOWN ===================================== //

struct ShutdownManager {
    shutdown_tx: broadcast::Sender<()>,
    lifecycle_options: LifecycleOptions,
    controller: Option<Arc<CameraController>>,
    scheduler: Option<CaptureScheduler>,
    server_handle: Option<ServerHandle>,
}

impl ShutdownManager {
    pub fn new(shutdown_tx: broadcast::Sender<()>, lifecycle_options: LifecycleOptions) -> Self {
        Self {
            shutdown_tx,
            lifecycle_options,
            controller: None,
            scheduler: None,
            server_handle: None,
        }
    }

    pub fn with_controller(&mut self, controller: Arc<CameraController>) -> Result<(), ThingError> {
        if self.controller.is_some() {
            return Err(ThingError::ShutdownError("controller already set".to_string()));
        }
        self.controller = Some(controller);
        Ok(())
    }

    pub fn with_scheduler(&mut self, scheduler: CaptureScheduler) -> Result<(), ThingError> {
        if self.scheduler.is_some() {
            return Err(ThingError::ShutdownError("scheduler already set".to_string()));
        }
        self.scheduler = Some(scheduler);
        Ok(())
    }

    pub fn with_server_handle(&mut self, handle: ServerHandle) -> Result<(), ThingError> {
        if self.server_handle.is_some() {
            return Err(ThingError::ShutdownError("server_handle already set".to_string()));
        }
        self.server_handle = Some(handle);
        Ok(())
    }

    /// Every step runs even if an earlier one failed; the first error is returned.
    pub async fn shutdown(&mut self) -> Result<(), ThingError> {
        info!("Shutting down camera thing...");
        let mut first_error: Option<ThingError> = None;
        let mut record = |e: ThingError| {
            error!("Shutdown step failed: {}", e);
            first_error.get_or_insert(e);
        };

        // 1. Capture loop, must be stopped before the device is released
        if let Some(mut scheduler) = self.scheduler.take() {
            if let Err(e) = scheduler
                .stop(self.lifecycle_options.scheduler_stop_timeout)
                .await
            {
                record(e);
            }
        }

        // 2. Web Thing server
        let _ = self.shutdown_tx.send(());
        if let Some(mut handle) = self.server_handle.take() {
            let timeout = self.lifecycle_options.server_stop_timeout;
            let outcome = tokio::time::timeout(timeout, &mut handle).await;
            match outcome {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => record(e),
                Ok(Err(e)) => record(ThingError::ShutdownError(e.to_string())),
                Err(_) => {
                    warn!("Server did not drain within {:?}, aborting", timeout);
                    handle.abort();
                }
            }
        }

        // 3. Device streaming, then 4. device handle
        if let Some(controller) = self.controller.take() {
            if let Err(e) = controller.blocking(|c| c.stop_streaming()).await.and_then(|r| r) {
                record(e);
            }
            if let Err(e) = controller.blocking(|c| c.teardown()).await.and_then(|r| r) {
                record(e);
            }
        }

        info!("Shutdown complete");
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
