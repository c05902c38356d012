//! HTTP server setup

use std::future::Future;
use std::sync::Arc;

use axum::{
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::app::options::ServerOptions;
use crate::errors::ThingError;
use crate::server::handlers::{
    events_handler, get_property_handler, health_handler, properties_handler,
    put_property_handler, snapshot_media_handler, thing_handler, version_handler,
};
use crate::server::state::ServerState;
use crate::server::thing::SNAPSHOT_HREF;

/// Build the Web Thing router
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        // Thing description
        .route("/", get(thing_handler))
        // Properties
        .route("/properties", get(properties_handler))
        .route(
            "/properties/{name}",
            get(get_property_handler).put(put_property_handler),
        )
        // Snapshot media and events
        .route(SNAPSHOT_HREF, get(snapshot_media_handler))
        .route("/events", get(events_handler))
        // Health and version
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        // State and middleware
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Start the HTTP server
pub async fn serve(
    options: &ServerOptions,
    state: Arc<ServerState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<Result<(), ThingError>>, ThingError> {
    let app = router(state);

    let addr = format!("{}:{}", options.host, options.port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| ThingError::ServerError(e.to_string()))?;
    info!("Starting the Web Thing server on {}", addr);

    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| ThingError::ServerError(e.to_string()))
    });

    Ok(handle)
}
