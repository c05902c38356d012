//! HTTP request handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{error, warn};

use crate::errors::ThingError;
use crate::filesys::file::File;
use crate::hardware::params::Resolution;
use crate::server::state::ServerState;
use crate::server::thing::{Property, SNAPSHOT_HREF};
use crate::utils::version_info;
use crate::workers::scheduler::SchedulerState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub camera_ready: bool,
    pub scheduler: SchedulerState,
    pub captures: CaptureCounts,
}

#[derive(Debug, Serialize)]
pub struct CaptureCounts {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
}

/// Health check handler
pub async fn health_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let camera_ready = state.controller.is_ready();
    let stats = &state.scheduler.stats;
    Json(HealthResponse {
        status: if camera_ready { "healthy" } else { "degraded" }.to_string(),
        service: "picam-thing".to_string(),
        version: version_info().version,
        camera_ready,
        scheduler: state.scheduler.state(),
        captures: CaptureCounts {
            attempts: stats.attempts(),
            successes: stats.successes(),
            failures: stats.failures(),
        },
    })
}

/// Version response
#[derive(Debug, Serialize)]
pub struct VersionResponse {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    let version = version_info();
    Json(VersionResponse {
        version: version.version,
        git_hash: version.git_hash,
        build_time: version.build_time,
    })
}

/// Thing description handler
pub async fn thing_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    Json(state.description.clone())
}

/// All property values
pub async fn properties_handler(
    State(state): State<Arc<ServerState>>,
) -> Result<impl IntoResponse, StatusCode> {
    let mut values = Map::new();
    for property in Property::ALL {
        values.insert(property.name().to_string(), read_property(&state, property).await?);
    }
    Ok(Json(Value::Object(values)))
}

/// Single property value
pub async fn get_property_handler(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, StatusCode> {
    let property = name.parse::<Property>().map_err(|_| StatusCode::NOT_FOUND)?;
    let value = read_property(&state, property).await?;
    Ok(Json(json!({ property.name(): value })))
}

/// Property write. Body is `{"<name>": <value>}`; a rejected value maps to 400.
pub async fn put_property_handler(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, StatusCode> {
    let property = name.parse::<Property>().map_err(|_| StatusCode::NOT_FOUND)?;
    if property.is_read_only() {
        warn!("Rejected write to read-only property {}", property);
        return Err(StatusCode::BAD_REQUEST);
    }
    let value = body.get(property.name()).cloned().ok_or(StatusCode::BAD_REQUEST)?;

    match write_property(&state, property, value).await {
        Ok(()) => {}
        Err(ThingError::ParameterRejected(_)) => return Err(StatusCode::BAD_REQUEST),
        Err(e) => {
            error!("Failed to write property {}: {}", property, e);
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    }

    let value = read_property(&state, property).await?;
    Ok(Json(json!({ property.name(): value })))
}

/// Latest snapshot image bytes
pub async fn snapshot_media_handler(
    State(state): State<Arc<ServerState>>,
) -> Result<impl IntoResponse, StatusCode> {
    let file = File::new(state.snapshot.path());
    if !file.exists().await {
        return Err(StatusCode::NOT_FOUND);
    }

    let bytes = file.read_bytes().await.map_err(|e| {
        error!("Failed to read snapshot: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok((
        [
            (header::CONTENT_TYPE, state.snapshot.media_type()),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        bytes,
    ))
}

/// Recent snapshot events, oldest first
pub async fn events_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let events: Vec<Value> = state
        .snapshot
        .history()
        .into_iter()
        .map(|event| {
            json!({
                "snapshot": {
                    "timestamp": event.captured_at.to_rfc3339(),
                    "data": {
                        "sequence": event.sequence,
                        "href": SNAPSHOT_HREF,
                    },
                }
            })
        })
        .collect();
    Json(events)
}

async fn read_property(state: &ServerState, property: Property) -> Result<Value, StatusCode> {
    let controller = &state.controller;
    let value = match property {
        Property::Snapshot => return Ok(Value::Null),
        Property::Resolution => controller.blocking(|c| Value::from(c.get_resolution())).await,
        Property::Framerate => controller.blocking(|c| Value::from(c.get_framerate())).await,
        Property::ExposureMode => {
            controller.blocking(|c| Value::from(c.get_exposure_mode())).await
        }
    };

    value.map_err(|e| {
        error!("Failed to read property {}: {}", property, e);
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

async fn write_property(
    state: &ServerState,
    property: Property,
    value: Value,
) -> Result<(), ThingError> {
    let controller = &state.controller;
    let rejected = |expected: &str| {
        ThingError::ParameterRejected(format!("{} expects {}, got {}", property, expected, value))
    };

    let result = match property {
        Property::Snapshot => Err(ThingError::ParameterRejected("snapshot is read-only".to_string())),
        Property::Resolution => {
            let resolution = parse_resolution(&value).ok_or_else(|| rejected("\"WxH\" or [w, h]"))??;
            controller.blocking(move |c| c.set_resolution_to(resolution)).await
        }
        Property::Framerate => {
            let fps = value.as_f64().ok_or_else(|| rejected("a number"))?;
            controller.blocking(move |c| c.set_framerate(fps)).await
        }
        Property::ExposureMode => {
            let mode = value.as_str().ok_or_else(|| rejected("a string"))?.to_string();
            controller.blocking(move |c| c.set_exposure_mode(&mode)).await
        }
    };
    result.and_then(|applied| applied)
}

/// Accept `"WxH"` or a `[width, height]` pair
fn parse_resolution(value: &Value) -> Option<Result<Resolution, ThingError>> {
    match value {
        Value::String(s) => Some(s.parse()),
        Value::Array(items) => match items.as_slice() {
            [w, h] => {
                let w = u32::try_from(w.as_u64()?).ok()?;
                let h = u32::try_from(h.as_u64()?).ok()?;
                Some(Resolution::try_from((w, h)))
            }
            _ => None,
        },
        _ => None,
    }
}
