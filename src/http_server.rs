//! The HTTP/SSE surface: axum router assembly, generic per-entity REST
//! routes dispatched by domain, and a bus-driven `/events` stream. Router
//! composition is grounded on the teacher's `src/api.rs`
//! (`router(state) -> Router`, `/health` shape); the channel-bridging
//! pattern behind `/events` is grounded on `src/websocket.rs`'s task that
//! reads a broadcast receiver and forwards it into the connection loop.

use crate::device::Device;
use crate::entity::BusEvent;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
struct HttpState {
    device: Arc<Device>,
    started_at: Arc<Instant>,
}

pub fn router(device: Arc<Device>) -> Router {
    let state = HttpState { device, started_at: Arc::new(Instant::now()) };
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/events", get(sse_events))
        .route("/:domain/:object_id", get(get_entity_state))
        .route("/:domain/:object_id/:action", post(entity_action))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn index(State(state): State<HttpState>) -> Json<serde_json::Value> {
    Json(json!({
        "name": state.device.name,
        "mac_address": state.device.mac_address,
        "model": state.device.model,
        "entity_count": state.device.entity_count(),
    }))
}

/// GET /health — ambient liveness/metrics endpoint.
async fn health(State(state): State<HttpState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "entity_count": state.device.entity_count(),
    }))
}

async fn get_entity_state(
    State(state): State<HttpState>,
    Path((domain, object_id)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let entity = state.device.get_by_object_id(&object_id).ok_or(StatusCode::NOT_FOUND)?;
    if entity.info().domain != domain {
        return Err(StatusCode::NOT_FOUND);
    }
    entity.state_json().await.map(Json).ok_or(StatusCode::NOT_FOUND)
}

/// POST /:domain/:object_id/:action — switch/light/number commands arrive
/// as query parameters; climate commands arrive as a JSON body, since its
/// fields don't fit cleanly into flat query strings (two-point targets,
/// mode/preset enums).
async fn entity_action(
    State(state): State<HttpState>,
    Path((domain, object_id, action)): Path<(String, String, String)>,
    Query(params): Query<HashMap<String, String>>,
    body: axum::body::Bytes,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let entity = state
        .device
        .get_by_object_id(&object_id)
        .ok_or((StatusCode::NOT_FOUND, format!("no entity '{object_id}'")))?;
    if entity.info().domain != domain {
        return Err((StatusCode::NOT_FOUND, format!("'{object_id}' is not a {domain}")));
    }

    let outcome = if domain == "climate" {
        let json_body: serde_json::Value = if body.is_empty() {
            json!({})
        } else {
            serde_json::from_slice(&body).map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?
        };
        entity.http_json_command(&action, json_body).await
    } else {
        entity.http_command(&action, &params).await
    };
    outcome.map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

    let state_json = entity.state_json().await.unwrap_or_else(|| json!({}));
    Ok(Json(state_json))
}

/// GET /events — bootstraps one `state` event per entity with a current
/// value, then streams `state`/`log` events as they're published, via the
/// device's broadcast tap (not the per-entity bus, so it sees everything
/// regardless of `can_handle` gating). A `state` event's body is the
/// entity's `state_json()` verbatim; a `log` event's body is the already
/// formatted log line as plain text.
async fn sse_events(
    State(state): State<HttpState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::unbounded_channel::<Event>();

    for entity in state.device.entities() {
        if let Some(value) = entity.state_json().await {
            let _ = tx.send(Event::default().event("state").data(value.to_string()));
        }
    }

    let device = state.device.clone();
    let mut bus_rx = device.subscribe();
    tokio::spawn(async move {
        loop {
            match bus_rx.recv().await {
                Ok((publisher_key, event)) => {
                    match &event {
                        BusEvent::StateChange(state_event) => {
                            let Some(entity) = device.get_by_key(state_event.key()) else { continue };
                            let Some(value) = entity.state_json().await else { continue };
                            if tx.send(Event::default().event("state").data(value.to_string())).is_err() {
                                break;
                            }
                        }
                        BusEvent::Log(_level, message) => {
                            if tx.send(Event::default().event("log").data(message.clone())).is_err() {
                                break;
                            }
                        }
                        BusEvent::ClientRequest(_) => {
                            let _ = publisher_key;
                        }
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "SSE subscriber lagged; some events dropped");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let stream = UnboundedReceiverStream::new(rx).map(Ok::<_, Infallible>);
    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceConfig;
    use crate::entities::binary_sensor::BinarySensor;
    use crate::entities::switch::Switch;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn device() -> Arc<Device> {
        Device::new(DeviceConfig { name: "http-test".into(), mac_address: Some("02:00:00:0a:0b:0c".into()), ..Default::default() })
    }

    #[tokio::test]
    async fn health_reports_entity_count() {
        let device = device();
        device.add_entity(Arc::new(BinarySensor::new("Motion", &device.name, &device.mac_address, None, None))).unwrap();
        let app = router(device);

        let response = app
            .oneshot(axum::http::Request::builder().uri("/health").body(axum::body::Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["entity_count"], 1);
    }

    #[tokio::test]
    async fn turn_on_switch_via_query_params() {
        let device = device();
        let switch = Arc::new(Switch::new("Relay", &device.name, &device.mac_address, None, None));
        device.add_entity(switch.clone()).unwrap();
        let app = router(device);

        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/switch/relay/turn_on")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(switch.state());
    }

    #[tokio::test]
    async fn unknown_entity_is_not_found() {
        let device = device();
        let app = router(device);
        let response = app
            .oneshot(axum::http::Request::builder().uri("/switch/nope").body(axum::body::Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
