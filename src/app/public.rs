use crate::error::EngineError;
use crate::state;
use crate::types::push::{NewSubscription, Notification, NotificationId};

use axum::Json;
use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
pub(crate) struct StatusResponse {
    pub(crate) status: &'static str,
}

#[derive(Serialize)]
pub(crate) struct PublicKeyResponse {
    #[serde(rename = "publicKey")]
    pub(crate) public_key: Option<String>,
}

pub(crate) async fn vapid_public_key(
    State(state): State<state::AppState>,
) -> Result<Json<PublicKeyResponse>, EngineError> {
    Ok(Json(PublicKeyResponse {
        public_key: state.engine.vapid_public_key()?,
    }))
}

#[derive(Serialize)]
pub(crate) struct VersionResponse {
    pub(crate) version: &'static str,
}

pub(crate) async fn version() -> Json<VersionResponse> {
    Json(VersionResponse {
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubscriptionKeys {
    pub(crate) p256dh: String,
    pub(crate) auth: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubscribeRequest {
    pub(crate) endpoint: String,
    pub(crate) keys: SubscriptionKeys,
}

pub(crate) async fn subscribe(
    State(state): State<state::AppState>,
    Json(request): Json<SubscribeRequest>,
) -> Result<Json<StatusResponse>, EngineError> {
    state.engine.subscribe(NewSubscription {
        endpoint: request.endpoint,
        p256dh: request.keys.p256dh,
        auth: request.keys.auth,
    })?;
    Ok(Json(StatusResponse { status: "saved" }))
}

#[derive(Debug, Deserialize)]
pub(crate) struct UnsubscribeRequest {
    pub(crate) endpoint: String,
}

pub(crate) async fn unsubscribe(
    State(state): State<state::AppState>,
    Json(request): Json<UnsubscribeRequest>,
) -> Result<Json<StatusResponse>, EngineError> {
    state.engine.unsubscribe(&request.endpoint)?;
    Ok(Json(StatusResponse { status: "ok" }))
}

pub(crate) async fn notification_detail(
    State(state): State<state::AppState>,
    Path(id): Path<NotificationId>,
) -> Result<Json<Notification>, EngineError> {
    state
        .engine
        .notification(id)?
        .map(Json)
        .ok_or(EngineError::NotificationNotFound(id))
}

pub(crate) async fn track_view(
    State(state): State<state::AppState>,
    Path(id): Path<NotificationId>,
) -> Json<StatusResponse> {
    if let Err(err) = state.engine.record_view(id) {
        tracing::warn!(notification_id = id, error = %err, "failed to record view");
    }
    Json(StatusResponse { status: "ok" })
}
