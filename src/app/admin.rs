use crate::app::public::StatusResponse;
use crate::error::EngineError;
use crate::push::{ForceSendOutcome, SendRequest};
use crate::state;
use crate::types::push::{
    NewSubscription, Notification, NotificationId, NotificationPage, NotificationStatus,
    SigningKeyPair, Subscription,
};

use axum::Json;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use time::OffsetDateTime;

pub(crate) const ADMIN_SECRET_HEADER: &str = "x-admin-secret";
const DEFAULT_PAGE_SIZE: usize = 20;

#[derive(Serialize)]
struct AdminErrorResponse {
    error: &'static str,
}

pub(crate) async fn admin_middleware(
    State(state): State<state::AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if secret_matches(req.headers(), &state.config.admin_secret) {
        return next.run(req).await;
    }

    tracing::warn!(path = req.uri().path(), "admin request rejected: invalid secret");
    (
        StatusCode::UNAUTHORIZED,
        Json(AdminErrorResponse {
            error: "Invalid secret",
        }),
    )
        .into_response()
}

fn secret_matches(headers: &HeaderMap, expected: &str) -> bool {
    let Some(provided) = headers
        .get(ADMIN_SECRET_HEADER)
        .and_then(|value| value.to_str().ok())
    else {
        return false;
    };
    provided.as_bytes().ct_eq(expected.as_bytes()).into()
}

pub(crate) async fn login() -> Json<StatusResponse> {
    Json(StatusResponse { status: "ok" })
}

#[derive(Serialize)]
pub(crate) struct KeysResponse {
    #[serde(rename = "publicKey")]
    pub(crate) public_key: Option<String>,
    #[serde(rename = "privateKey")]
    pub(crate) private_key: Option<String>,
}

impl From<Option<SigningKeyPair>> for KeysResponse {
    fn from(keys: Option<SigningKeyPair>) -> Self {
        match keys {
            Some(keys) => Self {
                public_key: Some(keys.public_key),
                private_key: Some(keys.private_key),
            },
            None => Self {
                public_key: None,
                private_key: None,
            },
        }
    }
}

pub(crate) async fn keys(
    State(state): State<state::AppState>,
) -> Result<Json<KeysResponse>, EngineError> {
    Ok(Json(state.engine.signing_keys()?.into()))
}

pub(crate) async fn generate_keys(
    State(state): State<state::AppState>,
) -> Result<Json<KeysResponse>, EngineError> {
    tracing::info!("admin generating new signing keys");
    Ok(Json(Some(state.engine.generate_keys()?).into()))
}

#[derive(Debug, Deserialize)]
pub(crate) struct ImportKeysRequest {
    #[serde(rename = "publicKey")]
    pub(crate) public_key: String,
    #[serde(rename = "privateKey")]
    pub(crate) private_key: String,
}

pub(crate) async fn upload_keys(
    State(state): State<state::AppState>,
    Json(request): Json<ImportKeysRequest>,
) -> Result<Json<KeysResponse>, EngineError> {
    tracing::info!("admin uploading signing keys");
    let keys = state
        .engine
        .import_keys(request.public_key, request.private_key)?;
    Ok(Json(Some(keys).into()))
}

#[derive(Serialize)]
pub(crate) struct StatsResponse {
    pub(crate) devices: usize,
}

pub(crate) async fn stats(
    State(state): State<state::AppState>,
) -> Result<Json<StatsResponse>, EngineError> {
    Ok(Json(StatsResponse {
        devices: state.engine.subscriber_count()?,
    }))
}

#[derive(Debug, Deserialize)]
pub(crate) struct SendBody {
    pub(crate) title: String,
    pub(crate) message: String,
    pub(crate) image: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub(crate) send_date: Option<OffsetDateTime>,
}

pub(crate) async fn send(
    State(state): State<state::AppState>,
    Json(body): Json<SendBody>,
) -> Result<Json<Notification>, EngineError> {
    let notification = state
        .engine
        .create_and_dispatch(SendRequest {
            title: body.title,
            body: body.message,
            image_url: body.image,
            send_date: body.send_date,
        })
        .await?;
    Ok(Json(notification))
}

pub(crate) async fn send_now(
    State(state): State<state::AppState>,
    Path(id): Path<NotificationId>,
) -> Result<Json<ForceSendOutcome>, EngineError> {
    Ok(Json(state.engine.force_send_now(id).await?))
}

#[derive(Debug, Deserialize)]
pub(crate) struct HistoryQuery {
    pub(crate) status: Option<String>,
    pub(crate) offset: Option<usize>,
    pub(crate) limit: Option<usize>,
}

pub(crate) async fn history(
    State(state): State<state::AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<NotificationPage>, EngineError> {
    let status = match query.status.as_deref() {
        None | Some("all") => None,
        Some(raw) => Some(NotificationStatus::parse(raw).ok_or_else(|| {
            EngineError::InvalidInput(format!("unknown notification status '{raw}'"))
        })?),
    };
    let page = state.engine.notifications(
        status,
        query.offset.unwrap_or(0),
        query.limit.unwrap_or(DEFAULT_PAGE_SIZE),
    )?;
    Ok(Json(page))
}

pub(crate) async fn subscribers(
    State(state): State<state::AppState>,
) -> Result<Json<Vec<Subscription>>, EngineError> {
    Ok(Json(state.engine.subscribers()?))
}

#[derive(Debug, Deserialize)]
pub(crate) struct ImportSubscribersRequest {
    pub(crate) subscribers: Vec<NewSubscription>,
}

#[derive(Serialize)]
pub(crate) struct ImportSubscribersResponse {
    pub(crate) imported: usize,
    pub(crate) message: String,
}

pub(crate) async fn import_subscribers(
    State(state): State<state::AppState>,
    Json(request): Json<ImportSubscribersRequest>,
) -> Result<Json<ImportSubscribersResponse>, EngineError> {
    tracing::info!(
        count = request.subscribers.len(),
        "admin importing subscribers"
    );
    let imported = state.engine.import_subscribers(request.subscribers)?;
    Ok(Json(ImportSubscribersResponse {
        imported,
        message: format!("Imported {imported} new subscribers"),
    }))
}

#[derive(Serialize, Deserialize)]
pub(crate) struct ScheduleResponse {
    #[serde(with = "time::serde::rfc3339")]
    pub(crate) server_time: OffsetDateTime,
    pub(crate) scheduled: Vec<ScheduleEntry>,
}

#[derive(Serialize, Deserialize)]
pub(crate) struct ScheduleEntry {
    pub(crate) notification_id: NotificationId,
    #[serde(with = "time::serde::rfc3339")]
    pub(crate) run_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub(crate) scheduled_at: OffsetDateTime,
}

pub(crate) async fn schedule(State(state): State<state::AppState>) -> Json<ScheduleResponse> {
    let scheduled = state
        .engine
        .scheduled_jobs()
        .into_iter()
        .map(|job| ScheduleEntry {
            notification_id: job.notification_id,
            run_at: job.run_at,
            scheduled_at: job.scheduled_at,
        })
        .collect();
    Json(ScheduleResponse {
        server_time: state.engine.now(),
        scheduled,
    })
}
