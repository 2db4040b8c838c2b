use crate::state;

use axum::Router;
use axum::middleware;
use axum::routing::{get, post};

mod admin;
mod public;

pub fn app(state: state::AppState) -> Router {
    let admin_routes = Router::new()
        .route("/login", post(admin::login))
        .route("/keys", get(admin::keys))
        .route("/keys/generate", post(admin::generate_keys))
        .route("/keys/upload", post(admin::upload_keys))
        .route("/stats", get(admin::stats))
        .route("/send", post(admin::send))
        .route("/notifications", get(admin::history))
        .route("/notifications/{id}/send-now", post(admin::send_now))
        .route("/subscribers", get(admin::subscribers))
        .route("/subscribers/import", post(admin::import_subscribers))
        .route("/schedule", get(admin::schedule))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            admin::admin_middleware,
        ));

    Router::new()
        .route("/health", get(health))
        .route("/version", get(public::version))
        .route("/vapid-public-key", get(public::vapid_public_key))
        .route("/subscribe", post(public::subscribe))
        .route("/unsubscribe", post(public::unsubscribe))
        .route("/notifications/{id}", get(public::notification_detail))
        .route("/notifications/{id}/view", post(public::track_view))
        .nest("/admin", admin_routes)
        .with_state(state)
}

pub(crate) async fn health() -> &'static str {
    "ok"
}
