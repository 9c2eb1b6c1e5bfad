//! Axum app: shared state and route table.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use valet::ServiceContainer;

use crate::routes;
use crate::voice_ws::ws_handler;

#[derive(Clone)]
pub struct AppState {
    pub container: Arc<ServiceContainer>,
}

pub fn router(container: Arc<ServiceContainer>) -> Router {
    let state = AppState { container };
    Router::new()
        .route("/healthz", get(routes::healthz))
        .route("/tools", get(routes::tools))
        .route("/metrics", get(routes::metrics))
        .route("/text", post(routes::text))
        .route("/voice", get(ws_handler))
        .route("/email/send", post(routes::email_send))
        .route("/events", get(routes::events_list))
        .route("/events/suggest", post(routes::events_suggest))
        .route("/events/:id/approve", post(routes::events_approve))
        .route("/events/:id/reject", post(routes::events_reject))
        .route("/calendly/webhook", post(routes::calendly_webhook))
        .route("/whatsapp/webhook", post(routes::whatsapp_webhook))
        .with_state(state)
}
