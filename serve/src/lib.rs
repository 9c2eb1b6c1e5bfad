//! HTTP/WebSocket surface for the assistant: health, tools, metrics, text
//! requests, the voice session, provider webhooks and the events REST API.

mod app;
mod routes;
mod voice_ws;

pub use app::{router, AppState};
