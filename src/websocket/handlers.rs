use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use serde::Deserialize;

use super::session;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    // kept as a raw string so a malformed id is answered with an error
    // event on the socket instead of a failed upgrade
    #[serde(default)]
    pub user_id: Option<String>,
}

pub async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| session::run(state, params, socket))
}

pub async fn health() -> &'static str {
    "ok"
}
