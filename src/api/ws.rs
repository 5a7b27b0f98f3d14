//! Real-time channel: `GET /ws` upgrades to the event bus client loop
//! in `eventbus::client`.

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::eventbus::client;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub org_id: Option<Uuid>,
}

async fn upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
) -> Response {
    ws.on_upgrade(move |socket| client::handle_connection(state.bus, socket, query.org_id))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/ws", get(upgrade))
}
