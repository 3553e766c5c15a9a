use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        Query, State, WebSocketUpgrade,
        rejection::JsonRejection,
        ws::rejection::WebSocketUpgradeRejection,
    },
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use gitlink_gateway::{EventHub, auth::verify_token, connection};
use gitlink_types::api::CommandRequest;

use crate::dispatcher::CommandDispatcher;
use crate::middleware::{CommandToken, require_command_token};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub dispatcher: CommandDispatcher,
    pub hub: EventHub,
    /// HS256 secret for event-socket JWTs.
    pub events_secret: String,
}

/// All plugin routes. `/command` sits behind the host's shared token;
/// `/events` authenticates with a JWT in the query string since browsers
/// can't set headers on a WebSocket handshake.
pub fn router(state: AppState, command_token: CommandToken) -> Router {
    let command_routes = Router::new()
        .route("/command", post(execute_command))
        .layer(middleware::from_fn_with_state(command_token, require_command_token))
        .with_state(state.clone());

    let public_routes = Router::new()
        .route("/events", get(events_upgrade))
        .route("/health", get(health))
        .with_state(state);

    Router::new().merge(command_routes).merge(public_routes)
}

/// 200 with the response body, or 204 when the line belongs to another command.
pub async fn execute_command(
    State(state): State<AppState>,
    payload: Result<Json<CommandRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(req) => req,
        Err(rejection) => {
            warn!("Malformed command delivery: {}", rejection.body_text());
            return rejection.into_response();
        }
    };

    // Dropped when the host hangs up, which cancels any upstream work.
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    match state.dispatcher.execute(&req, &cancel).await {
        Some(resp) => Json(resp).into_response(),
        None => {
            debug!(command = %req.command, "Declined command");
            StatusCode::NO_CONTENT.into_response()
        }
    }
}

#[derive(Deserialize)]
struct EventsQuery {
    #[serde(default)]
    token: String,
}

async fn events_upgrade(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let Some(user_id) = verify_token(&state.events_secret, &query.token) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };

    match ws {
        Ok(ws) => {
            let hub = state.hub.clone();
            ws.on_upgrade(move |socket| connection::handle_connection(socket, hub, user_id))
        }
        Err(rejection) => rejection.into_response(),
    }
}

async fn health() -> &'static str {
    "ok"
}
