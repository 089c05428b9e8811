//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{close_code, rejection::WebSocketUpgradeRejection, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use futures::{future, SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{error, info, warn};

use crate::app::AppState;
use crate::game::session::{ConnectionError, Frame};
use crate::game::Session;
use crate::http::auth::{extract_bearer_token, verify_jwt, AuthError, JwtClaims};

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// JWT token for authentication, the Authorization header is used without it
    pub token: Option<String>,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    // Verify JWT token before upgrading
    let claims = match authenticate(&query, &headers, &state.config.jwt_secret) {
        Ok(claims) => claims,
        Err(e) => {
            warn!(error = %e, "WebSocket auth failed");
            return e.into_response();
        }
    };

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    info!(user_id = %claims.sub, "WebSocket upgrade for authenticated user");
    ws.on_upgrade(move |socket| handle_socket(socket, claims, state))
}

fn authenticate(query: &WsQuery, headers: &HeaderMap, secret: &str) -> Result<JwtClaims, AuthError> {
    let token = match query.token.as_deref() {
        Some(token) => token,
        None => extract_bearer_token(headers)?,
    };
    verify_jwt(token, secret)
}

/// Wrap the upgraded socket into a session and hand it to matchmaking
async fn handle_socket(socket: WebSocket, claims: JwtClaims, state: AppState) {
    let user_id = claims.sub;
    info!(user_id = %user_id, "New WebSocket connection");

    let (ws_sink, ws_stream) = socket.split();

    let sink = ws_sink
        .sink_map_err(|e| ConnectionError::Transport(e.to_string()))
        .with(|frame: Frame| future::ready(Ok::<_, ConnectionError>(into_message(frame))));
    let stream = ws_stream.filter_map(|result| future::ready(into_frame(result)));

    let session = Session::new(user_id, claims.session_id.unwrap_or_default(), sink, stream);
    if let Err(e) = state.matchmaking.submit(session) {
        error!(user_id = %user_id, error = %e, "Failed to submit session");
    }
}

fn into_message(frame: Frame) -> Message {
    match frame {
        Frame::Text(text) => Message::Text(text),
        Frame::Close => Message::Close(Some(CloseFrame {
            code: close_code::NORMAL,
            reason: "".into(),
        })),
    }
}

/// Control frames are answered by axum and never reach the match
fn into_frame(result: Result<Message, axum::Error>) -> Option<Result<Frame, ConnectionError>> {
    match result {
        Ok(Message::Text(text)) => Some(Ok(Frame::Text(text))),
        Ok(Message::Binary(bytes)) => Some(Ok(Frame::Text(String::from_utf8_lossy(&bytes).into_owned()))),
        Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => None,
        Ok(Message::Close(_)) => Some(Ok(Frame::Close)),
        Err(e) => Some(Err(ConnectionError::Transport(e.to_string()))),
    }
}
