//! Websocket transport: upgrade, reader loop, writer task.

use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, info, warn};

use parley_shared::UserId;

use crate::api::AppState;
use crate::error::ServerError;
use crate::registry::OutboundHandle;
use crate::session::Session;

/// How long the writer gets to flush queued frames and the close handshake.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
}

/// `GET /ws?userId=...`. Rejects the handshake when no identifier is given.
pub async fn ws_handler(
    Query(params): Query<ConnectParams>,
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Result<Response, ServerError> {
    let user = params
        .user_id
        .filter(|id| !id.is_empty())
        .map(UserId::from)
        .ok_or(ServerError::MissingUserId)?;

    Ok(ws.on_upgrade(move |socket| run_connection(socket, user, state)))
}

/// Drive one upgraded connection until the peer goes away.
pub async fn run_connection(socket: WebSocket, user: UserId, state: AppState) {
    let (outbound, mut queue) = OutboundHandle::channel(state.config.outbound_queue_size);
    let (mut ws_tx, mut ws_rx) = socket.split();

    let mut session = match Session::new(user, outbound, state.router.clone()) {
        Ok(session) => session,
        Err(e) => {
            warn!(error = %e, "Refusing connection");
            return;
        }
    };

    // Writer: drain the outbound queue into the socket in FIFO order.
    let writer_user = session.user().clone();
    let mut writer = tokio::spawn(async move {
        while let Some(frame) = queue.recv().await {
            if let Err(e) = ws_tx.send(WsMessage::Text(frame)).await {
                debug!(user = %writer_user, error = %e, "Socket write failed");
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    session.activate().await;

    while let Some(frame) = ws_rx.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => session.handle_frame(&text).await,
            Ok(WsMessage::Binary(bytes)) => match std::str::from_utf8(&bytes) {
                Ok(text) => session.handle_frame(text).await,
                Err(_) => debug!(user = %session.user(), "Discarding non-UTF-8 binary frame"),
            },
            Ok(WsMessage::Close(_)) => break,
            // Ping/pong are answered by the transport.
            Ok(_) => {}
            Err(e) => {
                debug!(user = %session.user(), error = %e, "Socket read failed");
                break;
            }
        }
    }

    session.close().await;
    let user = session.user().clone();

    // Dropping the session releases the last queue sender, so the writer
    // drains what is left and answers the close handshake.
    drop(session);
    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer).await.is_err() {
        debug!(user = %user, "Writer did not drain in time, aborting");
        writer.abort();
    }

    info!(user = %user, "Connection finished");
}
