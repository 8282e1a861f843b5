//! WebSocket handler — one connection's view of the session.
//!
//! DESIGN
//! ======
//! The adapter is thin. It never validates game rules; it forwards intents to
//! the authority task and relays authoritative batches back. The player
//! identity comes from the upgrade query and is stamped onto every inbound
//! intent, whatever the client claims.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade with `?player_id=..&name=..` and subscribe to the fact broadcast
//! 2. Queue a `join` intent, then request a snapshot (answered after a flush)
//! 3. Send `welcome` and `snapshot` (cut + state as of `snapshot.seq`)
//! 4. Relay every batch newer than the snapshot, in order
//! 5. A connection that falls behind the broadcast buffer is closed; the
//!    client reconnects and rebuilds from a fresh snapshot

use std::collections::HashMap;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::frame::{Intent, PlayerId, ServerMessage};
use crate::state::AppState;

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(player_id) = params.get("player_id").filter(|id| !id.trim().is_empty()).cloned() else {
        return (StatusCode::BAD_REQUEST, "player_id required").into_response();
    };
    let name = params.get("name").cloned().unwrap_or_else(|| player_id.clone());

    ws.on_upgrade(move |socket| run_ws(socket, state, player_id, name))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState, player_id: PlayerId, name: String) {
    let client_id = Uuid::new_v4();

    // Subscribe before joining so no batch after the snapshot can be missed.
    let mut facts = state.facts.subscribe();

    if !state.submit(Intent::Join { player_id: player_id.clone(), name }).await {
        warn!(%client_id, "ws: authority unavailable");
        return;
    }
    let Some(snapshot) = state.request_snapshot().await else {
        warn!(%client_id, "ws: snapshot request dropped");
        return;
    };
    let mut last_seq = snapshot.seq;

    let welcome = ServerMessage::Welcome { client_id, player_id: player_id.clone() };
    let initial = ServerMessage::Snapshot { cut: (*state.cut).clone(), snapshot };
    if send_message(&mut socket, &welcome).await.is_err() || send_message(&mut socket, &initial).await.is_err() {
        return;
    }

    info!(%client_id, %player_id, seq = last_seq, "ws: client connected");

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { break };
                match msg {
                    Message::Text(text) => {
                        let replies = process_inbound_text(&state, client_id, &player_id, &text).await;
                        if send_all(&mut socket, &replies).await.is_err() {
                            break;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            batch = facts.recv() => match batch {
                Ok(batch) => {
                    if batch.seq <= last_seq {
                        continue;
                    }
                    last_seq = batch.seq;
                    let msg = ServerMessage::Batch { batch: (*batch).clone() };
                    if send_message(&mut socket, &msg).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(%client_id, skipped, "ws: client lagged behind fact stream; closing");
                    let msg = ServerMessage::Error { code: "E_LAGGED".into(), message: format!("missed {skipped} batches") };
                    let _ = send_message(&mut socket, &msg).await;
                    break;
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    info!(%client_id, %player_id, "ws: client disconnected");
}

// =============================================================================
// INBOUND
// =============================================================================

/// Parse one inbound text message and forward it to the authority. Returns
/// messages for the sender only; accepted intents produce none, their effect
/// arrives later in a batch.
pub(crate) async fn process_inbound_text(
    state: &AppState,
    client_id: Uuid,
    player_id: &str,
    text: &str,
) -> Vec<ServerMessage> {
    let intent: Intent = match serde_json::from_str(text) {
        Ok(intent) => intent,
        Err(e) => {
            warn!(%client_id, error = %e, "ws: invalid inbound intent");
            return vec![ServerMessage::Error { code: "E_INVALID_INTENT".into(), message: format!("invalid intent: {e}") }];
        }
    };

    if intent.player_id() != player_id {
        debug!(%client_id, claimed = intent.player_id(), %player_id, "ws: restamping player id");
    }
    let intent = intent.with_player_id(player_id);
    debug!(%client_id, kind = intent.kind(), "ws: recv intent");

    if state.submit(intent).await {
        Vec::new()
    } else {
        vec![ServerMessage::Error { code: "E_AUTHORITY_CLOSED".into(), message: "session has ended".into() }]
    }
}

async fn send_message(socket: &mut WebSocket, msg: &ServerMessage) -> Result<(), axum::Error> {
    let json = match serde_json::to_string(msg) {
        Ok(json) => json,
        Err(e) => {
            warn!(error = %e, "ws: failed to encode server message");
            return Ok(());
        }
    };
    socket.send(Message::Text(json.into())).await
}

async fn send_all(socket: &mut WebSocket, msgs: &[ServerMessage]) -> Result<(), axum::Error> {
    for msg in msgs {
        send_message(socket, msg).await?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
