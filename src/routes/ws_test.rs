use super::*;
use crate::authority::Inbound;
use crate::frame::Fact;
use crate::state::test_helpers;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::time::{Duration, timeout};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;

type Client = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn serve(state: AppState) -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind should succeed");
    let addr = listener.local_addr().expect("listener has an address");
    tokio::spawn(async move {
        let _ = axum::serve(listener, crate::routes::app(state)).await;
    });
    addr
}

async fn next_message(client: &mut Client) -> ServerMessage {
    loop {
        let msg = timeout(Duration::from_secs(2), client.next())
            .await
            .expect("server message timed out")
            .expect("socket closed unexpectedly")
            .expect("socket error");
        if let WsMessage::Text(text) = msg {
            return serde_json::from_str(&text).expect("server message should parse");
        }
    }
}

// =============================================================================
// process_inbound_text
// =============================================================================

#[tokio::test]
async fn inbound_intent_is_stamped_with_connection_player() {
    let (state, mut rx) = test_helpers::detached_app_state();
    let text = r#"{"type":"pick_up","piece_id":1,"player_id":"mallory"}"#;

    let replies = process_inbound_text(&state, Uuid::new_v4(), "alice", text).await;

    assert!(replies.is_empty());
    let Some(Inbound::Intent(intent)) = rx.recv().await else {
        panic!("expected a forwarded intent");
    };
    assert_eq!(intent, Intent::PickUp { piece_id: 1, player_id: "alice".into() });
}

#[tokio::test]
async fn invalid_json_is_answered_with_error() {
    let (state, mut rx) = test_helpers::detached_app_state();

    let replies = process_inbound_text(&state, Uuid::new_v4(), "alice", "{not json").await;

    assert!(matches!(replies.as_slice(), [ServerMessage::Error { code, .. }] if code == "E_INVALID_INTENT"));
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn unknown_intent_kind_is_answered_with_error() {
    let (state, _rx) = test_helpers::detached_app_state();
    let text = r#"{"type":"rotate","piece_id":1,"player_id":"alice"}"#;

    let replies = process_inbound_text(&state, Uuid::new_v4(), "alice", text).await;

    assert!(matches!(replies.as_slice(), [ServerMessage::Error { code, .. }] if code == "E_INVALID_INTENT"));
}

#[tokio::test]
async fn stopped_authority_is_reported_to_sender() {
    let (state, rx) = test_helpers::detached_app_state();
    drop(rx);
    let text = r#"{"type":"put_down","piece_id":0,"player_id":"alice","pos":{"x":1,"y":2}}"#;

    let replies = process_inbound_text(&state, Uuid::new_v4(), "alice", text).await;

    assert!(matches!(replies.as_slice(), [ServerMessage::Error { code, .. }] if code == "E_AUTHORITY_CLOSED"));
}

// =============================================================================
// end to end
// =============================================================================

#[tokio::test]
async fn connect_receives_welcome_snapshot_then_batches() {
    let addr = serve(test_helpers::live_app_state()).await;
    let (mut client, _) = connect_async(format!("ws://{addr}/api/ws?player_id=alice&name=Alice"))
        .await
        .expect("ws connect should succeed");

    let ServerMessage::Welcome { player_id, .. } = next_message(&mut client).await else {
        panic!("expected welcome first");
    };
    assert_eq!(player_id, "alice");

    let ServerMessage::Snapshot { cut, snapshot } = next_message(&mut client).await else {
        panic!("expected snapshot second");
    };
    assert_eq!(cut.len(), 2);
    assert_eq!(snapshot.total_pieces, 2);
    assert!(snapshot.players.iter().any(|p| p.player_id == "alice" && p.name == "Alice"));

    let pick = r#"{"type":"pick_up","piece_id":1,"player_id":"mallory"}"#;
    client.send(WsMessage::Text(pick.into())).await.expect("send should succeed");

    let mut last_seq = snapshot.seq;
    loop {
        match next_message(&mut client).await {
            ServerMessage::Batch { batch } => {
                assert!(batch.seq > last_seq);
                last_seq = batch.seq;
                if batch.facts.contains(&Fact::PickedUp { piece_id: 1, player_id: "alice".into() }) {
                    break;
                }
            }
            other => panic!("unexpected message {other:?}"),
        }
    }
}

#[tokio::test]
async fn second_client_sees_first_clients_moves() {
    let addr = serve(test_helpers::live_app_state()).await;
    let (mut alice, _) = connect_async(format!("ws://{addr}/api/ws?player_id=alice")).await.unwrap();
    let (mut bob, _) = connect_async(format!("ws://{addr}/api/ws?player_id=bob")).await.unwrap();
    for client in [&mut alice, &mut bob] {
        next_message(client).await;
        next_message(client).await;
    }

    alice.send(WsMessage::Text(r#"{"type":"pick_up","piece_id":0,"player_id":"alice"}"#.into())).await.unwrap();

    loop {
        if let ServerMessage::Batch { batch } = next_message(&mut bob).await {
            if batch.facts.contains(&Fact::PickedUp { piece_id: 0, player_id: "alice".into() }) {
                break;
            }
        }
    }
}

#[tokio::test]
async fn upgrade_without_player_id_is_refused() {
    let addr = serve(test_helpers::live_app_state()).await;
    assert!(connect_async(format!("ws://{addr}/api/ws")).await.is_err());
}
