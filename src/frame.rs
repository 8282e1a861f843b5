//! Frame — the typed messages exchanged between clients and the authority.
//!
//! ARCHITECTURE
//! ============
//! Clients send `Intent`s (unvalidated requests). The authority validates
//! them, mutates the canonical piece graph, and emits `Fact`s (statements of
//! what happened). Facts produced during one scheduling tick are flushed
//! together as a single `Batch` stamped with one timestamp and a strictly
//! increasing sequence number.
//!
//! DESIGN
//! ======
//! - Closed sum types, internally tagged on the wire (`{"type": "pick_up", ..}`).
//!   Every kind is matched exhaustively; nothing is routed on strings.
//! - Field names are snake_case on the wire and in Rust.
//! - `ServerMessage` wraps everything the websocket adapter pushes to a
//!   connection: welcome, snapshot, batches, transport errors.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::authority::SessionSnapshot;
use crate::cut::CutDescription;

// =============================================================================
// PRIMITIVES
// =============================================================================

/// Piece identity: index into the session's piece arena, stable for the session.
pub type PieceId = usize;

/// Stable, platform-assigned player identity.
pub type PlayerId = String;

/// 2D offset in layer pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    #[must_use]
    pub fn add(self, other: Point) -> Point {
        Point::new(self.x + other.x, self.y + other.y)
    }

    #[must_use]
    pub fn sub(self, other: Point) -> Point {
        Point::new(self.x - other.x, self.y - other.y)
    }
}

// =============================================================================
// INTENTS (client -> authority)
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Intent {
    Join { player_id: PlayerId, name: String },
    PickUp { piece_id: PieceId, player_id: PlayerId },
    MoveTo { piece_id: PieceId, player_id: PlayerId, pos: Point },
    PutDown { piece_id: PieceId, player_id: PlayerId, pos: Point },
}

impl Intent {
    /// Player the intent claims to act for.
    #[must_use]
    pub fn player_id(&self) -> &str {
        match self {
            Self::Join { player_id, .. }
            | Self::PickUp { player_id, .. }
            | Self::MoveTo { player_id, .. }
            | Self::PutDown { player_id, .. } => player_id,
        }
    }

    /// Overwrite the claimed player with the connection's identity.
    #[must_use]
    pub fn with_player_id(mut self, id: &str) -> Self {
        match &mut self {
            Self::Join { player_id, .. }
            | Self::PickUp { player_id, .. }
            | Self::MoveTo { player_id, .. }
            | Self::PutDown { player_id, .. } => id.clone_into(player_id),
        }
        self
    }

    /// Short label for logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Join { .. } => "join",
            Self::PickUp { .. } => "pick_up",
            Self::MoveTo { .. } => "move_to",
            Self::PutDown { .. } => "put_down",
        }
    }
}

// =============================================================================
// FACTS (authority -> all clients)
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Fact {
    Joined { player_id: PlayerId, name: String },
    /// `piece_id` is always the resolved root.
    PickedUp { piece_id: PieceId, player_id: PlayerId },
    Moved { piece_id: PieceId, player_id: PlayerId, pos: Point },
    PutDown { piece_id: PieceId, player_id: PlayerId, pos: Point },
    /// `parent_id` is always the lower id of the two merged roots.
    Connected { parent_id: PieceId, child_id: PieceId, player_id: PlayerId },
    Fit { piece_id: PieceId, player_id: PlayerId },
    PuzzleComplete { last_player_id: PlayerId },
    /// Diagnostic only. Never rolls anything back.
    ServerError { code: String, message: String },
}

impl Fact {
    /// Build a diagnostic fact from a typed error.
    #[must_use]
    pub fn server_error(err: &(impl ErrorCode + ?Sized)) -> Self {
        Self::ServerError { code: err.error_code().to_string(), message: err.to_string() }
    }
}

/// Facts flushed together at the end of one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    /// Strictly increasing per session, starting at 1.
    pub seq: u64,
    /// Milliseconds since Unix epoch, shared by every fact in the batch.
    pub ts: i64,
    pub facts: Vec<Fact>,
}

// =============================================================================
// SERVER MESSAGES (websocket adapter -> one connection)
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Welcome { client_id: Uuid, player_id: PlayerId },
    Snapshot { cut: CutDescription, snapshot: SessionSnapshot },
    Batch { batch: Batch },
    Error { code: String, message: String },
}

// =============================================================================
// ERROR CODES
// =============================================================================

/// Grepable error code for structured diagnostics.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;
}

/// Current time as milliseconds since Unix epoch.
#[must_use]
pub fn now_ms() -> i64 {
    let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(dur.as_millis()).unwrap_or(0)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intent_wire_shape_is_tagged_snake_case() {
        let intent = Intent::PickUp { piece_id: 5, player_id: "alice".into() };
        let json = serde_json::to_value(&intent).unwrap();
        assert_eq!(json["type"], "pick_up");
        assert_eq!(json["piece_id"], 5);
        assert_eq!(json["player_id"], "alice");
    }

    #[test]
    fn intent_parses_from_client_json() {
        let text = r#"{"type":"put_down","piece_id":3,"player_id":"bob","pos":{"x":1.5,"y":-2}}"#;
        let intent: Intent = serde_json::from_str(text).unwrap();
        assert_eq!(intent, Intent::PutDown { piece_id: 3, player_id: "bob".into(), pos: Point::new(1.5, -2.0) });
    }

    #[test]
    fn unknown_intent_kind_is_rejected_by_parser() {
        let text = r#"{"type":"teleport","piece_id":3,"player_id":"bob"}"#;
        assert!(serde_json::from_str::<Intent>(text).is_err());
    }

    #[test]
    fn with_player_id_stamps_every_kind() {
        let pos = Point::new(0.0, 0.0);
        let stamped = [
            Intent::Join { player_id: "x".into(), name: "n".into() },
            Intent::PickUp { piece_id: 0, player_id: "x".into() },
            Intent::MoveTo { piece_id: 0, player_id: "x".into(), pos },
            Intent::PutDown { piece_id: 0, player_id: "x".into(), pos },
        ]
        .map(|intent| intent.with_player_id("real"));
        assert!(stamped.iter().all(|intent| intent.player_id() == "real"));
    }

    #[test]
    fn server_error_fact_carries_code() {
        #[derive(Debug, thiserror::Error)]
        #[error("boom")]
        struct Boom;

        impl ErrorCode for Boom {
            fn error_code(&self) -> &'static str {
                "E_BOOM"
            }
        }

        assert_eq!(
            Fact::server_error(&Boom),
            Fact::ServerError { code: "E_BOOM".into(), message: "boom".into() }
        );
    }

    #[test]
    fn batch_json_round_trip() {
        let batch = Batch {
            seq: 7,
            ts: now_ms(),
            facts: vec![
                Fact::Connected { parent_id: 0, child_id: 1, player_id: "a".into() },
                Fact::PuzzleComplete { last_player_id: "a".into() },
            ],
        };
        let json = serde_json::to_string(&batch).unwrap();
        let restored: Batch = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, batch);
    }

    #[test]
    fn point_arithmetic() {
        let a = Point::new(3.0, 4.0);
        let b = Point::new(1.0, 1.0);
        assert_eq!(a.add(b), Point::new(4.0, 5.0));
        assert_eq!(a.sub(b), Point::new(2.0, 3.0));
    }
}
