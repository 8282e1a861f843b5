//! Authority server — the single writer of canonical puzzle state.
//!
//! ARCHITECTURE
//! ============
//! One `AuthorityServer` per session owns the canonical `PieceGraph`, the
//! `SessionRegistry` and the hold-timeout queue. Intents are applied strictly
//! one at a time; each accepted intent appends facts to a pending buffer. At
//! every tick the expired hold timers are fired and the buffer is flushed as
//! one `Batch` with the next sequence number and a single timestamp.
//!
//! `run` wraps the server in a tokio task: intents arrive on an mpsc channel,
//! batches leave on a broadcast channel, and snapshot requests are answered
//! right after a flush so a snapshot never contains unflushed facts.
//!
//! ERROR HANDLING
//! ==============
//! Nothing that happens while applying one intent stops the loop.
//! - `Rejected`: valid but stale or racing intent. Dropped, logged at debug.
//! - `Malformed`: unknown piece or unknown player. Dropped, logged at warn.
//! - `Internal`: a graph precondition failed. Logged at error and surfaced as
//!   a diagnostic `ServerError` fact. Mutations already applied stay applied.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::{AuthorityConfig, TrustMode};
use crate::frame::{Batch, ErrorCode, Fact, Intent, PieceId, Point, now_ms};
use crate::services::graph::{GraphError, PieceGraph, PieceSnapshot, PutOutcome};
use crate::services::hold::HoldTimers;
use crate::services::progress::{Progress, Stopwatch};
use crate::services::registry::{JoinOutcome, PlayerSession, SessionRegistry};

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AuthorityError {
    #[error("rejected: {0}")]
    Rejected(String),
    #[error("malformed: {0}")]
    Malformed(String),
    #[error("internal: {0}")]
    Internal(GraphError),
}

impl ErrorCode for AuthorityError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Rejected(_) => "E_REJECTED",
            Self::Malformed(_) => "E_MALFORMED",
            Self::Internal(inner) => inner.error_code(),
        }
    }
}

impl From<GraphError> for AuthorityError {
    /// Held, fit and not-held are routine races. Anything structural means a
    /// broken precondition.
    fn from(err: GraphError) -> Self {
        match err {
            GraphError::UnknownPiece(_) => Self::Malformed(err.to_string()),
            GraphError::AlreadyHeld { .. } | GraphError::AlreadyFit(_) | GraphError::NotHeld(_) => {
                Self::Rejected(err.to_string())
            }
            other => Self::Internal(other),
        }
    }
}

/// Everything a late joiner needs to rebuild a mirror from the cut.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Sequence of the last batch whose facts are included.
    pub seq: u64,
    pub total_pieces: usize,
    pub fit_count: usize,
    pub complete: bool,
    pub pieces: Vec<PieceSnapshot>,
    pub players: Vec<PlayerSession>,
}

/// Messages accepted by the authority task.
#[derive(Debug)]
pub enum Inbound {
    Intent(Intent),
    Snapshot(oneshot::Sender<SessionSnapshot>),
}

pub struct AuthorityServer {
    graph: PieceGraph,
    registry: SessionRegistry,
    timers: HoldTimers,
    trust: TrustMode,
    pending: Vec<Fact>,
    seq: u64,
    completed: bool,
    stopwatch: Stopwatch,
}

// =============================================================================
// CONSTRUCTION / QUERIES
// =============================================================================

impl AuthorityServer {
    #[must_use]
    pub fn new(graph: PieceGraph, config: &AuthorityConfig, now: Instant) -> Self {
        Self {
            graph,
            registry: SessionRegistry::new(),
            timers: HoldTimers::new(config.hold_timeout),
            trust: config.trust,
            pending: Vec::new(),
            seq: 0,
            completed: false,
            stopwatch: Stopwatch::start_at(now),
        }
    }

    #[must_use]
    pub fn graph(&self) -> &PieceGraph {
        &self.graph
    }

    #[must_use]
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Sequence number of the last flushed batch; 0 before the first flush.
    #[must_use]
    pub fn seq(&self) -> u64 {
        self.seq
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.completed
    }

    /// Facts accepted since the last flush.
    #[must_use]
    pub fn pending(&self) -> &[Fact] {
        &self.pending
    }

    #[must_use]
    pub fn progress_at(&self, now: Instant) -> Progress {
        Progress::of(&self.graph, self.stopwatch.elapsed_at(now))
    }

    /// Standings for leaderboard presentation.
    #[must_use]
    pub fn leaderboard(&self) -> Vec<PlayerSession> {
        self.registry.leaderboard()
    }

    /// State as of the last flush. Call only with an empty pending buffer.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            seq: self.seq,
            total_pieces: self.graph.len(),
            fit_count: self.graph.fit_count(),
            complete: self.completed,
            pieces: self.graph.snapshot(),
            players: self.registry.players().to_vec(),
        }
    }
}

// =============================================================================
// INTENT HANDLING
// =============================================================================

impl AuthorityServer {
    /// Apply one intent. Never fails: every error is classified, logged and,
    /// for internal faults, turned into a diagnostic fact.
    pub fn handle_at(&mut self, intent: Intent, now: Instant) {
        let kind = intent.kind();
        let player_id = intent.player_id().to_owned();
        let result = match intent {
            Intent::Join { player_id, name } => {
                self.join(&player_id, &name);
                Ok(())
            }
            Intent::PickUp { piece_id, player_id } => self.pick_up(piece_id, &player_id, now),
            Intent::MoveTo { piece_id, player_id, pos } => self.move_to(piece_id, &player_id, pos),
            Intent::PutDown { piece_id, player_id, pos } => self.put_down(piece_id, &player_id, pos, now),
        };
        if let Err(err) = result {
            self.report(kind, &player_id, &err);
        }
    }

    fn join(&mut self, player_id: &str, name: &str) {
        match self.registry.join(player_id, name) {
            JoinOutcome::New => info!(%player_id, %name, "player joined"),
            JoinOutcome::Renamed { previous } => info!(%player_id, %previous, %name, "player rejoined"),
            JoinOutcome::Unchanged => debug!(%player_id, "player rejoined"),
        }
        self.pending.push(Fact::Joined { player_id: player_id.to_owned(), name: name.to_owned() });
    }

    fn pick_up(&mut self, piece_id: PieceId, player_id: &str, now: Instant) -> Result<(), AuthorityError> {
        self.graph.root_of(piece_id)?;
        if self.trust == TrustMode::Verified && !self.registry.is_known(player_id) {
            return Err(AuthorityError::Malformed(format!("unknown player: {player_id}")));
        }

        let root = self.graph.pick_up(piece_id, player_id)?;
        if let Some(previous) = self.timers.arm_at(player_id, root, now) {
            warn!(%player_id, previous, root, "hold timer replaced; player holds more than one group");
        }
        debug!(%player_id, piece_id, root, "picked up");
        self.pending.push(Fact::PickedUp { piece_id: root, player_id: player_id.to_owned() });
        Ok(())
    }

    fn move_to(&mut self, piece_id: PieceId, player_id: &str, pos: Point) -> Result<(), AuthorityError> {
        let root = self.graph.root_of(piece_id)?;
        if self.graph.holder_of(root) != Some(player_id) {
            return Err(AuthorityError::Rejected(format!("piece {root} not held by {player_id}")));
        }

        let pos = self.graph.move_to(root, pos)?;
        self.pending.push(Fact::Moved { piece_id: root, player_id: player_id.to_owned(), pos });
        Ok(())
    }

    fn put_down(&mut self, piece_id: PieceId, player_id: &str, pos: Point, now: Instant) -> Result<(), AuthorityError> {
        let root = self.graph.root_of(piece_id)?;
        let holder = self.graph.holder_of(root).map(str::to_owned);
        if self.graph.get(root).is_some_and(|p| p.is_fit()) {
            return Err(AuthorityError::Rejected(format!("piece {root} already fit")));
        }
        if self.trust == TrustMode::Verified && holder.as_deref() != Some(player_id) {
            return Err(AuthorityError::Rejected(format!("piece {root} not held by {player_id}")));
        }

        if let Some(holder) = &holder {
            if self.timers.root_for(holder) == Some(root) {
                self.timers.cancel(holder);
            }
        }
        self.settle(root, player_id, pos, now)
    }

    /// Release `root` at `pos`, then apply and announce whatever it snaps to.
    /// Shared by client put-downs and expired holds.
    fn settle(&mut self, root: PieceId, player_id: &str, pos: Point, now: Instant) -> Result<(), AuthorityError> {
        let pos = self.graph.clamp(pos);
        let outcome = self.graph.put_down(root, pos)?;
        self.pending.push(Fact::PutDown { piece_id: root, player_id: player_id.to_owned(), pos });

        match outcome {
            PutOutcome::Nothing => debug!(%player_id, root, "put down"),
            PutOutcome::Connected { parent, child } => {
                let score = self.registry.credit(player_id);
                debug!(%player_id, parent, child, score, "connected");
                self.pending.push(Fact::Connected { parent_id: parent, child_id: child, player_id: player_id.to_owned() });
            }
            PutOutcome::Fit { piece } => {
                let score = self.registry.credit(player_id);
                debug!(%player_id, piece, score, "fit");
                self.pending.push(Fact::Fit { piece_id: piece, player_id: player_id.to_owned() });
            }
        }

        if !self.completed && self.graph.is_complete() {
            self.completed = true;
            self.stopwatch.stop_at(now);
            info!(last_player_id = %player_id, pieces = self.graph.len(), "puzzle complete");
            self.pending.push(Fact::PuzzleComplete { last_player_id: player_id.to_owned() });
        }
        Ok(())
    }

    fn report(&mut self, kind: &str, player_id: &str, err: &AuthorityError) {
        match err {
            AuthorityError::Rejected(reason) => debug!(%player_id, kind, %reason, "intent rejected"),
            AuthorityError::Malformed(reason) => warn!(%player_id, kind, %reason, "malformed intent dropped"),
            AuthorityError::Internal(inner) => {
                error!(%player_id, kind, code = err.error_code(), error = %inner, "internal fault applying intent");
                self.pending.push(Fact::server_error(err));
            }
        }
    }
}

// =============================================================================
// TICK
// =============================================================================

impl AuthorityServer {
    /// Release every group whose hold outlived the grace period, at its last
    /// broadcast position, through the normal put-down path.
    pub fn expire_holds_at(&mut self, now: Instant) {
        for expired in self.timers.expired_at(now) {
            let (player_id, root) = (expired.player_id, expired.root);
            let still_held = self.graph.get(root).is_some_and(|p| p.is_root() && p.holder() == Some(player_id.as_str()));
            if !still_held {
                debug!(%player_id, root, "stale hold timer ignored");
                continue;
            }

            info!(%player_id, root, "hold timeout fired");
            let pos = self.graph.world(root);
            if let Err(err) = self.settle(root, &player_id, pos, now) {
                self.report("hold_timeout", &player_id, &err);
            }
        }
    }

    /// Drain the pending buffer into the next batch.
    pub fn flush(&mut self) -> Option<Batch> {
        if self.pending.is_empty() {
            return None;
        }
        self.seq += 1;
        Some(Batch { seq: self.seq, ts: now_ms(), facts: std::mem::take(&mut self.pending) })
    }

    /// One scheduler tick: fire timers, then flush.
    pub fn tick_at(&mut self, now: Instant) -> Option<Batch> {
        self.expire_holds_at(now);
        self.flush()
    }
}

// =============================================================================
// TASK
// =============================================================================

/// Drive the authority until every intent sender is dropped.
pub async fn run(
    mut authority: AuthorityServer,
    mut inbound: mpsc::Receiver<Inbound>,
    facts: broadcast::Sender<Arc<Batch>>,
    tick: Duration,
) {
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut waiting: Vec<oneshot::Sender<SessionSnapshot>> = Vec::new();

    loop {
        tokio::select! {
            msg = inbound.recv() => match msg {
                Some(Inbound::Intent(intent)) => authority.handle_at(intent, tokio::time::Instant::now().into_std()),
                Some(Inbound::Snapshot(reply)) => waiting.push(reply),
                None => break,
            },
            _ = interval.tick() => {
                publish(&mut authority, &facts, tokio::time::Instant::now().into_std());
                if !waiting.is_empty() {
                    let snapshot = authority.snapshot();
                    for reply in waiting.drain(..) {
                        let _ = reply.send(snapshot.clone());
                    }
                }
            }
        }
    }

    publish(&mut authority, &facts, tokio::time::Instant::now().into_std());
    info!(seq = authority.seq(), "authority stopped");
}

fn publish(authority: &mut AuthorityServer, facts: &broadcast::Sender<Arc<Batch>>, now: Instant) {
    let Some(batch) = authority.tick_at(now) else {
        return;
    };
    debug!(seq = batch.seq, facts = batch.facts.len(), "batch flushed");
    // No subscribers is fine: nobody is connected to observe the batch.
    let _ = facts.send(Arc::new(batch));
}

/// Spawn the authority task and return its intent sender.
pub fn spawn(
    authority: AuthorityServer,
    facts: broadcast::Sender<Arc<Batch>>,
    tick: Duration,
    capacity: usize,
) -> (mpsc::Sender<Inbound>, tokio::task::JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(capacity);
    let handle = tokio::spawn(run(authority, rx, facts, tick));
    (tx, handle)
}

#[cfg(test)]
#[path = "authority_test.rs"]
mod tests;
