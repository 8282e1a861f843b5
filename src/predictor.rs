//! Client predictor — optimistic local drag on top of an authoritative mirror.
//!
//! ARCHITECTURE
//! ============
//! Two pieces of state are kept strictly apart:
//! - the mirror: a `PieceGraph` (plus registry and progress) that changes only
//!   by applying authoritative batches, in order, never from local input;
//! - the local hold: the one group this client is dragging, with its
//!   optimistic position, drawn over the mirror until reconciliation ends it.
//!
//! Local input produces intents in an outbox; the host drains and sends them.
//!
//! RECONCILIATION
//! ==============
//! After every applied fact the local hold is checked against the mirror:
//! - another player holds our root, or the root was merged away or fit:
//!   the hold is stale, so a corrective `PutDown` is queued and the hold drops;
//! - the mirror shows us as holder: the pick is confirmed;
//! - a confirmed hold whose holder was cleared (hold timeout) drops silently.
//!
//! A released group keeps its local position only until the authority says
//! anything else about it: its `PutDown`, a merge or fit, or another holder.
//!
//! The camera follow only ever moves the local camera and the local hold.

use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::authority::SessionSnapshot;
use crate::camera::Camera;
use crate::config::TrustMode;
use crate::cut::CutDescription;
use crate::frame::{Batch, Fact, Intent, PieceId, PlayerId, Point};
use crate::services::graph::{GraphError, PieceGraph};
use crate::services::progress::{Milestone, MilestoneTracker, Progress, Stopwatch};
use crate::services::registry::{PlayerSession, SessionRegistry};

/// Frames skipped between `MoveTo` intents while dragging.
const MOVE_WAIT_FRAMES: u32 = 3;

/// Minimum gap between a local release and the next local pick.
const REPICK_DEBOUNCE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PredictorConfig {
    pub move_wait_frames: u32,
    pub repick_debounce: Duration,
}

impl PredictorConfig {
    /// A trusted single-player client may re-pick immediately.
    #[must_use]
    pub fn for_trust(trust: TrustMode) -> Self {
        let repick_debounce = match trust {
            TrustMode::Verified => REPICK_DEBOUNCE,
            TrustMode::Trusted => Duration::ZERO,
        };
        Self { move_wait_frames: MOVE_WAIT_FRAMES, repick_debounce }
    }
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self::for_trust(TrustMode::Verified)
    }
}

#[derive(Debug, Clone, PartialEq)]
struct LocalHold {
    root: PieceId,
    /// Optimistic root position in layer coordinates.
    position: Point,
    /// Pointer in screen coordinates, for edge panning.
    pointer: Point,
    confirmed: bool,
    frames_until_send: u32,
    last_frame_position: Point,
}

pub struct ClientPredictor {
    me: PlayerId,
    config: PredictorConfig,
    mirror: PieceGraph,
    registry: SessionRegistry,
    milestones: MilestoneTracker,
    stopwatch: Stopwatch,
    last_seq: u64,
    complete: bool,
    completed_by: Option<PlayerId>,
    hold: Option<LocalHold>,
    /// Root released locally whose `PutDown` fact has not arrived yet.
    settling: Option<(PieceId, Point)>,
    last_release: Option<Instant>,
    camera: Camera,
    outbox: Vec<Intent>,
    notices: Vec<Milestone>,
}

// =============================================================================
// CONSTRUCTION / QUERIES
// =============================================================================

impl ClientPredictor {
    /// Fresh client for a session that has not flushed anything yet.
    #[must_use]
    pub fn new(me: &str, mirror: PieceGraph, camera: Camera, config: PredictorConfig, now: Instant) -> Self {
        Self {
            me: me.to_owned(),
            config,
            milestones: MilestoneTracker::for_graph(&mirror),
            mirror,
            registry: SessionRegistry::new(),
            stopwatch: Stopwatch::start_at(now),
            last_seq: 0,
            complete: false,
            completed_by: None,
            hold: None,
            settling: None,
            last_release: None,
            camera,
            outbox: Vec::new(),
            notices: Vec::new(),
        }
    }

    /// Late joiner: rebuild the mirror from the cut and a session snapshot.
    /// Batches up to and including `snapshot.seq` will be ignored.
    ///
    /// # Errors
    ///
    /// Returns a `GraphError` if the snapshot does not match the cut.
    pub fn from_snapshot(
        me: &str,
        cut: &CutDescription,
        snapshot: &SessionSnapshot,
        camera: Camera,
        config: PredictorConfig,
        now: Instant,
    ) -> Result<Self, GraphError> {
        let positions: Vec<Point> = snapshot.pieces.iter().map(|p| p.position).collect();
        let mut mirror = PieceGraph::new(cut, &positions)?;
        mirror.restore(&snapshot.pieces, snapshot.fit_count)?;

        let mut predictor = Self::new(me, mirror, camera, config, now);
        predictor.registry.restore(&snapshot.players);
        predictor.last_seq = snapshot.seq;
        // Milestones already passed are not news to a late joiner.
        predictor.milestones.observe(&predictor.mirror);
        if snapshot.complete {
            predictor.stopwatch.stop_at(now);
            predictor.complete = true;
        }
        Ok(predictor)
    }

    #[must_use]
    pub fn player_id(&self) -> &str {
        &self.me
    }

    /// Authoritative state as last broadcast.
    #[must_use]
    pub fn mirror(&self) -> &PieceGraph {
        &self.mirror
    }

    #[must_use]
    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    #[must_use]
    pub fn last_seq(&self) -> u64 {
        self.last_seq
    }

    /// Root currently dragged locally.
    #[must_use]
    pub fn held_root(&self) -> Option<PieceId> {
        self.hold.as_ref().map(|h| h.root)
    }

    /// Whether the authority has confirmed the local hold.
    #[must_use]
    pub fn is_confirmed(&self) -> bool {
        self.hold.as_ref().is_some_and(|h| h.confirmed)
    }

    /// Player whose action completed the puzzle, if this client saw it happen.
    #[must_use]
    pub fn completed_by(&self) -> Option<&str> {
        self.completed_by.as_deref()
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    #[must_use]
    pub fn leaderboard(&self) -> Vec<PlayerSession> {
        self.registry.leaderboard()
    }

    #[must_use]
    pub fn progress_at(&self, now: Instant) -> Progress {
        Progress::of(&self.mirror, self.stopwatch.elapsed_at(now))
    }

    /// Where a piece should be drawn: the local prediction for the held or
    /// just-released group, the mirror otherwise.
    #[must_use]
    pub fn display_position(&self, piece_id: PieceId) -> Option<Point> {
        let root = self.mirror.root_of(piece_id).ok()?;
        let local = match (&self.hold, self.settling) {
            (Some(hold), _) if hold.root == root => Some(hold.position),
            (_, Some((settling, pos))) if settling == root => Some(pos),
            _ => None,
        };
        match local {
            Some(root_pos) => {
                let offset = self.mirror.get(piece_id)?.answer().sub(self.mirror.get(root)?.answer());
                Some(root_pos.add(offset))
            }
            None => self.mirror.world_position(piece_id).ok(),
        }
    }

    /// Intents produced since the last drain, in order.
    pub fn drain_outbox(&mut self) -> Vec<Intent> {
        std::mem::take(&mut self.outbox)
    }

    /// Milestones reached since the last drain.
    pub fn drain_notices(&mut self) -> Vec<Milestone> {
        std::mem::take(&mut self.notices)
    }
}

// =============================================================================
// LOCAL INPUT
// =============================================================================

impl ClientPredictor {
    /// Start dragging the group containing `piece_id`. Returns the root when
    /// the pick is accepted locally and a `PickUp` was queued.
    pub fn pick_at(&mut self, piece_id: PieceId, pointer: Point, now: Instant) -> Option<PieceId> {
        if self.hold.is_some() {
            return None;
        }
        if self.last_release.is_some_and(|at| now.saturating_duration_since(at) < self.config.repick_debounce) {
            debug!(piece_id, "pick ignored inside debounce window");
            return None;
        }
        let root = self.mirror.root_of(piece_id).ok()?;
        let piece = self.mirror.get(root)?;
        if piece.is_fit() || piece.holder().is_some() {
            return None;
        }

        let position = self.mirror.world(root);
        self.hold = Some(LocalHold {
            root,
            position,
            pointer,
            confirmed: false,
            frames_until_send: 0,
            last_frame_position: position,
        });
        self.outbox.push(Intent::PickUp { piece_id: root, player_id: self.me.clone() });
        Some(root)
    }

    /// Pointer moved by `delta` screen pixels while dragging.
    pub fn drag_by(&mut self, delta: Point) {
        let scale = self.camera.scale;
        let Some(hold) = &mut self.hold else {
            return;
        };
        hold.pointer = hold.pointer.add(delta);
        let moved = hold.position.add(Point::new(delta.x * scale, delta.y * scale));
        hold.position = self.mirror.clamp(moved);
    }

    /// Per-frame update while dragging: edge-pan the camera, carry the held
    /// group along, and send a rate-limited `MoveTo` if the group moved.
    pub fn frame(&mut self) {
        let Some(hold) = &mut self.hold else {
            return;
        };

        let panned = self.camera.follow(hold.pointer);
        if panned != Point::default() {
            hold.position = self.mirror.clamp(hold.position.add(panned));
        }

        if hold.position == hold.last_frame_position {
            return;
        }
        hold.last_frame_position = hold.position;
        if hold.frames_until_send == 0 {
            hold.frames_until_send = self.config.move_wait_frames;
            self.outbox.push(Intent::MoveTo { piece_id: hold.root, player_id: self.me.clone(), pos: hold.position });
        } else {
            hold.frames_until_send -= 1;
        }
    }

    /// Drop the held group at its current local position.
    pub fn release_at(&mut self, now: Instant) -> Option<PieceId> {
        let hold = self.hold.take()?;
        self.last_release = Some(now);
        self.settling = Some((hold.root, hold.position));
        self.outbox.push(Intent::PutDown { piece_id: hold.root, player_id: self.me.clone(), pos: hold.position });
        Some(hold.root)
    }
}

// =============================================================================
// RECONCILIATION
// =============================================================================

impl ClientPredictor {
    /// Apply an authoritative batch. Batches at or below the last applied
    /// sequence are ignored; returns whether this one was applied.
    pub fn apply_batch(&mut self, batch: &Batch, now: Instant) -> bool {
        if batch.seq <= self.last_seq {
            debug!(seq = batch.seq, last_seq = self.last_seq, "stale batch ignored");
            return false;
        }
        if batch.seq != self.last_seq + 1 {
            warn!(seq = batch.seq, last_seq = self.last_seq, "batch sequence gap");
        }
        self.last_seq = batch.seq;

        for fact in &batch.facts {
            if let Err(err) = self.apply_fact(fact, now) {
                warn!(error = %err, ?fact, "fact could not be mirrored");
            }
            self.reconcile();
        }
        true
    }

    fn apply_fact(&mut self, fact: &Fact, now: Instant) -> Result<(), GraphError> {
        match fact {
            Fact::Joined { player_id, name } => {
                self.registry.join(player_id, name);
            }
            Fact::PickedUp { piece_id, player_id } => {
                let root = self.mirror.root_of(*piece_id)?;
                self.mirror.set_holder(root, Some(player_id.clone()))?;
            }
            Fact::Moved { piece_id, player_id, pos } => {
                let root = self.mirror.root_of(*piece_id)?;
                self.mirror.set_holder(root, Some(player_id.clone()))?;
                self.mirror.set_position(root, *pos)?;
            }
            Fact::PutDown { piece_id, pos, .. } => {
                let root = self.mirror.root_of(*piece_id)?;
                if self.settling.is_some_and(|(settling, _)| settling == root) {
                    self.settling = None;
                }
                self.mirror.release(root, *pos)?;
            }
            Fact::Connected { parent_id, child_id, player_id } => {
                let parent = self.mirror.root_of(*parent_id)?;
                let child = self.mirror.root_of(*child_id)?;
                self.mirror.merge_groups(parent, child)?;
                self.registry.credit(player_id);
                self.observe_milestones();
            }
            Fact::Fit { piece_id, player_id } => {
                self.mirror.fit_to_board(*piece_id)?;
                self.registry.credit(player_id);
                self.observe_milestones();
            }
            Fact::PuzzleComplete { last_player_id } => {
                self.stopwatch.stop_at(now);
                self.complete = true;
                self.completed_by = Some(last_player_id.clone());
            }
            Fact::ServerError { code, message } => {
                warn!(%code, %message, "server reported an internal fault");
            }
        }
        Ok(())
    }

    fn observe_milestones(&mut self) {
        let reached = self.milestones.observe(&self.mirror);
        self.notices.extend(reached);
    }

    fn reconcile(&mut self) {
        if let Some((root, _)) = self.settling {
            let superseded = self.mirror.get(root).is_none_or(|p| {
                !p.is_root() || p.is_fit() || p.holder().is_some_and(|holder| holder != self.me)
            });
            if superseded {
                self.settling = None;
            }
        }

        let Some(hold) = &mut self.hold else {
            return;
        };
        let Some(piece) = self.mirror.get(hold.root) else {
            self.hold = None;
            return;
        };

        let stolen = piece.holder().is_some_and(|holder| holder != self.me);
        if stolen || !piece.is_root() || piece.is_fit() {
            debug!(root = hold.root, stolen, "local hold is stale; sending corrective put-down");
            self.outbox.push(Intent::PutDown { piece_id: hold.root, player_id: self.me.clone(), pos: hold.position });
            self.hold = None;
            return;
        }

        match piece.holder() {
            Some(_) => hold.confirmed = true,
            None if hold.confirmed => {
                debug!(root = hold.root, "local hold released by the authority");
                self.hold = None;
            }
            None => {}
        }
    }
}

#[cfg(test)]
#[path = "predictor_test.rs"]
mod tests;
