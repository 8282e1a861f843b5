//! Piece graph — the forest of pieces, their grouping, holders and fit state.
//!
//! DESIGN
//! ======
//! Pieces live in a flat arena indexed by id; parent/child links are indices,
//! never references. Groups are kept flat: a piece is either a root (no
//! parent) or a direct child of its root, so root lookup is O(1) and there is
//! no depth to walk. Only the root of a group carries an authoritative
//! `position`; every other piece is placed at a fixed offset derived from the
//! `answer` offsets.
//!
//! INVARIANTS
//! ==========
//! After every successful mutation:
//! - No cycles; every piece has at most one parent, and that parent is a root.
//! - A child never holds and never tracks children of its own.
//! - `is_fit` is monotonic, and a fit piece is never held.
//! - Every child lists its root as parent and its root lists it as a child.
//!
//! `fit_count` counts structural credits: one per merge, one per board fit.
//! Each merge retires one unfit group and each fit retires one, so the count
//! reaches the number of pieces exactly when every piece is on the board.

use serde::{Deserialize, Serialize};

use crate::cut::CutDescription;
use crate::frame::{ErrorCode, PieceId, PlayerId, Point};
use crate::services::resolver;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum GraphError {
    #[error("piece not found: {0}")]
    UnknownPiece(PieceId),
    #[error("piece {piece} already held by {holder}")]
    AlreadyHeld { piece: PieceId, holder: PlayerId },
    #[error("piece already fit: {0}")]
    AlreadyFit(PieceId),
    #[error("piece not held: {0}")]
    NotHeld(PieceId),
    #[error("piece is not a group root: {0}")]
    NotRoot(PieceId),
    #[error("pieces {0} and {1} already share a group")]
    SameGroup(PieceId, PieceId),
    #[error("cut description rejected: {0}")]
    Cut(#[from] crate::cut::CutError),
    #[error("expected {expected} positions, got {actual}")]
    PositionCount { expected: usize, actual: usize },
    #[error("invariant violated: {0}")]
    Invariant(String),
}

impl ErrorCode for GraphError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::UnknownPiece(_) => "E_PIECE_NOT_FOUND",
            Self::AlreadyHeld { .. } => "E_PIECE_HELD",
            Self::AlreadyFit(_) => "E_PIECE_FIT",
            Self::NotHeld(_) => "E_PIECE_NOT_HELD",
            Self::NotRoot(_) => "E_PIECE_NOT_ROOT",
            Self::SameGroup(..) => "E_SAME_GROUP",
            Self::Cut(_) => "E_CUT",
            Self::PositionCount { .. } => "E_POSITION_COUNT",
            Self::Invariant(_) => "E_INVARIANT",
        }
    }
}

/// Result of a put-down: at most one structural change per put.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PutOutcome {
    Nothing,
    /// `parent` is the lower id of the two merged roots.
    Connected { parent: PieceId, child: PieceId },
    Fit { piece: PieceId },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Piece {
    id: PieceId,
    /// Authoritative only while the piece is a root.
    position: Point,
    answer: Point,
    connects: Vec<PieceId>,
    parent: Option<PieceId>,
    children: Vec<PieceId>,
    is_fit: bool,
    holder: Option<PlayerId>,
}

impl Piece {
    #[must_use]
    pub fn id(&self) -> PieceId {
        self.id
    }

    #[must_use]
    pub fn answer(&self) -> Point {
        self.answer
    }

    #[must_use]
    pub fn connects(&self) -> &[PieceId] {
        &self.connects
    }

    #[must_use]
    pub fn parent(&self) -> Option<PieceId> {
        self.parent
    }

    #[must_use]
    pub fn children(&self) -> &[PieceId] {
        &self.children
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    #[must_use]
    pub fn is_fit(&self) -> bool {
        self.is_fit
    }

    #[must_use]
    pub fn holder(&self) -> Option<&str> {
        self.holder.as_deref()
    }
}

/// Dynamic state of one piece, enough to rebuild a mirror from a cut.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PieceSnapshot {
    pub id: PieceId,
    pub position: Point,
    pub parent: Option<PieceId>,
    pub children: Vec<PieceId>,
    pub is_fit: bool,
    pub holder: Option<PlayerId>,
}

#[derive(Debug, Clone)]
pub struct PieceGraph {
    pieces: Vec<Piece>,
    fit_count: usize,
    tolerance: f64,
    margin: Point,
    bounds: Point,
}

// =============================================================================
// CONSTRUCTION
// =============================================================================

impl PieceGraph {
    /// Create every piece from the cut, placed at `positions`.
    ///
    /// # Errors
    ///
    /// Returns `Cut` if the description is malformed and `PositionCount` if
    /// `positions` does not cover every piece.
    pub fn new(cut: &CutDescription, positions: &[Point]) -> Result<Self, GraphError> {
        cut.validate()?;
        if positions.len() != cut.len() {
            return Err(GraphError::PositionCount { expected: cut.len(), actual: positions.len() });
        }

        let pieces = (0..cut.len())
            .map(|id| Piece {
                id,
                position: positions[id],
                answer: cut.answers[id],
                connects: cut.connects[id].clone(),
                parent: None,
                children: Vec::new(),
                is_fit: false,
                holder: None,
            })
            .collect();

        Ok(Self { pieces, fit_count: 0, tolerance: cut.tolerance(), margin: cut.margin, bounds: cut.layer_bounds() })
    }

    /// Create every piece at its seeded scatter position.
    ///
    /// # Errors
    ///
    /// Returns `Cut` if the description is malformed.
    pub fn scattered(cut: &CutDescription, seed: u64) -> Result<Self, GraphError> {
        Self::new(cut, &cut.scatter(seed))
    }

    /// Override the connection tolerance fixed at start.
    #[must_use]
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }
}

// =============================================================================
// QUERIES
// =============================================================================

impl PieceGraph {
    #[must_use]
    pub fn len(&self) -> usize {
        self.pieces.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: PieceId) -> Option<&Piece> {
        self.pieces.get(id)
    }

    #[must_use]
    pub fn pieces(&self) -> &[Piece] {
        &self.pieces
    }

    #[must_use]
    pub fn fit_count(&self) -> usize {
        self.fit_count
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.fit_count >= self.pieces.len()
    }

    #[must_use]
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    #[must_use]
    pub fn margin(&self) -> Point {
        self.margin
    }

    #[must_use]
    pub fn bounds(&self) -> Point {
        self.bounds
    }

    /// Resolve any piece to the root of its group.
    ///
    /// # Errors
    ///
    /// Returns `UnknownPiece` for an id outside the arena.
    pub fn root_of(&self, id: PieceId) -> Result<PieceId, GraphError> {
        let piece = self.pieces.get(id).ok_or(GraphError::UnknownPiece(id))?;
        Ok(piece.parent.unwrap_or(id))
    }

    /// World position of any piece: its root's position plus the fixed
    /// design-time offset between the two.
    ///
    /// # Errors
    ///
    /// Returns `UnknownPiece` for an id outside the arena.
    pub fn world_position(&self, id: PieceId) -> Result<Point, GraphError> {
        self.root_of(id)?;
        Ok(self.world(id))
    }

    /// Holder of the group containing `id`.
    #[must_use]
    pub fn holder_of(&self, id: PieceId) -> Option<&str> {
        let root = self.root_of(id).ok()?;
        self.pieces[root].holder()
    }

    /// Unchecked root lookup for ids already known to be in range.
    pub(crate) fn root(&self, id: PieceId) -> PieceId {
        self.pieces[id].parent.unwrap_or(id)
    }

    /// Unchecked world position for ids already known to be in range.
    pub(crate) fn world(&self, id: PieceId) -> Point {
        let root = self.root(id);
        let base = &self.pieces[root];
        base.position.add(self.pieces[id].answer.sub(base.answer))
    }

    /// Clamp a root position into the piece layer.
    #[must_use]
    pub fn clamp(&self, pos: Point) -> Point {
        Point::new(pos.x.clamp(0.0, self.bounds.x), pos.y.clamp(0.0, self.bounds.y))
    }

    fn expect_root(&self, id: PieceId) -> Result<&Piece, GraphError> {
        let piece = self.pieces.get(id).ok_or(GraphError::UnknownPiece(id))?;
        if piece.is_root() { Ok(piece) } else { Err(GraphError::NotRoot(id)) }
    }
}

// =============================================================================
// MUTATORS
// =============================================================================

impl PieceGraph {
    /// Mark the group containing `id` as held by `player`. Returns the root,
    /// which is what clients drag.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyHeld` or `AlreadyFit` if the group cannot be picked.
    pub fn pick_up(&mut self, id: PieceId, player: &str) -> Result<PieceId, GraphError> {
        let root = self.root_of(id)?;
        let piece = &mut self.pieces[root];
        if piece.is_fit {
            return Err(GraphError::AlreadyFit(root));
        }
        if let Some(holder) = &piece.holder {
            return Err(GraphError::AlreadyHeld { piece: root, holder: holder.clone() });
        }
        piece.holder = Some(player.to_owned());
        Ok(root)
    }

    /// Move a held root. Children follow through their fixed offsets.
    ///
    /// # Errors
    ///
    /// Returns `NotRoot` for a child and `NotHeld` if nobody holds the group.
    pub fn move_to(&mut self, root: PieceId, pos: Point) -> Result<Point, GraphError> {
        if self.expect_root(root)?.holder.is_none() {
            return Err(GraphError::NotHeld(root));
        }
        let clamped = self.clamp(pos);
        self.pieces[root].position = clamped;
        Ok(clamped)
    }

    /// Clear the holder and set the final position without evaluating snaps.
    ///
    /// # Errors
    ///
    /// Returns `NotRoot` for a child and `AlreadyFit` for a fit group.
    pub fn release(&mut self, root: PieceId, pos: Point) -> Result<Point, GraphError> {
        if self.expect_root(root)?.is_fit {
            return Err(GraphError::AlreadyFit(root));
        }
        let clamped = self.clamp(pos);
        let piece = &mut self.pieces[root];
        piece.holder = None;
        piece.position = clamped;
        Ok(clamped)
    }

    /// Release the group and apply at most one snap: a connection to a
    /// neighbor group, or else a fit to the board.
    ///
    /// # Errors
    ///
    /// Returns `NotRoot` or `AlreadyFit` from the release, or an invariant
    /// error if applying the resolved change fails.
    pub fn put_down(&mut self, root: PieceId, pos: Point) -> Result<PutOutcome, GraphError> {
        self.release(root, pos)?;
        let outcome = resolver::resolve(self, root);
        match outcome {
            PutOutcome::Nothing => {}
            PutOutcome::Connected { parent, child } => self.merge_groups(parent, child)?,
            PutOutcome::Fit { piece } => {
                self.fit_to_board(piece)?;
            }
        }
        Ok(outcome)
    }

    /// Re-parent `child_root` and all of its members directly onto
    /// `parent_root`. Both arguments must already be roots.
    ///
    /// # Errors
    ///
    /// Returns `NotRoot`, `SameGroup` or `AlreadyFit` when the precondition
    /// does not hold. The graph is left untouched in that case.
    pub fn merge_groups(&mut self, parent_root: PieceId, child_root: PieceId) -> Result<(), GraphError> {
        let parent_fit = self.expect_root(parent_root)?.is_fit;
        let child_fit = self.expect_root(child_root)?.is_fit;
        if parent_root == child_root {
            return Err(GraphError::SameGroup(parent_root, child_root));
        }
        if parent_fit {
            return Err(GraphError::AlreadyFit(parent_root));
        }
        if child_fit {
            return Err(GraphError::AlreadyFit(child_root));
        }

        // Flatten: collect the losing root's members, then point each one at
        // the new root directly.
        let members = std::mem::take(&mut self.pieces[child_root].children);
        for &member in &members {
            let piece = &mut self.pieces[member];
            piece.parent = Some(parent_root);
            piece.holder = None;
        }
        let child = &mut self.pieces[child_root];
        child.parent = Some(parent_root);
        child.holder = None;

        let parent = &mut self.pieces[parent_root];
        parent.holder = None;
        parent.children.push(child_root);
        parent.children.extend(members);

        self.fit_count += 1;
        Ok(())
    }

    /// Fix the group containing `id` to the board at its answer position.
    /// Returns `false` when the group was already fit.
    ///
    /// # Errors
    ///
    /// Returns `UnknownPiece` for an id outside the arena.
    pub fn fit_to_board(&mut self, id: PieceId) -> Result<bool, GraphError> {
        let root = self.root_of(id)?;
        if self.pieces[root].is_fit {
            return Ok(false);
        }

        let target = self.pieces[root].answer.add(self.margin);
        let piece = &mut self.pieces[root];
        piece.is_fit = true;
        piece.holder = None;
        piece.position = target;
        let members = piece.children.clone();
        for member in members {
            self.pieces[member].is_fit = true;
        }

        self.fit_count += 1;
        Ok(true)
    }

    /// Force the holder of a root. Mirrors apply authoritative facts with
    /// this; it never validates ownership.
    ///
    /// # Errors
    ///
    /// Returns `NotRoot` for a child and `AlreadyFit` when setting a holder
    /// on a fit group.
    pub fn set_holder(&mut self, root: PieceId, holder: Option<PlayerId>) -> Result<(), GraphError> {
        if self.expect_root(root)?.is_fit && holder.is_some() {
            return Err(GraphError::AlreadyFit(root));
        }
        self.pieces[root].holder = holder;
        Ok(())
    }

    /// Point `id` at `parent` without touching any child list, reaching
    /// states the public mutators never produce.
    #[cfg(test)]
    pub(crate) fn force_parent(&mut self, id: PieceId, parent: Option<PieceId>) {
        self.pieces[id].parent = parent;
    }

    /// Force the position of a root without checking the holder.
    ///
    /// # Errors
    ///
    /// Returns `NotRoot` for a child.
    pub fn set_position(&mut self, root: PieceId, pos: Point) -> Result<Point, GraphError> {
        self.expect_root(root)?;
        let clamped = self.clamp(pos);
        self.pieces[root].position = clamped;
        Ok(clamped)
    }
}

// =============================================================================
// SNAPSHOT
// =============================================================================

impl PieceGraph {
    #[must_use]
    pub fn snapshot(&self) -> Vec<PieceSnapshot> {
        self.pieces
            .iter()
            .map(|p| PieceSnapshot {
                id: p.id,
                position: p.position,
                parent: p.parent,
                children: p.children.clone(),
                is_fit: p.is_fit,
                holder: p.holder.clone(),
            })
            .collect()
    }

    /// Overwrite dynamic state from a snapshot taken by another process that
    /// started from the same cut.
    ///
    /// # Errors
    ///
    /// Returns `PositionCount` or `UnknownPiece` for a snapshot that does not
    /// match this arena, and `Invariant` if the restored state is malformed.
    /// On error the graph is left unchanged.
    pub fn restore(&mut self, snapshot: &[PieceSnapshot], fit_count: usize) -> Result<(), GraphError> {
        if snapshot.len() != self.pieces.len() {
            return Err(GraphError::PositionCount { expected: self.pieces.len(), actual: snapshot.len() });
        }

        let mut next = self.clone();
        for entry in snapshot {
            let piece = next.pieces.get_mut(entry.id).ok_or(GraphError::UnknownPiece(entry.id))?;
            piece.position = entry.position;
            piece.parent = entry.parent;
            piece.children.clone_from(&entry.children);
            piece.is_fit = entry.is_fit;
            piece.holder.clone_from(&entry.holder);
        }
        next.fit_count = fit_count;
        next.check_invariants()?;

        *self = next;
        Ok(())
    }

    /// Verify every structural invariant. Cheap enough to run in tests after
    /// each mutation.
    ///
    /// # Errors
    ///
    /// Returns `Invariant` describing the first violation found.
    pub fn check_invariants(&self) -> Result<(), GraphError> {
        let violation = |msg: String| Err(GraphError::Invariant(msg));
        for piece in &self.pieces {
            if let Some(parent) = piece.parent {
                let Some(root) = self.pieces.get(parent) else {
                    return violation(format!("piece {} has unknown parent {parent}", piece.id));
                };
                if parent == piece.id {
                    return violation(format!("piece {} is its own parent", piece.id));
                }
                if root.parent.is_some() {
                    return violation(format!("piece {} is two hops from its root", piece.id));
                }
                if !root.children.contains(&piece.id) {
                    return violation(format!("root {parent} does not list child {}", piece.id));
                }
                if !piece.children.is_empty() {
                    return violation(format!("child {} tracks children of its own", piece.id));
                }
                if piece.holder.is_some() {
                    return violation(format!("child {} has a holder", piece.id));
                }
                if piece.is_fit != root.is_fit {
                    return violation(format!("child {} fit state differs from root {parent}", piece.id));
                }
            }
            for &child in &piece.children {
                if self.pieces.get(child).and_then(|c| c.parent) != Some(piece.id) {
                    return violation(format!("root {} lists {child} which points elsewhere", piece.id));
                }
            }
            if piece.is_fit && piece.holder.is_some() {
                return violation(format!("fit piece {} is held", piece.id));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "graph_test.rs"]
mod tests;
