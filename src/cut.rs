//! Puzzle-cut description — the one-shot input that creates every piece.
//!
//! DESIGN
//! ======
//! The image cutter is an external collaborator; all the synchronization core
//! needs from it is the piece count, each piece's `answer` offset, each
//! piece's `connects` list, the board margin, and the tolerance source. A
//! grid generator is provided for hosts (and tests) without a cutter.
//!
//! The board sits at `margin` inside a piece layer three times the board's
//! size. Pieces are scattered in rings around the board in a seeded order so
//! every process that knows the seed lays the table out identically.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::frame::{ErrorCode, PieceId, Point};

/// Piece-cell spacing used when scattering, relative to the piece size.
const SCATTER_CELL_WIDTH: f64 = 1.4;
const SCATTER_CELL_HEIGHT: f64 = 1.45;

/// Tolerance is this fraction of the larger piece dimension.
const TOLERANCE_DIVISOR: f64 = 5.0;

/// Piece layer size relative to the board.
const LAYER_SCALE: f64 = 3.0;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum CutError {
    #[error("puzzle has no pieces")]
    Empty,
    #[error("invalid grid dimension: {0}")]
    InvalidDimension(String),
    #[error("answers ({answers}) and connects ({connects}) lengths differ")]
    LengthMismatch { answers: usize, connects: usize },
    #[error("piece {piece} lists neighbor {neighbor} outside the puzzle")]
    NeighborOutOfRange { piece: PieceId, neighbor: PieceId },
    #[error("piece {0} lists itself as a neighbor")]
    SelfNeighbor(PieceId),
    #[error("piece {a} lists {b} as a neighbor but not the reverse")]
    Asymmetric { a: PieceId, b: PieceId },
}

impl ErrorCode for CutError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Empty => "E_CUT_EMPTY",
            Self::InvalidDimension(_) => "E_CUT_DIMENSION",
            Self::LengthMismatch { .. } => "E_CUT_LENGTH",
            Self::NeighborOutOfRange { .. } => "E_CUT_NEIGHBOR_RANGE",
            Self::SelfNeighbor(_) => "E_CUT_SELF_NEIGHBOR",
            Self::Asymmetric { .. } => "E_CUT_ASYMMETRIC",
        }
    }
}

/// Design-time truth for every piece, supplied once at session start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CutDescription {
    pub piece_width: f64,
    pub piece_height: f64,
    pub board_width: f64,
    pub board_height: f64,
    /// Offset of the board origin inside the piece layer.
    pub margin: Point,
    /// Board-relative target offset per piece.
    pub answers: Vec<Point>,
    /// Geometric neighbors per piece. Symmetric.
    pub connects: Vec<Vec<PieceId>>,
}

// =============================================================================
// CONSTRUCTION
// =============================================================================

impl CutDescription {
    /// Cut a `cols` × `rows` grid. Ids are row-major; each `connects` list is
    /// ordered up, left, right, down.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDimension` for a zero dimension or non-positive size.
    pub fn grid(cols: usize, rows: usize, piece_width: f64, piece_height: f64) -> Result<Self, CutError> {
        if cols == 0 || rows == 0 {
            return Err(CutError::InvalidDimension(format!("{cols}x{rows}")));
        }
        if piece_width <= 0.0 || piece_height <= 0.0 || !piece_width.is_finite() || !piece_height.is_finite() {
            return Err(CutError::InvalidDimension(format!("piece {piece_width}x{piece_height}")));
        }

        let count = cols * rows;
        let mut answers = Vec::with_capacity(count);
        let mut connects = Vec::with_capacity(count);
        for id in 0..count {
            let (row, col) = (id / cols, id % cols);
            #[allow(clippy::cast_precision_loss)]
            answers.push(Point::new(col as f64 * piece_width, row as f64 * piece_height));

            let mut next = Vec::with_capacity(4);
            if row > 0 {
                next.push(id - cols);
            }
            if col > 0 {
                next.push(id - 1);
            }
            if col + 1 < cols {
                next.push(id + 1);
            }
            if row + 1 < rows {
                next.push(id + cols);
            }
            connects.push(next);
        }

        #[allow(clippy::cast_precision_loss)]
        let (board_width, board_height) = (cols as f64 * piece_width, rows as f64 * piece_height);
        Ok(Self {
            piece_width,
            piece_height,
            board_width,
            board_height,
            margin: Point::new(board_width, board_height),
            answers,
            connects,
        })
    }

    /// Check the structural contract the resolver relies on.
    ///
    /// # Errors
    ///
    /// Returns the first violation found.
    pub fn validate(&self) -> Result<(), CutError> {
        if self.answers.is_empty() {
            return Err(CutError::Empty);
        }
        if self.answers.len() != self.connects.len() {
            return Err(CutError::LengthMismatch { answers: self.answers.len(), connects: self.connects.len() });
        }
        for (piece, neighbors) in self.connects.iter().enumerate() {
            for &neighbor in neighbors {
                if neighbor == piece {
                    return Err(CutError::SelfNeighbor(piece));
                }
                let Some(back) = self.connects.get(neighbor) else {
                    return Err(CutError::NeighborOutOfRange { piece, neighbor });
                };
                if !back.contains(&piece) {
                    return Err(CutError::Asymmetric { a: piece, b: neighbor });
                }
            }
        }
        Ok(())
    }
}

// =============================================================================
// DERIVED VALUES
// =============================================================================

impl CutDescription {
    #[must_use]
    pub fn len(&self) -> usize {
        self.answers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }

    /// Snap radius in px, fixed for the session.
    #[must_use]
    pub fn tolerance(&self) -> f64 {
        self.piece_width.max(self.piece_height) / TOLERANCE_DIVISOR
    }

    /// Far corner of the piece layer. Root positions are clamped to
    /// `[0, bounds.x] × [0, bounds.y]`.
    #[must_use]
    pub fn layer_bounds(&self) -> Point {
        Point::new(self.board_width * LAYER_SCALE, self.board_height * LAYER_SCALE)
    }

    /// Deterministic starting positions, indexed by piece id.
    #[must_use]
    pub fn scatter(&self, seed: u64) -> Vec<Point> {
        let mut order: Vec<PieceId> = (0..self.len()).collect();
        order.shuffle(&mut StdRng::seed_from_u64(seed));

        let bounds = self.layer_bounds();
        let mut positions = vec![Point::default(); self.len()];
        for (piece, slot) in order.into_iter().rev().zip(self.ring_slots(self.len())) {
            positions[piece] = Point::new(slot.x.clamp(0.0, bounds.x), slot.y.clamp(0.0, bounds.y));
        }
        positions
    }

    /// Walk clockwise rings around the board, one ring wider each lap.
    fn ring_slots(&self, count: usize) -> Vec<Point> {
        let cell_w = self.piece_width * SCATTER_CELL_WIDTH;
        let cell_h = self.piece_height * SCATTER_CELL_HEIGHT;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let mut across = (self.board_width / cell_w).ceil() as usize + 1;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let mut down = (self.board_height / cell_h).ceil() as usize + 3;
        let mut cursor = Point::new(self.margin.x - cell_w / 2.0, self.margin.y - cell_h * 1.5);

        let mut slots = Vec::with_capacity(count);
        while slots.len() < count {
            let legs = [
                (across, Point::new(cell_w, 0.0)),
                (down - 1, Point::new(0.0, cell_h)),
                (across + 1, Point::new(-cell_w, 0.0)),
                (down, Point::new(0.0, -cell_h)),
            ];
            for (steps, step) in legs {
                for _ in 0..steps {
                    if slots.len() == count {
                        return slots;
                    }
                    slots.push(cursor);
                    cursor = cursor.add(step);
                }
            }
            across += 2;
            down += 2;
        }
        slots
    }
}

#[cfg(test)]
#[path = "cut_test.rs"]
mod tests;
