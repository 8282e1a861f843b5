//! Connection resolver — decides what a just-released group snaps to.
//!
//! DESIGN
//! ======
//! Runs once per put-down on the released root and reports at most one
//! structural change. Candidates are probed children-first, then the root
//! itself, each through its declared `connects` list in order; the first
//! aligned pair wins and nothing after it is evaluated. Only when no pair
//! aligns is the root tested against its board slot.
//!
//! Alignment is per axis (Chebyshev), never a radius. Neighbor alignment is
//! inclusive of the tolerance; board fit is strict.
//!
//! The resolver reads the graph and never mutates it; `PieceGraph::put_down`
//! applies whatever it reports.

use crate::frame::PieceId;
use crate::services::graph::{PieceGraph, PutOutcome};

/// Evaluate the group rooted at `root` after it was released.
#[must_use]
pub fn resolve(graph: &PieceGraph, root: PieceId) -> PutOutcome {
    let Some(piece) = graph.get(root) else {
        return PutOutcome::Nothing;
    };
    if !piece.is_root() || piece.is_fit() {
        return PutOutcome::Nothing;
    }

    let probes = piece.children().iter().copied().chain(std::iter::once(root));
    for probe in probes {
        for &neighbor in graph.pieces()[probe].connects() {
            if let Some(outcome) = try_connect(graph, probe, neighbor) {
                return outcome;
            }
        }
    }

    if fits_board(graph, root) {
        PutOutcome::Fit { piece: root }
    } else {
        PutOutcome::Nothing
    }
}

/// Test one candidate pair and normalize a hit to roots, lower id first.
fn try_connect(graph: &PieceGraph, a: PieceId, b: PieceId) -> Option<PutOutcome> {
    let (piece_a, piece_b) = (graph.get(a)?, graph.get(b)?);
    let (root_a, root_b) = (graph.root(a), graph.root(b));

    if root_a == root_b || piece_a.parent() == Some(b) || piece_b.parent() == Some(a) {
        return None;
    }
    let held = [a, b, root_a, root_b].into_iter().any(|id| graph.pieces()[id].holder().is_some());
    if held || piece_a.is_fit() || piece_b.is_fit() {
        return None;
    }
    if !aligned(graph, a, b) {
        return None;
    }

    Some(PutOutcome::Connected { parent: root_a.min(root_b), child: root_a.max(root_b) })
}

/// Whether the world gap between `a` and `b` matches their design-time
/// offset within tolerance on both axes.
#[must_use]
pub fn aligned(graph: &PieceGraph, a: PieceId, b: PieceId) -> bool {
    let (Some(piece_a), Some(piece_b)) = (graph.get(a), graph.get(b)) else {
        return false;
    };
    let designed = piece_b.answer().sub(piece_a.answer());
    let actual = graph.world(b).sub(graph.world(a));
    let tolerance = graph.tolerance();
    (actual.x - designed.x).abs() <= tolerance && (actual.y - designed.y).abs() <= tolerance
}

/// Whether a root sits within tolerance of its board slot.
#[must_use]
pub fn fits_board(graph: &PieceGraph, root: PieceId) -> bool {
    let Some(piece) = graph.get(root) else {
        return false;
    };
    if !piece.is_root() {
        return false;
    }
    let target = piece.answer().add(graph.margin());
    let actual = graph.world(root);
    let tolerance = graph.tolerance();
    (actual.x - target.x).abs() < tolerance && (actual.y - target.y).abs() < tolerance
}

#[cfg(test)]
#[path = "resolver_test.rs"]
mod tests;
