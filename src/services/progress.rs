//! Progress — fit counters, elapsed play time and one-shot milestones.
//!
//! DESIGN
//! ======
//! Everything here is derived from the piece graph; nothing feeds back into
//! it. The milestone tracker is polled after each applied fact and reports
//! every milestone at most once. Edge milestones only exist for puzzles of
//! at least `EDGE_MILESTONE_MIN_PIECES`; the outer-frame milestone exists for
//! every puzzle but is swallowed when the frame completes on the very put that
//! completes the puzzle.

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::frame::PieceId;
use crate::services::graph::PieceGraph;

/// Puzzles smaller than this get no per-edge milestones.
pub const EDGE_MILESTONE_MIN_PIECES: usize = 100;

// =============================================================================
// MATRIX DIMENSIONS
// =============================================================================

/// Derive `(rows, cols)` from neighbor counts: in a row-major grid the first
/// piece after the origin with exactly two neighbors is the top-right corner.
/// Returns `None` for layouts this cannot describe (single row or column).
#[must_use]
pub fn matrix_dimensions(connects: &[Vec<PieceId>]) -> Option<(usize, usize)> {
    let corner = connects.iter().skip(1).position(|neighbors| neighbors.len() == 2)? + 1;
    let cols = corner + 1;
    if connects.len() % cols != 0 {
        return None;
    }
    Some((connects.len() / cols, cols))
}

// =============================================================================
// STOPWATCH
// =============================================================================

/// Play time split for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Elapsed {
    pub hours: u64,
    pub minutes: u64,
    pub seconds: u64,
}

impl From<Duration> for Elapsed {
    fn from(duration: Duration) -> Self {
        let total = duration.as_secs();
        Self { hours: total / 3600, minutes: total / 60 % 60, seconds: total % 60 }
    }
}

impl fmt::Display for Elapsed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.hours, self.minutes, self.seconds)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Stopwatch {
    started: Instant,
    stopped: Option<Instant>,
}

impl Stopwatch {
    #[must_use]
    pub fn start_at(now: Instant) -> Self {
        Self { started: now, stopped: None }
    }

    /// Freeze the clock. Later calls keep the first stop time.
    pub fn stop_at(&mut self, now: Instant) {
        self.stopped.get_or_insert(now);
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.is_some()
    }

    #[must_use]
    pub fn elapsed_at(&self, now: Instant) -> Duration {
        self.stopped.unwrap_or(now).saturating_duration_since(self.started)
    }
}

// =============================================================================
// PROGRESS SNAPSHOT
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub fit_count: usize,
    pub total_pieces: usize,
    pub elapsed: Elapsed,
}

impl Progress {
    #[must_use]
    pub fn of(graph: &PieceGraph, elapsed: Duration) -> Self {
        Self { fit_count: graph.fit_count(), total_pieces: graph.len(), elapsed: elapsed.into() }
    }

    /// Whole percent, rounded down.
    #[must_use]
    pub fn percent(&self) -> usize {
        if self.total_pieces == 0 {
            return 0;
        }
        self.fit_count * 100 / self.total_pieces
    }
}

// =============================================================================
// MILESTONES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Milestone {
    Percent25,
    Percent50,
    Percent75,
    TopEdge,
    LeftEdge,
    RightEdge,
    BottomEdge,
    OuterFrame,
}

#[derive(Debug, Clone)]
pub struct MilestoneTracker {
    rows: usize,
    cols: usize,
    pending: Vec<Milestone>,
}

impl MilestoneTracker {
    /// Tracker for a `rows` × `cols` grid of `total` pieces.
    #[must_use]
    pub fn new(rows: usize, cols: usize, total: usize) -> Self {
        let mut pending = vec![Milestone::Percent25, Milestone::Percent50, Milestone::Percent75];
        if rows > 0 && cols > 0 {
            pending.push(Milestone::OuterFrame);
            if total >= EDGE_MILESTONE_MIN_PIECES {
                pending.extend([Milestone::TopEdge, Milestone::LeftEdge, Milestone::RightEdge, Milestone::BottomEdge]);
            }
        }
        Self { rows, cols, pending }
    }

    /// Tracker sized from the graph's own neighbor layout. Without a
    /// recognizable grid only the percent milestones are tracked.
    #[must_use]
    pub fn for_graph(graph: &PieceGraph) -> Self {
        let connects: Vec<Vec<PieceId>> = graph.pieces().iter().map(|p| p.connects().to_vec()).collect();
        let (rows, cols) = matrix_dimensions(&connects).unwrap_or((0, 0));
        Self::new(rows, cols, graph.len())
    }

    #[must_use]
    pub fn pending(&self) -> &[Milestone] {
        &self.pending
    }

    /// Report milestones newly reached in `graph`. Each is reported once.
    pub fn observe(&mut self, graph: &PieceGraph) -> Vec<Milestone> {
        let percent = Progress::of(graph, Duration::ZERO).percent();
        let complete = graph.is_complete();
        let frame_done = self.pending.contains(&Milestone::OuterFrame) && self.frame_fit(graph);

        let mut reached = Vec::new();
        let mut consumed = Vec::new();
        for &milestone in &self.pending {
            let hit = match milestone {
                Milestone::Percent25 => percent >= 25,
                Milestone::Percent50 => percent >= 50,
                Milestone::Percent75 => percent >= 75,
                // The frame supersedes any edge still pending.
                Milestone::TopEdge | Milestone::LeftEdge | Milestone::RightEdge | Milestone::BottomEdge
                    if frame_done =>
                {
                    consumed.push(milestone);
                    continue;
                }
                Milestone::TopEdge => all_fit(graph, self.top()),
                Milestone::LeftEdge => all_fit(graph, self.left()),
                Milestone::RightEdge => all_fit(graph, self.right()),
                Milestone::BottomEdge => all_fit(graph, self.bottom()),
                Milestone::OuterFrame if complete && frame_done => {
                    consumed.push(milestone);
                    continue;
                }
                Milestone::OuterFrame => frame_done,
            };
            if hit {
                reached.push(milestone);
            }
        }

        self.pending.retain(|m| !reached.contains(m) && !consumed.contains(m));
        reached
    }

    fn frame_fit(&self, graph: &PieceGraph) -> bool {
        all_fit(graph, self.top())
            && all_fit(graph, self.left())
            && all_fit(graph, self.right())
            && all_fit(graph, self.bottom())
    }

    fn top(&self) -> impl Iterator<Item = PieceId> + use<> {
        0..self.cols
    }

    fn left(&self) -> impl Iterator<Item = PieceId> + use<> {
        let cols = self.cols;
        (0..self.rows).map(move |row| row * cols)
    }

    fn right(&self) -> impl Iterator<Item = PieceId> + use<> {
        let cols = self.cols;
        (0..self.rows).map(move |row| row * cols + cols - 1)
    }

    fn bottom(&self) -> impl Iterator<Item = PieceId> + use<> {
        let start = self.rows.saturating_sub(1) * self.cols;
        start..start + self.cols
    }
}

fn all_fit(graph: &PieceGraph, mut ids: impl Iterator<Item = PieceId>) -> bool {
    ids.all(|id| graph.get(id).is_some_and(|p| p.is_fit()))
}

#[cfg(test)]
#[path = "progress_test.rs"]
mod tests;
