//! Camera — soft-edge viewport follow while a piece is dragged.
//!
//! DESIGN
//! ======
//! Purely local presentation state. When the pointer comes within
//! `EDGE_RANGE` screen pixels of a viewport edge the camera pans toward that
//! edge, up to `EDGE_SPEED` pixels per frame with quadratic falloff. The
//! camera center is kept inside the piece layer. Callers move the held piece
//! by the delta the camera actually applied so it stays under the pointer.

use crate::frame::Point;

/// Screen distance from an edge at which panning starts.
pub const EDGE_RANGE: f64 = 100.0;

/// Screen pixels per frame at (or beyond) the edge.
pub const EDGE_SPEED: f64 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    /// Top-left corner in layer coordinates.
    pub origin: Point,
    /// Layer pixels per screen pixel.
    pub scale: f64,
    /// Screen size in pixels.
    pub viewport: Point,
    /// Far corner of the piece layer.
    pub layer: Point,
}

impl Camera {
    /// Camera at scale 1 centered on the layer.
    #[must_use]
    pub fn new(viewport: Point, layer: Point) -> Self {
        let origin = Point::new((layer.x - viewport.x) / 2.0, (layer.y - viewport.y) / 2.0);
        Self { origin, scale: 1.0, viewport, layer }
    }

    /// Size of the visible area in layer pixels.
    #[must_use]
    pub fn extent(&self) -> Point {
        Point::new(self.viewport.x * self.scale, self.viewport.y * self.scale)
    }

    #[must_use]
    pub fn center(&self) -> Point {
        let extent = self.extent();
        Point::new(self.origin.x + extent.x / 2.0, self.origin.y + extent.y / 2.0)
    }

    /// Map a screen point into layer coordinates.
    #[must_use]
    pub fn to_layer(&self, screen: Point) -> Point {
        Point::new(self.origin.x + screen.x * self.scale, self.origin.y + screen.y * self.scale)
    }

    /// Screen-space push for a pointer position: positive toward the origin
    /// edge, negative toward the far edge, zero in the dead zone.
    #[must_use]
    pub fn edge_push(&self, pointer: Point) -> Point {
        Point::new(axis_push(pointer.x, self.viewport.x), axis_push(pointer.y, self.viewport.y))
    }

    /// Move the camera by `delta` layer pixels, clamping its center to the
    /// layer. Returns the delta actually applied.
    pub fn pan_by(&mut self, delta: Point) -> Point {
        let before = self.origin;
        let half = Point::new(self.extent().x / 2.0, self.extent().y / 2.0);
        let center = Point::new(self.origin.x + delta.x + half.x, self.origin.y + delta.y + half.y);
        let clamped = Point::new(center.x.clamp(0.0, self.layer.x), center.y.clamp(0.0, self.layer.y));
        self.origin = clamped.sub(half);
        self.origin.sub(before)
    }

    /// Pan toward whichever edge the pointer is pressing. Returns the applied
    /// layer delta, zero when the pointer is in the dead zone.
    pub fn follow(&mut self, pointer: Point) -> Point {
        let push = self.edge_push(pointer);
        if push == Point::default() {
            return push;
        }
        self.pan_by(Point::new(-push.x * self.scale, -push.y * self.scale))
    }
}

fn axis_push(pos: f64, extent: f64) -> f64 {
    let falloff = |dist: f64| {
        if dist <= 0.0 { EDGE_SPEED } else { EDGE_SPEED * (1.0 - dist / EDGE_RANGE).powi(2) }
    };

    let pos = pos.floor();
    if pos < EDGE_RANGE {
        return falloff(pos);
    }
    let far = extent - pos;
    if far < EDGE_RANGE { -falloff(far) } else { 0.0 }
}

#[cfg(test)]
#[path = "camera_test.rs"]
mod tests;
