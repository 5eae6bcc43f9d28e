// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Packet Flow Engine - Wires and Paths

use glam::DVec2;

use crate::error::PathError;
use crate::types::{PacketId, PortId, WireId};

/// Endpoints plus up to three user bends.
pub const MIN_CONTROL_POINTS: usize = 2;
pub const MAX_CONTROL_POINTS: usize = 5;

// ─── WirePath ────────────────────────────────────────────────────────────────

/// Poly-line path with cached arc length. Construction rejects paths with
/// fewer than 2 or more than 5 control points, so an invalid path never
/// reaches the live model.
#[derive(Debug, Clone, PartialEq)]
pub struct WirePath {
    points: Vec<DVec2>,
    /// `cumulative[i]` is the arc length from the start to `points[i]`.
    cumulative: Vec<f64>,
}

impl WirePath {
    pub fn new(points: Vec<DVec2>) -> Result<Self, PathError> {
        if points.len() < MIN_CONTROL_POINTS {
            return Err(PathError::TooFewPoints {
                min: MIN_CONTROL_POINTS,
                got: points.len(),
            });
        }
        if points.len() > MAX_CONTROL_POINTS {
            return Err(PathError::TooManyPoints {
                max: MAX_CONTROL_POINTS,
                got: points.len(),
            });
        }
        let mut cumulative = Vec::with_capacity(points.len());
        let mut total = 0.0;
        cumulative.push(0.0);
        for pair in points.windows(2) {
            total += pair[0].distance(pair[1]);
            cumulative.push(total);
        }
        Ok(Self { points, cumulative })
    }

    pub fn straight(from: DVec2, to: DVec2) -> Self {
        Self {
            points: vec![from, to],
            cumulative: vec![0.0, from.distance(to)],
        }
    }

    /// Path from `from` to `to` through the given bends.
    pub fn with_bends(from: DVec2, bends: &[DVec2], to: DVec2) -> Result<Self, PathError> {
        let mut points = Vec::with_capacity(bends.len() + 2);
        points.push(from);
        points.extend_from_slice(bends);
        points.push(to);
        Self::new(points)
    }

    pub fn points(&self) -> &[DVec2] {
        &self.points
    }

    pub fn bends(&self) -> &[DVec2] {
        &self.points[1..self.points.len() - 1]
    }

    pub fn start(&self) -> DVec2 {
        self.points[0]
    }

    pub fn end(&self) -> DVec2 {
        self.points[self.points.len() - 1]
    }

    pub fn length(&self) -> f64 {
        self.cumulative[self.cumulative.len() - 1]
    }

    /// World position at normalized `progress`, measured by arc length.
    pub fn point_at(&self, progress: f64) -> DVec2 {
        let length = self.length();
        if length <= f64::EPSILON {
            return self.start();
        }
        let target = progress.clamp(0.0, 1.0) * length;
        let seg = self.segment_index(target);
        let seg_start = self.cumulative[seg];
        let seg_len = self.cumulative[seg + 1] - seg_start;
        if seg_len <= f64::EPSILON {
            return self.points[seg];
        }
        let t = (target - seg_start) / seg_len;
        self.points[seg].lerp(self.points[seg + 1], t)
    }

    /// Unit direction of travel at `progress`.
    pub fn tangent_at(&self, progress: f64) -> DVec2 {
        let length = self.length();
        if length <= f64::EPSILON {
            return DVec2::ZERO;
        }
        let target = progress.clamp(0.0, 1.0) * length;
        let seg = self.segment_index(target);
        (self.points[seg + 1] - self.points[seg]).normalize_or_zero()
    }

    /// Local bend estimate in `[0, 2]`: samples three points `sample_px`
    /// apart around `progress` and returns `1 - cos` of the angle between
    /// the two consecutive chords. Zero on straight stretches.
    pub fn curvature_at(&self, progress: f64, sample_px: f64) -> f64 {
        let length = self.length();
        if length <= f64::EPSILON {
            return 0.0;
        }
        let delta = sample_px / length;
        let p0 = self.point_at(progress - delta);
        let p1 = self.point_at(progress);
        let p2 = self.point_at(progress + delta);
        let t1 = (p1 - p0).normalize_or_zero();
        let t2 = (p2 - p1).normalize_or_zero();
        if t1 == DVec2::ZERO || t2 == DVec2::ZERO {
            return 0.0;
        }
        (1.0 - t1.dot(t2)).max(0.0)
    }

    fn segment_index(&self, arc: f64) -> usize {
        let last = self.points.len() - 2;
        (0..=last)
            .find(|&i| arc <= self.cumulative[i + 1])
            .unwrap_or(last)
    }
}

// ─── Wire ────────────────────────────────────────────────────────────────────

/// A connection from one output port to one input port. Owns the list of
/// packets traveling on it in arrival order.
#[derive(Debug, Clone)]
pub struct Wire {
    pub id: WireId,
    pub source: PortId,
    pub destination: PortId,
    path: WirePath,
    packets: Vec<PacketId>,
}

impl Wire {
    pub fn new(id: WireId, source: PortId, destination: PortId, path: WirePath) -> Self {
        Self {
            id,
            source,
            destination,
            path,
            packets: Vec::new(),
        }
    }

    pub fn path(&self) -> &WirePath {
        &self.path
    }

    /// Replace the path, keeping the endpoints' packets in place.
    pub fn set_path(&mut self, path: WirePath) {
        self.path = path;
    }

    pub fn length(&self) -> f64 {
        self.path.length()
    }

    pub fn packets(&self) -> &[PacketId] {
        &self.packets
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    pub(crate) fn push(&mut self, packet: PacketId) {
        self.packets.push(packet);
    }

    pub(crate) fn remove(&mut self, packet: PacketId) -> Option<usize> {
        let idx = self.packets.iter().position(|&p| p == packet)?;
        self.packets.remove(idx);
        Some(idx)
    }

    pub(crate) fn replace(&mut self, old: PacketId, new: PacketId) -> bool {
        match self.packets.iter_mut().find(|p| **p == old) {
            Some(slot) => {
                *slot = new;
                true
            }
            None => false,
        }
    }

    pub(crate) fn clear(&mut self) {
        self.packets.clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
