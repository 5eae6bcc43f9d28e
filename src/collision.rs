// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Packet Flow Engine - Collision Detector

use std::collections::{BTreeSet, HashMap};

use glam::DVec2;
use tracing::debug;

use crate::network::World;
use crate::packet::Location;
use crate::scheduler::Tickable;
use crate::types::{Decoration, PacketId, SimEvent};

// ─── Spatial Hash ────────────────────────────────────────────────────────────

type Cell = (i64, i64);

/// Uniform grid bucketing entry indices by position.
#[derive(Debug, Clone)]
pub struct SpatialHash {
    cell_size: f64,
    cells: HashMap<Cell, Vec<usize>>,
}

impl SpatialHash {
    pub fn new(cell_size: f64) -> Self {
        Self {
            cell_size,
            cells: HashMap::new(),
        }
    }

    pub fn cell_of(&self, pos: DVec2) -> Cell {
        (
            (pos.x / self.cell_size).floor() as i64,
            (pos.y / self.cell_size).floor() as i64,
        )
    }

    pub fn clear(&mut self) {
        self.cells.clear();
    }

    pub fn insert(&mut self, index: usize, pos: DVec2) {
        let cell = self.cell_of(pos);
        self.cells.entry(cell).or_default().push(index);
    }

    /// Entries in the 3x3 block of cells around `pos`, in ascending order.
    /// With `cell_size >= radius` this covers every entry within `radius`.
    pub fn query(&self, pos: DVec2) -> Vec<usize> {
        let (cx, cy) = self.cell_of(pos);
        let mut found = Vec::new();
        for dx in -1..=1 {
            for dy in -1..=1 {
                if let Some(bucket) = self.cells.get(&(cx + dx, cy + dy)) {
                    found.extend_from_slice(bucket);
                }
            }
        }
        found.sort_unstable();
        found
    }
}

// ─── Detector ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollisionOutcome {
    pub collisions: u32,
    pub impacts: Vec<DVec2>,
    pub removed: Vec<PacketId>,
}

/// Per-tick corruption pass over every packet on a wire.
#[derive(Debug, Clone)]
pub struct CollisionDetector {
    hash: SpatialHash,
    /// Seconds left on a collision pause power-up.
    collisions_paused: f64,
    waves_paused: f64,
}

impl CollisionDetector {
    pub fn new(cell_size: f64) -> Self {
        Self {
            hash: SpatialHash::new(cell_size),
            collisions_paused: 0.0,
            waves_paused: 0.0,
        }
    }

    pub fn pause_collisions(&mut self, seconds: f64) {
        self.collisions_paused = self.collisions_paused.max(seconds);
    }

    pub fn pause_impact_waves(&mut self, seconds: f64) {
        self.waves_paused = self.waves_paused.max(seconds);
    }

    pub fn collisions_active(&self) -> bool {
        self.collisions_paused <= 0.0
    }

    pub fn waves_active(&self) -> bool {
        self.waves_paused <= 0.0
    }

    pub fn step(&mut self, world: &mut World, dt: f64) -> CollisionOutcome {
        self.collisions_paused = (self.collisions_paused - dt).max(0.0);
        self.waves_paused = (self.waves_paused - dt).max(0.0);
        decay_shields(world, dt);

        let mut outcome = CollisionOutcome::default();
        if !self.collisions_active() {
            return outcome;
        }
        let tuning = world.config.collision.clone();

        // Broad phase: every unshielded packet on a wire.
        let entries: Vec<(PacketId, DVec2)> = world
            .wires
            .values()
            .flat_map(|w| w.packets().iter().copied())
            .filter(|id| world.packets.get(id).is_some_and(|p| !p.is_shielded()))
            .filter_map(|id| Some((id, world.packet_position(id)?)))
            .collect();
        self.hash.clear();
        for (index, (_, pos)) in entries.iter().enumerate() {
            self.hash.insert(index, *pos);
        }

        // Narrow phase: each packet collides at most once per tick.
        let mut processed = vec![false; entries.len()];
        let mut bounced = Vec::new();
        for i in 0..entries.len() {
            if processed[i] {
                continue;
            }
            let (a, pa) = entries[i];
            for j in self.hash.query(pa) {
                if j == i || processed[j] {
                    continue;
                }
                let (b, pb) = entries[j];
                if pa.distance(pb) > tuning.radius {
                    continue;
                }
                processed[i] = true;
                processed[j] = true;
                for id in [a, b] {
                    if let Some(p) = world.packets.get_mut(&id) {
                        p.noise += tuning.noise_increment;
                    }
                    if world.kinematics.fixed(id).is_some_and(|pid| pid.profile().bounce_on_impact) {
                        bounced.push(id);
                    }
                }
                outcome.collisions += 1;
                outcome.impacts.push((pa + pb) * 0.5);
                debug!(a = %a, b = %b, "packets collided");
                break;
            }
        }
        for id in bounced {
            if let Some(p) = world.packets.get_mut(&id) {
                p.returning = !p.returning;
            }
        }

        if tuning.impact_waves && self.waves_active() {
            apply_impact_waves(world, &outcome.impacts, tuning.impact_radius, tuning.impact_strength);
        }

        outcome.removed = remove_overloaded(world, tuning.max_noise);
        if !outcome.removed.is_empty() {
            world.events.push(SimEvent::ImpactCue {
                removed: outcome.removed.len() as u32,
            });
        }
        outcome
    }
}

/// Count down every shield lifetime.
fn decay_shields(world: &mut World, dt: f64) {
    for p in world.packets.values_mut() {
        if let Decoration::Protected { remaining, .. } = &mut p.decoration {
            *remaining = (*remaining - dt).max(0.0);
        }
    }
}

/// Noise falls off linearly from `strength` at the origin to zero at
/// `radius`. Shields soak it up first.
pub fn apply_impact_waves(world: &mut World, origins: &[DVec2], radius: f64, strength: f64) {
    if origins.is_empty() || radius <= 0.0 {
        return;
    }
    let on_wires: Vec<(PacketId, DVec2)> = world
        .wires
        .values()
        .flat_map(|w| w.packets().iter().copied())
        .filter_map(|id| Some((id, world.packet_position(id)?)))
        .collect();
    for origin in origins {
        for (id, pos) in &on_wires {
            let d = origin.distance(*pos);
            if d >= radius {
                continue;
            }
            if let Some(p) = world.packets.get_mut(id) {
                p.absorb_noise(strength * (1.0 - d / radius));
            }
        }
    }
}

/// Drop every unshielded wire packet at or above `max_noise`.
fn remove_overloaded(world: &mut World, max_noise: f64) -> Vec<PacketId> {
    let doomed: BTreeSet<PacketId> = world
        .packets
        .values()
        .filter(|p| matches!(p.location, Location::Wire(_)))
        .filter(|p| !p.is_shielded() && p.noise >= max_noise)
        .map(|p| p.id)
        .collect();
    for id in &doomed {
        world.lose_packet(*id);
    }
    doomed.into_iter().collect()
}

impl Tickable for CollisionDetector {
    fn name(&self) -> &'static str {
        "collision"
    }

    fn update(&mut self, world: &mut World, dt: f64) {
        self.step(world, dt);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
