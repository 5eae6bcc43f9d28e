// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Packet Flow Engine - Snapshot Timeline

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::TimelineError;
use crate::groups::Group;
use crate::kinematics::{ProfileId, PROTECTED_CANDIDATES};
use crate::network::World;
use crate::packet::{Location, Packet};
use crate::scheduler::Tickable;
use crate::types::{BoxId, Counters, Decoration, PacketId, PacketKind, WireId};

// ─── Records ─────────────────────────────────────────────────────────────────

/// Scalar state of one packet. Restore builds a fresh packet from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacketRecord {
    pub kind: PacketKind,
    pub decoration: Decoration,
    pub progress: f64,
    pub noise: f64,
    pub speed: f64,
    pub returning: bool,
    #[serde(default)]
    pub acceleration: f64,
    #[serde(default)]
    pub travelled: f64,
    #[serde(default)]
    pub lateral_offset: f64,
    /// Movement profile; `None` while a randomized choice is still undrawn.
    #[serde(default)]
    pub profile: Option<ProfileId>,
    #[serde(default)]
    pub hints: HintRecord,
}

/// Side-table entries of one packet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HintRecord {
    pub force_incompatible: bool,
    pub teleported: bool,
    pub vpn_revert: bool,
    pub vpn_owner: Option<BoxId>,
}

impl PacketRecord {
    fn capture(world: &World, p: &Packet) -> Self {
        let profile = if world.kinematics.is_pending(p.id) {
            None
        } else {
            Some(
                world
                    .kinematics
                    .fixed(p.id)
                    .unwrap_or_else(|| ProfileId::default_for(&p.kind)),
            )
        };
        let hints = &world.hints;
        Self {
            kind: p.kind,
            decoration: p.decoration,
            progress: p.progress,
            noise: p.noise,
            speed: p.speed,
            returning: p.returning,
            acceleration: p.acceleration,
            travelled: p.travelled,
            lateral_offset: p.lateral_offset,
            profile,
            hints: HintRecord {
                force_incompatible: hints.force_incompatible.contains(&p.id),
                teleported: hints.teleported.contains(&p.id),
                vpn_revert: hints.vpn_revert.contains(&p.id),
                vpn_owner: hints.vpn_owner.get(&p.id).copied(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferRecord {
    pub box_id: BoxId,
    pub enabled: bool,
    pub disabled_for: f64,
    /// Seconds left on the box behavior's cooldown.
    #[serde(default)]
    pub cooldown: f64,
    pub packets: Vec<PacketRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireRecord {
    pub wire_id: WireId,
    pub packets: Vec<PacketRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProducerRecord {
    pub box_id: BoxId,
    pub emitted: u64,
    pub timer: f64,
}

/// Position of the world RNG, so a replay draws the same numbers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RngState {
    pub seed: [u8; 32],
    pub stream: u64,
    pub word_pos: u128,
}

impl RngState {
    fn capture(rng: &ChaCha8Rng) -> Self {
        Self {
            seed: rng.get_seed(),
            stream: rng.get_stream(),
            word_pos: rng.get_word_pos(),
        }
    }

    fn rebuild(&self) -> ChaCha8Rng {
        let mut rng = ChaCha8Rng::from_seed(self.seed);
        rng.set_stream(self.stream);
        rng.set_word_pos(self.word_pos);
        rng
    }
}

// ─── Snapshot ────────────────────────────────────────────────────────────────

/// Immutable capture of everything a restore needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub tick: u64,
    pub elapsed: f64,
    pub counters: Counters,
    pub boxes: Vec<BufferRecord>,
    pub wires: Vec<WireRecord>,
    pub producers: Vec<ProducerRecord>,
    pub groups: Vec<Group>,
    #[serde(default)]
    pub next_group: u64,
    /// Absent in histories written without RNG state; restore then keeps
    /// the live RNG.
    #[serde(default)]
    pub rng: Option<RngState>,
}

impl Snapshot {
    pub fn capture(world: &World) -> Self {
        let record = |id: &PacketId| {
            world
                .packets
                .get(id)
                .map(|p| PacketRecord::capture(world, p))
        };
        Self {
            tick: world.tick,
            elapsed: world.elapsed,
            counters: world.counters,
            boxes: world
                .boxes
                .values()
                .map(|b| BufferRecord {
                    box_id: b.id,
                    enabled: b.enabled,
                    disabled_for: b.disabled_for,
                    cooldown: world.behaviors.cooldown_of(b.id),
                    packets: b.buffer.iter().filter_map(record).collect(),
                })
                .collect(),
            wires: world
                .wires
                .values()
                .map(|w| WireRecord {
                    wire_id: w.id,
                    packets: w.packets().iter().filter_map(record).collect(),
                })
                .collect(),
            producers: world
                .producers
                .iter()
                .map(|(id, p)| ProducerRecord {
                    box_id: *id,
                    emitted: p.emitted,
                    timer: p.timer,
                })
                .collect(),
            groups: world.groups.groups().cloned().collect(),
            next_group: world.groups.next_id(),
            rng: Some(RngState::capture(&world.rng)),
        }
    }

    pub fn packet_count(&self) -> usize {
        self.boxes.iter().map(|b| b.packets.len()).sum::<usize>()
            + self.wires.iter().map(|w| w.packets.len()).sum::<usize>()
    }
}

impl World {
    fn rebuild_packet(&mut self, record: &PacketRecord, location: Location) -> PacketId {
        let id = self.alloc_packet_id();
        let packet = Packet {
            decoration: record.decoration,
            progress: record.progress,
            noise: record.noise,
            speed: record.speed,
            acceleration: record.acceleration,
            returning: record.returning,
            travelled: record.travelled,
            lateral_offset: record.lateral_offset,
            location,
            ..Packet::new(id, record.kind)
        };
        self.packets.insert(id, packet);
        match record.profile {
            Some(profile) => self.kinematics.assign(id, profile),
            None => self.kinematics.assign_randomized(id, &PROTECTED_CANDIDATES),
        }
        let hints = &record.hints;
        if hints.force_incompatible {
            self.hints.force_incompatible.insert(id);
        }
        if hints.teleported {
            self.hints.teleported.insert(id);
        }
        if hints.vpn_revert {
            self.hints.vpn_revert.insert(id);
        }
        if let Some(owner) = hints.vpn_owner {
            self.hints.vpn_owner.insert(id, owner);
        }
        id
    }

    /// Replace the live state with `snapshot`. Every packet is rebuilt under
    /// a fresh identity together with its side-table entries; pending
    /// notifications are dropped. Boxes and wires missing from the current
    /// network are skipped.
    pub fn restore(&mut self, snapshot: &Snapshot) {
        self.packets.clear();
        self.kinematics.clear();
        self.hints.clear();
        self.pending.clear();
        for w in self.wires.values_mut() {
            w.clear();
        }
        for b in self.boxes.values_mut() {
            b.buffer.clear();
        }
        for id in self.behaviors.box_ids() {
            self.behaviors.set_cooldown(id, 0.0);
        }

        for record in &snapshot.boxes {
            let Some(b) = self.boxes.get_mut(&record.box_id) else {
                continue;
            };
            b.enabled = record.enabled;
            b.disabled_for = record.disabled_for;
            self.behaviors.set_cooldown(record.box_id, record.cooldown);
            for p in &record.packets {
                let id = self.rebuild_packet(p, Location::Buffer(record.box_id));
                if let Some(b) = self.boxes.get_mut(&record.box_id) {
                    b.buffer.push_back(id);
                }
            }
        }
        for record in &snapshot.wires {
            if !self.wires.contains_key(&record.wire_id) {
                continue;
            }
            for p in &record.packets {
                let id = self.rebuild_packet(p, Location::Wire(record.wire_id));
                if let Some(w) = self.wires.get_mut(&record.wire_id) {
                    w.push(id);
                }
            }
        }

        for producer in self.producers.values_mut() {
            producer.emitted = 0;
            producer.timer = 0.0;
        }
        for record in &snapshot.producers {
            if let Some(p) = self.producers.get_mut(&record.box_id) {
                p.emitted = record.emitted;
                p.timer = record.timer;
            }
        }

        self.groups.restore(&snapshot.groups, snapshot.next_group);
        if let Some(rng) = &snapshot.rng {
            self.rng = rng.rebuild();
        }
        self.counters = snapshot.counters;
        self.tick = snapshot.tick;
        self.elapsed = snapshot.elapsed;
        debug!(tick = snapshot.tick, packets = snapshot.packet_count(), "snapshot restored");
    }
}

// ─── Timeline ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
struct HistoryFile {
    frames: Vec<Snapshot>,
}

/// Capacity-bounded snapshot history with a read cursor. `None` cursor
/// means live playback at the tail.
#[derive(Debug, Clone)]
pub struct Timeline {
    frames: VecDeque<Snapshot>,
    capacity: usize,
    cursor: Option<usize>,
}

impl Timeline {
    pub fn new(capacity: usize) -> Self {
        Self {
            frames: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            cursor: None,
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn is_playing(&self) -> bool {
        self.cursor.is_none()
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    pub fn latest(&self) -> Option<&Snapshot> {
        self.frames.back()
    }

    pub fn current(&self) -> Option<&Snapshot> {
        match self.cursor {
            Some(i) => self.frames.get(i),
            None => self.frames.back(),
        }
    }

    pub fn frames(&self) -> impl Iterator<Item = &Snapshot> {
        self.frames.iter()
    }

    /// Append a frame. Anything after the cursor is discarded first, so
    /// history never forks; recording always returns to playback.
    pub fn record(&mut self, snapshot: Snapshot) {
        if let Some(c) = self.cursor.take() {
            self.frames.truncate(c + 1);
        }
        self.frames.push_back(snapshot);
        while self.frames.len() > self.capacity {
            self.frames.pop_front();
        }
    }

    /// Move the cursor `back` frames behind the newest, clamping at the
    /// oldest frame.
    pub fn scrub_to(&mut self, back: usize) -> Option<&Snapshot> {
        if self.frames.is_empty() {
            return None;
        }
        let index = (self.frames.len() - 1).saturating_sub(back);
        self.cursor = Some(index);
        self.frames.get(index)
    }

    pub fn step_back(&mut self) -> Option<&Snapshot> {
        let index = self.cursor.unwrap_or(self.frames.len().checked_sub(1)?);
        let index = index.saturating_sub(1);
        self.cursor = Some(index);
        self.frames.get(index)
    }

    /// Stays paused on the newest frame at the end of history.
    pub fn step_forward(&mut self) -> Option<&Snapshot> {
        let last = self.frames.len().checked_sub(1)?;
        let index = (self.cursor?.saturating_add(1)).min(last);
        self.cursor = Some(index);
        self.frames.get(index)
    }

    /// Drop every frame newer than the cursor and return to playback.
    /// Returns how many frames were dropped.
    pub fn resume(&mut self) -> usize {
        let Some(c) = self.cursor.take() else {
            return 0;
        };
        let before = self.frames.len();
        self.frames.truncate(c + 1);
        before - self.frames.len()
    }

    pub fn export_json(&self) -> Result<String, TimelineError> {
        let file = HistoryFile {
            frames: self.frames.iter().cloned().collect(),
        };
        Ok(serde_json::to_string(&file)?)
    }

    /// Replace the whole history. Returns the newest frame to restore.
    pub fn import_json(&mut self, json: &str) -> Result<&Snapshot, TimelineError> {
        let file: HistoryFile = serde_json::from_str(json)?;
        if file.frames.is_empty() {
            return Err(TimelineError::Empty);
        }
        let skip = file.frames.len().saturating_sub(self.capacity);
        self.frames = file.frames.into_iter().skip(skip).collect();
        self.cursor = None;
        info!(frames = self.frames.len(), "timeline imported");
        self.frames.back().ok_or(TimelineError::Empty)
    }

    pub fn export_to_path(&self, path: &Path) -> Result<(), TimelineError> {
        std::fs::write(path, self.export_json()?)?;
        Ok(())
    }

    pub fn import_from_path(&mut self, path: &Path) -> Result<&Snapshot, TimelineError> {
        let json = std::fs::read_to_string(path)?;
        self.import_json(&json)
    }
}

// ─── Recorder Stage ──────────────────────────────────────────────────────────

const INTERVAL_EPSILON: f64 = 1e-9;

/// Captures a frame every `interval` seconds of simulated time while the
/// timeline is playing.
pub struct TimelineRecorder {
    timeline: Arc<Mutex<Timeline>>,
    interval: f64,
    accumulator: f64,
}

impl TimelineRecorder {
    pub fn new(timeline: Arc<Mutex<Timeline>>, interval: f64) -> Self {
        Self {
            timeline,
            interval,
            accumulator: 0.0,
        }
    }
}

impl Tickable for TimelineRecorder {
    fn name(&self) -> &'static str {
        "timeline"
    }

    fn update(&mut self, world: &mut World, dt: f64) {
        self.accumulator += dt;
        // Summed tick lengths fall a hair short of the interval.
        if self.accumulator + INTERVAL_EPSILON < self.interval {
            return;
        }
        self.accumulator -= self.interval;
        let mut timeline = self.timeline.lock().unwrap_or_else(PoisonError::into_inner);
        if timeline.is_playing() {
            timeline.record(Snapshot::capture(world));
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::types::{BehaviorKind, PortDirection, Shape};
    use glam::DVec2;
    use rand::Rng;

    fn frame(tick: u64) -> Snapshot {
        Snapshot {
            tick,
            elapsed: tick as f64,
            counters: Counters::default(),
            boxes: Vec::new(),
            wires: Vec::new(),
            producers: Vec::new(),
            groups: Vec::new(),
            next_group: 0,
            rng: None,
        }
    }

    fn ticks(t: &Timeline) -> Vec<u64> {
        t.frames().map(|f| f.tick).collect()
    }

    #[test]
    fn test_branch_truncation() {
        let mut t = Timeline::new(10);
        for i in 0..5 {
            t.record(frame(i));
        }
        assert_eq!(t.scrub_to(2).map(|f| f.tick), Some(2));
        t.record(frame(99));
        assert_eq!(ticks(&t), vec![0, 1, 2, 99]);
        assert!(t.is_playing());
    }

    #[test]
    fn test_scrub_clamps_to_oldest() {
        let mut t = Timeline::new(10);
        for i in 0..3 {
            t.record(frame(i));
        }
        assert_eq!(t.scrub_to(50).map(|f| f.tick), Some(0));
        assert_eq!(t.cursor(), Some(0));
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut t = Timeline::new(3);
        for i in 0..5 {
            t.record(frame(i));
        }
        assert_eq!(ticks(&t), vec![2, 3, 4]);
    }

    #[test]
    fn test_step_and_resume() {
        let mut t = Timeline::new(10);
        for i in 0..4 {
            t.record(frame(i));
        }
        assert_eq!(t.step_back().map(|f| f.tick), Some(2));
        assert_eq!(t.step_back().map(|f| f.tick), Some(1));
        assert_eq!(t.step_forward().map(|f| f.tick), Some(2));
        assert_eq!(t.resume(), 1);
        assert_eq!(ticks(&t), vec![0, 1, 2]);
        assert!(t.is_playing());
        assert_eq!(t.step_forward().map(|f| f.tick), None);
    }

    #[test]
    fn test_import_empty_rejected() {
        let mut t = Timeline::new(4);
        assert!(matches!(t.import_json(r#"{"frames": []}"#), Err(TimelineError::Empty)));
        assert!(matches!(t.import_json("nope"), Err(TimelineError::Json(_))));
    }

    #[test]
    fn test_export_import_round_trip() {
        let mut t = Timeline::new(4);
        for i in 0..3 {
            t.record(frame(i));
        }
        let json = t.export_json().unwrap();
        let mut other = Timeline::new(4);
        assert_eq!(other.import_json(&json).unwrap().tick, 2);
        assert_eq!(ticks(&other), vec![0, 1, 2]);
    }

    #[test]
    fn test_capture_restore_capture() {
        let mut world = World::new(SimConfig::default());
        let a = world.add_box(DVec2::ZERO, DVec2::splat(20.0), BehaviorKind::Normal);
        let b = world.add_box(DVec2::new(300.0, 0.0), DVec2::splat(20.0), BehaviorKind::Normal);
        let o = world.add_port(a, Shape::Square, PortDirection::Output, DVec2::ZERO).unwrap();
        let i = world.add_port(b, Shape::Square, PortDirection::Input, DVec2::ZERO).unwrap();
        let wire = world.connect(o, i, &[]).unwrap();
        let p = world
            .place_on_wire(wire, PacketKind::Messenger(Shape::Triangle), 0.3)
            .unwrap();
        world.packets.get_mut(&p).unwrap().noise = 2.5;
        world.inject(a, PacketKind::Large { size: 8 }).unwrap();
        world.counters = Counters { score: 7, coins: 4, loss: 2 };

        world.hints.force_incompatible.insert(p);

        let before = Snapshot::capture(&world);
        world.lose_packet(p);
        let _: u64 = world.rng.gen();
        world.restore(&before);
        let after = Snapshot::capture(&world);
        assert_eq!(before, after);
        assert!(after.rng.is_some());
        let rebuilt = world.wire(wire).unwrap().packets()[0];
        assert!(world.is_forced_incompatible(rebuilt));
        assert!(world.packet(p).is_none());
        assert_eq!(world.packets_on_wires(), 1);
    }
}
