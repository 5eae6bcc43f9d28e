// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Packet Flow Engine - Network Model

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use glam::DVec2;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::behavior::{self, BehaviorRegistry};
use crate::config::SimConfig;
use crate::error::NetworkError;
use crate::groups::GroupRegistry;
use crate::kinematics::{KinematicsRegistry, ProfileId, PROTECTED_CANDIDATES};
use crate::packet::{Location, Packet};
use crate::types::*;
use crate::wire::{Wire, WirePath};

// ─── Port ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Port {
    pub id: PortId,
    pub owner: BoxId,
    pub shape: Shape,
    pub direction: PortDirection,
    pub position: DVec2,
    /// At most one wire per port.
    pub wire: Option<WireId>,
}

// ─── SystemBox ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SystemBox {
    pub id: BoxId,
    pub position: DVec2,
    pub size: DVec2,
    pub behavior: BehaviorKind,
    pub inputs: Vec<PortId>,
    pub outputs: Vec<PortId>,
    pub(crate) buffer: VecDeque<PacketId>,
    pub capacity: usize,
    pub enabled: bool,
    /// Seconds until a disabled box re-enables itself.
    pub disabled_for: f64,
}

impl SystemBox {
    pub fn buffer(&self) -> impl Iterator<Item = PacketId> + '_ {
        self.buffer.iter().copied()
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_full(&self) -> bool {
        self.buffer.len() >= self.capacity
    }

    /// Boxes without inputs are where packets are born.
    pub fn is_source(&self) -> bool {
        self.inputs.is_empty()
    }

    /// Boxes without outputs consume what they receive.
    pub fn is_sink(&self) -> bool {
        self.outputs.is_empty()
    }
}

// ─── Producer ────────────────────────────────────────────────────────────────

/// Emits packets into its box's buffer at a fixed interval, cycling through
/// `kinds`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Producer {
    pub kinds: Vec<PacketKind>,
    pub interval: f64,
    /// Stop after this many packets.
    pub limit: Option<u64>,
    pub emitted: u64,
    pub timer: f64,
}

impl Producer {
    pub fn new(kinds: Vec<PacketKind>, interval: f64, limit: Option<u64>) -> Self {
        Self {
            kinds,
            interval,
            limit,
            emitted: 0,
            timer: 0.0,
        }
    }

    pub fn exhausted(&self) -> bool {
        self.kinds.is_empty() || self.limit.is_some_and(|limit| self.emitted >= limit)
    }

    pub fn next_kind(&self) -> Option<PacketKind> {
        if self.exhausted() {
            return None;
        }
        Some(self.kinds[(self.emitted % self.kinds.len() as u64) as usize])
    }
}

// ─── Side Tables ─────────────────────────────────────────────────────────────

/// Per-packet hints keyed by identity. Cleared when the packet goes away.
#[derive(Debug, Clone, Default)]
pub(crate) struct Hints {
    /// Route through an incompatible output on the next hop.
    pub force_incompatible: BTreeSet<PacketId>,
    /// Just moved between spy boxes; the receiving spy must not move it again.
    pub teleported: BTreeSet<PacketId>,
    /// Protected by a VPN that has since been disabled.
    pub vpn_revert: BTreeSet<PacketId>,
    /// VPN box that shielded the packet.
    pub vpn_owner: BTreeMap<PacketId, BoxId>,
}

impl Hints {
    fn forget(&mut self, packet: PacketId) {
        self.force_incompatible.remove(&packet);
        self.teleported.remove(&packet);
        self.vpn_revert.remove(&packet);
        self.vpn_owner.remove(&packet);
    }

    pub(crate) fn clear(&mut self) {
        self.force_incompatible.clear();
        self.teleported.clear();
        self.vpn_revert.clear();
        self.vpn_owner.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Notification {
    pub box_id: BoxId,
    pub packet: PacketId,
    pub entered: Option<PortId>,
}

// ─── World ───────────────────────────────────────────────────────────────────

/// The whole simulable state: entity arenas, counters, side tables and the
/// world RNG. Every tick stage receives it as an explicit `&mut` context.
pub struct World {
    pub(crate) config: SimConfig,
    pub(crate) packets: BTreeMap<PacketId, Packet>,
    pub(crate) wires: BTreeMap<WireId, Wire>,
    pub(crate) ports: BTreeMap<PortId, Port>,
    pub(crate) boxes: BTreeMap<BoxId, SystemBox>,
    pub(crate) counters: Counters,
    pub(crate) kinematics: KinematicsRegistry,
    pub(crate) hints: Hints,
    pub(crate) groups: GroupRegistry,
    pub(crate) behaviors: BehaviorRegistry,
    pub(crate) producers: BTreeMap<BoxId, Producer>,
    pub(crate) rng: ChaCha8Rng,
    pub(crate) pending: VecDeque<Notification>,
    pub(crate) events: Vec<SimEvent>,
    pub(crate) tick: u64,
    pub(crate) elapsed: f64,
    next_packet: u64,
    next_wire: u32,
    next_port: u32,
    next_box: u32,
}

impl World {
    pub fn new(config: SimConfig) -> Self {
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        Self {
            config,
            packets: BTreeMap::new(),
            wires: BTreeMap::new(),
            ports: BTreeMap::new(),
            boxes: BTreeMap::new(),
            counters: Counters::default(),
            kinematics: KinematicsRegistry::new(),
            hints: Hints::default(),
            groups: GroupRegistry::new(),
            behaviors: BehaviorRegistry::new(),
            producers: BTreeMap::new(),
            rng,
            pending: VecDeque::new(),
            events: Vec::new(),
            tick: 0,
            elapsed: 0.0,
            next_packet: 0,
            next_wire: 0,
            next_port: 0,
            next_box: 0,
        }
    }

    // --- Queries ---

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn counters(&self) -> Counters {
        self.counters
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    pub fn packet(&self, id: PacketId) -> Option<&Packet> {
        self.packets.get(&id)
    }

    pub fn packets(&self) -> impl Iterator<Item = &Packet> {
        self.packets.values()
    }

    pub fn wire(&self, id: WireId) -> Option<&Wire> {
        self.wires.get(&id)
    }

    pub fn wires(&self) -> impl Iterator<Item = &Wire> {
        self.wires.values()
    }

    pub fn port(&self, id: PortId) -> Option<&Port> {
        self.ports.get(&id)
    }

    pub fn system_box(&self, id: BoxId) -> Option<&SystemBox> {
        self.boxes.get(&id)
    }

    pub fn boxes(&self) -> impl Iterator<Item = &SystemBox> {
        self.boxes.values()
    }

    pub fn producer(&self, id: BoxId) -> Option<&Producer> {
        self.producers.get(&id)
    }

    pub fn groups(&self) -> &GroupRegistry {
        &self.groups
    }

    pub fn kinematics(&self) -> &KinematicsRegistry {
        &self.kinematics
    }

    pub fn behavior_kind(&self, id: BoxId) -> Option<BehaviorKind> {
        self.behaviors.kind_of(id)
    }

    pub fn is_marked_teleported(&self, id: PacketId) -> bool {
        self.hints.teleported.contains(&id)
    }

    pub fn is_forced_incompatible(&self, id: PacketId) -> bool {
        self.hints.force_incompatible.contains(&id)
    }

    pub fn has_revert_hint(&self, id: PacketId) -> bool {
        self.hints.vpn_revert.contains(&id)
    }

    /// Live packets currently shielded by the VPN at `owner`.
    pub fn shielded_by(&self, owner: BoxId) -> Vec<PacketId> {
        self.hints
            .vpn_owner
            .iter()
            .filter(|(_, vpn)| **vpn == owner)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn packets_on_wires(&self) -> usize {
        self.wires.values().map(|w| w.packets().len()).sum()
    }

    pub fn packets_buffered(&self) -> usize {
        self.boxes.values().map(|b| b.buffered()).sum()
    }

    /// Collision-space position: the point on the wire path, or the box
    /// centre for buffered packets. Drift offsets are excluded.
    pub fn packet_position(&self, id: PacketId) -> Option<DVec2> {
        let packet = self.packets.get(&id)?;
        match packet.location {
            Location::Wire(w) => Some(self.wires.get(&w)?.path().point_at(packet.progress)),
            Location::Buffer(b) => Some(self.boxes.get(&b)?.position),
            Location::Detached => None,
        }
    }

    /// Position including the cosmetic drift offset, for renderers.
    pub fn render_position(&self, id: PacketId) -> Option<DVec2> {
        let packet = self.packets.get(&id)?;
        let base = self.packet_position(id)?;
        if let Location::Wire(w) = packet.location {
            let tangent = self.wires.get(&w)?.path().tangent_at(packet.progress);
            return Some(base + tangent.perp() * packet.lateral_offset);
        }
        Some(base)
    }

    /// Owner box of the port a wire feeds into.
    pub fn destination_box(&self, wire: WireId) -> Option<BoxId> {
        let w = self.wires.get(&wire)?;
        Some(self.ports.get(&w.destination)?.owner)
    }

    pub fn source_box(&self, wire: WireId) -> Option<BoxId> {
        let w = self.wires.get(&wire)?;
        Some(self.ports.get(&w.source)?.owner)
    }

    // --- Authoring ---

    pub fn add_box(&mut self, position: DVec2, size: DVec2, kind: BehaviorKind) -> BoxId {
        let id = BoxId(self.next_box);
        self.next_box += 1;
        let capacity = if kind.is_junction() {
            self.config.network.junction_capacity
        } else {
            self.config.network.buffer_capacity
        };
        self.boxes.insert(
            id,
            SystemBox {
                id,
                position,
                size,
                behavior: kind,
                inputs: Vec::new(),
                outputs: Vec::new(),
                buffer: VecDeque::new(),
                capacity,
                enabled: true,
                disabled_for: 0.0,
            },
        );
        self.behaviors.register(id, kind, behavior::create(kind, id));
        id
    }

    /// Add a port at `offset` from the box centre. Ports keep insertion
    /// order within their direction.
    pub fn add_port(
        &mut self,
        owner: BoxId,
        shape: Shape,
        direction: PortDirection,
        offset: DVec2,
    ) -> Result<PortId, NetworkError> {
        let b = self.boxes.get_mut(&owner).ok_or(NetworkError::UnknownBox(owner))?;
        let id = PortId(self.next_port);
        self.next_port += 1;
        match direction {
            PortDirection::Input => b.inputs.push(id),
            PortDirection::Output => b.outputs.push(id),
        }
        let position = b.position + offset;
        self.ports.insert(
            id,
            Port {
                id,
                owner,
                shape,
                direction,
                position,
                wire: None,
            },
        );
        Ok(id)
    }

    /// Connect an output port to an input port through up to three bends.
    pub fn connect(
        &mut self,
        from: PortId,
        to: PortId,
        bends: &[DVec2],
    ) -> Result<WireId, NetworkError> {
        let src = self.ports.get(&from).ok_or(NetworkError::UnknownPort(from))?;
        let dst = self.ports.get(&to).ok_or(NetworkError::UnknownPort(to))?;
        if src.direction != PortDirection::Output || dst.direction != PortDirection::Input {
            return Err(NetworkError::PortDirectionMismatch);
        }
        if src.wire.is_some() {
            return Err(NetworkError::PortAlreadyBound(from));
        }
        if dst.wire.is_some() {
            return Err(NetworkError::PortAlreadyBound(to));
        }
        let path = WirePath::with_bends(src.position, bends, dst.position)?;
        let id = WireId(self.next_wire);
        self.next_wire += 1;
        self.wires.insert(id, Wire::new(id, from, to, path));
        if let Some(p) = self.ports.get_mut(&from) {
            p.wire = Some(id);
        }
        if let Some(p) = self.ports.get_mut(&to) {
            p.wire = Some(id);
        }
        debug!(wire = %id, from = %from, to = %to, "wire connected");
        Ok(id)
    }

    /// Re-route a wire through new bends. Packets keep their progress.
    pub fn set_wire_bends(&mut self, wire: WireId, bends: &[DVec2]) -> Result<(), NetworkError> {
        let w = self.wires.get(&wire).ok_or(NetworkError::UnknownWire(wire))?;
        let start = w.path().start();
        let end = w.path().end();
        let path = WirePath::with_bends(start, bends, end)?;
        if let Some(w) = self.wires.get_mut(&wire) {
            w.set_path(path);
        }
        Ok(())
    }

    pub fn add_producer(
        &mut self,
        owner: BoxId,
        kinds: Vec<PacketKind>,
        interval: f64,
        limit: Option<u64>,
    ) -> Result<(), NetworkError> {
        if !self.boxes.contains_key(&owner) {
            return Err(NetworkError::UnknownBox(owner));
        }
        self.producers.insert(owner, Producer::new(kinds, interval, limit));
        Ok(())
    }

    // --- Packet lifecycle ---

    pub(crate) fn alloc_packet_id(&mut self) -> PacketId {
        let id = PacketId(self.next_packet);
        self.next_packet += 1;
        id
    }

    /// Create a detached packet with its default profile.
    pub fn spawn_packet(&mut self, kind: PacketKind) -> PacketId {
        let id = self.alloc_packet_id();
        self.packets.insert(id, Packet::new(id, kind));
        self.kinematics.assign(id, ProfileId::default_for(&kind));
        id
    }

    /// Spawn a packet straight into a box buffer. Returns `None` (and the
    /// packet never exists) when the buffer is full.
    pub fn inject(&mut self, owner: BoxId, kind: PacketKind) -> Option<PacketId> {
        let id = self.spawn_packet(kind);
        if self.enqueue(owner, id, None) {
            Some(id)
        } else {
            self.destroy_packet(id);
            None
        }
    }

    /// Spawn a packet on a wire at the given progress.
    pub fn place_on_wire(
        &mut self,
        wire: WireId,
        kind: PacketKind,
        progress: f64,
    ) -> Result<PacketId, NetworkError> {
        if !self.wires.contains_key(&wire) {
            return Err(NetworkError::UnknownWire(wire));
        }
        let id = self.spawn_packet(kind);
        self.attach_to_wire(id, wire);
        if let Some(p) = self.packets.get_mut(&id) {
            p.progress = progress.clamp(0.0, 1.0);
        }
        Ok(id)
    }

    /// Remove a packet from whatever holds it. Returns the index it held
    /// in that container.
    pub(crate) fn detach(&mut self, id: PacketId) -> Option<usize> {
        let packet = self.packets.get_mut(&id)?;
        let location = packet.location;
        packet.location = Location::Detached;
        match location {
            Location::Wire(w) => self.wires.get_mut(&w)?.remove(id),
            Location::Buffer(b) => {
                let buffer = &mut self.boxes.get_mut(&b)?.buffer;
                let idx = buffer.iter().position(|&p| p == id)?;
                buffer.remove(idx);
                Some(idx)
            }
            Location::Detached => None,
        }
    }

    pub(crate) fn attach_to_wire(&mut self, id: PacketId, wire: WireId) -> bool {
        if !self.wires.contains_key(&wire) || !self.packets.contains_key(&id) {
            return false;
        }
        self.detach(id);
        if let Some(p) = self.packets.get_mut(&id) {
            p.reset_for_wire(wire);
        }
        if let Some(w) = self.wires.get_mut(&wire) {
            w.push(id);
        }
        true
    }

    fn enqueue_at(&mut self, owner: BoxId, id: PacketId, entered: Option<PortId>, front: bool) -> bool {
        match self.boxes.get(&owner) {
            Some(b) if !b.is_full() => {}
            _ => return false,
        }
        if !self.packets.contains_key(&id) {
            return false;
        }
        self.detach(id);
        if let Some(b) = self.boxes.get_mut(&owner) {
            if front {
                b.buffer.push_front(id);
            } else {
                b.buffer.push_back(id);
            }
        }
        if let Some(p) = self.packets.get_mut(&id) {
            p.location = Location::Buffer(owner);
            p.returning = false;
            p.progress = 0.0;
        }
        self.pending.push_back(Notification {
            box_id: owner,
            packet: id,
            entered,
        });
        true
    }

    /// Append to a box buffer. The packet leaves its old container only
    /// when the buffer accepts it; a full buffer returns `false`.
    pub fn enqueue(&mut self, owner: BoxId, id: PacketId, entered: Option<PortId>) -> bool {
        self.enqueue_at(owner, id, entered, false)
    }

    pub fn enqueue_front(&mut self, owner: BoxId, id: PacketId) -> bool {
        self.enqueue_at(owner, id, None, true)
    }

    fn forget(&mut self, id: PacketId) {
        self.kinematics.forget(id);
        self.hints.forget(id);
    }

    /// Remove a packet without counting it as loss (consumed by a sink,
    /// split, or merge).
    pub(crate) fn destroy_packet(&mut self, id: PacketId) -> Option<Packet> {
        self.detach(id);
        self.forget(id);
        self.packets.remove(&id)
    }

    /// Remove a packet and count it as loss. Lost fragments are reported
    /// to their group.
    pub fn lose_packet(&mut self, id: PacketId) {
        let Some(packet) = self.destroy_packet(id) else {
            return;
        };
        self.counters.loss += 1;
        debug!(packet = %id, loss = self.counters.loss, "packet lost");
        self.events.push(SimEvent::PacketLost { packet: id });
        if let PacketKind::Bit { group, index } = packet.kind {
            self.groups.report_lost(group, index);
            let fully_lost = self
                .groups
                .get(group)
                .is_some_and(|g| g.arrived.is_empty() && g.lost >= g.expected);
            if fully_lost {
                self.close_group(group, &[]);
            }
        }
    }

    /// Close a group and charge whatever loss its fragments have not
    /// already accounted for.
    pub(crate) fn close_group(&mut self, group: GroupId, pieces: &[u32]) {
        if let Some(extra) = self.groups.close(group, pieces) {
            self.counters.loss += extra as u64;
            self.events.push(SimEvent::GroupClosed { group, loss: extra });
        }
    }

    pub(crate) fn deliver_to_sink(&mut self, owner: BoxId, id: PacketId) {
        let Some(packet) = self.destroy_packet(id) else {
            return;
        };
        let coins = packet.reward();
        self.counters.coins += coins as u64;
        self.counters.score += packet.size() as u64;
        debug!(packet = %id, box_id = %owner, coins, "packet delivered");
        self.events.push(SimEvent::PacketDelivered {
            packet: id,
            box_id: owner,
            coins,
        });
    }

    // --- Variant conversions ---

    /// Swap `id` for a copy under a new identity and decoration, keeping
    /// its slot in the wire or buffer that holds it.
    fn convert(&mut self, id: PacketId, decoration: Decoration) -> Option<PacketId> {
        let fresh_id = self.alloc_packet_id();
        let fresh = self.packets.get(&id)?.converted(fresh_id, decoration);
        match fresh.location {
            Location::Wire(w) => {
                self.wires.get_mut(&w)?.replace(id, fresh_id);
            }
            Location::Buffer(b) => {
                let slot = self.boxes.get_mut(&b)?.buffer.iter_mut().find(|p| **p == id)?;
                *slot = fresh_id;
            }
            Location::Detached => {}
        }
        self.packets.remove(&id);
        self.forget(id);
        if matches!(decoration, Decoration::Protected { .. }) {
            self.kinematics.assign_randomized(fresh_id, &PROTECTED_CANDIDATES);
        } else {
            self.kinematics.assign(fresh_id, ProfileId::default_for(&fresh.kind));
        }
        debug!(from = %id, to = %fresh_id, ?decoration, "packet converted");
        self.packets.insert(fresh_id, fresh);
        Some(fresh_id)
    }

    /// Wrap in a shield. Already-protected packets are returned unchanged.
    pub fn protect(&mut self, id: PacketId) -> Option<PacketId> {
        let packet = self.packets.get(&id)?;
        if packet.is_protected() {
            return Some(id);
        }
        let decoration = Decoration::Protected {
            shield: self.config.behavior.shield_budget,
            remaining: self.config.behavior.shield_duration,
        };
        self.convert(id, decoration)
    }

    pub fn infect(&mut self, id: PacketId) -> Option<PacketId> {
        if self.packets.get(&id)?.is_trojan() {
            return Some(id);
        }
        self.convert(id, Decoration::Trojan)
    }

    /// Strip any decoration, restoring the wrapped original.
    pub fn revert(&mut self, id: PacketId) -> Option<PacketId> {
        if self.packets.get(&id)?.decoration == Decoration::None {
            return Some(id);
        }
        self.convert(id, Decoration::None)
    }

    /// In-place VPN re-tag of a confidential packet. Keeps its identity.
    pub(crate) fn retag_vpn(&mut self, id: PacketId) -> bool {
        let Some(packet) = self.packets.get_mut(&id) else {
            return false;
        };
        if packet.kind != (PacketKind::Confidential { vpn: false }) {
            return false;
        }
        packet.kind = PacketKind::Confidential { vpn: true };
        self.kinematics.assign(id, ProfileId::ConfidentialVpn);
        true
    }

    // --- Box state ---

    pub fn set_box_enabled(&mut self, id: BoxId, enabled: bool) {
        let Some(b) = self.boxes.get_mut(&id) else {
            return;
        };
        if b.enabled == enabled {
            return;
        }
        b.enabled = enabled;
        if enabled {
            b.disabled_for = 0.0;
        }
        info!(box_id = %id, enabled, "box toggled");
        self.events.push(SimEvent::BoxToggled { box_id: id, enabled });
        if let Some(mut behavior) = self.behaviors.take(id) {
            behavior.on_enabled_changed(self, enabled);
            self.behaviors.restore(id, behavior);
        }
    }

    /// Disable a box for `duration` seconds.
    pub fn disable_box(&mut self, id: BoxId, duration: f64) {
        self.set_box_enabled(id, false);
        if let Some(b) = self.boxes.get_mut(&id) {
            b.disabled_for = b.disabled_for.max(duration);
        }
    }

    pub(crate) fn tick_box_timers(&mut self, dt: f64) {
        let mut expired = Vec::new();
        for b in self.boxes.values_mut() {
            if !b.enabled && b.disabled_for > 0.0 {
                b.disabled_for -= dt;
                if b.disabled_for <= 0.0 {
                    expired.push(b.id);
                }
            }
        }
        for id in expired {
            self.set_box_enabled(id, true);
        }
    }

    // --- Behaviors ---

    /// Deliver queued buffer-insertion notifications, including any raised
    /// while delivering. Stale entries (packet gone or moved) are skipped.
    pub(crate) fn flush_notifications(&mut self) {
        while let Some(note) = self.pending.pop_front() {
            let mut packet = note.packet;
            match self.packets.get(&packet) {
                Some(p) if p.location == Location::Buffer(note.box_id) => {}
                _ => continue,
            }
            if self.hints.vpn_revert.remove(&packet) {
                if let Some(reverted) = self.revert(packet) {
                    packet = reverted;
                }
            }
            if let Some(mut behavior) = self.behaviors.take(note.box_id) {
                behavior.on_packet_enqueued(self, packet, note.entered);
                self.behaviors.restore(note.box_id, behavior);
            }
        }
    }

    pub(crate) fn update_behaviors(&mut self, dt: f64) {
        for id in self.behaviors.box_ids() {
            if let Some(mut behavior) = self.behaviors.take(id) {
                behavior.update(self, dt);
                self.behaviors.restore(id, behavior);
            }
        }
    }

    pub fn take_events(&mut self) -> Vec<SimEvent> {
        std::mem::take(&mut self.events)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> (World, BoxId, BoxId, WireId) {
        let mut world = World::new(SimConfig::default());
        let a = world.add_box(DVec2::new(0.0, 0.0), DVec2::splat(40.0), BehaviorKind::Normal);
        let b = world.add_box(DVec2::new(300.0, 0.0), DVec2::splat(40.0), BehaviorKind::Normal);
        let out = world
            .add_port(a, Shape::Square, PortDirection::Output, DVec2::new(20.0, 0.0))
            .unwrap();
        let inp = world
            .add_port(b, Shape::Square, PortDirection::Input, DVec2::new(-20.0, 0.0))
            .unwrap();
        let wire = world.connect(out, inp, &[]).unwrap();
        (world, a, b, wire)
    }

    #[test]
    fn test_connect_rejects_reversed_ports() {
        let (mut world, a, b, _) = pair();
        let o = world.add_port(b, Shape::Circle, PortDirection::Output, DVec2::ZERO).unwrap();
        let i = world.add_port(a, Shape::Circle, PortDirection::Input, DVec2::ZERO).unwrap();
        assert!(matches!(world.connect(i, o, &[]), Err(NetworkError::PortDirectionMismatch)));
    }

    #[test]
    fn test_port_binds_one_wire() {
        let (mut world, _, b, _) = pair();
        let out = world.system_box(BoxId(0)).unwrap().outputs[0];
        let extra = world.add_port(b, Shape::Square, PortDirection::Input, DVec2::ZERO).unwrap();
        assert!(matches!(
            world.connect(out, extra, &[]),
            Err(NetworkError::PortAlreadyBound(p)) if p == out
        ));
    }

    #[test]
    fn test_connect_rejects_too_many_bends() {
        let (mut world, a, b, _) = pair();
        let o = world.add_port(a, Shape::Circle, PortDirection::Output, DVec2::ZERO).unwrap();
        let i = world.add_port(b, Shape::Circle, PortDirection::Input, DVec2::ZERO).unwrap();
        let bends = [DVec2::ONE; 4];
        assert!(matches!(world.connect(o, i, &bends), Err(NetworkError::InvalidPath(_))));
        assert!(world.port(o).unwrap().wire.is_none());
    }

    #[test]
    fn test_enqueue_full_buffer_rejects_without_detaching() {
        let (mut world, _, b, wire) = pair();
        for _ in 0..5 {
            assert!(world.inject(b, PacketKind::Messenger(Shape::Square)).is_some());
        }
        let on_wire = world
            .place_on_wire(wire, PacketKind::Messenger(Shape::Circle), 0.9)
            .unwrap();
        assert!(!world.enqueue(b, on_wire, None));
        assert_eq!(world.packet(on_wire).unwrap().location, Location::Wire(wire));
        assert_eq!(world.wire(wire).unwrap().packets(), &[on_wire]);
    }

    #[test]
    fn test_packet_held_by_single_container() {
        let (mut world, a, b, wire) = pair();
        let id = world.place_on_wire(wire, PacketKind::Messenger(Shape::Square), 0.5).unwrap();
        assert!(world.enqueue(b, id, None));
        assert!(world.wire(wire).unwrap().is_empty());
        assert!(world.enqueue_front(a, id));
        assert_eq!(world.system_box(b).unwrap().buffered(), 0);
        assert_eq!(world.system_box(a).unwrap().buffer().collect::<Vec<_>>(), vec![id]);
    }

    #[test]
    fn test_conversion_keeps_slot_and_retires_old_id() {
        let (mut world, a, _, _) = pair();
        let first = world.inject(a, PacketKind::Messenger(Shape::Square)).unwrap();
        let second = world.inject(a, PacketKind::Messenger(Shape::Triangle)).unwrap();
        let third = world.inject(a, PacketKind::Messenger(Shape::Circle)).unwrap();
        let infected = world.infect(second).unwrap();
        assert_ne!(infected, second);
        assert!(world.packet(second).is_none());
        assert!(world.kinematics().fixed(second).is_none());
        let order: Vec<_> = world.system_box(a).unwrap().buffer().collect();
        assert_eq!(order, vec![first, infected, third]);
        assert_eq!(world.packets().count(), 3);
    }

    #[test]
    fn test_protect_is_idempotent() {
        let (mut world, a, _, _) = pair();
        let id = world.inject(a, PacketKind::Messenger(Shape::Square)).unwrap();
        let wrapped = world.protect(id).unwrap();
        assert_ne!(wrapped, id);
        assert_eq!(world.protect(wrapped), Some(wrapped));
        assert_eq!(world.packets().count(), 1);
    }

    #[test]
    fn test_lose_packet_counts_once() {
        let (mut world, _, _, wire) = pair();
        let id = world.place_on_wire(wire, PacketKind::Messenger(Shape::Square), 0.1).unwrap();
        world.lose_packet(id);
        world.lose_packet(id);
        assert_eq!(world.counters().loss, 1);
        assert!(world.wire(wire).unwrap().is_empty());
    }

    #[test]
    fn test_disable_timer_reenables() {
        let (mut world, _, b, _) = pair();
        world.disable_box(b, 1.0);
        assert!(!world.system_box(b).unwrap().enabled);
        world.tick_box_timers(0.6);
        assert!(!world.system_box(b).unwrap().enabled);
        world.tick_box_timers(0.6);
        assert!(world.system_box(b).unwrap().enabled);
        let toggles = world
            .take_events()
            .into_iter()
            .filter(|e| matches!(e, SimEvent::BoxToggled { .. }))
            .count();
        assert_eq!(toggles, 2);
    }

    #[test]
    fn test_packet_position_on_wire() {
        let (mut world, _, _, wire) = pair();
        let id = world.place_on_wire(wire, PacketKind::Bit { group: GroupId(0), index: 0 }, 0.5).unwrap();
        let pos = world.packet_position(id).unwrap();
        assert!((pos - DVec2::new(150.0, 0.0)).length() < 1e-9);
    }
}
