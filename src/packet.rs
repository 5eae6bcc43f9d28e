// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Packet Flow Engine - Packet Record

use serde::{Deserialize, Serialize};

use crate::types::{BoxId, Decoration, PacketId, PacketKind, Shape, WireId};

/// Where a packet currently lives. A packet is held by exactly one wire or
/// one box buffer; `Detached` only exists transiently inside a conversion
/// or before the first enqueue.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Location {
    Detached,
    Wire(WireId),
    Buffer(BoxId),
}

/// Shared core record for every packet variant. Decorations are a tag on
/// the record, so converting between variants copies the runtime fields
/// into a record with a fresh id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    pub id: PacketId,
    pub kind: PacketKind,
    pub decoration: Decoration,
    /// Normalized position along the current wire.
    pub progress: f64,
    /// px/s
    pub speed: f64,
    pub acceleration: f64,
    pub noise: f64,
    pub location: Location,
    /// Moving backward toward the source port.
    pub returning: bool,
    /// Arc length covered on the current wire, used by drift profiles.
    pub travelled: f64,
    /// Cosmetic perpendicular offset; never affects progress.
    pub lateral_offset: f64,
}

impl Packet {
    pub fn new(id: PacketId, kind: PacketKind) -> Self {
        Self {
            id,
            kind,
            decoration: Decoration::None,
            progress: 0.0,
            speed: kind.base_speed(),
            acceleration: 0.0,
            noise: 0.0,
            location: Location::Detached,
            returning: false,
            travelled: 0.0,
            lateral_offset: 0.0,
        }
    }

    pub fn is_protected(&self) -> bool {
        matches!(self.decoration, Decoration::Protected { .. })
    }

    pub fn is_trojan(&self) -> bool {
        matches!(self.decoration, Decoration::Trojan)
    }

    /// Protected with shield budget and lifetime left. Shielded packets
    /// are invisible to collision detection.
    pub fn is_shielded(&self) -> bool {
        matches!(
            self.decoration,
            Decoration::Protected { shield, remaining } if shield > 0.0 && remaining > 0.0
        )
    }

    pub fn size(&self) -> u32 {
        match self.decoration {
            Decoration::Protected { .. } => self.kind.size() * 2,
            _ => self.kind.size(),
        }
    }

    /// Infected packets are worth nothing on delivery.
    pub fn reward(&self) -> u32 {
        match self.decoration {
            Decoration::Trojan => 0,
            _ => self.kind.reward(),
        }
    }

    pub fn shape(&self) -> Shape {
        self.kind.shape_equivalent()
    }

    pub fn base_speed(&self) -> f64 {
        self.kind.base_speed()
    }

    /// Add noise, draining any shield budget first. Returns the noise that
    /// actually landed on the packet.
    pub fn absorb_noise(&mut self, amount: f64) -> f64 {
        if amount <= 0.0 {
            return 0.0;
        }
        let mut rest = amount;
        if let Decoration::Protected { shield, remaining } = &mut self.decoration {
            if *remaining > 0.0 {
                let taken = shield.min(rest);
                *shield -= taken;
                rest -= taken;
            }
        }
        self.noise += rest;
        rest
    }

    /// Copy of this packet under a new identity and decoration. The caller
    /// is responsible for swapping it into the old packet's container.
    pub(crate) fn converted(&self, id: PacketId, decoration: Decoration) -> Self {
        Self {
            id,
            decoration,
            ..self.clone()
        }
    }

    pub(crate) fn reset_for_wire(&mut self, wire: WireId) {
        self.location = Location::Wire(wire);
        self.progress = 0.0;
        self.speed = self.kind.base_speed();
        self.acceleration = 0.0;
        self.returning = false;
        self.travelled = 0.0;
        self.lateral_offset = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn protected(shield: f64, remaining: f64) -> Packet {
        let mut p = Packet::new(PacketId(1), PacketKind::Messenger(Shape::Square));
        p.decoration = Decoration::Protected { shield, remaining };
        p
    }

    #[test]
    fn test_new_packet_starts_at_base_speed() {
        let p = Packet::new(PacketId(0), PacketKind::Large { size: 8 });
        assert!((p.speed - 50.0).abs() < f64::EPSILON);
        assert_eq!(p.location, Location::Detached);
        assert_eq!(p.noise, 0.0);
    }

    #[test]
    fn test_shield_absorbs_before_noise() {
        let mut p = protected(2.0, 5.0);
        assert_eq!(p.absorb_noise(1.5), 0.0);
        assert_eq!(p.noise, 0.0);
        assert!((p.absorb_noise(1.0) - 0.5).abs() < 1e-12);
        assert!((p.noise - 0.5).abs() < 1e-12);
        assert!(!p.is_shielded());
    }

    #[test]
    fn test_expired_shield_absorbs_nothing() {
        let mut p = protected(3.0, 0.0);
        assert!(!p.is_shielded());
        assert_eq!(p.absorb_noise(1.0), 1.0);
    }

    #[test]
    fn test_protected_size_doubles() {
        let p = protected(1.0, 1.0);
        assert_eq!(p.size(), 4);
    }

    #[test]
    fn test_trojan_reward_is_zero() {
        let mut p = Packet::new(PacketId(0), PacketKind::Messenger(Shape::Triangle));
        p.decoration = Decoration::Trojan;
        assert_eq!(p.reward(), 0);
        assert_eq!(p.size(), 3);
    }

    #[test]
    fn test_converted_keeps_runtime_state() {
        let mut p = Packet::new(PacketId(4), PacketKind::Messenger(Shape::Circle));
        p.progress = 0.4;
        p.noise = 2.0;
        p.location = Location::Wire(WireId(2));
        let q = p.converted(PacketId(9), Decoration::Trojan);
        assert_eq!(q.id, PacketId(9));
        assert_eq!(q.progress, 0.4);
        assert_eq!(q.noise, 2.0);
        assert_eq!(q.location, Location::Wire(WireId(2)));
        assert!(q.is_trojan());
    }
}
