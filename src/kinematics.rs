// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Packet Flow Engine - Kinematics Profiles

use std::collections::BTreeMap;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::types::{PacketId, PacketKind, Shape};

// ─── Motion Rules ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum MotionRule {
    /// Keep the current speed.
    Constant,
    /// Integrate a fixed acceleration (px/s^2), clamped to the profile's
    /// speed band.
    Linear { accel: f64 },
    /// Acceleration scaled by local path curvature.
    Curvature { accel: f64 },
    KeepDistance,
    Drift,
}

impl MotionRule {
    /// Rules that manage their own speed and are never boosted on long wires.
    pub fn is_self_paced(&self) -> bool {
        matches!(self, Self::KeepDistance | Self::Drift)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DriftStep {
    /// Travelled distance (px) between sign flips.
    pub step: f64,
    /// Perpendicular offset magnitude (px).
    pub offset: f64,
}

// ─── KinematicsProfile ───────────────────────────────────────────────────────

/// Immutable movement definition. The compatible rule applies when the
/// destination port shape matches the packet, the incompatible rule
/// otherwise.
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct KinematicsProfile {
    pub name: &'static str,
    pub compatible: MotionRule,
    pub incompatible: MotionRule,
    pub min_mul: f64,
    pub max_mul: f64,
    pub bounce_on_impact: bool,
    /// Minimum pixel gap kept to co-wire neighbours.
    pub keep_distance: Option<f64>,
    pub curvature_factor: f64,
    pub drift: Option<DriftStep>,
    pub slow_near_busy_box: bool,
}

impl KinematicsProfile {
    const fn base(name: &'static str, compatible: MotionRule, incompatible: MotionRule) -> Self {
        Self {
            name,
            compatible,
            incompatible,
            min_mul: 0.5,
            max_mul: 2.0,
            bounce_on_impact: false,
            keep_distance: None,
            curvature_factor: 1.0,
            drift: None,
            slow_near_busy_box: false,
        }
    }

    pub fn rule(&self, compatible: bool) -> MotionRule {
        if compatible {
            self.compatible
        } else {
            self.incompatible
        }
    }
}

// ─── Profile Catalog ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProfileId {
    Square,
    Triangle,
    Circle,
    Confidential,
    ConfidentialVpn,
    Large,
    LargeDrift,
    Bit,
}

/// Candidates for protected packets. One is drawn the first time the
/// packet's strategy is requested.
pub const PROTECTED_CANDIDATES: [ProfileId; 3] =
    [ProfileId::Square, ProfileId::Triangle, ProfileId::Circle];

impl ProfileId {
    pub fn profile(self) -> KinematicsProfile {
        use MotionRule::*;
        match self {
            Self::Square => KinematicsProfile::base("square", Constant, Linear { accel: 40.0 }),
            Self::Triangle => {
                KinematicsProfile::base("triangle", Linear { accel: 25.0 }, Linear { accel: 60.0 })
            }
            Self::Circle => KinematicsProfile {
                bounce_on_impact: true,
                ..KinematicsProfile::base(
                    "circle",
                    Linear { accel: 30.0 },
                    Linear { accel: -30.0 },
                )
            },
            Self::Confidential => KinematicsProfile {
                slow_near_busy_box: true,
                ..KinematicsProfile::base("confidential", Constant, Constant)
            },
            Self::ConfidentialVpn => KinematicsProfile {
                keep_distance: Some(60.0),
                ..KinematicsProfile::base("confidential-vpn", KeepDistance, KeepDistance)
            },
            Self::Large => KinematicsProfile {
                min_mul: 0.8,
                max_mul: 2.5,
                curvature_factor: 1.0,
                ..KinematicsProfile::base(
                    "large",
                    Curvature { accel: 120.0 },
                    Curvature { accel: 120.0 },
                )
            },
            Self::LargeDrift => KinematicsProfile {
                drift: Some(DriftStep { step: 40.0, offset: 6.0 }),
                ..KinematicsProfile::base("large-drift", Drift, Drift)
            },
            Self::Bit => KinematicsProfile::base("bit", Constant, Constant),
        }
    }

    /// Profile a freshly created, undecorated packet of this kind gets.
    pub fn default_for(kind: &PacketKind) -> Self {
        match kind {
            PacketKind::Messenger(Shape::Square) => Self::Square,
            PacketKind::Messenger(Shape::Triangle) => Self::Triangle,
            PacketKind::Messenger(Shape::Circle) => Self::Circle,
            PacketKind::Confidential { vpn: false } => Self::Confidential,
            PacketKind::Confidential { vpn: true } => Self::ConfidentialVpn,
            PacketKind::Large { size } if *size >= 10 => Self::LargeDrift,
            PacketKind::Large { .. } => Self::Large,
            PacketKind::Bit { .. } => Self::Bit,
        }
    }
}

// ─── Registry ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Assignment {
    Fixed(ProfileId),
    /// Resolved to `Fixed` on first lookup.
    Randomized(&'static [ProfileId]),
}

/// Side table from packet identity to movement profile. Entries are
/// dropped explicitly when a packet is destroyed or converted.
#[derive(Debug, Clone, Default)]
pub struct KinematicsRegistry {
    entries: BTreeMap<PacketId, Assignment>,
}

impl KinematicsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(&mut self, packet: PacketId, profile: ProfileId) {
        self.entries.insert(packet, Assignment::Fixed(profile));
    }

    pub fn assign_randomized(&mut self, packet: PacketId, candidates: &'static [ProfileId]) {
        self.entries.insert(packet, Assignment::Randomized(candidates));
    }

    /// The profile already fixed for `packet`, without drawing.
    pub fn fixed(&self, packet: PacketId) -> Option<ProfileId> {
        match self.entries.get(&packet) {
            Some(Assignment::Fixed(id)) => Some(*id),
            _ => None,
        }
    }

    /// Randomized assignment that has not been drawn yet.
    pub fn is_pending(&self, packet: PacketId) -> bool {
        matches!(self.entries.get(&packet), Some(Assignment::Randomized(_)))
    }

    /// Profile for `packet`, drawing a randomized choice on first request
    /// and falling back to the kind's default when nothing was assigned.
    pub fn resolve<R: Rng + ?Sized>(
        &mut self,
        packet: PacketId,
        kind: &PacketKind,
        rng: &mut R,
    ) -> ProfileId {
        let entry = self
            .entries
            .entry(packet)
            .or_insert_with(|| Assignment::Fixed(ProfileId::default_for(kind)));
        match entry {
            Assignment::Fixed(id) => *id,
            Assignment::Randomized(candidates) => {
                let picked = if candidates.is_empty() {
                    ProfileId::default_for(kind)
                } else {
                    candidates[rng.gen_range(0..candidates.len())]
                };
                *entry = Assignment::Fixed(picked);
                picked
            }
        }
    }

    pub fn forget(&mut self, packet: PacketId) {
        self.entries.remove(&packet);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_default_profiles() {
        assert_eq!(
            ProfileId::default_for(&PacketKind::Messenger(Shape::Circle)),
            ProfileId::Circle
        );
        assert_eq!(
            ProfileId::default_for(&PacketKind::Large { size: 10 }),
            ProfileId::LargeDrift
        );
        assert_eq!(ProfileId::default_for(&PacketKind::Large { size: 8 }), ProfileId::Large);
    }

    #[test]
    fn test_circle_bounces() {
        assert!(ProfileId::Circle.profile().bounce_on_impact);
        assert!(!ProfileId::Square.profile().bounce_on_impact);
    }

    #[test]
    fn test_randomized_resolves_once() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut reg = KinematicsRegistry::new();
        let id = PacketId(1);
        reg.assign_randomized(id, &PROTECTED_CANDIDATES);
        assert_eq!(reg.fixed(id), None);
        let kind = PacketKind::Messenger(Shape::Square);
        let first = reg.resolve(id, &kind, &mut rng);
        assert!(PROTECTED_CANDIDATES.contains(&first));
        for _ in 0..20 {
            assert_eq!(reg.resolve(id, &kind, &mut rng), first);
        }
        assert_eq!(reg.fixed(id), Some(first));
    }

    #[test]
    fn test_unassigned_falls_back_to_default() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let mut reg = KinematicsRegistry::new();
        let kind = PacketKind::Confidential { vpn: true };
        assert_eq!(reg.resolve(PacketId(5), &kind, &mut rng), ProfileId::ConfidentialVpn);
        reg.forget(PacketId(5));
        assert!(reg.is_empty());
    }
}
