// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Packet Flow Engine - Node Behaviors

use std::collections::BTreeMap;

use crate::network::World;
use crate::scheduler::Tickable;
use crate::types::{BehaviorKind, BoxId, PacketId, PortId};

pub mod anti_trojan;
pub mod distributor;
pub mod malicious;
pub mod merger;
pub mod spy;
pub mod vpn;

pub use anti_trojan::AntiTrojanBehavior;
pub use distributor::DistributorBehavior;
pub use malicious::MaliciousBehavior;
pub use merger::MergerBehavior;
pub use spy::SpyBehavior;
pub use vpn::VpnBehavior;

/// Per-box reaction to packets landing in its buffer and to the box being
/// switched on or off. Every hook defaults to a no-op.
///
/// The behavior is taken out of the registry while a hook runs, so it may
/// freely mutate the world, including enqueueing into other boxes.
pub trait NodeBehavior {
    fn kind(&self) -> BehaviorKind;

    fn on_packet_enqueued(&mut self, _world: &mut World, _packet: PacketId, _entered: Option<PortId>) {}

    fn on_enabled_changed(&mut self, _world: &mut World, _enabled: bool) {}

    /// Periodic work (cooldowns, merges), once per tick.
    fn update(&mut self, _world: &mut World, _dt: f64) {}

    /// Seconds left on the behavior's cooldown. Snapshots carry it so a
    /// replay makes the same decisions.
    fn cooldown(&self) -> f64 {
        0.0
    }

    fn set_cooldown(&mut self, _seconds: f64) {}
}

#[derive(Debug, Default)]
pub struct NormalBehavior;

impl NodeBehavior for NormalBehavior {
    fn kind(&self) -> BehaviorKind {
        BehaviorKind::Normal
    }
}

pub fn create(kind: BehaviorKind, owner: BoxId) -> Box<dyn NodeBehavior> {
    match kind {
        BehaviorKind::Normal => Box::new(NormalBehavior),
        BehaviorKind::Vpn => Box::new(VpnBehavior::new(owner)),
        BehaviorKind::Spy => Box::new(SpyBehavior::new(owner)),
        BehaviorKind::Malicious => Box::new(MaliciousBehavior::new(owner)),
        BehaviorKind::AntiTrojan => Box::new(AntiTrojanBehavior::new(owner)),
        BehaviorKind::Distributor => Box::new(DistributorBehavior::new(owner)),
        BehaviorKind::Merger => Box::new(MergerBehavior::new(owner)),
    }
}

// ─── Registry ────────────────────────────────────────────────────────────────

/// Behaviors keyed by box. The kind map stays populated while an instance
/// is checked out, so a running behavior can still enumerate its siblings.
#[derive(Default)]
pub struct BehaviorRegistry {
    slots: BTreeMap<BoxId, Option<Box<dyn NodeBehavior>>>,
    kinds: BTreeMap<BoxId, BehaviorKind>,
}

impl BehaviorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, owner: BoxId, kind: BehaviorKind, behavior: Box<dyn NodeBehavior>) {
        self.slots.insert(owner, Some(behavior));
        self.kinds.insert(owner, kind);
    }

    pub fn kind_of(&self, owner: BoxId) -> Option<BehaviorKind> {
        self.kinds.get(&owner).copied()
    }

    pub fn boxes_of_kind(&self, kind: BehaviorKind) -> Vec<BoxId> {
        self.kinds
            .iter()
            .filter(|(_, k)| **k == kind)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn box_ids(&self) -> Vec<BoxId> {
        self.slots.keys().copied().collect()
    }

    /// Cooldown of the behavior at `owner`; zero while it is checked out.
    pub fn cooldown_of(&self, owner: BoxId) -> f64 {
        self.slots
            .get(&owner)
            .and_then(Option::as_ref)
            .map_or(0.0, |b| b.cooldown())
    }

    pub(crate) fn set_cooldown(&mut self, owner: BoxId, seconds: f64) {
        if let Some(Some(behavior)) = self.slots.get_mut(&owner) {
            behavior.set_cooldown(seconds);
        }
    }

    pub(crate) fn take(&mut self, owner: BoxId) -> Option<Box<dyn NodeBehavior>> {
        self.slots.get_mut(&owner).and_then(Option::take)
    }

    pub(crate) fn restore(&mut self, owner: BoxId, behavior: Box<dyn NodeBehavior>) {
        if let Some(slot) = self.slots.get_mut(&owner) {
            *slot = Some(behavior);
        }
    }
}

// ─── Tick Stage ──────────────────────────────────────────────────────────────

/// Runs pending notifications, periodic behavior work and box re-enable
/// timers.
#[derive(Debug, Default)]
pub struct BehaviorStage;

impl Tickable for BehaviorStage {
    fn name(&self) -> &'static str {
        "behaviors"
    }

    fn update(&mut self, world: &mut World, dt: f64) {
        world.flush_notifications();
        world.update_behaviors(dt);
        world.flush_notifications();
        world.tick_box_timers(dt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_keeps_kind_while_checked_out() {
        let mut reg = BehaviorRegistry::new();
        reg.register(BoxId(1), BehaviorKind::Spy, create(BehaviorKind::Spy, BoxId(1)));
        reg.register(BoxId(2), BehaviorKind::Spy, create(BehaviorKind::Spy, BoxId(2)));
        reg.register(BoxId(3), BehaviorKind::Normal, create(BehaviorKind::Normal, BoxId(3)));
        let taken = reg.take(BoxId(1)).unwrap();
        assert!(reg.take(BoxId(1)).is_none());
        assert_eq!(reg.boxes_of_kind(BehaviorKind::Spy), vec![BoxId(1), BoxId(2)]);
        reg.restore(BoxId(1), taken);
        assert_eq!(reg.take(BoxId(1)).map(|b| b.kind()), Some(BehaviorKind::Spy));
    }
}
