// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Packet Flow Engine - Anti-Trojan Behavior

use tracing::debug;

use super::NodeBehavior;
use crate::network::World;
use crate::types::{BehaviorKind, BoxId, PacketId, PortId};

/// Cleans infected packets: always in its own buffer, and on nearby wires
/// once per cooldown.
#[derive(Debug)]
pub struct AntiTrojanBehavior {
    owner: BoxId,
    cooldown: f64,
}

impl AntiTrojanBehavior {
    pub fn new(owner: BoxId) -> Self {
        Self { owner, cooldown: 0.0 }
    }

    /// First infected packet on any wire within `radius` of the box.
    fn find_nearby(&self, world: &World, radius: f64) -> Option<PacketId> {
        let centre = world.system_box(self.owner)?.position;
        world
            .wires()
            .flat_map(|w| w.packets().iter().copied())
            .find(|&id| {
                world.packet(id).is_some_and(|p| p.is_trojan())
                    && world
                        .packet_position(id)
                        .is_some_and(|pos| pos.distance(centre) <= radius)
            })
    }
}

impl NodeBehavior for AntiTrojanBehavior {
    fn kind(&self) -> BehaviorKind {
        BehaviorKind::AntiTrojan
    }

    fn on_packet_enqueued(&mut self, world: &mut World, packet: PacketId, _entered: Option<PortId>) {
        if world.packet(packet).is_some_and(|p| p.is_trojan()) {
            if let Some(clean) = world.revert(packet) {
                debug!(packet = %packet, clean = %clean, box_id = %self.owner, "buffered trojan cleaned");
                self.cooldown = world.config.behavior.anti_trojan_cooldown;
            }
        }
    }

    fn update(&mut self, world: &mut World, dt: f64) {
        if self.cooldown > 0.0 {
            self.cooldown = (self.cooldown - dt).max(0.0);
            return;
        }
        if !world.system_box(self.owner).is_some_and(|b| b.enabled) {
            return;
        }
        let radius = world.config.behavior.anti_trojan_radius;
        let Some(target) = self.find_nearby(world, radius) else {
            return;
        };
        if let Some(clean) = world.revert(target) {
            debug!(packet = %target, clean = %clean, box_id = %self.owner, "wire trojan cleaned");
            self.cooldown = world.config.behavior.anti_trojan_cooldown;
        }
    }

    fn cooldown(&self) -> f64 {
        self.cooldown
    }

    fn set_cooldown(&mut self, seconds: f64) {
        self.cooldown = seconds.max(0.0);
    }
}
