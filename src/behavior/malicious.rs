// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Packet Flow Engine - Malicious Behavior

use rand::Rng;
use tracing::debug;

use super::NodeBehavior;
use crate::network::World;
use crate::types::{BehaviorKind, BoxId, PacketId, PortId};

#[derive(Debug)]
pub struct MaliciousBehavior {
    owner: BoxId,
}

impl MaliciousBehavior {
    pub fn new(owner: BoxId) -> Self {
        Self { owner }
    }
}

impl NodeBehavior for MaliciousBehavior {
    fn kind(&self) -> BehaviorKind {
        BehaviorKind::Malicious
    }

    fn on_packet_enqueued(&mut self, world: &mut World, packet: PacketId, _entered: Option<PortId>) {
        let Some(p) = world.packets.get_mut(&packet) else {
            return;
        };
        if p.is_protected() {
            return;
        }
        if p.noise == 0.0 {
            p.noise = 1.0;
        }
        let already = p.is_trojan();
        let probability = world.config.behavior.infection_probability;
        let probability = if probability.is_nan() { 0.0 } else { probability.clamp(0.0, 1.0) };
        let mut target = packet;
        if !already && world.rng.gen_bool(probability) {
            if let Some(infected) = world.infect(packet) {
                debug!(packet = %packet, infected = %infected, box_id = %self.owner, "packet infected");
                target = infected;
            }
        }
        world.hints.force_incompatible.insert(target);
    }
}
