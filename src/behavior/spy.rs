// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Packet Flow Engine - Spy Behavior

use rand::seq::SliceRandom;
use tracing::debug;

use super::NodeBehavior;
use crate::network::World;
use crate::types::{BehaviorKind, BoxId, PacketId, PortId};

/// Drops confidential traffic and teleports everything else to another spy.
#[derive(Debug)]
pub struct SpyBehavior {
    owner: BoxId,
}

impl SpyBehavior {
    pub fn new(owner: BoxId) -> Self {
        Self { owner }
    }
}

impl NodeBehavior for SpyBehavior {
    fn kind(&self) -> BehaviorKind {
        BehaviorKind::Spy
    }

    fn on_packet_enqueued(&mut self, world: &mut World, packet: PacketId, _entered: Option<PortId>) {
        let Some((protected, confidential)) = world
            .packet(packet)
            .map(|p| (p.is_protected(), p.kind.is_confidential()))
        else {
            return;
        };
        if protected {
            return;
        }
        if world.hints.teleported.remove(&packet) {
            return;
        }
        if confidential {
            debug!(packet = %packet, box_id = %self.owner, "confidential packet intercepted");
            world.lose_packet(packet);
            return;
        }
        let others: Vec<BoxId> = world
            .behaviors
            .boxes_of_kind(BehaviorKind::Spy)
            .into_iter()
            .filter(|&id| id != self.owner)
            .collect();
        let Some(&target) = others.choose(&mut world.rng) else {
            return;
        };
        world.hints.teleported.insert(packet);
        if world.enqueue(target, packet, None) {
            debug!(packet = %packet, from = %self.owner, to = %target, "packet teleported");
        } else {
            world.lose_packet(packet);
        }
    }
}
