// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Packet Flow Engine - Distributor Behavior

use tracing::info;

use super::NodeBehavior;
use crate::kinematics::ProfileId;
use crate::network::World;
use crate::types::{BehaviorKind, BoxId, PacketId, PacketKind, PortId};

/// Splits each large packet into unit fragments sharing a new group.
#[derive(Debug)]
pub struct DistributorBehavior {
    owner: BoxId,
}

impl DistributorBehavior {
    pub fn new(owner: BoxId) -> Self {
        Self { owner }
    }
}

/// Replace a buffered large packet with `size` fragments. Fragments the
/// buffer cannot take are lost and reported to the group.
pub fn split(world: &mut World, owner: BoxId, packet: PacketId) -> Option<Vec<PacketId>> {
    let size = match world.packet(packet)?.kind {
        PacketKind::Large { size } => size,
        _ => return None,
    };
    world.destroy_packet(packet)?;
    let group = world.groups.create(size);
    let mut fragments = Vec::with_capacity(size as usize);
    let mut overflow = 0u32;
    for index in 0..size {
        let id = world.spawn_packet(PacketKind::Bit { group, index });
        world.kinematics.assign(id, ProfileId::Bit);
        if world.enqueue(owner, id, None) {
            fragments.push(id);
        } else {
            overflow += 1;
            world.lose_packet(id);
        }
    }
    info!(packet = %packet, group = %group, size, overflow, box_id = %owner, "large packet split");
    Some(fragments)
}

impl NodeBehavior for DistributorBehavior {
    fn kind(&self) -> BehaviorKind {
        BehaviorKind::Distributor
    }

    fn on_packet_enqueued(&mut self, world: &mut World, packet: PacketId, _entered: Option<PortId>) {
        split(world, self.owner, packet);
    }
}
