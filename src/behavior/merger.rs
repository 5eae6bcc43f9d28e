// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Packet Flow Engine - Merger Behavior

use std::collections::BTreeSet;

use tracing::{debug, info};

use super::NodeBehavior;
use crate::groups::Arrival;
use crate::kinematics::ProfileId;
use crate::network::World;
use crate::types::{BehaviorKind, BoxId, GroupId, PacketId, PacketKind, PortId};

/// Collects fragments and reassembles them once their group is complete.
#[derive(Debug)]
pub struct MergerBehavior {
    owner: BoxId,
}

impl MergerBehavior {
    pub fn new(owner: BoxId) -> Self {
        Self { owner }
    }
}

/// Reassemble every buffered fragment of `group`, one large packet per box
/// holding fragments, then close the group. Returns the rebuilt packets.
pub fn merge_group(world: &mut World, group: GroupId) -> Vec<PacketId> {
    let Some(record) = world.groups.get(group) else {
        return Vec::new();
    };
    let holders: BTreeSet<BoxId> = record.arrived.values().copied().collect();
    let mut pieces = Vec::new();
    let mut rebuilt = Vec::new();
    for holder in holders {
        let Some(b) = world.system_box(holder) else {
            continue;
        };
        let fragments: Vec<PacketId> = b
            .buffer()
            .filter(|id| {
                world
                    .packet(*id)
                    .is_some_and(|p| p.kind.fragment_group() == Some(group))
            })
            .collect();
        let Some(&sample) = fragments.first() else {
            continue;
        };
        let profile = world.kinematics.fixed(sample).unwrap_or(ProfileId::Bit);
        for id in &fragments {
            world.destroy_packet(*id);
        }
        let size = fragments.len() as u32;
        pieces.push(size);
        let large = world.spawn_packet(PacketKind::Large { size });
        world.kinematics.assign(large, profile);
        if world.enqueue(holder, large, None) {
            debug!(packet = %large, group = %group, size, box_id = %holder, "fragments merged");
            rebuilt.push(large);
        } else {
            world.lose_packet(large);
        }
    }
    info!(group = %group, pieces = ?pieces, "group reassembled");
    world.close_group(group, &pieces);
    rebuilt
}

impl NodeBehavior for MergerBehavior {
    fn kind(&self) -> BehaviorKind {
        BehaviorKind::Merger
    }

    fn on_packet_enqueued(&mut self, world: &mut World, packet: PacketId, _entered: Option<PortId>) {
        let Some(PacketKind::Bit { group, index }) = world.packet(packet).map(|p| p.kind) else {
            return;
        };
        match world.groups.register_arrival(group, index, self.owner) {
            Arrival::Accepted => {}
            Arrival::Duplicate | Arrival::Unknown => {
                debug!(packet = %packet, group = %group, box_id = %self.owner, "stray fragment dropped");
                world.lose_packet(packet);
            }
        }
    }

    fn update(&mut self, world: &mut World, _dt: f64) {
        for group in world.groups.ready_groups() {
            merge_group(world, group);
        }
    }
}
