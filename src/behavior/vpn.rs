// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Packet Flow Engine - VPN Behavior

use tracing::{debug, info};

use super::NodeBehavior;
use crate::network::World;
use crate::packet::Location;
use crate::types::{BehaviorKind, BoxId, Decoration, PacketId, PortId};

/// Shields ordinary packets and re-tags confidential ones. Each shield is
/// tagged with this box in the world's side tables, so it can be withdrawn
/// when the box goes down and is forgotten with the packet.
#[derive(Debug)]
pub struct VpnBehavior {
    owner: BoxId,
}

impl VpnBehavior {
    pub fn new(owner: BoxId) -> Self {
        Self { owner }
    }
}

impl NodeBehavior for VpnBehavior {
    fn kind(&self) -> BehaviorKind {
        BehaviorKind::Vpn
    }

    fn on_packet_enqueued(&mut self, world: &mut World, packet: PacketId, _entered: Option<PortId>) {
        if !world.system_box(self.owner).is_some_and(|b| b.enabled) {
            return;
        }
        let Some((confidential, decoration)) = world
            .packet(packet)
            .map(|p| (p.kind.is_confidential(), p.decoration))
        else {
            return;
        };
        if confidential {
            if world.retag_vpn(packet) {
                debug!(packet = %packet, box_id = %self.owner, "confidential packet re-tagged");
            }
            return;
        }
        if decoration != Decoration::None {
            return;
        }
        if let Some(wrapped) = world.protect(packet) {
            world.hints.vpn_owner.insert(wrapped, self.owner);
        }
    }

    fn on_enabled_changed(&mut self, world: &mut World, enabled: bool) {
        if enabled {
            return;
        }
        let mut reverted = 0usize;
        let mut hinted = 0usize;
        for id in world.shielded_by(self.owner) {
            match world.packet(id).map(|p| p.location) {
                Some(Location::Buffer(_)) | Some(Location::Detached) => {
                    if world.revert(id).is_some() {
                        reverted += 1;
                    }
                }
                Some(Location::Wire(_)) => {
                    world.hints.vpn_owner.remove(&id);
                    world.hints.vpn_revert.insert(id);
                    hinted += 1;
                }
                None => {}
            }
        }
        info!(box_id = %self.owner, reverted, hinted, "vpn disabled");
    }
}
