// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Packet Flow Engine - Dispatch

use tracing::{debug, trace};

use crate::network::World;
use crate::scheduler::Tickable;
use crate::types::{BehaviorKind, BoxId, PacketId, PortId, Shape, WireId};

#[derive(Debug, Clone, Copy)]
struct OpenPort {
    port: PortId,
    shape: Shape,
    wire: WireId,
}

/// One dispatch pass: producers emit, behaviors see every new arrival,
/// sinks consume and every other enabled box launches onto free outputs.
pub fn run(world: &mut World, dt: f64) {
    world.flush_notifications();
    produce(world, dt);
    world.flush_notifications();
    let ids: Vec<BoxId> = world.boxes.keys().copied().collect();
    for id in ids {
        dispatch_box(world, id);
    }
}

/// Advance producer timers and emit due packets. A full buffer holds the
/// emission until there is room.
pub fn produce(world: &mut World, dt: f64) {
    let ids: Vec<BoxId> = world.producers.keys().copied().collect();
    for id in ids {
        if !world.boxes.get(&id).is_some_and(|b| b.enabled) {
            continue;
        }
        let Some(producer) = world.producers.get_mut(&id) else {
            continue;
        };
        producer.timer += dt;
        loop {
            let Some(producer) = world.producers.get_mut(&id) else {
                break;
            };
            if producer.exhausted() {
                producer.timer = 0.0;
                break;
            }
            if producer.timer < producer.interval {
                break;
            }
            let Some(kind) = producer.next_kind() else {
                break;
            };
            if world.boxes.get(&id).map_or(true, |b| b.is_full()) {
                break;
            }
            if world.inject(id, kind).is_none() {
                break;
            }
            if let Some(producer) = world.producers.get_mut(&id) {
                producer.emitted += 1;
                producer.timer -= producer.interval;
                trace!(box_id = %id, emitted = producer.emitted, "packet produced");
            }
        }
    }
}

fn open_ports(world: &World, owner: BoxId) -> Vec<OpenPort> {
    let Some(b) = world.boxes.get(&owner) else {
        return Vec::new();
    };
    let gap = world.config.network.launch_gap;
    b.outputs
        .iter()
        .filter_map(|pid| {
            let port = world.ports.get(pid)?;
            let wire = world.wires.get(&port.wire?)?;
            let length = wire.length();
            let clear = wire.packets().iter().all(|id| {
                world
                    .packets
                    .get(id)
                    .map_or(true, |p| p.progress * length >= gap)
            });
            clear.then_some(OpenPort {
                port: port.id,
                shape: port.shape,
                wire: wire.id,
            })
        })
        .collect()
}

/// Drain one box. Each output takes at most one packet per call.
pub fn dispatch_box(world: &mut World, owner: BoxId) {
    let Some(b) = world.boxes.get(&owner) else {
        return;
    };
    if !b.enabled {
        return;
    }
    let queued: Vec<PacketId> = b.buffer().collect();
    if b.is_sink() {
        for id in queued {
            world.deliver_to_sink(owner, id);
        }
        return;
    }
    let retain_fragments = world.behaviors.kind_of(owner) == Some(BehaviorKind::Merger);
    let mut open = open_ports(world, owner);

    for id in queued {
        if open.is_empty() {
            break;
        }
        let Some(packet) = world.packets.get(&id) else {
            continue;
        };
        if retain_fragments && packet.kind.is_fragment() {
            continue;
        }
        let shape = packet.shape();
        let forced = world.hints.force_incompatible.contains(&id);
        let pick = open
            .iter()
            .position(|p| (p.shape == shape) != forced)
            .unwrap_or(0);
        let target = open.remove(pick);
        if world.attach_to_wire(id, target.wire) {
            if forced {
                world.hints.force_incompatible.remove(&id);
            }
            debug!(
                packet = %id,
                box_id = %owner,
                port = %target.port,
                compatible = target.shape == shape,
                "packet dispatched"
            );
        }
    }
}

// ─── Tick Stage ──────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct DispatchStage;

impl Tickable for DispatchStage {
    fn name(&self) -> &'static str {
        "dispatch"
    }

    fn update(&mut self, world: &mut World, dt: f64) {
        run(world, dt);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::packet::Location;
    use crate::types::{PacketKind, PortDirection, SimEvent};
    use glam::DVec2;

    struct Fork {
        world: World,
        hub: BoxId,
        square_wire: WireId,
        circle_wire: WireId,
    }

    fn fork() -> Fork {
        let mut world = World::new(SimConfig::default());
        let hub = world.add_box(DVec2::ZERO, DVec2::splat(40.0), BehaviorKind::Normal);
        let left = world.add_box(DVec2::new(200.0, -100.0), DVec2::splat(40.0), BehaviorKind::Normal);
        let right = world.add_box(DVec2::new(200.0, 100.0), DVec2::splat(40.0), BehaviorKind::Normal);
        world.add_port(hub, Shape::Square, PortDirection::Input, DVec2::new(-20.0, 0.0)).unwrap();
        let sq_out = world.add_port(hub, Shape::Square, PortDirection::Output, DVec2::new(20.0, -10.0)).unwrap();
        let ci_out = world.add_port(hub, Shape::Circle, PortDirection::Output, DVec2::new(20.0, 10.0)).unwrap();
        let sq_in = world.add_port(left, Shape::Square, PortDirection::Input, DVec2::ZERO).unwrap();
        let ci_in = world.add_port(right, Shape::Circle, PortDirection::Input, DVec2::ZERO).unwrap();
        let square_wire = world.connect(sq_out, sq_in, &[]).unwrap();
        let circle_wire = world.connect(ci_out, ci_in, &[]).unwrap();
        Fork { world, hub, square_wire, circle_wire }
    }

    #[test]
    fn test_prefers_compatible_port() {
        let mut f = fork();
        let id = f.world.inject(f.hub, PacketKind::Messenger(Shape::Circle)).unwrap();
        dispatch_box(&mut f.world, f.hub);
        assert_eq!(f.world.packet(id).unwrap().location, Location::Wire(f.circle_wire));
    }

    #[test]
    fn test_forced_hint_takes_incompatible_port_once() {
        let mut f = fork();
        let id = f.world.inject(f.hub, PacketKind::Messenger(Shape::Circle)).unwrap();
        f.world.hints.force_incompatible.insert(id);
        dispatch_box(&mut f.world, f.hub);
        assert_eq!(f.world.packet(id).unwrap().location, Location::Wire(f.square_wire));
        assert!(!f.world.is_forced_incompatible(id));
    }

    #[test]
    fn test_one_packet_per_output_per_pass() {
        let mut f = fork();
        for _ in 0..4 {
            f.world.inject(f.hub, PacketKind::Messenger(Shape::Square)).unwrap();
        }
        dispatch_box(&mut f.world, f.hub);
        assert_eq!(f.world.system_box(f.hub).unwrap().buffered(), 2);
        // Both wires now have a packet at their start.
        dispatch_box(&mut f.world, f.hub);
        assert_eq!(f.world.system_box(f.hub).unwrap().buffered(), 2);
    }

    #[test]
    fn test_disabled_box_holds_packets() {
        let mut f = fork();
        f.world.inject(f.hub, PacketKind::Messenger(Shape::Square)).unwrap();
        f.world.disable_box(f.hub, 1.0);
        dispatch_box(&mut f.world, f.hub);
        assert_eq!(f.world.system_box(f.hub).unwrap().buffered(), 1);
    }

    #[test]
    fn test_sink_awards_coins_and_score() {
        let mut world = World::new(SimConfig::default());
        let sink = world.add_box(DVec2::ZERO, DVec2::splat(40.0), BehaviorKind::Normal);
        world.add_port(sink, Shape::Square, PortDirection::Input, DVec2::ZERO).unwrap();
        world.inject(sink, PacketKind::Messenger(Shape::Triangle)).unwrap();
        world.inject(sink, PacketKind::Confidential { vpn: false }).unwrap();
        dispatch_box(&mut world, sink);
        let c = world.counters();
        assert_eq!(c.coins, 3 + 3);
        assert_eq!(c.score, 3 + 4);
        let delivered = world
            .take_events()
            .iter()
            .filter(|e| matches!(e, SimEvent::PacketDelivered { .. }))
            .count();
        assert_eq!(delivered, 2);
    }

    #[test]
    fn test_producer_emits_on_interval_and_respects_limit() {
        let mut world = World::new(SimConfig::default());
        let src = world.add_box(DVec2::ZERO, DVec2::splat(40.0), BehaviorKind::Normal);
        world
            .add_producer(src, vec![PacketKind::Messenger(Shape::Square)], 1.0, Some(3))
            .unwrap();
        produce(&mut world, 0.5);
        assert_eq!(world.producer(src).unwrap().emitted, 0);
        produce(&mut world, 0.6);
        assert_eq!(world.producer(src).unwrap().emitted, 1);
        produce(&mut world, 5.0);
        assert_eq!(world.producer(src).unwrap().emitted, 3);
        assert_eq!(world.system_box(src).unwrap().buffered(), 3);
    }

    #[test]
    fn test_producer_holds_when_full() {
        let mut world = World::new(SimConfig::default());
        let src = world.add_box(DVec2::ZERO, DVec2::splat(40.0), BehaviorKind::Normal);
        world
            .add_producer(src, vec![PacketKind::Messenger(Shape::Circle)], 0.1, None)
            .unwrap();
        produce(&mut world, 10.0);
        assert_eq!(world.producer(src).unwrap().emitted, 5);
        assert_eq!(world.counters().loss, 0);
    }
}
