// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Packet Flow Engine - Motion Engine

use tracing::{debug, info};

use crate::config::MotionTuning;
use crate::kinematics::{KinematicsProfile, MotionRule};
use crate::network::World;
use crate::packet::Location;
use crate::scheduler::Tickable;
use crate::types::{BoxId, PacketId, PortId, WireId};

// ─── Speed Strategies ────────────────────────────────────────────────────────

/// Everything a speed rule may look at for one packet this tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionContext {
    pub base_speed: f64,
    pub progress: f64,
    pub wire_length: f64,
    /// `1 - cos` of the local bend angle.
    pub curvature: f64,
    /// A co-wire packet sits within the keep-distance gap ahead.
    pub crowded_ahead: bool,
    /// A co-wire packet sits within the keep-distance gap behind.
    pub crowded_behind: bool,
}

pub trait SpeedRule {
    fn next_speed(&self, ctx: &MotionContext, speed: f64, dt: f64) -> f64;
}

/// One profile rule applied within the profile's speed band.
pub struct BaseRule {
    pub rule: MotionRule,
    pub profile: KinematicsProfile,
    pub keep_distance_min: f64,
}

impl SpeedRule for BaseRule {
    fn next_speed(&self, ctx: &MotionContext, speed: f64, dt: f64) -> f64 {
        let lo = ctx.base_speed * self.profile.min_mul;
        let hi = ctx.base_speed * self.profile.max_mul;
        match self.rule {
            MotionRule::Constant => speed,
            MotionRule::Linear { accel } => (speed + accel * dt).clamp(lo, hi),
            MotionRule::Curvature { accel } => {
                let a = accel * self.profile.curvature_factor * ctx.curvature;
                (speed + a * dt).clamp(lo, hi)
            }
            MotionRule::KeepDistance => {
                let next = if ctx.crowded_ahead {
                    speed * 0.5
                } else if ctx.crowded_behind {
                    speed * 1.5
                } else {
                    ctx.base_speed
                };
                next.clamp(self.keep_distance_min, 2.0 * ctx.base_speed)
            }
            MotionRule::Drift => ctx.base_speed,
        }
    }
}

/// Keeps accelerating on long wires up to a higher ceiling.
pub struct LongWireBoost<R> {
    pub inner: R,
    pub accel: f64,
    /// Multiple of base speed.
    pub ceiling: f64,
}

impl<R: SpeedRule> SpeedRule for LongWireBoost<R> {
    fn next_speed(&self, ctx: &MotionContext, speed: f64, dt: f64) -> f64 {
        let inner = self.inner.next_speed(ctx, speed, dt);
        let ceiling = ctx.base_speed * self.ceiling;
        if inner >= ceiling {
            return inner;
        }
        (inner.max(speed) + self.accel * dt).min(ceiling)
    }
}

/// Caps speed once the packet is inside the approach zone.
pub struct ApproachLimiter<R> {
    pub inner: R,
    pub zone: f64,
    /// Multiple of base speed.
    pub cap: f64,
}

impl<R: SpeedRule> SpeedRule for ApproachLimiter<R> {
    fn next_speed(&self, ctx: &MotionContext, speed: f64, dt: f64) -> f64 {
        let next = self.inner.next_speed(ctx, speed, dt);
        if ctx.progress >= self.zone {
            next.min(ctx.base_speed * self.cap)
        } else {
            next
        }
    }
}

/// Compose the strategy for one packet: the profile rule, the long-wire
/// boost where it applies, and always the approach limiter.
pub fn build_strategy(
    profile: KinematicsProfile,
    compatible: bool,
    wire_length: f64,
    is_fragment: bool,
    is_messenger: bool,
    tuning: &MotionTuning,
) -> Box<dyn SpeedRule> {
    let rule = profile.rule(compatible);
    let base = BaseRule {
        rule,
        profile,
        keep_distance_min: tuning.keep_distance_min_speed,
    };
    let long = wire_length >= tuning.long_wire_threshold;
    let cap = if long {
        tuning.long_approach_cap
    } else {
        tuning.approach_cap
    };
    if long && !rule.is_self_paced() && !is_fragment {
        let ceiling = if is_messenger {
            tuning.messenger_long_wire_ceiling
        } else {
            tuning.long_wire_ceiling
        };
        Box::new(ApproachLimiter {
            inner: LongWireBoost {
                inner: base,
                accel: tuning.long_wire_accel,
                ceiling,
            },
            zone: tuning.approach_zone,
            cap,
        })
    } else {
        Box::new(ApproachLimiter {
            inner: base,
            zone: tuning.approach_zone,
            cap,
        })
    }
}

// ─── Engine ──────────────────────────────────────────────────────────────────

/// Advance every packet on every wire by `dt`.
pub fn advance(world: &mut World, dt: f64) {
    let wire_ids: Vec<WireId> = world.wires.keys().copied().collect();
    for wire in wire_ids {
        advance_wire(world, wire, dt);
    }
}

fn advance_wire(world: &mut World, wire: WireId, dt: f64) {
    let Some(w) = world.wires.get(&wire) else {
        return;
    };
    let length = w.length();
    if length <= f64::EPSILON {
        return;
    }
    let order: Vec<PacketId> = w.packets().to_vec();
    let dest_port = w.destination;
    let Some(port) = world.ports.get(&dest_port) else {
        return;
    };
    let port_shape = port.shape;
    let dest_box = port.owner;
    let Some(src_box) = world.source_box(wire) else {
        return;
    };
    let (dest_enabled, dest_busy) = world
        .boxes
        .get(&dest_box)
        .map(|b| (b.enabled, b.buffered() > 0))
        .unwrap_or((false, false));

    // Progress at the start of the pass, for keep-distance neighbour checks.
    let starts: Vec<f64> = order
        .iter()
        .filter_map(|id| world.packets.get(id).map(|p| p.progress))
        .collect();
    let tuning = world.config.motion.clone();

    for id in order {
        let Some(packet) = world.packets.get(&id) else {
            continue;
        };
        if packet.location != Location::Wire(wire) {
            continue;
        }
        let kind = packet.kind;
        let compatible = packet.shape() == port_shape;
        let backward = packet.returning || !dest_enabled;
        let profile_id = world.kinematics.resolve(id, &kind, &mut world.rng);
        let profile = profile_id.profile();

        let Some(packet) = world.packets.get_mut(&id) else {
            continue;
        };
        let base_speed = packet.base_speed();
        let progress = packet.progress;

        let (crowded_ahead, crowded_behind) = match profile.keep_distance {
            Some(gap) => {
                let window = gap / length;
                let ahead = starts
                    .iter()
                    .any(|&s| s > progress && s - progress < window);
                let behind = starts
                    .iter()
                    .any(|&s| s < progress && progress - s < window);
                (ahead, behind)
            }
            None => (false, false),
        };

        let ctx = MotionContext {
            base_speed,
            progress,
            wire_length: length,
            curvature: world
                .wires
                .get(&wire)
                .map(|w| w.path().curvature_at(progress, tuning.curvature_sample_px))
                .unwrap_or(0.0),
            crowded_ahead,
            crowded_behind,
        };
        let strategy = build_strategy(
            profile,
            compatible,
            length,
            kind.is_fragment(),
            kind.is_messenger(),
            &tuning,
        );
        let previous = packet.speed;
        let speed = if backward {
            base_speed
        } else {
            strategy.next_speed(&ctx, previous, dt)
        };
        packet.acceleration = if dt > 0.0 { (speed - previous) / dt } else { 0.0 };
        packet.speed = speed;

        let mut step = speed * dt;
        if !backward
            && profile.slow_near_busy_box
            && dest_busy
            && progress >= tuning.approach_zone
        {
            step *= tuning.busy_box_slowdown;
        }
        packet.travelled += step;
        if let Some(drift) = profile.drift {
            let flips = (packet.travelled / drift.step).floor() as u64;
            packet.lateral_offset = if flips % 2 == 0 {
                drift.offset
            } else {
                -drift.offset
            };
        }

        let delta = step / length;
        if backward {
            packet.progress = (progress - delta).max(0.0);
            if packet.progress <= 0.0 {
                arrive_at_source(world, id, src_box);
            }
        } else {
            packet.progress = (progress + delta).min(1.0);
            if packet.progress >= 1.0 {
                arrive_at_destination(world, id, dest_box, dest_port);
            }
        }
    }
}

/// Hand a packet that reached the end of its wire to the destination box.
/// Over-speed entry disables the box; a full buffer pins the packet at the
/// end for a retry next tick.
fn arrive_at_destination(world: &mut World, id: PacketId, dest: BoxId, port: PortId) {
    let Some(speed) = world.packets.get(&id).map(|p| p.speed) else {
        return;
    };
    if world.enqueue(dest, id, Some(port)) {
        debug!(packet = %id, box_id = %dest, speed, "packet arrived");
        if speed > world.config.network.max_entry_speed {
            let duration = world.config.network.disable_duration;
            info!(packet = %id, box_id = %dest, speed, "over-speed entry disables box");
            world.disable_box(dest, duration);
        }
    } else if let Some(p) = world.packets.get_mut(&id) {
        p.progress = 1.0;
    }
}

/// Hand a returning packet back to the box it came from: to the front of
/// the queue if that box has no inputs.
fn arrive_at_source(world: &mut World, id: PacketId, source: BoxId) {
    let front = world
        .boxes
        .get(&source)
        .is_some_and(|b| b.is_source());
    let accepted = if front {
        world.enqueue_front(source, id)
    } else {
        world.enqueue(source, id, None)
    };
    if accepted {
        debug!(packet = %id, box_id = %source, "packet returned to source");
    } else if let Some(p) = world.packets.get_mut(&id) {
        p.progress = 0.0;
    }
}

// ─── Tick Stage ──────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MotionStage;

impl Tickable for MotionStage {
    fn name(&self) -> &'static str {
        "motion"
    }

    fn update(&mut self, world: &mut World, dt: f64) {
        advance(world, dt);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::kinematics::ProfileId;
    use crate::types::{BehaviorKind, PacketKind, PortDirection, Shape};
    use glam::DVec2;

    fn ctx(progress: f64) -> MotionContext {
        MotionContext {
            base_speed: 100.0,
            progress,
            wire_length: 200.0,
            curvature: 0.0,
            crowded_ahead: false,
            crowded_behind: false,
        }
    }

    fn line(world: &mut World, length: f64, dest_shape: Shape) -> (BoxId, BoxId, WireId) {
        let a = world.add_box(DVec2::ZERO, DVec2::splat(20.0), BehaviorKind::Normal);
        let b = world.add_box(DVec2::new(length, 0.0), DVec2::splat(20.0), BehaviorKind::Normal);
        // An input port keeps `a` from counting as a source box.
        world
            .add_port(a, Shape::Square, PortDirection::Input, DVec2::ZERO)
            .unwrap();
        let out = world
            .add_port(a, Shape::Square, PortDirection::Output, DVec2::ZERO)
            .unwrap();
        let inp = world
            .add_port(b, dest_shape, PortDirection::Input, DVec2::ZERO)
            .unwrap();
        let wire = world.connect(out, inp, &[]).unwrap();
        (a, b, wire)
    }

    #[test]
    fn test_linear_clamped_to_band() {
        let rule = BaseRule {
            rule: MotionRule::Linear { accel: 1000.0 },
            profile: ProfileId::Triangle.profile(),
            keep_distance_min: 10.0,
        };
        let next = rule.next_speed(&ctx(0.1), 100.0, 1.0);
        assert!((next - 200.0).abs() < 1e-9);
        let rule = BaseRule {
            rule: MotionRule::Linear { accel: -1000.0 },
            ..rule
        };
        assert!((rule.next_speed(&ctx(0.1), 100.0, 1.0) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_keep_distance_halves_when_crowded_ahead() {
        let rule = BaseRule {
            rule: MotionRule::KeepDistance,
            profile: ProfileId::ConfidentialVpn.profile(),
            keep_distance_min: 10.0,
        };
        let mut c = ctx(0.3);
        c.crowded_ahead = true;
        assert!((rule.next_speed(&c, 100.0, 0.1) - 50.0).abs() < 1e-9);
        c.crowded_ahead = false;
        c.crowded_behind = true;
        assert!((rule.next_speed(&c, 150.0, 0.1) - 200.0).abs() < 1e-9);
        c.crowded_behind = false;
        assert!((rule.next_speed(&c, 37.0, 0.1) - 100.0).abs() < 1e-9);
        c.crowded_ahead = true;
        assert!((rule.next_speed(&c, 12.0, 0.1) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_approach_limiter_caps_near_end() {
        let limiter = ApproachLimiter {
            inner: BaseRule {
                rule: MotionRule::Constant,
                profile: ProfileId::Square.profile(),
                keep_distance_min: 10.0,
            },
            zone: 0.85,
            cap: 1.5,
        };
        assert!((limiter.next_speed(&ctx(0.5), 300.0, 0.1) - 300.0).abs() < 1e-9);
        assert!((limiter.next_speed(&ctx(0.9), 300.0, 0.1) - 150.0).abs() < 1e-9);
    }

    #[test]
    fn test_long_wire_boost_respects_ceiling() {
        let boost = LongWireBoost {
            inner: BaseRule {
                rule: MotionRule::Constant,
                profile: ProfileId::Square.profile(),
                keep_distance_min: 10.0,
            },
            accel: 40.0,
            ceiling: 2.0,
        };
        let mut speed = 100.0;
        for _ in 0..100 {
            speed = boost.next_speed(&ctx(0.1), speed, 0.1);
        }
        assert!((speed - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_constant_packet_reaches_destination() {
        let mut world = World::new(SimConfig::default());
        let (_, b, wire) = line(&mut world, 100.0, Shape::Square);
        let id = world
            .place_on_wire(wire, PacketKind::Messenger(Shape::Square), 0.0)
            .unwrap();
        for _ in 0..20 {
            advance(&mut world, 0.1);
        }
        assert_eq!(world.packet(id).unwrap().location, Location::Buffer(b));
        assert!(world.wire(wire).unwrap().is_empty());
    }

    #[test]
    fn test_full_destination_pins_packet_at_end() {
        let mut world = World::new(SimConfig::default());
        let (_, b, wire) = line(&mut world, 100.0, Shape::Square);
        for _ in 0..5 {
            world.inject(b, PacketKind::Messenger(Shape::Circle)).unwrap();
        }
        let id = world
            .place_on_wire(wire, PacketKind::Messenger(Shape::Square), 0.95)
            .unwrap();
        advance(&mut world, 0.5);
        let p = world.packet(id).unwrap();
        assert_eq!(p.location, Location::Wire(wire));
        assert_eq!(p.progress, 1.0);
    }

    #[test]
    fn test_returning_packet_goes_back_to_source() {
        let mut world = World::new(SimConfig::default());
        let (a, _, wire) = line(&mut world, 100.0, Shape::Square);
        let id = world
            .place_on_wire(wire, PacketKind::Messenger(Shape::Square), 0.2)
            .unwrap();
        world.packets.get_mut(&id).unwrap().returning = true;
        advance(&mut world, 0.1);
        assert!(world.packet(id).unwrap().progress < 0.2);
        for _ in 0..5 {
            advance(&mut world, 0.1);
        }
        let p = world.packet(id).unwrap();
        assert_eq!(p.location, Location::Buffer(a));
        assert!(!p.returning);
    }

    #[test]
    fn test_returning_packet_jumps_queue_at_source_box() {
        let mut world = World::new(SimConfig::default());
        let a = world.add_box(DVec2::ZERO, DVec2::splat(20.0), BehaviorKind::Normal);
        let b = world.add_box(DVec2::new(100.0, 0.0), DVec2::splat(20.0), BehaviorKind::Normal);
        let out = world
            .add_port(a, Shape::Square, PortDirection::Output, DVec2::ZERO)
            .unwrap();
        let inp = world
            .add_port(b, Shape::Square, PortDirection::Input, DVec2::ZERO)
            .unwrap();
        let wire = world.connect(out, inp, &[]).unwrap();
        assert!(world.system_box(a).unwrap().is_source());

        let queued = world.inject(a, PacketKind::Messenger(Shape::Circle)).unwrap();
        let id = world
            .place_on_wire(wire, PacketKind::Messenger(Shape::Square), 0.05)
            .unwrap();
        world.packets.get_mut(&id).unwrap().returning = true;
        advance(&mut world, 0.1);

        let order: Vec<PacketId> = world.system_box(a).unwrap().buffer().collect();
        assert_eq!(order, vec![id, queued]);
        assert!(!world.packet(id).unwrap().returning);
    }

    #[test]
    fn test_disabled_destination_reverses_motion() {
        let mut world = World::new(SimConfig::default());
        let (_, b, wire) = line(&mut world, 100.0, Shape::Square);
        let id = world
            .place_on_wire(wire, PacketKind::Messenger(Shape::Square), 0.5)
            .unwrap();
        world.disable_box(b, 10.0);
        advance(&mut world, 0.1);
        assert!(world.packet(id).unwrap().progress < 0.5);
    }

    #[test]
    fn test_zero_length_wire_is_skipped() {
        let mut world = World::new(SimConfig::default());
        let (_, _, wire) = line(&mut world, 0.0, Shape::Square);
        let id = world
            .place_on_wire(wire, PacketKind::Messenger(Shape::Square), 0.5)
            .unwrap();
        advance(&mut world, 0.1);
        assert_eq!(world.packet(id).unwrap().progress, 0.5);
    }

    #[test]
    fn test_over_speed_entry_disables_box() {
        let mut config = SimConfig::default();
        config.network.max_entry_speed = 50.0;
        let mut world = World::new(config);
        let (_, b, wire) = line(&mut world, 100.0, Shape::Square);
        world
            .place_on_wire(wire, PacketKind::Messenger(Shape::Square), 0.99)
            .unwrap();
        advance(&mut world, 0.1);
        assert!(!world.system_box(b).unwrap().enabled);
    }

    #[test]
    fn test_drift_offset_flips() {
        let mut world = World::new(SimConfig::default());
        let (_, _, wire) = line(&mut world, 1000.0, Shape::Square);
        let id = world
            .place_on_wire(wire, PacketKind::Large { size: 10 }, 0.0)
            .unwrap();
        advance(&mut world, 0.1);
        // 5 px travelled: first step, positive side.
        assert!((world.packet(id).unwrap().lateral_offset - 6.0).abs() < 1e-9);
        for _ in 0..8 {
            advance(&mut world, 0.1);
        }
        // 45 px travelled: flipped.
        assert!((world.packet(id).unwrap().lateral_offset + 6.0).abs() < 1e-9);
    }
}
