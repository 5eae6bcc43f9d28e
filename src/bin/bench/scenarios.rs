// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Packet Flow Engine - Bench Scenarios

use glam::DVec2;
use packet_flow_engine::{
    BehaviorKind, BoxId, NetworkError, PacketKind, PortDirection, Shape, World,
};

// ─── Scenario Configuration ─────────────────────────────────────────────────

pub struct Scenario {
    pub name: &'static str,
    pub label: &'static str,
    pub category: &'static str,
    /// Simulated seconds per run.
    pub seconds: f64,
    pub impact_waves: bool,
    pub setup: fn(&mut World) -> Result<(), NetworkError>,
    pub criteria: PassCriteria,
}

pub struct PassCriteria {
    pub min_score: u64,
    pub max_loss_ratio: Option<f64>,
    pub require_closed_groups: bool,
}

impl Default for PassCriteria {
    fn default() -> Self {
        Self {
            min_score: 1,
            max_loss_ratio: None,
            require_closed_groups: false,
        }
    }
}

// ─── Builders ───────────────────────────────────────────────────────────────

const BOX: DVec2 = DVec2::new(60.0, 60.0);

fn node(world: &mut World, x: f64, y: f64, kind: BehaviorKind) -> BoxId {
    world.add_box(DVec2::new(x, y), BOX, kind)
}

/// Vertical offset for the next port on one side of a box.
fn port_slot(world: &World, owner: BoxId, direction: PortDirection) -> f64 {
    let taken = world.system_box(owner).map_or(0, |b| match direction {
        PortDirection::Input => b.inputs.len(),
        PortDirection::Output => b.outputs.len(),
    });
    -15.0 + 30.0 * taken as f64
}

/// Output port on `from`, input port on `to`, one wire between them.
fn lane(
    world: &mut World,
    from: BoxId,
    to: BoxId,
    out_shape: Shape,
    in_shape: Shape,
    bends: &[DVec2],
) -> Result<(), NetworkError> {
    let dy = port_slot(world, from, PortDirection::Output);
    let out = world.add_port(from, out_shape, PortDirection::Output, DVec2::new(30.0, dy))?;
    let dy = port_slot(world, to, PortDirection::Input);
    let inp = world.add_port(to, in_shape, PortDirection::Input, DVec2::new(-30.0, dy))?;
    world.connect(out, inp, bends)?;
    Ok(())
}

fn messengers() -> Vec<PacketKind> {
    vec![
        PacketKind::Messenger(Shape::Square),
        PacketKind::Messenger(Shape::Triangle),
        PacketKind::Messenger(Shape::Circle),
    ]
}

// ─── Networks ───────────────────────────────────────────────────────────────

fn straight_line(world: &mut World) -> Result<(), NetworkError> {
    let src = node(world, 0.0, 0.0, BehaviorKind::Normal);
    let mid = node(world, 300.0, 0.0, BehaviorKind::Normal);
    let sink = node(world, 600.0, 0.0, BehaviorKind::Normal);
    lane(world, src, mid, Shape::Square, Shape::Square, &[])?;
    lane(world, mid, sink, Shape::Square, Shape::Square, &[])?;
    world.add_producer(src, messengers(), 0.5, None)
}

fn hostile_route(world: &mut World) -> Result<(), NetworkError> {
    let src = node(world, 0.0, 0.0, BehaviorKind::Normal);
    let vpn = node(world, 250.0, 0.0, BehaviorKind::Vpn);
    let bad = node(world, 500.0, 0.0, BehaviorKind::Malicious);
    let guard = node(world, 750.0, 40.0, BehaviorKind::AntiTrojan);
    let sink = node(world, 1000.0, 0.0, BehaviorKind::Normal);
    lane(world, src, vpn, Shape::Square, Shape::Square, &[])?;
    lane(world, vpn, bad, Shape::Triangle, Shape::Triangle, &[])?;
    lane(world, bad, guard, Shape::Circle, Shape::Circle, &[DVec2::new(620.0, 60.0)])?;
    lane(world, guard, sink, Shape::Square, Shape::Square, &[])?;
    world.add_producer(
        src,
        vec![
            PacketKind::Messenger(Shape::Square),
            PacketKind::Confidential { vpn: false },
            PacketKind::Messenger(Shape::Circle),
        ],
        0.6,
        None,
    )
}

fn spy_pair(world: &mut World) -> Result<(), NetworkError> {
    let src = node(world, 0.0, 0.0, BehaviorKind::Normal);
    let spy_a = node(world, 250.0, -100.0, BehaviorKind::Spy);
    let spy_b = node(world, 250.0, 100.0, BehaviorKind::Spy);
    let sink = node(world, 550.0, 0.0, BehaviorKind::Normal);
    lane(world, src, spy_a, Shape::Square, Shape::Square, &[])?;
    lane(world, spy_b, sink, Shape::Circle, Shape::Circle, &[])?;
    world.add_producer(
        src,
        vec![
            PacketKind::Messenger(Shape::Square),
            PacketKind::Messenger(Shape::Triangle),
            PacketKind::Confidential { vpn: false },
        ],
        0.7,
        None,
    )
}

fn split_merge(world: &mut World) -> Result<(), NetworkError> {
    let src = node(world, 0.0, 0.0, BehaviorKind::Normal);
    let dist = node(world, 300.0, 0.0, BehaviorKind::Distributor);
    let merge = node(world, 650.0, 0.0, BehaviorKind::Merger);
    let sink = node(world, 950.0, 0.0, BehaviorKind::Normal);
    lane(world, src, dist, Shape::Square, Shape::Square, &[])?;
    lane(world, dist, merge, Shape::Square, Shape::Square, &[DVec2::new(480.0, -80.0)])?;
    lane(world, dist, merge, Shape::Circle, Shape::Circle, &[DVec2::new(480.0, 80.0)])?;
    lane(world, merge, sink, Shape::Square, Shape::Square, &[])?;
    world.add_producer(
        src,
        vec![PacketKind::Large { size: 8 }, PacketKind::Large { size: 10 }],
        3.0,
        Some(6),
    )
}

fn crossfire(world: &mut World) -> Result<(), NetworkError> {
    let west = node(world, 0.0, -150.0, BehaviorKind::Normal);
    let east = node(world, 0.0, 150.0, BehaviorKind::Normal);
    let sink_a = node(world, 500.0, 150.0, BehaviorKind::Normal);
    let sink_b = node(world, 500.0, -150.0, BehaviorKind::Normal);
    lane(world, west, sink_a, Shape::Square, Shape::Square, &[DVec2::new(250.0, 0.0)])?;
    lane(world, east, sink_b, Shape::Circle, Shape::Circle, &[DVec2::new(250.0, 0.0)])?;
    world.add_producer(west, messengers(), 0.25, None)?;
    world.add_producer(east, messengers(), 0.25, None)
}

// ─── Registry ───────────────────────────────────────────────────────────────

pub fn scenarios() -> Vec<Scenario> {
    vec![
        Scenario {
            name: "LINE_DELIVERY",
            label: "Straight line delivery",
            category: "baseline",
            seconds: 30.0,
            impact_waves: false,
            setup: straight_line,
            criteria: PassCriteria {
                max_loss_ratio: Some(0.05),
                ..Default::default()
            },
        },
        Scenario {
            name: "HOSTILE_ROUTE",
            label: "VPN, malicious and anti-trojan",
            category: "behaviors",
            seconds: 40.0,
            impact_waves: false,
            setup: hostile_route,
            criteria: PassCriteria::default(),
        },
        Scenario {
            name: "SPY_PAIR",
            label: "Teleport through a spy pair",
            category: "behaviors",
            seconds: 30.0,
            impact_waves: false,
            setup: spy_pair,
            criteria: PassCriteria::default(),
        },
        Scenario {
            name: "SPLIT_MERGE",
            label: "Distributor to merger",
            category: "groups",
            seconds: 40.0,
            impact_waves: false,
            setup: split_merge,
            criteria: PassCriteria {
                require_closed_groups: true,
                ..Default::default()
            },
        },
        Scenario {
            name: "CROSSFIRE",
            label: "Crossing wires under impact waves",
            category: "collision",
            seconds: 30.0,
            impact_waves: true,
            setup: crossfire,
            criteria: PassCriteria {
                min_score: 0,
                ..Default::default()
            },
        },
    ]
}
