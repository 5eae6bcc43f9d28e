// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Packet Flow Engine - Type Definitions

use serde::{Deserialize, Serialize};
use std::fmt;

// ─── Identifiers ─────────────────────────────────────────────────────────────

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident($inner:ty), $prefix:literal) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(pub $inner);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

id_type!(
    /// Stable arena key of a packet. Never reused within a run.
    PacketId(u64),
    "p"
);
id_type!(WireId(u32), "w");
id_type!(PortId(u32), "port");
id_type!(BoxId(u32), "box");
id_type!(
    /// Identity shared by every fragment of one split large packet.
    GroupId(u64),
    "g"
);

// ─── Shape ───────────────────────────────────────────────────────────────────

/// Port compatibility tag. A packet is compatible with a port when its
/// shape-equivalent matches the port shape.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Shape {
    Square = 0,
    Triangle = 1,
    Circle = 2,
}

// ─── Port Direction ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PortDirection {
    Input = 0,
    Output = 1,
}

// ─── Packet Kind ─────────────────────────────────────────────────────────────

/// Logical packet type. Determines base size, speed and reward.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PacketKind {
    Messenger(Shape),
    /// `vpn` is set once a VPN box has re-tagged the packet.
    Confidential { vpn: bool },
    Large { size: u32 },
    /// One piece of a split large packet.
    Bit { group: GroupId, index: u32 },
}

impl PacketKind {
    pub fn size(&self) -> u32 {
        match self {
            Self::Messenger(Shape::Square) => 2,
            Self::Messenger(Shape::Triangle) => 3,
            Self::Messenger(Shape::Circle) => 1,
            Self::Confidential { vpn: false } => 4,
            Self::Confidential { vpn: true } => 6,
            Self::Large { size } => *size,
            Self::Bit { .. } => 1,
        }
    }

    /// Coins awarded when the packet reaches a sink.
    pub fn reward(&self) -> u32 {
        match self {
            Self::Messenger(_) => self.size(),
            Self::Confidential { vpn: false } => 3,
            Self::Confidential { vpn: true } => 4,
            Self::Large { size } => *size,
            Self::Bit { .. } => 0,
        }
    }

    /// Nominal speed in px/s.
    pub fn base_speed(&self) -> f64 {
        match self {
            Self::Messenger(Shape::Square) => 80.0,
            Self::Messenger(Shape::Triangle) => 80.0,
            Self::Messenger(Shape::Circle) => 100.0,
            Self::Confidential { .. } => 60.0,
            Self::Large { .. } => 50.0,
            Self::Bit { .. } => 90.0,
        }
    }

    pub fn shape_equivalent(&self) -> Shape {
        match self {
            Self::Messenger(shape) => *shape,
            Self::Confidential { .. } => Shape::Circle,
            Self::Large { .. } => Shape::Square,
            Self::Bit { .. } => Shape::Circle,
        }
    }

    pub fn is_messenger(&self) -> bool {
        matches!(self, Self::Messenger(_))
    }

    pub fn is_confidential(&self) -> bool {
        matches!(self, Self::Confidential { .. })
    }

    pub fn is_fragment(&self) -> bool {
        matches!(self, Self::Bit { .. })
    }

    pub fn fragment_group(&self) -> Option<GroupId> {
        match self {
            Self::Bit { group, .. } => Some(*group),
            _ => None,
        }
    }
}

// ─── Decoration ──────────────────────────────────────────────────────────────

/// Runtime wrapper state layered over a packet kind.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub enum Decoration {
    #[default]
    None,
    /// `shield` is the remaining absorptive noise budget, `remaining` the
    /// remaining shield lifetime in seconds.
    Protected { shield: f64, remaining: f64 },
    /// Infected. The wrapped original is the packet's `kind`.
    Trojan,
}

// ─── Behavior Kind ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum BehaviorKind {
    #[default]
    Normal = 0,
    Vpn = 1,
    Spy = 2,
    Malicious = 3,
    AntiTrojan = 4,
    Distributor = 5,
    Merger = 6,
}

impl BehaviorKind {
    /// Distributors and mergers need room for a whole split group.
    pub fn is_junction(&self) -> bool {
        matches!(self, Self::Distributor | Self::Merger)
    }
}

// ─── Events ──────────────────────────────────────────────────────────────────

/// Observable outcomes of a tick, consumed by audio/HUD collaborators.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum SimEvent {
    PacketDelivered { packet: PacketId, box_id: BoxId, coins: u32 },
    PacketLost { packet: PacketId },
    ImpactCue { removed: u32 },
    BoxToggled { box_id: BoxId, enabled: bool },
    GroupClosed { group: GroupId, loss: u32 },
}

// ─── Counters ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Counters {
    pub score: u64,
    pub coins: u64,
    pub loss: u64,
}

// ─── TickReport ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct TickReport {
    pub tick: u64,
    pub elapsed: f64,
    pub counters: Counters,
    pub events: Vec<SimEvent>,
    /// False when the timeline is scrubbed and the tick was skipped.
    pub advanced: bool,
}

// ─── SimStats ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimStats {
    pub tick: u64,
    pub elapsed: f64,
    pub score: u64,
    pub coins: u64,
    pub loss: u64,
    pub packets_on_wires: usize,
    pub packets_buffered: usize,
    pub open_groups: usize,
    pub timeline_frames: usize,
    pub playing: bool,
}
