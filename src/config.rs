// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Packet Flow Engine - Configuration

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// Network
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkTuning {
    /// FIFO capacity of an ordinary box buffer.
    pub buffer_capacity: usize,
    /// Capacity of distributor and merger buffers.
    pub junction_capacity: usize,
    /// A wire accepts a new packet only when nothing sits within this many
    /// pixels of its start.
    pub launch_gap: f64,
    /// Entering a box faster than this (px/s) disables the box.
    pub max_entry_speed: f64,
    /// Seconds a box stays disabled after an over-speed entry.
    pub disable_duration: f64,
}

impl Default for NetworkTuning {
    fn default() -> Self {
        Self {
            buffer_capacity: 5,
            junction_capacity: 16,
            launch_gap: 30.0,
            max_entry_speed: 220.0,
            disable_duration: 2.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Motion
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionTuning {
    /// Wires at least this long (px) get the long-wire boost.
    pub long_wire_threshold: f64,
    /// Extra acceleration (px/s^2) applied on long wires.
    pub long_wire_accel: f64,
    /// Speed ceiling on long wires, as a multiple of base speed.
    pub long_wire_ceiling: f64,
    /// Gentler ceiling for messenger packets.
    pub messenger_long_wire_ceiling: f64,
    /// Progress from which the approach limiter engages.
    pub approach_zone: f64,
    /// Approach speed cap (multiple of base speed) on ordinary wires.
    pub approach_cap: f64,
    /// Approach speed cap on long wires.
    pub long_approach_cap: f64,
    /// Lower speed clamp for keep-distance packets.
    pub keep_distance_min_speed: f64,
    /// Distance (px) between the three curvature samples.
    pub curvature_sample_px: f64,
    /// Speed multiplier for slow-near-busy-box packets approaching a
    /// non-empty box.
    pub busy_box_slowdown: f64,
}

impl Default for MotionTuning {
    fn default() -> Self {
        Self {
            long_wire_threshold: 600.0,
            long_wire_accel: 40.0,
            long_wire_ceiling: 3.0,
            messenger_long_wire_ceiling: 2.0,
            approach_zone: 0.85,
            approach_cap: 1.5,
            long_approach_cap: 2.0,
            keep_distance_min_speed: 10.0,
            curvature_sample_px: 8.0,
            busy_box_slowdown: 0.5,
        }
    }
}

// ---------------------------------------------------------------------------
// Collision
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollisionTuning {
    /// Spatial hash cell edge (px). Must be at least `radius`.
    pub cell_size: f64,
    /// Pairwise collision radius (px).
    pub radius: f64,
    pub noise_increment: f64,
    /// Non-shielded packets at or above this noise are destroyed.
    pub max_noise: f64,
    pub impact_radius: f64,
    /// Noise added at the centre of an impact wave.
    pub impact_strength: f64,
    pub impact_waves: bool,
}

impl Default for CollisionTuning {
    fn default() -> Self {
        Self {
            cell_size: 40.0,
            radius: 12.0,
            noise_increment: 1.0,
            max_noise: 5.0,
            impact_radius: 90.0,
            impact_strength: 1.0,
            impact_waves: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Behaviors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorTuning {
    /// Chance that a malicious box infects a packet.
    pub infection_probability: f64,
    pub anti_trojan_radius: f64,
    pub anti_trojan_cooldown: f64,
    /// Noise a fresh shield absorbs.
    pub shield_budget: f64,
    /// Shield lifetime in seconds.
    pub shield_duration: f64,
}

impl Default for BehaviorTuning {
    fn default() -> Self {
        Self {
            infection_probability: 0.3,
            anti_trojan_radius: 200.0,
            anti_trojan_cooldown: 3.0,
            shield_budget: 3.0,
            shield_duration: 10.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Timeline
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineTuning {
    /// Seconds of simulated time between recorded frames.
    pub interval: f64,
    /// Maximum frames kept; the oldest is evicted on overflow.
    pub capacity: usize,
    /// Minimum seconds between two autosave writes.
    pub autosave_min_interval: f64,
}

impl Default for TimelineTuning {
    fn default() -> Self {
        Self {
            interval: 0.5,
            capacity: 240,
            autosave_min_interval: 5.0,
        }
    }
}

// ---------------------------------------------------------------------------
// SimConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Seed of the world RNG. Equal seeds give equal runs.
    pub seed: u64,
    /// Fixed tick rate used by `Simulation::run_for`.
    pub tick_hz: f64,
    pub network: NetworkTuning,
    pub motion: MotionTuning,
    pub collision: CollisionTuning,
    pub behavior: BehaviorTuning,
    pub timeline: TimelineTuning,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            tick_hz: 60.0,
            network: NetworkTuning::default(),
            motion: MotionTuning::default(),
            collision: CollisionTuning::default(),
            behavior: BehaviorTuning::default(),
            timeline: TimelineTuning::default(),
        }
    }
}

impl SimConfig {
    /// Parse a (possibly partial) JSON document; missing fields keep their
    /// defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: SimConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn fixed_dt(&self) -> f64 {
        1.0 / self.tick_hz
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.tick_hz > 0.0) {
            return Err(ConfigError::Invalid("tick_hz must be positive".into()));
        }
        if self.network.buffer_capacity == 0 || self.network.junction_capacity == 0 {
            return Err(ConfigError::Invalid("buffer capacities must be non-zero".into()));
        }
        let c = &self.collision;
        if !(c.cell_size > 0.0) || !(c.radius > 0.0) {
            return Err(ConfigError::Invalid(
                "collision cell_size and radius must be positive".into(),
            ));
        }
        // A 3x3 neighbourhood only covers the radius when cells are at least that wide.
        if c.cell_size < c.radius {
            return Err(ConfigError::Invalid(
                "collision cell_size must be at least the collision radius".into(),
            ));
        }
        if !(c.max_noise > 0.0) {
            return Err(ConfigError::Invalid("max_noise must be positive".into()));
        }
        let p = self.behavior.infection_probability;
        if !(0.0..=1.0).contains(&p) {
            return Err(ConfigError::Invalid(
                "infection_probability must lie in [0, 1]".into(),
            ));
        }
        if self.timeline.capacity == 0 || !(self.timeline.interval > 0.0) {
            return Err(ConfigError::Invalid(
                "timeline capacity and interval must be positive".into(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(SimConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = SimConfig::from_json_str(r#"{"seed": 7, "collision": {"radius": 20.0}}"#)
            .unwrap();
        assert_eq!(config.seed, 7);
        assert!((config.collision.radius - 20.0).abs() < f64::EPSILON);
        assert!((config.collision.cell_size - 40.0).abs() < f64::EPSILON);
        assert_eq!(config.network.buffer_capacity, 5);
    }

    #[test]
    fn test_cell_smaller_than_radius_rejected() {
        let err = SimConfig::from_json_str(r#"{"collision": {"cell_size": 5.0}}"#);
        assert!(matches!(err, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_probability_out_of_range_rejected() {
        let err = SimConfig::from_json_str(r#"{"behavior": {"infection_probability": 1.5}}"#);
        assert!(matches!(err, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_malformed_json() {
        let err = SimConfig::from_json_str("{seed:");
        assert!(matches!(err, Err(ConfigError::Parse(_))));
    }
}
