// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Packet Flow Engine

pub mod types;
pub mod config;
pub mod error;
pub mod packet;
pub mod wire;
pub mod network;
pub mod kinematics;
pub mod motion;
pub mod dispatch;
pub mod collision;
pub mod groups;
pub mod behavior;
pub mod scheduler;
pub mod timeline;
pub mod simulation;

#[cfg(not(target_arch = "wasm32"))]
pub mod autosave;

pub use config::SimConfig;
pub use error::{ConfigError, NetworkError, PathError, TimelineError};
pub use network::World;
pub use simulation::Simulation;
pub use timeline::{Snapshot, Timeline};
pub use types::*;

use glam::DVec2;
use wasm_bindgen::prelude::*;

// ─── Demo Network ────────────────────────────────────────────────────────────

/// Small fixed network used by the browser build: a producer feeding a VPN
/// and a relay, both draining into one sink.
pub fn build_demo(world: &mut World) -> Result<(), NetworkError> {
    let size = DVec2::new(60.0, 60.0);
    let source = world.add_box(DVec2::new(80.0, 200.0), size, BehaviorKind::Normal);
    let vpn = world.add_box(DVec2::new(320.0, 100.0), size, BehaviorKind::Vpn);
    let relay = world.add_box(DVec2::new(320.0, 300.0), size, BehaviorKind::Normal);
    let sink = world.add_box(DVec2::new(620.0, 200.0), size, BehaviorKind::Normal);

    let out_a = world.add_port(source, Shape::Square, PortDirection::Output, DVec2::new(30.0, -15.0))?;
    let out_b = world.add_port(source, Shape::Circle, PortDirection::Output, DVec2::new(30.0, 15.0))?;
    let vpn_in = world.add_port(vpn, Shape::Square, PortDirection::Input, DVec2::new(-30.0, 0.0))?;
    let vpn_out = world.add_port(vpn, Shape::Triangle, PortDirection::Output, DVec2::new(30.0, 0.0))?;
    let relay_in = world.add_port(relay, Shape::Circle, PortDirection::Input, DVec2::new(-30.0, 0.0))?;
    let relay_out = world.add_port(relay, Shape::Square, PortDirection::Output, DVec2::new(30.0, 0.0))?;
    let sink_a = world.add_port(sink, Shape::Triangle, PortDirection::Input, DVec2::new(-30.0, -15.0))?;
    let sink_b = world.add_port(sink, Shape::Square, PortDirection::Input, DVec2::new(-30.0, 15.0))?;

    world.connect(out_a, vpn_in, &[])?;
    world.connect(out_b, relay_in, &[DVec2::new(200.0, 300.0)])?;
    world.connect(vpn_out, sink_a, &[DVec2::new(480.0, 100.0)])?;
    world.connect(relay_out, sink_b, &[])?;

    world.add_producer(
        source,
        vec![
            PacketKind::Messenger(Shape::Square),
            PacketKind::Messenger(Shape::Circle),
            PacketKind::Messenger(Shape::Triangle),
            PacketKind::Confidential { vpn: false },
        ],
        0.75,
        None,
    )?;
    Ok(())
}

// ─── WASM Interface ──────────────────────────────────────────────────────────

#[wasm_bindgen]
impl Simulation {
    #[wasm_bindgen(constructor)]
    pub fn new(seed: u32) -> Self {
        #[cfg(target_arch = "wasm32")]
        std::panic::set_hook(Box::new(console_error_panic_hook::hook));

        let mut sim = Simulation::with_config(SimConfig::default().with_seed(seed as u64));
        if let Err(err) = build_demo(sim.world_mut()) {
            tracing::error!(error = %err, "demo network rejected");
        }
        sim
    }

    #[wasm_bindgen(js_name = tick)]
    pub fn js_tick(&mut self, dt: f64) -> JsValue {
        let report = self.tick_core(dt);
        serde_wasm_bindgen::to_value(&report).unwrap_or(JsValue::NULL)
    }

    #[wasm_bindgen(js_name = scrubTo)]
    pub fn js_scrub_to(&mut self, back: u32) -> bool {
        self.scrub_to(back as usize)
    }

    #[wasm_bindgen(js_name = resume)]
    pub fn js_resume(&mut self) -> u32 {
        self.resume() as u32
    }

    #[wasm_bindgen(js_name = pauseCollisions)]
    pub fn js_pause_collisions(&mut self, seconds: f64) {
        self.pause_collisions(seconds);
    }

    #[wasm_bindgen(js_name = pauseImpactWaves)]
    pub fn js_pause_impact_waves(&mut self, seconds: f64) {
        self.pause_impact_waves(seconds);
    }

    #[wasm_bindgen(js_name = exportHistory)]
    pub fn js_export_history(&self) -> Result<String, JsValue> {
        self.export_history()
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }

    #[wasm_bindgen(js_name = importHistory)]
    pub fn js_import_history(&mut self, json: &str) -> Result<(), JsValue> {
        self.import_history(json)
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }

    #[wasm_bindgen(js_name = getStats)]
    pub fn get_stats(&self) -> JsValue {
        serde_wasm_bindgen::to_value(&self.stats()).unwrap_or(JsValue::NULL)
    }

    /// Render positions of every packet on a wire as `[x, y, ...]`.
    #[wasm_bindgen(js_name = packetPositions)]
    pub fn packet_positions(&self) -> Vec<f64> {
        let world = self.world();
        world
            .wires()
            .flat_map(|w| w.packets().iter().copied())
            .filter_map(|id| world.render_position(id))
            .flat_map(|p| [p.x, p.y])
            .collect()
    }
}
