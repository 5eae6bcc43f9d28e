// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Packet Flow Engine - Simulation Core

use std::sync::{Arc, Mutex, PoisonError};

use tracing::{info, warn};
use wasm_bindgen::prelude::*;

use crate::behavior::BehaviorStage;
use crate::collision::CollisionDetector;
use crate::config::SimConfig;
use crate::dispatch::DispatchStage;
use crate::error::{ConfigError, TimelineError};
use crate::motion::MotionStage;
use crate::network::World;
use crate::scheduler::{SharedTickable, SubscriptionId, TickScheduler};
use crate::timeline::{Snapshot, Timeline, TimelineRecorder};
use crate::types::{SimStats, TickReport};

// ─── Simulation struct ───────────────────────────────────────────────────────

/// Façade owning the world and the tick pipeline:
/// motion → dispatch → behaviors → collision → timeline.
#[wasm_bindgen]
pub struct Simulation {
    pub(crate) world: World,
    scheduler: Arc<TickScheduler>,
    collision: Arc<Mutex<CollisionDetector>>,
    timeline: Arc<Mutex<Timeline>>,
    #[cfg(not(target_arch = "wasm32"))]
    autosave: Option<(SubscriptionId, crate::autosave::AutosaveWorker)>,
}

// ─── Internal Logic (Testable, pure Rust) ────────────────────────────────────

impl Simulation {
    /// Build from an in-code config. Out-of-range values are reported and
    /// clamped where they are used; `from_json_config` rejects them.
    pub fn with_config(config: SimConfig) -> Self {
        if let Err(err) = config.validate() {
            warn!(error = %err, "simulation config out of range");
        }
        let collision = Arc::new(Mutex::new(CollisionDetector::new(config.collision.cell_size)));
        let timeline = Arc::new(Mutex::new(Timeline::new(config.timeline.capacity)));
        let recorder = TimelineRecorder::new(timeline.clone(), config.timeline.interval);

        let scheduler = Arc::new(TickScheduler::new());
        scheduler.subscribe(Arc::new(Mutex::new(MotionStage)));
        scheduler.subscribe(Arc::new(Mutex::new(DispatchStage)));
        scheduler.subscribe(Arc::new(Mutex::new(BehaviorStage)));
        let collision_stage: SharedTickable = collision.clone();
        scheduler.subscribe(collision_stage);
        scheduler.subscribe(Arc::new(Mutex::new(recorder)));

        info!(seed = config.seed, tick_hz = config.tick_hz, "simulation created");
        Self {
            world: World::new(config),
            scheduler,
            collision,
            timeline,
            #[cfg(not(target_arch = "wasm32"))]
            autosave: None,
        }
    }

    pub fn from_json_config(json: &str) -> Result<Self, ConfigError> {
        Ok(Self::with_config(SimConfig::from_json_str(json)?))
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// Shared handle for registering extra stages from other threads.
    pub fn scheduler(&self) -> Arc<TickScheduler> {
        self.scheduler.clone()
    }

    fn timeline(&self) -> std::sync::MutexGuard<'_, Timeline> {
        self.timeline.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Advance one tick. While the timeline is scrubbed the world is frozen
    /// and the report says so.
    pub fn tick_core(&mut self, dt: f64) -> TickReport {
        if !self.timeline().is_playing() {
            return TickReport {
                tick: self.world.tick,
                elapsed: self.world.elapsed,
                counters: self.world.counters,
                events: Vec::new(),
                advanced: false,
            };
        }
        self.world.tick += 1;
        self.world.elapsed += dt;
        self.scheduler.run(&mut self.world, dt);
        TickReport {
            tick: self.world.tick,
            elapsed: self.world.elapsed,
            counters: self.world.counters,
            events: self.world.take_events(),
            advanced: true,
        }
    }

    /// Run fixed ticks covering `seconds` of simulated time. Returns the
    /// number of ticks that advanced.
    pub fn run_for(&mut self, seconds: f64) -> u64 {
        let dt = self.world.config.fixed_dt();
        let steps = (seconds / dt).round().max(0.0) as u64;
        (0..steps).filter(|_| self.tick_core(dt).advanced).count() as u64
    }

    /// Capture a frame now, if playing.
    pub fn record_frame(&mut self) -> bool {
        let snapshot = Snapshot::capture(&self.world);
        let mut timeline = self.timeline();
        if !timeline.is_playing() {
            return false;
        }
        timeline.record(snapshot);
        true
    }

    /// Restore the frame `back` frames behind the newest (clamped).
    pub fn scrub_to(&mut self, back: usize) -> bool {
        let mut timeline = self.timeline.lock().unwrap_or_else(PoisonError::into_inner);
        match timeline.scrub_to(back) {
            Some(snapshot) => {
                self.world.restore(snapshot);
                true
            }
            None => false,
        }
    }

    pub fn step_back(&mut self) -> bool {
        let mut timeline = self.timeline.lock().unwrap_or_else(PoisonError::into_inner);
        match timeline.step_back() {
            Some(snapshot) => {
                self.world.restore(snapshot);
                true
            }
            None => false,
        }
    }

    pub fn step_forward(&mut self) -> bool {
        let mut timeline = self.timeline.lock().unwrap_or_else(PoisonError::into_inner);
        match timeline.step_forward() {
            Some(snapshot) => {
                self.world.restore(snapshot);
                true
            }
            None => false,
        }
    }

    /// Discard the frames after the cursor and continue live from the
    /// restored state.
    pub fn resume(&mut self) -> usize {
        let dropped = self.timeline().resume();
        if dropped > 0 {
            info!(dropped, tick = self.world.tick, "timeline resumed");
        }
        dropped
    }

    pub fn is_playing(&self) -> bool {
        self.timeline().is_playing()
    }

    pub fn timeline_len(&self) -> usize {
        self.timeline().len()
    }

    pub fn pause_collisions(&mut self, seconds: f64) {
        self.collision
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pause_collisions(seconds);
    }

    pub fn pause_impact_waves(&mut self, seconds: f64) {
        self.collision
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pause_impact_waves(seconds);
    }

    pub fn set_impact_waves(&mut self, enabled: bool) {
        self.world.config.collision.impact_waves = enabled;
    }

    pub fn export_history(&self) -> Result<String, TimelineError> {
        self.timeline().export_json()
    }

    /// Replace the history and restore its newest frame.
    pub fn import_history(&mut self, json: &str) -> Result<(), TimelineError> {
        let mut timeline = self.timeline.lock().unwrap_or_else(PoisonError::into_inner);
        let latest = timeline.import_json(json)?;
        self.world.restore(latest);
        Ok(())
    }

    #[cfg(not(target_arch = "wasm32"))]
    pub fn export_history_to(&self, path: &std::path::Path) -> Result<(), TimelineError> {
        self.timeline().export_to_path(path)
    }

    #[cfg(not(target_arch = "wasm32"))]
    pub fn import_history_from(&mut self, path: &std::path::Path) -> Result<(), TimelineError> {
        let mut timeline = self.timeline.lock().unwrap_or_else(PoisonError::into_inner);
        let latest = timeline.import_from_path(path)?;
        self.world.restore(latest);
        Ok(())
    }

    /// Start a background writer that persists every new timeline frame to
    /// `path`, at most once per `autosave_min_interval` seconds.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn enable_autosave(&mut self, path: impl Into<std::path::PathBuf>) {
        use crate::autosave::{AutosaveHook, AutosaveWorker, Autosaver};
        use std::time::Duration;

        self.disable_autosave();
        let interval =
            Duration::from_secs_f64(self.world.config.timeline.autosave_min_interval.max(0.0));
        let worker = AutosaveWorker::spawn(Autosaver::new(path, interval));
        let Some(sender) = worker.sender() else {
            return;
        };
        let hook = AutosaveHook::new(self.timeline.clone(), sender);
        let subscription = self.scheduler.subscribe(Arc::new(Mutex::new(hook)));
        self.autosave = Some((subscription, worker));
    }

    /// Stop autosaving. Blocks until the writer has flushed its last frame.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn disable_autosave(&mut self) {
        // The hook holds a sender; it must go before the worker can finish.
        if let Some((subscription, worker)) = self.autosave.take() {
            self.scheduler.unsubscribe(subscription);
            drop(worker);
        }
    }

    pub fn stats(&self) -> SimStats {
        let timeline = self.timeline();
        SimStats {
            tick: self.world.tick,
            elapsed: self.world.elapsed,
            score: self.world.counters.score,
            coins: self.world.counters.coins,
            loss: self.world.counters.loss,
            packets_on_wires: self.world.packets_on_wires(),
            packets_buffered: self.world.packets_buffered(),
            open_groups: self.world.groups.open_count(),
            timeline_frames: timeline.len(),
            playing: timeline.is_playing(),
        }
    }
}

impl Drop for Simulation {
    fn drop(&mut self) {
        #[cfg(not(target_arch = "wasm32"))]
        self.disable_autosave();
    }
}
